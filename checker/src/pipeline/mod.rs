use crate::ast::{Expr, ParsedFile};
use crate::desugar;
use crate::diagnostics::{Diagnostic, ErrorClass};
use crate::dsl;
use crate::files::{FileKind, FileSystem, OsFileSystem, StrictLevel};
use crate::globals::GlobalState;
use crate::localvars;
use crate::namer;
use crate::parse;
use crate::resolver;
use crate::span::{FileId, Loc};
use rustc_hash::FxHashMap;
use std::panic::{self, AssertUnwindSafe};

pub mod cache;
pub mod coordinator;

pub use cache::{Cache, InMemoryKvStore, KeyValueStore};
pub use coordinator::index;

/// Run the pipeline only up to (and including) the given phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Parser,
    Desugarer,
    Dsl,
    LocalVars,
    Namer,
    Resolver,
    Cfg,
    Inferencer,
}

/// A source file synthesized by a plugin rewrite, to be indexed in the
/// coordinator's second pass.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub path: String,
    pub source: String,
}

/// Tree-rewrite hook invoked between desugaring and the DSL passes. The
/// transport (the original runs plugins as subprocesses) is the caller's
/// concern; the pipeline only sees the rewritten tree and any generated
/// files.
pub trait Plugin: Sync {
    fn rewrite(&self, gs: &mut GlobalState, file: FileId, tree: Expr) -> (Expr, Vec<GeneratedFile>);
}

pub struct Options {
    pub strictness_overrides: FxHashMap<String, StrictLevel>,
    pub force_min_strict: StrictLevel,
    pub force_max_strict: StrictLevel,
    /// Autogen needs to see all definitions but stops before inference.
    pub running_under_autogen: bool,
    pub stop_after_phase: Phase,
    pub skip_dsl_passes: bool,
    /// Worker threads for indexing; fewer than two runs inline.
    pub workers: usize,
    pub fs: Box<dyn FileSystem>,
    pub plugin: Option<Box<dyn Plugin>>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            strictness_overrides: FxHashMap::default(),
            force_min_strict: StrictLevel::False,
            force_max_strict: StrictLevel::Strong,
            running_under_autogen: false,
            stop_after_phase: Phase::Inferencer,
            skip_dsl_passes: false,
            workers: 4,
            fs: Box::new(OsFileSystem),
            plugin: None,
        }
    }
}

/// Reserve file-table slots for every input path up front, so file ids
/// agree across all worker clones.
pub fn reserve_files(gs: &mut GlobalState, paths: &[String]) -> Vec<FileId> {
    gs.with_unfrozen_files(|gs| paths.iter().map(|path| gs.reserve_file(path)).collect())
}

/// Sigil + overrides + clamping. Overrides win over the file's own
/// sigil; overriding a file to its own sigil is useless and says so.
pub fn decide_strict_level(gs: &mut GlobalState, file: FileId, opts: &Options) -> StrictLevel {
    let mut path = gs.files[file].path.to_string();
    if !path.starts_with('/') && !path.starts_with("./") {
        path.insert_str(0, "./");
    }

    let mut level = match opts.strictness_overrides.get(&path) {
        Some(&overridden) => {
            if Some(overridden) == gs.files[file].original_sigil {
                gs.error(Diagnostic::new(
                    ErrorClass::UselessStrictnessOverride,
                    Loc::empty(file),
                    "Useless override of strictness level",
                ));
            }
            overridden
        }
        None => gs.files[file].original_sigil.unwrap_or(StrictLevel::False),
    };

    if level.clampable() {
        level = level.min(opts.force_max_strict).max(opts.force_min_strict);
    }

    if opts.running_under_autogen {
        level = StrictLevel::False;
    }

    level
}

/// Populate a reserved file slot: read the source (missing files become
/// empty sources plus a diagnostic) and decide the strict level.
pub fn read_file_with_strictness_overrides(gs: &mut GlobalState, file: FileId, opts: &Options) {
    if gs.files[file].read {
        return;
    }
    let path = gs.files[file].path.clone();
    let bytes = opts.fs.read_file(&path);
    let found = bytes.is_some();
    let source = bytes
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    gs.with_unfrozen_files(|gs| gs.enter_file_source(file, source.into(), FileKind::Normal));
    if !found {
        gs.error(Diagnostic::new(
            ErrorClass::FileNotFound,
            Loc::empty(file),
            "File Not Found",
        ));
    }
    let level = decide_strict_level(gs, file, opts);
    gs.files[file].strict = level;
    log::trace!("read {} (strict level {})", path, level);
}

fn internal_error(gs: &mut GlobalState, file: FileId, what: &str) {
    let path = gs.files[file].path.clone();
    gs.refreeze();
    gs.error(Diagnostic::new(
        ErrorClass::InternalError,
        Loc::empty(file),
        format!("Exception {} file: `{}`", what, path),
    ));
}

/// Index one file without the plugin hook (used for plugin-generated
/// files, which must not recursively invoke plugins).
pub fn index_one(gs: &mut GlobalState, file: FileId, opts: &Options, cache: Cache) -> ParsedFile {
    index_one_inner(gs, file, opts, cache, false).0
}

/// Index one file: cache lookup, parse, desugar, plugin rewrite, DSL
/// expansion, and local-variable resolution, with per-file failure
/// isolation.
pub fn index_one_with_plugins(
    gs: &mut GlobalState,
    file: FileId,
    opts: &Options,
    cache: Cache,
) -> (ParsedFile, Vec<GeneratedFile>) {
    index_one_inner(gs, file, opts, cache, true)
}

fn index_one_inner(
    gs: &mut GlobalState,
    file: FileId,
    opts: &Options,
    cache: Cache,
    with_plugins: bool,
) -> (ParsedFile, Vec<GeneratedFile>) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        index_one_phases(gs, file, opts, cache, with_plugins)
    }));
    match result {
        Ok(indexed) => indexed,
        Err(_) => {
            internal_error(gs, file, "parsing");
            (ParsedFile::empty(file, gs), Vec::new())
        }
    }
}

fn index_one_phases(
    gs: &mut GlobalState,
    file: FileId,
    opts: &Options,
    cache: Cache,
    with_plugins: bool,
) -> (ParsedFile, Vec<GeneratedFile>) {
    if let Some(tree) = cache::fetch_tree_from_cache(gs, file, cache) {
        return (ParsedFile::new(tree, file, gs), Vec::new());
    }

    if gs.files[file].strict == StrictLevel::Ignore {
        return (ParsedFile::empty(file, gs), Vec::new());
    }

    let Some(stmts) = gs.with_unfrozen_names(|gs| parse::parse_file(gs, file)) else {
        // The parser reported; index the file as empty.
        return (ParsedFile::empty(file, gs), Vec::new());
    };
    if opts.stop_after_phase == Phase::Parser {
        return (ParsedFile::empty(file, gs), Vec::new());
    }

    let tree = desugar::desugar(gs, file, stmts);
    if opts.stop_after_phase == Phase::Desugarer {
        return (ParsedFile::empty(file, gs), Vec::new());
    }

    let mut parsed = ParsedFile::new(tree, file, gs);
    let mut plugin_files = Vec::new();
    if with_plugins {
        if let Some(plugin) = &opts.plugin {
            let tree = std::mem::replace(&mut parsed.tree, Expr::EmptyTree);
            let (tree, generated) = plugin.rewrite(gs, file, tree);
            parsed.tree = tree;
            plugin_files = generated;
        }
    }

    if !opts.skip_dsl_passes {
        parsed = gs.with_unfrozen_names(|gs| dsl::run(gs, parsed));
    }
    parsed = localvars::run(parsed);
    if matches!(opts.stop_after_phase, Phase::Dsl | Phase::LocalVars) {
        return (ParsedFile::empty(file, gs), Vec::new());
    }

    (parsed, plugin_files)
}

/// Sequential naming over indexed trees. Files are named one at a time
/// against the canonical state; see the namer for why this loop must not
/// be parallelized.
pub fn name(gs: &mut GlobalState, trees: Vec<ParsedFile>, _opts: &Options) -> Vec<ParsedFile> {
    let mut ctx = namer::NamerCtx::default();
    trees
        .into_iter()
        .map(|parsed| {
            let file = parsed.file;
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                gs.with_unfrozen_names(|gs| {
                    gs.with_unfrozen_symbols(|gs| namer::run_with_ctx(gs, &mut ctx, parsed))
                })
            }));
            match result {
                Ok(named) => named,
                Err(_) => {
                    internal_error(gs, file, "naming");
                    ParsedFile::empty(file, gs)
                }
            }
        })
        .collect()
}

/// Re-run naming and the tree-level resolver passes over a small set of
/// changed trees without redoing whole-program work. This is the entry
/// point for edit-driven re-typechecking.
pub fn incremental_resolve(
    gs: &mut GlobalState,
    trees: Vec<ParsedFile>,
    _opts: &Options,
) -> Vec<ParsedFile> {
    let mut named = Vec::with_capacity(trees.len());
    for parsed in trees {
        let file = parsed.file;
        log::trace!("incremental naming: {}", gs.files[file].path);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            gs.with_unfrozen_names(|gs| gs.with_unfrozen_symbols(|gs| namer::run(gs, parsed)))
        }));
        match result {
            Ok(tree) => named.push(tree),
            Err(_) => {
                internal_error(gs, file, "naming");
                named.push(ParsedFile::empty(file, gs));
            }
        }
    }

    log::trace!("resolving (incremental pass)");
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| resolver::run_tree_passes(gs, named))
        })
    }));
    match result {
        Ok(resolved) => resolved,
        Err(_) => {
            gs.refreeze();
            gs.error(Diagnostic::new(
                ErrorClass::InternalError,
                None,
                "Exception in incremental resolve",
            ));
            Vec::new()
        }
    }
}
