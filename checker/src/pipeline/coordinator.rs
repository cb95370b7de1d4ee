use crate::ast::ParsedFile;
use crate::diagnostics::ErrorQueue;
use crate::files::FileKind;
use crate::globals::GlobalState;
use crate::pipeline::cache::{self, Cache};
use crate::pipeline::{
    decide_strict_level, index_one, index_one_with_plugins, read_file_with_strictness_overrides,
    GeneratedFile, Options, Phase,
};
use crate::span::FileId;
use crate::substitute::GlobalSubstitution;
use crossbeam::channel::{self, Receiver};
use std::time::Duration;

/// How long the coordinator blocks on the result queue before emitting a
/// heartbeat trace.
const BLOCK_INTERVAL: Duration = Duration::from_millis(100);

struct IndexResult {
    gs: GlobalState,
    trees: Vec<ParsedFile>,
    plugin_files: Vec<GeneratedFile>,
}

struct ThreadResult {
    gs: GlobalState,
    trees: Vec<ParsedFile>,
    plugin_files: Vec<GeneratedFile>,
}

/// Index a set of reserved files. Three or more files fan out across a
/// worker pool of deep-cloned states whose results are merged back into
/// one canonical state; fewer run inline on the caller's thread. Trees
/// come back sorted by file id, making the result order-independent.
pub fn index(
    gs: GlobalState,
    files: Vec<FileId>,
    opts: &Options,
    cache: Cache,
) -> (GlobalState, Vec<ParsedFile>) {
    if opts.stop_after_phase == Phase::Init {
        return (gs, Vec::new());
    }

    let (gs, mut trees) = if files.len() < 3 || opts.workers < 2 {
        let mut gs = gs;
        let trees = index_inline(&mut gs, files, opts, cache);
        (gs, trees)
    } else {
        let first_pass = index_supplied_files(gs, files, opts, cache);
        let both_passes = index_plugin_files(first_pass, opts, cache);
        (both_passes.gs, both_passes.trees)
    };

    trees.sort_by_key(|parsed| parsed.file);
    (gs, trees)
}

fn enter_generated_file(gs: &mut GlobalState, generated: &GeneratedFile, opts: &Options) -> FileId {
    let file = gs.with_unfrozen_files(|gs| {
        let file = gs.reserve_file(&generated.path);
        gs.enter_file_source(file, generated.source.as_str().into(), FileKind::Normal);
        file
    });
    let level = decide_strict_level(gs, file, opts);
    gs.files[file].strict = level;
    file
}

fn index_inline(
    gs: &mut GlobalState,
    files: Vec<FileId>,
    opts: &Options,
    cache: Cache,
) -> Vec<ParsedFile> {
    let mut ret = Vec::new();
    for file in files {
        read_file_with_strictness_overrides(gs, file, opts);
        let (parsed, plugin_files) = index_one_with_plugins(gs, file, opts, cache);
        ret.push(parsed);
        for generated in plugin_files {
            let plugin_file = enter_generated_file(gs, &generated, opts);
            ret.push(index_one(gs, plugin_file, opts, cache));
        }
    }
    cache::cache_trees(gs, cache, &ret);
    ret
}

/// Drain worker batches. The first worker's state becomes canonical; all
/// later batches are rewritten into it through a fresh substitution,
/// skipping trees that came from the cache (those are already in the
/// canonical id space).
fn merge_index_results(result_rx: Receiver<ThreadResult>, cache: Cache) -> Option<IndexResult> {
    let mut ret: Option<IndexResult> = None;
    loop {
        let mut batch = match result_rx.recv_timeout(BLOCK_INTERVAL) {
            Ok(batch) => batch,
            Err(channel::RecvTimeoutError::Timeout) => {
                log::trace!("indexing: waiting for worker results");
                continue;
            }
            Err(channel::RecvTimeoutError::Disconnected) => break,
        };
        match &mut ret {
            None => {
                cache::cache_trees(&batch.gs, cache, &batch.trees);
                ret = Some(IndexResult {
                    gs: batch.gs,
                    trees: batch.trees,
                    plugin_files: batch.plugin_files,
                });
            }
            Some(ret) => {
                let substitution = GlobalSubstitution::new(&batch.gs, &mut ret.gs);
                // Worker-read file data lands in the canonical table;
                // slots were reserved before cloning, so ids agree.
                for parsed in &batch.trees {
                    ret.gs.files[parsed.file] = batch.gs.files[parsed.file].clone();
                }
                for parsed in &mut batch.trees {
                    if ret.gs.files[parsed.file].cached_parse_tree {
                        parsed.adopt(&ret.gs);
                    } else {
                        substitution.run(parsed);
                    }
                }
                ret.gs.errors.append(std::mem::take(&mut batch.gs.errors));
                cache::cache_trees(&ret.gs, cache, &batch.trees);
                ret.trees.append(&mut batch.trees);
                ret.plugin_files.append(&mut batch.plugin_files);
            }
        }
    }
    ret
}

fn prepend_errors(gs: &mut GlobalState, earlier: Vec<crate::diagnostics::Diagnostic>) {
    let mut merged = ErrorQueue::default();
    for diag in earlier {
        merged.push(diag);
    }
    merged.append(std::mem::take(&mut gs.errors));
    gs.errors = merged;
}

fn index_supplied_files(
    mut base: GlobalState,
    files: Vec<FileId>,
    opts: &Options,
    cache: Cache,
) -> IndexResult {
    let base_errors = base.errors.drain();
    let workers = opts.workers.min(files.len());
    let (file_tx, file_rx) = channel::bounded::<FileId>(files.len());
    for file in &files {
        file_tx.send(*file).expect("input queue sized to the file count");
    }
    drop(file_tx);
    let (result_tx, result_rx) = channel::bounded::<ThreadResult>(workers);

    let merged = std::thread::scope(|scope| {
        for _ in 0..workers {
            let file_rx = file_rx.clone();
            let result_tx = result_tx.clone();
            let base = &base;
            scope.spawn(move || {
                let mut local = base.deep_clone();
                let mut trees = Vec::new();
                let mut plugin_files = Vec::new();
                // Non-blocking pulls: the queue was filled before the
                // pool started, so an empty queue means drained.
                while let Ok(file) = file_rx.try_recv() {
                    read_file_with_strictness_overrides(&mut local, file, opts);
                    let (parsed, mut generated) =
                        index_one_with_plugins(&mut local, file, opts, cache);
                    plugin_files.append(&mut generated);
                    trees.push(parsed);
                }
                if !trees.is_empty() {
                    let _ = result_tx.send(ThreadResult {
                        gs: local,
                        trees,
                        plugin_files,
                    });
                }
            });
        }
        drop(result_tx);
        merge_index_results(result_rx, cache)
    });

    let mut ret = match merged {
        Some(ret) => ret,
        None => IndexResult {
            gs: base,
            trees: Vec::new(),
            plugin_files: Vec::new(),
        },
    };
    // The canonical state replaces the caller's: diagnostics queued
    // before indexing come first.
    prepend_errors(&mut ret.gs, base_errors);
    ret
}

/// Second pass: index the files plugins generated during the first pass,
/// then bring the first-pass trees into the new canonical state.
fn index_plugin_files(first_pass: IndexResult, opts: &Options, cache: Cache) -> IndexResult {
    if first_pass.plugin_files.is_empty() {
        return first_pass;
    }
    let IndexResult {
        gs: mut proto,
        trees: mut first_trees,
        plugin_files,
    } = first_pass;

    let mut generated_ids = Vec::with_capacity(plugin_files.len());
    for generated in &plugin_files {
        generated_ids.push(enter_generated_file(&mut proto, generated, opts));
    }

    let proto_errors = proto.errors.drain();
    let workers = opts.workers.min(generated_ids.len());
    let (file_tx, file_rx) = channel::bounded::<FileId>(generated_ids.len());
    for file in &generated_ids {
        file_tx.send(*file).expect("input queue sized to the file count");
    }
    drop(file_tx);
    let (result_tx, result_rx) = channel::bounded::<ThreadResult>(workers);

    let merged = std::thread::scope(|scope| {
        for _ in 0..workers {
            let file_rx = file_rx.clone();
            let result_tx = result_tx.clone();
            let proto = &proto;
            scope.spawn(move || {
                let mut local = proto.deep_clone();
                let mut trees = Vec::new();
                while let Ok(file) = file_rx.try_recv() {
                    trees.push(index_one(&mut local, file, opts, cache));
                }
                if !trees.is_empty() {
                    let _ = result_tx.send(ThreadResult {
                        gs: local,
                        trees,
                        plugin_files: Vec::new(),
                    });
                }
            });
        }
        drop(result_tx);
        merge_index_results(result_rx, cache)
    });

    let Some(mut second) = merged else {
        prepend_errors(&mut proto, proto_errors);
        return IndexResult {
            gs: proto,
            trees: first_trees,
            plugin_files: Vec::new(),
        };
    };

    {
        let substitution = GlobalSubstitution::new(&proto, &mut second.gs);
        for parsed in &mut first_trees {
            substitution.run(parsed);
        }
    }
    prepend_errors(&mut second.gs, proto_errors);
    first_trees.append(&mut second.trees);
    IndexResult {
        gs: second.gs,
        trees: first_trees,
        plugin_files: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::diagnostics::ErrorClass;
    use crate::files::MemoryFileSystem;
    use crate::pipeline::reserve_files;
    use crate::pipeline::InMemoryKvStore;

    const SOURCES: &[(&str, &str)] = &[
        ("./a.rb", "class A\n  def m(x); end\nend\n"),
        ("./b.rb", "module B\n  include Enumerable\nend\n"),
        ("./c.rb", "C = 1\n"),
        ("./d.rb", "class D < A\n  attr_reader :thing\nend\n"),
    ];

    fn options(workers: usize) -> Options {
        let mut fs = MemoryFileSystem::new();
        for (path, source) in SOURCES {
            fs.insert(*path, source.as_bytes().to_vec());
        }
        Options {
            workers,
            fs: Box::new(fs),
            ..Options::default()
        }
    }

    fn index_all(workers: usize) -> (GlobalState, Vec<ParsedFile>) {
        let opts = options(workers);
        let mut gs = GlobalState::new();
        let paths: Vec<String> = SOURCES.iter().map(|(path, _)| path.to_string()).collect();
        let files = reserve_files(&mut gs, &paths);
        index(gs, files, &opts, None)
    }

    fn render(gs: &GlobalState, trees: &[ParsedFile]) -> Vec<String> {
        trees
            .iter()
            .map(|parsed| format!("{}: {}", gs.files[parsed.file].path, parsed.tree.show_raw(gs)))
            .collect()
    }

    #[test]
    fn test_worker_count_does_not_change_results() {
        let (gs_inline, trees_inline) = index_all(1);
        let baseline = render(&gs_inline, &trees_inline);
        for workers in [2, 3, 4] {
            let (gs, trees) = index_all(workers);
            assert_eq!(
                render(&gs, &trees),
                baseline,
                "trees differ with {} workers",
                workers
            );
        }
    }

    #[test]
    fn test_trees_are_sorted_by_file() {
        let (_gs, trees) = index_all(3);
        let ids: Vec<u32> = trees.iter().map(|parsed| parsed.file.raw()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(trees.len(), SOURCES.len());
    }

    #[test]
    fn test_worker_diagnostics_reach_canonical_state() {
        let mut fs = MemoryFileSystem::new();
        fs.insert("./ok1.rb", "class Ok1; end\n".as_bytes().to_vec());
        fs.insert("./ok2.rb", "class Ok2; end\n".as_bytes().to_vec());
        fs.insert("./broken.rb", "class ) end\n".as_bytes().to_vec());
        let opts = Options {
            workers: 3,
            fs: Box::new(fs),
            ..Options::default()
        };
        let mut gs = GlobalState::new();
        let files = reserve_files(
            &mut gs,
            &[
                "./ok1.rb".to_string(),
                "./ok2.rb".to_string(),
                "./broken.rb".to_string(),
            ],
        );
        let (gs, trees) = index(gs, files, &opts, None);
        assert_eq!(trees.len(), 3);
        assert!(gs.errors.iter().any(|d| d.class == ErrorClass::ParserError));
        // The broken file still maps to an (empty) output tree.
        let broken = gs.files.find_by_path("./broken.rb").unwrap();
        let tree = trees.iter().find(|p| p.file == broken).unwrap();
        assert!(tree.tree.is_empty_tree());
    }

    #[test]
    fn test_parallel_cache_round_trip() {
        let store = InMemoryKvStore::new();
        let opts = options(3);
        let mut gs = GlobalState::new();
        let paths: Vec<String> = SOURCES.iter().map(|(path, _)| path.to_string()).collect();
        let files = reserve_files(&mut gs, &paths);
        let (gs, trees) = index(gs, files, &opts, Some(&store));
        assert_eq!(trees.len(), SOURCES.len());
        assert_eq!(store.len(), SOURCES.len());
        let baseline = render(&gs, &trees);

        // Re-index the same files against the canonical state (the
        // edit-driven flow): every file hits the cache, skips the parse
        // phases, and yields a structurally equal tree.
        let opts = options(3);
        let files: Vec<FileId> = SOURCES
            .iter()
            .map(|(path, _)| gs.files.find_by_path(path).unwrap())
            .collect();
        let (gs, trees) = index(gs, files, &opts, Some(&store));
        for parsed in &trees {
            assert!(
                gs.files[parsed.file].cached_parse_tree,
                "{} missed the cache",
                gs.files[parsed.file].path
            );
        }
        assert_eq!(render(&gs, &trees), baseline);
    }

    struct GeneratingPlugin;

    impl crate::pipeline::Plugin for GeneratingPlugin {
        fn rewrite(
            &self,
            gs: &mut GlobalState,
            file: FileId,
            tree: Expr,
        ) -> (Expr, Vec<GeneratedFile>) {
            let generated = if gs.files[file].path.as_str() == "./a.rb" {
                vec![GeneratedFile {
                    path: "./a_generated.rb".to_string(),
                    source: "class AGenerated\nend\n".to_string(),
                }]
            } else {
                Vec::new()
            };
            (tree, generated)
        }
    }

    #[test]
    fn test_plugin_generated_files_are_indexed_in_second_pass() {
        for workers in [1, 3] {
            let mut opts = options(workers);
            opts.plugin = Some(Box::new(GeneratingPlugin));
            let mut gs = GlobalState::new();
            let paths: Vec<String> = SOURCES.iter().map(|(path, _)| path.to_string()).collect();
            let files = reserve_files(&mut gs, &paths);
            let (gs, trees) = index(gs, files, &opts, None);
            assert_eq!(trees.len(), SOURCES.len() + 1);
            let generated = gs
                .files
                .find_by_path("./a_generated.rb")
                .expect("generated file entered");
            let tree = trees.iter().find(|p| p.file == generated).expect("tree");
            assert!(!tree.tree.is_empty_tree());
        }
    }
}
