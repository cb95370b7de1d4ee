use checker::diagnostics;
use checker::files::StrictLevel;
use checker::globals::GlobalState;
use checker::pipeline::{self, Options, Phase};
use clap::Parser;
use std::process::exit;

#[derive(Parser, Debug)]
#[command(name = "checker")]
pub struct CommandLineArguments {
    /// Source files to index and name.
    pub paths: Vec<String>,
    /// Minimum strictness applied to every file.
    #[arg(long = "typed")]
    pub typed: Option<String>,
    /// Per-file strictness overrides, `path=level`.
    #[arg(long = "typed-override", value_name = "PATH=LEVEL")]
    pub typed_overrides: Vec<String>,
    #[arg(long = "workers", default_value_t = 8)]
    pub workers: usize,
    /// Stop the pipeline after the given phase.
    #[arg(long = "stop-after")]
    pub stop_after: Option<String>,
    #[arg(long = "skip-dsl-passes")]
    pub skip_dsl_passes: bool,
    #[arg(long = "autogen")]
    pub autogen: bool,
}

fn parse_level(text: &str) -> StrictLevel {
    match text.parse() {
        Ok(level) => level,
        Err(()) => {
            eprintln!("unknown strictness level '{}'", text);
            exit(1);
        }
    }
}

fn parse_phase(text: &str) -> Phase {
    match text {
        "init" => Phase::Init,
        "parser" => Phase::Parser,
        "desugarer" => Phase::Desugarer,
        "dsl" => Phase::Dsl,
        "local-vars" => Phase::LocalVars,
        "namer" => Phase::Namer,
        "resolver" => Phase::Resolver,
        "cfg" => Phase::Cfg,
        "inferencer" => Phase::Inferencer,
        other => {
            eprintln!("unknown phase '{}'", other);
            exit(1);
        }
    }
}

fn normalize(path: &str) -> String {
    if path.starts_with('/') || path.starts_with("./") {
        path.to_string()
    } else {
        format!("./{}", path)
    }
}

fn main() {
    let arguments = CommandLineArguments::parse();
    if arguments.paths.is_empty() {
        eprintln!("no input files");
        exit(1);
    }

    let mut opts = Options {
        workers: arguments.workers,
        skip_dsl_passes: arguments.skip_dsl_passes,
        running_under_autogen: arguments.autogen,
        ..Options::default()
    };
    if let Some(level) = &arguments.typed {
        opts.force_min_strict = parse_level(level);
    }
    if let Some(phase) = &arguments.stop_after {
        opts.stop_after_phase = parse_phase(phase);
    }
    for entry in &arguments.typed_overrides {
        let Some((path, level)) = entry.split_once('=') else {
            eprintln!("expected PATH=LEVEL, got '{}'", entry);
            exit(1);
        };
        opts.strictness_overrides
            .insert(normalize(path), parse_level(level));
    }

    let mut gs = GlobalState::new();
    let paths: Vec<String> = arguments.paths.iter().map(|p| normalize(p)).collect();
    let files = pipeline::reserve_files(&mut gs, &paths);
    let (mut gs, trees) = pipeline::index(gs, files, &opts, None);

    let run_namer = !matches!(
        opts.stop_after_phase,
        Phase::Init | Phase::Parser | Phase::Desugarer | Phase::Dsl | Phase::LocalVars
    );
    if run_namer {
        let _named = pipeline::name(&mut gs, trees, &opts);
    }

    for diag in gs.errors.iter() {
        eprint!("{}", diagnostics::render(&gs.files, diag));
    }
    match gs.ok() {
        Ok(()) => exit(0),
        Err(_) => {
            eprintln!("\nerrors: {}", gs.errors.len());
            exit(1)
        }
    }
}
