use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::env;
use std::path::Path;
use std::process::ExitCode;

mod boundary;
mod classify;
mod cli;
mod error;
mod probe;
mod report;
mod scenario;
#[cfg(all(test, unix))]
mod test_support;
mod util;
mod verdict;

use crate::boundary::{Boundary, ModeSignal};
use crate::cli::{BoundaryArgs, CheckArgs, ClassifyArgs, Command, RootArgs};
use crate::error::VerifierResult;
use crate::probe::{LoaderOptions, Observation, ObservedPath, Origin};
use crate::report::{render_text, write_json, ScenarioReport};
use crate::scenario::{
    anchor_paths, find_preset, load_scenario, run_scenario, validate_scenario, PresetInputs,
    ScenarioSpec, PRESETS,
};
use crate::util::absolutize;
use crate::verdict::aggregate;

const FATAL_EXIT_CODE: u8 = 2;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Command::Check(args) => cmd_check(args),
        Command::Classify(args) => cmd_classify(args),
        Command::Presets => cmd_presets(),
    };
    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn cmd_check(args: CheckArgs) -> Result<u8> {
    let cwd = env::current_dir().context("read current directory")?;
    let mut spec = match (&args.scenario, &args.preset) {
        (Some(path), _) => {
            let mut spec = load_scenario(path, &cwd)?;
            if let Some(entry) = &args.entry {
                spec.entry = absolutize(entry, &cwd);
            }
            spec
        }
        (None, Some(name)) => build_preset(name, &args, &cwd)?,
        (None, None) => return Err(anyhow!("either --scenario or --preset is required")),
    };
    spec.loader.preserve_symlinks |= args.preserve_symlinks;
    spec.loader.preserve_symlinks_main |= args.preserve_symlinks_main;

    let landmarks = if args.boundary.landmarks.is_empty() {
        spec.landmarks.clone()
    } else {
        args.boundary.landmarks.clone()
    };
    let boundary = resolve_boundary(&args.boundary, landmarks)?;
    tracing::info!(%boundary, scenario = %spec.name, "boundary resolved");

    let verdict = run_scenario(&spec, &boundary)?;
    let report = ScenarioReport::new(&spec.name, &boundary, &verdict)
        .with_reference(spec.reference.as_deref())
        .with_entry(&spec.entry);
    emit(&report, args.json)?;
    if let Some(out) = &args.out {
        write_json(out, &report)?;
    }
    Ok(verdict.outcome().exit_code())
}

fn build_preset(name: &str, args: &CheckArgs, cwd: &Path) -> Result<ScenarioSpec> {
    let preset =
        find_preset(name).ok_or_else(|| anyhow!("unknown preset {name:?} (see `sbv presets`)"))?;
    let entry = args
        .entry
        .clone()
        .ok_or_else(|| anyhow!("--entry is required with --preset"))?;
    let tool_command = match &args.tool_command {
        Some(command) => shell_words::split(command)
            .with_context(|| format!("parse --tool-command {command:?}"))?,
        None => Vec::new(),
    };
    if preset.uses_tool && tool_command.is_empty() {
        return Err(anyhow!("preset {name} needs --tool-command"));
    }

    let inputs = PresetInputs {
        entry,
        loader: LoaderOptions {
            preserve_symlinks: args.preserve_symlinks,
            preserve_symlinks_main: args.preserve_symlinks_main,
        },
        tool_command,
        tool_preserve_symlinks: args.tool_preserve_symlinks,
    };
    let mut spec = preset.build(&inputs);
    anchor_paths(&mut spec, cwd);
    validate_scenario(&spec).with_context(|| format!("preset {name}"))?;
    Ok(spec)
}

fn cmd_classify(args: ClassifyArgs) -> Result<u8> {
    let boundary = resolve_boundary(&args.boundary, args.boundary.landmarks.clone())?;
    let classifications = args
        .paths
        .iter()
        .map(|path| {
            let observation = Observation::Observed(ObservedPath::new(
                args.strategy,
                path.display().to_string(),
                path.clone(),
                Origin::Supplied,
            ));
            classify::classify(&boundary, &observation)
        })
        .collect::<VerifierResult<Vec<_>>>()?;
    let verdict = aggregate(classifications);
    let report = ScenarioReport::new("classify", &boundary, &verdict);
    emit(&report, args.json)?;
    Ok(verdict.outcome().exit_code())
}

fn cmd_presets() -> Result<u8> {
    for preset in PRESETS {
        let needs = if preset.uses_tool {
            " [needs --tool-command]"
        } else {
            ""
        };
        println!("{:<20} {}{needs}", preset.name, preset.summary);
        if let Some(reference) = preset.reference {
            println!("{:<20} see {reference}", "");
        }
    }
    Ok(0)
}

fn resolve_boundary(args: &BoundaryArgs, landmarks: Vec<String>) -> Result<Boundary> {
    let signal = ModeSignal::from_env(args.mode, &args.source_env, landmarks);
    let boundary = boundary::resolve(&signal)
        .with_context(|| format!("resolve sandbox boundary (mode {:?})", args.mode))?;
    Ok(boundary)
}

fn emit(report: &ScenarioReport<'_>, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("serialize report")?;
        println!("{text}");
    } else {
        print!("{}", render_text(report));
    }
    Ok(())
}
