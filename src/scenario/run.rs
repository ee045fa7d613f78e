//! Sequential scenario execution.
//!
//! Probes run in declaration order on the calling thread. A probe that asks
//! for a working-directory change gets it for its own duration only.
use anyhow::{Context, Result};
use std::path::PathBuf;

use super::config::{compile_filter, timeout, ChdirTarget, ProbeSpec, ProbeStep, ScenarioSpec};
use crate::boundary::Boundary;
use crate::classify::classify;
use crate::error::VerifierResult;
use crate::probe::{
    CommandTool, CwdProbe, DynamicImportProbe, ExternalToolProbe, ModuleLoader, Observation,
    Probe, ProbeContext, ScopedCwd, SelfIdentityProbe, ShellOracleProbe, StaticImportProbe,
    DEFAULT_ORACLE_PROGRAM, DEFAULT_REPORT_PREFIX,
};
use crate::verdict::{aggregate, ScenarioVerdict};

/// A probe ready to run, with the directory it must run in.
pub struct PlannedProbe {
    pub probe: Box<dyn Probe>,
    pub chdir: Option<ChdirTarget>,
}

/// Instantiate every probe of the scenario before any of them runs.
pub fn plan_probes(spec: &ScenarioSpec) -> Result<Vec<PlannedProbe>> {
    spec.probes
        .iter()
        .enumerate()
        .map(|(idx, step)| plan_probe(step).with_context(|| format!("plan probes[{idx}]")))
        .collect()
}

fn plan_probe(step: &ProbeStep) -> Result<PlannedProbe> {
    let probe: Box<dyn Probe> = match &step.probe {
        ProbeSpec::SelfIdentity => Box::new(SelfIdentityProbe),
        ProbeSpec::CwdCanonicalize => Box::new(CwdProbe),
        ProbeSpec::StaticImport { specifiers } => {
            Box::new(StaticImportProbe::new(specifiers.clone()))
        }
        ProbeSpec::DynamicImport { specifiers } => {
            Box::new(DynamicImportProbe::new(specifiers.clone()))
        }
        ProbeSpec::ExternalTool {
            command,
            report_prefix,
            filter,
            preserve_symlinks,
            preserve_symlinks_args,
            timeout_seconds,
        } => {
            let mut argv = command.clone();
            if *preserve_symlinks {
                argv.extend(preserve_symlinks_args.iter().cloned());
            }
            let tool = CommandTool::new(
                argv,
                report_prefix.as_deref().unwrap_or(DEFAULT_REPORT_PREFIX),
                timeout(*timeout_seconds)?,
            );
            Box::new(ExternalToolProbe::new(
                Box::new(tool),
                compile_filter(filter.as_deref())?,
            ))
        }
        ProbeSpec::ShellOracle {
            program,
            targets,
            timeout_seconds,
        } => Box::new(ShellOracleProbe::new(
            program.as_deref().unwrap_or(DEFAULT_ORACLE_PROGRAM),
            targets.clone(),
            timeout(*timeout_seconds)?,
        )),
    };
    Ok(PlannedProbe {
        probe,
        chdir: step.chdir.clone(),
    })
}

/// Run planned probes in order and classify every observation.
///
/// Only a fatal classification error stops the run; probe failures have
/// already been folded into indeterminate observations. Each probe sees the
/// paths observed by the probes before it.
pub fn run_probes(
    planned: &[PlannedProbe],
    context: &ProbeContext,
    boundary: &Boundary,
) -> VerifierResult<ScenarioVerdict> {
    let mut context = context.clone();
    let mut classifications = Vec::new();
    for (idx, step) in planned.iter().enumerate() {
        let strategy = step.probe.strategy();
        let _span = tracing::debug_span!("probe", idx, %strategy).entered();
        let observations = match &step.chdir {
            Some(target) => run_in_dir(step.probe.as_ref(), target, &context),
            None => step.probe.probe(&context),
        };
        for observation in &observations {
            let classification = classify(boundary, observation)?;
            tracing::debug!(
                label = %classification.label,
                status = %classification.status,
                evidence = %classification.evidence,
                "classified"
            );
            classifications.push(classification);
        }
        context
            .prior
            .extend(observations.iter().filter_map(Observation::observed).cloned());
    }
    Ok(aggregate(classifications))
}

fn run_in_dir(probe: &dyn Probe, target: &ChdirTarget, context: &ProbeContext) -> Vec<Observation> {
    let strategy = probe.strategy();
    let dir = match resolve_chdir(target, context) {
        Ok(dir) => dir,
        Err(reason) => return vec![Observation::unavailable(strategy, "chdir", reason)],
    };
    let scope = match ScopedCwd::enter(&dir) {
        Ok(scope) => scope,
        Err(err) => return vec![Observation::from_error(strategy, "chdir", &err)],
    };
    tracing::info!(
        dir = %dir.display(),
        restore_to = %scope.original().display(),
        "running probe in scoped working directory"
    );
    probe.probe(context)
}

fn resolve_chdir(target: &ChdirTarget, context: &ProbeContext) -> Result<PathBuf, String> {
    match target {
        ChdirTarget::EntryDir => context
            .loader
            .entry_dir(&context.entry)
            .map_err(|err| format!("entry directory unavailable: {err}")),
        ChdirTarget::Path(path) => Ok(path.clone()),
    }
}

/// Plan, run, and aggregate one scenario.
pub fn run_scenario(spec: &ScenarioSpec, boundary: &Boundary) -> Result<ScenarioVerdict> {
    let _span = tracing::info_span!("scenario", name = %spec.name).entered();
    let planned = plan_probes(spec)?;
    let loader = ModuleLoader::new(spec.loader);
    tracing::debug!(
        entry = %spec.entry.display(),
        preserve_symlinks = loader.options().preserve_symlinks,
        preserve_symlinks_main = loader.options().preserve_symlinks_main,
        probes = planned.len(),
        "starting scenario"
    );
    let context = ProbeContext {
        entry: spec.entry.clone(),
        prior: Vec::new(),
        loader,
    };
    let verdict = run_probes(&planned, &context, boundary)?;
    for entry in verdict.offending() {
        tracing::info!(
            strategy = %entry.strategy,
            label = %entry.label,
            evidence = %entry.evidence,
            "escape"
        );
    }
    tracing::info!(outcome = %verdict.outcome(), "scenario finished");
    Ok(verdict)
}


#[cfg(all(test, unix))]
mod sandbox_tests {
    use super::*;
    use crate::boundary::Boundary;
    use crate::probe::{LoaderOptions, Strategy};
    use crate::scenario::{find_preset, PresetInputs};
    use crate::test_support::{lock_cwd, SymlinkSandbox};
    use crate::verdict::Outcome;
    use std::env;

    fn spec(sandbox: &SymlinkSandbox, preset: &str, loader: LoaderOptions) -> ScenarioSpec {
        find_preset(preset).unwrap().build(&PresetInputs {
            entry: sandbox.sandbox_file("entry.mjs"),
            loader,
            ..PresetInputs::default()
        })
    }

    #[test]
    fn symlinked_sandbox_escapes_without_preserve_options() {
        let _lock = lock_cwd();
        let sandbox = SymlinkSandbox::new();
        let boundary = Boundary::source_tree(&sandbox.source_root()).unwrap();
        let spec = spec(&sandbox, "esm-dynamic-import", LoaderOptions::default());
        let verdict = run_scenario(&spec, &boundary).unwrap();
        assert_eq!(verdict.outcome(), Outcome::BugReproduced);
        assert!(verdict
            .offending()
            .any(|entry| entry.strategy == Strategy::DynamicImport));
    }

    #[test]
    fn preserved_symlinks_stay_contained_in_both_modes() {
        let _lock = lock_cwd();
        let sandbox = SymlinkSandbox::new();
        let preserve = LoaderOptions {
            preserve_symlinks: true,
            preserve_symlinks_main: true,
        };
        let spec = spec(&sandbox, "esm-dynamic-import", preserve);

        let run = Boundary::source_tree(&sandbox.source_root()).unwrap();
        assert_eq!(run_scenario(&spec, &run).unwrap().outcome(), Outcome::NoEscape);

        let test = Boundary::landmarks([".runfiles/"]).unwrap();
        assert_eq!(run_scenario(&spec, &test).unwrap().outcome(), Outcome::NoEscape);
    }

    #[test]
    fn entry_dir_chdir_is_restored_after_probe() {
        let _lock = lock_cwd();
        let sandbox = SymlinkSandbox::new();
        let before = env::current_dir().unwrap();
        let mut spec = spec(&sandbox, "dirname-escape", LoaderOptions::default());
        spec.probes[1].chdir = Some(ChdirTarget::EntryDir);

        let boundary = Boundary::source_tree(&sandbox.source_root()).unwrap();
        let verdict = run_scenario(&spec, &boundary).unwrap();
        assert_eq!(env::current_dir().unwrap(), before);

        // The entry escaped, so its directory, and the cwd taken there, are in the source tree.
        let cwd_entry = verdict
            .evidence()
            .iter()
            .find(|entry| entry.strategy == Strategy::CwdCanonicalize)
            .unwrap();
        assert!(cwd_entry.is_escaped());
        assert_eq!(cwd_entry.path.as_deref(), Some(sandbox.source_dir().as_path()));
    }
}
