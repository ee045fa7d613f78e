//! Built-in scenarios for the failure modes seen in practice.
use std::path::PathBuf;

use super::config::{ChdirTarget, ProbeSpec, ProbeStep, ScenarioSpec, SCENARIO_SCHEMA_VERSION};
use crate::probe::{LoaderOptions, OracleTarget};

/// Inputs a preset needs from the command line.
#[derive(Debug, Clone, Default)]
pub struct PresetInputs {
    pub entry: PathBuf,
    pub loader: LoaderOptions,
    pub tool_command: Vec<String>,
    pub tool_preserve_symlinks: bool,
}

pub struct Preset {
    pub name: &'static str,
    pub summary: &'static str,
    pub reference: Option<&'static str>,
    /// Whether the preset drives an external tool and needs `--tool-command`.
    pub uses_tool: bool,
    probes: fn(&PresetInputs) -> Vec<ProbeStep>,
}

impl Preset {
    pub fn build(&self, inputs: &PresetInputs) -> ScenarioSpec {
        ScenarioSpec {
            schema_version: SCENARIO_SCHEMA_VERSION,
            name: self.name.to_string(),
            reference: self.reference.map(str::to_string),
            entry: inputs.entry.clone(),
            loader: inputs.loader,
            landmarks: Vec::new(),
            probes: (self.probes)(inputs),
        }
    }
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "dirname-escape",
        summary: "module directory derived from its URL, and the canonical cwd",
        reference: Some("https://github.com/aspect-build/rules_js/issues/1669"),
        uses_tool: false,
        probes: dirname_escape,
    },
    Preset {
        name: "esm-basic",
        summary: "static import of ./dep.mjs, cross-checked with realpath",
        reference: Some("https://github.com/aspect-build/rules_js/issues/362"),
        uses_tool: false,
        probes: esm_basic,
    },
    Preset {
        name: "esm-dynamic-import",
        summary: "runtime import of plugin.mjs next to the entry, cross-checked with realpath",
        reference: Some("https://github.com/aspect-build/rules_js/issues/353"),
        uses_tool: false,
        probes: esm_dynamic_import,
    },
    Preset {
        name: "vite-dev",
        summary: "dev-server root from the canonical cwd and the config directory",
        reference: Some("https://github.com/aspect-build/rules_js/issues/1669"),
        uses_tool: false,
        probes: vite_dev,
    },
    Preset {
        name: "vitest",
        summary: "test runner started from the entry directory",
        reference: Some("https://github.com/aspect-build/rules_js/issues/979"),
        uses_tool: true,
        probes: vitest,
    },
    Preset {
        name: "esbuild-resolve",
        summary: "bundler load paths reported by its load hook",
        reference: None,
        uses_tool: true,
        probes: esbuild_resolve,
    },
];

pub fn find_preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.name == name)
}

fn dirname_escape(_inputs: &PresetInputs) -> Vec<ProbeStep> {
    vec![
        ProbeStep::new(ProbeSpec::SelfIdentity),
        ProbeStep::new(ProbeSpec::CwdCanonicalize),
    ]
}

fn esm_basic(_inputs: &PresetInputs) -> Vec<ProbeStep> {
    vec![
        ProbeStep::new(ProbeSpec::SelfIdentity),
        ProbeStep::new(ProbeSpec::StaticImport {
            specifiers: vec!["./dep.mjs".to_string()],
        }),
        ProbeStep::new(ProbeSpec::ShellOracle {
            program: None,
            targets: vec![OracleTarget::Cwd, OracleTarget::Observed],
            timeout_seconds: None,
        }),
    ]
}

fn esm_dynamic_import(_inputs: &PresetInputs) -> Vec<ProbeStep> {
    vec![
        ProbeStep::new(ProbeSpec::SelfIdentity),
        ProbeStep::new(ProbeSpec::DynamicImport {
            specifiers: vec!["plugin.mjs".to_string()],
        }),
        ProbeStep::new(ProbeSpec::ShellOracle {
            program: None,
            targets: vec![OracleTarget::Observed],
            timeout_seconds: None,
        }),
    ]
}

fn vite_dev(_inputs: &PresetInputs) -> Vec<ProbeStep> {
    vec![
        ProbeStep::new(ProbeSpec::CwdCanonicalize),
        ProbeStep::new(ProbeSpec::SelfIdentity),
    ]
}

fn vitest(inputs: &PresetInputs) -> Vec<ProbeStep> {
    vec![
        ProbeStep::new(ProbeSpec::SelfIdentity),
        ProbeStep::new(ProbeSpec::CwdCanonicalize),
        ProbeStep::new(tool_probe(inputs, None, Vec::new())).in_dir(ChdirTarget::EntryDir),
    ]
}

fn esbuild_resolve(inputs: &PresetInputs) -> Vec<ProbeStep> {
    vec![ProbeStep::new(tool_probe(
        inputs,
        Some(r"\.(js|mjs|ts)$"),
        vec!["--preserve-symlinks".to_string()],
    ))]
}

fn tool_probe(
    inputs: &PresetInputs,
    filter: Option<&str>,
    preserve_symlinks_args: Vec<String>,
) -> ProbeSpec {
    ProbeSpec::ExternalTool {
        command: inputs.tool_command.clone(),
        report_prefix: None,
        filter: filter.map(str::to_string),
        preserve_symlinks: inputs.tool_preserve_symlinks,
        preserve_symlinks_args,
        timeout_seconds: None,
    }
}
