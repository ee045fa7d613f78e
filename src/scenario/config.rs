//! Scenario file schema, loading, and validation.
//!
//! A scenario declares its probes in the order they must run; nothing here
//! reorders them.
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::probe::{LoaderOptions, OracleTarget, DEFAULT_TIMEOUT};
use crate::util::absolutize;

pub const SCENARIO_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    pub name: String,
    /// Issue or document describing the failure mode, printed with the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// The sandboxed entry unit as it is invoked.
    pub entry: PathBuf,
    #[serde(default)]
    pub loader: LoaderOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<String>,
    pub probes: Vec<ProbeStep>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProbeStep {
    pub probe: ProbeSpec,
    /// Working directory to hold for the duration of this probe only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chdir: Option<ChdirTarget>,
}

impl ProbeStep {
    pub fn new(probe: ProbeSpec) -> Self {
        Self { probe, chdir: None }
    }

    pub fn in_dir(mut self, chdir: ChdirTarget) -> Self {
        self.chdir = Some(chdir);
        self
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChdirTarget {
    /// The directory the entry module computes for itself.
    EntryDir,
    Path(PathBuf),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProbeSpec {
    SelfIdentity,
    CwdCanonicalize,
    StaticImport {
        specifiers: Vec<String>,
    },
    DynamicImport {
        specifiers: Vec<String>,
    },
    ExternalTool {
        command: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        report_prefix: Option<String>,
        /// Regex a reported path must match to be kept.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
        /// Turn on the tool's own boundary-preserving option.
        #[serde(default)]
        preserve_symlinks: bool,
        /// Arguments that enable that option.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        preserve_symlinks_args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_seconds: Option<f64>,
    },
    ShellOracle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        program: Option<String>,
        targets: Vec<OracleTarget>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_seconds: Option<f64>,
    },
}

/// Load a scenario file, make its paths absolute against `base`, and validate it.
pub fn load_scenario(path: &Path, base: &Path) -> Result<ScenarioSpec> {
    let bytes = fs::read(path).with_context(|| format!("read scenario {}", path.display()))?;
    let mut spec: ScenarioSpec = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse scenario JSON {}", path.display()))?;
    anchor_paths(&mut spec, base);
    validate_scenario(&spec).with_context(|| format!("validate scenario {}", path.display()))?;
    Ok(spec)
}

/// Make every path in the scenario absolute without resolving symlinks.
pub fn anchor_paths(spec: &mut ScenarioSpec, base: &Path) {
    spec.entry = absolutize(&spec.entry, base);
    for step in &mut spec.probes {
        if let Some(ChdirTarget::Path(path)) = &mut step.chdir {
            *path = absolutize(path, base);
        }
        if let ProbeSpec::ShellOracle { targets, .. } = &mut step.probe {
            for target in targets {
                if let OracleTarget::Path(path) = target {
                    *path = absolutize(path, base);
                }
            }
        }
    }
}

pub fn validate_scenario(spec: &ScenarioSpec) -> Result<()> {
    if spec.schema_version != SCENARIO_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported scenario schema_version {}",
            spec.schema_version
        ));
    }
    if spec.name.trim().is_empty() {
        return Err(anyhow!("name must be non-empty"));
    }
    if spec.entry.as_os_str().is_empty() {
        return Err(anyhow!("entry must be non-empty"));
    }
    if spec.landmarks.iter().any(|landmark| landmark.trim().is_empty()) {
        return Err(anyhow!("landmarks must be non-empty strings"));
    }
    if spec.probes.is_empty() {
        return Err(anyhow!("probes must list at least one probe"));
    }
    for (idx, step) in spec.probes.iter().enumerate() {
        validate_probe(&step.probe).with_context(|| format!("probes[{idx}]"))?;
    }
    Ok(())
}

fn validate_probe(probe: &ProbeSpec) -> Result<()> {
    match probe {
        ProbeSpec::SelfIdentity | ProbeSpec::CwdCanonicalize => Ok(()),
        ProbeSpec::StaticImport { specifiers } | ProbeSpec::DynamicImport { specifiers } => {
            if specifiers.is_empty() {
                return Err(anyhow!("specifiers must list at least one module"));
            }
            if specifiers.iter().any(|specifier| specifier.trim().is_empty()) {
                return Err(anyhow!("specifiers must be non-empty strings"));
            }
            Ok(())
        }
        ProbeSpec::ExternalTool {
            report_prefix,
            filter,
            timeout_seconds,
            ..
        } => {
            if let Some(prefix) = report_prefix {
                if prefix.is_empty() {
                    return Err(anyhow!("report_prefix must be non-empty"));
                }
            }
            compile_filter(filter.as_deref())?;
            timeout(*timeout_seconds)?;
            Ok(())
        }
        ProbeSpec::ShellOracle {
            program,
            targets,
            timeout_seconds,
        } => {
            if let Some(program) = program {
                if program.trim().is_empty() {
                    return Err(anyhow!("program must be non-empty"));
                }
            }
            if targets.is_empty() {
                return Err(anyhow!("targets must list at least one path"));
            }
            timeout(*timeout_seconds)?;
            Ok(())
        }
    }
}

pub(crate) fn compile_filter(filter: Option<&str>) -> Result<Option<Regex>> {
    filter
        .map(|pattern| Regex::new(pattern).with_context(|| format!("compile filter {pattern:?}")))
        .transpose()
}

pub(crate) fn timeout(timeout_seconds: Option<f64>) -> Result<Duration> {
    match timeout_seconds {
        None => Ok(DEFAULT_TIMEOUT),
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
            Duration::try_from_secs_f64(seconds)
                .map_err(|err| anyhow!("timeout_seconds {seconds} is out of range: {err}"))
        }
        Some(seconds) => Err(anyhow!("timeout_seconds must be > 0 (got {seconds})")),
    }
}
