//! Human-readable and JSON rendering of a scenario verdict.
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::boundary::{Boundary, ExecutionMode};
use crate::classify::{Classification, ClassificationStatus};
use crate::verdict::ScenarioVerdict;

#[derive(Debug, Serialize)]
pub struct ScenarioReport<'a> {
    pub scenario: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<&'a str>,
    pub mode: ExecutionMode,
    pub boundary: &'a Boundary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<&'a Path>,
    pub outcome: String,
    pub verdict: &'a ScenarioVerdict,
}

impl<'a> ScenarioReport<'a> {
    pub fn new(scenario: &'a str, boundary: &'a Boundary, verdict: &'a ScenarioVerdict) -> Self {
        Self {
            scenario,
            reference: None,
            mode: boundary.mode(),
            boundary,
            entry: None,
            outcome: verdict.outcome().to_string(),
            verdict,
        }
    }

    pub fn with_reference(mut self, reference: Option<&'a str>) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_entry(mut self, entry: &'a Path) -> Self {
        self.entry = Some(entry);
        self
    }
}

pub fn render_text(report: &ScenarioReport<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", report.scenario);
    let _ = writeln!(out, "mode:     {}", report.mode);
    let _ = writeln!(out, "boundary: {}", report.boundary);
    if let Some(entry) = report.entry {
        let _ = writeln!(out, "entry:    {}", entry.display());
    }
    out.push('\n');

    for classification in report.verdict.evidence() {
        render_entry(&mut out, classification);
    }

    let (escaped, contained, indeterminate) = report.verdict.counts();
    out.push('\n');
    let _ = writeln!(
        out,
        "RESULT: {} ({escaped} escaped, {contained} contained, {indeterminate} indeterminate)",
        report.verdict.outcome()
    );
    if report.verdict.has_warnings() {
        let unobserved: Vec<String> = report
            .verdict
            .warnings()
            .map(|entry| format!("{}/{}", entry.strategy, entry.label))
            .collect();
        let _ = writeln!(out, "WARNING: could not observe {}", unobserved.join(", "));
    }
    if let Some(reference) = report.reference {
        let _ = writeln!(out, "See: {reference}");
    }
    out
}

fn render_entry(out: &mut String, classification: &Classification) {
    let tag = match classification.status {
        ClassificationStatus::Contained => "CONTAINED",
        ClassificationStatus::Escaped => "ESCAPED",
        ClassificationStatus::Indeterminate => "WARNING",
    };
    let detail = match (&classification.path, classification.status) {
        (_, ClassificationStatus::Indeterminate) | (None, _) => {
            format!("indeterminate: {}", classification.evidence)
        }
        (Some(path), _) => path.display().to_string(),
    };
    let _ = writeln!(
        out,
        "  {tag:<10} {:<17} {:<14} {detail}",
        classification.strategy.as_str(),
        classification.label
    );
    if classification.is_escaped() {
        let _ = writeln!(out, "{:13}{}", "", classification.evidence);
    }
    if let Some(note) = &classification.note {
        let _ = writeln!(out, "{:13}note: {note}", "");
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value).context("serialize report")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::probe::{Observation, ObservedPath, Origin, Strategy};
    use crate::verdict::aggregate;
    use std::path::PathBuf;

    fn verdict(boundary: &Boundary) -> ScenarioVerdict {
        let observations = [
            Observation::Observed(ObservedPath::new(
                Strategy::SelfIdentity,
                "module file",
                PathBuf::from("/home/user/src/proj/entry.mjs"),
                Origin::ModuleUrl,
            )),
            Observation::Observed(ObservedPath::new(
                Strategy::CwdCanonicalize,
                "cwd",
                PathBuf::from("/sandbox/proj"),
                Origin::OsCanonicalize,
            )),
            Observation::unavailable(Strategy::ShellOracle, "realpath cwd", "exit code 1"),
        ];
        aggregate(
            observations
                .iter()
                .map(|observation| classify(boundary, observation).unwrap())
                .collect(),
        )
    }

    #[test]
    fn text_report_lists_escapes_with_evidence_and_warnings() {
        let boundary = Boundary::source_tree(Path::new("/home/user/src")).unwrap();
        let verdict = verdict(&boundary);
        let entry = PathBuf::from("/sandbox/proj/entry.mjs");
        let report = ScenarioReport::new("dirname-escape", &boundary, &verdict)
            .with_reference(Some("https://example.invalid/1669"))
            .with_entry(&entry);
        let text = render_text(&report);

        assert!(text.contains("=== dirname-escape ==="));
        assert!(text.contains("mode:     run"));
        assert!(text.contains("ESCAPED    self_identity"));
        assert!(text.contains("inside source tree /home/user/src"));
        assert!(text.contains("WARNING    shell_oracle"));
        assert!(text.contains("CONTAINED  cwd_canonicalize"));
        assert!(text.contains("RESULT: BUG_REPRODUCED (1 escaped, 1 contained, 1 indeterminate)"));
        assert!(text.contains("WARNING: could not observe shell_oracle/realpath cwd"));
        assert!(text.contains("See: https://example.invalid/1669"));

        let escaped_at = text.find("ESCAPED").unwrap();
        let ok_at = text.find("CONTAINED ").unwrap();
        assert!(escaped_at < ok_at, "entries keep probe order");
    }

    #[test]
    fn json_report_round_trips_key_fields() {
        let boundary = Boundary::landmarks([".runfiles/"]).unwrap();
        let verdict = verdict(&boundary);
        let report = ScenarioReport::new("x", &boundary, &verdict);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["mode"], "test");
        assert_eq!(value["outcome"], "BUG_REPRODUCED");
        assert_eq!(value["boundary"]["landmarks"][0], ".runfiles/");
        assert_eq!(value["verdict"]["evidence"][0]["status"], "ESCAPED");
        assert_eq!(value["verdict"]["evidence"][2]["status"], "INDETERMINATE");
        assert!(value.get("reference").is_none());
    }

    #[test]
    fn oracle_disagreement_is_rendered_as_a_note() {
        let boundary = Boundary::source_tree(Path::new("/home/user/src")).unwrap();
        let observation = Observation::Observed(
            ObservedPath::new(
                Strategy::ShellOracle,
                "realpath self_identity:module file",
                PathBuf::from("/sandbox/proj/entry.mjs"),
                Origin::ModuleUrl,
            )
            .with_note("realpath resolves to /home/user/src/proj/entry.mjs"),
        );
        let verdict = aggregate(vec![classify(&boundary, &observation).unwrap()]);
        let report = ScenarioReport::new("esm-basic", &boundary, &verdict);

        let text = render_text(&report);
        assert!(text.contains("CONTAINED  shell_oracle"));
        assert!(text.contains("note: realpath resolves to /home/user/src/proj/entry.mjs"));
        assert!(text.contains("RESULT: NO_ESCAPE"));

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value["verdict"]["evidence"][0]["note"],
            "realpath resolves to /home/user/src/proj/entry.mjs"
        );
    }

    #[test]
    fn write_json_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.json");
        write_json(&path, &serde_json::json!({ "ok": true })).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"ok\": true"));
    }
}
