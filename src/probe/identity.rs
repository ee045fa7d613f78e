use super::loader::module_dir;
use super::{Observation, ObservedPath, Origin, Probe, ProbeContext, Strategy};

pub const MODULE_FILE_LABEL: &str = "module file";
pub const MODULE_DIR_LABEL: &str = "module dir";

/// The file and directory a running unit computes for itself from its module URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfIdentityProbe;

impl Probe for SelfIdentityProbe {
    fn strategy(&self) -> Strategy {
        Strategy::SelfIdentity
    }

    fn probe(&self, context: &ProbeContext) -> Vec<Observation> {
        let strategy = self.strategy();
        let url = match context.loader.main_url(&context.entry) {
            Ok(url) => url,
            Err(err) => {
                return vec![
                    Observation::unavailable(strategy, MODULE_FILE_LABEL, err.to_string()),
                    Observation::unavailable(strategy, MODULE_DIR_LABEL, err.to_string()),
                ]
            }
        };
        tracing::debug!(%url, "entry module identity");

        let file = match url.to_file_path() {
            Ok(file) => Observation::Observed(ObservedPath::new(
                strategy,
                MODULE_FILE_LABEL,
                file,
                Origin::ModuleUrl,
            )),
            Err(()) => Observation::unavailable(
                strategy,
                MODULE_FILE_LABEL,
                format!("{url} is not a local file URL"),
            ),
        };
        let dir = match module_dir(&url) {
            Ok(dir) => Observation::Observed(ObservedPath::new(
                strategy,
                MODULE_DIR_LABEL,
                dir,
                Origin::ModuleUrl,
            )),
            Err(err) => Observation::unavailable(strategy, MODULE_DIR_LABEL, err.to_string()),
        };
        vec![file, dir]
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::probe::{LoaderOptions, ModuleLoader};
    use crate::test_support::SymlinkSandbox;
    use std::path::PathBuf;

    fn paths(observations: &[Observation]) -> Vec<PathBuf> {
        observations
            .iter()
            .map(|observation| match observation {
                Observation::Observed(observed) => observed.path.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn reports_file_then_directory() {
        let sandbox = SymlinkSandbox::new();
        let context = ProbeContext {
            entry: sandbox.sandbox_file("entry.mjs"),
            prior: Vec::new(),
            loader: ModuleLoader::new(LoaderOptions {
                preserve_symlinks: false,
                preserve_symlinks_main: true,
            }),
        };
        let observations = SelfIdentityProbe.probe(&context);
        assert_eq!(
            paths(&observations),
            vec![sandbox.sandbox_file("entry.mjs"), sandbox.sandbox_dir()]
        );
    }

    #[test]
    fn escapes_when_entry_is_canonicalized() {
        let sandbox = SymlinkSandbox::new();
        let context = ProbeContext {
            entry: sandbox.sandbox_file("entry.mjs"),
            prior: Vec::new(),
            loader: ModuleLoader::default(),
        };
        let observations = SelfIdentityProbe.probe(&context);
        assert_eq!(
            paths(&observations),
            vec![sandbox.source_file("entry.mjs"), sandbox.source_dir()]
        );
    }

    #[test]
    fn missing_entry_is_unavailable() {
        let context = ProbeContext {
            entry: PathBuf::from("/nonexistent/sbv/entry.mjs"),
            prior: Vec::new(),
            loader: ModuleLoader::default(),
        };
        let observations = SelfIdentityProbe.probe(&context);
        assert_eq!(observations.len(), 2);
        assert!(observations
            .iter()
            .all(|observation| matches!(observation, Observation::Unavailable { .. })));
    }
}
