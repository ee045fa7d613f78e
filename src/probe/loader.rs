//! Host module loader model and the two import strategies built on it.
//!
//! A module's identity is a `file:` URL. The loader realizes every module it
//! loads through the native canonicalization call unless the matching
//! preserve option is set, which is the behavior that walks symlinked
//! sandboxes back into the source tree.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use super::{Observation, ObservedPath, Origin, Probe, ProbeContext, Strategy};
use crate::util::{absolutize, normalize_lexically};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderOptions {
    /// Keep symlinked paths for imported modules.
    #[serde(default)]
    pub preserve_symlinks: bool,
    /// Keep the symlinked path of the entry module.
    #[serde(default)]
    pub preserve_symlinks_main: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bare specifier {0:?} cannot be resolved without a package map")]
    BareSpecifier(String),
    #[error("invalid specifier {specifier:?}: {source}")]
    InvalidSpecifier {
        specifier: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} is not a local file URL")]
    NotFileUrl(String),
    #[error("{} is not an absolute path", .0.display())]
    RelativePath(PathBuf),
    #[error("cannot find module {}", .0.display())]
    NotFound(PathBuf),
    #[error("canonicalize {}: {source}", path.display())]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    options: LoaderOptions,
}

impl ModuleLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// URL assigned to the entry module when it is started.
    pub fn main_url(&self, entry: &Path) -> Result<Url, LoadError> {
        let path = self.realize(entry, self.options.preserve_symlinks_main)?;
        file_url(&path)
    }

    /// Directory the entry module computes for itself.
    pub fn entry_dir(&self, entry: &Path) -> Result<PathBuf, LoadError> {
        self.main_url(entry).and_then(|url| module_dir(&url))
    }

    /// Resolve a statically declared dependency at link time.
    ///
    /// The specifier is joined onto the referrer's URL, so the dependency
    /// inherits wherever the referrer was realized.
    pub fn resolve_static(&self, referrer: &Url, specifier: &str) -> Result<Url, LoadError> {
        if !is_relative_specifier(specifier) {
            return Err(LoadError::BareSpecifier(specifier.to_string()));
        }
        let joined = referrer
            .join(specifier)
            .map_err(|source| LoadError::InvalidSpecifier {
                specifier: specifier.to_string(),
                source,
            })?;
        let path = file_path(&joined)?;
        let path = self.realize(&path, self.options.preserve_symlinks)?;
        file_url(&path)
    }

    /// Load a module by absolute path at runtime.
    pub fn import_dynamic(&self, target: &Path) -> Result<Url, LoadError> {
        let requested = file_url(target)?;
        let path = file_path(&requested)?;
        let path = self.realize(&path, self.options.preserve_symlinks)?;
        file_url(&path)
    }

    fn realize(&self, path: &Path, preserve: bool) -> Result<PathBuf, LoadError> {
        if !path.is_absolute() {
            return Err(LoadError::RelativePath(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        if preserve {
            return Ok(normalize_lexically(path));
        }
        fs::canonicalize(path).map_err(|source| LoadError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Directory of a module, derived from its URL the way module code derives it.
pub fn module_dir(url: &Url) -> Result<PathBuf, LoadError> {
    let file = file_path(url)?;
    Ok(file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.clone()))
}

fn is_relative_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

fn file_url(path: &Path) -> Result<Url, LoadError> {
    Url::from_file_path(path).map_err(|()| LoadError::RelativePath(path.to_path_buf()))
}

fn file_path(url: &Url) -> Result<PathBuf, LoadError> {
    if url.scheme() != "file" {
        return Err(LoadError::NotFileUrl(url.to_string()));
    }
    url.to_file_path()
        .map_err(|()| LoadError::NotFileUrl(url.to_string()))
}

fn unavailable(strategy: Strategy, label: &str, err: LoadError) -> Observation {
    Observation::unavailable(strategy, label, err.to_string())
}

fn observed(strategy: Strategy, label: &str, url: &Url) -> Observation {
    match file_path(url) {
        Ok(path) => Observation::Observed(ObservedPath::new(strategy, label, path, Origin::ModuleUrl)),
        Err(err) => unavailable(strategy, label, err),
    }
}

/// Paths the loader assigns to statically declared dependencies of the entry.
#[derive(Debug, Clone)]
pub struct StaticImportProbe {
    specifiers: Vec<String>,
}

impl StaticImportProbe {
    pub fn new(specifiers: Vec<String>) -> Self {
        Self { specifiers }
    }
}

impl Probe for StaticImportProbe {
    fn strategy(&self) -> Strategy {
        Strategy::StaticImport
    }

    fn probe(&self, context: &ProbeContext) -> Vec<Observation> {
        let strategy = self.strategy();
        let referrer = match context.loader.main_url(&context.entry) {
            Ok(url) => url,
            Err(err) => {
                let reason = format!("entry module failed to load: {err}");
                return self
                    .specifiers
                    .iter()
                    .map(|specifier| {
                        Observation::unavailable(strategy, specifier.as_str(), reason.as_str())
                    })
                    .collect();
            }
        };
        self.specifiers
            .iter()
            .map(|specifier| {
                match context.loader.resolve_static(&referrer, specifier) {
                    Ok(url) => {
                        tracing::debug!(%specifier, %url, "static import resolved");
                        observed(strategy, specifier, &url)
                    }
                    Err(err) => unavailable(strategy, specifier, err),
                }
            })
            .collect()
    }
}

/// Paths the loader assigns to modules imported programmatically at runtime.
///
/// Targets are built from the entry's own computed directory, then handed to
/// the loader as absolute paths.
#[derive(Debug, Clone)]
pub struct DynamicImportProbe {
    specifiers: Vec<String>,
}

impl DynamicImportProbe {
    pub fn new(specifiers: Vec<String>) -> Self {
        Self { specifiers }
    }
}

impl Probe for DynamicImportProbe {
    fn strategy(&self) -> Strategy {
        Strategy::DynamicImport
    }

    fn probe(&self, context: &ProbeContext) -> Vec<Observation> {
        let strategy = self.strategy();
        let referrer_dir = match context.loader.entry_dir(&context.entry) {
            Ok(dir) => dir,
            Err(err) => {
                let reason = format!("entry module failed to load: {err}");
                return self
                    .specifiers
                    .iter()
                    .map(|specifier| {
                        Observation::unavailable(strategy, specifier.as_str(), reason.as_str())
                    })
                    .collect();
            }
        };
        self.specifiers
            .iter()
            .map(|specifier| {
                let target = absolutize(Path::new(specifier), &referrer_dir);
                match context.loader.import_dynamic(&target) {
                    Ok(url) => {
                        tracing::debug!(target = %target.display(), %url, "dynamic import resolved");
                        observed(strategy, specifier, &url)
                    }
                    Err(err) => unavailable(strategy, specifier, err),
                }
            })
            .collect()
    }
}
