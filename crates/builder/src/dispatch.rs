//! Subpackage dispatcher
//!
//! One configuration fans out into `n + 1` emission jobs: the origin
//! package, modeled as a synthetic subpackage so every job looks the
//! same, followed by each declared subpackage in order.

use std::sync::Arc;

use apkforge_errors::{BuildError, Error, Result};
use apkforge_events::EventEmitter;
use apkforge_types::{Dependencies, Subpackage};

use crate::context::BuildContext;
use crate::package::PackageBuild;

/// Construct the emission jobs for a context, origin first.
#[must_use]
pub fn package_jobs(build: &Arc<BuildContext>) -> Vec<PackageBuild> {
    let origin = Subpackage::from(&build.configuration.package);
    std::iter::once(&origin)
        .chain(build.configuration.subpackages.iter())
        .map(|subpackage| PackageBuild::new(Arc::clone(build), subpackage))
        .collect()
}

/// Emit every package of the configuration.
///
/// Jobs run sequentially. By default the first failed job stops the run;
/// with `keep_going` set, failures are reported as warnings and the
/// remaining jobs still execute, with the run failing at the end.
///
/// # Errors
///
/// Returns the first fatal error, or a summary error when `keep_going`
/// swallowed individual failures.
pub async fn emit_packages(build: &Arc<BuildContext>) -> Result<()> {
    validate_declared_dependencies(build)?;

    let mut failed: Vec<String> = Vec::new();
    for job in package_jobs(build) {
        let identity = job.identity();
        match job.emit().await {
            Ok(()) => {}
            Err(err) if build.keep_going => {
                build.emit_warning(format!("emission of {identity} failed: {err}"));
                failed.push(identity);
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(first) = failed.first() {
        return Err(BuildError::EmissionFailed {
            identity: first.clone(),
            message: format!("{} of {} jobs failed", failed.len(), 1 + build.configuration.subpackages.len()),
        }
        .into());
    }

    Ok(())
}

/// Declared dependency entries are opaque names, but they end up on
/// whitespace-sensitive `.PKGINFO` lines; reject anything that could not
/// round-trip through the installer.
fn validate_declared_dependencies(build: &Arc<BuildContext>) -> Result<()> {
    let origin = Subpackage::from(&build.configuration.package);
    for subpackage in std::iter::once(&origin).chain(build.configuration.subpackages.iter()) {
        validate_set(&subpackage.dependencies)?;
    }
    Ok(())
}

fn validate_set(dependencies: &Dependencies) -> Result<()> {
    for entry in dependencies
        .runtime
        .iter()
        .chain(&dependencies.provides)
        .chain(&dependencies.replaces)
    {
        if entry.trim().is_empty() || entry.chars().any(char::is_whitespace) {
            return Err(Error::from(BuildError::MalformedDependency {
                entry: entry.clone(),
            }));
        }
    }
    Ok(())
}
