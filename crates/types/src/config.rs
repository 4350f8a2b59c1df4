//! Resolved build configuration
//!
//! These types mirror the `package` and `subpackages` sections of a build
//! definition document. Loading (YAML parsing, templating, validation of
//! the outer document) happens in the caller; the emission core consumes
//! the resolved form only.

use serde::{Deserialize, Serialize};

/// Origin package metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub copyright: Vec<Copyright>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub options: PackageOptions,
    #[serde(default)]
    pub scriptlets: Scriptlets,
}

impl Package {
    /// The `{version}-r{epoch}` string used in identities, `pkgver`, and
    /// generated `cmd:` providers.
    #[must_use]
    pub fn full_version(&self) -> String {
        format!("{}-r{}", self.version, self.epoch)
    }
}

/// One copyright declaration; a package may carry several
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Copyright {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub attestation: String,
    pub license: String,
}

/// Declared and generated dependency sets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Names this package needs at runtime
    #[serde(default)]
    pub runtime: Vec<String>,
    /// Capability names this package exports
    #[serde(default)]
    pub provides: Vec<String>,
    /// Names this package supersedes
    #[serde(default)]
    pub replaces: Vec<String>,
    /// Tie-break priority among providers of the same capability
    #[serde(default, rename = "provider-priority")]
    pub provider_priority: u64,
}

/// Switches that disable individual dependency scanners
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PackageOptions {
    #[serde(default, rename = "no-commands")]
    pub no_commands: bool,
    #[serde(default, rename = "no-depends")]
    pub no_depends: bool,
    #[serde(default, rename = "no-provides")]
    pub no_provides: bool,
}

/// Scripts executed by the package manager at install/upgrade/remove time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scriptlets {
    #[serde(default)]
    pub trigger: TriggerScriptlet,
    #[serde(default, rename = "pre-install")]
    pub pre_install: String,
    #[serde(default, rename = "post-install")]
    pub post_install: String,
    #[serde(default, rename = "pre-deinstall")]
    pub pre_deinstall: String,
    #[serde(default, rename = "post-deinstall")]
    pub post_deinstall: String,
    #[serde(default, rename = "pre-upgrade")]
    pub pre_upgrade: String,
    #[serde(default, rename = "post-upgrade")]
    pub post_upgrade: String,
}

/// Trigger script plus the path globs that activate it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerScriptlet {
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// A derived package sharing the origin's version and epoch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subpackage {
    pub name: String,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub options: PackageOptions,
    #[serde(default)]
    pub scriptlets: Scriptlets,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub commit: String,
}

/// The origin package viewed as a subpackage, so the dispatcher can treat
/// all emission jobs uniformly.
impl From<&Package> for Subpackage {
    fn from(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            dependencies: package.dependencies.clone(),
            options: package.options,
            scriptlets: package.scriptlets.clone(),
            description: package.description.clone(),
            url: package.url.clone(),
            commit: package.commit.clone(),
        }
    }
}

/// The slice of a resolved build document the emission core consumes.
///
/// The outer document also carries `environment` and `pipeline` sections;
/// those belong to the pipeline executor and are not modeled here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub package: Package,
    #[serde(default)]
    pub subpackages: Vec<Subpackage>,
}
