//! One package emission job and its assembler
//!
//! A [`PackageBuild`] carries the per-job copies of the configuration
//! (the origin package and every subpackage each get one) plus the two
//! values computed during emission: the installed size and the data-hash.
//! `emit` runs the whole pipeline for one job: scan dependencies, walk
//! the size, produce the data section, render and (optionally) sign the
//! control section, then concatenate the gzip members into the final
//! `.apk`.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use apkforge_errors::{BuildError, Error, Result};
use apkforge_events::{Event, EventEmitter, EventSender};
use apkforge_types::{Dependencies, Package, PackageOptions, Scriptlets, Subpackage};

use crate::context::BuildContext;
use crate::fsview::{TreeView, WorkspaceView};
use crate::sign::{ApkSigner, EphemeralSigner, KeySigner};
use crate::{control, data, deps, sign};

/// Name of the workspace subtree that holds staged package contents.
///
/// This path shape is the contract with the pipeline executor that
/// populates the workspace; it is shared with every other tool consuming
/// such workspaces and is not renameable per-build.
pub(crate) const WORKSPACE_OUT_DIR: &str = "melange-out";

/// One package emission job
#[derive(Debug, Clone)]
pub struct PackageBuild {
    pub(crate) build: Arc<BuildContext>,
    pub package_name: String,
    pub origin_name: String,
    pub installed_size: u64,
    pub data_hash: String,
    pub arch: String,
    pub dependencies: Dependencies,
    pub options: PackageOptions,
    pub scriptlets: Scriptlets,
    pub description: String,
    pub url: String,
    pub commit: String,
}

impl EventEmitter for PackageBuild {
    fn event_sender(&self) -> Option<&EventSender> {
        self.build.event_sender.as_ref()
    }
}

impl PackageBuild {
    /// Build a job for one (possibly synthetic) subpackage
    #[must_use]
    pub fn new(build: Arc<BuildContext>, subpackage: &Subpackage) -> Self {
        let origin_name = if build.strip_origin_name {
            subpackage.name.clone()
        } else {
            build.configuration.package.name.clone()
        };
        let arch = build.arch.clone();
        Self {
            package_name: subpackage.name.clone(),
            origin_name,
            installed_size: 0,
            data_hash: String::new(),
            arch,
            dependencies: subpackage.dependencies.clone(),
            options: subpackage.options,
            scriptlets: subpackage.scriptlets.clone(),
            description: subpackage.description.clone(),
            url: subpackage.url.clone(),
            commit: subpackage.commit.clone(),
            build,
        }
    }

    /// The origin package this job derives from
    #[must_use]
    pub fn origin(&self) -> &Package {
        &self.build.configuration.package
    }

    /// `{version}-r{epoch}` of the shared origin
    #[must_use]
    pub fn full_version(&self) -> String {
        self.origin().full_version()
    }

    /// `{package-name}-{version}-r{epoch}`, unique within one build
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}-{}", self.package_name, self.full_version())
    }

    /// Final output path: `{out-dir}/{arch}/{identity}.apk`
    #[must_use]
    pub fn filename(&self) -> PathBuf {
        self.build
            .out_dir
            .join(&self.arch)
            .join(format!("{}.apk", self.identity()))
    }

    /// The staged tree this job packages
    #[must_use]
    pub fn workspace_subdir(&self) -> PathBuf {
        self.build
            .workspace_dir
            .join(WORKSPACE_OUT_DIR)
            .join(&self.package_name)
    }

    fn want_signature(&self) -> bool {
        self.build.signing_key.is_some()
    }

    /// The signer selected by this build's configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the ephemeral fallback identity cannot be
    /// generated.
    pub fn signer(&self) -> Result<Box<dyn ApkSigner>> {
        match &self.build.signing_key {
            Some(key) => Ok(Box::new(KeySigner::new(
                key.clone(),
                self.build.signing_passphrase.clone(),
            ))),
            None => Ok(Box::new(EphemeralSigner::generate()?)),
        }
    }

    /// Emit this job's `.apk`.
    ///
    /// The whole pipeline is filesystem- and CPU-bound, so it runs on the
    /// blocking pool in one piece.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the pipeline; non-fatal scanner
    /// problems surface as warning events instead.
    pub async fn emit(mut self) -> Result<()> {
        tokio::task::spawn_blocking(move || self.emit_blocking())
            .await
            .map_err(|e| Error::internal(format!("package emission task failed: {e}")))?
    }

    fn emit_blocking(&mut self) -> Result<()> {
        let cancel = self.build.cancel.clone();
        let subdir = self.workspace_subdir();
        fs::create_dir_all(&subdir).map_err(|e| BuildError::Workspace {
            path: subdir.display().to_string(),
            message: e.to_string(),
        })?;

        self.emit_event(Event::PackageStarting {
            identity: self.identity(),
        });

        let view = WorkspaceView::new(&subdir);

        // so:/cmd:/pc: virtuals for the staged tree
        deps::generate_dependencies(self)?;

        self.installed_size = view.entries(&cancel)?.iter().map(|e| e.size).sum();
        self.emit_event(Event::InstalledSize {
            package: self.package_name.clone(),
            bytes: self.installed_size,
        });

        // The data section lands in an unlinked temp file that is rewound
        // for concatenation and vanishes when the handle drops.
        let data_file = tempfile::tempfile()?;
        self.data_hash =
            data::emit_data_section(&view, self.build.source_date_epoch, &data_file, &cancel)?;
        self.emit_event(Event::DataDigest {
            package: self.package_name.clone(),
            digest: self.data_hash.clone(),
        });

        let control_section = control::build_control_section(self, &cancel)?;

        let signature_section = if self.want_signature() {
            let signer = self.signer()?;
            Some(sign::emit_signature(
                signer.as_ref(),
                &control_section,
                self.build.source_date_epoch,
                &cancel,
            )?)
        } else {
            None
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let target = self.filename();
        let parent = target
            .parent()
            .ok_or_else(|| Error::internal("output path has no parent directory"))?;
        fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;

        let mut out = fs::File::create(&target).map_err(|e| Error::io_with_path(&e, &target))?;
        let combined = (|| -> Result<()> {
            if let Some(signature) = &signature_section {
                out.write_all(signature)?;
            }
            out.write_all(&control_section)?;
            let mut data_reader = &data_file;
            std::io::copy(&mut data_reader, &mut out)?;
            Ok(())
        })();
        if let Err(err) = combined {
            // never leave a half-written package behind
            let _ = fs::remove_file(&target);
            return Err(err);
        }

        self.emit_event(Event::PackageWritten {
            package: self.package_name.clone(),
            path: target,
        });

        self.append_build_log();
        Ok(())
    }

    /// Record the emitted package in `packages.log`; failures only warn
    fn append_build_log(&self) {
        if !self.build.create_build_log {
            return;
        }
        if let Err(err) = self.try_append_build_log() {
            self.emit_warning(format!("unable to append package log: {err}"));
        }
    }

    fn try_append_build_log(&self) -> std::io::Result<()> {
        let path = self.build.build_log_dir.join("packages.log");
        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)?;
        // one whole line per write call, so concurrent appenders each
        // land a complete record
        let line = format!(
            "{}|{}|{}|{}\n",
            self.arch,
            self.origin_name,
            self.package_name,
            self.full_version()
        );
        file.write_all(line.as_bytes())
    }
}
