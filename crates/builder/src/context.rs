//! Process-wide context for one emission invocation

use std::path::PathBuf;

use apkforge_events::{EventEmitter, EventSender};
use apkforge_types::Configuration;
use tokio_util::sync::CancellationToken;

/// Everything the emission core needs to know about one build invocation.
///
/// The configuration is resolved and the workspace populated before this
/// context is constructed; the core only reads both.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Resolved build configuration (origin package + subpackages)
    pub configuration: Configuration,
    /// Root containing one staged `melange-out/<name>` subtree per job
    pub workspace_dir: PathBuf,
    /// Directory receiving `<arch>/<identity>.apk` outputs
    pub out_dir: PathBuf,
    /// Target architecture in APK convention (`x86_64`, `aarch64`, ...)
    pub arch: String,
    /// Pinned mtime for every archive entry; 0 also drops `builddate`
    pub source_date_epoch: u64,
    /// RSA private key for the signature section; unset builds unsigned
    pub signing_key: Option<PathBuf>,
    /// Passphrase accompanying the signing key; encrypted PEMs are
    /// rejected at signing time, so this only improves the error message
    pub signing_passphrase: Option<String>,
    /// Use each job's own name as its origin instead of the origin package
    pub strip_origin_name: bool,
    /// Append one line per emitted package to `packages.log`
    pub create_build_log: bool,
    /// Directory holding `packages.log`; defaults to the working directory
    pub build_log_dir: PathBuf,
    /// Path prefix for the per-arch JSON dependency log
    pub dependency_log: Option<String>,
    /// Report failed jobs and keep dispatching instead of stopping
    pub keep_going: bool,
    /// Progress/warning sink; `None` drops events
    pub event_sender: Option<EventSender>,
    /// Cooperative cancellation for walks, tar writes and gzip flushes
    pub cancel: CancellationToken,
}

impl EventEmitter for BuildContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl BuildContext {
    /// Create a context with default knobs
    #[must_use]
    pub fn new(
        configuration: Configuration,
        workspace_dir: impl Into<PathBuf>,
        out_dir: impl Into<PathBuf>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            configuration,
            workspace_dir: workspace_dir.into(),
            out_dir: out_dir.into(),
            arch: arch.into(),
            source_date_epoch: 0,
            signing_key: None,
            signing_passphrase: None,
            strip_origin_name: false,
            create_build_log: false,
            build_log_dir: PathBuf::from("."),
            dependency_log: None,
            keep_going: false,
            event_sender: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Pin archive mtimes (and `builddate` when non-zero)
    #[must_use]
    pub fn with_source_date_epoch(mut self, epoch: u64) -> Self {
        self.source_date_epoch = epoch;
        self
    }

    /// Sign the control section with this key
    #[must_use]
    pub fn with_signing_key(
        mut self,
        key: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        self.signing_key = Some(key.into());
        self.signing_passphrase = passphrase;
        self
    }

    /// Stamp each job with its own name as origin
    #[must_use]
    pub fn with_strip_origin_name(mut self, strip: bool) -> Self {
        self.strip_origin_name = strip;
        self
    }

    /// Record emitted packages in `packages.log` under `dir`
    #[must_use]
    pub fn with_build_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.create_build_log = true;
        self.build_log_dir = dir.into();
        self
    }

    /// Write the needed-library map to `{prefix}.{arch}`
    #[must_use]
    pub fn with_dependency_log(mut self, prefix: impl Into<String>) -> Self {
        self.dependency_log = Some(prefix.into());
        self
    }

    /// Keep dispatching remaining jobs after a failure
    #[must_use]
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Attach a progress/warning sink
    #[must_use]
    pub fn with_event_sender(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Attach an external cancellation token
    #[must_use]
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
