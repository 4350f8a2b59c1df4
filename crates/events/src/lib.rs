#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for package emission progress
//!
//! This crate provides the event types and channel aliases used to report
//! emission progress and warnings. All human-readable output goes through
//! events - the core never prints or logs directly; the consumer decides
//! how to render them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Type alias for event sender
pub type EventSender = tokio::sync::mpsc::UnboundedSender<Event>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<Event>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Core event enum for emission progress reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Emission of one package job has begun
    PackageStarting { identity: String },

    /// A dependency scanner started walking the staged tree
    ScanStarted { package: String, scanner: String },

    /// An executable's program interpreter was discovered
    InterpreterFound { binary: String, interpreter: String },

    /// Final dependency sets after generation and self-provides filtering
    DependencySummary {
        package: String,
        runtime: Vec<String>,
        provides: Vec<String>,
    },

    /// Total size of the staged tree, as recorded in the control section
    InstalledSize { package: String, bytes: u64 },

    /// SHA-256 of the emitted data section
    DataDigest { package: String, digest: String },

    /// The finished package file landed on disk
    PackageWritten { package: String, path: PathBuf },

    /// A non-fatal problem was skipped over
    Warning { message: String },
}

/// Anything that may carry an event sender and emit progress through it.
///
/// Events are best-effort: a missing sender or a closed channel drops the
/// event rather than failing the operation.
pub trait EventEmitter {
    fn event_sender(&self) -> Option<&EventSender>;

    fn emit_event(&self, event: Event) {
        if let Some(sender) = self.event_sender() {
            let _ = sender.send(event);
        }
    }

    fn emit_warning(&self, message: impl Into<String>) {
        self.emit_event(Event::Warning {
            message: message.into(),
        });
    }
}
