#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package emission core
//!
//! Turns a staged workspace tree plus a resolved configuration into
//! Alpine-style `.apk` packages: a deterministic, checksummed data tar; a
//! `.PKGINFO` control section carrying synthesized `so:`/`cmd:`/`pc:`
//! dependency metadata; and an optional RSA signature - concatenated as
//! independent gzip members the way `apk-tools` expects.
//!
//! The crate deliberately ends at the workspace boundary: fetching
//! sources, running pipelines and populating `melange-out/` belong to the
//! caller. Given identical inputs and a pinned `source-date-epoch`, two
//! runs produce byte-identical packages.

pub mod context;
pub mod control;
pub mod data;
pub mod deps;
pub mod elf;
pub mod fsview;
pub mod package;
pub mod pkgconfig;
pub mod sign;
pub mod tarball;

mod dispatch;

pub use context::BuildContext;
pub use dispatch::{emit_packages, package_jobs};
pub use fsview::{Entry, EntryKind, MemoryView, TreeView, WorkspaceView};
pub use package::PackageBuild;
pub use sign::{ApkSigner, EphemeralSigner, KeySigner};
pub use tarball::TarContext;
