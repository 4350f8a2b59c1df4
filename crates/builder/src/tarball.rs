//! Deterministic tar writer
//!
//! Writes POSIX tar archives from a [`TreeView`] with everything that
//! varies between machines pinned down: mtimes come from
//! `source-date-epoch`, ownership is forced to root/root with uid/gid 0,
//! and entries appear in the view's sorted order. Two knobs cover the APK
//! section shapes:
//!
//! - `use_checksums` (data mode) emits a PAX extended record with the
//!   SHA-1 of each regular file's content ahead of its entry, the
//!   `APK-TOOLS.checksum.SHA1` convention `apk-tools` verifies on install.
//! - `skip_close` suppresses the end-of-archive zero blocks so a section
//!   can sit in front of further gzip members without terminating the
//!   reader's tar stream early.

use std::io::Write;

use apkforge_errors::{BuildError, Error, Result};
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

use crate::fsview::{EntryKind, TreeView};

/// PAX record key carrying the per-file content digest in data mode
const CHECKSUM_RECORD: &str = "APK-TOOLS.checksum.SHA1";

/// Length of the end-of-archive marker: two zeroed 512-byte blocks
const TAR_TRAILER_LEN: usize = 1024;

/// Options for one deterministic tar emission
#[derive(Debug, Clone)]
pub struct TarContext {
    source_date_epoch: u64,
    use_checksums: bool,
    skip_close: bool,
}

impl TarContext {
    #[must_use]
    pub fn new(source_date_epoch: u64) -> Self {
        Self {
            source_date_epoch,
            use_checksums: false,
            skip_close: false,
        }
    }

    /// Emit `APK-TOOLS.checksum.SHA1` PAX records before regular files
    #[must_use]
    pub fn with_checksums(mut self, use_checksums: bool) -> Self {
        self.use_checksums = use_checksums;
        self
    }

    /// Leave off the end-of-archive blocks so members concatenate cleanly
    #[must_use]
    pub fn with_skip_close(mut self, skip_close: bool) -> Self {
        self.skip_close = skip_close;
        self
    }

    /// Write the view as a tar stream into `out`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, on tar framing failure, or
    /// `Error::Cancelled` when the token fires between entries.
    pub fn write_tar<W: Write>(
        &self,
        view: &dyn TreeView,
        mut out: W,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.skip_close {
            // Sections destined for concatenation are small (control,
            // signature); buffer them so the trailer can be stripped.
            let mut buf = Vec::new();
            let mut builder = tar::Builder::new(&mut buf);
            self.append_entries(&mut builder, view, cancel)?;
            builder.finish().map_err(framing)?;
            drop(builder);
            buf.truncate(buf.len().saturating_sub(TAR_TRAILER_LEN));
            out.write_all(&buf)?;
        } else {
            let mut builder = tar::Builder::new(out);
            self.append_entries(&mut builder, view, cancel)?;
            builder.finish().map_err(framing)?;
        }
        Ok(())
    }

    fn append_entries<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        view: &dyn TreeView,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for entry in view.entries(cancel)? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut header = tar::Header::new_ustar();
            header.set_mtime(self.source_date_epoch);
            header.set_uid(0);
            header.set_gid(0);
            header.set_username("root").map_err(framing)?;
            header.set_groupname("root").map_err(framing)?;
            header.set_device_major(0).map_err(framing)?;
            header.set_device_minor(0).map_err(framing)?;

            match entry.kind {
                EntryKind::Dir => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_mode(entry.mode);
                    header.set_size(0);
                    builder
                        .append_data(&mut header, format!("{}/", entry.path), std::io::empty())
                        .map_err(framing)?;
                }
                EntryKind::Symlink => {
                    let target = view.read_link(&entry.path)?;
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_mode(0o777);
                    header.set_size(0);
                    header.set_link_name(&target).map_err(framing)?;
                    builder
                        .append_data(&mut header, &entry.path, std::io::empty())
                        .map_err(framing)?;
                }
                EntryKind::File => {
                    if self.use_checksums {
                        let checksum = file_checksum(view, &entry.path)?;
                        builder
                            .append_pax_extensions([(CHECKSUM_RECORD, checksum.as_bytes())])
                            .map_err(framing)?;
                    }
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_mode(entry.mode);
                    header.set_size(entry.size);
                    let mut content = view.open(&entry.path)?;
                    builder
                        .append_data(&mut header, &entry.path, &mut content)
                        .map_err(framing)?;
                }
            }
        }

        Ok(())
    }
}

fn framing(err: std::io::Error) -> Error {
    BuildError::Archive {
        message: err.to_string(),
    }
    .into()
}

/// Hex SHA-1 of a file's content, streamed rather than slurped
fn file_checksum(view: &dyn TreeView, path: &str) -> Result<String> {
    let mut reader = view.open(path)?;
    let mut hasher = Sha1::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
