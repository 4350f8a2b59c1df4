//! Data section builder
//!
//! Streams the staged tree as a checksummed tar through a parallel gzip
//! writer into a temp file, teeing the compressed bytes into a SHA-256
//! digest on the way. The digest covers the gzip stream exactly as
//! written, because that is what `datahash` attests and what installers
//! verify.

use std::fs::File;
use std::io::{Seek, Write};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use apkforge_errors::{BuildError, Error, Result};
use flate2::Compression;
use gzp::deflate::Gzip;
use gzp::par::compress::{ParCompress, ParCompressBuilder};
use gzp::ZWriter;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::fsview::TreeView;
use crate::tarball::TarContext;

/// Upper bound on gzip workers. Modern workstations tend to have ~8
/// performance cores and large CI machines many more; capping here keeps
/// one data section from starving concurrent package builds while still
/// saturating a laptop.
pub const MAX_GZIP_WORKERS: usize = 8;

/// Block size handed to each gzip worker
pub const GZIP_BLOCK_SIZE: usize = 1 << 20;

fn gzip_workers() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_GZIP_WORKERS)
}

/// Tees compressed bytes into a running SHA-256 while they land in the
/// temp file. The digest sits behind a mutex because the gzip pool owns
/// the writer on its own thread.
struct DigestWriter<W: Write> {
    inner: W,
    digest: Arc<Mutex<Sha256>>,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Write the data member into `out`, rewinding it afterwards, and return
/// the hex SHA-256 of the bytes written.
///
/// # Errors
///
/// Returns an error on walk/tar/gzip failure or when cancelled.
pub fn emit_data_section(
    view: &dyn TreeView,
    source_date_epoch: u64,
    out: &File,
    cancel: &CancellationToken,
) -> Result<String> {
    let digest = Arc::new(Mutex::new(Sha256::new()));
    let sink = DigestWriter {
        inner: out.try_clone()?,
        digest: Arc::clone(&digest),
    };

    let mut encoder: ParCompress<Gzip> = ParCompressBuilder::new()
        .num_threads(gzip_workers())
        .map_err(compression)?
        .buffer_size(GZIP_BLOCK_SIZE)
        .map_err(compression)?
        .compression_level(Compression::default())
        .from_writer(sink);

    TarContext::new(source_date_epoch)
        .with_checksums(true)
        .write_tar(view, &mut encoder, cancel)?;
    encoder.finish().map_err(compression)?;

    let hash = {
        let mut digest = digest.lock().unwrap_or_else(PoisonError::into_inner);
        hex::encode(digest.finalize_reset())
    };

    // rewind so the assembler can concatenate from the start
    let mut handle = out;
    handle.rewind()?;

    Ok(hash)
}

fn compression(err: gzp::GzpError) -> Error {
    BuildError::Compression {
        message: err.to_string(),
    }
    .into()
}
