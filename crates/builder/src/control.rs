//! Control section builder
//!
//! Renders `.PKGINFO` plus any populated scriptlet files into an
//! in-memory tree and wraps it as a skip-close tar inside its own gzip
//! member. The bytes stay in memory: they are both prepended to the data
//! section and fed to the signer.

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio_util::sync::CancellationToken;

use apkforge_errors::{BuildError, Error, Result};

use crate::fsview::MemoryView;
use crate::package::PackageBuild;
use crate::tarball::TarContext;

/// Render the `.PKGINFO` key=value body for one job.
///
/// Field order matters only for byte reproducibility, but it matters
/// there, so the layout is fixed.
#[must_use]
pub fn render_pkginfo(pc: &PackageBuild) -> String {
    let origin = pc.origin();
    let mut lines = vec![
        "# Generated by apkforge.".to_string(),
        format!("pkgname = {}", pc.package_name),
        format!("pkgver = {}", pc.full_version()),
        format!("arch = {}", pc.arch),
        format!("size = {}", pc.installed_size),
        format!("origin = {}", pc.origin_name),
        format!("pkgdesc = {}", pc.description),
        format!("url = {}", pc.url),
        format!("commit = {}", pc.commit),
    ];

    if pc.build.source_date_epoch != 0 {
        lines.push(format!("builddate = {}", pc.build.source_date_epoch));
    }
    for copyright in &origin.copyright {
        lines.push(format!("license = {}", copyright.license));
    }
    for dep in &pc.dependencies.runtime {
        lines.push(format!("depend = {dep}"));
    }
    for dep in &pc.dependencies.provides {
        lines.push(format!("provides = {dep}"));
    }
    for dep in &pc.dependencies.replaces {
        lines.push(format!("replaces = {dep}"));
    }
    if pc.dependencies.provider_priority != 0 {
        lines.push(format!(
            "provider_priority = {}",
            pc.dependencies.provider_priority
        ));
    }
    if !pc.scriptlets.trigger.paths.is_empty() {
        lines.push(format!(
            "triggers = {}",
            pc.scriptlets.trigger.paths.join(" ")
        ));
    }
    lines.push(format!("datahash = {}", pc.data_hash));

    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// Build the gzipped control tar for one job.
///
/// # Errors
///
/// Returns an error on tar or gzip framing failure, or when cancelled.
pub fn build_control_section(pc: &PackageBuild, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let mut tree = MemoryView::new();
    tree.insert(".PKGINFO", 0o644, render_pkginfo(pc).into_bytes());

    // scriptlets must be executable
    let scriptlets = &pc.scriptlets;
    for (name, script) in [
        (".trigger", &scriptlets.trigger.script),
        (".pre-install", &scriptlets.pre_install),
        (".post-install", &scriptlets.post_install),
        (".pre-deinstall", &scriptlets.pre_deinstall),
        (".post-deinstall", &scriptlets.post_deinstall),
        (".pre-upgrade", &scriptlets.pre_upgrade),
        (".post-upgrade", &scriptlets.post_upgrade),
    ] {
        if !script.is_empty() {
            tree.insert(name, 0o755, script.clone().into_bytes());
        }
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    TarContext::new(pc.build.source_date_epoch)
        .with_skip_close(true)
        .write_tar(&tree, &mut encoder, cancel)?;
    encoder.finish().map_err(|e| {
        Error::from(BuildError::Compression {
            message: format!("flushing control section gzip: {e}"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildContext;
    use apkforge_types::{Configuration, Copyright, Package, Subpackage};
    use std::io::Read;
    use std::sync::Arc;

    fn job() -> PackageBuild {
        let configuration = Configuration {
            package: Package {
                name: "hello".to_string(),
                version: "2.12".to_string(),
                epoch: 1,
                description: "the GNU hello".to_string(),
                url: "https://www.gnu.org/software/hello/".to_string(),
                commit: "abcdef".to_string(),
                copyright: vec![Copyright {
                    license: "GPL-3.0-or-later".to_string(),
                    ..Copyright::default()
                }],
                ..Package::default()
            },
            subpackages: Vec::new(),
        };
        let context = Arc::new(
            BuildContext::new(configuration, "/ws", "/out", "x86_64")
                .with_source_date_epoch(1_700_000_000),
        );
        let subpackage = Subpackage::from(&context.configuration.package);
        let mut pc = PackageBuild::new(context, &subpackage);
        pc.installed_size = 4096;
        pc.data_hash = "deadbeef".to_string();
        pc
    }

    #[test]
    fn pkginfo_carries_the_fixed_schema() {
        let mut pc = job();
        pc.dependencies.runtime = vec!["so:libc.musl-x86_64.so.1".to_string()];
        pc.dependencies.provides = vec!["cmd:hello=2.12-r1".to_string()];
        pc.dependencies.replaces = vec!["hello-classic".to_string()];

        let body = render_pkginfo(&pc);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "# Generated by apkforge.");
        assert_eq!(lines[1], "pkgname = hello");
        assert_eq!(lines[2], "pkgver = 2.12-r1");
        assert_eq!(lines[3], "arch = x86_64");
        assert_eq!(lines[4], "size = 4096");
        assert_eq!(lines[5], "origin = hello");
        assert!(body.contains("builddate = 1700000000\n"));
        assert!(body.contains("license = GPL-3.0-or-later\n"));
        assert!(body.contains("depend = so:libc.musl-x86_64.so.1\n"));
        assert!(body.contains("provides = cmd:hello=2.12-r1\n"));
        assert!(body.contains("replaces = hello-classic\n"));
        assert!(body.ends_with("datahash = deadbeef\n"));
        // zero priority and empty trigger paths stay out
        assert!(!body.contains("provider_priority"));
        assert!(!body.contains("triggers"));
    }

    #[test]
    fn builddate_is_omitted_for_epoch_zero() {
        let mut pc = job();
        let mut context = (*pc.build).clone();
        context.source_date_epoch = 0;
        pc.build = Arc::new(context);
        assert!(!render_pkginfo(&pc).contains("builddate"));
    }

    #[test]
    fn triggers_and_priority_render_when_set() {
        let mut pc = job();
        pc.dependencies.provider_priority = 10;
        pc.scriptlets.trigger.paths = vec![
            "/usr/share/icons/*".to_string(),
            "/usr/share/fonts/*".to_string(),
        ];
        let body = render_pkginfo(&pc);
        assert!(body.contains("provider_priority = 10\n"));
        assert!(body.contains("triggers = /usr/share/icons/* /usr/share/fonts/*\n"));
    }

    #[test]
    fn control_tar_holds_pkginfo_and_scriptlets() {
        let mut pc = job();
        pc.scriptlets.post_install = "#!/bin/sh\nexit 0\n".to_string();
        let cancel = CancellationToken::new();
        let section = build_control_section(&pc, &cancel).unwrap();

        // decompress the single member, pad the trailer back on for the reader
        let mut decoder = flate2::read::GzDecoder::new(section.as_slice());
        let mut tar_bytes = Vec::new();
        decoder.read_to_end(&mut tar_bytes).unwrap();
        tar_bytes.extend_from_slice(&[0u8; 1024]);

        let mut names = Vec::new();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            names.push(entry.path().unwrap().to_string_lossy().into_owned());
            if entry.path().unwrap().to_string_lossy() == ".post-install" {
                assert_eq!(entry.header().mode().unwrap() & 0o7777, 0o755);
            }
        }
        assert_eq!(names, [".PKGINFO", ".post-install"]);
    }
}
