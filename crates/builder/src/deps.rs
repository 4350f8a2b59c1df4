//! Dependency scanners
//!
//! Three generators walk the staged tree and fill a [`Dependencies`]
//! accumulator: command providers (`cmd:`), shared-object dependencies
//! and providers (`so:`), and pkg-config providers (`pc:`). The results
//! are merged with the declared sets, sorted, deduplicated, and filtered
//! so a package never depends on something it provides itself.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::LazyLock;

use apkforge_errors::Result;
use apkforge_events::{Event, EventEmitter};
use apkforge_types::Dependencies;
use regex::Regex;

use crate::elf;
use crate::fsview::{EntryKind, TreeView, WorkspaceView};
use crate::package::{PackageBuild, WORKSPACE_OUT_DIR};
use crate::pkgconfig;

/// A scanner mutating the generated-dependency accumulator for one job.
///
/// Generators are registered as a list at assembly time so each stays
/// independently testable.
pub type DependencyGenerator = fn(&PackageBuild, &mut Dependencies) -> Result<()>;

const CMD_PREFIXES: [&str; 4] = ["bin", "sbin", "usr/bin", "usr/sbin"];
const LIB_DIRS: [&str; 4] = ["lib", "usr/lib", "lib64", "usr/lib64"];

/// Executable for owner, group and other
const EXEC_MASK: u32 = 0o555;

/// Runtime `pc:` dependency generation stays off until enough of the
/// ecosystem publishes pkg-config provider data.
const RUNTIME_PKGCONFIG_DEPS: bool = false;

static PKGCONFIG_VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("-(alpha|beta|rc|pre)").expect("static pattern compiles"));

/// Run every registered generator, then merge, sort, deduplicate and
/// self-filter the dependency sets on the job.
///
/// # Errors
///
/// Returns an error if a staged tree cannot be walked or the run is
/// cancelled; per-file scan problems only produce warnings.
pub fn generate_dependencies(pc: &mut PackageBuild) -> Result<()> {
    let mut generated = Dependencies::default();
    let generators: [DependencyGenerator; 3] = [
        generate_shared_object_deps,
        generate_cmd_providers,
        generate_pkgconfig_deps,
    ];
    for generator in generators {
        generator(pc, &mut generated)?;
    }

    let mut runtime = pc.dependencies.runtime.clone();
    runtime.extend(generated.runtime);
    let mut provides = pc.dependencies.provides.clone();
    provides.extend(generated.provides);

    pc.dependencies.provides = dedup(provides);
    pc.dependencies.runtime = remove_self_provided(dedup(runtime), &pc.dependencies.provides);

    pc.emit_event(Event::DependencySummary {
        package: pc.package_name.clone(),
        runtime: pc.dependencies.runtime.clone(),
        provides: pc.dependencies.provides.clone(),
    });

    Ok(())
}

/// Executables under the command prefixes become `cmd:` providers
fn generate_cmd_providers(pc: &PackageBuild, generated: &mut Dependencies) -> Result<()> {
    if pc.options.no_commands {
        return Ok(());
    }

    pc.emit_event(Event::ScanStarted {
        package: pc.package_name.clone(),
        scanner: "commands".to_string(),
    });

    let view = WorkspaceView::new(pc.workspace_subdir());
    for entry in view.entries(&pc.build.cancel)? {
        if entry.kind != EntryKind::File || entry.mode & EXEC_MASK != EXEC_MASK {
            continue;
        }
        if allowed_prefix(&entry.path, &CMD_PREFIXES) {
            generated.provides.push(format!(
                "cmd:{}={}",
                basename(&entry.path),
                pc.full_version()
            ));
        }
    }

    Ok(())
}

/// ELF imports become `so:` runtime entries; library SONAMEs become
/// `so:` providers
fn generate_shared_object_deps(pc: &PackageBuild, generated: &mut Dependencies) -> Result<()> {
    pc.emit_event(Event::ScanStarted {
        package: pc.package_name.clone(),
        scanner: "shared objects".to_string(),
    });

    let mut depends: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let view = WorkspaceView::new(pc.workspace_subdir());
    for entry in view.entries(&pc.build.cancel)? {
        match entry.kind {
            // A library symlink usually points at the versioned object,
            // possibly staged into a sibling package.
            EntryKind::Symlink if entry.path.contains(".so") => {
                let Some(real_path) = dereference_cross_package_symlink(pc, &entry.path) else {
                    continue;
                };
                let Ok(content) = fs::read(&real_path) else {
                    continue;
                };
                let Ok(info) = elf::inspect(&content) else {
                    continue;
                };
                if info.sonames.is_empty() {
                    pc.emit_warning(format!("library {} lacks SONAME", entry.path));
                    continue;
                }
                for soname in &info.sonames {
                    generated.runtime.push(format!("so:{soname}"));
                }
            }
            EntryKind::File if entry.mode & EXEC_MASK == EXEC_MASK => {
                let name = basename(&entry.path);

                let Ok(content) = read_file(&view, &entry.path) else {
                    continue;
                };
                // most likely a shell script instead of an ELF
                let Ok(info) = elf::inspect(&content) else {
                    continue;
                };

                if let Some(interp) = &info.interpreter {
                    if !pc.options.no_depends {
                        pc.emit_event(Event::InterpreterFound {
                            binary: name.to_string(),
                            interpreter: interp.clone(),
                        });
                        generated.runtime.push(interpreter_dependency(interp));
                    }
                }

                if !pc.options.no_depends {
                    for lib in &info.needed {
                        if lib.contains(".so.") {
                            generated.runtime.push(format!("so:{lib}"));
                            depends.entry(lib.clone()).or_default().push(entry.path.clone());
                        }
                    }
                }

                // An executable program should never export a SONAME, so
                // anything with an interpreter is skipped for provides.
                // libc is the exception: it sets PT_INTERP on itself to
                // make `/lib/libc.so.6 --about` work.
                if !pc.options.no_provides
                    && (info.interpreter.is_none() || name.starts_with("libc"))
                {
                    if !allowed_prefix(&entry.path, &LIB_DIRS) {
                        continue;
                    }
                    if info.sonames.is_empty() {
                        pc.emit_warning(format!("library {} lacks SONAME", entry.path));
                        continue;
                    }
                    for soname in &info.sonames {
                        let libver = soname.split_once(".so.").map_or("0", |(_, v)| v);
                        generated.provides.push(format!("so:{soname}={libver}"));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(prefix) = &pc.build.dependency_log {
        write_dependency_log(pc, prefix, &depends);
    }

    Ok(())
}

/// `.pc` descriptors become `pc:` providers
fn generate_pkgconfig_deps(pc: &PackageBuild, generated: &mut Dependencies) -> Result<()> {
    pc.emit_event(Event::ScanStarted {
        package: pc.package_name.clone(),
        scanner: "pkg-config".to_string(),
    });

    let view = WorkspaceView::new(pc.workspace_subdir());
    for entry in view.entries(&pc.build.cancel)? {
        // ncurses aliases .pc files to other .pc files via symlinks; only
        // the real descriptors count.
        if entry.kind != EntryKind::File || !entry.path.ends_with(".pc") {
            continue;
        }

        let Ok(content) = read_file(&view, &entry.path) else {
            continue;
        };
        let descriptor = match pkgconfig::parse(&String::from_utf8_lossy(&content)) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                pc.emit_warning(format!(
                    "unable to parse pkg-config file {}: {err}",
                    entry.path
                ));
                continue;
            }
        };

        let file_name = basename(&entry.path);
        let pc_name = file_name.strip_suffix(".pc").unwrap_or(file_name);
        if !pc.options.no_provides {
            generated
                .provides
                .push(format!("pc:{pc_name}={}", apk_version(&descriptor.version)));
        }

        if RUNTIME_PKGCONFIG_DEPS {
            for dep in descriptor.requires.iter().chain(&descriptor.requires_private) {
                generated.runtime.push(format!("pc:{dep}"));
            }
        }
    }

    Ok(())
}

/// Resolve a symlink whose target may be staged into a sibling package:
/// probe `{workspace}/melange-out/{candidate}/{libdir}/{basename}` for the
/// current package, the origin, and every declared subpackage.
fn dereference_cross_package_symlink(pc: &PackageBuild, path: &str) -> Option<PathBuf> {
    let target = fs::read_link(pc.workspace_subdir().join(path)).ok()?;
    let base = target.file_name()?.to_os_string();

    let mut candidates = vec![pc.package_name.clone(), pc.origin().name.clone()];
    candidates.extend(
        pc.build
            .configuration
            .subpackages
            .iter()
            .map(|subpackage| subpackage.name.clone()),
    );

    for candidate in &candidates {
        let staged = pc.build.workspace_dir.join(WORKSPACE_OUT_DIR).join(candidate);
        for lib_dir in &LIB_DIRS {
            let probe = staged.join(lib_dir).join(&base);
            if probe.exists() {
                return Some(probe);
            }
        }
    }

    None
}

fn write_dependency_log(pc: &PackageBuild, prefix: &str, depends: &BTreeMap<String, Vec<String>>) {
    let path = format!("{prefix}.{}", pc.arch);
    let result = serde_json::to_vec(depends)
        .map_err(std::io::Error::other)
        .and_then(|body| fs::write(&path, body));
    if let Err(err) = result {
        pc.emit_warning(format!("unable to write dependency log {path}: {err}"));
    }
}

/// The musl loader is a symlink back to itself, so the dependency uses
/// the non-symlink name instead.
fn interpreter_dependency(interp: &str) -> String {
    format!("so:{}", basename(interp)).replace("so:ld-musl", "so:libc.musl")
}

fn read_file(view: &dyn TreeView, path: &str) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    view.open(path)?.read_to_end(&mut content)?;
    Ok(content)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// raw string prefix, not a path-component match
fn allowed_prefix(path: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// pkg-config pre-release suffixes use `_` in APK versions
fn apk_version(version: &str) -> String {
    PKGCONFIG_VERSION_SUFFIX
        .replace(version, "_$1")
        .into_owned()
}

fn dedup(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}

/// Drop runtime entries whose name (the prefix before `=`) the package
/// provides itself.
fn remove_self_provided(runtime: Vec<String>, provides: &[String]) -> Vec<String> {
    let provided: HashSet<&str> = provides
        .iter()
        .map(|entry| entry.split('=').next().unwrap_or(entry))
        .collect();

    runtime
        .into_iter()
        .filter(|dep| !provided.contains(dep.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildContext;
    use apkforge_types::{Configuration, Package};
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn dedup_sorts_and_drops_duplicates() {
        let deduped = dedup(vec![
            "so:libz.so.1".to_string(),
            "so:libc.musl-x86_64.so.1".to_string(),
            "so:libz.so.1".to_string(),
        ]);
        assert_eq!(deduped, ["so:libc.musl-x86_64.so.1", "so:libz.so.1"]);
    }

    #[test]
    fn self_provided_runtime_entries_are_removed() {
        let runtime = vec![
            "so:libfoo.so.2".to_string(),
            "so:libssl.so.3".to_string(),
        ];
        let provides = vec!["so:libfoo.so.2=2".to_string(), "cmd:foo=1.0-r0".to_string()];
        assert_eq!(remove_self_provided(runtime, &provides), ["so:libssl.so.3"]);
    }

    #[test]
    fn musl_loader_maps_to_its_real_name() {
        assert_eq!(
            interpreter_dependency("/lib/ld-musl-x86_64.so.1"),
            "so:libc.musl-x86_64.so.1"
        );
        assert_eq!(
            interpreter_dependency("/lib64/ld-linux-x86-64.so.2"),
            "so:ld-linux-x86-64.so.2"
        );
    }

    #[test]
    fn pkgconfig_prerelease_suffixes_are_rewritten() {
        assert_eq!(apk_version("1.0-rc2"), "1.0_rc2");
        assert_eq!(apk_version("2.4-alpha"), "2.4_alpha");
        assert_eq!(apk_version("0.9-beta1"), "0.9_beta1");
        assert_eq!(apk_version("3.1-pre3"), "3.1_pre3");
        assert_eq!(apk_version("1.2.3"), "1.2.3");
    }

    #[test]
    fn prefixes_match_the_raw_path_start() {
        assert!(allowed_prefix("usr/bin/tool", &CMD_PREFIXES));
        assert!(allowed_prefix("bin/sh", &CMD_PREFIXES));
        assert!(!allowed_prefix("opt/bin/tool", &CMD_PREFIXES));
        assert!(allowed_prefix("usr/lib/libz.so.1", &LIB_DIRS));
        // the match is on raw strings, so siblings sharing the prefix
        // count too
        assert!(allowed_prefix("binx/tool", &CMD_PREFIXES));
        assert!(allowed_prefix("usr/libexec/helper", &LIB_DIRS));
    }

    fn job_for(workspace: &TempDir, name: &str) -> PackageBuild {
        let configuration = Configuration {
            package: Package {
                name: name.to_string(),
                version: "1.0".to_string(),
                ..Package::default()
            },
            subpackages: Vec::new(),
        };
        let context = Arc::new(BuildContext::new(
            configuration,
            workspace.path(),
            workspace.path().join("out"),
            "x86_64",
        ));
        let subpackage = apkforge_types::Subpackage::from(&context.configuration.package);
        PackageBuild::new(context, &subpackage)
    }

    #[test]
    fn command_scan_finds_executables_under_command_prefixes() {
        let workspace = TempDir::new().unwrap();
        let job = job_for(&workspace, "tools");
        let subdir = job.workspace_subdir();
        fs::create_dir_all(subdir.join("usr/bin")).unwrap();
        fs::create_dir_all(subdir.join("usr/share")).unwrap();
        fs::write(subdir.join("usr/bin/tool"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(
            subdir.join("usr/bin/tool"),
            fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        fs::write(subdir.join("usr/share/data"), b"not a command").unwrap();

        let mut generated = Dependencies::default();
        generate_cmd_providers(&job, &mut generated).unwrap();
        assert_eq!(generated.provides, ["cmd:tool=1.0-r0"]);
        assert!(generated.runtime.is_empty());
    }

    #[test]
    fn command_scan_respects_no_commands() {
        let workspace = TempDir::new().unwrap();
        let mut job = job_for(&workspace, "tools");
        job.options.no_commands = true;
        fs::create_dir_all(job.workspace_subdir()).unwrap();

        let mut generated = Dependencies::default();
        generate_cmd_providers(&job, &mut generated).unwrap();
        assert!(generated.provides.is_empty());
    }
}
