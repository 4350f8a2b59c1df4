//! ELF introspection for dependency synthesis
//!
//! Pulls the three facts the dependency scanner needs out of a binary:
//! the `PT_INTERP` interpreter path, the `DT_NEEDED` import list, and any
//! `DT_SONAME` entries. Uses the `object` crate's low-level ELF API so
//! both 32- and 64-bit objects of either endianness parse with the same
//! code path.

use object::elf;
use object::read::elf::{Dyn, FileHeader, ProgramHeader, SectionHeader};
use object::read::SectionIndex;
use object::{Endianness, FileKind};
use thiserror::Error;

/// Why a candidate file yielded no linkage facts
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("not an ELF object")]
    NotElf,
    #[error(transparent)]
    Parse(#[from] object::read::Error),
}

/// What an ELF object tells us about its dynamic linkage
#[derive(Debug, Clone, Default)]
pub struct ElfInfo {
    /// `PT_INTERP` content with trailing NULs stripped
    pub interpreter: Option<String>,
    /// `DT_NEEDED` entries in file order
    pub needed: Vec<String>,
    /// `DT_SONAME` entries (at most one in practice)
    pub sonames: Vec<String>,
    /// Whether the object carries a dynamic section at all (static
    /// binaries and relocatable objects do not)
    pub has_dynamic: bool,
}

/// Parse `data` as an ELF object and extract its dynamic-linkage facts.
///
/// # Errors
///
/// Returns an error for anything that is not a well-formed ELF object;
/// callers treat that as "not a binary" (shell scripts and data files
/// share the executable bit with real ELFs).
pub fn inspect(data: &[u8]) -> Result<ElfInfo, ElfError> {
    match FileKind::parse(data).map_err(ElfError::Parse)? {
        FileKind::Elf32 => inspect_header::<elf::FileHeader32<Endianness>>(data),
        FileKind::Elf64 => inspect_header::<elf::FileHeader64<Endianness>>(data),
        _ => Err(ElfError::NotElf),
    }
}

fn inspect_header<Elf: FileHeader<Endian = Endianness>>(
    data: &[u8],
) -> Result<ElfInfo, ElfError> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let mut info = ElfInfo::default();

    for segment in header.program_headers(endian, data)? {
        if segment.p_type(endian) == elf::PT_INTERP {
            if let Ok(bytes) = segment.data(endian, data) {
                let trimmed = trim_nuls(bytes);
                if !trimmed.is_empty() {
                    info.interpreter = Some(String::from_utf8_lossy(trimmed).into_owned());
                }
            }
        }
    }

    let sections = header.sections(endian, data)?;
    if let Some((entries, index)) = sections.dynamic(endian, data)? {
        info.has_dynamic = true;
        let link = sections.section(index)?.sh_link(endian);
        let strings = sections.strings(endian, data, SectionIndex(link as usize))?;

        for entry in entries {
            let Some(tag) = entry.tag32(endian) else {
                continue;
            };
            if tag == elf::DT_NULL {
                break;
            }
            if tag != elf::DT_NEEDED && tag != elf::DT_SONAME {
                continue;
            }
            let Ok(name) = entry.string(endian, strings) else {
                continue;
            };
            let name = String::from_utf8_lossy(name).into_owned();
            if tag == elf::DT_NEEDED {
                info.needed.push(name);
            } else {
                info.sonames.push(name);
            }
        }
    }

    Ok(info)
}

fn trim_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
