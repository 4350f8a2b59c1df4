//! Shared fixtures for the emission integration tests

use std::io::{Cursor, Read};

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

#[allow(clippy::too_many_arguments)]
fn push_section_header(
    out: &mut Vec<u8>,
    name: u32,
    kind: u32,
    flags: u64,
    offset: usize,
    size: usize,
    link: u32,
    addralign: u64,
    entsize: u64,
) {
    push_u32(out, name);
    push_u32(out, kind);
    push_u64(out, flags);
    push_u64(out, 0); // sh_addr
    push_u64(out, offset as u64);
    push_u64(out, size as u64);
    push_u32(out, link);
    push_u32(out, 0); // sh_info
    push_u64(out, addralign);
    push_u64(out, entsize);
}

/// Hand-assemble a minimal ELF64 shared object: optional `PT_INTERP`
/// segment, a `.dynamic` section with the given `DT_NEEDED`/`DT_SONAME`
/// entries, and the string tables to back them.
#[must_use]
pub fn minimal_elf(interp: Option<&str>, needed: &[&str], soname: Option<&str>) -> Vec<u8> {
    const EHSIZE: usize = 64;
    const PHENT: usize = 56;
    const SHENT: usize = 64;
    const DT_NEEDED: u64 = 1;
    const DT_SONAME: u64 = 14;

    let phnum = usize::from(interp.is_some());
    let interp_off = EHSIZE + PHENT * phnum;
    let interp_bytes: Vec<u8> = interp.map_or_else(Vec::new, |s| {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        bytes
    });

    let mut dynstr = vec![0u8];
    let mut dyn_names: Vec<(u64, u64)> = Vec::new(); // (tag, dynstr offset)
    for name in needed {
        dyn_names.push((DT_NEEDED, dynstr.len() as u64));
        dynstr.extend_from_slice(name.as_bytes());
        dynstr.push(0);
    }
    if let Some(name) = soname {
        dyn_names.push((DT_SONAME, dynstr.len() as u64));
        dynstr.extend_from_slice(name.as_bytes());
        dynstr.push(0);
    }

    let dynstr_off = interp_off + interp_bytes.len();
    let dynamic_off = align8(dynstr_off + dynstr.len());
    let mut dynamic = Vec::new();
    for (tag, offset) in &dyn_names {
        dynamic.extend_from_slice(&tag.to_le_bytes());
        dynamic.extend_from_slice(&offset.to_le_bytes());
    }
    dynamic.extend_from_slice(&0u64.to_le_bytes()); // DT_NULL
    dynamic.extend_from_slice(&0u64.to_le_bytes());

    // "\0.dynstr\0.dynamic\0.shstrtab\0"
    let shstrtab: &[u8] = b"\x00.dynstr\x00.dynamic\x00.shstrtab\x00";
    let shstrtab_off = dynamic_off + dynamic.len();
    let shoff = align8(shstrtab_off + shstrtab.len());

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]); // ELFCLASS64, LE
    out.extend_from_slice(&[0u8; 8]);
    push_u16(&mut out, 3); // ET_DYN
    push_u16(&mut out, 62); // EM_X86_64
    push_u32(&mut out, 1); // EV_CURRENT
    push_u64(&mut out, 0); // e_entry
    push_u64(&mut out, if phnum > 0 { EHSIZE as u64 } else { 0 }); // e_phoff
    push_u64(&mut out, shoff as u64); // e_shoff
    push_u32(&mut out, 0); // e_flags
    push_u16(&mut out, EHSIZE as u16);
    push_u16(&mut out, PHENT as u16);
    push_u16(&mut out, phnum as u16);
    push_u16(&mut out, SHENT as u16);
    push_u16(&mut out, 4); // e_shnum
    push_u16(&mut out, 3); // e_shstrndx -> .shstrtab

    if interp.is_some() {
        push_u32(&mut out, 3); // PT_INTERP
        push_u32(&mut out, 4); // PF_R
        push_u64(&mut out, interp_off as u64); // p_offset
        push_u64(&mut out, interp_off as u64); // p_vaddr
        push_u64(&mut out, interp_off as u64); // p_paddr
        push_u64(&mut out, interp_bytes.len() as u64); // p_filesz
        push_u64(&mut out, interp_bytes.len() as u64); // p_memsz
        push_u64(&mut out, 1); // p_align
    }

    out.extend_from_slice(&interp_bytes);
    assert_eq!(out.len(), dynstr_off);
    out.extend_from_slice(&dynstr);
    out.resize(dynamic_off, 0);
    out.extend_from_slice(&dynamic);
    assert_eq!(out.len(), shstrtab_off);
    out.extend_from_slice(shstrtab);
    out.resize(shoff, 0);

    push_section_header(&mut out, 0, 0, 0, 0, 0, 0, 0, 0); // SHN_UNDEF
    push_section_header(&mut out, 1, 3, 2, dynstr_off, dynstr.len(), 0, 1, 0); // .dynstr
    push_section_header(&mut out, 9, 6, 3, dynamic_off, dynamic.len(), 1, 8, 16); // .dynamic
    push_section_header(&mut out, 18, 3, 0, shstrtab_off, shstrtab.len(), 0, 1, 0); // .shstrtab

    out
}

/// An ELF64 object with no dynamic section at all (a static binary)
#[must_use]
pub fn static_elf() -> Vec<u8> {
    let shstrtab: &[u8] = b"\x00.shstrtab\x00";
    let shstrtab_off = 64;
    let shoff = align8(shstrtab_off + shstrtab.len());

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0u8; 8]);
    push_u16(&mut out, 2); // ET_EXEC
    push_u16(&mut out, 62);
    push_u32(&mut out, 1);
    push_u64(&mut out, 0);
    push_u64(&mut out, 0); // no program headers
    push_u64(&mut out, shoff as u64);
    push_u32(&mut out, 0);
    push_u16(&mut out, 64);
    push_u16(&mut out, 56);
    push_u16(&mut out, 0);
    push_u16(&mut out, 64);
    push_u16(&mut out, 2); // null + .shstrtab
    push_u16(&mut out, 1);

    out.extend_from_slice(shstrtab);
    out.resize(shoff, 0);
    push_section_header(&mut out, 0, 0, 0, 0, 0, 0, 0, 0);
    push_section_header(&mut out, 1, 3, 0, shstrtab_off, shstrtab.len(), 0, 1, 0);
    out
}

/// Split a `.apk` byte stream into its gzip members. Returns, per
/// member, the decompressed payload and the raw (still compressed)
/// member bytes.
#[must_use]
pub fn split_members(bytes: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut members = Vec::new();
    let mut cursor = Cursor::new(bytes);
    while (cursor.position() as usize) < bytes.len() {
        let start = cursor.position() as usize;
        let mut decoder = flate2::bufread::GzDecoder::new(cursor);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .expect("well-formed gzip member");
        cursor = decoder.into_inner();
        let end = cursor.position() as usize;
        assert!(end > start, "gzip member consumed no bytes");
        members.push((decompressed, bytes[start..end].to_vec()));
    }
    members
}

/// Read a decompressed tar payload (with or without its end-of-archive
/// blocks) into (path, content) pairs.
#[must_use]
pub fn tar_entries(payload: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut padded = payload.to_vec();
    padded.extend_from_slice(&[0u8; 1024]);

    let mut archive = tar::Archive::new(padded.as_slice());
    let mut entries = Vec::new();
    for entry in archive.entries().expect("tar parses") {
        let mut entry = entry.expect("tar entry parses");
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((path, content));
    }
    entries
}

/// Pull `.PKGINFO` out of a decompressed control payload
#[must_use]
pub fn pkginfo(control_payload: &[u8]) -> String {
    let entries = tar_entries(control_payload);
    let (_, content) = entries
        .into_iter()
        .find(|(path, _)| path == ".PKGINFO")
        .expect(".PKGINFO present");
    String::from_utf8(content).expect(".PKGINFO is UTF-8")
}

/// All values of a repeated `key = value` line in a `.PKGINFO` body
#[must_use]
pub fn pkginfo_values<'a>(body: &'a str, key: &str) -> Vec<&'a str> {
    let prefix = format!("{key} = ");
    body.lines()
        .filter_map(|line| line.strip_prefix(prefix.as_str()))
        .collect()
}
