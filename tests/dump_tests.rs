//! Integration tests for the binary readers, driven through real files on
//! disk the way the dump commands use them.

use std::fs;
use std::path::Path;

use amidev::binfmt::hunk::{self, Hunk, Memory, HUNK_CODE, HUNK_DEBUG, HUNK_END, HUNK_HEADER,
    HUNK_SYMBOL};
use amidev::binfmt::stab::{N_FUN, N_SLINE, N_SO, STAB_SIZE};
use amidev::debug::info::DebugInfo;
use amidev::debug::state::Segment;

fn w(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn hunk_string(buf: &mut Vec<u8>, s: &str) {
    let longwords = s.len().div_ceil(4);
    w(buf, longwords as u32);
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize(longwords * 4, 0);
    buf.extend_from_slice(&bytes);
}

/// A string table holding `names`, returning (table bytes, offsets)
fn string_table(names: &[&str]) -> (Vec<u8>, Vec<u32>) {
    let mut data = vec![0u8; 4];
    let mut offsets = Vec::new();
    for name in names {
        offsets.push(data.len() as u32);
        data.extend_from_slice(name.as_bytes());
        data.push(0);
    }
    let size = data.len() as u32;
    data[..4].copy_from_slice(&size.to_be_bytes());
    (data, offsets)
}

fn push_stab(buf: &mut Vec<u8>, strx: u32, typ: u8, desc: u16, value: u32) {
    w(buf, strx);
    buf.push(typ);
    buf.push(0);
    buf.extend_from_slice(&desc.to_be_bytes());
    w(buf, value);
}

/// A minimal executable: header, one code hunk with symbols and stabs
fn executable_image() -> Vec<u8> {
    let mut buf = Vec::new();
    w(&mut buf, HUNK_HEADER);
    w(&mut buf, 0);
    w(&mut buf, 1);
    w(&mut buf, 0);
    w(&mut buf, 0);
    w(&mut buf, 16); // 64 bytes of code

    w(&mut buf, HUNK_CODE);
    w(&mut buf, 16);
    buf.extend_from_slice(&[0u8; 64]);

    w(&mut buf, HUNK_SYMBOL);
    hunk_string(&mut buf, "_entry");
    w(&mut buf, 0);
    w(&mut buf, 0);

    // Debug block: stabs for main() at 0x10 with two line records.
    let (table, off) = string_table(&["/src/", "main.c", "_main:F1"]);
    let mut debug = Vec::new();
    w(&mut debug, (5 * STAB_SIZE) as u32);
    push_stab(&mut debug, off[0], N_SO, 0, 0);
    push_stab(&mut debug, off[1], N_SO, 0, 0);
    push_stab(&mut debug, off[2], N_FUN, 0, 0x10);
    push_stab(&mut debug, 0, N_SLINE, 7, 0x10);
    push_stab(&mut debug, 0, N_SLINE, 8, 0x20);
    debug.extend_from_slice(&table);
    while debug.len() % 4 != 0 {
        debug.push(0);
    }

    w(&mut buf, HUNK_DEBUG);
    w(&mut buf, (debug.len() / 4) as u32);
    buf.extend_from_slice(&debug);

    w(&mut buf, HUNK_END);
    buf
}

#[test]
fn test_read_executable_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.out.hunk");
    fs::write(&path, executable_image()).unwrap();

    let hunks = hunk::read_file(&path).unwrap();
    assert_eq!(hunks.len(), 5);
    assert_eq!(hunks[0].type_name(), "HUNK_HEADER");
    assert!(matches!(
        &hunks[1],
        Hunk::Code { memory: Memory::Any, data } if data.len() == 64
    ));

    // Every hunk renders without panicking.
    for h in &hunks {
        let text = h.to_string();
        assert!(text.starts_with("HUNK_"));
    }
}

#[test]
fn test_debug_info_from_executable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program");
    fs::write(&path, executable_image()).unwrap();

    let info = DebugInfo::from_file(&path).unwrap();
    assert_eq!(info.ask_symbol("entry"), Some(0));
    assert_eq!(info.ask_symbol("main"), Some(0x10));
    assert_eq!(info.ask_source_line("main.c:8"), Some(0x20));

    let loc = info.ask_address(0x14).unwrap();
    assert_eq!(loc.source(), Some(("/src/main.c", 7)));
}

#[test]
fn test_debug_info_relocation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program");
    fs::write(&path, executable_image()).unwrap();

    let mut info = DebugInfo::from_file(&path).unwrap();
    info.relocate(&[
        Segment {
            start: 0x0800_0000,
            size: 64,
        },
        Segment { start: 0, size: 0 },
        Segment { start: 0, size: 0 },
    ])
    .unwrap();
    assert_eq!(info.ask_symbol("main"), Some(0x0800_0010));
}

#[test]
fn test_truncated_executable_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short");
    let image = executable_image();
    fs::write(&path, &image[..image.len() / 2]).unwrap();

    let err = hunk::read_file(&path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("short"), "error should name the file: {}", msg);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = hunk::read_file(Path::new("/nonexistent/file")).unwrap_err();
    assert!(matches!(err, amidev::error::AmidevError::Io(_)));
}

mod archives {
    use amidev::binfmt::ar;
    use std::fs;

    fn header(name: &str, size: usize) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(format!("{:<16}", name).as_bytes());
        h.extend_from_slice(format!("{:<12}", 0).as_bytes());
        h.extend_from_slice(format!("{:<6}", 0).as_bytes());
        h.extend_from_slice(format!("{:<6}", 0).as_bytes());
        h.extend_from_slice(format!("{:<8}", "100644").as_bytes());
        h.extend_from_slice(format!("{:<10}", size).as_bytes());
        h.extend_from_slice(b"`\n");
        h
    }

    #[test]
    fn test_archive_listing_from_disk() {
        let mut archive = ar::MAGIC.to_vec();
        for (name, data) in [("crt0.o", &b"abc"[..]), ("libc.o", &b"defg"[..])] {
            archive.extend_from_slice(&header(name, data.len()));
            archive.extend_from_slice(data);
            if archive.len() % 2 == 1 {
                archive.push(b'\n');
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libamiga.a");
        fs::write(&path, archive).unwrap();

        let members = ar::read_file(&path).unwrap();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["crt0.o", "libc.o"]);
        assert_eq!(members[1].data, b"defg");
    }
}
