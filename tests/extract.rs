//! End-to-end extraction tests over in-memory archives.
//!
//! Fixtures are built byte-by-byte (local file headers, central
//! directory, EOCD) so the parser is exercised against the real wire
//! layout without any archive files checked into the repo.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;

use urlzip::{ExtractError, Materializer, Pipeline, ReadAt, ZipExtractor};

const STORED: u16 = 0;
const DEFLATE: u16 = 8;

struct Fixture {
    name: &'static str,
    data: Vec<u8>,
    method: u16,
    /// Unix permission bits; zero leaves the external attributes empty.
    mode: u32,
}

impl Fixture {
    fn file(name: &'static str, data: &[u8]) -> Self {
        Self {
            name,
            data: data.to_vec(),
            method: STORED,
            mode: 0o644,
        }
    }

    fn dir(name: &'static str) -> Self {
        Self {
            name,
            data: Vec::new(),
            method: STORED,
            mode: 0o755,
        }
    }
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Serialize fixtures into a complete single-disk ZIP archive.
fn build_zip(fixtures: &[Fixture], comment: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut records = Vec::new();

    for fixture in fixtures {
        let compressed = match fixture.method {
            DEFLATE => deflate(&fixture.data),
            _ => fixture.data.clone(),
        };

        let offset = buf.len() as u32;
        buf.extend_from_slice(b"PK\x03\x04");
        buf.write_u16::<LittleEndian>(20).unwrap(); // version needed
        buf.write_u16::<LittleEndian>(0).unwrap(); // flags
        buf.write_u16::<LittleEndian>(fixture.method).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // mod time
        buf.write_u16::<LittleEndian>(0).unwrap(); // mod date
        buf.write_u32::<LittleEndian>(0).unwrap(); // crc32
        buf.write_u32::<LittleEndian>(compressed.len() as u32).unwrap();
        buf.write_u32::<LittleEndian>(fixture.data.len() as u32).unwrap();
        buf.write_u16::<LittleEndian>(fixture.name.len() as u16).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // extra len
        buf.extend_from_slice(fixture.name.as_bytes());
        buf.extend_from_slice(&compressed);

        records.push((offset, compressed.len() as u32, fixture));
    }

    let cd_offset = buf.len() as u32;
    for (offset, compressed_len, fixture) in &records {
        let file_type = if fixture.name.ends_with('/') {
            0o040000
        } else {
            0o100000
        };
        let external = if fixture.mode != 0 {
            (file_type | fixture.mode) << 16
        } else {
            0
        };

        buf.extend_from_slice(b"PK\x01\x02");
        buf.write_u16::<LittleEndian>((3 << 8) | 30).unwrap(); // made on unix
        buf.write_u16::<LittleEndian>(20).unwrap(); // version needed
        buf.write_u16::<LittleEndian>(0).unwrap(); // flags
        buf.write_u16::<LittleEndian>(fixture.method).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // mod time
        buf.write_u16::<LittleEndian>(0).unwrap(); // mod date
        buf.write_u32::<LittleEndian>(0).unwrap(); // crc32
        buf.write_u32::<LittleEndian>(*compressed_len).unwrap();
        buf.write_u32::<LittleEndian>(fixture.data.len() as u32).unwrap();
        buf.write_u16::<LittleEndian>(fixture.name.len() as u16).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // extra len
        buf.write_u16::<LittleEndian>(0).unwrap(); // comment len
        buf.write_u16::<LittleEndian>(0).unwrap(); // disk number start
        buf.write_u16::<LittleEndian>(0).unwrap(); // internal attrs
        buf.write_u32::<LittleEndian>(external).unwrap();
        buf.write_u32::<LittleEndian>(*offset).unwrap();
        buf.extend_from_slice(fixture.name.as_bytes());
    }
    let cd_size = buf.len() as u32 - cd_offset;

    buf.extend_from_slice(b"PK\x05\x06");
    buf.write_u16::<LittleEndian>(0).unwrap(); // disk number
    buf.write_u16::<LittleEndian>(0).unwrap(); // disk with cd
    buf.write_u16::<LittleEndian>(records.len() as u16).unwrap();
    buf.write_u16::<LittleEndian>(records.len() as u16).unwrap();
    buf.write_u32::<LittleEndian>(cd_size).unwrap();
    buf.write_u32::<LittleEndian>(cd_offset).unwrap();
    buf.write_u16::<LittleEndian>(comment.len() as u16).unwrap();
    buf.extend_from_slice(comment);

    buf
}

/// In-memory random-access source.
struct MemReader(Vec<u8>);

#[async_trait]
impl ReadAt for MemReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.0.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.0.len() - start);
        buf[..n].copy_from_slice(&self.0[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.0.len() as u64
    }
}

/// Run the full pipeline over `archive` into `dest`, returning the
/// failed outcomes as (entry name, error message) pairs.
async fn extract_all(archive: Vec<u8>, dest: &Path, workers: usize) -> Vec<(String, String)> {
    let extractor = ZipExtractor::new(Arc::new(MemReader(archive)));
    let entries = extractor.entries().await.unwrap();

    let materializer = Materializer::new(extractor, dest);
    let mut pipeline = Pipeline::new(workers, 2, Arc::new(materializer));

    let failures = Arc::new(Mutex::new(Vec::new()));
    {
        let failures = failures.clone();
        pipeline.set_outcome_callback(move |entry, error| {
            if let Some(error) = error {
                failures
                    .lock()
                    .unwrap()
                    .push((entry.name.clone(), error.to_string()));
            }
        });
    }

    pipeline.start().unwrap();
    for entry in entries {
        pipeline.send(entry).await.unwrap();
    }
    pipeline.wait().await.stop().await;

    let failures = failures.lock().unwrap().clone();
    failures
}

#[tokio::test]
async fn lists_entries_with_metadata() {
    let archive = build_zip(
        &[
            Fixture::dir("dir/"),
            Fixture::file("dir/a.txt", b"hello"),
            Fixture {
                name: "b.bin",
                data: b"squeeze me please, I repeat, squeeze me please".to_vec(),
                method: DEFLATE,
                mode: 0o600,
            },
        ],
        b"",
    );

    let extractor = ZipExtractor::new(Arc::new(MemReader(archive)));
    let entries = extractor.entries().await.unwrap();

    assert_eq!(entries.len(), 3);
    assert!(entries[0].is_directory);
    assert_eq!(entries[1].name, "dir/a.txt");
    assert_eq!(entries[1].uncompressed_size, 5);
    assert_eq!(entries[1].unix_mode, Some(0o100644));
    assert_eq!(entries[2].unix_mode, Some(0o100600));
    assert!(!entries[2].is_directory);
}

#[tokio::test]
async fn entries_survive_an_archive_comment() {
    let archive = build_zip(
        &[Fixture::file("a.txt", b"hi")],
        b"built by the integration tests",
    );

    let extractor = ZipExtractor::new(Arc::new(MemReader(archive)));
    let entries = extractor.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "a.txt");
}

#[tokio::test]
async fn end_to_end_extraction_with_path_guard() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("out");
    std::fs::create_dir(&dest).unwrap();

    let archive = build_zip(
        &[
            Fixture::dir("dir/"),
            Fixture::file("dir/a.txt", b"hello"),
            Fixture::file("../evil.txt", b"owo"),
        ],
        b"",
    );

    let failures = extract_all(archive, &dest, 4).await;

    assert!(dest.join("dir").is_dir());
    assert_eq!(std::fs::read(dest.join("dir/a.txt")).unwrap(), b"hello");

    // The traversal entry is a per-entry failure, not written anywhere.
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "../evil.txt");
    assert!(!tmp.path().join("evil.txt").exists());
}

#[tokio::test]
async fn reextraction_truncates_and_keeps_siblings() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().to_path_buf();

    let fixtures = || {
        vec![
            Fixture::file("keep.txt", b"sibling"),
            Fixture::file("clobber.txt", b"fresh"),
        ]
    };

    let failures = extract_all(build_zip(&fixtures(), b""), &dest, 2).await;
    assert!(failures.is_empty());

    // Make the target longer than the entry, then re-extract: truncate
    // semantics must leave exactly the entry bytes.
    std::fs::write(dest.join("clobber.txt"), b"previous much longer content").unwrap();
    let failures = extract_all(build_zip(&fixtures(), b""), &dest, 2).await;
    assert!(failures.is_empty());

    assert_eq!(std::fs::read(dest.join("clobber.txt")).unwrap(), b"fresh");
    assert_eq!(std::fs::read(dest.join("keep.txt")).unwrap(), b"sibling");
}

#[tokio::test]
async fn deflate_entries_decode_to_original_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(50);

    let archive = build_zip(
        &[Fixture {
            name: "fox.txt",
            data: payload.clone(),
            method: DEFLATE,
            mode: 0o644,
        }],
        b"",
    );

    let failures = extract_all(archive, tmp.path(), 2).await;
    assert!(failures.is_empty());
    assert_eq!(std::fs::read(tmp.path().join("fox.txt")).unwrap(), payload);
}

#[cfg(unix)]
#[tokio::test]
async fn permission_bits_are_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let archive = build_zip(
        &[Fixture {
            name: "run.sh",
            data: b"#!/bin/sh\n".to_vec(),
            method: STORED,
            mode: 0o755,
        }],
        b"",
    );

    let failures = extract_all(archive, tmp.path(), 1).await;
    assert!(failures.is_empty());

    let mode = std::fs::metadata(tmp.path().join("run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[tokio::test]
async fn unsupported_methods_are_per_entry_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = build_zip(
        &[
            Fixture {
                name: "weird.bin",
                data: b"data".to_vec(),
                method: 12, // bzip2, unsupported
                mode: 0o644,
            },
            Fixture::file("fine.txt", b"ok"),
        ],
        b"",
    );

    let failures = extract_all(archive, tmp.path(), 2).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "weird.bin");
    // The other entry still extracted.
    assert_eq!(std::fs::read(tmp.path().join("fine.txt")).unwrap(), b"ok");
}

#[tokio::test]
async fn local_archives_extract_through_the_same_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let archive_path = tmp.path().join("fixture.zip");
    std::fs::write(
        &archive_path,
        build_zip(&[Fixture::file("nested/deep/c.txt", b"local")], b""),
    )
    .unwrap();

    let reader = Arc::new(urlzip::LocalFileReader::new(&archive_path).unwrap());
    let extractor = ZipExtractor::new(reader);
    let entries = extractor.entries().await.unwrap();

    let dest = tmp.path().join("out");
    let materializer = Materializer::new(extractor, &dest);
    let mut pipeline = Pipeline::new(2, 1, Arc::new(materializer));
    pipeline.start().unwrap();
    for entry in entries {
        pipeline.send(entry).await.unwrap();
    }
    pipeline.wait().await.stop().await;

    assert_eq!(
        std::fs::read(dest.join("nested/deep/c.txt")).unwrap(),
        b"local"
    );
}

#[tokio::test]
async fn guard_failure_is_classified_as_path_escape() {
    let extractor = ZipExtractor::new(Arc::new(MemReader(build_zip(
        &[Fixture::file("../../etc/passwd", b"x")],
        b"",
    ))));
    let entries = extractor.entries().await.unwrap();

    let err = urlzip::resolve_entry_path(Path::new("/out"), &entries[0].name).unwrap_err();
    assert!(matches!(err, ExtractError::PathEscape(_)));
}
