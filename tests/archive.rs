use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use zipcode::{Archive, CompressionLevel, EntryMetadata, WriteMode, ZipError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scratch() -> (TempDir, PathBuf) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("archive.zip");
    (dir, path)
}

fn sample_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("readme.txt", b"hello, archive".to_vec()),
        ("data/empty.bin", Vec::new()),
        ("data/numbers.bin", (0..=255u8).cycle().take(10_000).collect()),
        (
            "docs/lorem.txt",
            "lorem ipsum dolor sit amet ".repeat(200).into_bytes(),
        ),
    ]
}

#[test]
fn round_trip_preserves_bytes_and_metadata() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);
    let samples = sample_entries();

    archive
        .write(WriteMode::Overwrite, |writer| {
            for (name, data) in &samples {
                writer.write_entry_named(name, data)?;
            }
            Ok::<_, ZipError>(())
        })
        .unwrap();

    archive
        .read(|reader| {
            for (name, data) in &samples {
                assert_eq!(&reader.read_entry_named(name)?, data, "{name}");

                let meta = reader.entry_named(name)?;
                assert_eq!(meta.uncompressed_size, data.len() as u64);
                assert_eq!(meta.crc32, crc32fast::hash(data));
                assert!(!meta.is_directory);
            }
            Ok::<_, ZipError>(())
        })
        .unwrap();
}

#[test]
fn every_compression_level_round_trips() {
    let (_dir, path) = scratch();
    let data = "abcabcabd".repeat(1000).into_bytes();

    for level in 0..=9 {
        let archive =
            Archive::new(&path).with_compression_level(CompressionLevel::new(level).unwrap());
        archive
            .write(WriteMode::Overwrite, |w| w.write_entry_named("x.txt", &data))
            .unwrap();
        let back = archive.read(|r| r.read_entry_named("x.txt")).unwrap();
        assert_eq!(back, data, "level {level}");
    }

    let stored = std::fs::metadata(&path).unwrap().len();
    assert!(stored < data.len() as u64, "level 9 should compress");
}

#[test]
fn entries_are_listed_in_index_order_and_stable() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);

    archive
        .write(WriteMode::Overwrite, |writer| {
            writer.write_entry_named("b.txt", b"bee")?;
            writer.add_directory("nested")?;
            writer.write_entry_named("nested/a.txt", b"ay")
        })
        .unwrap();

    let (first, second) = archive
        .read(|reader| Ok::<_, ZipError>((reader.entries()?, reader.entries()?)))
        .unwrap();

    assert_eq!(first, second);
    let names: Vec<_> = first.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["b.txt", "nested/", "nested/a.txt"]);
    for (position, entry) in first.iter().enumerate() {
        assert_eq!(entry.index, position);
    }
    assert_eq!(
        first[1],
        EntryMetadata {
            index: 1,
            name: "nested/".into(),
            is_directory: true,
            uncompressed_size: 0,
            crc32: 0,
        }
    );
}

#[test]
fn append_preserves_prior_entries() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);

    archive
        .write(WriteMode::Overwrite, |w| w.write_entry_named("n1.txt", b"first"))
        .unwrap();
    archive
        .write(WriteMode::Append, |w| w.write_entry_named("n2.txt", b"second"))
        .unwrap();

    let fresh = Archive::new(&path);
    let (count, n1, n2) = fresh
        .read(|r| {
            Ok::<_, ZipError>((
                r.entry_count()?,
                r.read_entry_named("n1.txt")?,
                r.read_entry_named("n2.txt")?,
            ))
        })
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(n1, b"first");
    assert_eq!(n2, b"second");
}

#[test]
fn append_requires_existing_archive() {
    let (_dir, path) = scratch();
    let result = Archive::new(&path).write(WriteMode::Append, |w| w.write_entry_named("a", b"a"));
    assert_eq!(result, Err(ZipError::ArchiveOpenFailed(path.clone())));
    assert!(!path.exists());
}

#[test]
fn overwrite_discards_previous_content() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);

    archive
        .write(WriteMode::Overwrite, |w| w.write_entry_named("old.txt", b"old"))
        .unwrap();
    archive
        .write(WriteMode::Overwrite, |w| w.write_entry_named("new.txt", b"new"))
        .unwrap();

    let names = archive
        .read(|r| r.entries())
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect::<Vec<_>>();
    assert_eq!(names, ["new.txt"]);
}

#[test]
fn failing_callback_still_releases_the_archive() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);

    let result: anyhow::Result<()> = archive.write(WriteMode::Overwrite, |writer| {
        writer.write_entry_named("one.txt", b"1")?;
        writer.write_entry_named("two.txt", b"2")?;
        anyhow::bail!("callback gave up")
    });
    assert_eq!(result.unwrap_err().to_string(), "callback gave up");

    // Entries stored before the failure remain, and the file reopens at once
    let count = archive.read(|r| r.entry_count()).unwrap();
    assert_eq!(count, 2);
    archive
        .write(WriteMode::Append, |w| w.write_entry_named("three.txt", b"3"))
        .unwrap();
    assert_eq!(archive.read(|r| r.entry_count()).unwrap(), 3);
}

#[test]
fn panicking_callback_still_releases_the_archive() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = archive.write(WriteMode::Overwrite, |writer| {
            writer.write_entry_named("kept.txt", b"kept")?;
            if writer.entry_count()? == 1 {
                panic!("boom");
            }
            Ok::<_, ZipError>(())
        });
    }));
    assert!(outcome.is_err());

    let data = archive.read(|r| r.read_entry_named("kept.txt")).unwrap();
    assert_eq!(data, b"kept");
}

#[test]
fn missing_entry_leaves_reader_usable() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);
    archive
        .write(WriteMode::Overwrite, |w| w.write_entry_named("present.txt", b"here"))
        .unwrap();

    archive
        .read(|reader| {
            assert_eq!(
                reader.read_entry_named("does/not/exist"),
                Err(ZipError::EntryOpenFailed("does/not/exist".into()))
            );
            assert_eq!(reader.read_entry(9), Err(ZipError::EntryOpenByIndexFailed(9)));
            assert_eq!(reader.read_entry_named("present.txt")?, b"here");
            assert_eq!(reader.entry_count()?, 1);
            Ok::<_, ZipError>(())
        })
        .unwrap();
}

#[test]
fn opening_a_missing_archive_never_runs_the_callback() {
    let (dir, _) = scratch();
    let missing = dir.path().join("missing.zip");

    let mut called = false;
    let result = Archive::new(&missing).read(|_| {
        called = true;
        Ok::<_, ZipError>(())
    });
    assert_eq!(result, Err(ZipError::ArchiveOpenFailed(missing)));
    assert!(!called);
}

#[test]
fn non_zip_files_fail_to_open() {
    let (_dir, path) = scratch();
    std::fs::write(&path, b"plain text, not an archive").unwrap();

    let result = Archive::new(&path).read(|r| r.entry_count());
    assert_eq!(result, Err(ZipError::ArchiveOpenFailed(path)));
}

#[test]
fn file_transfers_by_index_and_name() {
    let (dir, path) = scratch();
    let source = dir.path().join("source.txt");
    std::fs::write(&source, "from disk\n".repeat(100)).unwrap();
    let archive = Archive::new(&path);

    archive
        .write(WriteMode::Overwrite, |w| {
            w.write_entry_named_from_file("copy.txt", &source)?;
            w.write_entry_named("other.txt", b"placeholder")?;
            // replace entry 1 in place from the same file
            w.write_entry_from_file(1, &source)
        })
        .unwrap();

    let by_name = dir.path().join("by_name.txt");
    let by_index = dir.path().join("by_index.txt");
    archive
        .read(|r| {
            r.read_entry_named_to_file("copy.txt", &by_name)?;
            r.read_entry_to_file(1, &by_index)
        })
        .unwrap();

    let expected = std::fs::read(&source).unwrap();
    assert_eq!(std::fs::read(by_name).unwrap(), expected);
    assert_eq!(std::fs::read(by_index).unwrap(), expected);
}

#[test]
fn missing_source_file_fails_the_write() {
    let (dir, path) = scratch();
    let archive = Archive::new(&path);

    let result = archive.write(WriteMode::Overwrite, |w| {
        w.write_entry_named_from_file("ghost.txt", dir.path().join("ghost"))
    });
    assert_eq!(result, Err(ZipError::EntryWriteFailed));

    // The half-written entry is dropped, not stored empty
    assert_eq!(archive.read(|r| r.entry_count()).unwrap(), 0);
}

#[test]
fn writes_by_index_replace_existing_entries() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);

    archive
        .write(WriteMode::Overwrite, |w| {
            w.write_entry_named("a.txt", b"a")?;
            w.write_entry_named("b.txt", b"b")
        })
        .unwrap();
    archive
        .write(WriteMode::Append, |w| {
            let before = w.entries()?;
            w.write(&before[0], b"replaced")?;
            assert_eq!(w.write_entry(5, b"nope"), Err(ZipError::EntryOpenByIndexFailed(5)));
            w.entry_count()
        })
        .map(|count| assert_eq!(count, 2))
        .unwrap();

    let (a, b) = archive
        .read(|r| Ok::<_, ZipError>((r.read_entry(0)?, r.read_entry_named("b.txt")?)))
        .unwrap();
    assert_eq!(a, b"replaced");
    assert_eq!(b, b"b");
}

#[test]
fn sequential_scopes_never_see_torn_writes() {
    let (_dir, path) = scratch();
    let archive = Arc::new(Archive::new(&path));
    archive
        .write(WriteMode::Overwrite, |_| Ok::<_, ZipError>(()))
        .unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let archive = Arc::clone(&archive);
            thread::spawn(move || {
                archive
                    .write(WriteMode::Append, |w| {
                        for i in 0..3 {
                            w.write_entry_named(&format!("t{t}/{i}.txt"), b"x")?;
                        }
                        Ok::<_, ZipError>(())
                    })
                    .unwrap();
                archive.read(|r| r.entry_count()).unwrap()
            })
        })
        .collect();

    for handle in writers {
        let seen = handle.join().unwrap();
        assert_eq!(seen % 3, 0, "saw a partial write: {seen} entries");
    }
    assert_eq!(archive.read(|r| r.entry_count()).unwrap(), 12);
}

#[test]
fn archives_are_readable_by_entry_metadata() {
    let (_dir, path) = scratch();
    let archive = Archive::new(&path);
    archive
        .write(WriteMode::Overwrite, |w| {
            w.write_entry_named("\\windows\\style.txt", b"slashes")
        })
        .unwrap();

    archive
        .read(|r| {
            let entries = r.entries()?;
            assert_eq!(entries[0].name, "windows/style.txt");
            assert_eq!(r.read(&entries[0])?, b"slashes");
            assert_eq!(r.read("windows/style.txt")?, b"slashes");
            Ok::<_, ZipError>(())
        })
        .unwrap();
}
