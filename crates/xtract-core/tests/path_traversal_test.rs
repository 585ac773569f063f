//! Entries that would land outside the destination are refused

use std::fs;
use xtract_core::{extract, extract_with_options, validate_path, Error, ErrorKind, ExtractOptions};
use xtract_testing::assertions::assert_absent;
use xtract_testing::fixtures::{write_tar, write_tar_gz, FixtureEntry};
use xtract_testing::TestDir;

#[test]
fn test_parent_segments_are_rejected() {
    let dir = TestDir::new().unwrap();
    let archive = write_tar(
        &dir.join("evil.tar"),
        &[FixtureEntry::file("../../etc/passwd", "root::0:0")],
    )
    .unwrap();
    let dest = dir.join("a/b/dest");

    let err = extract(&archive, &dest).unwrap_err();
    match &err {
        Error::PathTraversal { entry, .. } => assert_eq!(entry, "../../etc/passwd"),
        other => panic!("expected traversal, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::PathTraversal);
    assert_absent(&dir.join("a/etc"));
    assert_absent(&dir.join("etc"));
}

#[test]
fn test_absolute_and_backslash_names_are_rejected() {
    let dir = TestDir::new().unwrap();

    for (file, name) in [("abs.tar", "/tmp/xtract-absolute.txt"), ("bs.tar", "pkg\\..\\..\\win.txt")] {
        let archive = write_tar(&dir.join(file), &[FixtureEntry::file(name, "x")]).unwrap();
        let err = extract(&archive, dir.join("out")).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{name}: {err:?}");
    }
    assert_absent(&dir.join("win.txt"));
}

#[test]
#[cfg(unix)]
fn test_symlinked_parent_cannot_escape() {
    let dir = TestDir::new().unwrap();
    let outside = dir.create_dir("outside").unwrap();
    let target = fs::canonicalize(&outside).unwrap();

    let archive = write_tar_gz(
        &dir.join("sneaky.tgz"),
        &[
            FixtureEntry::dir("app/"),
            FixtureEntry::symlink("app/link", target.to_str().unwrap()),
            FixtureEntry::file("app/link/pwned.txt", "gotcha"),
        ],
    )
    .unwrap();

    let err = extract(&archive, dir.join("out")).unwrap_err();
    assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
    assert_absent(&outside.join("pwned.txt"));
    // Earlier entries stay on disk
    assert!(fs::symlink_metadata(dir.join("out/app/link")).is_ok());
}

#[test]
fn test_hardlink_target_outside_is_rejected() {
    let dir = TestDir::new().unwrap();
    dir.create_file("secret.txt", b"top secret").unwrap();
    let archive = write_tar(
        &dir.join("link.tar"),
        &[FixtureEntry::hardlink("pkg/copy.txt", "../secret.txt")],
    )
    .unwrap();

    let err = extract(&archive, dir.join("out")).unwrap_err();
    assert!(matches!(err, Error::PathTraversal { .. }), "{err:?}");
    assert_absent(&dir.join("out/pkg/copy.txt"));
}

#[test]
fn test_external_symlinks_can_be_refused() {
    let dir = TestDir::new().unwrap();
    let archive = write_tar(
        &dir.join("links.tar"),
        &[
            FixtureEntry::dir("pkg/"),
            FixtureEntry::symlink("pkg/ok", "sibling.txt"),
            FixtureEntry::symlink("pkg/up", "../../elsewhere"),
        ],
    )
    .unwrap();

    let mut options = ExtractOptions::default();
    options.security.allow_external_symlinks = false;

    let err = extract_with_options(&archive, dir.join("out"), &options).unwrap_err();
    assert!(matches!(err, Error::SecurityError(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::PathTraversal);
    assert_absent(&dir.join("out/pkg/up"));
}

#[test]
fn test_extraction_halts_at_first_bad_entry() {
    let dir = TestDir::new().unwrap();
    let archive = write_tar(
        &dir.join("mixed.tar"),
        &[
            FixtureEntry::file("data/first.txt", "1"),
            FixtureEntry::file("data/../../escape.txt", "2"),
            FixtureEntry::file("data/third.txt", "3"),
        ],
    )
    .unwrap();
    let dest = dir.join("out");

    assert!(extract(&archive, &dest).is_err());
    assert_eq!(fs::read_to_string(dest.join("data/first.txt")).unwrap(), "1");
    assert_absent(&dest.join("data/third.txt"));
    assert_absent(&dir.join("escape.txt"));
}

#[test]
fn test_dot_slash_root_entry_is_harmless() {
    let dir = TestDir::new().unwrap();
    let archive = write_tar(
        &dir.join("dot.tar"),
        &[
            FixtureEntry::dir("./").mode(0o700).mtime(1_000_000_000),
            FixtureEntry::file("./pkg/file.txt", "ok"),
        ],
    )
    .unwrap();
    let dest = dir.create_dir("out").unwrap();
    let before = fs::metadata(&dest).unwrap();

    extract(&archive, &dest).unwrap();

    assert_eq!(fs::read_to_string(dest.join("pkg/file.txt")).unwrap(), "ok");
    let after = fs::metadata(&dest).unwrap().modified().unwrap();
    assert_ne!(after, std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000));
    assert!(after >= before.modified().unwrap());
    assert_eq!(fs::metadata(&dest).unwrap().permissions(), before.permissions());
}

#[test]
fn test_validate_path_checks_names_without_an_archive() {
    let dir = TestDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();

    assert_eq!(validate_path(dir.path(), "pkg/./a.txt").unwrap(), root.join("pkg/a.txt"));
    assert!(matches!(
        validate_path(dir.path(), "pkg/../../a.txt"),
        Err(Error::PathTraversal { .. })
    ));
    // The destination has to exist already
    assert!(validate_path(&dir.join("missing"), "a.txt").is_err());
}
