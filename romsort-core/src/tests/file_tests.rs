use super::*;

fn nes_file() -> File {
    let header = FileHeader::by_name("No-Intro_NES.xml").unwrap();
    File::raw(
        "/roms/Game (USA).nes",
        40976,
        Checksums::new().with_crc32("11111111"),
    )
    .with_header(header, 40960, Checksums::new().with_crc32("22222222"))
}

#[test]
fn without_header_uses_headerless_fields() {
    let stripped = nes_file().without_header();
    assert_eq!(stripped.size(), 40960);
    assert_eq!(stripped.checksums().crc32.as_deref(), Some("22222222"));
    assert!(stripped.header().is_none());
}

#[test]
fn forget_header_keeps_headered_fields() {
    let kept = nes_file().forget_header();
    assert_eq!(kept.size(), 40976);
    assert_eq!(kept.checksums().crc32.as_deref(), Some("11111111"));
    assert_eq!(kept.size_without_header(), 40976);
    assert!(kept.header().is_none());
}

#[test]
fn file_values_are_not_mutated() {
    let original = nes_file();
    let _stripped = original.clone().without_header();
    assert!(original.header().is_some());
    assert_eq!(original.size(), 40976);
}

#[test]
fn archive_entry_paths_and_display() {
    let archive = Archive::from_path("/in/two.7z").unwrap();
    let entry = File::entry(archive, "sub/a.rom", 1, Checksums::new().with_crc32("abcdef90"));
    assert_eq!(entry.file_path(), Path::new("/in/two.7z"));
    assert_eq!(entry.entry_path(), Some("sub/a.rom"));
    assert_eq!(entry.file_name(), "a.rom");
    assert_eq!(entry.to_string(), "/in/two.7z|sub/a.rom");
}

#[test]
fn with_file_path_relocates_archive() {
    let archive = Archive::from_path("/in/two.7z").unwrap();
    let entry = File::entry(archive, "a.rom", 1, Checksums::new());
    let moved = entry.with_file_path("/out/Two.zip");
    assert_eq!(moved.archive().unwrap().kind(), ArchiveKind::Zip);
    assert_eq!(moved.entry_path(), Some("a.rom"));
}

#[test]
fn into_archive_file_drops_entry_details() {
    let archive = Archive::from_path("/in/game.zip").unwrap();
    let entry = File::entry(archive.clone(), "a.rom", 5, Checksums::new().with_crc32("1"))
        .with_patch(Patch {
            path: "/patches/fix.ips".into(),
            crc_before: "00000001".into(),
            crc_after: None,
            size_after: None,
        });
    let whole = entry.into_archive_file();
    assert!(whole.is_archive_file());
    assert!(whole.patch().is_none());
    assert!(whole.checksums().is_empty());
    assert_eq!(whole.archive(), Some(&archive));
    assert_eq!(whole.to_string(), "/in/game.zip");
}
