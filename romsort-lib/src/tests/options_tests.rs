use super::*;
use romsort_core::Checksums;

#[test]
fn parses_partial_toml() {
    let options = Options::from_toml_str(
        r#"
commands = ["copy", "zip"]
output = "out/{datName}"
dir_letter = true
zip_exclude = [".cue"]
"#,
    )
    .unwrap();

    assert!(options.should_copy());
    assert!(options.should_zip());
    assert!(options.should_write());
    assert!(!options.should_move());
    assert!(options.dir_letter);
    assert_eq!(options.dir_letter_count, 1);
    assert_eq!(options.write_retry, 2);
    assert_eq!(options.dir_game_subdir, GameSubdirMode::Multiple);
}

#[test]
fn rejects_unknown_command() {
    let err = Options::from_toml_str(r#"commands = ["shred"]"#).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn rejects_conflicting_commands() {
    for commands in [
        r#"commands = ["copy", "move"]"#,
        r#"commands = ["copy", "zip", "extract"]"#,
        r#"commands = ["link", "zip"]"#,
        r#"commands = ["zip"]"#,
    ] {
        let err = Options::from_toml_str(commands).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{commands}");
    }
}

#[test]
fn zip_exclude_routes_rom_to_extract() {
    let options = Options {
        zip_exclude: vec!["cue".into()],
        ..Options::default()
    }
    .with_commands(&[Command::Copy, Command::Zip]);

    let cue = Rom::new("Game.cue", 10, Checksums::new());
    let bin = Rom::new("Game.bin", 10, Checksums::new());
    assert!(!options.should_zip_rom(&cue));
    assert!(options.should_extract_rom(&cue));
    assert!(options.should_zip_rom(&bin));
    assert!(!options.should_extract_rom(&bin));
}

#[test]
fn header_removal_by_extension() {
    let mut options = Options::default();
    assert!(!options.can_remove_header("nes"));

    options.remove_headers = Some(Vec::new());
    assert!(options.can_remove_header("nes"));
    assert!(options.can_remove_header(".lnx"));

    options.remove_headers = Some(vec![".LNX".into()]);
    assert!(options.can_remove_header("lnx"));
    assert!(!options.can_remove_header("nes"));
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("options.toml");
    std::fs::write(&path, "commands = [\"move\"]\nwrite_retry = 5\n").unwrap();

    let options = Options::load(&path).unwrap();
    assert!(options.should_move());
    assert_eq!(options.write_retry, 5);

    let missing = Options::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Io(_)));
}

#[test]
fn default_path_is_under_romsort() {
    let path = Options::default_path();
    assert!(path.ends_with("romsort/options.toml"));
}
