use super::*;
use crate::options::Command;
use romsort_core::{Checksums, FileHeader};

fn crc(value: &str) -> Checksums {
    Checksums::new().with_crc32(value)
}

fn copy_options() -> Options {
    Options::default()
        .with_commands(&[Command::Copy])
        .with_output("/out")
}

fn archive(path: &str) -> Archive {
    Archive::from_path(path).unwrap()
}

async fn generate(options: Options, dat: Dat, files: Vec<File>) -> Vec<ParentCandidates> {
    let generator = CandidateGenerator::new(Arc::new(options));
    generator
        .generate(Arc::new(dat), Arc::new(IndexedFiles::from_files(files)))
        .await
}

async fn candidates(options: Options, dat: Dat, files: Vec<File>) -> Vec<Candidate> {
    generate(options, dat, files)
        .await
        .into_iter()
        .flat_map(|p| p.candidates)
        .collect()
}

fn two_rom_game() -> Game {
    Game::new("gameWithTwoRomsParent")
        .with_rom(Rom::new("two.a", 4, crc("abcdef90")))
        .with_rom(Rom::new("two.b", 4, crc("09876543")))
}

#[tokio::test]
async fn prefers_archive_holding_every_rom() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let both = archive("/in/both.zip");
    let files = vec![
        File::raw("/in/two.a", 4, crc("abcdef90")),
        File::raw("/in/two.b", 4, crc("09876543")),
        File::entry(both.clone(), "two.a", 4, crc("abcdef90")),
        File::entry(both.clone(), "two.b", 4, crc("09876543")),
    ];

    let found = candidates(copy_options(), dat, files).await;
    assert_eq!(found.len(), 1);
    let bindings = found[0].roms_with_files();
    assert_eq!(bindings.len(), 2);
    for binding in bindings {
        assert_eq!(binding.input_file().file_path(), Path::new("/in/both.zip"));
        assert!(binding.input_file().is_archive_file());
        assert_eq!(
            binding.output_file().file_path(),
            Path::new("/out/gameWithTwoRomsParent.zip")
        );
    }
}

#[tokio::test]
async fn renamed_entries_in_7z_are_used_together() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let two = archive("/in/two.7z");
    let files = vec![
        File::raw("/in/raw/two.a", 4, crc("abcdef90")),
        File::entry(two.clone(), "a.rom", 4, crc("abcdef90")),
        File::entry(two.clone(), "b.rom", 4, crc("09876543")),
    ];

    let found = candidates(copy_options(), dat.clone(), files.clone()).await;
    assert_eq!(found.len(), 1);
    let outputs: Vec<_> = found[0]
        .roms_with_files()
        .iter()
        .map(|b| b.output_file().file_path().to_path_buf())
        .collect();
    assert_eq!(
        outputs,
        vec![
            PathBuf::from("/out/gameWithTwoRomsParent.7z"),
            PathBuf::from("/out/gameWithTwoRomsParent.7z")
        ]
    );

    // Zipping re-encodes entries under the DAT's names.
    let zip = copy_options().with_commands(&[Command::Copy, Command::Zip]);
    let found = candidates(zip, dat, files).await;
    assert_eq!(found.len(), 1);
    let bindings = found[0].roms_with_files();
    assert_eq!(bindings[0].input_file().to_string(), "/in/two.7z|a.rom");
    assert_eq!(bindings[1].input_file().to_string(), "/in/two.7z|b.rom");
    assert_eq!(
        bindings[0].output_file().to_string(),
        "/out/gameWithTwoRomsParent.zip|two.a"
    );
    assert_eq!(
        bindings[1].output_file().to_string(),
        "/out/gameWithTwoRomsParent.zip|two.b"
    );
}

#[tokio::test]
async fn conflicting_archives_yield_no_candidate() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let files = vec![
        File::entry(archive("/in/first.7z"), "two.a", 4, crc("abcdef90")),
        File::entry(archive("/in/second.7z"), "two.b", 4, crc("09876543")),
    ];

    let result = generate(copy_options(), dat, files).await;
    assert_eq!(result.len(), 1);
    assert!(result[0].is_empty());
}

#[tokio::test]
async fn excess_entries_gate_the_candidate() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let extra = archive("/in/extra.7z");
    let files = vec![
        File::entry(extra.clone(), "two.a", 4, crc("abcdef90")),
        File::entry(extra.clone(), "two.b", 4, crc("09876543")),
        File::entry(extra.clone(), "readme.txt", 10, crc("11111111")),
    ];

    let strict = candidates(copy_options(), dat.clone(), files.clone()).await;
    assert!(strict.is_empty());

    let mut lenient = copy_options();
    lenient.allow_excess_sets = true;
    assert_eq!(candidates(lenient, dat.clone(), files.clone()).await.len(), 1);

    // Extraction never carries the archive along, so excess is irrelevant.
    let extract = copy_options().with_commands(&[Command::Copy, Command::Extract]);
    assert_eq!(candidates(extract, dat, files).await.len(), 1);
}

#[tokio::test]
async fn total_miss_yields_no_candidate() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let files = vec![File::raw("/in/unrelated.bin", 4, crc("deadbeef"))];

    let mut options = copy_options();
    let result = generate(options.clone(), dat.clone(), files.clone()).await;
    assert!(result[0].candidates.is_empty());

    options.allow_incomplete_sets = true;
    assert!(candidates(options, dat, files).await.is_empty());
}

#[tokio::test]
async fn incomplete_sets_need_opt_in() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let files = vec![File::raw("/in/two.a", 4, crc("abcdef90"))];

    assert!(candidates(copy_options(), dat.clone(), files.clone()).await.is_empty());

    let mut options = copy_options();
    options.allow_incomplete_sets = true;
    let found = candidates(options, dat, files).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].roms_with_files().len(), 1);
    assert_eq!(found[0].roms_with_files()[0].rom().name, "two.a");
}

#[tokio::test]
async fn game_without_roms_is_still_a_candidate() {
    let dat = Dat::new("test", vec![Game::new("Empty")]);
    let found = candidates(copy_options(), dat, Vec::new()).await;
    assert_eq!(found.len(), 1);
    assert!(found[0].roms_with_files().is_empty());
}

#[tokio::test]
async fn generation_is_idempotent_and_ordered() {
    let games = vec![
        Game::new("Zeta").with_rom(Rom::new("Zeta.bin", 1, crc("00000003"))),
        Game::new("Alpha").with_rom(Rom::new("Alpha.bin", 1, crc("00000001"))),
        Game::new("Alpha (Clone)")
            .with_clone_of("Alpha")
            .with_rom(Rom::new("Alpha (Clone).bin", 1, crc("00000002"))),
        two_rom_game(),
    ];
    let dat = Dat::new("test", games);
    let two = archive("/in/two.7z");
    let files = vec![
        File::raw("/in/z.bin", 1, crc("00000003")),
        File::raw("/in/a.bin", 1, crc("00000001")),
        File::raw("/in/ac.bin", 1, crc("00000002")),
        File::entry(two.clone(), "a.rom", 4, crc("abcdef90")),
        File::entry(two, "b.rom", 4, crc("09876543")),
    ];

    let mut options = copy_options();
    options.max_threads = 3;
    let first = generate(options.clone(), dat.clone(), files.clone()).await;
    let second = generate(options, dat, files).await;
    assert_eq!(first, second);

    let parents: Vec<_> = first.iter().map(|p| p.parent.as_str()).collect();
    assert_eq!(parents, vec!["Zeta", "Alpha", "gameWithTwoRomsParent"]);
    let alpha: Vec<_> = first[1].candidates.iter().map(|c| c.name()).collect();
    assert_eq!(alpha, vec!["Alpha", "Alpha (Clone)"]);
}

#[tokio::test]
async fn one_candidate_per_release() {
    let game = Game::new("Game")
        .with_rom(Rom::new("Game.bin", 1, crc("00000001")))
        .with_release(Release {
            name: "Game (USA)".into(),
            region: "USA".into(),
            language: None,
        })
        .with_release(Release {
            name: "Game (Europe)".into(),
            region: "EUR".into(),
            language: None,
        });
    let dat = Dat::new("test", vec![game]);
    let files = vec![File::raw("/in/g.bin", 1, crc("00000001"))];

    let options = copy_options().with_output("/out/{region}");
    let found = candidates(options, dat, files).await;
    assert_eq!(found.len(), 2);
    assert_eq!(
        found[0].roms_with_files()[0].output_file().file_path(),
        Path::new("/out/USA/Game.bin")
    );
    assert_eq!(
        found[1].roms_with_files()[0].output_file().file_path(),
        Path::new("/out/EUR/Game.bin")
    );
}

#[tokio::test]
async fn path_errors_only_unbind_that_rom() {
    let dat = Dat::new(
        "test",
        vec![
            Game::new("Known").with_rom(Rom::new("Known.nes", 1, crc("00000001"))),
            Game::new("Unknown").with_rom(Rom::new("Unknown.xyz", 1, crc("00000002"))),
        ],
    );
    let files = vec![
        File::raw("/in/k.nes", 1, crc("00000001")),
        File::raw("/in/u.xyz", 1, crc("00000002")),
    ];

    let options = copy_options().with_output("/out/{pocket}");
    let found = candidates(options, dat, files).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].game().name, "Known");
}

fn headered_fixture() -> (Dat, File) {
    let header = FileHeader::by_name("No-Intro_NES.xml").unwrap();
    let rom = Rom::new("Game.nes", 32, crc("11111111"));
    let dat = Dat::new("test", vec![Game::new("Game").with_rom(rom)]);
    let file = File::raw("/in/Game.nes", 32, crc("11111111")).with_header(header, 16, crc("22222222"));
    (dat, file)
}

#[tokio::test]
async fn matching_headered_file_keeps_its_header() {
    let (dat, file) = headered_fixture();
    let found = candidates(copy_options(), dat, vec![file]).await;
    assert_eq!(found.len(), 1);

    let binding = &found[0].roms_with_files()[0];
    assert!(binding.input_file().header().is_none());
    assert_eq!(binding.input_file().file_path(), Path::new("/in/Game.nes"));
    assert_eq!(binding.output_file().size(), 32);
    assert_eq!(binding.output_file().checksums().crc32.as_deref(), Some("11111111"));
}

#[tokio::test]
async fn headerless_dat_strips_header_but_cannot_link() {
    let header = FileHeader::by_name("No-Intro_NES.xml").unwrap();
    let rom = Rom::new("Game.nes", 16, crc("22222222"));
    let dat = Dat::new("test", vec![Game::new("Game").with_rom(rom)]);
    let file = File::raw("/in/Game.nes", 32, crc("11111111")).with_header(header, 16, crc("22222222"));

    let found = candidates(copy_options(), dat.clone(), vec![file.clone()]).await;
    assert_eq!(found.len(), 1);
    let binding = &found[0].roms_with_files()[0];
    assert!(binding.input_file().header().is_some());
    assert_eq!(binding.output_file().size(), 16);
    assert_eq!(binding.output_file().checksums().crc32.as_deref(), Some("22222222"));

    let link = copy_options().with_commands(&[Command::Link]);
    assert!(candidates(link, dat, vec![file]).await.is_empty());
}

#[tokio::test]
async fn headered_entries_are_not_linked_out_of_their_archive() {
    let header = FileHeader::by_name("No-Intro_NES.xml").unwrap();
    let dat = Dat::new(
        "test",
        vec![Game::new("Game")
            .with_rom(Rom::new("a.nes", 32, crc("11111111")))
            .with_rom(Rom::new("b.nes", 8, crc("33333333")))],
    );
    let zip = archive("/in/g.zip");
    let files = vec![
        File::entry(zip.clone(), "a.nes", 32, crc("11111111")).with_header(header, 16, crc("22222222")),
        File::entry(zip, "b.nes", 8, crc("33333333")),
    ];

    let link = Options::default()
        .with_commands(&[Command::Link])
        .with_output("/out");
    assert!(candidates(link, dat.clone(), files.clone()).await.is_empty());

    let found = candidates(copy_options(), dat, files).await;
    assert_eq!(found.len(), 1);
    assert!(found[0].roms_with_files().iter().all(|b| b.input_file().is_archive_entry()));
}

#[tokio::test]
async fn chd_missing_only_cue_is_complete() {
    let game = Game::new("Disc Game")
        .with_rom(Rom::new("Disc Game.cue", 100, crc("cccccccc")))
        .with_rom(Rom::new("Disc Game.bin", 4096, crc("bbbbbbbb")));
    let dat = Dat::new("test", vec![game]);
    let chd = archive("/in/Disc Game.chd");
    let files = vec![
        File::entry(chd.clone(), "Disc Game.bin", 4096, crc("bbbbbbbb")),
        File::entry(chd.clone(), "Disc Game.cue", 90, crc("99999999")),
    ];

    let found = candidates(copy_options(), dat, files).await;
    assert_eq!(found.len(), 1);
    let bindings = found[0].roms_with_files();
    assert_eq!(bindings.len(), 2);
    assert!(bindings.iter().all(|b| b.input_file().is_archive_file()));
    assert_eq!(
        bindings[0].output_file().file_path(),
        Path::new("/out/Disc Game.chd")
    );
}

#[tokio::test]
async fn zip_with_matching_entries_passes_through() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let zip = archive("/in/whatever.zip");
    let files = vec![
        File::entry(zip.clone(), "two.a", 4, crc("abcdef90")),
        File::entry(zip.clone(), "two.b", 4, crc("09876543")),
    ];

    let options = copy_options().with_commands(&[Command::Copy, Command::Zip]);
    let found = candidates(options, dat, files).await;
    assert_eq!(found.len(), 1);
    for binding in found[0].roms_with_files() {
        assert!(binding.input_file().is_archive_file());
        assert!(!binding.output_file().is_archive_entry());
        assert_eq!(
            binding.output_file().file_path(),
            Path::new("/out/gameWithTwoRomsParent.zip")
        );
    }
}

#[tokio::test]
async fn report_only_binds_input_to_itself() {
    let dat = Dat::new("test", vec![two_rom_game()]);
    let files = vec![
        File::raw("/in/two.a", 4, crc("abcdef90")),
        File::raw("/in/two.b", 4, crc("09876543")),
    ];

    let options = Options::default().with_commands(&[Command::Report]);
    let found = candidates(options, dat, files).await;
    assert_eq!(found.len(), 1);
    for binding in found[0].roms_with_files() {
        assert_eq!(binding.input_file(), binding.output_file());
    }
}
