use super::*;
use std::sync::Mutex;

use romsort_core::{Archive, ArchiveKind, ChecksumBitmask, Checksums, File};
use romsort_dat::{Game, Rom};

use crate::candidate::{Candidate, RomWithFiles};
use crate::error::WriteError;
use crate::options::{Command, FixExtension, MergeMode};

fn crc(value: &str) -> Checksums {
    Checksums::new().with_crc32(value)
}

fn single(game: &str, rom: Rom, input: File, output: File) -> ParentCandidates {
    let game = Arc::new(Game::new(game).with_rom(rom.clone()));
    ParentCandidates {
        parent: game.name.clone(),
        candidates: vec![Candidate::new(
            game,
            None,
            vec![RomWithFiles::new(rom, input, output)],
        )],
    }
}

/// Provider returning fixed checksums and counting calls.
#[derive(Default)]
struct FakeProvider {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl ChecksumProvider for FakeProvider {
    fn checksums(&self, file: &File, _bitmask: ChecksumBitmask) -> Result<(u64, Checksums), WriteError> {
        self.calls.lock().unwrap().push(file.to_string());
        if self.fail {
            return Err(WriteError::Io(std::io::Error::other("unreadable")));
        }
        Ok((1234, crc("feedface")))
    }
}

#[test]
fn default_stage_order() {
    let pipeline = CandidatePipeline::new(
        Arc::new(Options::default()),
        Arc::new(FileChecksumProvider),
    );
    assert_eq!(
        pipeline.stage_names(),
        vec![
            "extension corrector",
            "archive file hasher",
            "candidate validator",
            "merge/split validator",
            "candidate combiner"
        ]
    );
}

#[test]
fn extension_corrector_auto_only_fixes_extensionless_roms() {
    let dat = Dat::new("test", Vec::new());
    let mut options = Options::default();
    options.fix_extension = FixExtension::Auto;
    let stage = ExtensionCorrector::new(Arc::new(options));

    let bare = single(
        "Bare",
        Rom::new("Bare", 4, crc("00000001")),
        File::raw("/in/bare.gba", 4, crc("00000001")),
        File::raw("/out/Bare", 4, crc("00000001")),
    );
    let named = single(
        "Named",
        Rom::new("Named.bin", 4, crc("00000002")),
        File::raw("/in/named.gba", 4, crc("00000002")),
        File::raw("/out/Named.bin", 4, crc("00000002")),
    );

    let result = stage.process(&dat, vec![bare, named]).unwrap();
    let out = |i: usize| result[i].candidates[0].roms_with_files()[0].output_file().to_string();
    assert_eq!(out(0), "/out/Bare.gba");
    assert_eq!(out(1), "/out/Named.bin");
}

#[test]
fn extension_corrector_always_renames_zip_entries() {
    let dat = Dat::new("test", Vec::new());
    let mut options = Options::default();
    options.fix_extension = FixExtension::Always;
    let stage = ExtensionCorrector::new(Arc::new(options));

    let zip = Archive::new("/out/Game.zip", ArchiveKind::Zip);
    let parent = single(
        "Game",
        Rom::new("Game.bin", 4, crc("00000001")),
        File::raw("/in/game.md", 4, crc("00000001")),
        File::entry(zip, "Game.bin", 4, crc("00000001")),
    );
    let result = stage.process(&dat, vec![parent]).unwrap();
    let output = result[0].candidates[0].roms_with_files()[0].output_file();
    assert_eq!(output.to_string(), "/out/Game.zip|Game.md");
}

#[test]
fn archive_hasher_hashes_each_archive_once() {
    let dat = Dat::new("test", Vec::new());
    let provider = Arc::new(FakeProvider::default());
    let stage = ArchiveFileHasher::new(provider.clone());

    let archive = Archive::from_path("/in/game.7z").unwrap();
    let game = Arc::new(
        Game::new("Game")
            .with_rom(Rom::new("a.bin", 1, crc("00000001")))
            .with_rom(Rom::new("b.bin", 1, crc("00000002"))),
    );
    let bindings = game
        .roms
        .iter()
        .map(|rom| {
            RomWithFiles::new(
                rom.clone(),
                File::archive_file(archive.clone()),
                File::raw("/out/Game.7z", 0, Checksums::new()),
            )
        })
        .collect();
    let parent = ParentCandidates {
        parent: "Game".into(),
        candidates: vec![Candidate::new(game, None, bindings)],
    };

    let result = stage.process(&dat, vec![parent]).unwrap();
    assert_eq!(provider.calls.lock().unwrap().len(), 1);
    for binding in result[0].candidates[0].roms_with_files() {
        assert_eq!(binding.input_file().size(), 1234);
        assert_eq!(binding.output_file().size(), 1234);
        assert_eq!(
            binding.output_file().checksums().crc32.as_deref(),
            Some("feedface")
        );
    }
}

#[test]
fn archive_hasher_drops_unreadable_candidates() {
    let dat = Dat::new("test", Vec::new());
    let provider = Arc::new(FakeProvider {
        fail: true,
        ..FakeProvider::default()
    });
    let stage = ArchiveFileHasher::new(provider);

    let parent = single(
        "Game",
        Rom::new("a.bin", 1, crc("00000001")),
        File::archive_file(Archive::from_path("/in/game.7z").unwrap()),
        File::raw("/out/Game.7z", 0, Checksums::new()),
    );
    let result = stage.process(&dat, vec![parent]).unwrap();
    assert!(result[0].candidates.is_empty());
}

#[tokio::test]
async fn validation_failure_discards_the_dat() {
    let dat = Arc::new(Dat::new("test", Vec::new()));
    let a = single(
        "A",
        Rom::new("same.bin", 1, crc("00000001")),
        File::raw("/in/a.bin", 1, crc("00000001")),
        File::raw("/out/same.bin", 1, crc("00000001")),
    );
    let b = single(
        "B",
        Rom::new("same.bin", 1, crc("00000002")),
        File::raw("/in/b.bin", 1, crc("00000002")),
        File::raw("/out/same.bin", 1, crc("00000002")),
    );

    let pipeline = CandidatePipeline::with_stages(vec![Arc::new(CandidateValidator)]);
    let err = pipeline.run(dat.clone(), vec![a.clone(), b]).await.unwrap_err();
    match err {
        PipelineError::Validation { conflicts } => {
            assert_eq!(conflicts.len(), 1);
            assert!(conflicts[0].starts_with("/out/same.bin <- /in/a.bin, /in/b.bin"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let ok = pipeline.run(dat, vec![a]).await.unwrap();
    assert_eq!(ok.len(), 1);
}

#[test]
fn merge_split_validator_reports_missing_clones() {
    let dat = Dat::new(
        "test",
        vec![
            Game::new("Parent").with_rom(Rom::new("p.bin", 1, crc("00000001"))),
            Game::new("Clone")
                .with_clone_of("Parent")
                .with_rom(Rom::new("c.bin", 1, crc("00000002"))),
        ],
    );
    let parent = single(
        "Parent",
        Rom::new("p.bin", 1, crc("00000001")),
        File::raw("/in/p.bin", 1, crc("00000001")),
        File::raw("/out/p.bin", 1, crc("00000001")),
    );
    let candidates = vec![parent];

    let missing = MergeSplitValidator::missing_games(&dat, &candidates);
    assert_eq!(missing, vec![("Parent".to_string(), "Clone".to_string())]);

    let mut options = Options::default();
    options.merge_roms = MergeMode::Merged;
    let stage = MergeSplitValidator::new(Arc::new(options));
    let kept = stage.process(&dat, candidates.clone()).unwrap();
    assert_eq!(kept, candidates);
}

#[test]
fn combiner_folds_zip_candidates_into_one() {
    let dat = Dat::new("My DAT", Vec::new());
    let options = Options {
        single_archive: true,
        ..Options::default()
    }
    .with_commands(&[Command::Copy, Command::Zip]);
    let stage = CandidateCombiner::new(Arc::new(options));

    let a = single(
        "A",
        Rom::new("a.bin", 1, crc("00000001")),
        File::raw("/in/a.bin", 1, crc("00000001")),
        File::entry(Archive::new("/out/A.zip", ArchiveKind::Zip), "a.bin", 1, crc("00000001")),
    );
    let b = single(
        "B",
        Rom::new("b.bin", 1, crc("00000002")),
        File::raw("/in/b.bin", 1, crc("00000002")),
        File::entry(Archive::new("/out/B.zip", ArchiveKind::Zip), "b.bin", 1, crc("00000002")),
    );

    let result = stage.process(&dat, vec![a, b]).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].parent, "My DAT");
    let combined = &result[0].candidates[0];
    assert_eq!(combined.game().name, "My DAT");
    let outputs: Vec<_> = combined
        .roms_with_files()
        .iter()
        .map(|b| b.output_file().to_string())
        .collect();
    assert_eq!(outputs, vec!["/out/My DAT.zip|A/a.bin", "/out/My DAT.zip|B/b.bin"]);
    assert_eq!(combined.game().roms.len(), 2);
}

#[test]
fn combiner_is_inactive_without_zip() {
    let dat = Dat::new("My DAT", Vec::new());
    let options = Options {
        single_archive: true,
        ..Options::default()
    }
    .with_commands(&[Command::Copy]);
    let stage = CandidateCombiner::new(Arc::new(options));
    let a = single(
        "A",
        Rom::new("a.bin", 1, crc("00000001")),
        File::raw("/in/a.bin", 1, crc("00000001")),
        File::raw("/out/a.bin", 1, crc("00000001")),
    );
    let result = stage.process(&dat, vec![a.clone()]).unwrap();
    assert_eq!(result, vec![a]);
}
