use std::sync::Arc;

use romsort_core::File;
use romsort_dat::{Game, Release, Rom};

/// One ROM bound to the input it will be read from and the output it will
/// be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomWithFiles {
    rom: Rom,
    input_file: File,
    output_file: File,
}

impl RomWithFiles {
    pub fn new(rom: Rom, input_file: File, output_file: File) -> Self {
        Self {
            rom,
            input_file,
            output_file,
        }
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    pub fn input_file(&self) -> &File {
        &self.input_file
    }

    pub fn output_file(&self) -> &File {
        &self.output_file
    }

    pub fn with_input_file(mut self, input_file: File) -> Self {
        self.input_file = input_file;
        self
    }

    pub fn with_output_file(mut self, output_file: File) -> Self {
        self.output_file = output_file;
        self
    }
}

/// A game (optionally a specific release of it) together with every ROM
/// binding needed to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    game: Arc<Game>,
    release: Option<Release>,
    roms_with_files: Vec<RomWithFiles>,
}

impl Candidate {
    pub fn new(game: Arc<Game>, release: Option<Release>, roms_with_files: Vec<RomWithFiles>) -> Self {
        Self {
            game,
            release,
            roms_with_files,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn release(&self) -> Option<&Release> {
        self.release.as_ref()
    }

    pub fn roms_with_files(&self) -> &[RomWithFiles] {
        &self.roms_with_files
    }

    pub fn with_roms_with_files(mut self, roms_with_files: Vec<RomWithFiles>) -> Self {
        self.roms_with_files = roms_with_files;
        self
    }

    /// Release name if there is one, else the game name.
    pub fn name(&self) -> &str {
        self.release
            .as_ref()
            .map(|r| r.name.as_str())
            .unwrap_or(&self.game.name)
    }

    pub fn total_size(&self) -> u64 {
        self.roms_with_files.iter().map(|r| r.input_file.size()).sum()
    }
}

/// Every candidate produced for one parent group, in DAT order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCandidates {
    pub parent: String,
    pub candidates: Vec<Candidate>,
}

impl ParentCandidates {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
