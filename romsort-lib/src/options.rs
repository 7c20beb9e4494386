//! Run options: which commands to perform and how outputs are laid out.
//!
//! Options are read from `~/.config/romsort/options.toml` (or any path the
//! caller supplies). Every field has a default, so a partial file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use romsort_dat::Rom;

use crate::error::ConfigError;

/// One user-requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Copy,
    Move,
    Link,
    Extract,
    Zip,
    Test,
    Report,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    #[default]
    Hardlink,
    Symlink,
    /// Copy-on-write clone; written as a plain copy
    Reflink,
}

/// When to put a game's files in a subdirectory named after the game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameSubdirMode {
    Never,
    /// Only for games with more than one ROM
    #[default]
    Multiple,
    Always,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixExtension {
    Never,
    /// Only when the DAT does not provide a usable extension
    #[default]
    Auto,
    Always,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    FullNonMerged,
    NonMerged,
    #[default]
    Split,
    Merged,
}

/// Options for a sorting run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub commands: Vec<Command>,
    /// Output directory template, e.g. `"out/{datName}"`
    pub output: String,
    pub dir_dat_name: bool,
    pub dir_letter: bool,
    pub dir_letter_count: usize,
    /// Maximum files per letter directory; 0 disables splitting
    pub dir_letter_limit: usize,
    pub dir_letter_group: bool,
    pub dir_game_subdir: GameSubdirMode,
    /// `None` keeps headers; an empty list strips every known header;
    /// otherwise only headers of the listed extensions are stripped.
    pub remove_headers: Option<Vec<String>>,
    /// Extensions that are never put into a zip
    pub zip_exclude: Vec<String>,
    pub exclude_disks: bool,
    pub allow_incomplete_sets: bool,
    pub allow_excess_sets: bool,
    pub merge_roms: MergeMode,
    pub overwrite: bool,
    pub overwrite_invalid: bool,
    pub link_mode: LinkMode,
    pub symlink_relative: bool,
    /// Extra attempts after a failed write verification
    pub write_retry: u32,
    pub max_threads: usize,
    /// Upper bound on bytes being written concurrently, in KiB
    pub max_in_flight_kb: u64,
    pub fix_extension: FixExtension,
    /// Fold every candidate of a DAT into one zip named after the DAT
    pub single_archive: bool,
    pub patch_enabled: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            output: String::from("."),
            dir_dat_name: false,
            dir_letter: false,
            dir_letter_count: 1,
            dir_letter_limit: 0,
            dir_letter_group: false,
            dir_game_subdir: GameSubdirMode::default(),
            remove_headers: None,
            zip_exclude: Vec::new(),
            exclude_disks: false,
            allow_incomplete_sets: false,
            allow_excess_sets: false,
            merge_roms: MergeMode::default(),
            overwrite: false,
            overwrite_invalid: false,
            link_mode: LinkMode::default(),
            symlink_relative: false,
            write_retry: 2,
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_in_flight_kb: 256 * 1024,
            fix_extension: FixExtension::default(),
            single_archive: false,
            patch_enabled: false,
        }
    }
}

impl Options {
    /// Canonical options path: `~/.config/romsort/options.toml`.
    pub fn default_path() -> PathBuf {
        let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config.join("romsort").join("options.toml")
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let options: Options = toml::from_str(contents)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject command combinations that cannot be carried out together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let writers = [Command::Copy, Command::Move, Command::Link]
            .iter()
            .filter(|c| self.commands.contains(c))
            .count();
        if writers > 1 {
            return Err(ConfigError::invalid(
                "only one of copy, move and link can be used",
            ));
        }
        if self.should_zip() && self.should_extract() {
            return Err(ConfigError::invalid("zip and extract are mutually exclusive"));
        }
        if self.should_link() && (self.should_zip() || self.should_extract()) {
            return Err(ConfigError::invalid("link cannot be combined with zip or extract"));
        }
        if (self.should_zip() || self.should_extract()) && writers == 0 {
            return Err(ConfigError::invalid("zip and extract need copy or move"));
        }
        if self.dir_letter_count == 0 {
            return Err(ConfigError::invalid("dir_letter_count must be at least 1"));
        }
        Ok(())
    }

    pub fn with_commands(mut self, commands: &[Command]) -> Self {
        self.commands = commands.to_vec();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    fn has(&self, command: Command) -> bool {
        self.commands.contains(&command)
    }

    pub fn should_write(&self) -> bool {
        self.should_copy() || self.should_move() || self.should_link()
    }

    pub fn should_copy(&self) -> bool {
        self.has(Command::Copy)
    }

    pub fn should_move(&self) -> bool {
        self.has(Command::Move)
    }

    pub fn should_link(&self) -> bool {
        self.has(Command::Link)
    }

    pub fn should_extract(&self) -> bool {
        self.has(Command::Extract)
    }

    pub fn should_zip(&self) -> bool {
        self.has(Command::Zip)
    }

    pub fn should_test(&self) -> bool {
        self.has(Command::Test)
    }

    /// Whether `rom` is written into a zip, honoring `zip_exclude`.
    pub fn should_zip_rom(&self, rom: &Rom) -> bool {
        self.should_zip() && !self.is_excluded_from_zip(rom)
    }

    /// Whether `rom` is extracted from its archive, honoring `zip_exclude`.
    ///
    /// A ROM excluded from zipping is extracted instead.
    pub fn should_extract_rom(&self, rom: &Rom) -> bool {
        self.should_extract() || (self.should_zip() && self.is_excluded_from_zip(rom))
    }

    fn is_excluded_from_zip(&self, rom: &Rom) -> bool {
        rom.extension()
            .is_some_and(|ext| self.zip_exclude.iter().any(|e| normalize_ext(e) == ext))
    }

    /// Whether headers of files with extension `ext` are stripped on output.
    pub fn can_remove_header(&self, ext: &str) -> bool {
        match &self.remove_headers {
            None => false,
            Some(exts) if exts.is_empty() => true,
            Some(exts) => {
                let ext = normalize_ext(ext);
                exts.iter().any(|e| normalize_ext(e) == ext)
            }
        }
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
#[path = "tests/options_tests.rs"]
mod tests;
