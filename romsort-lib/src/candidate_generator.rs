//! Candidate generation: binding every ROM of every game to an input file
//! and an output file.
//!
//! Each parent group is processed as its own task behind a counting
//! semaphore. Games never share mutable state; the index and the DAT are
//! read-only and shared between tasks. Results are collected by awaiting
//! the task handles in DAT order, so output order never depends on which
//! task finished first.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use romsort_core::{Archive, ArchiveKind, File};
use romsort_dat::{Dat, Game, IndexedFiles, Release, Rom};

use crate::candidate::{Candidate, ParentCandidates, RomWithFiles};
use crate::error::OutputPathError;
use crate::options::Options;
use crate::output_factory::OutputFactory;

/// Generates candidates for a DAT from an index of input files.
pub struct CandidateGenerator {
    options: Arc<Options>,
    semaphore: Arc<Semaphore>,
}

impl CandidateGenerator {
    pub fn new(options: Arc<Options>) -> Self {
        let permits = options.max_threads.max(1);
        Self {
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Produce the candidates of every parent in `dat`, in DAT order.
    ///
    /// A parent whose task fails is logged and yields no candidates; its
    /// siblings are unaffected.
    pub async fn generate(&self, dat: Arc<Dat>, index: Arc<IndexedFiles>) -> Vec<ParentCandidates> {
        let siblings: Arc<Option<Vec<String>>> =
            Arc::new((self.options.dir_letter && self.options.dir_letter_limit > 0).then(|| {
                OutputFactory::sibling_basenames(&self.options, &dat)
            }));

        let (parents, handles): (Vec<String>, Vec<_>) = dat
            .parents()
            .into_iter()
            .map(|parent| {
                let options = Arc::clone(&self.options);
                let semaphore = Arc::clone(&self.semaphore);
                let dat = Arc::clone(&dat);
                let index = Arc::clone(&index);
                let siblings = Arc::clone(&siblings);
                let name = parent.name.clone();
                let handle = tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Vec::new();
                    };
                    let resolver = GameResolver {
                        options: &options,
                        dat: &dat,
                        index: &index,
                        siblings: siblings.as_deref(),
                    };
                    parent
                        .games
                        .iter()
                        .flat_map(|game| resolver.candidates_for_game(game))
                        .collect::<Vec<_>>()
                });
                (name, handle)
            })
            .unzip();

        let results = futures::future::join_all(handles).await;
        let mut output = Vec::with_capacity(results.len());
        for (parent, result) in parents.into_iter().zip(results) {
            let candidates = match result {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::error!("{}: {}: candidate generation failed: {}", dat.name, parent, e);
                    Vec::new()
                }
            };
            output.push(ParentCandidates { parent, candidates });
        }

        let total: usize = output.iter().map(|p| p.candidates.len()).sum();
        log::info!(
            "{}: generated {} candidate(s) for {} parent(s)",
            dat.name,
            total,
            output.len()
        );
        output
    }
}

/// A successful ROM binding plus the file it was originally matched to,
/// before any whole-archive substitution.
struct Binding {
    source: File,
    rom_with_files: RomWithFiles,
}

/// Per-task view of everything needed to resolve one game.
struct GameResolver<'a> {
    options: &'a Options,
    dat: &'a Dat,
    index: &'a IndexedFiles,
    siblings: Option<&'a [String]>,
}

fn is_cue(rom: &Rom) -> bool {
    rom.name.to_lowercase().ends_with(".cue")
}

impl GameResolver<'_> {
    /// One candidate per release of `game` (or one for the game itself when
    /// it has no releases) that can be satisfied.
    fn candidates_for_game(&self, game: &Arc<Game>) -> Vec<Candidate> {
        let inputs = self.input_files_for_game(game);
        if game.releases.is_empty() {
            return self.candidate_for_release(game, None, &inputs).into_iter().collect();
        }
        game.releases
            .iter()
            .filter_map(|release| self.candidate_for_release(game, Some(release), &inputs))
            .collect()
    }

    /// The input file chosen for each ROM, in ROM order.
    fn input_files_for_game<'g>(&self, game: &'g Game) -> Vec<(&'g Rom, Option<File>)> {
        let found: Vec<(&Rom, Vec<File>)> = game
            .roms_with_disks(self.options.exclude_disks)
            .into_iter()
            .map(|rom| (rom, self.index.find_files(rom).unwrap_or_default()))
            .collect();

        if found.len() > 1 && !self.options.should_extract() {
            if let Some(archive) = self.archive_with_every_rom(game, &found) {
                log::trace!(
                    "{}: {}: using {} for every ROM",
                    self.dat.name,
                    game.name,
                    archive
                );
                return found
                    .into_iter()
                    .map(|(rom, files)| {
                        let entry = files
                            .into_iter()
                            .find(|f| f.is_archive_entry() && f.file_path() == archive.path())
                            .or_else(|| {
                                (archive.is_chd() && is_cue(rom))
                                    .then(|| self.cue_entry(&archive))
                                    .flatten()
                            });
                        (rom, entry)
                    })
                    .collect();
            }
        }

        found
            .into_iter()
            .map(|(rom, files)| (rom, files.into_iter().next()))
            .collect()
    }

    /// The one archive that holds every ROM of the game, if any.
    ///
    /// A CHD missing only `.cue` ROMs still counts. Among several, the one
    /// with the fewest entries wins, then one whose name contains the game
    /// name.
    fn archive_with_every_rom(&self, game: &Game, found: &[(&Rom, Vec<File>)]) -> Option<Archive> {
        // archive -> (indices of ROMs it satisfies, the entries doing so), in scan order
        let mut archives: Vec<(Archive, Vec<usize>, Vec<&File>)> = Vec::new();
        for (i, (_, files)) in found.iter().enumerate() {
            for file in files.iter().filter(|f| f.is_archive_entry()) {
                let Some(archive) = file.archive() else {
                    continue;
                };
                let slot = match archives.iter().position(|(a, _, _)| a == archive) {
                    Some(pos) => &mut archives[pos],
                    None => {
                        archives.push((archive.clone(), Vec::new(), Vec::new()));
                        let last = archives.len() - 1;
                        &mut archives[last]
                    }
                };
                if !slot.1.contains(&i) {
                    slot.1.push(i);
                    slot.2.push(file);
                }
            }
        }

        let mut qualifying: Vec<&(Archive, Vec<usize>, Vec<&File>)> = archives
            .iter()
            .filter(|(archive, roms, _)| {
                roms.len() == found.len()
                    || (archive.is_chd()
                        && found
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| !roms.contains(i))
                            .all(|(_, (rom, _))| is_cue(rom)))
            })
            .filter(|(archive, _, entries)| {
                self.find_archive_unused_entry_paths(archive, entries).is_empty()
            })
            .collect();

        qualifying.sort_by_key(|(archive, _, _)| {
            (
                self.index.files_at(archive.path()).len(),
                !archive.stem().contains(game.name.as_str()),
            )
        });
        qualifying.first().map(|(archive, _, _)| archive.clone())
    }

    fn cue_entry(&self, archive: &Archive) -> Option<File> {
        self.index
            .files_at(archive.path())
            .iter()
            .find(|f| {
                f.entry_path()
                    .is_some_and(|p| p.to_lowercase().ends_with(".cue"))
            })
            .cloned()
    }

    /// Entry paths in `archive` that none of `used` account for.
    ///
    /// Always empty when excess sets are allowed. A CHD's `.cue` entries
    /// never count as excess.
    fn find_archive_unused_entry_paths(&self, archive: &Archive, used: &[&File]) -> Vec<String> {
        if self.options.allow_excess_sets {
            return Vec::new();
        }
        self.unused_entry_paths(archive, used)
    }

    fn unused_entry_paths(&self, archive: &Archive, used: &[&File]) -> Vec<String> {
        let used: HashSet<&str> = used.iter().filter_map(|f| f.entry_path()).collect();
        let unused: BTreeSet<String> = self
            .index
            .files_at(archive.path())
            .iter()
            .filter_map(|f| f.entry_path())
            .filter(|path| !used.contains(path))
            .filter(|path| !(archive.is_chd() && path.to_lowercase().ends_with(".cue")))
            .map(str::to_string)
            .collect();
        unused.into_iter().collect()
    }

    fn candidate_for_release(
        &self,
        game: &Arc<Game>,
        release: Option<&Release>,
        inputs: &[(&Rom, Option<File>)],
    ) -> Option<Candidate> {
        let mut found: Vec<Binding> = Vec::with_capacity(inputs.len());
        let mut missing: Vec<&Rom> = Vec::new();
        for (rom, input) in inputs {
            let binding = input
                .clone()
                .and_then(|input| self.bind_rom(game, release, rom, input, inputs));
            match binding {
                Some(binding) => found.push(binding),
                None => missing.push(*rom),
            }
        }

        if !missing.is_empty() {
            if found.is_empty() {
                log::trace!("{}: {}: no input files found", self.dat.name, game.name);
                return None;
            }
            if !self.options.allow_incomplete_sets {
                let names: Vec<&str> = missing.iter().map(|r| r.name.as_str()).collect();
                log::debug!(
                    "{}: {}: missing {} of {} ROM(s): {}",
                    self.dat.name,
                    game.name,
                    missing.len(),
                    inputs.len(),
                    names.join(", ")
                );
                return None;
            }
        }

        if self.has_conflicting_output_files(game, &found) {
            return None;
        }

        if !self.options.should_zip()
            && !self.options.should_extract()
            && !self.options.allow_excess_sets
            && self.has_excess_files(game, &found)
        {
            return None;
        }

        let roms_with_files = found.into_iter().map(|b| b.rom_with_files).collect();
        Some(Candidate::new(Arc::clone(game), release.cloned(), roms_with_files))
    }

    /// Bind one ROM to its input and compute its output, or `None` when the
    /// input cannot produce this ROM.
    fn bind_rom(
        &self,
        game: &Game,
        release: Option<&Release>,
        rom: &Rom,
        input: File,
        inputs: &[(&Rom, Option<File>)],
    ) -> Option<Binding> {
        if !self.options.should_write() {
            return Some(Binding {
                source: input.clone(),
                rom_with_files: RomWithFiles::new(rom.clone(), input.clone(), input),
            });
        }

        let source = input.clone();
        let mut input = if rom.disk { input.forget_header() } else { input };

        if input.header().is_some() {
            let headered_match = rom.matches(input.size(), input.checksums());
            let removable = rom
                .extension()
                .is_some_and(|ext| self.options.can_remove_header(&ext));
            if headered_match && (!removable || self.options.should_link()) {
                input = input.forget_header();
            } else if !headered_match && self.options.should_link() {
                log::trace!(
                    "{}: {}: {} needs its header removed, which a link cannot do",
                    self.dat.name,
                    game.name,
                    input
                );
                return None;
            }
        }

        if input.is_archive_entry() && self.should_generate_archive_file(game, release, rom, inputs) {
            input = input.into_archive_file();
        }
        if input.is_archive_entry() && self.options.should_link() {
            log::trace!(
                "{}: {}: cannot link {} out of its archive",
                self.dat.name,
                game.name,
                input
            );
            return None;
        }

        match self.output_file(game, release, rom, &input) {
            Ok(output) => Some(Binding {
                source,
                rom_with_files: RomWithFiles::new(rom.clone(), input, output),
            }),
            Err(e) => {
                log::warn!("{}: {}: {}", self.dat.name, game.name, e);
                None
            }
        }
    }

    /// Whether the whole input archive can be written as-is instead of
    /// handling its entries one by one.
    fn should_generate_archive_file(
        &self,
        game: &Game,
        release: Option<&Release>,
        rom: &Rom,
        inputs: &[(&Rom, Option<File>)],
    ) -> bool {
        let files: Vec<&File> = inputs.iter().filter_map(|(_, f)| f.as_ref()).collect();
        if files
            .iter()
            .any(|f| f.header().is_some() || f.patch().is_some())
        {
            return false;
        }

        if !self.options.should_zip_rom(rom) && !self.options.should_extract_rom(rom) {
            return true;
        }

        if !self.options.should_zip_rom(rom) || self.options.patch_enabled {
            return false;
        }
        if inputs.iter().any(|(_, f)| f.is_none()) {
            return false;
        }
        let every_zip_entry = files.iter().all(|f| {
            f.is_archive_entry() && f.archive().is_some_and(|a| a.kind() == ArchiveKind::Zip)
        });
        let archive_paths: HashSet<&Path> = files.iter().map(|f| f.file_path()).collect();
        if !every_zip_entry || archive_paths.len() != 1 {
            return false;
        }

        let entries_match = inputs.iter().all(|(rom, file)| {
            file.as_ref().is_some_and(|file| {
                OutputFactory::get_path(self.options, self.dat, game, release, rom, file, self.siblings)
                    .is_ok_and(|path| file.entry_path() == Some(path.entry_path.as_str()))
            })
        });
        if !entries_match {
            return false;
        }

        // The zip is copied whole, so it must not carry anything else.
        files
            .first()
            .and_then(|f| f.archive())
            .is_some_and(|archive| self.unused_entry_paths(archive, &files).is_empty())
    }

    fn output_file(
        &self,
        game: &Game,
        release: Option<&Release>,
        rom: &Rom,
        input: &File,
    ) -> Result<File, OutputPathError> {
        let path = OutputFactory::get_path(self.options, self.dat, game, release, rom, input, self.siblings)?;

        // A header still present here is stripped on write.
        let (size, checksums) = if input.header().is_some() {
            (input.size_without_header(), input.checksums_without_header().clone())
        } else {
            (input.size(), input.checksums().clone())
        };

        if self.options.should_zip_rom(rom) && !input.is_archive_file() {
            let archive = Archive::new(path.format(), ArchiveKind::Zip);
            return Ok(File::entry(archive, path.entry_path, size, checksums));
        }
        Ok(File::raw(path.format(), size, checksums))
    }

    /// Whether two different inputs would be written to one output path.
    fn has_conflicting_output_files(&self, game: &Game, found: &[Binding]) -> bool {
        let mut by_output: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();
        for binding in found {
            let output = binding.rom_with_files.output_file();
            if output.is_archive_entry() {
                continue;
            }
            by_output
                .entry(output.file_path().to_path_buf())
                .or_default()
                .insert(binding.rom_with_files.input_file().to_string());
        }

        let mut conflicted = false;
        for (output, inputs) in by_output.iter().filter(|(_, inputs)| inputs.len() > 1) {
            log::debug!(
                "{}: {}: cannot write {} from multiple inputs: {}",
                self.dat.name,
                game.name,
                output.display(),
                inputs.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            conflicted = true;
        }
        conflicted
    }

    /// Whether any input archive holds entries no ROM of this game claims.
    fn has_excess_files(&self, game: &Game, found: &[Binding]) -> bool {
        let mut archives: Vec<&Archive> = Vec::new();
        for binding in found.iter().filter(|b| b.source.is_archive_entry()) {
            if let Some(archive) = binding.source.archive() {
                if !archives.contains(&archive) {
                    archives.push(archive);
                }
            }
        }

        for archive in archives {
            let used: Vec<&File> = found
                .iter()
                .map(|b| &b.source)
                .filter(|f| f.is_archive_entry() && f.archive() == Some(archive))
                .collect();
            let unused = self.find_archive_unused_entry_paths(archive, &used);
            if !unused.is_empty() {
                log::debug!(
                    "{}: {}: {} has {} excess entr{}: {}",
                    self.dat.name,
                    game.name,
                    archive,
                    unused.len(),
                    if unused.len() == 1 { "y" } else { "ies" },
                    unused.join(", ")
                );
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "tests/candidate_generator_tests.rs"]
mod tests;
