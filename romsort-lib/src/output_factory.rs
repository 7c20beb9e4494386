//! Output path computation.
//!
//! Everything here is a pure function of its arguments. Letter-range
//! grouping is the only feature that looks beyond one ROM, and it receives
//! the full list of sibling basenames explicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use romsort_core::File;
use romsort_dat::{Dat, Game, Release, Rom};

use crate::error::OutputPathError;
use crate::options::{GameSubdirMode, Options};

/// A resolved output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    pub dir: PathBuf,
    /// File name without extension
    pub name: String,
    /// Extension including the leading dot, or empty
    pub ext: String,
    /// Path inside the output archive; empty for non-archive outputs
    pub entry_path: String,
}

impl OutputPath {
    pub fn basename(&self) -> String {
        format!("{}{}", self.name, self.ext)
    }

    /// The full output path on disk.
    pub fn format(&self) -> PathBuf {
        self.dir.join(self.basename())
    }
}

/// Analogue Pocket core folders by ROM extension.
const POCKET_CORES: &[(&str, &str)] = &[
    ("a78", "7800"),
    ("col", "coleco"),
    ("gb", "gb"),
    ("gba", "gba"),
    ("gbc", "gbc"),
    ("gg", "gg"),
    ("int", "intv"),
    ("lnx", "lynx"),
    ("md", "genesis"),
    ("gen", "genesis"),
    ("nes", "nes"),
    ("pce", "pce"),
    ("sfc", "snes"),
    ("smc", "snes"),
    ("sms", "sms"),
    ("ws", "wonderswan"),
    ("wsc", "wonderswan"),
];

/// Computes where each ROM of a game is written.
pub struct OutputFactory;

impl OutputFactory {
    /// Resolve the output path for one ROM.
    ///
    /// `sibling_basenames` is every output basename the DAT will produce; it
    /// is only consulted when letter directories have a size limit.
    pub fn get_path(
        options: &Options,
        dat: &Dat,
        game: &Game,
        release: Option<&Release>,
        rom: &Rom,
        input_file: &File,
        sibling_basenames: Option<&[String]>,
    ) -> Result<OutputPath, OutputPathError> {
        let template = replace_tokens(&options.output, dat, game, release, rom, input_file)?;
        let mut dir = PathBuf::from(template);

        if options.dir_dat_name {
            dir.push(sanitize(&dat.name));
        }

        let (name_path, ext, entry_path) = output_name(options, game, rom, input_file);
        let (nested_dir, basename) = split_nested(&name_path)?;

        if options.dir_letter {
            dir.push(letter_dir(options, &basename, sibling_basenames));
        }

        let zipped = options.should_zip_rom(rom) && !input_file.is_archive_file();
        let subdir = match options.dir_game_subdir {
            GameSubdirMode::Never => false,
            GameSubdirMode::Always => !zipped,
            GameSubdirMode::Multiple => {
                !zipped
                    && !input_file.is_archive_file()
                    && game.roms_with_disks(options.exclude_disks).len() > 1
            }
        };
        if subdir {
            dir.push(sanitize(&game.name));
        }
        if let Some(nested) = nested_dir {
            dir.push(nested);
        }

        let name = basename
            .strip_suffix(&ext)
            .map(str::to_string)
            .unwrap_or_else(|| basename.clone());
        Ok(OutputPath {
            dir,
            name,
            ext,
            entry_path,
        })
    }

    /// Basenames every ROM of `dat` would be written under, for letter
    /// grouping.
    pub fn sibling_basenames(options: &Options, dat: &Dat) -> Vec<String> {
        let mut names = BTreeSet::new();
        for game in dat.games() {
            for rom in game.roms_with_disks(options.exclude_disks) {
                if options.should_zip_rom(rom) {
                    names.insert(format!("{}.zip", sanitize(&game.name)));
                } else {
                    let base = Path::new(&rom.name)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| rom.name.clone());
                    names.insert(base);
                }
            }
        }
        names.into_iter().collect()
    }
}

/// Output file name (possibly with nested directories), its extension and
/// the archive entry path.
fn output_name(options: &Options, game: &Game, rom: &Rom, input_file: &File) -> (String, String, String) {
    if let File::Archive(_) = input_file {
        let file_name = input_file.file_name();
        let stem = input_file.archive().map(|a| a.stem()).unwrap_or_default();
        let suffix = file_name.get(stem.len()..).unwrap_or_default().to_string();
        return (
            format!("{}{}", sanitize(&game.name), suffix),
            suffix,
            String::new(),
        );
    }

    let rom_name = match input_file.header() {
        Some(header) if rom.extension().is_some_and(|ext| options.can_remove_header(&ext)) => {
            header.headerless_file_name(&rom.name)
        }
        _ => rom.name.clone(),
    };
    let rom_name = rom_name.replace('\\', "/");

    if options.should_zip_rom(rom) {
        return (
            format!("{}.zip", sanitize(&game.name)),
            ".zip".to_string(),
            rom_name,
        );
    }

    let ext = Path::new(&rom_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (rom_name, ext, String::new())
}

/// Split `a/b/c.rom` into (`a/b`, `c.rom`), refusing paths that escape the
/// output directory.
fn split_nested(name: &str) -> Result<(Option<PathBuf>, String), OutputPathError> {
    let path = Path::new(name);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(OutputPathError::invalid_path(name)),
        }
    }
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| OutputPathError::invalid_path(name))?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf);
    Ok((parent, basename))
}

fn replace_tokens(
    template: &str,
    dat: &Dat,
    game: &Game,
    release: Option<&Release>,
    rom: &Rom,
    input_file: &File,
) -> Result<String, OutputPathError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            return Err(OutputPathError::invalid_path(format!(
                "unterminated token in '{template}'"
            )));
        };
        let token = &after[..=end];
        let value = match token {
            "{datName}" => Some(sanitize(&dat.name)),
            "{datDescription}" => Some(sanitize(&dat.description)),
            "{datVersion}" => Some(dat.version.clone()).filter(|v| !v.is_empty()),
            "{gameName}" => Some(sanitize(&game.name)),
            "{region}" => release.map(|r| r.region.clone()),
            "{language}" => release.and_then(|r| r.language.clone()),
            "{inputDirname}" => input_file
                .file_path()
                .parent()
                .map(|p| p.to_string_lossy().into_owned()),
            "{pocket}" => rom.extension().and_then(|ext| {
                POCKET_CORES
                    .iter()
                    .find(|(e, _)| *e == ext)
                    .map(|(_, core)| format!("Assets/{core}/common"))
            }),
            _ => None,
        };
        match value {
            Some(value) => out.push_str(&value),
            None => return Err(OutputPathError::unresolved(token, template)),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Make a DAT or game name safe to use as one path component.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn letters_of(basename: &str, count: usize) -> String {
    let letters: String = basename
        .chars()
        .take(count)
        .map(|c| {
            if c.is_ascii_alphabetic() {
                c.to_ascii_uppercase()
            } else {
                '#'
            }
        })
        .collect();
    if letters.is_empty() {
        "#".to_string()
    } else {
        letters
    }
}

fn bucket_name(first: &str, last: &str) -> String {
    if first == last {
        first.to_string()
    } else {
        format!("{first}-{last}")
    }
}

/// The letter directory for `basename`, splitting or grouping letters so no
/// directory holds more than `dir_letter_limit` files.
fn letter_dir(options: &Options, basename: &str, siblings: Option<&[String]>) -> String {
    let count = options.dir_letter_count.max(1);
    let letter = letters_of(basename, count);
    let limit = options.dir_letter_limit;
    let Some(siblings) = siblings.filter(|_| limit > 0) else {
        return letter;
    };

    let mut by_letter: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for sibling in siblings {
        by_letter
            .entry(letters_of(sibling, count))
            .or_default()
            .insert(sibling.as_str());
    }
    by_letter.entry(letter.clone()).or_default().insert(basename);

    let mut buckets: Vec<(String, Vec<&str>)> = Vec::new();
    if options.dir_letter_group {
        let mut current: Option<(String, String, Vec<&str>)> = None;
        for (letter, names) in &by_letter {
            if names.len() > limit {
                if let Some((first, last, names)) = current.take() {
                    buckets.push((bucket_name(&first, &last), names));
                }
                let names: Vec<&str> = names.iter().copied().collect();
                for (i, chunk) in names.chunks(limit).enumerate() {
                    buckets.push((format!("{letter}{}", i + 1), chunk.to_vec()));
                }
                continue;
            }
            match current.as_mut() {
                Some((_, last, group)) if group.len() + names.len() <= limit => {
                    *last = letter.clone();
                    group.extend(names.iter().copied());
                }
                _ => {
                    if let Some((first, last, group)) = current.take() {
                        buckets.push((bucket_name(&first, &last), group));
                    }
                    current = Some((letter.clone(), letter.clone(), names.iter().copied().collect()));
                }
            }
        }
        if let Some((first, last, group)) = current {
            buckets.push((bucket_name(&first, &last), group));
        }
    } else {
        for (letter, names) in &by_letter {
            let names: Vec<&str> = names.iter().copied().collect();
            if names.len() <= limit {
                buckets.push((letter.clone(), names));
            } else {
                for (i, chunk) in names.chunks(limit).enumerate() {
                    buckets.push((format!("{letter}{}", i + 1), chunk.to_vec()));
                }
            }
        }
    }

    buckets
        .into_iter()
        .find(|(_, names)| names.contains(&basename))
        .map(|(name, _)| name)
        .unwrap_or(letter)
}

#[cfg(test)]
#[path = "tests/output_factory_tests.rs"]
mod tests;
