use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use romsort_core::Checksums;

use crate::error::DatError;

/// A processed DAT: header information plus its games, in DAT order.
///
/// Parsing the on-disk XML/ClrMamePro formats happens elsewhere; this is the
/// normalized tree the candidate pipeline reads.
#[derive(Debug, Clone)]
pub struct Dat {
    pub name: String,
    pub description: String,
    pub version: String,
    games: Vec<Arc<Game>>,
}

/// A single game entry from a DAT file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Game {
    pub name: String,
    /// Name of the parent game, for clones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_of: Option<String>,
    pub roms: Vec<Rom>,
    /// CHD/disc images; never headered, and optionally excluded
    #[serde(deserialize_with = "deserialize_disks")]
    pub disks: Vec<Rom>,
    pub releases: Vec<Release>,
}

/// A single ROM (or disk) entry within a game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rom {
    pub name: String,
    pub size: u64,
    #[serde(flatten)]
    pub checksums: Checksums,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disk: bool,
}

/// A regional release of a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A parent game grouped with its clones.
#[derive(Debug, Clone)]
pub struct Parent {
    pub name: String,
    /// The parent itself (when present in the DAT) first, then clones in DAT order.
    pub games: Vec<Arc<Game>>,
}

impl Rom {
    pub fn new(name: impl Into<String>, size: u64, checksums: Checksums) -> Self {
        Self {
            name: name.into(),
            size,
            checksums,
            disk: false,
        }
    }

    pub fn disk(name: impl Into<String>, size: u64, checksums: Checksums) -> Self {
        Self {
            disk: true,
            ..Self::new(name, size, checksums)
        }
    }

    /// Whether a file with this size and these checksums is this ROM.
    ///
    /// Sizes must be equal and every algorithm present on both sides must
    /// agree. Algorithms present on only one side are ignored, so a
    /// CRC32-only ROM matches a fully hashed file, and a size-only match
    /// is accepted when the two sides share no algorithm at all.
    pub fn matches(&self, size: u64, checksums: &Checksums) -> bool {
        self.size == size && self.checksums.agrees_with(checksums)
    }

    /// Lowercased extension of the ROM name.
    pub fn extension(&self) -> Option<String> {
        romsort_core::util::extension_of(&self.name)
    }
}

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_clone_of(mut self, parent: impl Into<String>) -> Self {
        self.clone_of = Some(parent.into());
        self
    }

    pub fn with_rom(mut self, rom: Rom) -> Self {
        if rom.disk {
            self.disks.push(rom);
        } else {
            self.roms.push(rom);
        }
        self
    }

    pub fn with_release(mut self, release: Release) -> Self {
        self.releases.push(release);
        self
    }

    /// ROMs followed by disks, unless disks are excluded.
    pub fn roms_with_disks(&self, exclude_disks: bool) -> Vec<&Rom> {
        let disks: &[Rom] = if exclude_disks { &[] } else { &self.disks };
        self.roms.iter().chain(disks).collect()
    }
}

/// Disks in a DAT document are plain ROM entries; flag them as disks.
fn deserialize_disks<'de, D>(deserializer: D) -> Result<Vec<Rom>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut disks = Vec::<Rom>::deserialize(deserializer)?;
    for disk in &mut disks {
        disk.disk = true;
    }
    Ok(disks)
}

/// Serialized form of a DAT used by [`Dat::from_json`].
#[derive(Debug, Deserialize)]
struct DatDocument {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    games: Vec<Game>,
}

impl Dat {
    pub fn new(name: impl Into<String>, games: Vec<Game>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            version: String::new(),
            games: games.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load a normalized DAT from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, DatError> {
        let doc: DatDocument = serde_json::from_str(json)?;
        let dat = Self {
            name: doc.name,
            description: doc.description,
            version: doc.version,
            games: doc.games.into_iter().map(Arc::new).collect(),
        };
        dat.validate()?;
        Ok(dat)
    }

    /// Load a normalized DAT from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, DatError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Reject DATs the pipeline cannot handle: unnamed or duplicate games.
    ///
    /// A clone whose parent is missing is tolerated; it becomes its own
    /// parent in [`Dat::parents`].
    pub fn validate(&self) -> Result<(), DatError> {
        let mut seen = HashSet::new();
        for game in &self.games {
            if game.name.is_empty() {
                return Err(DatError::invalid_dat("game with an empty name"));
            }
            if !seen.insert(game.name.as_str()) {
                return Err(DatError::invalid_dat(format!(
                    "duplicate game name: {}",
                    game.name
                )));
            }
        }
        for game in &self.games {
            if let Some(parent) = &game.clone_of {
                if !seen.contains(parent.as_str()) {
                    log::debug!(
                        "{}: {}: parent '{}' not in DAT, treating as a parent",
                        self.name,
                        game.name,
                        parent
                    );
                }
            }
        }
        Ok(())
    }

    pub fn games(&self) -> &[Arc<Game>] {
        &self.games
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Games grouped by parent, in order of each parent's first appearance.
    pub fn parents(&self) -> Vec<Parent> {
        let names: HashSet<&str> = self.games.iter().map(|g| g.name.as_str()).collect();
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Arc<Game>>> = HashMap::new();

        for game in &self.games {
            let parent_name = match &game.clone_of {
                Some(parent) if names.contains(parent.as_str()) => parent.clone(),
                _ => game.name.clone(),
            };
            let group = groups.entry(parent_name.clone()).or_insert_with(|| {
                order.push(parent_name.clone());
                Vec::new()
            });
            group.push(game.clone());
        }

        order
            .into_iter()
            .map(|name| {
                let mut games = groups.remove(&name).unwrap_or_default();
                // The parent leads its group even when a clone is listed first.
                if let Some(pos) = games.iter().position(|g| g.name == name) {
                    let parent = games.remove(pos);
                    games.insert(0, parent);
                }
                Parent { name, games }
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/dat_tests.rs"]
mod tests;
