//! Copier/dumper headers that some ROM dumps carry in front of the real data.
//!
//! DATs describe the headerless data, so a headered file's "without header"
//! checksums are what normally match. Whether the header is actually removed
//! on output is a per-extension user choice.

use std::path::Path;

/// A known ROM header format.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FileHeader {
    name: &'static str,
    /// Offset of the magic bytes from the start of the file
    magic_offset: usize,
    magic: &'static [u8],
    /// Number of bytes to strip from the start of the file
    data_offset: u64,
    headered_extension: &'static str,
    headerless_extension: &'static str,
}

static KNOWN_HEADERS: [FileHeader; 5] = [
    FileHeader {
        name: "No-Intro_A7800.xml",
        magic_offset: 1,
        magic: b"ATARI7800",
        data_offset: 128,
        headered_extension: "a78",
        headerless_extension: "a78",
    },
    FileHeader {
        name: "No-Intro_FDS.xml",
        magic_offset: 0,
        magic: b"FDS",
        data_offset: 16,
        headered_extension: "fds",
        headerless_extension: "fds",
    },
    FileHeader {
        name: "No-Intro_LNX.xml",
        magic_offset: 0,
        magic: b"LYNX",
        data_offset: 64,
        headered_extension: "lnx",
        headerless_extension: "lyx",
    },
    FileHeader {
        name: "No-Intro_NES.xml",
        magic_offset: 0,
        magic: b"NES\x1a",
        data_offset: 16,
        headered_extension: "nes",
        headerless_extension: "nes",
    },
    FileHeader {
        name: "SMC.xml",
        magic_offset: 3,
        magic: &[0u8; 509],
        data_offset: 512,
        headered_extension: "smc",
        headerless_extension: "sfc",
    },
];

impl FileHeader {
    /// All header formats this crate knows about.
    pub fn known() -> &'static [FileHeader] {
        &KNOWN_HEADERS
    }

    /// Look up a header by its detection-file name (e.g. `No-Intro_NES.xml`).
    pub fn by_name(name: &str) -> Option<&'static FileHeader> {
        KNOWN_HEADERS.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Look up a header by the extension headered files use.
    pub fn by_extension(extension: &str) -> Option<&'static FileHeader> {
        let extension = extension.trim_start_matches('.');
        KNOWN_HEADERS
            .iter()
            .find(|h| h.headered_extension.eq_ignore_ascii_case(extension))
    }

    /// Detect a header from the first bytes of a file.
    ///
    /// `prefix` should hold at least the first 512 bytes when available.
    pub fn detect(prefix: &[u8]) -> Option<&'static FileHeader> {
        KNOWN_HEADERS.iter().find(|h| {
            let end = h.magic_offset + h.magic.len();
            prefix.len() >= end && &prefix[h.magic_offset..end] == h.magic
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bytes to skip to reach the headerless data.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn headered_extension(&self) -> &'static str {
        self.headered_extension
    }

    pub fn headerless_extension(&self) -> &'static str {
        self.headerless_extension
    }

    /// Rename `file_name` to the headerless extension, if it currently uses
    /// the headered one. Other names are returned unchanged.
    pub fn headerless_file_name(&self, file_name: &str) -> String {
        let path = Path::new(file_name);
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.headered_extension));
        if !matches {
            return file_name.to_string();
        }
        let stem_len = file_name.len() - self.headered_extension.len();
        format!("{}{}", &file_name[..stem_len], self.headerless_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_nes() {
        let mut prefix = vec![0u8; 32];
        prefix[..4].copy_from_slice(b"NES\x1a");
        let header = FileHeader::detect(&prefix).unwrap();
        assert_eq!(header.name(), "No-Intro_NES.xml");
        assert_eq!(header.data_offset(), 16);
    }

    #[test]
    fn test_detect_requires_enough_bytes() {
        assert!(FileHeader::detect(b"LYN").is_none());
        assert!(FileHeader::detect(b"LYNX").is_some());
    }

    #[test]
    fn test_detect_a7800_offset() {
        let mut prefix = vec![0u8; 128];
        prefix[1..10].copy_from_slice(b"ATARI7800");
        assert_eq!(FileHeader::detect(&prefix).unwrap().name(), "No-Intro_A7800.xml");
    }

    #[test]
    fn test_by_extension() {
        assert_eq!(FileHeader::by_extension(".lnx").unwrap().name(), "No-Intro_LNX.xml");
        assert_eq!(FileHeader::by_extension("SMC").unwrap().name(), "SMC.xml");
        assert!(FileHeader::by_extension("gba").is_none());
    }

    #[test]
    fn test_headerless_file_name() {
        let lynx = FileHeader::by_name("No-Intro_LNX.xml").unwrap();
        assert_eq!(lynx.headerless_file_name("Game (USA).lnx"), "Game (USA).lyx");
        assert_eq!(lynx.headerless_file_name("Game (USA).LNX"), "Game (USA).lyx");
        assert_eq!(lynx.headerless_file_name("Game (USA).bin"), "Game (USA).bin");
    }
}
