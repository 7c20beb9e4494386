/// Kilobytes needed to hold `bytes`, rounded up. Zero bytes still costs one
/// unit so that empty files take part in throttling.
pub fn kilobytes_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(1024).max(1)
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
