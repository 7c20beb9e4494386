use std::io::{self, Read};
use std::path::Path;

use sha1::Digest;

use romsort_core::{ChecksumAlgorithm, ChecksumBitmask, Checksums};

const CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Hash everything `reader` yields after skipping `skip` bytes.
///
/// Only the algorithms in `bitmask` are computed. Returns the number of
/// bytes hashed alongside the checksums.
pub fn hash_reader(
    reader: &mut dyn Read,
    bitmask: ChecksumBitmask,
    skip: u64,
) -> io::Result<(u64, Checksums)> {
    if skip > 0 {
        let skipped = io::copy(&mut (&mut *reader).take(skip), &mut io::sink())?;
        if skipped < skip {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shorter than its {skip} byte header"),
            ));
        }
    }

    let mut crc = bitmask
        .contains(ChecksumAlgorithm::Crc32)
        .then(crc32fast::Hasher::new);
    let mut md5 = bitmask
        .contains(ChecksumAlgorithm::Md5)
        .then(md5::Context::new);
    let mut sha1 = bitmask
        .contains(ChecksumAlgorithm::Sha1)
        .then(sha1::Sha1::new);
    let mut sha256 = bitmask
        .contains(ChecksumAlgorithm::Sha256)
        .then(sha2::Sha256::new);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        if let Some(h) = crc.as_mut() {
            h.update(chunk);
        }
        if let Some(h) = md5.as_mut() {
            h.consume(chunk);
        }
        if let Some(h) = sha1.as_mut() {
            h.update(chunk);
        }
        if let Some(h) = sha256.as_mut() {
            h.update(chunk);
        }
        total += n as u64;
    }

    let mut checksums = Checksums::new();
    if let Some(h) = crc {
        checksums = checksums.with_crc32(format!("{:08x}", h.finalize()));
    }
    if let Some(h) = md5 {
        checksums = checksums.with_md5(format!("{:x}", h.compute()));
    }
    if let Some(h) = sha1 {
        checksums = checksums.with_sha1(format!("{:x}", h.finalize()));
    }
    if let Some(h) = sha256 {
        checksums = checksums.with_sha256(format!("{:x}", h.finalize()));
    }
    Ok((total, checksums))
}

/// Hash a file on disk.
pub fn hash_file(path: &Path, bitmask: ChecksumBitmask) -> io::Result<(u64, Checksums)> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    hash_reader(&mut file, bitmask, 0)
}

#[cfg(test)]
#[path = "tests/hash_tests.rs"]
mod tests;
