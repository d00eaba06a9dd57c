// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File integrity — MD5 and SHA-256 fingerprints for preservation metadata.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use md5::Md5;
use scriptorium_core::error::ScriptoriumError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 64 * 1024;

/// Digest algorithms recorded in METS `CHECKSUMTYPE` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumKind {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl ChecksumKind {
    /// Label used in `CHECKSUMTYPE`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Lowercase hex digest of `data`.
pub fn hash_bytes(kind: ChecksumKind, data: &[u8]) -> String {
    match kind {
        ChecksumKind::Md5 => hex::encode(Md5::digest(data)),
        ChecksumKind::Sha256 => hex::encode(Sha256::digest(data)),
    }
}

/// Lowercase hex digest of the file at `path`, read in fixed-size blocks.
pub fn hash_file(kind: ChecksumKind, path: impl AsRef<Path>) -> Result<String, ScriptoriumError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::with_capacity(BLOCK_SIZE, file);
    match kind {
        ChecksumKind::Md5 => stream_digest::<Md5>(reader),
        ChecksumKind::Sha256 => stream_digest::<Sha256>(reader),
    }
}

fn stream_digest<D: Digest>(mut reader: impl Read) -> Result<String, ScriptoriumError> {
    let mut hasher = D::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    loop {
        let read = reader.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_empty_input() {
        assert_eq!(hash_bytes(ChecksumKind::Sha256, b""), EMPTY_SHA256);
    }

    #[test]
    fn md5_known_value() {
        // MD5("hello"), checked against coreutils md5sum.
        assert_eq!(
            hash_bytes(ChecksumKind::Md5, b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        // Larger than one block so the streaming loop runs more than once.
        let data: Vec<u8> = (0..(BLOCK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        for kind in [ChecksumKind::Md5, ChecksumKind::Sha256] {
            assert_eq!(hash_file(kind, &path).unwrap(), hash_bytes(kind, &data));
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = hash_file(ChecksumKind::Md5, "/nonexistent/blob").unwrap_err();
        assert!(matches!(err, ScriptoriumError::Io(_)));
    }
}
