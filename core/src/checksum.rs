use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRequest {
    pub checksum_type: ChecksumType,
    pub expected_hex: String,
}

impl FromStr for ChecksumRequest {
    type Err = CoreError;

    /// Parses `<type>:<hex>`, e.g. `sha256:9f86d0...`.
    fn from_str(value: &str) -> CoreResult<Self> {
        let (kind, hex) = value.split_once(':').ok_or_else(|| {
            CoreError::InvalidConfig(format!("checksum '{}' is not <type>:<hex>", value))
        })?;
        let checksum_type = match kind.trim().to_ascii_lowercase().as_str() {
            "md5" => ChecksumType::Md5,
            "sha1" => ChecksumType::Sha1,
            "sha256" => ChecksumType::Sha256,
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "unsupported checksum type '{}'",
                    other
                )))
            }
        };
        let expected_hex = hex.trim().to_ascii_lowercase();
        if expected_hex.is_empty() || !expected_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidConfig(format!(
                "checksum '{}' is not hex",
                hex
            )));
        }
        Ok(Self {
            checksum_type,
            expected_hex,
        })
    }
}

pub fn file_digest(path: &Path, checksum_type: ChecksumType) -> CoreResult<String> {
    match checksum_type {
        ChecksumType::Md5 => digest_file::<Md5>(path),
        ChecksumType::Sha1 => digest_file::<Sha1>(path),
        ChecksumType::Sha256 => digest_file::<Sha256>(path),
    }
}

pub fn verify_checksum(path: &Path, req: &ChecksumRequest) -> CoreResult<()> {
    let actual = file_digest(path, req.checksum_type)?;
    if actual.eq_ignore_ascii_case(&req.expected_hex) {
        Ok(())
    } else {
        Err(CoreError::ChecksumMismatch {
            expected: req.expected_hex.clone(),
            actual,
        })
    }
}

fn digest_file<D: Digest>(path: &Path) -> CoreResult<String> {
    let file = File::open(path).map_err(|err| CoreError::Io(err.to_string()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = D::new();
    let mut buf = [0u8; 1024 * 64];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|err| CoreError::Io(err.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
