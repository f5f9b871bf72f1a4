use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised while handling checksum names and values.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChecksumError {
    /// The algorithm name is not supported.
    #[error("unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The value is not a hex digest of the right length.
    #[error("invalid {algorithm} checksum '{value}'")]
    InvalidValue {
        /// Algorithm the value was meant for.
        algorithm: ChecksumAlgorithm,
        /// Offending value.
        value: String,
    },

    /// A checksum side-file holds no usable value.
    #[error("empty checksum file")]
    Empty,
}

/// Digest algorithms usable for side-file verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, 32 hex characters.
    Md5,
    /// SHA-1, 40 hex characters.
    Sha1,
    /// SHA-256, 64 hex characters.
    Sha256,
    /// SHA-512, 128 hex characters.
    Sha512,
}

impl ChecksumAlgorithm {
    /// Name used in settings and as side-file extension.
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of a hex digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Parse a comma separated list such as `"sha1, md5"`.
    ///
    /// Blank entries and `none` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownAlgorithm`] for any unsupported name.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ChecksumError> {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != "none")
            .map(str::parse)
            .collect()
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            other => Err(ChecksumError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for ChecksumAlgorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated lowercase hex digest for a known algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl Checksum {
    /// Validate `hex` as a digest of `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::InvalidValue`] if the length or characters are wrong.
    pub fn new(algorithm: ChecksumAlgorithm, hex: &str) -> Result<Self, ChecksumError> {
        let hex = hex.trim().to_ascii_lowercase();
        if hex.len() == algorithm.hex_len() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self { algorithm, hex })
        } else {
            Err(ChecksumError::InvalidValue { algorithm, value: hex })
        }
    }

    /// Read the expected value out of a checksum side-file.
    ///
    /// Understands plain digests, `md5sum` style (`<digest>  <file>`), BSD
    /// style (`MD5 (file) = <digest>`) and digests split in groups after a
    /// `name:` label.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Empty`] for blank content, or
    /// [`ChecksumError::InvalidValue`] when the extracted value is malformed.
    pub fn from_side_file(
        algorithm: ChecksumAlgorithm,
        content: &str,
    ) -> Result<Self, ChecksumError> {
        let content = content.trim();
        let lowered = content.to_ascii_lowercase();
        let value = if content.contains(' ')
            && (lowered.starts_with("md") || lowered.starts_with("sha"))
        {
            content
                .split_whitespace()
                .last()
                .ok_or(ChecksumError::Empty)?
                .to_string()
        } else {
            let mut tokens = content.split_whitespace();
            let first = tokens.next().ok_or(ChecksumError::Empty)?;
            if first.ends_with(':') {
                tokens.collect::<String>()
            } else {
                first.to_string()
            }
        };
        Self::new(algorithm, &value)
    }

    /// Algorithm of the digest.
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest.
    pub fn as_str(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.hex
    }
}
