//! Representation of the requested HTTP version

use std::fmt::Display;

use super::ParseError;

/// Representation of the requested HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0
    H1_0,
    /// HTTP/1.1
    H1_1,
    /// HTTP/2
    H2,
    /// HTTP/3
    H3,
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::H1_0 => "HTTP/1.0",
            Self::H1_1 => "HTTP/1.1",
            Self::H2 => "HTTP/2",
            Self::H3 => "HTTP/3",
        })
    }
}

impl Version {
    /// Parses an HTTP-version token, e.g. `HTTP/1.1`. Only 1.0 and 1.1 are supported for actual
    /// parsing of this proxy's wire protocol (`§1` Non-goals excludes H2/H3), but the token is
    /// still recognized so a clear `ParseError` can be raised instead of a generic one.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        match bytes {
            b"HTTP/1.0" => Ok(Self::H1_0),
            b"HTTP/1.1" => Ok(Self::H1_1),
            b"HTTP/2" | b"HTTP/2.0" => Ok(Self::H2),
            b"HTTP/3" | b"HTTP/3.0" => Ok(Self::H3),
            _ => Err(ParseError::Version),
        }
    }

    /// Whether this version allows persistent connections by default (1.1 does, 1.0 doesn't
    /// unless `Connection: keep-alive` is present).
    pub fn keep_alive_by_default(&self) -> bool {
        matches!(self, Version::H1_1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_versions() {
        assert_eq!(Version::from_bytes(b"HTTP/1.1").unwrap(), Version::H1_1);
        assert_eq!(Version::from_bytes(b"HTTP/1.0").unwrap(), Version::H1_0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::from_bytes(b"HTTP/7.7").is_err());
    }
}
