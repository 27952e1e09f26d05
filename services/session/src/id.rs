//! Session identifiers.
//!
//! Ids are minted by clients, not by this service, so they are opaque
//! strings — validated for shape, never generated here.

use std::fmt;

use thiserror::Error;

/// Maximum id length in bytes.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Session id validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("session id is empty")]
    Empty,

    #[error("session id exceeds {MAX_SESSION_ID_LEN} bytes")]
    TooLong,

    #[error("session id contains characters outside visible ASCII")]
    InvalidCharacter,
}

/// An opaque, client-minted session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and canonicalize (trim) an id string.
    pub fn parse(s: &str) -> Result<Self, SessionIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong);
        }
        if !s.chars().all(|c| c.is_ascii_graphic()) {
            return Err(SessionIdError::InvalidCharacter);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_parse_trims_and_keeps_value() {
        let id = SessionId::parse("  tab-42 ").unwrap();
        assert_eq!(id.as_str(), "tab-42");
        assert_eq!(id.to_string(), "tab-42");
    }

    #[rstest]
    #[case("", SessionIdError::Empty)]
    #[case("   ", SessionIdError::Empty)]
    #[case("id with spaces", SessionIdError::InvalidCharacter)]
    #[case("id\u{7f}", SessionIdError::InvalidCharacter)]
    fn test_parse_rejects_bad_shapes(#[case] input: &str, #[case] expected: SessionIdError) {
        assert_eq!(SessionId::parse(input), Err(expected));
    }

    #[test]
    fn test_parse_rejects_overlong_id() {
        assert_eq!(
            SessionId::parse(&"x".repeat(MAX_SESSION_ID_LEN + 1)),
            Err(SessionIdError::TooLong)
        );
    }

    #[test]
    fn test_from_str_round_trip() {
        let id: SessionId = "browser-01HX".parse().unwrap();
        let again: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, again);
    }
}
