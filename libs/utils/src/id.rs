use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A user's durable handle: 32 lowercase hex characters.
///
/// Generated from a v4 UUID's raw bytes, matching the original
/// `hex.EncodeToString(uuid.NewV4().Bytes())` (`master/user.go`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId([u8; 16]);

#[derive(Debug, thiserror::Error)]
pub enum UserIdError {
    #[error("user id must be exactly 32 hex characters, got {0}")]
    WrongLength(usize),
    #[error("user id is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl UserId {
    /// Generate a new random user id.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(UserIdError::WrongLength(s.len()));
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.to_string()
    }
}

/// Identity of a worker as configured in the master's config file. Plain
/// strings are good enough: the set is small, static, and loaded once at
/// startup (spec.md §3: "frozen after config load").
pub type WorkerId = String;

/// Identity of a policy group, e.g. `"default"`.
pub type GroupId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = UserId::generate();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(s.parse::<UserId>().unwrap(), id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "deadbeef".parse::<UserId>(),
            Err(UserIdError::WrongLength(8))
        ));
    }

    #[test]
    fn rejects_non_hex() {
        assert!("z".repeat(32).parse::<UserId>().is_err());
    }
}
