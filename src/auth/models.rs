//! Privilege levels.
//!
//! Lower numbers are more privileged; `0` is the administrator. A client is
//! permitted a resource iff `client.level <= required`. This single rule is
//! applied everywhere a level is checked.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric client privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub i32);

impl Level {
    /// Administrator
    pub const ADMIN: Level = Level(0);
    /// Level given to new credentials unless configured otherwise
    pub const DEFAULT: Level = Level(10);

    /// Check if this level satisfies `required`.
    pub fn permits(self, required: Level) -> bool {
        self.0 <= required.0
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::DEFAULT
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Level a resource demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredLevel {
    /// Open to any authenticated, non-revoked client
    Any,
    /// Client level must be at most this
    AtMost(Level),
}

impl RequiredLevel {
    /// Check if a client at `level` is admitted.
    pub fn admits(self, level: Level) -> bool {
        match self {
            RequiredLevel::Any => true,
            RequiredLevel::AtMost(required) => level.permits(required),
        }
    }
}

impl From<Option<i32>> for RequiredLevel {
    fn from(level: Option<i32>) -> Self {
        level.map_or(RequiredLevel::Any, |l| RequiredLevel::AtMost(Level(l)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits() {
        assert!(Level::ADMIN.permits(Level::ADMIN));
        assert!(Level::ADMIN.permits(Level(10)));
        assert!(!Level(10).permits(Level::ADMIN));
        assert!(Level(10).permits(Level(10)));
        assert!(!Level(11).permits(Level(10)));
    }

    #[test]
    fn test_required_any() {
        assert!(RequiredLevel::Any.admits(Level(i32::MAX)));
        assert!(RequiredLevel::Any.admits(Level::ADMIN));
    }

    #[test]
    fn test_required_at_most() {
        let admin_only = RequiredLevel::AtMost(Level::ADMIN);
        assert!(admin_only.admits(Level::ADMIN));
        assert!(!admin_only.admits(Level::DEFAULT));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(RequiredLevel::from(None), RequiredLevel::Any);
        assert_eq!(
            RequiredLevel::from(Some(0)),
            RequiredLevel::AtMost(Level::ADMIN)
        );
    }

    #[test]
    fn test_serde_transparent() {
        assert_eq!(serde_json::to_string(&Level(10)).unwrap(), "10");
        assert_eq!(serde_json::from_str::<Level>("0").unwrap(), Level::ADMIN);
    }
}
