//! Permission levels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rank controlling which actors may invoke which commands.
///
/// Variants are declared lowest first so the derived `Ord` is the rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    None,
    User,
    Mod,
    Admin,
    Owner,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::User => "user",
            PermissionLevel::Mod => "mod",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
        }
    }

    /// Parse a level name as typed in chat.
    ///
    /// Unknown names fall back to `User`.
    pub fn from_name_lossy(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "owner" => PermissionLevel::Owner,
            "admin" => PermissionLevel::Admin,
            "mod" => PermissionLevel::Mod,
            "none" => PermissionLevel::None,
            _ => PermissionLevel::User,
        }
    }

    /// Whether an actor holding `self` may run a command requiring `required`.
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self >= required
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionLevel::None => "None",
            PermissionLevel::User => "User",
            PermissionLevel::Mod => "Mod",
            PermissionLevel::Admin => "Admin",
            PermissionLevel::Owner => "Owner",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PermissionLevel; 5] = [
        PermissionLevel::None,
        PermissionLevel::User,
        PermissionLevel::Mod,
        PermissionLevel::Admin,
        PermissionLevel::Owner,
    ];

    #[test]
    fn test_levels_are_totally_ordered() {
        for (i, low) in ALL.iter().enumerate() {
            for high in &ALL[i..] {
                assert!(high.satisfies(*low), "{} should satisfy {}", high, low);
            }
            for high in &ALL[i + 1..] {
                assert!(!low.satisfies(*high), "{} should not satisfy {}", low, high);
            }
        }
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(PermissionLevel::from_name_lossy("ADMIN"), PermissionLevel::Admin);
        assert_eq!(PermissionLevel::from_name_lossy("Owner"), PermissionLevel::Owner);
        assert_eq!(PermissionLevel::from_name_lossy(" mod "), PermissionLevel::Mod);
        assert_eq!(PermissionLevel::from_name_lossy("none"), PermissionLevel::None);
    }

    #[test]
    fn test_unknown_name_defaults_to_user() {
        assert_eq!(PermissionLevel::from_name_lossy("superuser"), PermissionLevel::User);
        assert_eq!(PermissionLevel::from_name_lossy(""), PermissionLevel::User);
    }

    #[test]
    fn test_serializes_as_lowercase_name() {
        let json = serde_json::to_string(&PermissionLevel::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }
}
