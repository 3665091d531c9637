use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::rules::errors::RuleError;

/// A console role inside one organization.
///
/// `None` means the user is not a member of the organization. The variants are
/// declared in rank order so the derived `Ord` matches the role hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Role {
    #[default]
    None,
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Role::None => 0,
            Role::Viewer => 1,
            Role::Editor => 2,
            Role::Admin => 3,
        }
    }

    pub fn is_higher_than(self, other: Role) -> bool {
        self.rank() > other.rank()
    }

    pub fn is_higher_or_equal(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub fn is_lower_than(self, other: Role) -> bool {
        !self.is_higher_or_equal(other)
    }

    /// Roles a rule may grant. `None` is only ever the absence of a grant.
    pub fn is_assignable(self) -> bool {
        self != Role::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::None => "None",
            Role::Viewer => "Viewer",
            Role::Editor => "Editor",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "None" => Ok(Role::None),
            "Viewer" => Ok(Role::Viewer),
            "Editor" => Ok(Role::Editor),
            "Admin" => Ok(Role::Admin),
            other => Err(RuleError::InvalidRole(other.to_string())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
