// ids.rs — Platform identifiers.
//
// The chat platform hands out 64-bit snowflake ids for users, roles,
// channels and messages. Wrapping each in its own newtype keeps a role id
// from being passed where a user id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                $name(raw)
            }
        }
    };
}

snowflake!(
    /// A platform user (also used for the bot's own service identity).
    UserId
);
snowflake!(
    /// A platform role.
    RoleId
);
snowflake!(
    /// A conversation space: ticket channel, log channel or category.
    SpaceId
);
snowflake!(
    /// A posted message.
    MessageId
);

/// A role as the platform reports it on a member: id plus display name.
///
/// Role lists are kept in the order the platform returns them; the gang
/// policy depends on that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

impl Role {
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_and_display() {
        let id: UserId = " 1101039305390043187 ".parse().unwrap();
        assert_eq!(id, UserId(1101039305390043187));
        assert_eq!(id.to_string(), "1101039305390043187");
        assert!("not-a-number".parse::<SpaceId>().is_err());
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&SpaceId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
