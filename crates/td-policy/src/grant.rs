// grant.rs — Grants: who may see and write in a ticket space.
//
// A GrantSet is an allow-list of (principal, permission) pairs. Anything not
// in the set is denied; the base "everyone: deny" overwrite is always part of
// what gets sent to the platform.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use td_ticket::{RoleId, UserId};

/// Who a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Principal {
    /// The platform's default role (every member).
    Everyone,
    User(UserId),
    Role(RoleId),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Everyone => write!(f, "everyone"),
            Principal::User(id) => write!(f, "user:{}", id),
            Principal::Role(id) => write!(f, "role:{}", id),
        }
    }
}

/// What a grant allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// See the space and its history.
    Read,
    /// Post messages in the space.
    Write,
}

/// A single (principal, permission) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    pub principal: Principal,
    pub permission: Permission,
}

/// The complete access list for one ticket space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSet {
    grants: BTreeSet<Grant>,
}

impl GrantSet {
    /// An empty set: everyone denied.
    pub fn default_deny() -> Self {
        Self::default()
    }

    /// Give `principal` read + write.
    pub fn allow_read_write(&mut self, principal: Principal) {
        self.grants.insert(Grant {
            principal,
            permission: Permission::Read,
        });
        self.grants.insert(Grant {
            principal,
            permission: Permission::Write,
        });
    }

    pub fn allows(&self, principal: Principal, permission: Permission) -> bool {
        self.grants.contains(&Grant {
            principal,
            permission,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Every principal named in the set, once each.
    pub fn principals(&self) -> Vec<Principal> {
        let mut seen: Vec<Principal> = self.grants.iter().map(|g| g.principal).collect();
        seen.dedup();
        seen
    }

    /// Permission overwrites in the shape chat platforms take them:
    /// `(principal, read, write)`, led by the everyone-deny base entry.
    pub fn overwrites(&self) -> Vec<(Principal, bool, bool)> {
        let mut out = vec![(Principal::Everyone, false, false)];
        for principal in self.principals() {
            if principal == Principal::Everyone {
                continue;
            }
            out.push((
                principal,
                self.allows(principal, Permission::Read),
                self.allows(principal, Permission::Write),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_deny_allows_nothing() {
        let set = GrantSet::default_deny();
        assert!(set.is_empty());
        assert!(!set.allows(Principal::Everyone, Permission::Read));
        assert_eq!(set.overwrites(), vec![(Principal::Everyone, false, false)]);
    }

    #[test]
    fn read_write_grant_adds_both_permissions_once() {
        let mut set = GrantSet::default_deny();
        set.allow_read_write(Principal::User(UserId(1)));
        set.allow_read_write(Principal::User(UserId(1)));
        assert_eq!(set.len(), 2);
        assert!(set.allows(Principal::User(UserId(1)), Permission::Write));
        assert_eq!(set.principals(), vec![Principal::User(UserId(1))]);
    }

    #[test]
    fn overwrites_lead_with_everyone_deny() {
        let mut set = GrantSet::default_deny();
        set.allow_read_write(Principal::Role(RoleId(9)));
        let overwrites = set.overwrites();
        assert_eq!(overwrites[0], (Principal::Everyone, false, false));
        assert_eq!(overwrites[1], (Principal::Role(RoleId(9)), true, true));
    }

    #[test]
    fn principal_serializes_tagged() {
        let json = serde_json::to_string(&Principal::User(UserId(5))).unwrap();
        assert_eq!(json, r#"{"type":"user","id":5}"#);
    }
}
