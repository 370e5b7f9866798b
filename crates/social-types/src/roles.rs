use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numeric privilege tier. Higher tiers satisfy lower requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleLevel(pub i64);

/// Static role table. Mirrored into the `roles` table by the migrations.
pub const ROLES: &[(&str, RoleLevel)] = &[
    ("user", RoleLevel(1)),
    ("moderator", RoleLevel(2)),
    ("admin", RoleLevel(3)),
];

/// Tier assigned to freshly registered accounts.
pub const DEFAULT_ROLE: RoleLevel = RoleLevel(1);

pub fn resolve(name: &str) -> Result<RoleLevel> {
    ROLES
        .iter()
        .find(|(role, _)| *role == name)
        .map(|(_, level)| *level)
        .ok_or(Error::RoleNotFound)
}

/// The already-authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role_level: RoleLevel,
}

/// Owner-scoped, tiered authorization: the actor must own the resource and
/// hold at least `required`.
pub fn authorize(actor: &Actor, owner_id: i64, required: RoleLevel) -> Result<()> {
    if actor.id == owner_id && actor.role_level >= required {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_roles() {
        assert_eq!(resolve("user").unwrap(), RoleLevel(1));
        assert_eq!(resolve("admin").unwrap(), RoleLevel(3));
        assert_eq!(resolve("root"), Err(Error::RoleNotFound));
    }

    #[test]
    fn higher_tier_satisfies_lower_requirement() {
        let admin = Actor { id: 7, role_level: resolve("admin").unwrap() };
        let required = resolve("moderator").unwrap();
        assert!(authorize(&admin, 7, required).is_ok());
    }

    #[test]
    fn lower_tier_is_forbidden() {
        let user = Actor { id: 7, role_level: DEFAULT_ROLE };
        let required = resolve("moderator").unwrap();
        assert_eq!(authorize(&user, 7, required), Err(Error::Forbidden));
    }

    #[test]
    fn non_owner_is_forbidden_regardless_of_tier() {
        let admin = Actor { id: 7, role_level: resolve("admin").unwrap() };
        assert_eq!(authorize(&admin, 8, DEFAULT_ROLE), Err(Error::Forbidden));
    }
}
