//! Per-collection access control (§4.4 Access control).
//!
//! Every registry operation calls [`AccessControl::check_access`] before any
//! side effect. Failure returns [`RegistryError::Forbidden`] uniformly —
//! the server never reveals whether a collection exists or whether the user
//! simply lacks access to it.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::RegistryError;
use crate::types::Permission;

pub trait AccessControl: Send + Sync {
    fn check_access(&self, collection_id: &str, user_id: &str, required: Permission) -> Result<(), RegistryError>;
}

/// In-memory grant table, keyed by `(collection_id, user_id)`. Sufficient
/// for tests and as a reference implementation; a production deployment
/// would back this with the collection-membership subsystem the spec treats
/// as an external collaborator (§1).
#[derive(Default)]
pub struct InMemoryAccessControl {
    grants: RwLock<HashMap<(String, String), Permission>>,
}

impl InMemoryAccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, collection_id: impl Into<String>, user_id: impl Into<String>, permission: Permission) {
        let mut grants = self.grants.write().expect("access control lock poisoned");
        grants.insert((collection_id.into(), user_id.into()), permission);
    }

    pub fn revoke(&self, collection_id: &str, user_id: &str) {
        let mut grants = self.grants.write().expect("access control lock poisoned");
        grants.remove(&(collection_id.to_string(), user_id.to_string()));
    }
}

impl AccessControl for InMemoryAccessControl {
    fn check_access(&self, collection_id: &str, user_id: &str, required: Permission) -> Result<(), RegistryError> {
        let grants = self.grants.read().expect("access control lock poisoned");
        match grants.get(&(collection_id.to_string(), user_id.to_string())) {
            Some(granted) if granted.satisfies(required) => Ok(()),
            _ => Err(RegistryError::Forbidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_grant_rejects_write() {
        let ac = InMemoryAccessControl::new();
        ac.grant("c1", "u1", Permission::ReadOnly);
        assert!(ac.check_access("c1", "u1", Permission::ReadOnly).is_ok());
        assert!(matches!(
            ac.check_access("c1", "u1", Permission::ReadWrite),
            Err(RegistryError::Forbidden)
        ));
    }

    #[test]
    fn unknown_user_is_forbidden_not_not_found() {
        let ac = InMemoryAccessControl::new();
        assert!(matches!(
            ac.check_access("c1", "stranger", Permission::ReadOnly),
            Err(RegistryError::Forbidden)
        ));
    }

    #[test]
    fn revoke_removes_access() {
        let ac = InMemoryAccessControl::new();
        ac.grant("c1", "u1", Permission::ReadWrite);
        ac.revoke("c1", "u1");
        assert!(ac.check_access("c1", "u1", Permission::ReadOnly).is_err());
    }
}
