//! Role table implementing [`Authorizer`].

use std::collections::{HashMap, HashSet};

use crate::error::AuthError;
use crate::traits::Authorizer;
use crate::types::{AccountId, Role};

/// Role membership held in memory.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    members: HashMap<Role, HashSet<AccountId>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, role: Role, account: AccountId) {
        self.members.entry(role).or_default().insert(account);
    }

    pub fn revoke(&mut self, role: Role, account: &AccountId) {
        if let Some(set) = self.members.get_mut(&role) {
            set.remove(account);
        }
    }

    /// Fail with [`AuthError::Unauthorized`] unless `caller` holds `role`.
    pub fn require(&self, caller: &AccountId, role: Role) -> Result<(), AuthError> {
        if self.is_authorized(caller, role) {
            Ok(())
        } else {
            Err(AuthError::Unauthorized { caller: *caller, role })
        }
    }
}

impl Authorizer for RoleTable {
    fn is_authorized(&self, caller: &AccountId, role: Role) -> bool {
        self.members.get(&role).is_some_and(|set| set.contains(caller))
    }
}
