use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DantError;
use crate::types::AccountId;

// ── Role ─────────────────────────────────────────────────────────────────────

/// Capabilities a component can hand out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Manages every other role. Always held by exactly one account.
    Admin,
    /// May mint new tokens.
    Minter,
    /// May register referrals on the tree (held by registered distributors).
    Rewards,
}

// ── AccessControl ────────────────────────────────────────────────────────────

/// Enumerable role registry owned by one component.
///
/// Members are kept in grant order so `role_member(role, i)` is stable.
/// Checks are pure reads over this state. Every mutation after `new` goes
/// through the admin-gated methods.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, Vec<AccountId>>,
}

impl AccessControl {
    pub fn new(admin: AccountId) -> Self {
        let mut ac = Self::default();
        ac.insert(Role::Admin, admin);
        ac
    }

    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.members
            .get(&role)
            .map(|m| m.contains(account))
            .unwrap_or(false)
    }

    pub fn ensure_role(&self, role: Role, account: &AccountId) -> Result<(), DantError> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(DantError::Unauthorized { account: *account, role })
        }
    }

    pub fn admin(&self) -> Option<AccountId> {
        self.role_member(Role::Admin, 0)
    }

    pub fn role_member_count(&self, role: Role) -> usize {
        self.members.get(&role).map(Vec::len).unwrap_or(0)
    }

    pub fn role_member(&self, role: Role, index: usize) -> Option<AccountId> {
        self.members.get(&role).and_then(|m| m.get(index)).copied()
    }

    /// Admin-gated grant. The admin role itself only moves via `change_admin`.
    pub fn grant_role(
        &mut self,
        caller: &AccountId,
        role: Role,
        account: AccountId,
    ) -> Result<(), DantError> {
        self.ensure_role(Role::Admin, caller)?;
        if role == Role::Admin {
            return Err(DantError::SoleRoleMember(Role::Admin));
        }
        if account.is_null() {
            return Err(DantError::ZeroAddress);
        }
        self.insert(role, account);
        Ok(())
    }

    pub fn revoke_role(
        &mut self,
        caller: &AccountId,
        role: Role,
        account: &AccountId,
    ) -> Result<(), DantError> {
        self.ensure_role(Role::Admin, caller)?;
        if role == Role::Admin {
            return Err(DantError::SoleRoleMember(Role::Admin));
        }
        self.remove(role, account);
        Ok(())
    }

    /// Swap the sole admin for `new_admin` in one step.
    pub fn change_admin(&mut self, caller: &AccountId, new_admin: AccountId) -> Result<(), DantError> {
        self.ensure_role(Role::Admin, caller)?;
        if new_admin.is_null() {
            return Err(DantError::ZeroAddress);
        }
        self.members.insert(Role::Admin, vec![new_admin]);
        Ok(())
    }

    /// A no-op when `account` already holds `role`.
    fn insert(&mut self, role: Role, account: AccountId) {
        let m = self.members.entry(role).or_default();
        if !m.contains(&account) {
            m.push(account);
        }
    }

    fn remove(&mut self, role: Role, account: &AccountId) {
        if let Some(m) = self.members.get_mut(&role) {
            m.retain(|a| a != account);
        }
    }
}
