use std::collections::BTreeMap;

use dant_core::access::{AccessControl, Role};
use dant_core::constants::{TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use dant_core::error::DantError;
use dant_core::types::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── AssetLedger ──────────────────────────────────────────────────────────────

/// The fungible-asset surface the staking core depends on.
///
/// `check_*`/`can_*` are side-effect free so callers can validate a whole
/// operation before the first mutation.
pub trait AssetLedger {
    fn balance_of(&self, account: &AccountId) -> Balance;

    fn total_supply(&self) -> Balance;

    fn can_mint(&self, minter: &AccountId) -> bool;

    fn mint(&mut self, caller: &AccountId, to: AccountId, amount: Balance) -> Result<(), DantError>;

    fn transfer(&mut self, from: AccountId, to: AccountId, amount: Balance) -> Result<(), DantError>;

    fn check_transfer_from(
        &self,
        spender: &AccountId,
        owner: &AccountId,
        amount: Balance,
    ) -> Result<(), DantError>;

    /// Move `amount` from `owner` to `to` against the allowance `owner`
    /// granted `spender`.
    fn transfer_from(
        &mut self,
        spender: AccountId,
        owner: AccountId,
        to: AccountId,
        amount: Balance,
    ) -> Result<(), DantError>;
}

// ── TokenLedger ──────────────────────────────────────────────────────────────

/// In-memory dANT ledger with role-gated minting and allowances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    name: String,
    symbol: String,
    decimals: u8,
    initial_supply: Balance,
    total_supply: Balance,
    /// Minted after genesis.
    minted: Balance,
    balances: BTreeMap<AccountId, Balance>,
    /// owner → spender → remaining allowance
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Balance>>,
    access: AccessControl,
}

impl TokenLedger {
    /// Deploy the token: `deployer` becomes admin and receives `initial_supply`.
    pub fn new(deployer: AccountId, initial_supply: Balance) -> Self {
        let mut balances = BTreeMap::new();
        if initial_supply > 0 {
            balances.insert(deployer, initial_supply);
        }
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            initial_supply,
            total_supply: initial_supply,
            minted: 0,
            balances,
            allowances: BTreeMap::new(),
            access: AccessControl::new(deployer),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn initial_supply(&self) -> Balance {
        self.initial_supply
    }

    pub fn minted(&self) -> Balance {
        self.minted
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Balance {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn approve(&mut self, owner: AccountId, spender: AccountId, amount: Balance) -> Result<(), DantError> {
        if spender.is_null() {
            return Err(DantError::ZeroAddress);
        }
        self.allowances.entry(owner).or_default().insert(spender, amount);
        Ok(())
    }

    pub fn grant_role(&mut self, caller: &AccountId, role: Role, account: AccountId) -> Result<(), DantError> {
        self.access.grant_role(caller, role, account)
    }

    pub fn revoke_role(&mut self, caller: &AccountId, role: Role, account: &AccountId) -> Result<(), DantError> {
        self.access.revoke_role(caller, role, account)
    }

    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.access.has_role(role, account)
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    fn check_balance(&self, from: &AccountId, amount: Balance) -> Result<(), DantError> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(DantError::InsufficientBalance { need: amount, have });
        }
        Ok(())
    }

    fn move_balance(&mut self, from: AccountId, to: AccountId, amount: Balance) -> Result<(), DantError> {
        if to.is_null() {
            return Err(DantError::ZeroAddress);
        }
        self.check_balance(&from, amount)?;
        if amount == 0 || from == to {
            return Ok(());
        }
        let to_bal = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(DantError::Overflow)?;
        let from_bal = self.balance_of(&from) - amount;
        self.balances.insert(from, from_bal);
        self.balances.insert(to, to_bal);
        Ok(())
    }
}

impl AssetLedger for TokenLedger {
    fn balance_of(&self, account: &AccountId) -> Balance {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> Balance {
        self.total_supply
    }

    fn can_mint(&self, minter: &AccountId) -> bool {
        self.access.has_role(Role::Minter, minter)
    }

    fn mint(&mut self, caller: &AccountId, to: AccountId, amount: Balance) -> Result<(), DantError> {
        self.access.ensure_role(Role::Minter, caller)?;
        if to.is_null() {
            return Err(DantError::ZeroAddress);
        }
        if amount == 0 {
            return Ok(());
        }
        let supply = self.total_supply.checked_add(amount).ok_or(DantError::Overflow)?;
        let to_bal = self.balance_of(&to).checked_add(amount).ok_or(DantError::Overflow)?;
        self.total_supply = supply;
        self.minted += amount;
        self.balances.insert(to, to_bal);
        debug!(minter = %caller, to = %to, amount, "minted");
        Ok(())
    }

    fn transfer(&mut self, from: AccountId, to: AccountId, amount: Balance) -> Result<(), DantError> {
        self.move_balance(from, to, amount)
    }

    fn check_transfer_from(
        &self,
        spender: &AccountId,
        owner: &AccountId,
        amount: Balance,
    ) -> Result<(), DantError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(DantError::InsufficientAllowance { need: amount, have: allowed });
        }
        self.check_balance(owner, amount)
    }

    fn transfer_from(
        &mut self,
        spender: AccountId,
        owner: AccountId,
        to: AccountId,
        amount: Balance,
    ) -> Result<(), DantError> {
        self.check_transfer_from(&spender, &owner, amount)?;
        self.move_balance(owner, to, amount)?;
        if amount > 0 {
            let left = self.allowance(&owner, &spender) - amount;
            self.allowances.entry(owner).or_default().insert(spender, left);
        }
        Ok(())
    }
}
