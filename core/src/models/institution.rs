//! Institution model
//!
//! An institution owns a set of accounts (exactly one owner per account,
//! enforced at registration) and carries the partial-settlement opt-in flag
//! that the settlement protocol consults before splitting an instruction.

use serde::{Deserialize, Serialize};

/// A participating institution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    /// Unique institution identifier (e.g. "INST-1")
    id: String,

    /// IDs of the accounts this institution owns
    account_ids: Vec<String>,

    /// Whether this institution accepts partial settlement of its
    /// instructions
    allow_partial: bool,
}

impl Institution {
    /// Create a new institution with no accounts
    pub fn new(id: String, allow_partial: bool) -> Self {
        Self {
            id,
            account_ids: Vec::new(),
            allow_partial,
        }
    }

    /// Get institution ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// IDs of the accounts this institution owns
    pub fn account_ids(&self) -> &[String] {
        &self.account_ids
    }

    /// Record ownership of an account
    pub(crate) fn add_account(&mut self, account_id: String) {
        self.account_ids.push(account_id);
    }

    /// True if this institution owns the given account
    pub fn owns_account(&self, account_id: &str) -> bool {
        self.account_ids.iter().any(|id| id == account_id)
    }

    /// Whether partial settlement is currently allowed
    pub fn allow_partial(&self) -> bool {
        self.allow_partial
    }

    /// Opt in to or out of partial settlement
    pub fn set_allow_partial(&mut self, allow: bool) {
        self.allow_partial = allow;
    }
}
