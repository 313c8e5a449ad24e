//! Transaction model
//!
//! A transaction binds one matched Delivery/Receipt instruction pair and is
//! the unit the settlement protocol operates on. It owns no accounts; it
//! only names the two legs whose accounts the protocol moves money between.
//!
//! Transactions are created exclusively by a successful match and retired
//! from the active set once terminal.

use serde::{Deserialize, Serialize};

/// Transaction lifecycle status, mirroring the matched pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Both legs matched, settlement not yet achieved
    Matched,

    /// Swap executed in full
    Settled,

    /// Superseded by a child pair after a partial-settlement split
    CancelledPartial,

    /// Torn down because a leg timed out
    CancelledTimeout,

    /// Forced terminal state after a post-swap consistency violation
    CancelledError,
}

impl TransactionStatus {
    /// True for states a transaction can never leave
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Matched)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransactionStatus::Matched => "Matched",
            TransactionStatus::Settled => "Settled",
            TransactionStatus::CancelledPartial => "CancelledPartial",
            TransactionStatus::CancelledTimeout => "CancelledTimeout",
            TransactionStatus::CancelledError => "CancelledError",
        };
        write!(f, "{}", label)
    }
}

/// A matched Delivery/Receipt pair awaiting (or past) settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier (UUID)
    id: String,

    /// Delivery leg instruction ID
    delivery_id: String,

    /// Receipt leg instruction ID
    receipt_id: String,

    /// Current status
    status: TransactionStatus,
}

impl Transaction {
    /// Create a transaction for a freshly matched pair
    pub fn new(delivery_id: String, receipt_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            delivery_id,
            receipt_id,
            status: TransactionStatus::Matched,
        }
    }

    /// Get transaction ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Delivery leg instruction ID
    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    /// Receipt leg instruction ID
    pub fn receipt_id(&self) -> &str {
        &self.receipt_id
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Overwrite the status (legality is the settlement protocol's concern)
    pub fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }

    /// Given one leg's ID, the other leg's ID
    ///
    /// Returns `None` if the given ID is neither leg.
    pub fn counterpart_of(&self, instruction_id: &str) -> Option<&str> {
        if instruction_id == self.delivery_id {
            Some(&self.receipt_id)
        } else if instruction_id == self.receipt_id {
            Some(&self.delivery_id)
        } else {
            None
        }
    }
}
