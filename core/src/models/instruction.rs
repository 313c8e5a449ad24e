//! Instruction model
//!
//! One leg of an intended delivery-versus-payment transfer. An instruction
//! is either the Delivery leg (securities out, cash in) or the Receipt leg
//! (cash out, securities in) of a pair correlated by a shared link code.
//!
//! The two roles share one state machine:
//!
//! ```text
//! Exists -> Pending -> Validated -> Matched -> Settled
//!                                           -> CancelledPartial
//!                                           -> CancelledError
//! CancelledTimeout is reachable from Exists, Pending, Validated and Matched.
//! ```
//!
//! Instructions never self-advance on a timer; the engine polls them each
//! tick and drives every transition externally. Role-specific behavior
//! (child creation during partial settlement) lives in the settlement
//! module, which dispatches on [`InstructionRole`].
//!
//! CRITICAL: All money values are i64 (cents)

use serde::{Deserialize, Serialize};

/// Mother ID carried by root instructions (those not created by a split)
pub const ROOT_MOTHER_ID: &str = "mother";

/// Which leg of the pair an instruction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionRole {
    /// Delivers securities against cash
    Delivery,

    /// Receives securities against cash
    Receipt,
}

impl InstructionRole {
    /// The role an instruction's match counterpart must have
    pub fn counterpart(&self) -> InstructionRole {
        match self {
            InstructionRole::Delivery => InstructionRole::Receipt,
            InstructionRole::Receipt => InstructionRole::Delivery,
        }
    }
}

impl std::fmt::Display for InstructionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstructionRole::Delivery => write!(f, "Delivery"),
            InstructionRole::Receipt => write!(f, "Receipt"),
        }
    }
}

/// Instruction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionStatus {
    /// Created, not yet picked up by the engine
    Exists,

    /// Inserted into the processing stream
    Pending,

    /// Validated and eligible for matching
    Validated,

    /// Paired with a counterpart; a transaction links both legs
    Matched,

    /// Swap executed in full
    Settled,

    /// Torn down because the instruction (or its counterpart) outlived the
    /// configured timeout
    CancelledTimeout,

    /// Superseded by child instructions after a partial settlement split
    CancelledPartial,

    /// Forced terminal state after a post-swap consistency violation
    CancelledError,
}

impl InstructionStatus {
    /// True for states an instruction can never leave
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstructionStatus::Settled
                | InstructionStatus::CancelledTimeout
                | InstructionStatus::CancelledPartial
                | InstructionStatus::CancelledError
        )
    }
}

impl std::fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            InstructionStatus::Exists => "Exists",
            InstructionStatus::Pending => "Pending",
            InstructionStatus::Validated => "Validated",
            InstructionStatus::Matched => "Matched",
            InstructionStatus::Settled => "Settled",
            InstructionStatus::CancelledTimeout => "CancelledTimeout",
            InstructionStatus::CancelledPartial => "CancelledPartial",
            InstructionStatus::CancelledError => "CancelledError",
        };
        write!(f, "{}", label)
    }
}

/// Submission payload for one leg of an instruction pair
///
/// The engine assigns the instruction ID, creation tick and role; everything
/// else comes from the submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionDraft {
    /// Submitting institution
    pub institution_id: String,

    /// Securities account backing this leg
    pub securities_account_id: String,

    /// Cash account backing this leg
    pub cash_account_id: String,

    /// Symbol of the security being transferred
    pub security_type: String,

    /// Amount to transfer (cents / units, must be positive)
    pub amount: i64,

    /// Correlation key shared with the counterpart leg
    pub linkcode: String,
}

/// One leg of an intended settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    /// Unique instruction identifier
    id: String,

    /// Parent instruction ID, or [`ROOT_MOTHER_ID`] for roots
    mother_id: String,

    /// Correlation key pairing this leg with its counterpart
    linkcode: String,

    /// Owning institution
    institution_id: String,

    /// Securities account backing this leg
    securities_account_id: String,

    /// Cash account backing this leg
    cash_account_id: String,

    /// Symbol of the security being transferred
    security_type: String,

    /// Amount to transfer (cents / units)
    amount: i64,

    /// True if this instruction was spawned by a partial-settlement split
    is_child: bool,

    /// Tick when the instruction was created
    created_tick: usize,

    /// Current lifecycle status
    status: InstructionStatus,

    /// Which leg of the pair this is
    role: InstructionRole,

    /// Linked transaction, once matched
    transaction_id: Option<String>,
}

impl Instruction {
    /// Create a root instruction in state `Exists`
    ///
    /// # Panics
    /// Panics if `amount` is not positive.
    pub fn new(
        id: String,
        role: InstructionRole,
        draft: InstructionDraft,
        created_tick: usize,
    ) -> Self {
        assert!(draft.amount > 0, "amount must be positive");

        Self {
            id,
            mother_id: ROOT_MOTHER_ID.to_string(),
            linkcode: draft.linkcode,
            institution_id: draft.institution_id,
            securities_account_id: draft.securities_account_id,
            cash_account_id: draft.cash_account_id,
            security_type: draft.security_type,
            amount: draft.amount,
            is_child: false,
            created_tick,
            status: InstructionStatus::Exists,
            role,
            transaction_id: None,
        }
    }

    /// Create a child instruction spawned by a partial-settlement split
    ///
    /// Children inherit the parent's institution, accounts, security type
    /// and role, reference the parent through `mother_id`, and are born
    /// directly in state `Validated` so they can match on the current tick.
    ///
    /// A zero amount is allowed here: the carry-forward child of a split
    /// that consumed the full parent amount carries zero and can never
    /// settle, only time out.
    pub fn new_child(
        parent: &Instruction,
        id: String,
        linkcode: String,
        amount: i64,
        created_tick: usize,
    ) -> Self {
        assert!(amount >= 0, "child amount must be non-negative");

        Self {
            id,
            mother_id: parent.id.clone(),
            linkcode,
            institution_id: parent.institution_id.clone(),
            securities_account_id: parent.securities_account_id.clone(),
            cash_account_id: parent.cash_account_id.clone(),
            security_type: parent.security_type.clone(),
            amount,
            is_child: true,
            created_tick,
            status: InstructionStatus::Validated,
            role: parent.role,
            transaction_id: None,
        }
    }

    /// Get instruction ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parent instruction ID, or [`ROOT_MOTHER_ID`] for roots
    pub fn mother_id(&self) -> &str {
        &self.mother_id
    }

    /// True for instructions not created by a split
    pub fn is_root(&self) -> bool {
        self.mother_id == ROOT_MOTHER_ID
    }

    /// Correlation key shared with the counterpart leg
    pub fn linkcode(&self) -> &str {
        &self.linkcode
    }

    /// Owning institution
    pub fn institution_id(&self) -> &str {
        &self.institution_id
    }

    /// Securities account backing this leg
    pub fn securities_account_id(&self) -> &str {
        &self.securities_account_id
    }

    /// Cash account backing this leg
    pub fn cash_account_id(&self) -> &str {
        &self.cash_account_id
    }

    /// Symbol of the security being transferred
    pub fn security_type(&self) -> &str {
        &self.security_type
    }

    /// Amount to transfer
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// True if spawned by a partial-settlement split
    pub fn is_child(&self) -> bool {
        self.is_child
    }

    /// Tick when the instruction was created
    pub fn created_tick(&self) -> usize {
        self.created_tick
    }

    /// Current lifecycle status
    pub fn status(&self) -> InstructionStatus {
        self.status
    }

    /// Which leg of the pair this is
    pub fn role(&self) -> InstructionRole {
        self.role
    }

    /// Linked transaction ID, once matched
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Overwrite the lifecycle status (transition legality is the engine's
    /// and the settlement protocol's responsibility)
    pub fn set_status(&mut self, status: InstructionStatus) {
        self.status = status;
    }

    /// Link this instruction to the transaction created by a match
    pub fn link_transaction(&mut self, transaction_id: String) {
        self.transaction_id = Some(transaction_id);
    }

    /// Move `Exists -> Pending` once the creation tick has elapsed
    ///
    /// Returns true if the transition happened; any other state (or a
    /// not-yet-elapsed creation tick) is a no-op.
    pub fn insert(&mut self, now: usize) -> bool {
        if self.status == InstructionStatus::Exists && self.created_tick <= now {
            self.status = InstructionStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Move `Pending -> Validated`
    ///
    /// Returns true if the transition happened; a no-op from any other state.
    pub fn validate(&mut self) -> bool {
        if self.status == InstructionStatus::Pending {
            self.status = InstructionStatus::Validated;
            true
        } else {
            false
        }
    }
}
