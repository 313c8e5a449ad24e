//! DvP Settlement Simulator - Core Engine
//!
//! Discrete-tick simulator of a delivery-versus-payment securities
//! settlement network with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Settlement clock and day windows
//! - **models**: Domain types (Account, Institution, Instruction, Transaction)
//! - **matching**: Linkcode-based pairing of Delivery and Receipt legs
//! - **settlement**: Atomic DvP swap and recursive partial settlement
//! - **engine**: Configuration, tick loop and efficiency reporting
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. Per-tick iteration order is deterministic (insertion-ordered active lists)
//! 3. Settlement is atomic: both legs move or neither does
//! 4. Value is conserved: no settlement creates or destroys cash or securities

// Module declarations
pub mod core;
pub mod engine;
pub mod matching;
pub mod models;
pub mod settlement;

// Re-exports for convenience
pub use crate::core::time::{SettlementClock, SettlementPhase};
pub use engine::{
    ConfigError, EfficiencyReport, EngineConfig, EngineError, SettlementEngine, TickResult,
};
pub use matching::{find_counterpart, match_instruction};
pub use models::{
    account::{Account, AssetType},
    event::{DomainEventHandler, EventLog, EventRecord, EventSink},
    institution::Institution,
    instruction::{Instruction, InstructionDraft, InstructionRole, InstructionStatus},
    state::LedgerState,
    transaction::{Transaction, TransactionStatus},
};
pub use settlement::{cancel_timeout, create_children, settle_transaction, SettlementOutcome};
