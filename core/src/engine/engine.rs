//! Settlement engine
//!
//! Owns the full world state and the clock, and drives every lifecycle
//! transition. External callers register institutions and accounts, submit
//! instruction pairs and call [`SettlementEngine::tick`]; everything else
//! (insertion, validation, matching, settlement, timeout) happens inside
//! the tick.
//!
//! # Tick order
//!
//! 1. Advance the clock
//! 2. Timeout sweep over all active instructions
//! 3. Phase work:
//!    - Trading: each active instruction advances at most one lifecycle
//!      stage, then every Matched transaction attempts to settle
//!    - Batch: one settlement pass over every Matched transaction, at most
//!      once per day
//!    - PostTrading: nothing
//!
//! Instructions created mid-tick (partial-settlement children) join the
//! active set immediately but are not revisited until the next tick, except
//! for the settleable child the split settles on the spot.

use crate::core::time::{SettlementClock, SettlementPhase};
use crate::engine::config::{ConfigError, EngineConfig};
use crate::matching;
use crate::models::account::{Account, AssetType};
use crate::models::event::{DomainEventHandler, EventLog, EventSink};
use crate::models::institution::Institution;
use crate::models::instruction::{Instruction, InstructionDraft, InstructionRole, InstructionStatus};
use crate::models::state::LedgerState;
use crate::settlement::{self, SettlementOutcome};
use thiserror::Error;

/// Errors surfaced to external callers of the engine
///
/// Everything here is rejected at the API boundary before any state
/// changes; once a pair is accepted, problems inside the tick are logged
/// events and terminal states, never errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("institution {0} already registered")]
    DuplicateInstitution(String),

    #[error("account {0} already registered")]
    DuplicateAccount(String),

    #[error("unknown institution {0}")]
    UnknownInstitution(String),

    #[error("unknown account {0}")]
    UnknownAccount(String),

    #[error("account {account} is not owned by institution {institution}")]
    ForeignAccount {
        account: String,
        institution: String,
    },

    #[error("account {account} does not hold {expected}")]
    WrongAssetType { account: String, expected: String },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("leg amounts differ: delivery {delivery}, receipt {receipt}")]
    AmountMismatch { delivery: i64, receipt: i64 },

    #[error("leg security types differ: delivery {delivery}, receipt {receipt}")]
    SecurityTypeMismatch { delivery: String, receipt: String },

    #[error("leg linkcodes differ: delivery {delivery}, receipt {receipt}")]
    LinkcodeMismatch { delivery: String, receipt: String },

    #[error("linkcode {0} already in use")]
    LinkcodeInUse(String),
}

/// Per-tick activity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    /// Tick this result describes
    pub tick: usize,

    /// Phase the clock was in
    pub phase: SettlementPhase,

    /// Instructions moved Exists -> Pending
    pub inserted: usize,

    /// Instructions moved Pending -> Validated
    pub validated: usize,

    /// Matches performed (instruction pairs, not legs)
    pub matched: usize,

    /// Transactions settled in full (children included)
    pub settled: usize,

    /// Transactions resolved by a partial-settlement split
    pub partially_settled: usize,

    /// Instructions cancelled by the timeout sweep
    pub timed_out: usize,
}

/// The DvP settlement engine
pub struct SettlementEngine {
    state: LedgerState,
    clock: SettlementClock,
    sink: EventSink,
    config: EngineConfig,
    next_instruction_seq: usize,
}

impl SettlementEngine {
    /// Create an engine with a validated configuration
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let clock = SettlementClock::new(
            config.ticks_per_day,
            config.trading_open_tick,
            config.trading_close_tick,
            config.batch_start_tick,
        );
        Ok(Self {
            state: LedgerState::new(),
            clock,
            sink: EventSink::new(),
            config,
            next_instruction_seq: 1,
        })
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register an institution
    pub fn add_institution(&mut self, id: &str, allow_partial: bool) -> Result<(), EngineError> {
        if self.state.get_institution(id).is_some() {
            return Err(EngineError::DuplicateInstitution(id.to_string()));
        }
        self.state
            .add_institution(Institution::new(id.to_string(), allow_partial));
        Ok(())
    }

    /// Register an account under an institution
    pub fn add_account(
        &mut self,
        institution_id: &str,
        account: Account,
    ) -> Result<(), EngineError> {
        if self.state.get_institution(institution_id).is_none() {
            return Err(EngineError::UnknownInstitution(institution_id.to_string()));
        }
        if self.state.get_account(account.id()).is_some() {
            return Err(EngineError::DuplicateAccount(account.id().to_string()));
        }
        self.state.add_account(institution_id, account);
        Ok(())
    }

    /// Flip an institution's partial-settlement opt-in
    pub fn set_partial_allowed(
        &mut self,
        institution_id: &str,
        allow: bool,
    ) -> Result<(), EngineError> {
        let institution = self
            .state
            .get_institution_mut(institution_id)
            .ok_or_else(|| EngineError::UnknownInstitution(institution_id.to_string()))?;
        institution.set_allow_partial(allow);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Submit a Delivery/Receipt instruction pair
    ///
    /// Both legs are validated together and accepted atomically; any
    /// problem rejects the whole pair with no state change. Returns the
    /// assigned (delivery, receipt) instruction IDs.
    pub fn submit_instruction_pair(
        &mut self,
        delivery: InstructionDraft,
        receipt: InstructionDraft,
    ) -> Result<(String, String), EngineError> {
        self.check_draft(&delivery)?;
        self.check_draft(&receipt)?;

        if delivery.amount != receipt.amount {
            return Err(EngineError::AmountMismatch {
                delivery: delivery.amount,
                receipt: receipt.amount,
            });
        }
        if delivery.security_type != receipt.security_type {
            return Err(EngineError::SecurityTypeMismatch {
                delivery: delivery.security_type,
                receipt: receipt.security_type,
            });
        }
        if delivery.linkcode != receipt.linkcode {
            return Err(EngineError::LinkcodeMismatch {
                delivery: delivery.linkcode,
                receipt: receipt.linkcode,
            });
        }
        if self.state.linkcode_in_use(&delivery.linkcode) {
            return Err(EngineError::LinkcodeInUse(delivery.linkcode));
        }

        let now = self.clock.current_tick();
        let delivery_id = self.next_instruction_id();
        let receipt_id = self.next_instruction_id();

        let delivery_leg =
            Instruction::new(delivery_id.clone(), InstructionRole::Delivery, delivery, now);
        let receipt_leg =
            Instruction::new(receipt_id.clone(), InstructionRole::Receipt, receipt, now);

        for leg in [&delivery_leg, &receipt_leg] {
            self.sink.emit(
                now,
                leg.id(),
                format!(
                    "{} instruction {} created (linkcode {}, {} x {})",
                    leg.role(),
                    leg.id(),
                    leg.linkcode(),
                    leg.security_type(),
                    leg.amount()
                ),
                true,
            );
        }
        self.state.add_instruction(delivery_leg);
        self.state.add_instruction(receipt_leg);

        Ok((delivery_id, receipt_id))
    }

    fn check_draft(&self, draft: &InstructionDraft) -> Result<(), EngineError> {
        if draft.amount <= 0 {
            return Err(EngineError::NonPositiveAmount(draft.amount));
        }
        let institution = self
            .state
            .get_institution(&draft.institution_id)
            .ok_or_else(|| EngineError::UnknownInstitution(draft.institution_id.clone()))?;

        for account_id in [&draft.securities_account_id, &draft.cash_account_id] {
            if self.state.get_account(account_id).is_none() {
                return Err(EngineError::UnknownAccount(account_id.clone()));
            }
            if !institution.owns_account(account_id) {
                return Err(EngineError::ForeignAccount {
                    account: account_id.clone(),
                    institution: draft.institution_id.clone(),
                });
            }
        }

        let securities_account = self
            .state
            .get_account(&draft.securities_account_id)
            .unwrap();
        let expected = AssetType::security(&draft.security_type);
        if securities_account.asset() != &expected {
            return Err(EngineError::WrongAssetType {
                account: draft.securities_account_id.clone(),
                expected: expected.to_string(),
            });
        }

        let cash_account = self.state.get_account(&draft.cash_account_id).unwrap();
        if !cash_account.asset().is_cash() {
            return Err(EngineError::WrongAssetType {
                account: draft.cash_account_id.clone(),
                expected: AssetType::Cash.to_string(),
            });
        }

        Ok(())
    }

    fn next_instruction_id(&mut self) -> String {
        let id = format!("INS-{:06}", self.next_instruction_seq);
        self.next_instruction_seq += 1;
        id
    }

    // ------------------------------------------------------------------
    // Tick loop
    // ------------------------------------------------------------------

    /// Advance the simulation by one tick
    pub fn tick(&mut self) -> TickResult {
        self.clock.advance();
        let now = self.clock.current_tick();
        let phase = self.clock.phase();

        let mut result = TickResult {
            tick: now,
            phase,
            inserted: 0,
            validated: 0,
            matched: 0,
            settled: 0,
            partially_settled: 0,
            timed_out: 0,
        };

        result.timed_out = self.timeout_sweep(now);

        match phase {
            SettlementPhase::Trading => {
                self.lifecycle_pass(now, &mut result);
                self.settlement_pass(now, &mut result);
            }
            SettlementPhase::Batch => {
                if self.clock.batch_pending() {
                    self.settlement_pass(now, &mut result);
                    self.clock.mark_batch_run();
                    self.sink.emit(
                        now,
                        "engine",
                        format!("batch settlement pass completed for day {}", self.clock.current_day()),
                        false,
                    );
                }
            }
            SettlementPhase::PostTrading => {}
        }

        result
    }

    /// Cancel every active instruction that outlived the timeout
    fn timeout_sweep(&mut self, now: usize) -> usize {
        let expired: Vec<String> = self
            .state
            .active_instructions()
            .iter()
            .filter(|id| {
                self.state
                    .get_instruction(id)
                    .map(|instruction| now - instruction.created_tick() > self.config.timeout_ticks)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let mut timed_out = 0;
        for id in expired {
            // A Matched cascade may already have cancelled this one
            let still_live = self
                .state
                .get_instruction(&id)
                .map(|instruction| !instruction.status().is_terminal())
                .unwrap_or(false);
            if still_live {
                settlement::cancel_timeout(&mut self.state, &mut self.sink, &id, now);
                timed_out += 1;
            }
        }
        timed_out
    }

    /// Advance every active instruction at most one lifecycle stage
    fn lifecycle_pass(&mut self, now: usize, result: &mut TickResult) {
        let snapshot: Vec<String> = self.state.active_instructions().to_vec();
        for id in snapshot {
            let Some(instruction) = self.state.get_instruction(&id) else {
                continue;
            };
            match instruction.status() {
                InstructionStatus::Exists => {
                    let instruction = self.state.get_instruction_mut(&id).unwrap();
                    if instruction.insert(now) {
                        result.inserted += 1;
                        self.sink
                            .emit(now, &id, format!("instruction {} inserted", id), true);
                    }
                }
                InstructionStatus::Pending => {
                    let instruction = self.state.get_instruction_mut(&id).unwrap();
                    if instruction.validate() {
                        result.validated += 1;
                        self.sink
                            .emit(now, &id, format!("instruction {} validated", id), true);
                    }
                }
                InstructionStatus::Validated => {
                    // The successful match flips the counterpart to Matched
                    // too, so the pair is counted exactly once.
                    if matching::match_instruction(&mut self.state, &mut self.sink, &id, now)
                        .is_some()
                    {
                        result.matched += 1;
                    }
                }
                _ => {}
            }
        }
    }

    /// Attempt to settle every Matched transaction
    fn settlement_pass(&mut self, now: usize, result: &mut TickResult) {
        let snapshot: Vec<String> = self.state.active_transactions().to_vec();
        for transaction_id in snapshot {
            match settlement::settle_transaction(
                &mut self.state,
                &mut self.sink,
                &self.config,
                &transaction_id,
                now,
            ) {
                SettlementOutcome::Settled => result.settled += 1,
                SettlementOutcome::PartiallySettled { .. } => {
                    // The split settled its child transaction in full
                    result.partially_settled += 1;
                    result.settled += 1;
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// Install the domain-event subscriber
    pub fn set_event_handler(&mut self, handler: Box<dyn DomainEventHandler>) {
        self.sink.set_handler(handler);
    }

    /// The accumulated event log
    pub fn events(&self) -> &EventLog {
        self.sink.log()
    }

    /// Settlement efficiency over everything submitted so far
    pub fn efficiency_report(&self) -> crate::engine::report::EfficiencyReport {
        crate::engine::report::EfficiencyReport::compute(&self.state)
    }

    /// The full ledger state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The settlement clock
    pub fn clock(&self) -> &SettlementClock {
        &self.clock
    }

    /// Total ticks elapsed since simulation start
    pub fn current_tick(&self) -> usize {
        self.clock.current_tick()
    }
}
