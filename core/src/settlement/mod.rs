//! Settlement protocol
//!
//! Drives a matched Delivery/Receipt pair to a terminal state: the atomic
//! DvP swap when funding allows it, or a recursive partial-settlement split
//! when it does not.
//!
//! # Settlement flow
//!
//! ```text
//! settle_transaction(tx)
//!   both legs and tx Matched?        no -> logged no-op
//!   either amount zero?              yes -> logged no-op
//!   amounts equal and both funded?   yes -> atomic swap -> Settled
//!   both institutions allow partial? no  -> stays Matched (retry later)
//!   split both legs into (settleable, remainder) children
//!     children below threshold?      yes -> stays Matched (retry later)
//!   match child 1 pair, settle it (recursion), parents -> CancelledPartial
//!   child 2 pair stays Validated for a future tick
//! ```
//!
//! Partial settlement is structural recursion on the instruction tree: each
//! split produces exactly one instantly-resolved slice and one carry-forward
//! slice, so a large instruction drains as a chain over many ticks rather
//! than a combinatorial fan-out.
//!
//! # Critical Invariants
//!
//! - **Atomicity**: the swap runs only after both legs pass their funding
//!   check; a mid-swap shortfall is a consistency violation and forces
//!   CancelledError, never a silent partial transfer
//! - **Conservation**: `child1.amount + child2.amount == parent.amount`
//!   exactly, on both legs
//! - **At-most-once**: a terminal transaction is never re-settled; retiring
//!   from the active set happens together with the terminal transition

use crate::engine::config::EngineConfig;
use crate::matching;
use crate::models::account::AssetType;
use crate::models::event::EventSink;
use crate::models::instruction::{Instruction, InstructionRole, InstructionStatus};
use crate::models::state::LedgerState;
use crate::models::transaction::TransactionStatus;

/// Outcome of a settlement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Atomic swap executed; all three parties Settled and retired
    Settled,

    /// Split performed: the settleable slice settled as a child
    /// transaction, the parents are CancelledPartial, the carry-forward
    /// children remain Validated
    PartiallySettled {
        /// Transaction created for the settled child pair
        child_transaction_id: String,
    },

    /// Nothing happened; the transaction stays Matched and is retried on a
    /// later tick or at the batch window
    Deferred,

    /// A leg carries a zero amount; logged no-op, no swap attempted
    ZeroAmount,

    /// Transaction or a leg was not in Matched state; logged no-op
    WrongState,

    /// Post-swap consistency violation; all three parties CancelledError
    Failed,
}

/// Attempt to settle a matched transaction, recursing through partial
/// settlement as needed
///
/// Never panics on bad input: every precondition violation is a logged
/// no-op and every funding problem is reported through the outcome.
pub fn settle_transaction(
    state: &mut LedgerState,
    sink: &mut EventSink,
    config: &EngineConfig,
    transaction_id: &str,
    tick: usize,
) -> SettlementOutcome {
    sink.emit(
        tick,
        transaction_id,
        format!("transaction {} attempting to settle", transaction_id),
        true,
    );

    let Some(transaction) = state.get_transaction(transaction_id) else {
        sink.emit(
            tick,
            transaction_id,
            format!("transaction {} unknown, settle is a no-op", transaction_id),
            true,
        );
        return SettlementOutcome::WrongState;
    };

    if transaction.status() != TransactionStatus::Matched {
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} in state {}, settle is a no-op",
                transaction_id,
                transaction.status()
            ),
            true,
        );
        return SettlementOutcome::WrongState;
    }

    let delivery_id = transaction.delivery_id().to_string();
    let receipt_id = transaction.receipt_id().to_string();

    let legs_matched = [&delivery_id, &receipt_id].iter().all(|id| {
        state
            .get_instruction(id)
            .map(|leg| leg.status() == InstructionStatus::Matched)
            .unwrap_or(false)
    });
    if !legs_matched {
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} has a leg outside Matched, settle is a no-op",
                transaction_id
            ),
            true,
        );
        return SettlementOutcome::WrongState;
    }

    let delivery = state.get_instruction(&delivery_id).unwrap();
    let receipt = state.get_instruction(&receipt_id).unwrap();

    let delivery_amount = delivery.amount();
    let receipt_amount = receipt.amount();
    let security_asset = AssetType::security(delivery.security_type());
    let deliverer_securities_account = delivery.securities_account_id().to_string();
    let deliverer_cash_account = delivery.cash_account_id().to_string();
    let receiver_securities_account = receipt.securities_account_id().to_string();
    let receiver_cash_account = receipt.cash_account_id().to_string();
    let delivery_institution = delivery.institution_id().to_string();
    let receipt_institution = receipt.institution_id().to_string();

    if delivery_amount == 0 || receipt_amount == 0 {
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} failed: no cash or securities to move",
                transaction_id
            ),
            true,
        );
        return SettlementOutcome::ZeroAmount;
    }

    let securities_funded = state
        .get_account(&deliverer_securities_account)
        .map(|account| account.check_balance(delivery_amount, &security_asset))
        .unwrap_or(false);
    let cash_funded = state
        .get_account(&receiver_cash_account)
        .map(|account| account.check_balance(receipt_amount, &AssetType::Cash))
        .unwrap_or(false);

    if delivery_amount == receipt_amount && securities_funded && cash_funded {
        // Atomic swap: securities one way, cash the other
        let delivered_securities = state
            .get_account_mut(&deliverer_securities_account)
            .map(|account| account.debit(delivery_amount, &security_asset))
            .unwrap_or(0);
        let received_securities = state
            .get_account_mut(&receiver_securities_account)
            .map(|account| account.credit(receipt_amount, &security_asset))
            .unwrap_or(0);
        let delivered_cash = state
            .get_account_mut(&receiver_cash_account)
            .map(|account| account.debit(receipt_amount, &AssetType::Cash))
            .unwrap_or(0);
        let received_cash = state
            .get_account_mut(&deliverer_cash_account)
            .map(|account| account.credit(delivery_amount, &AssetType::Cash))
            .unwrap_or(0);

        let amounts_consistent = delivered_securities == delivery_amount
            && received_securities == delivery_amount
            && delivered_cash == delivery_amount
            && received_cash == delivery_amount;

        if !amounts_consistent {
            // A shortfall mid-swap is a funding race; never accept it
            finish(state, &delivery_id, &receipt_id, transaction_id, TransactionStatus::CancelledError);
            sink.emit(
                tick,
                transaction_id,
                format!(
                    "transaction {} cancelled: post-swap amounts inconsistent \
                     (securities {}/{}, cash {}/{}, expected {})",
                    transaction_id,
                    delivered_securities,
                    received_securities,
                    delivered_cash,
                    received_cash,
                    delivery_amount
                ),
                true,
            );
            return SettlementOutcome::Failed;
        }

        finish(state, &delivery_id, &receipt_id, transaction_id, TransactionStatus::Settled);
        sink.emit(
            tick,
            transaction_id,
            format!("transaction {} settled fully", transaction_id),
            true,
        );
        return SettlementOutcome::Settled;
    }

    // Partial settlement: both institutions must have opted in
    let partial_allowed = [&delivery_institution, &receipt_institution]
        .iter()
        .all(|id| {
            state
                .get_institution(id)
                .map(|institution| institution.allow_partial())
                .unwrap_or(false)
        });
    if !partial_allowed {
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} deferred: partial settlement not allowed",
                transaction_id
            ),
            true,
        );
        return SettlementOutcome::Deferred;
    }

    let Some((delivery_child_1, _delivery_child_2)) =
        create_children(state, sink, config, &delivery_id, tick)
    else {
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} partial settlement aborted: insufficient funds",
                transaction_id
            ),
            true,
        );
        return SettlementOutcome::Deferred;
    };

    let Some((_receipt_child_1, _receipt_child_2)) =
        create_children(state, sink, config, &receipt_id, tick)
    else {
        // Both sides split over the same three quantities, so this branch is
        // unreachable for a well-formed pair; retire the orphaned delivery
        // children rather than leave them matchable.
        for child_id in state.children_of(&delivery_id).to_vec() {
            if let Some(child) = state.get_instruction_mut(&child_id) {
                child.set_status(InstructionStatus::CancelledError);
            }
            state.retire_instruction(&child_id);
        }
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} partial settlement aborted: receipt split failed",
                transaction_id
            ),
            true,
        );
        return SettlementOutcome::Deferred;
    };

    // The settleable slices pair up under the derived linkcode; settle them
    // now. The carry-forward slices stay Validated for a future tick.
    let Some(child_transaction_id) =
        matching::match_instruction(state, sink, &delivery_child_1, tick)
    else {
        sink.emit(
            tick,
            transaction_id,
            format!(
                "transaction {} partial settlement aborted: child pair failed to match",
                transaction_id
            ),
            true,
        );
        return SettlementOutcome::Deferred;
    };

    settle_transaction(state, sink, config, &child_transaction_id, tick);

    finish(state, &delivery_id, &receipt_id, transaction_id, TransactionStatus::CancelledPartial);
    sink.emit(
        tick,
        transaction_id,
        format!(
            "transaction {} partially settled; remainder carried forward",
            transaction_id
        ),
        true,
    );

    SettlementOutcome::PartiallySettled {
        child_transaction_id,
    }
}

/// Split an instruction into a settleable child and a carry-forward child
///
/// The settleable amount is the minimum of the instruction amount, the
/// deliverer's raw securities balance and the receiver's raw cash balance
/// (a mismatched account type contributes zero). Children are created only
/// if the settleable amount exceeds the configured minimum-settlement
/// threshold; otherwise an insufficiency event is logged and `None` is
/// returned, leaving the parent untouched.
///
/// Both children are born Validated with fresh linkcodes derived from the
/// parent's (`<link>_1`, `<link>_2`) and are registered with the ledger.
pub fn create_children(
    state: &mut LedgerState,
    sink: &mut EventSink,
    config: &EngineConfig,
    instruction_id: &str,
    tick: usize,
) -> Option<(String, String)> {
    let instruction = state.get_instruction(instruction_id)?;
    let transaction = state.get_transaction(instruction.transaction_id()?)?;
    let counterpart = state.get_instruction(transaction.counterpart_of(instruction_id)?)?;

    // Role decides which side of the pair supplies securities and which cash
    let (securities_account_id, cash_account_id) = match instruction.role() {
        InstructionRole::Delivery => (
            instruction.securities_account_id(),
            counterpart.cash_account_id(),
        ),
        InstructionRole::Receipt => (
            counterpart.securities_account_id(),
            instruction.cash_account_id(),
        ),
    };

    let security_asset = AssetType::security(instruction.security_type());
    let available_securities = state
        .get_account(securities_account_id)
        .filter(|account| account.asset() == &security_asset)
        .map(|account| account.balance())
        .unwrap_or(0);
    let available_cash = state
        .get_account(cash_account_id)
        .filter(|account| account.asset().is_cash())
        .map(|account| account.balance())
        .unwrap_or(0);

    let settleable = instruction
        .amount()
        .min(available_securities)
        .min(available_cash);

    if settleable <= config.min_settlement_amount {
        sink.emit(
            tick,
            instruction_id,
            format!(
                "instruction {}: insufficient funds for partial settlement \
                 (settleable {} below threshold {})",
                instruction_id, settleable, config.min_settlement_amount
            ),
            true,
        );
        return None;
    }

    let parent = instruction.clone();
    let child_1 = Instruction::new_child(
        &parent,
        format!("{}_1", parent.id()),
        format!("{}_1", parent.linkcode()),
        settleable,
        tick,
    );
    let child_2 = Instruction::new_child(
        &parent,
        format!("{}_2", parent.id()),
        format!("{}_2", parent.linkcode()),
        parent.amount() - settleable,
        tick,
    );
    let child_1_id = child_1.id().to_string();
    let child_2_id = child_2.id().to_string();

    state.add_instruction(child_1);
    state.add_instruction(child_2);

    sink.emit(
        tick,
        instruction_id,
        format!(
            "instruction {} split into {} ({}) and {} ({})",
            instruction_id,
            child_1_id,
            settleable,
            child_2_id,
            parent.amount() - settleable
        ),
        true,
    );

    Some((child_1_id, child_2_id))
}

/// Cancel an instruction that outlived the configured timeout
///
/// From Exists, Pending or Validated the instruction alone moves to
/// CancelledTimeout and is retired. From Matched the cancellation cascades:
/// the counterpart and the linked transaction go down with it. Terminal
/// instructions are left untouched.
pub fn cancel_timeout(
    state: &mut LedgerState,
    sink: &mut EventSink,
    instruction_id: &str,
    tick: usize,
) {
    let Some(instruction) = state.get_instruction(instruction_id) else {
        return;
    };
    if instruction.status().is_terminal() {
        return;
    }

    if instruction.status() == InstructionStatus::Matched {
        let transaction_id = instruction.transaction_id().map(str::to_string);
        if let Some(transaction_id) = transaction_id {
            let counterpart_id = state
                .get_transaction(&transaction_id)
                .and_then(|tx| tx.counterpart_of(instruction_id))
                .map(str::to_string);

            if let Some(transaction) = state.get_transaction_mut(&transaction_id) {
                transaction.set_status(TransactionStatus::CancelledTimeout);
            }
            state.retire_transaction(&transaction_id);
            sink.emit(
                tick,
                &transaction_id,
                format!("transaction {} cancelled due to timeout", transaction_id),
                true,
            );

            if let Some(counterpart_id) = counterpart_id {
                if let Some(counterpart) = state.get_instruction_mut(&counterpart_id) {
                    counterpart.set_status(InstructionStatus::CancelledTimeout);
                }
                state.retire_instruction(&counterpart_id);
                sink.emit(
                    tick,
                    &counterpart_id,
                    format!("instruction {} cancelled due to timeout", counterpart_id),
                    true,
                );
            }
        }
    }

    if let Some(instruction) = state.get_instruction_mut(instruction_id) {
        instruction.set_status(InstructionStatus::CancelledTimeout);
    }
    state.retire_instruction(instruction_id);
    sink.emit(
        tick,
        instruction_id,
        format!("instruction {} cancelled due to timeout", instruction_id),
        true,
    );
}

/// Move both legs and the transaction to a terminal state and retire them
fn finish(
    state: &mut LedgerState,
    delivery_id: &str,
    receipt_id: &str,
    transaction_id: &str,
    status: TransactionStatus,
) {
    let leg_status = match status {
        TransactionStatus::Settled => InstructionStatus::Settled,
        TransactionStatus::CancelledPartial => InstructionStatus::CancelledPartial,
        TransactionStatus::CancelledTimeout => InstructionStatus::CancelledTimeout,
        TransactionStatus::CancelledError => InstructionStatus::CancelledError,
        TransactionStatus::Matched => unreachable!("finish is only called with terminal states"),
    };

    for leg_id in [delivery_id, receipt_id] {
        if let Some(leg) = state.get_instruction_mut(leg_id) {
            leg.set_status(leg_status);
        }
        state.retire_instruction(leg_id);
    }
    if let Some(transaction) = state.get_transaction_mut(transaction_id) {
        transaction.set_status(status);
    }
    state.retire_transaction(transaction_id);
}
