//! Instruction matching
//!
//! Pairs a Validated Delivery instruction with the Validated Receipt
//! instruction sharing its linkcode, producing the [`Transaction`] that the
//! settlement protocol will drive.
//!
//! The workload generator and the partial-settlement split both mint fresh
//! per-pair linkcodes, so at most one candidate of each role exists per
//! code. Should that invariant ever be violated, the scan still resolves
//! deterministically: the counterpart with the lowest instruction ID wins.

use crate::models::event::EventSink;
use crate::models::instruction::InstructionStatus;
use crate::models::state::LedgerState;
use crate::models::transaction::Transaction;

/// Find the counterpart for a Validated instruction
///
/// Scans the active set for an instruction of the opposite role with the
/// same linkcode in state Validated. Ties break on the lowest instruction
/// ID so results do not depend on scan order.
pub fn find_counterpart(state: &LedgerState, instruction_id: &str) -> Option<String> {
    let instruction = state.get_instruction(instruction_id)?;
    let wanted_role = instruction.role().counterpart();

    state
        .active_instructions()
        .iter()
        .filter_map(|id| state.get_instruction(id))
        .filter(|candidate| {
            candidate.role() == wanted_role
                && candidate.linkcode() == instruction.linkcode()
                && candidate.status() == InstructionStatus::Validated
        })
        .map(|candidate| candidate.id().to_string())
        .min()
}

/// Match an instruction against its counterpart
///
/// Valid only from state Validated; any other state is a logged no-op. On
/// success, creates the transaction, links it to both legs and advances
/// both to Matched. Returns the transaction ID, or `None` when no
/// counterpart is available yet — the caller retries on a later tick.
pub fn match_instruction(
    state: &mut LedgerState,
    sink: &mut EventSink,
    instruction_id: &str,
    tick: usize,
) -> Option<String> {
    let Some(instruction) = state.get_instruction(instruction_id) else {
        return None;
    };

    if instruction.status() != InstructionStatus::Validated {
        sink.emit(
            tick,
            instruction_id,
            format!(
                "instruction {} in state {} cannot match",
                instruction_id,
                instruction.status()
            ),
            true,
        );
        return None;
    }

    let Some(counterpart_id) = find_counterpart(state, instruction_id) else {
        sink.emit(
            tick,
            instruction_id,
            format!("instruction {} found no counterpart to match", instruction_id),
            true,
        );
        return None;
    };

    // Orient the pair: the transaction always names the Delivery leg first
    let instruction = state.get_instruction(instruction_id).unwrap();
    let (delivery_id, receipt_id) = match instruction.role() {
        crate::models::instruction::InstructionRole::Delivery => {
            (instruction_id.to_string(), counterpart_id.clone())
        }
        crate::models::instruction::InstructionRole::Receipt => {
            (counterpart_id.clone(), instruction_id.to_string())
        }
    };

    let transaction = Transaction::new(delivery_id.clone(), receipt_id.clone());
    let transaction_id = transaction.id().to_string();
    state.add_transaction(transaction);

    for leg_id in [&delivery_id, &receipt_id] {
        let leg = state.get_instruction_mut(leg_id).unwrap();
        leg.set_status(InstructionStatus::Matched);
        leg.link_transaction(transaction_id.clone());
    }

    sink.emit(
        tick,
        instruction_id,
        format!(
            "instruction {} matched with {} (transaction {})",
            instruction_id, counterpart_id, transaction_id
        ),
        true,
    );

    Some(transaction_id)
}
