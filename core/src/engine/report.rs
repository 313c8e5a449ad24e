//! Settlement efficiency reporting
//!
//! End-of-run metrics computed over the full instruction arenas (retired
//! entries included). A "pair" is one submitted root Delivery/Receipt pair;
//! partial settlement fragments a pair into a tree of children, and the
//! value actually moved is recovered by walking that tree.

use crate::models::instruction::{InstructionRole, InstructionStatus};
use crate::models::state::LedgerState;
use serde::Serialize;
use std::collections::HashMap;

/// Settlement efficiency metrics for a completed run
#[derive(Debug, Clone, Serialize)]
pub struct EfficiencyReport {
    /// Root instruction pairs submitted
    pub total_pairs: usize,

    /// Pairs whose full intended value settled, whether at the root or
    /// across a chain of partial-settlement children
    pub fully_settled_pairs: usize,

    /// Total value the submitted pairs intended to move (cents)
    pub intended_value: i64,

    /// Value actually moved, partial settlements included (cents)
    pub settled_value: i64,

    /// Percentage of pairs settled in full at the root
    pub instruction_efficiency_pct: f64,

    /// Percentage of intended value actually moved
    pub value_efficiency_pct: f64,
}

impl EfficiencyReport {
    /// Compute the report from the current ledger state
    pub fn compute(state: &LedgerState) -> Self {
        // One representative root per pair: the Delivery leg
        let delivery_roots: Vec<&str> = state
            .instructions()
            .values()
            .filter(|instruction| {
                instruction.is_root() && instruction.role() == InstructionRole::Delivery
            })
            .map(|instruction| instruction.id())
            .collect();

        let receipt_status_by_linkcode: HashMap<&str, InstructionStatus> = state
            .instructions()
            .values()
            .filter(|instruction| {
                instruction.is_root() && instruction.role() == InstructionRole::Receipt
            })
            .map(|instruction| (instruction.linkcode(), instruction.status()))
            .collect();

        let mut total_pairs = 0;
        let mut fully_settled_pairs = 0;
        let mut intended_value = 0i64;
        let mut settled_value = 0i64;

        for root_id in delivery_roots {
            let root = state.get_instruction(root_id).unwrap();
            let Some(receipt_status) = receipt_status_by_linkcode.get(root.linkcode()) else {
                // Unpaired delivery root; counts as intent that moved nothing
                total_pairs += 1;
                intended_value += root.amount();
                continue;
            };

            total_pairs += 1;
            intended_value += root.amount();

            if root.status() == InstructionStatus::Settled
                && *receipt_status == InstructionStatus::Settled
            {
                fully_settled_pairs += 1;
                settled_value += root.amount();
            } else {
                // Partial settlements leave their moved value on Settled
                // descendants; cap at the intent to keep the ratio honest
                let recovered = settled_descendant_value(state, root_id).min(root.amount());
                settled_value += recovered;
                if recovered == root.amount() {
                    fully_settled_pairs += 1;
                }
            }
        }

        let instruction_efficiency_pct = if total_pairs > 0 {
            fully_settled_pairs as f64 / total_pairs as f64 * 100.0
        } else {
            0.0
        };
        let value_efficiency_pct = if intended_value > 0 {
            settled_value as f64 / intended_value as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_pairs,
            fully_settled_pairs,
            intended_value,
            settled_value,
            instruction_efficiency_pct,
            value_efficiency_pct,
        }
    }
}

/// Sum of amounts on Settled instructions in the subtree below `root_id`
///
/// A Settled node's children (it has none) and a CancelledPartial node's
/// Settled children both contribute; the recursion follows the children
/// index, so depth equals the number of splits the pair went through.
fn settled_descendant_value(state: &LedgerState, root_id: &str) -> i64 {
    let mut total = 0;
    for child_id in state.children_of(root_id) {
        let Some(child) = state.get_instruction(child_id) else {
            continue;
        };
        if child.status() == InstructionStatus::Settled {
            total += child.amount();
        } else {
            total += settled_descendant_value(state, child_id);
        }
    }
    total
}
