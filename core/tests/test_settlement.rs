//! Settlement Protocol Tests
//!
//! Atomic DvP swaps, conservation of cash and securities, no-op behavior on
//! terminal transactions, and the timeout cascade.

use dvp_settlement_core::{
    cancel_timeout, match_instruction, settle_transaction, Account, AssetType, EngineConfig,
    EventSink, Institution, Instruction, InstructionDraft, InstructionRole, InstructionStatus,
    LedgerState, SettlementOutcome, TransactionStatus,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct Fixture {
    state: LedgerState,
    sink: EventSink,
    config: EngineConfig,
}

/// Two institutions; INST-1 delivers Bond-A, INST-2 pays cash
fn fixture(deliverer_bonds: i64, receiver_cash: i64, receiver_credit: i64) -> Fixture {
    let mut state = LedgerState::new();

    state.add_institution(Institution::new("INST-1".to_string(), true));
    state.add_account(
        "INST-1",
        Account::new("SEC-1".to_string(), AssetType::security("Bond-A"), deliverer_bonds, 0),
    );
    state.add_account(
        "INST-1",
        Account::new("CASH-1".to_string(), AssetType::Cash, 0, 0),
    );

    state.add_institution(Institution::new("INST-2".to_string(), true));
    state.add_account(
        "INST-2",
        Account::new("SEC-2".to_string(), AssetType::security("Bond-A"), 0, 0),
    );
    state.add_account(
        "INST-2",
        Account::new(
            "CASH-2".to_string(),
            AssetType::Cash,
            receiver_cash,
            receiver_credit,
        ),
    );

    Fixture {
        state,
        sink: EventSink::new(),
        config: EngineConfig::default(),
    }
}

/// Submit, validate and match a pair for `amount`; returns the transaction ID
fn matched_pair(fixture: &mut Fixture, amount: i64, linkcode: &str, seq: usize) -> String {
    let delivery_id = format!("INS-{:06}", seq);
    let receipt_id = format!("INS-{:06}", seq + 1);

    let mut delivery = Instruction::new(
        delivery_id.clone(),
        InstructionRole::Delivery,
        InstructionDraft {
            institution_id: "INST-1".to_string(),
            securities_account_id: "SEC-1".to_string(),
            cash_account_id: "CASH-1".to_string(),
            security_type: "Bond-A".to_string(),
            amount,
            linkcode: linkcode.to_string(),
        },
        0,
    );
    let mut receipt = Instruction::new(
        receipt_id,
        InstructionRole::Receipt,
        InstructionDraft {
            institution_id: "INST-2".to_string(),
            securities_account_id: "SEC-2".to_string(),
            cash_account_id: "CASH-2".to_string(),
            security_type: "Bond-A".to_string(),
            amount,
            linkcode: linkcode.to_string(),
        },
        0,
    );
    for leg in [&mut delivery, &mut receipt] {
        leg.insert(0);
        leg.validate();
    }
    fixture.state.add_instruction(delivery);
    fixture.state.add_instruction(receipt);

    match_instruction(&mut fixture.state, &mut fixture.sink, &delivery_id, 0)
        .expect("pair should match")
}

fn balance(state: &LedgerState, account: &str) -> i64 {
    state.get_account(account).unwrap().balance()
}

// ============================================================================
// Full Settlement
// ============================================================================

#[test]
fn test_full_settlement_swaps_both_legs() {
    let mut f = fixture(100_000, 100_000, 0);
    let transaction_id = matched_pair(&mut f, 60_000, "L1", 1);

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);
    assert_eq!(outcome, SettlementOutcome::Settled);

    assert_eq!(balance(&f.state, "SEC-1"), 40_000, "deliverer gave bonds");
    assert_eq!(balance(&f.state, "SEC-2"), 60_000, "receiver got bonds");
    assert_eq!(balance(&f.state, "CASH-2"), 40_000, "receiver paid cash");
    assert_eq!(balance(&f.state, "CASH-1"), 60_000, "deliverer got cash");

    let transaction = f.state.get_transaction(&transaction_id).unwrap();
    assert_eq!(transaction.status(), TransactionStatus::Settled);
    for leg_id in ["INS-000001", "INS-000002"] {
        assert_eq!(
            f.state.get_instruction(leg_id).unwrap().status(),
            InstructionStatus::Settled
        );
    }
    assert!(f.state.active_transactions().is_empty());
    assert!(f.state.active_instructions().is_empty());
}

#[test]
fn test_settlement_draws_on_cash_credit_line() {
    // Receiver holds 30k cash plus a 40k line: 60k is coverable
    let mut f = fixture(100_000, 30_000, 40_000);
    let transaction_id = matched_pair(&mut f, 60_000, "L1", 1);

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);
    assert_eq!(outcome, SettlementOutcome::Settled);

    let payer = f.state.get_account("CASH-2").unwrap();
    assert_eq!(payer.balance(), 0);
    assert_eq!(payer.used_credit(), 30_000);
    assert_eq!(balance(&f.state, "CASH-1"), 60_000);
}

#[test]
fn test_settlement_conserves_cash_and_securities() {
    let mut f = fixture(100_000, 30_000, 40_000);
    let cash_before = f.state.total_cash_position();
    let bonds_before = f.state.total_security_holdings("Bond-A");

    let transaction_id = matched_pair(&mut f, 60_000, "L1", 1);
    settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    assert_eq!(f.state.total_cash_position(), cash_before);
    assert_eq!(f.state.total_security_holdings("Bond-A"), bonds_before);
}

// ============================================================================
// No-op Paths
// ============================================================================

#[test]
fn test_settle_is_idempotent_on_terminal_transaction() {
    let mut f = fixture(100_000, 100_000, 0);
    let transaction_id = matched_pair(&mut f, 60_000, "L1", 1);

    settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);
    let cash_after = balance(&f.state, "CASH-1");

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 2);
    assert_eq!(outcome, SettlementOutcome::WrongState);
    assert_eq!(balance(&f.state, "CASH-1"), cash_after, "no double spend");
}

#[test]
fn test_settle_unknown_transaction_is_a_logged_noop() {
    let mut f = fixture(1, 1, 0);
    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, "no-such-tx", 1);
    assert_eq!(outcome, SettlementOutcome::WrongState);
    assert!(f.sink.log().len() > 0);
}

#[test]
fn test_zero_amount_transaction_stays_matched() {
    let mut f = fixture(0, 0, 0);

    // Zero-amount legs arise as carry-forward children of an exact-fit split
    let parent = Instruction::new(
        "INS-000001".to_string(),
        InstructionRole::Delivery,
        InstructionDraft {
            institution_id: "INST-1".to_string(),
            securities_account_id: "SEC-1".to_string(),
            cash_account_id: "CASH-1".to_string(),
            security_type: "Bond-A".to_string(),
            amount: 1_000,
            linkcode: "L1".to_string(),
        },
        0,
    );
    let counterparent = Instruction::new(
        "INS-000002".to_string(),
        InstructionRole::Receipt,
        InstructionDraft {
            institution_id: "INST-2".to_string(),
            securities_account_id: "SEC-2".to_string(),
            cash_account_id: "CASH-2".to_string(),
            security_type: "Bond-A".to_string(),
            amount: 1_000,
            linkcode: "L1".to_string(),
        },
        0,
    );
    let child_d =
        Instruction::new_child(&parent, "INS-000001_2".to_string(), "L1_2".to_string(), 0, 1);
    let child_r = Instruction::new_child(
        &counterparent,
        "INS-000002_2".to_string(),
        "L1_2".to_string(),
        0,
        1,
    );
    f.state.add_instruction(parent);
    f.state.add_instruction(counterparent);
    f.state.add_instruction(child_d);
    f.state.add_instruction(child_r);

    let transaction_id = match_instruction(&mut f.state, &mut f.sink, "INS-000001_2", 1)
        .expect("zero-amount children still match");
    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    assert_eq!(outcome, SettlementOutcome::ZeroAmount);
    assert_eq!(
        f.state.get_transaction(&transaction_id).unwrap().status(),
        TransactionStatus::Matched,
        "zero-amount transaction stays Matched until it times out"
    );
}

// ============================================================================
// Timeout Cascade
// ============================================================================

#[test]
fn test_timeout_on_matched_leg_cancels_pair_and_transaction() {
    let mut f = fixture(0, 0, 0);
    // Unfunded pair: matches, never settles
    let transaction_id = matched_pair(&mut f, 60_000, "L1", 1);
    // Opt out of partial so settlement defers instead of splitting
    f.state
        .get_institution_mut("INST-1")
        .unwrap()
        .set_allow_partial(false);

    cancel_timeout(&mut f.state, &mut f.sink, "INS-000001", 300);

    for leg_id in ["INS-000001", "INS-000002"] {
        assert_eq!(
            f.state.get_instruction(leg_id).unwrap().status(),
            InstructionStatus::CancelledTimeout
        );
    }
    assert_eq!(
        f.state.get_transaction(&transaction_id).unwrap().status(),
        TransactionStatus::CancelledTimeout
    );
    assert!(f.state.active_instructions().is_empty());
    assert!(f.state.active_transactions().is_empty());
}

#[test]
fn test_timeout_on_unmatched_leg_cancels_only_that_leg() {
    let mut f = fixture(0, 0, 0);
    let mut lone = Instruction::new(
        "INS-000001".to_string(),
        InstructionRole::Delivery,
        InstructionDraft {
            institution_id: "INST-1".to_string(),
            securities_account_id: "SEC-1".to_string(),
            cash_account_id: "CASH-1".to_string(),
            security_type: "Bond-A".to_string(),
            amount: 1_000,
            linkcode: "L1".to_string(),
        },
        0,
    );
    lone.insert(0);
    lone.validate();
    f.state.add_instruction(lone);

    cancel_timeout(&mut f.state, &mut f.sink, "INS-000001", 300);
    assert_eq!(
        f.state.get_instruction("INS-000001").unwrap().status(),
        InstructionStatus::CancelledTimeout
    );
}

#[test]
fn test_timeout_is_a_noop_on_terminal_instruction() {
    let mut f = fixture(100_000, 100_000, 0);
    let transaction_id = matched_pair(&mut f, 60_000, "L1", 1);
    settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    cancel_timeout(&mut f.state, &mut f.sink, "INS-000001", 300);
    assert_eq!(
        f.state.get_instruction("INS-000001").unwrap().status(),
        InstructionStatus::Settled,
        "settled instructions never regress to cancelled"
    );
}
