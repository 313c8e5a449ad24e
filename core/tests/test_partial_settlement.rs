//! Partial Settlement Tests
//!
//! Recursive splitting of an underfunded pair into a settleable slice and a
//! carry-forward slice, the opt-in gate, the minimum-amount threshold, and
//! value conservation across the whole chain.

use dvp_settlement_core::{
    match_instruction, settle_transaction, Account, AssetType, EngineConfig, EventSink,
    Institution, Instruction, InstructionDraft, InstructionRole, InstructionStatus, LedgerState,
    SettlementOutcome, TransactionStatus,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct Fixture {
    state: LedgerState,
    sink: EventSink,
    config: EngineConfig,
}

/// INST-1 delivers Bond-A, INST-2 pays cash; both opted in to partial
fn fixture(deliverer_bonds: i64, receiver_cash: i64) -> Fixture {
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
        Account::new("CASH-2".to_string(), AssetType::Cash, receiver_cash, 0),
    );

    Fixture {
        state,
        sink: EventSink::new(),
        config: EngineConfig::default(),
    }
}

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

fn status(state: &LedgerState, id: &str) -> InstructionStatus {
    state.get_instruction(id).unwrap().status()
}

// ============================================================================
// Single Split
// ============================================================================

#[test]
fn test_split_settles_constrained_slice_and_carries_remainder() {
    // Pair wants 100k; deliverer holds 40k bonds, receiver 30k cash.
    // Settleable slice = min(100k, 40k, 30k) = 30k.
    let mut f = fixture(40_000, 30_000);
    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);
    let SettlementOutcome::PartiallySettled {
        child_transaction_id,
    } = outcome
    else {
        panic!("expected partial settlement, got {:?}", outcome);
    };

    // 30k moved
    assert_eq!(balance(&f.state, "SEC-1"), 10_000);
    assert_eq!(balance(&f.state, "SEC-2"), 30_000);
    assert_eq!(balance(&f.state, "CASH-2"), 0);
    assert_eq!(balance(&f.state, "CASH-1"), 30_000);

    // Parents and their transaction superseded
    assert_eq!(status(&f.state, "INS-000001"), InstructionStatus::CancelledPartial);
    assert_eq!(status(&f.state, "INS-000002"), InstructionStatus::CancelledPartial);
    assert_eq!(
        f.state.get_transaction(&transaction_id).unwrap().status(),
        TransactionStatus::CancelledPartial
    );

    // Settleable children settled through their own transaction
    assert_eq!(status(&f.state, "INS-000001_1"), InstructionStatus::Settled);
    assert_eq!(status(&f.state, "INS-000002_1"), InstructionStatus::Settled);
    assert_eq!(
        f.state
            .get_transaction(&child_transaction_id)
            .unwrap()
            .status(),
        TransactionStatus::Settled
    );
    assert_eq!(
        f.state.get_instruction("INS-000001_1").unwrap().amount(),
        30_000
    );

    // Carry-forward children wait, Validated and unmatched
    for child_id in ["INS-000001_2", "INS-000002_2"] {
        let child = f.state.get_instruction(child_id).unwrap();
        assert_eq!(child.status(), InstructionStatus::Validated);
        assert_eq!(child.amount(), 70_000);
        assert_eq!(child.transaction_id(), None);
    }

    // Conservation across the split: child amounts rebuild the parent
    assert_eq!(
        f.state.get_instruction("INS-000001_1").unwrap().amount()
            + f.state.get_instruction("INS-000001_2").unwrap().amount(),
        100_000
    );
}

#[test]
fn test_children_index_links_parent_to_both_slices() {
    let mut f = fixture(40_000, 30_000);
    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);
    settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    assert_eq!(
        f.state.children_of("INS-000001"),
        &["INS-000001_1", "INS-000001_2"]
    );
    assert_eq!(
        f.state.children_of("INS-000002"),
        &["INS-000002_1", "INS-000002_2"]
    );
}

// ============================================================================
// Multi-tick Drain
// ============================================================================

#[test]
fn test_carry_forward_settles_once_funding_arrives() {
    let mut f = fixture(200_000, 30_000);
    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);
    settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    // Receiver gets paid elsewhere; the 70k remainder is now coverable
    f.state
        .get_account_mut("CASH-2")
        .unwrap()
        .credit(70_000, &AssetType::Cash);

    let child_tx = match_instruction(&mut f.state, &mut f.sink, "INS-000001_2", 2)
        .expect("carry-forward pair should match");
    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &child_tx, 2);

    assert_eq!(outcome, SettlementOutcome::Settled);
    assert_eq!(balance(&f.state, "SEC-2"), 100_000, "full intent delivered");
    assert_eq!(balance(&f.state, "CASH-1"), 100_000, "full intent paid");
    assert!(f.state.active_instructions().is_empty());
}

#[test]
fn test_chain_of_splits_conserves_value() {
    let mut f = fixture(200_000, 30_000);
    let cash_before = f.state.total_cash_position();
    let bonds_before = f.state.total_security_holdings("Bond-A");

    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);
    settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    // Second round: 25k more cash arrives, the 70k remainder splits again
    f.state
        .get_account_mut("CASH-2")
        .unwrap()
        .credit(25_000, &AssetType::Cash);
    let child_tx = match_instruction(&mut f.state, &mut f.sink, "INS-000001_2", 2).unwrap();
    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &child_tx, 2);
    assert!(matches!(outcome, SettlementOutcome::PartiallySettled { .. }));

    assert_eq!(status(&f.state, "INS-000001_2_1"), InstructionStatus::Settled);
    assert_eq!(
        f.state.get_instruction("INS-000001_2_2").unwrap().amount(),
        45_000
    );

    // Only the external 25k credit changes the total; settlements never do
    assert_eq!(f.state.total_cash_position(), cash_before + 25_000);
    assert_eq!(f.state.total_security_holdings("Bond-A"), bonds_before);
    assert_eq!(balance(&f.state, "SEC-2"), 55_000, "30k + 25k delivered");
}

// ============================================================================
// Gates
// ============================================================================

#[test]
fn test_split_requires_both_institutions_opted_in() {
    let mut f = fixture(40_000, 30_000);
    f.state
        .get_institution_mut("INST-2")
        .unwrap()
        .set_allow_partial(false);
    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    assert_eq!(outcome, SettlementOutcome::Deferred);
    assert_eq!(status(&f.state, "INS-000001"), InstructionStatus::Matched);
    assert!(f.state.children_of("INS-000001").is_empty(), "no split");
    assert_eq!(balance(&f.state, "CASH-2"), 30_000, "no money moved");
}

#[test]
fn test_split_below_threshold_is_deferred() {
    // Settleable slice would be 5k; default threshold is 10k
    let mut f = fixture(40_000, 5_000);
    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    assert_eq!(outcome, SettlementOutcome::Deferred);
    assert_eq!(status(&f.state, "INS-000001"), InstructionStatus::Matched);
    assert!(f.state.children_of("INS-000001").is_empty());
    assert_eq!(
        f.state.get_transaction(&transaction_id).unwrap().status(),
        TransactionStatus::Matched,
        "deferred transaction is retried later"
    );
}

#[test]
fn test_slice_exactly_at_threshold_is_deferred() {
    // Threshold comparison is strict: settleable == threshold does not split
    let mut f = fixture(40_000, 10_000);
    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);

    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);
    assert_eq!(outcome, SettlementOutcome::Deferred);
    assert!(f.state.children_of("INS-000001").is_empty());
}

#[test]
fn test_split_uses_raw_balances_not_credit() {
    // Receiver has 5k cash and a 100k line: the line could fund the whole
    // 100k, but the split sizes itself on raw balances only
    let mut f = Fixture {
        state: LedgerState::new(),
        sink: EventSink::new(),
        config: EngineConfig::default(),
    };
    f.state.add_institution(Institution::new("INST-1".to_string(), true));
    f.state.add_account(
        "INST-1",
        Account::new("SEC-1".to_string(), AssetType::security("Bond-A"), 30_000, 0),
    );
    f.state.add_account(
        "INST-1",
        Account::new("CASH-1".to_string(), AssetType::Cash, 0, 0),
    );
    f.state.add_institution(Institution::new("INST-2".to_string(), true));
    f.state.add_account(
        "INST-2",
        Account::new("SEC-2".to_string(), AssetType::security("Bond-A"), 0, 0),
    );
    f.state.add_account(
        "INST-2",
        Account::new("CASH-2".to_string(), AssetType::Cash, 5_000, 100_000),
    );

    let transaction_id = matched_pair(&mut f, 100_000, "L1", 1);
    let outcome = settle_transaction(&mut f.state, &mut f.sink, &f.config, &transaction_id, 1);

    // Raw cash is 5k, below the 10k threshold, so no split happens even
    // though the credit line could fund far more
    assert_eq!(outcome, SettlementOutcome::Deferred);
    assert!(f.state.children_of("INS-000001").is_empty());
}
