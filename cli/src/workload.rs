//! Synthetic workload generation
//!
//! Seeds a population of institutions with cash and bond accounts and, each
//! trading tick, submits randomly sized Delivery/Receipt pairs between
//! them. Everything is driven by the seeded [`SimRng`], so a run is fully
//! reproducible.

use crate::rng::SimRng;
use dvp_settlement_core::{Account, AssetType, EngineError, InstructionDraft, SettlementEngine};

/// Bond symbols institutions can hold and trade
pub const BOND_SYMBOLS: [&str; 4] = ["Bond-A", "Bond-B", "Bond-C", "Bond-D"];

/// Workload parameters
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Number of institutions to seed
    pub institutions: usize,

    /// Per-institution, per-tick probability of submitting a pair
    pub pair_probability: f64,

    /// Per-institution, per-tick probability of flipping the
    /// partial-settlement opt-in
    pub partial_flip_probability: f64,

    /// Smallest pair amount (cents)
    pub min_amount: i64,

    /// Largest pair amount, exclusive (cents)
    pub max_amount: i64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            institutions: 10,
            pair_probability: 0.5,
            partial_flip_probability: 0.01,
            min_amount: 100_00,
            max_amount: 10_000_00,
        }
    }
}

/// One seeded institution and its accounts
struct Participant {
    institution_id: String,
    cash_account_id: String,
    /// (bond symbol, securities account ID)
    securities: Vec<(String, String)>,
}

impl Participant {
    fn account_for(&self, symbol: &str) -> Option<&str> {
        self.securities
            .iter()
            .find(|(held, _)| held == symbol)
            .map(|(_, account)| account.as_str())
    }
}

/// Deterministic generator of institutions and instruction pairs
pub struct WorkloadGenerator {
    rng: SimRng,
    config: WorkloadConfig,
    participants: Vec<Participant>,
    next_linkcode: u64,
    /// Pairs successfully submitted so far
    pub submitted: usize,
}

impl WorkloadGenerator {
    pub fn new(seed: u64, config: WorkloadConfig) -> Self {
        Self {
            rng: SimRng::new(seed),
            config,
            participants: Vec::new(),
            next_linkcode: 1,
            submitted: 0,
        }
    }

    /// Register the configured number of institutions with the engine
    ///
    /// Each gets an IBAN-styled ID, one cash account with a random balance
    /// and credit line, and accounts in one to four bond symbols.
    pub fn seed_institutions(&mut self, engine: &mut SettlementEngine) -> Result<(), EngineError> {
        for index in 0..self.config.institutions {
            // IBAN-styled, with the index folded in so IDs never collide
            let institution_id = format!(
                "DE{:02}3704{:04}{:06}",
                self.rng.range(10, 100),
                index,
                self.rng.range(0, 1_000_000)
            );
            engine.add_institution(&institution_id, true)?;

            let cash_account_id = format!("{}-CASH", institution_id);
            let balance = self.rng.range(1_000_00, 50_000_00);
            let credit_limit = self.rng.range(0, 20_000_00);
            engine.add_account(
                &institution_id,
                Account::new(cash_account_id.clone(), AssetType::Cash, balance, credit_limit),
            )?;

            let held = self.rng.range(1, BOND_SYMBOLS.len() as i64 + 1) as usize;
            let mut securities = Vec::with_capacity(held);
            for symbol in &BOND_SYMBOLS[..held] {
                let account_id = format!("{}-{}", institution_id, symbol);
                let holdings = self.rng.range(0, 100_000_00);
                engine.add_account(
                    &institution_id,
                    Account::new(
                        account_id.clone(),
                        AssetType::security(symbol),
                        holdings,
                        0,
                    ),
                )?;
                securities.push((symbol.to_string(), account_id));
            }

            self.participants.push(Participant {
                institution_id,
                cash_account_id,
                securities,
            });
        }
        Ok(())
    }

    /// One tick's worth of external activity: random pair submissions and
    /// occasional partial-settlement opt-in flips
    pub fn step(&mut self, engine: &mut SettlementEngine) -> Result<(), EngineError> {
        for deliverer_index in 0..self.participants.len() {
            if self.rng.chance(self.config.partial_flip_probability) {
                let institution_id = self.participants[deliverer_index].institution_id.clone();
                let current = engine
                    .state()
                    .get_institution(&institution_id)
                    .map(|institution| institution.allow_partial())
                    .unwrap_or(true);
                engine.set_partial_allowed(&institution_id, !current)?;
            }

            if self.participants.len() < 2 || !self.rng.chance(self.config.pair_probability) {
                continue;
            }

            let receiver_index = self.pick_counterparty(deliverer_index);
            let Some((delivery, receipt)) = self.build_pair(deliverer_index, receiver_index)
            else {
                continue;
            };
            engine.submit_instruction_pair(delivery, receipt)?;
            self.submitted += 1;
        }
        Ok(())
    }

    fn pick_counterparty(&mut self, deliverer_index: usize) -> usize {
        let other = self.rng.range(0, self.participants.len() as i64 - 1) as usize;
        if other >= deliverer_index {
            other + 1
        } else {
            other
        }
    }

    /// Build a pair over a bond symbol both parties hold an account for
    fn build_pair(
        &mut self,
        deliverer_index: usize,
        receiver_index: usize,
    ) -> Option<(InstructionDraft, InstructionDraft)> {
        let deliverer = &self.participants[deliverer_index];
        let receiver = &self.participants[receiver_index];

        let common: Vec<&str> = deliverer
            .securities
            .iter()
            .filter(|(symbol, _)| receiver.account_for(symbol).is_some())
            .map(|(symbol, _)| symbol.as_str())
            .collect();
        if common.is_empty() {
            return None;
        }

        let symbol = self.rng.pick(&common).to_string();
        let amount = self.rng.range(self.config.min_amount, self.config.max_amount);
        let linkcode = format!("LNK-{:08}", self.next_linkcode);
        self.next_linkcode += 1;

        let delivery = InstructionDraft {
            institution_id: deliverer.institution_id.clone(),
            securities_account_id: deliverer.account_for(&symbol)?.to_string(),
            cash_account_id: deliverer.cash_account_id.clone(),
            security_type: symbol.clone(),
            amount,
            linkcode: linkcode.clone(),
        };
        let receipt = InstructionDraft {
            institution_id: receiver.institution_id.clone(),
            securities_account_id: receiver.account_for(&symbol)?.to_string(),
            cash_account_id: receiver.cash_account_id.clone(),
            security_type: symbol.clone(),
            amount,
            linkcode,
        };

        Some((delivery, receipt))
    }
}
