//! Ledger state
//!
//! Engine-owned arenas for every live object in the settlement system.
//! All cross-references between institutions, accounts, instructions and
//! transactions are IDs resolved through these arenas, never live pointers,
//! so cancellation and retirement cannot dangle.
//!
//! # Critical Invariants
//!
//! 1. **Arena uniqueness**: every ID appears at most once per arena
//! 2. **Active-list validity**: every ID in an active list exists in its arena
//! 3. **Insertion order**: active lists preserve insertion order; per-tick
//!    iteration over them is therefore deterministic
//! 4. **Retirement is not deletion**: terminal instructions/transactions
//!    leave the active lists but stay in the arenas for reporting
//! 5. **Linkcode pairing**: at most one Delivery and one Receipt instruction
//!    share a linkcode among non-terminal instructions

use crate::models::account::{Account, AssetType};
use crate::models::institution::Institution;
use crate::models::instruction::Instruction;
use crate::models::transaction::Transaction;
use std::collections::{HashMap, HashSet};

/// Complete state of the settlement ledger
#[derive(Default)]
pub struct LedgerState {
    /// All institutions, indexed by ID
    institutions: HashMap<String, Institution>,

    /// All accounts, indexed by ID
    accounts: HashMap<String, Account>,

    /// All instructions ever created, indexed by ID
    instructions: HashMap<String, Instruction>,

    /// All transactions ever created, indexed by ID
    transactions: HashMap<String, Transaction>,

    /// Non-terminal instruction IDs in insertion order
    active_instructions: Vec<String>,

    /// Non-terminal transaction IDs in insertion order
    active_transactions: Vec<String>,

    /// Mother ID -> child instruction IDs, maintained on insertion
    ///
    /// A weak back-reference used only for recursive settled-value lookups;
    /// children never hold an owning pointer to their parent.
    children: HashMap<String, Vec<String>>,

    /// Every linkcode ever registered (roots and split children), used to
    /// reject pair submissions that would reuse a code
    linkcodes: HashSet<String>,
}

impl LedgerState {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Institutions and accounts
    // ------------------------------------------------------------------

    /// Register an institution
    ///
    /// # Panics
    /// Panics on a duplicate institution ID.
    pub fn add_institution(&mut self, institution: Institution) {
        let id = institution.id().to_string();
        assert!(
            !self.institutions.contains_key(&id),
            "institution ID {} already exists",
            id
        );
        self.institutions.insert(id, institution);
    }

    /// Register an account under an existing institution
    ///
    /// # Panics
    /// Panics on a duplicate account ID or an unknown institution; the
    /// engine validates both before calling.
    pub fn add_account(&mut self, institution_id: &str, account: Account) {
        let id = account.id().to_string();
        assert!(
            !self.accounts.contains_key(&id),
            "account ID {} already exists",
            id
        );
        let institution = self
            .institutions
            .get_mut(institution_id)
            .unwrap_or_else(|| panic!("unknown institution {}", institution_id));
        institution.add_account(id.clone());
        self.accounts.insert(id, account);
    }

    /// Get an institution by ID
    pub fn get_institution(&self, id: &str) -> Option<&Institution> {
        self.institutions.get(id)
    }

    /// Get a mutable institution by ID
    pub fn get_institution_mut(&mut self, id: &str) -> Option<&mut Institution> {
        self.institutions.get_mut(id)
    }

    /// Get an account by ID
    pub fn get_account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// Get a mutable account by ID
    ///
    /// Exclusive `&mut` access through the single engine-owned arena is what
    /// serializes check-then-act sequences on shared accounts within a tick.
    pub fn get_account_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.get_mut(id)
    }

    /// All institutions
    pub fn institutions(&self) -> &HashMap<String, Institution> {
        &self.institutions
    }

    /// All accounts
    pub fn accounts(&self) -> &HashMap<String, Account> {
        &self.accounts
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    /// Register an instruction: arena entry, active list, children index and
    /// linkcode registry
    ///
    /// # Panics
    /// Panics on a duplicate instruction ID.
    pub fn add_instruction(&mut self, instruction: Instruction) {
        let id = instruction.id().to_string();
        assert!(
            !self.instructions.contains_key(&id),
            "instruction ID {} already exists",
            id
        );
        if instruction.is_child() {
            self.children
                .entry(instruction.mother_id().to_string())
                .or_default()
                .push(id.clone());
        }
        self.linkcodes.insert(instruction.linkcode().to_string());
        self.active_instructions.push(id.clone());
        self.instructions.insert(id, instruction);
    }

    /// Get an instruction by ID
    pub fn get_instruction(&self, id: &str) -> Option<&Instruction> {
        self.instructions.get(id)
    }

    /// Get a mutable instruction by ID
    pub fn get_instruction_mut(&mut self, id: &str) -> Option<&mut Instruction> {
        self.instructions.get_mut(id)
    }

    /// Non-terminal instruction IDs in insertion order
    pub fn active_instructions(&self) -> &[String] {
        &self.active_instructions
    }

    /// Remove an instruction from the active list (it stays in the arena)
    pub fn retire_instruction(&mut self, id: &str) {
        self.active_instructions.retain(|active| active != id);
    }

    /// Child instruction IDs of a parent, in creation order
    pub fn children_of(&self, mother_id: &str) -> &[String] {
        self.children
            .get(mother_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All instructions ever created (including retired ones)
    pub fn instructions(&self) -> &HashMap<String, Instruction> {
        &self.instructions
    }

    /// True if a linkcode has ever been registered
    pub fn linkcode_in_use(&self, linkcode: &str) -> bool {
        self.linkcodes.contains(linkcode)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Register a transaction
    ///
    /// # Panics
    /// Panics on a duplicate transaction ID.
    pub fn add_transaction(&mut self, transaction: Transaction) {
        let id = transaction.id().to_string();
        assert!(
            !self.transactions.contains_key(&id),
            "transaction ID {} already exists",
            id
        );
        self.active_transactions.push(id.clone());
        self.transactions.insert(id, transaction);
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// Get a mutable transaction by ID
    pub fn get_transaction_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.get_mut(id)
    }

    /// Non-terminal transaction IDs in insertion order
    pub fn active_transactions(&self) -> &[String] {
        &self.active_transactions
    }

    /// Remove a transaction from the active list (it stays in the arena)
    pub fn retire_transaction(&mut self, id: &str) {
        self.active_transactions.retain(|active| active != id);
    }

    /// All transactions ever created (including retired ones)
    pub fn transactions(&self) -> &HashMap<String, Transaction> {
        &self.transactions
    }

    // ------------------------------------------------------------------
    // Invariant helpers
    // ------------------------------------------------------------------

    /// Total cash position across all cash accounts: balances minus drawn
    /// credit. Unchanged by any settlement (conservation invariant).
    pub fn total_cash_position(&self) -> i64 {
        self.accounts
            .values()
            .filter(|account| account.asset().is_cash())
            .map(|account| account.balance() - account.used_credit())
            .sum()
    }

    /// Total holdings of one security symbol across all accounts.
    /// Unchanged by any settlement (conservation invariant).
    pub fn total_security_holdings(&self, symbol: &str) -> i64 {
        let asset = AssetType::security(symbol);
        self.accounts
            .values()
            .filter(|account| account.asset() == &asset)
            .map(|account| account.balance())
            .sum()
    }
}
