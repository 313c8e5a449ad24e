//! Account model
//!
//! A ledger account held by an institution for exactly one asset type:
//! either cash or a single security symbol.
//!
//! - Cash accounts carry a credit line: available funds are
//!   `balance + (credit_limit - used_credit)`.
//! - Security accounts never carry credit (`credit_limit == used_credit == 0`).
//!
//! Balances are mutated only through [`Account::credit`] and
//! [`Account::debit`]. Both return the amount actually applied; a return
//! value smaller than the request is a funding shortfall the caller must
//! branch on, and a return of zero on a mismatched asset type is a caller
//! error (no state change, never a panic).
//!
//! CRITICAL: All money values are i64 (cents)

use serde::{Deserialize, Serialize};

/// Asset type held by an account or moved by an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Cash in the system's single settlement currency
    Cash,

    /// A security, identified by its symbol (e.g. "Bond-A")
    Security(String),
}

impl AssetType {
    /// Convenience constructor for a security asset
    pub fn security(symbol: &str) -> Self {
        AssetType::Security(symbol.to_string())
    }

    /// True for the cash variant
    pub fn is_cash(&self) -> bool {
        matches!(self, AssetType::Cash)
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Cash => write!(f, "Cash"),
            AssetType::Security(symbol) => write!(f, "{}", symbol),
        }
    }
}

/// A single-asset ledger account with credit-line semantics for cash
///
/// # Example
/// ```
/// use dvp_settlement_core::models::account::{Account, AssetType};
///
/// let mut account = Account::new("DE12345".to_string(), AssetType::Cash, 100_000, 50_000);
/// assert!(account.check_balance(120_000, &AssetType::Cash)); // credit line counts
///
/// let deducted = account.debit(120_000, &AssetType::Cash);
/// assert_eq!(deducted, 120_000);
/// assert_eq!(account.balance(), 0);
/// assert_eq!(account.used_credit(), 20_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier
    id: String,

    /// Asset type this account holds
    asset: AssetType,

    /// Current balance (i64 cents or security units, never negative)
    balance: i64,

    /// Credit line; only meaningful for cash accounts
    credit_limit: i64,

    /// Portion of the credit line currently drawn (0 ..= credit_limit)
    used_credit: i64,
}

impl Account {
    /// Create a new account
    ///
    /// # Panics
    /// Panics if `balance` or `credit_limit` is negative, or if a credit
    /// limit is given for a security account.
    pub fn new(id: String, asset: AssetType, balance: i64, credit_limit: i64) -> Self {
        assert!(balance >= 0, "balance must be non-negative");
        assert!(credit_limit >= 0, "credit_limit must be non-negative");
        assert!(
            asset.is_cash() || credit_limit == 0,
            "security accounts cannot carry a credit line"
        );

        Self {
            id,
            asset,
            balance,
            credit_limit,
            used_credit: 0,
        }
    }

    /// Get account ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the asset type this account holds
    pub fn asset(&self) -> &AssetType {
        &self.asset
    }

    /// Get current balance
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Get the credit line
    pub fn credit_limit(&self) -> i64 {
        self.credit_limit
    }

    /// Get the portion of the credit line currently drawn
    pub fn used_credit(&self) -> i64 {
        self.used_credit
    }

    /// Funds available for debiting: balance plus remaining credit headroom
    pub fn available(&self) -> i64 {
        self.balance + (self.credit_limit - self.used_credit)
    }

    /// Check whether `amount` of `asset` could currently be deducted
    ///
    /// Cash accounts count remaining credit headroom; security accounts use
    /// the raw balance. An asset-type mismatch never succeeds.
    pub fn check_balance(&self, amount: i64, asset: &AssetType) -> bool {
        if &self.asset != asset {
            return false;
        }
        match self.asset {
            AssetType::Cash => self.available() >= amount,
            AssetType::Security(_) => self.balance >= amount,
        }
    }

    /// Add `amount` of `asset` to the account
    ///
    /// For cash, outstanding used credit is repaid before anything reaches
    /// the balance. Returns the amount credited; a mismatched asset type has
    /// zero effect and returns 0 (the caller logs it).
    pub fn credit(&mut self, amount: i64, asset: &AssetType) -> i64 {
        if &self.asset != asset || amount < 0 {
            return 0;
        }
        match self.asset {
            AssetType::Cash => {
                let repaid = amount.min(self.used_credit);
                self.used_credit -= repaid;
                self.balance += amount - repaid;
                amount
            }
            AssetType::Security(_) => {
                self.balance += amount;
                amount
            }
        }
    }

    /// Deduct up to `amount` of `asset` from the account
    ///
    /// Returns the amount actually deducted. For cash, the balance is drawn
    /// first and the credit line second; if available funds do not cover the
    /// request the account is drained completely and the shortfall shows in
    /// the return value. Callers must compare the return value against the
    /// request and treat a shortfall as a funding failure, never assume the
    /// full deduction succeeded. A mismatched asset type has zero effect and
    /// returns 0.
    pub fn debit(&mut self, amount: i64, asset: &AssetType) -> i64 {
        if &self.asset != asset || amount < 0 {
            return 0;
        }
        match self.asset {
            AssetType::Cash => {
                let available = self.available();
                if available <= amount {
                    // Drain: everything the account can raise, and no more
                    self.balance = 0;
                    self.used_credit = self.credit_limit;
                    available
                } else if self.balance >= amount {
                    self.balance -= amount;
                    amount
                } else {
                    let from_credit = amount - self.balance;
                    self.balance = 0;
                    self.used_credit += from_credit;
                    amount
                }
            }
            AssetType::Security(_) => {
                let deducted = amount.min(self.balance);
                self.balance -= deducted;
                deducted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_debit_draws_balance_before_credit() {
        let mut account = Account::new("A".to_string(), AssetType::Cash, 1_000, 500);

        assert_eq!(account.debit(1_200, &AssetType::Cash), 1_200);
        assert_eq!(account.balance(), 0);
        assert_eq!(account.used_credit(), 200);
    }

    #[test]
    fn test_cash_credit_repays_used_credit_first() {
        let mut account = Account::new("A".to_string(), AssetType::Cash, 1_000, 500);
        account.debit(1_200, &AssetType::Cash);

        assert_eq!(account.credit(150, &AssetType::Cash), 150);
        assert_eq!(account.used_credit(), 50);
        assert_eq!(account.balance(), 0);

        assert_eq!(account.credit(100, &AssetType::Cash), 100);
        assert_eq!(account.used_credit(), 0);
        assert_eq!(account.balance(), 50);
    }

    #[test]
    fn test_cash_debit_shortfall_drains_account() {
        let mut account = Account::new("A".to_string(), AssetType::Cash, 300, 100);

        // Requested more than available: only 400 comes out
        assert_eq!(account.debit(1_000, &AssetType::Cash), 400);
        assert_eq!(account.balance(), 0);
        assert_eq!(account.used_credit(), 100);
        assert_eq!(account.available(), 0);
    }

    #[test]
    fn test_security_debit_capped_at_balance() {
        let bond = AssetType::security("Bond-A");
        let mut account = Account::new("S".to_string(), bond.clone(), 700, 0);

        assert_eq!(account.debit(1_000, &bond), 700);
        assert_eq!(account.balance(), 0);
    }

    #[test]
    fn test_mismatched_asset_has_no_effect() {
        let bond = AssetType::security("Bond-A");
        let mut account = Account::new("S".to_string(), bond, 700, 0);

        assert!(!account.check_balance(1, &AssetType::Cash));
        assert_eq!(account.credit(100, &AssetType::Cash), 0);
        assert_eq!(account.debit(100, &AssetType::security("Bond-B")), 0);
        assert_eq!(account.balance(), 700);
    }

    #[test]
    fn test_check_balance_counts_credit_headroom_only_once() {
        let mut account = Account::new("A".to_string(), AssetType::Cash, 0, 500);
        account.debit(300, &AssetType::Cash);

        assert!(account.check_balance(200, &AssetType::Cash));
        assert!(!account.check_balance(201, &AssetType::Cash));
    }

    #[test]
    #[should_panic(expected = "security accounts cannot carry a credit line")]
    fn test_security_account_with_credit_panics() {
        Account::new("S".to_string(), AssetType::security("Bond-A"), 0, 100);
    }
}
