use std::fmt;

use bevy::prelude::*;
use chrono::{DateTime, Utc};

use crate::config::STARTING_BALANCE_TB;

/// Session mirror of the owner's account. The store document is
/// authoritative; this resource tracks the balance and earnings between
/// flushes.
///
/// `lifetime_earnings` is a monotone accumulator of everything the user's
/// cells have ever produced. It is never spent and never decremented;
/// purchases debit the discrete TB balance instead.
#[derive(Resource, Debug, Clone)]
pub struct OwnerAccount {
    pub tb_balance: i64,
    pub lifetime_earnings: f64,
    pub last_earnings_snapshot: DateTime<Utc>,
}

impl Default for OwnerAccount {
    fn default() -> Self {
        Self {
            tb_balance: STARTING_BALANCE_TB,
            lifetime_earnings: 0.0,
            last_earnings_snapshot: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl OwnerAccount {
    pub fn debit(&mut self, amount: i64) -> Result<(), WalletError> {
        if self.tb_balance < amount {
            return Err(WalletError::InsufficientBalance {
                needed: amount,
                available: self.tb_balance,
            });
        }
        self.tb_balance -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: i64) {
        self.tb_balance += amount;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletError {
    InsufficientBalance { needed: i64, available: i64 },
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::InsufficientBalance { needed, available } => {
                write!(f, "insufficient balance: need {needed} TB, have {available} TB")
            }
        }
    }
}

impl std::error::Error for WalletError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_with_grant() {
        let account = OwnerAccount::default();
        assert_eq!(account.tb_balance, STARTING_BALANCE_TB);
        assert_eq!(account.lifetime_earnings, 0.0);
    }

    #[test]
    fn test_debit_and_credit() {
        let mut account = OwnerAccount::default();
        account.debit(30).unwrap();
        assert_eq!(account.tb_balance, STARTING_BALANCE_TB - 30);
        account.credit(5);
        assert_eq!(account.tb_balance, STARTING_BALANCE_TB - 25);
    }

    #[test]
    fn test_overdraft_rejected() {
        let mut account = OwnerAccount {
            tb_balance: 3,
            ..Default::default()
        };
        let err = account.debit(10).unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientBalance {
                needed: 10,
                available: 3
            }
        );
        // Balance unchanged on failure.
        assert_eq!(account.tb_balance, 3);
    }
}
