use std::collections::BTreeMap;

use crate::ledger::{Amount, Principal};

/// Key-value backing for account balances.
///
/// Absent keys read as zero. Implementations must iterate in principal order
/// so snapshots and state roots are deterministic.
pub trait BalanceStore {
    fn balance(&self, who: &Principal) -> Amount;

    /// Writing zero drops the entry.
    fn set_balance(&mut self, who: &Principal, amount: Amount);

    fn entries(&self) -> Vec<(Principal, Amount)>;

    fn total(&self) -> Option<Amount> {
        self.entries()
            .iter()
            .try_fold(0u128, |acc, (_, amount)| acc.checked_add(*amount))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStore {
    balances: BTreeMap<Principal, Amount>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl BalanceStore for MemoryStore {
    fn balance(&self, who: &Principal) -> Amount {
        self.balances.get(who).copied().unwrap_or(0)
    }

    fn set_balance(&mut self, who: &Principal, amount: Amount) {
        if amount == 0 {
            self.balances.remove(who);
        } else {
            self.balances.insert(who.clone(), amount);
        }
    }

    fn entries(&self) -> Vec<(Principal, Amount)> {
        self.balances
            .iter()
            .map(|(who, amount)| (who.clone(), *amount))
            .collect()
    }
}
