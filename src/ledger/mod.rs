use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{BoundaryError, LedgerError, LedgerResult};
use crate::store::{BalanceStore, MemoryStore};

pub type Amount = u128;

pub const TOKEN_NAME: &str = "AnthoCoin";
pub const TOKEN_SYMBOL: &str = "ANTHO";
pub const TOKEN_DECIMALS: u8 = 6;
pub const TOKEN_SCALE: Amount = 1_000_000; // 1 ANTHO = 1e6 minimal units
pub const INITIAL_SUPPLY: Amount = 1_000_000_000 * TOKEN_SCALE;

/// Opaque account identity. Only equality and ordering are meaningful.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Amount,
    pub contract_owner: Principal,
    pub token_uri: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub owner: Principal,
    pub initialized: bool,
    pub total_supply: Amount,
    pub balances: BTreeMap<Principal, Amount>,
    /// Next signed-call nonce per principal; absent means 0.
    #[serde(default)]
    pub nonces: BTreeMap<Principal, u64>,
    pub state_root: String,
}

/// The token ledger: one owner, one supply figure, one balance map.
///
/// Every state-changing call takes the authenticated `caller` explicitly and
/// either applies fully or leaves the state untouched.
#[derive(Clone, Debug)]
pub struct Ledger<S: BalanceStore = MemoryStore> {
    owner: Principal,
    initialized: bool,
    total_supply: Amount,
    store: S,
    nonces: BTreeMap<Principal, u64>,
}

impl Ledger<MemoryStore> {
    pub fn deploy(deployer: Principal) -> Self {
        Self::with_store(deployer, MemoryStore::new())
    }

    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self, BoundaryError> {
        Self::restore_into(snapshot, MemoryStore::new())
    }
}

impl<S: BalanceStore> Ledger<S> {
    /// Deploys onto `store`, discarding any balances it already holds.
    pub fn with_store(deployer: Principal, mut store: S) -> Self {
        for (who, _) in store.entries() {
            store.set_balance(&who, 0);
        }
        debug!(owner = %deployer, "ledger deployed");
        Self {
            owner: deployer,
            initialized: false,
            total_supply: 0,
            store,
            nonces: BTreeMap::new(),
        }
    }

    pub fn restore_into(snapshot: LedgerSnapshot, mut store: S) -> Result<Self, BoundaryError> {
        // the store prunes zero balances, which would change the root on reload
        if let Some((who, _)) = snapshot.balances.iter().find(|(_, amount)| **amount == 0) {
            return Err(BoundaryError::ZeroBalanceEntry {
                principal: who.to_string(),
            });
        }
        let balances = snapshot
            .balances
            .values()
            .try_fold(0u128, |acc, amount| acc.checked_add(*amount))
            .ok_or(BoundaryError::SupplyMismatch {
                balances: Amount::MAX,
                total_supply: snapshot.total_supply,
            })?;
        if balances != snapshot.total_supply {
            return Err(BoundaryError::SupplyMismatch {
                balances,
                total_supply: snapshot.total_supply,
            });
        }
        let computed = hex::encode(compute_state_root(
            &snapshot.owner,
            snapshot.initialized,
            snapshot.total_supply,
            snapshot.balances.iter().map(|(who, amount)| (who, *amount)),
            &snapshot.nonces,
        ));
        if computed != snapshot.state_root {
            return Err(BoundaryError::StateRootMismatch {
                expected: snapshot.state_root,
                computed,
            });
        }

        for (who, _) in store.entries() {
            store.set_balance(&who, 0);
        }
        for (who, amount) in &snapshot.balances {
            store.set_balance(who, *amount);
        }
        Ok(Self {
            owner: snapshot.owner,
            initialized: snapshot.initialized,
            total_supply: snapshot.total_supply,
            store,
            nonces: snapshot.nonces,
        })
    }

    //==================== state-changing calls ====================//

    pub fn initialize(&mut self, caller: &Principal) -> LedgerResult<()> {
        self.ensure_owner("initialize", caller)?;
        if self.initialized {
            return reject("initialize", caller, LedgerError::AlreadyInitialized);
        }
        let owner_balance = self.store.balance(&self.owner).checked_add(INITIAL_SUPPLY);
        let total_supply = self.total_supply.checked_add(INITIAL_SUPPLY);
        let (Some(owner_balance), Some(total_supply)) = (owner_balance, total_supply) else {
            return reject("initialize", caller, LedgerError::Overflow);
        };

        self.store.set_balance(&self.owner, owner_balance);
        self.total_supply = total_supply;
        self.initialized = true;
        debug!(owner = %self.owner, amount = INITIAL_SUPPLY, "initial supply minted");
        Ok(())
    }

    /// Moves `amount` from `from` to `to`. Only `from` may initiate.
    ///
    /// `memo` is carried for the caller's records and never touches state.
    pub fn transfer(
        &mut self,
        caller: &Principal,
        amount: Amount,
        from: &Principal,
        to: &Principal,
        memo: Option<&str>,
    ) -> LedgerResult<()> {
        if caller != from {
            return reject("transfer", caller, LedgerError::Unauthorized);
        }
        let from_balance = self.store.balance(from);
        if from_balance < amount {
            return reject("transfer", caller, LedgerError::InsufficientBalance);
        }
        if from == to || amount == 0 {
            debug!(%from, %to, amount, ?memo, "transfer is a no-op");
            return Ok(());
        }
        let Some(to_balance) = self.store.balance(to).checked_add(amount) else {
            return reject("transfer", caller, LedgerError::Overflow);
        };

        self.store.set_balance(from, from_balance - amount);
        self.store.set_balance(to, to_balance);
        debug!(%from, %to, amount, ?memo, "transfer applied");
        Ok(())
    }

    pub fn mint(
        &mut self,
        caller: &Principal,
        amount: Amount,
        recipient: &Principal,
    ) -> LedgerResult<()> {
        self.ensure_owner("mint", caller)?;
        let balance = self.store.balance(recipient).checked_add(amount);
        let total_supply = self.total_supply.checked_add(amount);
        let (Some(balance), Some(total_supply)) = (balance, total_supply) else {
            return reject("mint", caller, LedgerError::Overflow);
        };

        self.store.set_balance(recipient, balance);
        self.total_supply = total_supply;
        debug!(%recipient, amount, total_supply, "mint applied");
        Ok(())
    }

    /// Destroys `amount` of the caller's own tokens. Open to every holder.
    pub fn burn(&mut self, caller: &Principal, amount: Amount) -> LedgerResult<()> {
        let balance = self.store.balance(caller);
        if balance < amount {
            return reject("burn", caller, LedgerError::InsufficientBalance);
        }
        // balance <= total_supply holds, so this only fails on a corrupted store
        let Some(total_supply) = self.total_supply.checked_sub(amount) else {
            return reject("burn", caller, LedgerError::InsufficientBalance);
        };

        self.store.set_balance(caller, balance - amount);
        self.total_supply = total_supply;
        debug!(%caller, amount, total_supply, "burn applied");
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Principal,
        new_owner: Principal,
    ) -> LedgerResult<()> {
        self.ensure_owner("transfer-ownership", caller)?;
        debug!(from = %self.owner, to = %new_owner, "ownership transferred");
        self.owner = new_owner;
        Ok(())
    }

    //==================== read-only queries ====================//

    pub fn name(&self) -> &'static str {
        TOKEN_NAME
    }

    pub fn symbol(&self) -> &'static str {
        TOKEN_SYMBOL
    }

    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, who: &Principal) -> Amount {
        self.store.balance(who)
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn is_owner(&self, who: &Principal) -> bool {
        &self.owner == who
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn token_info(&self) -> TokenInfo {
        TokenInfo {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            total_supply: self.total_supply,
            contract_owner: self.owner.clone(),
            token_uri: None,
        }
    }

    /// Recomputes the balance sum and compares it against the supply figure.
    pub fn check_invariants(&self) -> Result<(), BoundaryError> {
        let balances = self.store.total().unwrap_or(Amount::MAX);
        if balances != self.total_supply {
            return Err(BoundaryError::SupplyMismatch {
                balances,
                total_supply: self.total_supply,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let balances: BTreeMap<Principal, Amount> = self.store.entries().into_iter().collect();
        let state_root = compute_state_root(
            &self.owner,
            self.initialized,
            self.total_supply,
            balances.iter().map(|(who, amount)| (who, *amount)),
            &self.nonces,
        );
        LedgerSnapshot {
            owner: self.owner.clone(),
            initialized: self.initialized,
            total_supply: self.total_supply,
            balances,
            nonces: self.nonces.clone(),
            state_root: hex::encode(state_root),
        }
    }

    pub fn next_nonce(&self, who: &Principal) -> u64 {
        self.nonces.get(who).copied().unwrap_or(0)
    }

    /// Accepts `nonce` only if it is exactly the next one expected from `who`,
    /// so a signed call is admitted at most once.
    pub fn consume_nonce(&mut self, who: &Principal, nonce: u64) -> Result<(), BoundaryError> {
        let expected = self.next_nonce(who);
        let next = match expected.checked_add(1) {
            Some(next) if nonce == expected => next,
            _ => {
                warn!(%who, expected, nonce, "stale signed-call nonce");
                return Err(BoundaryError::StaleNonce {
                    principal: who.to_string(),
                    expected,
                    got: nonce,
                });
            }
        };
        self.nonces.insert(who.clone(), next);
        Ok(())
    }

    fn ensure_owner(&self, op: &'static str, caller: &Principal) -> LedgerResult<()> {
        if caller != &self.owner {
            return reject(op, caller, LedgerError::Unauthorized);
        }
        Ok(())
    }
}

fn reject<T>(op: &'static str, caller: &Principal, err: LedgerError) -> LedgerResult<T> {
    warn!(op, %caller, code = err.code(), "call rejected: {err}");
    Err(err)
}

fn compute_state_root<'a>(
    owner: &Principal,
    initialized: bool,
    total_supply: Amount,
    balances: impl Iterator<Item = (&'a Principal, Amount)>,
    nonces: &BTreeMap<Principal, u64>,
) -> [u8; 32] {
    let leaf = |tag: &[u8], who: &str, value: &[u8]| -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update((who.len() as u64).to_le_bytes());
        hasher.update(who.as_bytes());
        hasher.update(value);
        hasher.finalize().into()
    };

    let mut meta = total_supply.to_le_bytes().to_vec();
    meta.push(initialized as u8);
    let mut level = vec![leaf(b"meta", owner.as_str(), &meta)];
    level.extend(balances.map(|(who, amount)| leaf(b"acct", who.as_str(), &amount.to_le_bytes())));
    level.extend(
        nonces
            .iter()
            .map(|(who, nonce)| leaf(b"nonce", who.as_str(), &nonce.to_le_bytes())),
    );

    // pairwise reduction; an odd tail is paired with itself
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| -> [u8; 32] {
                let right = pair.last().copied().unwrap_or(pair[0]);
                Sha256::new()
                    .chain_update(b"node")
                    .chain_update(pair[0])
                    .chain_update(right)
                    .finalize()
                    .into()
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn deployer() -> Principal {
        Principal::from("deployer")
    }

    fn wallet(n: u8) -> Principal {
        Principal::new(format!("wallet_{n}"))
    }

    fn initialized() -> Ledger {
        let mut ledger = Ledger::deploy(deployer());
        ledger.initialize(&deployer()).unwrap();
        ledger
    }

    #[test]
    fn deploy_starts_empty_and_owned_by_deployer() {
        let ledger = Ledger::deploy(deployer());
        assert_eq!(ledger.owner(), &deployer());
        assert!(!ledger.is_initialized());
        assert_eq!(ledger.total_supply(), 0);
        assert_eq!(ledger.balance_of(&deployer()), 0);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn initialize_mints_initial_supply_once() {
        let mut ledger = Ledger::deploy(deployer());
        assert_eq!(
            ledger.initialize(&wallet(1)),
            Err(LedgerError::Unauthorized)
        );
        assert!(!ledger.is_initialized());

        ledger.initialize(&deployer()).unwrap();
        assert_eq!(ledger.balance_of(&deployer()), 1_000_000_000_000_000);
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY);

        assert_eq!(
            ledger.initialize(&deployer()),
            Err(LedgerError::AlreadyInitialized)
        );
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY);
        assert_eq!(
            ledger.initialize(&wallet(1)),
            Err(LedgerError::Unauthorized)
        );
    }

    #[test]
    fn transfer_moves_exact_amount() {
        let mut ledger = initialized();
        ledger
            .transfer(&deployer(), 1_000_000_000, &deployer(), &wallet(1), None)
            .unwrap();
        assert_eq!(ledger.balance_of(&wallet(1)), 1_000_000_000);
        assert_eq!(
            ledger.balance_of(&deployer()),
            INITIAL_SUPPLY - 1_000_000_000
        );

        ledger
            .transfer(&wallet(1), 1_000_000_000, &wallet(1), &wallet(2), Some("rent"))
            .unwrap();
        assert_eq!(ledger.balance_of(&wallet(1)), 0);
        assert_eq!(ledger.balance_of(&wallet(2)), 1_000_000_000);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn transfer_rejects_non_holder_and_overdraft_without_side_effects() {
        let mut ledger = initialized();
        let before = ledger.snapshot();

        assert_eq!(
            ledger.transfer(&wallet(1), 1_000_000, &deployer(), &wallet(2), None),
            Err(LedgerError::Unauthorized)
        );
        assert_eq!(
            ledger.transfer(&wallet(1), 1, &wallet(1), &wallet(2), None),
            Err(LedgerError::InsufficientBalance)
        );
        assert_eq!(
            ledger.transfer(&deployer(), INITIAL_SUPPLY + 1, &deployer(), &wallet(2), None),
            Err(LedgerError::InsufficientBalance)
        );
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn self_transfer_and_zero_amounts_leave_balances_alone() {
        let mut ledger = initialized();
        ledger
            .transfer(&deployer(), 500, &deployer(), &deployer(), None)
            .unwrap();
        assert_eq!(ledger.balance_of(&deployer()), INITIAL_SUPPLY);

        ledger
            .transfer(&wallet(3), 0, &wallet(3), &wallet(4), None)
            .unwrap();
        assert_eq!(ledger.balance_of(&wallet(4)), 0);
        ledger.burn(&wallet(3), 0).unwrap();
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn burn_reduces_balance_and_supply() {
        let mut ledger = initialized();
        ledger
            .transfer(&deployer(), 1_000_000_000, &deployer(), &wallet(1), None)
            .unwrap();
        ledger.burn(&wallet(1), 500_000_000).unwrap();
        assert_eq!(ledger.balance_of(&wallet(1)), 500_000_000);
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY - 500_000_000);

        assert_eq!(
            ledger.burn(&wallet(1), 500_000_001),
            Err(LedgerError::InsufficientBalance)
        );
        assert_eq!(ledger.balance_of(&wallet(1)), 500_000_000);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn mint_is_owner_only_and_overflow_checked() {
        let mut ledger = initialized();
        assert_eq!(
            ledger.mint(&wallet(1), 1_000_000, &wallet(2)),
            Err(LedgerError::Unauthorized)
        );

        ledger.mint(&deployer(), 1_000_000_000, &wallet(1)).unwrap();
        assert_eq!(ledger.balance_of(&wallet(1)), 1_000_000_000);
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY + 1_000_000_000);

        let before = ledger.snapshot();
        assert_eq!(
            ledger.mint(&deployer(), Amount::MAX, &wallet(2)),
            Err(LedgerError::Overflow)
        );
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn ownership_transfer_moves_admin_rights() {
        let mut ledger = initialized();
        assert_eq!(
            ledger.transfer_ownership(&wallet(1), wallet(2)),
            Err(LedgerError::Unauthorized)
        );

        ledger.transfer_ownership(&deployer(), wallet(1)).unwrap();
        assert_eq!(ledger.owner(), &wallet(1));
        assert!(ledger.is_owner(&wallet(1)));
        assert!(!ledger.is_owner(&deployer()));
        assert_eq!(
            ledger.mint(&deployer(), 1, &deployer()),
            Err(LedgerError::Unauthorized)
        );
        ledger.mint(&wallet(1), 1, &wallet(1)).unwrap();
        // balances stay with their holders
        assert_eq!(ledger.balance_of(&deployer()), INITIAL_SUPPLY);
    }

    #[test]
    fn token_info_reports_metadata_and_live_figures() {
        let ledger = initialized();
        let info = ledger.token_info();
        assert_eq!(info.name, "AnthoCoin");
        assert_eq!(info.symbol, "ANTHO");
        assert_eq!(info.decimals, 6);
        assert_eq!(info.total_supply, INITIAL_SUPPLY);
        assert_eq!(info.contract_owner, deployer());
        assert_eq!(info.token_uri, None);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["total-supply"], serde_json::json!(1_000_000_000_000_000u64));
        assert!(json["token-uri"].is_null());
    }

    #[test]
    fn snapshot_restores_and_detects_tampering() {
        let mut ledger = initialized();
        ledger
            .transfer(&deployer(), 42, &deployer(), &wallet(1), None)
            .unwrap();
        let snapshot = ledger.snapshot();
        let restored = Ledger::restore(snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(ledger.snapshot().state_root, snapshot.state_root);

        let mut inflated = snapshot.clone();
        inflated.balances.insert(wallet(9), 1);
        assert!(matches!(
            Ledger::restore(inflated),
            Err(BoundaryError::SupplyMismatch { .. })
        ));

        let mut reowned = snapshot;
        reowned.owner = wallet(9);
        assert!(matches!(
            Ledger::restore(reowned),
            Err(BoundaryError::StateRootMismatch { .. })
        ));
    }

    #[test]
    fn zero_balance_entries_are_refused_on_restore() {
        let ledger = initialized();
        let mut snapshot = ledger.snapshot();
        snapshot.balances.insert(wallet(5), 0);
        assert!(matches!(
            Ledger::restore(snapshot),
            Err(BoundaryError::ZeroBalanceEntry { .. })
        ));
    }

    #[test]
    fn nonces_advance_once_and_survive_snapshots() {
        let mut ledger = initialized();
        let root_before = ledger.snapshot().state_root;
        assert_eq!(ledger.next_nonce(&wallet(1)), 0);

        ledger.consume_nonce(&wallet(1), 0).unwrap();
        assert_eq!(ledger.next_nonce(&wallet(1)), 1);
        assert!(matches!(
            ledger.consume_nonce(&wallet(1), 0),
            Err(BoundaryError::StaleNonce { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            ledger.consume_nonce(&wallet(1), 5),
            Err(BoundaryError::StaleNonce { expected: 1, got: 5, .. })
        ));
        assert_eq!(ledger.next_nonce(&wallet(2)), 0);

        let snapshot = ledger.snapshot();
        assert_ne!(snapshot.state_root, root_before);
        let restored = Ledger::restore(snapshot.clone()).unwrap();
        assert_eq!(restored.next_nonce(&wallet(1)), 1);

        let mut rewound = snapshot;
        rewound.nonces.clear();
        assert!(matches!(
            Ledger::restore(rewound),
            Err(BoundaryError::StateRootMismatch { .. })
        ));
    }

    #[test]
    fn supply_matches_balances_under_random_sequences() {
        let mut rng = StdRng::seed_from_u64(0xA17);
        let principals: Vec<Principal> = std::iter::once(deployer())
            .chain((1..=4).map(wallet))
            .collect();
        let mut ledger = Ledger::deploy(deployer());

        for _ in 0..2_000 {
            let caller = principals[rng.gen_range(0..principals.len())].clone();
            let other = principals[rng.gen_range(0..principals.len())].clone();
            let amount: Amount = rng.gen_range(0..=2 * TOKEN_SCALE * 1_000);
            let before = ledger.snapshot();
            let result = match rng.gen_range(0..5) {
                0 => ledger.initialize(&caller),
                1 => ledger.transfer(&caller, amount, &caller, &other, None),
                2 => ledger.mint(&caller, amount, &other),
                3 => ledger.burn(&caller, amount),
                _ => ledger.transfer_ownership(&caller, other),
            };
            if result.is_err() {
                assert_eq!(ledger.snapshot(), before);
            }
            ledger.check_invariants().unwrap();
        }
    }
}
