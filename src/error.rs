use thiserror::Error;

/// Rejections produced by the ledger state machine.
///
/// Every variant carries a stable integer code that callers branch on. The
/// codes are only materialised at the call boundary (see [`crate::call`]).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller is neither the owner (for admin calls) nor the holder (for transfers).
    #[error("unauthorized caller")]
    Unauthorized,

    /// Source balance is below the requested amount.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Total supply or a balance would leave the u128 range.
    #[error("arithmetic overflow")]
    Overflow,

    /// `initialize` already minted the initial supply.
    #[error("ledger already initialized")]
    AlreadyInitialized,
}

pub const ERR_UNAUTHORIZED: u32 = 100;
pub const ERR_INSUFFICIENT_BALANCE: u32 = 101;
pub const ERR_OVERFLOW: u32 = 102;
pub const ERR_ALREADY_INITIALIZED: u32 = 103;

impl LedgerError {
    pub fn code(self) -> u32 {
        match self {
            LedgerError::Unauthorized => ERR_UNAUTHORIZED,
            LedgerError::InsufficientBalance => ERR_INSUFFICIENT_BALANCE,
            LedgerError::Overflow => ERR_OVERFLOW,
            LedgerError::AlreadyInitialized => ERR_ALREADY_INITIALIZED,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            ERR_UNAUTHORIZED => Some(LedgerError::Unauthorized),
            ERR_INSUFFICIENT_BALANCE => Some(LedgerError::InsufficientBalance),
            ERR_OVERFLOW => Some(LedgerError::Overflow),
            ERR_ALREADY_INITIALIZED => Some(LedgerError::AlreadyInitialized),
            _ => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures outside the ledger itself: envelopes, snapshots, files.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("invalid hex in {field}: {source}")]
    Hex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature does not match the call")]
    SignatureMismatch,

    #[error("snapshot supply mismatch: balances sum to {balances}, total supply is {total_supply}")]
    SupplyMismatch { balances: u128, total_supply: u128 },

    #[error("snapshot state root mismatch: expected {expected}, computed {computed}")]
    StateRootMismatch { expected: String, computed: String },

    #[error("snapshot lists a zero balance for {principal}")]
    ZeroBalanceEntry { principal: String },

    #[error("stale nonce for {principal}: expected {expected}, got {got}")]
    StaleNonce {
        principal: String,
        expected: u64,
        got: u64,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
