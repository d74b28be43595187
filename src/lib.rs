//! AnthoCoin: a single-asset fungible token ledger.
//!
//! * [`ledger`]: the state machine: balances, total supply, owner.
//! * [`store`]: the key-value seam that holds balances.
//! * [`call`]: the `(caller, operation, arguments)` boundary and its integer
//!   error codes.
//! * [`auth`]: Ed25519-backed principals and signed calls.
//! * [`config`]: CLI settings and snapshot files.

pub mod auth;
pub mod call;
pub mod config;
pub mod ledger;
pub mod store;

mod error;

pub use error::{
    BoundaryError, LedgerError, LedgerResult, ERR_ALREADY_INITIALIZED, ERR_INSUFFICIENT_BALANCE,
    ERR_OVERFLOW, ERR_UNAUTHORIZED,
};
