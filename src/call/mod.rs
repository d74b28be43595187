use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger::{Amount, Ledger, Principal, TokenInfo};
use crate::store::BalanceStore;

/// A single ledger call as delivered by the hosting environment.
///
/// The invoking principal is never part of the body; it travels alongside
/// (see [`execute`] and [`crate::auth::SignedCall`]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Operation {
    Initialize,
    Transfer {
        #[serde(with = "amount_format")]
        amount: Amount,
        from: Principal,
        to: Principal,
        #[serde(default)]
        memo: Option<String>,
    },
    Mint {
        #[serde(with = "amount_format")]
        amount: Amount,
        recipient: Principal,
    },
    Burn {
        #[serde(with = "amount_format")]
        amount: Amount,
    },
    TransferOwnership {
        #[serde(rename = "new-owner")]
        new_owner: Principal,
    },
    GetName,
    GetSymbol,
    GetDecimals,
    GetTotalSupply,
    GetBalance {
        principal: Principal,
    },
    GetContractOwner,
    IsContractOwner {
        principal: Principal,
    },
    GetTokenInfo,
}

impl Operation {
    pub fn is_read_only(&self) -> bool {
        !matches!(
            self,
            Operation::Initialize
                | Operation::Transfer { .. }
                | Operation::Mint { .. }
                | Operation::Burn { .. }
                | Operation::TransferOwnership { .. }
        )
    }
}

/// Amounts in call bodies.
///
/// Written as decimal strings so the full u128 range survives JSON; plain
/// non-negative integers are accepted on input. Visits through
/// `deserialize_any` because the tagged `Operation` buffers its fields and that
/// buffer has no u128 slot.
pub(crate) mod amount_format {
    use std::fmt;

    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    use crate::ledger::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer amount or its decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(Amount::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            Amount::try_from(v).map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            v.trim()
                .parse::<Amount>()
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Amount(Amount),
    Decimals(u8),
    Text(String),
    Principal(Principal),
    TokenInfo(TokenInfo),
}

/// Serialised as `{"ok": <value>}` or `{"err": <code>}`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Ok(Value),
    Err(u32),
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    pub fn error(&self) -> Option<LedgerError> {
        match self {
            Response::Ok(_) => None,
            Response::Err(code) => LedgerError::from_code(*code),
        }
    }
}

impl From<Result<Value, LedgerError>> for Response {
    fn from(result: Result<Value, LedgerError>) -> Self {
        match result {
            Ok(value) => Response::Ok(value),
            Err(err) => Response::Err(err.code()),
        }
    }
}

/// Applies `op` on behalf of `caller`. State-changing calls answer with the
/// success marker `true`; read-only calls answer with the queried value.
pub fn execute<S: BalanceStore>(
    ledger: &mut Ledger<S>,
    caller: &Principal,
    op: Operation,
) -> Response {
    let result = match op {
        Operation::Initialize => ledger.initialize(caller).map(|_| Value::Bool(true)),
        Operation::Transfer {
            amount,
            from,
            to,
            memo,
        } => ledger
            .transfer(caller, amount, &from, &to, memo.as_deref())
            .map(|_| Value::Bool(true)),
        Operation::Mint { amount, recipient } => ledger
            .mint(caller, amount, &recipient)
            .map(|_| Value::Bool(true)),
        Operation::Burn { amount } => ledger.burn(caller, amount).map(|_| Value::Bool(true)),
        Operation::TransferOwnership { new_owner } => ledger
            .transfer_ownership(caller, new_owner)
            .map(|_| Value::Bool(true)),
        read_only => query(ledger, read_only),
    };
    result.into()
}

/// Answers read-only calls without a caller. State-changing operations are
/// refused with `Unauthorized` since no principal was presented.
pub fn query<S: BalanceStore>(ledger: &Ledger<S>, op: Operation) -> Result<Value, LedgerError> {
    let value = match op {
        Operation::GetName => Value::Text(ledger.name().to_string()),
        Operation::GetSymbol => Value::Text(ledger.symbol().to_string()),
        Operation::GetDecimals => Value::Decimals(ledger.decimals()),
        Operation::GetTotalSupply => Value::Amount(ledger.total_supply()),
        Operation::GetBalance { principal } => Value::Amount(ledger.balance_of(&principal)),
        Operation::GetContractOwner => Value::Principal(ledger.owner().clone()),
        Operation::IsContractOwner { principal } => Value::Bool(ledger.is_owner(&principal)),
        Operation::GetTokenInfo => Value::TokenInfo(ledger.token_info()),
        Operation::Initialize
        | Operation::Transfer { .. }
        | Operation::Mint { .. }
        | Operation::Burn { .. }
        | Operation::TransferOwnership { .. } => return Err(LedgerError::Unauthorized),
    };
    Ok(value)
}
