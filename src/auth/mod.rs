//! Authenticated callers.
//!
//! A principal is derived from an Ed25519 verifying key, so whoever holds the
//! signing key is the only party able to present calls as that principal.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::call::Operation;
use crate::error::BoundaryError;
use crate::ledger::{Ledger, Principal};
use crate::store::BalanceStore;

const PRINCIPAL_PREFIX: &str = "AN";
const CALL_DOMAIN: &[u8] = b"antho-call-v1";

pub fn generate_keypair() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

pub fn principal_of(key: &VerifyingKey) -> Principal {
    let digest = Sha256::digest(key.as_bytes());
    Principal::new(format!("{PRINCIPAL_PREFIX}{}", hex::encode(&digest[..20])))
}

pub fn parse_signing_key(sk_hex: &str) -> Result<SigningKey, BoundaryError> {
    let bytes = decode_fixed::<32>("sk-hex", sk_hex)?;
    Ok(SigningKey::from_bytes(&bytes))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    pub operation: Operation,
    /// Must equal the signer's next nonce on the ledger it is submitted to.
    pub nonce: u64,
    pub public_key: String,
    pub signature: String,
}

impl SignedCall {
    pub fn sign(key: &SigningKey, nonce: u64, operation: Operation) -> Result<Self, BoundaryError> {
        let message = call_digest(nonce, &operation)?;
        let signature = key.sign(&message);
        Ok(Self {
            operation,
            nonce,
            public_key: hex::encode(key.verifying_key().as_bytes()),
            signature: hex::encode(signature.to_bytes()),
        })
    }

    /// Checks the signature and yields the caller it authenticates.
    pub fn verify(self) -> Result<(Principal, Operation), BoundaryError> {
        let pk_bytes = decode_fixed::<32>("public_key", &self.public_key)?;
        let public_key =
            VerifyingKey::from_bytes(&pk_bytes).map_err(|_| BoundaryError::InvalidPublicKey)?;
        let sig_bytes = hex::decode(self.signature.trim()).map_err(|source| BoundaryError::Hex {
            field: "signature",
            source,
        })?;
        let signature =
            Signature::from_slice(&sig_bytes).map_err(|_| BoundaryError::InvalidSignature)?;

        let message = call_digest(self.nonce, &self.operation)?;
        public_key
            .verify(&message, &signature)
            .map_err(|_| BoundaryError::SignatureMismatch)?;
        Ok((principal_of(&public_key), self.operation))
    }

    /// Verifies the call and spends its nonce on `ledger`, so the same signed
    /// call is admitted at most once.
    pub fn admit<S: BalanceStore>(
        self,
        ledger: &mut Ledger<S>,
    ) -> Result<(Principal, Operation), BoundaryError> {
        let nonce = self.nonce;
        let (caller, operation) = self.verify()?;
        ledger.consume_nonce(&caller, nonce)?;
        Ok((caller, operation))
    }
}

fn call_digest(nonce: u64, operation: &Operation) -> Result<[u8; 32], BoundaryError> {
    let body = serde_json::to_vec(operation)?;
    let mut hasher = Sha256::new();
    hasher.update(CALL_DOMAIN);
    hasher.update(nonce.to_le_bytes());
    hasher.update((body.len() as u64).to_le_bytes());
    hasher.update(&body);
    Ok(hasher.finalize().into())
}

fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], BoundaryError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value.trim(), &mut out)
        .map_err(|source| BoundaryError::Hex { field, source })?;
    Ok(out)
}
