// attestation.rs — Signed chain checkpoints.
//
// A hash chain detects edits to any event that has a successor, but not to
// the newest one. A checkpoint closes that gap: it pins (chain key, event
// count, head hash) under an Ed25519 signature. Verifying it later recomputes
// the head from the stored events, so rewriting any event up to the
// checkpoint, including the last one, is detected.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};

use crate::chain::{group_by_chain, verify_chain, ChainVerification};
use crate::error::AuditError;
use crate::event::{AuditEvent, ChainKey};

/// A signed statement about the state of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    pub chain_key: ChainKey,
    pub event_count: usize,
    pub head_hash: String,
    pub signed_at: DateTime<Utc>,
    /// Base64 Ed25519 public key of the signer.
    pub public_key: String,
    /// Base64 Ed25519 signature over `signing_payload()`.
    pub signature: String,
}

impl ChainCheckpoint {
    fn signing_payload(
        chain_key: &ChainKey,
        event_count: usize,
        head_hash: &str,
        signed_at: &DateTime<Utc>,
    ) -> Vec<u8> {
        format!(
            "gv-chain-checkpoint\n{}\n{}\n{}\n{}",
            chain_key,
            event_count,
            head_hash,
            signed_at.to_rfc3339()
        )
        .into_bytes()
    }
}

/// Holds the Ed25519 key used to sign checkpoints.
pub struct ChainAttestor {
    keypair: Ed25519KeyPair,
}

impl ChainAttestor {
    /// Generate a fresh key. Returns the attestor and its PKCS#8 bytes so the
    /// caller can persist the key.
    pub fn generate() -> Result<(Self, Vec<u8>), AuditError> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| AuditError::Attestation("key generation failed".into()))?;
        let attestor = Self::from_pkcs8(pkcs8.as_ref())?;
        Ok((attestor, pkcs8.as_ref().to_vec()))
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, AuditError> {
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| AuditError::Attestation(format!("invalid signing key: {}", e)))?;
        Ok(Self { keypair })
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.keypair.public_key().as_ref())
    }

    /// Sign the current head of `chain_key` as found in `events`.
    ///
    /// The chain must verify before it is signed.
    pub fn checkpoint(
        &self,
        chain_key: &ChainKey,
        events: &[AuditEvent],
    ) -> Result<ChainCheckpoint, AuditError> {
        let chains = group_by_chain(events);
        let chain = chains.get(chain_key).ok_or_else(|| {
            AuditError::Attestation(format!("chain {} has no events", chain_key))
        })?;
        let head_hash = match verify_chain(chain_key, chain)? {
            ChainVerification::Intact {
                head: Some(head), ..
            } => head,
            ChainVerification::Intact { head: None, .. } => {
                return Err(AuditError::Attestation(format!(
                    "chain {} has no events",
                    chain_key
                )))
            }
            ChainVerification::Broken(brk) => {
                return Err(AuditError::Attestation(format!(
                    "refusing to sign broken chain {} (break at position {})",
                    chain_key, brk.position
                )))
            }
        };

        let signed_at = Utc::now();
        let payload =
            ChainCheckpoint::signing_payload(chain_key, chain.len(), &head_hash, &signed_at);
        let sig = self.keypair.sign(&payload);
        tracing::info!(chain = %chain_key, events = chain.len(), "signed chain checkpoint");
        Ok(ChainCheckpoint {
            chain_key: chain_key.clone(),
            event_count: chain.len(),
            head_hash,
            signed_at,
            public_key: self.public_key_base64(),
            signature: STANDARD.encode(sig.as_ref()),
        })
    }
}

/// Check a checkpoint against stored events.
///
/// The first `event_count` events of the chain must verify, their head must
/// equal `head_hash`, and the signature must be valid for `public_key`.
/// Events appended after the checkpoint are ignored.
pub fn verify_checkpoint(
    checkpoint: &ChainCheckpoint,
    events: &[AuditEvent],
) -> Result<(), AuditError> {
    let chains = group_by_chain(events);
    let chain = chains
        .get(&checkpoint.chain_key)
        .map(Vec::as_slice)
        .unwrap_or_default();
    if chain.len() < checkpoint.event_count {
        return Err(AuditError::Attestation(format!(
            "chain {} has {} events; checkpoint covers {}",
            checkpoint.chain_key,
            chain.len(),
            checkpoint.event_count
        )));
    }

    let covered = &chain[..checkpoint.event_count];
    match verify_chain(&checkpoint.chain_key, covered)? {
        ChainVerification::Intact {
            head: Some(head), ..
        } if head == checkpoint.head_hash => {}
        ChainVerification::Broken(brk) => {
            return Err(AuditError::Attestation(format!(
                "chain {} breaks at position {}",
                checkpoint.chain_key, brk.position
            )))
        }
        _ => {
            return Err(AuditError::Attestation(format!(
                "chain {} head does not match checkpoint",
                checkpoint.chain_key
            )))
        }
    }

    let public_key = STANDARD
        .decode(&checkpoint.public_key)
        .map_err(|e| AuditError::Attestation(format!("bad public key encoding: {}", e)))?;
    let sig = STANDARD
        .decode(&checkpoint.signature)
        .map_err(|e| AuditError::Attestation(format!("bad signature encoding: {}", e)))?;
    let payload = ChainCheckpoint::signing_payload(
        &checkpoint.chain_key,
        checkpoint.event_count,
        &checkpoint.head_hash,
        &checkpoint.signed_at,
    );
    signature::UnparsedPublicKey::new(&signature::ED25519, public_key)
        .verify(&payload, &sig)
        .map_err(|_| AuditError::Attestation("signature does not verify".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActorType, AuditEventFields, Intent};
    use crate::store::{AuditReader, MemoryAuditStore};
    use crate::writer::AuditWriter;
    use std::sync::Arc;

    fn populated() -> (Vec<AuditEvent>, ChainKey) {
        let store = Arc::new(MemoryAuditStore::new());
        let writer = AuditWriter::new(store.clone()).unwrap();
        for intent in [Intent::Configure, Intent::Activate, Intent::Disable] {
            writer
                .emit(
                    AuditEventFields::new("t1", "alice", ActorType::Human, "cap", intent)
                        .with_object("policy", "p", 1)
                        .with_new_state_hash("h")
                        .confirmed(),
                )
                .unwrap();
        }
        (store.snapshot().unwrap(), ChainKey::new("t1", "policy", "p"))
    }

    #[test]
    fn checkpoint_verifies_and_tolerates_later_events() {
        let (mut events, key) = populated();
        let (attestor, _pkcs8) = ChainAttestor::generate().unwrap();
        let checkpoint = attestor.checkpoint(&key, &events).unwrap();
        assert_eq!(checkpoint.event_count, 3);
        verify_checkpoint(&checkpoint, &events).unwrap();

        let mut later = events[2].clone();
        later.event_id = uuid::Uuid::now_v7();
        later.previous_state_hash = Some(checkpoint.head_hash.clone());
        events.push(later);
        verify_checkpoint(&checkpoint, &events).unwrap();
    }

    #[test]
    fn editing_the_newest_event_is_detected() {
        let (mut events, key) = populated();
        let (attestor, _) = ChainAttestor::generate().unwrap();
        let checkpoint = attestor.checkpoint(&key, &events).unwrap();

        events[2].reason = "rewritten after the fact".into();
        assert!(verify_checkpoint(&checkpoint, &events).is_err());
    }

    #[test]
    fn forged_signature_is_rejected() {
        let (events, key) = populated();
        let (attestor, _) = ChainAttestor::generate().unwrap();
        let (other, _) = ChainAttestor::generate().unwrap();
        let mut checkpoint = attestor.checkpoint(&key, &events).unwrap();
        checkpoint.public_key = other.public_key_base64();
        assert!(matches!(
            verify_checkpoint(&checkpoint, &events),
            Err(AuditError::Attestation(_))
        ));
    }

    #[test]
    fn key_round_trips_through_pkcs8() {
        let (attestor, pkcs8) = ChainAttestor::generate().unwrap();
        let restored = ChainAttestor::from_pkcs8(&pkcs8).unwrap();
        assert_eq!(attestor.public_key_base64(), restored.public_key_base64());
    }
}
