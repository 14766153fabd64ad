//! NIP-01: event model, canonical serialization, hashing and signing.
//!
//! The event id is the SHA-256 of the canonical form
//! `[0,"<pubkey>",<created_at>,<kind>,<tags>,<content>]` encoded as compact
//! JSON. `serde_json` never escapes `/` and never inserts whitespace, so the
//! bytes it produces are the exact pre-image every other client hashes.

use bitcoin::secp256k1::{Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey, schnorr};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

/// Errors raised while serializing, hashing, signing or verifying events.
#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("public key does not match the signing key")]
    KeyMismatch,

    #[error("invalid event id: {0}")]
    InvalidId(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("system clock error: {0}")]
    Clock(String),
}

pub type Result<T> = std::result::Result<T, Nip01Error>;

/// A sealed, signed Nostr event.
///
/// Never mutated after construction: the id commits to every other field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// The fields covered by the event id.
    pub fn unsigned(&self) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }

    /// Compact JSON object form of the event.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Relay submission frame: `["EVENT", <event>]`.
    pub fn to_event_message(&self) -> Result<String> {
        Ok(serde_json::to_string(&("EVENT", self))?)
    }

    pub fn classification(&self) -> KindClassification {
        KindClassification::of(self.kind)
    }
}

/// Event fields prior to hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// The `(content, kind, tags)` triple a builder hands to the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl EventTemplate {
    /// Template stamped with the current time. Fails rather than stamping a
    /// bogus `created_at` when the clock is unreadable.
    pub fn now(kind: u32, tags: Vec<Vec<String>>, content: impl Into<String>) -> Result<Self> {
        Self::stamped(unix_now_secs(), kind, tags, content)
    }

    fn stamped(
        clock: Result<u64>,
        kind: u32,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let created_at = clock.inspect_err(|error| warn!(kind, %error, "cannot stamp event"))?;
        Ok(Self {
            created_at,
            kind,
            tags,
            content: content.into(),
        })
    }

    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn into_unsigned(self, pubkey: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: pubkey.into(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

/// Storage semantics of a kind, per the NIP-01 ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClassification {
    Regular,
    Replaceable,
    Ephemeral,
    Addressable,
    Unknown,
}

impl KindClassification {
    pub fn of(kind: u32) -> Self {
        match kind {
            0 | 3 => Self::Replaceable,
            1..=2 | 4..=44 | 1000..=9999 => Self::Regular,
            10000..=19999 => Self::Replaceable,
            20000..=29999 => Self::Ephemeral,
            30000..=39999 => Self::Addressable,
            _ => Self::Unknown,
        }
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now_secs() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|error| Nip01Error::Clock(error.to_string()))
}

pub(crate) fn is_hex_of_len(value: &str, bytes: usize) -> bool {
    value.len() == bytes * 2
        && value
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}

/// Canonical serialization used as the event id pre-image.
pub fn serialize_event(event: &UnsignedEvent) -> Result<String> {
    if !is_hex_of_len(&event.pubkey, 32) {
        return Err(Nip01Error::InvalidPublicKey(format!(
            "expected 64 lowercase hex characters, got {:?}",
            event.pubkey
        )));
    }

    let canonical = (
        0u8,
        &event.pubkey,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    );
    serde_json::to_string(&canonical).map_err(|error| {
        warn!(kind = event.kind, %error, "failed to serialize event for hashing");
        Nip01Error::Serialization(error)
    })
}

fn event_digest(event: &UnsignedEvent) -> Result<[u8; 32]> {
    let serialized = serialize_event(event)?;
    Ok(Sha256::digest(serialized.as_bytes()).into())
}

/// Lowercase hex SHA-256 of the canonical serialization.
pub fn get_event_hash(event: &UnsignedEvent) -> Result<String> {
    Ok(hex::encode(event_digest(event)?))
}

/// Generate a fresh random secret key.
pub fn generate_secret_key() -> [u8; 32] {
    loop {
        let candidate: [u8; 32] = rand::random();
        if SecretKey::from_slice(&candidate).is_ok() {
            return candidate;
        }
    }
}

/// X-only public key for a secret key.
pub fn get_public_key(secret_key: &[u8; 32]) -> Result<[u8; 32]> {
    let secp = Secp256k1::signing_only();
    let keypair =
        Keypair::from_seckey_slice(&secp, secret_key).map_err(|_| Nip01Error::InvalidSecretKey)?;
    Ok(keypair.x_only_public_key().0.serialize())
}

pub fn get_public_key_hex(secret_key: &[u8; 32]) -> Result<String> {
    Ok(hex::encode(get_public_key(secret_key)?))
}

/// Hash and sign a template with a raw secret key.
///
/// Every call draws fresh auxiliary randomness for the BIP-340 nonce.
pub fn finalize_event(template: &EventTemplate, secret_key: &[u8; 32]) -> Result<Event> {
    let secp = Secp256k1::new();
    let keypair =
        Keypair::from_seckey_slice(&secp, secret_key).map_err(|_| Nip01Error::InvalidSecretKey)?;
    let pubkey = hex::encode(keypair.x_only_public_key().0.serialize());

    let unsigned = template.clone().into_unsigned(pubkey);
    let digest = event_digest(&unsigned)?;

    let aux_rand: [u8; 32] = rand::random();
    let signature = secp.sign_schnorr_with_aux_rand(&Message::from_digest(digest), &keypair, &aux_rand);

    Ok(Event {
        id: hex::encode(digest),
        pubkey: unsigned.pubkey,
        created_at: unsigned.created_at,
        kind: unsigned.kind,
        tags: unsigned.tags,
        content: unsigned.content,
        sig: hex::encode(signature.serialize()),
    })
}

/// Sign with hex-encoded keys as held by an identity service.
///
/// The private key is only borrowed for the duration of the call.
pub fn sign_event(pubkey: &str, privkey: &str, template: &EventTemplate) -> Result<Event> {
    let secret_key = decode_secret_key(privkey)?;
    let event = finalize_event(template, &secret_key)?;
    if event.pubkey != pubkey {
        return Err(Nip01Error::KeyMismatch);
    }
    Ok(event)
}

pub(crate) fn decode_secret_key(privkey: &str) -> Result<[u8; 32]> {
    let mut secret_key = [0u8; 32];
    hex::decode_to_slice(privkey.trim(), &mut secret_key)
        .map_err(|_| Nip01Error::InvalidSecretKey)?;
    Ok(secret_key)
}

/// Structural checks on hex field lengths.
pub fn validate_event(event: &Event) -> Result<()> {
    if !is_hex_of_len(&event.id, 32) {
        return Err(Nip01Error::InvalidId(event.id.clone()));
    }
    if !is_hex_of_len(&event.pubkey, 32) {
        return Err(Nip01Error::InvalidPublicKey(event.pubkey.clone()));
    }
    if !is_hex_of_len(&event.sig, 64) {
        return Err(Nip01Error::InvalidSignature(
            "expected 128 lowercase hex characters".to_string(),
        ));
    }
    Ok(())
}

/// Recompute the id and check the Schnorr signature against it.
///
/// Returns `Ok(false)` when the event is well formed but the id or signature
/// does not match.
pub fn verify_event(event: &Event) -> Result<bool> {
    validate_event(event)?;

    let digest = event_digest(&event.unsigned())?;
    if hex::encode(digest) != event.id {
        return Ok(false);
    }

    let mut pubkey_bytes = [0u8; 32];
    hex::decode_to_slice(&event.pubkey, &mut pubkey_bytes)
        .map_err(|error| Nip01Error::InvalidPublicKey(error.to_string()))?;
    let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|error| Nip01Error::InvalidPublicKey(error.to_string()))?;

    let mut sig_bytes = [0u8; 64];
    hex::decode_to_slice(&event.sig, &mut sig_bytes)
        .map_err(|error| Nip01Error::InvalidSignature(error.to_string()))?;
    let signature = schnorr::Signature::from_slice(&sig_bytes)
        .map_err(|error| Nip01Error::InvalidSignature(error.to_string()))?;

    let secp = Secp256k1::verification_only();
    Ok(secp
        .verify_schnorr(&signature, &Message::from_digest(digest), &pubkey)
        .is_ok())
}
