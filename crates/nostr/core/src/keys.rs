use bech32::{Bech32, Hrp};
use std::fmt;
use thiserror::Error;

use crate::nip01::{decode_secret_key, get_public_key_hex, is_hex_of_len};

const NSEC_HRP: &str = "nsec";
const NPUB_HRP: &str = "npub";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid bech32 key: {0}")]
    Bech32(String),

    #[error("unexpected key prefix: expected {expected}, got {actual}")]
    WrongPrefix { expected: &'static str, actual: String },

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex key")]
    InvalidHex,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("unrecognized key format")]
    UnrecognizedFormat,
}

/// Hex keypair as held by the identity service.
///
/// `privkey` is absent when the user logged in with a public key only.
#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub pubkey: String,
    pub privkey: Option<String>,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey)
            .field("privkey", &self.privkey.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Keypair {
    pub fn from_secret_hex(privkey: &str) -> Result<Self, KeyError> {
        let privkey = privkey.trim().to_ascii_lowercase();
        if !is_hex_of_len(&privkey, 32) {
            return Err(KeyError::InvalidHex);
        }
        let secret_key = decode_secret_key(&privkey).map_err(|_| KeyError::InvalidSecretKey)?;
        let pubkey = get_public_key_hex(&secret_key).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self {
            pubkey,
            privkey: Some(privkey),
        })
    }

    pub fn from_public_hex(pubkey: &str) -> Result<Self, KeyError> {
        let pubkey = pubkey.trim().to_ascii_lowercase();
        if !is_hex_of_len(&pubkey, 32) {
            return Err(KeyError::InvalidHex);
        }
        Ok(Self {
            pubkey,
            privkey: None,
        })
    }

    pub fn from_nsec(nsec: &str) -> Result<Self, KeyError> {
        let bytes = decode_bech32(NSEC_HRP, nsec)?;
        Self::from_secret_hex(&hex::encode(bytes))
    }

    pub fn from_npub(npub: &str) -> Result<Self, KeyError> {
        let bytes = decode_bech32(NPUB_HRP, npub)?;
        Ok(Self {
            pubkey: hex::encode(bytes),
            privkey: None,
        })
    }

    /// Accepts `nsec1…`, `npub1…`, or a 64-character hex secret key.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let input = input.trim();
        if input.starts_with("nsec1") {
            Self::from_nsec(input)
        } else if input.starts_with("npub1") {
            Self::from_npub(input)
        } else if is_hex_of_len(&input.to_ascii_lowercase(), 32) {
            Self::from_secret_hex(input)
        } else {
            Err(KeyError::UnrecognizedFormat)
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.privkey.is_none()
    }

    pub fn npub(&self) -> Result<String, KeyError> {
        encode_bech32(NPUB_HRP, &self.pubkey)
    }

    pub fn nsec(&self) -> Result<Option<String>, KeyError> {
        self.privkey
            .as_deref()
            .map(|privkey| encode_bech32(NSEC_HRP, privkey))
            .transpose()
    }
}

fn encode_bech32(hrp: &str, key_hex: &str) -> Result<String, KeyError> {
    let mut data = [0u8; 32];
    hex::decode_to_slice(key_hex, &mut data).map_err(|_| KeyError::InvalidHex)?;
    let parsed_hrp = Hrp::parse(hrp).map_err(|error| KeyError::Bech32(error.to_string()))?;
    bech32::encode::<Bech32>(parsed_hrp, &data).map_err(|error| KeyError::Bech32(error.to_string()))
}

fn decode_bech32(expected: &'static str, encoded: &str) -> Result<[u8; 32], KeyError> {
    let (hrp, data) =
        bech32::decode(encoded.trim()).map_err(|error| KeyError::Bech32(error.to_string()))?;
    if hrp.as_str() != expected {
        return Err(KeyError::WrongPrefix {
            expected,
            actual: hrp.to_string(),
        });
    }
    data.as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength(data.len()))
}
