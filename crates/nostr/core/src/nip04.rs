//! NIP-04: encrypted direct message content.
//!
//! The AES-256-CBC key is the x-coordinate of the ECDH point between the
//! sender's secret key and the recipient's x-only public key (even parity).
//! Wire form: `base64(ciphertext) + "?iv=" + base64(iv)`.

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bitcoin::secp256k1::{Parity, PublicKey, SecretKey, XOnlyPublicKey, ecdh};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_SEPARATOR: &str = "?iv=";

#[derive(Debug, Error)]
pub enum Nip04Error {
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("decryption failed")]
    Decryption,

    #[error("decrypted content is not UTF-8")]
    InvalidUtf8,
}

fn shared_key(secret_key: &[u8; 32], pubkey_hex: &str) -> Result<[u8; 32], Nip04Error> {
    let secret_key = SecretKey::from_slice(secret_key).map_err(|_| Nip04Error::InvalidSecretKey)?;

    let mut pubkey_bytes = [0u8; 32];
    hex::decode_to_slice(pubkey_hex, &mut pubkey_bytes)
        .map_err(|error| Nip04Error::InvalidPublicKey(error.to_string()))?;
    let x_only = XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|error| Nip04Error::InvalidPublicKey(error.to_string()))?;
    let pubkey = PublicKey::from_x_only_public_key(x_only, Parity::Even);

    let point = ecdh::shared_secret_point(&pubkey, &secret_key);
    let mut key = [0u8; 32];
    key.copy_from_slice(&point[..32]);
    Ok(key)
}

pub fn encrypt(
    secret_key: &[u8; 32],
    recipient_pubkey: &str,
    plaintext: &str,
) -> Result<String, Nip04Error> {
    let key = shared_key(secret_key, recipient_pubkey)?;
    let iv: [u8; 16] = rand::random();

    let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|_| Nip04Error::InvalidSecretKey)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}{IV_SEPARATOR}{}",
        STANDARD.encode(ciphertext),
        STANDARD.encode(iv)
    ))
}

pub fn decrypt(
    secret_key: &[u8; 32],
    sender_pubkey: &str,
    payload: &str,
) -> Result<String, Nip04Error> {
    let (ciphertext, iv) = payload
        .split_once(IV_SEPARATOR)
        .ok_or_else(|| Nip04Error::MalformedPayload("missing iv".to_string()))?;
    let ciphertext = STANDARD
        .decode(ciphertext)
        .map_err(|error| Nip04Error::MalformedPayload(error.to_string()))?;
    let iv = STANDARD
        .decode(iv)
        .map_err(|error| Nip04Error::MalformedPayload(error.to_string()))?;

    let key = shared_key(secret_key, sender_pubkey)?;
    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| Nip04Error::MalformedPayload("iv must be 16 bytes".to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Nip04Error::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| Nip04Error::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nip01::{generate_secret_key, get_public_key_hex};

    #[test]
    fn both_parties_derive_the_same_plaintext() -> Result<(), Box<dyn std::error::Error>> {
        let alice = generate_secret_key();
        let bob = generate_secret_key();
        let alice_pub = get_public_key_hex(&alice)?;
        let bob_pub = get_public_key_hex(&bob)?;

        let payload = encrypt(&alice, &bob_pub, "gm, see https://primal.net")?;
        assert!(payload.contains("?iv="));
        assert_eq!(decrypt(&bob, &alice_pub, &payload)?, "gm, see https://primal.net");
        Ok(())
    }

    #[test]
    fn rejects_payload_without_iv() {
        let secret = generate_secret_key();
        let result = decrypt(&secret, &"1".repeat(64), "abcd");
        assert!(matches!(result, Err(Nip04Error::MalformedPayload(_))));
    }
}
