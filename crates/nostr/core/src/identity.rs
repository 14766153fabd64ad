use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::keys::Keypair;

pub const ENV_IDENTITY_KEY_PATH: &str = "NOSTR_IDENTITY_KEY_PATH";

/// How the active user signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    /// Private key available; signing allowed.
    Nsec,
    /// Public key only; every signing operation is refused.
    Npub,
}

/// The identity service injected into builders and feeds.
pub trait IdentityProvider: Send + Sync {
    /// The keypair to sign with, if any.
    fn keypair(&self) -> Option<Keypair>;

    fn login_method(&self) -> LoginMethod;

    /// A freshly onboarded user may sign before a login method is stored.
    fn is_new_user(&self) -> bool {
        false
    }

    /// Hex pubkey used for `user_pubkey` in cache queries.
    fn user_pubkey(&self) -> String {
        self.keypair().map(|keypair| keypair.pubkey).unwrap_or_default()
    }

    /// Relay URLs from the user's contact list.
    fn user_relays(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory identity.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    keypair: Option<Keypair>,
    new_user: bool,
    relays: Vec<String>,
}

impl StaticIdentity {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Some(keypair),
            new_user: false,
            relays: Vec::new(),
        }
    }

    /// No keypair at all; every build fails.
    pub fn anonymous() -> Self {
        Self {
            keypair: None,
            new_user: false,
            relays: Vec::new(),
        }
    }

    pub fn with_new_user(mut self, new_user: bool) -> Self {
        self.new_user = new_user;
        self
    }

    pub fn with_relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn keypair(&self) -> Option<Keypair> {
        self.keypair.clone()
    }

    fn login_method(&self) -> LoginMethod {
        match &self.keypair {
            Some(keypair) if !keypair.is_read_only() => LoginMethod::Nsec,
            _ => LoginMethod::Npub,
        }
    }

    fn is_new_user(&self) -> bool {
        self.new_user
    }

    fn user_relays(&self) -> Vec<String> {
        self.relays.clone()
    }
}

pub fn identity_key_path() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(ENV_IDENTITY_KEY_PATH) {
        let trimmed = override_path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".primal").join("identity.key"))
}

pub fn load_identity() -> Result<StaticIdentity> {
    load_identity_from_path(identity_key_path()?)
}

/// Reads an `nsec`, `npub` or hex secret key from a file.
pub fn load_identity_from_path(path: impl AsRef<Path>) -> Result<StaticIdentity> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read identity key file {}", path.display()))?;
    let key = contents.trim();

    if key.is_empty() {
        return Err(anyhow::anyhow!(
            "identity key file is empty: {}",
            path.display()
        ));
    }

    let keypair = Keypair::parse(key)
        .with_context(|| format!("failed to parse identity key in {}", path.display()))?;
    Ok(StaticIdentity::new(keypair))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NSEC: &str = "nsec10allq0gjx7fddtzef0ax00mdps9t2kmtrldkyjfs8l5xruwvh2dq0lhhkp";
    const NPUB: &str = "npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu";

    #[test]
    fn loads_nsec_identity_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.key");
        std::fs::write(&path, format!("{NSEC}\n"))?;

        let identity = load_identity_from_path(&path)?;
        assert_eq!(identity.login_method(), LoginMethod::Nsec);
        assert_eq!(
            identity.user_pubkey(),
            "17162c921dc4d2518f9a101db33695df1afb56ab82f5ff3e5da6eec3ca5cd917"
        );
        Ok(())
    }

    #[test]
    fn npub_identity_is_read_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.key");
        std::fs::write(&path, NPUB)?;

        let identity = load_identity_from_path(&path)?;
        assert_eq!(identity.login_method(), LoginMethod::Npub);
        Ok(())
    }

    #[test]
    fn empty_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.key");
        std::fs::write(&path, "  \n")?;

        let error = match load_identity_from_path(&path) {
            Ok(_) => return Err(anyhow::anyhow!("expected empty-file error")),
            Err(error) => error,
        };
        assert!(error.to_string().contains("empty"));
        Ok(())
    }
}
