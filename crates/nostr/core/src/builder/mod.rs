//! Event construction for every kind the client publishes.
//!
//! Module boundaries:
//! - `templates`: pure `(content, kind, tags)` construction, no key material
//! - this module: [`EventBuilder`], which signs templates with the active identity
//!
//! A builder never yields a partially built event. Missing keys, public-key-only
//! sessions, malformed input and crypto failures all surface as [`BuildError`].

mod templates;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::identity::{IdentityProvider, LoginMethod};
use crate::nip01::{Event, EventTemplate, Nip01Error, sign_event};

pub use templates::{Profile, RelayInfo, ZapTarget};

/// Pure template constructors.
pub mod template {
    pub use super::templates::{
        chat_read, contacts, direct_message, first_contact, get_settings, like,
        mark_all_chats_read, metadata, mute_list, post, reply, repost, update_settings, wallet,
        zap_request, zap_wallet,
    };
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no keypair available")]
    NoKeypair,

    #[error("signing is not allowed in public-key-only mode")]
    ReadOnly,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Signing(#[from] Nip01Error),

    #[cfg(feature = "full")]
    #[error(transparent)]
    Encryption(#[from] crate::nip04::Nip04Error),
}

impl BuildError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoKeypair | Self::ReadOnly => {
                "Reconnect your private key (nsec) to publish from this account."
            }
            Self::InvalidInput(_) => "This action could not be completed with the given input.",
            Self::Serialization(_) => "The event could not be encoded.",
            Self::Signing(Nip01Error::Clock(_)) => {
                "The device clock is invalid. Check the date and time settings."
            }
            Self::Signing(_) => "Your key could not sign this event. Reconnect your private key.",
            #[cfg(feature = "full")]
            Self::Encryption(_) => "The message could not be encrypted.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// `d` tag for app-specific (kind 30078) events.
    pub app_name: String,
    /// Relays written into a new account's first contact list.
    pub bootstrap_relays: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            app_name: "Primal".to_string(),
            bootstrap_relays: vec![
                "wss://relay.primal.net".to_string(),
                "wss://relay.damus.io".to_string(),
                "wss://nos.lol".to_string(),
            ],
        }
    }
}

/// Builds and signs events for the active identity.
///
/// The keypair is fetched from the identity service per call and dropped when
/// the call returns.
#[derive(Clone)]
pub struct EventBuilder {
    identity: Arc<dyn IdentityProvider>,
    config: BuilderConfig,
}

struct SigningKeys {
    pubkey: String,
    privkey: String,
}

impl EventBuilder {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_config(identity, BuilderConfig::default())
    }

    pub fn with_config(identity: Arc<dyn IdentityProvider>, config: BuilderConfig) -> Self {
        Self { identity, config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn signing_keys(&self) -> Result<SigningKeys, BuildError> {
        let keypair = self.identity.keypair().ok_or(BuildError::NoKeypair)?;

        let may_sign =
            self.identity.is_new_user() || self.identity.login_method() == LoginMethod::Nsec;
        if !may_sign {
            warn!("refusing to sign: identity is in public-key-only mode");
            return Err(BuildError::ReadOnly);
        }

        let privkey = keypair.privkey.ok_or(BuildError::ReadOnly)?;
        Ok(SigningKeys {
            pubkey: keypair.pubkey,
            privkey,
        })
    }

    /// Sign an arbitrary template with the active identity.
    pub fn sign(&self, template: EventTemplate) -> Result<Event, BuildError> {
        let keys = self.signing_keys()?;
        sign_event(&keys.pubkey, &keys.privkey, &template).map_err(|error| {
            warn!(kind = template.kind, %error, "failed to sign event");
            BuildError::Signing(error)
        })
    }

    pub fn post(&self, content: &str, mentioned_pubkeys: &[String]) -> Result<Event, BuildError> {
        self.sign(templates::post(content, mentioned_pubkeys)?)
    }

    pub fn reply(
        &self,
        content: &str,
        parent_id: &str,
        parent_pubkey: &str,
        mentioned_pubkeys: &[String],
    ) -> Result<Event, BuildError> {
        self.sign(templates::reply(
            content,
            parent_id,
            parent_pubkey,
            mentioned_pubkeys,
        )?)
    }

    pub fn repost(&self, original: &Event) -> Result<Event, BuildError> {
        self.sign(templates::repost(original)?)
    }

    pub fn like(&self, post_id: &str, post_pubkey: &str) -> Result<Event, BuildError> {
        self.sign(templates::like(post_id, post_pubkey)?)
    }

    pub fn contacts(
        &self,
        followed: &BTreeSet<String>,
        relays: &BTreeMap<String, RelayInfo>,
    ) -> Result<Event, BuildError> {
        self.sign(templates::contacts(followed, relays)?)
    }

    pub fn first_contact(&self) -> Result<Event, BuildError> {
        let keys = self.signing_keys()?;
        self.sign(templates::first_contact(
            &keys.pubkey,
            &self.config.bootstrap_relays,
        )?)
    }

    pub fn metadata(&self, profile: &Profile) -> Result<Event, BuildError> {
        self.sign(templates::metadata(profile)?)
    }

    pub fn get_settings(&self) -> Result<Event, BuildError> {
        self.sign(templates::get_settings(&self.config.app_name)?)
    }

    pub fn update_settings<T: Serialize>(&self, settings: &T) -> Result<Event, BuildError> {
        self.sign(templates::update_settings(&self.config.app_name, settings)?)
    }

    pub fn zap(
        &self,
        comment: &str,
        target: &ZapTarget,
        relays: &[String],
    ) -> Result<Event, BuildError> {
        self.sign(templates::zap_request(comment, target, relays)?)
    }

    /// Zap request for the in-app wallet, tagged with the user's relays.
    pub fn zap_wallet(
        &self,
        note: &str,
        sats: u64,
        post_id: &str,
        post_pubkey: &str,
    ) -> Result<Event, BuildError> {
        let relays = self.identity.user_relays();
        self.sign(templates::zap_wallet(
            note,
            sats,
            post_id,
            post_pubkey,
            &relays,
        )?)
    }

    pub fn mute_list(&self, muted_pubkeys: &[String]) -> Result<Event, BuildError> {
        self.sign(templates::mute_list(muted_pubkeys)?)
    }

    /// NIP-04 encrypted direct message.
    #[cfg(feature = "full")]
    pub fn message(&self, content: &str, recipient_pubkey: &str) -> Result<Event, BuildError> {
        let keys = self.signing_keys()?;
        let secret_key = crate::nip01::decode_secret_key(&keys.privkey)?;
        let ciphertext = crate::nip04::encrypt(&secret_key, recipient_pubkey, content)?;
        self.sign(templates::direct_message(&ciphertext, recipient_pubkey)?)
    }

    pub fn chat_read(&self, pubkey: &str) -> Result<Event, BuildError> {
        self.sign(templates::chat_read(&self.config.app_name, pubkey)?)
    }

    pub fn mark_all_chats_read(&self) -> Result<Event, BuildError> {
        self.sign(templates::mark_all_chats_read(&self.config.app_name)?)
    }

    pub fn wallet(&self, content: &str) -> Result<Event, BuildError> {
        self.sign(templates::wallet(content)?)
    }
}
