use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::BuildError;
use crate::kinds::{
    KIND_APP_DATA, KIND_CONTACTS, KIND_ENCRYPTED_DIRECT_MESSAGE, KIND_METADATA, KIND_MUTE_LIST,
    KIND_REACTION, KIND_REPOST, KIND_TEXT_NOTE, KIND_WALLET, KIND_ZAP_REQUEST,
};
use crate::nip01::{Event, EventTemplate};
use crate::tag_parsing::tag;

/// Relay capabilities stored in the kind-3 content map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfo {
    pub read: bool,
    pub write: bool,
}

impl RelayInfo {
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };
}

/// What a zap request pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZapTarget {
    Profile(String),
    Note {
        event_id: String,
        author_pubkey: String,
    },
}

/// Kind-0 profile metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lud06: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lud16: Option<String>,
}

fn require(value: &str, field: &str) -> Result<(), BuildError> {
    if value.trim().is_empty() {
        return Err(BuildError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

fn mention_tags(mentioned_pubkeys: &[String]) -> Result<Vec<Vec<String>>, BuildError> {
    mentioned_pubkeys
        .iter()
        .map(|pubkey| {
            require(pubkey, "mentioned pubkey")?;
            Ok(tag(["p", pubkey.as_str(), "", "mention"]))
        })
        .collect()
}

/// Kind 1 note with one mention tag per mentioned pubkey.
pub fn post(content: &str, mentioned_pubkeys: &[String]) -> Result<EventTemplate, BuildError> {
    Ok(EventTemplate::now(
        KIND_TEXT_NOTE,
        mention_tags(mentioned_pubkeys)?,
        content,
    )?)
}

/// Kind 1 reply: `e` reply marker, parent author, then mentions.
pub fn reply(
    content: &str,
    parent_id: &str,
    parent_pubkey: &str,
    mentioned_pubkeys: &[String],
) -> Result<EventTemplate, BuildError> {
    require(parent_id, "parent id")?;
    require(parent_pubkey, "parent pubkey")?;

    let mut tags = vec![
        tag(["e", parent_id, "", "reply"]),
        tag(["p", parent_pubkey]),
    ];
    tags.extend(mention_tags(mentioned_pubkeys)?);
    Ok(EventTemplate::now(KIND_TEXT_NOTE, tags, content)?)
}

/// Kind 6 repost embedding the original event as JSON content.
pub fn repost(original: &Event) -> Result<EventTemplate, BuildError> {
    require(&original.id, "reposted event id")?;
    let content = serde_json::to_string(original)?;
    Ok(EventTemplate::now(
        KIND_REPOST,
        vec![
            tag(["e", original.id.as_str()]),
            tag(["p", original.pubkey.as_str()]),
        ],
        content,
    )?)
}

/// Kind 7 `+` reaction.
pub fn like(post_id: &str, post_pubkey: &str) -> Result<EventTemplate, BuildError> {
    require(post_id, "post id")?;
    require(post_pubkey, "post pubkey")?;
    Ok(EventTemplate::now(
        KIND_REACTION,
        vec![tag(["e", post_id]), tag(["p", post_pubkey])],
        "+",
    )?)
}

/// Kind 3 follow list; content maps relay URL to capabilities.
pub fn contacts(
    followed: &BTreeSet<String>,
    relays: &BTreeMap<String, RelayInfo>,
) -> Result<EventTemplate, BuildError> {
    let content = serde_json::to_string(relays)?;
    let tags = followed
        .iter()
        .map(|pubkey| tag(["p", pubkey.as_str()]))
        .collect();
    Ok(EventTemplate::now(KIND_CONTACTS, tags, content)?)
}

/// Initial contact list for a new account: follows itself, reads and writes
/// every bootstrap relay.
pub fn first_contact(
    user_pubkey: &str,
    bootstrap_relays: &[String],
) -> Result<EventTemplate, BuildError> {
    require(user_pubkey, "user pubkey")?;
    let relays: BTreeMap<String, RelayInfo> = bootstrap_relays
        .iter()
        .map(|relay| (relay.clone(), RelayInfo::READ_WRITE))
        .collect();
    contacts(&BTreeSet::from([user_pubkey.to_string()]), &relays)
}

pub fn metadata(profile: &Profile) -> Result<EventTemplate, BuildError> {
    Ok(EventTemplate::now(
        KIND_METADATA,
        Vec::new(),
        serde_json::to_string(profile)?,
    )?)
}

/// Kind 30078 request for the synced app settings.
pub fn get_settings(app_name: &str) -> Result<EventTemplate, BuildError> {
    let content = serde_json::to_string(&json!({ "description": "Sync app settings" }))?;
    Ok(EventTemplate::now(
        KIND_APP_DATA,
        vec![tag(["d", app_name])],
        content,
    )?)
}

pub fn update_settings<T: Serialize>(
    app_name: &str,
    settings: &T,
) -> Result<EventTemplate, BuildError> {
    Ok(EventTemplate::now(
        KIND_APP_DATA,
        vec![tag(["d", app_name])],
        serde_json::to_string(settings)?,
    )?)
}

fn zap_tags(target: &ZapTarget, relays: &[String]) -> Result<Vec<Vec<String>>, BuildError> {
    let mut tags = match target {
        ZapTarget::Profile(pubkey) => {
            require(pubkey, "zap recipient")?;
            vec![tag(["p", pubkey.as_str()])]
        }
        ZapTarget::Note {
            event_id,
            author_pubkey,
        } => {
            require(event_id, "zapped event id")?;
            require(author_pubkey, "zapped author")?;
            vec![
                tag(["e", event_id.as_str()]),
                tag(["p", author_pubkey.as_str()]),
            ]
        }
    };

    let mut relays_tag = vec!["relays".to_string()];
    relays_tag.extend(relays.iter().cloned());
    tags.push(relays_tag);
    Ok(tags)
}

/// Kind 9734 public zap request.
pub fn zap_request(
    comment: &str,
    target: &ZapTarget,
    relays: &[String],
) -> Result<EventTemplate, BuildError> {
    Ok(EventTemplate::now(
        KIND_ZAP_REQUEST,
        zap_tags(target, relays)?,
        comment,
    )?)
}

/// Kind 9734 zap request paid from the in-app wallet. Amount is in millisats.
pub fn zap_wallet(
    note: &str,
    sats: u64,
    post_id: &str,
    post_pubkey: &str,
    relays: &[String],
) -> Result<EventTemplate, BuildError> {
    require(post_id, "post id")?;
    require(post_pubkey, "post pubkey")?;

    let mut tags = vec![
        tag(["p", post_pubkey]),
        tag(["e", post_id]),
        vec!["amount".to_string(), format!("{sats}000")],
    ];
    if !relays.is_empty() {
        let mut relays_tag = vec!["relays".to_string()];
        relays_tag.extend(relays.iter().cloned());
        tags.push(relays_tag);
    }
    Ok(EventTemplate::now(KIND_ZAP_REQUEST, tags, note)?)
}

/// Kind 10000 mute list, one `p` tag per muted pubkey.
pub fn mute_list(muted_pubkeys: &[String]) -> Result<EventTemplate, BuildError> {
    let tags = muted_pubkeys
        .iter()
        .map(|pubkey| tag(["p", pubkey.as_str()]))
        .collect();
    Ok(EventTemplate::now(KIND_MUTE_LIST, tags, "")?)
}

/// Kind 4 direct message carrying already-encrypted content.
pub fn direct_message(
    ciphertext: &str,
    recipient_pubkey: &str,
) -> Result<EventTemplate, BuildError> {
    require(recipient_pubkey, "recipient pubkey")?;
    Ok(EventTemplate::now(
        KIND_ENCRYPTED_DIRECT_MESSAGE,
        vec![tag(["p", recipient_pubkey])],
        ciphertext,
    )?)
}

/// Kind 30078 marker resetting the unread count of one conversation.
pub fn chat_read(app_name: &str, pubkey: &str) -> Result<EventTemplate, BuildError> {
    require(pubkey, "chat pubkey")?;
    let content = serde_json::to_string(&json!({
        "description": format!("reset messages from '{pubkey}'")
    }))?;
    Ok(EventTemplate::now(
        KIND_APP_DATA,
        vec![tag(["d", app_name])],
        content,
    )?)
}

pub fn mark_all_chats_read(app_name: &str) -> Result<EventTemplate, BuildError> {
    let content = serde_json::to_string(&json!({ "description": "mark all messages as read" }))?;
    Ok(EventTemplate::now(
        KIND_APP_DATA,
        vec![tag(["d", app_name])],
        content,
    )?)
}

/// Wallet command envelope; content is the wallet request JSON.
pub fn wallet(content: &str) -> Result<EventTemplate, BuildError> {
    Ok(EventTemplate::now(KIND_WALLET, Vec::new(), content)?)
}
