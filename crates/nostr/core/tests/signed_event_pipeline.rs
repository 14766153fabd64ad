//! Integration tests: identity file to builder to sealed, verifiable event.

use nostr::{
    BuildError, Event, EventBuilder, EventTemplate, IdentityProvider, Keypair, LoginMethod,
    get_event_hash, load_identity_from_path, sign_event, verify_event,
};
use std::io::Write;
use std::sync::Arc;

const NSEC: &str = "nsec10allq0gjx7fddtzef0ax00mdps9t2kmtrldkyjfs8l5xruwvh2dq0lhhkp";
const NPUB: &str = "npub1zutzeysacnf9rru6zqwmxd54mud0k44tst6l70ja5mhv8jjumytsd2x7nu";
const PUBKEY_HEX: &str = "17162c921dc4d2518f9a101db33695df1afb56ab82f5ff3e5da6eec3ca5cd917";

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn key_file(contents: &str) -> Result<tempfile::NamedTempFile, std::io::Error> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "{contents}")?;
    Ok(file)
}

#[test]
fn nsec_identity_signs_reply_that_survives_wire_round_trip() -> TestResult {
    let file = key_file(NSEC)?;
    let identity = load_identity_from_path(file.path())?;
    assert_eq!(identity.login_method(), LoginMethod::Nsec);

    let builder = EventBuilder::new(Arc::new(identity));
    let reply = builder.reply("see https://primal.net/e/abc", "abc", "def", &[])?;
    assert_eq!(reply.pubkey, PUBKEY_HEX);
    assert_eq!(
        reply.tags,
        vec![
            vec!["e".to_string(), "abc".to_string(), String::new(), "reply".to_string()],
            vec!["p".to_string(), "def".to_string()],
        ]
    );

    let wire = reply.to_json_string()?;
    assert!(wire.contains("https://primal.net/e/abc"));
    let decoded: Event = serde_json::from_str(&wire)?;
    assert_eq!(decoded, reply);
    assert_eq!(get_event_hash(&decoded.unsigned())?, reply.id);
    assert!(verify_event(&decoded)?);
    Ok(())
}

#[test]
fn flipping_any_signed_field_invalidates_the_event() -> TestResult {
    let keypair = Keypair::parse(NSEC)?;
    let privkey = keypair.privkey.clone().ok_or("missing private key")?;
    let template = EventTemplate {
        created_at: 1_700_000_000,
        kind: 1,
        tags: vec![vec!["t".to_string(), "nostr".to_string()]],
        content: "gm".to_string(),
    };
    let event = sign_event(&keypair.pubkey, &privkey, &template)?;

    let mut variants = Vec::new();
    let mut content = event.clone();
    content.content = "gn".to_string();
    variants.push(content);
    let mut tags = event.clone();
    tags.tags[0][1] = "nostR".to_string();
    variants.push(tags);
    let mut created_at = event.clone();
    created_at.created_at ^= 1;
    variants.push(created_at);
    let mut kind = event.clone();
    kind.kind ^= 1;
    variants.push(kind);

    for variant in variants {
        assert_ne!(get_event_hash(&variant.unsigned())?, event.id);
        assert!(!verify_event(&variant)?);
    }
    Ok(())
}

#[test]
fn npub_identity_cannot_sign() -> TestResult {
    let file = key_file(NPUB)?;
    let identity = load_identity_from_path(file.path())?;
    assert_eq!(identity.user_pubkey(), PUBKEY_HEX);

    let builder = EventBuilder::new(Arc::new(identity));
    let result = builder.like("abc", "def");
    assert!(matches!(result, Err(BuildError::ReadOnly)));
    if let Err(error) = result {
        assert!(!error.user_message().is_empty());
    }
    Ok(())
}
