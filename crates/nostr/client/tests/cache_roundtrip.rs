use futures_util::{SinkExt, StreamExt};
use nostr::{Event, EventTemplate, finalize_event, generate_secret_key};
use nostr_client::{CacheClient, CacheConfig, ClientError, ConnectionState, RelayConfig};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

type TestResult = Result<(), Box<dyn std::error::Error>>;
type OkRelay = (String, JoinHandle<()>, mpsc::UnboundedReceiver<Value>);

fn text_of(message: Message) -> Option<Value> {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
        _ => None,
    }
}

#[tokio::test]
async fn cache_request_collects_records_until_eose() -> TestResult {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (frames_tx, frames_rx) = oneshot::channel::<Vec<Value>>();

    let server = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        let mut frames = Vec::new();

        let Some(Ok(request)) = ws.next().await else {
            return;
        };
        let Some(request) = text_of(request) else {
            return;
        };
        let subscription_id = request[1].as_str().unwrap_or_default().to_string();
        frames.push(request);

        for record in [
            json!({"kind": 1, "id": "p1", "pubkey": "a", "created_at": 20, "tags": [], "content": "one"}),
            json!({"kind": 10000113, "content": "{\"since\":10,\"until\":20,\"order_by\":\"created_at\"}"}),
        ] {
            let frame = json!(["EVENT", subscription_id, record]).to_string();
            if ws.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        let eose = json!(["EOSE", subscription_id]).to_string();
        if ws.send(Message::Text(eose.into())).await.is_err() {
            return;
        }

        if let Some(Ok(close)) = ws.next().await {
            if let Some(close) = text_of(close) {
                frames.push(close);
            }
        }
        let _ = frames_tx.send(frames);
    });

    let client = CacheClient::new(&format!("ws://{addr}"))?;
    client.connect().await?;
    client.wait_connected().await?;
    assert_eq!(client.relay().state(), ConnectionState::Connected);

    let records = client
        .request("feed_directive", json!({"directive": "latest", "limit": 40}))
        .await?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], "p1");
    assert_eq!(records[1]["kind"], 10000113);

    let frames = frames_rx.await?;
    assert_eq!(frames[0][0], "REQ");
    assert_eq!(
        frames[0][2],
        json!({"cache": ["feed_directive", {"directive": "latest", "limit": 40}]})
    );
    assert_eq!(frames[1], json!(["CLOSE", frames[0][1].clone()]));

    server.abort();
    Ok(())
}

#[tokio::test]
async fn cache_request_times_out_without_eose() -> TestResult {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        // Swallow everything and never answer.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = CacheConfig {
        response_timeout: Duration::from_millis(200),
        ..CacheConfig::default()
    };
    let client = CacheClient::with_config(&format!("ws://{addr}"), config)?;
    client.connect().await?;

    let result = client.request("thread_view", json!({"event_id": "e"})).await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));

    server.abort();
    Ok(())
}

fn signed_note(content: &str) -> Result<Event, Box<dyn std::error::Error>> {
    let template = EventTemplate {
        created_at: 1_700_000_000,
        kind: 1,
        tags: vec![],
        content: content.to_string(),
    };
    Ok(finalize_event(&template, &generate_secret_key())?)
}

/// Relay that answers every `EVENT` with `["OK", id, accepted, message]`,
/// preceded by a notice and a record for a subscription nobody holds.
async fn spawn_ok_relay(accepted: bool, message: &'static str) -> std::io::Result<OkRelay> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        while let Some(Ok(message_in)) = ws.next().await {
            let Some(frame) = text_of(message_in) else {
                continue;
            };
            let event_id = frame[1]["id"].as_str().unwrap_or_default().to_string();
            let _ = frames_tx.send(frame);
            let replies = [
                json!(["NOTICE", "slow down"]),
                json!(["EVENT", "closed-sub", {"kind": 1}]),
                json!(["OK", event_id, accepted, message]),
            ];
            for reply in replies {
                if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    });

    Ok((format!("ws://{addr}"), server, frames_rx))
}

#[tokio::test]
async fn publish_reports_relay_acceptance() -> TestResult {
    let (url, server, mut frames) = spawn_ok_relay(true, "").await?;
    let event = signed_note("see https://primal.net/a")?;

    let client = CacheClient::new(&url)?;
    client.connect().await?;
    let confirmation = client.publish(&event).await?;
    assert!(confirmation.accepted);
    assert_eq!(confirmation.event_id, event.id);

    let frame = frames.recv().await.ok_or("no EVENT frame")?;
    assert_eq!(frame[0], "EVENT");
    assert_eq!(frame[1]["id"], event.id.as_str());
    assert_eq!(frame[1]["content"], "see https://primal.net/a");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn publish_reports_relay_rejection_for_every_event() -> TestResult {
    let (url, server, _frames) = spawn_ok_relay(false, "blocked: rejected").await?;
    let client = CacheClient::new(&url)?;
    client.connect().await?;

    for n in 0..20 {
        let event = signed_note(&format!("note {n}"))?;
        let confirmation = client.publish(&event).await?;
        assert!(!confirmation.accepted);
        assert_eq!(confirmation.event_id, event.id);
        assert_eq!(confirmation.message, "blocked: rejected");
    }
    assert_eq!(client.relay().state(), ConnectionState::Connected);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn publish_times_out_without_ok() -> TestResult {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = CacheConfig {
        relay_config: RelayConfig {
            publish_timeout: Duration::from_millis(200),
            ..RelayConfig::default()
        },
        ..CacheConfig::default()
    };
    let client = CacheClient::with_config(&format!("ws://{addr}"), config)?;
    client.connect().await?;

    let result = client.publish(&signed_note("gm")?).await;
    assert!(matches!(result, Err(ClientError::Timeout(_))));

    server.abort();
    Ok(())
}

#[tokio::test]
async fn small_channel_still_receives_every_record() -> TestResult {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        let Some(Ok(request)) = ws.next().await else {
            return;
        };
        let Some(request) = text_of(request) else {
            return;
        };
        let subscription_id = request[1].clone();
        let mut frames: Vec<Value> = (0..8)
            .map(|n| json!(["EVENT", subscription_id, {"kind": 1, "id": format!("p{n}")}]))
            .collect();
        frames.push(json!(["EOSE", subscription_id]));
        for frame in frames {
            if ws.send(Message::Text(frame.to_string().into())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = CacheConfig {
        channel_capacity: 1,
        ..CacheConfig::default()
    };
    let client = CacheClient::with_config(&format!("ws://{addr}"), config)?;
    client.connect().await?;

    let records = client.request("feed_directive", json!({"limit": 8})).await?;
    let ids: Vec<&str> = records.iter().filter_map(|record| record["id"].as_str()).collect();
    assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"]);

    server.abort();
    Ok(())
}
