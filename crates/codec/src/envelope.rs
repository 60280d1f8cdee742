use {
    rand::Rng,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value, json},
};

use haggler_common::time::now_ms;

/// Registration handshake endpoint.
pub const ENDPOINT_REGISTER: &str = "/reg";
/// Acknowledgement-sync endpoint, sent after the settle delay.
pub const ENDPOINT_ACK_SYNC: &str = "/r/SyncStatus/ackDiff";
/// Keep-alive endpoint.
pub const ENDPOINT_HEARTBEAT: &str = "/!";
/// Outbound chat-message endpoint.
pub const ENDPOINT_SEND: &str = "/r/MessageSend/sendByReceiverScope";

/// Domain suffix the gateway appends to user and conversation ids.
pub const PEER_DOMAIN: &str = "goofish";

/// Every frame on the wire: a logical endpoint name (requests) or a response
/// code, a header map, and an endpoint-specific body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lwp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl GatewayFrame {
    pub(crate) fn request(endpoint: &str) -> Self {
        let mut headers = Map::new();
        headers.insert("mid".into(), Value::String(new_mid()));
        Self {
            lwp: Some(endpoint.to_string()),
            code: None,
            headers,
            body: Value::Null,
        }
    }

    /// `/reg` control frame with identity/signing headers.
    pub fn register(app_key: &str, access_token: &str, device_id: &str, user_agent: &str) -> Self {
        let mut frame = Self::request(ENDPOINT_REGISTER);
        frame.headers.insert(
            "cache-header".into(),
            Value::String("app-key token ua wv".into()),
        );
        frame
            .headers
            .insert("app-key".into(), Value::String(app_key.into()));
        frame
            .headers
            .insert("token".into(), Value::String(access_token.into()));
        frame
            .headers
            .insert("ua".into(), Value::String(user_agent.into()));
        frame.headers.insert("dt".into(), Value::String("j".into()));
        frame
            .headers
            .insert("wv".into(), Value::String("im:3,au:3,sy:6".into()));
        frame
            .headers
            .insert("sync".into(), Value::String("0,0;0;0;".into()));
        frame
            .headers
            .insert("did".into(), Value::String(device_id.into()));
        frame
    }

    /// Acknowledgement-sync frame. The `pts` marker is derived from the
    /// current timestamp, so successive handshakes carry increasing values.
    pub fn ack_sync() -> Self {
        let now = now_ms();
        let mut frame = Self::request(ENDPOINT_ACK_SYNC);
        frame.body = json!([{
            "pipeline": "sync",
            "tooLong2Tag": "PC",
            "channel": "sync",
            "topic": "sync",
            "highPts": 0,
            "pts": now * 1000,
            "seq": 0,
            "timestamp": now,
        }]);
        frame
    }

    /// Minimal keep-alive frame.
    pub fn heartbeat() -> Self {
        Self::request(ENDPOINT_HEARTBEAT)
    }

    /// Acknowledge an inbound frame that carries an `mid` header (the
    /// gateway redelivers unacked pushes). Returns `None` when there is
    /// nothing to acknowledge.
    pub fn ack_of(inbound: &Self) -> Option<Self> {
        let mid = inbound.headers.get("mid")?.clone();
        let mut headers = Map::new();
        headers.insert("mid".into(), mid);
        if let Some(sid) = inbound.headers.get("sid") {
            headers.insert("sid".into(), sid.clone());
        }
        Some(Self {
            lwp: None,
            code: Some(200),
            headers,
            body: Value::Null,
        })
    }

    /// True for inbound frames carrying a sync push package.
    pub fn is_sync_push(&self) -> bool {
        self.body
            .get("syncPushPackage")
            .and_then(|p| p.get("data"))
            .and_then(Value::as_array)
            .is_some()
    }

    /// Opaque push-item blobs nested in a sync push frame.
    pub fn push_items(&self) -> Vec<&str> {
        self.body
            .get("syncPushPackage")
            .and_then(|p| p.get("data"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("data").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.lwp.as_deref()
    }
}

/// Wire message id: timestamp, a random suffix, and the trailing marker the
/// gateway expects.
pub fn new_mid() -> String {
    let suffix = rand::rng().random_range(0..1000);
    format!("{}{suffix} 0", now_ms())
}

/// Per-message unique id for outbound chat bodies.
pub fn new_message_uuid() -> String {
    let suffix = rand::rng().random_range(0..1000);
    format!("-{}{suffix}", now_ms())
}
