use serde::{Deserialize, Serialize};

/// Numeric seller account identity, derived from the credential's `unb` field.
pub type AccountId = u64;

/// One buyer-facing message decoded from a gateway push item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// Numeric user id of the sender.
    pub sender_id: String,
    /// Display name of the sender.
    pub sender_name: String,
    /// Free-text notification/chat content.
    pub text: String,
    /// Conversation id (the part before `@` in the gateway's cid field).
    pub conversation_id: String,
    /// Referenced listing id. Heuristic: parsed from the embedded URL when
    /// present, otherwise a synthesized placeholder unique per sender and
    /// timestamp.
    pub item_id: Option<String>,
}

/// A reply headed back out through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub conversation_id: String,
    pub recipient_id: String,
    pub text: String,
}

/// Order lifecycle states recognized from system notification text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Shipped,
    Completed,
    Refunding,
    Closed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Refunding => "refunding",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_serde_uses_snake_case() {
        let s = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(s, "\"pending_payment\"");
        assert_eq!(OrderStatus::Completed.to_string(), "completed");
    }
}
