use async_trait::async_trait;

use crate::types::{AccountId, OrderStatus};

/// Decides what (if anything) to reply to an incoming buyer message.
///
/// Keyword/AI/default-reply logic lives behind this seam; the connector only
/// hands over the decoded message context and sends whatever comes back.
#[async_trait]
pub trait ReplyResolver: Send + Sync {
    async fn resolve(
        &self,
        account_id: AccountId,
        conversation_id: &str,
        sender_id: &str,
        item_id: Option<&str>,
        text: &str,
    ) -> Option<String>;
}

/// Receives order-status updates recognized from system notifications.
#[async_trait]
pub trait OrderStatusSink: Send + Sync {
    async fn update(&self, order_id: &str, status: OrderStatus, account_id: AccountId);
}
