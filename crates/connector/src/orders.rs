use {
    regex::Regex,
    serde_json::Value,
    tracing::debug,
};

use haggler_common::OrderStatus;

/// A recognized change in an order's lifecycle, ready for the status sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
}

/// Exact notification phrases the marketplace emits for order transitions.
const PHRASE_TABLE: &[(&str, OrderStatus)] = &[
    ("等待买家付款", OrderStatus::PendingPayment),
    ("[买家已付款，等待卖家发货]", OrderStatus::Paid),
    ("[你已发货]", OrderStatus::Shipped),
    ("[买家确认收货，交易成功]", OrderStatus::Completed),
    ("[买家申请退款，待处理]", OrderStatus::Refunding),
    ("退款成功", OrderStatus::Refunding),
    ("交易关闭", OrderStatus::Closed),
];

/// Fallback patterns scanned over the serialized message when the card
/// payload does not yield an order id directly.
const ID_PATTERNS: &[&str] = &[
    r"orderId[=:](\d{10,})",
    r"order_detail\?id=(\d{10,})",
    r#""id"\s*:\s*"?(\d{10,})"#,
    r"bizOrderId[=:](\d{10,})",
];

/// Recognizes system reminder text and resolves the order id it refers to.
///
/// Status comes from an exact phrase match; the id comes from the dynamic
/// card embedded in the push payload, falling back to a regex scan of the
/// whole serialized message. Either lookup failing means the update is
/// skipped, never an error.
pub struct OrderStatusExtractor {
    id_patterns: Vec<Regex>,
}

impl Default for OrderStatusExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStatusExtractor {
    pub fn new() -> Self {
        let id_patterns = ID_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self { id_patterns }
    }

    /// Match `text` against the phrase table and, on a hit, dig the order id
    /// out of the decoded push payload. Returns `None` when the text is not
    /// an order notification or no id can be found.
    pub fn extract(&self, text: &str, payload: &Value) -> Option<OrderUpdate> {
        let status = PHRASE_TABLE
            .iter()
            .find(|(phrase, _)| text.contains(phrase))
            .map(|(_, status)| *status)?;

        let order_id = match self.order_id_from_card(payload).or_else(|| self.order_id_from_scan(payload)) {
            Some(id) => id,
            None => {
                debug!(status = %status, "order notification without a resolvable order id");
                return None;
            },
        };

        Some(OrderUpdate { order_id, status })
    }

    /// The dynamic-card branch: the payload nests a JSON document as a
    /// string under `1.6.3.5`; inside it, the card's button target URL
    /// carries `orderId=<digits>`.
    fn order_id_from_card(&self, payload: &Value) -> Option<String> {
        let raw = payload
            .get("1")?
            .get("6")?
            .get("3")?
            .get("5")?
            .as_str()?;
        let card: Value = serde_json::from_str(raw).ok()?;
        let target_url = card
            .get("dxCard")?
            .get("item")?
            .get("main")?
            .get("exContent")?
            .get("button")?
            .get("targetUrl")?
            .as_str()?;
        digits_after(target_url, "orderId=")
    }

    fn order_id_from_scan(&self, payload: &Value) -> Option<String> {
        let serialized = payload.to_string();
        for pattern in &self.id_patterns {
            if let Some(caps) = pattern.captures(&serialized) {
                if let Some(m) = caps.get(1) {
                    return Some(m.as_str().to_owned());
                }
            }
        }
        None
    }
}

fn digits_after(haystack: &str, marker: &str) -> Option<String> {
    let start = haystack.find(marker)? + marker.len();
    let digits: String = haystack[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() { None } else { Some(digits) }
}
