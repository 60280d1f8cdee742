use {
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde_json::Value,
};

use haggler_common::{DecodedMessage, time::now_ms};

use crate::error::CodecError;

/// Decode one opaque push-item blob into a canonical JSON tree.
///
/// The blob is base64 (tolerating stripped padding) over the gateway's
/// compact binary map/array encoding (MessagePack).
pub fn decode_push_item(blob: &str) -> Result<Value, CodecError> {
    let bytes = BASE64.decode(pad_base64(blob))?;
    let value = rmpv::decode::read_value(&mut bytes.as_slice())
        .map_err(|e| CodecError::Binary(e.to_string()))?;
    Ok(canonicalize(&value))
}

/// Re-pad base64 whose trailing `=` were stripped in transit.
fn pad_base64(blob: &str) -> String {
    let trimmed = blob.trim();
    let mut padded = trimmed.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    padded
}

/// MessagePack value → canonical JSON tree. Map keys are stringified (the
/// gateway's schema uses nested numeric-keyed maps); binary leaves are
/// re-encoded as base64 strings.
fn canonicalize(value: &rmpv::Value) -> Value {
    match value {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(*b),
        rmpv::Value::Integer(i) => {
            if let Some(n) = i.as_i64() {
                Value::from(n)
            } else if let Some(n) = i.as_u64() {
                Value::from(n)
            } else {
                i.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        },
        rmpv::Value::F32(f) => Value::from(f64::from(*f)),
        rmpv::Value::F64(f) => Value::from(*f),
        rmpv::Value::String(s) => Value::String(s.as_str().unwrap_or_default().to_string()),
        rmpv::Value::Binary(b) => Value::String(BASE64.encode(b)),
        rmpv::Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        rmpv::Value::Map(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (key, val) in entries {
                map.insert(scalar_key(key), canonicalize(val));
            }
            Value::Object(map)
        },
        rmpv::Value::Ext(_, data) => Value::String(BASE64.encode(data)),
    }
}

fn scalar_key(key: &rmpv::Value) -> String {
    match key {
        rmpv::Value::String(s) => s.as_str().unwrap_or_default().to_string(),
        other => canonicalize(other)
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| canonicalize(other).to_string()),
    }
}

/// Extract a [`DecodedMessage`] from the canonical tree.
///
/// The gateway's schema nests chat payloads under numeric-keyed maps:
/// sender id/name and notification text live under `1.10`; the conversation
/// id is the substring before `@` in `1.2`; the item id is parsed out of the
/// URL-shaped `1.10.reminderUrl` field.
pub fn extract_message(tree: &Value) -> Result<DecodedMessage, CodecError> {
    let payload = tree
        .get("1")
        .and_then(|v| v.get("10"))
        .ok_or(CodecError::MissingField("1.10"))?;

    let sender_id = payload
        .get("senderUserId")
        .and_then(string_ish)
        .ok_or(CodecError::MissingField("1.10.senderUserId"))?;
    let sender_name = payload
        .get("reminderTitle")
        .and_then(string_ish)
        .unwrap_or_default();
    let text = payload
        .get("reminderContent")
        .and_then(string_ish)
        .ok_or(CodecError::MissingField("1.10.reminderContent"))?;

    let conversation_id = tree
        .get("1")
        .and_then(|v| v.get("2"))
        .and_then(Value::as_str)
        .map(|cid| cid.split('@').next().unwrap_or(cid).to_string())
        .ok_or(CodecError::MissingField("1.2"))?;

    let item_id = payload
        .get("reminderUrl")
        .and_then(Value::as_str)
        .and_then(item_id_from_url)
        .unwrap_or_else(|| format!("auto_{sender_id}_{}", now_ms()));

    Ok(DecodedMessage {
        sender_id,
        sender_name,
        text,
        conversation_id,
        item_id: Some(item_id),
    })
}

/// `itemId=` query parameter of a URL-shaped field. Falls back to a raw
/// substring scan when the field is not a parseable absolute URL.
fn item_id_from_url(raw: &str) -> Option<String> {
    if let Ok(url) = url::Url::parse(raw) {
        if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "itemId") {
            if !id.is_empty() {
                return Some(id.into_owned());
            }
        }
    }
    let rest = raw.split_once("itemId=")?.1;
    let id: String = rest
        .chars()
        .take_while(|c| *c != '&' && *c != '#')
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Gateway fields are loosely typed: ids arrive as strings or numbers.
fn string_ish(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MessagePack-encode a chat payload the way the gateway nests it.
    pub(crate) fn push_blob(
        sender_id: &str,
        sender_name: &str,
        text: &str,
        cid: &str,
        url: Option<&str>,
    ) -> String {
        let mut inner = vec![
            (
                rmpv::Value::from("senderUserId"),
                rmpv::Value::from(sender_id),
            ),
            (
                rmpv::Value::from("reminderTitle"),
                rmpv::Value::from(sender_name),
            ),
            (rmpv::Value::from("reminderContent"), rmpv::Value::from(text)),
        ];
        if let Some(url) = url {
            inner.push((rmpv::Value::from("reminderUrl"), rmpv::Value::from(url)));
        }
        let root = rmpv::Value::Map(vec![(
            rmpv::Value::from("1"),
            rmpv::Value::Map(vec![
                (
                    rmpv::Value::from("2"),
                    rmpv::Value::from(format!("{cid}@{}", crate::envelope::PEER_DOMAIN)),
                ),
                (rmpv::Value::from("10"), rmpv::Value::Map(inner)),
            ]),
        )]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &root).unwrap();
        BASE64.encode(buf)
    }

    #[test]
    fn decodes_a_full_chat_item() {
        let blob = push_blob(
            "7700123",
            "某买家",
            "还能便宜点吗？",
            "chat-1",
            Some("https://market.example.com/item?itemId=555666&spm=a.b"),
        );
        let tree = decode_push_item(&blob).unwrap();
        let msg = extract_message(&tree).unwrap();
        assert_eq!(msg.sender_id, "7700123");
        assert_eq!(msg.sender_name, "某买家");
        assert_eq!(msg.text, "还能便宜点吗？");
        assert_eq!(msg.conversation_id, "chat-1");
        assert_eq!(msg.item_id.as_deref(), Some("555666"));
    }

    #[test]
    fn tolerates_stripped_padding() {
        let blob = push_blob("1", "n", "hi", "c", None);
        let stripped = blob.trim_end_matches('=');
        assert!(decode_push_item(stripped).is_ok());
    }

    #[test]
    fn malformed_base64_is_a_typed_error() {
        assert!(matches!(
            decode_push_item("!!not-base64!!"),
            Err(CodecError::Base64(_))
        ));
    }

    #[test]
    fn truncated_binary_is_a_typed_error() {
        // Valid base64 of bytes that are not a complete MessagePack value.
        let blob = BASE64.encode([0x81u8]);
        assert!(matches!(
            decode_push_item(&blob),
            Err(CodecError::Binary(_))
        ));
    }

    #[test]
    fn numeric_sender_ids_are_stringified() {
        let root = rmpv::Value::Map(vec![(
            rmpv::Value::from("1"),
            rmpv::Value::Map(vec![
                (rmpv::Value::from("2"), rmpv::Value::from("c9@x")),
                (
                    rmpv::Value::from("10"),
                    rmpv::Value::Map(vec![
                        (rmpv::Value::from("senderUserId"), rmpv::Value::from(42u64)),
                        (rmpv::Value::from("reminderContent"), rmpv::Value::from("t")),
                    ]),
                ),
            ]),
        )]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &root).unwrap();
        let tree = decode_push_item(&BASE64.encode(buf)).unwrap();
        let msg = extract_message(&tree).unwrap();
        assert_eq!(msg.sender_id, "42");
        assert_eq!(msg.sender_name, "");
        assert_eq!(msg.conversation_id, "c9");
    }

    #[test]
    fn missing_chat_payload_is_reported() {
        let tree = serde_json::json!({"2": {"foo": 1}});
        assert!(matches!(
            extract_message(&tree),
            Err(CodecError::MissingField("1.10"))
        ));
    }

    #[test]
    fn item_id_falls_back_to_placeholder() {
        let blob = push_blob("88", "n", "hello", "c1", None);
        let tree = decode_push_item(&blob).unwrap();
        let msg = extract_message(&tree).unwrap();
        let item = msg.item_id.unwrap();
        assert!(item.starts_with("auto_88_"), "got {item}");
    }

    #[test]
    fn item_id_scan_handles_relative_urls() {
        assert_eq!(
            item_id_from_url("pages/detail?itemId=123#top").as_deref(),
            Some("123")
        );
        assert_eq!(item_id_from_url("pages/detail?x=1"), None);
    }
}
