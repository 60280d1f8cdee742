use {
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde_json::json,
};

use haggler_common::OutboundReply;

use crate::{
    envelope::{ENDPOINT_SEND, GatewayFrame, PEER_DOMAIN, new_message_uuid},
    error::CodecError,
};

/// Build the outbound frame for a resolved reply.
///
/// The text rides inside a base64-encoded content object; the body is
/// addressed with a per-message unique id plus the conversation id and
/// wrapped with an explicit receivers list: the peer and the account's own
/// identity.
pub fn encode_reply(reply: &OutboundReply, own_id: &str) -> Result<GatewayFrame, CodecError> {
    let content = json!({
        "contentType": 1,
        "text": { "text": reply.text },
    });
    let encoded = BASE64.encode(serde_json::to_vec(&content)?);

    let mut frame = GatewayFrame::request(ENDPOINT_SEND);
    frame.body = json!([
        {
            "uuid": new_message_uuid(),
            "cid": format!("{}@{PEER_DOMAIN}", reply.conversation_id),
            "conversationType": 1,
            "content": {
                "contentType": 101,
                "custom": { "type": 1, "data": encoded },
            },
            "redPointPolicy": 0,
            "extension": { "extJson": "{}" },
            "ctx": { "appVersion": "1.0", "platform": "web" },
            "mtags": {},
            "msgReadStatusSetting": 1,
        },
        {
            "actualReceivers": [
                format!("{}@{PEER_DOMAIN}", reply.recipient_id),
                format!("{own_id}@{PEER_DOMAIN}"),
            ],
        },
    ]);
    Ok(frame)
}
