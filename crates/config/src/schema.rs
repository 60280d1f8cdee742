use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HagglerConfig {
    pub gateway: GatewaySettings,
    pub accounts: Vec<AccountEntry>,
}

/// Gateway endpoints and protocol timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// WebSocket URL of the push gateway.
    pub ws_url: String,
    /// Token side-channel endpoint.
    pub token_url: String,
    /// App key mixed into side-channel request signatures.
    pub app_key: String,
    /// App key identifying the messaging app in the `/reg` handshake and
    /// the token payload.
    pub im_app_key: String,
    /// `accountSite` parameter of the side-channel call.
    pub account_site: String,
    /// User agent sent in the `/reg` handshake.
    pub user_agent: String,
    /// Keep-alive interval while connected.
    pub heartbeat_secs: u64,
    /// Fixed delay before a reconnect attempt. No backoff.
    pub reconnect_secs: u64,
    /// Settle delay between the `/reg` and acknowledgement-sync frames.
    pub settle_ms: u64,
    /// Cool-down after a manual reply during which automated replies are
    /// suppressed for the conversation.
    pub pause_minutes: u64,
    /// Timeout for the token side-channel call.
    pub token_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://wss-goofish.dingtalk.com/".into(),
            token_url: "https://h5api.m.goofish.com/h5/mtop.taobao.idlemessage.pc.login.token/1.0/"
                .into(),
            app_key: "34839810".into(),
            im_app_key: "444e9908a51d1cb236a27862abc769c9".into(),
            account_site: "xianyu".into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 haggler/0.3"
                .into(),
            heartbeat_secs: 10,
            reconnect_secs: 5,
            settle_ms: 1000,
            pause_minutes: 10,
            token_timeout_secs: 20,
        }
    }
}

/// One seller account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountEntry {
    /// Human-readable label for logs and the CLI.
    pub label: String,
    /// Semicolon-delimited credential string (usually `${ENV}`-substituted).
    pub cookies: String,
    pub enabled: bool,
}

impl Default for AccountEntry {
    fn default() -> Self {
        Self {
            label: String::new(),
            cookies: String::new(),
            enabled: true,
        }
    }
}

impl HagglerConfig {
    /// Accounts eligible for a connector at startup.
    pub fn enabled_accounts(&self) -> impl Iterator<Item = &AccountEntry> {
        self.accounts.iter().filter(|a| a.enabled)
    }
}
