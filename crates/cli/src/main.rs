use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    clap::{Parser, Subcommand},
    dashmap::DashMap,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    haggler_auth::{
        AccountCredential, CredentialError, CredentialStore, TokenEndpoint,
    },
    haggler_common::{AccountId, OrderStatus, OrderStatusSink, ReplyResolver},
    haggler_config::{GatewaySettings, HagglerConfig, discover_and_load, load_config},
    haggler_connector::{ConnectorRegistry, ConnectorSettings, WsTransport},
};

#[derive(Parser)]
#[command(name = "haggler", about = "Haggler — seller-side marketplace chat automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (haggler.toml/yaml/json). Discovered when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect every enabled account and run until interrupted.
    Run {
        /// Reply sent when no other resolution applies. Automation stays
        /// silent without it.
        #[arg(long)]
        default_reply: Option<String>,
    },
    /// Show configured accounts and their credential health.
    Status,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load(cli: &Cli) -> anyhow::Result<HagglerConfig> {
    match &cli.config {
        Some(path) => load_config(path),
        None => Ok(discover_and_load()),
    }
}

/// Credential store seeded from the config file's cookie strings. Refreshed
/// credentials are written back to the in-process copy only; persistent
/// storage sits behind this seam.
struct ConfigCredentialStore {
    entries: DashMap<AccountId, AccountCredential>,
}

impl ConfigCredentialStore {
    fn from_config(config: &HagglerConfig) -> Self {
        let entries = DashMap::new();
        for account in config.enabled_accounts() {
            let credential = AccountCredential::parse(&account.cookies);
            match credential.account_id() {
                Ok(id) => {
                    entries.insert(id, credential);
                },
                Err(e) => {
                    warn!(label = %account.label, error = %e, "skipping account with unusable credential");
                },
            }
        }
        Self { entries }
    }

    fn account_ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<_> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl CredentialStore for ConfigCredentialStore {
    async fn get(&self, account_id: AccountId) -> Result<AccountCredential, CredentialError> {
        self.entries
            .get(&account_id)
            .map(|e| e.clone())
            .ok_or(CredentialError::NotFound(account_id))
    }

    async fn put(&self, account_id: AccountId, credential: AccountCredential) {
        self.entries.insert(account_id, credential);
    }
}

/// Replies with one configured text, or stays silent. The keyword/AI reply
/// pipeline plugs in behind the same trait.
struct StaticReplyResolver {
    reply: Option<String>,
}

#[async_trait]
impl ReplyResolver for StaticReplyResolver {
    async fn resolve(
        &self,
        _account_id: AccountId,
        _conversation_id: &str,
        _sender_id: &str,
        _item_id: Option<&str>,
        _text: &str,
    ) -> Option<String> {
        self.reply.clone()
    }
}

/// Order updates go to the log until a persistence backend is wired in.
struct LoggingOrderSink;

#[async_trait]
impl OrderStatusSink for LoggingOrderSink {
    async fn update(&self, order_id: &str, status: OrderStatus, account_id: AccountId) {
        info!(account_id, order_id, status = %status, "order status changed");
    }
}

fn token_endpoint(gateway: &GatewaySettings) -> TokenEndpoint {
    TokenEndpoint {
        url: gateway.token_url.clone(),
        app_key: gateway.app_key.clone(),
        im_app_key: gateway.im_app_key.clone(),
        account_site: gateway.account_site.clone(),
        timeout: Duration::from_secs(gateway.token_timeout_secs),
    }
}

fn connector_settings(gateway: &GatewaySettings) -> ConnectorSettings {
    ConnectorSettings {
        app_key: gateway.im_app_key.clone(),
        user_agent: gateway.user_agent.clone(),
        heartbeat: Duration::from_secs(gateway.heartbeat_secs),
        reconnect: Duration::from_secs(gateway.reconnect_secs),
        settle: Duration::from_millis(gateway.settle_ms),
        pause_window: Duration::from_secs(gateway.pause_minutes * 60),
    }
}

async fn run(config: HagglerConfig, default_reply: Option<String>) -> anyhow::Result<()> {
    let store = Arc::new(ConfigCredentialStore::from_config(&config));
    let account_ids = store.account_ids();
    if account_ids.is_empty() {
        anyhow::bail!("no enabled accounts with usable credentials");
    }

    let registry = ConnectorRegistry::new(
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        Arc::new(WsTransport::new(config.gateway.ws_url.clone())),
        Arc::new(StaticReplyResolver { reply: default_reply }),
        Arc::new(LoggingOrderSink),
        token_endpoint(&config.gateway),
        connector_settings(&config.gateway),
    );

    for account_id in account_ids {
        if let Err(e) = registry.start(account_id).await {
            warn!(account_id, error = %e, "failed to start connector");
        }
    }

    info!("running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    registry.stop_all().await;
    Ok(())
}

fn status(config: &HagglerConfig) {
    if config.accounts.is_empty() {
        println!("no accounts configured");
        return;
    }
    for account in &config.accounts {
        let identity = match AccountCredential::parse(&account.cookies).account_id() {
            Ok(id) => id.to_string(),
            Err(e) => format!("unusable credential ({e})"),
        };
        let state = if account.enabled { "enabled" } else { "disabled" };
        println!("{:<20} {:<10} {identity}", account.label, state);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "haggler starting");

    let config = load(&cli)?;
    match cli.command {
        Commands::Run { default_reply } => run(config, default_reply).await,
        Commands::Status => {
            status(&config);
            Ok(())
        },
    }
}
