//! Wallet Session CLI
//!
//! Command-line front end for connecting to a wallet and following it.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wallet_session::{
    chains, Config, ConnectOutcome, FileCache, FixedPicker, LogReload, Platform,
    ProviderCache, ProviderChoice, ProviderPicker, ProviderRegistry, ProviderSelector, Reloader,
    Result, RpcConfig, SessionSnapshot, SessionStore,
};

const DEFAULT_CACHE_FILE: &str = ".wallet-session.json";

#[derive(Parser)]
#[command(name = "wallet-session")]
#[command(about = "Connect to an Ethereum wallet and follow its session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured wallet providers
    Providers,

    /// Connect to a wallet and print the session
    Connect {
        /// Provider name; prompts when omitted
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Reconnect to the cached provider and print the session
    Status,

    /// End the cached session and forget the provider
    Disconnect,

    /// Connect, then follow wallet events until Ctrl-C
    Watch {
        /// Provider name; prompts when omitted and nothing is cached
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show current configuration
    Config,
}

/// Numbered terminal prompt over the registry
struct PromptPicker;

#[async_trait]
impl ProviderPicker for PromptPicker {
    async fn pick(&self, choices: &[ProviderChoice]) -> Option<String> {
        use std::io::Write;

        println!("Select a wallet provider:");
        for (i, choice) in choices.iter().enumerate() {
            println!(
                "  [{}] {:<20} {}",
                i + 1,
                choice.display.name,
                choice.display.description
            );
        }
        print!("Choice (empty to cancel): ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        stdin.read_line(&mut line).await.ok()?;
        let answer = line.trim();
        if answer.is_empty() {
            return None;
        }

        let by_index = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| choices.get(i));
        by_index
            .or_else(|| choices.iter().find(|c| c.name == answer))
            .map(|c| c.name.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let (plain, json) = if cli.json_logs {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Providers => list_providers(&config),
        Commands::Connect { provider } => run_connect(&config, provider).await?,
        Commands::Status => run_status(&config).await?,
        Commands::Disconnect => run_disconnect(&config).await?,
        Commands::Watch { provider } => run_watch(&config, provider).await?,
        Commands::Config => show_config(&config)?,
    }

    Ok(())
}

fn cache_path(config: &Config) -> PathBuf {
    config
        .cache_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE))
}

fn build_store(
    config: &Config,
    provider: Option<String>,
    reloader: Arc<dyn Reloader>,
) -> SessionStore {
    let registry = Arc::new(ProviderRegistry::from_config(config));
    let picker: Arc<dyn ProviderPicker> = match provider {
        Some(name) => Arc::new(FixedPicker::new(name)),
        None => Arc::new(PromptPicker),
    };

    let mut platform = Platform::new(reloader);
    if config.cache_provider {
        platform = platform.with_cache(Arc::new(FileCache::new(cache_path(config))));
    }

    SessionStore::new(ProviderSelector::new(registry, picker), platform)
}

fn print_snapshot(snapshot: &SessionSnapshot, rpc: &RpcConfig) {
    println!("Connected via {}", snapshot.provider);
    println!("  Account:  {} ({})", snapshot.account, snapshot.short_account());
    println!(
        "  Network:  {} (chain {})",
        snapshot.network_label(),
        snapshot.chain_id
    );
    if let Some(symbol) = chains::chain_data(snapshot.chain_id).map(|c| c.native_currency) {
        println!("  Currency: {}", symbol);
    }
    if let Some(url) = rpc.get(snapshot.chain_id) {
        println!("  Read RPC: {}", url);
    }
    println!("  Session:  {}", snapshot.session_id);
}

fn list_providers(config: &Config) {
    let registry = ProviderRegistry::from_config(config);
    for choice in registry.choices() {
        println!(
            "{:<20} {:<9} {} - {}",
            choice.name, choice.kind, choice.display.name, choice.display.description
        );
    }
}

/// Interactive connect. `None` when the user cancelled or another connect
/// is already waiting on the wallet.
async fn connect_interactive(store: &SessionStore) -> Result<Option<SessionSnapshot>> {
    match store.connect().await {
        Ok(ConnectOutcome::Connected(snapshot)) => Ok(Some(snapshot)),
        Ok(ConnectOutcome::InFlight) => {
            println!("A connection is already in progress");
            Ok(None)
        }
        Err(e) if e.is_user_cancelled() => {
            println!("Connection cancelled");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn run_connect(config: &Config, provider: Option<String>) -> Result<()> {
    let store = build_store(config, provider, Arc::new(LogReload));
    if let Some(snapshot) = connect_interactive(&store).await? {
        print_snapshot(&snapshot, &config.rpc_config());
    }
    Ok(())
}

async fn run_status(config: &Config) -> Result<()> {
    if !config.cache_provider {
        println!("Provider caching is disabled");
        return Ok(());
    }
    let store = build_store(config, None, Arc::new(LogReload));
    match store.reconnect_if_cached().await {
        Some(snapshot) => print_snapshot(&snapshot, &config.rpc_config()),
        None => println!("Not connected"),
    }
    Ok(())
}

async fn run_disconnect(config: &Config) -> Result<()> {
    let store = build_store(config, None, Arc::new(LogReload));
    if store.reconnect_if_cached().await.is_some() && store.disconnect().await {
        println!("Disconnected");
        return Ok(());
    }

    // Wallet unreachable: still forget it
    if config.cache_provider {
        FileCache::new(cache_path(config)).clear().await?;
    }
    println!("Not connected");
    Ok(())
}

async fn run_watch(config: &Config, provider: Option<String>) -> Result<()> {
    let reload = Arc::new(Notify::new());
    let signal = Arc::clone(&reload);
    let store = build_store(
        config,
        provider,
        Arc::new(move || signal.notify_one()),
    );

    let rpc = config.rpc_config();
    let Some(snapshot) = restore(&store).await? else {
        return Ok(());
    };
    print_snapshot(&snapshot, &rpc);

    let mut ticks = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, leaving session cached");
                break;
            }
            _ = reload.notified() => {
                // A network switch restarts the session from scratch
                tracing::info!("Restarting session after network change");
                match restore(&store).await? {
                    Some(snapshot) => print_snapshot(&snapshot, &rpc),
                    None => break,
                }
            }
            _ = ticks.tick() => {}
        }

        store.process_pending().await;
        if !store.is_connected().await {
            println!("Wallet disconnected");
            break;
        }
        if let Some(snapshot) = store.snapshot().await {
            tracing::trace!(account = %snapshot.account, chain_id = snapshot.chain_id, "Session alive");
        }
    }

    Ok(())
}

/// Cached provider first, then the picker
async fn restore(store: &SessionStore) -> Result<Option<SessionSnapshot>> {
    if let Some(snapshot) = store.reconnect_if_cached().await {
        return Ok(Some(snapshot));
    }
    connect_interactive(store).await
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);

    let endpoints: std::collections::BTreeMap<u64, String> =
        config.rpc_config().to_hashmap().into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&endpoints)?);
    if config.cache_provider {
        println!("Provider cache: {}", cache_path(config).display());
    } else {
        println!("Provider cache: disabled");
    }
    Ok(())
}
