use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use kelola_bot::application::errors::{BotError, ConfigError};
use kelola_bot::application::messaging::{MessageDispatcher, DRAIN_TIMEOUT};
use kelola_bot::application::modules::BaseModule;
use kelola_bot::application::registry::CommandRegistry;
use kelola_bot::application::services::ModuleService;
use kelola_bot::domain::entities::Message;
use kelola_bot::domain::traits::Bot;
use kelola_bot::infrastructure::adapters::{ConsoleAdapter, TelegramAdapter};
use kelola_bot::infrastructure::config::Config;
use kelola_bot::infrastructure::storage::JsonPermissionStore;

/// Inbound messages buffered between the adapter and the dispatcher
const INBOX_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "kelola-bot")]
#[command(about = "A chat bot with hot-reloadable command modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: String,

    /// Bot token (overrides config)
    #[arg(short, long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => match run_bot(&cli.config, cli.token) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{}", e);
                ExitCode::FAILURE
            }
        },
        Commands::Version => {
            println!("kelola-bot v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::InitConfig => init_config(),
    }
}

fn load_config(path: &Path, token_override: Option<String>) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingField(format!(
            "config file {} (generate one with `kelola-bot init-config`)",
            path.display()
        )));
    }

    let mut config = Config::load(path)?;
    config.apply_env();
    if let Some(token) = token_override {
        config.set_token(token);
    }
    config.validate()?;
    Ok(config)
}

fn run_bot(config_path: &str, token_override: Option<String>) -> Result<(), BotError> {
    let config_path = PathBuf::from(config_path);
    let config = load_config(&config_path, token_override)?;

    tracing::info!("Starting kelola-bot: {}", config.bot.name);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("failed to start runtime: {}", e)))?;
    rt.block_on(serve(config, config_path))
}

async fn serve(config: Config, config_path: PathBuf) -> Result<(), BotError> {
    let store = Arc::new(JsonPermissionStore::new(&config.storage.permissions_path));
    let registry = CommandRegistry::with_store(store)?;
    if let Some(owner) = config.bot.owner_id.as_deref() {
        registry.claim_owner(owner)?;
    }

    let service = ModuleService::builder(registry.clone())
        .with_config(&config)
        .config_path(config_path)
        .internal_module(BaseModule::factory)
        .build();

    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    let (bot, listener) = connect(&config, tx).await?;
    bot.start().await?;

    let loaded = service.start().await?;
    tracing::info!("Bot started: @{} ({} plugin module(s))", bot.bot_info().username, loaded);

    let dispatcher = MessageDispatcher::new(registry, bot, service.shared_prefix());
    run_loop(dispatcher, rx, service.subscribe()).await;

    listener.abort();
    service.teardown();
    tracing::info!("Bye");
    Ok(())
}

/// Pick the adapter from config and start it feeding `tx`.
async fn connect(
    config: &Config,
    tx: mpsc::Sender<Message>,
) -> Result<(Arc<dyn Bot>, JoinHandle<Result<(), BotError>>), BotError> {
    if let Some(token) = config.telegram_token() {
        let mut telegram = TelegramAdapter::new(token);
        telegram.fetch_bot_info().await?;
        let telegram = Arc::new(telegram);
        let source = telegram.clone();
        let listener = tokio::spawn(async move { source.listen(tx).await });
        let bot: Arc<dyn Bot> = telegram;
        return Ok((bot, listener));
    }

    let user_id = config
        .adapters
        .console
        .as_ref()
        .map(|c| c.user_id.clone())
        .unwrap_or_else(|| "console".to_string());
    let console = Arc::new(ConsoleAdapter::new(config.bot.name.clone()).with_user_id(user_id));
    let source = console.clone();
    let listener = tokio::spawn(async move { source.listen(tx).await });
    let bot: Arc<dyn Bot> = console;
    Ok((bot, listener))
}

/// Dispatch inbound messages until ctrl-c, `selfdestruct` or the adapter
/// stops producing, then wait for commands still running.
async fn run_loop(
    dispatcher: MessageDispatcher,
    rx: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stop = async move {
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
            }
        }
    };
    dispatcher.serve(rx, stop, DRAIN_TIMEOUT).await;
}

fn init_config() -> ExitCode {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("# Save this to config.yaml and adjust as needed.");
            println!("# Owner commands answer to the prefix only: in Telegram groups send");
            println!("# `/giveperm admin 7`, not `/giveperm@yourbot admin 7`.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
