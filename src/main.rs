use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use amadeus_relay::application::errors::{BotError, ConfigError};
use amadeus_relay::application::messaging::EventDispatcher;
use amadeus_relay::application::services::PluginService;
use amadeus_relay::infrastructure::adapters::OneBotServer;
use amadeus_relay::infrastructure::config::Config;
use amadeus_relay::plugins::{manager::create_plugin_manager, PluginManager};

#[derive(Parser)]
#[command(name = "amadeus-relay")]
#[command(about = "OneBot relay with hot-reloadable plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
    /// Load a plugin library, print its name and version, then unload it
    PluginInfo {
        /// Path to the plugin library
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let (config, config_error) = load_config(&cli.config);
    init_logging(&config.logging.level);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config: {}, using defaults", e);
    }

    let result = match cli.command {
        Commands::Run => run_relay(config),
        Commands::Version => {
            println!("amadeus-relay v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::InitConfig => init_config(&cli.config),
        Commands::PluginInfo { path } => plugin_info(&path, config.plugins.channel_capacity),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &Path) -> (Config, Option<ConfigError>) {
    let loaded = if path.exists() {
        Config::load(path).and_then(|mut config| {
            config.apply_env()?;
            Ok(config)
        })
    } else {
        Config::load_env()
    };

    match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

fn run_relay(config: Config) -> Result<(), BotError> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;

    rt.block_on(async move {
        let manager = create_plugin_manager(config.plugins.channel_capacity);
        let (server, events) = OneBotServer::new(config.server.clone());
        let service = PluginService::new(manager.clone(), server.client());

        if config.plugins.auto_load {
            let loaded = service.load_directory(&config.plugins.directory);
            tracing::info!("Plugin system initialized with {} plugins", loaded.len());
        }

        let dispatcher = EventDispatcher::new(
            server.client(),
            manager.clone(),
            config.relay.clone(),
            Duration::from_secs(config.server.timeout),
        );
        let dispatch = tokio::spawn(async move { dispatcher.run(events).await });

        let result = tokio::select! {
            res = server.run() => res,
            _ = reload_on_hangup(&service) => Ok(()),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                Ok(())
            }
        };

        dispatch.abort();
        let count = manager.unload_all();
        tracing::info!("Unloaded {} plugins", count);
        result
    })
}

/// Reload all plugins from disk on every SIGHUP
#[cfg(unix)]
async fn reload_on_hangup<B>(service: &PluginService<B>)
where
    B: amadeus_relay::domain::traits::Bot + Clone + 'static,
{
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("SIGHUP reload unavailable: {}", e);
            return std::future::pending().await;
        }
    };

    while hangup.recv().await.is_some() {
        let reloaded = service.reload_all().await;
        tracing::info!("Reloaded {} plugins", reloaded.len());
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup<B>(_service: &PluginService<B>) {
    std::future::pending::<()>().await
}

fn plugin_info(path: &Path, channel_capacity: usize) -> Result<(), BotError> {
    let manager = PluginManager::new(channel_capacity);
    let name = manager.load(path)?;

    if let Some(info) = manager.info(&name) {
        println!("{} v{} ({})", info.name, info.version, info.path.display());
    }

    manager.unload(&name)?;
    Ok(())
}

fn init_config(path: &Path) -> Result<(), BotError> {
    if path.exists() {
        return Err(BotError::Config(ConfigError::InvalidValue(format!(
            "{} already exists",
            path.display()
        ))));
    }

    let yaml = Config::default().to_yaml()?;
    std::fs::write(path, yaml).map_err(ConfigError::Io)?;
    println!("Created {}", path.display());
    Ok(())
}
