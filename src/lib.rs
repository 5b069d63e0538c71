pub mod checksum;
pub mod config;
pub mod config_editor;
pub mod console;
pub mod download;
pub mod error;
pub mod events;
pub mod http;
pub mod java_manager;
pub mod logs;
pub mod monitor;
pub mod players;
pub mod plugins;
pub mod ports;
pub mod properties;
pub mod resource_pack;
pub mod server_manager;

use anyhow::Result;
use config::AppSettings;
use download::PaperClient;
use events::{AppEvent, EventSink};
use java_manager::JavaManager;
use monitor::Monitor;
use plugins::PluginManager;
use resource_pack::ResourcePackManager;
use server_manager::ServerManager;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// App state
pub struct AppState {
    pub settings: AppSettings,
    pub config_dir: PathBuf,
    pub servers: ServerManager,
    pub paper: PaperClient,
    pub plugins: PluginManager,
    pub packs: ResourcePackManager,
    pub java: JavaManager,
    monitor: Mutex<Monitor>,
    pub events: EventSink,
}

impl AppState {
    /// Builds every manager from the settings in `config_dir` and loads the
    /// server list. Events from all of them go to the returned receiver.
    pub async fn initialize(config_dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<AppEvent>)> {
        let settings = AppSettings::load(&AppSettings::settings_path(config_dir)).await?;
        let (events, rx) = EventSink::channel();

        let servers = ServerManager::new(
            AppSettings::servers_path(config_dir),
            settings.clone(),
            events.clone(),
        );
        if let Err(e) = servers.load().await {
            tracing::error!("Error loading servers: {:#}", e);
            events.log(format!("Error loading servers: {:#}\n", e));
        }

        let state = Self {
            paper: PaperClient::new(&settings, events.clone())?,
            plugins: PluginManager::new(&settings, events.clone())?,
            packs: ResourcePackManager::new(&settings, events.clone())?,
            java: JavaManager::new(&settings),
            monitor: Mutex::new(Monitor::new()),
            config_dir: config_dir.to_path_buf(),
            settings,
            servers,
            events,
        };
        Ok((state, rx))
    }

    pub fn monitor(&self) -> MutexGuard<'_, Monitor> {
        self.monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout belongs to the console
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

pub async fn run() -> Result<()> {
    init_tracing();

    let config_dir = AppSettings::config_dir();
    tracing::info!("Using configuration directory {}", config_dir.display());

    let settings_path = AppSettings::settings_path(&config_dir);
    if !settings_path.exists() {
        AppSettings::load(&settings_path).await?.save(&settings_path).await?;
    }

    let (state, events) = AppState::initialize(&config_dir).await?;
    console::run(Arc::new(state), events).await
}
