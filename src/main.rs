use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use lectern::config::Config;
use lectern::mobilize::{Mobilizer, MobilizeQueue};
use lectern::storage::{Database, StorageError};
use lectern::ui;
use lectern::ui::detail::{EntryDetailScreen, ScreenDeps};
use lectern::ui::host::{
    ChannelNavigator, DbEntryStore, DbPreferences, ProbeConnectivity, QueueTracker,
    ServiceLauncher, SystemPlatform, WidthLayout,
};
use lectern::ui::sidebar::Sidebar;

/// Config directory (~/.config/lectern/).
fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("lectern"))
}

#[derive(Parser, Debug)]
#[command(name = "lectern", about = "Terminal article reader with full-text mobilization")]
struct Args {
    /// Database file (defaults to <config dir>/reader.db)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Entry to open (defaults to the last viewed or newest entry)
    #[arg(long, value_name = "ID")]
    entry: Option<String>,

    /// Reset persisted screen state before starting
    #[arg(long)]
    reset_session: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("failed to create config directory")?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(&config_dir) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o700);
            if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                tracing::warn!(path = %config_dir.display(), error = %e, "failed to restrict config directory");
            }
        }
    }

    let config = Config::load(&config_dir.join("config.toml"))?;

    let db_path = args.db.unwrap_or_else(|| config_dir.join("reader.db"));
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::InstanceLocked) => {
            eprintln!("Error: {}", StorageError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("failed to open database: {}", e)),
    };

    if args.reset_session {
        db.set_preference("session.detail", "{}").await?;
    }

    // Resolve the browsing sequence and the entry to show: persisted state
    // first, the newest entry otherwise.
    let session = db.load_screen_state().await?;
    let all_ids = db.all_ids_newest_first().await?;
    let (entry_id, entry_ids) = match (args.entry, session) {
        (Some(id), _) => (id, all_ids),
        (None, Some(state)) => (state.entry_id, state.entry_ids),
        (None, None) => {
            let Some(first) = all_ids.first().cloned() else {
                eprintln!("No entries in {}: run your fetcher first.", db_path.display());
                std::process::exit(1);
            };
            (first, all_ids)
        }
    };

    // Mobilization service: queue, worker, wake handle.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(3))
        .timeout(Duration::from_secs(30))
        .build()?;
    let queue = MobilizeQueue::new(db.clone());
    let mobilizer = Mobilizer::new(db.clone(), queue.clone(), client, config.gateway.clone());
    let service_handle = mobilizer.handle();
    let refresh_flag = mobilizer.refresh_flag();
    tokio::spawn(mobilizer.run());

    // Host plumbing.
    let (screen_tx, screen_rx) = mpsc::unbounded_channel();
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let layout = Arc::new(WidthLayout::new(config.two_column_min_width));

    let deps = ScreenDeps {
        store: Arc::new(DbEntryStore { db: db.clone() }),
        tracker: Arc::new(QueueTracker { queue }),
        launcher: Arc::new(ServiceLauncher {
            handle: service_handle,
        }),
        prefs: Arc::new(DbPreferences {
            db: db.clone(),
            refresh_running: refresh_flag,
        }),
        navigator: Arc::new(ChannelNavigator { signals: host_tx }),
        layout: Arc::clone(&layout) as Arc<dyn ui::detail::HostLayout>,
        connectivity: Arc::new(ProbeConnectivity {
            probes: config.connectivity_probes.clone(),
            timeout: Duration::from_millis(config.probe_timeout_ms),
        }),
        platform: Arc::new(SystemPlatform),
    };

    let mut sidebar = Sidebar::new(db.titles_for_ids(&entry_ids).await?);
    sidebar.select_id(&entry_id);

    let mut screen = EntryDetailScreen::new(deps, screen_tx);
    screen.initialize(entry_id, entry_ids);

    ui::run(screen, sidebar, layout, screen_rx, host_rx).await?;

    Ok(())
}
