use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::board_api::{BoardApiClient, FetchError, OfficeSource};
use crate::db::OfficeDb;
use crate::error::{ConfigError, SyncError};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::sync::{IncrementalSchedule, SyncOrchestrator};
use crate::types::{Config, SyncReport};

pub const CLIENT_ID_ENV: &str = "OFFICEDIR_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "OFFICEDIR_CLIENT_SECRET";

/// Builds the API source for a given configuration. Swapped out in tests.
pub type SourceFactory =
    Box<dyn Fn(&Config) -> Result<Arc<dyn OfficeSource>, FetchError> + Send + Sync>;

fn board_api_source(config: &Config) -> Result<Arc<dyn OfficeSource>, FetchError> {
    Ok(Arc::new(BoardApiClient::new(config)?))
}

/// Process-wide directory state: config, store, orchestrator and schedule.
pub struct DirectoryState {
    config: RwLock<Config>,
    config_path: Option<PathBuf>,
    store: Arc<Mutex<OfficeDb>>,
    orchestrator: Arc<SyncOrchestrator>,
    schedule: IncrementalSchedule,
    source_factory: SourceFactory,
}

impl DirectoryState {
    /// Open the configured database and wire up the board API client and a tokio scheduler.
    ///
    /// `config_path` is where settings changes are persisted; `None` keeps them in memory.
    pub fn from_config(config: Config, config_path: Option<PathBuf>) -> Result<Self, SyncError> {
        let db = match config.database_path.as_deref() {
            Some(path) => OfficeDb::open_at(path)?,
            None => OfficeDb::open()?,
        };
        Self::with_parts(
            config,
            config_path,
            db,
            Box::new(board_api_source),
            Arc::new(TokioScheduler::new()),
        )
    }

    pub fn with_parts(
        config: Config,
        config_path: Option<PathBuf>,
        db: OfficeDb,
        source_factory: SourceFactory,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, SyncError> {
        let source = source_factory(&config)?;
        let store = Arc::new(Mutex::new(db));
        let orchestrator = Arc::new(SyncOrchestrator::new(store.clone(), source));
        let schedule = IncrementalSchedule::new(scheduler, orchestrator.clone());

        Ok(Self {
            config: RwLock::new(config),
            config_path,
            store,
            orchestrator,
            schedule,
            source_factory,
        })
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn store(&self) -> &Arc<Mutex<OfficeDb>> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn schedule(&self) -> &IncrementalSchedule {
        &self.schedule
    }

    /// Apply `mutator` to the config, persist it, and swap it in.
    ///
    /// Returns `(previous, updated)`. Nothing changes in memory if the write fails.
    pub fn update_config(
        &self,
        mutator: impl FnOnce(&mut Config),
    ) -> Result<(Config, Config), ConfigError> {
        let mut guard = self.config.write();
        let previous = guard.clone();
        let mut updated = previous.clone();
        mutator(&mut updated);

        if let Some(path) = self.config_path.as_deref() {
            save_config_to(path, &updated)?;
        }

        *guard = updated.clone();
        Ok((previous, updated))
    }

    /// Rebuild the API source from `config` and hand it to the orchestrator.
    pub fn rebuild_source(&self, config: &Config) -> Result<(), SyncError> {
        let source = (self.source_factory)(config)?;
        self.orchestrator.replace_source(source);
        log::info!("Board API client rebuilt with updated settings");
        Ok(())
    }

    /// Arm the incremental schedule and, on a fresh store, run the bootstrap full pass.
    ///
    /// Returns the bootstrap report when one ran.
    pub async fn activate(&self) -> Result<Option<SyncReport>, SyncError> {
        let hours = self.config.read().effective_sync_interval_hours();
        self.schedule.arm(hours);

        if !self.orchestrator.watermark()?.never_fully_synced() {
            return Ok(None);
        }
        log::info!("No completed full sync on record, running bootstrap full sync");
        let report = self.orchestrator.run_full_sync().await?;
        Ok(Some(report))
    }

    /// Stop scheduling incremental passes. A running pass is left to finish.
    pub fn deactivate(&self) {
        self.schedule.disarm();
    }

    /// Stop scheduling and cancel any running pass.
    pub fn shutdown(&self) {
        self.schedule.disarm();
        self.orchestrator.shutdown();
        log::info!("Office directory shut down");
    }
}

/// `~/.officedir/config.json`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".officedir").join("config.json"))
}

/// Load the default config file with environment credential overrides applied.
pub fn load_config() -> Result<Config, ConfigError> {
    let mut config = load_config_from(&config_path()?)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Read a config file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Overlay non-empty `OFFICEDIR_CLIENT_ID` / `OFFICEDIR_CLIENT_SECRET` values.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(id) = non_empty(CLIENT_ID_ENV) {
        config.client_id = Some(id);
    }
    if let Some(secret) = non_empty(CLIENT_SECRET_ENV) {
        config.client_secret = Some(secret);
    }
}

/// Write config as pretty JSON via a temp file and rename.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    let content = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(write_err)?;

    // Holds the client secret.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
    }

    fs::rename(&tmp, path).map_err(write_err)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::sync::testing::FakeSource;

    /// In-memory state over a shared fake source; the factory hands out the same source.
    pub fn fake_state(
        config: Config,
        config_path: Option<PathBuf>,
        source: Arc<FakeSource>,
    ) -> DirectoryState {
        let db = OfficeDb::open_in_memory().expect("in-memory db");
        let factory: SourceFactory = Box::new(move |_: &Config| Ok(source.clone() as Arc<dyn OfficeSource>));
        DirectoryState::with_parts(
            config,
            config_path,
            db,
            factory,
            Arc::new(TokioScheduler::new()),
        )
        .expect("state")
    }
}
