//! Server configuration read from `GRIDBOARD_*` environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::filters::DEFAULT_USER;
use crate::mock_data::{demo_rows, generate_mock_rows, parse_account_csv, MockDataError, DEMO_ROW_COUNT, DEMO_SEED};
use crate::model::AccountRow;
use crate::observability::parse_bool;
use crate::pagination::{DEFAULT_LAZY_PAGE_SIZE, DEFAULT_PAGE_SIZE};
use crate::random::StdRandom;
use crate::storage::{ClientStorage, MemoryStorage, SqliteStorage, StorageError};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_CLIENT_ID: &str = "default";
pub const DEFAULT_LOAD_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Sqlite(PathBuf),
}

impl StorageBackend {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.eq_ignore_ascii_case("memory") {
            Some(Self::Memory)
        } else {
            Some(Self::Sqlite(PathBuf::from(trimmed)))
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite(_) => "sqlite",
        }
    }

    pub fn open(&self, client_id: &str) -> Result<Arc<dyn ClientStorage>, StorageError> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            Self::Sqlite(path) => Arc::new(SqliteStorage::open(path, client_id)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub addr: SocketAddr,
    pub storage: StorageBackend,
    pub client_id: String,
    pub current_user: String,
    pub lazy_page_size: usize,
    pub page_size: usize,
    pub mock_rows: usize,
    pub mock_seed: Option<u64>,
    pub mock_csv: Option<PathBuf>,
    pub live: bool,
    pub load_delay: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            storage: StorageBackend::Memory,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            current_user: DEFAULT_USER.to_string(),
            lazy_page_size: DEFAULT_LAZY_PAGE_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            mock_rows: DEMO_ROW_COUNT,
            mock_seed: None,
            mock_csv: None,
            live: true,
            load_delay: DEFAULT_LOAD_DELAY,
        }
    }
}

impl DashboardConfig {
    /// Rows served by the dashboard: a CSV blob when configured, else mock rows.
    pub fn dataset(&self) -> Result<Vec<AccountRow>, MockDataError> {
        if let Some(path) = &self.mock_csv {
            let text = std::fs::read_to_string(path)?;
            return parse_account_csv(&text);
        }

        Ok(match self.mock_seed {
            None if self.mock_rows == DEMO_ROW_COUNT => demo_rows(),
            seed => generate_mock_rows(
                self.mock_rows,
                &mut StdRandom::seeded(seed.unwrap_or(DEMO_SEED)),
            ),
        })
    }
}

pub fn dashboard_config_from_env() -> DashboardConfig {
    let mut config = DashboardConfig::default();

    if let Some(raw) = non_empty_var("GRIDBOARD_ADDR") {
        match raw.parse() {
            Ok(addr) => config.addr = addr,
            Err(_) => warn!(
                component = "config",
                event = "config.invalid",
                key = "GRIDBOARD_ADDR",
                value = %raw,
                fallback = DEFAULT_ADDR
            ),
        }
    }

    if let Some(storage) = non_empty_var("GRIDBOARD_STORAGE").and_then(|raw| StorageBackend::parse(&raw)) {
        config.storage = storage;
    }
    if let Some(client_id) = non_empty_var("GRIDBOARD_CLIENT_ID") {
        config.client_id = client_id;
    }
    if let Some(user) = non_empty_var("GRIDBOARD_USER") {
        config.current_user = user;
    }
    if let Some(size) = positive_usize_var("GRIDBOARD_LAZY_PAGE_SIZE") {
        config.lazy_page_size = size;
    }
    if let Some(size) = positive_usize_var("GRIDBOARD_PAGE_SIZE") {
        config.page_size = size;
    }
    if let Some(rows) = positive_usize_var("GRIDBOARD_MOCK_ROWS") {
        config.mock_rows = rows;
    }
    config.mock_seed = non_empty_var("GRIDBOARD_MOCK_SEED").and_then(|raw| raw.parse().ok());
    config.mock_csv = non_empty_var("GRIDBOARD_MOCK_CSV").map(PathBuf::from);
    if let Some(live) = non_empty_var("GRIDBOARD_LIVE").and_then(|raw| parse_bool(&raw)) {
        config.live = live;
    }
    if let Some(ms) = non_empty_var("GRIDBOARD_LOAD_DELAY_MS").and_then(|raw| raw.parse::<u64>().ok()) {
        config.load_delay = Duration::from_millis(ms);
    }

    config
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn positive_usize_var(key: &str) -> Option<usize> {
    non_empty_var(key)
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|value| *value > 0)
}

#[cfg(test)]
pub(crate) fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock should not be poisoned");
    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(key, _)| ((*key).to_string(), env::var(key).ok()))
        .collect();

    for (key, value) in vars {
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    let output = f();

    for (key, value) in previous {
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYS: [&str; 11] = [
        "GRIDBOARD_ADDR",
        "GRIDBOARD_STORAGE",
        "GRIDBOARD_CLIENT_ID",
        "GRIDBOARD_USER",
        "GRIDBOARD_LAZY_PAGE_SIZE",
        "GRIDBOARD_PAGE_SIZE",
        "GRIDBOARD_MOCK_ROWS",
        "GRIDBOARD_MOCK_SEED",
        "GRIDBOARD_MOCK_CSV",
        "GRIDBOARD_LIVE",
        "GRIDBOARD_LOAD_DELAY_MS",
    ];

    fn cleared_with(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
        ALL_KEYS
            .iter()
            .map(|key| {
                let value = overrides
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| *v);
                (*key, value)
            })
            .collect()
    }

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(&cleared_with(&[]), dashboard_config_from_env);
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.addr.to_string(), DEFAULT_ADDR);
    }

    #[test]
    fn parses_every_override() {
        let cfg = with_env_vars(
            &cleared_with(&[
                ("GRIDBOARD_ADDR", "0.0.0.0:9000"),
                ("GRIDBOARD_STORAGE", "/tmp/grid.sqlite"),
                ("GRIDBOARD_CLIENT_ID", "desk-7"),
                ("GRIDBOARD_USER", "Risk Desk"),
                ("GRIDBOARD_LAZY_PAGE_SIZE", "20"),
                ("GRIDBOARD_PAGE_SIZE", "25"),
                ("GRIDBOARD_MOCK_ROWS", "300"),
                ("GRIDBOARD_MOCK_SEED", "9"),
                ("GRIDBOARD_LIVE", "off"),
                ("GRIDBOARD_LOAD_DELAY_MS", "0"),
            ]),
            dashboard_config_from_env,
        );

        assert_eq!(cfg.addr.port(), 9000);
        assert_eq!(cfg.storage, StorageBackend::Sqlite(PathBuf::from("/tmp/grid.sqlite")));
        assert_eq!(cfg.client_id, "desk-7");
        assert_eq!(cfg.current_user, "Risk Desk");
        assert_eq!(cfg.lazy_page_size, 20);
        assert_eq!(cfg.page_size, 25);
        assert_eq!(cfg.mock_rows, 300);
        assert_eq!(cfg.mock_seed, Some(9));
        assert!(!cfg.live);
        assert_eq!(cfg.load_delay, Duration::ZERO);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = with_env_vars(
            &cleared_with(&[
                ("GRIDBOARD_ADDR", "not-an-addr"),
                ("GRIDBOARD_STORAGE", "Memory"),
                ("GRIDBOARD_LAZY_PAGE_SIZE", "0"),
                ("GRIDBOARD_PAGE_SIZE", "ten"),
                ("GRIDBOARD_MOCK_SEED", "-1"),
                ("GRIDBOARD_LIVE", "maybe"),
                ("GRIDBOARD_LOAD_DELAY_MS", "soon"),
            ]),
            dashboard_config_from_env,
        );

        assert_eq!(cfg, DashboardConfig::default());
    }

    #[test]
    fn dataset_uses_seed_or_csv_blob() {
        let seeded = DashboardConfig {
            mock_rows: 12,
            mock_seed: Some(3),
            ..DashboardConfig::default()
        };
        let rows = seeded.dataset().unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows, seeded.dataset().unwrap());

        assert_eq!(DashboardConfig::default().dataset().unwrap(), demo_rows());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let fields: Vec<String> = (0..crate::model::ALL_ROW_FIELDS.len())
            .map(|idx| format!("\"v{idx}\""))
            .collect();
        std::fs::write(&path, fields.join(",")).unwrap();

        let from_csv = DashboardConfig {
            mock_csv: Some(path),
            ..DashboardConfig::default()
        };
        let rows = from_csv.dataset().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "v0");

        let missing = DashboardConfig {
            mock_csv: Some(dir.path().join("absent.csv")),
            ..DashboardConfig::default()
        };
        assert!(matches!(missing.dataset(), Err(MockDataError::Io(_))));
    }

    #[test]
    fn memory_backend_opens_without_io() {
        let storage = StorageBackend::Memory.open("x").unwrap();
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
    }
}
