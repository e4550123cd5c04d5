//! Editable account-grid dashboard core.
//!
//! Column layout, filtering with saved filters, simulated live values,
//! incremental row loading and KPI aggregation, all as synchronous state
//! machines over per-client storage. The `dashboard` module exposes them over
//! HTTP.

mod columns;
mod config;
mod dashboard;
mod export;
mod filters;
mod gestures;
mod kpi;
mod live;
mod mock_data;
mod model;
mod observability;
mod pagination;
mod random;
mod storage;

pub use columns::{
    column_registry, default_columns, registry_column, ColumnDescriptor, ColumnLayout,
    ColumnManager, PersistedColumn, MIN_COLUMN_WIDTH,
};
pub use config::{
    dashboard_config_from_env, DashboardConfig, StorageBackend, DEFAULT_ADDR, DEFAULT_CLIENT_ID,
    DEFAULT_LOAD_DELAY,
};
pub use dashboard::{
    dashboard_router, render_dashboard_html, DashboardAppState, DashboardError,
    DashboardSession, DashboardSnapshot, DisplayCell, DisplayRow, PagerView, RowWindow,
    SessionSettings, ValueTone,
};
pub use export::{export_csv, ExportError, ExportScope};
pub use filters::{
    apply_filters, DateRange, FilterChip, FilterDimension, FilterSession, FilterState,
    FilterVisibility, SaveDraft, SavedFilter, SavedFilterError, DEFAULT_USER, SEARCHABLE_FIELDS,
};
pub use gestures::{ColumnGestures, ColumnKey, GestureState, KeyAction};
pub use kpi::{aggregate_kpis, KpiHighlight, KpiSummary};
pub use live::{
    spawn_live_feed, ChangeDirection, LiveCell, LiveFeedHandle, LiveField, LiveRowSource,
    LiveState, LiveUpdate, LiveValueSimulator, SharedLiveState, CONNECT_DELAY, MAX_TICK_DELAY,
    MIN_TICK_DELAY, SETTLE_AFTER,
};
pub use mock_data::{
    demo_rows, generate_mock_rows, parse_account_csv, MockDataError, ACCOUNT_TYPE_OPTIONS,
    COUNTRY_OPTIONS, DEMO_ROW_COUNT, DEMO_SEED, PLATFORM_OPTIONS, PROGRAM_OPTIONS,
};
pub use model::{
    format_currency, format_signed_percent, parse_display_number, parse_row_date, AccountRow,
    RowField, ALL_ROW_FIELDS,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_dataset_loaded, log_storage_selected,
    logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError,
};
pub use pagination::{
    LazyLoader, PageMarker, Pager, DEFAULT_LAZY_PAGE_SIZE, DEFAULT_PAGE_SIZE,
};
pub use random::{RandomSource, StdRandom};
pub use storage::{
    load_json, remove_key, save_json, ClientStorage, MemoryStorage, SqliteStorage, StorageError,
    COLUMN_LAYOUT_KEY, CURRENT_FILTERS_KEY, SAVED_FILTERS_KEY,
};
