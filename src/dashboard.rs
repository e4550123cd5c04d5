//! Dashboard session wiring the controllers together, plus HTTP routes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::columns::{column_registry, ColumnDescriptor, ColumnLayout, ColumnManager};
use crate::config::DashboardConfig;
use crate::export::{export_csv, ExportError, ExportScope};
use crate::filters::{
    FilterChip, FilterDimension, FilterSession, FilterState, FilterVisibility,
    SaveDraft, SavedFilter, SavedFilterError, DEFAULT_USER,
};
use crate::gestures::{ColumnGestures, ColumnKey, KeyAction};
use crate::kpi::{aggregate_kpis, KpiSummary};
use crate::live::{ChangeDirection, LiveField, LiveRowSource, LiveState, SharedLiveState};
use crate::mock_data::{ACCOUNT_TYPE_OPTIONS, COUNTRY_OPTIONS, PLATFORM_OPTIONS, PROGRAM_OPTIONS};
use crate::model::{format_currency, parse_display_number, AccountRow, RowField};
use crate::pagination::{
    LazyLoader, PageMarker, Pager, DEFAULT_LAZY_PAGE_SIZE, DEFAULT_PAGE_SIZE,
};
use crate::storage::ClientStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub lazy_page_size: usize,
    pub page_size: usize,
    pub current_user: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lazy_page_size: DEFAULT_LAZY_PAGE_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            current_user: DEFAULT_USER.to_string(),
        }
    }
}

impl From<&DashboardConfig> for SessionSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            lazy_page_size: config.lazy_page_size,
            page_size: config.page_size,
            current_user: config.current_user.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("column {0} cannot be removed")]
    NotRemovable(String),
    #[error("unsupported column key: {0}")]
    UnknownKey(String),
    #[error(transparent)]
    SavedFilter(#[from] SavedFilterError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl DashboardError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotRemovable(_) => StatusCode::CONFLICT,
            Self::UnknownKey(_) => StatusCode::BAD_REQUEST,
            Self::SavedFilter(SavedFilterError::BlankName | SavedFilterError::NoActiveFilters) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::SavedFilter(SavedFilterError::NotOwner { .. }) => StatusCode::FORBIDDEN,
            Self::SavedFilter(SavedFilterError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(
            component = "dashboard",
            event = "http.request.rejected",
            status = status.as_u16(),
            error = %self
        );
        (status, Json(json!({ "notice": self.to_string() }))).into_response()
    }
}

/// Which slice of the filtered rows a snapshot renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowWindow {
    #[default]
    Lazy,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTone {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayCell {
    pub column: String,
    pub value: String,
    pub change: ChangeDirection,
    pub tone: ValueTone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub id: String,
    pub cells: Vec<DisplayCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagerView {
    pub current_page: usize,
    pub total_pages: usize,
    pub start_item: usize,
    pub end_item: usize,
    pub total: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub markers: Vec<PageMarker>,
}

impl From<&Pager> for PagerView {
    fn from(pager: &Pager) -> Self {
        Self {
            current_page: pager.current_page(),
            total_pages: pager.total_pages(),
            start_item: pager.start_item(),
            end_item: pager.end_item(),
            total: pager.total(),
            has_next: pager.has_next(),
            has_previous: pager.has_previous(),
            markers: pager.page_markers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<DisplayRow>,
    pub kpi: KpiSummary,
    pub filters: FilterState,
    pub chips: Vec<FilterChip>,
    pub active_filter_count: usize,
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub lazy: LazyLoader,
    pub pager: PagerView,
    pub is_editing: bool,
    pub focused_column: Option<String>,
    pub is_connected: bool,
}

/// One client's view of the grid: layout, filters and row cursors.
pub struct DashboardSession {
    rows: Arc<Vec<AccountRow>>,
    columns: ColumnManager,
    gestures: ColumnGestures,
    filters: FilterSession,
    filtered: Vec<usize>,
    lazy: LazyLoader,
    pager: Pager,
}

impl DashboardSession {
    pub fn new(
        rows: Arc<Vec<AccountRow>>,
        storage: Arc<dyn ClientStorage>,
        settings: &SessionSettings,
    ) -> Self {
        let columns = ColumnManager::load(Arc::clone(&storage));
        let filters = FilterSession::load(storage, settings.current_user.clone());
        let filtered = filtered_indices(&rows, filters.filters());
        let total = filtered.len();

        Self {
            rows,
            columns,
            gestures: ColumnGestures::new(),
            filters,
            filtered,
            lazy: LazyLoader::new(settings.lazy_page_size, total),
            pager: Pager::new(settings.page_size, total),
        }
    }

    pub fn rows(&self) -> &Arc<Vec<AccountRow>> {
        &self.rows
    }

    pub fn filtered_rows(&self) -> Vec<&AccountRow> {
        self.filtered.iter().map(|&idx| &self.rows[idx]).collect()
    }

    pub fn layout(&self) -> &ColumnLayout {
        self.columns.layout()
    }

    pub fn gestures(&self) -> &ColumnGestures {
        &self.gestures
    }

    pub fn filters(&self) -> &FilterSession {
        &self.filters
    }

    pub fn lazy(&self) -> &LazyLoader {
        &self.lazy
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Drag-and-drop of `dragged_id` onto `target_id`. Edit mode only.
    pub fn drop_column(&mut self, dragged_id: &str, target_id: &str) -> bool {
        if !self.gestures.drag_start(self.columns.layout(), dragged_id) {
            return false;
        }
        self.gestures.drag_over(target_id);
        match self.gestures.drop_on(target_id) {
            Some((dragged, target)) => self.columns.reorder(&dragged, &target),
            None => {
                self.gestures.drag_end();
                false
            }
        }
    }

    pub fn remove_column(&mut self, id: &str) -> Result<bool, DashboardError> {
        if self
            .columns
            .layout()
            .column(id)
            .is_some_and(|col| !col.is_removable)
        {
            return Err(DashboardError::NotRemovable(id.to_string()));
        }
        let changed = self.columns.remove(id);
        self.gestures.sync_focus(self.columns.layout());
        Ok(changed)
    }

    pub fn toggle_column(&mut self, id: &str) -> bool {
        let changed = self.columns.toggle_visibility(id);
        self.gestures.sync_focus(self.columns.layout());
        changed
    }

    pub fn set_column_width(&mut self, id: &str, width: i64) -> bool {
        self.columns.set_width(id, width)
    }

    pub fn handle_column_key(&mut self, id: &str, raw_key: &str) -> Result<bool, DashboardError> {
        let key = ColumnKey::parse(raw_key)
            .ok_or_else(|| DashboardError::UnknownKey(raw_key.to_string()))?;

        let action = self.gestures.handle_key(self.columns.layout(), id, key);
        Ok(match action {
            Some(KeyAction::MoveLeft(column)) => self.columns.move_left(&column),
            Some(KeyAction::MoveRight(column)) => self.columns.move_right(&column),
            Some(KeyAction::Remove { column, .. }) => self.columns.remove(&column),
            None => false,
        })
    }

    pub fn reset_columns(&mut self) {
        self.columns.reset();
        self.gestures.sync_focus(self.columns.layout());
    }

    pub fn toggle_editing(&mut self) -> bool {
        let editing = self.columns.toggle_editing();
        self.gestures.sync_focus(self.columns.layout());
        editing
    }

    pub fn replace_filters(&mut self, filters: FilterState) {
        self.filters.replace(filters);
        self.refresh();
    }

    pub fn toggle_filter_value(&mut self, dimension: FilterDimension, value: &str) -> bool {
        let changed = self.filters.toggle_value(dimension, value);
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn remove_filter(&mut self, dimension: FilterDimension, value: Option<&str>) -> bool {
        let changed = self.filters.remove_single(dimension, value);
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear_all();
        self.refresh();
    }

    pub fn save_filter(&mut self, draft: SaveDraft) -> Result<SavedFilter, DashboardError> {
        self.filters.set_draft(draft);
        Ok(self.filters.save_draft()?)
    }

    pub fn load_saved_filter(&mut self, id: &str) -> Result<(), DashboardError> {
        self.filters.load_saved(id)?;
        self.refresh();
        Ok(())
    }

    pub fn delete_saved_filter(&mut self, id: &str) -> Result<SavedFilter, DashboardError> {
        Ok(self.filters.delete_saved(id)?)
    }

    pub fn begin_load_more(&mut self) -> bool {
        self.lazy.begin_load()
    }

    pub fn finish_load_more(&mut self) {
        self.lazy.finish_load();
    }

    pub fn go_to_page(&mut self, page: usize) -> bool {
        self.pager.go_to(page)
    }

    pub fn kpis(&self) -> KpiSummary {
        aggregate_kpis(self.filtered.iter().map(|&idx| &self.rows[idx]))
    }

    pub fn export(&self, scope: ExportScope) -> Result<String, ExportError> {
        let registry;
        let columns: Vec<&ColumnDescriptor> = match scope {
            ExportScope::Visible => self.columns.layout().visible_columns(),
            ExportScope::All => {
                registry = column_registry();
                registry.iter().collect()
            }
        };
        export_csv(self.filtered_rows(), &columns)
    }

    pub fn snapshot(&self, live: &LiveState, window: RowWindow) -> DashboardSnapshot {
        let layout = self.columns.layout();
        let visible = layout.visible_columns();
        let range = match window {
            RowWindow::Lazy => self.lazy.visible_range(),
            RowWindow::Page => self.pager.range(),
        };

        let rows = self.filtered[range]
            .iter()
            .map(|&idx| display_row(&self.rows[idx], &visible, live))
            .collect();
        let filters = self.filters.filters();

        DashboardSnapshot {
            columns: visible.into_iter().cloned().collect(),
            rows,
            kpi: self.kpis(),
            filters: filters.clone(),
            chips: filters.active_chips(),
            active_filter_count: filters.active_count(),
            total_rows: self.rows.len(),
            filtered_rows: self.filtered.len(),
            lazy: self.lazy.clone(),
            pager: PagerView::from(&self.pager),
            is_editing: layout.is_editing(),
            focused_column: self.gestures.focused().map(str::to_string),
            is_connected: live.connected,
        }
    }

    fn refresh(&mut self) {
        self.filtered = filtered_indices(&self.rows, self.filters.filters());
        let total = self.filtered.len();
        let lazy_reset = self.lazy.sync_total(total);
        let pager_reset = self.pager.sync_total(total);
        debug!(
            component = "dashboard",
            event = "dashboard.refresh",
            filtered = total,
            cursor_reset = lazy_reset || pager_reset
        );
    }
}

fn filtered_indices(rows: &[AccountRow], filters: &FilterState) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| filters.matches(row))
        .map(|(idx, _)| idx)
        .collect()
}

fn display_row(row: &AccountRow, columns: &[&ColumnDescriptor], live: &LiveState) -> DisplayRow {
    let cells = columns
        .iter()
        .map(|col| {
            let original = row.field(col.accessor);
            let (value, change) = match LiveField::from_row_field(col.accessor) {
                Some(field) => {
                    let cell = live.simulator.cell(&row.id, field, original);
                    (cell.value, cell.change)
                }
                None => (original.to_string(), ChangeDirection::Same),
            };
            let tone = value_tone(col.accessor, &value);
            DisplayCell {
                column: col.id.clone(),
                value,
                change,
                tone,
            }
        })
        .collect();

    DisplayRow {
        id: row.id.clone(),
        cells,
    }
}

fn value_tone(field: RowField, value: &str) -> ValueTone {
    if !matches!(field, RowField::Growth | RowField::Pnl) {
        return ValueTone::Neutral;
    }
    let parsed = parse_display_number(value);
    if parsed > 0.0 {
        ValueTone::Positive
    } else if parsed < 0.0 {
        ValueTone::Negative
    } else {
        ValueTone::Neutral
    }
}

pub fn render_dashboard_html(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Accounts Dashboard</title>\n");
    out.push_str("<style>:root{--ink:#1b2430;--muted:#667085;--line:#e4e7ec;--head:#f2f4f7;--pos:#067647;--neg:#b42318;--up:#dcfae6;--down:#fee4e2}*{box-sizing:border-box}body{margin:0;font-family:\"Inter\",\"Segoe UI\",sans-serif;color:var(--ink);background:#f9fafb}.shell{max-width:1600px;margin:0 auto;padding:20px}.kpis{display:grid;grid-template-columns:repeat(4,minmax(0,1fr));gap:12px}.kpi{background:#fff;border:1px solid var(--line);border-radius:10px;padding:12px 14px}.kpi h2{margin:0 0 6px;font-size:.75rem;text-transform:uppercase;color:var(--muted)}.kpi b{font-size:1.25rem}.kpi small{display:block;color:var(--muted)}.chips{margin:14px 0;display:flex;gap:8px;flex-wrap:wrap}.chip{background:#eef4ff;border:1px solid #c7d7fe;border-radius:999px;padding:3px 10px;font-size:.8rem}.card{background:#fff;border:1px solid var(--line);border-radius:10px;overflow:auto;max-height:72vh}table{border-collapse:collapse;width:max-content;min-width:100%}th{position:sticky;top:0;background:var(--head);text-align:left;font-size:.78rem;padding:8px 10px;border-bottom:1px solid var(--line)}th.focused{outline:2px solid #2e90fa}table.is-editing th{cursor:grab}td{font-size:.84rem;padding:7px 10px;border-bottom:1px solid var(--line);white-space:nowrap}td.tone-positive{color:var(--pos)}td.tone-negative{color:var(--neg)}td[data-change=\"increase\"]{background:var(--up)}td[data-change=\"decrease\"]{background:var(--down)}.footer{display:flex;justify-content:space-between;align-items:center;padding:10px 2px;color:var(--muted);font-size:.82rem}#live-status.on{color:var(--pos)}@media (max-width:760px){.kpis{grid-template-columns:repeat(2,minmax(0,1fr))}}</style>\n");
    out.push_str("</head><body><main class=\"shell\">\n");

    render_kpis(&mut out, &snapshot.kpi);
    render_chips(&mut out, &snapshot.chips);

    let table_class = if snapshot.is_editing { "is-editing" } else { "" };
    out.push_str(&format!(
        "<section class=\"card\"><table id=\"accounts-table\" class=\"{table_class}\">\n<thead><tr>"
    ));
    for col in &snapshot.columns {
        let focused = snapshot.focused_column.as_deref() == Some(col.id.as_str());
        out.push_str(&format!(
            "<th data-column=\"{}\"{}{}>",
            escape_html(&col.id),
            if focused { " class=\"focused\"" } else { "" },
            col.width
                .map(|w| format!(" style=\"width:{w}px;min-width:{w}px\""))
                .unwrap_or_default()
        ));
        out.push_str(&escape_html(&col.header));
        out.push_str("</th>");
    }
    out.push_str("</tr></thead><tbody>\n");

    for row in &snapshot.rows {
        out.push_str(&format!("<tr data-row=\"{}\">", escape_html(&row.id)));
        for cell in &row.cells {
            out.push_str(&format!(
                "<td data-row=\"{}\" data-column=\"{}\" data-change=\"{}\" class=\"tone-{}\">",
                escape_html(&row.id),
                escape_html(&cell.column),
                change_label(cell.change),
                tone_label(cell.tone)
            ));
            out.push_str(&escape_html(&cell.value));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    if snapshot.rows.is_empty() {
        out.push_str(&format!(
            "<tr><td colspan=\"{}\">No accounts match the current filters.</td></tr>\n",
            snapshot.columns.len().max(1)
        ));
    }
    out.push_str("</tbody></table></section>\n");

    out.push_str("<div class=\"footer\">");
    out.push_str(&format!(
        "<span>Showing {} of {} accounts ({} total)</span>",
        snapshot.rows.len(),
        snapshot.filtered_rows,
        snapshot.total_rows
    ));
    if snapshot.lazy.has_more() {
        out.push_str("<button id=\"load-more\" type=\"button\">Load more</button>");
    }
    let (status_class, status_text) = if snapshot.is_connected {
        ("on", "Live")
    } else {
        ("", "Connecting")
    };
    out.push_str(&format!(
        "<span id=\"live-status\" class=\"{status_class}\">{status_text}</span>"
    ));
    out.push_str("</div>\n");

    out.push_str(r#"<script>
async function refresh(){
  const res = await fetch('/dashboard/snapshot');
  if (!res.ok) return;
  const snap = await res.json();
  for (const row of snap.rows) {
    for (const cell of row.cells) {
      const td = document.querySelector(`td[data-row="${CSS.escape(row.id)}"][data-column="${CSS.escape(cell.column)}"]`);
      if (!td) continue;
      td.textContent = cell.value;
      td.dataset.change = cell.change;
      td.className = 'tone-' + cell.tone;
    }
  }
  const status = document.getElementById('live-status');
  status.textContent = snap.isConnected ? 'Live' : 'Connecting';
  status.className = snap.isConnected ? 'on' : '';
}
const more = document.getElementById('load-more');
if (more) more.addEventListener('click', async () => {
  more.disabled = true;
  await fetch('/dashboard/rows/more', { method: 'POST' });
  location.reload();
});
setInterval(refresh, 1000);
</script>
"#);
    out.push_str("</main></body></html>\n");
    out
}

fn render_kpis(out: &mut String, kpi: &KpiSummary) {
    out.push_str("<section class=\"kpis\">");
    out.push_str(&format!(
        "<div class=\"kpi\"><h2>Total PnL</h2><b>{}</b></div>",
        escape_html(&kpi.total_pnl_display())
    ));
    for (title, highlight) in [
        ("Largest Profit", &kpi.largest_profit),
        ("Largest Loss", &kpi.largest_loss),
    ] {
        out.push_str(&format!(
            "<div class=\"kpi\"><h2>{title}</h2><b>{}</b><small>{}</small></div>",
            escape_html(&format_currency(highlight.value)),
            escape_html(&highlight.account)
        ));
    }
    out.push_str(&format!(
        "<div class=\"kpi\"><h2>Profitable Accounts</h2><b>{} / {}</b><small>{:.1}%</small></div>",
        kpi.profitable_count,
        kpi.row_count,
        kpi.profitable_share()
    ));
    out.push_str("</section>\n");
}

fn render_chips(out: &mut String, chips: &[FilterChip]) {
    if chips.is_empty() {
        return;
    }
    out.push_str("<div class=\"chips\">");
    for chip in chips {
        out.push_str("<span class=\"chip\">");
        out.push_str(&escape_html(&chip.label));
        out.push_str("</span>");
    }
    out.push_str("</div>\n");
}

fn change_label(change: ChangeDirection) -> &'static str {
    match change {
        ChangeDirection::Increase => "increase",
        ChangeDirection::Decrease => "decrease",
        ChangeDirection::Same => "same",
    }
}

fn tone_label(tone: ValueTone) -> &'static str {
    match tone {
        ValueTone::Positive => "positive",
        ValueTone::Negative => "negative",
        ValueTone::Neutral => "neutral",
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Live ticks pick from the rows passing the current filters.
impl LiveRowSource for RwLock<DashboardSession> {
    fn live_rows(&self) -> Vec<AccountRow> {
        self.read()
            .expect("dashboard session lock should not be poisoned")
            .filtered_rows()
            .into_iter()
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct DashboardAppState {
    session: Arc<RwLock<DashboardSession>>,
    live: SharedLiveState,
    load_delay: Duration,
}

impl DashboardAppState {
    pub fn new(session: DashboardSession, live: SharedLiveState, load_delay: Duration) -> Self {
        Self::with_shared_session(Arc::new(RwLock::new(session)), live, load_delay)
    }

    /// Wraps a session that is also read elsewhere, e.g. by the live feed.
    pub fn with_shared_session(
        session: Arc<RwLock<DashboardSession>>,
        live: SharedLiveState,
        load_delay: Duration,
    ) -> Self {
        Self {
            session,
            live,
            load_delay,
        }
    }

    pub fn session(&self) -> &Arc<RwLock<DashboardSession>> {
        &self.session
    }

    fn snapshot(&self, window: RowWindow) -> DashboardSnapshot {
        let live = self.live.read().expect("live state lock should not be poisoned");
        self.read_session().snapshot(&live, window)
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, DashboardSession> {
        self.session
            .read()
            .expect("dashboard session lock should not be poisoned")
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, DashboardSession> {
        self.session
            .write()
            .expect("dashboard session lock should not be poisoned")
    }
}

pub fn dashboard_router(state: DashboardAppState) -> Router {
    Router::new()
        .route("/dashboard", get(get_dashboard_html))
        .route("/dashboard/snapshot", get(get_dashboard_snapshot))
        .route("/dashboard/columns/reorder", post(post_reorder_columns))
        .route("/dashboard/columns/reset", post(post_reset_columns))
        .route("/dashboard/columns/available", get(get_available_columns))
        .route("/dashboard/columns/{id}/remove", post(post_remove_column))
        .route("/dashboard/columns/{id}/toggle", post(post_toggle_column))
        .route("/dashboard/columns/{id}/width", post(post_column_width))
        .route("/dashboard/columns/{id}/key", post(post_column_key))
        .route("/dashboard/editing/toggle", post(post_toggle_editing))
        .route(
            "/dashboard/filters",
            get(get_filters).put(put_filters).delete(delete_filters),
        )
        .route("/dashboard/filters/toggle", post(post_toggle_filter))
        .route("/dashboard/filters/remove", post(post_remove_filter))
        .route("/dashboard/filters/options", get(get_filter_options))
        .route(
            "/dashboard/saved-filters",
            get(get_saved_filters).post(post_saved_filter),
        )
        .route("/dashboard/saved-filters/{id}/load", post(post_load_saved_filter))
        .route("/dashboard/saved-filters/{id}", delete(delete_saved_filter))
        .route("/dashboard/rows/more", post(post_load_more))
        .route("/dashboard/page", get(get_page))
        .route("/dashboard/kpi", get(get_kpi))
        .route("/dashboard/export", get(get_export))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    #[serde(default)]
    view: RowWindow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest {
    dragged_id: String,
    target_id: String,
}

#[derive(Debug, Deserialize)]
struct WidthRequest {
    width: i64,
}

#[derive(Debug, Deserialize)]
struct KeyRequest {
    key: String,
}

#[derive(Debug, Deserialize)]
struct FilterValueRequest {
    dimension: FilterDimension,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveFilterRequest {
    name: String,
    #[serde(default)]
    visibility: FilterVisibility,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    #[serde(default)]
    scope: ExportScope,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ColumnsResponse {
    changed: bool,
    is_editing: bool,
    focused_column: Option<String>,
    columns: Vec<ColumnDescriptor>,
}

impl ColumnsResponse {
    fn from_session(session: &DashboardSession, changed: bool) -> Self {
        Self {
            changed,
            is_editing: session.layout().is_editing(),
            focused_column: session.gestures().focused().map(str::to_string),
            columns: session.layout().columns().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AvailableColumn {
    id: String,
    header: String,
    is_visible: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FiltersResponse {
    filters: FilterState,
    chips: Vec<FilterChip>,
    active_count: usize,
    filtered_rows: usize,
}

impl FiltersResponse {
    fn from_session(session: &DashboardSession) -> Self {
        let filters = session.filters().filters();
        Self {
            filters: filters.clone(),
            chips: filters.active_chips(),
            active_count: filters.active_count(),
            filtered_rows: session.filtered_rows().len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FilterOptions {
    platforms: Vec<&'static str>,
    plans: Vec<&'static str>,
    categories: Vec<&'static str>,
    countries: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadMoreResponse {
    loaded: bool,
    visible_count: usize,
    total: usize,
    has_more: bool,
}

async fn get_dashboard_html(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let snapshot = state.snapshot(RowWindow::Lazy);
    info!(
        component = "dashboard",
        event = "http.page.request",
        rows = snapshot.rows.len()
    );
    Html(render_dashboard_html(&snapshot))
}

async fn get_dashboard_snapshot(
    State(state): State<DashboardAppState>,
    Query(query): Query<SnapshotQuery>,
) -> impl IntoResponse {
    let snapshot = state.snapshot(query.view);
    info!(
        component = "dashboard",
        event = "http.snapshot.request",
        view = ?query.view,
        rows = snapshot.rows.len(),
        filtered = snapshot.filtered_rows
    );
    Json(snapshot)
}

async fn post_reorder_columns(
    State(state): State<DashboardAppState>,
    Json(body): Json<ReorderRequest>,
) -> impl IntoResponse {
    let mut session = state.write_session();
    let changed = session.drop_column(&body.dragged_id, &body.target_id);
    Json(ColumnsResponse::from_session(&session, changed))
}

async fn post_reset_columns(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let mut session = state.write_session();
    session.reset_columns();
    Json(ColumnsResponse::from_session(&session, true))
}

async fn get_available_columns(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let session = state.read_session();
    let layout = session.layout();
    let columns: Vec<AvailableColumn> = column_registry()
        .into_iter()
        .map(|col| AvailableColumn {
            is_visible: layout.column(&col.id).is_some_and(|entry| entry.is_visible),
            id: col.id,
            header: col.header,
        })
        .collect();
    Json(columns)
}

async fn post_remove_column(
    State(state): State<DashboardAppState>,
    Path(id): Path<String>,
) -> Result<Json<ColumnsResponse>, DashboardError> {
    let mut session = state.write_session();
    let changed = session.remove_column(&id)?;
    Ok(Json(ColumnsResponse::from_session(&session, changed)))
}

async fn post_toggle_column(
    State(state): State<DashboardAppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let mut session = state.write_session();
    let changed = session.toggle_column(&id);
    Json(ColumnsResponse::from_session(&session, changed))
}

async fn post_column_width(
    State(state): State<DashboardAppState>,
    Path(id): Path<String>,
    Json(body): Json<WidthRequest>,
) -> impl IntoResponse {
    let mut session = state.write_session();
    let changed = session.set_column_width(&id, body.width);
    Json(ColumnsResponse::from_session(&session, changed))
}

async fn post_column_key(
    State(state): State<DashboardAppState>,
    Path(id): Path<String>,
    Json(body): Json<KeyRequest>,
) -> Result<Json<ColumnsResponse>, DashboardError> {
    let mut session = state.write_session();
    let changed = session.handle_column_key(&id, &body.key)?;
    Ok(Json(ColumnsResponse::from_session(&session, changed)))
}

async fn post_toggle_editing(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let mut session = state.write_session();
    session.toggle_editing();
    Json(ColumnsResponse::from_session(&session, true))
}

async fn get_filters(State(state): State<DashboardAppState>) -> impl IntoResponse {
    Json(FiltersResponse::from_session(&state.read_session()))
}

async fn put_filters(
    State(state): State<DashboardAppState>,
    Json(filters): Json<FilterState>,
) -> impl IntoResponse {
    let mut session = state.write_session();
    session.replace_filters(filters);
    info!(
        component = "dashboard",
        event = "http.filters.replace",
        filtered = session.filtered_rows().len()
    );
    Json(FiltersResponse::from_session(&session))
}

async fn delete_filters(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let mut session = state.write_session();
    session.clear_filters();
    Json(FiltersResponse::from_session(&session))
}

async fn post_toggle_filter(
    State(state): State<DashboardAppState>,
    Json(body): Json<FilterValueRequest>,
) -> impl IntoResponse {
    let mut session = state.write_session();
    if let Some(value) = body.value.as_deref() {
        session.toggle_filter_value(body.dimension, value);
    }
    Json(FiltersResponse::from_session(&session))
}

async fn post_remove_filter(
    State(state): State<DashboardAppState>,
    Json(body): Json<FilterValueRequest>,
) -> impl IntoResponse {
    let mut session = state.write_session();
    session.remove_filter(body.dimension, body.value.as_deref());
    Json(FiltersResponse::from_session(&session))
}

async fn get_filter_options() -> impl IntoResponse {
    Json(FilterOptions {
        platforms: PLATFORM_OPTIONS.to_vec(),
        plans: PROGRAM_OPTIONS.to_vec(),
        categories: ACCOUNT_TYPE_OPTIONS.to_vec(),
        countries: COUNTRY_OPTIONS.to_vec(),
    })
}

async fn get_saved_filters(State(state): State<DashboardAppState>) -> impl IntoResponse {
    Json(state.read_session().filters().saved().to_vec())
}

async fn post_saved_filter(
    State(state): State<DashboardAppState>,
    Json(body): Json<SaveFilterRequest>,
) -> Result<impl IntoResponse, DashboardError> {
    let saved = state.write_session().save_filter(SaveDraft {
        name: body.name,
        visibility: body.visibility,
    })?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn post_load_saved_filter(
    State(state): State<DashboardAppState>,
    Path(id): Path<String>,
) -> Result<Json<FiltersResponse>, DashboardError> {
    let mut session = state.write_session();
    session.load_saved_filter(&id)?;
    Ok(Json(FiltersResponse::from_session(&session)))
}

async fn delete_saved_filter(
    State(state): State<DashboardAppState>,
    Path(id): Path<String>,
) -> Result<Json<SavedFilter>, DashboardError> {
    let removed = state.write_session().delete_saved_filter(&id)?;
    Ok(Json(removed))
}

async fn post_load_more(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let started = state.write_session().begin_load_more();
    if started {
        tokio::time::sleep(state.load_delay).await;
        state.write_session().finish_load_more();
    }

    let session = state.read_session();
    let lazy = session.lazy();
    debug!(
        component = "dashboard",
        event = "http.rows.more",
        loaded = started,
        visible = lazy.visible_count(),
        total = lazy.total()
    );
    Json(LoadMoreResponse {
        loaded: started,
        visible_count: lazy.visible_count(),
        total: lazy.total(),
        has_more: lazy.has_more(),
    })
}

async fn get_page(
    State(state): State<DashboardAppState>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    if let Some(page) = query.page {
        state.write_session().go_to_page(page);
    }
    Json(state.snapshot(RowWindow::Page))
}

async fn get_kpi(State(state): State<DashboardAppState>) -> impl IntoResponse {
    Json(state.read_session().kpis())
}

async fn get_export(
    State(state): State<DashboardAppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, DashboardError> {
    let body = state.read_session().export(query.scope)?;
    info!(
        component = "dashboard",
        event = "http.export",
        scope = ?query.scope,
        bytes = body.len()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"accounts.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_data::demo_rows;
    use crate::live::spawn_live_feed;
    use crate::random::{ScriptedRandom, StdRandom};
    use crate::storage::MemoryStorage;
    use tokio::time::Instant;

    fn session_with(rows: Vec<AccountRow>, settings: &SessionSettings) -> DashboardSession {
        DashboardSession::new(Arc::new(rows), Arc::new(MemoryStorage::new()), settings)
    }

    fn demo_session() -> DashboardSession {
        session_with(demo_rows(), &SessionSettings::default())
    }

    #[test]
    fn filter_change_resets_both_cursors() {
        let mut session = demo_session();
        assert!(session.begin_load_more());
        session.finish_load_more();
        session.go_to_page(3);
        assert_eq!(session.lazy().visible_count(), 100);
        assert_eq!(session.pager().current_page(), 3);

        let platform = session.rows()[0].platform.clone();
        session.toggle_filter_value(FilterDimension::Platform, &platform);
        let filtered = session.filtered_rows().len();
        assert!(filtered < 100);
        assert_eq!(session.lazy().total(), filtered);
        assert_eq!(session.lazy().visible_count(), filtered.min(DEFAULT_LAZY_PAGE_SIZE));
        assert_eq!(session.pager().current_page(), 1);
        assert!(session.filtered_rows().iter().all(|row| row.platform == platform));
    }

    #[tokio::test(start_paused = true)]
    async fn live_feed_over_shared_session_only_ticks_filtered_rows() {
        let mut session = demo_session();
        let platform = session.rows()[0].platform.clone();
        session.toggle_filter_value(FilterDimension::Platform, &platform);
        let session = Arc::new(RwLock::new(session));

        let source: Arc<dyn LiveRowSource> = Arc::clone(&session) as Arc<dyn LiveRowSource>;
        let handle = spawn_live_feed(source, Box::new(StdRandom::seeded(7)));
        tokio::time::sleep(Duration::from_secs(60)).await;

        let guard = session.read().unwrap();
        let live = handle.state().read().unwrap();
        assert!(live.simulator.tracked_cells() > 0);

        let mut on_filtered = 0;
        for row in guard.rows().iter() {
            let touched = LiveField::ALL
                .iter()
                .filter(|field| live.simulator.update(&row.id, **field).is_some())
                .count();
            if row.platform == platform {
                on_filtered += touched;
            } else {
                assert_eq!(touched, 0, "row {} is filtered out but was ticked", row.id);
            }
        }
        assert_eq!(on_filtered, live.simulator.tracked_cells());
    }

    #[test]
    fn snapshot_overlays_live_cells_and_tones() {
        let rows = vec![AccountRow {
            id: "1".to_string(),
            account: "ACC001".to_string(),
            equity: "$1,000.00".to_string(),
            growth: "+2.00%".to_string(),
            pnl: "-$100.00".to_string(),
            ..AccountRow::default()
        }];
        let session = session_with(rows.clone(), &SessionSettings::default());

        let mut live = LiveState::default();
        let mut rng = ScriptedRandom::new(vec![0.0, 0.0, 0.0, 0.9]);
        live.simulator.tick(&rows, &mut rng, Instant::now());
        live.connected = true;

        let snapshot = session.snapshot(&live, RowWindow::Lazy);
        assert!(snapshot.is_connected);
        let cells = &snapshot.rows[0].cells;

        let equity = cells.iter().find(|c| c.column == "equity").unwrap();
        assert_eq!(equity.value, "$1,040.00");
        assert_eq!(equity.change, ChangeDirection::Increase);
        assert_eq!(equity.tone, ValueTone::Neutral);

        let pnl = cells.iter().find(|c| c.column == "pnl").unwrap();
        assert_eq!(pnl.value, "-$100.00");
        assert_eq!(pnl.tone, ValueTone::Negative);

        let growth = cells.iter().find(|c| c.column == "growth").unwrap();
        assert_eq!(growth.tone, ValueTone::Positive);
    }

    #[test]
    fn keyboard_actions_apply_to_layout_only_in_edit_mode() {
        let mut session = demo_session();
        assert!(!session.handle_column_key("account", "ArrowRight").unwrap());

        session.toggle_editing();
        assert_eq!(session.gestures().focused(), Some("account"));
        assert!(session.handle_column_key("account", "ArrowRight").unwrap());
        let ids: Vec<&str> = session
            .layout()
            .visible_columns()
            .iter()
            .map(|col| col.id.as_str())
            .take(2)
            .collect();
        assert_eq!(ids, vec!["customer", "account"]);

        assert!(matches!(
            session.handle_column_key("account", "Enter"),
            Err(DashboardError::UnknownKey(_))
        ));
    }

    #[test]
    fn drop_column_requires_edit_mode() {
        let mut session = demo_session();
        assert!(!session.drop_column("name", "account"));
        session.toggle_editing();
        assert!(session.drop_column("name", "account"));
        assert_eq!(session.layout().visible_columns()[0].id, "name");
    }

    #[test]
    fn page_window_renders_pager_range() {
        let mut session = demo_session();
        session.go_to_page(2);
        let snapshot = session.snapshot(&LiveState::default(), RowWindow::Page);
        assert_eq!(snapshot.rows.len(), DEFAULT_PAGE_SIZE);
        assert_eq!(snapshot.rows[0].id, "11");
        assert_eq!(snapshot.pager.start_item, 11);
    }

    #[test]
    fn rendered_html_escapes_values_and_marks_live_cells() {
        let rows = vec![AccountRow {
            id: "1".to_string(),
            account: "<script>".to_string(),
            ..AccountRow::default()
        }];
        let session = session_with(rows, &SessionSettings::default());
        let html = render_dashboard_html(&session.snapshot(&LiveState::default(), RowWindow::Lazy));

        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("data-change=\"same\""));
        assert!(html.contains("Total PnL"));
        assert!(html.contains("Connecting"));
        assert!(!html.contains("id=\"load-more\""));
    }
}
