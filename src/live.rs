//! Simulated live updates for the equity, growth and pnl cells.
//!
//! [`LiveValueSimulator`] is a pure overlay: the caller passes the clock and
//! the randomness in. [`spawn_live_feed`] drives it from a tokio task.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::model::{format_currency, format_signed_percent, parse_display_number, AccountRow, RowField};
use crate::random::RandomSource;

pub const SETTLE_AFTER: Duration = Duration::from_secs(3);
pub const CONNECT_DELAY: Duration = Duration::from_secs(1);
pub const MIN_TICK_DELAY: Duration = Duration::from_secs(2);
pub const MAX_TICK_DELAY: Duration = Duration::from_secs(5);

const MIN_ROWS_PER_TICK: usize = 3;
const EXTRA_ROWS_PER_TICK: usize = 6;
const MAX_RELATIVE_DELTA: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveField {
    Equity,
    Growth,
    Pnl,
}

impl LiveField {
    pub const ALL: [LiveField; 3] = [LiveField::Equity, LiveField::Growth, LiveField::Pnl];

    pub fn row_field(self) -> RowField {
        match self {
            LiveField::Equity => RowField::Equity,
            LiveField::Growth => RowField::Growth,
            LiveField::Pnl => RowField::Pnl,
        }
    }

    pub fn from_row_field(field: RowField) -> Option<Self> {
        match field {
            RowField::Equity => Some(LiveField::Equity),
            RowField::Growth => Some(LiveField::Growth),
            RowField::Pnl => Some(LiveField::Pnl),
            _ => None,
        }
    }

    fn format(self, value: f64) -> String {
        match self {
            LiveField::Growth => format_signed_percent(value),
            LiveField::Equity | LiveField::Pnl => format_currency(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Increase,
    Decrease,
    #[default]
    Same,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveUpdate {
    pub value: String,
    pub change: ChangeDirection,
    /// `None` once the highlight has settled.
    pub settles_at: Option<Instant>,
}

/// What a renderer shows in a live-capable cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveCell {
    pub value: String,
    pub change: ChangeDirection,
}

#[derive(Debug, Clone, Default)]
pub struct LiveValueSimulator {
    updates: HashMap<String, HashMap<LiveField, LiveUpdate>>,
}

impl LiveValueSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one batch of updates to a random subset of `rows`.
    ///
    /// Returns the number of cells written.
    pub fn tick(&mut self, rows: &[AccountRow], rng: &mut dyn RandomSource, now: Instant) -> usize {
        if rows.is_empty() {
            return 0;
        }

        let count = (MIN_ROWS_PER_TICK + rng.next_index(EXTRA_ROWS_PER_TICK)).min(rows.len());
        let mut order: Vec<usize> = (0..rows.len()).collect();
        for i in 0..count {
            let j = i + rng.next_index(rows.len() - i);
            order.swap(i, j);
        }

        let settles_at = Some(now + SETTLE_AFTER);
        let batch: Vec<(String, LiveField, LiveUpdate)> = order[..count]
            .iter()
            .map(|&idx| {
                let row = &rows[idx];
                let field = LiveField::ALL[rng.next_index(LiveField::ALL.len())];
                let delta = (rng.next_unit() - 0.5) * MAX_RELATIVE_DELTA;

                let base = parse_display_number(row.field(field.row_field()));
                let next = base * (1.0 + delta);
                let change = if next > base {
                    ChangeDirection::Increase
                } else if next < base {
                    ChangeDirection::Decrease
                } else {
                    ChangeDirection::Same
                };

                let update = LiveUpdate {
                    value: field.format(next),
                    change,
                    settles_at,
                };
                (row.id.clone(), field, update)
            })
            .collect();

        for (row_id, field, update) in batch {
            self.updates.entry(row_id).or_default().insert(field, update);
        }

        debug!(component = "live", event = "live.tick", cells = count);
        count
    }

    /// Downgrades every highlight whose deadline has passed to `same`.
    pub fn settle_due(&mut self, now: Instant) -> usize {
        let mut settled = 0;
        for update in self.updates.values_mut().flat_map(|fields| fields.values_mut()) {
            if update.settles_at.is_some_and(|deadline| deadline <= now) {
                update.change = ChangeDirection::Same;
                update.settles_at = None;
                settled += 1;
            }
        }
        settled
    }

    pub fn next_settle_deadline(&self) -> Option<Instant> {
        self.updates
            .values()
            .flat_map(|fields| fields.values())
            .filter_map(|update| update.settles_at)
            .min()
    }

    pub fn update(&self, row_id: &str, field: LiveField) -> Option<&LiveUpdate> {
        self.updates.get(row_id).and_then(|fields| fields.get(&field))
    }

    pub fn cell(&self, row_id: &str, field: LiveField, original: &str) -> LiveCell {
        match self.update(row_id, field) {
            Some(update) => LiveCell {
                value: update.value.clone(),
                change: update.change,
            },
            None => LiveCell {
                value: original.to_string(),
                change: ChangeDirection::Same,
            },
        }
    }

    pub fn tracked_cells(&self) -> usize {
        self.updates.values().map(HashMap::len).sum()
    }

    pub fn next_tick_delay(rng: &mut dyn RandomSource) -> Duration {
        let span = (MAX_TICK_DELAY - MIN_TICK_DELAY).as_secs_f64();
        MIN_TICK_DELAY + Duration::from_secs_f64(rng.next_unit() * span)
    }
}

/// Supplies the rows a tick picks from.
pub trait LiveRowSource: Send + Sync + 'static {
    fn live_rows(&self) -> Vec<AccountRow>;
}

impl LiveRowSource for Vec<AccountRow> {
    fn live_rows(&self) -> Vec<AccountRow> {
        self.clone()
    }
}

#[derive(Debug, Default)]
pub struct LiveState {
    pub simulator: LiveValueSimulator,
    pub connected: bool,
}

pub type SharedLiveState = Arc<RwLock<LiveState>>;

/// Owns the feed task; dropping it stops every pending timer.
pub struct LiveFeedHandle {
    state: SharedLiveState,
    task: JoinHandle<()>,
}

impl LiveFeedHandle {
    pub fn state(&self) -> &SharedLiveState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .read()
            .expect("live state lock should not be poisoned")
            .connected
    }
}

impl Drop for LiveFeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the feed on the current tokio runtime.
pub fn spawn_live_feed(
    source: Arc<dyn LiveRowSource>,
    rng: Box<dyn RandomSource>,
) -> LiveFeedHandle {
    let state = SharedLiveState::default();
    let task = tokio::spawn(run_feed(source, Arc::clone(&state), rng));
    LiveFeedHandle { state, task }
}

async fn run_feed(
    source: Arc<dyn LiveRowSource>,
    state: SharedLiveState,
    mut rng: Box<dyn RandomSource>,
) {
    tokio::time::sleep(CONNECT_DELAY).await;
    state
        .write()
        .expect("live state lock should not be poisoned")
        .connected = true;
    info!(component = "live", event = "live.connected");

    let mut next_tick = Instant::now() + LiveValueSimulator::next_tick_delay(rng.as_mut());
    loop {
        let wake = state
            .read()
            .expect("live state lock should not be poisoned")
            .simulator
            .next_settle_deadline()
            .map_or(next_tick, |deadline| deadline.min(next_tick));
        tokio::time::sleep_until(wake).await;

        let now = Instant::now();
        let due_tick = now >= next_tick;
        let rows = due_tick.then(|| source.live_rows());

        {
            let mut guard = state.write().expect("live state lock should not be poisoned");
            guard.simulator.settle_due(now);
            if let Some(rows) = rows.as_deref() {
                guard.simulator.tick(rows, rng.as_mut(), now);
            }
        }

        if due_tick {
            next_tick = now + LiveValueSimulator::next_tick_delay(rng.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;

    fn sample_rows(count: usize) -> Vec<AccountRow> {
        (1..=count)
            .map(|id| AccountRow {
                id: id.to_string(),
                equity: "$1,000.00".to_string(),
                growth: "+2.00%".to_string(),
                pnl: "-$100.00".to_string(),
                ..AccountRow::default()
            })
            .collect()
    }

    #[test]
    fn untracked_cell_returns_original_and_same() {
        let sim = LiveValueSimulator::new();
        let cell = sim.cell("42", LiveField::Equity, "$5.00");
        assert_eq!(cell.value, "$5.00");
        assert_eq!(cell.change, ChangeDirection::Same);
    }

    #[test]
    fn scripted_tick_produces_exact_values() {
        let rows = sample_rows(4);
        let mut sim = LiveValueSimulator::new();
        let mut rng = ScriptedRandom::new(vec![
            0.0, // three rows
            0.5, 0.0, 0.0, // selection: rows[2], rows[1], rows[0]
            0.0, 0.7, // equity +2%
            0.4, 0.3, // growth -2%
            0.9, 0.5, // pnl unchanged
        ]);
        let now = Instant::now();

        assert_eq!(sim.tick(&rows, &mut rng, now), 3);
        assert_eq!(sim.tracked_cells(), 3);

        let equity = sim.cell("3", LiveField::Equity, &rows[2].equity);
        assert_eq!(equity.value, "$1,020.00");
        assert_eq!(equity.change, ChangeDirection::Increase);

        let growth = sim.cell("2", LiveField::Growth, &rows[1].growth);
        assert_eq!(growth.value, "+1.96%");
        assert_eq!(growth.change, ChangeDirection::Decrease);

        let pnl = sim.cell("1", LiveField::Pnl, &rows[0].pnl);
        assert_eq!(pnl.value, "-$100.00");
        assert_eq!(pnl.change, ChangeDirection::Same);

        assert_eq!(sim.cell("4", LiveField::Equity, "$1,000.00").change, ChangeDirection::Same);
        assert_eq!(sim.next_settle_deadline(), Some(now + SETTLE_AFTER));
    }

    #[test]
    fn tick_count_is_clamped_to_row_count() {
        let rows = sample_rows(2);
        let mut sim = LiveValueSimulator::new();
        let mut rng = ScriptedRandom::new(vec![0.99]);
        assert_eq!(sim.tick(&rows, &mut rng, Instant::now()), 2);
        assert_eq!(sim.tick(&[], &mut rng, Instant::now()), 0);
    }

    #[test]
    fn settle_keeps_value_and_clears_highlight() {
        let rows = sample_rows(3);
        let mut sim = LiveValueSimulator::new();
        let mut rng = ScriptedRandom::new(vec![0.0]);
        let start = Instant::now();

        sim.tick(&rows, &mut rng, start);
        let before = sim.cell("1", LiveField::Equity, "x");
        assert_eq!(before.change, ChangeDirection::Decrease);

        assert_eq!(sim.settle_due(start + Duration::from_secs(2)), 0);
        assert_eq!(sim.settle_due(start + SETTLE_AFTER), 3);

        let after = sim.cell("1", LiveField::Equity, "x");
        assert_eq!(after.value, before.value);
        assert_eq!(after.change, ChangeDirection::Same);
        assert_eq!(sim.next_settle_deadline(), None);
    }

    #[test]
    fn tick_delay_stays_within_bounds() {
        let mut low = ScriptedRandom::new(vec![0.0]);
        let mut high = ScriptedRandom::new(vec![0.999_999]);
        assert_eq!(LiveValueSimulator::next_tick_delay(&mut low), MIN_TICK_DELAY);
        assert!(LiveValueSimulator::next_tick_delay(&mut high) < MAX_TICK_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn feed_connects_then_ticks_and_stops_on_drop() {
        let rows = sample_rows(4);
        let handle = spawn_live_feed(Arc::new(rows), Box::new(ScriptedRandom::new(vec![0.0])));
        let state = Arc::clone(handle.state());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_connected());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(handle.is_connected());
        assert_eq!(state.read().unwrap().simulator.tracked_cells(), 0);

        // first tick lands 2s after connecting
        tokio::time::sleep(Duration::from_secs(2)).await;
        {
            let guard = state.read().unwrap();
            assert_eq!(guard.simulator.tracked_cells(), 3);
            let cell = guard.simulator.cell("1", LiveField::Equity, "x");
            assert_eq!(cell.value, "$950.00");
            assert_eq!(cell.change, ChangeDirection::Decrease);
        }

        drop(handle);
        tokio::time::sleep(Duration::from_secs(10)).await;
        let guard = state.read().unwrap();
        assert_eq!(
            guard.simulator.cell("1", LiveField::Equity, "x").change,
            ChangeDirection::Decrease
        );
    }
}
