//! Column registry, layout state transitions and the persisting manager.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::RowField;
use crate::storage::{load_json, remove_key, save_json, ClientStorage, COLUMN_LAYOUT_KEY};

pub const MIN_COLUMN_WIDTH: u32 = 75;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub id: String,
    pub header: String,
    pub accessor: RowField,
    pub is_draggable: bool,
    pub is_removable: bool,
    pub is_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl ColumnDescriptor {
    fn registry(accessor: RowField, header: &str, is_visible: bool) -> Self {
        Self {
            id: accessor.key().to_string(),
            header: header.to_string(),
            accessor,
            is_draggable: true,
            is_removable: true,
            is_visible,
            width: None,
        }
    }
}

/// Every column the grid knows about, in canonical order.
pub fn column_registry() -> Vec<ColumnDescriptor> {
    use RowField::*;

    [
        (Account, "Account", true),
        (Customer, "Customer", true),
        (OrderNr, "Order Nr", true),
        (Name, "Name", true),
        (Balance, "Balance", true),
        (Equity, "Equity", true),
        (Growth, "Growth", true),
        (Pnl, "PnL", true),
        (Program, "Program", true),
        (Platform, "Platform", true),
        (PlatformStatus, "Platform Status", true),
        (Upgraded, "Upgraded", true),
        (UpgradedAccount, "Upgraded Account", false),
        (RepeatedAccount, "Repeated Account", false),
        (ResetAccount, "Reset Account", false),
        (Status, "Status", true),
        (Type, "Type", true),
        (ServerGroup, "Server Group", true),
        (Date, "Date", true),
        (FirstName, "First Name", true),
        (LastName, "Last Name", true),
        (Email, "Email", true),
        (Phone, "Phone", false),
        (ZipCode, "Zip Code", false),
        (City, "City", true),
        (State, "State", false),
        (Country, "Country", true),
        (BreachReason, "Breach Reason", true),
    ]
    .into_iter()
    .map(|(accessor, header, visible)| ColumnDescriptor::registry(accessor, header, visible))
    .collect()
}

pub fn registry_column(id: &str) -> Option<ColumnDescriptor> {
    column_registry().into_iter().find(|col| col.id == id)
}

/// Registry columns flagged visible by default.
pub fn default_columns() -> Vec<ColumnDescriptor> {
    column_registry()
        .into_iter()
        .filter(|col| col.is_visible)
        .collect()
}

/// Persisted per-column customization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedColumn {
    pub id: String,
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<ColumnDescriptor>,
    is_editing: bool,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            is_editing: false,
        }
    }
}

impl ColumnLayout {
    pub fn from_columns(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            is_editing: false,
        }
    }

    /// Merges persisted entries against the registry.
    ///
    /// Unknown and duplicate ids are dropped. Registry columns missing from
    /// `saved` but visible by default are appended.
    pub fn from_persisted(saved: &[PersistedColumn]) -> Self {
        let registry = column_registry();
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(registry.len());

        for entry in saved {
            if !seen.insert(entry.id.as_str()) {
                continue;
            }
            if let Some(base) = registry.iter().find(|col| col.id == entry.id) {
                columns.push(ColumnDescriptor {
                    is_visible: entry.is_visible,
                    width: entry.width.or(base.width).map(clamp_width),
                    ..base.clone()
                });
            }
        }

        for col in &registry {
            if col.is_visible && !seen.contains(col.id.as_str()) {
                columns.push(col.clone());
            }
        }

        Self::from_columns(columns)
    }

    pub fn to_persisted(&self) -> Vec<PersistedColumn> {
        self.columns
            .iter()
            .map(|col| PersistedColumn {
                id: col.id.clone(),
                is_visible: col.is_visible,
                width: col.width,
            })
            .collect()
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn visible_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|col| col.is_visible).collect()
    }

    pub fn column(&self, id: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|col| col.id == id)
    }

    pub fn is_editing(&self) -> bool {
        self.is_editing
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.id == id)
    }

    /// Moves `dragged_id` into the slot `target_id` occupied before the move.
    pub fn reorder(&mut self, dragged_id: &str, target_id: &str) -> bool {
        if dragged_id == target_id {
            return false;
        }
        let (Some(from), Some(to)) = (self.position(dragged_id), self.position(target_id)) else {
            return false;
        };

        let dragged = self.columns.remove(from);
        self.columns.insert(to, dragged);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        match self.columns.iter_mut().find(|col| col.id == id) {
            Some(col) if col.is_visible => {
                col.is_visible = false;
                true
            }
            _ => false,
        }
    }

    /// Flips visibility, materializing registry columns that are not in the
    /// layout yet.
    pub fn toggle_visibility(&mut self, id: &str) -> bool {
        if let Some(col) = self.columns.iter_mut().find(|col| col.id == id) {
            col.is_visible = !col.is_visible;
            return true;
        }

        match registry_column(id) {
            Some(col) => {
                self.columns.push(ColumnDescriptor {
                    is_visible: true,
                    ..col
                });
                true
            }
            None => false,
        }
    }

    pub fn set_width(&mut self, id: &str, width: i64) -> bool {
        let width = clamp_width_signed(width);
        match self.columns.iter_mut().find(|col| col.id == id) {
            Some(col) if col.width != Some(width) => {
                col.width = Some(width);
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.columns = default_columns();
    }

    pub fn toggle_editing(&mut self) -> bool {
        self.is_editing = !self.is_editing;
        self.is_editing
    }

    pub fn move_left(&mut self, id: &str) -> bool {
        self.move_among_visible(id, -1)
    }

    pub fn move_right(&mut self, id: &str) -> bool {
        self.move_among_visible(id, 1)
    }

    fn move_among_visible(&mut self, id: &str, step: isize) -> bool {
        let visible: Vec<String> = self
            .visible_columns()
            .into_iter()
            .map(|col| col.id.clone())
            .collect();
        let Some(idx) = visible.iter().position(|col_id| col_id == id) else {
            return false;
        };
        let Some(neighbor) = idx
            .checked_add_signed(step)
            .and_then(|next| visible.get(next))
        else {
            return false;
        };
        self.reorder(id, neighbor)
    }
}

fn clamp_width(width: u32) -> u32 {
    width.max(MIN_COLUMN_WIDTH)
}

fn clamp_width_signed(width: i64) -> u32 {
    u32::try_from(width.max(i64::from(MIN_COLUMN_WIDTH))).unwrap_or(u32::MAX)
}

/// Column layout bound to client storage; re-persists after every change.
pub struct ColumnManager {
    layout: ColumnLayout,
    storage: Arc<dyn ClientStorage>,
}

impl ColumnManager {
    pub fn load(storage: Arc<dyn ClientStorage>) -> Self {
        let layout = match load_json::<Vec<PersistedColumn>>(storage.as_ref(), COLUMN_LAYOUT_KEY) {
            Some(saved) => ColumnLayout::from_persisted(&saved),
            None => ColumnLayout::default(),
        };

        info!(
            component = "columns",
            event = "columns.load",
            columns = layout.columns().len(),
            visible = layout.visible_columns().len()
        );

        Self { layout, storage }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn reorder(&mut self, dragged_id: &str, target_id: &str) -> bool {
        let changed = self.layout.reorder(dragged_id, target_id);
        if changed {
            debug!(
                component = "columns",
                event = "columns.reorder",
                dragged_id,
                target_id
            );
        }
        self.persist_if(changed)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let changed = self.layout.remove(id);
        self.persist_if(changed)
    }

    pub fn toggle_visibility(&mut self, id: &str) -> bool {
        let changed = self.layout.toggle_visibility(id);
        self.persist_if(changed)
    }

    pub fn set_width(&mut self, id: &str, width: i64) -> bool {
        let changed = self.layout.set_width(id, width);
        self.persist_if(changed)
    }

    pub fn move_left(&mut self, id: &str) -> bool {
        let changed = self.layout.move_left(id);
        self.persist_if(changed)
    }

    pub fn move_right(&mut self, id: &str) -> bool {
        let changed = self.layout.move_right(id);
        self.persist_if(changed)
    }

    pub fn reset(&mut self) {
        self.layout.reset();
        remove_key(self.storage.as_ref(), COLUMN_LAYOUT_KEY);
        info!(component = "columns", event = "columns.reset");
    }

    pub fn toggle_editing(&mut self) -> bool {
        let editing = self.layout.toggle_editing();
        debug!(component = "columns", event = "columns.editing", editing);
        editing
    }

    fn persist_if(&self, changed: bool) -> bool {
        if changed {
            save_json(
                self.storage.as_ref(),
                COLUMN_LAYOUT_KEY,
                &self.layout.to_persisted(),
            );
        }
        changed
    }
}
