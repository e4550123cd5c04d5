//! Device-independent column gestures: drag-to-reorder, resize and keyboard.
//!
//! The grid renderer feeds pointer and key events in; the machine answers
//! with the layout mutation to apply, if any. Nothing here touches storage.

use serde::{Deserialize, Serialize};

use crate::columns::ColumnLayout;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Dragging {
        source: String,
    },
    Hovering {
        source: String,
        target: String,
    },
    Resizing {
        column: String,
        start_x: i64,
        start_width: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKey {
    ArrowLeft,
    ArrowRight,
    Delete,
}

impl ColumnKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ArrowLeft" => Some(Self::ArrowLeft),
            "ArrowRight" => Some(Self::ArrowRight),
            "Delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Layout mutation requested by a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    MoveLeft(String),
    MoveRight(String),
    Remove { column: String, next_focus: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct ColumnGestures {
    state: GestureState,
    focused: Option<String>,
}

impl ColumnGestures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn drag_start(&mut self, layout: &ColumnLayout, id: &str) -> bool {
        if !layout.is_editing() {
            return false;
        }
        match layout.column(id) {
            Some(col) if col.is_draggable => {
                self.state = GestureState::Dragging {
                    source: id.to_string(),
                };
                true
            }
            _ => false,
        }
    }

    pub fn drag_over(&mut self, id: &str) {
        let source = match &self.state {
            GestureState::Dragging { source } | GestureState::Hovering { source, .. } => {
                source.clone()
            }
            _ => return,
        };
        if source != id {
            self.state = GestureState::Hovering {
                source,
                target: id.to_string(),
            };
        }
    }

    /// Ends a drag on `target`, returning `(dragged, target)` to reorder.
    pub fn drop_on(&mut self, target: &str) -> Option<(String, String)> {
        let source = match &self.state {
            GestureState::Dragging { source } | GestureState::Hovering { source, .. } => {
                source.clone()
            }
            _ => return None,
        };
        if source == target {
            return None;
        }
        self.state = GestureState::Idle;
        Some((source, target.to_string()))
    }

    pub fn drag_end(&mut self) {
        if matches!(
            self.state,
            GestureState::Dragging { .. } | GestureState::Hovering { .. }
        ) {
            self.state = GestureState::Idle;
        }
    }

    pub fn resize_start(
        &mut self,
        layout: &ColumnLayout,
        id: &str,
        start_x: i64,
        current_width: u32,
    ) -> bool {
        if !layout.is_editing() || layout.column(id).is_none() {
            return false;
        }
        self.state = GestureState::Resizing {
            column: id.to_string(),
            start_x,
            start_width: current_width,
        };
        true
    }

    /// Width for the column being resized; the layout applies the floor.
    pub fn pointer_move(&self, x: i64) -> Option<(String, i64)> {
        match &self.state {
            GestureState::Resizing {
                column,
                start_x,
                start_width,
            } => Some((column.clone(), i64::from(*start_width) + (x - start_x))),
            _ => None,
        }
    }

    pub fn pointer_up(&mut self) {
        if matches!(self.state, GestureState::Resizing { .. }) {
            self.state = GestureState::Idle;
        }
    }

    /// Keeps focus consistent with the edit flag: first visible column on
    /// entering edit mode, nothing outside it.
    pub fn sync_focus(&mut self, layout: &ColumnLayout) {
        if !layout.is_editing() {
            self.focused = None;
            self.state = GestureState::Idle;
            return;
        }
        let still_visible = self
            .focused
            .as_deref()
            .and_then(|id| layout.column(id))
            .is_some_and(|col| col.is_visible);
        if !still_visible {
            self.focused = layout.visible_columns().first().map(|col| col.id.clone());
        }
    }

    pub fn focus(&mut self, layout: &ColumnLayout, id: &str) -> bool {
        if !layout.is_editing() || !layout.column(id).is_some_and(|col| col.is_visible) {
            return false;
        }
        self.focused = Some(id.to_string());
        true
    }

    pub fn handle_key(&mut self, layout: &ColumnLayout, id: &str, key: ColumnKey) -> Option<KeyAction> {
        if !layout.is_editing() {
            return None;
        }
        let visible = layout.visible_columns();
        let idx = visible.iter().position(|col| col.id == id)?;

        match key {
            ColumnKey::ArrowRight if idx + 1 < visible.len() => {
                self.focused = Some(id.to_string());
                Some(KeyAction::MoveRight(id.to_string()))
            }
            ColumnKey::ArrowLeft if idx > 0 => {
                self.focused = Some(id.to_string());
                Some(KeyAction::MoveLeft(id.to_string()))
            }
            ColumnKey::Delete if visible[idx].is_removable => {
                let remaining: Vec<&str> = visible
                    .iter()
                    .filter(|col| col.id != id)
                    .map(|col| col.id.as_str())
                    .collect();
                let next_focus = remaining
                    .get(idx.min(remaining.len().saturating_sub(1)))
                    .map(|next| next.to_string());
                self.focused = next_focus.clone();
                Some(KeyAction::Remove {
                    column: id.to_string(),
                    next_focus,
                })
            }
            _ => None,
        }
    }
}
