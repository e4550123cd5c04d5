//! Multi-facet row filtering, active-filter chips and saved filters.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{parse_row_date, AccountRow, RowField};
use crate::storage::{load_json, save_json, ClientStorage, CURRENT_FILTERS_KEY, SAVED_FILTERS_KEY};

pub const DEFAULT_USER: &str = "Current User";

/// Fields the free-text search looks at.
pub const SEARCHABLE_FIELDS: [RowField; 7] = [
    RowField::Account,
    RowField::Customer,
    RowField::Name,
    RowField::Email,
    RowField::OrderNr,
    RowField::Program,
    RowField::Platform,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_set(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    fn contains(&self, date: Option<NaiveDate>) -> bool {
        if !self.is_set() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterState {
    pub platforms: Vec<String>,
    #[serde(deserialize_with = "deserialize_plan")]
    pub plan: Vec<String>,
    pub categories: Vec<String>,
    pub countries: Vec<String>,
    pub date_range: DateRange,
    pub search: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterDimension {
    Platform,
    Plan,
    Category,
    Country,
    DateRange,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterChip {
    pub dimension: FilterDimension,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl FilterState {
    pub fn has_active_filters(&self) -> bool {
        self.active_count() > 0
    }

    /// Number of dimensions with a criterion set.
    pub fn active_count(&self) -> usize {
        [
            !self.platforms.is_empty(),
            !self.plan.is_empty(),
            !self.categories.is_empty(),
            !self.countries.is_empty(),
            self.date_range.is_set(),
            !self.search.is_empty(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn matches(&self, row: &AccountRow) -> bool {
        member_or_empty(&self.platforms, &row.platform)
            && member_or_empty(&self.plan, &row.program)
            && member_or_empty(&self.categories, &row.account_type)
            && member_or_empty(&self.countries, &row.country)
            && self.date_range.contains(row.reference_date())
            && self.matches_search(row)
    }

    fn matches_search(&self, row: &AccountRow) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        SEARCHABLE_FIELDS
            .iter()
            .any(|field| row.field(*field).to_lowercase().contains(&needle))
    }

    fn values_mut(&mut self, dimension: FilterDimension) -> Option<&mut Vec<String>> {
        match dimension {
            FilterDimension::Platform => Some(&mut self.platforms),
            FilterDimension::Plan => Some(&mut self.plan),
            FilterDimension::Category => Some(&mut self.categories),
            FilterDimension::Country => Some(&mut self.countries),
            FilterDimension::DateRange | FilterDimension::Search => None,
        }
    }

    /// Adds `value` to a multi-select dimension, or drops it if present.
    pub fn toggle_value(&mut self, dimension: FilterDimension, value: &str) -> bool {
        let Some(values) = self.values_mut(dimension) else {
            return false;
        };
        match values.iter().position(|existing| existing == value) {
            Some(idx) => {
                values.remove(idx);
            }
            None => values.push(value.to_string()),
        }
        true
    }

    /// Removes one value from a multi-select dimension, or clears a scalar one.
    pub fn remove_single(&mut self, dimension: FilterDimension, value: Option<&str>) -> bool {
        match dimension {
            FilterDimension::DateRange => {
                let changed = self.date_range.is_set();
                self.date_range = DateRange::default();
                changed
            }
            FilterDimension::Search => {
                let changed = !self.search.is_empty();
                self.search.clear();
                changed
            }
            _ => {
                let (Some(values), Some(value)) = (self.values_mut(dimension), value) else {
                    return false;
                };
                let before = values.len();
                values.retain(|existing| existing != value);
                values.len() != before
            }
        }
    }

    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    /// Drops repeated values in each multi-select dimension, keeping first occurrences.
    pub fn dedup_values(&mut self) {
        for values in [
            &mut self.platforms,
            &mut self.plan,
            &mut self.categories,
            &mut self.countries,
        ] {
            let mut seen = HashSet::new();
            values.retain(|value| seen.insert(value.clone()));
        }
    }

    pub fn active_chips(&self) -> Vec<FilterChip> {
        let mut chips = Vec::new();
        let multi = [
            (FilterDimension::Platform, "Platform", &self.platforms),
            (FilterDimension::Plan, "Plan", &self.plan),
            (FilterDimension::Category, "Category", &self.categories),
            (FilterDimension::Country, "Country", &self.countries),
        ];
        for (dimension, prefix, values) in multi {
            chips.extend(values.iter().map(|value| FilterChip {
                dimension,
                label: format!("{prefix}: {value}"),
                value: Some(value.clone()),
            }));
        }

        if self.date_range.is_set() {
            let from = self
                .date_range
                .from
                .map_or_else(|| "Start".to_string(), |d| d.format("%b %d").to_string());
            let to = self
                .date_range
                .to
                .map_or_else(|| "End".to_string(), |d| d.format("%b %d").to_string());
            chips.push(FilterChip {
                dimension: FilterDimension::DateRange,
                label: format!("Date: {from} - {to}"),
                value: None,
            });
        }

        if !self.search.is_empty() {
            chips.push(FilterChip {
                dimension: FilterDimension::Search,
                label: format!("Search: \"{}\"", self.search),
                value: None,
            });
        }

        chips
    }
}

fn member_or_empty(selected: &[String], value: &str) -> bool {
    selected.is_empty() || selected.iter().any(|entry| entry == value)
}

/// Rows satisfying every active criterion, in dataset order.
pub fn apply_filters<'a>(rows: &'a [AccountRow], filters: &FilterState) -> Vec<&'a AccountRow> {
    rows.iter().filter(|row| filters.matches(row)).collect()
}

fn deserialize_plan<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PlanValue {
        Single(String),
        Many(Vec<String>),
        Missing(Option<()>),
    }

    Ok(match PlanValue::deserialize(deserializer)? {
        PlanValue::Single(value) if value.is_empty() => Vec::new(),
        PlanValue::Single(value) => vec![value],
        PlanValue::Many(values) => values,
        PlanValue::Missing(_) => Vec::new(),
    })
}

fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_row_date(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}"))),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterVisibility {
    #[default]
    Private,
    Support,
    Risk,
    Admin,
    #[serde(alias = "everyone")]
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFilter {
    pub id: String,
    pub name: String,
    pub filters: FilterState,
    pub visibility: FilterVisibility,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// Inputs of the save dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDraft {
    pub name: String,
    pub visibility: FilterVisibility,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SavedFilterError {
    #[error("Please enter a filter name")]
    BlankName,
    #[error("No filters to save")]
    NoActiveFilters,
    #[error("saved filter not found: {0}")]
    NotFound(String),
    #[error("saved filter {id} can only be deleted by {owner}")]
    NotOwner { id: String, owner: String },
}

/// Active filter state plus the saved-filter list, bound to client storage.
pub struct FilterSession {
    filters: FilterState,
    saved: Vec<SavedFilter>,
    draft: SaveDraft,
    current_user: String,
    storage: Arc<dyn ClientStorage>,
}

impl FilterSession {
    pub fn load(storage: Arc<dyn ClientStorage>, current_user: impl Into<String>) -> Self {
        let mut filters =
            load_json::<FilterState>(storage.as_ref(), CURRENT_FILTERS_KEY).unwrap_or_default();
        filters.dedup_values();
        let saved =
            load_json::<Vec<SavedFilter>>(storage.as_ref(), SAVED_FILTERS_KEY).unwrap_or_default();

        info!(
            component = "filters",
            event = "filters.load",
            active = filters.active_count(),
            saved = saved.len()
        );

        Self {
            filters,
            saved,
            draft: SaveDraft::default(),
            current_user: current_user.into(),
            storage,
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn saved(&self) -> &[SavedFilter] {
        &self.saved
    }

    pub fn draft(&self) -> &SaveDraft {
        &self.draft
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    pub fn replace(&mut self, mut filters: FilterState) {
        filters.dedup_values();
        self.filters = filters;
        self.persist_filters();
    }

    pub fn toggle_value(&mut self, dimension: FilterDimension, value: &str) -> bool {
        let changed = self.filters.toggle_value(dimension, value);
        if changed {
            self.persist_filters();
        }
        changed
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.filters.search = search.into();
        self.persist_filters();
    }

    pub fn set_date_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        self.filters.date_range = DateRange { from, to };
        self.persist_filters();
    }

    pub fn remove_single(&mut self, dimension: FilterDimension, value: Option<&str>) -> bool {
        let changed = self.filters.remove_single(dimension, value);
        if changed {
            self.persist_filters();
        }
        changed
    }

    pub fn clear_all(&mut self) {
        self.filters.clear_all();
        self.persist_filters();
    }

    pub fn set_draft(&mut self, draft: SaveDraft) {
        self.draft = draft;
    }

    pub fn save_draft(&mut self) -> Result<SavedFilter, SavedFilterError> {
        let draft = self.draft.clone();
        self.save(&draft.name, draft.visibility)
    }

    pub fn save(
        &mut self,
        name: &str,
        visibility: FilterVisibility,
    ) -> Result<SavedFilter, SavedFilterError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SavedFilterError::BlankName);
        }
        if !self.filters.has_active_filters() {
            return Err(SavedFilterError::NoActiveFilters);
        }

        let saved = SavedFilter {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            filters: self.filters.clone(),
            visibility,
            created_at: Utc::now(),
            created_by: self.current_user.clone(),
        };
        self.saved.push(saved.clone());
        self.persist_saved();
        self.draft = SaveDraft::default();

        info!(
            component = "filters",
            event = "filters.saved.create",
            id = %saved.id,
            name = %saved.name,
            visibility = ?saved.visibility
        );

        Ok(saved)
    }

    /// Replaces the active filters with a saved snapshot.
    pub fn load_saved(&mut self, id: &str) -> Result<&FilterState, SavedFilterError> {
        let snapshot = self
            .saved
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.filters.clone())
            .ok_or_else(|| SavedFilterError::NotFound(id.to_string()))?;

        debug!(component = "filters", event = "filters.saved.load", id);
        self.replace(snapshot);
        Ok(&self.filters)
    }

    pub fn delete_saved(&mut self, id: &str) -> Result<SavedFilter, SavedFilterError> {
        let idx = self
            .saved
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| SavedFilterError::NotFound(id.to_string()))?;

        if self.saved[idx].created_by != self.current_user {
            return Err(SavedFilterError::NotOwner {
                id: id.to_string(),
                owner: self.saved[idx].created_by.clone(),
            });
        }

        let removed = self.saved.remove(idx);
        self.persist_saved();
        info!(component = "filters", event = "filters.saved.delete", id);
        Ok(removed)
    }

    fn persist_filters(&self) {
        debug!(
            component = "filters",
            event = "filters.apply",
            active = self.filters.active_count()
        );
        save_json(self.storage.as_ref(), CURRENT_FILTERS_KEY, &self.filters);
    }

    fn persist_saved(&self) {
        save_json(self.storage.as_ref(), SAVED_FILTERS_KEY, &self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn row(id: &str, platform: &str, country: &str, date: &str) -> AccountRow {
        AccountRow {
            id: id.to_string(),
            account: format!("ACC{id}"),
            name: format!("Holder {id}"),
            email: format!("holder{id}@email.com"),
            platform: platform.to_string(),
            country: country.to_string(),
            program: "Standard".to_string(),
            account_type: "Live".to_string(),
            date: date.to_string(),
            ..AccountRow::default()
        }
    }

    fn dataset() -> Vec<AccountRow> {
        vec![
            row("1", "MetaTrader 4", "USA", "1/10/2024"),
            row("2", "MetaTrader 4", "UK", "2/10/2024"),
            row("3", "cTrader", "USA", "3/10/2024"),
            row("4", "DXTrade", "Germany", "4/10/2024"),
            row("5", "MetaTrader 4", "USA", "garbage"),
            row("6", "cTrader", "UK", "2024-06-10"),
        ]
    }

    fn ids(rows: &[&AccountRow]) -> Vec<String> {
        rows.iter().map(|row| row.id.clone()).collect()
    }

    #[test]
    fn empty_filter_is_identity() {
        let rows = dataset();
        let filtered = apply_filters(&rows, &FilterState::default());
        assert_eq!(filtered.len(), rows.len());
        assert!(filtered.iter().zip(&rows).all(|(a, b)| *a == b));
    }

    #[test]
    fn dimensions_combine_with_and_values_with_or() {
        let rows = dataset();
        let filters = FilterState {
            platforms: vec!["MetaTrader 4".to_string()],
            countries: vec!["USA".to_string()],
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &filters)), vec!["1", "5"]);

        let filters = FilterState {
            platforms: vec!["MetaTrader 4".to_string(), "cTrader".to_string()],
            countries: vec!["UK".to_string()],
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &filters)), vec!["2", "6"]);
    }

    #[test]
    fn plan_and_category_match_program_and_type() {
        let mut rows = dataset();
        rows[2].program = "VIP".to_string();
        rows[3].account_type = "Demo".to_string();

        let filters = FilterState {
            plan: vec!["VIP".to_string()],
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &filters)), vec!["3"]);

        let filters = FilterState {
            categories: vec!["Demo".to_string()],
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &filters)), vec!["4"]);
    }

    #[test]
    fn date_range_is_inclusive_and_excludes_unparseable() {
        let rows = dataset();
        let filters = FilterState {
            date_range: DateRange {
                from: NaiveDate::from_ymd_opt(2024, 2, 10),
                to: NaiveDate::from_ymd_opt(2024, 4, 10),
            },
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &filters)), vec!["2", "3", "4"]);

        let open_ended = FilterState {
            date_range: DateRange {
                from: NaiveDate::from_ymd_opt(2024, 4, 1),
                to: None,
            },
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &open_ended)), vec!["4", "6"]);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let rows = dataset();
        let by_email = FilterState {
            search: "HOLDER3@".to_string(),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &by_email)), vec!["3"]);

        let by_platform = FilterState {
            search: "dxtr".to_string(),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply_filters(&rows, &by_platform)), vec!["4"]);

        let by_country = FilterState {
            search: "germany".to_string(),
            ..FilterState::default()
        };
        assert!(apply_filters(&rows, &by_country).is_empty());
    }

    #[test]
    fn toggle_and_remove_single_edit_dimensions() {
        let mut filters = FilterState::default();
        assert!(filters.toggle_value(FilterDimension::Platform, "cTrader"));
        assert!(filters.toggle_value(FilterDimension::Platform, "DXTrade"));
        assert!(filters.toggle_value(FilterDimension::Platform, "cTrader"));
        assert_eq!(filters.platforms, vec!["DXTrade"]);
        assert!(!filters.toggle_value(FilterDimension::Search, "x"));

        filters.search = "abc".to_string();
        filters.date_range.to = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(filters.active_count(), 3);

        assert!(filters.remove_single(FilterDimension::Platform, Some("DXTrade")));
        assert!(!filters.remove_single(FilterDimension::Platform, Some("DXTrade")));
        assert!(filters.remove_single(FilterDimension::Search, None));
        assert!(filters.remove_single(FilterDimension::DateRange, None));
        assert!(!filters.has_active_filters());
    }

    #[test]
    fn chips_describe_every_active_criterion() {
        let filters = FilterState {
            platforms: vec!["cTrader".to_string()],
            countries: vec!["UK".to_string(), "USA".to_string()],
            date_range: DateRange {
                from: NaiveDate::from_ymd_opt(2024, 3, 5),
                to: None,
            },
            search: "acc".to_string(),
            ..FilterState::default()
        };
        let labels: Vec<String> = filters.active_chips().into_iter().map(|c| c.label).collect();
        assert_eq!(
            labels,
            vec![
                "Platform: cTrader",
                "Country: UK",
                "Country: USA",
                "Date: Mar 05 - End",
                "Search: \"acc\"",
            ]
        );
    }

    #[test]
    fn persisted_json_accepts_scalar_plan_and_iso_datetimes() {
        let raw = r#"{
            "platforms": ["cTrader"],
            "plan": "VIP",
            "categories": [],
            "countries": [],
            "dateRange": {"from": "2024-03-01T00:00:00.000Z"},
            "search": ""
        }"#;
        let filters: FilterState = serde_json::from_str(raw).unwrap();
        assert_eq!(filters.plan, vec!["VIP"]);
        assert_eq!(filters.date_range.from, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(filters.date_range.to, None);

        let empty_plan: FilterState = serde_json::from_str(r#"{"plan": ""}"#).unwrap();
        assert!(empty_plan.plan.is_empty());

        let round_trip: FilterState =
            serde_json::from_str(&serde_json::to_string(&filters).unwrap()).unwrap();
        assert_eq!(round_trip, filters);
    }

    fn session() -> (Arc<dyn ClientStorage>, FilterSession) {
        let storage: Arc<dyn ClientStorage> = Arc::new(MemoryStorage::new());
        let session = FilterSession::load(Arc::clone(&storage), DEFAULT_USER);
        (storage, session)
    }

    #[test]
    fn replace_collapses_repeated_values_in_order() {
        let (storage, mut session) = session();
        session.replace(FilterState {
            platforms: vec![
                "cTrader".to_string(),
                "MetaTrader 4".to_string(),
                "cTrader".to_string(),
            ],
            countries: vec!["USA".to_string(), "USA".to_string()],
            ..FilterState::default()
        });

        assert_eq!(session.filters().platforms, vec!["cTrader", "MetaTrader 4"]);
        assert_eq!(session.filters().countries, vec!["USA"]);
        assert_eq!(session.filters().active_chips().len(), 3);

        let persisted = load_json::<FilterState>(storage.as_ref(), CURRENT_FILTERS_KEY)
            .expect("filters should be persisted");
        assert_eq!(persisted.countries, vec!["USA"]);
    }

    #[test]
    fn save_rejects_blank_name_and_empty_filters() {
        let (_, mut session) = session();

        assert_eq!(
            session.save("Anything", FilterVisibility::Private),
            Err(SavedFilterError::NoActiveFilters)
        );

        session.toggle_value(FilterDimension::Country, "USA");
        assert_eq!(
            session.save("   ", FilterVisibility::Private),
            Err(SavedFilterError::BlankName)
        );
        assert!(session.saved().is_empty());
    }

    #[test]
    fn saved_filters_persist_load_and_clear_draft() {
        let (storage, mut session) = session();
        session.toggle_value(FilterDimension::Country, "USA");
        session.set_draft(SaveDraft {
            name: "  US accounts ".to_string(),
            visibility: FilterVisibility::Risk,
        });

        let saved = session.save_draft().unwrap();
        assert_eq!(saved.name, "US accounts");
        assert_eq!(saved.created_by, DEFAULT_USER);
        assert_eq!(session.draft(), &SaveDraft::default());

        session.clear_all();
        assert!(!session.filters().has_active_filters());

        let reloaded = FilterSession::load(Arc::clone(&storage), DEFAULT_USER);
        assert_eq!(reloaded.saved(), session.saved());
        assert!(!reloaded.filters().has_active_filters());

        let loaded = session.load_saved(&saved.id).unwrap();
        assert_eq!(loaded.countries, vec!["USA"]);
        assert_eq!(
            session.load_saved("missing"),
            Err(SavedFilterError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn only_creator_can_delete() {
        let (storage, mut session) = session();
        session.set_search("acc");
        let saved = session.save("mine", FilterVisibility::Global).unwrap();

        let mut other = FilterSession::load(Arc::clone(&storage), "someone else");
        assert!(matches!(
            other.delete_saved(&saved.id),
            Err(SavedFilterError::NotOwner { .. })
        ));
        assert_eq!(other.saved().len(), 1);

        session.delete_saved(&saved.id).unwrap();
        assert!(session.saved().is_empty());
        assert!(FilterSession::load(storage, DEFAULT_USER).saved().is_empty());
    }

    #[test]
    fn malformed_storage_is_treated_as_absent() {
        let storage: Arc<dyn ClientStorage> = Arc::new(MemoryStorage::new());
        storage.set(CURRENT_FILTERS_KEY, "{\"platforms\": 12").unwrap();
        storage.set(SAVED_FILTERS_KEY, "[{\"id\": 1}]").unwrap();

        let session = FilterSession::load(storage, DEFAULT_USER);
        assert_eq!(session.filters(), &FilterState::default());
        assert!(session.saved().is_empty());
    }

    #[test]
    fn legacy_everyone_visibility_maps_to_global() {
        let visibility: FilterVisibility = serde_json::from_str("\"everyone\"").unwrap();
        assert_eq!(visibility, FilterVisibility::Global);
    }
}
