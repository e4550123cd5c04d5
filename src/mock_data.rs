//! Mock account dataset: randomized generator and headerless CSV blob loader.

use std::collections::HashSet;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{format_currency, format_signed_percent, AccountRow, ALL_ROW_FIELDS};
use crate::random::{RandomSource, StdRandom};

pub const DEMO_ROW_COUNT: usize = 100;
pub const DEMO_SEED: u64 = 20_250_710;

const FIRST_NAMES: [&str; 20] = [
    "Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack", "Kate",
    "Liam", "Mia", "Noah", "Olivia", "Peter", "Quinn", "Rachel", "Sam", "Tina",
];
const LAST_NAMES: [&str; 20] = [
    "Johnson",
    "Smith",
    "Brown",
    "Davis",
    "Miller",
    "Wilson",
    "Moore",
    "Taylor",
    "Anderson",
    "Thomas",
    "Jackson",
    "White",
    "Harris",
    "Martin",
    "Garcia",
    "Martinez",
    "Robinson",
    "Clark",
    "Rodriguez",
    "Lewis",
];
pub const PLATFORM_OPTIONS: [&str; 5] = [
    "MetaTrader 4",
    "MetaTrader 5",
    "cTrader",
    "DXTrade",
    "TradingView",
];
const STATUSES: [&str; 5] = ["Active", "Inactive", "Pending", "Suspended", "Closed"];
pub const PROGRAM_OPTIONS: [&str; 5] = ["Standard", "Premium", "VIP", "Demo", "Professional"];
const PLATFORM_STATUSES: [&str; 5] = [
    "Connected",
    "Disconnected",
    "Error",
    "Maintenance",
    "Testing",
];
pub const ACCOUNT_TYPE_OPTIONS: [&str; 5] = ["Live", "Demo", "Practice", "Paper", "Simulation"];
const SERVER_GROUPS: [&str; 5] = [
    "SG-USA-01",
    "SG-EUR-02",
    "SG-ASIA-03",
    "SG-UK-04",
    "SG-AU-05",
];
const CITIES: [&str; 10] = [
    "New York",
    "London",
    "Tokyo",
    "Sydney",
    "Toronto",
    "Berlin",
    "Paris",
    "Madrid",
    "Rome",
    "Amsterdam",
];
const STATES: [&str; 10] = ["NY", "CA", "TX", "FL", "IL", "PA", "OH", "GA", "NC", "MI"];
pub const COUNTRY_OPTIONS: [&str; 10] = [
    "USA",
    "UK",
    "Germany",
    "France",
    "Canada",
    "Australia",
    "Japan",
    "Spain",
    "Italy",
    "Netherlands",
];
const BREACH_REASONS: [&str; 8] = [
    "Daily Loss Limit",
    "Max Loss Limit",
    "Consistency Rule",
    "News Trading",
    "Weekend Gap",
    "Lot Size Violation",
    "Time Violation",
    "No Breach",
];

#[derive(Debug, Error)]
pub enum MockDataError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fixed 100-row dataset served by the demo dashboard.
pub fn demo_rows() -> Vec<AccountRow> {
    generate_mock_rows(DEMO_ROW_COUNT, &mut StdRandom::seeded(DEMO_SEED))
}

pub fn generate_mock_rows(count: usize, rng: &mut dyn RandomSource) -> Vec<AccountRow> {
    (1..=count).map(|id| generate_row(id, rng)).collect()
}

fn generate_row(id: usize, rng: &mut dyn RandomSource) -> AccountRow {
    let first_name = pick(&FIRST_NAMES, rng);
    let last_name = pick(&LAST_NAMES, rng);
    let platform = pick(&PLATFORM_OPTIONS, rng);
    let status = pick(&STATUSES, rng);

    let balance = rng.next_unit() * 100_000.0 + 1_000.0;
    let equity = balance * (0.9 + rng.next_unit() * 0.2);
    let pnl = equity - balance;
    let growth = pnl / balance * 100.0;

    let month = rng.next_index(12) as u32 + 1;
    let day = rng.next_index(28) as u32 + 1;
    let date = NaiveDate::from_ymd_opt(2024, month, day)
        .map(|d| d.format("%-m/%-d/%Y").to_string())
        .unwrap_or_default();

    let phone = (rng.next_unit() * 9_000_000_000.0 + 1_000_000_000.0).floor() as u64;
    let zip = (rng.next_unit() * 90_000.0 + 10_000.0).floor() as u32;

    AccountRow {
        id: id.to_string(),
        account: format!("ACC{id:03}"),
        customer: format!("Cust{}", char::from(b'A' + (id % 26) as u8)),
        order_nr: format!("ORD{}", 1000 + id),
        name: format!("{first_name} {last_name}"),
        balance: format_currency(balance),
        equity: format_currency(equity),
        growth: format_signed_percent(growth),
        pnl: format_currency(pnl),
        program: pick(&PROGRAM_OPTIONS, rng).to_string(),
        platform: platform.to_string(),
        platform_status: pick(&PLATFORM_STATUSES, rng).to_string(),
        upgraded: if rng.chance(0.5) { "Yes" } else { "No" }.to_string(),
        upgraded_account: tagged_or_na("UPG", id, 0.3, rng),
        repeated_account: tagged_or_na("REP", id, 0.2, rng),
        reset_account: tagged_or_na("RST", id, 0.1, rng),
        status: status.to_string(),
        account_type: pick(&ACCOUNT_TYPE_OPTIONS, rng).to_string(),
        server_group: pick(&SERVER_GROUPS, rng).to_string(),
        date,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: format!(
            "{}.{}@email.com",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        ),
        phone: format!("+1{phone}"),
        zip_code: zip.to_string(),
        city: pick(&CITIES, rng).to_string(),
        state: pick(&STATES, rng).to_string(),
        country: pick(&COUNTRY_OPTIONS, rng).to_string(),
        breach_reason: pick(&BREACH_REASONS, rng).to_string(),
    }
}

fn pick<'a>(options: &[&'a str], rng: &mut dyn RandomSource) -> &'a str {
    options[rng.next_index(options.len())]
}

fn tagged_or_na(prefix: &str, id: usize, probability: f64, rng: &mut dyn RandomSource) -> String {
    if rng.chance(probability) {
        format!("{prefix}{id:03}")
    } else {
        "N/A".to_string()
    }
}

/// Parses a headerless, double-quoted CSV blob whose columns follow
/// [`ALL_ROW_FIELDS`] order.
///
/// Short records and duplicate ids are skipped with a warning.
pub fn parse_account_csv(text: &str) -> Result<Vec<AccountRow>, MockDataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::Fields)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut skipped = 0usize;

    for (line_idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        if record.len() < ALL_ROW_FIELDS.len() {
            warn!(
                component = "mock_data",
                event = "mock_data.csv.short_record",
                line = line_idx + 1,
                fields = record.len(),
                expected = ALL_ROW_FIELDS.len()
            );
            skipped += 1;
            continue;
        }

        let mut row = AccountRow::default();
        for (field, value) in ALL_ROW_FIELDS.iter().zip(record.iter()) {
            *row.field_mut(*field) = value.to_string();
        }

        if !seen_ids.insert(row.id.clone()) {
            warn!(
                component = "mock_data",
                event = "mock_data.csv.duplicate_id",
                line = line_idx + 1,
                id = %row.id
            );
            skipped += 1;
            continue;
        }

        rows.push(row);
    }

    info!(
        component = "mock_data",
        event = "mock_data.csv.loaded",
        rows = rows.len(),
        skipped
    );

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_display_number, parse_row_date};

    #[test]
    fn demo_rows_are_stable_and_ids_unique() {
        let a = demo_rows();
        let b = demo_rows();
        assert_eq!(a.len(), DEMO_ROW_COUNT);
        assert_eq!(a, b);

        let ids: HashSet<_> = a.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids.len(), a.len());
    }

    #[test]
    fn generated_rows_follow_display_conventions() {
        let rows = generate_mock_rows(25, &mut StdRandom::seeded(7));

        for row in &rows {
            assert!(row.balance.starts_with('$'));
            assert!(row.growth.ends_with('%'));
            assert!(row.account.starts_with("ACC"));
            assert!(parse_row_date(&row.date).is_some(), "date {}", row.date);

            let balance = parse_display_number(&row.balance);
            let equity = parse_display_number(&row.equity);
            let pnl = parse_display_number(&row.pnl);
            assert!((equity - balance - pnl).abs() < 0.02);
        }
        assert_eq!(rows[0].account, "ACC001");
        assert_eq!(rows[0].order_nr, "ORD1001");
        assert_eq!(rows[0].customer, "CustB");
    }

    fn csv_line(id: &str, account: &str) -> String {
        let mut fields = vec![format!("\"{id}\""), format!("\"{account}\"")];
        fields.extend((2..ALL_ROW_FIELDS.len()).map(|idx| format!("\"f{idx}\"")));
        fields.join(",")
    }

    #[test]
    fn csv_blob_maps_positional_fields() {
        let blob = format!(
            "{}\n{}\n",
            csv_line("1", "ACC001"),
            csv_line("2", "ACC, with comma")
        );
        let rows = parse_account_csv(&blob).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].account, "ACC001");
        assert_eq!(rows[1].account, "ACC, with comma");
        assert_eq!(rows[0].customer, "f2");
        assert_eq!(rows[0].breach_reason, format!("f{}", ALL_ROW_FIELDS.len() - 1));
    }

    #[test]
    fn csv_blob_skips_short_records_and_duplicate_ids() {
        let blob = format!(
            "{}\n\"9\",\"short\"\n{}\n",
            csv_line("1", "ACC001"),
            csv_line("1", "ACC-dup")
        );
        let rows = parse_account_csv(&blob).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].account, "ACC001");
    }
}
