//! Account row model, field accessors and display-string parsing.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRow {
    pub id: String,
    pub account: String,
    pub customer: String,
    pub order_nr: String,
    pub name: String,
    pub balance: String,
    pub equity: String,
    pub growth: String,
    pub pnl: String,
    pub program: String,
    pub platform: String,
    pub platform_status: String,
    pub upgraded: String,
    pub upgraded_account: String,
    pub repeated_account: String,
    pub reset_account: String,
    pub status: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub server_group: String,
    pub date: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub zip_code: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub breach_reason: String,
}

/// Every addressable field of an [`AccountRow`], in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowField {
    Id,
    Account,
    Customer,
    OrderNr,
    Name,
    Balance,
    Equity,
    Growth,
    Pnl,
    Program,
    Platform,
    PlatformStatus,
    Upgraded,
    UpgradedAccount,
    RepeatedAccount,
    ResetAccount,
    Status,
    #[serde(rename = "type")]
    Type,
    ServerGroup,
    Date,
    FirstName,
    LastName,
    Email,
    Phone,
    ZipCode,
    City,
    State,
    Country,
    BreachReason,
}

pub const ALL_ROW_FIELDS: [RowField; 29] = [
    RowField::Id,
    RowField::Account,
    RowField::Customer,
    RowField::OrderNr,
    RowField::Name,
    RowField::Balance,
    RowField::Equity,
    RowField::Growth,
    RowField::Pnl,
    RowField::Program,
    RowField::Platform,
    RowField::PlatformStatus,
    RowField::Upgraded,
    RowField::UpgradedAccount,
    RowField::RepeatedAccount,
    RowField::ResetAccount,
    RowField::Status,
    RowField::Type,
    RowField::ServerGroup,
    RowField::Date,
    RowField::FirstName,
    RowField::LastName,
    RowField::Email,
    RowField::Phone,
    RowField::ZipCode,
    RowField::City,
    RowField::State,
    RowField::Country,
    RowField::BreachReason,
];

impl RowField {
    pub fn key(self) -> &'static str {
        match self {
            RowField::Id => "id",
            RowField::Account => "account",
            RowField::Customer => "customer",
            RowField::OrderNr => "orderNr",
            RowField::Name => "name",
            RowField::Balance => "balance",
            RowField::Equity => "equity",
            RowField::Growth => "growth",
            RowField::Pnl => "pnl",
            RowField::Program => "program",
            RowField::Platform => "platform",
            RowField::PlatformStatus => "platformStatus",
            RowField::Upgraded => "upgraded",
            RowField::UpgradedAccount => "upgradedAccount",
            RowField::RepeatedAccount => "repeatedAccount",
            RowField::ResetAccount => "resetAccount",
            RowField::Status => "status",
            RowField::Type => "type",
            RowField::ServerGroup => "serverGroup",
            RowField::Date => "date",
            RowField::FirstName => "firstName",
            RowField::LastName => "lastName",
            RowField::Email => "email",
            RowField::Phone => "phone",
            RowField::ZipCode => "zipCode",
            RowField::City => "city",
            RowField::State => "state",
            RowField::Country => "country",
            RowField::BreachReason => "breachReason",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        ALL_ROW_FIELDS.iter().copied().find(|field| field.key() == key)
    }
}

impl AccountRow {
    pub fn field(&self, field: RowField) -> &str {
        match field {
            RowField::Id => &self.id,
            RowField::Account => &self.account,
            RowField::Customer => &self.customer,
            RowField::OrderNr => &self.order_nr,
            RowField::Name => &self.name,
            RowField::Balance => &self.balance,
            RowField::Equity => &self.equity,
            RowField::Growth => &self.growth,
            RowField::Pnl => &self.pnl,
            RowField::Program => &self.program,
            RowField::Platform => &self.platform,
            RowField::PlatformStatus => &self.platform_status,
            RowField::Upgraded => &self.upgraded,
            RowField::UpgradedAccount => &self.upgraded_account,
            RowField::RepeatedAccount => &self.repeated_account,
            RowField::ResetAccount => &self.reset_account,
            RowField::Status => &self.status,
            RowField::Type => &self.account_type,
            RowField::ServerGroup => &self.server_group,
            RowField::Date => &self.date,
            RowField::FirstName => &self.first_name,
            RowField::LastName => &self.last_name,
            RowField::Email => &self.email,
            RowField::Phone => &self.phone,
            RowField::ZipCode => &self.zip_code,
            RowField::City => &self.city,
            RowField::State => &self.state,
            RowField::Country => &self.country,
            RowField::BreachReason => &self.breach_reason,
        }
    }

    pub fn field_mut(&mut self, field: RowField) -> &mut String {
        match field {
            RowField::Id => &mut self.id,
            RowField::Account => &mut self.account,
            RowField::Customer => &mut self.customer,
            RowField::OrderNr => &mut self.order_nr,
            RowField::Name => &mut self.name,
            RowField::Balance => &mut self.balance,
            RowField::Equity => &mut self.equity,
            RowField::Growth => &mut self.growth,
            RowField::Pnl => &mut self.pnl,
            RowField::Program => &mut self.program,
            RowField::Platform => &mut self.platform,
            RowField::PlatformStatus => &mut self.platform_status,
            RowField::Upgraded => &mut self.upgraded,
            RowField::UpgradedAccount => &mut self.upgraded_account,
            RowField::RepeatedAccount => &mut self.repeated_account,
            RowField::ResetAccount => &mut self.reset_account,
            RowField::Status => &mut self.status,
            RowField::Type => &mut self.account_type,
            RowField::ServerGroup => &mut self.server_group,
            RowField::Date => &mut self.date,
            RowField::FirstName => &mut self.first_name,
            RowField::LastName => &mut self.last_name,
            RowField::Email => &mut self.email,
            RowField::Phone => &mut self.phone,
            RowField::ZipCode => &mut self.zip_code,
            RowField::City => &mut self.city,
            RowField::State => &mut self.state,
            RowField::Country => &mut self.country,
            RowField::BreachReason => &mut self.breach_reason,
        }
    }

    /// Reference date used by the date-range filter.
    pub fn reference_date(&self) -> Option<NaiveDate> {
        parse_row_date(&self.date)
    }
}

/// Parses a display-formatted number such as `"$9,837.28"` or `"-1.63%"`.
///
/// Everything except digits, `-` and `.` is stripped first; anything that
/// still fails to parse yields `0.0`.
pub fn parse_display_number(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Formats `1234.5` as `$1,234.50` and `-1234.5` as `-$1,234.50`.
pub fn format_currency(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let grouped = group_thousands(int_part);
    if value < 0.0 && fixed != "0.00" {
        format!("-${grouped}.{frac_part}")
    } else {
        format!("${grouped}.{frac_part}")
    }
}

/// Formats `1.234` as `+1.23%` and `-1.5` as `-1.50%`.
pub fn format_signed_percent(value: f64) -> String {
    if value >= 0.0 {
        format!("+{value:.2}%")
    } else {
        format!("{value:.2}%")
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}
