//! Summary figures over the filtered rows.

use serde::Serialize;

use crate::model::{format_currency, parse_display_number, AccountRow};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiHighlight {
    pub value: f64,
    pub account: String,
    pub row_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_pnl: f64,
    pub largest_profit: KpiHighlight,
    pub largest_loss: KpiHighlight,
    pub profitable_count: usize,
    pub row_count: usize,
}

impl KpiSummary {
    pub fn total_pnl_display(&self) -> String {
        format_currency(self.total_pnl)
    }

    /// Share of rows with positive pnl, in percent.
    pub fn profitable_share(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.profitable_count as f64 / self.row_count as f64 * 100.0
        }
    }
}

pub fn aggregate_kpis<'a, I>(rows: I) -> KpiSummary
where
    I: IntoIterator<Item = &'a AccountRow>,
{
    let mut summary = KpiSummary::default();
    let mut seen_any = false;

    for row in rows {
        let pnl = parse_display_number(&row.pnl);
        summary.total_pnl += pnl;
        summary.row_count += 1;
        if pnl > 0.0 {
            summary.profitable_count += 1;
        }

        if !seen_any || pnl > summary.largest_profit.value {
            summary.largest_profit = highlight(row, pnl);
        }
        if !seen_any || pnl < summary.largest_loss.value {
            summary.largest_loss = highlight(row, pnl);
        }
        seen_any = true;
    }

    summary
}

fn highlight(row: &AccountRow, value: f64) -> KpiHighlight {
    KpiHighlight {
        value,
        account: row.account.clone(),
        row_id: row.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, pnl: &str) -> AccountRow {
        AccountRow {
            id: id.to_string(),
            account: format!("ACC{id}"),
            pnl: pnl.to_string(),
            ..AccountRow::default()
        }
    }

    #[test]
    fn mixed_values_with_garbage_as_zero() {
        let rows = vec![row("1", "$100.00"), row("2", "-$50.00"), row("3", "abc")];
        let kpi = aggregate_kpis(&rows);

        assert_eq!(kpi.total_pnl, 50.0);
        assert_eq!(kpi.largest_profit.value, 100.0);
        assert_eq!(kpi.largest_profit.account, "ACC1");
        assert_eq!(kpi.largest_loss.value, -50.0);
        assert_eq!(kpi.largest_loss.row_id, "2");
        assert_eq!(kpi.profitable_count, 1);
        assert_eq!(kpi.row_count, 3);
        assert_eq!(kpi.total_pnl_display(), "$50.00");
    }

    #[test]
    fn ties_keep_first_occurrence() {
        let rows = vec![row("1", "$10.00"), row("2", "$10.00"), row("3", "$10.00")];
        let kpi = aggregate_kpis(&rows);
        assert_eq!(kpi.largest_profit.row_id, "1");
        assert_eq!(kpi.largest_loss.row_id, "1");
    }

    #[test]
    fn all_losses_report_least_negative_as_largest_profit() {
        let rows = vec![row("1", "-$5.00"), row("2", "-$1.00")];
        let kpi = aggregate_kpis(&rows);
        assert_eq!(kpi.largest_profit.value, -1.0);
        assert_eq!(kpi.largest_loss.value, -5.0);
        assert_eq!(kpi.profitable_count, 0);
    }

    #[test]
    fn empty_input_is_zeroed() {
        let kpi = aggregate_kpis(std::iter::empty());
        assert_eq!(kpi, KpiSummary::default());
        assert_eq!(kpi.profitable_share(), 0.0);
    }
}
