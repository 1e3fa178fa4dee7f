//! Year-over-year comparison of two metric sets.

use colored::Colorize;

use crate::dates::DateWindow;
use crate::error::{ReportError, Result};
use crate::metrics::MetricSet;

/// One metric across both periods, values rounded to two decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub metric: String,
    pub prior: f64,
    pub current: f64,
    /// Signed percent change from prior to current.
    pub change_pct: f64,
}

/// Header labels plus rows in prior-period key order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonTable {
    pub prior_label: String,
    pub current_label: String,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn header(&self) -> [String; 4] {
        [
            "Metrics".to_string(),
            self.prior_label.clone(),
            self.current_label.clone(),
            "Change(%)".to_string(),
        ]
    }

    /// Header followed by one line per row, every cell as display text.
    pub fn to_records(&self) -> Vec<Vec<String>> {
        let mut records = vec![self.header().to_vec()];
        for row in &self.rows {
            records.push(vec![
                row.metric.clone(),
                format_value(row.prior),
                format_value(row.current),
                format_value(row.change_pct),
            ]);
        }
        records
    }

    /// Header plus rows, counted as spreadsheet lines.
    pub fn line_count(&self) -> usize {
        self.rows.len() + 1
    }

    /// Print the table to stdout
    pub fn print_summary(&self) {
        println!(
            "\n  {:16} {:>12} {:>12} {:>12}",
            "Metrics".dimmed(),
            self.prior_label.dimmed(),
            self.current_label.dimmed(),
            "Change(%)".dimmed()
        );
        println!("  {}", "-".repeat(55).dimmed());

        for row in &self.rows {
            let change = format!("{}%", format_value(row.change_pct));
            let change = if row.change_pct > 0.0 {
                change.green().to_string()
            } else if row.change_pct < 0.0 {
                change.red().to_string()
            } else {
                change.dimmed().to_string()
            };

            println!(
                "  {:16} {:>12} {:>12} {:>12}",
                truncate(&row.metric, 16),
                format_value(row.prior),
                format_value(row.current),
                change
            );
        }
    }
}

/// Compare `prior` against `current`, one row per prior-period metric.
pub fn compare(prior: &MetricSet, current: &MetricSet, window: &DateWindow) -> Result<ComparisonTable> {
    compare_labeled(
        prior,
        current,
        window.prior_year().to_string(),
        window.current_year().to_string(),
    )
}

pub fn compare_labeled(
    prior: &MetricSet,
    current: &MetricSet,
    prior_label: String,
    current_label: String,
) -> Result<ComparisonTable> {
    let mut rows = Vec::with_capacity(prior.len());

    for (name, prior_value) in prior.iter() {
        let current_value = current
            .get(name)
            .ok_or_else(|| ReportError::MissingMetric(name.to_string()))?;
        let change = percent_change(prior_value, current_value)
            .ok_or_else(|| ReportError::ZeroBaseline(name.to_string()))?;

        rows.push(ComparisonRow {
            metric: name.to_string(),
            prior: round2(prior_value),
            current: round2(current_value),
            change_pct: round2(change),
        });
    }

    tracing::debug!(rows = rows.len(), "comparison built");

    Ok(ComparisonTable {
        prior_label,
        current_label,
        rows,
    })
}

/// `(current / prior) * 100 - 100`; `None` when prior is zero.
///
/// Increases and decreases share this one expression: `-(100 - r)` and
/// `r - 100` are the same IEEE-754 result for every ratio `r`, differing
/// only in the sign of an exact zero, which [`round2`] normalises.
pub fn percent_change(prior: f64, current: f64) -> Option<f64> {
    if prior == 0.0 {
        return None;
    }
    Some((current / prior) * 100.0 - 100.0)
}

/// Two decimals as displayed: the nearest decimal of the exact binary value,
/// so `2.675` (stored just below) becomes `2.67`. Never yields `-0.0`.
pub fn round2(value: f64) -> f64 {
    let rounded = format_value(value).parse::<f64>().unwrap_or(value);
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn format_value(value: f64) -> String {
    format!("{:.2}", value)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(prior: &[(&str, f64)], current: &[(&str, f64)]) -> Result<ComparisonTable> {
        compare_labeled(
            &MetricSet::from_pairs(prior.iter().copied()),
            &MetricSet::from_pairs(current.iter().copied()),
            "2023".to_string(),
            "2024".to_string(),
        )
    }

    #[test]
    fn increase_is_positive() {
        let t = table(&[("clicks", 100.0)], &[("clicks", 150.0)]).unwrap();
        assert_eq!(
            t.rows,
            vec![ComparisonRow {
                metric: "clicks".to_string(),
                prior: 100.0,
                current: 150.0,
                change_pct: 50.0,
            }]
        );
    }

    #[test]
    fn decrease_is_negative() {
        let t = table(&[("clicks", 100.0)], &[("clicks", 50.0)]).unwrap();
        assert_eq!(t.rows[0].change_pct, -50.0);
        assert_eq!(
            t.to_records()[1],
            vec!["clicks", "100.00", "50.00", "-50.00"]
        );
    }

    #[test]
    fn no_change_is_positive_zero() {
        let t = table(&[("ctr", 0.0345)], &[("ctr", 0.0345)]).unwrap();
        let change = t.rows[0].change_pct;
        assert_eq!(change, 0.0);
        assert!(change.is_sign_positive());
        assert_eq!(t.to_records()[1][3], "0.00");
    }

    #[test]
    fn one_row_per_key_plus_header() {
        let prior = [
            ("clicks", 120.0),
            ("impressions", 4000.0),
            ("ctr", 0.03),
            ("position", 12.5),
        ];
        let current = [
            ("position", 9.75),
            ("ctr", 0.025),
            ("clicks", 180.0),
            ("impressions", 3900.0),
        ];
        let t = table(&prior, &current).unwrap();
        let records = t.to_records();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0], vec!["Metrics", "2023", "2024", "Change(%)"]);
        let order: Vec<&str> = t.rows.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(order, vec!["clicks", "impressions", "ctr", "position"]);
        assert_eq!(t.line_count(), 5);
    }

    #[test]
    fn values_are_rounded_to_two_decimals() {
        let t = table(&[("ctr", 0.034567)], &[("ctr", 0.041234)]).unwrap();
        assert_eq!(t.rows[0].prior, 0.03);
        assert_eq!(t.rows[0].current, 0.04);
        assert_eq!(t.rows[0].change_pct, 19.29);
    }

    #[test]
    fn rounding_follows_decimal_display() {
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(7.125), 7.12);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(12.625), 12.62);
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(-0.001).to_bits(), 0.0f64.to_bits());

        let t = table(&[("position", 7.125)], &[("position", 2.675)]).unwrap();
        assert_eq!(t.to_records()[1], vec!["position", "7.12", "2.67", "-62.46"]);
    }

    #[test]
    fn missing_current_metric_fails() {
        let err = table(&[("clicks", 1.0), ("ctr", 0.1)], &[("clicks", 2.0)]).unwrap_err();
        assert!(matches!(err, ReportError::MissingMetric(ref m) if m == "ctr"));
    }

    #[test]
    fn zero_prior_fails_explicitly() {
        let err = table(&[("clicks", 0.0)], &[("clicks", 10.0)]).unwrap_err();
        assert!(matches!(err, ReportError::ZeroBaseline(ref m) if m == "clicks"));
    }

    #[test]
    fn negated_decrease_form_matches_single_formula() {
        let priors = [1e-6, 0.0321, 1.0, 3.7, 99.99, 1234.5, 7.5e5, 3.3e9];
        let ratios = [0.0, 0.001, 0.3333, 0.5, 0.9999, 1.0, 1.0001, 1.5, 42.0];
        for &p in &priors {
            for &r in &ratios {
                let c = p * r;
                let single = percent_change(p, c).unwrap();
                let branched = if c >= p {
                    (c / p) * 100.0 - 100.0
                } else {
                    -(100.0 - (c / p) * 100.0)
                };
                assert_eq!(round2(single), round2(branched), "prior={p} current={c}");
                assert_eq!(format_value(round2(single)), format_value(round2(branched)));
            }
        }
    }

    #[test]
    fn window_years_label_the_header() {
        let window = DateWindow::from_month_input("2024-05").unwrap();
        let set = MetricSet::from_pairs([("clicks", 5.0)]);
        let t = compare(&set, &set, &window).unwrap();
        assert_eq!(t.header(), ["Metrics", "2023", "2024", "Change(%)"].map(String::from));
    }

    #[test]
    fn truncate_long_metric_names() {
        assert_eq!(truncate("impressions", 16), "impressions");
        assert_eq!(truncate("a-very-long-metric-name", 10), "a-very-...");
    }
}
