//! Comparison window arithmetic: a calendar month and the same month a year earlier.

use chrono::{Datelike, NaiveDate};

use crate::error::{ReportError, Result};

/// Current month plus its counterpart one year earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub current_start: NaiveDate,
    pub current_end: NaiveDate,
    pub prior_start: NaiveDate,
    pub prior_end: NaiveDate,
}

impl DateWindow {
    /// Window for an operator-supplied `YYYY-MM`.
    pub fn from_month_input(input: &str) -> Result<Self> {
        let (year, month) = parse_year_month(input)?;
        Self::for_month(year, month).ok_or_else(|| ReportError::InvalidMonth(input.to_string()))
    }

    /// Window for the most recently completed month as seen from `today`.
    pub fn last_completed_month(today: NaiveDate) -> Result<Self> {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        Self::for_month(year, month)
            .ok_or_else(|| ReportError::InvalidMonth(format!("{year:04}-{month:02}")))
    }

    /// Window covering the whole of `year`-`month`.
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        let current_start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let current_end = last_day_of_month(year, month)?;
        Some(Self {
            current_start,
            current_end,
            prior_start: one_year_earlier(current_start)?,
            prior_end: one_year_earlier(current_end)?,
        })
    }

    pub fn current_year(&self) -> i32 {
        self.current_start.year()
    }

    pub fn prior_year(&self) -> i32 {
        self.prior_start.year()
    }

    /// English month name of the window, e.g. `December`.
    pub fn month_name(&self) -> String {
        self.current_start.format("%B").to_string()
    }
}

fn parse_year_month(input: &str) -> Result<(i32, u32)> {
    let trimmed = input.trim();
    let invalid = || ReportError::InvalidMonth(input.to_string());

    let (year, month) = trimmed.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt()
}

/// Same month/day one year earlier; 29 February falls back to the 28th.
fn one_year_earlier(date: NaiveDate) -> Option<NaiveDate> {
    date.with_year(date.year() - 1)
        .or_else(|| last_day_of_month(date.year() - 1, date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn leap_february_has_29_days() {
        let w = DateWindow::from_month_input("2024-02").unwrap();
        assert_eq!(w.current_start, ymd(2024, 2, 1));
        assert_eq!(w.current_end, ymd(2024, 2, 29));
        assert_eq!(w.prior_start, ymd(2023, 2, 1));
        assert_eq!(w.prior_end, ymd(2023, 2, 28));
    }

    #[test]
    fn non_leap_february_has_28_days() {
        let w = DateWindow::from_month_input("2023-02").unwrap();
        assert_eq!(w.current_start, ymd(2023, 2, 1));
        assert_eq!(w.current_end, ymd(2023, 2, 28));
        assert_eq!(w.prior_start, ymd(2022, 2, 1));
        assert_eq!(w.prior_end, ymd(2022, 2, 28));
    }

    #[test]
    fn prior_february_keeps_day_when_it_exists() {
        let w = DateWindow::from_month_input("2025-02").unwrap();
        assert_eq!(w.current_end, ymd(2025, 2, 28));
        assert_eq!(w.prior_end, ymd(2024, 2, 28));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let w = DateWindow::from_month_input("2023-12").unwrap();
        assert_eq!(w.current_end, ymd(2023, 12, 31));
        assert_eq!(w.prior_start, ymd(2022, 12, 1));
        assert_eq!(w.prior_end, ymd(2022, 12, 31));
    }

    #[test]
    fn january_today_completes_previous_december() {
        let w = DateWindow::last_completed_month(ymd(2024, 1, 15)).unwrap();
        assert_eq!(w.current_start, ymd(2023, 12, 1));
        assert_eq!(w.current_end, ymd(2023, 12, 31));
        assert_eq!(w.prior_start, ymd(2022, 12, 1));
        assert_eq!(w.prior_end, ymd(2022, 12, 31));
    }

    #[test]
    fn mid_year_today_completes_previous_month() {
        let w = DateWindow::last_completed_month(ymd(2024, 7, 1)).unwrap();
        assert_eq!(w.current_start, ymd(2024, 6, 1));
        assert_eq!(w.current_end, ymd(2024, 6, 30));
        assert_eq!(w.month_name(), "June");
        assert_eq!((w.prior_year(), w.current_year()), (2023, 2024));
    }

    #[test]
    fn input_is_trimmed() {
        assert!(DateWindow::from_month_input(" 2024-3\n").is_ok());
    }

    #[test]
    fn malformed_months_are_rejected() {
        for bad in ["", "2024", "2024-13", "2024-00", "24-01", "2024/01", "abcd-ef", "2024-011"] {
            assert!(
                matches!(
                    DateWindow::from_month_input(bad),
                    Err(ReportError::InvalidMonth(_))
                ),
                "accepted {bad:?}"
            );
        }
    }
}
