//! Date windows for fact loads

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

// Jinja forms first so `{{ ds }}` is not read as `{ds}` inside braces
static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(prev_ds|ds)\s*\}\}|\{(prev_ds|prev|ds)\}").expect("Invalid regex")
});

/// `[previous_boundary, current_boundary]` of a fact load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub previous_boundary: NaiveDate,
    pub current_boundary: NaiveDate,
}

impl DateWindow {
    /// Create a window, rejecting one whose previous boundary is after the current one
    pub fn new(previous_boundary: NaiveDate, current_boundary: NaiveDate) -> PipelineResult<Self> {
        if previous_boundary > current_boundary {
            return Err(PipelineError::config(format!(
                "Date window is inverted: {} is after {}",
                previous_boundary, current_boundary
            )));
        }
        Ok(Self {
            previous_boundary,
            current_boundary,
        })
    }

    /// One-day window ending at `current`
    pub fn ending(current: NaiveDate) -> PipelineResult<Self> {
        let previous = current
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| PipelineError::config(format!("No day before {}", current)))?;
        Self::new(previous, current)
    }

    /// Fill in missing boundaries from the schedule context
    ///
    /// `current` falls back to `today`, `previous` to the day before `current`.
    pub fn resolve(
        previous: Option<NaiveDate>,
        current: Option<NaiveDate>,
        today: NaiveDate,
    ) -> PipelineResult<Self> {
        let current = current.unwrap_or(today);
        match previous {
            Some(previous) => Self::new(previous, current),
            None => Self::ending(current),
        }
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.previous_boundary, self.current_boundary)
    }
}

/// Replace the date placeholders of a fact query template
///
/// `{prev_ds}`, `{prev}` and `{{ prev_ds }}` become the previous boundary,
/// `{ds}` and `{{ ds }}` the current one, both as `YYYY-MM-DD`. Anything
/// else in braces is left as is.
pub fn substitute_window(template: &str, window: &DateWindow) -> String {
    let previous = window.previous_boundary.format("%Y-%m-%d").to_string();
    let current = window.current_boundary.format("%Y-%m-%d").to_string();

    RE_PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if key == "ds" {
                current.clone()
            } else {
                previous.clone()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(date(2025, 8, 28), date(2025, 8, 29)).unwrap()
    }

    #[test]
    fn test_substitute_braces() {
        let sql = "SELECT * FROM sales WHERE sale_date >= '{prev_ds}' AND sale_date < '{ds}'";
        assert_eq!(
            substitute_window(sql, &window()),
            "SELECT * FROM sales WHERE sale_date >= '2025-08-28' AND sale_date < '2025-08-29'"
        );
    }

    #[test]
    fn test_substitute_jinja_and_short_forms() {
        let sql = "WHERE a >= '{{ prev_ds }}' AND b < '{{ds}}' AND c = '{prev}'";
        assert_eq!(
            substitute_window(sql, &window()),
            "WHERE a >= '2025-08-28' AND b < '2025-08-29' AND c = '2025-08-28'"
        );
    }

    #[test]
    fn test_other_braces_untouched() {
        let sql = "SELECT '{\"k\": 1}', '{dss}', '{ {ds} }'";
        assert_eq!(
            substitute_window(sql, &window()),
            "SELECT '{\"k\": 1}', '{dss}', '{ 2025-08-29 }'"
        );
    }

    #[test]
    fn test_resolve_fallbacks() {
        let today = date(2025, 8, 29);
        let w = DateWindow::resolve(None, None, today).unwrap();
        assert_eq!(w.current_boundary, date(2025, 8, 29));
        assert_eq!(w.previous_boundary, date(2025, 8, 28));

        let w = DateWindow::resolve(None, Some(date(2025, 3, 1)), today).unwrap();
        assert_eq!(w.previous_boundary, date(2025, 2, 28));

        let w = DateWindow::resolve(Some(date(2025, 8, 1)), None, today).unwrap();
        assert_eq!(w.previous_boundary, date(2025, 8, 1));
        assert_eq!(w.current_boundary, today);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = DateWindow::new(date(2025, 8, 30), date(2025, 8, 29)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_same_day_window_allowed() {
        assert!(DateWindow::new(date(2025, 8, 29), date(2025, 8, 29)).is_ok());
    }
}
