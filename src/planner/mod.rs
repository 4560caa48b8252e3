//! Date-range batching.
//!
//! [`split`] turns a requested date range into calendar-aligned batches, and
//! [`plan_jobs`] expands each selected template into one [`JobPayload`] per
//! batch.
//!
//! Weekly and monthly batching widen the requested range to whole calendar
//! periods before splitting:
//!
//! ```text
//! requested      2023-01-15 ............................ 2023-02-15
//! monthly        2023-01-01 ... 2023-01-31 | 2023-02-01 ... 2023-02-28
//! ```
//!
//! so the first and last batch may reach outside the requested bounds.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;

use crate::domain::{
    BatchFrequency, DateRange, GeneralRequestConfig, JobPayload, SelectedTemplate, parse_date,
};
use crate::error::{BarrageError, Result};

/// Split `[start_date, end_date]` into ordered, non-overlapping batches.
pub fn split(
    start_date: NaiveDate,
    end_date: NaiveDate,
    frequency: BatchFrequency,
) -> Result<Vec<DateRange>> {
    let requested = DateRange::new(start_date, end_date)?;

    match frequency {
        BatchFrequency::None => Ok(vec![requested]),
        BatchFrequency::Daily => Ok(start_date
            .iter_days()
            .take_while(|day| *day <= end_date)
            .map(DateRange::single_day)
            .collect()),
        BatchFrequency::Weekly => split_weekly(start_date, end_date),
        BatchFrequency::Monthly => split_monthly(start_date, end_date),
    }
}

/// [`split`] for the string forms found in requests and templates.
pub fn split_str(
    start_date: &str,
    end_date: &str,
    batch_freq: Option<&str>,
) -> Result<Vec<DateRange>> {
    let frequency = BatchFrequency::from_template_value(batch_freq)?;
    split(parse_date(start_date)?, parse_date(end_date)?, frequency)
}

fn split_weekly(start_date: NaiveDate, end_date: NaiveDate) -> Result<Vec<DateRange>> {
    // Weeks run Sunday..=Saturday
    let first_sunday = shift_days(
        start_date,
        -i64::from(start_date.weekday().num_days_from_sunday()),
    )?;
    let last_saturday = shift_days(
        end_date,
        i64::from(6 - end_date.weekday().num_days_from_sunday()),
    )?;

    let mut batches = Vec::new();
    let mut week_start = first_sunday;
    while week_start <= last_saturday {
        let week_end = shift_days(week_start, 6)?;
        batches.push(DateRange::new(week_start, week_end)?);
        week_start = shift_days(week_end, 1)?;
    }
    Ok(batches)
}

fn split_monthly(start_date: NaiveDate, end_date: NaiveDate) -> Result<Vec<DateRange>> {
    let last_day = last_day_of_month(end_date)?;

    let mut batches = Vec::new();
    let mut month_start = first_day_of_month(start_date)?;
    while month_start <= last_day {
        let month_end = last_day_of_month(month_start)?;
        batches.push(DateRange::new(month_start, month_end)?);
        month_start = shift_days(month_end, 1)?;
    }
    Ok(batches)
}

fn first_day_of_month(date: NaiveDate) -> Result<NaiveDate> {
    date.with_day(1).ok_or_else(|| out_of_range(date))
}

fn last_day_of_month(date: NaiveDate) -> Result<NaiveDate> {
    first_day_of_month(date)?
        .checked_add_months(Months::new(1))
        .and_then(|next_month| next_month.pred_opt())
        .ok_or_else(|| out_of_range(date))
}

fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| out_of_range(date))
}

fn out_of_range(date: NaiveDate) -> BarrageError {
    BarrageError::InvalidDateRange(format!(
        "batch boundary near {} is outside the supported calendar",
        date
    ))
}

/// A template that produced no jobs because its batches could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTemplate {
    pub name: String,
    pub reason: String,
}

/// Jobs produced for one invocation.
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    pub jobs: Vec<JobPayload>,
    pub skipped: Vec<SkippedTemplate>,
}

/// Expand every selected template into one payload per date batch.
///
/// A template whose `batch_freq` cannot be planned is skipped; the others
/// are still planned.
pub fn plan_jobs(
    templates: &[SelectedTemplate],
    general: &GeneralRequestConfig,
    requested: DateRange,
) -> JobPlan {
    let mut plan = JobPlan::default();

    for selected in templates {
        let name = &selected.template.name;
        tracing::debug!(template = %name, "Determining date batches");

        let batches = BatchFrequency::from_template_value(selected.template.batch_freq.as_deref())
            .and_then(|frequency| {
                split(requested.start_date(), requested.end_date(), frequency)
            });

        match batches {
            Ok(batches) => {
                tracing::info!(
                    template = %name,
                    batches = batches.len(),
                    "Date batches planned for template"
                );
                plan.jobs.extend(batches.into_iter().map(|batch| {
                    JobPayload::new(
                        selected.template.clone(),
                        general.clone(),
                        selected.template_type,
                        batch,
                    )
                }));
            }
            Err(e) => {
                tracing::error!(
                    template = %name,
                    error = %e,
                    "Failed to plan date batches, skipping template"
                );
                plan.skipped.push(SkippedTemplate {
                    name: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthFileLocation, ExtractionTemplate, TemplateType};
    use chrono::Weekday;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).unwrap()
    }

    #[test]
    fn test_no_frequency_returns_requested_range() {
        let batches = split(date("2023-01-15"), date("2023-02-15"), BatchFrequency::None).unwrap();
        assert_eq!(batches, vec![range("2023-01-15", "2023-02-15")]);
    }

    #[test]
    fn test_daily_one_batch_per_day() {
        let start = date("2024-02-26");
        let end = date("2024-03-02");
        let batches = split(start, end, BatchFrequency::Daily).unwrap();

        assert_eq!(batches.len() as i64, (end - start).num_days() + 1);
        assert_eq!(batches.first().unwrap().start_date(), start);
        assert_eq!(batches.last().unwrap().end_date(), end);
        assert!(batches.iter().all(|b| b.num_days() == 1));
        assert!(batches.windows(2).all(|w| w[0].start_date() < w[1].start_date()));
        // Leap day is included
        assert!(batches.contains(&range("2024-02-29", "2024-02-29")));
    }

    #[test]
    fn test_daily_single_day() {
        let batches = split_str("2023-01-01", "2023-01-01", Some("daily")).unwrap();
        assert_eq!(batches, vec![range("2023-01-01", "2023-01-01")]);
    }

    #[test]
    fn test_weekly_already_aligned() {
        let batches = split_str("2023-01-01", "2023-01-14", Some("weekly")).unwrap();
        assert_eq!(
            batches,
            vec![range("2023-01-01", "2023-01-07"), range("2023-01-08", "2023-01-14")]
        );
    }

    #[test]
    fn test_weekly_widens_to_sunday_and_saturday() {
        // Wednesday to Tuesday
        let batches = split_str("2023-01-04", "2023-01-10", Some("weekly")).unwrap();
        assert_eq!(
            batches,
            vec![range("2023-01-01", "2023-01-07"), range("2023-01-08", "2023-01-14")]
        );
    }

    #[test]
    fn test_weekly_batches_are_whole_contiguous_weeks() {
        let start = date("2022-12-20");
        let end = date("2023-03-09");
        let batches = split(start, end, BatchFrequency::Weekly).unwrap();

        for batch in &batches {
            assert_eq!(batch.start_date().weekday(), Weekday::Sun);
            assert_eq!(batch.end_date().weekday(), Weekday::Sat);
            assert_eq!(batch.num_days(), 7);
        }
        for pair in batches.windows(2) {
            assert_eq!((pair[1].start_date() - pair[0].start_date()).num_days(), 7);
        }
        assert!(batches.first().unwrap().start_date() <= start);
        assert!(batches.last().unwrap().end_date() >= end);
    }

    #[test]
    fn test_monthly_widens_to_whole_months() {
        let batches = split_str("2023-01-15", "2023-02-15", Some("monthly")).unwrap();
        assert_eq!(
            batches,
            vec![range("2023-01-01", "2023-01-31"), range("2023-02-01", "2023-02-28")]
        );
    }

    #[test]
    fn test_monthly_handles_leap_years_and_year_boundaries() {
        let batches = split_str("2023-12-31", "2024-03-01", Some("monthly")).unwrap();
        assert_eq!(
            batches,
            vec![
                range("2023-12-01", "2023-12-31"),
                range("2024-01-01", "2024-01-31"),
                range("2024-02-01", "2024-02-29"),
                range("2024-03-01", "2024-03-31"),
            ]
        );
        for pair in batches.windows(2) {
            assert_eq!(pair[1].start_date().day(), 1);
            assert_eq!(pair[0].end_date().succ_opt().unwrap(), pair[1].start_date());
        }
    }

    #[test]
    fn test_split_is_idempotent() {
        for freq in [None, Some("daily"), Some("weekly"), Some("monthly")] {
            let first = split_str("2023-03-03", "2023-05-17", freq).unwrap();
            let second = split_str("2023-03-03", "2023-05-17", freq).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_split_errors() {
        assert!(matches!(
            split_str("2023-02-01", "2023-01-01", None),
            Err(BarrageError::InvalidDateRange(_))
        ));
        assert!(matches!(
            split_str("2023-13-01", "2023-12-31", Some("daily")),
            Err(BarrageError::InvalidDateRange(_))
        ));
        assert!(matches!(
            split_str("2023-01-01", "2023-01-31", Some("yearly")),
            Err(BarrageError::InvalidFrequency(_))
        ));
    }

    fn selected(
        name: &str,
        batch_freq: Option<&str>,
        template_type: TemplateType,
    ) -> SelectedTemplate {
        SelectedTemplate {
            template_type,
            template: ExtractionTemplate {
                name: name.to_string(),
                metrics: vec!["ga:sessions".to_string()],
                dimensions: vec![],
                batch_freq: batch_freq.map(str::to_string),
                extra: Default::default(),
            },
        }
    }

    fn general() -> GeneralRequestConfig {
        GeneralRequestConfig {
            view_id: "1".to_string(),
            view_name: None,
            property_id: None,
            property_name: None,
            account_id: None,
            account_name: None,
            target_project: "p".to_string(),
            target_bucket: "b".to_string(),
            target_bucket_folder: "f/".to_string(),
            config_files_location: AuthFileLocation {
                bucket: "cfg".to_string(),
                auth_blob: "auth.json".to_string(),
            },
        }
    }

    #[test]
    fn test_plan_jobs_expands_each_template() {
        let templates = vec![
            selected("daily_sessions", Some("daily"), TemplateType::Standard),
            selected("whole_range", None, TemplateType::Custom),
        ];
        let plan = plan_jobs(&templates, &general(), range("2023-01-01", "2023-01-03"));

        assert!(plan.skipped.is_empty());
        assert_eq!(plan.jobs.len(), 4);
        assert_eq!(
            plan.jobs.iter().filter(|j| j.name() == "daily_sessions").count(),
            3
        );
        let whole = plan.jobs.iter().find(|j| j.name() == "whole_range").unwrap();
        assert_eq!(whole.date_range(), range("2023-01-01", "2023-01-03"));
        assert_eq!(whole.template_type(), TemplateType::Custom);
    }

    #[test]
    fn test_plan_jobs_skips_unplannable_template() {
        let templates = vec![
            selected("bad", Some("hourly"), TemplateType::Standard),
            selected("good", Some("weekly"), TemplateType::Standard),
        ];
        let plan = plan_jobs(&templates, &general(), range("2023-01-01", "2023-01-14"));

        assert_eq!(plan.jobs.len(), 2);
        assert!(plan.jobs.iter().all(|j| j.name() == "good"));
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].name, "bad");
        assert_eq!(plan.skipped[0].reason, "Invalid batch frequency: 'hourly'");
    }
}
