//! Exclusion rules and date-range selection.
use crate::config::{ExclusionRule, MatchKind, RuleField};
use crate::error::{ReportError, Result};
use crate::types::CallRecord;
use chrono::NaiveDate;

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ReportError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        date.is_some_and(|d| d >= self.start && d <= self.end)
    }
}

fn field_value(record: &CallRecord, field: RuleField) -> &str {
    match field {
        RuleField::RemarkBy => &record.agent,
        RuleField::Status => &record.status,
        RuleField::CallStatus => &record.call_status,
        RuleField::Remark => &record.remark,
        RuleField::RemarkType => &record.remark_type,
        RuleField::Client => &record.client,
        RuleField::ReasonForDefault => &record.reason_for_default,
    }
}

/// Case-insensitive "contains any of" over a keyword list.
pub fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    let haystack = haystack.to_uppercase();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .any(|k| haystack.contains(&k.to_uppercase()))
}

/// Trimmed equality against any listed value.
pub fn equals_any(value: &str, values: &[String]) -> bool {
    let value = value.trim();
    values.iter().any(|v| v.trim() == value)
}

impl ExclusionRule {
    pub fn matches(&self, record: &CallRecord) -> bool {
        let value = field_value(record, self.field);
        match self.kind {
            MatchKind::Exact => equals_any(value, &self.values),
            MatchKind::Contains => contains_any(value, &self.values),
        }
    }
}

/// Keep only the records that match none of the rules.
pub fn apply_exclusions(records: &[CallRecord], rules: &[ExclusionRule]) -> Vec<CallRecord> {
    let kept: Vec<CallRecord> = records
        .iter()
        .filter(|r| !rules.iter().any(|rule| rule.matches(r)))
        .cloned()
        .collect();
    tracing::debug!(
        before = records.len(),
        after = kept.len(),
        rules = rules.len(),
        "Applied exclusion rules"
    );
    kept
}

/// Records dated inside `range`. Undated rows never qualify.
pub fn select_range<'a>(records: &'a [CallRecord], range: &DateRange) -> Vec<&'a CallRecord> {
    records.iter().filter(|r| range.contains(r.date)).collect()
}
