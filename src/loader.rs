use crate::config::{ColumnMap, ReportConfig};
use crate::error::{ReportError, Result};
use crate::types::CallRecord;
use crate::util::{
    date_from_serial, parse_date_safe, parse_duration_safe, parse_f64_safe, parse_time_safe,
    seconds_of_day, time_from_fraction,
};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub blank_rows: usize,
    pub weekday_dropped: usize,
    pub null_dates: usize,
    pub coerced_values: usize,
}

/// A loaded remark file.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: PathBuf,
    pub records: Vec<CallRecord>,
    pub report: LoadReport,
}

impl Dataset {
    /// Earliest and latest record dates, if any row has a date.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        date_bounds(&self.records)
    }
}

/// Earliest and latest dates among `records`.
pub fn date_bounds(records: &[CallRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = records.iter().filter_map(|r| r.date);
    let first = dates.next()?;
    Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// A cell as read from the sheet, before coercion to a field type.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    /// Seconds, from duration or time-of-day cells.
    Duration(f64),
    Empty,
}

impl RawCell {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Float(f) => RawCell::Number(*f),
            Data::String(s) if s.trim().is_empty() => RawCell::Empty,
            Data::String(s) => RawCell::Text(s.clone()),
            Data::Bool(b) => RawCell::Text(b.to_string()),
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                if dt.is_duration() || serial < 1.0 {
                    RawCell::Duration(serial * 86_400.0)
                } else {
                    dt.as_datetime()
                        .map(RawCell::DateTime)
                        .unwrap_or(RawCell::Number(serial))
                }
            }
            Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
            Data::Error(_) | Data::Empty => RawCell::Empty,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, RawCell::Empty)
    }
}

/// Outcome of coercing one cell.
enum Value<T> {
    Missing,
    Parsed(T),
    Invalid,
}

/// Trim, collapse inner whitespace and uppercase a header.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    WHITESPACE.replace_all(trimmed, " ").to_uppercase()
}

/// Header positions for every logical field.
#[derive(Debug, Clone, Default)]
struct ColumnIndex {
    date: usize,
    client: usize,
    remark_by: usize,
    call_status: usize,
    status: usize,
    account_no: usize,
    talk_time: usize,
    call_duration: usize,
    time: Option<usize>,
    remark: Option<usize>,
    remark_type: Option<usize>,
    ptp_amount: Option<usize>,
    balance: Option<usize>,
    service_no: Option<usize>,
    reason_for_default: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &[String], columns: &ColumnMap) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let find = |name: &str| {
            let wanted = normalize_header(name);
            normalized.iter().position(|h| *h == wanted)
        };
        let mut missing = Vec::new();
        let mut required = |name: &str| {
            find(name).unwrap_or_else(|| {
                missing.push(normalize_header(name));
                0
            })
        };
        let index = ColumnIndex {
            date: required(&columns.date),
            client: required(&columns.client),
            remark_by: required(&columns.remark_by),
            call_status: required(&columns.call_status),
            status: required(&columns.status),
            account_no: required(&columns.account_no),
            talk_time: required(&columns.talk_time),
            call_duration: required(&columns.call_duration),
            time: find(&columns.time),
            remark: find(&columns.remark),
            remark_type: find(&columns.remark_type),
            ptp_amount: find(&columns.ptp_amount),
            balance: find(&columns.balance),
            service_no: find(&columns.service_no),
            reason_for_default: find(&columns.reason_for_default),
        };
        if !missing.is_empty() {
            return Err(ReportError::MissingColumn(missing));
        }
        Ok(index)
    }

    fn positions(&self) -> Vec<usize> {
        let mut all = vec![
            self.date,
            self.client,
            self.remark_by,
            self.call_status,
            self.status,
            self.account_no,
            self.talk_time,
            self.call_duration,
        ];
        all.extend(
            [
                self.time,
                self.remark,
                self.remark_type,
                self.ptp_amount,
                self.balance,
                self.service_no,
                self.reason_for_default,
            ]
            .into_iter()
            .flatten(),
        );
        all
    }
}

/// Load a remark file and coerce every row into a [`CallRecord`].
pub fn load_and_clean(path: &Path, config: &ReportConfig) -> Result<Dataset> {
    let (headers, rows) = read_table(path)?;
    let (records, report) = clean_rows(&headers, rows, config)?;
    tracing::info!(
        path = %path.display(),
        total = report.total_rows,
        kept = report.kept_rows,
        coerced = report.coerced_values,
        "Loaded remark file"
    );
    Ok(Dataset {
        source: path.to_path_buf(),
        records,
        report,
    })
}

/// Read the header row and body of the first sheet (or the CSV file).
pub fn read_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<RawCell>>)> {
    std::fs::metadata(path).map_err(|source| ReportError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path),
        _ => Err(ReportError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn read_workbook(path: &Path) -> Result<(Vec<String>, Vec<Vec<RawCell>>)> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReportError::EmptySheet(path.to_path_buf()))??;
    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| ReportError::EmptySheet(path.to_path_buf()))?
        .iter()
        .map(|c| c.to_string())
        .collect();
    let body = rows
        .map(|r| r.iter().map(RawCell::from_data).collect())
        .collect();
    Ok((headers, body))
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<RawCell>>)> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(ReportError::EmptySheet(path.to_path_buf()));
    }
    let mut body = Vec::new();
    for result in rdr.records() {
        let record = result?;
        body.push(
            record
                .iter()
                .map(|s| {
                    if s.trim().is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok((headers, body))
}

/// Coerce raw rows into records. Unparseable values are replaced by their
/// null/zero sentinel and counted; a missing required header is fatal.
pub fn clean_rows(
    headers: &[String],
    rows: Vec<Vec<RawCell>>,
    config: &ReportConfig,
) -> Result<(Vec<CallRecord>, LoadReport)> {
    let index = ColumnIndex::resolve(headers, &config.columns)?;
    let cycle_re = config.cycle_regex()?;
    let positions = index.positions();
    let mut report = LoadReport::default();
    let mut records = Vec::with_capacity(rows.len());
    let empty = RawCell::Empty;

    for row in rows {
        report.total_rows += 1;
        let cell = |i: usize| row.get(i).unwrap_or(&empty);
        let opt_cell = |i: Option<usize>| i.map(cell).unwrap_or(&empty);

        if positions.iter().all(|&i| cell(i).is_empty()) {
            report.blank_rows += 1;
            continue;
        }

        let date = match coerce_date(cell(index.date)) {
            Value::Parsed(d) => Some(d),
            Value::Missing | Value::Invalid => {
                report.null_dates += 1;
                None
            }
        };
        if let Some(d) = date {
            if excluded_weekday(d.weekday(), &config.exclude_weekdays) {
                report.weekday_dropped += 1;
                continue;
            }
        }

        let time = match coerce_time(opt_cell(index.time)) {
            Value::Parsed(t) => Some(t),
            Value::Missing => None,
            Value::Invalid => {
                report.coerced_values += 1;
                None
            }
        };

        let talk_time_secs = match coerce_duration(cell(index.talk_time)) {
            Value::Parsed(v) if v >= 0.0 => v,
            Value::Missing => 0.0,
            Value::Parsed(_) | Value::Invalid => {
                report.coerced_values += 1;
                0.0
            }
        };
        let call_duration_secs = match coerce_duration(cell(index.call_duration)) {
            Value::Parsed(v) if v >= 0.0 => Some(v),
            Value::Missing => None,
            Value::Parsed(_) | Value::Invalid => {
                report.coerced_values += 1;
                Some(0.0)
            }
        };
        let mut amount = |i: Option<usize>| match coerce_amount(opt_cell(i)) {
            Value::Parsed(v) => v,
            Value::Missing => 0.0,
            Value::Invalid => {
                report.coerced_values += 1;
                0.0
            }
        };
        let ptp_amount = amount(index.ptp_amount);
        let balance = amount(index.balance);

        let service_no = coerce_text(opt_cell(index.service_no));
        let cycle = extract_cycle(&cycle_re, &service_no);

        records.push(CallRecord {
            date,
            time,
            client: coerce_text(cell(index.client)),
            agent: coerce_text(cell(index.remark_by)),
            call_status: coerce_text(cell(index.call_status)).to_uppercase(),
            status: coerce_text(cell(index.status)),
            remark: coerce_text(opt_cell(index.remark)),
            remark_type: coerce_text(opt_cell(index.remark_type)),
            talk_time_secs,
            call_duration_secs,
            ptp_amount,
            balance,
            account_no: coerce_text(cell(index.account_no)),
            service_no,
            cycle,
            reason_for_default: coerce_text(opt_cell(index.reason_for_default)),
        });
    }

    report.kept_rows = records.len();
    if report.null_dates > 0 {
        tracing::warn!(rows = report.null_dates, "Rows with unparseable dates kept with no date");
    }
    tracing::debug!(?report, "Cleaned remark rows");
    Ok((records, report))
}

fn excluded_weekday(day: Weekday, excluded: &[Weekday]) -> bool {
    excluded.contains(&day)
}

/// First capture group of the cycle pattern, else the whole match.
pub fn extract_cycle(re: &Regex, service_no: &str) -> Option<String> {
    let caps = re.captures(service_no)?;
    let m = caps.get(1).or_else(|| caps.get(0))?;
    let cycle = m.as_str().trim();
    (!cycle.is_empty()).then(|| cycle.to_string())
}

fn coerce_text(cell: &RawCell) -> String {
    match cell {
        RawCell::Text(s) => s.trim().to_string(),
        // Identifiers stored as numbers should not pick up a trailing `.0`.
        RawCell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        RawCell::Number(n) => n.to_string(),
        RawCell::DateTime(dt) => dt.to_string(),
        RawCell::Duration(s) => s.to_string(),
        RawCell::Empty => String::new(),
    }
}

fn coerce_date(cell: &RawCell) -> Value<NaiveDate> {
    let parsed = match cell {
        RawCell::Empty => return Value::Missing,
        RawCell::DateTime(dt) => Some(dt.date()),
        RawCell::Number(n) => date_from_serial(*n),
        RawCell::Text(s) => parse_date_safe(Some(s)),
        RawCell::Duration(_) => None,
    };
    parsed.map(Value::Parsed).unwrap_or(Value::Invalid)
}

fn coerce_time(cell: &RawCell) -> Value<NaiveTime> {
    let parsed = match cell {
        RawCell::Empty => return Value::Missing,
        RawCell::DateTime(dt) => Some(dt.time()),
        RawCell::Number(n) => time_from_fraction(*n),
        RawCell::Duration(s) => time_from_fraction(*s / 86_400.0),
        RawCell::Text(s) => parse_time_safe(Some(s)),
    };
    parsed.map(Value::Parsed).unwrap_or(Value::Invalid)
}

fn coerce_duration(cell: &RawCell) -> Value<f64> {
    let parsed = match cell {
        RawCell::Empty => return Value::Missing,
        RawCell::Number(n) => Some(*n),
        RawCell::Duration(s) => Some(*s),
        RawCell::DateTime(dt) => Some(seconds_of_day(dt.time())),
        RawCell::Text(s) => parse_duration_safe(Some(s)),
    };
    parsed.map(Value::Parsed).unwrap_or(Value::Invalid)
}

fn coerce_amount(cell: &RawCell) -> Value<f64> {
    let parsed = match cell {
        RawCell::Empty => return Value::Missing,
        RawCell::Number(n) => Some(*n),
        RawCell::Text(s) => parse_f64_safe(Some(s)),
        RawCell::DateTime(_) | RawCell::Duration(_) => None,
    };
    parsed.map(Value::Parsed).unwrap_or(Value::Invalid)
}

/// What makes a cached load reusable: the file itself and every config
/// value the loader reads.
#[derive(Debug, Clone, PartialEq)]
struct LoadKey {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
    columns: ColumnMap,
    exclude_weekdays: Vec<Weekday>,
    cycle_pattern: String,
}

impl LoadKey {
    fn new(path: &Path, config: &ReportConfig) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|source| ReportError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(LoadKey {
            path: path.canonicalize().unwrap_or_else(|_| path.to_path_buf()),
            len: meta.len(),
            modified: meta.modified().ok(),
            columns: config.columns.clone(),
            exclude_weekdays: config.exclude_weekdays.clone(),
            cycle_pattern: config.cycle_pattern.clone(),
        })
    }
}

/// Keeps the most recent load so resubmitting the same file skips parsing.
#[derive(Debug, Default)]
pub struct LoadCache {
    entry: Option<(LoadKey, Dataset)>,
    parses: usize,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path, config: &ReportConfig) -> Result<&Dataset> {
        let key = LoadKey::new(path, config)?;
        match self.entry.take() {
            Some((cached, dataset)) if cached == key => {
                tracing::debug!(path = %path.display(), "Reusing cached remark file");
                let (_, dataset) = self.entry.insert((cached, dataset));
                Ok(dataset)
            }
            previous => match load_and_clean(path, config) {
                Ok(dataset) => {
                    self.parses += 1;
                    let (_, dataset) = self.entry.insert((key, dataset));
                    Ok(dataset)
                }
                Err(e) => {
                    // Keep serving the last good file.
                    self.entry = previous;
                    Err(e)
                }
            },
        }
    }

    pub fn current(&self) -> Option<&Dataset> {
        self.entry.as_ref().map(|(_, d)| d)
    }

    /// Number of loads that actually parsed a file.
    pub fn parse_count(&self) -> usize {
        self.parses
    }
}
