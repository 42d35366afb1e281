use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

use crate::util::{format_hms, format_number, format_rate};

/// One call attempt from the remark file, after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub client: String,
    pub agent: String,
    pub call_status: String,
    pub status: String,
    pub remark: String,
    pub remark_type: String,
    pub talk_time_secs: f64,
    pub call_duration_secs: Option<f64>,
    pub ptp_amount: f64,
    pub balance: f64,
    pub account_no: String,
    pub service_no: String,
    pub cycle: Option<String>,
    pub reason_for_default: String,
}

/// A column a report can be partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Date,
    Client,
    Cycle,
    Collector,
}

impl GroupField {
    pub fn header(&self) -> &'static str {
        match self {
            GroupField::Date => "Day",
            GroupField::Client => "Client",
            GroupField::Cycle => "Cycle",
            GroupField::Collector => "Collector",
        }
    }
}

/// One component of a group key. Missing values sort before present ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Date(Option<NaiveDate>),
    Text(Option<String>),
}

impl KeyPart {
    pub fn to_cell(&self) -> Cell {
        match self {
            KeyPart::Date(Some(d)) => Cell::Date(*d),
            KeyPart::Date(None) => Cell::Text("N/A".into()),
            KeyPart::Text(Some(s)) => Cell::Text(s.clone()),
            KeyPart::Text(None) => Cell::Text("N/A".into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey(pub Vec<KeyPart>);

impl GroupKey {
    pub fn of(record: &CallRecord, fields: &[GroupField]) -> Self {
        GroupKey(
            fields
                .iter()
                .map(|f| match f {
                    GroupField::Date => KeyPart::Date(record.date),
                    GroupField::Client => KeyPart::Text(Some(record.client.clone())),
                    GroupField::Cycle => KeyPart::Text(record.cycle.clone()),
                    GroupField::Collector => KeyPart::Text(Some(record.agent.clone())),
                })
                .collect(),
        )
    }
}

/// Seconds rendered as `HH:MM:SS`, hours unbounded.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Hms(pub f64);

impl fmt::Display for Hms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hms(self.0))
    }
}

/// A typed table cell shared by the terminal renderer and the workbook writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Count(usize),
    /// Two-decimal figure; `None` renders blank.
    Decimal(Option<f64>),
    /// Percentage rounded to an integer; `None` renders blank.
    Rate(Option<f64>),
    Money(f64),
    Date(NaiveDate),
    /// Seconds; `None` renders blank.
    Duration(Option<f64>),
    Blank,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Count(n) => write!(f, "{}", n),
            Cell::Decimal(v) => f.write_str(&display_decimal(v)),
            Cell::Rate(v) => f.write_str(&format_rate(*v)),
            Cell::Money(v) => f.write_str(&format_number(*v, 2)),
            Cell::Date(d) => write!(f, "{}", d.format("%b %d, %Y")),
            Cell::Duration(Some(s)) => f.write_str(&format_hms(*s)),
            Cell::Duration(None) | Cell::Blank => Ok(()),
        }
    }
}

pub fn display_decimal(v: &Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_default()
}

pub fn display_hms(v: &Option<Hms>) -> String {
    v.map(|h| h.to_string()).unwrap_or_default()
}

/// Rows that can be rendered both in the terminal and in a worksheet.
pub trait SheetRow: Tabled {
    fn cells(&self) -> Vec<Cell>;
}

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct ProductivityRow {
    #[tabled(rename = "Day")]
    pub day: NaiveDate,
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Total Agents")]
    pub total_agents: usize,
    #[tabled(rename = "Total Connected")]
    pub total_connected: usize,
    #[tabled(rename = "Talk Time (HH:MM:SS)")]
    pub talk_time: Hms,
    #[tabled(rename = "Connected Ave", display_with = "display_decimal")]
    pub connected_ave: Option<f64>,
    #[tabled(rename = "Talk Time Ave", display_with = "display_hms")]
    pub talk_time_ave: Option<Hms>,
}

impl SheetRow for ProductivityRow {
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Date(self.day),
            Cell::Text(self.client.clone()),
            Cell::Count(self.total_agents),
            Cell::Count(self.total_connected),
            Cell::Duration(Some(self.talk_time.0)),
            Cell::Decimal(self.connected_ave),
            Cell::Duration(self.talk_time_ave.map(|h| h.0)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct OverallProductivityRow {
    #[tabled(rename = "Day")]
    pub day: NaiveDate,
    #[tabled(rename = "Total Agents")]
    pub total_agents: usize,
    #[tabled(rename = "Total Connected")]
    pub total_connected: usize,
    #[tabled(rename = "Talk Time (HH:MM:SS)")]
    pub talk_time: Hms,
    #[tabled(rename = "Connected Ave", display_with = "display_decimal")]
    pub connected_ave: Option<f64>,
    #[tabled(rename = "Talk Time Ave", display_with = "display_hms")]
    pub talk_time_ave: Option<Hms>,
}

impl SheetRow for OverallProductivityRow {
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Date(self.day),
            Cell::Count(self.total_agents),
            Cell::Count(self.total_connected),
            Cell::Duration(Some(self.talk_time.0)),
            Cell::Decimal(self.connected_ave),
            Cell::Duration(self.talk_time_ave.map(|h| h.0)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct SkipRow {
    #[tabled(rename = "Day")]
    pub day: NaiveDate,
    #[tabled(rename = "Collectors")]
    pub collectors: usize,
    #[tabled(rename = "Positive Skip")]
    pub positive_skip: usize,
    #[tabled(rename = "Negative Skip")]
    pub negative_skip: usize,
    #[tabled(rename = "Total Skip")]
    pub total_skip: usize,
    #[tabled(rename = "Positive Skip Ave", display_with = "display_decimal")]
    pub positive_skip_ave: Option<f64>,
    #[tabled(rename = "Negative Skip Ave", display_with = "display_decimal")]
    pub negative_skip_ave: Option<f64>,
    #[tabled(rename = "Total Skip Ave", display_with = "display_decimal")]
    pub total_skip_ave: Option<f64>,
}

impl SheetRow for SkipRow {
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Date(self.day),
            Cell::Count(self.collectors),
            Cell::Count(self.positive_skip),
            Cell::Count(self.negative_skip),
            Cell::Count(self.total_skip),
            Cell::Decimal(self.positive_skip_ave),
            Cell::Decimal(self.negative_skip_ave),
            Cell::Decimal(self.total_skip_ave),
        ]
    }
}

/// Headline figures over the selected range, written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_rows: usize,
    pub accounts: usize,
    pub connected_accounts: usize,
    pub connected_rows: usize,
    pub ptp_accounts: usize,
    pub total_ptp_amount: f64,
    pub total_talk_time: String,
    pub positive_skip_ave: Option<f64>,
    pub negative_skip_ave: Option<f64>,
    pub total_skip_ave: Option<f64>,
}
