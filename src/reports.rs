use crate::config::ReportConfig;
use crate::filter::{select_range, DateRange};
use crate::metrics::{aggregate, compute, MetricRow};
use crate::types::{
    CallRecord, Cell, GroupField, GroupKey, Hms, KeyPart, OverallProductivityRow,
    ProductivityRow, SheetRow, SkipRow, SummaryStats,
};
use crate::util::{average_defined, format_hms};
use std::collections::BTreeSet;

const COLLECTION_HEADERS: &[&str] = &[
    "Accounts",
    "Total Dialed",
    "Penetration Rate (%)",
    "Connected #",
    "Connected Rate (%)",
    "Connected Acc",
    "PTP Acc",
    "PTP Rate",
    "Total PTP Amount",
    "Total Balance",
    "Call Drop #",
    "System Drop",
    "Call Drop Ratio #",
    "Positive Skip",
    "Negative Skip",
    "Total Skip",
    "Talk Time (HH:MM:SS)",
    "Collectors",
    "Talk Time Ave",
];

/// A rendered report: literal headers plus typed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    /// Base sheet name.
    pub name: String,
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ReportTable {
    pub fn new(name: impl Into<String>, title: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_rows<T: SheetRow>(
        name: impl Into<String>,
        title: impl Into<String>,
        rows: &[T],
    ) -> Self {
        let headers = T::headers().into_iter().map(|h| h.into_owned()).collect();
        let mut table = Self::new(name, title, headers);
        table.rows = rows.iter().map(|r| r.cells()).collect();
        table
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every table produced for one date range.
#[derive(Debug, Clone)]
pub struct ReportSet {
    pub clients: Vec<ReportTable>,
    pub overall: ReportTable,
    pub productivity: ReportTable,
    pub overall_productivity: ReportTable,
    pub skip: ReportTable,
    pub custom: Option<ReportTable>,
    pub summary: SummaryStats,
}

impl ReportSet {
    /// Tables in workbook order.
    pub fn tables(&self) -> Vec<&ReportTable> {
        let mut all: Vec<&ReportTable> = self.clients.iter().collect();
        all.push(&self.overall);
        all.push(&self.productivity);
        all.push(&self.overall_productivity);
        all.push(&self.skip);
        if let Some(custom) = &self.custom {
            all.push(custom);
        }
        all
    }
}

/// Build every report for the records inside `range` (all records when
/// `range` is `None`). `group_by`, when non-empty, adds a collection table
/// with that grouping.
pub fn build(
    records: &[CallRecord],
    range: Option<&DateRange>,
    group_by: &[GroupField],
    config: &ReportConfig,
) -> ReportSet {
    let selected: Vec<&CallRecord> = match range {
        Some(r) => select_range(records, r),
        None => records.iter().collect(),
    };
    if selected.is_empty() {
        tracing::warn!(?range, "No rows in the selected range; reports will be empty");
    }

    let clients: BTreeSet<&str> = selected.iter().map(|r| r.client.as_str()).collect();
    let client_tables: Vec<ReportTable> = clients
        .into_iter()
        .map(|client| {
            let rows: Vec<&CallRecord> = selected
                .iter()
                .copied()
                .filter(|r| r.client == client)
                .collect();
            collection_table(
                client,
                &format!("{} Collection Summary", client),
                &rows,
                &[GroupField::Date, GroupField::Cycle],
                config,
            )
        })
        .collect();

    let overall = collection_table(
        "OVERALL",
        "Overall Collection Summary",
        &selected,
        &[GroupField::Date],
        config,
    );
    let custom = (!group_by.is_empty()).then(|| {
        collection_table("CUSTOM", "Custom Grouping", &selected, group_by, config)
    });

    let (skip, skip_rows) = skip_summary(&selected, config);
    let summary = summarize(&selected, range, &skip_rows, config);

    tracing::info!(
        rows = selected.len(),
        clients = client_tables.len(),
        "Built report set"
    );

    ReportSet {
        clients: client_tables,
        overall,
        productivity: productivity(&selected, config),
        overall_productivity: overall_productivity(&selected, config),
        skip,
        custom,
        summary,
    }
}

fn metric_cells(row: &MetricRow, config: &ReportConfig) -> Vec<Cell> {
    vec![
        Cell::Count(row.accounts),
        Cell::Count(row.total_dialed),
        Cell::Rate(row.penetration_rate()),
        Cell::Count(row.connected_accounts),
        Cell::Rate(row.connected_rate()),
        Cell::Count(row.connected_rows),
        Cell::Count(row.ptp_accounts),
        Cell::Rate(row.ptp_rate(config.ptp_rate_basis)),
        Cell::Money(row.ptp_amount),
        Cell::Money(row.ptp_balance),
        Cell::Count(row.call_drops),
        Cell::Count(row.system_drops),
        Cell::Rate(row.call_drop_ratio(config.manual_correction)),
        Cell::Count(row.positive_skips),
        Cell::Count(row.negative_skips),
        Cell::Count(row.total_skips()),
        Cell::Duration(Some(row.talk_time_secs)),
        Cell::Count(row.agents),
        Cell::Duration(row.talk_time_per_agent()),
    ]
}

/// Full metric table for `records` grouped by `fields`.
pub fn collection_table(
    name: &str,
    title: &str,
    records: &[&CallRecord],
    fields: &[GroupField],
    config: &ReportConfig,
) -> ReportTable {
    let headers = fields
        .iter()
        .map(|f| f.header().to_string())
        .chain(COLLECTION_HEADERS.iter().map(|h| h.to_string()))
        .collect();
    let mut table = ReportTable::new(name, title, headers);
    for row in aggregate(records, fields, config) {
        let mut cells: Vec<Cell> = row.key.0.iter().map(KeyPart::to_cell).collect();
        cells.extend(metric_cells(&row, config));
        table.rows.push(cells);
    }
    table
}

/// Dated metric rows for `fields`, whose first field must be the date.
fn dated_rows(
    records: &[&CallRecord],
    fields: &[GroupField],
    config: &ReportConfig,
) -> Vec<(chrono::NaiveDate, MetricRow)> {
    aggregate(records, fields, config)
        .into_iter()
        .filter_map(|row| {
            let day = match row.key.0.first() {
                Some(KeyPart::Date(Some(day))) => *day,
                _ => return None,
            };
            Some((day, row))
        })
        .collect()
}

fn key_text(row: &MetricRow, index: usize) -> String {
    match row.key.0.get(index) {
        Some(KeyPart::Text(Some(s))) => s.clone(),
        _ => String::new(),
    }
}

/// Daily productivity per client, with a closing row of column averages.
pub fn productivity(records: &[&CallRecord], config: &ReportConfig) -> ReportTable {
    let fields = [GroupField::Date, GroupField::Client];
    let rows: Vec<ProductivityRow> = dated_rows(records, &fields, config)
        .into_iter()
        .map(|(day, row)| ProductivityRow {
            day,
            client: key_text(&row, 1),
            total_agents: row.agents,
            total_connected: row.connected_with_account,
            talk_time: Hms(row.talk_time_secs),
            connected_ave: row.connected_per_agent(),
            talk_time_ave: row.talk_time_per_agent().map(Hms),
        })
        .collect();

    let mut table = ReportTable::from_rows("PRODUCTIVITY", "Summary Table by Day", &rows);
    if !rows.is_empty() {
        table.rows.push(vec![
            Cell::Text("Total".into()),
            Cell::Blank,
            Cell::Blank,
            Cell::Decimal(average_defined(rows.iter().map(|r| Some(r.total_connected as f64)))),
            Cell::Duration(average_defined(rows.iter().map(|r| Some(r.talk_time.0)))),
            Cell::Decimal(average_defined(rows.iter().map(|r| r.connected_ave))),
            Cell::Duration(average_defined(rows.iter().map(|r| r.talk_time_ave.map(|h| h.0)))),
        ]);
    }
    table
}

/// Productivity per date across every client.
pub fn overall_productivity(records: &[&CallRecord], config: &ReportConfig) -> ReportTable {
    let rows: Vec<OverallProductivityRow> = dated_rows(records, &[GroupField::Date], config)
        .into_iter()
        .map(|(day, row)| OverallProductivityRow {
            day,
            total_agents: row.agents,
            total_connected: row.connected_with_account,
            talk_time: Hms(row.talk_time_secs),
            connected_ave: row.connected_per_agent(),
            talk_time_ave: row.talk_time_per_agent().map(Hms),
        })
        .collect();
    ReportTable::from_rows("OVERALL PRODUCTIVITY", "Overall Summary per Date", &rows)
}

/// Daily skip counts and per-collector averages. The closing "Average" row
/// is the mean of the daily averages, not a ratio of grand totals.
pub fn skip_summary(
    records: &[&CallRecord],
    config: &ReportConfig,
) -> (ReportTable, Vec<SkipRow>) {
    let rows: Vec<SkipRow> = dated_rows(records, &[GroupField::Date], config)
        .into_iter()
        .map(|(day, row)| SkipRow {
            day,
            collectors: row.agents,
            positive_skip: row.positive_skips,
            negative_skip: row.negative_skips,
            total_skip: row.total_skips(),
            positive_skip_ave: row.positive_skips_per_agent(),
            negative_skip_ave: row.negative_skips_per_agent(),
            total_skip_ave: row.total_skips_per_agent(),
        })
        .collect();

    let mut table = ReportTable::from_rows("SKIP SUMMARY", "Skip Summary per Day", &rows);
    if !rows.is_empty() {
        let (positive, negative, total) = skip_averages(&rows);
        table.rows.push(vec![
            Cell::Text("Average".into()),
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Blank,
            Cell::Decimal(positive),
            Cell::Decimal(negative),
            Cell::Decimal(total),
        ]);
    }
    (table, rows)
}

/// Mean of the daily per-collector averages; days without collectors are
/// left out.
pub fn skip_averages(rows: &[SkipRow]) -> (Option<f64>, Option<f64>, Option<f64>) {
    (
        average_defined(rows.iter().map(|r| r.positive_skip_ave)),
        average_defined(rows.iter().map(|r| r.negative_skip_ave)),
        average_defined(rows.iter().map(|r| r.total_skip_ave)),
    )
}

fn summarize(
    records: &[&CallRecord],
    range: Option<&DateRange>,
    skip_rows: &[SkipRow],
    config: &ReportConfig,
) -> SummaryStats {
    let totals = compute(records, GroupKey::default(), config);
    let dates: BTreeSet<chrono::NaiveDate> = records.iter().filter_map(|r| r.date).collect();
    let (positive, negative, total) = skip_averages(skip_rows);
    SummaryStats {
        start_date: range.map(|r| r.start).or_else(|| dates.first().copied()),
        end_date: range.map(|r| r.end).or_else(|| dates.last().copied()),
        total_rows: totals.total_dialed,
        accounts: totals.accounts,
        connected_accounts: totals.connected_accounts,
        connected_rows: totals.connected_rows,
        ptp_accounts: totals.ptp_accounts,
        total_ptp_amount: totals.ptp_amount,
        total_talk_time: format_hms(totals.talk_time_secs),
        positive_skip_ave: positive,
        negative_skip_ave: negative,
        total_skip_ave: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn call(
        d: u32,
        client: &str,
        agent: &str,
        account: &str,
        status: &str,
        talk: f64,
    ) -> CallRecord {
        CallRecord {
            date: Some(day(d)),
            time: None,
            client: client.into(),
            agent: agent.into(),
            call_status: "CONNECTED".into(),
            status: status.into(),
            remark: String::new(),
            remark_type: "Outgoing".into(),
            talk_time_secs: talk,
            call_duration_secs: Some(talk + 5.0),
            ptp_amount: 0.0,
            balance: 0.0,
            account_no: account.into(),
            service_no: format!("0{} 555", d),
            cycle: Some(format!("0{}", d)),
            reason_for_default: String::new(),
        }
    }

    /// Day 1: two collectors, four positive skips. Day 2: one collector,
    /// one positive skip.
    fn uneven_days() -> Vec<CallRecord> {
        vec![
            call(1, "X", "A", "1", "POSITIVE SKIP - FB", 60.0),
            call(1, "X", "A", "2", "POSITIVE SKIP - FB", 60.0),
            call(1, "X", "B", "3", "POSITIVE SKIP - FB", 60.0),
            call(1, "X", "B", "4", "POSITIVE SKIP - FB", 60.0),
            call(2, "X", "C", "5", "POSITIVE SKIP - FB", 60.0),
        ]
    }

    #[test]
    fn test_skip_average_is_mean_of_daily_averages() {
        let records = uneven_days();
        let refs: Vec<&CallRecord> = records.iter().collect();
        let (table, rows) = skip_summary(&refs, &ReportConfig::default());
        assert_eq!(rows[0].positive_skip_ave, Some(2.0));
        assert_eq!(rows[1].positive_skip_ave, Some(1.0));

        let (positive, _, total) = skip_averages(&rows);
        assert_eq!(positive, Some(1.5));
        assert_eq!(total, Some(1.5));
        let grand_ratio = 5.0 / 3.0;
        assert!((positive.unwrap() - grand_ratio).abs() > 0.1);

        let footer = table.rows.last().unwrap();
        assert_eq!(footer[0], Cell::Text("Average".into()));
        assert_eq!(footer[5], Cell::Decimal(Some(1.5)));
    }

    #[test]
    fn test_productivity_rows_and_total() {
        let records = uneven_days();
        let refs: Vec<&CallRecord> = records.iter().collect();
        let table = productivity(&refs, &ReportConfig::default());
        assert_eq!(table.headers[0], "Day");
        assert_eq!(table.headers[4], "Talk Time (HH:MM:SS)");
        assert_eq!(table.rows.len(), 3);

        // Day 1: 2 agents, 4 connected, 240s talk.
        assert_eq!(table.rows[0][2], Cell::Count(2));
        assert_eq!(table.rows[0][3], Cell::Count(4));
        assert_eq!(table.rows[0][4], Cell::Duration(Some(240.0)));
        assert_eq!(table.rows[0][5], Cell::Decimal(Some(2.0)));
        assert_eq!(table.rows[0][6], Cell::Duration(Some(120.0)));

        let total = &table.rows[2];
        assert_eq!(total[0], Cell::Text("Total".into()));
        assert_eq!(total[3], Cell::Decimal(Some(2.5)));
        assert_eq!(total[4], Cell::Duration(Some(150.0)));
        assert_eq!(total[5], Cell::Decimal(Some(1.5)));
        assert_eq!(total[6], Cell::Duration(Some(90.0)));
    }

    #[test]
    fn test_total_connected_skips_blank_accounts() {
        let records = vec![
            call(1, "X", "A", "1", "NORMAL", 60.0),
            call(1, "X", "A", "", "NORMAL", 60.0),
            call(1, "X", "A", "  ", "NORMAL", 60.0),
        ];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let config = ReportConfig::default();

        let table = productivity(&refs, &config);
        assert_eq!(table.rows[0][3], Cell::Count(1));
        assert_eq!(table.rows[0][5], Cell::Decimal(Some(1.0)));
        let overall = overall_productivity(&refs, &config);
        assert_eq!(overall.rows[0][2], Cell::Count(1));

        // "Connected Acc" in the collection table still counts every row.
        let collection = collection_table("X", "X", &refs, &[GroupField::Date], &config);
        let col = collection.headers.iter().position(|h| h == "Connected Acc").unwrap();
        assert_eq!(collection.rows[0][col], Cell::Count(3));
    }

    #[test]
    fn test_build_respects_range_and_splits_clients() {
        let mut records = uneven_days();
        records.push(call(2, "Y", "D", "9", "NORMAL", 30.0));
        let range = DateRange::new(day(2), day(2)).unwrap();
        let set = build(&records, Some(&range), &[], &ReportConfig::default());

        let names: Vec<&str> = set.clients.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y"]);
        assert_eq!(set.overall.rows.len(), 1);
        assert_eq!(set.overall.rows[0][0], Cell::Date(day(2)));
        assert_eq!(set.overall.rows[0][2], Cell::Count(2));
        assert_eq!(set.summary.total_rows, 2);
        assert_eq!(set.summary.start_date, Some(day(2)));
        assert!(set.custom.is_none());
        assert_eq!(set.tables().len(), 6);
    }

    #[test]
    fn test_client_tables_group_by_cycle() {
        let records = uneven_days();
        let set = build(&records, None, &[], &ReportConfig::default());
        let x = &set.clients[0];
        assert_eq!(x.headers[0], "Day");
        assert_eq!(x.headers[1], "Cycle");
        assert_eq!(x.rows[0][1], Cell::Text("01".into()));
        assert_eq!(x.rows.len(), 2);
    }

    #[test]
    fn test_empty_selection_yields_empty_tables() {
        let records = uneven_days();
        let range = DateRange::new(day(10), day(12)).unwrap();
        let set = build(&records, Some(&range), &[GroupField::Collector], &ReportConfig::default());
        assert!(set.clients.is_empty());
        assert!(set.overall.is_empty());
        assert!(set.productivity.is_empty());
        assert!(set.skip.is_empty());
        assert!(set.custom.as_ref().is_some_and(ReportTable::is_empty));
        assert_eq!(set.summary.total_rows, 0);
        assert_eq!(set.summary.total_skip_ave, None);
    }

    #[test]
    fn test_custom_grouping_headers() {
        let records = uneven_days();
        let set = build(
            &records,
            None,
            &[GroupField::Collector, GroupField::Date],
            &ReportConfig::default(),
        );
        let custom = set.custom.unwrap();
        assert_eq!(custom.headers[0], "Collector");
        assert_eq!(custom.headers[1], "Day");
        assert_eq!(custom.headers[2], "Accounts");
        assert_eq!(custom.rows.len(), 3);
    }
}
