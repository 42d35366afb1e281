//! Grouping and per-group metric computation.
use crate::config::{AgentQualification, PtpRateBasis, ReportConfig};
use crate::filter::{contains_any, equals_any};
use crate::types::{CallRecord, GroupField, GroupKey};
use crate::util::{rate, ratio};
use std::collections::{BTreeMap, HashSet};

/// Aggregate figures for one group key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRow {
    pub key: GroupKey,
    /// Distinct account ids.
    pub accounts: usize,
    /// Row count, one dial attempt per row.
    pub total_dialed: usize,
    /// Distinct accounts with a connected call ("Connected #").
    pub connected_accounts: usize,
    /// Connected rows ("Connected Acc").
    pub connected_rows: usize,
    /// Connected rows carrying an account id ("Total Connected").
    pub connected_with_account: usize,
    pub ptp_accounts: usize,
    pub ptp_amount: f64,
    /// Balance over rows carrying a non-zero PTP amount.
    pub ptp_balance: f64,
    pub system_drops: usize,
    pub call_drops: usize,
    pub positive_skips: usize,
    pub negative_skips: usize,
    pub talk_time_secs: f64,
    /// Qualified agents, see [`qualified_agents`].
    pub agents: usize,
}

impl MetricRow {
    pub fn penetration_rate(&self) -> Option<f64> {
        rate(self.total_dialed as f64, self.accounts as f64)
    }

    pub fn connected_rate(&self) -> Option<f64> {
        rate(self.connected_rows as f64, self.total_dialed as f64)
    }

    pub fn ptp_rate(&self, basis: PtpRateBasis) -> Option<f64> {
        let denominator = match basis {
            PtpRateBasis::ConnectedAccounts => self.connected_accounts,
            PtpRateBasis::ConnectedRows => self.connected_rows,
        };
        rate(self.ptp_accounts as f64, denominator as f64)
    }

    /// System drops over connected rows, or human call drops when
    /// `manual_correction` is set.
    pub fn call_drop_ratio(&self, manual_correction: bool) -> Option<f64> {
        let drops = if manual_correction {
            self.call_drops
        } else {
            self.system_drops
        };
        rate(drops as f64, self.connected_rows as f64)
    }

    pub fn total_skips(&self) -> usize {
        self.positive_skips + self.negative_skips
    }

    pub fn talk_time_per_agent(&self) -> Option<f64> {
        ratio(self.talk_time_secs, self.agents as f64)
    }

    pub fn connected_per_agent(&self) -> Option<f64> {
        ratio(self.connected_with_account as f64, self.agents as f64)
    }

    pub fn positive_skips_per_agent(&self) -> Option<f64> {
        ratio(self.positive_skips as f64, self.agents as f64)
    }

    pub fn negative_skips_per_agent(&self) -> Option<f64> {
        ratio(self.negative_skips as f64, self.agents as f64)
    }

    pub fn total_skips_per_agent(&self) -> Option<f64> {
        ratio(self.total_skips() as f64, self.agents as f64)
    }
}

/// Row classification against the configured keyword lists.
pub struct Classifier<'a> {
    config: &'a ReportConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self { config }
    }

    fn is_system(&self, r: &CallRecord) -> bool {
        r.agent.trim() == self.config.system_agent
    }

    pub fn is_connected(&self, r: &CallRecord) -> bool {
        r.call_status.trim().eq_ignore_ascii_case(&self.config.connected_status)
    }

    pub fn is_ptp(&self, r: &CallRecord) -> bool {
        r.ptp_amount != 0.0 && contains_keyword(&r.status, &self.config.ptp_keyword)
    }

    pub fn is_system_drop(&self, r: &CallRecord) -> bool {
        self.is_system(r) && contains_keyword(&r.status, &self.config.system_drop_keyword)
    }

    pub fn is_call_drop(&self, r: &CallRecord) -> bool {
        !self.is_system(r) && contains_keyword(&r.status, &self.config.call_drop_keyword)
    }

    pub fn is_positive_skip(&self, r: &CallRecord) -> bool {
        contains_any(&r.status, &self.config.positive_skip_keywords)
    }

    pub fn is_negative_skip(&self, r: &CallRecord) -> bool {
        equals_any(&r.status, &self.config.negative_skip_statuses)
    }

    /// Whether this row makes its agent count toward "Total Agents".
    pub fn qualifies_agent(&self, r: &CallRecord) -> bool {
        if r.agent.trim().is_empty() || self.is_system(r) {
            return false;
        }
        match self.config.agent_qualification {
            AgentQualification::AnyRow => true,
            AgentQualification::RealCall => r.call_duration_secs.is_some_and(|d| d > 0.0),
        }
    }
}

fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    !keyword.is_empty() && haystack.to_uppercase().contains(&keyword.to_uppercase())
}

/// Distinct agents that qualify under the configured rule.
pub fn qualified_agents(records: &[&CallRecord], config: &ReportConfig) -> usize {
    let classifier = Classifier::new(config);
    records
        .iter()
        .filter(|r| classifier.qualifies_agent(r))
        .map(|r| r.agent.trim())
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Default)]
struct Acc<'r> {
    accounts: HashSet<&'r str>,
    connected_accounts: HashSet<&'r str>,
    ptp_accounts: HashSet<&'r str>,
    agents: HashSet<&'r str>,
    row: MetricRow,
}

impl<'r> Acc<'r> {
    fn add(&mut self, r: &'r CallRecord, c: &Classifier<'_>) {
        let account = r.account_no.trim();
        let has_account = !account.is_empty();
        if has_account {
            self.accounts.insert(account);
        }
        self.row.total_dialed += 1;
        self.row.talk_time_secs += r.talk_time_secs;

        if c.is_connected(r) {
            self.row.connected_rows += 1;
            if has_account {
                self.row.connected_with_account += 1;
                self.connected_accounts.insert(account);
            }
        }
        if c.is_ptp(r) {
            if has_account {
                self.ptp_accounts.insert(account);
            }
            self.row.ptp_amount += r.ptp_amount;
        }
        if r.ptp_amount != 0.0 {
            self.row.ptp_balance += r.balance;
        }
        if c.is_system_drop(r) {
            self.row.system_drops += 1;
        }
        if c.is_call_drop(r) {
            self.row.call_drops += 1;
        }
        if c.is_positive_skip(r) {
            self.row.positive_skips += 1;
        }
        if c.is_negative_skip(r) {
            self.row.negative_skips += 1;
        }
        if c.qualifies_agent(r) {
            self.agents.insert(r.agent.trim());
        }
    }

    fn finish(self, key: GroupKey) -> MetricRow {
        MetricRow {
            key,
            accounts: self.accounts.len(),
            connected_accounts: self.connected_accounts.len(),
            ptp_accounts: self.ptp_accounts.len(),
            agents: self.agents.len(),
            ..self.row
        }
    }
}

/// Metrics over a single set of records.
pub fn compute(records: &[&CallRecord], key: GroupKey, config: &ReportConfig) -> MetricRow {
    let classifier = Classifier::new(config);
    let mut acc = Acc::default();
    for r in records {
        acc.add(r, &classifier);
    }
    acc.finish(key)
}

/// Partition `records` by `fields`; keys come back in ascending order.
pub fn group<'r>(
    records: &[&'r CallRecord],
    fields: &[GroupField],
) -> BTreeMap<GroupKey, Vec<&'r CallRecord>> {
    let mut map: BTreeMap<GroupKey, Vec<&'r CallRecord>> = BTreeMap::new();
    for r in records {
        map.entry(GroupKey::of(r, fields)).or_default().push(*r);
    }
    map
}

/// One [`MetricRow`] per distinct key, ascending.
pub fn aggregate(
    records: &[&CallRecord],
    fields: &[GroupField],
    config: &ReportConfig,
) -> Vec<MetricRow> {
    let rows: Vec<MetricRow> = group(records, fields)
        .into_iter()
        .map(|(key, members)| compute(&members, key, config))
        .collect();
    tracing::debug!(groups = rows.len(), ?fields, "Aggregated metric rows");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyPart;
    use crate::util::format_hms;
    use chrono::NaiveDate;

    fn record(agent: &str, account: &str, call_status: &str, status: &str) -> CallRecord {
        CallRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            time: None,
            client: "X".into(),
            agent: agent.into(),
            call_status: call_status.into(),
            status: status.into(),
            remark: String::new(),
            remark_type: "Predictive".into(),
            talk_time_secs: 0.0,
            call_duration_secs: None,
            ptp_amount: 0.0,
            balance: 0.0,
            account_no: account.into(),
            service_no: String::new(),
            cycle: None,
            reason_for_default: String::new(),
        }
    }

    fn scenario() -> Vec<CallRecord> {
        let mut a1 = record("A", "1001", "CONNECTED", "RPC_POSITIVE SKIP WITH REPLY - VIBER");
        a1.talk_time_secs = 120.0;
        a1.call_duration_secs = Some(130.0);
        let mut a2 = record("A", "1002", "CONNECTED", "NORMAL");
        a2.talk_time_secs = 60.0;
        a2.call_duration_secs = Some(70.0);
        let b = record("SYSTEM", "1003", "DROPPED", "DROPPED");
        vec![a1, a2, b]
    }

    #[test]
    fn test_three_row_scenario() {
        let records = scenario();
        let refs: Vec<&CallRecord> = records.iter().collect();
        let row = compute(&refs, GroupKey::default(), &ReportConfig::default());
        assert_eq!(row.accounts, 3);
        assert_eq!(row.total_dialed, 3);
        assert_eq!(row.connected_accounts, 2);
        assert_eq!(row.connected_rows, 2);
        assert_eq!(row.positive_skips, 1);
        assert_eq!(row.negative_skips, 0);
        assert_eq!(row.total_skips(), 1);
        assert_eq!(format_hms(row.talk_time_secs), "00:03:00");
        assert_eq!(row.system_drops, 1);
        assert_eq!(row.call_drops, 0);
        assert_eq!(row.agents, 1);
        assert_eq!(row.call_drop_ratio(false), Some(50.0));
        assert_eq!(row.penetration_rate(), Some(100.0));
    }

    #[test]
    fn test_zero_accounts_gives_blank_rates() {
        let records = vec![record("A", "", "DROPPED", "NORMAL")];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let row = compute(&refs, GroupKey::default(), &ReportConfig::default());
        assert_eq!(row.accounts, 0);
        assert_eq!(row.penetration_rate(), None);
        assert_eq!(row.ptp_rate(PtpRateBasis::ConnectedAccounts), None);
        assert_eq!(row.call_drop_ratio(true), None);
        assert_eq!(row.talk_time_per_agent(), None);
    }

    #[test]
    fn test_ptp_requires_keyword_and_amount() {
        let mut p1 = record("A", "1", "CONNECTED", "ptp - full payment");
        p1.ptp_amount = 500.0;
        p1.balance = 2000.0;
        let mut p2 = record("A", "1", "CONNECTED", "PTP - PARTIAL");
        p2.ptp_amount = 250.0;
        p2.balance = 2000.0;
        let p3 = record("A", "2", "CONNECTED", "PTP - FULL");
        let mut p4 = record("A", "3", "CONNECTED", "NORMAL");
        p4.ptp_amount = 100.0;
        p4.balance = 50.0;
        let records = vec![p1, p2, p3, p4];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let row = compute(&refs, GroupKey::default(), &ReportConfig::default());
        assert_eq!(row.ptp_accounts, 1);
        assert_eq!(row.ptp_amount, 750.0);
        assert_eq!(row.ptp_balance, 4050.0);
        assert_eq!(row.connected_accounts, 3);
        assert_eq!(row.connected_rows, 4);
        let by_accounts = row.ptp_rate(PtpRateBasis::ConnectedAccounts).unwrap();
        assert!((by_accounts - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(row.ptp_rate(PtpRateBasis::ConnectedRows), Some(25.0));
    }

    #[test]
    fn test_call_drop_manual_correction() {
        let config = ReportConfig::default();
        let records = vec![
            record("A", "1", "CONNECTED", "NORMAL"),
            record("A", "2", "CONNECTED", "NORMAL"),
            record("A", "3", "CONNECTED", "NORMAL"),
            record("A", "4", "CONNECTED", "NORMAL"),
            record("B", "5", "DROPPED", "NEGATIVE CALLOUTS - DROPPED CALL"),
            record("SYSTEM", "6", "DROPPED", "DROPPED"),
            record("SYSTEM", "7", "DROPPED", "DROPPED"),
        ];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let row = compute(&refs, GroupKey::default(), &config);
        assert_eq!(row.system_drops, 2);
        assert_eq!(row.call_drops, 1);
        assert_eq!(row.call_drop_ratio(false), Some(50.0));
        assert_eq!(row.call_drop_ratio(true), Some(25.0));
    }

    #[test]
    fn test_negative_skip_is_exact() {
        let config = ReportConfig::default();
        let records = vec![
            record("A", "1", "CONNECTED", "NEGATIVE_CALLOUTS - DO NOT EXIST"),
            record("A", "2", "CONNECTED", "NEGATIVE_CALLOUTS - DO NOT EXIST (RETRY)"),
        ];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let row = compute(&refs, GroupKey::default(), &config);
        assert_eq!(row.negative_skips, 1);
    }

    #[test]
    fn test_agent_qualification_rules() {
        let mut real = record("A", "1", "CONNECTED", "NORMAL");
        real.call_duration_secs = Some(30.0);
        let mut zero = record("B", "2", "CONNECTED", "NORMAL");
        zero.call_duration_secs = Some(0.0);
        let blank = record("C", "3", "CONNECTED", "NORMAL");
        let mut system = record("SYSTEM", "4", "DROPPED", "DROPPED");
        system.call_duration_secs = Some(10.0);
        let records = vec![real, zero, blank, system];
        let refs: Vec<&CallRecord> = records.iter().collect();

        assert_eq!(qualified_agents(&refs, &ReportConfig::default()), 1);
        let any_row = ReportConfig {
            agent_qualification: AgentQualification::AnyRow,
            ..ReportConfig::default()
        };
        assert_eq!(qualified_agents(&refs, &any_row), 3);
    }

    #[test]
    fn test_partition_total_dialed_sums_to_row_count() {
        let mut records = scenario();
        let mut other = record("C", "2001", "CONNECTED", "NORMAL");
        other.client = "Y".into();
        other.date = NaiveDate::from_ymd_opt(2024, 1, 2);
        records.push(other);
        let refs: Vec<&CallRecord> = records.iter().collect();
        let rows = aggregate(
            &refs,
            &[GroupField::Date, GroupField::Client, GroupField::Collector],
            &ReportConfig::default(),
        );
        let dialed: usize = rows.iter().map(|r| r.total_dialed).sum();
        assert_eq!(dialed, records.len());
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_groups_sorted_by_date_then_key() {
        let mut late = record("A", "1", "CONNECTED", "NORMAL");
        late.date = NaiveDate::from_ymd_opt(2024, 1, 3);
        let mut early_b = record("A", "2", "CONNECTED", "NORMAL");
        early_b.client = "B".into();
        let mut early_a = record("A", "3", "CONNECTED", "NORMAL");
        early_a.client = "A".into();
        let records = vec![late, early_b, early_a];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let rows = aggregate(
            &refs,
            &[GroupField::Date, GroupField::Client],
            &ReportConfig::default(),
        );
        let keys: Vec<&KeyPart> = rows.iter().map(|r| &r.key.0[1]).collect();
        assert_eq!(
            keys,
            vec![
                &KeyPart::Text(Some("A".into())),
                &KeyPart::Text(Some("B".into())),
                &KeyPart::Text(Some("X".into())),
            ]
        );
    }
}
