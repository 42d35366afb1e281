//! Report configuration.
//!
//! Every keyword list and formula toggle used by the filter and the
//! aggregator lives here, loaded once from a JSON file and shared by both
//! stages. All fields have defaults, so a config file only needs to carry
//! the values it overrides.
use crate::error::{ReportError, Result};
use chrono::Weekday;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Header names for each logical column. Matching is done on the normalized
/// (trimmed, whitespace-collapsed, uppercased) header text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub date: String,
    pub time: String,
    pub client: String,
    pub remark_by: String,
    pub call_status: String,
    pub status: String,
    pub remark: String,
    pub remark_type: String,
    pub talk_time: String,
    pub call_duration: String,
    pub account_no: String,
    pub ptp_amount: String,
    pub balance: String,
    pub service_no: String,
    pub reason_for_default: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            date: "DATE".into(),
            time: "TIME".into(),
            client: "CLIENT".into(),
            remark_by: "REMARK BY".into(),
            call_status: "CALL STATUS".into(),
            status: "STATUS".into(),
            remark: "REMARK".into(),
            remark_type: "REMARK TYPE".into(),
            talk_time: "TALK TIME DURATION".into(),
            call_duration: "CALL DURATION".into(),
            account_no: "ACCOUNT NO.".into(),
            ptp_amount: "PTP AMOUNT".into(),
            balance: "BALANCE".into(),
            service_no: "SERVICE NO.".into(),
            reason_for_default: "REASON FOR DEFAULT".into(),
        }
    }
}

/// Text fields an exclusion rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    RemarkBy,
    Status,
    CallStatus,
    Remark,
    RemarkType,
    Client,
    ReasonForDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Trimmed equality with any listed value.
    Exact,
    /// Case-insensitive substring match against any listed keyword.
    Contains,
}

/// A row matching this rule is dropped from the working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub field: RuleField,
    #[serde(rename = "match")]
    pub kind: MatchKind,
    pub values: Vec<String>,
}

impl ExclusionRule {
    pub fn exact(field: RuleField, values: &[&str]) -> Self {
        Self {
            field,
            kind: MatchKind::Exact,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn contains(field: RuleField, values: &[&str]) -> Self {
        Self {
            field,
            kind: MatchKind::Contains,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Denominator used for the PTP rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtpRateBasis {
    /// Distinct connected accounts, "Connected #".
    #[default]
    ConnectedAccounts,
    /// Connected rows, "Connected Acc".
    ConnectedRows,
}

/// Which rows make an agent count toward "Total Agents" / "Collectors".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentQualification {
    /// Any row attributed to the agent.
    AnyRow,
    /// Only rows with a call duration present and greater than zero.
    #[default]
    RealCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub columns: ColumnMap,
    pub exclusions: Vec<ExclusionRule>,
    pub positive_skip_keywords: Vec<String>,
    pub negative_skip_statuses: Vec<String>,
    pub exclude_weekdays: Vec<Weekday>,
    /// Use human call drops instead of system drops for the call drop ratio.
    pub manual_correction: bool,
    pub ptp_rate_basis: PtpRateBasis,
    pub agent_qualification: AgentQualification,
    pub system_agent: String,
    pub system_drop_keyword: String,
    pub call_drop_keyword: String,
    pub ptp_keyword: String,
    pub connected_status: String,
    pub cycle_pattern: String,
}

const DEFAULT_EXCLUDED_AGENTS: &[&str] = &[
    "FGPANGANIBAN",
    "KPILUSTRISIMO",
    "BLRUIZ",
    "MMMEJIA",
    "SAHERNANDEZ",
    "GPRAMOS",
    "JGCELIZ",
    "SPMADRID",
    "RRCARLIT",
    "MEBEJER",
    "SEMIJARES",
    "GMCARIAN",
    "RRRECTO",
    "EASORIANO",
    "EUGALERA",
    "JATERRADO",
    "LMLABRADOR",
];

const DEFAULT_EXCLUDED_REMARKS: &[&str] = &[
    "Broken Promise",
    "New files imported",
    "Updates when case reassign to another collector",
    "NDF IN ICS",
    "FOR PULL OUT (END OF HANDLING PERIOD)",
    "END OF HANDLING PERIOD",
    "New Assignment -",
    "File Unhold",
];

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            exclusions: vec![
                ExclusionRule::exact(RuleField::RemarkBy, DEFAULT_EXCLUDED_AGENTS),
                ExclusionRule::contains(RuleField::Status, &["ABORT", "OTHERS"]),
                ExclusionRule::contains(RuleField::Remark, DEFAULT_EXCLUDED_REMARKS),
            ],
            positive_skip_keywords: vec![
                "POSITIVE SKIP".into(),
                "SKIPTRACE_POS".into(),
            ],
            negative_skip_statuses: vec![
                "NEGATIVE_CALLOUTS - DO NOT EXIST".into(),
                "NEGATIVE_CALLOUTS - DEACTIVATED".into(),
                "NEGATIVE_CALLOUTS - NOT IN SERVICE".into(),
                "NEGATIVE_CALLOUTS - WRONG NUMBER".into(),
            ],
            exclude_weekdays: Vec::new(),
            manual_correction: false,
            ptp_rate_basis: PtpRateBasis::default(),
            agent_qualification: AgentQualification::default(),
            system_agent: "SYSTEM".into(),
            system_drop_keyword: "DROPPED".into(),
            call_drop_keyword: "NEGATIVE CALLOUTS - DROPPED CALL".into(),
            ptp_keyword: "PTP".into(),
            connected_status: "CONNECTED".into(),
            cycle_pattern: r"^\s*(\d+)".into(),
        }
    }
}

impl ReportConfig {
    /// Load a config file. Missing keys fall back to their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ReportError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.cycle_regex()?;
        tracing::debug!(
            path = %path.display(),
            rules = config.exclusions.len(),
            "Loaded report config"
        );
        Ok(config)
    }

    /// Compile the cycle extraction pattern.
    pub fn cycle_regex(&self) -> Result<Regex> {
        Ok(Regex::new(&self.cycle_pattern)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{ "manual_correction": true, "exclude_weekdays": ["Sun"] }"#;
        let cfg: ReportConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.manual_correction);
        assert_eq!(cfg.exclude_weekdays, vec![Weekday::Sun]);
        assert_eq!(cfg.system_agent, "SYSTEM");
        assert_eq!(cfg.columns.remark_by, "REMARK BY");
        assert_eq!(cfg.exclusions.len(), 3);
    }

    #[test]
    fn test_rule_deserializes_from_match_key() {
        let json = r#"{
            "exclusions": [{ "field": "remark_by", "match": "exact", "values": ["JDOE"] }],
            "ptp_rate_basis": "connected_rows",
            "agent_qualification": "any_row"
        }"#;
        let cfg: ReportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            cfg.exclusions,
            vec![ExclusionRule::exact(RuleField::RemarkBy, &["JDOE"])]
        );
        assert_eq!(cfg.ptp_rate_basis, PtpRateBasis::ConnectedRows);
        assert_eq!(cfg.agent_qualification, AgentQualification::AnyRow);
    }

    #[test]
    fn test_column_map_partial_override() {
        let json = r#"{ "columns": { "account_no": "ACCOUNT NUMBER" } }"#;
        let cfg: ReportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.columns.account_no, "ACCOUNT NUMBER");
        assert_eq!(cfg.columns.date, "DATE");
    }

    #[test]
    fn test_load_from_rejects_bad_pattern() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cycle_pattern": "([0-9" }}"#).unwrap();
        let err = ReportConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidPattern(_)));
    }

    #[test]
    fn test_demo_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/config.json");
        let cfg = ReportConfig::load_from(&path).unwrap();
        assert_eq!(cfg.exclude_weekdays, vec![Weekday::Sun]);
        assert_eq!(cfg.exclusions.len(), 3);
        assert_eq!(cfg.columns.client, "CLIENT");
        assert!(cfg.cycle_regex().unwrap().is_match("cycle 21"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ReportConfig::load_from(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ReportError::FileRead { .. }));
    }
}
