//! State for one interactive run: the loaded file, its filtered working set
//! and the selected date range. Everything downstream is recomputed from
//! these on request.
use crate::config::ReportConfig;
use crate::error::Result;
use crate::filter::{apply_exclusions, DateRange};
use crate::loader::{date_bounds, LoadCache, LoadReport};
use crate::reports::{build, ReportSet};
use crate::types::{CallRecord, GroupField};
use chrono::NaiveDate;
use std::path::Path;

pub struct Session {
    config: ReportConfig,
    group_by: Vec<GroupField>,
    cache: LoadCache,
    working: Vec<CallRecord>,
    range: Option<DateRange>,
    loaded: bool,
}

impl Session {
    pub fn new(config: ReportConfig, group_by: Vec<GroupField>) -> Self {
        Self {
            config,
            group_by,
            cache: LoadCache::new(),
            working: Vec::new(),
            range: None,
            loaded: false,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Load (or reuse) `path`, rebuild the working set and reset the range
    /// to the working set's date span. On error the previous state is kept.
    pub fn load(&mut self, path: &Path) -> Result<LoadReport> {
        let dataset = self.cache.load(path, &self.config)?;
        self.working = apply_exclusions(&dataset.records, &self.config.exclusions);
        self.range = date_bounds(&self.working).map(|(start, end)| DateRange { start, end });
        self.loaded = true;
        tracing::info!(
            working = self.working.len(),
            excluded = dataset.records.len() - self.working.len(),
            "Working set ready"
        );
        Ok(dataset.report.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn working_set(&self) -> &[CallRecord] {
        &self.working
    }

    /// Date span of the working set.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        date_bounds(&self.working)
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn set_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<()> {
        self.range = Some(DateRange::new(start, end)?);
        Ok(())
    }

    /// Fresh reports for the current range, or `None` before a file is loaded.
    pub fn reports(&self) -> Option<ReportSet> {
        if !self.loaded {
            return None;
        }
        Some(build(
            &self.working,
            self.range.as_ref(),
            &self.group_by,
            &self.config,
        ))
    }

    pub fn parse_count(&self) -> usize {
        self.cache.parse_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use std::io::Write;

    fn remark_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "Date,Client,Remark By,Call Status,Status,Talk Time Duration,Call Duration,Account No."
        )
        .unwrap();
        writeln!(file, "2024-01-01,X,A,CONNECTED,NORMAL,60,70,1").unwrap();
        writeln!(file, "2024-01-02,X,BLRUIZ,CONNECTED,NORMAL,60,70,2").unwrap();
        writeln!(file, "2024-01-03,X,A,CONNECTED,CALL ABORTED,0,0,3").unwrap();
        writeln!(file, "2024-01-04,X,B,CONNECTED,NORMAL,30,35,4").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reports_none_before_load() {
        let session = Session::new(ReportConfig::default(), vec![]);
        assert!(session.reports().is_none());
        assert!(!session.is_loaded());
    }

    #[test]
    fn test_load_filters_and_sets_full_range() {
        let file = remark_file();
        let mut session = Session::new(ReportConfig::default(), vec![]);
        let report = session.load(file.path()).unwrap();
        assert_eq!(report.kept_rows, 4);
        assert_eq!(session.working_set().len(), 2);
        let range = session.range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn test_range_change_recomputes_without_reload() {
        let file = remark_file();
        let mut session = Session::new(ReportConfig::default(), vec![]);
        session.load(file.path()).unwrap();
        assert_eq!(session.reports().unwrap().summary.total_rows, 2);

        session
            .set_range(
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
            )
            .unwrap();
        assert_eq!(session.reports().unwrap().summary.total_rows, 1);

        session.load(file.path()).unwrap();
        assert_eq!(session.parse_count(), 1);
    }

    #[test]
    fn test_range_ignores_excluded_rows() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(
            file,
            "Date,Client,Remark By,Call Status,Status,Talk Time Duration,Call Duration,Account No."
        )
        .unwrap();
        writeln!(file, "2023-12-30,X,BLRUIZ,CONNECTED,NORMAL,60,70,1").unwrap();
        writeln!(file, "2024-01-02,X,A,CONNECTED,NORMAL,60,70,2").unwrap();
        writeln!(file, "2024-01-03,X,A,CONNECTED,NORMAL,60,70,3").unwrap();
        file.flush().unwrap();

        let mut session = Session::new(ReportConfig::default(), vec![]);
        session.load(file.path()).unwrap();
        let range = session.range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(session.date_bounds(), Some((range.start, range.end)));
    }

    #[test]
    fn test_failed_reload_keeps_previous_file() {
        let good = remark_file();
        let mut broken = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(broken, "Date,Client\n2024-01-01,X").unwrap();
        broken.flush().unwrap();

        let mut session = Session::new(ReportConfig::default(), vec![]);
        session.load(good.path()).unwrap();
        let range = session.range();
        let err = session.load(broken.path()).unwrap_err();
        assert!(matches!(err, ReportError::MissingColumn(_)));

        assert!(session.date_bounds().is_some());
        assert_eq!(session.range(), range);
        assert_eq!(session.reports().unwrap().summary.total_rows, 2);

        session.load(good.path()).unwrap();
        assert_eq!(session.parse_count(), 1);
    }

    #[test]
    fn test_invalid_range_keeps_previous() {
        let file = remark_file();
        let mut session = Session::new(ReportConfig::default(), vec![]);
        session.load(file.path()).unwrap();
        let before = session.range();
        let err = session
            .set_range(
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidRange { .. }));
        assert_eq!(session.range(), before);
    }
}
