//! Orchestration of the processing runs
//!
//! A [`Pipeline`] borrows one immutable [`JobConfig`] and one
//! [`DatasetSink`] and turns them into per-member climatologies, overturning
//! products and ensemble statistics. Each product is built and persisted on its
//! own; a failure is recorded in the [`RunReport`] and the run moves on to the
//! next product.

use crate::config::JobConfig;
use crate::data_source::{DataSource, FieldQuery, NetcdfSource};
use crate::errors::{OceanReduceError, Result};
use crate::field::GridField;
use crate::netcdf_io::DatasetSink;
use crate::statistics::{
    add_component, build_streamfunction, climatology, ensemble_stats, mean_of_yearly_max,
    rolling_weighted_mean, sort_members, sum_over, time_max, time_mean, LumpBy, ANNUAL_WINDOW,
    DECADAL_WINDOW,
};
use crate::time::calendar_weights;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What happened to one product of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableOutcome {
    Written(PathBuf),
    /// Nothing to process, e.g. the variable is not in the source
    Skipped(String),
    Failed(String),
}

impl VariableOutcome {
    fn from_error(err: &OceanReduceError) -> Self {
        if err.is_no_data() {
            Self::Skipped(err.to_string())
        } else {
            Self::Failed(err.to_string())
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for VariableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written(path) => write!(f, "written to {}", path.display()),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Outcomes of every product of one run, in production order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run: String,
    pub outcomes: Vec<(String, VariableOutcome)>,
}

impl RunReport {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            outcomes: Vec::new(),
        }
    }

    /// Record and log the outcome of `product`
    pub fn record(&mut self, product: impl Into<String>, outcome: VariableOutcome) {
        let product = product.into();
        match &outcome {
            VariableOutcome::Written(path) => {
                info!("💾 [{}] {product} saved to {}", self.run, path.display());
            }
            VariableOutcome::Skipped(reason) => {
                warn!("⚠️ [{}] Skipping {product}: {reason}", self.run);
            }
            VariableOutcome::Failed(reason) => {
                error!("❌ [{}] {product} failed: {reason}", self.run);
            }
        }
        self.outcomes.push((product, outcome));
    }

    #[must_use]
    pub fn outcome(&self, product: &str) -> Option<&VariableOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == product)
            .map(|(_, outcome)| outcome)
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, VariableOutcome::Written(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, VariableOutcome::Skipped(_)))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(VariableOutcome::is_failure)
    }

    fn count(&self, pred: impl Fn(&VariableOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    /// `true` when no product failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn log_summary(&self) {
        info!(
            "✅ [{}] {} written, {} skipped, {} failed",
            self.run,
            self.written(),
            self.skipped(),
            self.failed()
        );
    }
}

/// Output name of a rolling product for a window length
#[must_use]
pub fn rolling_product_name(base: &str, window: usize) -> String {
    match window {
        ANNUAL_WINDOW => format!("{base}_rollingyear"),
        DECADAL_WINDOW => format!("{base}_rollingdecade"),
        n => format!("{base}_rolling{n}"),
    }
}

/// Drives every run described by a [`JobConfig`]
pub struct Pipeline<'a> {
    config: &'a JobConfig,
    sink: &'a dyn DatasetSink,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(config: &'a JobConfig, sink: &'a dyn DatasetSink) -> Self {
        Self { config, sink }
    }

    #[must_use]
    pub const fn config(&self) -> &JobConfig {
        self.config
    }

    fn members(&self) -> Vec<String> {
        let mut members = self.config.members.clone();
        sort_members(&mut members);
        members
    }

    fn query(&self, variable: &str) -> FieldQuery {
        FieldQuery::new(variable, &self.config.frequency)
            .with_time_range(self.config.window)
            .with_chunks(self.config.chunks.clone())
    }

    /// Rename, persist to `{dir}/{product}.nc` and record the outcome
    ///
    /// Returns the persisted field so dependent products can build on it.
    fn persist(
        &self,
        report: &mut RunReport,
        dir: &Path,
        product: &str,
        built: Result<GridField>,
    ) -> Option<GridField> {
        let result = built.and_then(|field| {
            let field = field.renamed(product);
            let path = dir.join(format!("{product}.nc"));
            self.sink.persist(&field, &path, &self.config.chunks)?;
            Ok((field, path))
        });
        match result {
            Ok((field, path)) => {
                report.record(product, VariableOutcome::Written(path));
                Some(field)
            }
            Err(e) => {
                report.record(product, VariableOutcome::from_error(&e));
                None
            }
        }
    }

    /// Climatologies (and yearly-max products) of one member
    pub fn climatology_member(&self, member: &str, source: &dyn DataSource) -> RunReport {
        let config = self.config;
        let dir = config.member_output_dir(member);
        let mut report = RunReport::new(format!("{member} climatology"));
        info!(
            "🔄 Computing {} climatologies of {member} for {}",
            config.lumpby,
            config.window.label()
        );

        for variable in &config.variables {
            let built = source
                .query(&self.query(variable))
                .and_then(|field| climatology(&field, config.lumpby, config.missing.climatology));
            self.persist(&mut report, &dir, variable, built);
        }

        for variable in &config.yearly_max_variables {
            match source.query(&self.query(variable)) {
                Ok(field) => {
                    self.persist(&mut report, &dir, variable, mean_of_yearly_max(&field));
                    self.persist(
                        &mut report,
                        &dir,
                        &format!("{variable}_max"),
                        time_max(&field),
                    );
                }
                Err(e) => report.record(variable.as_str(), VariableOutcome::from_error(&e)),
            }
        }

        report.log_summary();
        report
    }

    /// Overturning streamfunction products of one member
    ///
    /// `psi` and `psi_gm` come straight from the transports; `psi_tot` and
    /// everything derived from it are skipped when an input is unavailable.
    pub fn overturning_member(&self, member: &str, source: &dyn DataSource) -> RunReport {
        let config = self.config;
        let ot = &config.overturning;
        let dir = config.overturning_output_dir(member);
        let mut report = RunReport::new(format!("{member} overturning"));
        info!("🔄 Computing overturning products of {member}");

        let psi = source
            .query(&self.query(&ot.transport))
            .and_then(|t| build_streamfunction(&t, &ot.sum_axis, &ot.integrate_axis));
        let psi = self.persist(&mut report, &dir, "psi", psi);

        let psi_gm = ot.gm_transport.as_ref().map(|gm| {
            let built = source
                .query(&self.query(gm))
                .and_then(|t| sum_over(&t, &ot.sum_axis));
            self.persist(&mut report, &dir, "psi_gm", built)
        });

        let total = match (psi, psi_gm) {
            (None, _) => Err("psi"),
            (Some(_), Some(None)) => Err("psi_gm"),
            (Some(psi), Some(Some(gm))) => Ok(add_component(&psi, &gm)),
            (Some(psi), None) => Ok(Ok(psi)),
        };
        let psi_tot = match total {
            Ok(built) => self.persist(&mut report, &dir, "psi_tot", built),
            Err(missing) => {
                report.record(
                    "psi_tot",
                    VariableOutcome::Skipped(format!("input '{missing}' unavailable")),
                );
                None
            }
        };

        let Some(psi_tot) = psi_tot else {
            let mut names = vec!["psi_tot_year".to_string(), "psi_tot_avg".to_string()];
            names.extend(
                ot.rolling_windows
                    .iter()
                    .map(|&w| rolling_product_name("psi_tot", w)),
            );
            for name in names {
                report.record(
                    name,
                    VariableOutcome::Skipped("input 'psi_tot' unavailable".to_string()),
                );
            }
            report.log_summary();
            return report;
        };

        let year = climatology(&psi_tot, LumpBy::Year, config.missing.climatology);
        self.persist(&mut report, &dir, "psi_tot_year", year);
        let avg = time_mean(&psi_tot, config.missing.climatology);
        self.persist(&mut report, &dir, "psi_tot_avg", avg);

        for &window in &ot.rolling_windows {
            let rolled = psi_tot
                .time_axis()
                .and_then(|(_, time)| calendar_weights(time))
                .and_then(|w| rolling_weighted_mean(&psi_tot, &w, window, config.missing.rolling));
            self.persist(
                &mut report,
                &dir,
                &rolling_product_name("psi_tot", window),
                rolled,
            );
        }

        report.log_summary();
        report
    }

    /// Ensemble statistics of every member's persisted climatologies
    ///
    /// `source_for` opens the outputs of one member. Members without a
    /// variable are left out of its ensemble.
    pub fn ensemble_from<S, F>(&self, source_for: F) -> RunReport
    where
        S: DataSource,
        F: Fn(&str) -> S,
    {
        let config = self.config;
        let dir = config.ensemble_output_dir();
        let mut report = RunReport::new("ensemble");
        let extra_axes: Vec<&str> = config.ensemble_axes.iter().map(String::as_str).collect();
        let sources: Vec<(String, S)> = self
            .members()
            .into_iter()
            .map(|m| {
                let source = source_for(&m);
                (m, source)
            })
            .collect();

        for variable in config.variables.iter().chain(&config.yearly_max_variables) {
            let query = FieldQuery::new(variable, &config.frequency)
                .with_chunks(config.chunks.clone());
            let mut members = BTreeMap::new();
            let mut failure = None;
            for (member, source) in &sources {
                match source.query(&query) {
                    Ok(field) => {
                        members.insert(member.clone(), field);
                    }
                    Err(e) if e.is_no_data() => {
                        warn!("⚠️ {member} has no '{variable}', leaving it out of the ensemble");
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                report.record(variable.as_str(), VariableOutcome::from_error(&e));
                continue;
            }
            if members.is_empty() {
                report.record(
                    variable.as_str(),
                    VariableOutcome::Skipped("no member provides it".to_string()),
                );
                continue;
            }

            match ensemble_stats(&members, &extra_axes) {
                Ok(stats) => {
                    for (_, field) in stats.iter() {
                        let product = field.name().to_string();
                        self.persist(&mut report, &dir, &product, Ok(field.clone()));
                    }
                }
                Err(e) => report.record(variable.as_str(), VariableOutcome::from_error(&e)),
            }
        }

        report.log_summary();
        report
    }

    /// Climatologies of every member, read from `member_input_dir`
    pub fn climatology_all(&self) -> Vec<RunReport> {
        self.members()
            .iter()
            .map(|m| {
                let source = NetcdfSource::new(self.config.member_input_dir(m));
                self.climatology_member(m, &source)
            })
            .collect()
    }

    /// Overturning products of every member, read from `member_input_dir`
    pub fn overturning_all(&self) -> Vec<RunReport> {
        self.members()
            .iter()
            .map(|m| {
                let source = NetcdfSource::new(self.config.member_input_dir(m));
                self.overturning_member(m, &source)
            })
            .collect()
    }

    /// Ensemble statistics over the climatologies written by [`Self::climatology_all`]
    #[must_use]
    pub fn ensemble(&self) -> RunReport {
        self.ensemble_from(|m| NetcdfSource::new(self.config.member_output_dir(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_product_names() {
        assert_eq!(rolling_product_name("psi_tot", 12), "psi_tot_rollingyear");
        assert_eq!(rolling_product_name("psi_tot", 120), "psi_tot_rollingdecade");
        assert_eq!(rolling_product_name("psi_tot", 36), "psi_tot_rolling36");
    }

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::new("r1");
        report.record("a", VariableOutcome::Written(PathBuf::from("/tmp/a.nc")));
        report.record("b", VariableOutcome::Skipped("none".into()));
        report.record("c", VariableOutcome::Failed("boom".into()));
        assert_eq!((report.written(), report.skipped(), report.failed()), (1, 1, 1));
        assert!(!report.is_success());
        assert_eq!(report.outcome("b"), Some(&VariableOutcome::Skipped("none".into())));
    }
}
