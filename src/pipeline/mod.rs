//! Cleaning pipeline: raw borough extracts in, canonical transactions out.
//!
//! The pipeline is an ordered list of named [`Stage`]s folded over a
//! [`Dataset`]. Data-quality problems never fail a run; they turn into
//! `Null`s and dropped rows. Only structural problems (a mandatory raw column
//! missing entirely, an invalid stage order) are errors.

pub mod address;
pub mod filters;
pub mod normalize;
pub mod schema;

use crate::error::{EtlError, Result};
use crate::types::Dataset;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// One named transformation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Drops rows missing mandatory raw fields. Runs on raw column names.
    RemoveMissing,
    /// Projects and renames onto the canonical schema. Rows unchanged.
    SelectAndRename,
    /// Coerces price and date. Rows unchanged.
    StandardiseTypes,
    /// Maps property/estate codes to labels. Rows unchanged.
    MapCodes,
    /// Drops "Other" property types.
    RemoveOtherTypes,
    /// Replaces saon/paon/street with address. Rows unchanged.
    BuildAddress,
    /// Drops rows whose date did not parse.
    RemoveInvalidDates,
    /// Drops exact duplicate rows, keeping the first.
    Deduplicate,
    /// Drops transaction category "B".
    RemoveNonStandardTransaction,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::RemoveMissing => "remove_missing",
            Stage::SelectAndRename => "select_and_rename",
            Stage::StandardiseTypes => "standardise_types",
            Stage::MapCodes => "map_codes",
            Stage::RemoveOtherTypes => "remove_other_types",
            Stage::BuildAddress => "build_address",
            Stage::RemoveInvalidDates => "remove_invalid_dates",
            Stage::Deduplicate => "deduplicate",
            Stage::RemoveNonStandardTransaction => "remove_non_standard_transaction",
        }
    }

    /// Stages that must appear earlier in the list.
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::RemoveMissing | Stage::SelectAndRename => &[],
            Stage::StandardiseTypes
            | Stage::MapCodes
            | Stage::BuildAddress
            | Stage::RemoveNonStandardTransaction => &[Stage::SelectAndRename],
            Stage::RemoveOtherTypes => &[Stage::MapCodes],
            Stage::RemoveInvalidDates => &[Stage::StandardiseTypes],
            Stage::Deduplicate => &[Stage::BuildAddress],
        }
    }

    /// True for stages that never change the number of rows.
    pub fn preserves_rows(&self) -> bool {
        matches!(
            self,
            Stage::SelectAndRename | Stage::StandardiseTypes | Stage::MapCodes | Stage::BuildAddress
        )
    }

    fn apply(&self, data: Dataset, report: &mut CleanReport) -> Result<Dataset> {
        let out = match self {
            Stage::RemoveMissing => filters::remove_missing(data)?,
            Stage::SelectAndRename => {
                let (out, missing) = schema::select_and_rename(data);
                if !missing.is_empty() {
                    report
                        .warnings
                        .push(format!("Missing cols: {}", missing.join(", ")));
                }
                out
            }
            Stage::StandardiseTypes => normalize::standardise_types(data),
            Stage::MapCodes => normalize::map_codes(data),
            Stage::RemoveOtherTypes => filters::remove_other_types(data),
            Stage::BuildAddress => address::build_address(data)?,
            Stage::RemoveInvalidDates => filters::remove_invalid_dates(data),
            Stage::Deduplicate => filters::deduplicate(data),
            Stage::RemoveNonStandardTransaction => filters::remove_non_standard_transaction(data),
        };
        Ok(out)
    }
}

/// Toggles for the two filters that differ between deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub drop_other_property_types: bool,
    pub drop_non_standard_transactions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drop_other_property_types: true,
            drop_non_standard_transactions: true,
        }
    }
}

impl PipelineConfig {
    /// Default stage order with the configured toggles applied.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![
            Stage::RemoveMissing,
            Stage::SelectAndRename,
            Stage::StandardiseTypes,
            Stage::MapCodes,
        ];
        if self.drop_other_property_types {
            stages.push(Stage::RemoveOtherTypes);
        }
        stages.extend([
            Stage::BuildAddress,
            Stage::RemoveInvalidDates,
            Stage::Deduplicate,
        ]);
        if self.drop_non_standard_transactions {
            stages.push(Stage::RemoveNonStandardTransaction);
        }
        stages
    }
}

/// Row counts around one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: usize,
    pub rows_out: usize,
}

impl StageReport {
    pub fn removed(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// What a cleaning run did, stage by stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub output_columns: Vec<String>,
    pub stages: Vec<StageReport>,
    pub warnings: Vec<String>,
}

impl CleanReport {
    pub fn removed_by(&self, stage: Stage) -> Option<usize> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(StageReport::removed)
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub data: Dataset,
    pub report: CleanReport,
}

#[derive(Debug, Clone)]
pub struct CleaningPipeline {
    stages: Vec<Stage>,
}

impl CleaningPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            stages: config.stages(),
        }
    }

    /// Custom stage order. Rejected if it breaks a stage dependency.
    pub fn with_stages(stages: Vec<Stage>) -> Result<Self> {
        Self::validate(&stages)?;
        Ok(Self { stages })
    }

    pub fn validate(stages: &[Stage]) -> Result<()> {
        let mut seen = HashSet::new();
        for stage in stages {
            if seen.contains(stage) {
                return Err(EtlError::structure(
                    "pipeline",
                    format!("stage '{}' appears more than once", stage.name()),
                ));
            }
            if *stage == Stage::RemoveMissing && seen.contains(&Stage::SelectAndRename) {
                return Err(EtlError::structure(
                    "pipeline",
                    "'remove_missing' inspects raw column names and must run before 'select_and_rename'",
                ));
            }
            for dep in stage.dependencies() {
                if !seen.contains(dep) {
                    return Err(EtlError::structure(
                        "pipeline",
                        format!(
                            "stage '{}' depends on '{}' which does not run before it",
                            stage.name(),
                            dep.name()
                        ),
                    ));
                }
            }
            seen.insert(*stage);
        }
        Ok(())
    }

    /// Runs every stage in order over `raw`.
    #[instrument(skip_all, fields(rows = raw.len(), columns = raw.width()))]
    pub fn clean(&self, raw: Dataset) -> Result<CleanOutcome> {
        info!("▶︎ Cleaning house-price data …");
        if raw.width() == 0 {
            return Err(EtlError::structure("pipeline", "input has no columns"));
        }

        let mut report = CleanReport {
            input_rows: raw.len(),
            ..CleanReport::default()
        };

        let data = self.stages.iter().try_fold(raw, |data, stage| {
            let rows_in = data.len();
            let out = stage.apply(data, &mut report)?;
            let rows_out = out.len();
            debug_assert!(!stage.preserves_rows() || rows_in == rows_out);

            debug!(stage = stage.name(), rows_in, rows_out, "stage complete");
            if rows_in > rows_out {
                counter!("house_prices_rows_removed_total", "stage" => stage.name())
                    .increment((rows_in - rows_out) as u64);
            }
            report.stages.push(StageReport {
                stage: *stage,
                rows_in,
                rows_out,
            });
            Ok::<_, EtlError>(out)
        })?;

        report.output_rows = data.len();
        report.output_columns = data.columns().to_vec();
        info!(
            "✓ Clean complete - final shape ({}, {})",
            data.len(),
            data.width()
        );
        debug!("Columns after cleaning: {:?}", data.columns());

        Ok(CleanOutcome { data, report })
    }
}

impl Default for CleaningPipeline {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

/// Cleans with the default stage list.
pub fn clean_house_prices(raw: Dataset) -> Result<Dataset> {
    Ok(CleaningPipeline::default().clean(raw)?.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_order_is_valid() {
        let stages = PipelineConfig::default().stages();
        assert_eq!(stages.len(), 9);
        assert_eq!(stages.last(), Some(&Stage::RemoveNonStandardTransaction));
        assert!(CleaningPipeline::validate(&stages).is_ok());
    }

    #[test]
    fn test_toggles_remove_variant_stages() {
        let config = PipelineConfig {
            drop_other_property_types: false,
            drop_non_standard_transactions: false,
        };
        let stages = config.stages();
        assert!(!stages.contains(&Stage::RemoveOtherTypes));
        assert!(!stages.contains(&Stage::RemoveNonStandardTransaction));
        assert!(CleaningPipeline::validate(&stages).is_ok());
    }

    #[test]
    fn test_mandatory_filter_after_rename_is_rejected() {
        let err = CleaningPipeline::with_stages(vec![Stage::SelectAndRename, Stage::RemoveMissing])
            .unwrap_err();
        assert!(matches!(err, EtlError::Structure { .. }));
    }

    #[test]
    fn test_dedup_before_address_is_rejected() {
        let stages = vec![
            Stage::RemoveMissing,
            Stage::SelectAndRename,
            Stage::Deduplicate,
            Stage::BuildAddress,
        ];
        assert!(CleaningPipeline::with_stages(stages).is_err());
    }

    #[test]
    fn test_dedup_may_follow_category_filter() {
        let stages = vec![
            Stage::RemoveMissing,
            Stage::SelectAndRename,
            Stage::BuildAddress,
            Stage::RemoveNonStandardTransaction,
            Stage::Deduplicate,
        ];
        assert!(CleaningPipeline::with_stages(stages).is_ok());
    }

    #[test]
    fn test_repeated_stage_is_rejected() {
        let stages = vec![Stage::SelectAndRename, Stage::MapCodes, Stage::MapCodes];
        assert!(CleaningPipeline::with_stages(stages).is_err());
    }
}
