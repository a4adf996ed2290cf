//! # Sheet Data
//!
//! The panel is configured entirely from three spreadsheet tabs:
//!
//! * `Metric Addition`: the first row's `Permission` cell lists users allowed to add metrics.
//! * `Metrics`: one row per metric (or comma-separated group of metrics sharing a template).
//! * `Configuration`: known skills plus a log of already-rated conversations.
//!
//! Fetching is abstracted behind [`SheetSource`] so the loading logic can be
//! exercised without network access. The cache is rebuilt wholesale on each load.

use crate::constants::{
    COL_DEFINITION, COL_DESCRIPTION, COL_ENABLED, COL_RATED_CONVERSATIONS, COL_SKILLS,
    COL_TEMPLATE, COL_TYPE, COL_VALUES, CONFIGURATION_SHEET, METRICS_SHEET, METRIC_ADDITION_SHEET,
};
use crate::errors::EvalError;
use crate::template::TypeTemplate;
use crate::types::{split_list, LegacyType, MetricDefinition, SheetRow};
use async_trait::async_trait;
use tracing::{info, warn};

/// A provider of spreadsheet tabs.
///
/// Implementations fetch a named tab and return its data rows keyed by
/// header. The production implementation lives in the `evalpanel-sheets`
/// crate; tests substitute in-memory fixtures.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Fetches all data rows of the tab called `sheet_name`.
    async fn fetch_sheet(&self, sheet_name: &str) -> Result<Vec<SheetRow>, EvalError>;
}

/// A snapshot of the three configuration tabs.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub metric_addition: Vec<SheetRow>,
    /// Enabled metrics, with comma-separated definitions already expanded.
    pub metrics: Vec<MetricDefinition>,
    pub configuration: Vec<SheetRow>,
    /// `Configuration` rows whose `Rated Conversations` cell is non-blank.
    pub rated_conversations: Vec<SheetRow>,
}

impl SheetData {
    /// Fetches the three tabs concurrently. Any failure aborts the whole load.
    pub async fn load(source: &dyn SheetSource) -> Result<Self, EvalError> {
        let (metric_addition, metrics, configuration) = tokio::try_join!(
            source.fetch_sheet(METRIC_ADDITION_SHEET),
            source.fetch_sheet(METRICS_SHEET),
            source.fetch_sheet(CONFIGURATION_SHEET),
        )?;

        let data = Self::from_rows(metric_addition, &metrics, configuration);
        info!(
            "Loaded {} metric(s), {} configuration row(s), {} rated conversation(s)",
            data.metrics.len(),
            data.configuration.len(),
            data.rated_conversations.len()
        );
        Ok(data)
    }

    /// Builds the cache from raw rows.
    pub fn from_rows(
        metric_addition: Vec<SheetRow>,
        metric_rows: &[SheetRow],
        configuration: Vec<SheetRow>,
    ) -> Self {
        let rated_conversations = configuration
            .iter()
            .filter(|row| !row.get(COL_RATED_CONVERSATIONS).trim().is_empty())
            .cloned()
            .collect();
        Self {
            metric_addition,
            metrics: expand_metric_rows(metric_rows),
            configuration,
            rated_conversations,
        }
    }
}

/// Turns enabled `Metrics` rows into definitions.
///
/// A row whose `Definition` holds several comma-separated names yields one
/// definition per name; descriptions are split the same way and matched by
/// position, missing ones left empty.
pub fn expand_metric_rows(rows: &[SheetRow]) -> Vec<MetricDefinition> {
    let mut metrics = Vec::new();
    for row in rows {
        if !row.get(COL_ENABLED).trim().eq_ignore_ascii_case("true") {
            continue;
        }
        let definition = row.get(COL_DEFINITION);
        if definition.contains(',') {
            let descriptions: Vec<&str> = row.get(COL_DESCRIPTION).split(',').map(str::trim).collect();
            for (index, name) in definition.split(',').map(str::trim).enumerate() {
                let description = descriptions.get(index).copied().unwrap_or("");
                metrics.push(metric_from_row(row, name, description));
            }
        } else {
            metrics.push(metric_from_row(row, definition.trim(), row.get(COL_DESCRIPTION).trim()));
        }
    }
    metrics
}

fn metric_from_row(row: &SheetRow, name: &str, description: &str) -> MetricDefinition {
    let raw_template = row.get(COL_TEMPLATE).trim().to_string();
    let template = if raw_template.is_empty() {
        None
    } else {
        match TypeTemplate::parse(&raw_template) {
            Ok(template) => Some(template),
            Err(e) => {
                warn!("Metric '{name}' has an unusable template, falling back to its type: {e}");
                None
            }
        }
    };

    MetricDefinition {
        name: name.to_string(),
        description: description.to_string(),
        skills: split_list(row.get(COL_SKILLS)),
        template,
        raw_template,
        legacy_type: LegacyType::parse(row.get(COL_TYPE)),
        list_values: split_list(row.get(COL_VALUES)),
        enabled: true,
    }
}
