#![allow(dead_code)]
//! # Common Test Utilities
//!
//! This module provides shared utilities for testing, such as an in-memory
//! sheet source and host page fixtures, so tests run without network access
//! to a real spreadsheet.

use async_trait::async_trait;
use dotenvy::dotenv;
use evalpanel::constants::{CONFIGURATION_SHEET, METRICS_SHEET, METRIC_ADDITION_SHEET};
use evalpanel::{EvalError, SheetRow, SheetSource, StaticHostPage};
use std::collections::HashMap;
use std::sync::{Arc, Once, RwLock};

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// --- Mock Sheet Source ---

/// An in-memory [`SheetSource`] whose tabs can be replaced between loads.
#[derive(Clone, Debug, Default)]
pub struct MockSheetSource {
    pub sheets: Arc<RwLock<HashMap<String, Vec<SheetRow>>>>,
    pub fetches: Arc<RwLock<Vec<String>>>,
    pub fail: Arc<RwLock<bool>>,
}

impl MockSheetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, name: &str, rows: Vec<SheetRow>) -> Self {
        self.set_sheet(name, rows);
        self
    }

    pub fn set_sheet(&self, name: &str, rows: Vec<SheetRow>) {
        self.sheets.write().unwrap().insert(name.to_string(), rows);
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.write().unwrap() = fail;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.read().unwrap().len()
    }
}

#[async_trait]
impl SheetSource for MockSheetSource {
    async fn fetch_sheet(&self, sheet_name: &str) -> Result<Vec<SheetRow>, EvalError> {
        self.fetches.write().unwrap().push(sheet_name.to_string());
        if *self.fail.read().unwrap() {
            return Err(EvalError::SheetLoad(format!("{sheet_name} unavailable")));
        }
        Ok(self
            .sheets
            .read()
            .unwrap()
            .get(sheet_name)
            .cloned()
            .unwrap_or_default())
    }
}

// --- Fixtures ---

pub const EVALUATOR: &str = "Dana";
pub const SKILL: &str = "Sales";
pub const CONVERSATION: &str = "conv-1001";

pub const GREETING_TEMPLATE: &str =
    r#"{"Opening":{"greeted":"Boolean","tone":"List [Warm, Neutral, Cold]"}}"#;

pub fn metric_row(definition: &str, description: &str, skills: &str, template: &str) -> SheetRow {
    SheetRow::new()
        .with("Definition", definition)
        .with("Description", description)
        .with("Skills", skills)
        .with("Template", template)
        .with("Type", "")
        .with("Values", "")
        .with("Enabled", "TRUE")
}

pub fn legacy_row(definition: &str, skills: &str, kind: &str, values: &str) -> SheetRow {
    SheetRow::new()
        .with("Definition", definition)
        .with("Description", "")
        .with("Skills", skills)
        .with("Template", "")
        .with("Type", kind)
        .with("Values", values)
        .with("Enabled", "TRUE")
}

pub fn configuration_row(skill: &str, rated: &str) -> SheetRow {
    SheetRow::new()
        .with("Skill", skill)
        .with("Rated Conversations", rated)
}

/// A source with two template metrics sharing one card, a legacy Boolean
/// and a metric for another skill. `Dana` may add metrics.
pub fn fixture_source() -> MockSheetSource {
    MockSheetSource::new()
        .with_sheet(
            METRIC_ADDITION_SHEET,
            vec![SheetRow::new().with("Permission", "dana, Lee")],
        )
        .with_sheet(
            METRICS_SHEET,
            vec![
                metric_row(
                    "Greeting, Closing Line",
                    "Greets the client, Closes politely",
                    "Sales, Support",
                    GREETING_TEMPLATE,
                ),
                legacy_row("Escalated", "All", "Boolean", ""),
                legacy_row("Refund Offered", "Support", "Boolean", ""),
            ],
        )
        .with_sheet(
            CONFIGURATION_SHEET,
            vec![
                configuration_row("Sales", ""),
                configuration_row("Support", "conv-0999"),
                configuration_row("All", ""),
            ],
        )
}

/// A closed conversation with the modal attached.
pub fn closed_page() -> Arc<StaticHostPage> {
    let page = StaticHostPage::closed_conversation(EVALUATOR, SKILL, CONVERSATION);
    page.set_modal_attached(true);
    Arc::new(page)
}
