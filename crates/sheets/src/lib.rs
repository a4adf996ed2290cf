//! # `evalpanel-sheets`: Google Sheets Source
//!
//! This crate fetches the evaluation panel's configuration tabs from a Google
//! Sheet through its CSV export endpoint. It implements the `SheetSource`
//! trait from the core `evalpanel` library.

use async_trait::async_trait;
use evalpanel::{EvalError, SheetRow, SheetSource};
use regex::Regex;
use reqwest::Client as ReqwestClient;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

const GOOGLE_DOCS_BASE: &str = "https://docs.google.com";

// --- Error Definitions ---

#[derive(Error, Debug, Clone)]
pub enum SheetError {
    #[error("Invalid Google Sheet reference: {0}")]
    InvalidUrl(String),
    #[error("Failed to fetch sheet: {0}")]
    Fetch(String),
    #[error("Failed to parse sheet CSV: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SheetError {
    fn from(err: reqwest::Error) -> Self {
        SheetError::Fetch(err.to_string())
    }
}

impl From<csv::Error> for SheetError {
    fn from(err: csv::Error) -> Self {
        SheetError::Parse(err.to_string())
    }
}

/// Any sheet failure aborts the load it belongs to.
impl From<SheetError> for EvalError {
    fn from(err: SheetError) -> Self {
        EvalError::SheetLoad(err.to_string())
    }
}

// --- Public Helper Functions ---

fn sheet_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9-_]+)").expect("valid regex"))
}

/// Splits a sheet reference into `(base_url, sheet_id)`.
///
/// The reference is either a bare spreadsheet id or a full spreadsheet URL.
/// URLs pointing at `localhost` or `127.0.0.1` keep their host as the base so
/// test servers can stand in for Google.
pub fn parse_sheet_reference(reference: &str) -> Result<(String, String), SheetError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(SheetError::InvalidUrl("Sheet reference is empty.".to_string()));
    }
    if !reference.contains("://") {
        if reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Ok((GOOGLE_DOCS_BASE.to_string(), reference.to_string()));
        }
        return Err(SheetError::InvalidUrl(format!(
            "'{reference}' is neither a sheet id nor a URL."
        )));
    }

    let parsed_url =
        reqwest::Url::parse(reference).map_err(|e| SheetError::InvalidUrl(format!("{e}")))?;
    let caps = sheet_id_regex()
        .captures(parsed_url.path())
        .ok_or_else(|| SheetError::InvalidUrl("Could not find sheet ID in URL path.".to_string()))?;
    let sheet_id = caps
        .get(1)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SheetError::InvalidUrl("Sheet ID capture group is missing.".to_string()))?;

    let base_url = match parsed_url.host_str() {
        Some("127.0.0.1") | Some("localhost") => {
            format!("{}://{}", parsed_url.scheme(), parsed_url.authority())
        }
        _ => GOOGLE_DOCS_BASE.to_string(),
    };
    Ok((base_url, sheet_id))
}

/// Builds the CSV export URL of one named tab.
pub fn construct_export_url(
    base_url: &str,
    sheet_id: &str,
    sheet_name: &str,
) -> Result<String, SheetError> {
    let endpoint = format!(
        "{}/spreadsheets/d/{sheet_id}/gviz/tq",
        base_url.trim_end_matches('/')
    );
    let url = reqwest::Url::parse_with_params(&endpoint, &[("tqx", "out:csv"), ("sheet", sheet_name)])
        .map_err(|e| SheetError::InvalidUrl(format!("{e}")))?;
    Ok(url.into())
}

/// Downloads the content of a sheet tab as a CSV string.
pub async fn download_csv(client: &ReqwestClient, export_url: &str) -> Result<String, SheetError> {
    info!("Fetching Google Sheet CSV from: {export_url}");
    let response = client.get(export_url).send().await?;
    if !response.status().is_success() {
        return Err(SheetError::Fetch(format!(
            "Request failed with status: {}",
            response.status()
        )));
    }
    response.text().await.map_err(SheetError::from)
}

fn strip_quotes(cell: &str) -> String {
    let cell = cell.strip_prefix('"').unwrap_or(cell);
    let cell = cell.strip_suffix('"').unwrap_or(cell);
    cell.trim().to_string()
}

/// Parses CSV text into rows keyed by the header row.
///
/// Quoted fields may contain commas, doubled quotes and newlines. Rows whose
/// cells are all blank are skipped; cells missing from short rows are empty.
pub fn parse_csv(text: &str) -> Result<Vec<SheetRow>, SheetError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().any(|cell| !cell.trim().is_empty()) {
            records.push(record);
        }
    }

    let mut records = records.into_iter();
    let Some(header_record) = records.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_record.iter().map(strip_quotes).collect();

    let rows: Vec<SheetRow> = records
        .map(|record| {
            headers
                .iter()
                .enumerate()
                .map(|(index, header)| {
                    (header.clone(), strip_quotes(record.get(index).unwrap_or_default()))
                })
                .collect()
        })
        .collect();
    debug!("Parsed {} data row(s) under {} header(s)", rows.len(), headers.len());
    Ok(rows)
}

// --- SheetSource Implementation ---

/// The `SheetSource` implementation backed by a Google Sheet.
#[derive(Clone, Debug)]
pub struct GoogleSheetSource {
    client: ReqwestClient,
    base_url: String,
    sheet_id: String,
}

impl GoogleSheetSource {
    /// Creates a source for a sheet given by id or URL.
    pub fn new(reference: &str) -> Result<Self, SheetError> {
        let (base_url, sheet_id) = parse_sheet_reference(reference)?;
        let client = ReqwestClient::builder()
            .build()
            .map_err(|e| SheetError::Fetch(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            sheet_id,
        })
    }

    /// Overrides the export host, e.g. for a proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn sheet_id(&self) -> &str {
        &self.sheet_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Downloads and parses one tab.
    pub async fn fetch_rows(&self, sheet_name: &str) -> Result<Vec<SheetRow>, SheetError> {
        let export_url = construct_export_url(&self.base_url, &self.sheet_id, sheet_name)?;
        let csv_content = download_csv(&self.client, &export_url)
            .await
            .map_err(|e| match e {
                SheetError::Fetch(msg) => SheetError::Fetch(format!("{sheet_name}: {msg}")),
                other => other,
            })?;
        parse_csv(&csv_content)
    }
}

#[async_trait]
impl SheetSource for GoogleSheetSource {
    async fn fetch_sheet(&self, sheet_name: &str) -> Result<Vec<SheetRow>, EvalError> {
        Ok(self.fetch_rows(sheet_name).await?)
    }
}
