//! # Evaluation Panel
//!
//! This crate implements a conversation-evaluation panel for a support chat
//! host page. Metric definitions, permissions and rated conversations live in
//! a spreadsheet; ratings and new metric definitions are posted to webhooks.
//!
//! The host page itself is abstracted behind [`host::HostPage`] and sheet
//! access behind [`sheet_data::SheetSource`], so the controller can be driven
//! from a browser bridge, a CLI or tests alike.

pub mod constants;
pub mod controller;
pub mod errors;
pub mod grouping;
pub mod host;
pub mod normalize;
pub mod session;
pub mod sheet_data;
pub mod template;
pub mod types;
pub mod watch;
pub mod webhook;

pub use controller::{EvalController, OpenOutcome, Tab};
pub use errors::{EvalError, ValidationError};
pub use host::{diagnose, Diagnostics, HostPage, StaticHostPage};
pub use normalize::normalize_template_json;
pub use session::{PageContext, Session};
pub use sheet_data::{SheetData, SheetSource};
pub use template::{FieldType, TypeTemplate};
pub use types::{MetricDefinition, MetricSubmission, RatingEntry, RatingValue, SheetRow};
pub use watch::{PageEvent, PageMutation, PageWatch, WatchConfig};
pub use webhook::{WebhookClient, WebhookConfig, WebhookResponse};
