//! # Shared Constants
//!
//! Sheet names, column headers and host-page markers shared across the
//! `evalpanel` workspace.

use std::time::Duration;

/// The sheet holding the metric-addition permission list.
pub const METRIC_ADDITION_SHEET: &str = "Metric Addition";
/// The sheet holding metric definitions.
pub const METRICS_SHEET: &str = "Metrics";
/// The sheet holding skills and the already-rated log.
pub const CONFIGURATION_SHEET: &str = "Configuration";

// --- Column headers ---

pub const COL_DEFINITION: &str = "Definition";
pub const COL_DESCRIPTION: &str = "Description";
pub const COL_SKILLS: &str = "Skills";
pub const COL_TEMPLATE: &str = "Template";
pub const COL_TYPE: &str = "Type";
pub const COL_VALUES: &str = "Values";
pub const COL_ENABLED: &str = "Enabled";
pub const COL_PERMISSION: &str = "Permission";
pub const COL_SKILL: &str = "Skill";
pub const COL_RATED_CONVERSATIONS: &str = "Rated Conversations";

// --- Host page markers ---

/// Info-item key exposing the conversation's skill.
pub const INFO_KEY_SKILL: &str = "Skill";
/// Info-item key exposing the conversation identifier.
pub const INFO_KEY_CONVERSATION_ID: &str = "Conversation ID";
/// Page text shown once a conversation has been closed.
pub const CLOSED_CONVERSATION_PHRASE: &str = "Conversation closed";

/// Skill value that applies a metric to every skill.
pub const ALL_SKILLS: &str = "All";
/// Sub-group name used for flat (simple) templates.
pub const GENERAL_GROUP: &str = "General";

// --- Timing & layout ---

/// Interval of the conversation poll while the panel is open.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Settle delay after a page mutation before reinitializing.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// Minimum width of the resizable panel in pixels.
pub const MIN_PANEL_WIDTH: f64 = 350.0;
/// Maximum panel width as a fraction of the viewport.
pub const MAX_PANEL_VIEWPORT_RATIO: f64 = 0.8;
