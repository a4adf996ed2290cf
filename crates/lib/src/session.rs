//! # Session
//!
//! Holds the page context (user, skill, conversation) and the loaded sheet
//! data for one panel. All queries the controller makes against the sheets go
//! through here.

use crate::constants::{
    ALL_SKILLS, COL_PERMISSION, COL_RATED_CONVERSATIONS, COL_SKILL, INFO_KEY_CONVERSATION_ID,
    INFO_KEY_SKILL,
};
use crate::errors::EvalError;
use crate::host::{diagnose, Diagnostics, HostPage};
use crate::sheet_data::{SheetData, SheetSource};
use crate::types::{split_list, MetricDefinition};
use std::sync::Arc;
use tracing::{debug, info};

const UNKNOWN_USER: &str = "unknown";

/// Who is evaluating what, as read from the host page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub username: String,
    pub skill: String,
    pub conversation_id: String,
}

impl PageContext {
    pub fn read(host: &dyn HostPage) -> Self {
        let cell = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
        let username = cell(host.user_badge());
        Self {
            username: if username.is_empty() {
                UNKNOWN_USER.to_string()
            } else {
                username
            },
            skill: cell(host.info_item(INFO_KEY_SKILL)),
            conversation_id: cell(host.info_item(INFO_KEY_CONVERSATION_ID)),
        }
    }
}

/// Page context plus sheet data, with an explicit load/refresh/clear lifecycle.
pub struct Session {
    source: Arc<dyn SheetSource>,
    context: PageContext,
    data: SheetData,
    already_rated: bool,
}

impl Session {
    pub fn new(source: Arc<dyn SheetSource>) -> Self {
        Self {
            source,
            context: PageContext::default(),
            data: SheetData::default(),
            already_rated: false,
        }
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    pub fn data(&self) -> &SheetData {
        &self.data
    }

    pub fn is_already_rated(&self) -> bool {
        self.already_rated
    }

    /// Reads the page context, loads all sheets and checks rated status.
    ///
    /// On failure the previous sheet data is kept.
    pub async fn load(&mut self, host: &dyn HostPage) -> Result<(), EvalError> {
        self.context = PageContext::read(host);
        self.reload().await
    }

    /// Reloads sheets for an updated context without re-reading the user.
    pub async fn refresh(&mut self, skill: &str, conversation_id: &str) -> Result<(), EvalError> {
        self.context.skill = skill.to_string();
        self.context.conversation_id = conversation_id.to_string();
        self.reload().await
    }

    /// Reloads sheet data, keeping the current context.
    pub async fn reload(&mut self) -> Result<(), EvalError> {
        let data = SheetData::load(self.source.as_ref())
            .await
            .map_err(|e| match e {
                EvalError::SheetLoad(_) => e,
                other => EvalError::SheetLoad(other.to_string()),
            })?;
        self.data = data;
        self.already_rated = self.check_already_rated();
        debug!(
            "Session loaded for '{}' (skill '{}', conversation '{}', already rated: {})",
            self.context.username,
            self.context.skill,
            self.context.conversation_id,
            self.already_rated
        );
        Ok(())
    }

    pub fn clear(&mut self) {
        info!("Clearing evaluation session");
        self.context = PageContext::default();
        self.data = SheetData::default();
        self.already_rated = false;
    }

    /// Whether the current user is listed in the first `Metric Addition` row.
    pub fn has_permission_to_add_metric(&self) -> bool {
        let Some(row) = self.data.metric_addition.first() else {
            return false;
        };
        let user = self.context.username.to_lowercase();
        split_list(row.get(COL_PERMISSION))
            .iter()
            .any(|allowed| allowed.to_lowercase() == user)
    }

    /// Metrics applying to the current skill, in sheet order.
    pub fn metrics_for_skill(&self) -> Vec<&MetricDefinition> {
        self.data
            .metrics
            .iter()
            .filter(|m| m.applies_to(&self.context.skill))
            .collect()
    }

    /// Every skill listed in the `Configuration` sheet.
    pub fn all_skills(&self) -> Vec<String> {
        self.data
            .configuration
            .iter()
            .map(|row| row.get(COL_SKILL).trim())
            .filter(|skill| !skill.is_empty())
            .map(String::from)
            .collect()
    }

    /// Skills for the Add form, `All` excluded.
    pub fn selectable_skills(&self) -> Vec<String> {
        let mut skills: Vec<String> = Vec::new();
        for skill in self.all_skills() {
            if !skill.eq_ignore_ascii_case(ALL_SKILLS) && !skills.contains(&skill) {
                skills.push(skill);
            }
        }
        skills
    }

    /// Case-insensitive lookup among the loaded metric definitions.
    pub fn metric_exists(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.data
            .metrics
            .iter()
            .any(|m| m.name.to_lowercase() == name)
    }

    /// Whether the rated log holds the current skill and conversation.
    pub fn check_already_rated(&self) -> bool {
        let skill = self.context.skill.to_lowercase();
        self.data.rated_conversations.iter().any(|row| {
            row.get(COL_SKILL).to_lowercase() == skill
                && row.get(COL_RATED_CONVERSATIONS) == self.context.conversation_id
        })
    }

    /// Page diagnostics enriched with session state.
    pub fn diagnose(&self, host: &dyn HostPage) -> Diagnostics {
        Diagnostics {
            already_rated: self.already_rated,
            metrics_count: self.data.metrics.len(),
            ..diagnose(host)
        }
    }
}
