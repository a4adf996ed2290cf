//! The Add tab: metric forms, processing into previewable drafts, and
//! finalization into submission rows.

use crate::constants::ALL_SKILLS;
use crate::errors::{EvalError, ValidationError};
use crate::grouping::group_metrics_for_submission;
use crate::normalize::normalize_template_json;
use crate::template::{analyze_structure, DraftParam, ParamKind, StructureAnalysis};
use crate::types::MetricSubmission;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

// --- Forms ---

/// One name/description pair of a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricRow {
    pub name: String,
    pub description: String,
}

/// Skill checkboxes of a form. Checking every skill is the same as Select-All.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillSelection {
    available: Vec<String>,
    selected: Vec<String>,
}

impl SkillSelection {
    pub fn new(available: Vec<String>) -> Self {
        Self {
            available,
            selected: Vec::new(),
        }
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn is_selected(&self, skill: &str) -> bool {
        self.selected.iter().any(|s| s == skill)
    }

    pub fn toggle(&mut self, skill: &str) {
        if let Some(pos) = self.selected.iter().position(|s| s == skill) {
            self.selected.remove(pos);
        } else if self.available.iter().any(|s| s == skill) {
            self.selected.push(skill.to_string());
        }
    }

    pub fn set_all(&mut self, checked: bool) {
        self.selected = if checked {
            self.available.clone()
        } else {
            Vec::new()
        };
    }

    pub fn all_selected(&self) -> bool {
        !self.available.is_empty() && self.available.iter().all(|s| self.is_selected(s))
    }

    /// Some, but not all, skills are selected.
    pub fn is_indeterminate(&self) -> bool {
        !self.selected.is_empty() && !self.all_selected()
    }

    /// The skill list to submit: `["All"]` when every skill is checked.
    pub fn resolve(&self) -> Result<Vec<String>, ValidationError> {
        if self.all_selected() {
            return Ok(vec![ALL_SKILLS.to_string()]);
        }
        let skills: Vec<String> = self
            .available
            .iter()
            .filter(|s| self.is_selected(s))
            .cloned()
            .collect();
        if skills.is_empty() {
            return Err(ValidationError::MissingSkills);
        }
        Ok(skills)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricForm {
    pub id: Uuid,
    pub rows: Vec<MetricRow>,
    pub template_json: String,
    pub skills: SkillSelection,
}

impl MetricForm {
    pub fn new(available_skills: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rows: vec![MetricRow::default()],
            template_json: String::new(),
            skills: SkillSelection::new(available_skills),
        }
    }

    pub fn add_row(&mut self) {
        self.rows.push(MetricRow::default());
    }

    /// Removes a row; the last remaining row cannot be removed.
    pub fn remove_row(&mut self, index: usize) -> Result<(), ValidationError> {
        if self.rows.len() <= 1 {
            return Err(ValidationError::LastMetricRow);
        }
        if index < self.rows.len() {
            self.rows.remove(index);
        }
        Ok(())
    }

    pub fn set_row(&mut self, index: usize, name: &str, description: &str) {
        if let Some(row) = self.rows.get_mut(index) {
            row.name = name.to_string();
            row.description = description.to_string();
        }
    }

    /// Named rows, trimmed.
    fn named_rows(&self) -> (Vec<String>, Vec<String>) {
        self.rows
            .iter()
            .filter(|r| !r.name.trim().is_empty())
            .map(|r| (r.name.trim().to_string(), r.description.trim().to_string()))
            .unzip()
    }
}

// --- Drafts ---

/// Names sharing one analysed structure, ready to be previewed and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMetricDraft {
    pub names: Vec<String>,
    pub descriptions: Vec<String>,
    pub analysis: StructureAnalysis,
    pub skills: Vec<String>,
    pub sample: Map<String, Value>,
}

impl StagedMetricDraft {
    /// Editable parameters; `None` for read-only complex structures.
    pub fn params_mut(&mut self) -> Option<&mut Vec<DraftParam>> {
        match &mut self.analysis {
            StructureAnalysis::Simple(params) => Some(params),
            StructureAnalysis::Complex(_) => None,
        }
    }

    pub fn add_param(&mut self, key: &str, kind: ParamKind) {
        if let Some(params) = self.params_mut() {
            params.push(DraftParam::new(key, kind));
        }
    }

    pub fn remove_param(&mut self, index: usize) {
        if let Some(params) = self.params_mut() {
            if index < params.len() {
                params.remove(index);
            }
        }
    }

    pub fn set_param_kind(&mut self, index: usize, kind: ParamKind) {
        if let Some(param) = self.params_mut().and_then(|p| p.get_mut(index)) {
            param.kind = kind;
        }
    }

    pub fn add_param_option(&mut self, index: usize, option: &str) {
        if let Some(param) = self.params_mut().and_then(|p| p.get_mut(index)) {
            param.add_option(option);
        }
    }

    pub fn remove_param_option(&mut self, index: usize, option_index: usize) {
        if let Some(param) = self.params_mut().and_then(|p| p.get_mut(index)) {
            param.remove_option(option_index);
        }
    }

    /// One submission row per name, all sharing the finalized template.
    pub fn finalize(&self) -> Result<Vec<MetricSubmission>, EvalError> {
        let first = self.names.first().map(String::as_str).unwrap_or_default();
        let template = self.analysis.finalize(first)?.to_json_string();
        Ok(self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| MetricSubmission {
                definition: name.clone(),
                description: self.descriptions.get(i).cloned().unwrap_or_default(),
                template: template.clone(),
                enabled: MetricSubmission::enabled_flag(true),
                skills: self.skills.clone(),
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddPhase {
    Editing,
    Previewing(Vec<StagedMetricDraft>),
}

// --- Tab ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTab {
    forms: Vec<MetricForm>,
    phase: AddPhase,
    available_skills: Vec<String>,
}

impl AddTab {
    pub fn new(available_skills: Vec<String>) -> Self {
        Self {
            forms: vec![MetricForm::new(available_skills.clone())],
            phase: AddPhase::Editing,
            available_skills,
        }
    }

    pub fn forms(&self) -> &[MetricForm] {
        &self.forms
    }

    pub fn phase(&self) -> &AddPhase {
        &self.phase
    }

    pub fn is_previewing(&self) -> bool {
        matches!(self.phase, AddPhase::Previewing(_))
    }

    /// Adds another empty form and returns its id.
    pub fn add_form(&mut self) -> Uuid {
        let form = MetricForm::new(self.available_skills.clone());
        let id = form.id;
        self.forms.push(form);
        id
    }

    /// Removes a form; the first form is always kept.
    pub fn remove_form(&mut self, id: Uuid) {
        if self.forms.len() > 1 {
            self.forms.retain(|f| f.id != id);
        }
    }

    pub fn form_mut(&mut self, id: Uuid) -> Option<&mut MetricForm> {
        self.forms.iter_mut().find(|f| f.id == id)
    }

    pub fn draft_mut(&mut self, index: usize) -> Option<&mut StagedMetricDraft> {
        match &mut self.phase {
            AddPhase::Previewing(drafts) => drafts.get_mut(index),
            AddPhase::Editing => None,
        }
    }

    /// Validates every form, analyses its JSON and moves to the preview.
    ///
    /// `metric_exists` reports whether a name is already defined. Any failure
    /// leaves the tab unchanged.
    pub fn process(&mut self, metric_exists: impl Fn(&str) -> bool) -> Result<(), EvalError> {
        let mut drafts = Vec::with_capacity(self.forms.len());

        for form in &self.forms {
            let (names, descriptions) = form.named_rows();
            if names.is_empty() {
                return Err(ValidationError::MissingMetricName.into());
            }
            let raw = form.template_json.trim();
            if raw.is_empty() {
                return Err(ValidationError::MissingTemplate.into());
            }
            let skills = form.skills.resolve()?;
            let sample = normalize_template_json(raw)?;
            let analysis = analyze_structure(&sample)?;
            drafts.push(StagedMetricDraft {
                names,
                descriptions,
                analysis,
                skills,
                sample,
            });
        }

        for draft in &drafts {
            if let Some(existing) = draft.names.iter().find(|n| metric_exists(n.as_str())) {
                return Err(ValidationError::DuplicateMetric(existing.clone()).into());
            }
        }

        info!("Staged {} metric draft(s) for preview", drafts.len());
        self.phase = AddPhase::Previewing(drafts);
        Ok(())
    }

    /// Discards the preview; form values are kept.
    pub fn back_to_edit(&mut self) {
        self.phase = AddPhase::Editing;
    }

    /// Finalizes every draft and groups the rows for submission.
    pub fn finalize(&self) -> Result<Vec<MetricSubmission>, EvalError> {
        let AddPhase::Previewing(drafts) = &self.phase else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for draft in drafts {
            rows.extend(draft.finalize()?);
        }
        debug!("Finalized {} metric row(s)", rows.len());
        Ok(group_metrics_for_submission(&rows))
    }

    /// Back to a single empty form in the editing phase.
    pub fn reset(&mut self) {
        *self = Self::new(self.available_skills.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skills() -> Vec<String> {
        vec!["Sales".to_string(), "Support".to_string()]
    }

    fn filled_tab(json: &str) -> AddTab {
        let mut tab = AddTab::new(skills());
        let id = tab.forms()[0].id;
        let form = tab.form_mut(id).unwrap();
        form.set_row(0, " Greeting ", "Says hello");
        form.add_row();
        form.set_row(1, "Closing", "");
        form.add_row();
        form.template_json = json.to_string();
        form.skills.set_all(true);
        tab
    }

    #[test]
    fn skill_selection_resolves_to_all_when_complete() {
        let mut selection = SkillSelection::new(skills());
        assert_eq!(selection.resolve(), Err(ValidationError::MissingSkills));
        selection.toggle("Sales");
        assert!(selection.is_indeterminate());
        assert_eq!(selection.resolve().unwrap(), vec!["Sales"]);
        selection.toggle("Support");
        assert_eq!(selection.resolve().unwrap(), vec!["All"]);
    }

    #[test]
    fn last_row_cannot_be_removed() {
        let mut form = MetricForm::new(skills());
        assert_eq!(form.remove_row(0), Err(ValidationError::LastMetricRow));
        form.add_row();
        assert!(form.remove_row(0).is_ok());
        assert_eq!(form.rows.len(), 1);
    }

    #[test]
    fn process_then_finalize_groups_names() {
        let mut tab = filled_tab(r#"{"greeted": true, "chatId": "x"}"#);
        tab.process(|_| false).unwrap();
        assert!(tab.is_previewing());

        let rows = tab.finalize().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].definition, "Greeting, Closing");
        assert_eq!(rows[0].description, "Says hello, ");
        assert_eq!(rows[0].template, r#"{"General":{"greeted":"Boolean"}}"#);
        assert_eq!(rows[0].skills, vec!["All"]);

        tab.back_to_edit();
        assert_eq!(tab.forms()[0].rows[0].name, " Greeting ");
    }

    #[test]
    fn process_rejects_duplicates_without_changing_phase() {
        let mut tab = filled_tab(r#"{"greeted": true}"#);
        let err = tab.process(|name| name.eq_ignore_ascii_case("closing")).unwrap_err();
        assert_eq!(err.to_string(), "Metric \"Closing\" already exists");
        assert!(!tab.is_previewing());
    }

    #[test]
    fn draft_params_can_be_edited_before_finalizing() {
        let mut tab = filled_tab(r#"{"tone": "Calm"}"#);
        tab.process(|_| false).unwrap();
        assert!(tab.finalize().is_err());

        let draft = tab.draft_mut(0).unwrap();
        draft.add_param_option(0, "Calm");
        draft.add_param_option(0, "Angry");
        draft.add_param("notes", ParamKind::Text);
        let rows = tab.finalize().unwrap();
        assert_eq!(
            rows[0].template,
            r#"{"General":{"tone":"List [Calm, Angry]","notes":"Text"}}"#
        );
    }
}
