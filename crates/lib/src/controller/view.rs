//! The View tab: read-only metric cards, with enable/disable editing for
//! users allowed to manage metrics.

use super::panel::{badge, build_cards, CardView, MetricCard};
use crate::types::{LegacyType, MetricDefinition, MetricSubmission};
use std::collections::HashMap;

/// Read-only description of a card's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureView {
    /// Sub-group name and its `(field, type)` pairs.
    Template(Vec<(String, Vec<(String, String)>)>),
    Legacy {
        kind: Option<LegacyType>,
        values: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCard {
    pub index: usize,
    pub badge: String,
    pub names: Vec<String>,
    pub descriptions: Vec<String>,
    pub view: CardView,
    pub structure: StructureView,
    /// The pending `enabled` flag while the card is being edited.
    pub editing: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewTab {
    cards: Vec<MetricCard>,
    editing: HashMap<usize, bool>,
    pub search: String,
}

impl ViewTab {
    pub fn new<'a>(metrics: impl IntoIterator<Item = &'a MetricDefinition>) -> Self {
        Self {
            cards: build_cards(metrics),
            ..Self::default()
        }
    }

    pub fn cards(&self) -> &[MetricCard] {
        &self.cards
    }

    pub fn visible_cards(&self) -> Vec<usize> {
        (0..self.cards.len())
            .filter(|&i| self.cards[i].matches(&self.search))
            .collect()
    }

    pub fn render_card(&self, index: usize) -> Option<ViewCard> {
        let card = self.cards.get(index)?;
        let structure = match card.template() {
            Some(template) => StructureView::Template(
                template
                    .groups()
                    .iter()
                    .map(|g| {
                        (
                            g.name.clone(),
                            g.fields
                                .iter()
                                .map(|f| (f.name.clone(), f.field_type.to_string()))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
            None => StructureView::Legacy {
                kind: card.legacy_metric().legacy_type,
                values: card.legacy_metric().list_values.clone(),
            },
        };
        Some(ViewCard {
            index,
            badge: badge(index, self.cards.len()),
            names: card.names(),
            descriptions: card.descriptions(),
            view: card.view,
            structure,
            editing: self.editing.get(&index).copied(),
        })
    }

    pub fn toggle_card(&mut self, index: usize) {
        if let Some(card) = self.cards.get_mut(index) {
            card.view = card.view.toggled();
        }
    }

    pub fn toggle_sub_group(&mut self, index: usize, sub_group: &str) {
        if let Some(card) = self.cards.get_mut(index) {
            card.toggle_sub_group(sub_group);
        }
    }

    /// Enters edit mode, or leaves it if the card is already being edited.
    pub fn toggle_edit(&mut self, index: usize) {
        let Some(card) = self.cards.get(index) else {
            return;
        };
        if self.editing.remove(&index).is_none() {
            self.editing.insert(index, card.legacy_metric().enabled);
        }
    }

    pub fn is_editing(&self, index: usize) -> bool {
        self.editing.contains_key(&index)
    }

    /// Flips the pending `enabled` flag of a card in edit mode.
    pub fn toggle_enabled(&mut self, index: usize) {
        if let Some(flag) = self.editing.get_mut(&index) {
            *flag = !*flag;
        }
    }

    pub fn cancel_edit(&mut self, index: usize) {
        self.editing.remove(&index);
    }

    /// The row to post for a card in edit mode.
    pub fn edit_submission(&self, index: usize) -> Option<MetricSubmission> {
        let enabled = *self.editing.get(&index)?;
        let card = self.cards.get(index)?;
        Some(MetricSubmission {
            definition: card.names().join(", "),
            description: card.descriptions().join(", "),
            template: card.legacy_metric().raw_template.clone(),
            enabled: MetricSubmission::enabled_flag(enabled),
            skills: card.legacy_metric().skills.clone(),
        })
    }

    /// Leaves edit mode after a successful save and records the new flag.
    pub fn finish_edit(&mut self, index: usize) {
        if let Some(enabled) = self.editing.remove(&index) {
            if let Some(card) = self.cards.get_mut(index) {
                for metric in &mut card.metrics {
                    metric.enabled = enabled;
                }
            }
        }
    }
}
