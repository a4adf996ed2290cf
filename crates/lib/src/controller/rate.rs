//! The Rate tab: one card per template group, inputs, filters and batch collection.

use super::panel::{badge, build_cards, CardView, MetricCard};
use crate::errors::ValidationError;
use crate::template::{
    collect_legacy, collect_template, render_legacy, render_template, Collected, FormInputs,
    RenderedField, RenderedSubGroup,
};
use crate::types::{MetricDefinition, RatingEntry};

/// What a card's body renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardBody {
    Template(Vec<RenderedSubGroup>),
    Legacy(RenderedField),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCard {
    pub index: usize,
    pub badge: String,
    pub names: Vec<String>,
    pub descriptions: Vec<String>,
    pub view: CardView,
    pub complete: bool,
    pub body: CardBody,
}

#[derive(Debug, Clone, Default)]
pub struct RateTab {
    cards: Vec<MetricCard>,
    inputs: FormInputs,
    pub search: String,
    pub unrated_only: bool,
}

impl RateTab {
    pub fn new<'a>(metrics: impl IntoIterator<Item = &'a MetricDefinition>) -> Self {
        Self {
            cards: build_cards(metrics),
            ..Self::default()
        }
    }

    pub fn cards(&self) -> &[MetricCard] {
        &self.cards
    }

    pub fn inputs(&self) -> &FormInputs {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut FormInputs {
        &mut self.inputs
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn collect_card(&self, index: usize) -> Collected {
        let Some(card) = self.cards.get(index) else {
            return Collected::default();
        };
        let primary = card.primary_key();
        match card.template() {
            Some(template) => collect_template(template, &primary, &self.inputs),
            None => collect_legacy(card.legacy_metric(), &primary, &self.inputs),
        }
    }

    pub fn is_card_complete(&self, index: usize) -> bool {
        self.collect_card(index).value.is_some()
    }

    /// `(complete cards, total cards)`.
    pub fn progress(&self) -> (usize, usize) {
        let done = (0..self.cards.len())
            .filter(|&i| self.is_card_complete(i))
            .count();
        (done, self.cards.len())
    }

    /// Indices of cards passing the search and unrated-only filters.
    pub fn visible_cards(&self) -> Vec<usize> {
        (0..self.cards.len())
            .filter(|&i| self.cards[i].matches(&self.search))
            .filter(|&i| !self.unrated_only || !self.is_card_complete(i))
            .collect()
    }

    pub fn render_card(&self, index: usize) -> Option<RenderedCard> {
        let card = self.cards.get(index)?;
        let primary = card.primary_key();
        let body = match card.template() {
            Some(template) => CardBody::Template(render_template(template, &primary, &self.inputs)),
            None => CardBody::Legacy(render_legacy(card.legacy_metric(), &primary, &self.inputs)),
        };
        Some(RenderedCard {
            index,
            badge: badge(index, self.cards.len()),
            names: card.names(),
            descriptions: card.descriptions(),
            view: card.view,
            complete: self.is_card_complete(index),
            body,
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

    pub fn expand_all(&mut self) {
        self.set_all(CardView::Expanded);
    }

    pub fn collapse_all(&mut self) {
        self.set_all(CardView::Collapsed);
    }

    fn set_all(&mut self, view: CardView) {
        for card in &mut self.cards {
            card.view = view;
        }
    }

    /// Collects every card into a submission batch.
    ///
    /// Each complete card yields one entry per metric on the card. Any
    /// partially filled card fails the batch, as does a batch with no entries.
    pub fn build_batch(&self) -> Result<Vec<RatingEntry>, ValidationError> {
        let mut entries = Vec::new();
        let mut incomplete = Vec::new();

        for (index, card) in self.cards.iter().enumerate() {
            let collected = self.collect_card(index);
            match collected.value {
                Some(value) => {
                    for key in card.rating_keys() {
                        entries.push(RatingEntry::new(key, value.clone()));
                    }
                }
                None if collected.incomplete => incomplete.extend(card.names()),
                None => {}
            }
        }

        if !incomplete.is_empty() {
            return Err(ValidationError::IncompleteMetrics(incomplete));
        }
        if entries.is_empty() {
            return Err(ValidationError::NoRatings);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Control, TypeTemplate};
    use crate::types::{LegacyType, RatingValue};
    use serde_json::json;

    fn metric(name: &str, template: &str, legacy: Option<LegacyType>) -> MetricDefinition {
        MetricDefinition {
            name: name.to_string(),
            description: String::new(),
            skills: vec!["All".to_string()],
            template: TypeTemplate::parse(template).ok(),
            raw_template: template.to_string(),
            legacy_type: legacy,
            list_values: vec![],
            enabled: true,
        }
    }

    fn tab() -> RateTab {
        let shared = r#"{"A":{"ok":"Boolean","n":"Count"}}"#;
        let metrics = vec![
            metric("Greeting", shared, None),
            metric("Closing Line", shared, None),
            metric("Escalated", "", Some(LegacyType::Boolean)),
        ];
        RateTab::new(&metrics)
    }

    #[test]
    fn complete_card_emits_entry_per_metric() {
        let mut tab = tab();
        tab.inputs_mut().choose("greeting.A.ok", true);

        let batch = tab.build_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].metric, "closingLine");
        assert_eq!(batch[1].value.to_json(), json!({"A": {"ok": true, "n": 0}}));
        assert_eq!(tab.progress(), (1, 2));
    }

    #[test]
    fn empty_and_incomplete_batches_fail() {
        let mut tab = tab();
        assert_eq!(tab.build_batch(), Err(ValidationError::NoRatings));

        tab.inputs_mut().choose("escalated", false);
        tab.inputs_mut().enter_count("greeting.A.n", "2").unwrap();
        assert_eq!(
            tab.build_batch(),
            Err(ValidationError::IncompleteMetrics(vec![
                "Greeting".to_string(),
                "Closing Line".to_string()
            ]))
        );
    }

    #[test]
    fn filters_and_view_state() {
        let mut tab = tab();
        tab.inputs_mut().choose("escalated", true);
        assert!(tab.is_card_complete(1));
        assert_eq!(
            tab.collect_card(1).value,
            Some(RatingValue::Bool(true))
        );

        tab.unrated_only = true;
        assert_eq!(tab.visible_cards(), vec![0]);
        tab.unrated_only = false;
        tab.search = "ESCAL".to_string();
        assert_eq!(tab.visible_cards(), vec![1]);

        tab.expand_all();
        tab.toggle_card(0);
        let card = tab.render_card(0).unwrap();
        assert_eq!(card.view, CardView::Collapsed);
        assert_eq!(card.badge, "Metric 1/2");
        match tab.render_card(1).unwrap().body {
            CardBody::Legacy(field) => {
                assert_eq!(field.control, Control::BinaryChoice { default: false })
            }
            other => panic!("unexpected body {other:?}"),
        }
    }
}
