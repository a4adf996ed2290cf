//! Shared building blocks of the panel: metric cards, view state, alerts,
//! the footer button and the resize handle.

use crate::constants::{MAX_PANEL_VIEWPORT_RATIO, MIN_PANEL_WIDTH};
use crate::template::TypeTemplate;
use crate::types::MetricDefinition;
use std::collections::HashMap;

// --- View state ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardView {
    Expanded,
    #[default]
    Collapsed,
}

impl CardView {
    pub fn toggled(self) -> Self {
        match self {
            CardView::Expanded => CardView::Collapsed,
            CardView::Collapsed => CardView::Expanded,
        }
    }
}

/// Metrics sharing one template, shown as a single card.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCard {
    pub key: String,
    pub metrics: Vec<MetricDefinition>,
    pub view: CardView,
    /// Per sub-group view state; absent entries are expanded.
    pub sub_groups: HashMap<String, CardView>,
}

impl MetricCard {
    fn new(first: MetricDefinition) -> Self {
        Self {
            key: first.card_key(),
            metrics: vec![first],
            view: CardView::Collapsed,
            sub_groups: HashMap::new(),
        }
    }

    fn first(&self) -> &MetricDefinition {
        &self.metrics[0]
    }

    /// The legacy definition the card falls back to when it has no usable template.
    pub fn legacy_metric(&self) -> &MetricDefinition {
        self.first()
    }

    pub fn template(&self) -> Option<&TypeTemplate> {
        self.first().template.as_ref()
    }

    /// Input-name prefix of the card: the first metric's rating key.
    pub fn primary_key(&self) -> String {
        self.first().rating_key()
    }

    pub fn rating_keys(&self) -> Vec<String> {
        self.metrics.iter().map(MetricDefinition::rating_key).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    /// Non-empty descriptions in metric order.
    pub fn descriptions(&self) -> Vec<String> {
        self.metrics
            .iter()
            .map(|m| m.description.trim())
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect()
    }

    /// Case-insensitive search over names and descriptions. A blank query matches.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.metrics.iter().any(|m| {
            m.name.to_lowercase().contains(&query) || m.description.to_lowercase().contains(&query)
        })
    }

    pub fn sub_group_view(&self, name: &str) -> CardView {
        self.sub_groups
            .get(name)
            .copied()
            .unwrap_or(CardView::Expanded)
    }

    pub fn toggle_sub_group(&mut self, name: &str) {
        let next = self.sub_group_view(name).toggled();
        self.sub_groups.insert(name.to_string(), next);
    }
}

/// Groups metrics into cards by template, in first-appearance order.
pub fn build_cards<'a>(metrics: impl IntoIterator<Item = &'a MetricDefinition>) -> Vec<MetricCard> {
    let mut cards: Vec<MetricCard> = Vec::new();
    for metric in metrics {
        let key = metric.card_key();
        match cards.iter_mut().find(|c| c.key == key) {
            Some(card) => card.metrics.push(metric.clone()),
            None => cards.push(MetricCard::new(metric.clone())),
        }
    }
    cards
}

/// The `Metric i/n` badge of the card at `index`.
pub fn badge(index: usize, total: usize) -> String {
    format!("Metric {}/{}", index + 1, total)
}

// --- Alerts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Error,
            message: message.into(),
        }
    }
}

// --- Footer ---

/// Submissions run under `&mut self`, so a shown button is always pressable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitButton {
    pub label: &'static str,
}

// --- Resize ---

/// Width of the panel after dragging its handle from `start_x` to `x`.
pub fn resized_width(start_width: f64, start_x: f64, x: f64, viewport_width: f64) -> f64 {
    (start_width + (start_x - x))
        .max(MIN_PANEL_WIDTH)
        .min(viewport_width * MAX_PANEL_VIEWPORT_RATIO)
}

/// An in-progress drag of the resize handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeDrag {
    pub start_x: f64,
    pub start_width: f64,
}

impl ResizeDrag {
    pub fn width_at(&self, x: f64, viewport_width: f64) -> f64 {
        resized_width(self.start_width, self.start_x, x, viewport_width)
    }
}
