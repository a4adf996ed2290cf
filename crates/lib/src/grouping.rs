//! # Submission Grouping
//!
//! Rating entries that carry byte-identical values are grouped together for
//! display and logging. The rate webhook still receives one entry per metric
//! key, flattened from the groups in first-appearance order.
//!
//! Metric submissions sharing a template and skill list are merged into a
//! single sheet row whose names and descriptions are comma-joined.

use crate::types::{MetricSubmission, RatingEntry, RatingValue};
use std::collections::HashMap;
use tracing::debug;

/// Metrics that were given the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingGroup {
    pub value: RatingValue,
    pub metrics: Vec<String>,
}

/// Groups rating entries by serialized value, preserving first-appearance order.
pub fn group_identical_ratings(entries: &[RatingEntry]) -> Vec<RatingGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<RatingGroup> = Vec::new();

    for entry in entries {
        let key = entry.value.serialized();
        match index.get(&key) {
            Some(&i) => groups[i].metrics.push(entry.metric.clone()),
            None => {
                index.insert(key, groups.len());
                groups.push(RatingGroup {
                    value: entry.value.clone(),
                    metrics: vec![entry.metric.clone()],
                });
            }
        }
    }

    debug!(
        "Grouped {} rating(s) into {} distinct value(s)",
        entries.len(),
        groups.len()
    );
    groups
}

/// The wire form: one entry per metric key.
pub fn flatten_groups(groups: &[RatingGroup]) -> Vec<RatingEntry> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .metrics
                .iter()
                .map(|metric| RatingEntry::new(metric.clone(), group.value.clone()))
        })
        .collect()
}

fn submission_key(metric: &MetricSubmission) -> String {
    let skills = serde_json::to_string(&metric.skills).unwrap_or_default();
    format!("{}|||{}", metric.template, skills)
}

/// Merges submissions that share a template and skill list. Idempotent.
pub fn group_metrics_for_submission(metrics: &[MetricSubmission]) -> Vec<MetricSubmission> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Vec<&MetricSubmission>> = Vec::new();

    for metric in metrics {
        let key = submission_key(metric);
        match index.get(&key) {
            Some(&i) => buckets[i].push(metric),
            None => {
                index.insert(key, buckets.len());
                buckets.push(vec![metric]);
            }
        }
    }

    let grouped: Vec<MetricSubmission> = buckets
        .into_iter()
        .map(|bucket| match bucket.as_slice() {
            [single] => (*single).clone(),
            many => MetricSubmission {
                definition: join(many.iter().map(|m| m.definition.as_str())),
                description: join(many.iter().map(|m| m.description.as_str())),
                template: many[0].template.clone(),
                enabled: MetricSubmission::enabled_flag(true),
                skills: many[0].skills.clone(),
            },
        })
        .collect();

    debug!(
        "Grouped {} metric submission(s) into {}",
        metrics.len(),
        grouped.len()
    );
    grouped
}

fn join<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(", ")
}
