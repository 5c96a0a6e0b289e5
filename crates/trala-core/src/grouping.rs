//! Grouping engine: clusters services into display groups by shared tags
//!
//! Services that already carry a group (from an override) are left alone.
//! The rest are grouped greedily: each round picks the valid tag whose
//! frequency is closest to `sqrt(remaining)`, assigns it to every remaining
//! service carrying it, and recomputes frequencies and validity for what is
//! left. Ties go to the lexicographically smallest tag.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::ResolvedService;

/// Grouping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Columns used by the client when rendering groups (1-6)
    #[serde(default = "default_columns")]
    pub columns: u32,
    /// Tags carried by at least this share of the remaining services are "too common"
    #[serde(default = "default_threshold")]
    pub tag_frequency_threshold: f64,
    #[serde(default = "default_min_services")]
    pub min_services_per_group: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_columns() -> u32 {
    3
}

fn default_threshold() -> f64 {
    0.9
}

fn default_min_services() -> usize {
    2
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            columns: default_columns(),
            tag_frequency_threshold: default_threshold(),
            min_services_per_group: default_min_services(),
        }
    }
}

/// Assign group labels in place
pub fn assign_groups(services: &mut [ResolvedService], config: &GroupingConfig) {
    if !config.enabled {
        for service in services.iter_mut() {
            service.group.clear();
        }
        return;
    }

    let mut remaining: Vec<usize> = services
        .iter()
        .enumerate()
        .filter(|(_, s)| s.group.is_empty())
        .map(|(i, _)| i)
        .collect();
    let mut used: BTreeSet<String> = BTreeSet::new();

    while !remaining.is_empty() {
        let counts = tag_frequencies(services, &remaining);
        let valid: Vec<&str> = valid_tags(services, &remaining, &counts, config)
            .into_iter()
            .filter(|tag| !used.contains(*tag))
            .collect();
        let target = (remaining.len() as f64).sqrt();

        let Some(best) = select_best_tag(&valid, &counts, target).map(str::to_string) else {
            break;
        };

        remaining.retain(|&i| {
            let service = &mut services[i];
            if service.has_tag(&best) {
                service.group = best.clone();
                false
            } else {
                true
            }
        });

        tracing::debug!(group = %best, remaining = remaining.len(), "Formed group");
        used.insert(best);
    }
}

/// Number of remaining services carrying each tag
fn tag_frequencies<'a>(services: &'a [ResolvedService], remaining: &[usize]) -> BTreeMap<&'a str, usize> {
    let mut counts = BTreeMap::new();
    for &i in remaining {
        let distinct: BTreeSet<&str> = services[i].tags.iter().map(String::as_str).collect();
        for tag in distinct {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    counts
}

/// Tags allowed to form a group this round, in lexicographic order
///
/// A tag must be rare enough (below `threshold * remaining`) unless it
/// already reaches the minimum group size. A tag seen on a single service
/// only counts when the minimum is 1 or that service carries nothing else.
fn valid_tags<'a>(
    services: &[ResolvedService],
    remaining: &[usize],
    counts: &BTreeMap<&'a str, usize>,
    config: &GroupingConfig,
) -> Vec<&'a str> {
    let limit = config.tag_frequency_threshold * remaining.len() as f64;
    let min = config.min_services_per_group;

    counts
        .iter()
        .filter(|&(tag, &count)| {
            let not_too_common = (count as f64) < limit || count >= min;
            let singleton_ok = count != 1
                || min <= 1
                || remaining.iter().any(|&i| is_sole_tag(&services[i], tag));
            not_too_common && singleton_ok
        })
        .map(|(tag, _)| *tag)
        .collect()
}

fn is_sole_tag(service: &ResolvedService, tag: &str) -> bool {
    !service.tags.is_empty() && service.tags.iter().all(|t| t == tag)
}

/// Tag whose frequency is nearest to the target size; first in order wins ties
fn select_best_tag<'a>(valid: &[&'a str], counts: &BTreeMap<&str, usize>, target: f64) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for &tag in valid {
        let size = counts.get(tag).copied().unwrap_or(0);
        if size == 0 {
            continue;
        }
        let distance = (size as f64 - target).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((tag, distance)),
        }
    }
    best.map(|(tag, _)| tag)
}

/// Higher priority first; equal priorities keep their relative order
pub fn sort_by_priority(services: &mut [ResolvedService]) {
    services.sort_by(|a, b| b.priority.cmp(&a.priority));
}
