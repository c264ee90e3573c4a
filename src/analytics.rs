// src/analytics.rs
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    config::AnalyticsConfig,
    dataset::{Dataset, Value},
    search::View,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Count {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub regions: Vec<Count>,
    pub firm_types: Vec<Count>,
}

/// Tally labels, most frequent first; ties keep first-seen order.
fn value_counts(labels: impl Iterator<Item = String>) -> Vec<Count> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for label in labels {
        let entry = counts.entry(label.clone()).or_insert(0);
        if *entry == 0 {
            order.push(label);
        }
        *entry += 1;
    }
    let mut out: Vec<Count> = order
        .into_iter()
        .map(|label| {
            let count = counts[&label];
            Count { label, count }
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

fn text_of<'a>(ds: &'a Dataset, field: &'a str) -> impl Iterator<Item = String> + 'a {
    ds.records.iter().filter_map(move |r| match r.get(field) {
        Some(Value::Missing) | None => None,
        Some(v) => Some(v.to_string().trim().to_string()),
    })
}

/// Records per known region (the regional hubs chart).
pub fn region_counts(ds: &Dataset, cfg: &AnalyticsConfig) -> Vec<Count> {
    let known: Vec<&str> = cfg.regions.iter().map(|r| r.name.as_str()).collect();
    value_counts(text_of(ds, &cfg.region_field).filter(|r| known.contains(&r.as_str())))
}

/// Records per firm type, skipping header echoes (the market split chart).
pub fn type_split(ds: &Dataset, cfg: &AnalyticsConfig) -> Vec<Count> {
    let field = cfg.type_field.as_str();
    value_counts(
        text_of(ds, field).filter(move |t| !t.is_empty() && !t.contains(field) && t != "nan"),
    )
}

pub fn summary(ds: &Dataset, cfg: &AnalyticsConfig) -> Summary {
    Summary {
        regions: region_counts(ds, cfg),
        firm_types: type_split(ds, cfg),
    }
}

/// One point per record of the view at its region's coordinates (or the
/// default point), plus a small random jitter so firms in one region do not
/// overlap.
pub fn map_points(view: &View<'_>, ds: &Dataset, cfg: &AnalyticsConfig) -> Vec<MapPoint> {
    if !ds.schema.contains(&cfg.region_field) {
        return Vec::new();
    }
    let mut rng = rand::thread_rng();
    let jitter = cfg.jitter.abs();
    view.positions()
        .iter()
        .map(|&i| {
            let record = &ds.records[i];
            let region = record
                .get(&cfg.region_field)
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_default();
            let (lat, lon) = cfg
                .regions
                .iter()
                .find(|r| r.name == region)
                .map(|r| (r.lat, r.lon))
                .unwrap_or(cfg.default_point);
            let (dlat, dlon) = if jitter > 0.0 {
                (rng.gen_range(-jitter..jitter), rng.gen_range(-jitter..jitter))
            } else {
                (0.0, 0.0)
            };
            MapPoint {
                name: ds.display_name(i),
                lat: lat + dlat,
                lon: lon + dlon,
            }
        })
        .collect()
}
