use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::stats::TileStats;

/// Session-lifetime accumulator of per-tile metric samples, keyed by layer
/// name. Samples are kept raw; min/avg/max reduction happens in `summary`.
#[derive(Debug, Default)]
pub struct AggregateTracker {
    seen: HashSet<String>,
    tile_sizes: Vec<f64>,
    layers: BTreeMap<String, AggregateEntry>,
}

#[derive(Debug, Default)]
struct AggregateEntry {
    feature_counts: Vec<u64>,
    vertex_counts: Vec<u64>,
    byte_kbs: Vec<f64>,
    unique_props: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub tiles_loaded: u64,
    pub min_size_kb: f64,
    pub avg_size_kb: f64,
    pub max_size_kb: f64,
    pub layers: Vec<AggregateLayerRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateLayerRow {
    pub name: String,
    pub avg_feature_count: String,
    pub avg_vertex_count: String,
    pub min_kb: f64,
    pub avg_kb: f64,
    pub max_kb: f64,
    pub avg_unique_props: String,
}

impl AggregateTracker {
    pub fn new() -> AggregateTracker {
        AggregateTracker::default()
    }

    /// A tile key seen before leaves every sample sequence untouched and
    /// returns false.
    pub fn ingest(&mut self, tile_key: &str, tile: &TileStats) -> bool {
        if !self.seen.insert(tile_key.to_string()) {
            tracing::info!(tile = tile_key, "tile already processed, skipping");
            return false;
        }
        self.tile_sizes.push(tile.size_kb);
        for layer in &tile.layers {
            let entry = self.layers.entry(layer.name.clone()).or_default();
            entry.feature_counts.push(layer.feature_count);
            entry.vertex_counts.push(layer.vertex_count);
            entry.byte_kbs.push(layer.byte_kb);
            entry.unique_props.push(layer.unique_properties);
        }
        true
    }

    pub fn tiles_loaded(&self) -> usize {
        self.tile_sizes.len()
    }

    pub fn summary(&self) -> AggregateReport {
        let layers = self
            .layers
            .iter()
            .map(|(name, entry)| AggregateLayerRow {
                name: name.clone(),
                avg_feature_count: format_metric(mean_u64(&entry.feature_counts)),
                avg_vertex_count: format_metric(mean_u64(&entry.vertex_counts)),
                min_kb: round1(min_f64(&entry.byte_kbs)),
                avg_kb: round1(mean_f64(&entry.byte_kbs)),
                max_kb: round1(max_f64(&entry.byte_kbs)),
                avg_unique_props: format_metric(mean_u64(&entry.unique_props)),
            })
            .collect();
        AggregateReport {
            tiles_loaded: self.tile_sizes.len() as u64,
            min_size_kb: round2(min_f64(&self.tile_sizes)),
            avg_size_kb: round2(mean_f64(&self.tile_sizes)),
            max_size_kb: round2(max_f64(&self.tile_sizes)),
            layers,
        }
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.tile_sizes.clear();
        self.layers.clear();
    }
}

pub fn format_metric(value: f64) -> String {
    if value > 10_000_000.0 {
        format!("{}m", round2(value / 10_000_000.0))
    } else if value > 100_000.0 {
        format!("{}k", round2(value / 100_000.0))
    } else {
        round2(value).to_string()
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean_u64(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn min_f64(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

fn max_f64(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}
