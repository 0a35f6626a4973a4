use std::collections::BTreeSet;

use serde::Serialize;

use crate::decode::{DecodedTile, Layer};
use crate::error::Result;
use crate::geometry::normalize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStats {
    pub name: String,
    pub extent: u32,
    pub feature_count: u64,
    pub vertex_count: u64,
    pub byte_kb: f64,
    pub unique_properties: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileStats {
    pub size_kb: f64,
    pub total_features: u64,
    pub layers: Vec<LayerStats>,
}

pub fn collect_layer_stats(tile: &DecodedTile, layer: &Layer) -> Result<LayerStats> {
    let mut vertex_count = 0u64;
    // the signature set spans features, two features with the same pair count once
    let mut signatures: BTreeSet<String> = BTreeSet::new();
    for feature in tile.features(layer) {
        let feature = feature?;
        vertex_count += normalize(&feature.geometry)?.vertex_count();
        for (key, value) in &feature.properties {
            signatures.insert(format!("{key}:{value}"));
        }
    }
    Ok(LayerStats {
        name: layer.name.clone(),
        extent: layer.extent,
        feature_count: layer.feature_count() as u64,
        vertex_count,
        byte_kb: layer.byte_length as f64 / 1000.0,
        unique_properties: signatures.len() as u64,
    })
}

pub fn collect_tile_stats(tile: &DecodedTile) -> Result<TileStats> {
    let mut layers = Vec::with_capacity(tile.layers().len());
    for layer in tile.layers() {
        layers.push(collect_layer_stats(tile, layer)?);
    }
    Ok(TileStats {
        size_kb: tile.size_kb(),
        total_features: layers.iter().map(|stats| stats.feature_count).sum(),
        layers,
    })
}
