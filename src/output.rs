use anyhow::Result;
use geo_types::{Coord, Geometry, LineString, Polygon};
use nu_ansi_term::Color;
use serde_json::{Map, Value, json};

use crate::aggregate::AggregateReport;
use crate::decode::{DecodedTile, Feature, Layer, PropertyValue};
use crate::geometry::{self, TileCoord, geometry_type_name};
use crate::stats::TileStats;

pub fn format_tile_report(coord: Option<TileCoord>, stats: &TileStats) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(coord) = coord {
        lines.push(format!("- z={} x={} y={}", coord.zoom, coord.x, coord.y));
    }
    lines.push(format!(
        "- {}: {:.2}KB",
        Color::Blue.paint("Size of tile"),
        stats.size_kb
    ));
    lines.push(format!(
        "- {}: {}",
        Color::Blue.paint("Layers in this tile"),
        stats.layers.len()
    ));
    lines.push(format!(
        "- {}: {}",
        Color::Blue.paint("Features in this tile"),
        stats.total_features
    ));
    if !stats.layers.is_empty() {
        lines.push("## Layers".to_string());
    }
    for layer in stats.layers.iter() {
        lines.push(format!(
            "- {}: features={} vertices={} extent={} kb={} unique_props={}",
            layer.name,
            layer.feature_count,
            layer.vertex_count,
            layer.extent,
            layer.byte_kb.round() as u64,
            layer.unique_properties
        ));
    }
    lines
}

pub fn format_dashboard(report: &AggregateReport) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "- {}: {}",
        Color::Blue.paint("Tiles loaded"),
        report.tiles_loaded
    ));
    lines.push(format!(
        "- {}: min={} avg={} max={}",
        Color::Blue.paint("Tile size KB"),
        report.min_size_kb,
        report.avg_size_kb,
        report.max_size_kb
    ));
    if !report.layers.is_empty() {
        lines.push("## Layers".to_string());
    }
    for row in report.layers.iter() {
        lines.push(format!(
            "- {}: features={} vertices={} kb={}/{}/{} unique_props={}",
            row.name,
            row.avg_feature_count,
            row.avg_vertex_count,
            row.min_kb,
            row.avg_kb,
            row.max_kb,
            row.avg_unique_props
        ));
    }
    lines
}

/// GeoJSON view of one layer, projected to lon/lat at the given address.
pub fn layer_feature_collection(
    tile: &DecodedTile,
    layer: &Layer,
    coord: TileCoord,
) -> Result<Value> {
    let mut features = Vec::with_capacity(layer.feature_count());
    for feature in tile.features(layer) {
        let feature = feature?;
        features.push(feature_json(&feature, coord, layer.extent)?);
    }
    Ok(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

fn feature_json(feature: &Feature, coord: TileCoord, extent: u32) -> Result<Value> {
    let properties: Map<String, Value> = feature
        .properties
        .iter()
        .map(|(key, value)| (key.clone(), property_json(value)))
        .collect();
    let mut object = Map::new();
    object.insert("type".to_string(), json!("Feature"));
    if let Some(id) = feature.id {
        object.insert("id".to_string(), json!(id));
    }
    object.insert(
        "geometry".to_string(),
        geometry_json(&feature.geometry, coord, extent)?,
    );
    object.insert("properties".to_string(), Value::Object(properties));
    Ok(Value::Object(object))
}

fn geometry_json(geometry: &Geometry<i32>, coord: TileCoord, extent: u32) -> Result<Value> {
    let coordinates = match geometry {
        Geometry::Point(point) => position_json(point.0, coord, extent),
        Geometry::MultiPoint(points) => Value::Array(
            points
                .0
                .iter()
                .map(|point| position_json(point.0, coord, extent))
                .collect(),
        ),
        Geometry::LineString(line) => ring_json(line, coord, extent),
        Geometry::MultiLineString(lines) => Value::Array(
            lines
                .0
                .iter()
                .map(|line| ring_json(line, coord, extent))
                .collect(),
        ),
        Geometry::Polygon(polygon) => polygon_json(polygon, coord, extent),
        Geometry::MultiPolygon(polygons) => Value::Array(
            polygons
                .0
                .iter()
                .map(|polygon| polygon_json(polygon, coord, extent))
                .collect(),
        ),
        other => anyhow::bail!("cannot export {} geometry", geometry_type_name(other)),
    };
    Ok(json!({
        "type": geometry_type_name(geometry),
        "coordinates": coordinates,
    }))
}

fn position_json(point: Coord<i32>, coord: TileCoord, extent: u32) -> Value {
    json!(geometry::project(point, coord, extent))
}

fn ring_json(line: &LineString<i32>, coord: TileCoord, extent: u32) -> Value {
    Value::Array(
        line.0
            .iter()
            .map(|point| position_json(*point, coord, extent))
            .collect(),
    )
}

fn polygon_json(polygon: &Polygon<i32>, coord: TileCoord, extent: u32) -> Value {
    let mut rings = Vec::with_capacity(1 + polygon.interiors().len());
    rings.push(ring_json(polygon.exterior(), coord, extent));
    for interior in polygon.interiors() {
        rings.push(ring_json(interior, coord, extent));
    }
    Value::Array(rings)
}

fn property_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::String(text) => json!(text),
        PropertyValue::Float(val) => json!(val),
        PropertyValue::Double(val) => json!(val),
        PropertyValue::Int(val) => json!(val),
        PropertyValue::UInt(val) => json!(val),
        PropertyValue::SInt(val) => json!(val),
        PropertyValue::Bool(val) => json!(val),
        PropertyValue::Null => Value::Null,
    }
}

pub fn tile_ndjson_lines(input: &str, stats: &TileStats) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    lines.push(serde_json::to_string(&json!({
        "type": "tile",
        "input": input,
        "size_kb": stats.size_kb,
        "total_features": stats.total_features,
    }))?);
    for layer in stats.layers.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "layer",
            "layer": layer,
        }))?);
    }
    Ok(lines)
}

pub fn stats_ndjson_lines(report: &AggregateReport) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    lines.push(serde_json::to_string(&json!({
        "type": "summary",
        "tiles_loaded": report.tiles_loaded,
        "min_size_kb": report.min_size_kb,
        "avg_size_kb": report.avg_size_kb,
        "max_size_kb": report.max_size_kb,
    }))?);
    for row in report.layers.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "layer",
            "layer": row,
        }))?);
    }
    Ok(lines)
}

pub fn geojson_ndjson_lines(collections: &[(String, Value)]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for (name, collection) in collections.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "layer_geojson",
            "layer": name,
            "feature_collection": collection,
        }))?);
    }
    Ok(lines)
}
