use std::io::Write;

use flate2::{Compression, write::GzEncoder};
use geo_types::{Geometry, Point};
use mvt::{GeomEncoder, GeomType, Tile};

use vt_inspect::decode::{DecodedTile, PropertyValue, decode_payload};
use vt_inspect::error::Error;

fn create_vector_tile() -> Vec<u8> {
    let mut tile = Tile::new(4096);

    let layer = tile.create_layer("roads");
    let geom = GeomEncoder::new(GeomType::Point)
        .point(1.0, 2.0)
        .expect("point")
        .encode()
        .expect("encode");
    let mut feature = layer.into_feature(geom);
    feature.add_tag_string("class", "primary");
    feature.add_tag_string("name", "Main");
    let layer = feature.into_layer();
    let geom = GeomEncoder::new(GeomType::Point)
        .point(3.0, 4.0)
        .expect("point")
        .encode()
        .expect("encode");
    let mut feature = layer.into_feature(geom);
    feature.add_tag_string("name", "Side");
    let layer = feature.into_layer();
    tile.add_layer(layer).expect("add roads layer");

    let layer = tile.create_layer("buildings");
    let geom = GeomEncoder::new(GeomType::Point)
        .point(5.0, 6.0)
        .expect("point")
        .encode()
        .expect("encode");
    let mut feature = layer.into_feature(geom);
    feature.add_tag_string("height", "10");
    let layer = feature.into_layer();
    tile.add_layer(layer).expect("add buildings layer");

    tile.to_bytes().expect("tile bytes")
}

fn create_point_tile(layer_name: &str, points: usize) -> Vec<u8> {
    let mut tile = Tile::new(4096);
    let mut layer = tile.create_layer(layer_name);
    for i in 0..points {
        let geom = GeomEncoder::new(GeomType::Point)
            .point(i as f64, i as f64)
            .expect("point")
            .encode()
            .expect("encode");
        let feature = layer.into_feature(geom);
        layer = feature.into_layer();
    }
    tile.add_layer(layer).expect("add layer");
    tile.to_bytes().expect("tile bytes")
}

#[test]
fn decode_reports_layers_in_wire_order() {
    let tile = DecodedTile::decode(create_vector_tile()).expect("decode");

    assert_eq!(tile.layers().len(), 2);
    assert_eq!(tile.layers()[0].name, "roads");
    assert_eq!(tile.layers()[0].version, 2);
    assert_eq!(tile.layers()[0].extent, 4096);
    assert_eq!(tile.layers()[0].feature_count(), 2);
    assert_eq!(tile.layers()[1].name, "buildings");
    assert_eq!(tile.layers()[1].feature_count(), 1);
    assert!(tile.layer("roads").is_some());
    assert!(tile.layer("water").is_none());
}

#[test]
fn decode_features_lazily_by_index() {
    let tile = DecodedTile::decode(create_vector_tile()).expect("decode");
    let layer = tile.layer("roads").expect("roads layer");

    let feature = tile
        .feature(layer, 0)
        .expect("feature present")
        .expect("feature decodes");
    assert_eq!(feature.geometry, Geometry::Point(Point::new(1, 2)));
    assert_eq!(
        feature.properties.get("class"),
        Some(&PropertyValue::String("primary".to_string()))
    );
    assert_eq!(
        feature.properties.get("name"),
        Some(&PropertyValue::String("Main".to_string()))
    );

    let feature = tile
        .feature(layer, 1)
        .expect("feature present")
        .expect("feature decodes");
    assert_eq!(feature.geometry, Geometry::Point(Point::new(3, 4)));
    assert_eq!(feature.properties.len(), 1);

    assert!(tile.feature(layer, 2).is_none());
    assert_eq!(tile.features(layer).count(), 2);
}

#[test]
fn decode_typed_property_values() {
    let mut wire = Tile::new(4096);
    let layer = wire.create_layer("roads");
    let geom = GeomEncoder::new(GeomType::Point)
        .point(1.0, 1.0)
        .expect("point")
        .encode()
        .expect("encode");
    let mut feature = layer.into_feature(geom);
    feature.set_id(7);
    feature.add_tag_string("class", "primary");
    feature.add_tag_int("lanes", 2);
    feature.add_tag_double("width", 3.5);
    feature.add_tag_bool("oneway", true);
    let layer = feature.into_layer();
    wire.add_layer(layer).expect("add layer");
    let data = wire.to_bytes().expect("tile bytes");

    let tile = DecodedTile::decode(data).expect("decode");
    let layer = tile.layer("roads").expect("roads layer");
    let feature = tile
        .feature(layer, 0)
        .expect("feature present")
        .expect("feature decodes");

    assert_eq!(feature.id, Some(7));
    assert_eq!(
        feature.properties.get("class"),
        Some(&PropertyValue::String("primary".to_string()))
    );
    assert_eq!(feature.properties.get("lanes"), Some(&PropertyValue::Int(2)));
    assert_eq!(
        feature.properties.get("width"),
        Some(&PropertyValue::Double(3.5))
    );
    assert_eq!(
        feature.properties.get("oneway"),
        Some(&PropertyValue::Bool(true))
    );
}

#[test]
fn byte_lengths_sum_to_payload_length() {
    let tile = DecodedTile::decode(create_vector_tile()).expect("decode");

    let total: u64 = tile.layers().iter().map(|layer| layer.byte_length).sum();
    assert_eq!(total, tile.payload_len() as u64);
    assert!(tile.layers().iter().all(|layer| layer.byte_length > 0));
    assert!((tile.size_kb() - tile.payload_len() as f64 / 1000.0).abs() < f64::EPSILON);
}

#[test]
fn empty_layers_are_dropped() {
    let mut wire = Tile::new(4096);
    let layer = wire.create_layer("void");
    wire.add_layer(layer).expect("add void layer");
    let layer = wire.create_layer("roads");
    let geom = GeomEncoder::new(GeomType::Point)
        .point(1.0, 2.0)
        .expect("point")
        .encode()
        .expect("encode");
    let feature = layer.into_feature(geom);
    let layer = feature.into_layer();
    wire.add_layer(layer).expect("add roads layer");
    let data = wire.to_bytes().expect("tile bytes");

    let tile = DecodedTile::decode(data).expect("decode");
    assert_eq!(tile.layers().len(), 1);
    assert_eq!(tile.layers()[0].name, "roads");
    assert!(tile.layer("void").is_none());
}

#[test]
fn repeated_layer_names_keep_the_last_record() {
    let mut data = create_point_tile("roads", 1);
    data.extend_from_slice(&create_point_tile("roads", 3));

    let tile = DecodedTile::decode(data).expect("decode");
    assert_eq!(tile.layers().len(), 1);
    assert_eq!(tile.layers()[0].feature_count(), 3);
}

#[test]
fn decoding_the_same_bytes_is_deterministic() {
    let data = create_vector_tile();
    let first = DecodedTile::decode(data.clone()).expect("decode first");
    let second = DecodedTile::decode(data).expect("decode second");
    assert_eq!(first, second);
}

#[test]
fn gzip_payloads_are_sniffed_and_inflated() {
    let data = create_vector_tile();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&data).expect("gzip write");
    let compressed = encoder.finish().expect("gzip finish");

    let inflated = decode_payload(&compressed).expect("inflate");
    assert_eq!(inflated, data);
    let passthrough = decode_payload(&data).expect("passthrough");
    assert_eq!(passthrough, data);

    let tile = DecodedTile::decode(inflated).expect("decode");
    assert_eq!(tile.layers().len(), 2);
}

#[test]
fn truncated_length_prefix_is_malformed() {
    let err = DecodedTile::decode(vec![0x1a, 0x05, 0x00]).expect_err("must fail");
    assert!(matches!(err, Error::MalformedTile(_)));
}

#[test]
fn truncated_varint_is_malformed() {
    let err = DecodedTile::decode(vec![0x80]).expect_err("must fail");
    assert!(matches!(err, Error::MalformedTile(_)));
}

#[test]
fn unknown_wire_type_is_malformed() {
    let err = DecodedTile::decode(vec![0x0b]).expect_err("must fail");
    assert!(matches!(err, Error::MalformedTile(_)));
}
