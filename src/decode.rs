use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use flate2::read::GzDecoder;
use geo_types::Geometry;
use varint_rs::VarintReader;

use crate::error::{Error, Result};
use crate::geometry::decode_geometry;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LENGTH: u8 = 2;
const WIRE_FIXED32: u8 = 5;

const TILE_LAYER: u32 = 3;

const LAYER_NAME: u32 = 1;
const LAYER_FEATURE: u32 = 2;
const LAYER_KEY: u32 = 3;
const LAYER_VALUE: u32 = 4;
const LAYER_EXTENT: u32 = 5;
const LAYER_VERSION: u32 = 15;

const FEATURE_ID: u32 = 1;
const FEATURE_TAGS: u32 = 2;
const FEATURE_TYPE: u32 = 3;
const FEATURE_GEOMETRY: u32 = 4;

const VALUE_STRING: u32 = 1;
const VALUE_FLOAT: u32 = 2;
const VALUE_DOUBLE: u32 = 3;
const VALUE_INT: u32 = 4;
const VALUE_UINT: u32 = 5;
const VALUE_SINT: u32 = 6;
const VALUE_BOOL: u32 = 7;

pub const DEFAULT_EXTENT: u32 = 4096;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedTile(message.into())
}

struct WireReader<'a> {
    full: &'a [u8],
    rest: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        WireReader { full: data, rest: data }
    }

    fn pos(&self) -> usize {
        self.full.len() - self.rest.len()
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn read_varint(&mut self) -> Result<u64> {
        self.rest
            .read_u64_varint()
            .map_err(|_| malformed("truncated varint"))
    }

    fn read_svarint(&mut self) -> Result<i64> {
        self.rest
            .read_i64_varint()
            .map_err(|_| malformed("truncated varint"))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.rest.len() {
            return Err(malformed("field length exceeds remaining buffer"));
        }
        let (head, tail) = self.rest.split_at(len);
        self.rest = tail;
        Ok(head)
    }

    fn read_key(&mut self) -> Result<(u32, u8)> {
        let key = self.read_varint()?;
        Ok(((key >> 3) as u32, (key & 0x7) as u8))
    }

    fn read_message(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_message()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| malformed("string field is not valid utf-8"))
    }

    fn read_float(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(f32::from_le_bytes(raw))
    }

    fn read_double(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn skip(&mut self, wire: u8) -> Result<()> {
        match wire {
            WIRE_VARINT => {
                self.read_varint()?;
            }
            WIRE_FIXED64 => {
                self.take(8)?;
            }
            WIRE_LENGTH => {
                let len = self.read_varint()? as usize;
                self.take(len)?;
            }
            WIRE_FIXED32 => {
                self.take(4)?;
            }
            other => return Err(malformed(format!("unknown wire type {other}"))),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
    Null,
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(text) => write!(f, "{text}"),
            PropertyValue::Float(val) => write!(f, "{val}"),
            PropertyValue::Double(val) => write!(f, "{val}"),
            PropertyValue::Int(val) => write!(f, "{val}"),
            PropertyValue::UInt(val) => write!(f, "{val}"),
            PropertyValue::SInt(val) => write!(f, "{val}"),
            PropertyValue::Bool(val) => write!(f, "{val}"),
            PropertyValue::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    /// Stream-position delta since the previous layer boundary.
    pub byte_length: u64,
    keys: Vec<String>,
    values: Vec<PropertyValue>,
    features: Vec<Range<usize>>,
}

impl Layer {
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub geometry: Geometry<i32>,
}

/// Owns the raw payload; layers hold offset spans into it, so feature bytes
/// are only parsed when a feature is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    data: Vec<u8>,
    layers: Vec<Layer>,
}

impl DecodedTile {
    pub fn decode(data: Vec<u8>) -> Result<DecodedTile> {
        let mut layers: Vec<Layer> = Vec::new();
        let mut reader = WireReader::new(&data);
        let mut last_boundary = 0usize;
        while !reader.is_empty() {
            let (tag, wire) = reader.read_key()?;
            if tag == TILE_LAYER && wire == WIRE_LENGTH {
                let message = reader.read_message()?;
                let base = reader.pos() - message.len();
                let mut layer = decode_layer(message, base)?;
                layer.byte_length = (reader.pos() - last_boundary) as u64;
                last_boundary = reader.pos();
                if layer.feature_count() == 0 {
                    tracing::debug!(layer = %layer.name, "dropping empty layer");
                } else if let Some(existing) =
                    layers.iter_mut().find(|known| known.name == layer.name)
                {
                    // repeated layer name, the later record wins
                    *existing = layer;
                } else {
                    layers.push(layer);
                }
            } else {
                reader.skip(wire)?;
            }
        }
        Ok(DecodedTile { data, layers })
    }

    pub fn payload_len(&self) -> usize {
        self.data.len()
    }

    pub fn size_kb(&self) -> f64 {
        self.data.len() as f64 / 1000.0
    }

    /// Layers in wire order, empty layers excluded.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn features<'a>(
        &'a self,
        layer: &'a Layer,
    ) -> impl Iterator<Item = Result<Feature>> + 'a {
        layer
            .features
            .iter()
            .map(|span| self.decode_feature(layer, span.clone()))
    }

    pub fn feature(&self, layer: &Layer, index: usize) -> Option<Result<Feature>> {
        let span = layer.features.get(index)?;
        Some(self.decode_feature(layer, span.clone()))
    }

    fn decode_feature(&self, layer: &Layer, span: Range<usize>) -> Result<Feature> {
        let data = self
            .data
            .get(span)
            .ok_or_else(|| malformed("feature span outside tile buffer"))?;
        let mut reader = WireReader::new(data);
        let mut id = None;
        let mut tags: Vec<u32> = Vec::new();
        let mut geom_type = 0u32;
        let mut commands: Vec<u32> = Vec::new();
        while !reader.is_empty() {
            let (tag, wire) = reader.read_key()?;
            match tag {
                FEATURE_ID => id = Some(reader.read_varint()?),
                FEATURE_TAGS => tags = read_packed(reader.read_message()?)?,
                FEATURE_TYPE => geom_type = reader.read_varint()? as u32,
                FEATURE_GEOMETRY => commands = read_packed(reader.read_message()?)?,
                _ => reader.skip(wire)?,
            }
        }

        let mut properties = BTreeMap::new();
        for pair in tags.chunks(2) {
            let [key_index, value_index] = pair else {
                return Err(malformed("feature tags must come in key/value pairs"));
            };
            let key = layer
                .keys
                .get(*key_index as usize)
                .ok_or_else(|| malformed("feature tag key index out of range"))?;
            let value = layer
                .values
                .get(*value_index as usize)
                .ok_or_else(|| malformed("feature tag value index out of range"))?;
            properties.insert(key.clone(), value.clone());
        }

        let geometry = decode_geometry(geom_type, &commands)?;
        Ok(Feature { id, properties, geometry })
    }
}

fn decode_layer(data: &[u8], base: usize) -> Result<Layer> {
    let mut reader = WireReader::new(data);
    let mut name = String::new();
    let mut version = 1u32;
    let mut extent = DEFAULT_EXTENT;
    let mut keys = Vec::new();
    let mut values = Vec::new();
    let mut features = Vec::new();
    while !reader.is_empty() {
        let (tag, wire) = reader.read_key()?;
        match tag {
            LAYER_VERSION => version = reader.read_varint()? as u32,
            LAYER_NAME => name = reader.read_string()?,
            LAYER_EXTENT => extent = reader.read_varint()? as u32,
            LAYER_FEATURE => {
                let message = reader.read_message()?;
                let end = base + reader.pos();
                features.push(end - message.len()..end);
            }
            LAYER_KEY => keys.push(reader.read_string()?),
            LAYER_VALUE => values.push(read_value(reader.read_message()?)?),
            _ => reader.skip(wire)?,
        }
    }
    Ok(Layer {
        name,
        version,
        extent,
        byte_length: 0,
        keys,
        values,
        features,
    })
}

fn read_value(data: &[u8]) -> Result<PropertyValue> {
    let mut reader = WireReader::new(data);
    let mut value = PropertyValue::Null;
    while !reader.is_empty() {
        let (tag, wire) = reader.read_key()?;
        match tag {
            VALUE_STRING => value = PropertyValue::String(reader.read_string()?),
            VALUE_FLOAT => value = PropertyValue::Float(reader.read_float()?),
            VALUE_DOUBLE => value = PropertyValue::Double(reader.read_double()?),
            VALUE_INT => value = PropertyValue::Int(reader.read_varint()? as i64),
            VALUE_UINT => value = PropertyValue::UInt(reader.read_varint()?),
            VALUE_SINT => value = PropertyValue::SInt(reader.read_svarint()?),
            VALUE_BOOL => value = PropertyValue::Bool(reader.read_varint()? != 0),
            _ => reader.skip(wire)?,
        }
    }
    Ok(value)
}

fn read_packed(data: &[u8]) -> Result<Vec<u32>> {
    let mut reader = WireReader::new(data);
    let mut values = Vec::new();
    while !reader.is_empty() {
        let value = reader.read_varint()?;
        let value = u32::try_from(value)
            .map_err(|_| malformed("packed field value overflows u32"))?;
        values.push(value);
    }
    Ok(values)
}

pub fn decode_payload(data: &[u8]) -> Result<Vec<u8>> {
    if data.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(data);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded)?;
        Ok(decoded)
    } else {
        Ok(data.to_vec())
    }
}

pub fn read_tile_payload(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path)?;
    decode_payload(&data)
}
