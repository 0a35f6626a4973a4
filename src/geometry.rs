use std::f64::consts::PI;
use std::fmt;
use std::path::{Component, Path};

use anyhow::Context;
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};

use crate::error::{Error, Result};

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

const GEOM_POINT: u32 = 1;
const GEOM_LINESTRING: u32 = 2;
const GEOM_POLYGON: u32 = 3;

/// Slippy-map tile address, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

pub fn parse_tile_spec(value: &str) -> anyhow::Result<TileCoord> {
    let parts: Vec<&str> = value.split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        anyhow::bail!("tile address must be z/x/y, got {value}");
    };
    let zoom = z
        .parse::<u8>()
        .with_context(|| format!("invalid zoom in tile address {value}"))?;
    let x = x
        .parse::<u32>()
        .with_context(|| format!("invalid x in tile address {value}"))?;
    let y = y
        .parse::<u32>()
        .with_context(|| format!("invalid y in tile address {value}"))?;
    Ok(TileCoord { zoom, x, y })
}

/// Infers a tile address from a `{z}/{x}/{y}.pbf` style path.
pub fn tile_coord_from_path(path: &Path) -> Option<TileCoord> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        if let Component::Normal(part) = component
            && let Some(text) = part.to_str()
        {
            parts.push(text);
        }
    }
    parts.pop()?;
    parts.push(stem);
    let y = parts.pop()?.parse::<u32>().ok()?;
    let x = parts.pop()?.parse::<u32>().ok()?;
    let zoom = parts.pop()?.parse::<u8>().ok()?;
    Some(TileCoord { zoom, x, y })
}

fn zigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn read_param(commands: &[u32], index: &mut usize) -> Result<u32> {
    let value = commands
        .get(*index)
        .copied()
        .ok_or_else(|| Error::MalformedTile("geometry command parameters truncated".into()))?;
    *index += 1;
    Ok(value)
}

// Every MoveTo starts a fresh path; ClosePath appends the first point of the
// open path so rings come out explicitly closed.
fn decode_paths(commands: &[u32]) -> Result<Vec<Vec<Coord<i32>>>> {
    let mut paths: Vec<Vec<Coord<i32>>> = Vec::new();
    let mut open: Option<Vec<Coord<i32>>> = None;
    let mut x = 0i32;
    let mut y = 0i32;
    let mut index = 0usize;
    while index < commands.len() {
        let command = commands[index];
        index += 1;
        let id = command & 0x7;
        let count = command >> 3;
        match id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                for _ in 0..count {
                    let dx = zigzag(read_param(commands, &mut index)?);
                    let dy = zigzag(read_param(commands, &mut index)?);
                    x = x.wrapping_add(dx);
                    y = y.wrapping_add(dy);
                    if id == CMD_MOVE_TO {
                        if let Some(done) = open.take() {
                            paths.push(done);
                        }
                        open = Some(Vec::new());
                    }
                    let Some(path) = open.as_mut() else {
                        return Err(Error::MalformedTile(
                            "line_to command before any move_to".into(),
                        ));
                    };
                    path.push(Coord { x, y });
                }
            }
            CMD_CLOSE_PATH => {
                for _ in 0..count {
                    if let Some(path) = open.as_mut()
                        && let Some(first) = path.first().copied()
                    {
                        path.push(first);
                    }
                }
            }
            other => {
                return Err(Error::MalformedTile(format!(
                    "unknown geometry command {other}"
                )));
            }
        }
    }
    if let Some(done) = open.take() {
        paths.push(done);
    }
    Ok(paths)
}

fn signed_area(ring: &[Coord<i32>]) -> i64 {
    if ring.is_empty() {
        return 0;
    }
    let mut sum = 0i64;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let p1 = ring[i];
        let p2 = ring[j];
        sum += (p2.x as i64 - p1.x as i64) * (p1.y as i64 + p2.y as i64);
        j = i;
    }
    sum
}

// The first ring with nonzero area fixes the exterior orientation; rings of
// that orientation open a new polygon, the rest become holes of the polygon
// opened last.
fn classify_rings(mut rings: Vec<Vec<Coord<i32>>>) -> Vec<Polygon<i32>> {
    if rings.len() <= 1 {
        return rings
            .drain(..)
            .map(|ring| Polygon::new(LineString::new(ring), Vec::new()))
            .collect();
    }
    let mut polygons: Vec<Polygon<i32>> = Vec::new();
    let mut exterior_negative: Option<bool> = None;
    let mut open: Option<(LineString<i32>, Vec<LineString<i32>>)> = None;
    for ring in rings {
        let area = signed_area(&ring);
        if area == 0 {
            continue;
        }
        let negative = area < 0;
        if negative == *exterior_negative.get_or_insert(negative) {
            if let Some((shell, holes)) = open.take() {
                polygons.push(Polygon::new(shell, holes));
            }
            open = Some((LineString::new(ring), Vec::new()));
        } else if let Some((_, holes)) = open.as_mut() {
            holes.push(LineString::new(ring));
        }
    }
    if let Some((shell, holes)) = open.take() {
        polygons.push(Polygon::new(shell, holes));
    }
    polygons
}

pub fn decode_geometry(geom_type: u32, commands: &[u32]) -> Result<Geometry<i32>> {
    let paths = decode_paths(commands)?;
    match geom_type {
        GEOM_POINT => {
            let mut points: Vec<Point<i32>> = paths
                .iter()
                .filter_map(|path| path.first().copied())
                .map(Point::from)
                .collect();
            Ok(if points.len() == 1 {
                Geometry::Point(points.swap_remove(0))
            } else {
                Geometry::MultiPoint(MultiPoint::new(points))
            })
        }
        GEOM_LINESTRING => {
            let mut lines: Vec<LineString<i32>> =
                paths.into_iter().map(LineString::new).collect();
            Ok(if lines.len() == 1 {
                Geometry::LineString(lines.swap_remove(0))
            } else {
                Geometry::MultiLineString(MultiLineString::new(lines))
            })
        }
        GEOM_POLYGON => {
            let mut polygons = classify_rings(paths);
            Ok(if polygons.len() == 1 {
                Geometry::Polygon(polygons.swap_remove(0))
            } else {
                Geometry::MultiPolygon(MultiPolygon::new(polygons))
            })
        }
        other => Err(Error::UnsupportedGeometry(other.to_string())),
    }
}

pub fn geometry_type_name(geometry: &Geometry<i32>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Uniform parts/rings/points nesting, the same depth for every geometry type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedGeometry {
    pub parts: Vec<Vec<Vec<Coord<i32>>>>,
}

impl NormalizedGeometry {
    pub fn vertex_count(&self) -> u64 {
        self.parts
            .iter()
            .flat_map(|part| part.iter())
            .map(|ring| ring.len() as u64)
            .sum()
    }
}

pub fn normalize(geometry: &Geometry<i32>) -> Result<NormalizedGeometry> {
    let parts = match geometry {
        Geometry::Point(point) => vec![vec![vec![point.0]]],
        Geometry::MultiPoint(points) => {
            vec![points.0.iter().map(|point| vec![point.0]).collect()]
        }
        Geometry::LineString(line) => vec![vec![line.0.clone()]],
        Geometry::MultiLineString(lines) => {
            vec![lines.0.iter().map(|line| line.0.clone()).collect()]
        }
        Geometry::Polygon(polygon) => vec![polygon_rings(polygon)],
        Geometry::MultiPolygon(polygons) => polygons.0.iter().map(polygon_rings).collect(),
        other => {
            return Err(Error::UnsupportedGeometry(
                geometry_type_name(other).to_string(),
            ));
        }
    };
    Ok(NormalizedGeometry { parts })
}

fn polygon_rings(polygon: &Polygon<i32>) -> Vec<Vec<Coord<i32>>> {
    let mut rings = Vec::with_capacity(1 + polygon.interiors().len());
    rings.push(polygon.exterior().0.clone());
    for interior in polygon.interiors() {
        rings.push(interior.0.clone());
    }
    rings
}

pub fn project(point: Coord<i32>, tile: TileCoord, extent: u32) -> [f64; 2] {
    let size = extent as f64 * 2f64.powi(tile.zoom as i32);
    let x0 = extent as f64 * tile.x as f64;
    let y0 = extent as f64 * tile.y as f64;
    let merc_y = 180.0 - (point.y as f64 + y0) * 360.0 / size;
    let lon = (point.x as f64 + x0) * 360.0 / size - 180.0;
    let lat = 360.0 / PI * (merc_y * PI / 180.0).exp().atan() - 90.0;
    [lon, lat]
}
