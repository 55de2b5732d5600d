//! Zone polygons ("xlines") and the pairwise direction table between them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ZoneError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// On-disk zone entry: `{"content": [{"x": .., "y": ..}, ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneEntry {
    pub content: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point>,
    centroid: Point,
}

impl Polygon {
    /// Validate and build a polygon; `index` is only used for error reporting.
    pub fn new(index: usize, points: Vec<Point>) -> Result<Self, ZoneError> {
        if points.len() < 3 {
            return Err(ZoneError::TooFewPoints {
                index,
                points: points.len(),
            });
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ZoneError::Degenerate { index });
        }

        let area = signed_area(&points);
        if area.abs() < 1e-3 {
            return Err(ZoneError::Degenerate { index });
        }

        // Area-weighted centroid (shoelace).
        let n = points.len();
        let (mut cx, mut cy) = (0.0f64, 0.0f64);
        for i in 0..n {
            let (p, q) = (points[i], points[(i + 1) % n]);
            let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
            cx += (p.x as f64 + q.x as f64) * cross;
            cy += (p.y as f64 + q.y as f64) * cross;
        }
        let centroid = Point::new((cx / (6.0 * area)) as f32, (cy / (6.0 * area)) as f32);

        Ok(Self { points, centroid })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    /// Even-odd ray casting test.
    pub fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.points[i], self.points[j]);
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (p, q) = (points[i], points[(i + 1) % n]);
            p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64
        })
        .sum::<f64>()
        / 2.0
}

/// Unit vector from one zone's centroid towards another's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneDirection {
    pub to: usize,
    pub unit: [f32; 2],
}

/// The configured zone list. Indices are the stable identifiers used in routes.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSet {
    zones: Vec<Polygon>,
    directions: Vec<Vec<ZoneDirection>>,
}

impl ZoneSet {
    pub fn new(polygons: Vec<Vec<Point>>) -> Result<Self, ZoneError> {
        if polygons.is_empty() {
            return Err(ZoneError::Empty);
        }
        let zones = polygons
            .into_iter()
            .enumerate()
            .map(|(i, pts)| Polygon::new(i, pts))
            .collect::<Result<Vec<_>, _>>()?;

        let directions = zones
            .iter()
            .enumerate()
            .map(|(i, from)| {
                zones
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .filter_map(|(j, to)| {
                        let dx = to.centroid.x - from.centroid.x;
                        let dy = to.centroid.y - from.centroid.y;
                        let norm = (dx * dx + dy * dy).sqrt();
                        (norm > f32::EPSILON).then(|| ZoneDirection {
                            to: j,
                            unit: [dx / norm, dy / norm],
                        })
                    })
                    .collect()
            })
            .collect();

        Ok(Self { zones, directions })
    }

    /// Parse the JSON zone list.
    pub fn parse(content: &str) -> Result<Self, ZoneError> {
        let entries: Vec<ZoneEntry> = serde_json::from_str(content)?;
        Self::new(entries.into_iter().map(|e| e.content).collect())
    }

    pub fn load(path: &Path) -> Result<Self, ZoneError> {
        let content = std::fs::read_to_string(path).map_err(|source| ZoneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zone(&self, index: usize) -> Option<&Polygon> {
        self.zones.get(index)
    }

    /// Lowest-indexed zone containing `p`.
    pub fn zone_at(&self, p: Point) -> Option<usize> {
        self.zones.iter().position(|z| z.contains(p))
    }

    pub fn directions_from(&self, index: usize) -> &[ZoneDirection] {
        self.directions.get(index).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, size: f32) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ]
    }

    #[test]
    fn test_contains() {
        let poly = Polygon::new(0, square(0.0, 0.0, 10.0)).unwrap();
        assert!(poly.contains(Point::new(5.0, 5.0)));
        assert!(!poly.contains(Point::new(15.0, 5.0)));
        assert!(!poly.contains(Point::new(-1.0, 5.0)));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape opening upwards
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 3.0),
            Point::new(2.0, 3.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 3.0),
            Point::new(0.0, 3.0),
        ];
        let poly = Polygon::new(0, pts).unwrap();
        assert!(poly.contains(Point::new(0.5, 2.0)));
        assert!(!poly.contains(Point::new(1.5, 2.0)));
    }

    #[test]
    fn test_centroid() {
        let poly = Polygon::new(0, square(10.0, 20.0, 10.0)).unwrap();
        let c = poly.centroid();
        assert!((c.x - 15.0).abs() < 1e-4);
        assert!((c.y - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_and_directions() {
        let json = r#"[
            {"content": [{"x": 0, "y": 0}, {"x": 100, "y": 0}, {"x": 100, "y": 100}, {"x": 0, "y": 100}]},
            {"content": [{"x": 100, "y": 0}, {"x": 200, "y": 0}, {"x": 200, "y": 100}, {"x": 100, "y": 100}]}
        ]"#;
        let zones = ZoneSet::parse(json).unwrap();
        assert_eq!(zones.len(), 2);
        let dirs = zones.directions_from(0);
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].to, 1);
        assert!((dirs[0].unit[0] - 1.0).abs() < 1e-6);
        assert_eq!(zones.zone_at(Point::new(150.0, 50.0)), Some(1));
        assert_eq!(zones.zone_at(Point::new(250.0, 50.0)), None);
    }

    #[test]
    fn test_rejects_invalid_configs() {
        assert!(matches!(ZoneSet::parse("[]"), Err(ZoneError::Empty)));
        assert!(matches!(
            ZoneSet::parse(r#"[{"content": [{"x": 0, "y": 0}, {"x": 1, "y": 1}]}]"#),
            Err(ZoneError::TooFewPoints { index: 0, points: 2 })
        ));
        assert!(matches!(
            ZoneSet::parse(r#"[{"content": [{"x": 0, "y": 0}, {"x": 1, "y": 1}, {"x": 2, "y": 2}]}]"#),
            Err(ZoneError::Degenerate { index: 0 })
        ));
        assert!(matches!(ZoneSet::parse("{not json"), Err(ZoneError::Parse(_))));
    }
}
