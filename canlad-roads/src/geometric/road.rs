use geo::{BoundingRect, EuclideanLength, Geometry, LineString};
use geojson::{feature::Id, Feature, GeoJson, JsonObject, JsonValue};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::collect::global_variables::{
    ID_FIELD, LENGTH_FIELD, LENGTH_THRESHOLD, MIN_RESIDUAL_LENGTH, SHORTEN_MARGIN,
};
use crate::error::{Result, YodError};
use crate::geo_core::{BoundingBox, GeoCore};
use crate::geometric::line_tools::shorten_line_string;

/// Road identifier, kept in the JSON type it was read with
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoadId {
    Int(i64),
    Text(String),
}

impl RoadId {
    fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Some(RoadId::Text(s.clone())),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Some(RoadId::Int(i)),
                None => Some(RoadId::Text(n.to_string())),
            },
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            RoadId::Int(i) => JsonValue::from(*i),
            RoadId::Text(s) => JsonValue::from(s.clone()),
        }
    }
}

impl fmt::Display for RoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoadId::Int(i) => write!(f, "{}", i),
            RoadId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RoadId {
    fn from(s: &str) -> Self {
        RoadId::Text(s.to_string())
    }
}

impl From<i64> for RoadId {
    fn from(i: i64) -> Self {
        RoadId::Int(i)
    }
}

/// A single road segment.
///
/// `length` is measured once when the feature is created and is carried
/// unchanged through shortening, so it always describes the source geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadFeature {
    pub id: RoadId,
    pub geometry: LineString<f64>,
    pub length: f64,
    /// Source attributes other than `id` and `length`
    pub properties: JsonObject,
}

impl RoadFeature {
    pub fn new(id: impl Into<RoadId>, geometry: LineString<f64>) -> Self {
        let length = geometry.euclidean_length();
        RoadFeature {
            id: id.into(),
            geometry,
            length,
            properties: JsonObject::new(),
        }
    }

    /// Same feature with a different geometry
    fn with_geometry(&self, geometry: LineString<f64>) -> Self {
        RoadFeature {
            geometry,
            ..self.clone()
        }
    }

    fn with_properties(mut self, properties: JsonObject) -> Self {
        self.properties = properties;
        self
    }
}

/// Length split and end-trimming parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    /// Roads longer than this are shortened
    pub length_threshold: f64,
    /// Arc length removed from each end of a long road
    pub shorten_margin: f64,
    /// Shortest line a clamped shortening may leave
    pub min_residual: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        NormalizeParams {
            length_threshold: LENGTH_THRESHOLD,
            shorten_margin: SHORTEN_MARGIN,
            min_residual: MIN_RESIDUAL_LENGTH,
        }
    }
}

impl NormalizeParams {
    pub fn validate(&self) -> Result<()> {
        let values = [self.length_threshold, self.shorten_margin, self.min_residual];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(YodError::InvalidParameter(format!(
                "normalization parameters must be finite and non-negative: {:?}",
                self
            )));
        }
        if self.min_residual == 0.0 {
            return Err(YodError::InvalidParameter(
                "min_residual must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Road collection, loaded from GeoJSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roads {
    features: Vec<RoadFeature>,
}

impl Roads {
    /// Build a collection, rejecting duplicate ids.
    ///
    /// Ids are compared as written to the output, so `7` and `"7"` collide.
    pub fn new(features: Vec<RoadFeature>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(features.len());
        for feature in &features {
            let rendered = feature.id.to_string();
            if seen.contains(&rendered) {
                return Err(YodError::DuplicateId(rendered));
            }
            seen.insert(rendered);
        }
        Ok(Roads { features })
    }

    /// Read a GeoJSON FeatureCollection from disk
    pub fn from_file(path: &Path, source_epsg: i32, geo_core: &GeoCore) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let geojson: GeoJson = text.parse()?;
        let roads = Self::from_geojson(geojson, source_epsg, geo_core)?;
        info!("Loaded {} roads from {:?}", roads.len(), path);
        Ok(roads)
    }

    /// Convert a FeatureCollection, reprojecting into `geo_core` when needed
    pub fn from_geojson(geojson: GeoJson, source_epsg: i32, geo_core: &GeoCore) -> Result<Self> {
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            GeoJson::Feature(_) => return Err(YodError::NotAFeatureCollection("Feature".into())),
            GeoJson::Geometry(_) => return Err(YodError::NotAFeatureCollection("Geometry".into())),
        };

        let features = collection
            .features
            .into_iter()
            .enumerate()
            .map(|(index, feature)| {
                let mut road = Self::feature_to_road(index, feature)?;
                if source_epsg != geo_core.get_epsg() {
                    let geometry = geo_core.reproject_line(source_epsg, road.geometry)?;
                    road = RoadFeature::new(road.id, geometry).with_properties(road.properties);
                }
                Ok(road)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(features)
    }

    fn feature_to_road(index: usize, feature: Feature) -> Result<RoadFeature> {
        let mut properties = feature.properties.unwrap_or_default();

        let id = properties
            .remove(ID_FIELD)
            .as_ref()
            .and_then(RoadId::from_json)
            .or_else(|| match &feature.id {
                Some(Id::String(s)) => Some(RoadId::Text(s.clone())),
                Some(Id::Number(n)) => RoadId::from_json(&JsonValue::Number(n.clone())),
                None => None,
            })
            .ok_or_else(|| YodError::MissingId {
                index,
                field: ID_FIELD.to_string(),
            })?;

        // Recomputed from the geometry below
        properties.remove(LENGTH_FIELD);

        let unsupported = |kind: &str| YodError::UnsupportedGeometry {
            id: id.to_string(),
            kind: kind.to_string(),
        };

        let geometry = feature.geometry.ok_or_else(|| unsupported("null"))?;
        let line = match Geometry::<f64>::try_from(geometry)? {
            Geometry::LineString(line) => line,
            Geometry::MultiLineString(mut multi) if multi.0.len() == 1 => multi.0.remove(0),
            Geometry::MultiLineString(_) => return Err(unsupported("multi-part MultiLineString")),
            Geometry::Point(_) => return Err(unsupported("Point")),
            Geometry::MultiPoint(_) => return Err(unsupported("MultiPoint")),
            Geometry::Polygon(_) => return Err(unsupported("Polygon")),
            Geometry::MultiPolygon(_) => return Err(unsupported("MultiPolygon")),
            _ => return Err(unsupported("non-linear geometry")),
        };

        if line.0.len() < 2 {
            return Err(unsupported("LineString with fewer than two vertices"));
        }

        Ok(RoadFeature::new(id, line).with_properties(properties))
    }

    pub fn features(&self) -> &[RoadFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Extent of every road geometry, `None` for an empty collection
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .map(BoundingBox::from)
            .reduce(|a, b| a.union(&b))
    }

    /// Split into `(short, long)` by `length <= threshold`
    pub fn partition(&self, threshold: f64) -> (Vec<&RoadFeature>, Vec<&RoadFeature>) {
        self.features.iter().partition(|f| f.length <= threshold)
    }

    /// Shorten long roads from both ends and merge them back after the short ones.
    ///
    /// When a road is too short for the full margin, the margin is reduced so a
    /// centred residual of `min_residual` remains; roads no longer than
    /// `min_residual` are kept whole. The result always has one feature per
    /// input feature.
    pub fn normalize(&self, params: &NormalizeParams) -> Roads {
        let (short, long) = self.partition(params.length_threshold);
        debug!("Normalizing roads: {} short, {} long", short.len(), long.len());

        let mut clamped = 0usize;
        let shortened: Vec<RoadFeature> = long
            .into_iter()
            .map(|road| {
                let (margin, was_clamped) = effective_margin(road.length, params);
                if was_clamped {
                    clamped += 1;
                    warn!(
                        "Road {} ({:.1} units) is too short for a {} margin, trimming {:.3} instead",
                        road.id, road.length, params.shorten_margin, margin
                    );
                }
                match shorten_line_string(&road.geometry, margin) {
                    Some(geometry) => road.with_geometry(geometry),
                    None => road.clone(),
                }
            })
            .collect();

        if clamped > 0 {
            warn!("{} roads were shortened with a clamped margin", clamped);
        }

        let features = short
            .into_iter()
            .cloned()
            .chain(shortened)
            .collect::<Vec<_>>();
        Roads { features }
    }
}

/// Margin actually trimmed from each end of a line of `length`, and whether it
/// had to be reduced below `shorten_margin`
fn effective_margin(length: f64, params: &NormalizeParams) -> (f64, bool) {
    if length <= params.min_residual {
        return (0.0, params.shorten_margin > 0.0);
    }
    let max_margin = (length - params.min_residual) / 2.0;
    if params.shorten_margin > max_margin {
        (max_margin, true)
    } else {
        (params.shorten_margin, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn straight(id: &str, length: f64) -> RoadFeature {
        RoadFeature::new(id, LineString::from(vec![(0.0, 0.0), (length, 0.0)]))
    }

    #[test]
    fn test_road_feature_length() {
        let road = RoadFeature::new("a", LineString::from(vec![(0.0, 0.0), (3.0, 4.0)]));
        assert_eq!(road.length, 5.0);
    }

    #[test]
    fn test_roads_reject_duplicate_ids() {
        let err = Roads::new(vec![straight("a", 10.0), straight("a", 20.0)]).unwrap_err();
        assert!(matches!(err, YodError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn test_roads_reject_ids_rendered_alike() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]);
        let err = Roads::new(vec![
            RoadFeature::new(7i64, line.clone()),
            RoadFeature::new("7", line.clone()),
        ])
        .unwrap_err();
        assert!(matches!(err, YodError::DuplicateId(id) if id == "7"));

        assert!(Roads::new(vec![RoadFeature::new(7i64, line.clone()), RoadFeature::new("07", line)]).is_ok());
    }

    #[test]
    fn test_roads_bounding_box() {
        let roads = Roads::new(vec![
            RoadFeature::new("a", LineString::from(vec![(0.0, 0.0), (10.0, 5.0)])),
            RoadFeature::new("b", LineString::from(vec![(-20.0, 40.0), (3.0, 2.0)])),
        ])
        .unwrap();
        assert_eq!(roads.bounding_box(), Some(BoundingBox::new(-20.0, 0.0, 10.0, 40.0)));
        assert_eq!(Roads::default().bounding_box(), None);
    }

    #[test]
    fn test_normalize_preserves_ids_and_cardinality() {
        let roads = Roads::new(vec![
            straight("R1", 200.0),
            straight("R2", 100.0),
            straight("R3", 180.0),
            straight("R4", 500.0),
        ])
        .unwrap();
        let normalized = roads.normalize(&NormalizeParams::default());

        assert_eq!(normalized.len(), roads.len());
        let mut ids: Vec<_> = normalized.features().iter().map(|f| f.id.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["R1", "R2", "R3", "R4"]);
    }

    #[test]
    fn test_normalize_short_roads_untouched() {
        let roads = Roads::new(vec![straight("R2", 100.0), straight("R3", 180.0)]).unwrap();
        let normalized = roads.normalize(&NormalizeParams::default());
        assert_eq!(normalized, roads);
    }

    #[test]
    fn test_normalize_long_roads_trimmed() {
        let roads = Roads::new(vec![straight("R1", 200.0), straight("R2", 100.0)]).unwrap();
        let normalized = roads.normalize(&NormalizeParams::default());

        // short partition first, then the shortened long partition
        let r2 = &normalized.features()[0];
        let r1 = &normalized.features()[1];
        assert_eq!(r2.id, RoadId::from("R2"));
        assert_eq!(r1.id, RoadId::from("R1"));

        assert!((r1.geometry.euclidean_length() - 20.0).abs() < 1e-9);
        assert_eq!(r1.geometry.0[0], coord! { x: 90.0, y: 0.0 });
        assert_eq!(r1.geometry.0[1], coord! { x: 110.0, y: 0.0 });
        // original length is carried over
        assert_eq!(r1.length, 200.0);
    }

    #[test]
    fn test_normalize_does_not_mutate_input() {
        let roads = Roads::new(vec![straight("R1", 400.0)]).unwrap();
        let before = roads.clone();
        let _ = roads.normalize(&NormalizeParams::default());
        assert_eq!(roads, before);
    }

    #[test]
    fn test_normalize_clamps_degenerate_margin() {
        // threshold below twice the margin: a 150 unit road cannot lose 2 x 90
        let params = NormalizeParams {
            length_threshold: 100.0,
            shorten_margin: 90.0,
            min_residual: 1.0,
        };
        let roads = Roads::new(vec![straight("R5", 150.0)]).unwrap();
        let normalized = roads.normalize(&params);
        let r5 = &normalized.features()[0];
        assert!((r5.geometry.euclidean_length() - 1.0).abs() < 1e-9);
        assert!((r5.geometry.0[0].x - 74.5).abs() < 1e-9);
    }

    #[test]
    fn test_effective_margin() {
        let params = NormalizeParams::default();
        assert_eq!(effective_margin(200.0, &params), (90.0, false));
        assert_eq!(effective_margin(101.0, &params), (50.0, true));
        assert_eq!(effective_margin(0.5, &params), (0.0, true));
    }

    #[test]
    fn test_from_geojson() {
        let geojson: GeoJson = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "id": "R1", "length": 1, "source": "ORN" },
                  "geometry": { "type": "LineString", "coordinates": [[0, 0], [200, 0]] } },
                { "type": "Feature", "id": 7, "properties": {},
                  "geometry": { "type": "MultiLineString", "coordinates": [[[0, 0], [0, 50]]] } }
            ]
        }"#
        .parse()
        .unwrap();

        let roads = Roads::from_geojson(geojson, 3979, &GeoCore::new(3979)).unwrap();
        assert_eq!(roads.len(), 2);

        let r1 = &roads.features()[0];
        assert_eq!(r1.id, RoadId::from("R1"));
        assert_eq!(r1.length, 200.0);
        assert_eq!(r1.properties.get("source"), Some(&JsonValue::from("ORN")));
        assert!(r1.properties.get("length").is_none());

        let r7 = &roads.features()[1];
        assert_eq!(r7.id, RoadId::Int(7));
        assert_eq!(r7.length, 50.0);
    }

    #[test]
    fn test_from_geojson_missing_id() {
        let geojson: GeoJson = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "name": "x" },
                  "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 0]] } }
            ]
        }"#
        .parse()
        .unwrap();
        let err = Roads::from_geojson(geojson, 3979, &GeoCore::new(3979)).unwrap_err();
        assert!(matches!(err, YodError::MissingId { index: 0, .. }));
    }

    #[test]
    fn test_from_geojson_rejects_polygons() {
        let geojson: GeoJson = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "id": "P" },
                  "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] } }
            ]
        }"#
        .parse()
        .unwrap();
        let err = Roads::from_geojson(geojson, 3979, &GeoCore::new(3979)).unwrap_err();
        assert!(matches!(err, YodError::UnsupportedGeometry { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"id":"R1"},
                 "geometry":{"type":"LineString","coordinates":[[0,0],[10,0]]}}]}"#,
        )
        .unwrap();
        let roads = Roads::from_file(&path, 3979, &GeoCore::new(3979)).unwrap();
        assert_eq!(roads.len(), 1);
    }
}
