use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::info;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

use crate::collect::global_variables::{
    get_output_folder, FILE_NAME_PREFIX, ID_FIELD, LENGTH_FIELD, SELECTORS,
};
use crate::commons::basic_functions::format_cell;
use crate::error::{Result, YodError};
use crate::geometric::zonal::AttributedRoad;

/// Tabular output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    /// JSON array of row objects
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unknown export format `{}` (expected csv or json)", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Where and how the table is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destination {
    pub folder: PathBuf,
    pub file_name_prefix: String,
    pub format: ExportFormat,
    /// Exported columns, in order
    pub selectors: Vec<String>,
}

impl Default for Destination {
    fn default() -> Self {
        Destination {
            folder: get_output_folder(),
            file_name_prefix: FILE_NAME_PREFIX.to_string(),
            format: ExportFormat::default(),
            selectors: SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Destination {
    pub fn path(&self) -> PathBuf {
        self.folder
            .join(format!("{}.{}", self.file_name_prefix, self.format.extension()))
    }
}

/// Ordered column names of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<String>,
}

/// One output row; `Null` marks an absent statistic
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<JsonValue>);

impl Row {
    pub fn get(&self, schema: &Schema, column: &str) -> Option<&JsonValue> {
        schema
            .columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.0.get(i))
    }
}

fn statistic_to_json(value: Option<f64>) -> JsonValue {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => JsonValue::from(v as i64),
        Some(v) => serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        None => JsonValue::Null,
    }
}

/// Project attributed roads onto `selectors`.
///
/// A selector may name `id`, `length`, a computed statistic or a source
/// attribute. A selector matching none of these is an error.
pub fn select_columns(attributed: &[AttributedRoad], selectors: &[String]) -> Result<(Schema, Vec<Row>)> {
    for selector in selectors {
        let known = selector == ID_FIELD
            || selector == LENGTH_FIELD
            || attributed.iter().any(|a| {
                a.get(selector).is_some() || a.road.properties.contains_key(selector.as_str())
            });
        // an empty table cannot prove a column wrong
        if !known && !attributed.is_empty() {
            return Err(YodError::UnknownColumn(selector.clone()));
        }
    }

    let rows = attributed
        .iter()
        .map(|a| {
            Row(selectors
                .iter()
                .map(|selector| match selector.as_str() {
                    ID_FIELD => a.road.id.to_json(),
                    LENGTH_FIELD => statistic_to_json(Some(a.road.length)),
                    name => match a.get(name) {
                        Some(value) => statistic_to_json(value),
                        None => a.road.properties.get(name).cloned().unwrap_or(JsonValue::Null),
                    },
                })
                .collect())
        })
        .collect();

    Ok((
        Schema {
            columns: selectors.to_vec(),
        },
        rows,
    ))
}

/// Output sink for the projected table
pub trait ExportSink {
    /// Write every row or nothing; returns the location written
    fn export(&self, schema: &Schema, rows: &[Row], destination: &Destination) -> Result<PathBuf>;
}

/// Writes CSV or JSON files, staged in the destination folder and renamed
/// into place once complete
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSink;

impl ExportSink for FileSink {
    fn export(&self, schema: &Schema, rows: &[Row], destination: &Destination) -> Result<PathBuf> {
        let path = destination.path();
        write_atomically(&path, |file| match destination.format {
            ExportFormat::Csv => write_csv(file, schema, rows),
            ExportFormat::Json => write_json(file, schema, rows),
        })?;
        info!("Exported {} rows to {:?}", rows.len(), path);
        Ok(path)
    }
}

fn write_csv<W: Write>(writer: W, schema: &Schema, rows: &[Row]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&schema.columns)?;
    for row in rows {
        csv_writer.write_record(row.0.iter().map(csv_cell))?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn csv_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => format_cell(n.as_f64()),
        other => other.to_string(),
    }
}

/// Serializes a row as an object keeping the schema's column order
struct RowObject<'a> {
    schema: &'a Schema,
    row: &'a Row,
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.columns.len()))?;
        for (column, value) in self.schema.columns.iter().zip(&self.row.0) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct Table<'a> {
    schema: &'a Schema,
    rows: &'a [Row],
}

impl Serialize for Table<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.rows {
            seq.serialize_element(&RowObject {
                schema: self.schema,
                row,
            })?;
        }
        seq.end()
    }
}

fn write_json<W: Write>(writer: W, schema: &Schema, rows: &[Row]) -> Result<()> {
    serde_json::to_writer_pretty(writer, &Table { schema, rows })?;
    Ok(())
}

/// Stage the output next to `path` and rename it over `path` only when `write`
/// succeeds, so a failed run never leaves a truncated file behind
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let folder = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&folder)?;

    let mut staged = NamedTempFile::new_in(&folder)?;
    write(&mut staged)?;
    staged.as_file_mut().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Full attributed collection: geometry, source attributes, id, length and
/// statistics
pub fn to_feature_collection(attributed: &[AttributedRoad]) -> FeatureCollection {
    let features = attributed
        .iter()
        .map(|a| {
            let mut properties: JsonObject = a.road.properties.clone();
            properties.insert(ID_FIELD.to_string(), a.road.id.to_json());
            properties.insert(LENGTH_FIELD.to_string(), JsonValue::from(a.road.length));
            for (name, value) in &a.attributes {
                properties.insert(name.clone(), statistic_to_json(*value));
            }
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&a.road.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Write the attributed collection as GeoJSON
pub fn write_geojson(attributed: &[AttributedRoad], path: &Path) -> Result<()> {
    let geojson = GeoJson::FeatureCollection(to_feature_collection(attributed));
    write_atomically(path, |file| {
        file.write_all(geojson.to_string().as_bytes())?;
        Ok(())
    })?;
    info!("Attributed roads saved to: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::road::RoadFeature;
    use geo::LineString;

    fn attributed(id: &str, yod_65: Option<f64>, yod_85: Option<f64>) -> AttributedRoad {
        let mut road = RoadFeature::new(id, LineString::from(vec![(0.0, 0.0), (200.0, 0.0)]));
        road.properties
            .insert("surface".to_string(), JsonValue::from("gravel"));
        AttributedRoad {
            road,
            attributes: vec![
                ("yod_canlad_65".to_string(), yod_65),
                ("yod_canlad_85".to_string(), yod_85),
            ],
        }
    }

    fn selectors() -> Vec<String> {
        Destination::default().selectors
    }

    #[test]
    fn test_default_selectors() {
        assert_eq!(selectors(), vec!["id", "yod_canlad_65", "yod_canlad_85"]);
    }

    #[test]
    fn test_select_columns() {
        let data = vec![
            attributed("R1", Some(1978.0), None),
            attributed("R2", None, None),
        ];
        let (schema, rows) = select_columns(&data, &selectors()).unwrap();
        assert_eq!(schema.columns, selectors());
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            Row(vec![JsonValue::from("R1"), JsonValue::from(1978), JsonValue::Null])
        );
        assert_eq!(rows[1].get(&schema, "yod_canlad_65"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_select_source_attribute_and_length() {
        let data = vec![attributed("R1", Some(1978.0), None)];
        let columns = vec!["surface".to_string(), "length".to_string()];
        let (_, rows) = select_columns(&data, &columns).unwrap();
        assert_eq!(rows[0], Row(vec![JsonValue::from("gravel"), JsonValue::from(200)]));
    }

    #[test]
    fn test_select_unknown_column() {
        let data = vec![attributed("R1", None, None)];
        let err = select_columns(&data, &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, YodError::UnknownColumn(c) if c == "nope"));
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let destination = Destination {
            folder: dir.path().join("logging_roads"),
            ..Destination::default()
        };
        let data = vec![
            attributed("R1", Some(1978.0), None),
            attributed("R2", None, Some(1999.0)),
        ];
        let (schema, rows) = select_columns(&data, &destination.selectors).unwrap();
        let path = FileSink.export(&schema, &rows, &destination).unwrap();

        assert!(path.ends_with("canlad_years_unpaved_roads.csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "id,yod_canlad_65,yod_canlad_85\nR1,1978,\nR2,,1999\n"
        );
    }

    #[test]
    fn test_json_export_keeps_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let destination = Destination {
            folder: dir.path().to_path_buf(),
            format: ExportFormat::Json,
            selectors: vec![
                "yod_canlad_85".to_string(),
                "id".to_string(),
                "yod_canlad_65".to_string(),
            ],
            ..Destination::default()
        };
        let data = vec![attributed("R1", Some(1978.0), None)];
        let (schema, rows) = select_columns(&data, &destination.selectors).unwrap();
        let path = FileSink.export(&schema, &rows, &destination).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let first_85 = text.find("yod_canlad_85").unwrap();
        let first_id = text.find("\"id\"").unwrap();
        assert!(first_85 < first_id);

        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["id"], JsonValue::from("R1"));
        assert_eq!(parsed[0]["yod_canlad_65"], JsonValue::from(1978));
        assert!(parsed[0]["yod_canlad_85"].is_null());
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let res = write_atomically(&path, |file| {
            file.write_all(b"id,yod")?;
            Err(YodError::raster("canlad.tif", "service unavailable"))
        });
        assert!(res.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.geojson");
        write_geojson(&[attributed("R1", Some(1978.0), None)], &path).unwrap();

        let geojson: GeoJson = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        let fc = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => panic!("expected a FeatureCollection"),
        };
        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["id"], JsonValue::from("R1"));
        assert_eq!(props["yod_canlad_65"], JsonValue::from(1978));
        assert!(props["yod_canlad_85"].is_null());
        assert_eq!(props["surface"], JsonValue::from("gravel"));
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert_eq!("json".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
