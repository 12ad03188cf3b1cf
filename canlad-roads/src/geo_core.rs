use geo::{LineString, Rect};

use crate::error::Result;
#[cfg(not(feature = "proj"))]
use crate::error::YodError;

/// CRS bookkeeping shared by the road loader and the raster catalog.
///
/// Every length, buffer and scale in the pipeline is expressed in the units of
/// `epsg`, so it must be a projected CRS (metres for the CanLaD products).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoCore {
    pub epsg: i32,
}

impl GeoCore {
    pub fn new(epsg: i32) -> Self {
        GeoCore { epsg }
    }

    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    /// Bring a road geometry from `from_epsg` into this CRS.
    ///
    /// Without the `proj` feature only the identity transform is available.
    pub fn reproject_line(&self, from_epsg: i32, line: LineString<f64>) -> Result<LineString<f64>> {
        if from_epsg == self.epsg {
            return Ok(line);
        }

        #[cfg(feature = "proj")]
        {
            use geo::{coord, MapCoords};

            let proj = proj::Proj::new_known_crs(
                &format!("EPSG:{}", from_epsg),
                &format!("EPSG:{}", self.epsg),
                None,
            )?;
            let projected = line.try_map_coords(|c| -> std::result::Result<_, proj::ProjError> {
                let (x, y) = proj.convert((c.x, c.y))?;
                Ok(coord! { x: x, y: y })
            })?;
            Ok(projected)
        }

        #[cfg(not(feature = "proj"))]
        {
            Err(YodError::CrsMismatch {
                from: from_epsg,
                to: self.epsg,
            })
        }
    }
}

/// Axis-aligned extent in CRS units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Grow the box by `distance` on every side
    pub fn expand(&self, distance: f64) -> Self {
        BoundingBox::new(
            self.min_x - distance,
            self.min_y - distance,
            self.max_x + distance,
            self.max_y + distance,
        )
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Smallest box holding both boxes
    pub fn union(&self, other: &BoundingBox) -> Self {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_expand() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 5.0).expand(30.0);
        assert_eq!(bbox.min_x, -30.0);
        assert_eq!(bbox.max_y, 35.0);
    }

    #[test]
    fn test_bounding_box_intersects() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&BoundingBox::new(10.0, 10.0, 20.0, 20.0)));
        assert!(!a.intersects(&BoundingBox::new(10.5, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn test_bounding_box_union() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, -5.0, 20.0, 8.0);
        assert_eq!(a.union(&b), BoundingBox::new(0.0, -5.0, 20.0, 10.0));
    }

    #[test]
    fn test_bounding_box_from_rect() {
        let rect = Rect::new((0.0, 1.0), (10.0, 5.0));
        assert_eq!(BoundingBox::from(rect), BoundingBox::new(0.0, 1.0, 10.0, 5.0));
    }

    #[test]
    fn test_reproject_line_identity() {
        let gc = GeoCore::new(3979);
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        let out = gc.reproject_line(3979, line.clone()).unwrap();
        assert_eq!(out, line);
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn test_reproject_line_without_proj() {
        let gc = GeoCore::new(3979);
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(matches!(
            gc.reproject_line(4326, line),
            Err(YodError::CrsMismatch { from: 4326, to: 3979 })
        ));
    }
}
