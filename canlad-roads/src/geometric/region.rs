use geo::{BoundingRect, Coord, EuclideanDistance, LineString, Point};

use crate::geo_core::BoundingBox;

/// Isotropic buffer of a road line.
///
/// The polygon is never built: a location is inside the region when its
/// distance to the line is at most `radius`, which is exactly the set a round
/// buffer covers.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedRegion {
    line: LineString<f64>,
    radius: f64,
    bbox: BoundingBox,
}

/// Buffer `line` by `radius` CRS units
pub fn buffer_region(line: &LineString<f64>, radius: f64) -> BufferedRegion {
    let radius = radius.max(0.0);
    let bbox = line
        .bounding_rect()
        .map(BoundingBox::from)
        // an empty line buffers to an empty region
        .unwrap_or(BoundingBox::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN))
        .expand(radius);

    BufferedRegion {
        line: line.clone(),
        radius,
        bbox,
    }
}

impl BufferedRegion {
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn is_empty(&self) -> bool {
        self.line.0.is_empty()
    }

    pub fn contains(&self, c: Coord<f64>) -> bool {
        if self.is_empty()
            || c.x < self.bbox.min_x
            || c.x > self.bbox.max_x
            || c.y < self.bbox.min_y
            || c.y > self.bbox.max_y
        {
            return false;
        }
        Point::from(c).euclidean_distance(&self.line) <= self.radius
    }
}
