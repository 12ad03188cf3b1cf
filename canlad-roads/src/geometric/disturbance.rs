use geo::{coord, Coord};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::{Result, YodError};
use crate::geo_core::BoundingBox;
use crate::geometric::region::BufferedRegion;

/// GeoTIFF georeferencing tags
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// Stored value of masked pixels; no disturbance year is 0
const MASKED: u16 = 0;

/// Raster source queried by region and resolution.
///
/// Implemented by [`DisturbanceRaster`]; tests substitute fakes returning
/// fixed pixel distributions.
pub trait RasterQuery: Send + Sync {
    /// Property fed by this raster, e.g. `yod_canlad_65`
    fn name(&self) -> &str;

    /// Valid pixel values covered by `region`, sampled every `scale` units.
    /// No-data and masked pixels are left out; an empty vector is not an error.
    fn sample(&self, region: &BufferedRegion, scale: f64) -> Result<Vec<f64>>;
}

/// North-up affine transform (no rotation terms)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows run southwards from `origin_y`
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// From a GDAL-style `[x0, dx, rx, y0, ry, dy]` array
    pub fn from_gdal(gt: &[f64; 6], path: &Path) -> Result<Self> {
        if gt[2] != 0.0 || gt[4] != 0.0 || gt[5] >= 0.0 {
            return Err(YodError::raster(
                path,
                format!("only north-up rasters are supported, got {:?}", gt),
            ));
        }
        Ok(GeoTransform::new(gt[0], gt[3], gt[1], -gt[5]))
    }
}

/// Block of pixels, in columns and rows from the raster's top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    /// Every pixel of a `width` x `height` raster
    pub fn full((width, height): (usize, usize)) -> Self {
        PixelWindow {
            col: 0,
            row: 0,
            width,
            height,
        }
    }

    /// Pixels of a `width` x `height` raster that any point of `area` falls in,
    /// clipped to the raster
    pub fn covering(
        area: &BoundingBox,
        transform: &GeoTransform,
        (width, height): (usize, usize),
    ) -> Self {
        let t = transform;
        let clip = |v: f64, max: usize| -> usize {
            if v.is_nan() {
                0
            } else {
                v.clamp(0.0, max as f64) as usize
            }
        };

        let col0 = clip(((area.min_x - t.origin_x) / t.pixel_width).floor(), width);
        let col1 = clip(((area.max_x - t.origin_x) / t.pixel_width).floor() + 1.0, width);
        let row0 = clip(((t.origin_y - area.max_y) / t.pixel_height).floor(), height);
        let row1 = clip(((t.origin_y - area.min_y) / t.pixel_height).floor() + 1.0, height);

        PixelWindow {
            col: col0,
            row: row0,
            width: col1.saturating_sub(col0),
            height: row1.saturating_sub(row0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.col && row >= self.row && col < self.col + self.width && row < self.row + self.height
    }

    fn offset(&self, col: usize, row: usize) -> usize {
        (row - self.row) * self.width + (col - self.col)
    }
}

/// Window of a disturbance-year band held in memory.
///
/// Only the pixels of [`PixelWindow`] are kept, in their native 16-bit form.
/// Pixels equal to `nodata` or outside the layer's year range are masked when
/// the raster is built.
#[derive(Debug, Clone)]
pub struct DisturbanceRaster {
    name: String,
    /// Transform of the whole raster, not of the window
    transform: GeoTransform,
    window: PixelWindow,
    data: Vec<u16>,
}

impl DisturbanceRaster {
    /// Raster whose window is the whole `width` x `height` grid
    pub fn new(
        name: &str,
        (width, height): (usize, usize),
        transform: GeoTransform,
        data: Vec<u16>,
        nodata: Option<u16>,
        years: (u16, u16),
    ) -> Result<Self> {
        Self::from_window(
            name,
            transform,
            PixelWindow::full((width, height)),
            data,
            nodata,
            years,
        )
    }

    fn from_window(
        name: &str,
        transform: GeoTransform,
        window: PixelWindow,
        mut data: Vec<u16>,
        nodata: Option<u16>,
        years: (u16, u16),
    ) -> Result<Self> {
        if data.len() != window.width * window.height {
            return Err(YodError::InvalidParameter(format!(
                "raster `{}`: {} values for a {}x{} window",
                name,
                data.len(),
                window.width,
                window.height
            )));
        }
        if !(transform.pixel_width > 0.0 && transform.pixel_height > 0.0) {
            return Err(YodError::InvalidParameter(format!(
                "raster `{}`: non-positive pixel size {:?}",
                name, transform
            )));
        }
        if years.0 == MASKED || years.0 > years.1 {
            return Err(YodError::InvalidParameter(format!(
                "raster `{}`: invalid year range {:?}",
                name, years
            )));
        }

        for value in data.iter_mut() {
            if Some(*value) == nodata || *value < years.0 || *value > years.1 {
                *value = MASKED;
            }
        }

        Ok(DisturbanceRaster {
            name: name.to_string(),
            transform,
            window,
            data,
        })
    }

    /// Read the part of `path` covering `area` with the reader enabled at
    /// build time
    pub fn open(
        path: &Path,
        name: &str,
        band: usize,
        years: (u16, u16),
        area: &BoundingBox,
    ) -> Result<Self> {
        #[cfg(feature = "gdal")]
        {
            Self::from_gdal(path, name, band, years, area)
        }

        #[cfg(not(feature = "gdal"))]
        {
            Self::from_geotiff(path, name, band, years, area)
        }
    }

    /// Decode the part of a GeoTIFF covering `area` with the pure-Rust `tiff`
    /// reader, one strip or tile at a time.
    ///
    /// Georeferencing comes from the ModelPixelScale and ModelTiepoint tags,
    /// the no-data value from the GDAL_NODATA tag.
    pub fn from_geotiff(
        path: &Path,
        name: &str,
        band: usize,
        years: (u16, u16),
        area: &BoundingBox,
    ) -> Result<Self> {
        let file = File::open(path)?;
        // offset tables of national mosaics exceed the default tag size limit
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))?;
        let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(YodError::raster(path, "incomplete GeoTIFF georeferencing tags"));
        }
        // tiepoint: raster (i, j, k) -> model (x, y, z)
        let transform = GeoTransform::new(
            tiepoint[3] - tiepoint[0] * scale[0],
            tiepoint[4] + tiepoint[1] * scale[1],
            scale[0],
            scale[1],
        );

        let nodata = match decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? {
            Some(value) => value
                .into_string()?
                .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .parse::<f64>()
                .ok()
                .and_then(sample_to_u16),
            None => None,
        };

        let planar = decoder
            .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
            .unwrap_or(1);
        if planar != 1 && band > 1 {
            return Err(YodError::raster(path, "band-separate (planar) layouts are not supported"));
        }

        let window = PixelWindow::covering(area, &transform, (width, height));
        let data = read_window(&mut decoder, path, width, &window, band)?;

        debug!(
            "Read {:?}: {:?} of {}x{} pixels of {} units, nodata {:?}",
            path, window, width, height, transform.pixel_width, nodata
        );

        Self::from_window(name, transform, window, data, nodata, years)
    }

    /// Read the part of `path` covering `area` through GDAL
    #[cfg(feature = "gdal")]
    pub fn from_gdal(
        path: &Path,
        name: &str,
        band: usize,
        years: (u16, u16),
        area: &BoundingBox,
    ) -> Result<Self> {
        let dataset = gdal::Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let transform = GeoTransform::from_gdal(&dataset.geo_transform()?, path)?;

        let rasterband = dataset.rasterband(band)?;
        let nodata = rasterband.no_data_value().and_then(sample_to_u16);

        let window = PixelWindow::covering(area, &transform, (width, height));
        let data = if window.is_empty() {
            Vec::new()
        } else {
            let size = (window.width, window.height);
            let buffer = rasterband.read_as::<u16>(
                (window.col as isize, window.row as isize),
                size,
                size,
                None,
            )?;
            buffer.into_shape_and_vec().1
        };

        debug!(
            "Read {:?} through GDAL: {:?} of {}x{} pixels, nodata {:?}",
            path, window, width, height, nodata
        );

        Self::from_window(name, transform, window, data, nodata, years)
    }

    /// Extent of the pixels held in memory
    pub fn extent(&self) -> BoundingBox {
        let t = &self.transform;
        let w = &self.window;
        BoundingBox::new(
            t.origin_x + w.col as f64 * t.pixel_width,
            t.origin_y - (w.row + w.height) as f64 * t.pixel_height,
            t.origin_x + (w.col + w.width) as f64 * t.pixel_width,
            t.origin_y - w.row as f64 * t.pixel_height,
        )
    }

    /// Valid value of the pixel containing `c`
    pub fn value_at(&self, c: Coord<f64>) -> Option<f64> {
        let t = &self.transform;
        let col = ((c.x - t.origin_x) / t.pixel_width).floor();
        let row = ((t.origin_y - c.y) / t.pixel_height).floor();
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if !self.window.contains(col, row) {
            return None;
        }
        let value = self.data[self.window.offset(col, row)];
        (value != MASKED).then_some(f64::from(value))
    }

    /// Number of valid pixels, for logging
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| **v != MASKED).count()
    }
}

impl RasterQuery for DisturbanceRaster {
    fn name(&self) -> &str {
        &self.name
    }

    /// Sample points sit on a `scale` grid anchored at the raster origin and
    /// take the value of the pixel they fall in (nearest neighbour); a point
    /// counts when it lies inside the region.
    fn sample(&self, region: &BufferedRegion, scale: f64) -> Result<Vec<f64>> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(YodError::InvalidParameter(format!("scale must be positive, got {}", scale)));
        }
        let extent = self.extent();
        if region.is_empty() || self.window.is_empty() || !region.bbox().intersects(&extent) {
            return Ok(Vec::new());
        }

        let bbox = region.bbox();
        let min_x = bbox.min_x.max(extent.min_x);
        let max_x = bbox.max_x.min(extent.max_x);
        let min_y = bbox.min_y.max(extent.min_y);
        let max_y = bbox.max_y.min(extent.max_y);

        let t = &self.transform;
        let i0 = ((min_x - t.origin_x) / scale - 0.5).ceil() as i64;
        let i1 = ((max_x - t.origin_x) / scale - 0.5).floor() as i64;
        let j0 = ((t.origin_y - max_y) / scale - 0.5).ceil() as i64;
        let j1 = ((t.origin_y - min_y) / scale - 0.5).floor() as i64;

        let mut values = Vec::new();
        for j in j0..=j1 {
            let y = t.origin_y - (j as f64 + 0.5) * scale;
            for i in i0..=i1 {
                let c = coord! { x: t.origin_x + (i as f64 + 0.5) * scale, y: y };
                if !region.contains(c) {
                    continue;
                }
                if let Some(value) = self.value_at(c) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }
}

/// Decode only the strips or tiles overlapping `window` and copy 1-based
/// `band` of their pixels out
fn read_window<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
    width: usize,
    window: &PixelWindow,
    band: usize,
) -> Result<Vec<u16>> {
    let mut data = vec![MASKED; window.width * window.height];
    if window.is_empty() {
        return Ok(data);
    }

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
    if chunk_width == 0 || chunk_height == 0 {
        return Err(YodError::raster(path, "empty strip or tile size"));
    }
    let chunks_across = match decoder.get_chunk_type() {
        ChunkType::Strip => 1,
        ChunkType::Tile => width.div_ceil(chunk_width),
    };

    let last_row = window.row + window.height - 1;
    let last_col = window.col + window.width - 1;
    for chunk_row in window.row / chunk_height..=last_row / chunk_height {
        for chunk_col in window.col / chunk_width..=last_col / chunk_width {
            let index = u32::try_from(chunk_row * chunks_across + chunk_col)
                .map_err(|_| YodError::raster(path, "too many strips or tiles"))?;
            let (data_width, data_height) = decoder.chunk_data_dimensions(index);
            let (data_width, data_height) = (data_width as usize, data_height as usize);
            let samples = decoding_result_to_u16(decoder.read_chunk(index)?);

            let pixels = data_width * data_height;
            let per_pixel = if pixels == 0 { 0 } else { samples.len() / pixels };
            if band == 0 || band > per_pixel {
                return Err(YodError::raster(path, format!("band {} not found", band)));
            }

            for r in 0..data_height {
                let row = chunk_row * chunk_height + r;
                for c in 0..data_width {
                    let col = chunk_col * chunk_width + c;
                    if window.contains(col, row) {
                        data[window.offset(col, row)] = samples[(r * data_width + c) * per_pixel + band - 1];
                    }
                }
            }
        }
    }
    Ok(data)
}

/// Integral values that fit in 16 bits; anything else can never be a year
fn sample_to_u16(value: f64) -> Option<u16> {
    (value.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&value)).then_some(value as u16)
}

fn decoding_result_to_u16(result: DecodingResult) -> Vec<u16> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(u16::from).collect(),
        DecodingResult::U16(v) => v,
        DecodingResult::U32(v) => v.into_iter().map(|x| u16::try_from(x).unwrap_or(MASKED)).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| u16::try_from(x).unwrap_or(MASKED)).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|x| u16::try_from(x).unwrap_or(MASKED)).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|x| u16::try_from(x).unwrap_or(MASKED)).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| u16::try_from(x).unwrap_or(MASKED)).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| u16::try_from(x).unwrap_or(MASKED)).collect(),
        DecodingResult::F32(v) => v
            .into_iter()
            .map(|x| sample_to_u16(f64::from(x)).unwrap_or(MASKED))
            .collect(),
        DecodingResult::F64(v) => v
            .into_iter()
            .map(|x| sample_to_u16(x).unwrap_or(MASKED))
            .collect(),
    }
}
