use geo::{Coord, EuclideanLength, Line, LineString};

/// Portion of `line` between arc-length positions `start` and `end`.
///
/// Vertices strictly inside the range are kept; the two ends are interpolated
/// on their segments. Positions are clamped to `[0, length]`. Returns `None`
/// when the clamped range is empty or the line has fewer than two vertices.
pub fn line_substring(line: &LineString<f64>, start: f64, end: f64) -> Option<LineString<f64>> {
    if line.0.len() < 2 {
        return None;
    }
    let total = line.euclidean_length();
    let start = start.clamp(0.0, total);
    let end = end.clamp(0.0, total);
    if start >= end {
        return None;
    }

    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut travelled = 0.0;
    let mut reached_end = false;

    for segment in line.lines() {
        let seg_len = segment.euclidean_length();
        let seg_start = travelled;
        let seg_end = travelled + seg_len;
        travelled = seg_end;

        if seg_len == 0.0 || seg_end < start {
            continue;
        }

        if coords.is_empty() {
            coords.push(interpolate(&segment, start - seg_start, seg_len));
        }

        if seg_end >= end {
            coords.push(interpolate(&segment, end - seg_start, seg_len));
            reached_end = true;
            break;
        }

        // interior vertex, strictly past the start
        if seg_end > start {
            coords.push(segment.end);
        }
    }

    // rounding in the running total can leave `end` just past the last vertex
    if !reached_end {
        coords.extend(line.0.last().copied());
    }

    coords.dedup();
    if coords.len() < 2 {
        return None;
    }
    Some(LineString::new(coords))
}

/// Remove `margin` units of arc length from both ends of `line`
pub fn shorten_line_string(line: &LineString<f64>, margin: f64) -> Option<LineString<f64>> {
    let total = line.euclidean_length();
    line_substring(line, margin, total - margin)
}

/// Point `distance` units along a segment of length `seg_len`
fn interpolate(segment: &Line<f64>, distance: f64, seg_len: f64) -> Coord<f64> {
    if distance <= 0.0 {
        return segment.start;
    }
    if distance >= seg_len {
        return segment.end;
    }
    let delta = segment.delta();
    segment.start
        + Coord {
            x: delta.x * distance / seg_len,
            y: delta.y * distance / seg_len,
        }
}
