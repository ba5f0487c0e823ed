//! Physical measurements and timestamp formatting shared by the exporters.

use crate::model::{Annotation, Geometry, Point, Rect, Timestamp};
use crate::pyramid::ImagePlane;

/// Size and position of one annotation.
///
/// Areas and lengths are in microns when the slide has a resolution, the centroid
/// is always in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    pub area_um2: Option<f64>,
    pub perimeter_um: Option<f64>,
    pub centroid: Option<Point>,
}

impl Measurements {
    /// Measure `annotation` on `plane`.
    pub fn of(annotation: &Annotation, plane: &ImagePlane) -> Self {
        let geometry = &annotation.geometry;
        let centroid = geometry.centroid();
        let Some((mpp_x, mpp_y)) = resolution(plane) else {
            return Self {
                area_um2: None,
                perimeter_um: None,
                centroid,
            };
        };
        let physical = scaled(geometry, mpp_x, mpp_y);
        Self {
            area_um2: Some(physical.area()),
            perimeter_um: Some(physical.perimeter()),
            centroid,
        }
    }
}

/// Microns per pixel along both axes, when known and usable.
fn resolution(plane: &ImagePlane) -> Option<(f64, f64)> {
    let mpp_x = plane.mpp_x?;
    let mpp_y = plane.mpp_y.unwrap_or(mpp_x);
    (mpp_x.is_finite() && mpp_x > 0.0 && mpp_y.is_finite() && mpp_y > 0.0).then_some((mpp_x, mpp_y))
}

/// Same shape with coordinates multiplied per axis.
fn scaled(geometry: &Geometry, sx: f64, sy: f64) -> Geometry {
    let scale = |p: &Point| Point::new(p.x * sx, p.y * sy);
    match geometry {
        Geometry::Point(p) => Geometry::Point(scale(p)),
        Geometry::Rectangle(r) => Geometry::Rectangle(Rect::new(r.x * sx, r.y * sy, r.width * sx, r.height * sy)),
        Geometry::Polygon(rings) => Geometry::Polygon(
            rings
                .iter()
                .map(|ring| ring.iter().map(scale).collect())
                .collect(),
        ),
    }
}

/// ISO 8601 UTC rendering of a millisecond timestamp, e.g. `2023-11-14T22:13:20.000Z`.
pub fn format_timestamp(millis: Timestamp) -> String {
    let secs = millis / 1000;
    let (year, month, day) = civil_from_days(secs / 86_400);
    let rem = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
        millis % 1000
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}
