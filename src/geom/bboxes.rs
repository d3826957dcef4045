use crate::geom::point::Point;

/// Returns the (min, max) corners of the box holding all points `pts`.
///
/// Returns `None` for an empty slice.
pub fn bounding_box(pts: &[Point]) -> Option<(Point, Point)> {
    let first = pts.first()?;
    let mut pmin = *first;
    let mut pmax = *first;
    for p in pts.iter().skip(1) {
        pmin.x = pmin.x.min(p.x);
        pmin.y = pmin.y.min(p.y);
        pmax.x = pmax.x.max(p.x);
        pmax.y = pmax.y.max(p.y);
    }
    Some((pmin, pmax))
}

/// Checks whether a point is inside (or within `eps` of) a bounding box.
pub fn is_point_inside_bbox(ptest: Point, pmin: Point, pmax: Point, eps: f64) -> bool {
    ptest.x >= pmin.x - eps
        && ptest.x <= pmax.x + eps
        && ptest.y >= pmin.y - eps
        && ptest.y <= pmax.y + eps
}
