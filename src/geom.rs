pub mod arc;
pub mod bboxes;
pub mod containment;
pub mod loops;
pub mod model;
pub mod point;
pub mod segment;
pub mod vector;

/// Geometric precision
pub const EPS: f64 = 1e-10;

/// Approximate equality for scalar geometric quantities.
pub trait IsClose {
    fn is_close(&self, other: f64) -> bool;
}

impl IsClose for f64 {
    fn is_close(&self, other: f64) -> bool {
        (self - other).abs() < EPS
    }
}
