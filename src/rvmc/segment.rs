//! Boundary segments of RVMC shapes.

use std::f64::consts::{FRAC_PI_2, TAU};

use enum_dispatch::enum_dispatch;
use glam::{DAffine2, DVec2};

use super::LayerBox;

/// Common behavior of shape boundary pieces
#[enum_dispatch]
pub trait Segment {
    fn start(&self) -> DVec2;

    fn end(&self) -> DVec2;

    /// Box enclosing every point of the segment
    fn outer_box(&self) -> LayerBox;

    /// The segment after an affine map with uniform scale
    fn transformed(&self, transform: &DAffine2) -> ShapeSegment;
}

#[enum_dispatch(Segment)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeSegment {
    Line(Line),
    Arc(Arc),
}

// ============================================================================
// Line
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub start: DVec2,
    pub end: DVec2,
}

impl Line {
    pub fn new(start: DVec2, end: DVec2) -> Line {
        Line { start, end }
    }
}

impl Segment for Line {
    fn start(&self) -> DVec2 {
        self.start
    }

    fn end(&self) -> DVec2 {
        self.end
    }

    fn outer_box(&self) -> LayerBox {
        LayerBox::from_point(self.start).include_point(self.end)
    }

    fn transformed(&self, transform: &DAffine2) -> ShapeSegment {
        ShapeSegment::Line(Line {
            start: transform.transform_point2(self.start),
            end: transform.transform_point2(self.end),
        })
    }
}

// ============================================================================
// Arc
// ============================================================================

/// Circular arc; `start == end` is a full circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub start: DVec2,
    pub end: DVec2,
    pub center: DVec2,
    pub clockwise: bool,
}

impl Arc {
    pub fn new(start: DVec2, end: DVec2, center: DVec2, clockwise: bool) -> Arc {
        Arc {
            start,
            end,
            center,
            clockwise,
        }
    }

    pub fn radius(&self) -> f64 {
        self.start.distance(self.center)
    }

    pub fn start_angle(&self) -> f64 {
        let v = self.start - self.center;
        v.y.atan2(v.x)
    }

    /// Swept angle in radians, always positive; the direction comes from
    /// `clockwise`. A closed arc sweeps a full turn.
    pub fn sweep(&self) -> f64 {
        let (from, to) = (self.start - self.center, self.end - self.center);
        let ccw = (to.y.atan2(to.x) - from.y.atan2(from.x)).rem_euclid(TAU);
        let sweep = if self.clockwise { (TAU - ccw).rem_euclid(TAU) } else { ccw };
        if sweep <= f64::EPSILON { TAU } else { sweep }
    }

    pub fn length(&self) -> f64 {
        self.radius() * self.sweep()
    }

    /// Point at `t` in `[0, 1]` along the sweep.
    pub fn point_at(&self, t: f64) -> DVec2 {
        let direction = if self.clockwise { -1.0 } else { 1.0 };
        let angle = self.start_angle() + direction * self.sweep() * t;
        self.center + DVec2::from_angle(angle) * self.radius()
    }
}

impl Segment for Arc {
    fn start(&self) -> DVec2 {
        self.start
    }

    fn end(&self) -> DVec2 {
        self.end
    }

    fn outer_box(&self) -> LayerBox {
        let mut bounds = LayerBox::from_point(self.start).include_point(self.end);
        let radius = self.radius();
        let sweep = self.sweep();
        let start = self.start_angle();
        // Axis extremes reached inside the sweep
        for quadrant in 0..4 {
            let angle = f64::from(quadrant) * FRAC_PI_2;
            let travelled = if self.clockwise {
                (start - angle).rem_euclid(TAU)
            } else {
                (angle - start).rem_euclid(TAU)
            };
            if travelled <= sweep {
                bounds = bounds.include_point(self.center + DVec2::from_angle(angle) * radius);
            }
        }
        bounds
    }

    fn transformed(&self, transform: &DAffine2) -> ShapeSegment {
        let mirrored = transform.matrix2.determinant() < 0.0;
        ShapeSegment::Arc(Arc {
            start: transform.transform_point2(self.start),
            end: transform.transform_point2(self.end),
            center: transform.transform_point2(self.center),
            clockwise: self.clockwise != mirrored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::dvec2;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn quarter_arc_box() {
        let arc = Arc::new(dvec2(1.0, 0.0), dvec2(0.0, 1.0), DVec2::ZERO, false);
        let bounds = arc.outer_box();
        assert!(close(bounds.min.x, 0.0) && close(bounds.min.y, 0.0));
        assert!(close(bounds.max.x, 1.0) && close(bounds.max.y, 1.0));
        assert!(close(arc.sweep(), FRAC_PI_2));
    }

    #[test]
    fn clockwise_arc_goes_the_long_way() {
        let arc = Arc::new(dvec2(1.0, 0.0), dvec2(0.0, 1.0), DVec2::ZERO, true);
        assert!(close(arc.sweep(), 3.0 * FRAC_PI_2));
        let bounds = arc.outer_box();
        assert!(close(bounds.min.x, -1.0) && close(bounds.min.y, -1.0));
    }

    #[test]
    fn closed_arc_is_full_circle() {
        let arc = Arc::new(dvec2(2.0, 0.0), dvec2(2.0, 0.0), dvec2(1.0, 0.0), true);
        assert!(close(arc.sweep(), TAU));
        assert!(close(arc.length(), TAU));
        assert!(arc.point_at(0.5).distance(dvec2(0.0, 0.0)) < 1e-9);
    }

    #[test]
    fn mirroring_flips_direction() {
        let arc = ShapeSegment::Arc(Arc::new(dvec2(1.0, 0.0), dvec2(0.0, 1.0), DVec2::ZERO, false));
        let mirror = DAffine2::from_scale(dvec2(-1.0, 1.0));
        let ShapeSegment::Arc(mirrored) = arc.transformed(&mirror) else {
            panic!("expected arc");
        };
        assert!(mirrored.clockwise);
        assert_eq!(mirrored.start, dvec2(-1.0, 0.0));
        assert!(close(mirrored.sweep(), FRAC_PI_2));
    }

    #[test]
    fn line_box_and_translation() {
        let line = ShapeSegment::Line(Line::new(dvec2(2.0, -1.0), dvec2(-1.0, 3.0)));
        let bounds = line.outer_box();
        assert_eq!((bounds.min, bounds.max), (dvec2(-1.0, -1.0), dvec2(2.0, 3.0)));
        let moved = line.transformed(&DAffine2::from_translation(dvec2(1.0, 1.0)));
        assert_eq!(moved.start(), dvec2(3.0, 0.0));
    }
}
