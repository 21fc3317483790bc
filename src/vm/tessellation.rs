//! Arc flattening shared by both backends.

use glam::DVec2;

use crate::defaults;
use crate::errors::VmError;
use crate::rvmc::{Segment, ShapeSegment};

/// How finely arcs are cut into straight segments. Lengths are millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcPolicy {
    pub resolution: f64,
    pub max_segment_length: f64,
    pub min_segments: u32,
    pub max_segments: u32,
}

impl Default for ArcPolicy {
    fn default() -> Self {
        ArcPolicy {
            resolution: defaults::ARC_RESOLUTION,
            max_segment_length: defaults::MAX_SEGMENT_LENGTH,
            min_segments: defaults::MIN_ARC_SEGMENTS,
            max_segments: defaults::MAX_ARC_SEGMENTS,
        }
    }
}

impl ArcPolicy {
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_max_segment_length(mut self, length: f64) -> Self {
        self.max_segment_length = length;
        self
    }

    pub fn with_min_segments(mut self, count: u32) -> Self {
        self.min_segments = count;
        self
    }

    /// Rejects settings that could flatten a real arc into nothing.
    pub fn validate(&self) -> Result<(), VmError> {
        let usable = self.resolution.is_finite()
            && self.resolution > 0.0
            && self.max_segment_length.is_finite()
            && self.max_segment_length > 0.0
            && self.max_segments > 0;
        if usable {
            Ok(())
        } else {
            Err(VmError::ResolutionTooLow {
                resolution: self.resolution,
            })
        }
    }

    /// Straight segments used for an arc of `length`.
    pub fn segment_count(&self, length: f64) -> Result<u32, VmError> {
        self.validate()?;
        let raw = (length * self.resolution / self.max_segment_length).ceil();
        if length > 0.0 && raw < 1.0 && self.min_segments == 0 {
            return Err(VmError::ResolutionTooLow {
                resolution: self.resolution,
            });
        }
        let clamped = raw.clamp(f64::from(self.min_segments), f64::from(self.max_segments));
        Ok(clamped.max(1.0) as u32)
    }

    /// Points after `segment.start()` up to and including its end.
    pub fn flatten_into(&self, segment: &ShapeSegment, points: &mut Vec<DVec2>) -> Result<(), VmError> {
        match segment {
            ShapeSegment::Line(line) => points.push(line.end),
            ShapeSegment::Arc(arc) => {
                let count = self.segment_count(arc.length())?;
                points.extend((1..count).map(|i| arc.point_at(f64::from(i) / f64::from(count))));
                points.push(arc.end);
            }
        }
        Ok(())
    }

    /// Closed polylines, one per contour, without the repeated first point.
    pub fn flatten(&self, contours: &[&[ShapeSegment]]) -> Result<Vec<Vec<DVec2>>, VmError> {
        let mut out = Vec::with_capacity(contours.len());
        for contour in contours {
            let Some(first) = contour.first() else { continue };
            let mut points = vec![first.start()];
            for segment in contour.iter() {
                self.flatten_into(segment, &mut points)?;
            }
            if points.len() > 1 && points[0].distance(points[points.len() - 1]) < 1e-12 {
                points.pop();
            }
            if points.len() >= 3 {
                out.push(points);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvmc::{Arc, shapes};
    use glam::dvec2;

    #[test]
    fn count_scales_with_length() {
        let policy = ArcPolicy::default();
        assert_eq!(policy.segment_count(0.01).unwrap(), 12);
        assert_eq!(policy.segment_count(1.01).unwrap(), 21);
        assert_eq!(policy.segment_count(1e6).unwrap(), 4096);
    }

    #[test]
    fn bad_resolution_is_fatal() {
        for resolution in [0.0, -1.0, f64::NAN] {
            let policy = ArcPolicy::default().with_resolution(resolution);
            assert!(matches!(
                policy.segment_count(1.0),
                Err(VmError::ResolutionTooLow { .. })
            ));
        }
    }

    #[test]
    fn zero_count_without_minimum_is_fatal() {
        let policy = ArcPolicy::default().with_min_segments(0).with_resolution(1e-300);
        assert!(matches!(
            policy.segment_count(1e-30),
            Err(VmError::ResolutionTooLow { .. })
        ));
        assert_eq!(policy.segment_count(0.0).unwrap(), 1);
    }

    #[test]
    fn arc_points_lie_on_circle() {
        let policy = ArcPolicy::default();
        let arc = ShapeSegment::from(Arc::new(dvec2(1.0, 0.0), dvec2(0.0, 1.0), DVec2::ZERO, false));
        let mut points = vec![arc.start()];
        policy.flatten_into(&arc, &mut points).unwrap();
        assert!(points.len() >= 13);
        assert!(points.iter().all(|p| (p.length() - 1.0).abs() < 1e-9));
        assert_eq!(*points.last().unwrap(), dvec2(0.0, 1.0));
    }

    #[test]
    fn circle_flattens_to_one_ring() {
        let shape = shapes::circle(DVec2::ZERO, 2.0, false);
        let rings = ArcPolicy::default().flatten(&shape.contours()).unwrap();
        assert_eq!(rings.len(), 1);
        assert_ne!(rings[0].first(), rings[0].last());
    }
}
