//! Shape factories shared by the compiler and the builder API.
//!
//! Closed outlines run counter-clockwise; holes inside a single shape run
//! clockwise so the non-zero rule leaves them empty.

use std::f64::consts::PI;

use glam::{DAffine2, DVec2, dvec2};

use super::{Arc, Line, Shape, ShapeSegment};

/// Below this a length counts as zero
const EPSILON: f64 = 1e-9;

fn line(a: DVec2, b: DVec2) -> ShapeSegment {
    Line::new(a, b).into()
}

fn arc(start: DVec2, end: DVec2, center: DVec2, clockwise: bool) -> ShapeSegment {
    Arc::new(start, end, center, clockwise).into()
}

/// Closed polygon through `points`.
pub fn outline(points: &[DVec2], negative: bool) -> Shape {
    let segments = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .filter(|(a, b)| a.distance(**b) > EPSILON)
        .map(|(a, b)| line(*a, *b))
        .collect();
    Shape::new(segments, negative)
}

/// Two half circles, so no segment starts where it ends.
fn circle_segments(center: DVec2, radius: f64, clockwise: bool) -> [ShapeSegment; 2] {
    let east = center + dvec2(radius, 0.0);
    let west = center - dvec2(radius, 0.0);
    [arc(east, west, center, clockwise), arc(west, east, center, clockwise)]
}

pub fn circle(center: DVec2, diameter: f64, negative: bool) -> Shape {
    Shape::new(circle_segments(center, diameter / 2.0, false).to_vec(), negative)
}

/// Annulus as one shape: outer boundary plus a reversed inner hole.
pub fn ring(center: DVec2, outer_diameter: f64, inner_diameter: f64, negative: bool) -> Shape {
    let mut segments = circle_segments(center, outer_diameter / 2.0, false).to_vec();
    if inner_diameter > EPSILON {
        segments.extend(circle_segments(center, inner_diameter / 2.0, true));
    }
    Shape::new(segments, negative)
}

pub fn rectangle(center: DVec2, width: f64, height: f64, negative: bool) -> Shape {
    let h = dvec2(width, height) / 2.0;
    outline(
        &[
            center + dvec2(-h.x, -h.y),
            center + dvec2(h.x, -h.y),
            center + dvec2(h.x, h.y),
            center + dvec2(-h.x, h.y),
        ],
        negative,
    )
}

/// Rectangle with fully rounded short sides.
pub fn obround(center: DVec2, width: f64, height: f64, negative: bool) -> Shape {
    if (width - height).abs() <= EPSILON {
        return circle(center, width, negative);
    }
    let half = if width > height {
        dvec2((width - height) / 2.0, 0.0)
    } else {
        dvec2(0.0, (height - width) / 2.0)
    };
    stroke(center - half, center + half, width.min(height), negative)
}

/// Regular polygon with its first vertex at `rotation` degrees.
pub fn polygon(center: DVec2, outer_diameter: f64, vertices: u32, rotation: f64, negative: bool) -> Shape {
    let radius = outer_diameter / 2.0;
    let step = 2.0 * PI / f64::from(vertices.max(3));
    let points: Vec<DVec2> = (0..vertices.max(3))
        .map(|i| center + DVec2::from_angle(rotation.to_radians() + step * f64::from(i)) * radius)
        .collect();
    outline(&points, negative)
}

/// Straight stroke with round caps (a stadium).
pub fn stroke(start: DVec2, end: DVec2, width: f64, negative: bool) -> Shape {
    let direction = end - start;
    if direction.length() <= EPSILON {
        return circle(start, width, negative);
    }
    let normal = direction.normalize().perp() * (width / 2.0);
    Shape::new(
        vec![
            line(start - normal, end - normal),
            arc(end - normal, end + normal, end, false),
            line(end + normal, start + normal),
            arc(start + normal, start - normal, start, false),
        ],
        negative,
    )
}

/// Stroke of a circular arc with round caps.
///
/// A closed arc strokes a full ring, emitted as two half rings. When the
/// stroke is wider than the arc's diameter the inner edge collapses, and the
/// stroke becomes the swept sector plus a disc at each end.
pub fn arc_stroke(start: DVec2, end: DVec2, center: DVec2, clockwise: bool, width: f64, negative: bool) -> Vec<Shape> {
    let radius = start.distance(center);
    let half = width / 2.0;
    if radius <= EPSILON {
        return vec![circle(center, width, negative)];
    }
    let outer = radius + half;
    let inner = radius - half;
    let at = |angle: f64, r: f64| center + DVec2::from_angle(angle) * r;
    let unit = |p: DVec2| (p - center).normalize();

    if start.distance(end) <= EPSILON {
        let a = (start - center).y.atan2((start - center).x);
        return [a, a + PI]
            .into_iter()
            .map(|from| {
                let to = from + PI;
                let mut segments = vec![arc(at(from, outer), at(to, outer), center, false)];
                if inner > EPSILON {
                    segments.push(line(at(to, outer), at(to, inner)));
                    segments.push(arc(at(to, inner), at(from, inner), center, true));
                    segments.push(line(at(from, inner), at(from, outer)));
                } else {
                    segments.push(line(at(to, outer), center));
                    segments.push(line(center, at(from, outer)));
                }
                Shape::new(segments, negative)
            })
            .collect();
    }

    let (us, ue) = (unit(start), unit(end));
    if inner > EPSILON {
        return vec![Shape::new(
            vec![
                arc(center + us * outer, center + ue * outer, center, clockwise),
                arc(center + ue * outer, center + ue * inner, end, clockwise),
                arc(center + ue * inner, center + us * inner, center, !clockwise),
                arc(center + us * inner, center + us * outer, start, clockwise),
            ],
            negative,
        )];
    }
    vec![
        Shape::new(
            vec![
                line(center, center + us * outer),
                arc(center + us * outer, center + ue * outer, center, clockwise),
                line(center + ue * outer, center),
            ],
            negative,
        ),
        circle(start, width, negative),
        circle(end, width, negative),
    ]
}

/// Rotate a shape by `degrees` around the origin.
pub fn rotated(shape: Shape, degrees: f64) -> Shape {
    if degrees == 0.0 {
        return shape;
    }
    shape.transformed(&DAffine2::from_angle(degrees.to_radians()))
}
