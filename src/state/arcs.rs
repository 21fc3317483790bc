//! Arc center resolution for circular plotting.

use crate::defaults::QUADRANT_SWEEP_TOLERANCE;
use crate::errors::StateError;
use crate::types::{Offset, Vector2D};

/// Sign combinations tried for single quadrant offsets, in order.
const CANDIDATE_SIGNS: [(i8, i8); 4] = [(1, 1), (-1, 1), (1, -1), (-1, -1)];

/// Multi quadrant mode: the offset is signed and relative to the start.
pub fn multi_quadrant_center(start: Vector2D, offset: Vector2D) -> Vector2D {
    start + offset
}

/// Center picked for a single quadrant arc
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadrantCenter {
    pub center: Vector2D,
    /// Another candidate swept the same angle
    pub tied: bool,
}

/// Single quadrant mode: `I`/`J` are unsigned, so each of the four sign
/// combinations is a candidate center.
///
/// A candidate qualifies when its start and end radii differ by at most
/// `tolerance` and the arc sweeps no more than 90 degrees in the requested
/// direction. The smallest sweep wins; equal sweeps keep the earlier
/// candidate and mark the result as tied.
pub fn single_quadrant_center(
    start: Vector2D,
    end: Vector2D,
    offset: Vector2D,
    clockwise: bool,
    tolerance: Offset,
) -> Result<QuadrantCenter, StateError> {
    let (i, j) = (offset.x.abs(), offset.y.abs());
    let mut best: Option<(f64, QuadrantCenter)> = None;
    for (sx, sy) in CANDIDATE_SIGNS {
        let center = start
            + Vector2D::new(
                if sx > 0 { i } else { -i },
                if sy > 0 { j } else { -j },
            );
        let (from, to) = (start - center, end - center);
        if (from.length() - to.length()).abs() > tolerance {
            continue;
        }
        let sweep = if clockwise {
            from.angle_between_clockwise(to)
        } else {
            from.angle_between_cc(to)
        };
        if sweep > 90.0 + QUADRANT_SWEEP_TOLERANCE {
            continue;
        }
        match &mut best {
            Some((smallest, found)) if (sweep - *smallest).abs() <= QUADRANT_SWEEP_TOLERANCE => {
                if found.center != center {
                    found.tied = true;
                }
            }
            Some((smallest, _)) if sweep > *smallest => {}
            _ => best = Some((sweep, QuadrantCenter { center, tied: false })),
        }
    }
    best.map(|(_, found)| found)
        .ok_or_else(|| StateError::NoMatchingArcCenterCandidate {
            start: start.to_string(),
            end: end.to_string(),
            i: i.to_string(),
            j: j.to_string(),
        })
}
