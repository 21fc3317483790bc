//! Rendering virtual machine commands.
//!
//! RVMC is the flat, backend independent output of the compiler: layers are
//! opened and closed like parentheses, shapes are drawn into the innermost
//! open layer and closed layers are pasted by id. Geometry is `f64`
//! millimetres on `glam` vectors.

pub mod builder;
pub mod segment;
pub mod shapes;

use std::fmt;

use glam::{DAffine2, DVec2};

pub use builder::{Builder, LayerBuilder, LayerHandle};
pub use segment::{Arc, Line, Segment, ShapeSegment};

use crate::types::{BoundingBox, NumericError, Offset};

/// Name of a layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> LayerId {
        LayerId(id.into())
    }

    /// The root layer every compiled file renders into
    pub fn main() -> LayerId {
        LayerId::new(crate::defaults::MAIN_LAYER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_main(&self) -> bool {
        self.0 == crate::defaults::MAIN_LAYER
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        LayerId::new(id)
    }
}

// ============================================================================
// Boxes
// ============================================================================

/// Axis-aligned extent of layer content. `NULL` is the identity of `union`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerBox {
    pub min: DVec2,
    pub max: DVec2,
}

impl LayerBox {
    pub const NULL: LayerBox = LayerBox {
        min: DVec2::splat(f64::INFINITY),
        max: DVec2::splat(f64::NEG_INFINITY),
    };

    pub fn new(a: DVec2, b: DVec2) -> LayerBox {
        LayerBox {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_point(point: DVec2) -> LayerBox {
        LayerBox {
            min: point,
            max: point,
        }
    }

    pub fn is_null(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn union(&self, other: &LayerBox) -> LayerBox {
        LayerBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn include_point(&self, point: DVec2) -> LayerBox {
        self.union(&LayerBox::from_point(point))
    }

    pub fn translate(&self, by: DVec2) -> LayerBox {
        if self.is_null() {
            return *self;
        }
        LayerBox {
            min: self.min + by,
            max: self.max + by,
        }
    }

    /// Box of the four corners after `transform`.
    pub fn transformed(&self, transform: &DAffine2) -> LayerBox {
        if self.is_null() {
            return *self;
        }
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
        .into_iter()
        .fold(LayerBox::NULL, |acc, p| acc.include_point(transform.transform_point2(p)))
    }

    pub fn size(&self) -> DVec2 {
        if self.is_null() { DVec2::ZERO } else { self.max - self.min }
    }

    /// Exact millimetre box for reporting.
    pub fn to_bounding_box(&self) -> Result<BoundingBox, NumericError> {
        if self.is_null() {
            return Ok(BoundingBox::NULL);
        }
        Ok(BoundingBox::new(
            Offset::try_from_f64(self.min.x)?,
            Offset::try_from_f64(self.min.y)?,
            Offset::try_from_f64(self.max.x)?,
            Offset::try_from_f64(self.max.y)?,
        ))
    }
}

impl Default for LayerBox {
    fn default() -> Self {
        LayerBox::NULL
    }
}

// ============================================================================
// Shapes and commands
// ============================================================================

/// Filled outline made of one or more closed contours. A contour ends where
/// the next segment does not start at the previous end. Contours combine
/// with the non-zero winding rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub segments: Vec<ShapeSegment>,
    /// Clear polarity: the shape removes material
    pub negative: bool,
}

impl Shape {
    pub fn new(segments: Vec<ShapeSegment>, negative: bool) -> Shape {
        Shape { segments, negative }
    }

    pub fn outer_box(&self) -> LayerBox {
        self.segments
            .iter()
            .fold(LayerBox::NULL, |acc, s| acc.union(&s.outer_box()))
    }

    pub fn transformed(&self, transform: &DAffine2) -> Shape {
        Shape {
            segments: self.segments.iter().map(|s| s.transformed(transform)).collect(),
            negative: self.negative,
        }
    }

    pub fn with_negative(mut self, negative: bool) -> Shape {
        self.negative = negative;
        self
    }

    /// Segments split into contours.
    pub fn contours(&self) -> Vec<&[ShapeSegment]> {
        let mut contours = Vec::new();
        let mut begin = 0;
        for i in 1..self.segments.len() {
            if self.segments[i].start().distance(self.segments[i - 1].end()) > 1e-9 {
                contours.push(&self.segments[begin..i]);
                begin = i;
            }
        }
        if begin < self.segments.len() {
            contours.push(&self.segments[begin..]);
        }
        contours
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open a layer. Without `bounds` the layer is sized from its content
    /// when it closes.
    StartLayer {
        id: LayerId,
        bounds: Option<LayerBox>,
        /// Local point that lands on the paste center
        origin: DVec2,
    },
    Shape(Shape),
    /// Draw a closed layer with its origin at `center`
    PasteLayer {
        source: LayerId,
        center: DVec2,
        negative: bool,
    },
    EndLayer,
}

/// A compiled command stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rvmc {
    pub commands: Vec<Command>,
}

impl Rvmc {
    pub fn new(commands: Vec<Command>) -> Rvmc {
        Rvmc { commands }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Ids of every started layer, in stream order
    pub fn layer_ids(&self) -> Vec<&LayerId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::StartLayer { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Rvmc {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

// ============================================================================
// Text dump
// ============================================================================

struct Number(f64);

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Six decimals, trailing zeros and negative zero dropped
        let text = format!("{:.6}", self.0);
        let text = text.trim_end_matches('0').trim_end_matches('.');
        if text == "-0" { f.write_str("0") } else { f.write_str(text) }
    }
}

struct Point(DVec2);

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", Number(self.0.x), Number(self.0.y))
    }
}

impl fmt::Display for Rvmc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth = 0usize;
        for command in &self.commands {
            if matches!(command, Command::EndLayer) {
                depth = depth.saturating_sub(1);
            }
            write!(f, "{:indent$}", "", indent = depth * 2)?;
            match command {
                Command::StartLayer { id, bounds, origin } => {
                    write!(f, "start {id}")?;
                    match bounds {
                        Some(b) => write!(f, " box {} {}", Point(b.min), Point(b.max))?,
                        None => write!(f, " auto")?,
                    }
                    if *origin != DVec2::ZERO {
                        write!(f, " origin {}", Point(*origin))?;
                    }
                    depth += 1;
                }
                Command::Shape(shape) => {
                    write!(f, "{}", if shape.negative { "clear" } else { "dark" })?;
                    for segment in &shape.segments {
                        match segment {
                            ShapeSegment::Line(line) => {
                                write!(f, " L{}{}", Point(line.start), Point(line.end))?
                            }
                            ShapeSegment::Arc(arc) => write!(
                                f,
                                " {}{}{}@{}",
                                if arc.clockwise { "CW" } else { "CCW" },
                                Point(arc.start),
                                Point(arc.end),
                                Point(arc.center)
                            )?,
                        }
                    }
                }
                Command::PasteLayer {
                    source,
                    center,
                    negative,
                } => {
                    write!(f, "paste {source} at {}", Point(*center))?;
                    if *negative {
                        write!(f, " clear")?;
                    }
                }
                Command::EndLayer => write!(f, "end")?,
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
