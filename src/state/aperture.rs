//! Resolved apertures: every dimension in millimetres, every macro evaluated.

use std::rc::Rc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::attributes::AttributeMap;
use crate::ast::{
    ApertureId, CircleDefinition, Mirroring, Polarity, PolygonDefinition, RectangleDefinition,
};
use crate::errors::StateError;
use crate::types::{Offset, Unit, Vector2D};

/// Aperture macro primitive with concrete parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Circle {
        exposure: bool,
        diameter: Offset,
        center: Vector2D,
        rotation: Decimal,
    },
    VectorLine {
        exposure: bool,
        width: Offset,
        start: Vector2D,
        end: Vector2D,
        rotation: Decimal,
    },
    /// Codes 21 and 22; lower-left lines are converted to their center
    CenterLine {
        exposure: bool,
        width: Offset,
        height: Offset,
        center: Vector2D,
        rotation: Decimal,
    },
    Outline {
        exposure: bool,
        points: Vec<Vector2D>,
        rotation: Decimal,
    },
    Polygon {
        exposure: bool,
        vertices: u32,
        center: Vector2D,
        diameter: Offset,
        rotation: Decimal,
    },
    Moire {
        center: Vector2D,
        outer_diameter: Offset,
        ring_thickness: Offset,
        gap: Offset,
        max_rings: u32,
        crosshair_thickness: Offset,
        crosshair_length: Offset,
        rotation: Decimal,
    },
    Thermal {
        center: Vector2D,
        outer_diameter: Offset,
        inner_diameter: Offset,
        gap: Offset,
        rotation: Decimal,
    },
}

/// What a `Dnn` code stands for once defined
#[derive(Debug, Clone, PartialEq)]
pub enum Aperture {
    Circle {
        diameter: Offset,
        hole: Option<Offset>,
    },
    Rectangle {
        width: Offset,
        height: Offset,
        hole: Option<Offset>,
    },
    Obround {
        width: Offset,
        height: Offset,
        hole: Option<Offset>,
    },
    Polygon {
        outer_diameter: Offset,
        vertices: u32,
        rotation: Decimal,
        hole: Option<Offset>,
    },
    Macro {
        name: String,
        primitives: Vec<Primitive>,
    },
    /// Defined by an `AB` block; its image is the block's content
    Block,
}

impl Aperture {
    pub fn circle(id: ApertureId, definition: &CircleDefinition, unit: Unit) -> Result<Aperture, StateError> {
        if definition.diameter.is_sign_negative() {
            return Err(invalid(id, "circle diameter must not be negative"));
        }
        Ok(Aperture::Circle {
            diameter: Offset::new(definition.diameter, unit),
            hole: hole(id, definition.hole, unit)?,
        })
    }

    pub fn rectangle(id: ApertureId, definition: &RectangleDefinition, unit: Unit) -> Result<Aperture, StateError> {
        let (width, height) = rectangle_size(id, definition, unit)?;
        Ok(Aperture::Rectangle {
            width,
            height,
            hole: hole(id, definition.hole, unit)?,
        })
    }

    pub fn obround(id: ApertureId, definition: &RectangleDefinition, unit: Unit) -> Result<Aperture, StateError> {
        let (width, height) = rectangle_size(id, definition, unit)?;
        Ok(Aperture::Obround {
            width,
            height,
            hole: hole(id, definition.hole, unit)?,
        })
    }

    pub fn polygon(id: ApertureId, definition: &PolygonDefinition, unit: Unit) -> Result<Aperture, StateError> {
        if definition.outer_diameter <= Decimal::ZERO {
            return Err(invalid(id, "polygon diameter must be positive"));
        }
        let vertices = polygon_vertices(id, definition.vertices)?;
        Ok(Aperture::Polygon {
            outer_diameter: Offset::new(definition.outer_diameter, unit),
            vertices,
            rotation: definition.rotation.unwrap_or(Decimal::ZERO),
            hole: hole(id, definition.hole, unit)?,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Aperture::Circle { .. } => "circle",
            Aperture::Rectangle { .. } => "rectangle",
            Aperture::Obround { .. } => "obround",
            Aperture::Polygon { .. } => "polygon",
            Aperture::Macro { .. } => "macro",
            Aperture::Block => "block",
        }
    }

    /// Width of a stroke drawn in `direction`, after scaling.
    ///
    /// Rectangles and obrounds contribute their extent perpendicular to the
    /// stroke. Macro and block apertures cannot stroke and yield `None`.
    pub fn stroke_width(&self, direction: Vector2D, transform: &ApertureTransform) -> Option<Offset> {
        let width = match self {
            Aperture::Circle { diameter, .. } => *diameter,
            Aperture::Polygon { outer_diameter, .. } => *outer_diameter,
            Aperture::Rectangle { width, height, .. } | Aperture::Obround { width, height, .. } => {
                let unit = direction.normalize().rotate(-transform.rotation);
                let normal = Vector2D::new(-unit.y, unit.x);
                Offset::from_millimeters(
                    (width.as_millimeters() * normal.x.as_millimeters()).abs()
                        + (height.as_millimeters() * normal.y.as_millimeters()).abs(),
                )
            }
            Aperture::Macro { .. } | Aperture::Block => return None,
        };
        Some(width * transform.scaling)
    }
}

fn invalid(id: ApertureId, message: &str) -> StateError {
    StateError::InvalidAperture {
        id,
        message: message.to_string(),
    }
}

fn rectangle_size(
    id: ApertureId,
    definition: &RectangleDefinition,
    unit: Unit,
) -> Result<(Offset, Offset), StateError> {
    if definition.width <= Decimal::ZERO || definition.height <= Decimal::ZERO {
        return Err(invalid(id, "width and height must be positive"));
    }
    Ok((Offset::new(definition.width, unit), Offset::new(definition.height, unit)))
}

fn hole(id: ApertureId, value: Option<Decimal>, unit: Unit) -> Result<Option<Offset>, StateError> {
    match value {
        Some(value) if value.is_sign_negative() => Err(invalid(id, "hole diameter must not be negative")),
        Some(value) if value.is_zero() => Ok(None),
        Some(value) => Ok(Some(Offset::new(value, unit))),
        None => Ok(None),
    }
}

/// Polygon vertex counts are whole numbers from 3 to 12.
pub(crate) fn polygon_vertices(id: ApertureId, value: Decimal) -> Result<u32, StateError> {
    match value.to_u32() {
        Some(count) if value.fract().is_zero() && (3..=12).contains(&count) => Ok(count),
        _ => Err(invalid(id, &format!("polygon vertex count {value} is outside 3..=12"))),
    }
}

/// Aperture dictionary entry
#[derive(Debug, Clone, PartialEq)]
pub struct ApertureEntry {
    pub aperture: Aperture,
    /// Aperture attributes in effect when the aperture was defined
    pub attributes: Rc<AttributeMap>,
}

/// `LP`/`LM`/`LR`/`LS` settings applied to flashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApertureTransform {
    pub polarity: Polarity,
    pub mirroring: Mirroring,
    /// Counter-clockwise degrees
    pub rotation: Decimal,
    pub scaling: Decimal,
}

impl Default for ApertureTransform {
    fn default() -> Self {
        ApertureTransform {
            polarity: Polarity::Dark,
            mirroring: Mirroring::None,
            rotation: Decimal::ZERO,
            scaling: Decimal::ONE,
        }
    }
}

impl ApertureTransform {
    /// True when the aperture image can be pasted unchanged. Polarity is
    /// applied by the paste itself and does not count.
    pub fn is_identity(&self) -> bool {
        self.mirroring == Mirroring::None
            && self.rotation.is_zero()
            && self.scaling == Decimal::ONE
    }
}
