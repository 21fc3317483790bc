//! Aperture macro instantiation.
//!
//! `%ADD12DONUT,0.5X0.3*%` binds `$1=0.5` and `$2=0.3`, then runs the body
//! of `DONUT` once: assignments extend the scope and every primitive is
//! evaluated into concrete millimetre values.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::aperture::{Primitive, polygon_vertices};
use crate::ast::{ApertureId, ApertureMacro, Expression, MacroPrimitive, MacroStatementKind};
use crate::errors::StateError;
use crate::types::{Offset, Unit, Vector2D};

/// Result of running a macro body
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub primitives: Vec<Primitive>,
    pub warnings: Vec<String>,
}

/// Evaluate `definition` with `parameters` bound to `$1..$n`.
pub fn instantiate(
    id: ApertureId,
    definition: &ApertureMacro,
    parameters: &[Decimal],
    unit: Unit,
) -> Result<Instance, StateError> {
    let mut scope = Scope::new(parameters);
    let mut primitives = Vec::new();
    for statement in &definition.statements {
        match &statement.kind {
            MacroStatementKind::Comment(_) => {}
            MacroStatementKind::Assignment { variable, value } => {
                let value = scope.evaluate(value)?;
                scope.variables.insert(*variable, value);
            }
            MacroStatementKind::Primitive(primitive) => {
                primitives.push(scope.primitive(id, primitive, unit)?);
            }
        }
    }
    Ok(Instance {
        primitives,
        warnings: scope.warnings,
    })
}

/// Variables visible to one macro instantiation
#[derive(Debug, Default)]
pub struct Scope {
    variables: IndexMap<u32, Decimal>,
    warnings: Vec<String>,
}

impl Scope {
    pub fn new(parameters: &[Decimal]) -> Scope {
        let variables = (1u32..).zip(parameters.iter().copied()).collect();
        Scope {
            variables,
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn evaluate(&mut self, expression: &Expression) -> Result<Decimal, StateError> {
        Ok(match expression {
            Expression::Constant(value) => *value,
            Expression::Variable(index) => match self.variables.get(index) {
                Some(value) => *value,
                None => {
                    self.warnings
                        .push(format!("macro variable ${index} is not defined, using 0"));
                    Decimal::ZERO
                }
            },
            Expression::Negative(inner) => -self.evaluate(inner)?,
            Expression::Positive(inner) | Expression::Parenthesized(inner) => self.evaluate(inner)?,
            Expression::Add(head, tail) => self.chain(expression, head, tail, Decimal::checked_add)?,
            Expression::Subtract(head, tail) => {
                self.chain(expression, head, tail, Decimal::checked_sub)?
            }
            Expression::Multiply(head, tail) => {
                self.chain(expression, head, tail, Decimal::checked_mul)?
            }
            Expression::Divide(head, tail) => {
                let mut value = self.evaluate(head)?;
                for operand in tail {
                    let divisor = self.evaluate(operand)?;
                    if divisor.is_zero() {
                        return Err(StateError::DivisionByZero {
                            expression: expression.get_gerber_code(),
                        });
                    }
                    value = value.checked_div(divisor).ok_or_else(|| overflow(expression))?;
                }
                value
            }
        })
    }

    fn chain(
        &mut self,
        whole: &Expression,
        head: &Expression,
        tail: &[Expression],
        op: fn(Decimal, Decimal) -> Option<Decimal>,
    ) -> Result<Decimal, StateError> {
        let mut value = self.evaluate(head)?;
        for operand in tail {
            let operand = self.evaluate(operand)?;
            value = op(value, operand).ok_or_else(|| overflow(whole))?;
        }
        Ok(value)
    }

    fn length(&mut self, expression: &Expression, unit: Unit) -> Result<Offset, StateError> {
        Ok(Offset::new(self.evaluate(expression)?, unit))
    }

    fn point(&mut self, x: &Expression, y: &Expression, unit: Unit) -> Result<Vector2D, StateError> {
        Ok(Vector2D::new(self.length(x, unit)?, self.length(y, unit)?))
    }

    fn exposure(&mut self, expression: &Expression) -> Result<bool, StateError> {
        Ok(!self.evaluate(expression)?.is_zero())
    }

    fn rotation(&mut self, expression: Option<&Expression>) -> Result<Decimal, StateError> {
        expression.map_or(Ok(Decimal::ZERO), |e| self.evaluate(e))
    }

    fn count(&mut self, expression: &Expression) -> Result<u32, StateError> {
        Ok(self.evaluate(expression)?.round().to_u32().unwrap_or(0))
    }

    fn primitive(
        &mut self,
        id: ApertureId,
        primitive: &MacroPrimitive,
        unit: Unit,
    ) -> Result<Primitive, StateError> {
        let rotation = self.rotation(primitive.rotation())?;
        Ok(match primitive {
            MacroPrimitive::Circle { exposure, diameter, center_x, center_y, .. } => Primitive::Circle {
                exposure: self.exposure(exposure)?,
                diameter: self.length(diameter, unit)?,
                center: self.point(center_x, center_y, unit)?,
                rotation,
            },
            MacroPrimitive::VectorLine { exposure, width, start_x, start_y, end_x, end_y, .. } => {
                Primitive::VectorLine {
                    exposure: self.exposure(exposure)?,
                    width: self.length(width, unit)?,
                    start: self.point(start_x, start_y, unit)?,
                    end: self.point(end_x, end_y, unit)?,
                    rotation,
                }
            }
            MacroPrimitive::CenterLine { exposure, width, height, center_x, center_y, .. } => {
                Primitive::CenterLine {
                    exposure: self.exposure(exposure)?,
                    width: self.length(width, unit)?,
                    height: self.length(height, unit)?,
                    center: self.point(center_x, center_y, unit)?,
                    rotation,
                }
            }
            MacroPrimitive::LowerLeftLine { exposure, width, height, x, y, .. } => {
                let exposure = self.exposure(exposure)?;
                let width = self.length(width, unit)?;
                let height = self.length(height, unit)?;
                let corner = self.point(x, y, unit)?;
                Primitive::CenterLine {
                    exposure,
                    width,
                    height,
                    center: corner + Vector2D::new(width.half(), height.half()),
                    rotation,
                }
            }
            MacroPrimitive::Outline { exposure, points, .. } => {
                let exposure = self.exposure(exposure)?;
                let points = points
                    .iter()
                    .map(|(x, y)| self.point(x, y, unit))
                    .collect::<Result<Vec<_>, _>>()?;
                Primitive::Outline { exposure, points, rotation }
            }
            MacroPrimitive::Polygon { exposure, vertex_count, center_x, center_y, diameter, .. } => {
                let exposure = self.exposure(exposure)?;
                let vertices = polygon_vertices(id, self.evaluate(vertex_count)?)?;
                Primitive::Polygon {
                    exposure,
                    vertices,
                    center: self.point(center_x, center_y, unit)?,
                    diameter: self.length(diameter, unit)?,
                    rotation,
                }
            }
            MacroPrimitive::Moire {
                center_x,
                center_y,
                outer_diameter,
                ring_thickness,
                gap,
                max_rings,
                crosshair_thickness,
                crosshair_length,
                ..
            } => Primitive::Moire {
                center: self.point(center_x, center_y, unit)?,
                outer_diameter: self.length(outer_diameter, unit)?,
                ring_thickness: self.length(ring_thickness, unit)?,
                gap: self.length(gap, unit)?,
                max_rings: self.count(max_rings)?,
                crosshair_thickness: self.length(crosshair_thickness, unit)?,
                crosshair_length: self.length(crosshair_length, unit)?,
                rotation,
            },
            MacroPrimitive::Thermal { center_x, center_y, outer_diameter, inner_diameter, gap, .. } => {
                Primitive::Thermal {
                    center: self.point(center_x, center_y, unit)?,
                    outer_diameter: self.length(outer_diameter, unit)?,
                    inner_diameter: self.length(inner_diameter, unit)?,
                    gap: self.length(gap, unit)?,
                    rotation,
                }
            }
        })
    }
}

fn overflow(expression: &Expression) -> StateError {
    StateError::ArithmeticOverflow {
        expression: expression.get_gerber_code(),
    }
}
