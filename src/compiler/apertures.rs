//! Aperture images: each definition becomes a layer centered on the origin.

use glam::DVec2;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::Compiler;
use crate::ast::ApertureId;
use crate::errors::CompileError;
use crate::rvmc::{Command, LayerId, Shape, shapes};
use crate::state::{Aperture, Primitive};
use crate::types::Offset;

fn degrees(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn mm(value: Offset) -> f64 {
    value.as_f64()
}

impl Compiler {
    pub(super) fn define_aperture(&mut self, id: ApertureId, aperture: &Aperture) -> Result<(), CompileError> {
        if matches!(aperture, Aperture::Block) {
            return Ok(());
        }
        let layer = self.fresh_aperture_layer(id);
        crate::log::debug!(%layer, kind = aperture.kind_name(), "compiling aperture");
        let commands = self.aperture_commands(&layer, aperture);
        self.buffers.insert(layer.clone(), commands);
        self.apertures.insert(id, layer);
        Ok(())
    }

    fn aperture_commands(&mut self, layer: &LayerId, aperture: &Aperture) -> Vec<Command> {
        let mut out: Vec<Shape> = Vec::new();
        let hole = match aperture {
            Aperture::Circle { diameter, hole } => {
                if !diameter.is_zero() {
                    out.push(shapes::circle(DVec2::ZERO, mm(*diameter), false));
                }
                *hole
            }
            Aperture::Rectangle { width, height, hole } => {
                out.push(shapes::rectangle(DVec2::ZERO, mm(*width), mm(*height), false));
                *hole
            }
            Aperture::Obround { width, height, hole } => {
                out.push(shapes::obround(DVec2::ZERO, mm(*width), mm(*height), false));
                *hole
            }
            Aperture::Polygon {
                outer_diameter,
                vertices,
                rotation,
                hole,
            } => {
                out.push(shapes::polygon(
                    DVec2::ZERO,
                    mm(*outer_diameter),
                    *vertices,
                    degrees(*rotation),
                    false,
                ));
                *hole
            }
            Aperture::Macro { primitives, .. } => {
                let mut commands = Vec::new();
                for primitive in primitives {
                    self.lower_primitive(layer, primitive, &mut commands);
                }
                return commands;
            }
            Aperture::Block => None,
        };
        if let Some(hole) = hole.filter(|h| !h.is_zero() && !out.is_empty()) {
            out.push(shapes::circle(DVec2::ZERO, mm(hole), true));
        }
        out.into_iter().map(Command::Shape).collect()
    }

    /// Macro primitives in definition order; exposure off clears what
    /// earlier primitives drew.
    fn lower_primitive(&mut self, layer: &LayerId, primitive: &Primitive, commands: &mut Vec<Command>) {
        let mut push = |shape: Shape, rotation: Decimal| {
            commands.push(Command::Shape(shapes::rotated(shape, degrees(rotation))));
        };
        match primitive {
            Primitive::Circle {
                exposure,
                diameter,
                center,
                rotation,
            } => push(shapes::circle(center.to_dvec2(), mm(*diameter), !exposure), *rotation),
            Primitive::VectorLine {
                exposure,
                width,
                start,
                end,
                rotation,
            } => {
                let (start, end) = (start.to_dvec2(), end.to_dvec2());
                let direction = end - start;
                if direction.length() > 0.0 && !width.is_zero() {
                    let normal = direction.normalize().perp() * (mm(*width) / 2.0);
                    push(
                        shapes::outline(&[start - normal, end - normal, end + normal, start + normal], !exposure),
                        *rotation,
                    );
                }
            }
            Primitive::CenterLine {
                exposure,
                width,
                height,
                center,
                rotation,
            } => push(
                shapes::rectangle(center.to_dvec2(), mm(*width), mm(*height), !exposure),
                *rotation,
            ),
            Primitive::Outline {
                exposure,
                points,
                rotation,
            } => {
                let points: Vec<DVec2> = points.iter().map(|p| p.to_dvec2()).collect();
                push(shapes::outline(&points, !exposure), *rotation);
            }
            Primitive::Polygon {
                exposure,
                vertices,
                center,
                diameter,
                rotation,
            } => push(
                shapes::polygon(center.to_dvec2(), mm(*diameter), *vertices, 0.0, !exposure),
                *rotation,
            ),
            Primitive::Moire {
                center,
                outer_diameter,
                ring_thickness,
                gap,
                max_rings,
                crosshair_thickness,
                crosshair_length,
                rotation,
            } => {
                let c = center.to_dvec2();
                let (thickness, gap) = (mm(*ring_thickness), mm(*gap));
                let mut outer = mm(*outer_diameter);
                for _ in 0..*max_rings {
                    if outer <= 0.0 {
                        break;
                    }
                    let inner = (outer - 2.0 * thickness).max(0.0);
                    push(shapes::ring(c, outer, inner, false), *rotation);
                    outer = inner - 2.0 * gap;
                }
                let (length, cross) = (mm(*crosshair_length), mm(*crosshair_thickness));
                if length > 0.0 && cross > 0.0 {
                    push(shapes::rectangle(c, length, cross, false), *rotation);
                    push(shapes::rectangle(c, cross, length, false), *rotation);
                }
            }
            Primitive::Thermal {
                center,
                outer_diameter,
                inner_diameter,
                gap,
                rotation,
            } => {
                // Gaps must not clear earlier primitives, so the thermal gets
                // a layer of its own.
                let c = center.to_dvec2();
                let outer = mm(*outer_diameter);
                let gap = mm(*gap);
                let thermal = (1..)
                    .map(|k| LayerId::new(format!("{layer}%thermal{k}")))
                    .find(|id| !self.buffers.contains_key(id))
                    .unwrap_or_else(|| LayerId::new(format!("{layer}%thermal")));
                let rotate = |shape: Shape| Command::Shape(shapes::rotated(shape, degrees(*rotation)));
                let body = vec![
                    rotate(shapes::ring(c, outer, mm(*inner_diameter), false)),
                    rotate(shapes::rectangle(c, outer + gap, gap, true)),
                    rotate(shapes::rectangle(c, gap, outer + gap, true)),
                ];
                crate::log::debug!(layer = %thermal, "thermal sub-layer");
                self.buffers.insert(thermal.clone(), body);
                commands.push(Command::PasteLayer {
                    source: thermal,
                    center: DVec2::ZERO,
                    negative: false,
                });
            }
        }
    }
}
