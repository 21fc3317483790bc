//! Lowering of resolved drawing commands into RVMC.
//!
//! Every aperture, block and step-and-repeat body gets its own layer buffer;
//! flashes and repeats become pastes of those buffers. Buffers are emitted
//! dependencies first with `%main%` last.

mod apertures;

use glam::{DAffine2, DVec2};
use indexmap::{IndexMap, IndexSet};
use rust_decimal::prelude::ToPrimitive;

use crate::ast::{ApertureId, File, Mirroring};
use crate::errors::{CompileError, GerberError};
use crate::rvmc::{Arc, Command, LayerBox, LayerId, Line, Rvmc, Shape, ShapeSegment, shapes};
use crate::state::{
    ApertureTransform, Contour, ContourSegment, Diagnostic, DrawCommand, StateOptions, StateTracker,
    StepRepeatGrid,
};

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub state: StateOptions,
}

impl CompileOptions {
    pub fn with_state(mut self, state: StateOptions) -> Self {
        self.state = state;
        self
    }
}

/// Layer that is still receiving commands
#[derive(Debug)]
enum Open {
    Block { id: ApertureId, layer: LayerId },
    StepRepeat { grid: StepRepeatGrid, layer: LayerId },
}

impl Open {
    fn layer(&self) -> &LayerId {
        match self {
            Open::Block { layer, .. } | Open::StepRepeat { layer, .. } => layer,
        }
    }
}

pub struct Compiler {
    options: CompileOptions,
    /// Shapes and pastes of every layer, in creation order
    buffers: IndexMap<LayerId, Vec<Command>>,
    open: Vec<Open>,
    /// Layer currently holding each aperture's image
    apertures: IndexMap<ApertureId, LayerId>,
    step_repeats: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Compiler {
        Compiler {
            options,
            buffers: IndexMap::new(),
            open: Vec::new(),
            apertures: IndexMap::new(),
            step_repeats: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Diagnostics of the last interpreted file
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Interpret `file` and compile the resulting drawing commands.
    pub fn compile(&mut self, file: &File) -> Result<Rvmc, GerberError> {
        let _stage = crate::log::stage("compile");
        let mut tracker = StateTracker::new(self.options.state.clone());
        let result = tracker.run(file);
        self.diagnostics = tracker.diagnostics().to_vec();
        result?;
        crate::log::info!(
            commands = tracker.commands().len(),
            diagnostics = self.diagnostics.len(),
            "interpreted gerber file"
        );
        Ok(self.compile_commands(tracker.commands())?)
    }

    pub fn compile_commands(&mut self, commands: &[DrawCommand]) -> Result<Rvmc, CompileError> {
        self.buffers.clear();
        self.open.clear();
        self.apertures.clear();
        self.step_repeats = 0;
        self.buffers.insert(LayerId::main(), Vec::new());

        for command in commands {
            self.lower(command)?;
        }
        if !self.open.is_empty() {
            return Err(CompileError::UnbalancedBlock);
        }
        self.emit()
    }

    fn current(&mut self) -> &mut Vec<Command> {
        let layer = self.open.last().map_or_else(LayerId::main, |open| open.layer().clone());
        self.buffers.entry(layer).or_default()
    }

    fn push_shape(&mut self, shape: Shape) {
        self.current().push(Command::Shape(shape));
    }

    fn lower(&mut self, command: &DrawCommand) -> Result<(), CompileError> {
        match command {
            DrawCommand::DefineAperture { id, aperture } => self.define_aperture(*id, aperture)?,
            DrawCommand::BeginBlock { id } => {
                let layer = self.fresh_aperture_layer(*id);
                self.buffers.insert(layer.clone(), Vec::new());
                crate::log::debug!(%layer, "begin block buffer");
                self.open.push(Open::Block { id: *id, layer });
            }
            DrawCommand::EndBlock { .. } => match self.open.pop() {
                Some(Open::Block { id, layer }) => {
                    self.apertures.insert(id, layer);
                }
                _ => return Err(CompileError::UnbalancedBlock),
            },
            DrawCommand::BeginStepRepeat { grid } => {
                self.step_repeats += 1;
                let layer = LayerId::new(format!("%SR{}%", self.step_repeats));
                self.buffers.insert(layer.clone(), Vec::new());
                crate::log::debug!(%layer, "begin step and repeat buffer");
                self.open.push(Open::StepRepeat { grid: *grid, layer });
            }
            DrawCommand::EndStepRepeat => match self.open.pop() {
                Some(Open::StepRepeat { grid, layer }) => {
                    let step = grid.step.to_dvec2();
                    for row in 0..grid.y_repeat {
                        for column in 0..grid.x_repeat {
                            let center = DVec2::new(f64::from(column) * step.x, f64::from(row) * step.y);
                            self.current().push(Command::PasteLayer {
                                source: layer.clone(),
                                center,
                                negative: false,
                            });
                        }
                    }
                }
                _ => return Err(CompileError::UnbalancedBlock),
            },
            DrawCommand::Line {
                start,
                end,
                width,
                polarity,
            } => {
                if !width.is_zero() {
                    let shape = shapes::stroke(
                        start.to_dvec2(),
                        end.to_dvec2(),
                        width.as_f64(),
                        polarity.is_negative(),
                    );
                    self.push_shape(shape);
                }
            }
            DrawCommand::Arc {
                start,
                end,
                center,
                clockwise,
                width,
                polarity,
            } => {
                if !width.is_zero() {
                    for shape in shapes::arc_stroke(
                        start.to_dvec2(),
                        end.to_dvec2(),
                        center.to_dvec2(),
                        *clockwise,
                        width.as_f64(),
                        polarity.is_negative(),
                    ) {
                        self.push_shape(shape);
                    }
                }
            }
            DrawCommand::Flash { at, aperture, transform } => {
                let source = self.flash_layer(*aperture, transform)?;
                self.current().push(Command::PasteLayer {
                    source,
                    center: at.to_dvec2(),
                    negative: transform.polarity.is_negative(),
                });
            }
            DrawCommand::Region { contour, polarity } => {
                self.push_shape(region_shape(contour, polarity.is_negative()));
            }
        }
        Ok(())
    }

    /// Layer id for a new image of aperture `id`; redefinitions get a suffix
    /// so earlier flashes keep the old image.
    fn fresh_aperture_layer(&self, id: ApertureId) -> LayerId {
        let base = LayerId::new(id.to_string());
        if !self.buffers.contains_key(&base) {
            return base;
        }
        (2..)
            .map(|version| LayerId::new(format!("{id}%v{version}")))
            .find(|layer| !self.buffers.contains_key(layer))
            .unwrap_or(base)
    }

    fn flash_layer(&mut self, id: ApertureId, transform: &ApertureTransform) -> Result<LayerId, CompileError> {
        let base = self
            .apertures
            .get(&id)
            .cloned()
            .ok_or(CompileError::UnknownAperture { id })?;
        if transform.is_identity() {
            return Ok(base);
        }
        let precision = crate::defaults::TRANSFORM_ID_PRECISION;
        let suffix = format!(
            "{}%{:.precision$}%{:.precision$}",
            transform.mirroring.code(),
            transform.rotation,
            transform.scaling
        );
        self.transformed_layer(&base, &aperture_affine(transform), &suffix)
    }

    /// Copy of `base` under `affine`, created once. Pasted layers are
    /// transformed recursively.
    fn transformed_layer(&mut self, base: &LayerId, affine: &DAffine2, suffix: &str) -> Result<LayerId, CompileError> {
        let id = LayerId::new(format!("{base}%{suffix}"));
        if self.buffers.contains_key(&id) {
            return Ok(id);
        }
        let source = self
            .buffers
            .get(base)
            .cloned()
            .ok_or_else(|| CompileError::UnknownLayer { id: base.to_string() })?;
        self.buffers.insert(id.clone(), Vec::new());
        let mut commands = Vec::with_capacity(source.len());
        for command in source {
            match command {
                Command::Shape(shape) => commands.push(Command::Shape(shape.transformed(affine))),
                Command::PasteLayer {
                    source,
                    center,
                    negative,
                } => {
                    let source = self.transformed_layer(&source, affine, suffix)?;
                    commands.push(Command::PasteLayer {
                        source,
                        center: affine.transform_point2(center),
                        negative,
                    });
                }
                Command::StartLayer { .. } | Command::EndLayer => {}
            }
        }
        crate::log::debug!(%id, "created transformed buffer");
        self.buffers.insert(id.clone(), commands);
        Ok(id)
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn emit(&self) -> Result<Rvmc, CompileError> {
        let mut emitter = Emitter {
            buffers: &self.buffers,
            live: IndexMap::new(),
            visiting: IndexSet::new(),
            output: Vec::new(),
        };
        let main = LayerId::main();
        for id in self.buffers.keys().filter(|id| **id != main) {
            emitter.emit(id)?;
        }
        emitter.emit(&main)?;
        Ok(Rvmc::new(emitter.output))
    }
}

struct Emitter<'c> {
    buffers: &'c IndexMap<LayerId, Vec<Command>>,
    /// Emitted buffers map to true, empty ones to false
    live: IndexMap<LayerId, bool>,
    visiting: IndexSet<LayerId>,
    output: Vec<Command>,
}

impl Emitter<'_> {
    /// Emit `id` after its dependencies. Returns whether the buffer had
    /// content; pastes of empty buffers are dropped.
    fn emit(&mut self, id: &LayerId) -> Result<bool, CompileError> {
        if let Some(live) = self.live.get(id) {
            return Ok(*live);
        }
        if !self.visiting.insert(id.clone()) {
            return Err(CompileError::CyclicBufferDependency { id: id.to_string() });
        }
        let buffers = self.buffers;
        let source = buffers
            .get(id)
            .ok_or_else(|| CompileError::UnknownLayer { id: id.to_string() })?;
        let mut commands = Vec::with_capacity(source.len());
        for command in source {
            match command {
                Command::PasteLayer { source, .. } => {
                    if self.emit(source)? {
                        commands.push(command.clone());
                    }
                }
                _ => commands.push(command.clone()),
            }
        }
        self.visiting.shift_remove(id);

        let live = !commands.is_empty() || id.is_main();
        if live {
            let bounds = if id.is_main() {
                None
            } else {
                shapes_only_box(&commands)
            };
            self.output.push(Command::StartLayer {
                id: id.clone(),
                bounds,
                origin: DVec2::ZERO,
            });
            self.output.extend(commands);
            self.output.push(Command::EndLayer);
        }
        self.live.insert(id.clone(), live);
        Ok(live)
    }
}

/// Known extent of a layer holding only shapes.
fn shapes_only_box(commands: &[Command]) -> Option<LayerBox> {
    commands.iter().try_fold(LayerBox::NULL, |acc, command| match command {
        Command::Shape(shape) => Some(acc.union(&shape.outer_box())),
        _ => None,
    })
}

/// Mirroring first, then rotation, then scaling.
fn aperture_affine(transform: &ApertureTransform) -> DAffine2 {
    let mirror = match transform.mirroring {
        Mirroring::None => DVec2::ONE,
        Mirroring::X => DVec2::new(-1.0, 1.0),
        Mirroring::Y => DVec2::new(1.0, -1.0),
        Mirroring::XY => DVec2::new(-1.0, -1.0),
    };
    let rotation = transform.rotation.to_f64().unwrap_or(0.0).to_radians();
    let scale = transform.scaling.to_f64().unwrap_or(1.0);
    DAffine2::from_scale(DVec2::splat(scale)) * DAffine2::from_angle(rotation) * DAffine2::from_scale(mirror)
}

fn region_shape(contour: &Contour, negative: bool) -> Shape {
    let mut segments = Vec::with_capacity(contour.segments.len() + 1);
    let mut cursor = contour.start.to_dvec2();
    for segment in &contour.segments {
        let end = segment.end().to_dvec2();
        match segment {
            ContourSegment::Line { .. } => {
                if cursor != end {
                    segments.push(ShapeSegment::from(Line::new(cursor, end)));
                }
            }
            ContourSegment::Arc { center, clockwise, .. } => {
                segments.push(ShapeSegment::from(Arc::new(cursor, end, center.to_dvec2(), *clockwise)));
            }
        }
        cursor = end;
    }
    let start = contour.start.to_dvec2();
    if cursor != start {
        segments.push(ShapeSegment::from(Line::new(cursor, start)));
    }
    Shape::new(segments, negative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ParseOptions, parse};

    fn compile(source: &str) -> Rvmc {
        let file = parse(source, &ParseOptions::default()).unwrap();
        Compiler::new(CompileOptions::default()).compile(&file).unwrap()
    }

    fn pastes(rvmc: &Rvmc) -> Vec<(&str, DVec2, bool)> {
        rvmc.iter()
            .filter_map(|c| match c {
                Command::PasteLayer {
                    source,
                    center,
                    negative,
                } => Some((source.as_str(), *center, *negative)),
                _ => None,
            })
            .collect()
    }

    // ==================== Apertures ====================

    #[test]
    fn aperture_compiled_once() {
        let rvmc = compile("%FSLAX26Y26*%%MOMM*%%ADD11C,0.6*%D11*X0Y0D03*X1000000Y1000000D03*M02*");
        let ids: Vec<_> = rvmc.layer_ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["D11", "%main%"]);
        assert_eq!(pastes(&rvmc).len(), 2);
    }

    #[test]
    fn unused_zero_circle_is_dropped() {
        let rvmc = compile("%FSLAX26Y26*%%ADD10C,0*%D10*X0Y0D03*");
        assert_eq!(rvmc.layer_ids().len(), 1);
        assert!(pastes(&rvmc).is_empty());
    }

    #[test]
    fn transformed_flash_gets_variant_layer() {
        let rvmc = compile("%FSLAX26Y26*%%ADD10R,2X1*%D10*X0Y0D03*%LR90*%X0Y0D03*X1000000Y0D03*");
        let ids: Vec<_> = rvmc.layer_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, ["D10", "D10%N%90.00000000%1.00000000", "%main%"]);
        let Some(Command::StartLayer { bounds: Some(bounds), .. }) = rvmc
            .iter()
            .find(|c| matches!(c, Command::StartLayer { id, .. } if id.as_str().ends_with("%1.00000000")))
        else {
            panic!("missing rotated layer");
        };
        assert!((bounds.max.x - 0.5).abs() < 1e-9);
        assert!((bounds.max.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn clear_flash_pastes_negative() {
        let rvmc = compile("%FSLAX26Y26*%%ADD10C,1*%D10*%LPC*%X0Y0D03*");
        assert_eq!(pastes(&rvmc), [("D10", DVec2::ZERO, true)]);
    }

    #[test]
    fn redefined_aperture_keeps_old_image() {
        let rvmc = compile("%FSLAX26Y26*%%ADD10C,1*%D10*X0Y0D03*%ADD10C,2*%D10*X0Y0D03*");
        let sources: Vec<_> = pastes(&rvmc).iter().map(|p| p.0).collect();
        assert_eq!(sources, ["D10", "D10%v2"]);
    }

    // ==================== Strokes and regions ====================

    #[test]
    fn stroke_becomes_stadium() {
        let rvmc = compile("%FSLAX26Y26*%%MOMM*%%ADD10C,0.1*%D10*X0Y0D02*X1000000Y0D01*M02*");
        insta::assert_snapshot!(rvmc.to_string().trim_end(), @r"
        start D10 box (-0.05 -0.05) (0.05 0.05)
          dark CCW(0.05 0)(-0.05 0)@(0 0) CCW(-0.05 0)(0.05 0)@(0 0)
        end
        start %main% auto
          dark L(0 -0.05)(1 -0.05) CCW(1 -0.05)(1 0.05)@(1 0) L(1 0.05)(0 0.05) CCW(0 0.05)(0 -0.05)@(0 0)
        end
        ");
    }

    #[test]
    fn region_closes_contour() {
        let rvmc = compile("%FSLAX26Y26*%G36*X0Y0D02*X1000000Y0D01*X1000000Y1000000D01*G37*");
        let Some(Command::Shape(shape)) = rvmc.iter().find(|c| matches!(c, Command::Shape(_))) else {
            panic!("missing region");
        };
        assert_eq!(shape.segments.len(), 3);
        assert!(!shape.negative);
    }

    // ==================== Blocks and step and repeat ====================

    #[test]
    fn step_repeat_pastes_grid() {
        let rvmc = compile("%FSLAX26Y26*%%MOMM*%%ADD10C,1*%D10*%SRX2Y1I5J0*%X0Y0D03*%SR*%M02*");
        let ids: Vec<_> = rvmc.layer_ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["D10", "%SR1%", "%main%"]);
        assert_eq!(
            pastes(&rvmc),
            [
                ("D10", DVec2::ZERO, false),
                ("%SR1%", DVec2::ZERO, false),
                ("%SR1%", DVec2::new(5.0, 0.0), false),
            ]
        );
    }

    #[test]
    fn block_apertures_nest() {
        let source = "%FSLAX26Y26*%%ADD10C,1*%%ABD20*%D10*X0Y0D03*X2000000Y0D03*%AB*%\
                      %ABD21*%D20*X0Y1000000D03*%AB*%D21*X0Y0D03*";
        let rvmc = compile(source);
        let ids: Vec<_> = rvmc.layer_ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["D10", "D20", "D21", "%main%"]);
        assert_eq!(pastes(&rvmc).last(), Some(&("D21", DVec2::ZERO, false)));
    }

    #[test]
    fn mirrored_block_transforms_dependencies() {
        let source = "%FSLAX26Y26*%%ADD10C,1*%%ABD20*%D10*X1000000Y0D03*%AB*%D20*%LMX*%X0Y0D03*";
        let rvmc = compile(source);
        let ids: Vec<_> = rvmc.layer_ids().iter().map(|id| id.to_string()).collect();
        assert!(ids.contains(&"D10%X%0.00000000%1.00000000".to_string()));
        assert!(pastes(&rvmc).contains(&("D10%X%0.00000000%1.00000000", DVec2::new(-1.0, 0.0), false)));
    }

    #[test]
    fn compiling_twice_is_identical() {
        let source = "%FSLAX26Y26*%%ADD10C,1*%%ADD11R,1X2*%D10*X0Y0D03*D11*%LR45*%X1Y1D03*";
        assert_eq!(compile(source), compile(source));
    }

    #[test]
    fn unbalanced_commands_fail() {
        let mut compiler = Compiler::new(CompileOptions::default());
        assert_eq!(
            compiler.compile_commands(&[DrawCommand::EndStepRepeat]),
            Err(CompileError::UnbalancedBlock)
        );
    }
}
