//! Gerber graphics state and its transitions.
//!
//! [`State`] is a value: [`State::apply`] never mutates, it returns a
//! [`Transition`] holding the next state plus the drawing commands and
//! warnings the command produced. Dictionaries sit behind `Rc` and are
//! copied only when written, so keeping a snapshot per command is cheap.
//!
//! - [`aperture`] - resolved aperture descriptors and validation
//! - [`arcs`] - circular plot center resolution
//! - [`attributes`] - `TF`/`TA`/`TO` dictionaries and image settings
//! - [`coordinate`] - packed coordinate formats
//! - [`macros`] - aperture macro evaluation
//! - [`policy`] - error policy and diagnostics
//! - [`tracker`] - the [`AstVisitor`](crate::ast::AstVisitor) that threads state through a file

pub mod aperture;
pub mod arcs;
pub mod attributes;
pub mod coordinate;
pub mod macros;
pub mod policy;
pub mod tracker;

use std::rc::Rc;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub use aperture::{Aperture, ApertureEntry, ApertureTransform, Primitive};
pub use attributes::{AttributeMap, Attributes, ImageAttributes};
pub use coordinate::CoordinateFormat;
pub use policy::{Diagnostic, ErrorPolicy, HookAction, Severity};
pub use tracker::StateTracker;

use crate::ast::*;
use crate::errors::StateError;
use crate::types::{Offset, Unit, Vector2D};

// ============================================================================
// Options
// ============================================================================

/// Interpretation settings
#[derive(Debug, Clone)]
pub struct StateOptions {
    pub policy: ErrorPolicy,
    /// Keep interpreting after `M00`/`M02`
    pub ignore_program_stop: bool,
    /// Also stroke region contours, for debugging region geometry
    pub draw_region_outlines: bool,
    pub region_outline_width: Offset,
    pub arc_center_tolerance: Offset,
    /// Keep a state snapshot after every command for [`StateTracker::state_at`]
    pub record_history: bool,
}

impl Default for StateOptions {
    fn default() -> Self {
        StateOptions {
            policy: ErrorPolicy::Raise,
            ignore_program_stop: false,
            draw_region_outlines: false,
            region_outline_width: Offset::from_millimeters(crate::defaults::REGION_OUTLINE_WIDTH),
            arc_center_tolerance: Offset::from_millimeters(crate::defaults::ARC_CENTER_TOLERANCE),
            record_history: false,
        }
    }
}

impl StateOptions {
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ignore_program_stop(mut self, ignore: bool) -> Self {
        self.ignore_program_stop = ignore;
        self
    }

    pub fn with_region_outlines(mut self, width: Option<Offset>) -> Self {
        self.draw_region_outlines = width.is_some();
        if let Some(width) = width {
            self.region_outline_width = width;
        }
        self
    }

    pub fn with_arc_center_tolerance(mut self, tolerance: Offset) -> Self {
        self.arc_center_tolerance = tolerance;
        self
    }

    pub fn with_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }
}

// ============================================================================
// Drawing commands
// ============================================================================

/// Plot mode selected by `G01`/`G02`/`G03`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlotMode {
    #[default]
    Linear,
    Clockwise,
    CounterClockwise,
}

/// Arc mode selected by `G74`/`G75`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArcMode {
    SingleQuadrant,
    #[default]
    MultiQuadrant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContourSegment {
    Line {
        end: Vector2D,
    },
    /// An arc whose end equals its start is a full circle
    Arc {
        end: Vector2D,
        center: Vector2D,
        clockwise: bool,
    },
}

impl ContourSegment {
    pub fn end(&self) -> Vector2D {
        match self {
            ContourSegment::Line { end } | ContourSegment::Arc { end, .. } => *end,
        }
    }
}

/// One region boundary, started by `D02` and built from `D01` segments
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub start: Vector2D,
    pub segments: Vec<ContourSegment>,
}

impl Contour {
    pub fn new(start: Vector2D) -> Contour {
        Contour {
            start,
            segments: Vec::new(),
        }
    }

    /// Boundary vertices with repeated neighbours and the closing point removed.
    pub fn vertices(&self) -> Vec<Vector2D> {
        let mut vertices = vec![self.start];
        for segment in &self.segments {
            let end = segment.end();
            if vertices.last() != Some(&end) {
                vertices.push(end);
            }
        }
        while vertices.len() > 1 && vertices.last() == vertices.first() {
            vertices.pop();
        }
        vertices
    }

    pub fn has_arc(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, ContourSegment::Arc { .. }))
    }

    /// Enough geometry to enclose an area
    pub fn is_fillable(&self) -> bool {
        self.has_arc() || self.vertices().len() >= 3
    }
}

/// Step and repeat grid from `%SRX..Y..I..J..*%`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepRepeatGrid {
    pub x_repeat: u32,
    pub y_repeat: u32,
    pub step: Vector2D,
}

/// Resolved drawing operation, in millimetres
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    DefineAperture {
        id: ApertureId,
        aperture: Aperture,
    },
    /// Following commands build the image of block aperture `id`
    BeginBlock {
        id: ApertureId,
    },
    EndBlock {
        id: ApertureId,
    },
    BeginStepRepeat {
        grid: StepRepeatGrid,
    },
    EndStepRepeat,
    Line {
        start: Vector2D,
        end: Vector2D,
        width: Offset,
        polarity: Polarity,
    },
    Arc {
        start: Vector2D,
        end: Vector2D,
        center: Vector2D,
        clockwise: bool,
        width: Offset,
        polarity: Polarity,
    },
    Flash {
        at: Vector2D,
        aperture: ApertureId,
        transform: ApertureTransform,
    },
    Region {
        contour: Contour,
        polarity: Polarity,
    },
}

// ============================================================================
// State
// ============================================================================

/// Snapshot of the graphics state between two commands
#[derive(Debug, Clone, PartialEq, Default)]
pub struct State {
    pub unit: Unit,
    pub format: Option<CoordinateFormat>,
    /// From `FS`, overridden by `G90`/`G91`
    pub notation: Notation,
    pub plot_mode: PlotMode,
    pub arc_mode: ArcMode,
    pub current_aperture: Option<ApertureId>,
    pub current_point: Vector2D,
    pub transform: ApertureTransform,
    /// Contour under construction while between `G36` and `G37`
    pub region: Option<Contour>,
    /// Block apertures being defined, innermost last
    pub open_blocks: Vec<ApertureId>,
    pub step_repeat_depth: usize,
    pub apertures: Rc<IndexMap<ApertureId, ApertureEntry>>,
    pub macros: Rc<IndexMap<String, ApertureMacro>>,
    pub attributes: Attributes,
    pub image: ImageAttributes,
}

/// Result of applying one command
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: State,
    pub commands: Vec<DrawCommand>,
    pub warnings: Vec<String>,
    /// `M00`/`M02` reached
    pub stop: bool,
}

impl Transition {
    fn new(state: State) -> Transition {
        Transition {
            state,
            commands: Vec::new(),
            warnings: Vec::new(),
            stop: false,
        }
    }

    fn warn(mut self, message: impl Into<String>) -> Transition {
        self.warnings.push(message.into());
        self
    }

    fn absorb(&mut self, next: Transition) {
        self.state = next.state;
        self.commands.extend(next.commands);
        self.warnings.extend(next.warnings);
        self.stop |= next.stop;
    }
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    fn unchanged(&self) -> Transition {
        Transition::new(self.clone())
    }

    fn deprecated(&self, what: &str) -> Transition {
        self.unchanged().warn(format!("{what} is deprecated"))
    }

    /// Apply one node. `AB` and `SR` blocks are applied with all their children.
    pub fn apply(&self, node: &Node, options: &StateOptions) -> Result<Transition, StateError> {
        let unit = self.unit;
        match &node.kind {
            NodeKind::G04(_) | NodeKind::M01 | NodeKind::Invalid(_) => Ok(self.unchanged()),
            NodeKind::G { code, .. } => Ok(self.apply_g(*code)),
            NodeKind::D01(c) => self.plot(c, options),
            NodeKind::D02(c) => self.move_to(c),
            NodeKind::D03(c) => self.flash(c),
            NodeKind::Dnn(id) => self.select(*id),
            NodeKind::M00 | NodeKind::M02 => {
                let mut transition = self.unchanged();
                transition.stop = !options.ignore_program_stop;
                Ok(transition)
            }
            NodeKind::Fs(spec) => Ok(self.set_format(spec)),
            NodeKind::Mo(unit) => {
                let mut next = self.clone();
                next.unit = *unit;
                Ok(Transition::new(next))
            }
            NodeKind::AdCircle(id, d) => Ok(self.define(*id, Aperture::circle(*id, d, unit)?)),
            NodeKind::AdRectangle(id, d) => Ok(self.define(*id, Aperture::rectangle(*id, d, unit)?)),
            NodeKind::AdObround(id, d) => Ok(self.define(*id, Aperture::obround(*id, d, unit)?)),
            NodeKind::AdPolygon(id, d) => Ok(self.define(*id, Aperture::polygon(*id, d, unit)?)),
            NodeKind::AdMacro(id, reference) => self.define_macro_instance(*id, reference),
            NodeKind::Am(definition) => {
                let mut next = self.clone();
                let redefined = Rc::make_mut(&mut next.macros)
                    .insert(definition.name.clone(), definition.clone())
                    .is_some();
                let transition = Transition::new(next);
                Ok(if redefined {
                    transition.warn(format!("aperture macro `{}` redefined", definition.name))
                } else {
                    transition
                })
            }
            NodeKind::Ab(block) => {
                let mut transition = self.open_block(block)?;
                for child in &block.nodes {
                    let next = transition.state.apply(child, options)?;
                    transition.absorb(next);
                    if transition.stop {
                        break;
                    }
                }
                let close = transition.state.close_block(block)?;
                transition.absorb(close);
                Ok(transition)
            }
            NodeKind::Sr(block) => {
                let mut transition = self.open_step_repeat(block)?;
                for child in &block.nodes {
                    let next = transition.state.apply(child, options)?;
                    transition.absorb(next);
                    if transition.stop {
                        break;
                    }
                }
                let close = transition.state.close_step_repeat();
                transition.absorb(close);
                Ok(transition)
            }
            NodeKind::Tf(attribute) => Ok(match self.attributes.with_file(attribute) {
                Some(attributes) => self.with_attributes(attributes),
                None => self.unchanged().warn(format!(
                    "file attribute `{}` is already defined and cannot change",
                    attribute.name
                )),
            }),
            NodeKind::Ta(attribute) => Ok(self.with_attributes(self.attributes.with_aperture(attribute))),
            NodeKind::To(attribute) => Ok(self.with_attributes(self.attributes.with_object(attribute))),
            NodeKind::Td(name) => Ok(self.with_attributes(self.attributes.without(name.as_deref()))),
            NodeKind::Lp(polarity) => Ok(self.with_transform(|t| t.polarity = *polarity)),
            NodeKind::Lm(mirroring) => Ok(self.with_transform(|t| t.mirroring = *mirroring)),
            NodeKind::Lr(rotation) => Ok(self.with_transform(|t| t.rotation = *rotation)),
            NodeKind::Ls(scaling) => Ok(self.with_transform(|t| t.scaling = *scaling)),
            NodeKind::Ip(polarity) => Ok(self.with_image("IP", |image| image.polarity = *polarity)),
            NodeKind::Ir(rotation) => Ok(self.with_image("IR", |image| image.rotation = *rotation)),
            NodeKind::Of { a, b } => Ok(self.with_image("OF", |image| {
                image.offset = (a.unwrap_or(Decimal::ZERO), b.unwrap_or(Decimal::ZERO))
            })),
            NodeKind::Sf { a, b } => Ok(self.with_image("SF", |image| {
                image.scale = (a.unwrap_or(Decimal::ONE), b.unwrap_or(Decimal::ONE))
            })),
            NodeKind::As(axes) => Ok(self.with_image("AS", |image| image.axes = *axes)),
            NodeKind::Mi { a, b } => Ok(self.with_image("MI", |image| {
                image.mirror = (a.unwrap_or(false), b.unwrap_or(false))
            })),
            NodeKind::In(name) => Ok(self.with_image("IN", |image| image.name = Some(name.clone()))),
            NodeKind::Ln(name) => Ok(self.with_image("LN", |image| image.layer_name = Some(name.clone()))),
        }
    }

    fn with_attributes(&self, attributes: Attributes) -> Transition {
        let mut next = self.clone();
        next.attributes = attributes;
        Transition::new(next)
    }

    fn with_transform(&self, update: impl FnOnce(&mut ApertureTransform)) -> Transition {
        let mut next = self.clone();
        update(&mut next.transform);
        Transition::new(next)
    }

    fn with_image(&self, command: &str, update: impl FnOnce(&mut ImageAttributes)) -> Transition {
        let mut next = self.clone();
        update(&mut next.image);
        Transition::new(next).warn(format!("{command} is deprecated and is not applied"))
    }

    fn apply_g(&self, code: GCode) -> Transition {
        let mut next = self.clone();
        match code {
            GCode::G01 => next.plot_mode = PlotMode::Linear,
            GCode::G02 => next.plot_mode = PlotMode::Clockwise,
            GCode::G03 => next.plot_mode = PlotMode::CounterClockwise,
            GCode::G36 => {
                if self.region.is_some() {
                    return self.unchanged().warn("G36 while a region is already open");
                }
                next.region = Some(Contour::new(self.current_point));
            }
            GCode::G37 => {
                let Some(contour) = &self.region else {
                    return self.unchanged().warn("G37 without a matching G36");
                };
                next.region = None;
                let mut transition = Transition::new(next);
                self.flush_contour(contour, &mut transition);
                return transition;
            }
            GCode::G54 | GCode::G55 => return self.deprecated(code.name()),
            GCode::G70 => next.unit = Unit::Inches,
            GCode::G71 => next.unit = Unit::Millimeters,
            GCode::G74 => next.arc_mode = ArcMode::SingleQuadrant,
            GCode::G75 => next.arc_mode = ArcMode::MultiQuadrant,
            GCode::G90 => next.notation = Notation::Absolute,
            GCode::G91 => next.notation = Notation::Incremental,
        }
        let transition = Transition::new(next);
        if code.is_deprecated() {
            transition.warn(format!("{} is deprecated", code.name()))
        } else {
            transition
        }
    }

    fn set_format(&self, spec: &FormatSpecification) -> Transition {
        if self.format.is_some() {
            return self
                .unchanged()
                .warn("coordinate format is already set, ignoring the new FS");
        }
        let format = CoordinateFormat::from(spec);
        let mut next = self.clone();
        next.format = Some(format);
        next.notation = format.notation;
        let mut transition = Transition::new(next);
        if format.zeros == ZeroOmission::Trailing {
            transition = transition.warn("trailing zero omission is deprecated");
        }
        if format.notation == Notation::Incremental {
            transition = transition.warn("incremental notation is deprecated");
        }
        transition
    }

    // ========================================================================
    // Coordinates
    // ========================================================================

    /// Target point of an operation; missing axes keep the current value.
    fn target(&self, coordinates: &Coordinates) -> Result<Vector2D, StateError> {
        if coordinates.x.is_none() && coordinates.y.is_none() {
            return Ok(self.current_point);
        }
        let format = self.format.ok_or(StateError::CoordinateFormatNotSet)?;
        let x = coordinates
            .x
            .as_ref()
            .map(|p| format.unpack_x(p, self.unit))
            .transpose()?;
        let y = coordinates
            .y
            .as_ref()
            .map(|p| format.unpack_y(p, self.unit))
            .transpose()?;
        let current = self.current_point;
        Ok(match self.notation {
            Notation::Absolute => Vector2D::new(x.unwrap_or(current.x), y.unwrap_or(current.y)),
            Notation::Incremental => {
                current + Vector2D::new(x.unwrap_or(Offset::NULL), y.unwrap_or(Offset::NULL))
            }
        })
    }

    /// `I`/`J` offset; missing values are zero.
    fn arc_offset(&self, coordinates: &Coordinates) -> Result<Vector2D, StateError> {
        if coordinates.i.is_none() && coordinates.j.is_none() {
            return Ok(Vector2D::NULL);
        }
        let format = self.format.ok_or(StateError::CoordinateFormatNotSet)?;
        let i = match &coordinates.i {
            Some(p) => format.unpack_x(p, self.unit)?,
            None => Offset::NULL,
        };
        let j = match &coordinates.j {
            Some(p) => format.unpack_y(p, self.unit)?,
            None => Offset::NULL,
        };
        Ok(Vector2D::new(i, j))
    }

    // ========================================================================
    // Operations
    // ========================================================================

    fn plot(&self, coordinates: &Coordinates, options: &StateOptions) -> Result<Transition, StateError> {
        let start = self.current_point;
        let end = self.target(coordinates)?;
        let mut ambiguous = false;
        let segment = match self.plot_mode {
            PlotMode::Linear => ContourSegment::Line { end },
            PlotMode::Clockwise | PlotMode::CounterClockwise => {
                let clockwise = self.plot_mode == PlotMode::Clockwise;
                let offset = self.arc_offset(coordinates)?;
                match self.arc_mode {
                    ArcMode::MultiQuadrant => ContourSegment::Arc {
                        end,
                        center: arcs::multi_quadrant_center(start, offset),
                        clockwise,
                    },
                    // A zero length single quadrant arc sweeps nothing.
                    ArcMode::SingleQuadrant if start == end => ContourSegment::Line { end },
                    ArcMode::SingleQuadrant => {
                        let resolved = arcs::single_quadrant_center(
                            start,
                            end,
                            offset,
                            clockwise,
                            options.arc_center_tolerance,
                        )?;
                        ambiguous = resolved.tied;
                        ContourSegment::Arc {
                            end,
                            center: resolved.center,
                            clockwise,
                        }
                    }
                }
            }
        };
        let transition = self.draw_segment(start, segment, options)?;
        Ok(if ambiguous {
            transition.warn(format!(
                "single quadrant arc from {start} to {end} matches several centers equally well, using the first"
            ))
        } else {
            transition
        })
    }

    /// Add a plotted segment to the open region or stroke it with the current aperture.
    fn draw_segment(
        &self,
        start: Vector2D,
        segment: ContourSegment,
        options: &StateOptions,
    ) -> Result<Transition, StateError> {
        let end = segment.end();

        let mut next = self.clone();
        next.current_point = end;

        if let Some(contour) = &mut next.region {
            contour.segments.push(segment.clone());
            let mut transition = Transition::new(next);
            if options.draw_region_outlines {
                transition.commands.push(stroke(
                    start,
                    &segment,
                    options.region_outline_width,
                    self.transform.polarity,
                ));
            }
            return Ok(transition);
        }

        let id = self.current_aperture.ok_or(StateError::ApertureNotSelected)?;
        let entry = self.entry(id)?;
        let direction = end - start;
        let transition = Transition::new(next);
        match (&entry.aperture, entry.aperture.stroke_width(direction, &self.transform)) {
            (Aperture::Block, _) => Err(StateError::DirectBlockApertureDispatch { id }),
            (aperture, None) => Ok(transition.warn(format!(
                "{} aperture {id} cannot draw lines, segment skipped",
                aperture.kind_name()
            ))),
            (aperture, Some(width)) => {
                let mut transition = transition;
                if !matches!(aperture, Aperture::Circle { .. }) {
                    transition = transition.warn(format!(
                        "stroke with {} aperture {id} is drawn with width {width}",
                        aperture.kind_name()
                    ));
                }
                transition
                    .commands
                    .push(stroke(start, &segment, width, self.transform.polarity));
                Ok(transition)
            }
        }
    }

    fn move_to(&self, coordinates: &Coordinates) -> Result<Transition, StateError> {
        let end = self.target(coordinates)?;
        let mut next = self.clone();
        next.current_point = end;
        let Some(contour) = &self.region else {
            return Ok(Transition::new(next));
        };
        next.region = Some(Contour::new(end));
        let mut transition = Transition::new(next);
        self.flush_contour(contour, &mut transition);
        Ok(transition)
    }

    fn flash(&self, coordinates: &Coordinates) -> Result<Transition, StateError> {
        let at = self.target(coordinates)?;
        let mut next = self.clone();
        next.current_point = at;
        if self.region.is_some() {
            return Ok(Transition::new(next).warn("D03 inside a region is ignored"));
        }
        let id = self.current_aperture.ok_or(StateError::ApertureNotSelected)?;
        if !self.apertures.contains_key(&id) {
            return Err(if self.open_blocks.contains(&id) {
                StateError::ApertureNotSelected
            } else {
                StateError::ApertureNotDefined { id }
            });
        }
        let mut transition = Transition::new(next);
        transition.commands.push(DrawCommand::Flash {
            at,
            aperture: id,
            transform: self.transform,
        });
        Ok(transition)
    }

    fn select(&self, id: ApertureId) -> Result<Transition, StateError> {
        if !self.apertures.contains_key(&id) && !self.open_blocks.contains(&id) {
            return Err(StateError::ApertureNotDefined { id });
        }
        let mut next = self.clone();
        next.current_aperture = Some(id);
        Ok(Transition::new(next))
    }

    fn entry(&self, id: ApertureId) -> Result<&ApertureEntry, StateError> {
        match self.apertures.get(&id) {
            Some(entry) => Ok(entry),
            None if self.open_blocks.contains(&id) => Err(StateError::DirectBlockApertureDispatch { id }),
            None => Err(StateError::ApertureNotDefined { id }),
        }
    }

    /// Turn a finished contour into a region command, or a warning when it
    /// cannot enclose anything.
    fn flush_contour(&self, contour: &Contour, transition: &mut Transition) {
        if contour.segments.is_empty() {
            return;
        }
        if !contour.is_fillable() {
            transition.warnings.push(format!(
                "region contour with {} distinct vertices skipped",
                contour.vertices().len()
            ));
            return;
        }
        transition.commands.push(DrawCommand::Region {
            contour: contour.clone(),
            polarity: self.transform.polarity,
        });
    }

    // ========================================================================
    // Apertures
    // ========================================================================

    fn define(&self, id: ApertureId, aperture: Aperture) -> Transition {
        let mut next = self.clone();
        let entry = ApertureEntry {
            aperture: aperture.clone(),
            attributes: self.attributes.aperture.clone(),
        };
        let redefined = Rc::make_mut(&mut next.apertures).insert(id, entry).is_some();
        let mut transition = Transition::new(next);
        if redefined {
            transition = transition.warn(format!("aperture {id} redefined"));
        }
        transition.commands.push(DrawCommand::DefineAperture { id, aperture });
        transition
    }

    fn define_macro_instance(&self, id: ApertureId, reference: &MacroReference) -> Result<Transition, StateError> {
        let definition = self
            .macros
            .get(&reference.name)
            .ok_or_else(|| StateError::MacroNotDefined {
                name: reference.name.clone(),
            })?;
        let instance = macros::instantiate(id, definition, &reference.parameters, self.unit)?;
        let mut transition = self.define(
            id,
            Aperture::Macro {
                name: reference.name.clone(),
                primitives: instance.primitives,
            },
        );
        transition.warnings.extend(instance.warnings);
        Ok(transition)
    }

    /// `%ABDnn*%`: start capturing the block's image.
    pub fn open_block(&self, block: &ApertureBlock) -> Result<Transition, StateError> {
        let id = block.aperture_id;
        let mut next = self.clone();
        next.open_blocks.push(id);
        let mut transition = Transition::new(next);
        transition.commands.push(DrawCommand::BeginBlock { id });
        Ok(transition)
    }

    /// `%AB*%`: the block becomes a usable aperture.
    pub fn close_block(&self, block: &ApertureBlock) -> Result<Transition, StateError> {
        let id = block.aperture_id;
        let mut next = self.clone();
        next.open_blocks.pop();
        let entry = ApertureEntry {
            aperture: Aperture::Block,
            attributes: self.attributes.aperture.clone(),
        };
        Rc::make_mut(&mut next.apertures).insert(id, entry);
        let mut transition = Transition::new(next);
        transition.commands.push(DrawCommand::EndBlock { id });
        Ok(transition)
    }

    pub fn open_step_repeat(&self, block: &StepRepeat) -> Result<Transition, StateError> {
        let p = &block.parameters;
        let repeat = |value: Option<Decimal>, axis: &str| -> Result<u32, StateError> {
            let value = value.unwrap_or(Decimal::ONE);
            match value.to_u32() {
                Some(count) if count >= 1 && value.fract().is_zero() => Ok(count),
                _ => Err(StateError::InvalidStepRepeat {
                    message: format!("{axis} repeat count {value} is not a positive integer"),
                }),
            }
        };
        let step = |value: Option<Decimal>, axis: &str| -> Result<Offset, StateError> {
            let value = value.unwrap_or(Decimal::ZERO);
            if value.is_sign_negative() && !value.is_zero() {
                return Err(StateError::InvalidStepRepeat {
                    message: format!("{axis} step {value} is negative"),
                });
            }
            Ok(Offset::new(value, self.unit))
        };
        let grid = StepRepeatGrid {
            x_repeat: repeat(p.x, "X")?,
            y_repeat: repeat(p.y, "Y")?,
            step: Vector2D::new(step(p.i, "I")?, step(p.j, "J")?),
        };
        let mut next = self.clone();
        next.step_repeat_depth += 1;
        let mut transition = Transition::new(next);
        transition.commands.push(DrawCommand::BeginStepRepeat { grid });
        Ok(transition)
    }

    pub fn close_step_repeat(&self) -> Transition {
        let mut next = self.clone();
        next.step_repeat_depth = next.step_repeat_depth.saturating_sub(1);
        let mut transition = Transition::new(next);
        transition.commands.push(DrawCommand::EndStepRepeat);
        transition
    }
}

/// Stroke of one plotted segment.
fn stroke(start: Vector2D, segment: &ContourSegment, width: Offset, polarity: Polarity) -> DrawCommand {
    match *segment {
        ContourSegment::Line { end } => DrawCommand::Line {
            start,
            end,
            width,
            polarity,
        },
        ContourSegment::Arc { end, center, clockwise } => DrawCommand::Arc {
            start,
            end,
            center,
            clockwise,
            width,
            polarity,
        },
    }
}
