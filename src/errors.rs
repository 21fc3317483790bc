//! Error types with rich diagnostics using miette
//!
//! Parse errors carry their own source; errors from later stages carry the
//! location of the offending command and get their source attached by
//! [`SourceContext::attach`].

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::ast::{ApertureId, SourceInfo};

/// Source context for error reporting
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// Name of the source (filename or "<input>")
    pub name: String,
    /// The full source text
    pub source: String,
}

impl SourceContext {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create a NamedSource for miette
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.source.clone())
    }

    /// Turn any pipeline error into a report that renders against this source.
    pub fn attach(&self, error: impl Into<GerberError>) -> miette::Report {
        match error.into() {
            // Already carries its own source.
            GerberError::Parse(error) => miette::Report::new(error),
            other => miette::Report::new(other).with_source_code(self.named_source()),
        }
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// Errors raised while turning text into a syntax tree
#[derive(Error, Diagnostic, Debug)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: expected {expected}")]
    #[diagnostic(code(gerbrs::parse::unexpected_token))]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("found this")]
        span: SourceSpan,
        line: usize,
        column: usize,
        expected: String,
        found: String,
    },

    #[error("invalid number `{text}`")]
    #[diagnostic(code(gerbrs::parse::invalid_number))]
    InvalidNumber {
        text: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("invalid number")]
        span: SourceSpan,
    },

    #[error("invalid macro primitive {code}: {message}")]
    #[diagnostic(
        code(gerbrs::parse::invalid_primitive),
        help("check the parameter count of the primitive")
    )]
    InvalidPrimitive {
        code: String,
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("this primitive")]
        span: SourceSpan,
    },

    #[error("malformed {rule}")]
    #[diagnostic(code(gerbrs::parse::malformed))]
    Malformed {
        rule: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
    },
}

impl ParseError {
    /// Byte offset of the error in the source.
    pub fn offset(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidNumber { span, .. }
            | ParseError::InvalidPrimitive { span, .. }
            | ParseError::Malformed { span, .. } => span.offset(),
        }
    }
}

// ============================================================================
// State Errors
// ============================================================================

/// Semantic errors found while interpreting the command stream
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("aperture {id} is not defined")]
    #[diagnostic(
        code(gerbrs::state::aperture_not_defined),
        help("define the aperture with AD or AB before selecting it")
    )]
    ApertureNotDefined { id: ApertureId },

    #[error("no usable aperture is selected")]
    #[diagnostic(code(gerbrs::state::aperture_not_selected))]
    ApertureNotSelected,

    #[error("block aperture {id} cannot be used to plot lines or arcs")]
    #[diagnostic(code(gerbrs::state::direct_block_aperture_dispatch))]
    DirectBlockApertureDispatch { id: ApertureId },

    #[error("coordinate format is not set")]
    #[diagnostic(
        code(gerbrs::state::coordinate_format_not_set),
        help("add an FS command before the first coordinate")
    )]
    CoordinateFormatNotSet,

    #[error("packed coordinate `{coordinate}` is longer than format {integer}.{decimal}")]
    #[diagnostic(code(gerbrs::state::packed_coordinate_too_long))]
    PackedCoordinateTooLong {
        coordinate: String,
        integer: u8,
        decimal: u8,
    },

    #[error("packed coordinate `{coordinate}` is shorter than format {integer}.{decimal} allows")]
    #[diagnostic(code(gerbrs::state::packed_coordinate_too_short))]
    PackedCoordinateTooShort {
        coordinate: String,
        integer: u8,
        decimal: u8,
    },

    #[error("division by zero in `{expression}`")]
    #[diagnostic(code(gerbrs::state::division_by_zero))]
    DivisionByZero { expression: String },

    #[error("arithmetic overflow in `{expression}`")]
    #[diagnostic(code(gerbrs::state::arithmetic_overflow))]
    ArithmeticOverflow { expression: String },

    #[error("no arc center candidate matches start {start}, end {end} with offsets I={i} J={j}")]
    #[diagnostic(
        code(gerbrs::state::no_matching_arc_center),
        help("single quadrant arcs must sweep at most 90 degrees with equal start and end radii")
    )]
    NoMatchingArcCenterCandidate {
        start: String,
        end: String,
        i: String,
        j: String,
    },

    #[error("aperture macro `{name}` is not defined")]
    #[diagnostic(code(gerbrs::state::macro_not_defined))]
    MacroNotDefined { name: String },

    #[error("invalid aperture {id}: {message}")]
    #[diagnostic(code(gerbrs::state::invalid_aperture))]
    InvalidAperture { id: ApertureId, message: String },

    #[error("invalid step and repeat: {message}")]
    #[diagnostic(code(gerbrs::state::invalid_step_repeat))]
    InvalidStepRepeat { message: String },
}

impl StateError {
    /// Errors that no policy may downgrade: continuing would silently
    /// produce wrong geometry.
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            StateError::NoMatchingArcCenterCandidate { .. }
                | StateError::InvalidAperture { .. }
                | StateError::DivisionByZero { .. }
                | StateError::ArithmeticOverflow { .. }
        )
    }
}

// ============================================================================
// Compile Errors
// ============================================================================

/// Errors lowering drawing commands into RVMC
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("layer buffer `{id}` depends on itself")]
    #[diagnostic(code(gerbrs::compile::cyclic_dependency))]
    CyclicBufferDependency { id: String },

    #[error("aperture {id} has no compiled image")]
    #[diagnostic(code(gerbrs::compile::unknown_aperture))]
    UnknownAperture { id: ApertureId },

    #[error("layer buffer `{id}` was never created")]
    #[diagnostic(code(gerbrs::compile::unknown_layer))]
    UnknownLayer { id: String },

    #[error("block close without a matching open")]
    #[diagnostic(code(gerbrs::compile::unbalanced_block))]
    UnbalancedBlock,
}

// ============================================================================
// VM Errors
// ============================================================================

/// Errors executing RVMC
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("layer `{id}` already exists")]
    #[diagnostic(code(gerbrs::vm::layer_already_exists))]
    LayerAlreadyExists { id: String },

    #[error("layer `{id}` not found")]
    #[diagnostic(code(gerbrs::vm::layer_not_found))]
    LayerNotFound { id: String },

    #[error("no layer is open")]
    #[diagnostic(code(gerbrs::vm::no_layer_set))]
    NoLayerSet,

    #[error("layer `{id}` is still open and cannot be pasted")]
    #[diagnostic(
        code(gerbrs::vm::paste_deferred_layer),
        help("a layer can only be pasted after its EndLayer")
    )]
    PasteDeferredLayerNotAllowed { id: String },

    #[error("auto-sized layer `{id}` has no content")]
    #[diagnostic(code(gerbrs::vm::empty_auto_sized_layer))]
    EmptyAutoSizedLayerNotAllowed { id: String },

    #[error("resolution {resolution} is too low to tessellate arcs")]
    #[diagnostic(code(gerbrs::vm::resolution_too_low))]
    ResolutionTooLow { resolution: f64 },

    #[error("{count} layer(s) were never closed")]
    #[diagnostic(code(gerbrs::vm::unclosed_layers))]
    UnclosedLayers { count: usize },

    #[error("command stream has no `%main%` layer")]
    #[diagnostic(code(gerbrs::vm::no_main_layer))]
    NoMainLayer,

    #[error("cannot allocate a {width}x{height} surface for layer `{id}`")]
    #[diagnostic(code(gerbrs::vm::surface_allocation))]
    SurfaceAllocation { id: String, width: u32, height: u32 },

    #[error("failed to encode output: {message}")]
    #[diagnostic(code(gerbrs::vm::encoding))]
    Encoding { message: String },
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Any error of the parse, interpret, compile and render pipeline
#[derive(Error, Diagnostic, Debug)]
pub enum GerberError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error("{error}")]
    #[diagnostic(code(gerbrs::state))]
    State {
        error: StateError,
        location: Option<SourceInfo>,
        #[label("while interpreting this command")]
        span: Option<SourceSpan>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vm(#[from] VmError),
}

impl GerberError {
    pub fn state(error: StateError, location: Option<SourceInfo>) -> GerberError {
        GerberError::State {
            error,
            location,
            span: location.map(|info| info.span()),
        }
    }
}

impl From<StateError> for GerberError {
    fn from(error: StateError) -> Self {
        GerberError::state(error, None)
    }
}
