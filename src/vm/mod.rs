//! Layer virtual machine executing RVMC against a drawing backend.
//!
//! Layers with a known box draw straight onto a backend surface. Auto-sized
//! layers buffer their commands; when they close, the box is computed from
//! the buffered shapes and pasted layers, a surface is created and the
//! buffer is replayed onto it.

pub mod raster;
pub mod style;
pub mod tessellation;
pub mod vector;

use std::fmt;
use std::str::FromStr;

use glam::DVec2;
use indexmap::IndexMap;

pub use raster::{RasterBackend, RasterResult};
pub use style::{Color, Style};
pub use tessellation::ArcPolicy;
pub use vector::{VectorBackend, VectorResult};

use crate::errors::VmError;
use crate::rvmc::{Command, LayerBox, LayerId, Rvmc, Shape};
use crate::types::BoundingBox;

// ============================================================================
// Options
// ============================================================================

/// What happens to an auto-sized layer that ends up with no content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyLayerPolicy {
    /// Register it as empty; pastes of it draw nothing
    #[default]
    Drop,
    Raise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Raster resolution in dots per millimetre
    pub dpmm: f64,
    pub empty_layer_policy: EmptyLayerPolicy,
    pub arc_policy: ArcPolicy,
    pub anti_alias: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            dpmm: crate::defaults::DOTS_PER_MM,
            empty_layer_policy: EmptyLayerPolicy::Drop,
            arc_policy: ArcPolicy::default(),
            anti_alias: true,
        }
    }
}

impl RenderOptions {
    pub fn with_dpmm(mut self, dpmm: f64) -> Self {
        self.dpmm = dpmm;
        self
    }

    pub fn with_empty_layer_policy(mut self, policy: EmptyLayerPolicy) -> Self {
        self.empty_layer_policy = policy;
        self
    }

    pub fn with_arc_policy(mut self, policy: ArcPolicy) -> Self {
        self.arc_policy = policy;
        self
    }

    pub fn with_anti_alias(mut self, anti_alias: bool) -> Self {
        self.anti_alias = anti_alias;
        self
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Drawing primitives of one output format
pub trait Backend {
    type Surface;
    type Output;

    /// Blank surface covering `bounds`, in layer-local millimetres.
    fn create_surface(&mut self, id: &LayerId, bounds: LayerBox) -> Result<Self::Surface, VmError>;

    fn draw_shape(&mut self, target: &mut Self::Surface, shape: &Shape) -> Result<(), VmError>;

    /// Draw `source` onto `target`, its local origin moved to `offset`.
    fn paste(
        &mut self,
        target: &mut Self::Surface,
        source: &Self::Surface,
        offset: DVec2,
        negative: bool,
    ) -> Result<(), VmError>;

    fn finish(self, main: ClosedLayer<Self::Surface>) -> Result<Self::Output, VmError>;
}

/// A layer after its `EndLayer`
#[derive(Debug)]
pub struct ClosedLayer<S> {
    pub id: LayerId,
    pub bounds: LayerBox,
    pub origin: DVec2,
    /// `None` for a dropped empty layer
    pub surface: Option<S>,
}

enum OpenLayer<S> {
    Eager {
        id: LayerId,
        bounds: LayerBox,
        origin: DVec2,
        surface: S,
    },
    Deferred {
        id: LayerId,
        origin: DVec2,
        commands: Vec<Command>,
    },
}

impl<S> OpenLayer<S> {
    fn id(&self) -> &LayerId {
        match self {
            OpenLayer::Eager { id, .. } | OpenLayer::Deferred { id, .. } => id,
        }
    }
}

// ============================================================================
// Virtual machine
// ============================================================================

pub struct VirtualMachine<B: Backend> {
    backend: B,
    options: RenderOptions,
    stack: Vec<OpenLayer<B::Surface>>,
    layers: IndexMap<LayerId, ClosedLayer<B::Surface>>,
}

impl<B: Backend> VirtualMachine<B> {
    pub fn new(backend: B, options: RenderOptions) -> Self {
        VirtualMachine {
            backend,
            options,
            stack: Vec::new(),
            layers: IndexMap::new(),
        }
    }

    pub fn run(mut self, rvmc: &Rvmc) -> Result<B::Output, VmError> {
        self.options.arc_policy.validate()?;
        crate::log::info!(commands = rvmc.len(), "executing rvmc");
        for command in rvmc {
            self.execute(command)?;
        }
        if !self.stack.is_empty() {
            return Err(VmError::UnclosedLayers {
                count: self.stack.len(),
            });
        }
        let main = self
            .layers
            .shift_remove(&LayerId::main())
            .ok_or(VmError::NoMainLayer)?;
        self.backend.finish(main)
    }

    fn execute(&mut self, command: &Command) -> Result<(), VmError> {
        match command {
            Command::StartLayer { id, bounds, origin } => self.start_layer(id, *bounds, *origin),
            Command::Shape(shape) => match self.stack.last_mut() {
                None => Err(VmError::NoLayerSet),
                Some(OpenLayer::Eager { surface, .. }) => self.backend.draw_shape(surface, shape),
                Some(OpenLayer::Deferred { commands, .. }) => {
                    commands.push(command.clone());
                    Ok(())
                }
            },
            Command::PasteLayer {
                source,
                center,
                negative,
            } => {
                self.check_pasteable(source)?;
                match self.stack.last_mut() {
                    None => Err(VmError::NoLayerSet),
                    Some(OpenLayer::Eager { surface, .. }) => {
                        let Some(closed) = self.layers.get(source) else {
                            return Err(VmError::LayerNotFound { id: source.to_string() });
                        };
                        match &closed.surface {
                            Some(pasted) => {
                                self.backend
                                    .paste(surface, pasted, *center - closed.origin, *negative)
                            }
                            None => Ok(()),
                        }
                    }
                    Some(OpenLayer::Deferred { commands, .. }) => {
                        commands.push(command.clone());
                        Ok(())
                    }
                }
            }
            Command::EndLayer => self.end_layer(),
        }
    }

    fn check_pasteable(&self, source: &LayerId) -> Result<(), VmError> {
        if self.stack.iter().any(|layer| layer.id() == source) {
            return Err(VmError::PasteDeferredLayerNotAllowed { id: source.to_string() });
        }
        if !self.layers.contains_key(source) {
            return Err(VmError::LayerNotFound { id: source.to_string() });
        }
        Ok(())
    }

    fn start_layer(&mut self, id: &LayerId, bounds: Option<LayerBox>, origin: DVec2) -> Result<(), VmError> {
        if self.layers.contains_key(id) || self.stack.iter().any(|layer| layer.id() == id) {
            return Err(VmError::LayerAlreadyExists { id: id.to_string() });
        }
        let layer = match bounds {
            Some(bounds) => {
                crate::log::debug!(%id, "push eager layer");
                OpenLayer::Eager {
                    id: id.clone(),
                    bounds,
                    origin,
                    surface: self.backend.create_surface(id, bounds)?,
                }
            }
            None => {
                crate::log::debug!(%id, "push deferred layer");
                OpenLayer::Deferred {
                    id: id.clone(),
                    origin,
                    commands: Vec::new(),
                }
            }
        };
        self.stack.push(layer);
        Ok(())
    }

    fn end_layer(&mut self) -> Result<(), VmError> {
        match self.stack.pop() {
            None => Err(VmError::NoLayerSet),
            Some(OpenLayer::Eager {
                id,
                bounds,
                origin,
                surface,
            }) => {
                crate::log::debug!(%id, "pop eager layer");
                self.layers.insert(
                    id.clone(),
                    ClosedLayer {
                        id,
                        bounds,
                        origin,
                        surface: Some(surface),
                    },
                );
                Ok(())
            }
            Some(OpenLayer::Deferred { id, origin, commands }) => {
                let bounds = self.deferred_box(&commands);
                if bounds.is_null() {
                    if self.options.empty_layer_policy == EmptyLayerPolicy::Raise {
                        return Err(VmError::EmptyAutoSizedLayerNotAllowed { id: id.to_string() });
                    }
                    crate::log::debug!(%id, "dropping empty layer");
                    self.layers.insert(
                        id.clone(),
                        ClosedLayer {
                            id,
                            bounds,
                            origin,
                            surface: None,
                        },
                    );
                    return Ok(());
                }
                crate::log::debug!(%id, "promoting deferred layer");
                let surface = self.backend.create_surface(&id, bounds)?;
                self.stack.push(OpenLayer::Eager {
                    id,
                    bounds,
                    origin,
                    surface,
                });
                for command in &commands {
                    self.execute(command)?;
                }
                self.end_layer()
            }
        }
    }

    /// Shapes' own boxes plus the boxes of pasted (closed) layers.
    fn deferred_box(&self, commands: &[Command]) -> LayerBox {
        commands.iter().fold(LayerBox::NULL, |acc, command| match command {
            Command::Shape(shape) => acc.union(&shape.outer_box()),
            Command::PasteLayer { source, center, .. } => match self.layers.get(source) {
                Some(closed) if closed.surface.is_some() => {
                    acc.union(&closed.bounds.translate(*center - closed.origin))
                }
                _ => acc,
            },
            _ => acc,
        })
    }
}

// ============================================================================
// Backend selection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// tiny-skia pixmaps
    Raster,
    /// Polygon boolean operations
    Vector,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Raster => "raster",
            BackendKind::Vector => "vector",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown backend `{}` (expected raster or vector)", self.0)
    }
}

impl std::error::Error for UnknownBackend {}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raster" | "pillow" => Ok(BackendKind::Raster),
            "vector" | "shapely" => Ok(BackendKind::Vector),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Output of either backend
#[derive(Debug, Clone)]
pub enum RenderResult {
    Raster(RasterResult),
    Vector(VectorResult),
}

impl RenderResult {
    /// False when the main layer drew nothing
    pub fn is_success(&self) -> bool {
        match self {
            RenderResult::Raster(result) => result.is_success(),
            RenderResult::Vector(result) => result.is_success(),
        }
    }

    pub fn main_box(&self) -> Option<BoundingBox> {
        match self {
            RenderResult::Raster(result) => result.main_box(),
            RenderResult::Vector(result) => result.main_box(),
        }
    }

    /// Raster image; vector results are rasterized at `dpmm`.
    pub fn get_image(&self, style: &Style) -> Option<tiny_skia::Pixmap> {
        match self {
            RenderResult::Raster(result) => result.get_image(style),
            RenderResult::Vector(result) => result.get_image(style),
        }
    }

    /// SVG document. Only vector results have one.
    pub fn to_svg(&self, style: &Style) -> Option<Result<String, VmError>> {
        match self {
            RenderResult::Raster(_) => None,
            RenderResult::Vector(result) => Some(result.to_svg(style)),
        }
    }
}

/// Execute `rvmc` on the chosen backend.
pub fn render(rvmc: &Rvmc, kind: BackendKind, options: &RenderOptions) -> Result<RenderResult, VmError> {
    let _stage = crate::log::stage("render");
    crate::log::debug!(backend = %kind, commands = rvmc.len(), "rendering");
    Ok(match kind {
        BackendKind::Raster => {
            let backend = RasterBackend::new(options)?;
            RenderResult::Raster(VirtualMachine::new(backend, *options).run(rvmc)?)
        }
        BackendKind::Vector => {
            let backend = VectorBackend::new(options);
            RenderResult::Vector(VirtualMachine::new(backend, *options).run(rvmc)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvmc::{Builder, shapes};
    use glam::dvec2;

    /// Records what the machine asks of a backend.
    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl Backend for Recorder {
        type Surface = LayerBox;
        type Output = Vec<String>;

        fn create_surface(&mut self, id: &LayerId, bounds: LayerBox) -> Result<LayerBox, VmError> {
            self.log.push(format!("create {id} {:?} {:?}", bounds.min, bounds.max));
            Ok(bounds)
        }

        fn draw_shape(&mut self, _: &mut LayerBox, shape: &Shape) -> Result<(), VmError> {
            self.log.push(format!("shape negative={}", shape.negative));
            Ok(())
        }

        fn paste(&mut self, _: &mut LayerBox, _: &LayerBox, offset: DVec2, negative: bool) -> Result<(), VmError> {
            self.log.push(format!("paste {offset:?} negative={negative}"));
            Ok(())
        }

        fn finish(mut self, main: ClosedLayer<LayerBox>) -> Result<Vec<String>, VmError> {
            self.log.push(format!("main {:?}", main.bounds.max));
            Ok(self.log)
        }
    }

    fn run(rvmc: &Rvmc) -> Result<Vec<String>, VmError> {
        VirtualMachine::new(Recorder::default(), RenderOptions::default()).run(rvmc)
    }

    fn start(id: &str, bounds: Option<LayerBox>) -> Command {
        Command::StartLayer {
            id: LayerId::new(id),
            bounds,
            origin: DVec2::ZERO,
        }
    }

    fn paste(id: &str) -> Command {
        Command::PasteLayer {
            source: LayerId::new(id),
            center: DVec2::ZERO,
            negative: false,
        }
    }

    // ==================== Layer discipline ====================

    #[test]
    fn deferred_layer_sized_from_content() {
        let mut builder = Builder::new();
        let dot = builder.layer("dot", None, DVec2::ZERO, |layer| {
            layer.shape(shapes::circle(DVec2::ZERO, 2.0, false));
        });
        let rvmc = builder.main(None, |main| {
            main.paste(&dot, dvec2(10.0, 0.0), false);
        });
        let log = run(&rvmc).unwrap();
        assert_eq!(
            log,
            [
                "create dot DVec2(-1.0, -1.0) DVec2(1.0, 1.0)",
                "shape negative=false",
                "create %main% DVec2(9.0, -1.0) DVec2(11.0, 1.0)",
                "paste DVec2(10.0, 0.0) negative=false",
                "main DVec2(11.0, 1.0)",
            ]
        );
    }

    #[test]
    fn origin_shifts_paste() {
        let mut builder = Builder::new();
        let dot = builder.layer("dot", None, dvec2(1.0, 0.0), |layer| {
            layer.shape(shapes::circle(dvec2(1.0, 0.0), 2.0, false));
        });
        let rvmc = builder.main(None, |main| {
            main.paste(&dot, DVec2::ZERO, true);
        });
        let log = run(&rvmc).unwrap();
        assert_eq!(log[3], "paste DVec2(-1.0, 0.0) negative=true");
        assert_eq!(log[4], "main DVec2(1.0, 1.0)");
    }

    #[test]
    fn extra_end_layer() {
        let rvmc = Rvmc::new(vec![Command::EndLayer]);
        assert_eq!(run(&rvmc), Err(VmError::NoLayerSet));
    }

    #[test]
    fn shape_outside_layer() {
        let rvmc = Rvmc::new(vec![Command::Shape(shapes::circle(DVec2::ZERO, 1.0, false))]);
        assert_eq!(run(&rvmc), Err(VmError::NoLayerSet));
    }

    #[test]
    fn unclosed_layers() {
        let rvmc = Rvmc::new(vec![start("%main%", None)]);
        assert_eq!(run(&rvmc), Err(VmError::UnclosedLayers { count: 1 }));
    }

    #[test]
    fn missing_main() {
        let rvmc = Rvmc::new(vec![start("a", None), Command::EndLayer]);
        assert_eq!(run(&rvmc), Err(VmError::NoMainLayer));
    }

    #[test]
    fn duplicate_layer() {
        let rvmc = Rvmc::new(vec![
            start("a", None),
            Command::EndLayer,
            start("a", None),
            Command::EndLayer,
        ]);
        assert_eq!(run(&rvmc), Err(VmError::LayerAlreadyExists { id: "a".into() }));
    }

    #[test]
    fn paste_unknown_layer() {
        let rvmc = Builder::new().main(None, |main| {
            main.paste_id("nope", DVec2::ZERO, false);
        });
        assert_eq!(run(&rvmc), Err(VmError::LayerNotFound { id: "nope".into() }));
    }

    #[test]
    fn paste_open_layer() {
        let rvmc = Builder::new().main(None, |main| {
            main.paste_id("%main%", DVec2::ZERO, false);
        });
        assert_eq!(
            run(&rvmc),
            Err(VmError::PasteDeferredLayerNotAllowed { id: "%main%".into() })
        );

        let rvmc = Rvmc::new(vec![
            start("%main%", Some(LayerBox::new(DVec2::ZERO, DVec2::ONE))),
            start("inner", None),
            paste("%main%"),
        ]);
        assert_eq!(
            run(&rvmc),
            Err(VmError::PasteDeferredLayerNotAllowed { id: "%main%".into() })
        );
    }

    #[test]
    fn empty_layer_policies() {
        let rvmc = Rvmc::new(vec![
            start("empty", None),
            Command::EndLayer,
            start("%main%", None),
            paste("empty"),
            Command::Shape(shapes::circle(DVec2::ZERO, 1.0, false)),
            Command::EndLayer,
        ]);
        let log = run(&rvmc).unwrap();
        assert!(log.iter().all(|line| !line.starts_with("paste")));

        let options = RenderOptions::default().with_empty_layer_policy(EmptyLayerPolicy::Raise);
        assert_eq!(
            VirtualMachine::new(Recorder::default(), options).run(&rvmc),
            Err(VmError::EmptyAutoSizedLayerNotAllowed { id: "empty".into() })
        );
    }

    #[test]
    fn bad_arc_policy_is_rejected_up_front() {
        let options = RenderOptions::default().with_arc_policy(ArcPolicy::default().with_resolution(0.0));
        let rvmc = Builder::new().main(None, |_| {});
        assert!(matches!(
            VirtualMachine::new(Recorder::default(), options).run(&rvmc),
            Err(VmError::ResolutionTooLow { .. })
        ));
    }

    // ==================== Backend selection ====================

    #[test]
    fn backend_names() {
        assert_eq!("raster".parse(), Ok(BackendKind::Raster));
        assert_eq!("Pillow".parse(), Ok(BackendKind::Raster));
        assert_eq!("shapely".parse(), Ok(BackendKind::Vector));
        assert!("cairo".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Vector.to_string(), "vector");
    }
}
