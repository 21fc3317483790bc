//! Hand construction of RVMC without Gerber source.
//!
//! Layers are filled inside closures, so a layer cannot receive commands once
//! its closure has returned. Pasting through a [`LayerHandle`] always refers to
//! a closed layer; [`LayerBuilder::paste_id`] accepts any id and leaves
//! validation to the virtual machine.

use glam::DVec2;

use super::{Command, LayerBox, LayerId, Rvmc, Shape};

/// Proof that a layer was built and closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHandle {
    id: LayerId,
}

impl LayerHandle {
    pub fn id(&self) -> &LayerId {
        &self.id
    }
}

#[derive(Debug, Default)]
pub struct Builder {
    commands: Vec<Command>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Build a top level layer.
    pub fn layer(
        &mut self,
        id: impl Into<LayerId>,
        bounds: Option<LayerBox>,
        origin: DVec2,
        build: impl FnOnce(&mut LayerBuilder<'_>),
    ) -> LayerHandle {
        build_layer(&mut self.commands, id.into(), bounds, origin, build)
    }

    /// Build the `%main%` layer and finish the stream.
    pub fn main(mut self, bounds: Option<LayerBox>, build: impl FnOnce(&mut LayerBuilder<'_>)) -> Rvmc {
        build_layer(&mut self.commands, LayerId::main(), bounds, DVec2::ZERO, build);
        self.finish()
    }

    pub fn finish(self) -> Rvmc {
        Rvmc::new(self.commands)
    }
}

fn build_layer(
    commands: &mut Vec<Command>,
    id: LayerId,
    bounds: Option<LayerBox>,
    origin: DVec2,
    build: impl FnOnce(&mut LayerBuilder<'_>),
) -> LayerHandle {
    commands.push(Command::StartLayer {
        id: id.clone(),
        bounds,
        origin,
    });
    build(&mut LayerBuilder { commands: &mut *commands });
    commands.push(Command::EndLayer);
    LayerHandle { id }
}

/// Commands of one open layer
pub struct LayerBuilder<'b> {
    commands: &'b mut Vec<Command>,
}

impl LayerBuilder<'_> {
    pub fn shape(&mut self, shape: Shape) -> &mut Self {
        self.commands.push(Command::Shape(shape));
        self
    }

    pub fn paste(&mut self, layer: &LayerHandle, center: DVec2, negative: bool) -> &mut Self {
        self.paste_id(layer.id.clone(), center, negative)
    }

    /// Paste by raw id. Nothing checks that the layer exists or is closed
    /// until the stream runs.
    pub fn paste_id(&mut self, id: impl Into<LayerId>, center: DVec2, negative: bool) -> &mut Self {
        self.commands.push(Command::PasteLayer {
            source: id.into(),
            center,
            negative,
        });
        self
    }

    /// Build a layer nested in this one.
    pub fn layer(
        &mut self,
        id: impl Into<LayerId>,
        bounds: Option<LayerBox>,
        origin: DVec2,
        build: impl FnOnce(&mut LayerBuilder<'_>),
    ) -> LayerHandle {
        build_layer(self.commands, id.into(), bounds, origin, build)
    }
}
