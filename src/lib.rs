//! Gerber X3/X2 parsing, interpretation and rendering.
//!
//! The pipeline has four stages, each usable on its own:
//!
//! 1. [`parse`] turns source text into an [`ast::File`].
//! 2. [`state::StateTracker`] walks the tree and resolves every command
//!    against the graphics state into [`state::DrawCommand`]s.
//! 3. [`compiler::Compiler`] lowers those into [`rvmc::Rvmc`], a flat list
//!    of layer, shape and paste commands.
//! 4. [`render`] executes RVMC on the raster or vector backend.

use pest_derive::Parser;

pub mod ast;
pub mod compiler;
pub mod defaults;
pub mod errors;
pub mod log;
pub mod parse;
pub mod rvmc;
pub mod state;
pub mod types;
pub mod vm;

pub use compiler::{CompileOptions, Compiler};
pub use errors::{CompileError, GerberError, ParseError, SourceContext, StateError, VmError};
pub use parse::{ParseOptions, parse};
pub use vm::{BackendKind, RenderOptions, RenderResult, Style, render};

#[derive(Parser)]
#[grammar = "gerber.pest"]
pub struct GerberParser;

/// Interpret and compile a parsed file.
pub fn compile(file: &ast::File, options: &CompileOptions) -> Result<rvmc::Rvmc, GerberError> {
    Compiler::new(options.clone()).compile(file)
}

/// Parse, compile and render `source`; errors render against the named source.
pub fn render_source(
    name: &str,
    source: &str,
    backend: BackendKind,
    options: &RenderOptions,
) -> miette::Result<RenderResult> {
    let context = SourceContext::new(name, source);
    let parse_options = ParseOptions::default().with_source_name(name);
    let run = || -> Result<RenderResult, GerberError> {
        let file = parse(source, &parse_options)?;
        let rvmc = compile(&file, &CompileOptions::default())?;
        Ok(render(&rvmc, backend, options)?)
    };
    run().map_err(|error| context.attach(error))
}
