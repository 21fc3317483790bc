//! End-to-end checks from source text to rendered output.

use glam::DVec2;
use gerbrs::ast::NodeKind;
use gerbrs::rvmc::{Command, Rvmc};
use gerbrs::{
    BackendKind, CompileOptions, GerberError, ParseOptions, RenderOptions, RenderResult, StateError, Style, compile,
    parse, render,
};

fn compile_source(source: &str) -> Result<Rvmc, GerberError> {
    let file = parse(source, &ParseOptions::default())?;
    compile(&file, &CompileOptions::default())
}

fn pastes(rvmc: &Rvmc) -> Vec<(&str, DVec2)> {
    rvmc.iter()
        .filter_map(|c| match c {
            Command::PasteLayer { source, center, .. } => Some((source.as_str(), *center)),
            _ => None,
        })
        .collect()
}

fn close(a: DVec2, b: DVec2) -> bool {
    a.distance(b) < 1e-9
}

#[test]
fn single_stroke() {
    let source = "%FSLAX26Y26*%\n%MOMM*%\n%ADD10C,0.1*%\nD10*\nX0Y0D02*\nX1000000Y0D01*\nM02*";
    let file = parse(source, &ParseOptions::default()).unwrap();
    let names: Vec<_> = file.nodes.iter().map(|n| n.kind.name()).collect();
    assert_eq!(names, ["FS", "MO", "ADC", "Dnn", "D02", "D01", "M02"]);

    let rvmc = compile(&file, &CompileOptions::default()).unwrap();
    let ids: Vec<_> = rvmc.layer_ids().iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, ["D10", "%main%"]);

    // D10 holds the 0.1 mm circle
    let Some(Command::StartLayer { bounds: Some(aperture), .. }) = rvmc.commands.first() else {
        panic!("aperture layer must come first");
    };
    assert!(close(aperture.size(), DVec2::splat(0.1)));

    let main_start = rvmc
        .iter()
        .position(|c| matches!(c, Command::StartLayer { id, .. } if id.is_main()))
        .unwrap();
    let strokes: Vec<_> = rvmc.commands[main_start..]
        .iter()
        .filter_map(|c| match c {
            Command::Shape(shape) => Some(shape),
            _ => None,
        })
        .collect();
    assert_eq!(strokes.len(), 1);
    let bounds = strokes[0].outer_box();
    assert!(close(bounds.min, DVec2::new(-0.05, -0.05)));
    assert!(close(bounds.max, DVec2::new(1.05, 0.05)));
    assert!(!strokes[0].negative);
}

#[test]
fn flashes_reuse_aperture_layer() {
    let source = "%FSLAX26Y26*%%MOMM*%%ADD11C,0.6*%D11*X0Y0D03*X2000000Y500000D03*M02*";
    let rvmc = compile_source(source).unwrap();
    let d11_layers = rvmc.layer_ids().iter().filter(|id| id.as_str() == "D11").count();
    assert_eq!(d11_layers, 1);
    assert_eq!(
        pastes(&rvmc),
        [("D11", DVec2::ZERO), ("D11", DVec2::new(2.0, 0.5))]
    );
}

#[test]
fn region_fills_once() {
    let source = "%FSLAX26Y26*%%MOMM*%G36*X0Y0D02*X2000000Y0D01*X2000000Y1000000D01*X0Y1000000D01*X0Y0D01*G37*M02*";
    let rvmc = compile_source(source).unwrap();
    let shapes: Vec<_> = rvmc
        .iter()
        .filter_map(|c| match c {
            Command::Shape(shape) => Some(shape),
            _ => None,
        })
        .collect();
    assert_eq!(shapes.len(), 1);
    assert!(!shapes[0].negative);
    // four distinct vertices, closed back to the start
    assert_eq!(shapes[0].segments.len(), 4);

    let result = render(&rvmc, BackendKind::Vector, &RenderOptions::default()).unwrap();
    let RenderResult::Vector(vector) = result else {
        panic!("vector backend requested");
    };
    assert!((vector.area() - 2.0).abs() < 1e-6);
}

#[test]
fn degenerate_region_is_skipped() {
    let source = "%FSLAX26Y26*%%MOMM*%G36*X0Y0D02*X2000000Y0D01*X0Y0D01*G37*M02*";
    let file = parse(source, &ParseOptions::default()).unwrap();
    let mut compiler = gerbrs::Compiler::new(CompileOptions::default());
    let rvmc = compiler.compile(&file).unwrap();
    assert!(!rvmc.iter().any(|c| matches!(c, Command::Shape(_))));
    assert!(
        compiler
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("skipped")),
        "{:?}",
        compiler.diagnostics()
    );
}

#[test]
fn step_repeat_pastes_copies() {
    let source = "%FSLAX26Y26*%%MOMM*%%ADD10C,1*%D10*%SRX2Y1I5J0*%X0Y0D03*%SR*%M02*";
    let rvmc = compile_source(source).unwrap();
    let block = pastes(&rvmc)
        .into_iter()
        .filter(|(id, _)| id.starts_with("%SR"))
        .map(|(_, center)| center)
        .collect::<Vec<_>>();
    assert_eq!(block, [DVec2::ZERO, DVec2::new(5.0, 0.0)]);

    let result = render(&rvmc, BackendKind::Vector, &RenderOptions::default()).unwrap();
    let bounds = result.main_box().unwrap();
    assert!((bounds.width().as_f64() - 6.0).abs() < 1e-6);
}

#[test]
fn zero_size_apertures() {
    assert!(compile_source("%FSLAX26Y26*%%MOMM*%%ADD10C,0*%M02*").is_ok());
    let error = compile_source("%FSLAX26Y26*%%MOMM*%%ADD10R,0X0*%M02*").unwrap_err();
    assert!(
        matches!(
            error,
            GerberError::State {
                error: StateError::InvalidAperture { .. },
                ..
            }
        ),
        "{error:?}"
    );
}

#[test]
fn resilient_parse_recovers() {
    let options = ParseOptions::default().with_resilient(true);
    let file = parse("X1000Y2000D01* GARBAGE* X500Y500D02*", &options).unwrap();
    assert_eq!(file.nodes.len(), 3);
    assert!(matches!(file.nodes[0].kind, NodeKind::D01(_)));
    assert!(matches!(&file.nodes[1].kind, NodeKind::Invalid(text) if text == "GARBAGE"));
    assert!(matches!(file.nodes[2].kind, NodeKind::D02(_)));
    assert_eq!(file.diagnostics().len(), 1);
}

#[test]
fn backends_agree_on_extent() {
    let source = "%FSLAX26Y26*%%MOMM*%%ADD10R,2X1*%D10*X0Y0D03*X4000000Y0D03*M02*";
    let rvmc = compile_source(source).unwrap();
    let vector = render(&rvmc, BackendKind::Vector, &RenderOptions::default()).unwrap();
    let raster = render(&rvmc, BackendKind::Raster, &RenderOptions::default()).unwrap();
    assert_eq!(vector.main_box(), raster.main_box());

    let svg = vector.to_svg(&Style::COPPER).unwrap().unwrap();
    assert!(svg.contains("<svg"), "{svg}");
    let image = raster.get_image(&Style::COPPER).unwrap();
    assert!(image.width() > 0 && image.height() > 0);
}
