use datatest_stable::Utf8Path;
use facet_svg::{Svg, SvgNode, facet_xml};
use gerbrs::ast::File;
use gerbrs::{BackendKind, CompileOptions, ParseOptions, RenderOptions, RenderResult, Style, compile, parse, render};
use regex_lite::Regex;
use std::sync::Once;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Round-trip
// =============================================================================

/// Collapse whitespace so only the command text is compared
fn normalize(code: &str) -> String {
    let whitespace = Regex::new(r"\s+").unwrap();
    whitespace.replace_all(code, "").into_owned()
}

/// Format a colored inline diff using dissimilar
fn format_inline_diff(expected: &str, actual: &str) -> String {
    use dissimilar::Chunk;

    let mut output = String::new();
    output.push_str("\n=== Inline Diff ===\n");
    output.push_str("Legend: [-first only-] [+second only+] [unchanged]\n\n");
    for chunk in dissimilar::diff(expected, actual) {
        match chunk {
            Chunk::Equal(s) if s.chars().count() > 80 => {
                let head: String = s.chars().take(40).collect();
                let mut tail: Vec<char> = s.chars().rev().take(40).collect();
                tail.reverse();
                output.push_str(&head);
                output.push_str(" ... ");
                output.extend(tail);
            }
            Chunk::Equal(s) => output.push_str(s),
            Chunk::Delete(s) => {
                output.push_str("\x1b[31m[-");
                output.push_str(s);
                output.push_str("-]\x1b[0m");
            }
            Chunk::Insert(s) => {
                output.push_str("\x1b[32m[+");
                output.push_str(s);
                output.push_str("+]\x1b[0m");
            }
        }
    }
    output
}

fn check_round_trip(path: &Utf8Path, file: &File) {
    let first = file.get_gerber_code("  ", "\n");
    let reparsed = parse(&first, &ParseOptions::default())
        .unwrap_or_else(|e| panic!("re-parsing emitted code of {path} failed: {e}\n{first}"));
    let second = reparsed.get_gerber_code("", "\r\n");
    if normalize(&first) != normalize(&second) {
        panic!(
            "emitted code of {path} is not stable:{}",
            format_inline_diff(&normalize(&first), &normalize(&second))
        );
    }
    assert!(&reparsed == file, "re-parsed tree of {path} differs");
}

// =============================================================================
// Rendering
// =============================================================================

fn check_vector(path: &Utf8Path, result: &RenderResult) {
    let RenderResult::Vector(vector) = result else {
        panic!("{path}: expected a vector result");
    };
    assert!(vector.area() > 0.0, "{path}: vector output is empty");
    let svg = vector
        .to_svg(&Style::COPPER)
        .unwrap_or_else(|e| panic!("{path}: SVG encoding failed: {e}"));
    let doc: Svg = facet_xml::from_str(&svg).unwrap_or_else(|e| panic!("{path}: emitted SVG does not parse: {e}"));
    let paths = doc
        .children
        .iter()
        .filter(|node| matches!(node, SvgNode::Path(_)))
        .count();
    // background plus one path per polygon
    assert_eq!(paths, vector.polygons().len() + 1, "{path}");
}

fn check_raster(path: &Utf8Path, result: &RenderResult) {
    let RenderResult::Raster(raster) = result else {
        panic!("{path}: expected a raster result");
    };
    assert!(raster.coverage() > 0.0, "{path}: raster output is empty");
    let png = raster
        .to_png(&Style::SILK)
        .unwrap_or_else(|e| panic!("{path}: PNG encoding failed: {e}"));
    assert!(png.starts_with(b"\x89PNG"), "{path}");
}

fn test_gerber_file(path: &Utf8Path) -> datatest_stable::Result<()> {
    init_tracing();
    let source = std::fs::read_to_string(path)?;
    let options = ParseOptions::default().with_source_name(path.as_str());
    let file = parse(&source, &options)?;
    assert!(file.diagnostics().is_empty(), "{path}: {:?}", file.diagnostics());

    check_round_trip(path, &file);

    let rvmc = compile(&file, &CompileOptions::default())?;
    assert!(rvmc.layer_ids().last().is_some_and(|id| id.is_main()), "{path}");

    let render_options = RenderOptions::default().with_dpmm(10.0);
    let vector = render(&rvmc, BackendKind::Vector, &render_options)?;
    let raster = render(&rvmc, BackendKind::Raster, &render_options)?;
    assert!(vector.is_success() && raster.is_success(), "{path}: main layer is empty");
    assert_eq!(vector.main_box(), raster.main_box(), "{path}: backends disagree on bounds");

    check_vector(path, &vector);
    check_raster(path, &raster);
    Ok(())
}

datatest_stable::harness! {
    { test = test_gerber_file, root = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"), pattern = r"\.grb$" },
}
