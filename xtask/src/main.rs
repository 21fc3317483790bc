use camino::{Utf8Path, Utf8PathBuf};
use gerbrs::{BackendKind, RenderOptions, RenderResult, Style};
use miette::{IntoDiagnostic, WrapErr, bail};
use rayon::prelude::*;
use std::fs;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    run(&args)
}

fn run(args: &[String]) -> miette::Result<()> {
    match args.get(1).map(String::as_str) {
        Some("render-all") => render_all(&args[2..]),
        Some(other) => {
            usage();
            bail!("unknown command `{other}`")
        }
        None => {
            usage();
            bail!("no command given")
        }
    }
}

fn usage() {
    eprintln!("Usage: cargo xtask <command>");
    eprintln!("Commands:");
    eprintln!("  render-all [--backend raster|vector] [--out DIR] [--style NAME]");
    eprintln!("                  Render every tests/data fixture and write an HTML gallery");
}

struct RenderAll {
    backend: BackendKind,
    out: Utf8PathBuf,
    style: Style,
}

impl RenderAll {
    fn from_args(args: &[String]) -> Result<RenderAll, String> {
        let workspace = workspace_root();
        let mut config = RenderAll {
            backend: BackendKind::Raster,
            out: workspace.join("target/renders"),
            style: Style::COPPER,
        };
        let mut args = args.iter();
        while let Some(flag) = args.next() {
            let mut value = || args.next().ok_or_else(|| format!("{flag} needs a value"));
            match flag.as_str() {
                "--backend" => config.backend = value()?.parse().map_err(|e| format!("{e}"))?,
                "--out" => config.out = Utf8PathBuf::from(value()?),
                "--style" => {
                    let name = value()?;
                    config.style = Style::preset(name).ok_or_else(|| format!("unknown style `{name}`"))?;
                }
                other => return Err(format!("unknown argument `{other}`")),
            }
        }
        Ok(config)
    }
}

/// Outcome of one fixture
struct Rendered {
    name: String,
    output: Result<Utf8PathBuf, String>,
}

fn render_all(args: &[String]) -> miette::Result<()> {
    let config = match RenderAll::from_args(args) {
        Ok(config) => config,
        Err(message) => {
            usage();
            bail!("{message}")
        }
    };
    let fixtures = workspace_root().join("tests/data");

    let mut entries: Vec<Utf8PathBuf> = fs::read_dir(&fixtures)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading fixture directory {fixtures}"))?
        .filter_map(|e| e.ok())
        .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
        .filter(|path| path.extension() == Some("grb"))
        .collect();
    entries.sort();

    fs::create_dir_all(&config.out)
        .into_diagnostic()
        .wrap_err_with(|| format!("creating output directory {}", config.out))?;

    // Fixtures are independent, so render them in parallel.
    let results: Vec<Rendered> = entries
        .par_iter()
        .map(|path| {
            eprintln!("Rendering {path}...");
            Rendered {
                name: path.file_name().unwrap_or(path.as_str()).to_string(),
                output: render_one(path, &config),
            }
        })
        .collect();

    let failed = results.iter().filter(|r| r.output.is_err()).count();
    for result in results.iter().filter(|r| r.output.is_err()) {
        if let Err(report) = &result.output {
            eprintln!("{report}");
        }
    }

    let gallery = config.out.join("index.html");
    fs::write(&gallery, gallery_html(&results, config.backend))
        .into_diagnostic()
        .wrap_err_with(|| format!("writing {gallery}"))?;
    println!(
        "Rendered {} of {} fixtures with the {} backend; gallery at {gallery}",
        results.len() - failed,
        results.len(),
        config.backend
    );
    if failed > 0 {
        bail!("{failed} fixture(s) failed to render");
    }
    Ok(())
}

fn render_one(path: &Utf8Path, config: &RenderAll) -> Result<Utf8PathBuf, String> {
    let source = fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    let result = gerbrs::render_source(path.as_str(), &source, config.backend, &RenderOptions::default())
        .map_err(|report| format!("{report:?}"))?;
    let stem = path.file_stem().unwrap_or("output");
    match &result {
        RenderResult::Raster(raster) => {
            let png = raster.to_png(&config.style).map_err(|e| format!("{path}: {e}"))?;
            let target = config.out.join(format!("{stem}.png"));
            fs::write(&target, png).map_err(|e| format!("{target}: {e}"))?;
            Ok(target)
        }
        RenderResult::Vector(vector) => {
            let svg = vector.to_svg(&config.style).map_err(|e| format!("{path}: {e}"))?;
            let target = config.out.join(format!("{stem}.svg"));
            fs::write(&target, svg).map_err(|e| format!("{target}: {e}"))?;
            Ok(target)
        }
    }
}

fn gallery_html(results: &[Rendered], backend: BackendKind) -> String {
    let mut html = String::new();
    html.push_str(&format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>gerbrs fixtures ({backend})</title>
    <style>
        body {{ font-family: system-ui, sans-serif; background: #eee; color: #333; margin: 24px; }}
        .card {{ background: #fff; border-radius: 6px; padding: 12px; margin-bottom: 16px; }}
        .card img {{ max-width: 100%; background: #222; }}
        .error {{ color: #b00; white-space: pre-wrap; font-family: monospace; }}
    </style>
</head>
<body>
"#
    ));
    for result in results {
        let body = match &result.output {
            Ok(target) => format!(
                r#"<img src="{}" alt="{}">"#,
                html_escape(target.file_name().unwrap_or_default()),
                html_escape(&result.name)
            ),
            Err(report) => format!(r#"<div class="error">{}</div>"#, html_escape(report)),
        };
        html.push_str(&format!(
            "<div class=\"card\" id=\"{0}\">\n<h3>{0}</h3>\n{1}\n</div>\n",
            html_escape(&result.name),
            body
        ));
    }
    html.push_str("</body></html>\n");
    html
}

fn workspace_root() -> Utf8PathBuf {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap_or(Utf8Path::new("."))
        .to_owned()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_command_is_an_error() {
        let error = run(&args(&["xtask"])).unwrap_err();
        assert_eq!(error.to_string(), "no command given");
    }

    #[test]
    fn unknown_command_is_an_error() {
        let error = run(&args(&["xtask", "frobnicate"])).unwrap_err();
        assert_eq!(error.to_string(), "unknown command `frobnicate`");
    }

    #[test]
    fn render_all_flags() {
        let config = RenderAll::from_args(&args(&["--backend", "vector", "--out", "/tmp/out"])).unwrap();
        assert_eq!(config.backend, BackendKind::Vector);
        assert_eq!(config.out, Utf8PathBuf::from("/tmp/out"));
        assert!(RenderAll::from_args(&args(&["--out"])).is_err());
        assert!(RenderAll::from_args(&args(&["--style", "nope"])).is_err());
    }
}
