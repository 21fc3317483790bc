//! Polygon backend: every surface is a set of polygons kept normalized by
//! `i_overlay` boolean operations. Dark shapes are unions, clear shapes are
//! differences.

use facet_svg::facet_xml::SerializeOptions;
use facet_svg::{Path, PathData, Svg, SvgNode, SvgStyle, facet_xml};
use glam::DVec2;
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;

use super::style::{Color, Style};
use super::tessellation::ArcPolicy;
use super::{Backend, ClosedLayer, RenderOptions};
use crate::errors::VmError;
use crate::rvmc::{LayerBox, LayerId, Shape};
use crate::types::BoundingBox;

/// Closed ring without the repeated first point
pub type Contour = Vec<[f64; 2]>;
/// Outer contour followed by its holes
pub type Polygon = Vec<Contour>;

#[derive(Debug, Clone, Default)]
pub struct VectorSurface {
    polygons: Vec<Polygon>,
}

fn combine(subject: &[Polygon], clip: &[Polygon], negative: bool) -> Vec<Polygon> {
    let rule = if negative { OverlayRule::Difference } else { OverlayRule::Union };
    if subject.is_empty() && negative {
        return Vec::new();
    }
    subject.to_vec().overlay(&clip.to_vec(), rule, FillRule::NonZero)
}

pub struct VectorBackend {
    arc_policy: ArcPolicy,
    dpmm: f64,
}

impl VectorBackend {
    pub fn new(options: &RenderOptions) -> VectorBackend {
        VectorBackend {
            arc_policy: options.arc_policy,
            dpmm: options.dpmm,
        }
    }
}

impl Backend for VectorBackend {
    type Surface = VectorSurface;
    type Output = VectorResult;

    // `id` only feeds the log line
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn create_surface(&mut self, id: &LayerId, _bounds: LayerBox) -> Result<VectorSurface, VmError> {
        crate::log::debug!(%id, "new polygon set");
        Ok(VectorSurface::default())
    }

    fn draw_shape(&mut self, target: &mut VectorSurface, shape: &Shape) -> Result<(), VmError> {
        let rings = self.arc_policy.flatten(&shape.contours())?;
        if rings.is_empty() {
            return Ok(());
        }
        let clip: Polygon = rings
            .iter()
            .map(|ring| ring.iter().map(|p| [p.x, p.y]).collect())
            .collect();
        target.polygons = combine(&target.polygons, &[clip], shape.negative);
        Ok(())
    }

    fn paste(
        &mut self,
        target: &mut VectorSurface,
        source: &VectorSurface,
        offset: DVec2,
        negative: bool,
    ) -> Result<(), VmError> {
        if source.polygons.is_empty() {
            return Ok(());
        }
        let moved: Vec<Polygon> = source
            .polygons
            .iter()
            .map(|polygon| {
                polygon
                    .iter()
                    .map(|contour| contour.iter().map(|[x, y]| [x + offset.x, y + offset.y]).collect())
                    .collect()
            })
            .collect();
        target.polygons = combine(&target.polygons, &moved, negative);
        Ok(())
    }

    fn finish(self, main: ClosedLayer<VectorSurface>) -> Result<VectorResult, VmError> {
        Ok(VectorResult {
            polygons: main.surface.map(|s| s.polygons),
            bounds: main.bounds,
            dpmm: self.dpmm,
        })
    }
}

// ============================================================================
// Result
// ============================================================================

/// Signed shoelace area; positive for counter-clockwise rings.
fn signed_area(contour: &[[f64; 2]]) -> f64 {
    let n = contour.len();
    (0..n)
        .map(|i| {
            let [x0, y0] = contour[i];
            let [x1, y1] = contour[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum::<f64>()
        / 2.0
}

/// Even-odd ray crossing test against every contour.
fn contains(polygons: &[Polygon], point: DVec2) -> bool {
    let mut inside = false;
    for contour in polygons.iter().flatten() {
        let n = contour.len();
        for i in 0..n {
            let [xi, yi] = contour[i];
            let [xj, yj] = contour[(i + n - 1) % n];
            if (yi > point.y) != (yj > point.y) && point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
        }
    }
    inside
}

fn fmt_num(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

fn format_float(value: f64, writer: &mut dyn std::io::Write) -> Result<(), std::io::Error> {
    write!(writer, "{}", fmt_num(value))
}

fn fill_style(color: Color) -> SvgStyle {
    SvgStyle::new()
        .add("fill", &color.to_hex())
        .add("fill-rule", "evenodd")
}

/// Main layer as polygons in millimetres
#[derive(Debug, Clone)]
pub struct VectorResult {
    /// `None` when the main layer was empty
    polygons: Option<Vec<Polygon>>,
    bounds: LayerBox,
    dpmm: f64,
}

impl VectorResult {
    pub fn is_success(&self) -> bool {
        self.polygons.is_some()
    }

    pub fn main_box(&self) -> Option<BoundingBox> {
        if self.polygons.is_none() {
            return None;
        }
        self.bounds.to_bounding_box().ok()
    }

    pub fn polygons(&self) -> &[Polygon] {
        self.polygons.as_deref().unwrap_or_default()
    }

    /// Covered area in square millimetres
    pub fn area(&self) -> f64 {
        self.polygons()
            .iter()
            .map(|polygon| {
                let mut contours = polygon.iter().map(|c| signed_area(c).abs());
                let outer = contours.next().unwrap_or(0.0);
                outer - contours.sum::<f64>()
            })
            .sum()
    }

    pub fn is_covered(&self, point: DVec2) -> bool {
        contains(self.polygons(), point)
    }

    /// SVG document with y pointing up, one path per polygon.
    pub fn to_svg(&self, style: &Style) -> Result<String, VmError> {
        let size = self.bounds.size();
        let (min_x, top) = if self.bounds.is_null() {
            (0.0, 0.0)
        } else {
            (self.bounds.min.x, -self.bounds.max.y)
        };
        let mut svg = Svg {
            width: Some(format!("{}mm", fmt_num(size.x))),
            height: Some(format!("{}mm", fmt_num(size.y))),
            view_box: Some(format!(
                "{} {} {} {}",
                fmt_num(min_x),
                fmt_num(top),
                fmt_num(size.x),
                fmt_num(size.y)
            )),
            children: Vec::new(),
        };

        if style.background.a > 0 && !self.bounds.is_null() {
            let (x0, y0) = (min_x, top);
            let (x1, y1) = (min_x + size.x, top + size.y);
            svg.children.push(SvgNode::Path(Path {
                d: Some(PathData::new().m(x0, y0).l(x1, y0).l(x1, y1).l(x0, y1).z()),
                fill: None,
                stroke: None,
                stroke_width: None,
                stroke_dasharray: None,
                style: fill_style(style.background),
            }));
        }

        for polygon in self.polygons() {
            let mut data = PathData::new();
            for contour in polygon {
                let Some(([x, y], rest)) = contour.split_first() else { continue };
                data = data.m(*x, -*y);
                for [x, y] in rest {
                    data = data.l(*x, -*y);
                }
                data = data.z();
            }
            svg.children.push(SvgNode::Path(Path {
                d: Some(data),
                fill: None,
                stroke: None,
                stroke_width: None,
                stroke_dasharray: None,
                style: fill_style(style.foreground),
            }));
        }

        let options = SerializeOptions {
            float_formatter: Some(format_float),
            preserve_entities: true,
            ..Default::default()
        };
        facet_xml::to_string_with_options(&svg, &options).map_err(|e| VmError::Encoding {
            message: e.to_string(),
        })
    }

    /// Rasterize the polygons at the render resolution.
    pub fn get_image(&self, style: &Style) -> Option<tiny_skia::Pixmap> {
        let polygons = self.polygons.as_ref()?;
        let size = self.bounds.size() * self.dpmm;
        let width = (size.x.ceil() as u32).max(1);
        let height = (size.y.ceil() as u32).max(1);
        let mut image = tiny_skia::Pixmap::new(width, height)?;
        image.fill(style.background.to_skia());

        let mut builder = tiny_skia::PathBuilder::new();
        for contour in polygons.iter().flatten() {
            let mut points = contour.iter().map(|[x, y]| {
                (
                    ((x - self.bounds.min.x) * self.dpmm) as f32,
                    ((self.bounds.max.y - y) * self.dpmm) as f32,
                )
            });
            let Some((x, y)) = points.next() else { continue };
            builder.move_to(x, y);
            for (x, y) in points {
                builder.line_to(x, y);
            }
            builder.close();
        }
        if let Some(path) = builder.finish() {
            let mut paint = tiny_skia::Paint::default();
            paint.set_color(style.foreground.to_skia());
            paint.anti_alias = true;
            image.fill_path(
                &path,
                &paint,
                tiny_skia::FillRule::EvenOdd,
                tiny_skia::Transform::identity(),
                None,
            );
        }
        Some(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvmc::{Builder, Rvmc, shapes};
    use crate::vm::{BackendKind, RenderResult, render};
    use glam::dvec2;

    fn vector(rvmc: &Rvmc) -> VectorResult {
        match render(rvmc, BackendKind::Vector, &RenderOptions::default()).unwrap() {
            RenderResult::Vector(result) => result,
            RenderResult::Raster(_) => unreachable!(),
        }
    }

    #[test]
    fn surfaces_start_empty() {
        let mut backend = VectorBackend::new(&RenderOptions::default());
        let bounds = LayerBox::new(DVec2::ZERO, DVec2::ONE);
        let surface = backend.create_surface(&LayerId::new("D10"), bounds).unwrap();
        assert!(surface.polygons.is_empty());
    }

    #[test]
    fn union_and_difference() {
        let rvmc = Builder::new().main(None, |main| {
            main.shape(shapes::rectangle(DVec2::ZERO, 2.0, 2.0, false))
                .shape(shapes::rectangle(dvec2(1.0, 0.0), 2.0, 2.0, false))
                .shape(shapes::rectangle(dvec2(0.5, 0.0), 1.0, 1.0, true));
        });
        let result = vector(&rvmc);
        assert!((result.area() - 5.0).abs() < 1e-6, "area {}", result.area());
        assert!(result.is_covered(dvec2(-0.8, 0.0)));
        assert!(!result.is_covered(dvec2(0.5, 0.0)));
        assert!(!result.is_covered(dvec2(5.0, 0.0)));
    }

    #[test]
    fn pasted_copies_are_translated() {
        let mut builder = Builder::new();
        let pad = builder.layer("pad", None, DVec2::ZERO, |layer| {
            layer.shape(shapes::rectangle(DVec2::ZERO, 1.0, 1.0, false));
        });
        let rvmc = builder.main(None, |main| {
            main.paste(&pad, dvec2(0.0, 0.0), false)
                .paste(&pad, dvec2(3.0, 0.0), false)
                .paste(&pad, dvec2(3.25, 0.0), true);
        });
        let result = vector(&rvmc);
        assert!((result.area() - 1.25).abs() < 1e-6);
        assert!(result.is_covered(dvec2(2.6, 0.0)));
        assert!(!result.is_covered(dvec2(3.3, 0.0)));
        let main_box = result.main_box().unwrap();
        assert_eq!(main_box.max_x.as_f64(), 3.75);
    }

    #[test]
    fn clear_on_empty_layer_stays_empty() {
        let rvmc = Builder::new().main(None, |main| {
            main.shape(shapes::circle(DVec2::ZERO, 1.0, true));
        });
        let result = vector(&rvmc);
        assert!(result.is_success());
        assert!(result.polygons().is_empty());
        assert_eq!(result.area(), 0.0);
    }

    #[test]
    fn svg_flips_y() {
        let rvmc = Builder::new().main(None, |main| {
            main.shape(shapes::rectangle(dvec2(1.0, 2.0), 2.0, 2.0, false));
        });
        let svg = vector(&rvmc).to_svg(&Style::COPPER_ALPHA).unwrap();
        assert!(svg.contains("viewBox=\"0 -3 2 2\""), "{svg}");
        assert!(svg.contains("#288f28"));
        assert!(!svg.contains("#000000"));
    }

    #[test]
    fn circle_area_converges() {
        let rvmc = Builder::new().main(None, |main| {
            main.shape(shapes::circle(DVec2::ZERO, 2.0, false));
        });
        let area = vector(&rvmc).area();
        assert!((area - std::f64::consts::PI).abs() < 0.01, "area {area}");
    }
}
