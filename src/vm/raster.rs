//! tiny-skia backend.
//!
//! Surfaces are coverage masks on a global pixel grid where pixel `k` sits at
//! `k / dpmm` millimetres, so pastes are whole-pixel blits. Colors are only
//! applied by [`RasterResult::get_image`].

use glam::DVec2;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tiny_skia::{
    BlendMode, FillRule, Mask, MaskType, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};

use super::style::Style;
use super::tessellation::ArcPolicy;
use super::{Backend, ClosedLayer, RenderOptions};
use crate::errors::VmError;
use crate::rvmc::{LayerBox, LayerId, Shape};
use crate::types::{BoundingBox, MM_PER_INCH, PixelBox};

/// Coverage mask of one layer
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixmap: Pixmap,
    /// Position of the pixmap on the global grid, y up
    pixels: PixelBox,
}

impl RasterSurface {
    /// Pixmap coordinates of a point in millimetres.
    fn to_pixmap(&self, point: DVec2, dpmm: f64) -> (f32, f32) {
        let x = point.x * dpmm - self.pixels.min_x as f64;
        let y = self.pixels.max_y as f64 - point.y * dpmm;
        (x as f32, y as f32)
    }
}

pub struct RasterBackend {
    dpmm: f64,
    dpi: Decimal,
    arc_policy: ArcPolicy,
    anti_alias: bool,
}

impl RasterBackend {
    pub fn new(options: &RenderOptions) -> Result<RasterBackend, VmError> {
        let too_low = || VmError::ResolutionTooLow {
            resolution: options.dpmm,
        };
        if !(options.dpmm.is_finite() && options.dpmm > 0.0) {
            return Err(too_low());
        }
        let dpi = Decimal::from_f64(options.dpmm).ok_or_else(too_low)? * MM_PER_INCH;
        Ok(RasterBackend {
            dpmm: options.dpmm,
            dpi,
            arc_policy: options.arc_policy,
            anti_alias: options.anti_alias,
        })
    }

    fn pixel_box(&self, id: &LayerId, bounds: LayerBox) -> Result<PixelBox, VmError> {
        let bounds = bounds.to_bounding_box().map_err(|_| VmError::SurfaceAllocation {
            id: id.to_string(),
            width: 0,
            height: 0,
        })?;
        Ok(bounds.as_pixel_box(self.dpi, -1, -1, 1, 1))
    }
}

impl Backend for RasterBackend {
    type Surface = RasterSurface;
    type Output = RasterResult;

    fn create_surface(&mut self, id: &LayerId, bounds: LayerBox) -> Result<RasterSurface, VmError> {
        let pixels = self.pixel_box(id, bounds)?;
        let width = u32::try_from(pixels.width().max(1)).unwrap_or(u32::MAX);
        let height = u32::try_from(pixels.height().max(1)).unwrap_or(u32::MAX);
        crate::log::debug!(%id, width, height, "allocating pixmap");
        let pixmap = Pixmap::new(width, height).ok_or_else(|| VmError::SurfaceAllocation {
            id: id.to_string(),
            width,
            height,
        })?;
        Ok(RasterSurface { pixmap, pixels })
    }

    fn draw_shape(&mut self, target: &mut RasterSurface, shape: &Shape) -> Result<(), VmError> {
        let rings = self.arc_policy.flatten(&shape.contours())?;
        let mut builder = PathBuilder::new();
        for ring in &rings {
            let (x, y) = target.to_pixmap(ring[0], self.dpmm);
            builder.move_to(x, y);
            for point in &ring[1..] {
                let (x, y) = target.to_pixmap(*point, self.dpmm);
                builder.line_to(x, y);
            }
            builder.close();
        }
        let Some(path) = builder.finish() else {
            return Ok(());
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        paint.anti_alias = self.anti_alias;
        if shape.negative {
            paint.blend_mode = BlendMode::Clear;
        }
        target
            .pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        Ok(())
    }

    fn paste(
        &mut self,
        target: &mut RasterSurface,
        source: &RasterSurface,
        offset: DVec2,
        negative: bool,
    ) -> Result<(), VmError> {
        let dx = (offset.x * self.dpmm).round() as i64;
        let dy = (offset.y * self.dpmm).round() as i64;
        let x = source.pixels.min_x + dx - target.pixels.min_x;
        let y = target.pixels.max_y - (source.pixels.max_y + dy);
        let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) else {
            return Ok(());
        };
        let paint = PixmapPaint {
            blend_mode: if negative { BlendMode::DestinationOut } else { BlendMode::SourceOver },
            ..PixmapPaint::default()
        };
        target
            .pixmap
            .draw_pixmap(x, y, source.pixmap.as_ref(), &paint, Transform::identity(), None);
        Ok(())
    }

    fn finish(self, main: ClosedLayer<RasterSurface>) -> Result<RasterResult, VmError> {
        Ok(RasterResult {
            surface: main.surface,
            bounds: main.bounds,
            dpmm: self.dpmm,
        })
    }
}

/// Rendered main layer
#[derive(Debug, Clone)]
pub struct RasterResult {
    surface: Option<RasterSurface>,
    bounds: LayerBox,
    dpmm: f64,
}

impl RasterResult {
    pub fn is_success(&self) -> bool {
        self.surface.is_some()
    }

    pub fn main_box(&self) -> Option<BoundingBox> {
        if self.surface.is_none() {
            return None;
        }
        self.bounds.to_bounding_box().ok()
    }

    pub fn dpmm(&self) -> f64 {
        self.dpmm
    }

    /// Image size in pixels
    pub fn size(&self) -> Option<(u32, u32)> {
        self.surface
            .as_ref()
            .map(|s| (s.pixmap.width(), s.pixmap.height()))
    }

    /// Colored image: background everywhere, foreground through the mask.
    pub fn get_image(&self, style: &Style) -> Option<Pixmap> {
        let surface = self.surface.as_ref()?;
        let mut image = Pixmap::new(surface.pixmap.width(), surface.pixmap.height())?;
        image.fill(style.background.to_skia());
        let mask = Mask::from_pixmap(surface.pixmap.as_ref(), MaskType::Alpha);
        let rect = Rect::from_xywh(0.0, 0.0, image.width() as f32, image.height() as f32)?;
        let mut paint = Paint::default();
        paint.set_color(style.foreground.to_skia());
        image.fill_rect(rect, &paint, Transform::identity(), Some(&mask));
        Some(image)
    }

    pub fn to_png(&self, style: &Style) -> Result<Vec<u8>, VmError> {
        let image = self.get_image(style).ok_or_else(|| VmError::Encoding {
            message: "main layer is empty".to_string(),
        })?;
        image.encode_png().map_err(|e| VmError::Encoding {
            message: e.to_string(),
        })
    }

    /// Fraction of pixels at least half covered
    pub fn coverage(&self) -> f64 {
        let Some(surface) = &self.surface else {
            return 0.0;
        };
        let pixels = surface.pixmap.pixels();
        if pixels.is_empty() {
            return 0.0;
        }
        let covered = pixels.iter().filter(|p| p.alpha() >= 128).count();
        covered as f64 / pixels.len() as f64
    }

    /// Whether the pixel under `point` (millimetres) is at least half covered.
    pub fn is_covered(&self, point: DVec2) -> bool {
        let Some(surface) = &self.surface else {
            return false;
        };
        let (x, y) = surface.to_pixmap(point, self.dpmm);
        if x < 0.0 || y < 0.0 {
            return false;
        }
        surface
            .pixmap
            .pixel(x as u32, y as u32)
            .is_some_and(|p| p.alpha() >= 128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvmc::{Builder, shapes};
    use crate::vm::{BackendKind, RenderResult, render};
    use glam::dvec2;

    fn raster(rvmc: &crate::rvmc::Rvmc) -> RasterResult {
        let options = RenderOptions::default().with_dpmm(20.0).with_anti_alias(false);
        match render(rvmc, BackendKind::Raster, &options).unwrap() {
            RenderResult::Raster(result) => result,
            RenderResult::Vector(_) => unreachable!(),
        }
    }

    #[test]
    fn clear_shape_punches_hole() {
        let rvmc = Builder::new().main(None, |main| {
            main.shape(shapes::rectangle(DVec2::ZERO, 4.0, 4.0, false))
                .shape(shapes::circle(DVec2::ZERO, 2.0, true));
        });
        let result = raster(&rvmc);
        assert!(result.is_covered(dvec2(1.5, 1.5)));
        assert!(!result.is_covered(DVec2::ZERO));
        // 16 mm² minus a circle of pi mm², on a padded canvas
        let coverage = result.coverage();
        assert!(coverage > 0.6 && coverage < 0.85, "coverage {coverage}");
    }

    #[test]
    fn negative_paste_erases() {
        let mut builder = Builder::new();
        let dot = builder.layer("dot", None, DVec2::ZERO, |layer| {
            layer.shape(shapes::circle(DVec2::ZERO, 1.0, false));
        });
        let rvmc = builder.main(None, |main| {
            main.shape(shapes::rectangle(dvec2(2.0, 0.0), 6.0, 2.0, false))
                .paste(&dot, dvec2(0.0, 0.0), false)
                .paste(&dot, dvec2(3.0, 0.0), true);
        });
        let result = raster(&rvmc);
        assert!(result.is_covered(dvec2(0.0, 0.0)));
        assert!(!result.is_covered(dvec2(3.0, 0.0)));
        assert!(result.is_covered(dvec2(4.5, 0.0)));
    }

    #[test]
    fn image_uses_style_colors() {
        let bounds = LayerBox::new(dvec2(-3.0, -3.0), dvec2(3.0, 3.0));
        let rvmc = Builder::new().main(Some(bounds), |main| {
            main.shape(shapes::rectangle(DVec2::ZERO, 2.0, 2.0, false));
        });
        let result = raster(&rvmc);
        assert!(result.is_covered(DVec2::ZERO));
        assert!(!result.is_covered(dvec2(-2.5, -2.5)));
        let image = result.get_image(&Style::COPPER).unwrap();
        let (w, h) = result.size().unwrap();
        let center = image.pixel(w / 2, h / 2).unwrap();
        assert_eq!((center.red(), center.green(), center.blue()), (40, 143, 40));
        let corner = image.pixel(0, 0).unwrap();
        assert_eq!((corner.red(), corner.alpha()), (0, 255));
        assert!(result.to_png(&Style::COPPER).unwrap().starts_with(b"\x89PNG"));
    }

    #[test]
    fn empty_main_is_not_success() {
        let rvmc = Builder::new().main(None, |_| {});
        let result = raster(&rvmc);
        assert!(!result.is_success());
        assert!(result.get_image(&Style::default()).is_none());
        assert_eq!(result.main_box(), None);
    }

    #[test]
    fn zero_dpmm_is_fatal() {
        let options = RenderOptions::default().with_dpmm(0.0);
        assert!(matches!(
            RasterBackend::new(&options),
            Err(VmError::ResolutionTooLow { .. })
        ));
    }
}
