//! Default sizes and settings (lengths in millimetres)

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Coordinate format assumed by `CoordinateFormat::default`
pub const INTEGER_DIGITS: u8 = 2;
pub const DECIMAL_DIGITS: u8 = 6;

/// Radius mismatch accepted when resolving single quadrant arc centers
pub const ARC_CENTER_TOLERANCE: Decimal = dec!(0.01);
/// Slack on the 90 degree sweep limit of single quadrant arcs
pub const QUADRANT_SWEEP_TOLERANCE: f64 = 1e-6;

/// Stroke width of region outlines when `draw_region_outlines` is on
pub const REGION_OUTLINE_WIDTH: Decimal = dec!(0.05);

/// Raster resolution in dots per millimetre (about 1016 DPI)
pub const DOTS_PER_MM: f64 = 40.0;
/// Arc tessellation: segments per `MAX_SEGMENT_LENGTH` of arc at resolution 1
pub const ARC_RESOLUTION: f64 = 1.0;
pub const MAX_SEGMENT_LENGTH: f64 = 0.05;
pub const MIN_ARC_SEGMENTS: u32 = 12;
pub const MAX_ARC_SEGMENTS: u32 = 4096;

/// Digits kept when rotation and scale appear in layer ids
pub const TRANSFORM_ID_PRECISION: usize = 8;

/// Name of the root layer of every compiled file
pub const MAIN_LAYER: &str = "%main%";
