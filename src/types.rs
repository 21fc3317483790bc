//! Exact geometric value types used by the parser and state tracker.
//!
//! Coordinates are carried as decimal millimetres all the way from the packed
//! Gerber digits to the compiler. Binary floats only appear once geometry is
//! lowered into RVMC (see `crate::rvmc`).

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use glam::DVec2;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Millimetres per inch.
pub const MM_PER_INCH: Decimal = dec!(25.4);

/// Error type for invalid numeric operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericError {
    /// Divisor is zero
    DivisionByZero,
    /// Value cannot be represented (NaN, infinite or out of decimal range)
    NotFinite,
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericError::DivisionByZero => write!(f, "division by zero"),
            NumericError::NotFinite => write!(f, "value is not a finite decimal"),
        }
    }
}

impl std::error::Error for NumericError {}

/// Length unit of a Gerber file (`MOMM` / `MOIN`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    #[default]
    Millimeters,
    Inches,
}

impl Unit {
    /// Gerber spelling used by the `MO` command.
    pub fn gerber_code(self) -> &'static str {
        match self {
            Unit::Millimeters => "MM",
            Unit::Inches => "IN",
        }
    }
}

// ====================================================================
// Offset
// ====================================================================

/// Exact distance, stored in millimetres
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Offset(Decimal);

impl Offset {
    pub const NULL: Offset = Offset(Decimal::ZERO);

    /// Create an offset from a value expressed in `unit`.
    #[inline]
    pub fn new(value: Decimal, unit: Unit) -> Offset {
        match unit {
            Unit::Millimeters => Offset(value),
            Unit::Inches => Offset(value * MM_PER_INCH),
        }
    }

    #[inline]
    pub const fn from_millimeters(value: Decimal) -> Offset {
        Offset(value)
    }

    #[inline]
    pub fn from_inches(value: Decimal) -> Offset {
        Offset::new(value, Unit::Inches)
    }

    /// Convert a pixel count at `dpi` dots per inch back into a distance.
    pub fn from_pixels(pixels: Decimal, dpi: Decimal) -> Result<Offset, NumericError> {
        let inches = pixels
            .checked_div(dpi)
            .ok_or(NumericError::DivisionByZero)?;
        Ok(Offset::from_inches(inches))
    }

    /// Create from a float number of millimetres.
    pub fn try_from_f64(millimeters: f64) -> Result<Offset, NumericError> {
        Decimal::from_f64(millimeters)
            .map(Offset)
            .ok_or(NumericError::NotFinite)
    }

    #[inline]
    pub fn as_millimeters(self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn as_inches(self) -> Decimal {
        self.0 / MM_PER_INCH
    }

    pub fn as_unit(self, unit: Unit) -> Decimal {
        match unit {
            Unit::Millimeters => self.as_millimeters(),
            Unit::Inches => self.as_inches(),
        }
    }

    /// Whole pixels covered at `dpi`, truncated toward zero.
    pub fn as_pixels(self, dpi: Decimal) -> i64 {
        (self.as_inches() * dpi).trunc().to_i64().unwrap_or(i64::MAX)
    }

    /// Lossy float view in millimetres, for geometry lowered into RVMC.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Ratio of two offsets.
    pub fn checked_div(self, rhs: Offset) -> Result<Decimal, NumericError> {
        self.0.checked_div(rhs.0).ok_or(NumericError::DivisionByZero)
    }

    #[inline]
    pub fn abs(self) -> Offset {
        Offset(self.0.abs())
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn half(self) -> Offset {
        Offset(self.0 / Decimal::TWO)
    }
}

impl Add for Offset {
    type Output = Offset;
    fn add(self, rhs: Offset) -> Offset {
        Offset(self.0 + rhs.0)
    }
}

impl Sub for Offset {
    type Output = Offset;
    fn sub(self, rhs: Offset) -> Offset {
        Offset(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Offset {
    type Output = Offset;
    fn mul(self, rhs: Decimal) -> Offset {
        Offset(self.0 * rhs)
    }
}

impl Neg for Offset {
    type Output = Offset;
    fn neg(self) -> Offset {
        Offset(-self.0)
    }
}

impl AddAssign for Offset {
    fn add_assign(&mut self, rhs: Offset) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Offset {
    fn sub_assign(&mut self, rhs: Offset) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mm", self.0.normalize())
    }
}

// ====================================================================
// Vector2D
// ====================================================================

/// Point or displacement in the Gerber plane
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vector2D {
    pub x: Offset,
    pub y: Offset,
}

impl Vector2D {
    pub const NULL: Vector2D = Vector2D::new(Offset::NULL, Offset::NULL);
    pub const UNIT_X: Vector2D = Vector2D::new(Offset::from_millimeters(Decimal::ONE), Offset::NULL);
    pub const UNIT_Y: Vector2D = Vector2D::new(Offset::NULL, Offset::from_millimeters(Decimal::ONE));

    #[inline]
    pub const fn new(x: Offset, y: Offset) -> Vector2D {
        Vector2D { x, y }
    }

    #[inline]
    pub const fn from_millimeters(x: Decimal, y: Decimal) -> Vector2D {
        Vector2D::new(Offset::from_millimeters(x), Offset::from_millimeters(y))
    }

    #[inline]
    pub fn scale(self, factor: Decimal) -> Vector2D {
        Vector2D::new(self.x * factor, self.y * factor)
    }

    /// Dot product in square millimetres.
    pub fn dot(self, other: Vector2D) -> Decimal {
        self.x.as_millimeters() * other.x.as_millimeters()
            + self.y.as_millimeters() * other.y.as_millimeters()
    }

    /// 2D cross product (`x1 * y2 - y1 * x2`) in square millimetres.
    pub fn determinant(self, other: Vector2D) -> Decimal {
        self.x.as_millimeters() * other.y.as_millimeters()
            - self.y.as_millimeters() * other.x.as_millimeters()
    }

    pub fn length(self) -> Offset {
        let squared = self.dot(self);
        let root = squared
            .sqrt()
            .or_else(|| squared.to_f64().and_then(|v| Decimal::from_f64(v.sqrt())))
            .unwrap_or(Decimal::ZERO);
        Offset::from_millimeters(root)
    }

    /// Unit vector in the same direction. The zero vector maps to `UNIT_X`.
    pub fn normalize(self) -> Vector2D {
        let length = self.length().as_millimeters();
        if length.is_zero() {
            return Vector2D::UNIT_X;
        }
        Vector2D::from_millimeters(
            self.x.as_millimeters() / length,
            self.y.as_millimeters() / length,
        )
    }

    /// Rotate counter-clockwise by `degrees` around `center`.
    ///
    /// Quarter turns are exact; other angles go through `f64` trigonometry.
    pub fn rotate_around(self, degrees: Decimal, center: Vector2D) -> Vector2D {
        let relative = self - center;
        let turned = match quarter_turns(degrees) {
            Some(0) => relative,
            Some(1) => Vector2D::new(-relative.y, relative.x),
            Some(2) => -relative,
            Some(3) => Vector2D::new(relative.y, -relative.x),
            _ => {
                let radians = degrees.to_f64().unwrap_or(0.0).to_radians();
                let (sin, cos) = radians.sin_cos();
                let (sin, cos) = (
                    Decimal::from_f64(sin).unwrap_or(Decimal::ZERO),
                    Decimal::from_f64(cos).unwrap_or(Decimal::ONE),
                );
                Vector2D::new(
                    relative.x * cos - relative.y * sin,
                    relative.x * sin + relative.y * cos,
                )
            }
        };
        turned + center
    }

    #[inline]
    pub fn rotate(self, degrees: Decimal) -> Vector2D {
        self.rotate_around(degrees, Vector2D::NULL)
    }

    /// Counter-clockwise angle from `self` to `other` in degrees, in `[0, 360)`.
    ///
    /// Zero-length operands yield 0.
    pub fn angle_between_cc(self, other: Vector2D) -> f64 {
        let (a, b) = (self.to_dvec2(), other.to_dvec2());
        if a.length_squared() == 0.0 || b.length_squared() == 0.0 {
            return 0.0;
        }
        let angle = a.perp_dot(b).atan2(a.dot(b)).to_degrees();
        let angle = angle.rem_euclid(360.0);
        if angle >= 360.0 { 0.0 } else { angle }
    }

    /// Clockwise angle from `self` to `other` in degrees, in `[0, 360)`.
    pub fn angle_between_clockwise(self, other: Vector2D) -> f64 {
        let cc = self.angle_between_cc(other);
        if cc == 0.0 { 0.0 } else { 360.0 - cc }
    }

    #[inline]
    pub fn to_dvec2(self) -> DVec2 {
        DVec2::new(self.x.as_f64(), self.y.as_f64())
    }
}

/// Number of quarter turns when `degrees` is a multiple of 90.
fn quarter_turns(degrees: Decimal) -> Option<u8> {
    let normalized = degrees % dec!(360);
    let normalized = if normalized.is_sign_negative() {
        normalized + dec!(360)
    } else {
        normalized
    };
    if (normalized % dec!(90)).is_zero() {
        (normalized / dec!(90)).to_u8().map(|turns| turns % 4)
    } else {
        None
    }
}

impl Add for Vector2D {
    type Output = Vector2D;
    fn add(self, rhs: Vector2D) -> Vector2D {
        Vector2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2D {
    type Output = Vector2D;
    fn sub(self, rhs: Vector2D) -> Vector2D {
        Vector2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Vector2D {
    type Output = Vector2D;
    fn neg(self) -> Vector2D {
        Vector2D::new(-self.x, -self.y)
    }
}

impl Mul<Decimal> for Vector2D {
    type Output = Vector2D;
    fn mul(self, rhs: Decimal) -> Vector2D {
        self.scale(rhs)
    }
}

impl fmt::Display for Vector2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ====================================================================
// BoundingBox
// ====================================================================

/// Axis-aligned box in millimetres. `NULL` is the identity of `+` (union).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub min_x: Offset,
    pub min_y: Offset,
    pub max_x: Offset,
    pub max_y: Offset,
}

impl BoundingBox {
    pub const NULL: BoundingBox = BoundingBox {
        min_x: Offset(Decimal::MAX),
        min_y: Offset(Decimal::MAX),
        max_x: Offset(Decimal::MIN),
        max_y: Offset(Decimal::MIN),
    };

    /// Box spanning the two corners, in any order.
    pub fn new(x0: Offset, y0: Offset, x1: Offset, y1: Offset) -> BoundingBox {
        BoundingBox {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn from_point(point: Vector2D) -> BoundingBox {
        BoundingBox::new(point.x, point.y, point.x, point.y)
    }

    /// Box of a circle of `diameter` centered on the origin.
    pub fn from_diameter(diameter: Offset) -> BoundingBox {
        let r = diameter.abs().half();
        BoundingBox::new(-r, -r, r, r)
    }

    /// Box of a `width` x `height` rectangle centered on the origin.
    pub fn from_rectangle(width: Offset, height: Offset) -> BoundingBox {
        let (w, h) = (width.abs().half(), height.abs().half());
        BoundingBox::new(-w, -h, w, h)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn include_point(&self, point: Vector2D) -> BoundingBox {
        self.union(&BoundingBox::from_point(point))
    }

    pub fn translate(&self, by: Vector2D) -> BoundingBox {
        if self.is_null() {
            return *self;
        }
        BoundingBox {
            min_x: self.min_x + by.x,
            min_y: self.min_y + by.y,
            max_x: self.max_x + by.x,
            max_y: self.max_y + by.y,
        }
    }

    /// Scale both corners relative to the origin.
    pub fn scale(&self, factor: Decimal) -> BoundingBox {
        if self.is_null() {
            return *self;
        }
        BoundingBox::new(
            self.min_x * factor,
            self.min_y * factor,
            self.max_x * factor,
            self.max_y * factor,
        )
    }

    /// Box enclosing the four corners rotated by `degrees` around `center`.
    pub fn rotate(&self, degrees: Decimal, center: Vector2D) -> BoundingBox {
        if self.is_null() {
            return *self;
        }
        self.corners()
            .into_iter()
            .map(|corner| corner.rotate_around(degrees, center))
            .fold(BoundingBox::NULL, |acc, p| acc.include_point(p))
    }

    pub fn corners(&self) -> [Vector2D; 4] {
        [
            Vector2D::new(self.min_x, self.min_y),
            Vector2D::new(self.max_x, self.min_y),
            Vector2D::new(self.max_x, self.max_y),
            Vector2D::new(self.min_x, self.max_y),
        ]
    }

    pub fn width(&self) -> Offset {
        if self.is_null() { Offset::NULL } else { self.max_x - self.min_x }
    }

    pub fn height(&self) -> Offset {
        if self.is_null() { Offset::NULL } else { self.max_y - self.min_y }
    }

    pub fn center(&self) -> Vector2D {
        if self.is_null() {
            return Vector2D::NULL;
        }
        Vector2D::new(
            (self.min_x + self.max_x).half(),
            (self.min_y + self.max_y).half(),
        )
    }

    /// Pixel-space box at `dpi`, with independent corrections for each edge.
    pub fn as_pixel_box(
        &self,
        dpi: Decimal,
        dx_min: i64,
        dy_min: i64,
        dx_max: i64,
        dy_max: i64,
    ) -> PixelBox {
        if self.is_null() {
            return PixelBox::default();
        }
        PixelBox {
            min_x: self.min_x.as_pixels(dpi) + dx_min,
            min_y: self.min_y.as_pixels(dpi) + dy_min,
            max_x: self.max_x.as_pixels(dpi) + dx_max,
            max_y: self.max_y.as_pixels(dpi) + dy_max,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::NULL
    }
}

impl Add for BoundingBox {
    type Output = BoundingBox;
    fn add(self, rhs: BoundingBox) -> BoundingBox {
        self.union(&rhs)
    }
}

impl AddAssign for BoundingBox {
    fn add_assign(&mut self, rhs: BoundingBox) {
        *self = self.union(&rhs);
    }
}

/// Integer pixel box produced by `BoundingBox::as_pixel_box`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct PixelBox {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl PixelBox {
    pub fn width(&self) -> i64 {
        (self.max_x - self.min_x).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.max_y - self.min_y).max(0)
    }
}
