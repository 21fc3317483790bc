//! Packed coordinate decoding and encoding.
//!
//! `FSLAX26Y26` means two integer and six decimal digits per axis, with
//! leading zeros omitted: `X1000000` is 1.0 and `X-5` is -0.000005.

use rust_decimal::Decimal;

use crate::ast::{FormatSpecification, Notation, PackedCoordinate, ZeroOmission};
use crate::errors::StateError;
use crate::types::{Offset, Unit};

/// Resolved `FS` settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateFormat {
    pub zeros: ZeroOmission,
    pub notation: Notation,
    pub x_integral: u8,
    pub x_decimal: u8,
    pub y_integral: u8,
    pub y_decimal: u8,
}

impl Default for CoordinateFormat {
    fn default() -> Self {
        CoordinateFormat {
            zeros: ZeroOmission::Leading,
            notation: Notation::Absolute,
            x_integral: crate::defaults::INTEGER_DIGITS,
            x_decimal: crate::defaults::DECIMAL_DIGITS,
            y_integral: crate::defaults::INTEGER_DIGITS,
            y_decimal: crate::defaults::DECIMAL_DIGITS,
        }
    }
}

impl From<&FormatSpecification> for CoordinateFormat {
    fn from(spec: &FormatSpecification) -> Self {
        CoordinateFormat {
            zeros: spec.zeros.unwrap_or(ZeroOmission::Leading),
            notation: spec.notation,
            x_integral: spec.x_integral,
            x_decimal: spec.x_decimal,
            y_integral: spec.y_integral,
            y_decimal: spec.y_decimal,
        }
    }
}

impl CoordinateFormat {
    /// Decode an `X` or `I` value.
    pub fn unpack_x(&self, packed: &PackedCoordinate, unit: Unit) -> Result<Offset, StateError> {
        self.unpack(packed, self.x_integral, self.x_decimal)
            .map(|value| Offset::new(value, unit))
    }

    /// Decode a `Y` or `J` value.
    pub fn unpack_y(&self, packed: &PackedCoordinate, unit: Unit) -> Result<Offset, StateError> {
        self.unpack(packed, self.y_integral, self.y_decimal)
            .map(|value| Offset::new(value, unit))
    }

    pub fn pack_x(&self, value: Offset, unit: Unit) -> PackedCoordinate {
        self.pack(value.as_unit(unit), self.x_integral, self.x_decimal)
    }

    pub fn pack_y(&self, value: Offset, unit: Unit) -> PackedCoordinate {
        self.pack(value.as_unit(unit), self.y_integral, self.y_decimal)
    }

    fn unpack(&self, packed: &PackedCoordinate, integer: u8, decimal: u8) -> Result<Decimal, StateError> {
        let text = packed.as_str();
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let width = usize::from(integer) + usize::from(decimal);
        if digits.len() > width {
            return Err(StateError::PackedCoordinateTooLong {
                coordinate: text.to_string(),
                integer,
                decimal,
            });
        }
        let digits = match self.zeros {
            ZeroOmission::Leading => digits.to_string(),
            ZeroOmission::Trailing => {
                if digits.len() < usize::from(integer) {
                    return Err(StateError::PackedCoordinateTooShort {
                        coordinate: text.to_string(),
                        integer,
                        decimal,
                    });
                }
                format!("{digits:0<width$}")
            }
        };
        // At most 18 digits, so the mantissa always fits.
        let mantissa = digits.parse::<i64>().unwrap_or(0);
        let value = Decimal::new(mantissa, u32::from(decimal));
        Ok(if negative { -value } else { value })
    }

    fn pack(&self, value: Decimal, integer: u8, decimal: u8) -> PackedCoordinate {
        let scaled = (value * Decimal::from(10i64.pow(u32::from(decimal)))).round();
        let negative = scaled.is_sign_negative() && !scaled.is_zero();
        let digits = scaled.abs().trunc().to_string();
        let digits = match self.zeros {
            ZeroOmission::Leading => digits,
            ZeroOmission::Trailing => {
                let width = usize::from(integer) + usize::from(decimal);
                let padded = format!("{digits:0>width$}");
                let trimmed = padded.trim_end_matches('0');
                if trimmed.len() < usize::from(integer) {
                    padded[..usize::from(integer).max(1)].to_string()
                } else {
                    trimmed.to_string()
                }
            }
        };
        PackedCoordinate::new(if negative { format!("-{digits}") } else { digits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn format(zeros: ZeroOmission, integer: u8, decimal: u8) -> CoordinateFormat {
        CoordinateFormat {
            zeros,
            notation: Notation::Absolute,
            x_integral: integer,
            x_decimal: decimal,
            y_integral: integer,
            y_decimal: decimal,
        }
    }

    fn packed(text: &str) -> PackedCoordinate {
        PackedCoordinate::new(text)
    }

    // ==================== Leading zero omission ====================

    #[test]
    fn leading_zeros_divide_by_decimal_places() {
        let fs = format(ZeroOmission::Leading, 2, 6);
        let mm = Unit::Millimeters;
        assert_eq!(fs.unpack_x(&packed("1000000"), mm).unwrap().as_millimeters(), dec!(1));
        assert_eq!(fs.unpack_x(&packed("-5"), mm).unwrap().as_millimeters(), dec!(-0.000005));
        assert_eq!(fs.unpack_y(&packed("12345678"), mm).unwrap().as_millimeters(), dec!(12.345678));
        assert_eq!(fs.unpack_y(&packed("+0"), mm).unwrap(), Offset::NULL);
    }

    #[test]
    fn inch_values_convert_to_millimeters() {
        let fs = format(ZeroOmission::Leading, 2, 4);
        let value = fs.unpack_x(&packed("10000"), Unit::Inches).unwrap();
        assert_eq!(value.as_millimeters(), dec!(25.4));
    }

    #[test]
    fn too_long_always_fails() {
        let fs = format(ZeroOmission::Leading, 2, 3);
        assert!(matches!(
            fs.unpack_x(&packed("123456"), Unit::Millimeters),
            Err(StateError::PackedCoordinateTooLong { integer: 2, decimal: 3, .. })
        ));
        assert!(fs.unpack_x(&packed("-12345"), Unit::Millimeters).is_ok());
    }

    #[test]
    fn axes_use_their_own_format() {
        let fs = CoordinateFormat {
            x_integral: 3,
            x_decimal: 2,
            y_integral: 2,
            y_decimal: 4,
            ..CoordinateFormat::default()
        };
        let mm = Unit::Millimeters;
        assert_eq!(fs.unpack_x(&packed("150"), mm).unwrap().as_millimeters(), dec!(1.5));
        assert_eq!(fs.unpack_y(&packed("150"), mm).unwrap().as_millimeters(), dec!(0.015));
    }

    // ==================== Trailing zero omission ====================

    #[test]
    fn trailing_zeros_pad_right() {
        let fs = format(ZeroOmission::Trailing, 2, 4);
        let mm = Unit::Millimeters;
        assert_eq!(fs.unpack_x(&packed("15"), mm).unwrap().as_millimeters(), dec!(15));
        assert_eq!(fs.unpack_x(&packed("0125"), mm).unwrap().as_millimeters(), dec!(1.25));
        assert!(matches!(
            fs.unpack_x(&packed("1"), mm),
            Err(StateError::PackedCoordinateTooShort { .. })
        ));
    }

    // ==================== Round trip ====================

    #[test]
    fn pack_then_unpack_keeps_value() {
        let mm = Unit::Millimeters;
        for zeros in [ZeroOmission::Leading, ZeroOmission::Trailing] {
            for (integer, decimal) in [(2, 6), (3, 4), (4, 3)] {
                let fs = format(zeros, integer, decimal);
                for text in ["0", "1", "-25", "999", "1200"] {
                    let Ok(value) = fs.unpack_x(&packed(text), mm) else {
                        continue;
                    };
                    let repacked = fs.pack_x(value, mm);
                    assert_eq!(
                        fs.unpack_x(&repacked, mm).unwrap(),
                        value,
                        "{text} at {integer}.{decimal} {zeros:?} packed as {repacked}"
                    );
                }
            }
        }
    }

    #[test]
    fn pack_leading_drops_zeros() {
        let fs = format(ZeroOmission::Leading, 2, 6);
        let value = Offset::from_millimeters(dec!(-0.5));
        assert_eq!(fs.pack_y(value, Unit::Millimeters).as_str(), "-500000");
    }
}
