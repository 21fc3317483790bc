//! File, aperture and object attribute dictionaries.
//!
//! Maps are shared between state snapshots and copied only when written.

use std::rc::Rc;

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::ast::{Attribute, AxisCorrespondence, ImagePolarity};

/// Attribute name to its value fields, in definition order
pub type AttributeMap = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    pub file: Rc<AttributeMap>,
    pub aperture: Rc<AttributeMap>,
    pub object: Rc<AttributeMap>,
}

impl Attributes {
    /// Add a file attribute. File attributes are immutable, so a second
    /// definition of the same name is rejected and `None` is returned.
    pub fn with_file(&self, attribute: &Attribute) -> Option<Attributes> {
        if self.file.contains_key(&attribute.name) {
            return None;
        }
        let mut next = self.clone();
        Rc::make_mut(&mut next.file).insert(attribute.name.clone(), attribute.fields.clone());
        Some(next)
    }

    pub fn with_aperture(&self, attribute: &Attribute) -> Attributes {
        let mut next = self.clone();
        Rc::make_mut(&mut next.aperture).insert(attribute.name.clone(), attribute.fields.clone());
        next
    }

    pub fn with_object(&self, attribute: &Attribute) -> Attributes {
        let mut next = self.clone();
        Rc::make_mut(&mut next.object).insert(attribute.name.clone(), attribute.fields.clone());
        next
    }

    /// `TD`: drop one name from the aperture and object maps, or clear both.
    pub fn without(&self, name: Option<&str>) -> Attributes {
        let mut next = self.clone();
        match name {
            Some(name) => {
                if next.aperture.contains_key(name) {
                    Rc::make_mut(&mut next.aperture).shift_remove(name);
                }
                if next.object.contains_key(name) {
                    Rc::make_mut(&mut next.object).shift_remove(name);
                }
            }
            None => {
                next.aperture = Rc::default();
                next.object = Rc::default();
            }
        }
        next
    }
}

/// Settings of the deprecated image commands. Recorded, never applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttributes {
    pub polarity: ImagePolarity,
    pub rotation: Decimal,
    pub offset: (Decimal, Decimal),
    pub scale: (Decimal, Decimal),
    pub axes: AxisCorrespondence,
    pub mirror: (bool, bool),
    pub name: Option<String>,
    pub layer_name: Option<String>,
}

impl Default for ImageAttributes {
    fn default() -> Self {
        ImageAttributes {
            polarity: ImagePolarity::Positive,
            rotation: Decimal::ZERO,
            offset: (Decimal::ZERO, Decimal::ZERO),
            scale: (Decimal::ONE, Decimal::ONE),
            axes: AxisCorrespondence::AxBy,
            mirror: (false, false),
            name: None,
            layer_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(name: &str, fields: &[&str]) -> Attribute {
        Attribute {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn file_attributes_keep_first_definition() {
        let attributes = Attributes::default()
            .with_file(&attribute(".Part", &["Single"]))
            .unwrap();
        assert!(attributes.with_file(&attribute(".Part", &["Array"])).is_none());
        assert_eq!(attributes.file[".Part"], vec!["Single".to_string()]);
    }

    #[test]
    fn delete_leaves_file_attributes() {
        let attributes = Attributes::default()
            .with_file(&attribute(".Part", &["Single"]))
            .unwrap()
            .with_aperture(&attribute(".AperFunction", &["SMDPad"]))
            .with_object(&attribute(".N", &["GND"]))
            .with_object(&attribute(".P", &["U1", "1"]));

        let one = attributes.without(Some(".N"));
        assert!(!one.object.contains_key(".N"));
        assert!(one.object.contains_key(".P"));
        assert_eq!(one.aperture.len(), 1);

        let all = attributes.without(None);
        assert!(all.aperture.is_empty() && all.object.is_empty());
        assert_eq!(all.file.len(), 1);
    }

    #[test]
    fn updates_do_not_touch_earlier_snapshots() {
        let before = Attributes::default().with_object(&attribute(".N", &["A"]));
        let after = before.with_object(&attribute(".N", &["B"]));
        assert_eq!(before.object[".N"], vec!["A".to_string()]);
        assert_eq!(after.object[".N"], vec!["B".to_string()]);
    }
}
