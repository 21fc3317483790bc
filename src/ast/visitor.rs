//! Exhaustive double dispatch over [`NodeKind`].
//!
//! Implementors override the `on_*` callbacks they care about; everything
//! else falls through to a no-op. [`AstVisitor::visit_node`] wraps every
//! dispatch, including the children of `AB` and `SR` blocks, so an
//! implementation can intercept per-node errors in one place.

use rust_decimal::Decimal;

use super::*;

#[allow(unused_variables)]
pub trait AstVisitor {
    type Error;

    fn visit_file(&mut self, file: &File) -> Result<(), Self::Error> {
        for node in &file.nodes {
            self.visit_node(node)?;
        }
        Ok(())
    }

    fn visit_node(&mut self, node: &Node) -> Result<(), Self::Error> {
        walk_node(self, node)
    }

    fn on_g04(&mut self, node: &Node, comment: &str) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g01(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g02(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g03(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g36(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g37(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g54(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g55(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g70(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g71(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g74(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g75(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g90(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_g91(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_d01(&mut self, node: &Node, coordinates: &Coordinates) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_d02(&mut self, node: &Node, coordinates: &Coordinates) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_d03(&mut self, node: &Node, coordinates: &Coordinates) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_dnn(&mut self, node: &Node, id: ApertureId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_m00(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_m01(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_m02(&mut self, node: &Node) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_fs(&mut self, node: &Node, format: &FormatSpecification) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_mo(&mut self, node: &Node, unit: Unit) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_ad_circle(
        &mut self,
        node: &Node,
        id: ApertureId,
        circle: &CircleDefinition,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ad_rectangle(
        &mut self,
        node: &Node,
        id: ApertureId,
        rectangle: &RectangleDefinition,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ad_obround(
        &mut self,
        node: &Node,
        id: ApertureId,
        obround: &RectangleDefinition,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ad_polygon(
        &mut self,
        node: &Node,
        id: ApertureId,
        polygon: &PolygonDefinition,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ad_macro(
        &mut self,
        node: &Node,
        id: ApertureId,
        reference: &MacroReference,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_am(&mut self, node: &Node, definition: &ApertureMacro) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ab_open(&mut self, node: &Node, block: &ApertureBlock) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ab_close(&mut self, node: &Node, block: &ApertureBlock) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_sr_open(&mut self, node: &Node, block: &StepRepeat) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_sr_close(&mut self, node: &Node, block: &StepRepeat) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_tf(&mut self, node: &Node, attribute: &Attribute) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ta(&mut self, node: &Node, attribute: &Attribute) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_to(&mut self, node: &Node, attribute: &Attribute) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_td(&mut self, node: &Node, name: Option<&str>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_lp(&mut self, node: &Node, polarity: Polarity) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_lm(&mut self, node: &Node, mirroring: Mirroring) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_lr(&mut self, node: &Node, rotation: Decimal) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ls(&mut self, node: &Node, scale: Decimal) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_ip(&mut self, node: &Node, polarity: ImagePolarity) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ir(&mut self, node: &Node, rotation: Decimal) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_of(
        &mut self,
        node: &Node,
        a: Option<Decimal>,
        b: Option<Decimal>,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_sf(
        &mut self,
        node: &Node,
        a: Option<Decimal>,
        b: Option<Decimal>,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_as(&mut self, node: &Node, axes: AxisCorrespondence) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_mi(&mut self, node: &Node, a: Option<bool>, b: Option<bool>) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_in(&mut self, node: &Node, name: &str) -> Result<(), Self::Error> {
        Ok(())
    }
    fn on_ln(&mut self, node: &Node, name: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_invalid(&mut self, node: &Node, text: &str) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Dispatch `node` to the matching callback. Block children go back through
/// [`AstVisitor::visit_node`].
pub fn walk_node<V: AstVisitor + ?Sized>(visitor: &mut V, node: &Node) -> Result<(), V::Error> {
    match &node.kind {
        NodeKind::G04(comment) => visitor.on_g04(node, comment),
        NodeKind::G { code, .. } => match code {
            GCode::G01 => visitor.on_g01(node),
            GCode::G02 => visitor.on_g02(node),
            GCode::G03 => visitor.on_g03(node),
            GCode::G36 => visitor.on_g36(node),
            GCode::G37 => visitor.on_g37(node),
            GCode::G54 => visitor.on_g54(node),
            GCode::G55 => visitor.on_g55(node),
            GCode::G70 => visitor.on_g70(node),
            GCode::G71 => visitor.on_g71(node),
            GCode::G74 => visitor.on_g74(node),
            GCode::G75 => visitor.on_g75(node),
            GCode::G90 => visitor.on_g90(node),
            GCode::G91 => visitor.on_g91(node),
        },
        NodeKind::D01(c) => visitor.on_d01(node, c),
        NodeKind::D02(c) => visitor.on_d02(node, c),
        NodeKind::D03(c) => visitor.on_d03(node, c),
        NodeKind::Dnn(id) => visitor.on_dnn(node, *id),
        NodeKind::M00 => visitor.on_m00(node),
        NodeKind::M01 => visitor.on_m01(node),
        NodeKind::M02 => visitor.on_m02(node),
        NodeKind::Fs(format) => visitor.on_fs(node, format),
        NodeKind::Mo(unit) => visitor.on_mo(node, *unit),
        NodeKind::AdCircle(id, circle) => visitor.on_ad_circle(node, *id, circle),
        NodeKind::AdRectangle(id, rectangle) => visitor.on_ad_rectangle(node, *id, rectangle),
        NodeKind::AdObround(id, obround) => visitor.on_ad_obround(node, *id, obround),
        NodeKind::AdPolygon(id, polygon) => visitor.on_ad_polygon(node, *id, polygon),
        NodeKind::AdMacro(id, reference) => visitor.on_ad_macro(node, *id, reference),
        NodeKind::Am(definition) => visitor.on_am(node, definition),
        NodeKind::Ab(block) => {
            visitor.on_ab_open(node, block)?;
            for child in &block.nodes {
                visitor.visit_node(child)?;
            }
            visitor.on_ab_close(node, block)
        }
        NodeKind::Sr(block) => {
            visitor.on_sr_open(node, block)?;
            for child in &block.nodes {
                visitor.visit_node(child)?;
            }
            visitor.on_sr_close(node, block)
        }
        NodeKind::Tf(attribute) => visitor.on_tf(node, attribute),
        NodeKind::Ta(attribute) => visitor.on_ta(node, attribute),
        NodeKind::To(attribute) => visitor.on_to(node, attribute),
        NodeKind::Td(name) => visitor.on_td(node, name.as_deref()),
        NodeKind::Lp(polarity) => visitor.on_lp(node, *polarity),
        NodeKind::Lm(mirroring) => visitor.on_lm(node, *mirroring),
        NodeKind::Lr(rotation) => visitor.on_lr(node, *rotation),
        NodeKind::Ls(scale) => visitor.on_ls(node, *scale),
        NodeKind::Ip(polarity) => visitor.on_ip(node, *polarity),
        NodeKind::Ir(rotation) => visitor.on_ir(node, *rotation),
        NodeKind::Of { a, b } => visitor.on_of(node, *a, *b),
        NodeKind::Sf { a, b } => visitor.on_sf(node, *a, *b),
        NodeKind::As(axes) => visitor.on_as(node, *axes),
        NodeKind::Mi { a, b } => visitor.on_mi(node, *a, *b),
        NodeKind::In(name) => visitor.on_in(node, name),
        NodeKind::Ln(name) => visitor.on_ln(node, name),
        NodeKind::Invalid(text) => visitor.on_invalid(node, text),
    }
}

impl Node {
    pub fn visit<V: AstVisitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.visit_node(self)
    }
}

impl File {
    pub fn visit<V: AstVisitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.visit_file(self)
    }
}
