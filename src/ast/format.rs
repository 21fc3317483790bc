//! Gerber code emission.
//!
//! Output is canonical rather than byte-exact: numbers keep their written
//! precision, but whitespace and line splitting follow the caller's `indent`
//! and `line_ending`. Parsing the output yields an equal tree.

use std::fmt::Write;

use super::*;

impl File {
    /// Gerber source for the whole file, one command per line.
    pub fn get_gerber_code(&self, indent: &str, line_ending: &str) -> String {
        let mut out = String::new();
        write_nodes(&mut out, &self.nodes, 0, indent, line_ending);
        out
    }
}

impl Node {
    pub fn get_gerber_code(&self, indent: &str, line_ending: &str) -> String {
        let mut out = String::new();
        write_node(&mut out, self, None, 0, indent, line_ending, false);
        out
    }
}

impl MacroStatement {
    pub fn get_gerber_code(&self) -> String {
        match &self.kind {
            MacroStatementKind::Comment(text) => format!("0{text}*"),
            MacroStatementKind::Assignment { variable, value } => {
                format!("${variable}={}*", value.get_gerber_code())
            }
            MacroStatementKind::Primitive(primitive) => {
                let mut code = primitive.code().to_string();
                for parameter in primitive.parameters() {
                    code.push(',');
                    code.push_str(&parameter.get_gerber_code());
                }
                code.push('*');
                code
            }
        }
    }
}

impl Expression {
    pub fn get_gerber_code(&self) -> String {
        let mut out = String::new();
        write_expression(&mut out, self);
        out
    }
}

fn write_expression(out: &mut String, expression: &Expression) {
    let chain = |out: &mut String, head: &Expression, tail: &[Expression], op: char| {
        write_expression(out, head);
        for operand in tail {
            out.push(op);
            write_expression(out, operand);
        }
    };
    match expression {
        Expression::Constant(value) => {
            let _ = write!(out, "{value}");
        }
        Expression::Variable(index) => {
            let _ = write!(out, "${index}");
        }
        Expression::Negative(inner) => {
            out.push('-');
            write_expression(out, inner);
        }
        Expression::Positive(inner) => {
            out.push('+');
            write_expression(out, inner);
        }
        Expression::Add(head, tail) => chain(out, head, tail, '+'),
        Expression::Subtract(head, tail) => chain(out, head, tail, '-'),
        Expression::Multiply(head, tail) => chain(out, head, tail, 'x'),
        Expression::Divide(head, tail) => chain(out, head, tail, '/'),
        Expression::Parenthesized(inner) => {
            out.push('(');
            write_expression(out, inner);
            out.push(')');
        }
    }
}

fn write_nodes(out: &mut String, nodes: &[Node], depth: usize, indent: &str, line_ending: &str) {
    let mut glued = false;
    for (index, node) in nodes.iter().enumerate() {
        glued = write_node(out, node, nodes.get(index + 1), depth, indent, line_ending, glued);
    }
}

/// Write one node and return whether it left an open `G` prefix that the
/// next command must continue on the same line.
fn write_node(
    out: &mut String,
    node: &Node,
    next: Option<&Node>,
    depth: usize,
    indent: &str,
    line_ending: &str,
    glued: bool,
) -> bool {
    let pad = if glued { String::new() } else { indent.repeat(depth) };
    match &node.kind {
        NodeKind::G { code, standalone: false } if next.is_some_and(accepts_g_prefix) => {
            out.push_str(&pad);
            out.push_str(code.name());
            return true;
        }
        NodeKind::Am(definition) => {
            out.push_str(&pad);
            out.push_str(&definition.open_code());
            if definition.statements.is_empty() {
                out.push_str(definition.close_code());
                out.push_str(line_ending);
                return false;
            }
            out.push_str(line_ending);
            let inner = indent.repeat(depth + 1);
            let last = definition.statements.len() - 1;
            for (index, statement) in definition.statements.iter().enumerate() {
                out.push_str(&inner);
                out.push_str(&statement.get_gerber_code());
                if index == last {
                    out.push_str(definition.close_code());
                }
                out.push_str(line_ending);
            }
            return false;
        }
        NodeKind::Ab(block) => {
            out.push_str(&pad);
            out.push_str(&block.open_code());
            out.push_str(line_ending);
            write_nodes(out, &block.nodes, depth + 1, indent, line_ending);
            out.push_str(&pad);
            out.push_str(block.close_code());
            out.push_str(line_ending);
            return false;
        }
        NodeKind::Sr(block) => {
            out.push_str(&pad);
            out.push_str(&block.open_code());
            out.push_str(line_ending);
            write_nodes(out, &block.nodes, depth + 1, indent, line_ending);
            out.push_str(&pad);
            out.push_str(block.close_code());
            out.push_str(line_ending);
            return false;
        }
        _ => {}
    }

    out.push_str(&pad);
    out.push_str(&single_line_code(&node.kind));
    out.push_str(line_ending);
    false
}

fn accepts_g_prefix(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::D01(_) | NodeKind::D02(_) | NodeKind::D03(_) | NodeKind::Dnn(_)
    )
}

fn coordinates_code(coordinates: &Coordinates) -> String {
    let mut code = String::new();
    for (letter, value) in [
        ("X", &coordinates.x),
        ("Y", &coordinates.y),
        ("I", &coordinates.i),
        ("J", &coordinates.j),
    ] {
        if let Some(value) = value {
            code.push_str(letter);
            code.push_str(value.as_str());
        }
    }
    code
}

fn optional(prefix: &str, value: Option<Decimal>) -> String {
    value.map(|v| format!("{prefix}{v}")).unwrap_or_default()
}

fn attribute_code(command: &str, attribute: &Attribute) -> String {
    let mut code = format!("%{command}{}", attribute.name);
    for field in &attribute.fields {
        code.push(',');
        code.push_str(field);
    }
    code.push_str("*%");
    code
}

/// Code of every non-composite node.
fn single_line_code(kind: &NodeKind) -> String {
    match kind {
        NodeKind::G04(comment) => format!("G04{comment}*"),
        NodeKind::G { code, .. } => format!("{}*", code.name()),
        NodeKind::D01(c) => format!("{}D01*", coordinates_code(c)),
        NodeKind::D02(c) => format!("{}D02*", coordinates_code(c)),
        NodeKind::D03(c) => format!("{}D03*", coordinates_code(c)),
        NodeKind::Dnn(id) => format!("{id}*"),
        NodeKind::M00 => "M00*".to_string(),
        NodeKind::M01 => "M01*".to_string(),
        NodeKind::M02 => "M02*".to_string(),
        NodeKind::Fs(fs) => {
            let zeros = match fs.zeros {
                Some(ZeroOmission::Leading) => "L",
                Some(ZeroOmission::Trailing) => "T",
                None => "",
            };
            let notation = match fs.notation {
                Notation::Absolute => "A",
                Notation::Incremental => "I",
            };
            format!(
                "%FS{zeros}{notation}X{}{}Y{}{}*%",
                fs.x_integral, fs.x_decimal, fs.y_integral, fs.y_decimal
            )
        }
        NodeKind::Mo(unit) => format!("%MO{}*%", unit.gerber_code()),
        NodeKind::AdCircle(id, c) => {
            format!("%AD{id}C,{}{}*%", c.diameter, optional("X", c.hole))
        }
        NodeKind::AdRectangle(id, r) => {
            format!("%AD{id}R,{}X{}{}*%", r.width, r.height, optional("X", r.hole))
        }
        NodeKind::AdObround(id, r) => {
            format!("%AD{id}O,{}X{}{}*%", r.width, r.height, optional("X", r.hole))
        }
        NodeKind::AdPolygon(id, p) => {
            let rotation = match (p.rotation, p.hole) {
                (None, Some(_)) => Some(Decimal::ZERO),
                (rotation, _) => rotation,
            };
            format!(
                "%AD{id}P,{}X{}{}{}*%",
                p.outer_diameter,
                p.vertices,
                optional("X", rotation),
                optional("X", p.hole)
            )
        }
        NodeKind::AdMacro(id, reference) => {
            let mut code = format!("%AD{id}{}", reference.name);
            for (index, parameter) in reference.parameters.iter().enumerate() {
                code.push(if index == 0 { ',' } else { 'X' });
                code.push_str(&parameter.to_string());
            }
            code.push_str("*%");
            code
        }
        NodeKind::Tf(a) => attribute_code("TF", a),
        NodeKind::Ta(a) => attribute_code("TA", a),
        NodeKind::To(a) => attribute_code("TO", a),
        NodeKind::Td(name) => format!("%TD{}*%", name.as_deref().unwrap_or("")),
        NodeKind::Lp(polarity) => match polarity {
            Polarity::Dark => "%LPD*%".to_string(),
            Polarity::Clear => "%LPC*%".to_string(),
        },
        NodeKind::Lm(mirroring) => format!("%LM{}*%", mirroring.code()),
        NodeKind::Lr(rotation) => format!("%LR{rotation}*%"),
        NodeKind::Ls(scale) => format!("%LS{scale}*%"),
        NodeKind::Ip(polarity) => match polarity {
            ImagePolarity::Positive => "%IPPOS*%".to_string(),
            ImagePolarity::Negative => "%IPNEG*%".to_string(),
        },
        NodeKind::Ir(rotation) => format!("%IR{rotation}*%"),
        NodeKind::Of { a, b } => format!("%OF{}{}*%", optional("A", *a), optional("B", *b)),
        NodeKind::Sf { a, b } => format!("%SF{}{}*%", optional("A", *a), optional("B", *b)),
        NodeKind::As(axes) => match axes {
            AxisCorrespondence::AxBy => "%ASAXBY*%".to_string(),
            AxisCorrespondence::AyBx => "%ASAYBX*%".to_string(),
        },
        NodeKind::Mi { a, b } => {
            let bit = |v: bool| if v { "1" } else { "0" };
            format!(
                "%MI{}{}*%",
                a.map(|v| format!("A{}", bit(v))).unwrap_or_default(),
                b.map(|v| format!("B{}", bit(v))).unwrap_or_default()
            )
        }
        NodeKind::In(name) => format!("%IN{name}*%"),
        NodeKind::Ln(name) => format!("%LN{name}*%"),
        NodeKind::Invalid(text) if text.starts_with('%') => text.clone(),
        NodeKind::Invalid(text) => format!("{text}*"),
        // Composite nodes are written by `write_node`.
        NodeKind::Am(definition) => definition.open_code(),
        NodeKind::Ab(block) => block.open_code(),
        NodeKind::Sr(block) => block.open_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn node(kind: NodeKind) -> Node {
        Node::new(kind)
    }

    #[test]
    fn word_commands() {
        assert_eq!(node(NodeKind::G04(" hello".into())).get_gerber_code("", ""), "G04 hello*");
        assert_eq!(
            node(NodeKind::D01(Coordinates::xy("100", "-200").with_ij("5", "0"))).get_gerber_code("", ""),
            "X100Y-200I5J0D01*"
        );
        assert_eq!(node(NodeKind::Dnn(ApertureId(11))).get_gerber_code("", ""), "D11*");
        assert_eq!(node(NodeKind::M02).get_gerber_code("", "\n"), "M02*\n");
    }

    #[test]
    fn aperture_definitions_keep_precision() {
        let circle = NodeKind::AdCircle(
            ApertureId(10),
            CircleDefinition { diameter: dec!(0.100), hole: None },
        );
        assert_eq!(node(circle).get_gerber_code("", ""), "%ADD10C,0.100*%");

        let polygon = NodeKind::AdPolygon(
            ApertureId(12),
            PolygonDefinition {
                outer_diameter: dec!(1.5),
                vertices: dec!(6),
                rotation: None,
                hole: Some(dec!(0.2)),
            },
        );
        assert_eq!(node(polygon).get_gerber_code("", ""), "%ADD12P,1.5X6X0X0.2*%");
    }

    #[test]
    fn prefix_g_code_is_glued() {
        let file = File::new(vec![
            node(NodeKind::G { code: GCode::G01, standalone: false }),
            node(NodeKind::D01(Coordinates::xy("1", "2"))),
            node(NodeKind::G { code: GCode::G36, standalone: true }),
        ]);
        insta::assert_snapshot!(file.get_gerber_code("  ", "\n").trim_end(), @r"
        G01X1Y2D01*
        G36*
        ");
    }

    #[test]
    fn composite_nodes_are_indented() {
        let block = ApertureBlock {
            aperture_id: ApertureId(20),
            nodes: vec![
                node(NodeKind::Dnn(ApertureId(10))),
                node(NodeKind::D03(Coordinates::xy("0", "0"))),
            ],
            open_info: None,
            close_info: None,
        };
        let definition = ApertureMacro {
            name: "BOX".into(),
            statements: vec![
                MacroStatement {
                    kind: MacroStatementKind::Comment(" box".into()),
                    source_info: None,
                },
                MacroStatement {
                    kind: MacroStatementKind::Assignment {
                        variable: 3,
                        value: Expression::Multiply(
                            Box::new(Expression::Variable(1)),
                            vec![Expression::Constant(dec!(2))],
                        ),
                    },
                    source_info: None,
                },
            ],
            open_info: None,
            close_info: None,
        };
        let file = File::new(vec![node(NodeKind::Am(definition)), node(NodeKind::Ab(block))]);
        insta::assert_snapshot!(file.get_gerber_code("  ", "\n").trim_end(), @r"
        %AMBOX*
          0 box*
          $3=$1x2*%
        %ABD20*%
          D10*
          X0Y0D03*
        %AB*%
        ");
    }

    #[test]
    fn expressions() {
        let expression = Expression::Subtract(
            Box::new(Expression::Parenthesized(Box::new(Expression::Add(
                Box::new(Expression::Variable(1)),
                vec![Expression::Constant(dec!(0.5))],
            )))),
            vec![Expression::Negative(Box::new(Expression::Constant(dec!(2))))],
        );
        assert_eq!(expression.get_gerber_code(), "($1+0.5)--2");
    }
}
