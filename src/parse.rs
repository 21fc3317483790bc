//! Parse pest pairs into AST nodes

use std::collections::VecDeque;

use miette::{NamedSource, SourceSpan};
use pest::Parser;
use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::{Pair, Pairs};
use rust_decimal::Decimal;

use crate::ast::*;
use crate::errors::ParseError;
use crate::types::Unit;
use crate::{GerberParser, Rule};

/// Parser configuration
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Require the whole input to be consumed. When false, parsing stops
    /// quietly at the first unrecognised command.
    pub strict: bool,
    /// Wrap unrecognised text in `Invalid` nodes and keep going.
    pub resilient: bool,
    /// Name used when reporting errors
    pub source_name: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            strict: true,
            resilient: false,
            source_name: "<input>".to_string(),
        }
    }
}

impl ParseOptions {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_resilient(mut self, resilient: bool) -> Self {
        self.resilient = resilient;
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }
}

/// Parse Gerber source into a syntax tree
pub fn parse(source: &str, options: &ParseOptions) -> Result<File, ParseError> {
    let _stage = crate::log::stage("parse");
    let rule = if options.resilient {
        Rule::file_resilient
    } else if options.strict {
        Rule::file
    } else {
        Rule::file_partial
    };
    let ctx = Context {
        source,
        name: &options.source_name,
    };
    let mut pairs = GerberParser::parse(rule, source).map_err(|e| ctx.syntax_error(e))?;
    let Some(root) = pairs.next() else {
        return Ok(File::default());
    };
    let info = source_info(&root);
    let nodes = parse_statements(&ctx, root.into_inner())?;
    crate::log::debug!(nodes = nodes.len(), "parsed gerber source");
    Ok(File {
        nodes,
        source_info: Some(info),
    })
}

/// Error construction needs the full source text.
struct Context<'s> {
    source: &'s str,
    name: &'s str,
}

impl Context<'_> {
    fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name, self.source.to_string())
    }

    fn syntax_error(&self, error: pest::error::Error<Rule>) -> ParseError {
        let start = match error.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        let (line, column) = match error.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(pos, _) => pos,
        };
        let expected = match &error.variant {
            ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => positives
                .iter()
                .map(|rule| format!("{rule:?}"))
                .collect::<Vec<_>>()
                .join(", "),
            ErrorVariant::ParsingError { .. } => "a Gerber command".to_string(),
            ErrorVariant::CustomError { message } => message.clone(),
        };
        let found: String = self
            .source
            .get(start..)
            .unwrap_or("")
            .chars()
            .take_while(|c| *c != '\n')
            .take(24)
            .collect();
        ParseError::UnexpectedToken {
            src: self.named_source(),
            span: SourceSpan::new(start.into(), found.len()),
            line,
            column,
            expected,
            found,
        }
    }

    fn span(pair: &Pair<Rule>) -> SourceSpan {
        let span = pair.as_span();
        SourceSpan::new(span.start().into(), span.end() - span.start())
    }

    fn invalid_number(&self, pair: &Pair<Rule>) -> ParseError {
        ParseError::InvalidNumber {
            text: pair.as_str().to_string(),
            src: self.named_source(),
            span: Self::span(pair),
        }
    }

    fn malformed(&self, pair: &Pair<Rule>) -> ParseError {
        ParseError::Malformed {
            rule: format!("{:?}", pair.as_rule()),
            src: self.named_source(),
            span: Self::span(pair),
        }
    }
}

fn source_info(pair: &Pair<Rule>) -> SourceInfo {
    let span = pair.as_span();
    let (line, column) = span.start_pos().line_col();
    SourceInfo {
        offset: span.start(),
        length: span.end() - span.start(),
        line,
        column,
    }
}

fn parse_statements(ctx: &Context, pairs: Pairs<Rule>) -> Result<Vec<Node>, ParseError> {
    pairs
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(|pair| parse_statement(ctx, pair))
        .collect()
}

fn parse_statement(ctx: &Context, pair: Pair<Rule>) -> Result<Node, ParseError> {
    let info = source_info(&pair);
    let kind = match pair.as_rule() {
        Rule::g04 => NodeKind::G04(inner_str(&pair, Rule::comment).to_string()),
        Rule::g_code => parse_g_code(ctx, pair)?,
        Rule::d01 => NodeKind::D01(parse_coordinates(pair)),
        Rule::d02 => NodeKind::D02(parse_coordinates(pair)),
        Rule::d03 => NodeKind::D03(parse_coordinates(pair)),
        Rule::d_select => NodeKind::Dnn(parse_aperture_id(ctx, &first_inner(ctx, pair)?)?),
        Rule::m00 => NodeKind::M00,
        Rule::m01 => NodeKind::M01,
        Rule::m02 => NodeKind::M02,
        Rule::fs => NodeKind::Fs(parse_format(ctx, pair)?),
        Rule::mo => match inner_str(&pair, Rule::unit) {
            "IN" => NodeKind::Mo(Unit::Inches),
            _ => NodeKind::Mo(Unit::Millimeters),
        },
        Rule::ad => parse_aperture_definition(ctx, pair)?,
        Rule::tf => NodeKind::Tf(parse_attribute(ctx, pair)?),
        Rule::ta => NodeKind::Ta(parse_attribute(ctx, pair)?),
        Rule::to => NodeKind::To(parse_attribute(ctx, pair)?),
        Rule::td => NodeKind::Td(
            pair.into_inner()
                .find(|p| p.as_rule() == Rule::name)
                .map(|p| p.as_str().to_string()),
        ),
        Rule::lp => match inner_str(&pair, Rule::polarity) {
            "C" => NodeKind::Lp(Polarity::Clear),
            _ => NodeKind::Lp(Polarity::Dark),
        },
        Rule::lm => NodeKind::Lm(match inner_str(&pair, Rule::mirroring) {
            "X" => Mirroring::X,
            "Y" => Mirroring::Y,
            "XY" => Mirroring::XY,
            _ => Mirroring::None,
        }),
        Rule::lr => NodeKind::Lr(parse_decimal(ctx, &first_inner(ctx, pair)?)?),
        Rule::ls => NodeKind::Ls(parse_decimal(ctx, &first_inner(ctx, pair)?)?),
        Rule::image_polarity => match inner_str(&pair, Rule::image_polarity_kind) {
            "NEG" => NodeKind::Ip(ImagePolarity::Negative),
            _ => NodeKind::Ip(ImagePolarity::Positive),
        },
        Rule::image_rotation => NodeKind::Ir(parse_decimal(ctx, &first_inner(ctx, pair)?)?),
        Rule::image_offset => {
            let (a, b) = parse_axes(ctx, pair)?;
            NodeKind::Of { a, b }
        }
        Rule::scale_factor => {
            let (a, b) = parse_axes(ctx, pair)?;
            NodeKind::Sf { a, b }
        }
        Rule::axis_select => match inner_str(&pair, Rule::axis_correspondence) {
            "AYBX" => NodeKind::As(AxisCorrespondence::AyBx),
            _ => NodeKind::As(AxisCorrespondence::AxBy),
        },
        Rule::mirror_image => {
            let (mut a, mut b) = (None, None);
            for inner in pair.into_inner() {
                let bit = inner.as_str().ends_with('1');
                match inner.as_rule() {
                    Rule::mirror_a => a = Some(bit),
                    Rule::mirror_b => b = Some(bit),
                    _ => {}
                }
            }
            NodeKind::Mi { a, b }
        }
        Rule::image_name => NodeKind::In(inner_str(&pair, Rule::text).to_string()),
        Rule::load_name => NodeKind::Ln(inner_str(&pair, Rule::text).to_string()),
        Rule::macro_definition => NodeKind::Am(parse_macro_definition(ctx, pair)?),
        Rule::ab_block => NodeKind::Ab(parse_aperture_block(ctx, pair)?),
        Rule::sr_block => NodeKind::Sr(parse_step_repeat(ctx, pair)?),
        Rule::invalid => NodeKind::Invalid(parse_invalid(pair)),
        _ => return Err(ctx.malformed(&pair)),
    };
    Ok(Node {
        kind,
        source_info: Some(info),
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn first_inner<'i>(ctx: &Context, pair: Pair<'i, Rule>) -> Result<Pair<'i, Rule>, ParseError> {
    let fallback = pair.clone();
    pair.into_inner()
        .next()
        .ok_or_else(|| ctx.malformed(&fallback))
}

/// Text of the first inner pair with `rule`, or "" when absent.
fn inner_str<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> &'i str {
    pair.clone()
        .into_inner()
        .find(|p| p.as_rule() == rule)
        .map(|p| p.as_str())
        .unwrap_or("")
}

fn parse_decimal(ctx: &Context, pair: &Pair<Rule>) -> Result<Decimal, ParseError> {
    let text = pair.as_str();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if !digits.bytes().any(|b| b.is_ascii_digit()) {
        return Err(ctx.invalid_number(pair));
    }
    let mut normalized = String::with_capacity(digits.len() + 3);
    if negative {
        normalized.push('-');
    }
    if digits.starts_with('.') {
        normalized.push('0');
    }
    normalized.push_str(digits);
    if digits.ends_with('.') {
        normalized.push('0');
    }
    normalized
        .parse::<Decimal>()
        .map_err(|_| ctx.invalid_number(pair))
}

fn parse_aperture_id(ctx: &Context, pair: &Pair<Rule>) -> Result<ApertureId, ParseError> {
    pair.as_str()
        .trim_start_matches('D')
        .parse::<u32>()
        .map(ApertureId)
        .map_err(|_| ctx.invalid_number(pair))
}

fn parse_g_code(ctx: &Context, pair: Pair<Rule>) -> Result<NodeKind, ParseError> {
    let mut number = None;
    let mut standalone = false;
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::g_number => number = inner.as_str().parse::<u32>().ok(),
            Rule::g_end => standalone = true,
            _ => {}
        }
    }
    let code = number
        .and_then(GCode::from_number)
        .ok_or_else(|| ctx.malformed(&pair))?;
    Ok(NodeKind::G { code, standalone })
}

fn parse_coordinates(pair: Pair<Rule>) -> Coordinates {
    let mut coordinates = Coordinates::default();
    for inner in pair.into_inner() {
        let rule = inner.as_rule();
        let value = inner
            .into_inner()
            .next()
            .map(|p| PackedCoordinate::new(p.as_str()));
        match rule {
            Rule::coord_x => coordinates.x = value,
            Rule::coord_y => coordinates.y = value,
            Rule::coord_i => coordinates.i = value,
            Rule::coord_j => coordinates.j = value,
            _ => {}
        }
    }
    coordinates
}

fn parse_format(ctx: &Context, pair: Pair<Rule>) -> Result<FormatSpecification, ParseError> {
    let mut zeros = None;
    let mut notation = Notation::Absolute;
    let mut digits = Vec::with_capacity(4);
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::zero_omission => {
                zeros = Some(if inner.as_str() == "T" {
                    ZeroOmission::Trailing
                } else {
                    ZeroOmission::Leading
                })
            }
            Rule::notation => {
                if inner.as_str() == "I" {
                    notation = Notation::Incremental;
                }
            }
            Rule::digit => digits.push(
                inner
                    .as_str()
                    .parse::<u8>()
                    .map_err(|_| ctx.invalid_number(&inner))?,
            ),
            _ => {}
        }
    }
    let [x_integral, x_decimal, y_integral, y_decimal] = digits[..] else {
        return Err(ctx.malformed(&pair));
    };
    Ok(FormatSpecification {
        zeros,
        notation,
        x_integral,
        x_decimal,
        y_integral,
        y_decimal,
    })
}

fn decimals(ctx: &Context, pair: Pair<Rule>) -> Result<Vec<Decimal>, ParseError> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::decimal)
        .map(|p| parse_decimal(ctx, &p))
        .collect()
}

fn parse_aperture_definition(ctx: &Context, pair: Pair<Rule>) -> Result<NodeKind, ParseError> {
    let mut inner = pair.clone().into_inner();
    let (Some(id), Some(shape)) = (inner.next(), inner.next()) else {
        return Err(ctx.malformed(&pair));
    };
    let id = parse_aperture_id(ctx, &id)?;
    let rule = shape.as_rule();
    Ok(match rule {
        Rule::ad_circle => {
            let values = decimals(ctx, shape)?;
            NodeKind::AdCircle(
                id,
                CircleDefinition {
                    diameter: values[0],
                    hole: values.get(1).copied(),
                },
            )
        }
        Rule::ad_rectangle | Rule::ad_obround => {
            let values = decimals(ctx, shape)?;
            let definition = RectangleDefinition {
                width: values[0],
                height: values[1],
                hole: values.get(2).copied(),
            };
            if rule == Rule::ad_rectangle {
                NodeKind::AdRectangle(id, definition)
            } else {
                NodeKind::AdObround(id, definition)
            }
        }
        Rule::ad_polygon => {
            let values = decimals(ctx, shape)?;
            NodeKind::AdPolygon(
                id,
                PolygonDefinition {
                    outer_diameter: values[0],
                    vertices: values[1],
                    rotation: values.get(2).copied(),
                    hole: values.get(3).copied(),
                },
            )
        }
        Rule::ad_macro => {
            let name = inner_str(&shape, Rule::name).to_string();
            NodeKind::AdMacro(
                id,
                MacroReference {
                    name,
                    parameters: decimals(ctx, shape)?,
                },
            )
        }
        _ => return Err(ctx.malformed(&shape)),
    })
}

fn parse_attribute(ctx: &Context, pair: Pair<Rule>) -> Result<Attribute, ParseError> {
    let mut name = None;
    let mut fields = Vec::new();
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::name => name = Some(inner.as_str().to_string()),
            Rule::field => fields.push(inner.as_str().to_string()),
            _ => {}
        }
    }
    let name = name.ok_or_else(|| ctx.malformed(&pair))?;
    Ok(Attribute { name, fields })
}

fn parse_axes(
    ctx: &Context,
    pair: Pair<Rule>,
) -> Result<(Option<Decimal>, Option<Decimal>), ParseError> {
    let (mut a, mut b) = (None, None);
    for inner in pair.into_inner() {
        let rule = inner.as_rule();
        let value = parse_decimal(ctx, &first_inner(ctx, inner)?)?;
        match rule {
            Rule::axis_a => a = Some(value),
            Rule::axis_b => b = Some(value),
            _ => {}
        }
    }
    Ok((a, b))
}

fn parse_invalid(pair: Pair<Rule>) -> String {
    let text = pair.as_str();
    if text.starts_with('%') {
        return text.to_string();
    }
    text.strip_suffix('*').unwrap_or(text).to_string()
}

// ============================================================================
// Blocks
// ============================================================================

fn parse_aperture_block(ctx: &Context, pair: Pair<Rule>) -> Result<ApertureBlock, ParseError> {
    let mut aperture_id = None;
    let mut open_info = None;
    let mut close_info = None;
    let mut nodes = Vec::new();
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::ab_open => {
                open_info = Some(source_info(&inner));
                aperture_id = Some(parse_aperture_id(ctx, &first_inner(ctx, inner)?)?);
            }
            Rule::ab_close => close_info = Some(source_info(&inner)),
            _ => nodes.push(parse_statement(ctx, inner)?),
        }
    }
    let aperture_id = aperture_id.ok_or_else(|| ctx.malformed(&pair))?;
    Ok(ApertureBlock {
        aperture_id,
        nodes,
        open_info,
        close_info,
    })
}

fn parse_step_repeat(ctx: &Context, pair: Pair<Rule>) -> Result<StepRepeat, ParseError> {
    let mut parameters = StepRepeatParameters::default();
    let mut open_info = None;
    let mut close_info = None;
    let mut nodes = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::sr_open => {
                open_info = Some(source_info(&inner));
                for axis in inner.into_inner() {
                    let rule = axis.as_rule();
                    let value = Some(parse_decimal(ctx, &first_inner(ctx, axis)?)?);
                    match rule {
                        Rule::sr_x => parameters.x = value,
                        Rule::sr_y => parameters.y = value,
                        Rule::sr_i => parameters.i = value,
                        Rule::sr_j => parameters.j = value,
                        _ => {}
                    }
                }
            }
            Rule::sr_close => close_info = Some(source_info(&inner)),
            _ => nodes.push(parse_statement(ctx, inner)?),
        }
    }
    Ok(StepRepeat {
        parameters,
        nodes,
        open_info,
        close_info,
    })
}

// ============================================================================
// Aperture macros
// ============================================================================

fn parse_macro_definition(ctx: &Context, pair: Pair<Rule>) -> Result<ApertureMacro, ParseError> {
    let mut name = String::new();
    let mut statements = Vec::new();
    let mut open_info = None;
    let mut close_info = None;
    for inner in pair.into_inner() {
        let info = source_info(&inner);
        let kind = match inner.as_rule() {
            Rule::am_open => {
                open_info = Some(info);
                name = inner_str(&inner, Rule::name).to_string();
                continue;
            }
            Rule::am_close => {
                close_info = Some(info);
                continue;
            }
            Rule::macro_comment => {
                MacroStatementKind::Comment(inner_str(&inner, Rule::comment).to_string())
            }
            Rule::macro_assignment => {
                let mut parts = inner.clone().into_inner();
                let (Some(variable), Some(value)) = (parts.next(), parts.next()) else {
                    return Err(ctx.malformed(&inner));
                };
                MacroStatementKind::Assignment {
                    variable: parse_variable(ctx, &variable)?,
                    value: parse_expression(ctx, value)?,
                }
            }
            Rule::macro_primitive => MacroStatementKind::Primitive(parse_primitive(ctx, inner)?),
            _ => return Err(ctx.malformed(&inner)),
        };
        statements.push(MacroStatement {
            kind,
            source_info: Some(info),
        });
    }
    Ok(ApertureMacro {
        name,
        statements,
        open_info,
        close_info,
    })
}

fn parse_variable(ctx: &Context, pair: &Pair<Rule>) -> Result<u32, ParseError> {
    pair.as_str()
        .trim_start_matches('$')
        .parse::<u32>()
        .map_err(|_| ctx.invalid_number(pair))
}

fn parse_expression(ctx: &Context, pair: Pair<Rule>) -> Result<Expression, ParseError> {
    match pair.as_rule() {
        Rule::expression => parse_expression(ctx, first_inner(ctx, pair)?),
        Rule::add_chain => parse_chain(ctx, pair, Expression::Add),
        Rule::sub_chain => parse_chain(ctx, pair, Expression::Subtract),
        Rule::mul_chain => parse_chain(ctx, pair, Expression::Multiply),
        Rule::div_chain => parse_chain(ctx, pair, Expression::Divide),
        Rule::negated => Ok(Expression::Negative(Box::new(parse_expression(
            ctx,
            first_inner(ctx, pair)?,
        )?))),
        Rule::positive => Ok(Expression::Positive(Box::new(parse_expression(
            ctx,
            first_inner(ctx, pair)?,
        )?))),
        Rule::parenthesized => Ok(Expression::Parenthesized(Box::new(parse_expression(
            ctx,
            first_inner(ctx, pair)?,
        )?))),
        Rule::unsigned => Ok(Expression::Constant(parse_decimal(ctx, &pair)?)),
        Rule::variable => Ok(Expression::Variable(parse_variable(ctx, &pair)?)),
        _ => Err(ctx.malformed(&pair)),
    }
}

/// Single-operand chains collapse to their operand.
fn parse_chain(
    ctx: &Context,
    pair: Pair<Rule>,
    build: fn(Box<Expression>, Vec<Expression>) -> Expression,
) -> Result<Expression, ParseError> {
    let mut operands = pair
        .clone()
        .into_inner()
        .map(|p| parse_expression(ctx, p))
        .collect::<Result<VecDeque<_>, _>>()?;
    let head = operands.pop_front().ok_or_else(|| ctx.malformed(&pair))?;
    if operands.is_empty() {
        return Ok(head);
    }
    Ok(build(Box::new(head), operands.into()))
}

fn parse_primitive(ctx: &Context, pair: Pair<Rule>) -> Result<MacroPrimitive, ParseError> {
    let mut inner = pair.clone().into_inner();
    let code = inner
        .next()
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| ctx.malformed(&pair))?;
    let parameters = inner
        .map(|p| parse_expression(ctx, p))
        .collect::<Result<VecDeque<_>, _>>()?;
    build_primitive(&code, parameters).map_err(|message| ParseError::InvalidPrimitive {
        code: code.clone(),
        message,
        src: ctx.named_source(),
        span: Context::span(&pair),
    })
}

/// Parameters of one primitive, consumed front to back after the arity check.
struct Parameters(VecDeque<Expression>);

impl Parameters {
    fn take(&mut self) -> Expression {
        self.0
            .pop_front()
            .unwrap_or(Expression::Constant(Decimal::ZERO))
    }

    fn rest(&mut self) -> Option<Expression> {
        self.0.pop_front()
    }
}

fn build_primitive(code: &str, parameters: VecDeque<Expression>) -> Result<MacroPrimitive, String> {
    let count = parameters.len();
    let arity = |min: usize, max: usize| {
        if (min..=max).contains(&count) {
            Ok(())
        } else {
            Err(format!("expected {min} to {max} parameters, found {count}"))
        }
    };
    let mut p = Parameters(parameters);
    Ok(match code {
        "1" => {
            arity(4, 5)?;
            MacroPrimitive::Circle {
                exposure: p.take(),
                diameter: p.take(),
                center_x: p.take(),
                center_y: p.take(),
                rotation: p.rest(),
            }
        }
        "2" | "20" => {
            arity(6, 7)?;
            MacroPrimitive::VectorLine {
                code: if code == "2" {
                    VectorLineCode::Legacy
                } else {
                    VectorLineCode::Standard
                },
                exposure: p.take(),
                width: p.take(),
                start_x: p.take(),
                start_y: p.take(),
                end_x: p.take(),
                end_y: p.take(),
                rotation: p.rest(),
            }
        }
        "21" => {
            arity(5, 6)?;
            MacroPrimitive::CenterLine {
                exposure: p.take(),
                width: p.take(),
                height: p.take(),
                center_x: p.take(),
                center_y: p.take(),
                rotation: p.rest(),
            }
        }
        "22" => {
            arity(5, 6)?;
            MacroPrimitive::LowerLeftLine {
                exposure: p.take(),
                width: p.take(),
                height: p.take(),
                x: p.take(),
                y: p.take(),
                rotation: p.rest(),
            }
        }
        "4" => {
            if count < 4 {
                return Err(format!(
                    "expected exposure, vertex count and a start point, found {count} parameters"
                ));
            }
            let exposure = p.take();
            let vertex_count = p.take();
            // Coordinates come in pairs; an odd tail is the rotation.
            let rotation = if p.0.len() % 2 == 1 { p.0.pop_back() } else { None };
            let mut points = Vec::with_capacity(p.0.len() / 2);
            while !p.0.is_empty() {
                points.push((p.take(), p.take()));
            }
            MacroPrimitive::Outline {
                exposure,
                vertex_count,
                points,
                rotation,
            }
        }
        "5" => {
            arity(5, 6)?;
            MacroPrimitive::Polygon {
                exposure: p.take(),
                vertex_count: p.take(),
                center_x: p.take(),
                center_y: p.take(),
                diameter: p.take(),
                rotation: p.rest(),
            }
        }
        "6" => {
            arity(8, 9)?;
            MacroPrimitive::Moire {
                center_x: p.take(),
                center_y: p.take(),
                outer_diameter: p.take(),
                ring_thickness: p.take(),
                gap: p.take(),
                max_rings: p.take(),
                crosshair_thickness: p.take(),
                crosshair_length: p.take(),
                rotation: p.rest(),
            }
        }
        "7" => {
            arity(5, 6)?;
            MacroPrimitive::Thermal {
                center_x: p.take(),
                center_y: p.take(),
                outer_diameter: p.take(),
                inner_diameter: p.take(),
                gap: p.take(),
                rotation: p.rest(),
            }
        }
        other => return Err(format!("unknown primitive code {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn kinds(file: &File) -> Vec<&'static str> {
        file.nodes.iter().map(|n| n.kind_name()).collect()
    }

    fn parse_ok(source: &str) -> File {
        let result = parse(source, &ParseOptions::default());
        assert!(result.is_ok(), "Failed to parse: {:?}", result.err());
        result.unwrap()
    }

    // ==================== Word commands ====================

    #[test]
    fn simple_stroke_file() {
        let file = parse_ok(
            "%FSLAX26Y26*%\n%MOMM*%\n%ADD10C,0.1*%\nD10*\nX0Y0D02*\nX1000000Y0D01*\nM02*",
        );
        assert_eq!(kinds(&file), ["FS", "MO", "ADC", "Dnn", "D02", "D01", "M02"]);
        assert_eq!(
            file.nodes[5].kind,
            NodeKind::D01(Coordinates::xy("1000000", "0"))
        );
    }

    #[test]
    fn g_code_prefix_and_standalone() {
        let file = parse_ok("G01X100Y-200D01*G75*G54D10*");
        assert_eq!(
            file.nodes[0].kind,
            NodeKind::G { code: GCode::G01, standalone: false }
        );
        assert_eq!(
            file.nodes[1].kind,
            NodeKind::D01(Coordinates::xy("100", "-200"))
        );
        assert_eq!(
            file.nodes[2].kind,
            NodeKind::G { code: GCode::G75, standalone: true }
        );
        assert_eq!(file.nodes[4].kind, NodeKind::Dnn(ApertureId(10)));
    }

    #[test]
    fn operation_codes_with_and_without_zeros() {
        let file = parse_ok("X1Y2I3J4D1*X5*D001*D3*D010*");
        assert_eq!(
            file.nodes[0].kind,
            NodeKind::D01(Coordinates::xy("1", "2").with_ij("3", "4"))
        );
        assert_eq!(
            file.nodes[1].kind,
            NodeKind::D01(Coordinates { x: Some(PackedCoordinate::new("5")), ..Default::default() })
        );
        assert_eq!(file.nodes[2].kind, NodeKind::D01(Coordinates::default()));
        assert_eq!(file.nodes[3].kind, NodeKind::D03(Coordinates::default()));
        assert_eq!(file.nodes[4].kind, NodeKind::Dnn(ApertureId(10)));
    }

    #[test]
    fn comments_keep_their_text() {
        let file = parse_ok("G04 Created by hand, 100%*\nG04*");
        assert_eq!(file.nodes[0].kind, NodeKind::G04(" Created by hand, 100%".into()));
        assert_eq!(file.nodes[1].kind, NodeKind::G04(String::new()));
    }

    // ==================== Extended commands ====================

    #[test]
    fn aperture_definitions() {
        let file = parse_ok(
            "%ADD10C,.5X0.1*%%ADD11R,1X2*%%ADD12O,1.X2*%%ADD13P,2X6X45X0.5*%%ADD14THERMAL80,0.8X0.6*%",
        );
        assert_eq!(
            file.nodes[0].kind,
            NodeKind::AdCircle(ApertureId(10), CircleDefinition { diameter: dec!(0.5), hole: Some(dec!(0.1)) })
        );
        assert!(matches!(file.nodes[1].kind, NodeKind::AdRectangle(ApertureId(11), _)));
        assert!(matches!(&file.nodes[2].kind, NodeKind::AdObround(_, r) if r.width == dec!(1)));
        assert_eq!(
            file.nodes[3].kind,
            NodeKind::AdPolygon(
                ApertureId(13),
                PolygonDefinition {
                    outer_diameter: dec!(2),
                    vertices: dec!(6),
                    rotation: Some(dec!(45)),
                    hole: Some(dec!(0.5)),
                }
            )
        );
        assert_eq!(
            file.nodes[4].kind,
            NodeKind::AdMacro(
                ApertureId(14),
                MacroReference { name: "THERMAL80".into(), parameters: vec![dec!(0.8), dec!(0.6)] }
            )
        );
    }

    #[test]
    fn format_and_attributes() {
        let file = parse_ok("%FSTIX34Y25*%%TF.FileFunction,Copper,L1,Top*%%TA.AperFunction,,x*%%TD*%%TD.N*%");
        assert_eq!(
            file.nodes[0].kind,
            NodeKind::Fs(FormatSpecification {
                zeros: Some(ZeroOmission::Trailing),
                notation: Notation::Incremental,
                x_integral: 3,
                x_decimal: 4,
                y_integral: 2,
                y_decimal: 5,
            })
        );
        assert_eq!(
            file.nodes[1].kind,
            NodeKind::Tf(Attribute {
                name: ".FileFunction".into(),
                fields: vec!["Copper".into(), "L1".into(), "Top".into()],
            })
        );
        assert_eq!(
            file.nodes[2].kind,
            NodeKind::Ta(Attribute { name: ".AperFunction".into(), fields: vec!["".into(), "x".into()] })
        );
        assert_eq!(file.nodes[3].kind, NodeKind::Td(None));
        assert_eq!(file.nodes[4].kind, NodeKind::Td(Some(".N".into())));
    }

    #[test]
    fn quoted_attribute_fields_keep_commas() {
        let file = parse_ok("%TA.AperFunction,Other,\"a,b\"*%%TO.C,\"R1*%");
        assert_eq!(
            file.nodes[0].kind,
            NodeKind::Ta(Attribute {
                name: ".AperFunction".into(),
                fields: vec!["Other".into(), "\"a,b\"".into()],
            })
        );
        // an unmatched quote is ordinary field text
        assert_eq!(
            file.nodes[1].kind,
            NodeKind::To(Attribute { name: ".C".into(), fields: vec!["\"R1".into()] })
        );
    }

    #[test]
    fn legacy_image_commands() {
        let file = parse_ok("%IPNEG*%%IR90*%%OFA1.5B-2*%%SFA2*%%ASAYBX*%%MIA1B0*%%INPANEL*%%LNTOP*%");
        assert_eq!(
            kinds(&file),
            ["IP", "IR", "OF", "SF", "AS", "MI", "IN", "LN"]
        );
        assert_eq!(file.nodes[2].kind, NodeKind::Of { a: Some(dec!(1.5)), b: Some(dec!(-2)) });
        assert_eq!(file.nodes[3].kind, NodeKind::Sf { a: Some(dec!(2)), b: None });
        assert_eq!(file.nodes[5].kind, NodeKind::Mi { a: Some(true), b: Some(false) });
        assert_eq!(file.nodes[7].kind, NodeKind::Ln("TOP".into()));
    }

    #[test]
    fn load_commands() {
        let file = parse_ok("%LPC*%%LMXY*%%LR-45.5*%%LS0.8*%");
        assert_eq!(file.nodes[0].kind, NodeKind::Lp(Polarity::Clear));
        assert_eq!(file.nodes[1].kind, NodeKind::Lm(Mirroring::XY));
        assert_eq!(file.nodes[2].kind, NodeKind::Lr(dec!(-45.5)));
        assert_eq!(file.nodes[3].kind, NodeKind::Ls(dec!(0.8)));
    }

    // ==================== Macros ====================

    #[test]
    fn macro_body_spans_lines() {
        let file = parse_ok(
            "%AMOC8*\n0 octagon*\n$2=$1x1.08239*\n5,1,8,0,0,$2,22.5*\n4,1,3,0,0,1,0,1,1,0,0,0*%",
        );
        let NodeKind::Am(definition) = &file.nodes[0].kind else {
            panic!("expected AM, got {:?}", file.nodes[0].kind);
        };
        assert_eq!(definition.name, "OC8");
        assert_eq!(definition.statements.len(), 4);
        assert_eq!(
            definition.statements[1].kind,
            MacroStatementKind::Assignment {
                variable: 2,
                value: Expression::Multiply(
                    Box::new(Expression::Variable(1)),
                    vec![Expression::Constant(dec!(1.08239))]
                ),
            }
        );
        let MacroStatementKind::Primitive(MacroPrimitive::Outline { points, rotation, .. }) =
            &definition.statements[3].kind
        else {
            panic!("expected outline");
        };
        assert_eq!(points.len(), 4);
        assert_eq!(rotation, &Some(Expression::Constant(dec!(0))));
    }

    #[test]
    fn expression_precedence() {
        let file = parse_ok("%AMX*1,1,$1+2x-$3/4-1,0,0*%");
        let NodeKind::Am(definition) = &file.nodes[0].kind else {
            panic!("expected AM");
        };
        let MacroStatementKind::Primitive(MacroPrimitive::Circle { diameter, .. }) =
            &definition.statements[0].kind
        else {
            panic!("expected circle");
        };
        // $1 + ((2 x (-$3 / 4)) - 1)
        let expected = Expression::Add(
            Box::new(Expression::Variable(1)),
            vec![Expression::Subtract(
                Box::new(Expression::Multiply(
                    Box::new(Expression::Constant(dec!(2))),
                    vec![Expression::Divide(
                        Box::new(Expression::Negative(Box::new(Expression::Variable(3)))),
                        vec![Expression::Constant(dec!(4))],
                    )],
                )),
                vec![Expression::Constant(dec!(1))],
            )],
        );
        assert_eq!(diameter, &expected);
    }

    #[test]
    fn primitive_arity_is_checked() {
        let error = parse("%AMBAD*1,1,0.5*%", &ParseOptions::default()).unwrap_err();
        assert!(matches!(error, ParseError::InvalidPrimitive { ref code, .. } if code == "1"));
    }

    // ==================== Blocks ====================

    #[test]
    fn nested_blocks() {
        let file = parse_ok(
            "%ABD20*%\nD10*\n%ABD21*%\nX0Y0D03*\n%AB*%\n%AB*%\n%SRX2Y3I5.0J2.5*%\nD20*\nX0Y0D03*\n%SR*%\n",
        );
        let NodeKind::Ab(outer) = &file.nodes[0].kind else {
            panic!("expected AB");
        };
        assert_eq!(outer.aperture_id, ApertureId(20));
        assert_eq!(outer.nodes.len(), 2);
        assert!(matches!(outer.nodes[1].kind, NodeKind::Ab(_)));
        assert_eq!(outer.open_info.map(|i| i.line), Some(1));
        assert_eq!(outer.close_info.map(|i| i.line), Some(6));

        let NodeKind::Sr(repeat) = &file.nodes[1].kind else {
            panic!("expected SR");
        };
        assert_eq!(repeat.parameters.x, Some(dec!(2)));
        assert_eq!(repeat.parameters.j, Some(dec!(2.5)));
        assert_eq!(repeat.nodes.len(), 2);
    }

    // ==================== Modes ====================

    #[test]
    fn strict_mode_reports_position() {
        let error = parse("%MOMM*%\nX1Y1D07*\n", &ParseOptions::default()).unwrap_err();
        let ParseError::UnexpectedToken { line, .. } = error else {
            panic!("expected syntax error, got {error:?}");
        };
        assert_eq!(line, 2);
    }

    #[test]
    fn partial_mode_stops_quietly() {
        let options = ParseOptions::default().with_strict(false);
        let file = parse("%MOMM*%\nD10*\n???\nD11*", &options).unwrap();
        assert_eq!(kinds(&file), ["MO", "Dnn"]);
    }

    #[test]
    fn resilient_mode_wraps_garbage() {
        let options = ParseOptions::default().with_resilient(true);
        let file = parse("X1000Y2000D01* GARBAGE* X500Y500D02*", &options).unwrap();
        assert_eq!(file.nodes.len(), 3);
        assert_eq!(file.nodes[1].kind, NodeKind::Invalid("GARBAGE".into()));
        assert_eq!(file.nodes[2].kind, NodeKind::D02(Coordinates::xy("500", "500")));
        let diagnostics = file.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].range.map(|r| r.offset), Some(15));
    }

    #[test]
    fn resilient_garbage_ends_at_newline() {
        let options = ParseOptions::default().with_resilient(true);
        let file = parse("X0Y0D02*\nGARBAGE\nX1Y1D02*", &options).unwrap();
        assert_eq!(kinds(&file), ["D02", "Invalid", "D02"]);
        assert_eq!(file.nodes[1].kind, NodeKind::Invalid("GARBAGE".into()));
        assert_eq!(file.nodes[2].kind, NodeKind::D02(Coordinates::xy("1", "1")));
    }

    #[test]
    fn resilient_mode_wraps_bad_extended_commands() {
        let options = ParseOptions::default().with_resilient(true);
        let file = parse("%MOMM*%%XYZ123*%D10*", &options).unwrap();
        assert_eq!(file.nodes[1].kind, NodeKind::Invalid("%XYZ123*%".into()));
        assert_eq!(file.nodes[2].kind, NodeKind::Dnn(ApertureId(10)));
    }

    #[test]
    fn source_info_points_at_text() {
        let source = "%MOMM*%\n  X1Y2D03*";
        let file = parse_ok(source);
        let info = file.nodes[1].source_info.unwrap();
        assert_eq!(info.text(source), Some("X1Y2D03*"));
        assert_eq!((info.line, info.column), (2, 3));
    }

    // ==================== Round trip ====================

    #[test]
    fn round_trip_is_structural() {
        let source = "\
G04 round trip*
%FSLAX36Y36*%
%MOIN*%
%TF.Part,Single*%
%AMDONUT*
0 ring*
1,1,$1,0,0*
1,0,$2,0,0*
$3=($1-$2)/2*
20,1,$3,0,0,1,1,-30*
7,0,0,1,0.8,0.1,45*
6,0,0,1,0.1,0.1,3,0.01,1.2,0*%
%ADD10C,0.010*%
%ADD11DONUT,0.5X0.3*%
%ADD12P,1X5*%
%LPD*%
%ABD30*%
D10*
G01X0Y0D02*
X1000Y0D01*
%AB*%
%SRX3Y2I1J1*%
D11*
X0Y0D03*
%SR*%
G36*
G75*
X0Y0D02*
G03X1000Y0I500J0D01*
X0Y0D01*
G37*
%LMY*%%LR90*%%LS2*%
%TD*%
M02*
";
        let file = parse_ok(source);
        let emitted = file.get_gerber_code("    ", "\r\n");
        let reparsed = parse_ok(&emitted);
        assert_eq!(file, reparsed);
        for node in file.iter_nodes() {
            let code = node.get_gerber_code("", "\n");
            if node.children().is_some() || matches!(node.kind, NodeKind::G { standalone: false, .. }) {
                continue;
            }
            let single = parse_ok(&code);
            assert_eq!(single.nodes, vec![node.clone()], "round trip of `{code}`");
        }
    }
}
