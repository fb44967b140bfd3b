//! Operator grammar table and instruction validation
//!
//! Each recognised operator maps to the ordered operand kinds it takes. A
//! grammar compiles to one anchored pattern matched against the whole
//! (trimmed) instruction line, so validation is purely about shape: names
//! are never looked up in the page resources and numbers are never range
//! checked.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::tokenize::Instruction;
use Operand::*;

/// Shape of one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Digits and minus signs, no decimal point
    Integer,
    /// Digits only
    UnsignedInteger,
    /// Digits and decimal points
    Decimal,
    /// Digits, decimal points and minus signs
    SignedDecimal,
    /// Resource name such as `/F1` or `/GS0`
    Name,
    /// Marked-content tag such as `/Span`
    Tag,
    /// `/DeviceGray`, `/DeviceRGB` or `/DeviceCMYK`
    DeviceColorSpace,
    /// One of a fixed set of literal tokens
    OneOf(&'static [&'static str]),
    /// Bracketed dash pattern with at most two unsigned integers
    DashArray,
    /// Bracketed array of `(string)`, `<hex>` or integer elements
    TextArray,
    /// Optional inline `<<...>>` property list
    PropertyList,
}

impl Operand {
    fn pattern(&self) -> String {
        match self {
            Operand::Integer => r"[0-9-]+".to_string(),
            Operand::UnsignedInteger => r"[0-9]+".to_string(),
            Operand::Decimal => r"[0-9.]+".to_string(),
            Operand::SignedDecimal => r"[0-9.-]+".to_string(),
            Operand::Name => r"/[A-Za-z0-9_]+".to_string(),
            Operand::Tag => r"/[A-Za-z0-9]+".to_string(),
            Operand::DeviceColorSpace => r"/Device(?:Gray|RGB|CMYK)".to_string(),
            Operand::OneOf(choices) => format!(
                "(?:{})",
                choices.iter().map(|c| regex::escape(c)).collect::<Vec<_>>().join("|")
            ),
            Operand::DashArray => r"\[(?:[0-9]+\s*){0,2}\]".to_string(),
            Operand::TextArray => r"\[(?:(?:\([^)]+\)|<[0-9a-fA-F]+>|[0-9]+)\s*)+\]".to_string(),
            Operand::PropertyList => r"<<[^>]+>>".to_string(),
        }
    }

    fn is_optional(&self) -> bool {
        matches!(self, Operand::PropertyList)
    }
}

const LINE_STYLE: &[&str] = &["0", "1", "2"];

/// Recognised operators and their operand shapes
///
/// Adding an operator means adding a row here.
pub const GRAMMAR: &[(&str, &[Operand])] = &[
    // Graphics state
    ("q", &[]),
    ("Q", &[]),
    ("cm", &[Integer, Integer, Integer, Integer, Integer, Integer]),
    ("gs", &[Name]),
    ("w", &[Decimal]),
    ("J", &[OneOf(LINE_STYLE)]),
    ("j", &[OneOf(LINE_STYLE)]),
    ("d", &[DashArray, UnsignedInteger]),
    // Path construction and painting
    ("m", &[Decimal, Decimal]),
    ("l", &[Decimal, Decimal]),
    ("re", &[Decimal, Decimal, Decimal, Decimal]),
    ("f", &[]),
    ("S", &[]),
    // Colour
    ("CS", &[DeviceColorSpace]),
    ("cs", &[DeviceColorSpace]),
    ("SCN", &[Decimal, Decimal, Decimal]),
    ("scn", &[Decimal, Decimal, Decimal]),
    // Text
    ("BT", &[]),
    ("ET", &[]),
    ("Tf", &[Name, UnsignedInteger]),
    (
        "Tm",
        &[SignedDecimal, SignedDecimal, SignedDecimal, SignedDecimal, SignedDecimal, SignedDecimal],
    ),
    ("TJ", &[TextArray]),
    // Marked content
    ("BDC", &[Tag, PropertyList]),
    ("EMC", &[]),
];

/// A compiled grammar for one operator
#[derive(Debug)]
pub struct Grammar {
    operator: &'static str,
    operands: &'static [Operand],
    pattern: Regex,
}

impl Grammar {
    fn compile(operator: &'static str, operands: &'static [Operand]) -> Self {
        let mut pattern = String::from("^");
        for operand in operands {
            if operand.is_optional() {
                pattern.push_str(&format!(r"(?:{}\s+)?", operand.pattern()));
            } else {
                pattern.push_str(&format!(r"{}\s+", operand.pattern()));
            }
        }
        pattern.push_str(&regex::escape(operator));
        pattern.push('$');

        Self {
            operator,
            operands,
            pattern: Regex::new(&pattern).expect("operator grammar table compiles"),
        }
    }

    /// The grammar registered for `operator`, if any (case-sensitive)
    pub fn lookup(operator: &str) -> Option<&'static Grammar> {
        GRAMMARS.get(operator)
    }

    /// Names of all recognised operators, sorted
    pub fn registered_operators() -> Vec<&'static str> {
        let mut operators: Vec<_> = GRAMMAR.iter().map(|(op, _)| *op).collect();
        operators.sort_unstable();
        operators
    }

    pub fn operator(&self) -> &'static str {
        self.operator
    }

    pub fn operands(&self) -> &'static [Operand] {
        self.operands
    }

    /// Whether a full instruction line has this grammar's shape
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line.trim())
    }
}

lazy_static! {
    static ref GRAMMARS: HashMap<&'static str, Grammar> = GRAMMAR
        .iter()
        .map(|(operator, operands)| (*operator, Grammar::compile(*operator, *operands)))
        .collect();
}

/// Why an instruction failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    /// The operator is known but the line does not have its shape
    Malformed,
    /// No grammar is registered for the operator
    UnknownOperator,
}

/// A content stream instruction that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub operator_name: String,
    pub page_number: usize,
    pub line_number: usize,
    pub raw_text: String,
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Classify one instruction
///
/// Returns `None` when the instruction conforms to its operator's grammar.
pub fn validate(instruction: &Instruction) -> Option<ValidationIssue> {
    let (kind, message) = match Grammar::lookup(&instruction.operator_name) {
        None => (
            IssueKind::UnknownOperator,
            Some(format!("No validator for {}", instruction.operator_name)),
        ),
        Some(grammar) if grammar.matches(&instruction.raw_text) => return None,
        Some(_) => (IssueKind::Malformed, None),
    };

    Some(ValidationIssue {
        operator_name: instruction.operator_name.clone(),
        page_number: instruction.page_number,
        line_number: instruction.line_number,
        raw_text: instruction.raw_text.clone(),
        kind,
        message,
    })
}
