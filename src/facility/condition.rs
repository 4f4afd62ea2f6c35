//! Condition expressions for dynamic rules
//!
//! ```text
//! formula =~ /VLOOKUP/ && !isError(value)
//! type == 'number' && value > 1000
//! (row > 10 || column > 5) && isEmpty(value)
//! ```
//!
//! Fields: `value`, `formula`, `type`, `row`, `column`, `sheet`, `address`.
//! Functions: `isEmpty(f)`, `isError(f)`, `isNumber(f)`, `isText(f)`.
//! A bare field is true when it has a non-empty value.

use crate::spreadsheet::{CellRef, CellValue};
use regex::Regex;
use thiserror::Error;

/// Error parsing a condition
#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("Empty condition")]
    Empty,

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Unbalanced parentheses in '{0}'")]
    Unbalanced(String),
}

/// Cell attribute a condition can inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Value,
    Formula,
    Type,
    Row,
    Column,
    Sheet,
    Address,
}

impl std::str::FromStr for Field {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "value" => Ok(Field::Value),
            "formula" => Ok(Field::Formula),
            "type" => Ok(Field::Type),
            "row" => Ok(Field::Row),
            "column" => Ok(Field::Column),
            "sheet" => Ok(Field::Sheet),
            "address" => Ok(Field::Address),
            other => Err(ConditionError::UnknownField(other.to_string())),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Checked in this order so two-character operators win
const COMPARE_OPS: &[CompareOp] = &[
    CompareOp::Eq,
    CompareOp::Ne,
    CompareOp::Ge,
    CompareOp::Le,
    CompareOp::Gt,
    CompareOp::Lt,
];

/// A field value extracted from a cell
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Text(String),
}

impl Operand {
    fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            Operand::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Operand::Number(n) => n.to_string(),
            Operand::Text(s) => s.clone(),
        }
    }

    fn parse_literal(literal: &str) -> Self {
        let literal = literal.trim();
        let quoted = (literal.starts_with('\'') && literal.ends_with('\''))
            || (literal.starts_with('"') && literal.ends_with('"'));
        if quoted && literal.len() >= 2 {
            return Operand::Text(literal[1..literal.len() - 1].to_string());
        }
        match literal.parse::<f64>() {
            Ok(n) => Operand::Number(n),
            Err(_) => Operand::Text(literal.to_string()),
        }
    }
}

/// Parsed condition
#[derive(Debug, Clone)]
pub enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare {
        field: Field,
        op: CompareOp,
        value: String,
    },
    Matches {
        field: Field,
        regex: Regex,
    },
    IsEmpty(Field),
    IsError(Field),
    IsNumber(Field),
    IsText(Field),
    Present(Field),
}

impl Condition {
    /// Parse a condition expression
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let condition = source.trim();
        if condition.is_empty() {
            return Err(ConditionError::Empty);
        }

        if let Some(idx) = find_operator(condition, "||") {
            return Ok(Condition::Or(
                Box::new(Self::parse(&condition[..idx])?),
                Box::new(Self::parse(&condition[idx + 2..])?),
            ));
        }

        if let Some(idx) = find_operator(condition, "&&") {
            return Ok(Condition::And(
                Box::new(Self::parse(&condition[..idx])?),
                Box::new(Self::parse(&condition[idx + 2..])?),
            ));
        }

        if let Some(rest) = condition.strip_prefix('!') {
            if !rest.starts_with('=') {
                return Ok(Condition::Not(Box::new(Self::parse(rest)?)));
            }
        }

        if condition.starts_with('(') {
            if closing_paren(condition) == Some(condition.len() - 1) {
                return Self::parse(&condition[1..condition.len() - 1]);
            }
            return Err(ConditionError::Unbalanced(condition.to_string()));
        }

        if let Some(idx) = find_operator(condition, "=~") {
            let field: Field = condition[..idx].parse()?;
            let pattern = condition[idx + 2..].trim().trim_matches('/');
            let regex = Regex::new(pattern).map_err(|e| ConditionError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            return Ok(Condition::Matches { field, regex });
        }

        for op in COMPARE_OPS {
            if let Some(idx) = find_operator(condition, op.symbol()) {
                let field: Field = condition[..idx].parse()?;
                let value = condition[idx + op.symbol().len()..].trim().to_string();
                return Ok(Condition::Compare {
                    field,
                    op: *op,
                    value,
                });
            }
        }

        for &(name, build) in FUNCTIONS {
            if let Some(arg) = condition
                .strip_prefix(name)
                .and_then(|rest| rest.trim_start().strip_prefix('('))
                .and_then(|rest| rest.strip_suffix(')'))
            {
                let field: Field = arg.parse()?;
                return Ok(build(field));
            }
        }

        Ok(Condition::Present(condition.parse()?))
    }

    /// Evaluate against one cell
    pub fn evaluate(&self, cell: &CellRef<'_>) -> bool {
        match self {
            Condition::Or(a, b) => a.evaluate(cell) || b.evaluate(cell),
            Condition::And(a, b) => a.evaluate(cell) && b.evaluate(cell),
            Condition::Not(inner) => !inner.evaluate(cell),
            Condition::Compare { field, op, value } => {
                compare(field_value(*field, cell), *op, &Operand::parse_literal(value))
            }
            Condition::Matches { field, regex } => {
                field_value(*field, cell).is_some_and(|v| regex.is_match(&v.as_text()))
            }
            Condition::IsEmpty(field) => {
                field_value(*field, cell).is_none_or(|v| v.as_text().is_empty())
            }
            Condition::IsError(field) => match field {
                Field::Value => cell.cell.value.is_error(),
                _ => false,
            },
            Condition::IsNumber(field) => match field {
                Field::Value => matches!(cell.cell.value, CellValue::Number(_)),
                _ => field_value(*field, cell).is_some_and(|v| v.as_number().is_some()),
            },
            Condition::IsText(field) => match field {
                Field::Value => matches!(cell.cell.value, CellValue::Text(_)),
                _ => field_value(*field, cell).is_some_and(|v| matches!(v, Operand::Text(_))),
            },
            Condition::Present(field) => {
                field_value(*field, cell).is_some_and(|v| !v.as_text().is_empty())
            }
        }
    }
}

type FunctionBuilder = fn(Field) -> Condition;

const FUNCTIONS: &[(&str, FunctionBuilder)] = &[
    ("isEmpty", Condition::IsEmpty),
    ("isError", Condition::IsError),
    ("isNumber", Condition::IsNumber),
    ("isText", Condition::IsText),
];

fn field_value(field: Field, cell: &CellRef<'_>) -> Option<Operand> {
    match field {
        Field::Value => match &cell.cell.value {
            CellValue::Empty => None,
            CellValue::Number(n) => Some(Operand::Number(*n)),
            other => Some(Operand::Text(other.to_string())),
        },
        Field::Formula => cell.cell.formula.clone().map(Operand::Text),
        Field::Type => Some(Operand::Text(cell.cell.value.type_name().to_string())),
        Field::Row => Some(Operand::Number(f64::from(cell.row))),
        Field::Column => Some(Operand::Number(f64::from(cell.column))),
        Field::Sheet => Some(Operand::Text(cell.sheet.to_string())),
        Field::Address => Some(Operand::Text(cell.location().a1())),
    }
}

fn compare(left: Option<Operand>, op: CompareOp, right: &Operand) -> bool {
    let Some(left) = left else {
        return op == CompareOp::Ne;
    };

    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => left.as_text() == right.as_text(),
            };
            equal == (op == CompareOp::Eq)
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => match op {
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
                CompareOp::Eq | CompareOp::Ne => false,
            },
            _ => false,
        },
    }
}

/// Position of `op` at parenthesis depth 0, outside quotes and `/regex/` literals
fn find_operator(s: &str, op: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth: i32 = 0;
    for (i, b) in unquoted_bytes(s) {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && bytes[i..].starts_with(op.as_bytes()) {
            return Some(i);
        }
    }
    None
}

/// Index of the parenthesis closing the one at position 0
fn closing_paren(s: &str) -> Option<usize> {
    let mut depth = 0;
    for (i, b) in unquoted_bytes(s) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Bytes (with their positions) outside quoted and `/regex/` literals, delimiters excluded
fn unquoted_bytes(s: &str) -> Vec<(usize, u8)> {
    let bytes = s.as_bytes();
    let mut found = Vec::with_capacity(bytes.len());
    let mut quote: Option<u8> = None;
    let mut in_regex = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if in_regex {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'/' {
                in_regex = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' => quote = Some(b),
            b'/' => in_regex = true,
            _ => found.push((i, b)),
        }
        i += 1;
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::Cell;

    fn cell_ref(cell: &Cell, row: u32, column: u32) -> CellRef<'_> {
        CellRef {
            sheet: "Input",
            row,
            column,
            cell,
        }
    }

    fn eval(condition: &str, cell: &Cell) -> bool {
        Condition::parse(condition)
            .unwrap()
            .evaluate(&cell_ref(cell, 3, 2))
    }

    #[test]
    fn test_numeric_comparisons() {
        let cell = Cell::number(1500.0);
        assert!(eval("value > 1000", &cell));
        assert!(eval("value >= 1500", &cell));
        assert!(!eval("value < 1000", &cell));
        assert!(eval("value == 1500", &cell));
        assert!(eval("value != 3", &cell));
    }

    #[test]
    fn test_text_comparisons() {
        let cell = Cell::text("total");
        assert!(eval("value == 'total'", &cell));
        assert!(eval("type == \"text\"", &cell));
        assert!(!eval("value > 3", &cell));
    }

    #[test]
    fn test_missing_field() {
        let cell = Cell::number(1.0);
        assert!(!eval("formula == '=A1'", &cell));
        assert!(eval("formula != '=A1'", &cell));
        assert!(!eval("formula", &cell));
        assert!(eval("isEmpty(formula)", &cell));
    }

    #[test]
    fn test_regex_and_logic() {
        let cell = Cell::formula("=VLOOKUP(A1,B:C,2)", CellValue::Number(4.0));
        assert!(eval("formula =~ /VLOOKUP/", &cell));
        assert!(eval("formula =~ /VLOOKUP/ && !isError(value)", &cell));
        assert!(eval("formula =~ /a||b/ || row == 3", &cell));
        assert!(!eval("(row > 10 || column > 5) && isNumber(value)", &cell));
        assert!(eval("!(row > 10 || column > 5) && isNumber(value)", &cell));
    }

    #[test]
    fn test_location_fields() {
        let cell = Cell::number(1.0);
        assert!(eval("address == 'B3'", &cell));
        assert!(eval("sheet == 'Input'", &cell));
        assert!(eval("row == 3 && column == 2", &cell));
    }

    #[test]
    fn test_error_values() {
        let cell = Cell::value(CellValue::Error("#N/A".to_string()));
        assert!(eval("isError(value)", &cell));
        assert!(eval("type == 'error'", &cell));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Condition::parse("  ").unwrap_err(), ConditionError::Empty);
        assert_eq!(
            Condition::parse("colour == 'red'").unwrap_err(),
            ConditionError::UnknownField("colour".to_string())
        );
        assert!(matches!(
            Condition::parse("formula =~ /(/").unwrap_err(),
            ConditionError::InvalidRegex { .. }
        ));
        assert!(matches!(
            Condition::parse("(row > 1").unwrap_err(),
            ConditionError::Unbalanced(_)
        ));
    }

    #[test]
    fn test_parentheses_inside_literals() {
        let cell = Cell::text(")");
        assert!(eval("(value == ')')", &cell));
        assert!(eval("(value == \"(\") || (value =~ /^\\)$/)", &cell));
        assert_eq!(closing_paren("(a == ')') && b"), Some(9));
    }

    #[test]
    fn test_find_operator() {
        assert_eq!(find_operator("a && b", "&&"), Some(2));
        assert_eq!(find_operator("(a || b) && c", "||"), None);
        assert_eq!(find_operator("v == '&&'", "&&"), None);
        assert_eq!(find_operator("f =~ /x&&y/", "&&"), None);
    }
}
