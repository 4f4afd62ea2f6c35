//! Lightweight formula scanner
//!
//! Splits a formula into tokens good enough for structural checks
//! (references, constants, nesting). It does not evaluate anything.

use crate::spreadsheet::{parse_a1, CellLocation};

/// Upper bound on cells produced when a range is expanded
pub const MAX_RANGE_CELLS: usize = 10_000;

/// A cell reference as written in a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Explicit sheet qualifier (`Sheet2!A1`), if any
    pub sheet: Option<String>,
    pub row: u32,
    pub column: u32,
}

impl Reference {
    /// Resolve against the sheet the formula lives on
    pub fn resolve(&self, own_sheet: &str) -> CellLocation {
        CellLocation::new(
            self.sheet.as_deref().unwrap_or(own_sheet),
            self.row,
            self.column,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Text(String),
    Reference(Reference),
    Range(Reference, Reference),
    /// Function name; always followed by `Open`
    Function(String),
    /// Named range, boolean literal or anything else identifier-like
    Name(String),
    Operator(String),
    Open,
    Close,
    Separator,
}

/// Tokenize a formula (the leading `=` is optional)
pub fn tokenize(formula: &str) -> Vec<Token> {
    let body = formula.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '"' => {
                let (text, next) = read_string(&chars, i);
                tokens.push(Token::Text(text));
                i = next;
            }
            '\'' => {
                // Quoted sheet name: 'My Sheet'!A1
                let mut j = i + 1;
                let mut sheet = String::new();
                while j < chars.len() {
                    if chars[j] == '\'' {
                        if chars.get(j + 1) == Some(&'\'') {
                            sheet.push('\'');
                            j += 2;
                            continue;
                        }
                        break;
                    }
                    sheet.push(chars[j]);
                    j += 1;
                }
                j += 1;
                if chars.get(j) == Some(&'!') {
                    let (token, next) = read_reference(&chars, j + 1, Some(sheet));
                    if let Some(token) = token {
                        tokens.push(token);
                    }
                    i = next;
                } else {
                    tokens.push(Token::Name(sheet));
                    i = j;
                }
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            ',' | ';' => {
                tokens.push(Token::Separator);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' | '&' | '%' => {
                tokens.push(Token::Operator(c.to_string()));
                i += 1;
            }
            '<' | '>' | '=' => {
                let mut op = c.to_string();
                if let Some(&next) = chars.get(i + 1) {
                    if (c == '<' && (next == '=' || next == '>')) || (c == '>' && next == '=') {
                        op.push(next);
                    }
                }
                i += op.len();
                tokens.push(Token::Operator(op));
            }
            _ if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let (number, next) = read_number(&chars, i);
                tokens.push(Token::Number(number));
                i = next;
            }
            _ if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut j = i;
                while j < chars.len()
                    && (chars[j].is_alphanumeric() || matches!(chars[j], '_' | '.' | '$'))
                {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();

                if chars.get(j) == Some(&'!') {
                    let (token, next) = read_reference(&chars, j + 1, Some(word));
                    if let Some(token) = token {
                        tokens.push(token);
                    }
                    i = next;
                } else if chars.get(j) == Some(&'(') {
                    tokens.push(Token::Function(word.to_uppercase()));
                    i = j;
                } else {
                    let (token, next) = read_reference(&chars, i, None);
                    match token {
                        Some(token) => {
                            tokens.push(token);
                            i = next;
                        }
                        None => {
                            tokens.push(Token::Name(word));
                            i = j;
                        }
                    }
                }
            }
            _ => i += 1,
        }
    }

    tokens
}

fn read_string(chars: &[char], start: usize) -> (String, usize) {
    let mut text = String::new();
    let mut j = start + 1;
    while j < chars.len() {
        if chars[j] == '"' {
            if chars.get(j + 1) == Some(&'"') {
                text.push('"');
                j += 2;
                continue;
            }
            return (text, j + 1);
        }
        text.push(chars[j]);
        j += 1;
    }
    (text, j)
}

fn read_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut j = start;
    while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
        j += 1;
    }
    if j < chars.len() && matches!(chars[j], 'e' | 'E') {
        let mut k = j + 1;
        if k < chars.len() && matches!(chars[k], '+' | '-') {
            k += 1;
        }
        if k < chars.len() && chars[k].is_ascii_digit() {
            while k < chars.len() && chars[k].is_ascii_digit() {
                k += 1;
            }
            j = k;
        }
    }
    let literal: String = chars[start..j].iter().collect();
    (literal.parse().unwrap_or(0.0), j)
}

/// Read `A1` or `A1:B2` starting at `start`
fn read_reference(chars: &[char], start: usize, sheet: Option<String>) -> (Option<Token>, usize) {
    let (first, after_first) = match read_cell(chars, start) {
        Some(found) => found,
        None => return (None, skip_word(chars, start)),
    };

    let first = Reference {
        sheet: sheet.clone(),
        row: first.0,
        column: first.1,
    };

    if chars.get(after_first) == Some(&':') {
        if let Some((second, after_second)) = read_cell(chars, after_first + 1) {
            let second = Reference {
                sheet,
                row: second.0,
                column: second.1,
            };
            return (Some(Token::Range(first, second)), after_second);
        }
    }

    (Some(Token::Reference(first)), after_first)
}

/// Read a single `$A$1`-style address; rejects words that merely start like one
fn read_cell(chars: &[char], start: usize) -> Option<((u32, u32), usize)> {
    let mut j = start;
    if chars.get(j) == Some(&'$') {
        j += 1;
    }
    let letters_start = j;
    while j < chars.len() && chars[j].is_ascii_alphabetic() {
        j += 1;
    }
    if j == letters_start || j - letters_start > 3 {
        return None;
    }
    if chars.get(j) == Some(&'$') {
        j += 1;
    }
    let digits_start = j;
    while j < chars.len() && chars[j].is_ascii_digit() {
        j += 1;
    }
    if j == digits_start {
        return None;
    }
    if chars
        .get(j)
        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '(' | '.'))
    {
        return None;
    }
    let text: String = chars[start..j].iter().collect();
    parse_a1(&text).map(|cell| (cell, j))
}

fn skip_word(chars: &[char], start: usize) -> usize {
    let mut j = start;
    while j < chars.len() && (chars[j].is_alphanumeric() || matches!(chars[j], '_' | '$' | '.')) {
        j += 1;
    }
    j.max(start + 1)
}

/// Single-cell references (ranges excluded)
pub fn references(tokens: &[Token]) -> Vec<&Reference> {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Reference(r) => Some(r),
            _ => None,
        })
        .collect()
}

/// Every cell a formula touches, with ranges expanded (bounded by [`MAX_RANGE_CELLS`])
pub fn referenced_cells(tokens: &[Token], own_sheet: &str) -> Vec<CellLocation> {
    let mut cells = Vec::new();
    for token in tokens {
        match token {
            Token::Reference(r) => cells.push(r.resolve(own_sheet)),
            Token::Range(from, to) => {
                let sheet = from.sheet.as_deref().unwrap_or(own_sheet);
                let (r1, r2) = (from.row.min(to.row), from.row.max(to.row));
                let (c1, c2) = (from.column.min(to.column), from.column.max(to.column));
                let mut produced = 0;
                'rows: for row in r1..=r2 {
                    for column in c1..=c2 {
                        if produced >= MAX_RANGE_CELLS {
                            break 'rows;
                        }
                        cells.push(CellLocation::new(sheet, row, column));
                        produced += 1;
                    }
                }
            }
            _ => {}
        }
    }
    cells
}

/// Numeric literals in order of appearance
pub fn numeric_constants(tokens: &[Token]) -> Vec<f64> {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Number(n) => Some(*n),
            _ => None,
        })
        .collect()
}

/// Deepest parenthesis nesting (function calls included)
pub fn max_nesting(tokens: &[Token]) -> usize {
    let mut depth: usize = 0;
    let mut max = 0;
    for token in tokens {
        match token {
            Token::Open => {
                depth += 1;
                max = max.max(depth);
            }
            Token::Close => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// Number of operators and function calls
pub fn operation_count(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .filter(|t| matches!(t, Token::Operator(_) | Token::Function(_)))
        .count()
}
