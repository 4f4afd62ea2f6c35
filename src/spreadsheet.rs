//! Immutable spreadsheet snapshot that rules are evaluated against
//!
//! Loading real workbook files is left to the caller; a snapshot is either
//! built in code or deserialized from a small JSON format:
//!
//! ```json
//! {
//!   "sheets": [
//!     { "name": "Sheet1",
//!       "cells": [
//!         { "cell": "A1", "value": 3 },
//!         { "cell": "B1", "value": 4, "formula": "=A1+1" } ] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Error values a spreadsheet cell may hold
pub const ERROR_VALUES: &[&str] = &[
    "#DIV/0!", "#N/A", "#NAME?", "#NULL!", "#NUM!", "#REF!", "#VALUE!", "#SPILL!", "#CALC!",
];

/// Error loading a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid cell address '{0}'")]
    InvalidAddress(String),
}

/// Value held by a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Spreadsheet error such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Value kind name used by dynamic conditions
    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Number(_) => "number",
            CellValue::Text(_) => "text",
            CellValue::Bool(_) => "bool",
            CellValue::Error(_) => "error",
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
            serde_json::Value::String(s) if ERROR_VALUES.contains(&s.as_str()) => {
                CellValue::Error(s.clone())
            }
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Empty => serde_json::Value::Null,
            CellValue::Number(n) => serde_json::json!(n),
            CellValue::Text(s) | CellValue::Error(s) => serde_json::Value::String(s.clone()),
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) | CellValue::Error(s) => write!(f, "{}", s),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// A single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Formula text including the leading `=`
    pub formula: Option<String>,
}

impl Cell {
    pub fn value(value: CellValue) -> Self {
        Self {
            value,
            formula: None,
        }
    }

    pub fn number(n: f64) -> Self {
        Self::value(CellValue::Number(n))
    }

    pub fn text(s: &str) -> Self {
        Self::value(CellValue::Text(s.to_string()))
    }

    pub fn formula(formula: &str, value: CellValue) -> Self {
        Self {
            value,
            formula: Some(formula.to_string()),
        }
    }

    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }
}

/// Sheet-qualified cell location (1-based row and column)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellLocation {
    pub sheet: String,
    pub row: u32,
    pub column: u32,
}

impl CellLocation {
    pub fn new(sheet: &str, row: u32, column: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            row,
            column,
        }
    }

    /// Address without the sheet (e.g. `B3`)
    pub fn a1(&self) -> String {
        format!("{}{}", column_name(self.column), self.row)
    }
}

impl fmt::Display for CellLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.a1())
    }
}

/// Column letters for a 1-based column index (1 -> A, 27 -> AA)
pub fn column_name(mut column: u32) -> String {
    let mut name = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.push(b'A' + rem);
        column = (column - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Parse an A1-style address (`$` markers allowed) into (row, column)
pub fn parse_a1(address: &str) -> Option<(u32, u32)> {
    let address = address.trim().replace('$', "");
    let split = address.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = address.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut column: u32 = 0;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        column = column.checked_mul(26)?.checked_add(digit)?;
    }

    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, column))
}

/// One worksheet: a sparse grid of cells
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    pub name: String,
    cells: BTreeMap<(u32, u32), Cell>,
}

impl Worksheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
        }
    }

    /// Put a cell at an A1 address (builder style)
    pub fn with_cell(mut self, address: &str, cell: Cell) -> Result<Self, SnapshotError> {
        self.set_cell(address, cell)?;
        Ok(self)
    }

    pub fn set_cell(&mut self, address: &str, cell: Cell) -> Result<(), SnapshotError> {
        let (row, column) =
            parse_a1(address).ok_or_else(|| SnapshotError::InvalidAddress(address.to_string()))?;
        self.cells.insert((row, column), cell);
        Ok(())
    }

    pub fn insert(&mut self, row: u32, column: u32, cell: Cell) {
        self.cells.insert((row, column), cell);
    }

    pub fn get(&self, row: u32, column: u32) -> Option<&Cell> {
        self.cells.get(&(row, column))
    }

    /// Cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, &Cell)> {
        self.cells.iter().map(|(&(row, column), cell)| (row, column, cell))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Borrowed view of a cell together with its location
#[derive(Debug, Clone, Copy)]
pub struct CellRef<'a> {
    pub sheet: &'a str,
    pub row: u32,
    pub column: u32,
    pub cell: &'a Cell,
}

impl CellRef<'_> {
    pub fn location(&self) -> CellLocation {
        CellLocation::new(self.sheet, self.row, self.column)
    }
}

/// An immutable workbook snapshot
#[derive(Debug, Clone, Default)]
pub struct Spreadsheet {
    sheets: Vec<Worksheet>,
}

impl Spreadsheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: Worksheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn cell(&self, location: &CellLocation) -> Option<&Cell> {
        self.sheet(&location.sheet)?.get(location.row, location.column)
    }

    /// All cells, sheet by sheet in declaration order, row-major within a sheet
    pub fn cells(&self) -> impl Iterator<Item = CellRef<'_>> {
        self.sheets.iter().flat_map(|sheet| {
            sheet.cells().map(move |(row, column, cell)| CellRef {
                sheet: &sheet.name,
                row,
                column,
                cell,
            })
        })
    }

    /// Cells that carry a formula
    pub fn formula_cells(&self) -> impl Iterator<Item = CellRef<'_>> {
        self.cells().filter(|c| c.cell.has_formula())
    }

    /// Load a snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, SnapshotError> {
        let file: SnapshotFile = serde_json::from_str(content)?;
        let mut spreadsheet = Spreadsheet::new();
        for raw_sheet in file.sheets {
            let mut sheet = Worksheet::new(&raw_sheet.name);
            for raw in raw_sheet.cells {
                let value = raw
                    .value
                    .as_ref()
                    .map(CellValue::from_json)
                    .unwrap_or_default();
                sheet.set_cell(
                    &raw.cell,
                    Cell {
                        value,
                        formula: raw.formula,
                    },
                )?;
            }
            spreadsheet.sheets.push(sheet);
        }
        Ok(spreadsheet)
    }

    pub fn to_json_string(&self) -> Result<String, SnapshotError> {
        let file = SnapshotFile {
            sheets: self
                .sheets
                .iter()
                .map(|sheet| SnapshotSheet {
                    name: sheet.name.clone(),
                    cells: sheet
                        .cells()
                        .map(|(row, column, cell)| SnapshotCell {
                            cell: CellLocation::new(&sheet.name, row, column).a1(),
                            value: match cell.value {
                                CellValue::Empty => None,
                                ref v => Some(v.to_json()),
                            },
                            formula: cell.formula.clone(),
                        })
                        .collect(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    sheets: Vec<SnapshotSheet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotSheet {
    name: String,
    #[serde(default)]
    cells: Vec<SnapshotCell>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCell {
    cell: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
}
