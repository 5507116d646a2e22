//! Helpers for the CSV exports of the configuration workbook.

use std::collections::HashMap;
use std::str::FromStr;

use csv::StringRecord;

use crate::error::TableError;

/// Normalizes a spreadsheet header: `"Steam Trap Type [-]"` becomes `"steam-trap-type"`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;

    for c in raw.trim().chars() {
        match c {
            '[' | '(' | '{' | '<' => depth += 1,
            ']' | ')' | '}' | '>' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_ascii_alphanumeric() => out.push(c.to_ascii_lowercase()),
            ' ' | '-' | '_' => {
                if !out.is_empty() && !out.ends_with('-') {
                    out.push('-');
                }
            }
            _ => {}
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    out
}

#[derive(Debug, Clone)]
pub struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            index.entry(normalize_header(header)).or_insert(i);
        }

        Self { index }
    }

    pub fn find(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.index.get(*name).copied())
    }

    pub fn require(&self, names: &[&str]) -> Result<usize, TableError> {
        self.find(names)
            .ok_or_else(|| TableError::MissingColumn(names.first().copied().unwrap_or("").to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}

/// Trimmed cell content; blank cells read as `None`.
pub fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn parse_cell<T: FromStr>(
    record: &StringRecord,
    index: usize,
    row: usize,
    column: &str,
) -> Result<T, TableError> {
    let raw = cell(record, Some(index)).unwrap_or("");
    raw.parse().map_err(|_| TableError::InvalidCell {
        row,
        column: column.to_owned(),
        value: raw.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spreadsheet_headers() {
        assert_eq!(normalize_header(" Steam Trap Type "), "steam-trap-type");
        assert_eq!(normalize_header("SST [°C]"), "sst");
        assert_eq!(normalize_header("Differential Pressure (bar)"), "differential-pressure");
        assert_eq!(normalize_header("p-bar"), "p-bar");
        assert_eq!(normalize_header("SLTh0"), "slth0");
        assert_eq!(normalize_header("DevEUI"), "deveui");
    }

    #[test]
    fn finds_first_matching_alias() {
        let headers = StringRecord::from(vec!["DevEUI", "Steam Trap Type", "SST [°C]"]);
        let columns = Columns::from_headers(&headers);

        assert_eq!(columns.find(&["stt", "steam-trap-type"]), Some(1));
        assert_eq!(columns.find(&["sst"]), Some(2));
        assert!(columns.require(&["dmt", "mounting-type"]).is_err());
    }

    #[test]
    fn blank_cells_are_none() {
        let record = StringRecord::from(vec!["  ", "x "]);
        assert_eq!(cell(&record, Some(0)), None);
        assert_eq!(cell(&record, Some(1)), Some("x"));
        assert_eq!(cell(&record, None), None);
    }
}
