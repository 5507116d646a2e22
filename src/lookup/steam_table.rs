//! Saturated steam pressure/temperature curve.
//!
//! The table is a list of measured breakpoints, strictly increasing in both
//! pressure and temperature, so either column can be binary searched.
//! Lookups interpolate linearly between neighbours and never extrapolate.

use std::fmt;
use std::io;
use std::path::Path;

use csv::Reader;

use crate::error::{OutOfRangeError, TableError};
use crate::sheet::{Columns, parse_cell};

// Bare "p"/"t" come last: unit suffixes are stripped, so "P [psog]" also reads as "p".
const PRESSURE_COLUMNS: &[&str] = &["p-bar", "pressure-bar", "pressure", "p"];
const TEMPERATURE_COLUMNS: &[&str] = &[
    "t-celsius",
    "t-c",
    "temperature-celsius",
    "temperature",
    "t",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Pressure,
    Temperature,
}

impl Dimension {
    pub fn other(&self) -> Dimension {
        match self {
            Dimension::Pressure => Dimension::Temperature,
            Dimension::Temperature => Dimension::Pressure,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Pressure => write!(f, "pressure [bar]"),
            Dimension::Temperature => write!(f, "temperature [°C]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub pressure_bar: f64,

    pub temperature_celsius: f64,
}

impl Breakpoint {
    pub fn new(pressure_bar: f64, temperature_celsius: f64) -> Self {
        Self {
            pressure_bar,
            temperature_celsius,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Pressure => self.pressure_bar,
            Dimension::Temperature => self.temperature_celsius,
        }
    }
}

/// A point on the saturation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteamState {
    pub pressure_bar: f64,

    pub temperature_celsius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteamTable {
    breakpoints: Vec<Breakpoint>,
}

impl SteamTable {
    pub fn new(breakpoints: Vec<Breakpoint>) -> Result<Self, TableError> {
        if breakpoints.len() < 2 {
            return Err(TableError::TooShort {
                rows: breakpoints.len(),
                min: 2,
            });
        }

        for (i, b) in breakpoints.iter().enumerate() {
            let finite = b.pressure_bar.is_finite() && b.temperature_celsius.is_finite();
            let increasing = i == 0 || {
                let prev = &breakpoints[i - 1];
                b.pressure_bar > prev.pressure_bar && b.temperature_celsius > prev.temperature_celsius
            };
            if !finite || !increasing {
                return Err(TableError::NotIncreasing { row: i + 1 });
            }
        }

        Ok(Self { breakpoints })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::from_csv(Reader::from_path(path)?)
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, TableError> {
        Self::from_csv(Reader::from_reader(reader))
    }

    fn from_csv<R: io::Read>(mut reader: Reader<R>) -> Result<Self, TableError> {
        let columns = Columns::from_headers(reader.headers()?);
        let pressure = columns.require(PRESSURE_COLUMNS)?;
        let temperature = columns.require(TEMPERATURE_COLUMNS)?;

        let mut breakpoints = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let row = i + 1;
            breakpoints.push(Breakpoint {
                pressure_bar: parse_cell(&record, pressure, row, PRESSURE_COLUMNS[0])?,
                temperature_celsius: parse_cell(&record, temperature, row, TEMPERATURE_COLUMNS[0])?,
            });
        }

        Self::new(breakpoints)
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Closed domain `[min, max]` of one column.
    pub fn domain(&self, dimension: Dimension) -> (f64, f64) {
        let first = self.breakpoints.first().map_or(f64::NAN, |b| b.get(dimension));
        let last = self.breakpoints.last().map_or(f64::NAN, |b| b.get(dimension));
        (first, last)
    }

    pub fn resolve(&self, value: f64, known: Dimension) -> Result<f64, OutOfRangeError> {
        let (min, max) = self.domain(known);
        if !value.is_finite() || value < min || value > max {
            return Err(OutOfRangeError {
                dimension: known,
                value,
                min,
                max,
            });
        }

        let derived = known.other();
        let idx = self.breakpoints.partition_point(|b| b.get(known) < value);
        let upper = &self.breakpoints[idx];
        if upper.get(known) == value || idx == 0 {
            return Ok(upper.get(derived));
        }

        let lower = &self.breakpoints[idx - 1];
        let ratio = (value - lower.get(known)) / (upper.get(known) - lower.get(known));

        Ok(lower.get(derived) + ratio * (upper.get(derived) - lower.get(derived)))
    }

    pub fn at_temperature(&self, temperature_celsius: f64) -> Result<SteamState, OutOfRangeError> {
        let pressure_bar = self.resolve(temperature_celsius, Dimension::Temperature)?;
        Ok(SteamState {
            pressure_bar,
            temperature_celsius,
        })
    }

    pub fn at_pressure(&self, pressure_bar: f64) -> Result<SteamState, OutOfRangeError> {
        let temperature_celsius = self.resolve(pressure_bar, Dimension::Pressure)?;
        Ok(SteamState {
            pressure_bar,
            temperature_celsius,
        })
    }

    /// Copy of the table without the breakpoints hotter than `max_temperature_celsius`.
    pub fn bounded(&self, max_temperature_celsius: f64) -> Result<Self, TableError> {
        Self::new(
            self.breakpoints
                .iter()
                .copied()
                .filter(|b| b.temperature_celsius <= max_temperature_celsius)
                .collect(),
        )
    }
}
