//! Error taxonomy shared by the generation and delivery stages.
//!
//! Record-level errors (`ValidationError`, `OutOfRangeError`,
//! `UnsupportedTypeError`) stay local to one parameter row. Gateway and
//! delivery errors stay local to one device, except `Authentication`, which
//! ends the run against that gateway.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::delivery::DeliveryState;
use crate::device::DeviceIdentifier;
use crate::lookup::Dimension;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device identifier {value:?}: {reason}")]
pub struct DeviceIdentifierError {
    pub value: String,
    pub reason: &'static str,
}

/// Lookup input outside the measured range of the steam table.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{dimension} {value} is outside the steam table domain [{min}, {max}]")]
pub struct OutOfRangeError {
    pub dimension: Dimension,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported steam trap type: {0:?}")]
pub struct UnsupportedTypeError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mounting type: {0:?}")]
pub struct UnknownMountingTypeError(pub String);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: missing")]
    Missing { field: &'static str },

    #[error("{field}: malformed value {value:?}: {reason}")]
    Malformed {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field}: {source}")]
    OutOfRange {
        field: &'static str,
        #[source]
        source: OutOfRangeError,
    },

    #[error("{field}: {reason}")]
    Constraint { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing { field }
            | ValidationError::Malformed { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::Constraint { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("row {row}: {source}")]
    UnsupportedType {
        row: usize,
        #[source]
        source: UnsupportedTypeError,
    },

    #[error("row {row}: {}", join_errors(.errors))]
    Invalid {
        row: usize,
        errors: Vec<ValidationError>,
    },
}

impl RecordError {
    pub fn row(&self) -> usize {
        match self {
            RecordError::UnsupportedType { row, .. } | RecordError::Invalid { row, .. } => *row,
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            RecordError::UnsupportedType { .. } => &[],
            RecordError::Invalid { errors, .. } => errors,
        }
    }

    pub fn names_field(&self, field: &str) -> bool {
        self.errors().iter().any(|e| e.field() == field)
    }

    pub fn out_of_range(&self) -> Option<&OutOfRangeError> {
        self.errors().iter().find_map(|e| match e {
            ValidationError::OutOfRange { source, .. } => Some(source),
            _ => None,
        })
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Other,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Connect => write!(f, "connect"),
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("gateway responded {status}: {body}")]
    Protocol { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Timeouts, connection failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport { .. } => true,
            GatewayError::Protocol { status, .. } => *status >= 500 || *status == 429,
            GatewayError::Authentication(_) | GatewayError::Decode(_) => false,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, GatewayError::Authentication(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::Timeout
        } else if err.is_connect() {
            TransportKind::Connect
        } else if err.is_decode() {
            return GatewayError::Decode(err.to_string());
        } else {
            TransportKind::Other
        };

        GatewayError::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("device did not acknowledge within {polls} poll(s)")]
    ConfirmationTimeout { polls: u32 },

    #[error("queue still holds {remaining} item(s) after flush")]
    FlushIncomplete { remaining: usize },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("illegal state transition {from} -> {to}")]
    InvalidTransition {
        from: DeliveryState,
        to: DeliveryState,
    },
}

impl DeliveryError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, DeliveryError::Gateway(err) if err.is_authentication())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("device {0} already has a downlink pending delivery")]
    Duplicate(DeviceIdentifier),

    #[error("device {0} is already being delivered")]
    InFlight(DeviceIdentifier),

    #[error("no downlink stored for device {0}")]
    Unknown(DeviceIdentifier),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty fragment")]
    Empty,

    #[error("no fragments")]
    NoFragments,

    #[error("unknown command 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("command 0x{command:02x} too short: expected {expected} bytes, got {actual}")]
    Truncated {
        command: u8,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {field} in command 0x{command:02x}: 0x{value:02x}")]
    InvalidField {
        command: u8,
        field: &'static str,
        value: u8,
    },

    #[error("payload has no {0} command")]
    MissingCommand(&'static str),

    #[error("invalid hex payload {value:?}: {reason}")]
    Hex { value: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("missing column {0:?}")]
    MissingColumn(String),

    #[error("row {row}, column {column:?}: invalid value {value:?}")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("table needs at least {min} rows, got {rows}")]
    TooShort { rows: usize, min: usize },

    #[error("row {row}: breakpoints must be finite and strictly increasing")]
    NotIncreasing { row: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("gateway {label}: {source}")]
    Gateway {
        label: String,
        #[source]
        source: Box<ConfigError>,
    },
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Run-level failures of the generation stage.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to load {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
