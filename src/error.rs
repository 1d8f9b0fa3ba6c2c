use std::fmt;

#[derive(Debug)]
pub enum Error {
    InvalidPayload(&'static str),
    InvalidMac(String),
    MissingField(&'static str),
    FieldType {
        field: String,
        expected: &'static str,
        got: &'static str,
    },
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    DeviceNotFound(String),
    ServiceUnavailable(&'static str),
    Listener(String),
    Config(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Error {
    /// HTTP status code delivered alongside this error at the boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidPayload(_)
            | Error::InvalidMac(_)
            | Error::MissingField(_)
            | Error::FieldType { .. }
            | Error::OutOfRange { .. } => 400,
            Error::DeviceNotFound(_) => 404,
            Error::ServiceUnavailable(_) => 503,
            Error::Listener(_) | Error::Config(_) | Error::Io(_) | Error::Json(_) => 500,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            Error::InvalidMac(mac) => write!(f, "invalid MAC address: {mac}"),
            Error::MissingField(field) => write!(f, "missing required field: {field}"),
            Error::FieldType {
                field,
                expected,
                got,
            } => write!(f, "field '{field}' has wrong type: expected {expected}, got {got}"),
            Error::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} value out of range: {value} (expected {min} to {max})"),
            Error::DeviceNotFound(id) => write!(f, "device not found: {id}"),
            Error::ServiceUnavailable(what) => write!(f, "service unavailable: {what}"),
            Error::Listener(msg) => write!(f, "listener error: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
