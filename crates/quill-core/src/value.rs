//! Tagged value union and dialect-safe literal rendering.

use crate::driver::DriverKind;
use std::fmt;

/// A dynamically typed value bound to a query or column.
///
/// String and byte payloads are borrowed for the duration of a single
/// query composition; callers that need to retain a value past that point
/// should clone it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Renders the value as a literal SQL fragment for the given dialect.
    ///
    /// This is the only path through which untrusted strings may reach SQL
    /// text outside of the explicit `*_raw` escape hatches; every value
    /// passed to the query builder is routed through here before a query is
    /// rendered.
    pub fn render_literal(&self, dialect: DriverKind) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Bool(b) => {
                if matches!(dialect, DriverKind::Postgres) {
                    if *b { "TRUE".to_string() } else { "FALSE".to_string() }
                } else if *b {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            Value::Text(s) => escape_string(s),
            Value::Bytes(bytes) => format!("X'{}'", hex_encode(bytes)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Escapes a string literal by doubling embedded single quotes and wrapping
/// the result in single quotes. Identifier names are never escaped here;
/// quoting identifiers is the caller's responsibility (see spec.md §4.4).
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Decodes a hex string back into bytes, the inverse of `hex_encode`. Used
/// on the result-decoding path for BLOB columns, which the drivers surface
/// as hex text rather than raw bytes. Returns `None` on malformed input
/// rather than panicking, matching every other `ModelAccessor::from_row`
/// field decode's fallback-to-default behavior.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let mut chars = s.chars();
    while let (Some(hi), Some(lo)) = (chars.next(), chars.next()) {
        let hi = hi.to_digit(16)?;
        let lo = lo.to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(bytes) => write!(f, "{}", hex_encode(bytes)),
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Value::$variant(v as _)
                }
            }
        )*
    };
}

impl_from_int!(i8 => Int, i16 => Int, i32 => Int, i64 => Int, isize => Int);
impl_from_int!(u8 => UInt, u16 => UInt, u32 => UInt, u64 => UInt, usize => UInt);

impl From<f32> for Value {
    #[inline]
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    #[inline]
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    #[inline]
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    #[inline]
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<chrono::NaiveDate> for Value {
    #[inline]
    fn from(v: chrono::NaiveDate) -> Self {
        Value::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl From<chrono::NaiveDateTime> for Value {
    #[inline]
    fn from(v: chrono::NaiveDateTime) -> Self {
        Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Value {
    #[inline]
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_quotes() {
        assert_eq!(escape_string("zhangsan's"), "'zhangsan''s'");
    }

    #[test]
    fn renders_bool_per_dialect() {
        assert_eq!(Value::Bool(true).render_literal(DriverKind::Sqlite), "1");
        assert_eq!(Value::Bool(true).render_literal(DriverKind::Postgres), "TRUE");
    }

    #[test]
    fn renders_bytes_as_hex_literal() {
        assert_eq!(Value::Bytes(vec![0xDE, 0xAD]).render_literal(DriverKind::Sqlite), "X'DEAD'");
    }

    #[test]
    fn null_from_option() {
        let v: Value = Option::<i32>::None.into();
        assert!(v.is_null());
    }
}
