//! Protocol value types.
//!
//! [`Value`] represents a single parsed frame. Bulk payloads use `Bytes`
//! so a value can be cloned into the keyspace or a transaction buffer
//! without copying the underlying data.

use bytes::Bytes;

/// A single protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Simple string reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-ERR invalid command\r\n`.
    Error(String),

    /// 64-bit signed integer reply, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$3\r\nfoo\r\n`.
    Bulk(Bytes),

    /// Array of values, e.g. `*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n`.
    Array(Vec<Value>),

    /// The null bulk `$-1\r\n`, distinct from the empty bulk `$0\r\n\r\n`.
    Null,
}

impl Value {
    /// Builds a bulk value from anything byte-like.
    pub fn bulk(data: impl Into<Bytes>) -> Value {
        Value::Bulk(data.into())
    }

    /// Builds the canonical `+OK` reply.
    pub fn ok() -> Value {
        Value::Simple("OK".into())
    }

    /// Builds an error reply.
    pub fn error(msg: impl Into<String>) -> Value {
        Value::Error(msg.into())
    }

    /// Returns the bulk payload, if this value is a bulk.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Value::Bulk(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the bulk payload as UTF-8, if this value is a bulk
    /// holding valid UTF-8.
    pub fn as_bulk_str(&self) -> Option<&str> {
        self.as_bulk().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns `true` if this value is the null bulk.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_equality() {
        assert_eq!(Value::ok(), Value::Simple("OK".into()));
        assert_ne!(Value::ok(), Value::Simple("QUEUED".into()));
        assert_eq!(Value::Integer(1), Value::Integer(1));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn bulk_accessors() {
        let v = Value::bulk("hello");
        assert_eq!(v.as_bulk(), Some(&Bytes::from_static(b"hello")));
        assert_eq!(v.as_bulk_str(), Some("hello"));
        assert_eq!(Value::Integer(3).as_bulk(), None);
    }

    #[test]
    fn non_utf8_bulk_has_no_str() {
        let v = Value::Bulk(Bytes::from_static(&[0xff, 0xfe]));
        assert!(v.as_bulk_str().is_none());
    }

    #[test]
    fn is_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::bulk("").is_null());
    }
}
