//! Direct-to-buffer serialization.
//!
//! Writes values into a `BytesMut` with no intermediate allocations;
//! integers are formatted on the stack via `itoa`.

use bytes::{BufMut, BytesMut};

use crate::value::Value;

impl Value {
    /// Serializes this value into the provided buffer, including the
    /// type prefix and trailing `\r\n` delimiters.
    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Value::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Value::Error(msg) => {
                dst.put_u8(b'-');
                dst.put_slice(msg.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Value::Integer(n) => {
                dst.put_u8(b':');
                write_i64(*n, dst);
                dst.put_slice(b"\r\n");
            }
            Value::Bulk(data) => {
                dst.put_u8(b'$');
                write_i64(data.len() as i64, dst);
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Value::Array(items) => {
                dst.put_u8(b'*');
                write_i64(items.len() as i64, dst);
                dst.put_slice(b"\r\n");
                for item in items {
                    item.serialize(dst);
                }
            }
            Value::Null => {
                dst.put_slice(b"$-1\r\n");
            }
        }
    }

    /// Serializes this value into a fresh byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf);
        buf.to_vec()
    }
}

fn write_i64(val: i64, dst: &mut BytesMut) {
    let mut buf = itoa::Buffer::new();
    dst.put_slice(buf.format(val).as_bytes());
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::parse::parse_request;

    #[test]
    fn simple_string() {
        assert_eq!(Value::ok().to_bytes(), b"+OK\r\n");
    }

    #[test]
    fn error() {
        assert_eq!(
            Value::error("ERR invalid command").to_bytes(),
            b"-ERR invalid command\r\n"
        );
    }

    #[test]
    fn integer() {
        assert_eq!(Value::Integer(42).to_bytes(), b":42\r\n");
        assert_eq!(Value::Integer(-2).to_bytes(), b":-2\r\n");
        assert_eq!(Value::Integer(0).to_bytes(), b":0\r\n");
    }

    #[test]
    fn bulk_string() {
        assert_eq!(Value::bulk("bar").to_bytes(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn null_bulk_distinct_from_empty_bulk() {
        assert_eq!(Value::Null.to_bytes(), b"$-1\r\n");
        assert_eq!(Value::bulk("").to_bytes(), b"$0\r\n\r\n");
    }

    #[test]
    fn array() {
        let v = Value::Array(vec![Value::bulk("GET"), Value::bulk("foo")]);
        assert_eq!(v.to_bytes(), b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
    }

    #[test]
    fn empty_array() {
        assert_eq!(Value::Array(vec![]).to_bytes(), b"*0\r\n");
    }

    #[test]
    fn nested_reply_array() {
        // EXEC replies contain non-bulk items
        let v = Value::Array(vec![Value::ok(), Value::Integer(1), Value::Null]);
        assert_eq!(v.to_bytes(), b"*3\r\n+OK\r\n:1\r\n$-1\r\n");
    }

    #[test]
    fn request_round_trip() {
        let requests = vec![
            Value::Array(vec![Value::bulk("PING")]),
            Value::Array(vec![Value::bulk("GET"), Value::bulk("key")]),
            Value::Array(vec![
                Value::bulk("SET"),
                Value::bulk("k"),
                Value::Bulk(Bytes::from_static(b"binary\x00data")),
            ]),
            Value::Array(vec![Value::bulk("")]),
            Value::Array(vec![]),
        ];

        for original in &requests {
            let encoded = original.to_bytes();
            let (parsed, consumed) = parse_request(&encoded)
                .expect("round-trip parse should not error")
                .expect("round-trip parse should return a value");
            assert_eq!(&parsed, original, "round-trip failed for {original:?}");
            assert_eq!(consumed, encoded.len());
        }
    }
}
