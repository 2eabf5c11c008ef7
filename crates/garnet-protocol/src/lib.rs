//! garnet-protocol: the textual request/response wire format.
//!
//! Requests are always an array of bulk strings (`*<N>\r\n` followed by
//! N `$<L>\r\n<payload>\r\n` items). Responses may be any [`Value`]
//! variant. The same framing is used to serialize append-only-log
//! records, so a log file is just a sequence of request arrays.
//!
//! # quick start
//!
//! ```
//! use bytes::BytesMut;
//! use garnet_protocol::parse_request;
//!
//! let input = b"*1\r\n$4\r\nPING\r\n";
//! let (value, consumed) = parse_request(input).unwrap().unwrap();
//! assert_eq!(consumed, input.len());
//!
//! let mut buf = BytesMut::new();
//! value.serialize(&mut buf);
//! assert_eq!(&buf[..], &input[..]);
//! ```

pub mod error;
pub mod parse;
mod serialize;
pub mod value;

pub use error::ProtocolError;
pub use parse::parse_request;
pub use value::Value;
