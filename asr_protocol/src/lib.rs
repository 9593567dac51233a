//! # ASR Protocol
//!
//! Codec for the line-oriented text protocol spoken between the recognition
//! client and the ASR server.
//!
//! This crate provides:
//! - A lazy scanner for the header block
//! - [`Frame`] parsing and serialization
//! - The method vocabulary and header names
//!
//! ## Example Usage
//!
//! ```rust
//! use asr_protocol::{header, Frame, Method};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let request = Frame::request(Method::CreateSession).with_header(header::USER_AGENT, "ASR Client");
//! assert_eq!(request.to_bytes(), b"ASR 2.4 CREATE_SESSION\r\nUser-Agent:ASR Client\r\n");
//!
//! let reply = Frame::parse(b"ASR 2.4 RESPONSE\r\nResult:SUCCESS\r\n")?;
//! assert_eq!(reply.method(), Some(Method::Response));
//! assert_eq!(reply.header(header::RESULT), Some("SUCCESS"));
//! # Ok(())
//! # }
//! ```

pub mod frame;
pub mod protocol;
pub mod scanner;

// Re-export commonly used types
pub use frame::Frame;
pub use protocol::{
    content_type, header, Method, ProtocolError, ResponseResult, PROTOCOL_VERSION,
};
