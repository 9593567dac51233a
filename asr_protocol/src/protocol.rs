use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Protocol version written on every outbound status line
pub const PROTOCOL_VERSION: &str = "2.4";

/// Keyword opening every status line
pub const PROTOCOL_KEYWORD: &str = "ASR";

/// Line terminator
pub const LINE_BREAK: &str = "\r\n";

/// Separator between a header key and its value
pub const HEADER_SEPARATOR: char = ':';

/// Everything that can go wrong while scanning or parsing a frame.
///
/// All variants are the same failure kind from the dispatcher's point of
/// view: the frame is malformed and gets dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid character 0x{byte:02x} at offset {offset}")]
    InvalidCharacter { byte: u8, offset: usize },

    #[error("Unexpected token at offset {offset}: expected {expected}")]
    UnexpectedToken { expected: &'static str, offset: usize },

    #[error("Frame does not start with an ASR status line")]
    MissingStatusLine,

    #[error("Invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("Truncated body: expected {expected} bytes, got {actual}")]
    TruncatedBody { expected: usize, actual: usize },

    #[error("Header not declared: {0}")]
    MissingHeader(String),

    #[error("Invalid body: {0}")]
    InvalidBody(String),
}

/// Commands understood by the server (requests) or emitted by it (events)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    // Client → Server
    CreateSession,
    SetParameters,
    GetParameters,
    StartRecognition,
    StartInputTimers,
    SendAudio,
    CancelRecognition,
    ReleaseSession,

    // Server → Client
    Response,
    StartOfSpeech,
    EndOfSpeech,
    RecognitionResult,
}

/// Value of the `Result` header of a RESPONSE frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseResult {
    Success,
    Failure,
    InvalidAction,
}

/// Header names used on the wire
pub mod header {
    pub const HANDLE: &str = "Handle";
    pub const METHOD: &str = "Method";
    pub const EXPIRES: &str = "Expires";
    pub const RESULT: &str = "Result";
    pub const SESSION_STATUS: &str = "Session-Status";
    pub const ERROR_CODE: &str = "Error-Code";
    pub const MESSAGE: &str = "Message";
    pub const RESULT_STATUS: &str = "Result-Status";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_ID: &str = "Content-ID";
    pub const ACCEPT: &str = "Accept";
    pub const USER_AGENT: &str = "User-Agent";
    pub const LAST_PACKET: &str = "LastPacket";
    pub const TIMESTAMP: &str = "Timestamp";
}

/// MIME types carried in `Content-Type` and `Accept`
pub mod content_type {
    pub const URI_LIST: &str = "text/uri-list";
    pub const SRGS: &str = "application/srgs";
    pub const JSON: &str = "application/json";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}
