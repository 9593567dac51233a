use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::protocol::{
    header, Method, ProtocolError, HEADER_SEPARATOR, LINE_BREAK, PROTOCOL_KEYWORD,
    PROTOCOL_VERSION,
};
use crate::scanner::{Scanner, Token};

/// One protocol message: status line, ordered headers and an optional body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    version: String,
    command: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl Frame {
    /// Create an outbound frame for `method` at the current protocol version
    pub fn request(method: Method) -> Self {
        Self::new(PROTOCOL_VERSION, method.as_ref())
    }

    pub fn new(version: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            command: command.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The command as a known method, if it is one
    pub fn method(&self) -> Option<Method> {
        Method::from_str(&self.command).ok()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn require_header(&self, key: &str) -> Result<&str, ProtocolError> {
        self.header(key)
            .ok_or_else(|| ProtocolError::MissingHeader(key.to_string()))
    }

    /// Insert or overwrite a header
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Replace the body; `Content-Length` always follows the new length
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.set_header(header::CONTENT_LENGTH, body.len().to_string());
        self.body = body;
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.set_body(body);
        self
    }

    /// Parse a complete frame.
    ///
    /// Any scan or grammar failure rejects the whole frame; no partial
    /// header set is ever returned.
    pub fn parse(input: &[u8]) -> Result<Self, ProtocolError> {
        let mut scanner = Scanner::new(input);

        let mut token = scanner.next_token()?;
        while token == Token::LineBreak {
            token = scanner.next_token()?;
        }
        if token != Token::Keyword {
            return Err(ProtocolError::MissingStatusLine);
        }
        let version = expect_identifier(&mut scanner, "protocol version")?;
        let command = expect_identifier(&mut scanner, "command")?;
        let mut frame = Frame::new(version, command);

        let mut body_offset = None;
        match scanner.next_token()? {
            Token::End => {}
            Token::LineBreak => body_offset = frame.parse_headers(&mut scanner)?,
            _ => {
                return Err(ProtocolError::UnexpectedToken {
                    expected: "line break after status line",
                    offset: scanner.offset(),
                })
            }
        }

        let content_length = match frame.header(header::CONTENT_LENGTH) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidContentLength(raw.to_string()))?,
            None => 0,
        };

        if content_length > 0 {
            let available = body_offset.map_or(0, |start| input.len() - start);
            if available < content_length {
                return Err(ProtocolError::TruncatedBody {
                    expected: content_length,
                    actual: available,
                });
            }
            let start = body_offset.unwrap_or(input.len());
            frame.body = input[start..start + content_length].to_vec();
        }

        Ok(frame)
    }

    /// Parse `Key:Value` lines up to the blank line or end of input.
    /// Returns the offset of the first body byte when a blank line was found.
    fn parse_headers(&mut self, scanner: &mut Scanner<'_>) -> Result<Option<usize>, ProtocolError> {
        loop {
            let key = match scanner.next_token()? {
                Token::End => return Ok(None),
                Token::LineBreak => return Ok(Some(scanner.offset())),
                Token::Identifier(key) => key.to_string(),
                Token::Keyword => {
                    return Err(ProtocolError::UnexpectedToken {
                        expected: "header line, found a second status line",
                        offset: scanner.offset(),
                    })
                }
                Token::Separator => {
                    return Err(ProtocolError::UnexpectedToken {
                        expected: "header key",
                        offset: scanner.offset(),
                    })
                }
            };

            if scanner.next_token()? != Token::Separator {
                return Err(ProtocolError::UnexpectedToken {
                    expected: "':' after header key",
                    offset: scanner.offset(),
                });
            }

            let (value, terminator) = match scanner.next_token()? {
                Token::Identifier(value) => (value.to_string(), scanner.next_token()?),
                Token::Keyword => (PROTOCOL_KEYWORD.to_string(), scanner.next_token()?),
                other => (String::new(), other),
            };
            if let Some(previous) = self.headers.insert(key.clone(), value) {
                log::debug!("Duplicate header {}, dropping earlier value {:?}", key, previous);
            }

            match terminator {
                Token::LineBreak => {}
                Token::End => return Ok(None),
                _ => {
                    return Err(ProtocolError::UnexpectedToken {
                        expected: "line break after header value",
                        offset: scanner.offset(),
                    })
                }
            }
        }
    }

    /// Serialize to wire bytes: status line, headers in key order, then the
    /// body after a blank line when there is one
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} {}{}",
            PROTOCOL_KEYWORD, self.version, self.command, LINE_BREAK
        );
        for (key, value) in &self.headers {
            out.push_str(key);
            out.push(HEADER_SEPARATOR);
            out.push_str(value);
            out.push_str(LINE_BREAK);
        }

        let mut bytes = out.into_bytes();
        if !self.body.is_empty() {
            bytes.extend_from_slice(LINE_BREAK.as_bytes());
            bytes.extend_from_slice(&self.body);
        }
        bytes
    }
}

impl fmt::Display for Frame {
    /// Human readable form for logs; binary bodies are summarized
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", PROTOCOL_KEYWORD, self.version, self.command)?;
        for (key, value) in &self.headers {
            write!(f, " | {}:{}", key, value)?;
        }
        if !self.body.is_empty() {
            match std::str::from_utf8(&self.body) {
                Ok(text) if self.command != Method::SendAudio.as_ref() => {
                    write!(f, " | {}", text)?
                }
                _ => write!(f, " | <{} bytes>", self.body.len())?,
            }
        }
        Ok(())
    }
}

fn expect_identifier(
    scanner: &mut Scanner<'_>,
    expected: &'static str,
) -> Result<String, ProtocolError> {
    match scanner.next_token()? {
        Token::Identifier(id) => Ok(id.to_string()),
        _ => Err(ProtocolError::UnexpectedToken {
            expected,
            offset: scanner.offset(),
        }),
    }
}
