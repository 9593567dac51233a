use crate::protocol::{ProtocolError, PROTOCOL_KEYWORD};

/// Lexical tokens of the header block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// The `ASR` keyword opening a status line
    Keyword,
    Identifier(&'a str),
    /// The `:` between a key and its value
    Separator,
    LineBreak,
    End,
}

/// Pull-based tokenizer over a raw frame.
///
/// Tokens are produced on demand, so the parser can stop at the end of the
/// header block and hand the remaining bytes over as the body untouched.
/// Once a separator has been seen on a line, spaces and `:` become part of
/// the value run until the next line break.
pub struct Scanner<'a> {
    input: &'a [u8],
    offset: usize,
    after_separator: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            after_separator: false,
        }
    }

    /// Offset of the first byte not consumed yet
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn next_token(&mut self) -> Result<Token<'a>, ProtocolError> {
        while self.peek() == Some(b' ') {
            self.offset += 1;
        }

        let Some(byte) = self.peek() else {
            self.after_separator = false;
            return Ok(Token::End);
        };

        match byte {
            b':' if !self.after_separator => {
                self.offset += 1;
                self.after_separator = true;
                Ok(Token::Separator)
            }
            b'\r' if self.input.get(self.offset + 1) == Some(&b'\n') => {
                self.offset += 2;
                self.after_separator = false;
                Ok(Token::LineBreak)
            }
            b if self.is_identifier_byte(b) => Ok(self.identifier()),
            b => Err(ProtocolError::InvalidCharacter {
                byte: b,
                offset: self.offset,
            }),
        }
    }

    fn identifier(&mut self) -> Token<'a> {
        let start = self.offset;
        while let Some(b) = self.peek() {
            if !self.is_identifier_byte(b) {
                break;
            }
            self.offset += 1;
        }

        // Identifier bytes are all ASCII, so the slice is valid UTF-8.
        let run = std::str::from_utf8(&self.input[start..self.offset]).unwrap_or_default();
        if run == PROTOCOL_KEYWORD {
            Token::Keyword
        } else {
            Token::Identifier(run)
        }
    }

    fn is_identifier_byte(&self, b: u8) -> bool {
        match b {
            b'-' | b'/' | b'.' | b',' | b'_' | b'(' | b')' | b'<' | b'>' => true,
            b':' | b' ' => self.after_separator,
            b => b.is_ascii_alphanumeric(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.offset).copied()
    }
}
