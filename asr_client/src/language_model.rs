use asr_protocol::{content_type, header, Frame};

use crate::error::RecognitionError;

/// Fixed id of the inline grammar; the server accepts only one per request
pub const GRAMMAR_CONTENT_ID: &str = "gram";

/// Language model used by a recognition: a server-side model URI such as
/// `builtin:slm/general`, or an inline SRGS grammar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageModelList {
    uri: Option<String>,
    grammar: Option<String>,
}

impl LanguageModelList {
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            grammar: None,
        }
    }

    pub fn from_grammar(grammar: impl Into<String>) -> Self {
        Self {
            uri: None,
            grammar: Some(grammar.into()),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref().filter(|uri| !uri.is_empty())
    }

    pub fn grammar(&self) -> Option<&str> {
        self.grammar.as_deref().filter(|g| !g.is_empty())
    }

    /// Put the model into a START_RECOGNITION frame. A URI takes
    /// precedence over a grammar.
    pub(crate) fn apply(&self, frame: &mut Frame) -> Result<(), RecognitionError> {
        if let Some(uri) = self.uri() {
            frame.set_header(header::CONTENT_TYPE, content_type::URI_LIST);
            frame.set_body(uri.as_bytes().to_vec());
        } else if let Some(grammar) = self.grammar() {
            frame.set_header(header::CONTENT_TYPE, content_type::SRGS);
            frame.set_header(header::CONTENT_ID, GRAMMAR_CONTENT_ID);
            frame.set_body(grammar.as_bytes().to_vec());
        } else {
            return Err(RecognitionError::InvalidLanguageModel);
        }
        Ok(())
    }
}
