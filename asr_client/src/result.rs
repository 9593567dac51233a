//! Recognition results as delivered to listeners and `wait_result` callers.

use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// Final status of a recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Processing,
    Recognized,
    NoMatch,
    NoInputTimeout,
    MaxSpeech,
    EarlySpeech,
    RecognitionTimeout,
    NoSpeech,
    Canceled,
    Failure,
}

impl ResultCode {
    /// Map a `Result-Status` value. `PROCESSING` and unknown values count as
    /// NO_MATCH, so a result only becomes RECOGNIZED once it holds an
    /// alternative.
    pub fn from_status(status: &str) -> Self {
        match status.trim().parse::<ResultCode>() {
            Ok(ResultCode::Processing) | Err(_) => ResultCode::NoMatch,
            Ok(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub text: String,
    pub confidence: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Word {
    pub text: String,
    pub confidence: i32,
    pub start_time: f64,
    pub end_time: f64,
}

/// One hypothesis of what was said
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Alternative {
    pub text: String,
    /// 0 to 100
    pub confidence: i32,
    pub interpretations: Vec<Interpretation>,
    words: Vec<Word>,
}

impl Alternative {
    pub fn new(text: impl Into<String>, confidence: i32) -> Self {
        Self {
            text: text.into(),
            confidence,
            ..Default::default()
        }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Append a word. Words must not start before the previous one and must
    /// have a positive duration; anything else is refused and returns false.
    pub fn push_word(&mut self, word: Word) -> bool {
        if word.end_time <= word.start_time {
            return false;
        }
        if let Some(last) = self.words.last() {
            if word.start_time < last.start_time {
                return false;
            }
        }
        self.words.push(word);
        true
    }

    fn from_json(json: &Value) -> Self {
        let mut alternative = Alternative::new(string_field(json, "text"), int_field(json, "score"));

        for interpretation in array_field(json, "interpretations") {
            let text = match interpretation.as_str() {
                Some(text) => text.to_string(),
                None => interpretation.to_string(),
            };
            alternative.interpretations.push(Interpretation {
                text,
                confidence: int_field(interpretation, "score"),
            });
        }

        for word in array_field(json, "words") {
            let word = Word {
                text: string_field(word, "text"),
                confidence: int_field(word, "score"),
                start_time: number_field(word, "start_time").unwrap_or_default(),
                end_time: number_field(word, "end_time").unwrap_or_default(),
            };
            if !alternative.push_word(word.clone()) {
                log::warn!(
                    "⚠️ Skipping out-of-order word '{}' ({:.2}s - {:.2}s)",
                    word.text,
                    word.start_time,
                    word.end_time
                );
            }
        }

        alternative
    }
}

/// Outcome of one recognized speech segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    code: ResultCode,
    alternatives: Vec<Alternative>,
    /// Segment start in seconds, -1 when the server did not report it
    pub start_time: f64,
    /// Segment end in seconds, -1 when the server did not report it
    pub end_time: f64,
    pub last_segment: bool,
}

impl RecognitionResult {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            alternatives: Vec::new(),
            start_time: -1.0,
            end_time: -1.0,
            last_segment: true,
        }
    }

    /// Status-only result built from a `Result-Status` header value
    pub fn from_status(status: &str) -> Self {
        Self::new(ResultCode::from_status(status))
    }

    /// Decode a final result body. `result_status` in the body wins over
    /// the header status passed in as `status`.
    pub fn from_json(json: &Value, status: &str) -> Self {
        let status = json
            .get("result_status")
            .and_then(|v| v.as_str())
            .unwrap_or(status);
        let mut result = Self::from_status(status);

        for alternative in array_field(json, "alternatives") {
            result.push_alternative(Alternative::from_json(alternative));
        }
        if let Some(start) = number_field(json, "start_time") {
            result.start_time = start;
        }
        if let Some(end) = number_field(json, "end_time") {
            result.end_time = end;
        }
        result
    }

    pub fn code(&self) -> ResultCode {
        self.code
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    /// Add a hypothesis; a NO_MATCH result becomes RECOGNIZED
    pub fn push_alternative(&mut self, alternative: Alternative) {
        if self.code == ResultCode::NoMatch {
            self.code = ResultCode::Recognized;
        }
        self.alternatives.push(alternative);
    }

    /// Text of the best alternative, if any
    pub fn best_text(&self) -> Option<&str> {
        self.alternatives.first().map(|a| a.text.as_str())
    }
}

/// Interim hypothesis reported while the segment is still being decoded
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialRecognition {
    pub text: String,
    pub speech_segment_index: i32,
}

impl PartialRecognition {
    pub fn from_json(json: &Value) -> Self {
        let text = array_field(json, "alternatives")
            .next()
            .map(|first| string_field(first, "text"))
            .unwrap_or_default();
        let speech_segment_index = json
            .get("segment_index")
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as i32;

        Self {
            text,
            speech_segment_index,
        }
    }
}

fn string_field(json: &Value, key: &str) -> String {
    json.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn int_field(json: &Value, key: &str) -> i32 {
    json.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0) as i32
}

fn number_field(json: &Value, key: &str) -> Option<f64> {
    json.get(key).and_then(|v| v.as_f64())
}

fn array_field<'a>(json: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    json.get(key)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
}
