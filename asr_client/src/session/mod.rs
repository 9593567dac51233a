//! Session bookkeeping shared by the recognizer, the transport thread and
//! the audio streaming thread.

pub(crate) mod dispatcher;
pub(crate) mod requests;
pub(crate) mod streamer;

use std::sync::Arc;
use std::time::Instant;

use strum::{AsRefStr, Display, EnumString};

use crate::audio_source::AudioSource;
use crate::error::RecognitionError;
use crate::language_model::LanguageModelList;
use crate::result::RecognitionResult;
use streamer::AudioStreamer;

/// Server-side session status as last reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No session has been created on this connection
    #[default]
    None,
    Idle,
    Listening,
    Recognizing,
}

/// Mutable state of one recognizer, always accessed under its mutex
#[derive(Default)]
pub(crate) struct RecognitionHandle {
    pub state: SessionState,
    pub audio_source: Option<Arc<dyn AudioSource>>,
    pub language_model: Option<LanguageModelList>,
    pub results: Vec<RecognitionResult>,
    pub error: Option<RecognitionError>,
    /// Set by `recognize`, cleared when its outcome is taken or the
    /// recognizer closes
    pub active: bool,
    /// Set by `recognize`, cleared once the recognition has an outcome
    pub recognizing: bool,
    /// A CANCEL_RECOGNITION for the running recognition awaits its reply
    pub cancel_pending: bool,
    pub started_at: Option<Instant>,
    pub streamer: Option<AudioStreamer>,
}

impl RecognitionHandle {
    /// Start a fresh recognition; anything left from the previous one is
    /// dropped
    pub fn begin(&mut self, audio_source: Arc<dyn AudioSource>, language_model: LanguageModelList) {
        self.active = true;
        self.recognizing = true;
        self.results.clear();
        self.error = None;
        self.started_at = Some(Instant::now());
        self.audio_source = Some(audio_source);
        self.language_model = Some(language_model);
    }

    /// The running recognition has its outcome
    pub fn finish_recognition(&mut self) {
        self.recognizing = false;
        self.cancel_pending = false;
    }

    /// Forget the server session and everything the last recognition
    /// left. The streamer is the caller's to stop.
    pub fn reset(&mut self) {
        self.state = SessionState::None;
        self.finish_recognition();
        self.active = false;
        self.results.clear();
        self.error = None;
        self.language_model = None;
        self.started_at = None;
        if let Some(source) = self.audio_source.take() {
            source.close();
        }
    }
}

impl std::fmt::Debug for RecognitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionHandle")
            .field("state", &self.state)
            .field("active", &self.active)
            .field("recognizing", &self.recognizing)
            .field("cancel_pending", &self.cancel_pending)
            .field("results", &self.results.len())
            .field("error", &self.error)
            .field("streaming", &self.streamer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_source::BufferAudioSource;
    use crate::result::ResultCode;

    #[test]
    fn test_reset_drops_previous_outcome() {
        let mut handle = RecognitionHandle::default();
        handle.begin(
            Arc::new(BufferAudioSource::new()),
            LanguageModelList::from_uri("builtin:slm/general"),
        );
        handle.state = SessionState::Recognizing;
        handle.cancel_pending = true;
        handle.results.push(RecognitionResult::new(ResultCode::NoSpeech));
        handle.error = Some(RecognitionError::InvalidLanguageModel);

        handle.reset();
        assert_eq!(handle.state, SessionState::None);
        assert!(!handle.active && !handle.recognizing && !handle.cancel_pending);
        assert!(handle.results.is_empty());
        assert!(handle.error.is_none());
        assert!(handle.language_model.is_none() && handle.audio_source.is_none());
        assert!(handle.started_at.is_none());
    }
}
