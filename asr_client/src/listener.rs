use crate::error::RecognitionError;
use crate::result::{PartialRecognition, RecognitionResult};

/// Callbacks for recognition progress.
///
/// Called from the transport thread in the order the server sent the
/// events, never while the recognizer's internal lock is held. Every method
/// has an empty default so implementors only override what they need.
pub trait RecognitionListener: Send + Sync {
    /// The server started listening to the audio stream
    fn on_listening(&self) {}

    fn on_speech_start(&self, _time_ms: i64) {}

    fn on_speech_stop(&self, _time_ms: i64) {}

    fn on_partial_recognition(&self, _partial: &PartialRecognition) {}

    fn on_recognition_result(&self, _result: &RecognitionResult) {}

    fn on_error(&self, _error: &RecognitionError) {}
}

/// Listener that writes every event to the log
#[derive(Debug, Default)]
pub struct LoggingListener;

impl RecognitionListener for LoggingListener {
    fn on_listening(&self) {
        log::info!("👂 Server is listening");
    }

    fn on_speech_start(&self, time_ms: i64) {
        log::info!("🗣️ Speech started at {}ms", time_ms);
    }

    fn on_speech_stop(&self, time_ms: i64) {
        log::info!("🤐 Speech stopped at {}ms", time_ms);
    }

    fn on_partial_recognition(&self, partial: &PartialRecognition) {
        log::info!(
            "📝 Partial [{}]: '{}'",
            partial.speech_segment_index,
            partial.text
        );
    }

    fn on_recognition_result(&self, result: &RecognitionResult) {
        log::info!(
            "✅ Result {}: '{}'",
            result.code(),
            result.best_text().unwrap_or_default()
        );
    }

    fn on_error(&self, error: &RecognitionError) {
        log::error!("❌ Recognition error ({}): {}", error.code(), error);
    }
}
