//! # ASR Client
//!
//! Blocking client for streaming speech recognition over WebSocket.
//!
//! A [`SpeechRecognizer`] drives one server session: it creates the session,
//! optionally sends recognition parameters, starts the recognition with a
//! [`LanguageModelList`] and streams audio from an [`AudioSource`] while
//! results arrive. Progress is reported to [`RecognitionListener`]s and the
//! final outcome is collected with [`SpeechRecognizer::wait_result`].
//!
//! No async runtime is involved: the connection and the audio stream each
//! run on a plain thread.

pub mod audio_source;
pub mod config;
pub mod error;
pub mod language_model;
pub mod listener;
pub mod recognizer;
pub mod result;
pub mod ring_buffer;
pub mod session;
pub mod transport;

pub use audio_source::{AudioEncoding, AudioFormat, AudioSource, BufferAudioSource, FileAudioSource, ReadStatus};
pub use config::{ConfigError, Credentials, RecognitionConfig, RecognizerSettings, ServerProtocol};
pub use error::{ErrorCode, RecognitionError};
pub use language_model::LanguageModelList;
pub use listener::{LoggingListener, RecognitionListener};
pub use recognizer::SpeechRecognizer;
pub use result::{Alternative, Interpretation, PartialRecognition, RecognitionResult, ResultCode, Word};
pub use ring_buffer::RingBuffer;
pub use session::SessionState;
pub use transport::{Endpoint, EventHandler, Transport, TransportEvent, WebSocketTransport};
