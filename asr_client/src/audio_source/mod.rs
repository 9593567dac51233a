//! Audio producers consumed by the streaming task.

mod buffer;
mod file;

pub use buffer::BufferAudioSource;
pub use file::FileAudioSource;

use crate::error::RecognitionError;

/// Container of the audio handed to an [`AudioSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Raw,
    Wav,
}

/// Description of the samples a source produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Wav,
            sample_rate: 8000,
            bits_per_sample: 16,
        }
    }
}

/// Outcome of a single [`AudioSource::read`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer holds the bytes read so far; it may be empty when nothing
    /// is available yet.
    Data,
    /// No more audio will follow. The buffer may still carry a final chunk.
    EndOfStream,
}

/// Source of audio bytes for a recognition.
///
/// Sources are shared between the caller and the streaming thread, so all
/// methods take `&self`.
pub trait AudioSource: Send + Sync {
    /// Replace the contents of `buffer` with the next chunk of audio
    fn read(&self, buffer: &mut Vec<u8>) -> Result<ReadStatus, RecognitionError>;

    /// Release the underlying resources; later reads report end of stream
    fn close(&self);

    /// Signal that the producer will not write any more audio
    fn finish(&self);

    fn format(&self) -> AudioFormat {
        AudioFormat::default()
    }
}
