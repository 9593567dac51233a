use std::sync::atomic::{AtomicBool, Ordering};

use super::{AudioFormat, AudioSource, ReadStatus};
use crate::error::RecognitionError;
use crate::ring_buffer::RingBuffer;

/// Default ring capacity in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 50_000;

/// Audio pushed by the application, e.g. from a capture callback.
///
/// The application thread is the only writer and the streaming thread the
/// only reader of the underlying ring.
#[derive(Debug)]
pub struct BufferAudioSource {
    ring: RingBuffer,
    finished: AtomicBool,
    format: AudioFormat,
}

impl BufferAudioSource {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_format(AudioFormat::default(), capacity)
    }

    pub fn with_format(format: AudioFormat, capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            finished: AtomicBool::new(false),
            format,
        }
    }

    /// Queue audio for streaming. Returns false once the source is finished.
    /// Bytes that do not fit in the ring are dropped.
    pub fn write(&self, bytes: &[u8]) -> bool {
        if self.finished.load(Ordering::Acquire) {
            return false;
        }
        let written = self.ring.write(bytes);
        if written < bytes.len() {
            log::warn!(
                "⚠️ Audio buffer overflow: kept {} of {} bytes",
                written,
                bytes.len()
            );
        }
        true
    }

    /// Mark the end of the audio. Whatever is still queued goes out with
    /// the last packet.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Default for BufferAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for BufferAudioSource {
    fn read(&self, buffer: &mut Vec<u8>) -> Result<ReadStatus, RecognitionError> {
        // Load the flag before draining so every write preceding finish()
        // is part of the final chunk.
        let finished = self.finished.load(Ordering::Acquire);
        *buffer = self.ring.read_all();

        if finished {
            Ok(ReadStatus::EndOfStream)
        } else {
            Ok(ReadStatus::Data)
        }
    }

    fn close(&self) {}

    fn finish(&self) {
        BufferAudioSource::finish(self)
    }

    fn format(&self) -> AudioFormat {
        self.format
    }
}
