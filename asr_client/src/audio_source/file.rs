use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{AudioEncoding, AudioFormat, AudioSource, ReadStatus};
use crate::error::RecognitionError;

/// Bytes handed to the streaming task per read
pub const BLOCK_SIZE: usize = 10_000;

type SampleReader = Box<dyn Read + Send>;

/// Audio streamed from a file on disk.
///
/// Files ending in `.wav` are parsed with `hound` and only the PCM data
/// chunk is streamed; anything else is sent as raw bytes.
pub struct FileAudioSource {
    path: PathBuf,
    reader: Mutex<Option<SampleReader>>,
    format: AudioFormat,
}

impl FileAudioSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecognitionError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            RecognitionError::Audio(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));

        let (reader, format): (SampleReader, AudioFormat) = if is_wav {
            let wav = hound::WavReader::new(BufReader::new(file)).map_err(|e| {
                RecognitionError::Audio(format!("Invalid WAV file {}: {}", path.display(), e))
            })?;
            let spec = wav.spec();
            let data_bytes = u64::from(wav.len()) * u64::from(spec.bits_per_sample / 8);
            let format = AudioFormat {
                encoding: AudioEncoding::Wav,
                sample_rate: spec.sample_rate,
                bits_per_sample: spec.bits_per_sample,
            };
            (Box::new(wav.into_inner().take(data_bytes)), format)
        } else {
            let format = AudioFormat {
                encoding: AudioEncoding::Raw,
                ..AudioFormat::default()
            };
            (Box::new(BufReader::new(file)), format)
        };

        log::debug!(
            "🎵 Opened {} ({:?}, {} Hz, {} bits)",
            path.display(),
            format.encoding,
            format.sample_rate,
            format.bits_per_sample
        );

        Ok(Self {
            path,
            reader: Mutex::new(Some(reader)),
            format,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for FileAudioSource {
    fn read(&self, buffer: &mut Vec<u8>) -> Result<ReadStatus, RecognitionError> {
        buffer.clear();
        let mut guard = self
            .reader
            .lock()
            .map_err(|_| RecognitionError::Audio("Audio reader lock poisoned".into()))?;

        let Some(reader) = guard.as_mut() else {
            return Ok(ReadStatus::EndOfStream);
        };

        let read = reader.by_ref().take(BLOCK_SIZE as u64).read_to_end(buffer)?;
        if read == 0 {
            Ok(ReadStatus::EndOfStream)
        } else {
            Ok(ReadStatus::Data)
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.reader.lock() {
            guard.take();
        }
    }

    fn finish(&self) {}

    fn format(&self) -> AudioFormat {
        self.format
    }
}

impl std::fmt::Debug for FileAudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAudioSource")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish()
    }
}
