use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio_source::{AudioSource, ReadStatus};
use crate::error::RecognitionError;
use crate::session::requests;
use crate::transport::Transport;

/// Called from the streaming thread when it cannot continue
pub(crate) type FailureHandler = Box<dyn Fn(RecognitionError) + Send>;

/// Thread pumping an audio source into SEND_AUDIO frames.
///
/// Stopping is cooperative: the flag is checked after every read and before
/// every send, then the thread is joined.
pub(crate) struct AudioStreamer {
    cancel: Arc<AtomicBool>,
    source: Arc<dyn AudioSource>,
    worker: Option<JoinHandle<()>>,
}

impl AudioStreamer {
    pub fn spawn(
        source: Arc<dyn AudioSource>,
        transport: Arc<dyn Transport>,
        poll_interval: Duration,
        on_failure: FailureHandler,
    ) -> Result<Self, RecognitionError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let worker = {
            let cancel = Arc::clone(&cancel);
            let source = Arc::clone(&source);
            thread::Builder::new()
                .name("asr-audio".into())
                .spawn(move || {
                    if let Err(e) = Self::run(&*source, &*transport, &cancel, poll_interval) {
                        log::error!("❌ Audio streaming failed: {}", e);
                        on_failure(e);
                    }
                })
                .map_err(|e| RecognitionError::Audio(format!("cannot spawn streaming thread: {}", e)))?
        };

        Ok(Self {
            cancel,
            source,
            worker: Some(worker),
        })
    }

    fn run(
        source: &dyn AudioSource,
        transport: &dyn Transport,
        cancel: &AtomicBool,
        poll_interval: Duration,
    ) -> Result<(), RecognitionError> {
        log::debug!("🎙️ Audio streaming started");
        let mut buffer = Vec::new();
        let mut packets = 0usize;
        let mut bytes = 0usize;

        loop {
            if cancel.load(Ordering::Acquire) {
                log::debug!("🛑 Audio streaming cancelled after {} packets", packets);
                return Ok(());
            }

            let status = source.read(&mut buffer)?;
            if cancel.load(Ordering::Acquire) {
                log::debug!("🛑 Audio streaming cancelled after {} packets", packets);
                return Ok(());
            }

            let last_packet = status == ReadStatus::EndOfStream;
            if buffer.is_empty() && !last_packet {
                thread::sleep(poll_interval);
                continue;
            }

            bytes += buffer.len();
            packets += 1;
            let frame = requests::send_audio(std::mem::take(&mut buffer), last_packet);
            log::trace!("📤 [SEND] {}", frame);
            transport.send(frame.to_bytes())?;

            if last_packet {
                log::debug!(
                    "🏁 Audio streaming finished: {} packets, {} bytes",
                    packets,
                    bytes
                );
                return Ok(());
            }
        }
    }

    /// Cancel, join and close the audio source
    pub fn stop(mut self) {
        self.cancel.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_source::BufferAudioSource;
    use crate::transport::{Endpoint, EventHandler};
    use asr_protocol::Frame;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<Frame>>,
    }

    impl Transport for Recorder {
        fn open(&self, _: &Endpoint, _: EventHandler) -> Result<(), RecognitionError> {
            Ok(())
        }

        fn send(&self, payload: Vec<u8>) -> Result<(), RecognitionError> {
            self.frames.lock().unwrap().push(Frame::parse(&payload)?);
            Ok(())
        }

        fn close(&self) {}

        fn is_open(&self) -> bool {
            true
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_streams_until_end_of_stream() {
        let source = Arc::new(BufferAudioSource::with_capacity(1024));
        let transport = Arc::new(Recorder::default());
        source.write(&[1, 2, 3, 4]);

        let streamer = AudioStreamer::spawn(
            source.clone(),
            transport.clone(),
            Duration::from_millis(1),
            Box::new(|_| {}),
        )
        .unwrap();

        wait_for(|| transport.frames.lock().unwrap().len() == 1);
        source.finish();
        wait_for(|| transport.frames.lock().unwrap().len() == 2);
        streamer.stop();

        let frames = transport.frames.lock().unwrap();
        assert_eq!(frames[0].body(), &[1, 2, 3, 4]);
        assert_eq!(frames[0].header("LastPacket"), Some("false"));
        assert!(frames[1].body().is_empty());
        assert_eq!(frames[1].header("LastPacket"), Some("true"));
    }

    #[test]
    fn test_stop_cancels_idle_stream() {
        let source = Arc::new(BufferAudioSource::with_capacity(1024));
        let transport = Arc::new(Recorder::default());

        let streamer = AudioStreamer::spawn(
            source.clone(),
            transport.clone(),
            Duration::from_millis(1),
            Box::new(|_| {}),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        streamer.stop();

        source.write(&[1, 2]);
        thread::sleep(Duration::from_millis(20));
        assert!(transport.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_failure_is_reported() {
        struct Broken;
        impl Transport for Broken {
            fn open(&self, _: &Endpoint, _: EventHandler) -> Result<(), RecognitionError> {
                Ok(())
            }
            fn send(&self, _: Vec<u8>) -> Result<(), RecognitionError> {
                Err(RecognitionError::ConnectionFailure("gone".into()))
            }
            fn close(&self) {}
            fn is_open(&self) -> bool {
                false
            }
        }

        let source = Arc::new(BufferAudioSource::with_capacity(64));
        source.write(&[1, 2]);
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();

        let streamer = AudioStreamer::spawn(
            source,
            Arc::new(Broken),
            Duration::from_millis(1),
            Box::new(move |e| sink.lock().unwrap().push(e)),
        )
        .unwrap();
        wait_for(|| !failures.lock().unwrap().is_empty());
        streamer.stop();

        assert_eq!(
            failures.lock().unwrap()[0],
            RecognitionError::ConnectionFailure("gone".into())
        );
    }
}
