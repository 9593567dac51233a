use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use asr_protocol::Frame;

use crate::audio_source::AudioSource;
use crate::config::{Credentials, RecognizerSettings};
use crate::error::RecognitionError;
use crate::language_model::LanguageModelList;
use crate::listener::RecognitionListener;
use crate::result::RecognitionResult;
use crate::session::dispatcher::{self, Commit, Effect, Notification};
use crate::session::streamer::AudioStreamer;
use crate::session::{requests, RecognitionHandle, SessionState};
use crate::transport::{Endpoint, EventHandler, Transport, TransportEvent, WebSocketTransport};

/// Client side of one recognition session.
///
/// `recognize` starts a recognition and returns immediately; the audio is
/// streamed from a background thread while server events arrive on the
/// transport thread. `wait_result` blocks until the outcome is known.
///
/// ```no_run
/// use std::sync::Arc;
/// use asr_client::{BufferAudioSource, LanguageModelList, RecognizerSettings, SpeechRecognizer};
///
/// let settings = RecognizerSettings {
///     url: "ws://localhost:8025/asr-server/asr".into(),
///     ..Default::default()
/// };
/// let recognizer = SpeechRecognizer::connect(settings, Vec::new())?;
/// let audio = Arc::new(BufferAudioSource::new());
/// recognizer.recognize(audio.clone(), LanguageModelList::from_uri("builtin:slm/general"))?;
/// audio.write(&[0u8; 3200]);
/// audio.finish();
/// for result in recognizer.wait_result()? {
///     println!("{}: {:?}", result.code(), result.best_text());
/// }
/// # Ok::<(), asr_client::RecognitionError>(())
/// ```
pub struct SpeechRecognizer {
    shared: Arc<Shared>,
}

struct Shared {
    settings: RecognizerSettings,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    listeners: Vec<Arc<dyn RecognitionListener>>,
    handle: Mutex<RecognitionHandle>,
    wake: Condvar,
    /// Serializes opening and closing the connection
    lifecycle: Mutex<()>,
}

impl SpeechRecognizer {
    /// Create a recognizer on top of `transport`.
    ///
    /// Connects right away unless `connect_on_recognize` is set.
    pub fn new(
        settings: RecognizerSettings,
        transport: Arc<dyn Transport>,
        listeners: Vec<Arc<dyn RecognitionListener>>,
    ) -> Result<Self, RecognitionError> {
        let endpoint = Endpoint {
            url: settings.server_url()?,
            authorization: settings.credentials.as_ref().map(Credentials::authorization),
            connect_timeout: settings.connect_timeout,
        };
        let connect_now = !settings.connect_on_recognize;

        let shared = Arc::new(Shared {
            settings,
            endpoint,
            transport,
            listeners,
            handle: Mutex::new(RecognitionHandle::default()),
            wake: Condvar::new(),
            lifecycle: Mutex::new(()),
        });

        if connect_now {
            if let Err(e) = shared.open() {
                shared.notify(&Notification::Error(e.clone()));
                return Err(e);
            }
        }

        log::info!("🎧 Speech recognizer ready for {}", shared.endpoint.url);
        Ok(Self { shared })
    }

    /// Create a recognizer speaking WebSocket to `settings.url`
    pub fn connect(
        settings: RecognizerSettings,
        listeners: Vec<Arc<dyn RecognitionListener>>,
    ) -> Result<Self, RecognitionError> {
        Self::new(settings, Arc::new(WebSocketTransport::new()), listeners)
    }

    /// Start recognizing `audio_source` with `language_model`.
    ///
    /// Fails with `ActiveRecognition` while the previous recognition's
    /// outcome has not been taken by `wait_result` or discarded by `close`.
    pub fn recognize(
        &self,
        audio_source: Arc<dyn AudioSource>,
        language_model: LanguageModelList,
    ) -> Result<(), RecognitionError> {
        if language_model.uri().is_none() && language_model.grammar().is_none() {
            return Err(RecognitionError::InvalidLanguageModel);
        }

        {
            let mut handle = self.shared.lock();
            if handle.active {
                log::warn!("⚠️ recognize() called while a recognition is in progress");
                return Err(RecognitionError::ActiveRecognition);
            }
            handle.begin(audio_source, language_model);
        }

        let started = self.shared.open().and_then(|()| {
            let frame = {
                let handle = self.shared.lock();
                match handle.state {
                    SessionState::None => requests::create_session(&self.shared.settings.user_agent),
                    _ => requests::start_recognition(handle.language_model.as_ref())?,
                }
            };
            self.shared.send(&frame)
        });

        if let Err(e) = started {
            log::error!("❌ Failed to start recognition: {}", e);
            self.shared.notify(&Notification::Error(e.clone()));
            let mut handle = self.shared.lock();
            handle.active = false;
            handle.finish_recognition();
            return Err(e);
        }
        Ok(())
    }

    /// Block until the current recognition has an outcome.
    ///
    /// The deadline is `max_wait` counted from `recognize`. A timeout leaves
    /// the recognition running, so a later call can still collect it.
    pub fn wait_result(&self) -> Result<Vec<RecognitionResult>, RecognitionError> {
        let max_wait = self.shared.settings.max_wait;
        let mut handle = self.shared.lock();

        if self.shared.transport.is_open() {
            let remaining = handle
                .started_at
                .map_or(max_wait, |started| max_wait.saturating_sub(started.elapsed()));
            handle = self
                .shared
                .wake
                .wait_timeout_while(handle, remaining, |h| still_waiting(h))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);

            if still_waiting(&handle) {
                log::warn!("⏰ No recognition outcome within {:?}", max_wait);
                return Err(RecognitionError::Timeout(max_wait));
            }
        }

        let streamer = handle.streamer.take();
        let results = std::mem::take(&mut handle.results);
        let error = handle.error.take();
        handle.active = false;
        handle.finish_recognition();
        drop(handle);

        if let Some(streamer) = streamer {
            streamer.stop();
        }
        if self.shared.settings.auto_close {
            self.close();
        }

        match error {
            Some(e) => Err(e),
            None => {
                log::debug!("📬 Recognition finished with {} result(s)", results.len());
                Ok(results)
            }
        }
    }

    /// Abort the current recognition.
    ///
    /// Streaming stops right away. The recognition ends, with its pending
    /// results discarded, once the server confirms the cancel; until then
    /// `wait_result` keeps waiting.
    pub fn cancel_recognition(&self) -> Result<(), RecognitionError> {
        let open = self.shared.transport.is_open();
        let streamer = {
            let mut handle = self.shared.lock();
            if handle.recognizing {
                if open {
                    handle.cancel_pending = true;
                } else {
                    // No server left to confirm
                    dispatcher::commit(
                        &mut handle,
                        Commit::Finish {
                            discard_results: true,
                        },
                    );
                }
            }
            handle.streamer.take()
        };
        if let Some(streamer) = streamer {
            streamer.stop();
        }

        if open {
            if let Err(e) = self.shared.send(&requests::cancel_recognition()) {
                log::error!("❌ Failed to cancel recognition: {}", e);
                self.shared.fail(e.clone());
                return Err(e);
            }
        } else {
            self.shared.wake.notify_all();
        }

        if self.shared.settings.auto_close {
            self.close();
        }
        Ok(())
    }

    /// Start the no-input and recognition timers the server deferred
    pub fn start_input_timers(&self) -> Result<(), RecognitionError> {
        self.shared.send(&requests::start_input_timers())
    }

    /// Release the session and close the connection. Safe to call twice.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_open(&self) -> bool {
        self.shared.transport.is_open()
    }

    /// Session status as last reported by the server
    pub fn session_state(&self) -> SessionState {
        self.shared.lock().state
    }
}

impl Drop for SpeechRecognizer {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Intermediate segments alone do not end the wait; the last segment, an
/// error, a cancel or a lost connection do
fn still_waiting(handle: &RecognitionHandle) -> bool {
    handle.error.is_none() && handle.recognizing
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RecognitionHandle> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(self: &Arc<Self>) -> Result<(), RecognitionError> {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.transport.is_open() {
            return Ok(());
        }
        self.transport.open(&self.endpoint, Self::event_handler(self))
    }

    fn close(&self) {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        let (streamer, has_session) = {
            let mut handle = self.lock();
            (handle.streamer.take(), handle.state != SessionState::None)
        };
        if let Some(streamer) = streamer {
            streamer.stop();
        }

        if self.transport.is_open() {
            if has_session {
                if let Err(e) = self.send(&requests::release_session()) {
                    log::debug!("Could not release session: {}", e);
                }
            }
            self.transport.close();
            log::info!("🔌 Recognizer connection closed");
        }

        self.lock().reset();
        self.wake.notify_all();
    }

    fn send(&self, frame: &Frame) -> Result<(), RecognitionError> {
        log::debug!("📤 [SEND] {}", frame);
        self.transport.send(frame.to_bytes())
    }

    /// The transport outlives no recognizer: events arriving after the
    /// recognizer is gone are ignored
    fn event_handler(self: &Arc<Self>) -> EventHandler {
        let shared: Weak<Self> = Arc::downgrade(self);
        Box::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                match event {
                    TransportEvent::Message(bytes) => shared.on_message(&bytes),
                    TransportEvent::Closed(reason) => shared.on_closed(reason),
                }
            }
        })
    }

    fn on_message(self: &Arc<Self>, bytes: &[u8]) {
        let frame = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("⚠️ Dropping malformed frame: {}", e);
                return;
            }
        };
        log::debug!("📥 [RECEIVE] {}", frame);

        match dispatcher::classify(&frame, self.settings.server_protocol) {
            Some(Ok(event)) => self.process(event),
            Some(Err(e)) => log::warn!("⚠️ Dropping {} frame: {}", frame.command(), e),
            None => log::debug!("Ignoring unexpected {} frame", frame.command()),
        }
    }

    /// Run one inbound event through the session: transition under the
    /// lock, then sends and listeners without it, then commit and wake
    fn process(self: &Arc<Self>, event: dispatcher::Inbound) {
        let mut effects = Vec::new();
        let mut stale = None;
        {
            let mut handle = self.lock();
            for effect in dispatcher::transition(&mut handle, event, self.settings.config.as_ref()) {
                match effect {
                    Effect::StartStreaming(source) => {
                        stale = handle.streamer.take();
                        match self.spawn_streamer(source) {
                            Ok(streamer) => handle.streamer = Some(streamer),
                            Err(e) => effects.push(Effect::Commit(Commit::Fail(e))),
                        }
                    }
                    other => effects.push(other),
                }
            }
        }
        if let Some(streamer) = stale {
            streamer.stop();
        }

        let mut commits = Vec::new();
        for effect in effects {
            match effect {
                Effect::Send(frame) => {
                    if let Err(e) = self.send(&frame) {
                        self.notify(&Notification::Error(e.clone()));
                        commits.push(Commit::Fail(e));
                    }
                }
                Effect::Notify(notification) => self.notify(&notification),
                Effect::Commit(commit) => {
                    if let Commit::Fail(e) = &commit {
                        log::error!("❌ Recognition failed: {}", e);
                        self.notify(&Notification::Error(e.clone()));
                    }
                    commits.push(commit);
                }
                Effect::StartStreaming(_) => {}
            }
        }
        self.commit(commits);
    }

    fn commit(&self, commits: Vec<Commit>) {
        if commits.is_empty() {
            return;
        }
        // Intermediate segments are stored without waking the waiter
        let wake = commits.iter().any(|c| {
            !matches!(
                c,
                Commit::Result {
                    last_segment: false,
                    ..
                }
            )
        });

        let mut handle = self.lock();
        for commit in commits {
            dispatcher::commit(&mut handle, commit);
        }
        drop(handle);

        if wake {
            self.wake.notify_all();
        }
    }

    fn fail(&self, error: RecognitionError) {
        self.notify(&Notification::Error(error.clone()));
        self.commit(vec![Commit::Fail(error)]);
    }

    fn spawn_streamer(self: &Arc<Self>, source: Arc<dyn AudioSource>) -> Result<AudioStreamer, RecognitionError> {
        let shared = Arc::downgrade(self);
        AudioStreamer::spawn(
            source,
            Arc::clone(&self.transport),
            self.settings.audio_poll_interval,
            Box::new(move |error| {
                if let Some(shared) = shared.upgrade() {
                    shared.fail(error);
                }
            }),
        )
    }

    fn on_closed(&self, reason: String) {
        log::warn!("🔌 Connection lost: {}", reason);
        let (streamer, was_recognizing) = {
            let mut handle = self.lock();
            let was_recognizing = handle.recognizing;
            handle.state = SessionState::None;
            (handle.streamer.take(), was_recognizing)
        };
        if let Some(streamer) = streamer {
            streamer.stop();
        }

        if was_recognizing {
            self.fail(RecognitionError::ConnectionFailure(reason));
        } else {
            self.wake.notify_all();
        }
    }

    fn notify(&self, notification: &Notification) {
        for listener in &self.listeners {
            match notification {
                Notification::Listening => listener.on_listening(),
                Notification::SpeechStart(time) => listener.on_speech_start(*time),
                Notification::SpeechStop(time) => listener.on_speech_stop(*time),
                Notification::Partial(partial) => listener.on_partial_recognition(partial),
                Notification::Result(result) => listener.on_recognition_result(result),
                Notification::Error(error) => listener.on_error(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Offline {
        opened: AtomicBool,
    }

    impl Transport for Offline {
        fn open(&self, _: &Endpoint, _: EventHandler) -> Result<(), RecognitionError> {
            self.opened.store(true, Ordering::SeqCst);
            Err(RecognitionError::ConnectionFailure("offline".into()))
        }
        fn send(&self, _: Vec<u8>) -> Result<(), RecognitionError> {
            Err(RecognitionError::ConnectionFailure("offline".into()))
        }
        fn close(&self) {}
        fn is_open(&self) -> bool {
            false
        }
    }

    fn settings(connect_on_recognize: bool) -> RecognizerSettings {
        RecognizerSettings {
            url: "ws://localhost:8025/asr".into(),
            connect_on_recognize,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let settings = RecognizerSettings {
            url: "http://localhost:8025/asr".into(),
            ..Default::default()
        };
        let result = SpeechRecognizer::new(settings, Arc::new(Offline::default()), Vec::new());
        let expected: RecognitionError = ConfigError::InvalidUrl {
            url: "http://localhost:8025/asr".into(),
            reason: "unsupported scheme 'http', expected ws or wss".into(),
        }
        .into();
        assert_eq!(result.err(), Some(expected));
    }

    #[test]
    fn test_eager_connect_failure() {
        let transport = Arc::new(Offline::default());
        let result = SpeechRecognizer::new(settings(false), transport.clone(), Vec::new());
        assert!(matches!(result, Err(RecognitionError::ConnectionFailure(_))));
        assert!(transport.opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_lazy_connect_releases_guard_on_failure() {
        let transport = Arc::new(Offline::default());
        let recognizer = SpeechRecognizer::new(settings(true), transport.clone(), Vec::new()).unwrap();
        assert!(!transport.opened.load(Ordering::SeqCst));

        let lm = LanguageModelList::from_uri("builtin:slm/general");
        let audio = Arc::new(crate::BufferAudioSource::new());
        for _ in 0..2 {
            assert!(matches!(
                recognizer.recognize(audio.clone(), lm.clone()),
                Err(RecognitionError::ConnectionFailure(_))
            ));
        }
        assert_eq!(recognizer.wait_result(), Ok(Vec::new()));
    }

    #[test]
    fn test_intermediate_segments_keep_waiting() {
        let mut handle = RecognitionHandle::default();
        handle.begin(
            Arc::new(crate::BufferAudioSource::new()),
            LanguageModelList::from_uri("builtin:slm/general"),
        );
        assert!(still_waiting(&handle));

        let segment = |last_segment| {
            let mut result = RecognitionResult::new(crate::ResultCode::Recognized);
            result.last_segment = last_segment;
            Commit::Result {
                result,
                last_segment,
            }
        };
        dispatcher::commit(&mut handle, segment(false));
        assert!(still_waiting(&handle));
        dispatcher::commit(&mut handle, segment(true));
        assert!(!still_waiting(&handle));
        assert_eq!(handle.results.len(), 2);
    }

    #[test]
    fn test_empty_language_model_is_rejected() {
        let recognizer =
            SpeechRecognizer::new(settings(true), Arc::new(Offline::default()), Vec::new()).unwrap();
        let result = recognizer.recognize(
            Arc::new(crate::BufferAudioSource::new()),
            LanguageModelList::from_uri(""),
        );
        assert_eq!(result, Err(RecognitionError::InvalidLanguageModel));
    }
}
