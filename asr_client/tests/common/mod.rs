//! In-process ASR server used by the integration tests.
//!
//! `MockAsrServer` is a `Transport`: every frame the recognizer sends is
//! recorded and answered the way a real server would, and the replies are
//! delivered from a separate thread in order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use asr_client::{
    Endpoint, EventHandler, PartialRecognition, RecognitionError, RecognitionListener,
    RecognitionResult, RecognizerSettings, Transport, TransportEvent,
};
use asr_protocol::{content_type, header, Frame, Method};
use crossbeam_channel::{unbounded, Sender};

pub const RECOGNIZED_OK: &str = r#"{"alternatives":[{"text":"ok","score":91,"words":[{"text":"ok","score":91,"start_time":0.1,"end_time":0.4}]}],"result_status":"RECOGNIZED"}"#;

/// One RECOGNITION_RESULT the server sends after the last audio packet
#[derive(Debug, Clone)]
pub struct ScriptedResult {
    pub status: String,
    pub body: Option<String>,
}

impl ScriptedResult {
    pub fn new(status: &str, body: Option<&str>) -> Self {
        Self {
            status: status.to_string(),
            body: body.map(str::to_string),
        }
    }
}

struct Script {
    results: Vec<ScriptedResult>,
    failures: HashMap<Method, (String, String)>,
    hold_results: bool,
    hold_cancel_replies: bool,
    held_cancel_replies: Vec<Frame>,
    speech_started: bool,
}

struct Delivery {
    events: Sender<TransportEvent>,
    worker: JoinHandle<()>,
}

pub struct MockAsrServer {
    script: Mutex<Script>,
    received: Mutex<Vec<Frame>>,
    opens: AtomicUsize,
    open: Arc<AtomicBool>,
    delivery: Mutex<Option<Delivery>>,
}

impl MockAsrServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                results: vec![ScriptedResult::new("RECOGNIZED", Some(RECOGNIZED_OK))],
                failures: HashMap::new(),
                hold_results: false,
                hold_cancel_replies: false,
                held_cancel_replies: Vec::new(),
                speech_started: false,
            }),
            received: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            open: Arc::new(AtomicBool::new(false)),
            delivery: Mutex::new(None),
        })
    }

    /// Replace the results sent after the last audio packet
    pub fn respond_with(&self, results: Vec<ScriptedResult>) {
        self.script.lock().unwrap().results = results;
    }

    /// Answer `method` with a FAILURE response
    pub fn fail(&self, method: Method, code: &str, message: &str) {
        self.script
            .lock()
            .unwrap()
            .failures
            .insert(method, (code.to_string(), message.to_string()));
    }

    /// Keep the results back until `deliver_results` is called
    pub fn hold_results(&self) {
        self.script.lock().unwrap().hold_results = true;
    }

    pub fn deliver_results(&self) {
        let results = {
            let mut script = self.script.lock().unwrap();
            script.hold_results = false;
            script.results.clone()
        };
        for reply in result_frames(&results) {
            self.push(reply);
        }
    }

    /// Keep CANCEL_RECOGNITION replies back until `release_cancel_replies`
    pub fn hold_cancel_replies(&self) {
        self.script.lock().unwrap().hold_cancel_replies = true;
    }

    pub fn release_cancel_replies(&self) {
        let replies = {
            let mut script = self.script.lock().unwrap();
            script.hold_cancel_replies = false;
            std::mem::take(&mut script.held_cancel_replies)
        };
        for reply in replies {
            self.push(reply);
        }
    }

    /// Simulate the server going away
    pub fn drop_connection(&self) {
        if let Some(delivery) = self.delivery.lock().unwrap().as_ref() {
            let _ = delivery
                .events
                .send(TransportEvent::Closed("connection reset".to_string()));
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Frame> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_commands(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|f| f.command().to_string())
            .collect()
    }

    /// Commands with consecutive SEND_AUDIO frames collapsed into one
    pub fn conversation(&self) -> Vec<String> {
        let mut commands = self.received_commands();
        commands.dedup_by(|a, b| a == "SEND_AUDIO" && b == "SEND_AUDIO");
        commands
    }

    pub fn audio_frames(&self) -> Vec<Frame> {
        self.received()
            .into_iter()
            .filter(|f| f.method() == Some(Method::SendAudio))
            .collect()
    }

    fn push(&self, frame: Frame) {
        if let Some(delivery) = self.delivery.lock().unwrap().as_ref() {
            let _ = delivery
                .events
                .send(TransportEvent::Message(frame.to_bytes()));
        }
    }

    fn reply_to(&self, request: &Frame) -> Vec<Frame> {
        let Some(method) = request.method() else {
            return Vec::new();
        };
        let mut script = self.script.lock().unwrap();

        if let Some((code, message)) = script.failures.get(&method) {
            return vec![Frame::request(Method::Response)
                .with_header(header::HANDLE, "1")
                .with_header(header::METHOD, method.as_ref())
                .with_header(header::RESULT, "FAILURE")
                .with_header(header::ERROR_CODE, code.as_str())
                .with_header(header::MESSAGE, message.as_str())];
        }

        match method {
            Method::CreateSession
            | Method::SetParameters
            | Method::ReleaseSession
            | Method::StartInputTimers => vec![response(method, "IDLE")],
            Method::StartRecognition => {
                script.speech_started = false;
                vec![response(method, "LISTENING")]
            }
            Method::CancelRecognition if script.hold_cancel_replies => {
                script.held_cancel_replies.push(response(method, "IDLE"));
                Vec::new()
            }
            Method::CancelRecognition => vec![response(method, "IDLE")],
            Method::SendAudio => {
                let mut replies = Vec::new();
                if !script.speech_started {
                    script.speech_started = true;
                    replies.push(
                        Frame::request(Method::StartOfSpeech)
                            .with_header(header::HANDLE, "1")
                            .with_header(header::TIMESTAMP, "120"),
                    );
                }
                if request.header(header::LAST_PACKET) == Some("true") {
                    replies.push(Frame::request(Method::EndOfSpeech).with_header(header::HANDLE, "1"));
                    if !script.hold_results {
                        replies.extend(result_frames(&script.results));
                    }
                }
                replies
            }
            _ => Vec::new(),
        }
    }
}

fn response(method: Method, status: &str) -> Frame {
    Frame::request(Method::Response)
        .with_header(header::HANDLE, "1")
        .with_header(header::METHOD, method.as_ref())
        .with_header(header::EXPIRES, "60")
        .with_header(header::RESULT, "SUCCESS")
        .with_header(header::SESSION_STATUS, status)
}

fn result_frames(results: &[ScriptedResult]) -> Vec<Frame> {
    results
        .iter()
        .map(|result| {
            let frame = Frame::request(Method::RecognitionResult)
                .with_header(header::HANDLE, "1")
                .with_header(header::RESULT_STATUS, result.status.as_str());
            match &result.body {
                Some(body) => frame
                    .with_header(header::CONTENT_TYPE, content_type::JSON)
                    .with_body(body.clone().into_bytes()),
                None => frame,
            }
        })
        .collect()
}

impl Transport for MockAsrServer {
    fn open(&self, _: &Endpoint, on_event: EventHandler) -> Result<(), RecognitionError> {
        let mut delivery = self.delivery.lock().unwrap();
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);

        let (events, inbox) = unbounded::<TransportEvent>();
        let open = Arc::clone(&self.open);
        let worker = thread::spawn(move || {
            for event in inbox.iter() {
                if !open.load(Ordering::SeqCst) {
                    break;
                }
                if let TransportEvent::Closed(_) = event {
                    on_event(event);
                    open.store(false, Ordering::SeqCst);
                    break;
                }
                on_event(event);
            }
        });
        *delivery = Some(Delivery { events, worker });
        Ok(())
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), RecognitionError> {
        if !self.is_open() {
            return Err(RecognitionError::ConnectionFailure("mock server closed".into()));
        }
        let frame = Frame::parse(&payload)?;
        let replies = self.reply_to(&frame);
        self.received.lock().unwrap().push(frame);
        for reply in replies {
            self.push(reply);
        }
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let taken = self.delivery.lock().unwrap().take();
        if let Some(Delivery { events, worker }) = taken {
            drop(events);
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Listener that records every callback as a short string
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecognitionListener for RecordingListener {
    fn on_listening(&self) {
        self.record("listening".into());
    }

    fn on_speech_start(&self, time_ms: i64) {
        self.record(format!("speech_start:{}", time_ms));
    }

    fn on_speech_stop(&self, time_ms: i64) {
        self.record(format!("speech_stop:{}", time_ms));
    }

    fn on_partial_recognition(&self, partial: &PartialRecognition) {
        self.record(format!("partial:{}", partial.text));
    }

    fn on_recognition_result(&self, result: &RecognitionResult) {
        self.record(format!("result:{}", result.code()));
    }

    fn on_error(&self, error: &RecognitionError) {
        self.record(format!("error:{}", error));
    }
}

pub fn test_settings() -> RecognizerSettings {
    RecognizerSettings {
        url: "ws://localhost:8025/asr-server/asr".into(),
        max_wait: Duration::from_secs(5),
        audio_poll_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {}", what);
}
