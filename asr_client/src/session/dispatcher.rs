//! Turns inbound frames into session transitions.
//!
//! Dispatch runs in three steps so that no listener or network call happens
//! under the recognizer lock:
//! 1. [`classify`] maps a frame to an [`Inbound`] event (no state needed),
//! 2. [`transition`] applies it to the handle and returns [`Effect`]s,
//! 3. the recognizer performs the effects and finally [`commit`]s the
//!    outcome, which is what `wait_result` observes.

use std::str::FromStr;
use std::sync::Arc;

use asr_protocol::{header, Frame, Method, ProtocolError, ResponseResult};
use serde_json::Value;

use crate::audio_source::AudioSource;
use crate::config::{RecognitionConfig, ServerProtocol};
use crate::error::RecognitionError;
use crate::result::{PartialRecognition, RecognitionResult, ResultCode};
use crate::session::{requests, RecognitionHandle, SessionState};

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Response {
        method: String,
        result: String,
        session_status: Option<SessionState>,
        error_code: String,
        message: String,
    },
    Result {
        session_idle: bool,
        outcome: ResultOutcome,
    },
    SpeechStart(i64),
    SpeechStop(i64),
}

/// What a RECOGNITION_RESULT frame means for the current recognition
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResultOutcome {
    Canceled,
    Final {
        result: RecognitionResult,
        last_segment: bool,
    },
    Partial(PartialRecognition),
}

/// Listener callbacks to run
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Notification {
    Listening,
    SpeechStart(i64),
    SpeechStop(i64),
    Partial(PartialRecognition),
    Result(RecognitionResult),
    Error(RecognitionError),
}

/// Outcome of the recognition, applied after listeners have run
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Commit {
    Result {
        result: RecognitionResult,
        last_segment: bool,
    },
    Fail(RecognitionError),
    Finish {
        discard_results: bool,
    },
}

pub(crate) enum Effect {
    Send(Frame),
    StartStreaming(Arc<dyn AudioSource>),
    Notify(Notification),
    Commit(Commit),
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Send(frame) => write!(f, "Send({})", frame.command()),
            Effect::StartStreaming(_) => write!(f, "StartStreaming"),
            Effect::Notify(n) => write!(f, "Notify({:?})", n),
            Effect::Commit(c) => write!(f, "Commit({:?})", c),
        }
    }
}

type Classifier = fn(&Frame, ServerProtocol) -> Option<Result<Inbound, ProtocolError>>;

/// Tried in order; the first classifier that recognizes the frame wins
const CLASSIFIERS: &[Classifier] = &[
    classify_response,
    classify_result,
    classify_speech_start,
    classify_speech_stop,
];

/// `None` when no classifier claims the frame
pub(crate) fn classify(
    frame: &Frame,
    protocol: ServerProtocol,
) -> Option<Result<Inbound, ProtocolError>> {
    CLASSIFIERS
        .iter()
        .find_map(|classifier| classifier(frame, protocol))
}

fn classify_response(frame: &Frame, _: ServerProtocol) -> Option<Result<Inbound, ProtocolError>> {
    if frame.method() != Some(Method::Response) {
        return None;
    }

    let text = |key: &str| frame.header(key).unwrap_or_default().trim().to_string();
    let session_status = frame
        .header(header::SESSION_STATUS)
        .and_then(|status| SessionState::from_str(status.trim()).ok())
        .filter(|state| *state != SessionState::None);

    Some(Ok(Inbound::Response {
        method: text(header::METHOD),
        result: text(header::RESULT),
        session_status,
        error_code: text(header::ERROR_CODE),
        message: text(header::MESSAGE),
    }))
}

fn classify_result(frame: &Frame, protocol: ServerProtocol) -> Option<Result<Inbound, ProtocolError>> {
    if frame.method() != Some(Method::RecognitionResult) {
        return None;
    }
    Some(decode_result(frame, protocol))
}

fn decode_result(frame: &Frame, protocol: ServerProtocol) -> Result<Inbound, ProtocolError> {
    let status = frame.header(header::RESULT_STATUS).unwrap_or_default().trim();
    let session_idle = frame
        .header(header::SESSION_STATUS)
        .is_some_and(|s| s.trim() == SessionState::Idle.as_ref());

    let outcome = if status == ResultCode::Canceled.as_ref() {
        ResultOutcome::Canceled
    } else if frame.body().is_empty() {
        ResultOutcome::Final {
            result: RecognitionResult::from_status(status),
            last_segment: true,
        }
    } else {
        let json: Value = serde_json::from_slice(frame.body())
            .map_err(|e| ProtocolError::InvalidBody(e.to_string()))?;

        let mut final_result = status == ResultCode::Recognized.as_ref();
        let mut last_segment = true;
        if protocol == ServerProtocol::Current {
            if let Some(flag) = json.get("final_result").and_then(|v| v.as_bool()) {
                final_result = flag;
            }
            if let Some(flag) = json.get("last_segment").and_then(|v| v.as_bool()) {
                last_segment = flag;
            }
        }

        if final_result {
            let mut result = RecognitionResult::from_json(&json, status);
            result.last_segment = last_segment;
            ResultOutcome::Final {
                result,
                last_segment,
            }
        } else {
            ResultOutcome::Partial(PartialRecognition::from_json(&json))
        }
    };

    Ok(Inbound::Result {
        session_idle,
        outcome,
    })
}

fn speech_time(frame: &Frame) -> i64 {
    frame
        .header(header::TIMESTAMP)
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0)
}

fn classify_speech_start(frame: &Frame, _: ServerProtocol) -> Option<Result<Inbound, ProtocolError>> {
    (frame.method() == Some(Method::StartOfSpeech)).then(|| Ok(Inbound::SpeechStart(speech_time(frame))))
}

fn classify_speech_stop(frame: &Frame, _: ServerProtocol) -> Option<Result<Inbound, ProtocolError>> {
    (frame.method() == Some(Method::EndOfSpeech)).then(|| Ok(Inbound::SpeechStop(speech_time(frame))))
}

/// Apply `event` to the session and decide what has to happen next
pub(crate) fn transition(
    handle: &mut RecognitionHandle,
    event: Inbound,
    config: Option<&RecognitionConfig>,
) -> Vec<Effect> {
    match event {
        Inbound::Response {
            method,
            result,
            session_status,
            error_code,
            message,
        } => {
            let mut effects = Vec::new();
            let outcome = ResponseResult::from_str(&result).ok();
            let method_kind = Method::from_str(&method).ok();
            let failure = || {
                Effect::Commit(Commit::Fail(RecognitionError::ProtocolFailure {
                    method: method.clone(),
                    code: error_code.clone(),
                    message: message.clone(),
                }))
            };

            if method_kind == Some(Method::CancelRecognition) {
                // A reply to a cancel whose recognition already ended must
                // not touch the next one
                if !handle.cancel_pending {
                    log::debug!("Ignoring CANCEL_RECOGNITION reply with no cancel outstanding");
                    return effects;
                }
                handle.cancel_pending = false;
                if matches!(
                    outcome,
                    Some(ResponseResult::Success | ResponseResult::InvalidAction)
                ) {
                    adopt_status(handle, session_status, &mut effects);
                    if handle.state == SessionState::Listening
                        || handle.state == SessionState::Recognizing
                    {
                        handle.state = SessionState::Idle;
                    }
                    effects.push(Effect::Commit(Commit::Finish {
                        discard_results: true,
                    }));
                } else {
                    effects.push(failure());
                }
                return effects;
            }

            if outcome != Some(ResponseResult::Success) {
                effects.push(failure());
                return effects;
            }
            adopt_status(handle, session_status, &mut effects);

            match method_kind {
                Some(Method::CreateSession) => {
                    if handle.state == SessionState::None {
                        handle.state = SessionState::Idle;
                    }
                    match config {
                        Some(config) => effects.push(Effect::Send(requests::set_parameters(config))),
                        None => effects.push(start_recognition(handle)),
                    }
                }
                Some(Method::SetParameters) => effects.push(start_recognition(handle)),
                Some(Method::StartRecognition) => {
                    if session_status.is_none() {
                        handle.state = SessionState::Listening;
                        effects.push(Effect::Notify(Notification::Listening));
                    }
                    match &handle.audio_source {
                        Some(source) => effects.push(Effect::StartStreaming(Arc::clone(source))),
                        None => log::warn!("⚠️ Recognition started without an audio source"),
                    }
                }
                _ => {}
            }
            effects
        }

        Inbound::Result {
            session_idle,
            outcome,
        } => {
            let in_recognition = matches!(
                handle.state,
                SessionState::Listening | SessionState::Recognizing
            );
            if !in_recognition {
                log::debug!("📭 Result received while session is {}", handle.state);
            }
            if session_idle {
                handle.state = SessionState::Idle;
            }

            match outcome {
                ResultOutcome::Canceled if in_recognition => {
                    handle.state = SessionState::Idle;
                    vec![Effect::Commit(Commit::Finish {
                        discard_results: true,
                    })]
                }
                ResultOutcome::Canceled => {
                    log::debug!("Ignoring CANCELED result while session is {}", handle.state);
                    Vec::new()
                }
                ResultOutcome::Final {
                    result,
                    last_segment,
                } => {
                    if last_segment {
                        handle.state = SessionState::Idle;
                    }
                    vec![
                        Effect::Notify(Notification::Result(result.clone())),
                        Effect::Commit(Commit::Result {
                            result,
                            last_segment,
                        }),
                    ]
                }
                ResultOutcome::Partial(partial) => {
                    vec![Effect::Notify(Notification::Partial(partial))]
                }
            }
        }

        Inbound::SpeechStart(time) => {
            if handle.state == SessionState::Listening {
                handle.state = SessionState::Recognizing;
            }
            vec![Effect::Notify(Notification::SpeechStart(time))]
        }
        Inbound::SpeechStop(time) => vec![Effect::Notify(Notification::SpeechStop(time))],
    }
}

fn adopt_status(
    handle: &mut RecognitionHandle,
    status: Option<SessionState>,
    effects: &mut Vec<Effect>,
) {
    if let Some(status) = status {
        handle.state = status;
        if status == SessionState::Listening {
            effects.push(Effect::Notify(Notification::Listening));
        }
    }
}

fn start_recognition(handle: &RecognitionHandle) -> Effect {
    match requests::start_recognition(handle.language_model.as_ref()) {
        Ok(frame) => Effect::Send(frame),
        Err(e) => Effect::Commit(Commit::Fail(e)),
    }
}

/// Record the outcome of a recognition. Only the first error of a
/// recognition is kept.
pub(crate) fn commit(handle: &mut RecognitionHandle, commit: Commit) {
    match commit {
        Commit::Result {
            result,
            last_segment,
        } => {
            handle.results.push(result);
            if last_segment {
                handle.finish_recognition();
            }
        }
        Commit::Fail(error) => {
            handle.error.get_or_insert(error);
            handle.finish_recognition();
        }
        Commit::Finish { discard_results } => {
            if discard_results {
                handle.results.clear();
            }
            handle.finish_recognition();
        }
    }
}
