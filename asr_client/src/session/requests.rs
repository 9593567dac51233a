//! Outbound frames.

use asr_protocol::{content_type, header, Frame, Method};

use crate::config::RecognitionConfig;
use crate::error::RecognitionError;
use crate::language_model::LanguageModelList;

pub(crate) fn create_session(user_agent: &str) -> Frame {
    Frame::request(Method::CreateSession).with_header(header::USER_AGENT, user_agent)
}

pub(crate) fn set_parameters(config: &RecognitionConfig) -> Frame {
    let mut frame = Frame::request(Method::SetParameters);
    for (key, value) in config.parameters() {
        frame.set_header(key, value);
    }
    frame
}

pub(crate) fn start_recognition(
    language_model: Option<&LanguageModelList>,
) -> Result<Frame, RecognitionError> {
    let mut frame = Frame::request(Method::StartRecognition).with_header(header::ACCEPT, content_type::JSON);
    language_model
        .ok_or(RecognitionError::InvalidLanguageModel)?
        .apply(&mut frame)?;
    Ok(frame)
}

pub(crate) fn send_audio(chunk: Vec<u8>, last_packet: bool) -> Frame {
    Frame::request(Method::SendAudio)
        .with_header(header::CONTENT_TYPE, content_type::OCTET_STREAM)
        .with_header(header::LAST_PACKET, last_packet.to_string())
        .with_body(chunk)
}

pub(crate) fn cancel_recognition() -> Frame {
    Frame::request(Method::CancelRecognition)
}

pub(crate) fn start_input_timers() -> Frame {
    Frame::request(Method::StartInputTimers)
}

pub(crate) fn release_session() -> Frame {
    Frame::request(Method::ReleaseSession)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(frame: &Frame) -> String {
        String::from_utf8(frame.to_bytes()).unwrap()
    }

    #[test]
    fn test_create_session() {
        assert_eq!(
            text(&create_session("ASR Client")),
            "ASR 2.4 CREATE_SESSION\r\nUser-Agent:ASR Client\r\n"
        );
    }

    #[test]
    fn test_set_parameters() {
        let config = RecognitionConfig {
            recognition_timeout_enabled: true,
            recognition_timeout_seconds: 30,
            infer_age_enabled: true,
            channel_identifier: "my-channel-1".into(),
            ..Default::default()
        };
        assert_eq!(
            text(&set_parameters(&config)),
            "ASR 2.4 SET_PARAMETERS\r\n\
             Channel-Identifier:my-channel-1\r\n\
             Infer-age-enabled:true\r\n\
             decoder.maxSentences:1\r\n\
             recognitionTimeout.enabled:1\r\n\
             recognitionTimeout.value:30\r\n"
        );
    }

    #[test]
    fn test_start_recognition() {
        let lm = LanguageModelList::from_uri("builtin:slm/general");
        assert_eq!(
            text(&start_recognition(Some(&lm)).unwrap()),
            "ASR 2.4 START_RECOGNITION\r\n\
             Accept:application/json\r\n\
             Content-Length:19\r\n\
             Content-Type:text/uri-list\r\n\
             \r\n\
             builtin:slm/general"
        );
        assert_eq!(
            start_recognition(None),
            Err(RecognitionError::InvalidLanguageModel)
        );
    }

    #[test]
    fn test_send_audio() {
        let frame = send_audio(vec![1, 2, 3, 4], false);
        assert_eq!(frame.header("LastPacket"), Some("false"));
        assert_eq!(frame.header("Content-Length"), Some("4"));
        assert_eq!(frame.header("Content-Type"), Some("application/octet-stream"));

        let last = send_audio(Vec::new(), true);
        assert_eq!(last.header("LastPacket"), Some("true"));
        assert_eq!(last.header("Content-Length"), Some("0"));
    }
}
