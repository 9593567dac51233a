use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;
use url::Url;

use crate::error::RecognitionError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<ConfigError> for RecognitionError {
    fn from(err: ConfigError) -> Self {
        RecognitionError::Config(err.to_string())
    }
}

/// Recognition parameters sent in SET_PARAMETERS.
///
/// Zero and `false` mean "server default" and are not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub confidence_threshold: u32,
    pub max_sentences: u32,
    pub no_input_timeout_ms: u32,
    pub recognition_timeout_seconds: u32,
    pub no_input_timeout_enabled: bool,
    pub recognition_timeout_enabled: bool,
    pub infer_age_enabled: bool,
    pub infer_emotion_enabled: bool,
    pub infer_gender_enabled: bool,
    pub head_margin_ms: u32,
    pub tail_margin_ms: u32,
    pub wait_end_ms: u32,
    pub continuous_mode: bool,
    pub max_segment_duration: u32,
    /// Defer the input timers until `start_input_timers()` is called
    pub start_input_timers: bool,
    pub endpointer_auto_level_len: u32,
    /// 0 = server default, 1 = automatic level, 2 = fixed threshold
    pub endpointer_level_mode: u32,
    pub endpointer_level_threshold: u32,
    pub verify_buffer_utterance: bool,
    pub account_tag: String,
    pub channel_identifier: String,
    pub media_type: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0,
            max_sentences: 1,
            no_input_timeout_ms: 0,
            recognition_timeout_seconds: 0,
            no_input_timeout_enabled: false,
            recognition_timeout_enabled: false,
            infer_age_enabled: false,
            infer_emotion_enabled: false,
            infer_gender_enabled: false,
            head_margin_ms: 0,
            tail_margin_ms: 0,
            wait_end_ms: 0,
            continuous_mode: false,
            max_segment_duration: 0,
            start_input_timers: false,
            endpointer_auto_level_len: 0,
            endpointer_level_mode: 0,
            endpointer_level_threshold: 0,
            verify_buffer_utterance: false,
            account_tag: String::new(),
            channel_identifier: String::new(),
            media_type: String::new(),
        }
    }
}

impl RecognitionConfig {
    /// Defaults overridden by whatever is set in the environment (or `.env`)
    pub fn from_env() -> Self {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.update_from_env(false);
        config
    }

    /// Overwrite fields from environment variables. With `reset_unset`,
    /// fields whose variable is absent go back to zero/false/empty.
    ///
    /// Booleans are true only for a case-insensitive `TRUE`; integers that
    /// do not parse become 0.
    pub fn update_from_env(&mut self, reset_unset: bool) {
        let int = |name: &str, field: &mut u32| {
            if let Some(value) = read_env(name, reset_unset) {
                *field = value.map_or(0, |v| {
                    v.trim().parse().unwrap_or_else(|_| {
                        log::warn!("⚠️ {}={:?} is not a number, using 0", name, v);
                        0
                    })
                });
            }
        };
        let flag = |name: &str, field: &mut bool| {
            if let Some(value) = read_env(name, reset_unset) {
                *field = value.is_some_and(|v| v.eq_ignore_ascii_case("true"));
            }
        };
        let text = |name: &str, field: &mut String| {
            if let Some(value) = read_env(name, reset_unset) {
                *field = value.unwrap_or_default();
            }
        };

        int("CONFIDENCE_THRESHOLD", &mut self.confidence_threshold);
        int("MAX_SENTENCES", &mut self.max_sentences);
        int("NO_INPUT_TIMEOUT_MILLISECONDS", &mut self.no_input_timeout_ms);
        int("RECOG_TIMEOUT_SECONDS", &mut self.recognition_timeout_seconds);
        flag("NO_INPUT_TIMEOUT_ENABLED", &mut self.no_input_timeout_enabled);
        flag("RECOG_TIMEOUT_ENABLED", &mut self.recognition_timeout_enabled);
        flag("INFER_AGE_ENABLED", &mut self.infer_age_enabled);
        flag("INFER_EMOTION_ENABLED", &mut self.infer_emotion_enabled);
        flag("INFER_GENDER_ENABLED", &mut self.infer_gender_enabled);
        int("HEAD_MARGIN_MILLISECONDS", &mut self.head_margin_ms);
        int("TAIL_MARGIN_MILLISECONDS", &mut self.tail_margin_ms);
        int("WAIT_END_MILLISECONDS", &mut self.wait_end_ms);
        flag("CONTINUOUS_MODE", &mut self.continuous_mode);
        int("MAX_SEGMENT_DURATION", &mut self.max_segment_duration);
        flag("START_INPUT_TIMERS", &mut self.start_input_timers);
        int("ENDPOINTER_AUTO_LEVEL_LEN", &mut self.endpointer_auto_level_len);
        int("ENDPOINTER_LEVEL_MODE", &mut self.endpointer_level_mode);
        int("ENDPOINTER_LEVEL_THRESHOLD", &mut self.endpointer_level_threshold);
        flag("VERIFY_BUFFER_UTTERANCE", &mut self.verify_buffer_utterance);
        text("ACCOUNT_TAG", &mut self.account_tag);
        text("CHANNEL_IDENTIFIER", &mut self.channel_identifier);
        text("MEDIA_TYPE", &mut self.media_type);
    }

    /// SET_PARAMETERS headers for every non-default field
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        let mut number = |key: &'static str, value: u32| {
            if value != 0 {
                params.push((key, value.to_string()));
            }
        };

        number("decoder.confidenceThreshold", self.confidence_threshold);
        number("decoder.maxSentences", self.max_sentences);
        number("endpointer.headMargin", self.head_margin_ms);
        number("endpointer.tailMargin", self.tail_margin_ms);
        number("endpointer.waitEnd", self.wait_end_ms);
        number("endpointer.maxSegmentDuration", self.max_segment_duration);
        number("endpointer.levelMode", self.endpointer_level_mode);
        match self.endpointer_level_mode {
            1 => number("endpointer.autoLevelLen", self.endpointer_auto_level_len),
            2 => number("endpointer.levelThreshold", self.endpointer_level_threshold),
            _ => {}
        }

        if self.no_input_timeout_enabled {
            params.push(("noInputTimeout.enabled", "1".to_string()));
            if self.no_input_timeout_ms != 0 {
                params.push(("noInputTimeout.value", self.no_input_timeout_ms.to_string()));
            }
        }
        if self.recognition_timeout_enabled {
            params.push(("recognitionTimeout.enabled", "1".to_string()));
            if self.recognition_timeout_seconds != 0 {
                params.push((
                    "recognitionTimeout.value",
                    self.recognition_timeout_seconds.to_string(),
                ));
            }
        }
        if self.start_input_timers {
            params.push(("decoder.startInputTimers", "1".to_string()));
        }

        for (key, enabled) in [
            ("decoder.continuousMode", self.continuous_mode),
            ("Infer-age-enabled", self.infer_age_enabled),
            ("Infer-emotion-enabled", self.infer_emotion_enabled),
            ("Infer-gender-enabled", self.infer_gender_enabled),
            ("Ver-Buffer-Utterance", self.verify_buffer_utterance),
        ] {
            if enabled {
                params.push((key, "true".to_string()));
            }
        }

        for (key, value) in [
            ("licenseManager.accountTag", &self.account_tag),
            ("Channel-Identifier", &self.channel_identifier),
            ("Media-Type", &self.media_type),
        ] {
            if !value.is_empty() {
                params.push((key, value.clone()));
            }
        }

        params
    }
}

/// `Some(Some(v))` when set, `Some(None)` when unset and should be reset,
/// `None` when unset and should be left alone
fn read_env(name: &str, reset_unset: bool) -> Option<Option<String>> {
    match env::var(name) {
        Ok(value) => Some(Some(value)),
        Err(_) if reset_unset => Some(None),
        Err(_) => None,
    }
}

/// How the server reports segment boundaries in RECOGNITION_RESULT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerProtocol {
    /// `final_result` and `last_segment` are read from the body when present
    #[default]
    Current,
    /// Older servers: a result is final iff RECOGNIZED and always the last
    /// segment
    Legacy,
}

/// HTTP Basic credentials for the WebSocket handshake
#[derive(Debug)]
pub struct Credentials {
    pub user: String,
    pub password: SecretBox<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: SecretBox::new(Box::new(password.into())),
        }
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        let token = format!("{}:{}", self.user, self.password.expose_secret());
        format!("Basic {}", STANDARD.encode(token))
    }
}

/// Everything a `SpeechRecognizer` needs besides its transport
#[derive(Debug)]
pub struct RecognizerSettings {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    pub credentials: Option<Credentials>,
    pub user_agent: String,
    /// Upper bound for `wait_result`, counted from `recognize`
    pub max_wait: Duration,
    /// Open the connection lazily on the first `recognize`
    pub connect_on_recognize: bool,
    /// Close the connection after every completed recognition
    pub auto_close: bool,
    pub connect_timeout: Duration,
    /// Pause of the streaming task when the audio source has nothing new
    pub audio_poll_interval: Duration,
    pub server_protocol: ServerProtocol,
    /// Sent as SET_PARAMETERS after every CREATE_SESSION when present
    pub config: Option<RecognitionConfig>,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: None,
            user_agent: "ASR Client".to_string(),
            max_wait: Duration::from_secs(30),
            connect_on_recognize: false,
            auto_close: false,
            connect_timeout: Duration::from_secs(10),
            audio_poll_interval: Duration::from_millis(100),
            server_protocol: ServerProtocol::Current,
            config: None,
        }
    }
}

impl RecognizerSettings {
    /// Load endpoint and credentials from `ASR_URL`, `ASR_USER` and
    /// `ASR_PASSWORD`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let url = env::var("ASR_URL").map_err(|_| ConfigError::MissingEnvVar("ASR_URL".into()))?;
        let credentials = match (env::var("ASR_USER"), env::var("ASR_PASSWORD")) {
            (Ok(user), Ok(password)) if !user.is_empty() => Some(Credentials::new(user, password)),
            _ => None,
        };

        let settings = Self {
            url,
            credentials,
            ..Default::default()
        };
        settings.server_url()?;
        Ok(settings)
    }

    /// Parsed endpoint; only WebSocket schemes are accepted
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme '{}', expected ws or wss", scheme),
            }),
        }
    }
}
