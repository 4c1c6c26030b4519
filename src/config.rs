//! Configuration for the voice client.
//!
//! Everything is resolved once, either through [`Config::builder`] or from the
//! environment with [`Config::from_env`], and handed to the components at
//! construction time.

use std::str::FromStr;

use realtime_voice_types::audio::{Eagerness, TranscriptionModel, TurnDetection, VadTurnDetection};
use realtime_voice_types::Session;
use secrecy::SecretString;

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8765/realtime";
pub const DEFAULT_TOKEN_URL: &str = "http://localhost:8765/speech/token";
pub const DEFAULT_ACTIVATION_KEYWORD: &str = "assistant";
pub const DEFAULT_SPEECH_LANGUAGE: &str = "en-US";
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

/// Where the session socket connects to.
#[derive(Debug)]
pub enum Endpoint {
    /// A relay that holds the service credentials itself.
    Relay(String),
    /// The service endpoint, authenticated with an api key.
    Direct {
        endpoint: String,
        api_key: SecretString,
        deployment: String,
    },
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Relay(DEFAULT_RELAY_URL.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDetectionMode {
    ServerVad,
    SemanticVad,
    /// Sent as `"turn_detection": null`, not as `{"type": "none"}`.
    None,
}

impl FromStr for TurnDetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server_vad" => Ok(TurnDetectionMode::ServerVad),
            "semantic_vad" => Ok(TurnDetectionMode::SemanticVad),
            "none" => Ok(TurnDetectionMode::None),
            other => Err(format!("unknown turn detection mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnDetectionSettings {
    pub mode: TurnDetectionMode,
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
    pub interrupt_response: Option<bool>,
    pub eagerness: Option<Eagerness>,
}

impl TurnDetectionSettings {
    pub fn new(mode: TurnDetectionMode) -> Self {
        Self {
            mode,
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
            interrupt_response: None,
            eagerness: None,
        }
    }

    fn to_turn_detection(&self) -> Option<TurnDetection> {
        let mut params = VadTurnDetection::default();
        if let Some(threshold) = self.threshold {
            params = params.with_threshold(threshold);
        }
        if let Some(ms) = self.prefix_padding_ms {
            params = params.with_prefix_padding_ms(ms);
        }
        if let Some(ms) = self.silence_duration_ms {
            params = params.with_silence_duration_ms(ms);
        }
        if let Some(interrupt) = self.interrupt_response {
            params = params.with_interrupt_response(interrupt);
        }
        if let Some(eagerness) = self.eagerness {
            params = params.with_eagerness(eagerness);
        }
        match self.mode {
            TurnDetectionMode::ServerVad => Some(TurnDetection::ServerVad(params)),
            TurnDetectionMode::SemanticVad => Some(TurnDetection::SemanticVad(params)),
            TurnDetectionMode::None => None,
        }
    }
}

/// What `session.update` carries when a conversation starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionConfig {
    /// `None` leaves turn detection to the service defaults.
    pub turn_detection: Option<TurnDetectionSettings>,
    pub input_audio_transcription: bool,
}

impl SessionConfig {
    pub fn to_session(&self) -> Session {
        let mut session = Session::new();
        if let Some(settings) = &self.turn_detection {
            session = match settings.to_turn_detection() {
                Some(detection) => session.with_turn_detection_enable(detection),
                None => session.with_turn_detection_disable(),
            };
        }
        if self.input_audio_transcription {
            session = session.with_input_audio_transcription_enable(TranscriptionModel::Gpt4oTranscribe);
        }
        session.build()
    }
}

#[derive(Debug)]
pub struct Config {
    endpoint: Endpoint,
    capacity: usize,
    session: SessionConfig,
    activation_keyword: String,
    speech_token_url: String,
    speech_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            capacity: DEFAULT_CAPACITY,
            session: SessionConfig::default(),
            activation_keyword: DEFAULT_ACTIVATION_KEYWORD.to_string(),
            speech_token_url: DEFAULT_TOKEN_URL.to_string(),
            speech_language: DEFAULT_SPEECH_LANGUAGE.to_string(),
        }
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_relay_url(mut self, url: &str) -> Self {
        self.config.endpoint = Endpoint::Relay(url.to_string());
        self
    }

    pub fn with_direct_endpoint(mut self, endpoint: &str, api_key: &str, deployment: &str) -> Self {
        self.config.endpoint = Endpoint::Direct {
            endpoint: endpoint.to_string(),
            api_key: SecretString::from(api_key.to_string()),
            deployment: deployment.to_string(),
        };
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn with_activation_keyword(mut self, keyword: &str) -> Self {
        self.config.activation_keyword = keyword.to_string();
        self
    }

    pub fn with_speech_token_url(mut self, url: &str) -> Self {
        self.config.speech_token_url = url.to_string();
        self
    }

    pub fn with_speech_language(mut self, language: &str) -> Self {
        self.config.speech_language = language.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads configuration from the process environment, reading `.env` first.
    ///
    // *   `REALTIME_ENDPOINT`, `REALTIME_API_KEY`, `REALTIME_DEPLOYMENT`: connect to the service directly.
    //     When `REALTIME_ENDPOINT` is unset the client goes through `REALTIME_RELAY_URL`.
    // *   `TURN_DETECTION_*`: session turn detection; omitted parameters keep the service defaults.
    // *   `ENABLE_INPUT_AUDIO_TRANSCRIPTION`: "true" to transcribe user speech.
    // *   `ACTIVATION_KEYWORD`, `SPEECH_TOKEN_URL`, `SPEECH_LANGUAGE`: keyword detector.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut builder = Config::builder();

        if let Some(endpoint) = var("REALTIME_ENDPOINT") {
            let api_key = var("REALTIME_API_KEY")
                .ok_or_else(|| ConfigError::MissingVar("REALTIME_API_KEY".to_string()))?;
            let deployment = var("REALTIME_DEPLOYMENT")
                .ok_or_else(|| ConfigError::MissingVar("REALTIME_DEPLOYMENT".to_string()))?;
            builder = builder.with_direct_endpoint(&endpoint, &api_key, &deployment);
        } else if let Some(url) = var("REALTIME_RELAY_URL") {
            builder = builder.with_relay_url(&url);
        }

        let mode = parse::<TurnDetectionMode>(&var, "TURN_DETECTION_TYPE")?;
        let threshold = parse::<f32>(&var, "TURN_DETECTION_THRESHOLD")?;
        let prefix_padding_ms = parse::<u32>(&var, "TURN_DETECTION_PREFIX_PADDING_MS")?;
        let silence_duration_ms = parse::<u32>(&var, "TURN_DETECTION_SILENCE_DURATION_MS")?;
        let interrupt_response = var("TURN_DETECTION_INTERRUPT_RESPONSE").map(|v| v.trim() == "true");
        let eagerness = parse::<Eagerness>(&var, "TURN_DETECTION_EAGERNESS")?;

        let has_parameters = threshold.is_some()
            || prefix_padding_ms.is_some()
            || silence_duration_ms.is_some()
            || interrupt_response.is_some()
            || eagerness.is_some();
        let turn_detection = match mode {
            Some(mode) => Some(mode),
            None if has_parameters => Some(TurnDetectionMode::ServerVad),
            None => None,
        }
        .map(|mode| TurnDetectionSettings {
            mode,
            threshold,
            prefix_padding_ms,
            silence_duration_ms,
            interrupt_response,
            eagerness,
        });

        builder = builder.with_session(SessionConfig {
            turn_detection,
            input_audio_transcription: var("ENABLE_INPUT_AUDIO_TRANSCRIPTION")
                .is_some_and(|v| v.trim() == "true"),
        });

        if let Some(keyword) = var("ACTIVATION_KEYWORD") {
            builder = builder.with_activation_keyword(&keyword);
        }
        if let Some(url) = var("SPEECH_TOKEN_URL") {
            builder = builder.with_speech_token_url(&url);
        }
        if let Some(language) = var("SPEECH_LANGUAGE") {
            builder = builder.with_speech_language(&language);
        }

        Ok(builder.build())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn activation_keyword(&self) -> &str {
        &self.activation_keyword
    }

    pub fn speech_token_url(&self) -> &str {
        &self.speech_token_url
    }

    pub fn speech_language(&self) -> &str {
        &self.speech_language
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: name.to_string(),
                value,
            }),
    }
}
