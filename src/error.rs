use realtime_voice_utils::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("audio output unavailable: {0}")]
    PlaybackUnavailable(String),
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),
    #[error("keyword recognizer authorization unavailable: {0}")]
    AuthUnavailable(String),
    #[error("session client is not connected")]
    NotConnected,
    #[error("failed to encode command: {0}")]
    Json(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
