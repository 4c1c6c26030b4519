use crate::audio::Base64EncodedAudioBytes;
use crate::session::Session;

/// `session.update` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The session configuration to update
    session: Session,
}

impl SessionUpdateEvent {
    pub fn new(session: Session) -> Self {
        Self {
            event_id: None,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// `input_audio_buffer.append` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferAppendEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The audio data to append to the buffer
    audio: Base64EncodedAudioBytes,
}

impl InputAudioBufferAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self {
            event_id: None,
            audio,
        }
    }

    pub fn audio(&self) -> &Base64EncodedAudioBytes {
        &self.audio
    }
}

/// `input_audio_buffer.clear` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferClearEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

impl InputAudioBufferClearEvent {
    pub fn new() -> Self {
        Self { event_id: None }
    }
}

/// `input_text` event, injected text that bypasses the audio stream
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputTextEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    text: String,
}

impl InputTextEvent {
    pub fn new(text: &str) -> Self {
        Self {
            event_id: None,
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
