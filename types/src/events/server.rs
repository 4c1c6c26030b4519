mod error;

pub use error::ErrorDetails;

use crate::audio::Base64EncodedAudioBytes;
use crate::tools::ToolResult;

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Details about the error
    #[serde(default)]
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn error(&self) -> ErrorDetails {
        self.error.clone()
    }
}

/// `input_audio_buffer.cleared` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferClearedEvent {
    #[serde(default)]
    event_id: Option<String>,
}

impl InputAudioBufferClearedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferSpeechStartedEvent {
    #[serde(default)]
    event_id: Option<String>,

    /// Milliseconds since the session started when speech was detected
    #[serde(default)]
    audio_start_ms: Option<u32>,
    /// The ID of the user message item that will be created when speech stops
    #[serde(default)]
    item_id: Option<String>,
}

impl InputAudioBufferSpeechStartedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn audio_start_ms(&self) -> Option<u32> {
        self.audio_start_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `conversation.item.input_audio_transcription.completed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemInputAudioTranscriptionCompletedEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    content_index: Option<u32>,
    /// The transcribed text
    #[serde(default)]
    transcript: String,
}

impl ConversationItemInputAudioTranscriptionCompletedEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn content_index(&self) -> Option<u32> {
        self.content_index
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseDoneEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    response: Option<ResponseResource>,
}

impl ResponseDoneEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response(&self) -> Option<&ResponseResource> {
        self.response.as_ref()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    #[serde(default)]
    id: Option<String>,
    /// "completed", "cancelled", "failed" or "incomplete"
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl ResponseResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> u32 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u32 {
        self.output_tokens
    }
}

/// `response.audio_transcript.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDeltaEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    /// The transcript delta
    #[serde(default)]
    delta: String,
}

impl ResponseAudioTranscriptDeltaEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDeltaEvent {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    output_index: Option<u32>,
    #[serde(default)]
    content_index: Option<u32>,
    /// Base64-encoded PCM16 audio at the session rate
    delta: Base64EncodedAudioBytes,
}

impl ResponseAudioDeltaEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn output_index(&self) -> Option<u32> {
        self.output_index
    }

    pub fn content_index(&self) -> Option<u32> {
        self.content_index
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `extension.middle_tier_tool_response` event, emitted by the relay after
/// it ran a tool on the assistant's behalf.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExtensionMiddleTierToolResponseEvent {
    #[serde(default)]
    previous_item_id: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    /// JSON-encoded [`ToolResult`]
    tool_result: String,
}

impl ExtensionMiddleTierToolResponseEvent {
    pub fn previous_item_id(&self) -> Option<&str> {
        self.previous_item_id.as_deref()
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn tool_result(&self) -> serde_json::Result<ToolResult> {
        serde_json::from_str(&self.tool_result)
    }
}
