use crate::audio::{InputAudioTranscription, TranscriptionModel, TurnDetection};

/// Session reconfiguration carried by `session.update`.
///
/// Only what the client actually controls is modelled; everything else
/// (instructions, voice, tools) is owned by the service or the relay.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Session {
    /// Configuration for turn detection. `Some(None)` is sent as `null`,
    /// which turns detection off; `None` leaves the service default.
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_detection: Option<Option<TurnDetection>>,

    /// Configuration for input audio transcription, omitted when disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<InputAudioTranscription>,
}

impl Session {
    pub fn new() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn turn_detection(&self) -> Option<Option<&TurnDetection>> {
        self.turn_detection.as_ref().map(Option::as_ref)
    }

    pub fn input_audio_transcription(&self) -> Option<&InputAudioTranscription> {
        self.input_audio_transcription.as_ref()
    }
}

pub struct SessionConfigurator {
    session: Session,
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            session: Session::default(),
        }
    }

    pub fn with_input_audio_transcription_enable(mut self, model: TranscriptionModel) -> Self {
        self.session.input_audio_transcription =
            Some(InputAudioTranscription::new().with_model(model));
        self
    }

    pub fn with_turn_detection_enable(mut self, turn_detection: TurnDetection) -> Self {
        self.session.turn_detection = Some(Some(turn_detection));
        self
    }

    pub fn with_turn_detection_disable(mut self) -> Self {
        self.session.turn_detection = Some(None);
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}
