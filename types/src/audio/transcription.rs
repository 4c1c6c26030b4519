use crate::audio::TranscriptionModel;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscription {
    /// The model to use for transcription, e.g. "gpt-4o-transcribe"
    model: TranscriptionModel,
}

impl Default for InputAudioTranscription {
    fn default() -> Self {
        Self {
            model: TranscriptionModel::Gpt4oTranscribe,
        }
    }
}

impl InputAudioTranscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: TranscriptionModel) -> Self {
        self.model = model;
        self
    }

    pub fn model(&self) -> &TranscriptionModel {
        &self.model
    }
}
