use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionModel {
    Whisper,
    Gpt4oTranscribe,
    Custom(String),
}

impl TranscriptionModel {
    pub fn as_str(&self) -> &str {
        match self {
            TranscriptionModel::Whisper => "whisper-1",
            TranscriptionModel::Gpt4oTranscribe => "gpt-4o-transcribe",
            TranscriptionModel::Custom(s) => s,
        }
    }
}

impl Serialize for TranscriptionModel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for TranscriptionModel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "whisper-1" => TranscriptionModel::Whisper,
            "gpt-4o-transcribe" => TranscriptionModel::Gpt4oTranscribe,
            _ => TranscriptionModel::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for TranscriptionModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TranscriptionModel::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}
