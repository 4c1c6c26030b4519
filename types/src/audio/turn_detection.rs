use std::str::FromStr;

/// Remote voice-activity segmentation policy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad(VadTurnDetection),
    #[serde(rename = "semantic_vad")]
    SemanticVad(VadTurnDetection),
}

/// Every parameter is optional; unset ones are left out of the payload so the
/// service applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VadTurnDetection {
    /// Activation threshold for VAD (0.0 to 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f32>,

    /// Amount of audio to include before speech starts, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix_padding_ms: Option<u32>,

    /// Duration of silence to detect speech stop, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    silence_duration_ms: Option<u32>,

    /// Whether user speech interrupts an in-progress response
    #[serde(skip_serializing_if = "Option::is_none")]
    interrupt_response: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    eagerness: Option<Eagerness>,
}

impl VadTurnDetection {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_prefix_padding_ms(mut self, prefix_padding_ms: u32) -> Self {
        self.prefix_padding_ms = Some(prefix_padding_ms);
        self
    }

    pub fn with_silence_duration_ms(mut self, silence_duration_ms: u32) -> Self {
        self.silence_duration_ms = Some(silence_duration_ms);
        self
    }

    pub fn with_interrupt_response(mut self, interrupt_response: bool) -> Self {
        self.interrupt_response = Some(interrupt_response);
        self
    }

    pub fn with_eagerness(mut self, eagerness: Eagerness) -> Self {
        self.eagerness = Some(eagerness);
        self
    }

    pub fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    pub fn prefix_padding_ms(&self) -> Option<u32> {
        self.prefix_padding_ms
    }

    pub fn silence_duration_ms(&self) -> Option<u32> {
        self.silence_duration_ms
    }

    pub fn interrupt_response(&self) -> Option<bool> {
        self.interrupt_response
    }

    pub fn eagerness(&self) -> Option<Eagerness> {
        self.eagerness
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eagerness {
    Low,
    Medium,
    High,
    Auto,
}

impl FromStr for Eagerness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Eagerness::Low),
            "medium" => Ok(Eagerness::Medium),
            "high" => Ok(Eagerness::High),
            "auto" => Ok(Eagerness::Auto),
            other => Err(format!("unknown eagerness: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_parameters_are_omitted() {
        let detection = TurnDetection::ServerVad(VadTurnDetection::default().with_threshold(0.6));
        let json = serde_json::to_string(&detection).unwrap();
        assert_eq!(json, r#"{"type":"server_vad","threshold":0.6}"#);
    }

    #[test]
    fn semantic_vad_carries_eagerness() {
        let detection = TurnDetection::SemanticVad(
            VadTurnDetection::default()
                .with_eagerness(Eagerness::High)
                .with_interrupt_response(false),
        );
        let json = serde_json::to_value(&detection).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "semantic_vad", "interrupt_response": false, "eagerness": "high"})
        );
    }

    #[test]
    fn parses_eagerness_case_insensitively() {
        assert_eq!("Medium".parse::<Eagerness>(), Ok(Eagerness::Medium));
        assert!("eager".parse::<Eagerness>().is_err());
    }
}
