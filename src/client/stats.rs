/// Token usage reported by `response.done`, summed over the connection's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    responses: u32,
    total_tokens: u32,
    input_tokens: u32,
    output_tokens: u32,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, total: u32, input: u32, output: u32) {
        self.responses += 1;
        self.total_tokens += total;
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn responses(&self) -> u32 {
        self.responses
    }

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
