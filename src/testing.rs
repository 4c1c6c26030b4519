//! In-memory stand-ins for the devices, the recognizer and the session socket.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use realtime_voice_utils::AudioChunk;

use crate::capture::{ActiveInput, AudioInput, ChunkSink};
use crate::client::SessionApi;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::keyword::{AuthorizationToken, RecognitionEngine, RecognizerFactory};
use crate::playback::{AudioOutput, OutputContext};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartSession(SessionConfig),
    Audio(Vec<i16>),
    ClearInputBuffer,
    Text(String),
}

#[derive(Default)]
struct SessionState {
    commands: Vec<Command>,
    fail_start: bool,
}

#[derive(Clone, Default)]
pub struct FakeSession {
    state: Arc<Mutex<SessionState>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    fn record(&self, command: Command) {
        self.state.lock().unwrap().commands.push(command);
    }
}

#[async_trait]
impl SessionApi for FakeSession {
    async fn start_session(&mut self, config: &SessionConfig) -> Result<()> {
        if self.state.lock().unwrap().fail_start {
            return Err(Error::NotConnected);
        }
        self.record(Command::StartSession(config.clone()));
        Ok(())
    }

    async fn send_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        self.record(Command::Audio(chunk.samples().to_vec()));
        Ok(())
    }

    async fn clear_input_buffer(&mut self) -> Result<()> {
        self.record(Command::ClearInputBuffer);
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.record(Command::Text(text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct OutputState {
    opened: usize,
    live: usize,
    fail_open: bool,
    fail_writes: bool,
    /// Samples buffered in the newest live context.
    buffered: Vec<i16>,
    context_id: usize,
}

#[derive(Clone, Default)]
pub struct FakeOutput {
    state: Arc<Mutex<OutputState>>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().unwrap().live
    }

    pub fn written(&self) -> Vec<i16> {
        self.state.lock().unwrap().buffered.clone()
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }
}

impl AudioOutput for FakeOutput {
    fn open(&mut self, sample_rate: u32) -> anyhow::Result<Box<dyn OutputContext>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            anyhow::bail!("no output device");
        }
        state.opened += 1;
        state.live += 1;
        state.context_id = state.opened;
        state.buffered.clear();
        Ok(Box::new(FakeContext {
            id: state.opened,
            sample_rate,
            state: self.state.clone(),
        }))
    }
}

struct FakeContext {
    id: usize,
    sample_rate: u32,
    state: Arc<Mutex<OutputState>>,
}

impl OutputContext for FakeContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[i16]) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            anyhow::bail!("device glitch");
        }
        if state.context_id == self.id {
            state.buffered.extend_from_slice(samples);
        }
        Ok(())
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.live -= 1;
        if state.context_id == self.id {
            state.buffered.clear();
        }
    }
}

#[derive(Default)]
struct InputState {
    opened: usize,
    live: usize,
    fail_open: bool,
    sink: Option<ChunkSink>,
}

#[derive(Clone, Default)]
pub struct FakeInput {
    state: Arc<Mutex<InputState>>,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn live_streams(&self) -> usize {
        self.state.lock().unwrap().live
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    /// Delivers a chunk as the live stream would.
    pub fn emit(&self, chunk: AudioChunk) {
        if let Some(sink) = self.state.lock().unwrap().sink.as_mut() {
            sink(chunk);
        }
    }
}

impl AudioInput for FakeInput {
    fn open(&mut self, sink: ChunkSink) -> anyhow::Result<Box<dyn ActiveInput>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            anyhow::bail!("permission denied");
        }
        state.opened += 1;
        state.live += 1;
        state.sink = Some(sink);
        Ok(Box::new(FakeStream {
            state: self.state.clone(),
        }))
    }
}

struct FakeStream {
    state: Arc<Mutex<InputState>>,
}

impl ActiveInput for FakeStream {
    fn close(self: Box<Self>) {
        let mut state = self.state.lock().unwrap();
        state.live -= 1;
        state.sink = None;
    }
}

#[derive(Default)]
struct RecognizerState {
    builds: usize,
    fail_build: bool,
    last_token: Option<AuthorizationToken>,
    last_language: Option<String>,
    results: Option<mpsc::UnboundedSender<String>>,
}

#[derive(Clone, Default)]
pub struct FakeRecognizer {
    state: Arc<Mutex<RecognizerState>>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builds(&self) -> usize {
        self.state.lock().unwrap().builds
    }

    pub fn last_token(&self) -> Option<AuthorizationToken> {
        self.state.lock().unwrap().last_token.clone()
    }

    pub fn last_language(&self) -> Option<String> {
        self.state.lock().unwrap().last_language.clone()
    }

    pub fn fail_build(&self, fail: bool) {
        self.state.lock().unwrap().fail_build = fail;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().results.is_some()
    }

    /// Reports an utterance if recognition is running.
    pub fn say(&self, text: &str) {
        if let Some(results) = &self.state.lock().unwrap().results {
            let _ = results.send(text.to_string());
        }
    }
}

impl RecognizerFactory for FakeRecognizer {
    fn build(&mut self, token: &AuthorizationToken, language: &str) -> anyhow::Result<Box<dyn RecognitionEngine>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_build {
            anyhow::bail!("no microphone for recognizer");
        }
        state.builds += 1;
        state.last_token = Some(token.clone());
        state.last_language = Some(language.to_string());
        Ok(Box::new(FakeEngine {
            state: self.state.clone(),
        }))
    }
}

struct FakeEngine {
    state: Arc<Mutex<RecognizerState>>,
}

#[async_trait]
impl RecognitionEngine for FakeEngine {
    async fn start_continuous(&mut self, results: mpsc::UnboundedSender<String>) -> anyhow::Result<()> {
        self.state.lock().unwrap().results = Some(results);
        Ok(())
    }

    async fn stop_continuous(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().results = None;
        Ok(())
    }
}
