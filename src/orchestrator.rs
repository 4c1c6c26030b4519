//! The wake word / conversation state machine.
//!
//! Every external source (UI, capture device, keyword recognizer, session
//! socket) pushes an [`Input`] onto one ordered queue, and [`Orchestrator::run`]
//! handles them one at a time. The orchestrator owns every component, so no
//! locking is involved; completions from a stream that has since been replaced
//! are recognised by their generation number and dropped.

use realtime_voice_types::events::server::ErrorDetails;
use realtime_voice_types::{GroundingFile, ServerEvent};
use realtime_voice_utils::audio::decode_base64_pcm16;
use realtime_voice_utils::{AudioChunk, SESSION_SAMPLE_RATE};
use tokio::sync::{broadcast, mpsc};

use crate::capture::CaptureSource;
use crate::client::{SessionApi, ServerRx};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::keyword::KeywordDetector;
use crate::playback::PlaybackQueue;

const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    Disabled,
    WakeWordListening,
    Conversing,
}

#[derive(Debug)]
pub enum Input {
    AppStart,
    AppStop,
    ManualStart,
    ManualStop,
    /// Manual start or stop, whichever applies.
    ToggleConversation,
    SendText(String),
    SelectGroundingFile(Option<usize>),
    KeywordDetected { generation: u64 },
    CapturedAudio { generation: u64, chunk: AudioChunk },
    Server(ServerEvent),
    Shutdown,
}

/// What the UI layer gets to see.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StateChanged(ListeningState),
    GroundingFilesChanged {
        files: Vec<GroundingFile>,
        selected: Option<GroundingFile>,
    },
    AssistantTranscriptDelta(String),
    UserTranscript(String),
    ResponseDone,
    ServerError(ErrorDetails),
    Failure(String),
    ConnectionClosed,
}

/// Activation and deactivation cues, already at the session rate.
#[derive(Debug, Clone, Default)]
pub struct Tones {
    pub activation: Option<AudioChunk>,
    pub deactivation: Option<AudioChunk>,
}

pub struct Components {
    pub session: Box<dyn SessionApi>,
    pub playback: PlaybackQueue,
    pub capture: CaptureSource,
    pub keyword: KeywordDetector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deactivation {
    Manual,
    /// The service already cleared its input buffer.
    Remote,
}

pub struct Orchestrator {
    state: ListeningState,
    session: Box<dyn SessionApi>,
    session_config: SessionConfig,
    playback: PlaybackQueue,
    capture: CaptureSource,
    keyword: KeywordDetector,
    tones: Tones,
    inputs: mpsc::Sender<Input>,
    notifications: broadcast::Sender<Notification>,
    grounding_files: Vec<GroundingFile>,
    selected_file: Option<GroundingFile>,
    /// Clears we sent whose `input_audio_buffer.cleared` has not come back yet.
    pending_clears: usize,
    /// Response whose audio is currently being played.
    current_response: Option<String>,
    /// Response the user talked over; its remaining audio is dropped.
    interrupted_response: Option<String>,
}

impl Orchestrator {
    /// `inputs` must feed the queue passed to [`Orchestrator::run`]; capture
    /// chunks and keyword detections are posted there.
    pub fn new(
        components: Components,
        session_config: SessionConfig,
        tones: Tones,
        inputs: mpsc::Sender<Input>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            state: ListeningState::Disabled,
            session: components.session,
            session_config,
            playback: components.playback,
            capture: components.capture,
            keyword: components.keyword,
            tones,
            inputs,
            notifications,
            grounding_files: Vec::new(),
            selected_file: None,
            pending_clears: 0,
            current_response: None,
            interrupted_response: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn state(&self) -> ListeningState {
        self.state
    }

    pub fn grounding_files(&self) -> &[GroundingFile] {
        &self.grounding_files
    }

    pub fn selected_file(&self) -> Option<&GroundingFile> {
        self.selected_file.as_ref()
    }

    /// Handles inputs in arrival order until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<Input>) {
        while let Some(input) = inputs.recv().await {
            let shutdown = matches!(input, Input::Shutdown);
            self.handle(input).await;
            if shutdown {
                break;
            }
        }
        self.app_stop().await;
        tracing::info!("orchestrator stopped");
    }

    pub async fn handle(&mut self, input: Input) {
        let result = match input {
            Input::AppStart => self.app_start().await,
            Input::AppStop | Input::Shutdown => {
                self.app_stop().await;
                Ok(())
            }
            Input::ManualStart => self.start_conversation().await,
            Input::ManualStop => {
                self.end_conversation(Deactivation::Manual).await;
                Ok(())
            }
            Input::ToggleConversation => match self.state {
                ListeningState::Conversing => {
                    self.end_conversation(Deactivation::Manual).await;
                    Ok(())
                }
                _ => self.start_conversation().await,
            },
            Input::SendText(text) => self.session.send_text(&text).await,
            Input::SelectGroundingFile(index) => {
                self.selected_file = index.and_then(|i| self.grounding_files.get(i).cloned());
                self.notify_grounding_files();
                Ok(())
            }
            Input::KeywordDetected { generation } => {
                if self.state == ListeningState::WakeWordListening
                    && generation == self.keyword.generation()
                {
                    self.start_conversation().await
                } else {
                    tracing::debug!("ignoring stale keyword detection, generation={}", generation);
                    Ok(())
                }
            }
            Input::CapturedAudio { generation, chunk } => self.on_captured_audio(generation, chunk).await,
            Input::Server(event) => self.on_server_event(event).await,
        };

        if let Err(e) = result {
            tracing::error!("{}", e);
            self.notify(Notification::Failure(e.to_string()));
        }
    }

    async fn app_start(&mut self) -> Result<()> {
        if self.state != ListeningState::Disabled {
            tracing::debug!("app already started");
            return Ok(());
        }
        self.keyword.reset().await?;
        self.start_keyword().await?;
        self.set_state(ListeningState::WakeWordListening);
        Ok(())
    }

    async fn app_stop(&mut self) {
        if self.state == ListeningState::Disabled {
            return;
        }
        if self.state == ListeningState::Conversing {
            self.playback.stop();
            self.capture.stop();
            self.clear_input_buffer().await;
            self.clear_grounding_files();
        }
        self.keyword.stop().await;
        self.set_state(ListeningState::Disabled);
    }

    async fn start_conversation(&mut self) -> Result<()> {
        if self.state != ListeningState::WakeWordListening {
            tracing::debug!("cannot start a conversation while {:?}", self.state);
            return Ok(());
        }

        self.keyword.stop().await;
        if let Err(e) = self.session.start_session(&self.session_config).await {
            self.resume_keyword().await;
            return Err(e);
        }
        let inputs = self.inputs.clone();
        let started = self.capture.start(move |generation, chunk| {
            if let Err(e) = inputs.try_send(Input::CapturedAudio { generation, chunk }) {
                tracing::warn!("dropping captured chunk: {}", e);
            }
        });
        if let Err(e) = started {
            self.resume_keyword().await;
            return Err(e);
        }
        self.set_state(ListeningState::Conversing);

        if let Err(e) = self.playback.reset() {
            tracing::error!("{}", e);
            self.notify(Notification::Failure(e.to_string()));
        }
        if let Some(tone) = self.tones.activation.clone() {
            self.playback.enqueue(tone);
        }
        Ok(())
    }

    async fn end_conversation(&mut self, deactivation: Deactivation) {
        if self.state != ListeningState::Conversing {
            tracing::debug!("no conversation to end while {:?}", self.state);
            return;
        }

        self.playback.stop();
        self.capture.stop();
        if deactivation == Deactivation::Manual {
            self.clear_input_buffer().await;
        }
        self.current_response = None;
        self.interrupted_response = None;
        if let Some(tone) = self.tones.deactivation.clone() {
            self.playback.enqueue(tone);
        }
        self.clear_grounding_files();
        self.set_state(ListeningState::WakeWordListening);
        self.resume_keyword().await;
    }

    async fn clear_input_buffer(&mut self) {
        match self.session.clear_input_buffer().await {
            Ok(()) => self.pending_clears += 1,
            Err(e) => tracing::warn!("failed to clear input buffer: {}", e),
        }
    }

    async fn resume_keyword(&mut self) {
        if let Err(e) = self.start_keyword().await {
            tracing::error!("failed to resume keyword listening: {}", e);
            self.notify(Notification::Failure(e.to_string()));
        }
    }

    async fn start_keyword(&mut self) -> Result<()> {
        let inputs = self.inputs.clone();
        self.keyword
            .start(move |generation| {
                // Recognition is already stopped, so wait for room instead of dropping it.
                tokio::spawn(async move {
                    if inputs.send(Input::KeywordDetected { generation }).await.is_err() {
                        tracing::warn!("orchestrator gone, dropping keyword detection");
                    }
                });
            })
            .await?;
        Ok(())
    }

    async fn on_captured_audio(&mut self, generation: u64, chunk: AudioChunk) -> Result<()> {
        if self.state != ListeningState::Conversing
            || !self.capture.is_active()
            || generation != self.capture.generation()
        {
            tracing::debug!("dropping stale capture chunk, generation={}", generation);
            return Ok(());
        }
        self.session.send_audio(&chunk).await
    }

    async fn on_server_event(&mut self, event: ServerEvent) -> Result<()> {
        let conversing = self.state == ListeningState::Conversing;
        match event {
            ServerEvent::ResponseAudioDelta(delta) => {
                if !conversing {
                    tracing::debug!("not conversing, dropping audio delta");
                    return Ok(());
                }
                let response_id = delta.response_id().map(str::to_string);
                if response_id.is_some() && response_id == self.interrupted_response {
                    tracing::debug!("dropping audio of interrupted response {:?}", response_id);
                    return Ok(());
                }
                self.current_response = response_id;
                match decode_base64_pcm16(delta.delta(), SESSION_SAMPLE_RATE) {
                    Ok(chunk) => self.playback.enqueue(chunk),
                    Err(e) => tracing::warn!("{}", Error::from(e)),
                }
            }
            ServerEvent::InputAudioBufferSpeechStarted(_) => {
                if conversing {
                    tracing::debug!("user started speaking, stopping playback");
                    self.playback.stop();
                    if let Some(id) = self.current_response.take() {
                        self.interrupted_response = Some(id);
                    }
                }
            }
            ServerEvent::InputAudioBufferCleared(_) => {
                if self.pending_clears > 0 {
                    self.pending_clears -= 1;
                    tracing::debug!("input buffer clear acknowledged");
                } else if conversing {
                    tracing::info!("conversation ended by the service");
                    self.end_conversation(Deactivation::Remote).await;
                }
            }
            ServerEvent::ExtensionMiddleTierToolResponse(response) => {
                if !conversing {
                    return Ok(());
                }
                match response.tool_result() {
                    Ok(result) => {
                        let files = result.into_grounding_files();
                        if let Some(first) = files.first() {
                            self.selected_file = Some(first.clone());
                            self.grounding_files.extend(files);
                            self.notify_grounding_files();
                        }
                    }
                    Err(e) => tracing::warn!(
                        "malformed result from tool {:?}: {}",
                        response.tool_name(),
                        e
                    ),
                }
            }
            ServerEvent::ResponseAudioTranscriptDelta(delta) => {
                self.notify(Notification::AssistantTranscriptDelta(delta.delta().to_string()));
            }
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(completed) => {
                self.notify(Notification::UserTranscript(completed.transcript().to_string()));
            }
            ServerEvent::ResponseDone(done) => {
                let id = done.response().and_then(|r| r.id());
                if id.is_some() && id == self.interrupted_response.as_deref() {
                    self.interrupted_response = None;
                }
                if id.is_some() && id == self.current_response.as_deref() {
                    self.current_response = None;
                }
                self.notify(Notification::ResponseDone);
            }
            ServerEvent::Error(error) => {
                tracing::warn!("service error: {}", error.error());
                self.notify(Notification::ServerError(error.error()));
            }
            ServerEvent::Close { reason } => {
                tracing::info!("session connection closed: {:?}", reason);
                self.notify(Notification::ConnectionClosed);
            }
            ServerEvent::Unknown => {}
        }
        Ok(())
    }

    fn clear_grounding_files(&mut self) {
        self.grounding_files.clear();
        self.selected_file = None;
        self.notify_grounding_files();
    }

    fn notify_grounding_files(&self) {
        self.notify(Notification::GroundingFilesChanged {
            files: self.grounding_files.clone(),
            selected: self.selected_file.clone(),
        });
    }

    fn set_state(&mut self, state: ListeningState) {
        if self.state != state {
            tracing::info!("{:?} -> {:?}", self.state, state);
            self.state = state;
            self.notify(Notification::StateChanged(state));
        }
    }

    fn notify(&self, notification: Notification) {
        // Nobody listening is fine.
        let _ = self.notifications.send(notification);
    }
}

/// Pumps session events into the orchestrator's queue until either side goes away.
pub async fn forward_server_events(mut events: ServerRx, inputs: mpsc::Sender<Input>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if inputs.send(Input::Server(event)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("orchestrator lagged behind, {} session events lost", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
