use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use realtime_voice_types::events::client::{
    InputAudioBufferAppendEvent, InputAudioBufferClearEvent, InputTextEvent, SessionUpdateEvent,
};
use realtime_voice_types::{ClientEvent, ServerEvent};
use realtime_voice_utils::audio::{encode_base64_pcm16, resample_linear};
use realtime_voice_utils::{AudioChunk, SESSION_SAMPLE_RATE};
use tokio_tungstenite::tungstenite::Message;

use crate::client::utils::Target;
use crate::config::{Config, SessionConfig};
use crate::error::{Error, Result};

mod consts;
mod stats;
mod utils;

pub use stats::Stats;

pub type ClientTx = tokio::sync::mpsc::UnboundedSender<ClientEvent>;
type ClientRx = tokio::sync::mpsc::UnboundedReceiver<ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

/// The commands the orchestrator issues against the remote session.
#[async_trait]
pub trait SessionApi: Send {
    /// Sends `session.update` with the turn detection and transcription settings.
    async fn start_session(&mut self, config: &SessionConfig) -> Result<()>;
    async fn send_audio(&mut self, chunk: &AudioChunk) -> Result<()>;
    async fn clear_input_buffer(&mut self) -> Result<()>;
    async fn send_text(&mut self, text: &str) -> Result<()>;
}

/// Handle to the persistent session socket.
///
/// A supervisor task owns the socket and reconnects whenever it drops.
/// Commands submitted while disconnected wait in the outbound queue and go
/// out, in order, on the next connection. Only audio counts against the
/// queue's capacity, so control commands are never refused or delayed by a
/// backlog of captured chunks. Dropping the client stops the supervisor.
pub struct Client {
    c_tx: ClientTx,
    s_tx: ServerTx,
    queued_audio: Arc<AtomicUsize>,
    audio_capacity: usize,
    stats: Arc<Mutex<Stats>>,
    supervisor: tokio::task::JoinHandle<()>,
}

impl Client {
    pub fn server_events(&self) -> ServerRx {
        self.s_tx.subscribe()
    }

    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn send_client_event(&self, event: ClientEvent) -> Result<()> {
        self.c_tx.send(event).map_err(|_| Error::NotConnected)
    }
}

#[async_trait]
impl SessionApi for Client {
    async fn start_session(&mut self, config: &SessionConfig) -> Result<()> {
        let event = ClientEvent::SessionUpdate(SessionUpdateEvent::new(config.to_session()));
        self.send_client_event(event).await
    }

    async fn send_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        let audio = if chunk.sample_rate() == SESSION_SAMPLE_RATE {
            encode_base64_pcm16(chunk)
        } else {
            encode_base64_pcm16(&resample_linear(chunk, SESSION_SAMPLE_RATE))
        };
        let event = ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent::new(audio));
        if self.queued_audio.load(Ordering::SeqCst) >= self.audio_capacity {
            tracing::warn!("outbound queue full, dropping {} samples", chunk.len());
            return Ok(());
        }
        self.queued_audio.fetch_add(1, Ordering::SeqCst);
        if self.c_tx.send(event).is_err() {
            self.queued_audio.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn clear_input_buffer(&mut self) -> Result<()> {
        let event = ClientEvent::InputAudioBufferClear(InputAudioBufferClearEvent::new());
        self.send_client_event(event).await
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_client_event(ClientEvent::InputText(InputTextEvent::new(text)))
            .await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

/// Starts the connection supervisor for `config`'s endpoint. Must be called
/// from within a tokio runtime. Nothing is sent until the caller issues a
/// command.
pub fn connect(config: &Config) -> Result<Client> {
    let target = utils::target(config.endpoint());
    // Surface a malformed endpoint now instead of retrying it forever.
    utils::build_request(&target)?;

    let (c_tx, c_rx) = tokio::sync::mpsc::unbounded_channel();
    let (s_tx, _) = tokio::sync::broadcast::channel(config.capacity());
    let stats = Arc::new(Mutex::new(Stats::new()));
    let queued_audio = Arc::new(AtomicUsize::new(0));

    let outbound = Outbound {
        c_rx,
        queued_audio: queued_audio.clone(),
    };
    let supervisor = tokio::spawn(supervise(target, outbound, s_tx.clone(), stats.clone()));

    Ok(Client {
        c_tx,
        s_tx,
        queued_audio,
        audio_capacity: config.capacity(),
        stats,
        supervisor,
    })
}

/// Receiving half of the outbound queue; releases an audio slot for every
/// append it hands out.
struct Outbound {
    c_rx: ClientRx,
    queued_audio: Arc<AtomicUsize>,
}

impl Outbound {
    async fn recv(&mut self) -> Option<ClientEvent> {
        let event = self.c_rx.recv().await?;
        if matches!(event, ClientEvent::InputAudioBufferAppend(_)) {
            self.queued_audio.fetch_sub(1, Ordering::SeqCst);
        }
        Some(event)
    }
}

async fn supervise(target: Target, mut outbound: Outbound, s_tx: ServerTx, stats: Arc<Mutex<Stats>>) {
    // A command taken off the queue whose write failed goes first on the next connection.
    let mut unsent: Option<ClientEvent> = None;

    loop {
        let request = match utils::build_request(&target) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("invalid session endpoint {}: {}", target.url(), e);
                return;
            }
        };

        match tokio_tungstenite::connect_async(request).await {
            Err(e) => tracing::warn!("failed to connect to {}: {}", target.url(), e),
            Ok((ws_stream, _)) => {
                tracing::info!("connected to {}", target.url());
                let (mut write, mut read) = ws_stream.split();

                let reason = loop {
                    let next = match unsent.take() {
                        Some(event) => Some(event),
                        None => tokio::select! {
                            command = outbound.recv() => match command {
                                Some(event) => Some(event),
                                None => {
                                    tracing::debug!("client dropped, closing session socket");
                                    let _ = write.close().await;
                                    return;
                                }
                            },
                            message = read.next() => {
                                match message {
                                    None => break None,
                                    Some(Err(e)) => {
                                        tracing::warn!("failed to read message: {}", e);
                                        break Some(e.to_string());
                                    }
                                    Some(Ok(Message::Text(text))) => {
                                        if let Some(event) = decode_server_event(&text) {
                                            record_usage(&event, &stats);
                                            // No subscribers is not an error.
                                            let _ = s_tx.send(event);
                                        }
                                    }
                                    Some(Ok(Message::Binary(bin))) => {
                                        tracing::warn!("unexpected binary message of {} bytes", bin.len());
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        tracing::info!("connection closed: {:?}", frame);
                                        break frame.map(|f| f.reason.to_string());
                                    }
                                    Some(Ok(_)) => {}
                                }
                                None
                            }
                        },
                    };

                    let Some(event) = next else { continue };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        tracing::error!("failed to send message: {}", e);
                        unsent = Some(event);
                        break Some(e.to_string());
                    }
                };

                let _ = s_tx.send(ServerEvent::Close { reason });
            }
        }

        tracing::debug!("reconnecting in {:?}", consts::RECONNECT_DELAY);
        tokio::time::sleep(consts::RECONNECT_DELAY).await;
    }
}

/// Decodes one inbound text frame. Malformed frames and event types this
/// client does not handle yield `None`; neither tears the connection down.
pub(crate) fn decode_server_event(text: &str) -> Option<ServerEvent> {
    let json = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("dropping malformed frame: {}", e);
            return None;
        }
    };
    let event_type = json
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    tracing::debug!(
        "received message: {}, id={}",
        event_type,
        json.get("event_id").and_then(|v| v.as_str()).unwrap_or("unknown")
    );

    match serde_json::from_value::<ServerEvent>(json) {
        Ok(ServerEvent::Unknown) | Ok(ServerEvent::Close { .. }) => {
            tracing::debug!("ignoring event type {}", event_type);
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("failed to deserialize event {}: {}", event_type, e);
            None
        }
    }
}

fn record_usage(event: &ServerEvent, stats: &Mutex<Stats>) {
    let ServerEvent::ResponseDone(done) = event else {
        return;
    };
    let Some(usage) = done.response().and_then(|r| r.usage()) else {
        return;
    };
    if let Ok(mut stats) = stats.lock() {
        stats.update_usage(usage.total_tokens(), usage.input_tokens(), usage.output_tokens());
    } else {
        tracing::error!("failed to update stats");
    }
    tracing::debug!(
        "total_tokens: {}, input_tokens: {}, output_tokens: {}",
        usage.total_tokens(),
        usage.input_tokens(),
        usage.output_tokens()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;

    async fn listen() -> (TcpListener, Config) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let config = Config::builder().with_relay_url(&url).build();
        (listener, config)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn next_event(rx: &mut ServerRx) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn commands_go_out_in_submission_order() {
        // Arrange
        let (listener, config) = listen().await;
        let mut client = connect(&config).unwrap();
        let mut server = accept(&listener).await;

        // Act
        client.start_session(&SessionConfig::default()).await.unwrap();
        client
            .send_audio(&AudioChunk::new(vec![1, -1], SESSION_SAMPLE_RATE))
            .await
            .unwrap();
        client.clear_input_buffer().await.unwrap();
        client.send_text("what is on the agenda?").await.unwrap();

        // Assert
        assert_eq!(
            next_json(&mut server).await,
            serde_json::json!({"type": "session.update", "session": {}})
        );
        assert_eq!(
            next_json(&mut server).await,
            serde_json::json!({"type": "input_audio_buffer.append", "audio": "AQD//w=="})
        );
        assert_eq!(
            next_json(&mut server).await,
            serde_json::json!({"type": "input_audio_buffer.clear"})
        );
        assert_eq!(
            next_json(&mut server).await,
            serde_json::json!({"type": "input_text", "text": "what is on the agenda?"})
        );
    }

    #[tokio::test]
    async fn control_commands_are_not_held_up_by_queued_audio() {
        // Arrange
        // Nothing is accepted until after the commands, so the handshake stalls meanwhile.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = Config::builder()
            .with_relay_url(&format!("ws://{}", listener.local_addr().unwrap()))
            .with_capacity(4)
            .build();
        let mut client = connect(&config).unwrap();

        // Act
        for i in 0..8 {
            client
                .send_audio(&AudioChunk::new(vec![i], SESSION_SAMPLE_RATE))
                .await
                .unwrap();
        }
        let cleared = tokio::time::timeout(Duration::from_secs(3), client.clear_input_buffer()).await;
        let mut server = accept(&listener).await;

        // Assert
        assert!(matches!(cleared, Ok(Ok(()))));
        for _ in 0..4 {
            assert_eq!(next_json(&mut server).await["type"], "input_audio_buffer.append");
        }
        assert_eq!(
            next_json(&mut server).await,
            serde_json::json!({"type": "input_audio_buffer.clear"})
        );
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_are_skipped() {
        // Arrange
        let (listener, config) = listen().await;
        let client = connect(&config).unwrap();
        let mut events = client.server_events();
        let mut server = accept(&listener).await;

        // Act
        for frame in [
            "{not json",
            r#"{"type":"unknown.future.event","payload":1}"#,
            r#"{"type":"response.audio.delta","delta":42}"#,
            r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120}"#,
        ] {
            server.send(Message::Text(frame.to_string())).await.unwrap();
        }

        // Assert
        let event = next_event(&mut events).await;
        assert!(matches!(event, ServerEvent::InputAudioBufferSpeechStarted(_)));
    }

    #[tokio::test]
    async fn reconnects_and_flushes_queued_commands() {
        // Arrange
        let (listener, config) = listen().await;
        let mut client = connect(&config).unwrap();
        let mut events = client.server_events();
        let mut first = accept(&listener).await;

        // Act
        first.close(None).await.unwrap();
        drop(first);
        let closed = next_event(&mut events).await;
        client.send_text("still there?").await.unwrap();
        let mut second = accept(&listener).await;

        // Assert
        assert!(matches!(closed, ServerEvent::Close { .. }));
        assert_eq!(
            next_json(&mut second).await,
            serde_json::json!({"type": "input_text", "text": "still there?"})
        );
    }

    #[tokio::test]
    async fn usage_from_response_done_is_accumulated() {
        // Arrange
        let (listener, config) = listen().await;
        let client = connect(&config).unwrap();
        let mut events = client.server_events();
        let mut server = accept(&listener).await;
        let done = r#"{"type":"response.done","response":{"id":"r1","status":"completed","usage":{"total_tokens":30,"input_tokens":10,"output_tokens":20}}}"#;

        // Act
        server.send(Message::Text(done.to_string())).await.unwrap();
        server.send(Message::Text(done.to_string())).await.unwrap();
        next_event(&mut events).await;
        next_event(&mut events).await;

        // Assert
        let stats = client.stats();
        assert_eq!(stats.responses(), 2);
        assert_eq!(stats.total_tokens(), 60);
        assert_eq!(stats.output_tokens(), 40);
    }

    #[test]
    fn decode_ignores_unknown_types() {
        assert!(decode_server_event(r#"{"type":"unknown.future.event"}"#).is_none());
        assert!(decode_server_event(r#"{"type":"close"}"#).is_none());
        assert!(decode_server_event("[]").is_none());
        assert!(matches!(
            decode_server_event(r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#),
            Some(ServerEvent::Error(_))
        ));
    }
}
