//! Talks to a realtime voice session through the default microphone and speakers.
//!
//! Stdin stands in for the UI: `start`, `stop`, `talk`, `hangup`, `text <msg>`,
//! `select <n>`, `quit`. There is no speech recognizer in this demo; type
//! `say <utterance>` to feed the keyword detector, e.g. `say hey assistant`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use realtime_voice::capture::{CaptureSource, CpalInput};
use realtime_voice::keyword::{
    AuthorizationToken, CredentialCache, HttpTokenSource, KeywordDetector, RecognitionEngine,
    RecognizerFactory, SpeechToken, TokenSource,
};
use realtime_voice::playback::{CpalOutput, PlaybackQueue};
use realtime_voice::utils::audio::load_tone;
use realtime_voice::{
    forward_server_events, Components, Config, Input, Notification, Orchestrator, Tones,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input device name; the host default when omitted
    #[arg(long)]
    input_device: Option<String>,
    /// Output device name; the host default when omitted
    #[arg(long)]
    output_device: Option<String>,
    /// WAV played when a conversation starts
    #[arg(long)]
    activation_tone: Option<String>,
    /// WAV played when a conversation ends
    #[arg(long)]
    deactivation_tone: Option<String>,
    /// Skip the token endpoint and use a placeholder credential
    #[arg(long)]
    offline_keyword: bool,
    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

type Utterances = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Recognizer fed from stdin.
#[derive(Clone, Default)]
struct ConsoleRecognizer {
    utterances: Utterances,
}

impl ConsoleRecognizer {
    fn say(&self, text: &str) {
        match self.utterances.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(tx) => {
                    let _ = tx.send(text.to_string());
                }
                None => println!("(keyword detector is not listening)"),
            },
            Err(_) => tracing::error!("recognizer state poisoned"),
        }
    }
}

impl RecognizerFactory for ConsoleRecognizer {
    fn build(&mut self, token: &AuthorizationToken, language: &str) -> anyhow::Result<Box<dyn RecognitionEngine>> {
        tracing::info!("recognizer built for region {} ({})", token.region(), language);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RecognitionEngine for ConsoleRecognizer {
    async fn start_continuous(&mut self, results: mpsc::UnboundedSender<String>) -> anyhow::Result<()> {
        *self
            .utterances
            .lock()
            .map_err(|_| anyhow::anyhow!("recognizer state poisoned"))? = Some(results);
        Ok(())
    }

    async fn stop_continuous(&mut self) -> anyhow::Result<()> {
        *self
            .utterances
            .lock()
            .map_err(|_| anyhow::anyhow!("recognizer state poisoned"))? = None;
        Ok(())
    }
}

struct OfflineTokenSource;

#[async_trait]
impl TokenSource for OfflineTokenSource {
    async fn fetch(&self) -> anyhow::Result<SpeechToken> {
        Ok(SpeechToken {
            resource_id: "offline".to_string(),
            token: "offline".to_string(),
            region: "local".to_string(),
        })
    }
}

fn tone(path: Option<&str>) -> Option<realtime_voice::utils::AudioChunk> {
    let path = path?;
    match load_tone(path) {
        Ok(tone) => Some(tone),
        Err(e) => {
            tracing::warn!("failed to load tone {}: {:#}", path, e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    if args.list_devices {
        println!("inputs:\n{}", realtime_voice::utils::device::get_available_inputs()?);
        println!("outputs:\n{}", realtime_voice::utils::device::get_available_outputs()?);
        return Ok(());
    }

    let config = Config::from_env()?;
    let client = realtime_voice::connect(&config)?;
    let server_events = client.server_events();

    let tokens: Box<dyn TokenSource> = if args.offline_keyword {
        Box::new(OfflineTokenSource)
    } else {
        Box::new(HttpTokenSource::from_config(&config))
    };
    let recognizer = ConsoleRecognizer::default();
    let components = Components {
        session: Box::new(client),
        playback: PlaybackQueue::new(Box::new(CpalOutput::new(args.output_device.clone()))),
        capture: CaptureSource::new(Box::new(CpalInput::new(args.input_device.clone()))),
        keyword: KeywordDetector::new(&config, tokens, CredentialCache::new(), Box::new(recognizer.clone())),
    };
    let tones = Tones {
        activation: tone(args.activation_tone.as_deref()),
        deactivation: tone(args.deactivation_tone.as_deref()),
    };

    let (input_tx, input_rx) = mpsc::channel::<Input>(config.capacity());
    let orchestrator = Orchestrator::new(components, config.session().clone(), tones, input_tx.clone());
    let mut notifications = orchestrator.subscribe();

    tokio::spawn(forward_server_events(server_events, input_tx.clone()));
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            match notification {
                Notification::StateChanged(state) => println!("[state] {:?}", state),
                Notification::GroundingFilesChanged { files, selected } => {
                    for (i, file) in files.iter().enumerate() {
                        let marker = if selected.as_ref() == Some(file) { "*" } else { " " };
                        println!("[file] {marker}{i}: {} ({})", file.name, file.id);
                    }
                }
                Notification::AssistantTranscriptDelta(delta) => print!("{delta}"),
                Notification::UserTranscript(text) => println!("\n[you] {}", text.trim()),
                Notification::ResponseDone => println!(),
                Notification::ServerError(error) => println!("[error] {error}"),
                Notification::Failure(message) => println!("[failure] {message}"),
                Notification::ConnectionClosed => println!("[connection closed, reconnecting]"),
            }
        }
    });
    let orchestrator = tokio::spawn(orchestrator.run(input_rx));

    input_tx.send(Input::AppStart).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let input = match command {
            "start" => Input::AppStart,
            "stop" => Input::AppStop,
            "talk" => Input::ManualStart,
            "hangup" => Input::ManualStop,
            "toggle" => Input::ToggleConversation,
            "text" => Input::SendText(rest.to_string()),
            "select" => Input::SelectGroundingFile(rest.trim().parse().ok()),
            "say" => {
                recognizer.say(rest);
                continue;
            }
            "quit" | "exit" => break,
            "" => continue,
            other => {
                println!("unknown command: {other}");
                continue;
            }
        };
        input_tx.send(input).await?;
    }

    input_tx.send(Input::Shutdown).await?;
    orchestrator.await?;
    Ok(())
}
