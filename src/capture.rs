use std::sync::mpsc as std_mpsc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};

use realtime_voice_utils::{device, AudioChunk, Pcm16Framer};

use crate::blocking::block_in_place;
use crate::error::{Error, Result};

/// Samples per emitted chunk at the session rate.
pub const INPUT_CHUNK_SIZE: usize = 1024;

pub type ChunkSink = Box<dyn FnMut(AudioChunk) + Send>;

/// Opens the microphone and pushes session-rate PCM16 chunks into a sink.
pub trait AudioInput: Send {
    fn open(&mut self, sink: ChunkSink) -> anyhow::Result<Box<dyn ActiveInput>>;
}

/// A running capture stream. Closing it releases the device.
pub trait ActiveInput: Send {
    fn close(self: Box<Self>);
}

/// Owns at most one capture stream.
///
/// Each `start` gets a new generation number which is passed along with every
/// chunk, so chunks from a replaced stream can be told apart and dropped.
pub struct CaptureSource {
    input: Box<dyn AudioInput>,
    active: Option<Box<dyn ActiveInput>>,
    generation: u64,
}

impl CaptureSource {
    pub fn new(input: Box<dyn AudioInput>) -> Self {
        Self {
            input,
            active: None,
            generation: 0,
        }
    }

    /// Starts capturing, stopping any previous stream first. Returns the
    /// generation the chunks will be tagged with.
    pub fn start<F>(&mut self, mut on_chunk: F) -> Result<u64>
    where
        F: FnMut(u64, AudioChunk) + Send + 'static,
    {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let sink: ChunkSink = Box::new(move |chunk| on_chunk(generation, chunk));
        let active = self
            .input
            .open(sink)
            .map_err(|e| Error::MicrophoneUnavailable(format!("{e:#}")))?;
        self.active = Some(active);
        tracing::info!("capture started, generation={}", generation);
        Ok(generation)
    }

    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.close();
            tracing::info!("capture stopped, generation={}", self.generation);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Captures from a cpal input device on a dedicated thread.
pub struct CpalInput {
    device_name: Option<String>,
}

impl CpalInput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl AudioInput for CpalInput {
    fn open(&mut self, sink: ChunkSink) -> anyhow::Result<Box<dyn ActiveInput>> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("capture-device".to_string())
            .spawn(move || {
                let stream = match build_input_stream(device_name.as_deref(), sink) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("capture device released");
            })?;

        match block_in_place(|| ready_rx.recv()) {
            Ok(Ok(())) => Ok(Box::new(CpalActiveInput {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = block_in_place(|| thread.join());
                Err(e)
            }
            Err(_) => {
                let _ = block_in_place(|| thread.join());
                anyhow::bail!("capture device thread exited")
            }
        }
    }
}

fn build_input_stream(device_name: Option<&str>, mut sink: ChunkSink) -> anyhow::Result<cpal::Stream> {
    let input = device::get_or_default_input(device_name)?;
    let default_config = input.default_input_config()?;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    tracing::info!("input: device={:?}, config={:?}", input.name().ok(), &config);

    let mut framer = Pcm16Framer::new(config.sample_rate.0, config.channels, INPUT_CHUNK_SIZE)?;
    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        for chunk in framer.push(data) {
            sink(chunk);
        }
    };
    let stream = input.build_input_stream(
        &config,
        input_data_fn,
        move |err| tracing::error!("an error occurred on input stream: {}", err),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

struct CpalActiveInput {
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ActiveInput for CpalActiveInput {
    fn close(self: Box<Self>) {}
}

impl Drop for CpalActiveInput {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = block_in_place(|| thread.join());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInput;
    use std::sync::{Arc, Mutex};

    #[test]
    fn chunks_are_tagged_with_generation() {
        let input = FakeInput::new();
        let mut capture = CaptureSource::new(Box::new(input.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let generation = capture
            .start(move |generation, chunk| sink.lock().unwrap().push((generation, chunk.len())))
            .unwrap();
        input.emit(AudioChunk::new(vec![0; 4], 24000));

        assert_eq!(*seen.lock().unwrap(), vec![(generation, 4)]);
    }

    #[test]
    fn restart_replaces_previous_stream() {
        let input = FakeInput::new();
        let mut capture = CaptureSource::new(Box::new(input.clone()));

        let first = capture.start(|_, _| {}).unwrap();
        let second = capture.start(|_, _| {}).unwrap();

        assert!(second > first);
        assert_eq!(input.opened(), 2);
        assert_eq!(input.live_streams(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let input = FakeInput::new();
        let mut capture = CaptureSource::new(Box::new(input.clone()));

        capture.stop();
        capture.start(|_, _| {}).unwrap();
        capture.stop();
        capture.stop();

        assert!(!capture.is_active());
        assert_eq!(input.live_streams(), 0);
    }

    #[test]
    fn open_failure_is_microphone_unavailable() {
        let input = FakeInput::new();
        input.fail_open(true);
        let mut capture = CaptureSource::new(Box::new(input.clone()));

        let err = capture.start(|_, _| {}).unwrap_err();

        assert!(matches!(err, Error::MicrophoneUnavailable(_)));
        assert!(!capture.is_active());
    }
}
