use std::sync::mpsc as std_mpsc;

use cpal::traits::{DeviceTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapProd;
use rubato::{FastFixedIn, Resampler};

use realtime_voice_utils::audio::{convert_i16_to_f32, create_resampler, resample_linear, shared_buffer};
use realtime_voice_utils::{device, AudioChunk, SESSION_SAMPLE_RATE};

use crate::blocking::block_in_place;
use crate::error::{Error, Result};

/// Seconds of audio the device buffer can hold ahead of the speaker.
const OUTPUT_BUFFER_SECS: usize = 60;
const OUTPUT_RESAMPLE_CHUNK: usize = 256;

/// Opens output contexts. Each context owns the device until it is dropped,
/// and dropping it discards whatever it still had buffered.
pub trait AudioOutput: Send {
    fn open(&mut self, sample_rate: u32) -> anyhow::Result<Box<dyn OutputContext>>;
}

pub trait OutputContext: Send {
    fn sample_rate(&self) -> u32;
    /// Appends samples at [`OutputContext::sample_rate`] right after the previous write.
    fn write(&mut self, samples: &[i16]) -> anyhow::Result<()>;
}

enum Output {
    /// Never reset; chunks are dropped.
    Closed,
    Open(Box<dyn OutputContext>),
    /// Silenced by `stop`; the next chunk reopens a context.
    Stopped,
}

/// Back-to-back playback of PCM16 chunks through one output context at a time.
pub struct PlaybackQueue {
    output: Box<dyn AudioOutput>,
    state: Output,
}

impl PlaybackQueue {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            state: Output::Closed,
        }
    }

    /// Tears down the current context and opens a fresh one at the session rate.
    pub fn reset(&mut self) -> Result<()> {
        self.state = Output::Closed;
        let context = self
            .output
            .open(SESSION_SAMPLE_RATE)
            .map_err(|e| Error::PlaybackUnavailable(format!("{e:#}")))?;
        tracing::debug!("playback context opened at {}hz", context.sample_rate());
        self.state = Output::Open(context);
        Ok(())
    }

    pub fn enqueue(&mut self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        if let Output::Stopped = self.state {
            match self.output.open(SESSION_SAMPLE_RATE) {
                Ok(context) => self.state = Output::Open(context),
                Err(e) => {
                    tracing::warn!("failed to reopen playback, dropping chunk: {e:#}");
                    return;
                }
            }
        }
        let Output::Open(context) = &mut self.state else {
            tracing::debug!("playback not started, dropping {} samples", chunk.len());
            return;
        };

        let chunk = if chunk.sample_rate() == context.sample_rate() {
            chunk
        } else {
            resample_linear(&chunk, context.sample_rate())
        };
        if let Err(e) = context.write(chunk.samples()) {
            tracing::warn!("skipping chunk of {} samples: {e:#}", chunk.len());
        }
    }

    /// Silences playback and drops everything buffered. Never fails.
    pub fn stop(&mut self) {
        if let Output::Open(_) = self.state {
            self.state = Output::Stopped;
            tracing::debug!("playback stopped");
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, Output::Open(_))
    }
}

/// Plays through a cpal output device.
///
/// cpal streams cannot leave the thread that built them, so each context runs
/// its stream on a dedicated thread and feeds it through a ring buffer.
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

struct DeviceReady {
    producer: HeapProd<f32>,
    sample_rate: u32,
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, sample_rate: u32) -> anyhow::Result<Box<dyn OutputContext>> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<DeviceReady>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("playback-device".to_string())
            .spawn(move || {
                let stream = match build_output_stream(device_name.as_deref()) {
                    Ok((stream, ready)) => {
                        let _ = ready_tx.send(Ok(ready));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until the context drops its sender.
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("playback device released");
            })?;

        let ready = match block_in_place(|| ready_rx.recv()) {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = block_in_place(|| thread.join());
                return Err(e);
            }
            Err(_) => {
                let _ = block_in_place(|| thread.join());
                anyhow::bail!("playback device thread exited");
            }
        };

        let resampler = if ready.sample_rate == sample_rate {
            None
        } else {
            Some(create_resampler(
                sample_rate as f64,
                ready.sample_rate as f64,
                OUTPUT_RESAMPLE_CHUNK,
            )?)
        };

        Ok(Box::new(CpalOutputContext {
            sample_rate,
            producer: ready.producer,
            resampler,
            pending: Vec::with_capacity(OUTPUT_RESAMPLE_CHUNK * 2),
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }))
    }
}

fn build_output_stream(device_name: Option<&str>) -> anyhow::Result<(cpal::Stream, DeviceReady)> {
    let output = device::get_or_default_output(device_name)?;
    let config: cpal::StreamConfig = output.default_output_config()?.into();
    let channels = config.channels.max(1) as usize;
    let sample_rate = config.sample_rate.0;
    tracing::info!("output: device={:?}, config={:?}", output.name().ok(), &config);

    let (producer, mut consumer) = shared_buffer(sample_rate as usize * OUTPUT_BUFFER_SECS).split();
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        for frame in data.chunks_mut(channels) {
            frame.fill(consumer.try_pop().unwrap_or(0.0));
        }
    };
    let stream = output.build_output_stream(
        &config,
        output_data_fn,
        move |err| tracing::error!("an error occurred on output stream: {}", err),
        None,
    )?;
    stream.play()?;

    Ok((stream, DeviceReady { producer, sample_rate }))
}

struct CpalOutputContext {
    sample_rate: u32,
    producer: HeapProd<f32>,
    resampler: Option<FastFixedIn<f32>>,
    /// Samples waiting for a full resampler block.
    pending: Vec<f32>,
    shutdown: Option<std_mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalOutputContext {
    fn push(&mut self, samples: &[f32]) -> anyhow::Result<()> {
        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            anyhow::bail!("playback buffer full, dropped {} samples", samples.len() - pushed);
        }
        Ok(())
    }
}

impl OutputContext for CpalOutputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[i16]) -> anyhow::Result<()> {
        let samples = convert_i16_to_f32(samples);
        let Some(resampler) = self.resampler.as_mut() else {
            return self.push(&samples);
        };

        self.pending.extend_from_slice(&samples);
        let mut resampled = Vec::with_capacity(self.pending.len() * 2);
        let mut consumed = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() - consumed < needed {
                break;
            }
            let block = &self.pending[consumed..consumed + needed];
            let mut out = resampler.process(&[block], None)?;
            resampled.append(&mut out[0]);
            consumed += needed;
        }
        self.pending.drain(..consumed);
        self.push(&resampled)
    }
}

impl Drop for CpalOutputContext {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = block_in_place(|| thread.join());
        }
    }
}
