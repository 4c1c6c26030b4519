use std::path::Path;

use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate of every PCM16 chunk exchanged with the session.
pub const SESSION_SAMPLE_RATE: u32 = 24000;

#[derive(Debug, thiserror::Error)]
#[error("invalid base64 audio payload: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// A run of mono signed 16-bit samples at a known rate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioChunk {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

pub trait ToBinary {
    fn to_le_bytes(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_le_bytes(&self) -> Vec<u8> {
        self.iter().flat_map(|sample| sample.to_le_bytes()).collect()
    }
}

/// Decodes a base64 payload of little-endian PCM16. A trailing odd byte is dropped.
pub fn decode_base64_pcm16(payload: &str, sample_rate: u32) -> Result<AudioChunk, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(AudioChunk::new(samples, sample_rate))
}

pub fn encode_base64_pcm16(chunk: &AudioChunk) -> String {
    base64::engine::general_purpose::STANDARD.encode(chunk.samples().to_le_bytes())
}

/// Nearest-index resampling with integer arithmetic.
///
/// Output has `len * to / from` samples; output `i` is input `i * from / to`.
pub fn resample_slice<T: Copy>(input: &[T], from_rate: u32, to_rate: u32) -> Vec<T> {
    if from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate {
        return input.to_vec();
    }
    let (from, to) = (from_rate as u64, to_rate as u64);
    let out_len = (input.len() as u64 * to / from) as usize;
    (0..out_len as u64)
        .map(|i| input[(i * from / to) as usize])
        .collect()
}

pub fn resample_linear(chunk: &AudioChunk, to_rate: u32) -> AudioChunk {
    AudioChunk::new(
        resample_slice(chunk.samples(), chunk.sample_rate(), to_rate),
        to_rate,
    )
}

/// Converts normalised float samples to PCM16, clamping to `[-1, 1]` first.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

pub fn convert_i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 / i16::MAX as f32).clamp(-1.0, 1.0))
        .collect()
}

/// Resamples a decoded tone to the session rate and converts it to PCM16.
pub fn prepare_tone(samples: &[f32], sample_rate: u32) -> AudioChunk {
    let resampled = resample_slice(samples, sample_rate, SESSION_SAMPLE_RATE);
    AudioChunk::new(float_to_pcm16(&resampled), SESSION_SAMPLE_RATE)
}

/// Reads the first channel of a WAV file, normalised to `[-1, 1]`.
pub fn read_wav(path: impl AsRef<Path>) -> anyhow::Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    tracing::debug!(
        "Read {:?}: {} samples at {}hz",
        path.as_ref(),
        samples.len(),
        spec.sample_rate
    );
    Ok((samples, spec.sample_rate))
}

pub fn load_tone(path: impl AsRef<Path>) -> anyhow::Result<AudioChunk> {
    let (samples, sample_rate) = read_wav(path)?;
    Ok(prepare_tone(&samples, sample_rate))
}

pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}
