use std::collections::VecDeque;

use rubato::{FastFixedIn, Resampler};

use crate::audio::{create_resampler, float_to_pcm16, AudioChunk, SESSION_SAMPLE_RATE};

/// Turns interleaved device frames into mono PCM16 chunks at the session rate.
pub struct Pcm16Framer {
    channels: usize,
    chunk_size: usize,
    resampler: Option<FastFixedIn<f32>>,
    pending: VecDeque<f32>,
    ready: VecDeque<f32>,
}

impl Pcm16Framer {
    pub fn new(device_rate: u32, channels: u16, chunk_size: usize) -> anyhow::Result<Self> {
        let resampler = if device_rate == SESSION_SAMPLE_RATE {
            None
        } else {
            Some(create_resampler(
                device_rate as f64,
                SESSION_SAMPLE_RATE as f64,
                chunk_size,
            )?)
        };
        Ok(Self {
            channels: channels.max(1) as usize,
            chunk_size: chunk_size.max(1),
            resampler,
            pending: VecDeque::with_capacity(chunk_size * 2),
            ready: VecDeque::with_capacity(chunk_size * 2),
        })
    }

    /// Feeds interleaved frames and returns every chunk completed by them.
    pub fn push(&mut self, data: &[f32]) -> Vec<AudioChunk> {
        let mono = data
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32);

        match self.resampler.as_mut() {
            None => self.ready.extend(mono),
            Some(resampler) => {
                self.pending.extend(mono);
                loop {
                    let needed = resampler.input_frames_next();
                    if self.pending.len() < needed {
                        break;
                    }
                    let block: Vec<f32> = self.pending.drain(..needed).collect();
                    match resampler.process(&[block], None) {
                        Ok(mut out) => self.ready.extend(out.swap_remove(0)),
                        Err(e) => tracing::warn!("Failed to resample capture block: {e}"),
                    }
                }
            }
        }

        let mut chunks = Vec::new();
        while self.ready.len() >= self.chunk_size {
            let samples: Vec<f32> = self.ready.drain(..self.chunk_size).collect();
            chunks.push(AudioChunk::new(float_to_pcm16(&samples), SESSION_SAMPLE_RATE));
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_rate_frames_pass_through() {
        let mut framer = Pcm16Framer::new(SESSION_SAMPLE_RATE, 1, 4).unwrap();
        assert!(framer.push(&[0.5, 0.5, 0.5]).is_empty());

        let chunks = framer.push(&[0.5, -1.0, 0.0]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].samples(), &[16383, 16383, 16383, 16383]);
        assert_eq!(chunks[0].sample_rate(), SESSION_SAMPLE_RATE);

        let chunks = framer.push(&[0.0, 0.0]);
        assert_eq!(chunks[0].samples(), &[-32768, 0, 0, 0]);
    }

    #[test]
    fn stereo_is_downmixed() {
        let mut framer = Pcm16Framer::new(SESSION_SAMPLE_RATE, 2, 2).unwrap();
        let chunks = framer.push(&[1.0, 0.0, -1.0, -1.0]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].samples(), &[16383, -32768]);
    }

    #[test]
    fn other_rates_are_resampled() {
        let mut framer = Pcm16Framer::new(48000, 1, 480).unwrap();
        let chunks: Vec<AudioChunk> = (0..20)
            .flat_map(|_| framer.push(&[0.0; 960]))
            .collect();
        // 19200 input frames at 48 kHz are about 9600 output samples
        assert!(chunks.len() >= 18, "got {} chunks", chunks.len());
        assert!(chunks.iter().all(|c| c.len() == 480 && c.sample_rate() == SESSION_SAMPLE_RATE));
    }
}
