//! Sample-rate and channel conversion between audio devices and the relay's
//! 16 kHz mono PCM.

use anyhow::Result;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Input block size handed to the resampler.
pub const RESAMPLER_CHUNK: usize = 1024;

/// Creates a mono resampler converting `in_rate` to `out_rate`.
pub fn create_resampler(in_rate: u32, out_rate: u32, chunk_size: usize) -> Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_rate as f64 / in_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Averages interleaved frames of `channels` samples into one mono sample each.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Repeats each mono sample across `channels` interleaved channels.
pub fn upmix(mono: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return mono.to_vec();
    }
    mono.iter()
        .flat_map(|&sample| std::iter::repeat_n(sample, channels))
        .collect()
}

/// Resamples a continuous mono stream delivered in arbitrary block sizes.
///
/// Input that does not fill a resampler block is kept for the next call.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self> {
        let inner = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(in_rate, out_rate, RESAMPLER_CHUNK)?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let block: Vec<f32> = self.pending.drain(..needed).collect();
            let res = resampler.process(&[block], None)?;
            out.extend_from_slice(&res[0]);
        }
        Ok(out)
    }
}

/// Resamples a complete mono clip, flushing the resampler's tail.
pub fn resample_clip(samples: &[f32], in_rate: u32, out_rate: u32) -> Result<Vec<f32>> {
    if in_rate == out_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(in_rate, out_rate, RESAMPLER_CHUNK)?;
    let expected = (samples.len() as f64 * out_rate as f64 / in_rate as f64).round() as usize;
    let delay = resampler.output_delay();

    let mut out = Vec::with_capacity(expected + delay);
    let mut position = 0;
    while samples.len() - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let res = resampler.process(&[&samples[position..position + needed]], None)?;
        out.extend_from_slice(&res[0]);
        position += needed;
    }
    if position < samples.len() {
        let tail: [&[f32]; 1] = [&samples[position..]];
        let res = resampler.process_partial(Some(&tail[..]), None)?;
        out.extend_from_slice(&res[0]);
    }
    // Push out the samples still held back by the resampler's delay.
    while out.len() < expected + delay {
        let res = resampler.process_partial::<&[f32]>(None, None)?;
        if res[0].is_empty() {
            break;
        }
        out.extend_from_slice(&res[0]);
    }

    let start = delay.min(out.len());
    let end = (start + expected).min(out.len());
    Ok(out[start..end].to_vec())
}

/// Cuts a continuous stream into frames of exactly `frame_size` samples.
pub struct Framer {
    frame_size: usize,
    buffer: Vec<f32>,
}

impl Framer {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            buffer: Vec::with_capacity(frame_size),
        }
    }

    /// Appends `samples` and returns every frame completed by them.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        for &sample in samples {
            self.buffer.push(sample);
            if self.buffer.len() == self.frame_size {
                frames.push(std::mem::replace(
                    &mut self.buffer,
                    Vec::with_capacity(self.frame_size),
                ));
            }
        }
        frames
    }
}
