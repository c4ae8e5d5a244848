//! Clip playback through a `cpal` output stream fed from a ring buffer.

use super::dsp::{downmix, resample_clip, upmix};
use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc,
};
use std::time::Duration;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, error, info, warn};
use voxbridge_core::codec;
use voxbridge_core::session::{AudioOutput, EventSink, PlaybackOutcome};

/// Seconds of device audio the ring buffer can hold.
const BUFFER_SECONDS: usize = 60;

/// Plays clips back to back on the default output device.
///
/// A clip counts as finished once its play-out time has elapsed after every
/// clip queued before it.
pub struct CpalOutput {
    producer: HeapProd<f32>,
    flush_requested: Arc<AtomicBool>,
    sample_rate: u32,
    channels: usize,
    queued_until: Option<Instant>,
    timers: Vec<JoinHandle<()>>,
    // Dropping this ends the output thread.
    _stop_tx: mpsc::Sender<()>,
}

impl CpalOutput {
    /// Opens the default output device. Blocks until the stream is playing.
    pub fn open() -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, usize, HeapProd<f32>), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let flush_requested = Arc::new(AtomicBool::new(false));

        let thread_flush = flush_requested.clone();
        std::thread::Builder::new()
            .name("voxbridge-playback".to_string())
            .spawn(move || run_output(thread_flush, ready_tx, stop_rx))
            .context("Failed to spawn playback thread")?;

        let (sample_rate, channels, producer) = ready_rx
            .recv()
            .context("Playback thread exited")?
            .map_err(|e| anyhow!(e))?;

        Ok(Self {
            producer,
            flush_requested,
            sample_rate,
            channels,
            queued_until: None,
            timers: Vec::new(),
            _stop_tx: stop_tx,
        })
    }

    /// Turns a WAV clip into interleaved samples at the device's format.
    fn prepare(&self, clip: &[u8]) -> Result<Vec<f32>> {
        let (spec, pcm) = codec::read_wav(clip)?;
        let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        let mono = downmix(&samples, spec.channels as usize);
        let resampled = resample_clip(&mono, spec.sample_rate, self.sample_rate)?;
        Ok(upmix(&resampled, self.channels))
    }
}

impl AudioOutput for CpalOutput {
    fn play(&mut self, clip: Vec<u8>, events: EventSink) {
        let samples = match self.prepare(&clip) {
            Ok(samples) => samples,
            Err(e) => {
                events.playback(PlaybackOutcome::Failed(format!("{e:#}")));
                return;
            }
        };

        let pushed = self.producer.push_slice(&samples);
        if pushed < samples.len() {
            warn!(
                dropped = samples.len() - pushed,
                "Playback buffer full; clip truncated."
            );
        }

        let frames = pushed / self.channels.max(1);
        let duration = Duration::from_secs_f64(frames as f64 / self.sample_rate as f64);
        let now = Instant::now();
        let start = self.queued_until.filter(|t| *t > now).unwrap_or(now);
        let done = start + duration;
        self.queued_until = Some(done);
        debug!(?duration, "Clip queued.");

        self.timers.retain(|timer| !timer.is_finished());
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep_until(done).await;
            events.playback(PlaybackOutcome::Finished);
        }));
    }

    fn flush(&mut self) {
        self.flush_requested.store(true, Ordering::Release);
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.queued_until = None;
        debug!("Playback flushed.");
    }
}

fn run_output(
    flush_requested: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<(u32, usize, HeapProd<f32>), String>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let stream = match open_output(flush_requested) {
        Ok((stream, sample_rate, channels, producer)) => {
            let _ = ready_tx.send(Ok((sample_rate, channels, producer)));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(format!("{e:#}")));
            return;
        }
    };
    let _ = stop_rx.recv();
    drop(stream);
    info!("Playback thread stopped.");
}

fn open_output(
    flush_requested: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32, usize, HeapProd<f32>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No output device available")?;
    let supported = device
        .default_output_config()
        .context("Failed to query output config")?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    info!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        ?sample_format,
        "Opening output device."
    );

    let ring = HeapRb::<f32>::new(sample_rate as usize * channels * BUFFER_SECONDS);
    let (producer, consumer) = ring.split();

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &config, consumer, flush_requested),
        SampleFormat::I16 => build_output::<i16>(&device, &config, consumer, flush_requested),
        SampleFormat::U16 => build_output::<u16>(&device, &config, consumer, flush_requested),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }?;
    stream.play().context("Failed to start output stream")?;
    Ok((stream, sample_rate, channels, producer))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    flush_requested: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if flush_requested.swap(false, Ordering::AcqRel) {
                while consumer.try_pop().is_some() {}
            }
            scratch.resize(data.len(), 0.0);
            let read = consumer.pop_slice(&mut scratch);
            scratch[read..].fill(0.0);
            for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                *out = sample.to_sample::<T>();
            }
        },
        |err| error!("Playback stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
