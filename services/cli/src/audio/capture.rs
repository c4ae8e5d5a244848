//! Microphone capture through `cpal`.
//!
//! `cpal::Stream` is not `Send`, so a dedicated thread opens the input device,
//! owns the stream and keeps it alive until told to stop. Acquiring the
//! microphone opens the device; frames only flow to the session once the
//! stream is started.

use super::dsp::{Framer, StreamResampler, downmix};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::{Arc, Mutex, mpsc};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use voxbridge_core::codec::RELAY_SAMPLE_RATE;
use voxbridge_core::session::{CaptureError, CaptureStream, EventSink, Microphone};

/// Per-start state owned by the capture callback.
struct Delivery {
    sink: EventSink,
    resampler: StreamResampler,
    framer: Framer,
}

type SharedDelivery = Arc<Mutex<Option<Delivery>>>;

/// The default input device of the default host.
#[derive(Default, Clone, Copy)]
pub struct CpalMicrophone;

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let delivery: SharedDelivery = Arc::default();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_delivery = delivery.clone();
        std::thread::Builder::new()
            .name("voxbridge-capture".to_string())
            .spawn(move || run_capture(thread_delivery, ready_tx, stop_rx))
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| CaptureError::Device("Capture thread exited".to_string()))??;

        Ok(Box::new(CpalCapture {
            delivery,
            sample_rate,
            stop_tx: Some(stop_tx),
        }))
    }
}

pub struct CpalCapture {
    delivery: SharedDelivery,
    sample_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
}

impl CaptureStream for CpalCapture {
    fn start(&mut self, frame_size: usize, events: EventSink) -> Result<(), CaptureError> {
        let resampler = StreamResampler::new(self.sample_rate, RELAY_SAMPLE_RATE)
            .map_err(|e| CaptureError::Device(format!("{e:#}")))?;
        let mut delivery = self
            .delivery
            .lock()
            .map_err(|_| CaptureError::Device("Capture state poisoned".to_string()))?;
        *delivery = Some(Delivery {
            sink: events,
            resampler,
            framer: Framer::new(frame_size),
        });
        info!(device_rate = self.sample_rate, frame_size, "Capture started.");
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut delivery) = self.delivery.lock() {
            delivery.take();
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            debug!("Capture stop requested.");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    delivery: SharedDelivery,
    ready_tx: oneshot::Sender<Result<u32, CaptureError>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let stream = match open_input(delivery) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    info!("Capture thread holding the microphone.");
    // Returns on an explicit stop or when the capture handle is dropped.
    let _ = stop_rx.recv();
    drop(stream);
    info!("Capture thread released the microphone.");
}

fn open_input(delivery: SharedDelivery) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::NoDevice,
        other => CaptureError::Device(other.to_string()),
    })?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    info!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        ?sample_format,
        "Opening input device."
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, channels, delivery),
        SampleFormat::I16 => build_input::<i16>(&device, &config, channels, delivery),
        SampleFormat::U16 => build_input::<u16>(&device, &config, channels, delivery),
        other => Err(CaptureError::Device(format!(
            "Unsupported sample format: {other:?}"
        ))),
    }?;
    stream
        .play()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    Ok((stream, sample_rate))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    delivery: SharedDelivery,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let Ok(mut guard) = delivery.lock() else {
                    return;
                };
                let Some(delivery) = guard.as_mut() else {
                    return;
                };
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                let mono = downmix(&samples, channels);
                match delivery.resampler.process(&mono) {
                    Ok(resampled) => {
                        for frame in delivery.framer.push(&resampled) {
                            delivery.sink.frame(frame);
                        }
                    }
                    Err(e) => warn!("Capture resampling failed: {}", e),
                }
            },
            |err| error!("Capture stream error: {}", err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
            other => CaptureError::Device(other.to_string()),
        })
}
