//! Real-time output: a processing thread renders the device into a ring
//! buffer that the cpal callback drains.
//!
//! The cpal callback never touches the device lock. It only pops samples
//! from the ring buffer and outputs silence when the buffer runs dry.

use crate::config::PetalMixEngineDesc;
use crate::device::Device;
use crate::error::{PetalMixError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Blocks of headroom between the processing thread and the audio callback.
const RING_BLOCKS: usize = 4;

pub(crate) struct OutputStream {
    stream: Option<cpal::Stream>,
    render_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicUsize>,
    underruns: Arc<AtomicUsize>,
}

impl OutputStream {
    /// Opens the default output device and starts rendering `device` into it.
    pub(crate) fn start(device: Device, desc: &PetalMixEngineDesc) -> Result<Self> {
        let host = cpal::default_host();
        let output_device = host.default_output_device().ok_or_else(|| {
            PetalMixError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: desc.channels,
            sample_rate: cpal::SampleRate(desc.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let default_config = output_device.default_output_config().map_err(|e| {
            PetalMixError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let block_len = desc.block_size * desc.channels as usize;
        let ring = HeapRb::<f32>::new(block_len * RING_BLOCKS);
        let (producer, consumer) = ring.split();

        let underruns = Arc::new(AtomicUsize::new(0));
        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::create_stream::<f32>(&output_device, &config, consumer, underruns.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::create_stream::<i16>(&output_device, &config, consumer, underruns.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::create_stream::<u16>(&output_device, &config, consumer, underruns.clone())?
            }
            format => {
                return Err(PetalMixError::AudioFormat(format!(
                    "Unsupported sample format: {:?}",
                    format
                )));
            }
        };

        let mut output = Self {
            stream: None,
            render_thread: None,
            is_running: Arc::new(AtomicBool::new(true)),
            frames_rendered: Arc::new(AtomicUsize::new(0)),
            underruns,
        };

        let is_running = output.is_running.clone();
        let frames_rendered = output.frames_rendered.clone();
        let idle = desc.buffer_duration;
        let channels = desc.channels as usize;
        let render_thread = std::thread::Builder::new()
            .name("petalmix-render".into())
            .spawn(move || {
                render_loop(
                    device,
                    producer,
                    block_len,
                    channels,
                    idle,
                    is_running,
                    frames_rendered,
                )
            })
            .map_err(|e| PetalMixError::Engine(format!("Failed to spawn render thread: {}", e)))?;
        output.render_thread = Some(render_thread);

        stream
            .play()
            .map_err(|e| PetalMixError::AudioDevice(format!("Failed to start stream: {}", e)))?;
        output.stream = Some(stream);

        log::info!(
            "Output stream started: {} Hz, {} channel(s), {} frame blocks",
            desc.sample_rate,
            desc.channels,
            desc.block_size
        );
        Ok(output)
    }

    /// Stops the audio callback first, then joins the processing thread.
    pub(crate) fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.render_thread.take() {
            if handle.join().is_err() {
                log::error!("Render thread panicked");
            }
            let underruns = self.underruns.load(Ordering::Relaxed);
            if underruns > 0 {
                log::warn!("Output ran dry {} time(s)", underruns);
            }
            log::info!(
                "Output stream stopped after {} frames",
                self.frames_rendered.load(Ordering::Relaxed)
            );
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub(crate) fn frames_rendered(&self) -> usize {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    fn create_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: HeapCons<f32>,
        underruns: Arc<AtomicUsize>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut starved = false;
                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or_else(|| {
                            starved = true;
                            0.0
                        });
                        *sample = T::from_sample(value);
                    }
                    if starved {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PetalMixError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop(
    device: Device,
    mut producer: HeapProd<f32>,
    block_len: usize,
    channels: usize,
    idle: Duration,
    is_running: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicUsize>,
) {
    log::debug!("Render thread started");
    let mut block = vec![0.0f32; block_len];
    while is_running.load(Ordering::Acquire) {
        if producer.vacant_len() < block_len {
            std::thread::sleep(idle);
            continue;
        }
        device.render(&mut block);
        let written = producer.push_slice(&block);
        frames_rendered.fetch_add(written / channels, Ordering::Relaxed);
        log::trace!("Rendered {} frames", written / channels);
    }
    log::debug!("Render thread exiting");
}
