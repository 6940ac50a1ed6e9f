// SPDX-License-Identifier: GPL-3.0-only

//! cpal implementation of the platform audio seam
//!
//! cpal delivers audio through callbacks on its own thread. Each stream is
//! paired with a lock-free ring buffer so the loopback worker sees plain
//! blocking reads and writes, each bounded by one buffer period.

use super::routing::classify_by_name;
use super::{
    AudioDeviceInfo, AudioPlatform, CaptureDevice, DeviceHandle, Direction, PcmFormat,
    PcmReader, PcmWriter, PlaybackDevice,
};
use crate::constants::audio::DEFAULT_PERIOD_FRAMES;
use crate::errors::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig, SupportedBufferSize};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sleep between ring-buffer polls while a read or write waits
const RING_POLL: Duration = Duration::from_millis(1);

/// Ring capacity in multiples of the stream buffer
const RING_BUFFERS: usize = 4;

/// Platform audio through the default cpal host
pub struct CpalAudio {
    host: cpal::Host,
}

impl CpalAudio {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn default_device(&self, direction: Direction) -> Option<cpal::Device> {
        match direction {
            Direction::Input => self.host.default_input_device(),
            Direction::Output => self.host.default_output_device(),
        }
    }

    fn find_device(
        &self,
        direction: Direction,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<cpal::Device> {
        if let Some(route) = route {
            let mut devices = match direction {
                Direction::Input => self.host.input_devices(),
                Direction::Output => self.host.output_devices(),
            }
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

            if let Some(device) = devices.find(|d| d.name().map(|n| n == route.id).unwrap_or(false)) {
                return Ok(device);
            }
            warn!(device = %route.id, %direction, "Preferred device vanished, using default route");
        }

        self.default_device(direction)
            .ok_or_else(|| AudioError::DeviceUnavailable(format!("no default {} device", direction)))
    }
}

impl Default for CpalAudio {
    fn default() -> Self {
        Self::new()
    }
}

fn stream_config(format: &PcmFormat) -> StreamConfig {
    StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn ring_pair(buffer_bytes: usize) -> (HeapProd<i16>, HeapCons<i16>) {
    let samples = (buffer_bytes / 2).max(DEFAULT_PERIOD_FRAMES);
    HeapRb::<i16>::new(samples * RING_BUFFERS).split()
}

impl AudioPlatform for CpalAudio {
    fn min_buffer_size(&self, direction: Direction, format: &PcmFormat) -> Option<usize> {
        let device = self.default_device(direction)?;
        let config = match direction {
            Direction::Input => device.default_input_config(),
            Direction::Output => device.default_output_config(),
        };
        let frames = match config {
            Ok(config) => match config.buffer_size() {
                SupportedBufferSize::Range { min, .. } if *min > 0 => *min as usize,
                _ => DEFAULT_PERIOD_FRAMES,
            },
            Err(e) => {
                warn!(%direction, error = %e, "Default stream config unavailable");
                return None;
            }
        };
        Some(frames * format.bytes_per_frame())
    }

    fn supports_routing(&self) -> bool {
        true
    }

    fn devices(&self, direction: Direction) -> Vec<AudioDeviceInfo> {
        let devices = match direction {
            Direction::Input => self.host.input_devices(),
            Direction::Output => self.host.output_devices(),
        };
        let Ok(devices) = devices else {
            return Vec::new();
        };

        devices
            .filter_map(|d| d.name().ok())
            .map(|name| AudioDeviceInfo {
                id: name.clone(),
                kind: classify_by_name(&name),
                name,
            })
            .collect()
    }

    fn open_capture(
        &mut self,
        format: &PcmFormat,
        buffer_bytes: usize,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<CaptureDevice> {
        let device = self.find_device(Direction::Input, route)?;
        let label = device.name().unwrap_or_else(|_| "unknown".into());
        let (mut producer, consumer) = ring_pair(buffer_bytes);
        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);

        let stream = device
            .build_input_stream(
                &stream_config(format),
                move |data: &[i16], _info: &cpal::InputCallbackInfo| {
                    // Overflow drops the newest samples; the worker catches up
                    producer.push_slice(data);
                },
                move |err| {
                    error!("Audio capture stream error: {}", err);
                    failed_cb.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| AudioError::NotInitialized(format!("{}: {}", label, e)))?;

        info!(device = %label, %format, buffer_bytes, "Capture stream opened");

        Ok(CaptureDevice {
            handle: Box::new(CpalStreamHandle::new(stream, failed, label)),
            reader: Box::new(RingReader {
                consumer,
                period: format.duration_of(buffer_bytes / 2),
            }),
        })
    }

    fn open_playback(
        &mut self,
        format: &PcmFormat,
        buffer_bytes: usize,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<PlaybackDevice> {
        let device = self.find_device(Direction::Output, route)?;
        let label = device.name().unwrap_or_else(|_| "unknown".into());
        let (producer, mut consumer) = ring_pair(buffer_bytes);
        let failed = Arc::new(AtomicBool::new(false));
        let failed_cb = Arc::clone(&failed);

        let stream = device
            .build_output_stream(
                &stream_config(format),
                move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                    let n = consumer.pop_slice(data);
                    data[n..].fill(0);
                },
                move |err| {
                    error!("Audio playback stream error: {}", err);
                    failed_cb.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| AudioError::NotInitialized(format!("{}: {}", label, e)))?;

        info!(device = %label, %format, buffer_bytes, "Playback stream opened");

        Ok(PlaybackDevice {
            handle: Box::new(CpalStreamHandle::new(stream, failed, label)),
            writer: Box::new(RingWriter {
                producer,
                period: format.duration_of(buffer_bytes / 2),
            }),
        })
    }
}

/// Owns a cpal stream on the dispatch thread
struct CpalStreamHandle {
    stream: Option<Stream>,
    failed: Arc<AtomicBool>,
    label: String,
}

impl CpalStreamHandle {
    fn new(stream: Stream, failed: Arc<AtomicBool>, label: String) -> Self {
        Self {
            stream: Some(stream),
            failed,
            label,
        }
    }

    fn stream(&self) -> AudioResult<&Stream> {
        self.stream
            .as_ref()
            .ok_or_else(|| AudioError::Stream(format!("{}: released", self.label)))
    }
}

impl DeviceHandle for CpalStreamHandle {
    fn is_initialized(&self) -> bool {
        self.stream.is_some() && !self.failed.load(Ordering::Acquire)
    }

    fn start(&mut self) -> AudioResult<()> {
        self.stream()?
            .play()
            .map_err(|e| AudioError::Stream(format!("{}: {}", self.label, e)))
    }

    fn stop(&mut self) -> AudioResult<()> {
        self.stream()?
            .pause()
            .map_err(|e| AudioError::Stream(format!("{}: {}", self.label, e)))
    }

    fn release(&mut self) -> AudioResult<()> {
        if self.stream.take().is_some() {
            debug!(device = %self.label, "Audio stream released");
        }
        Ok(())
    }
}

/// Blocking reader over the capture ring
struct RingReader {
    consumer: HeapCons<i16>,
    period: Duration,
}

impl PcmReader for RingReader {
    fn read(&mut self, buf: &mut [i16]) -> AudioResult<usize> {
        let deadline = Instant::now() + self.period;
        // Wait for a full buffer or the end of one period, whichever is first
        while self.consumer.occupied_len() < buf.len() && Instant::now() < deadline {
            std::thread::sleep(RING_POLL);
        }
        Ok(self.consumer.pop_slice(buf))
    }
}

/// Blocking writer over the playback ring
struct RingWriter {
    producer: HeapProd<i16>,
    period: Duration,
}

impl PcmWriter for RingWriter {
    fn write(&mut self, buf: &[i16]) -> AudioResult<usize> {
        let deadline = Instant::now() + self.period;
        let mut written = 0;
        while written < buf.len() {
            written += self.producer.push_slice(&buf[written..]);
            if written == buf.len() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(RING_POLL);
        }
        Ok(written)
    }
}
