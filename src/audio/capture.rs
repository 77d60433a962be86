// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use tracing::{error, info, span, warn, Level};

use super::error::AnalysisError;
use super::features::FeatureExtractor;
use crate::config;
use crate::playsync::CancelHandle;

/// A negotiated input: the device and the stream configuration we'll open it with.
pub(crate) struct Input {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

impl Input {
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }
}

/// Lists the names of input devices on every host.
pub fn list_input_devices() -> Result<Vec<String>, AnalysisError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout().map_err(|e| AnalysisError::Stream(e.to_string()))?;
    let _shh_stderr = shh::stderr().map_err(|e| AnalysisError::Stream(e.to_string()))?;

    let mut names = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = cpal::host_from_id(host_id).map_err(|e| AnalysisError::Stream(e.to_string()))?;
        let devices = match host.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

/// Finds the configured input device, or the default input, and picks a stream configuration
/// for it. The configured sample rate is used when the device supports it; otherwise the
/// device's default rate is used.
pub(crate) fn negotiate(config: &config::Audio) -> Result<Input, AnalysisError> {
    let host = cpal::default_host();
    let device = match config.device() {
        Some(name) => host
            .input_devices()
            .map_err(|e| AnalysisError::Stream(e.to_string()))?
            .find(|device| device.name().is_ok_and(|n| n.trim() == name))
            .ok_or(AnalysisError::NoInputDevice)?,
        None => host
            .default_input_device()
            .ok_or(AnalysisError::NoInputDevice)?,
    };

    let default_config = device
        .default_input_config()
        .map_err(|e| AnalysisError::Stream(e.to_string()))?;
    let requested = config.sample_rate();
    let supported = device
        .supported_input_configs()
        .map(|mut configs| {
            configs.any(|c| {
                c.channels() == default_config.channels()
                    && c.min_sample_rate().0 <= requested
                    && requested <= c.max_sample_rate().0
            })
        })
        .unwrap_or(false);
    let sample_rate = if supported {
        requested
    } else {
        warn!(
            requested,
            using = default_config.sample_rate().0,
            "Requested sample rate not supported by the input device"
        );
        default_config.sample_rate().0
    };

    Ok(Input {
        config: cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        },
        sample_format: default_config.sample_format(),
        device,
    })
}

/// Builds the per-callback closure: downmix to mono, accumulate into analysis frames and hand
/// each full frame to the extractor. Never logs and never allocates after setup.
fn frame_sink<T>(
    extractor: Arc<FeatureExtractor>,
    channels: usize,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    let frame_size = extractor.buffer_size();
    let mut pending = Vec::with_capacity(frame_size);
    move |data: &[T], _: &cpal::InputCallbackInfo| {
        for chunk in data.chunks(channels) {
            let sum: f32 = chunk.iter().map(|s| f32::from_sample(*s)).sum();
            pending.push(sum / chunk.len() as f32);
            if pending.len() == frame_size {
                extractor.ingest(&pending);
                pending.clear();
            }
        }
    }
}

/// Starts capturing from the input on a dedicated thread. The stream lives on that thread
/// until the cancel handle fires. Returns once the stream is playing, or with the error that
/// stopped it.
pub(crate) fn spawn(
    input: Input,
    extractor: Arc<FeatureExtractor>,
    cancel_handle: CancelHandle,
) -> Result<JoinHandle<()>, AnalysisError> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

    let join_handle = thread::spawn(move || {
        let span = span!(Level::INFO, "audio capture");
        let _enter = span.enter();

        let channels = usize::from(input.channels());
        let err_fn = |err| error!("CPAL input stream error: {}", err);
        let stream = match input.sample_format {
            cpal::SampleFormat::F32 => input.device.build_input_stream(
                &input.config,
                frame_sink::<f32>(extractor, channels),
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => input.device.build_input_stream(
                &input.config,
                frame_sink::<i16>(extractor, channels),
                err_fn,
                None,
            ),
            cpal::SampleFormat::U16 => input.device.build_input_stream(
                &input.config,
                frame_sink::<u16>(extractor, channels),
                err_fn,
                None,
            ),
            other => {
                let _ = ready_tx.send(Err(AnalysisError::Stream(format!(
                    "unsupported sample format {}",
                    other
                ))));
                return;
            }
        };

        let stream = match stream.map_err(|e| AnalysisError::Stream(e.to_string())) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(AnalysisError::Stream(e.to_string())));
            return;
        }
        info!(
            sample_rate = input.config.sample_rate.0,
            channels, "CPAL input stream started"
        );
        let _ = ready_tx.send(Ok(()));

        // Keep the stream alive until cancelled.
        while !cancel_handle.wait_timeout(Duration::from_millis(100)) {}
        drop(stream);
        info!("CPAL input stream stopped");
    });

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(join_handle),
        Ok(Err(e)) => {
            let _ = join_handle.join();
            Err(e)
        }
        Err(_) => Err(AnalysisError::Stream(
            "capture thread exited before starting".to_string(),
        )),
    }
}
