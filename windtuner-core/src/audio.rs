//! # Audio Capture Module
//!
//! Thin adapter between CPAL (Cross-Platform Audio Library) and the analysis
//! core: it opens the default input device and pushes every callback's
//! samples into a [`SharedRingBuffer`].
//!
//! ## Features
//! - Automatic audio device selection
//! - Closest supported sample rate to the requested one
//! - Multi-channel input downmixed to mono without allocating in the callback

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::ring_buffer::SharedRingBuffer;

/// Mono samples converted per push from the callback.
const DOWNMIX_BLOCK: usize = 1024;

/// Starts audio capture from the default input device.
///
/// The stream keeps running until the returned handle is dropped or paused.
///
/// # Arguments
/// * `ring` - receives the mono sample stream
/// * `target_rate` - preferred sample rate in Hz
///
/// # Returns
/// * `Ok((stream, sample_rate))` - stream handle and the rate actually used
/// * `Err(e)` - no usable device or format
pub fn start_audio_capture(ring: Arc<SharedRingBuffer>, target_rate: u32) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = target_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    log::info!("Selected input: {} Hz, {} channel(s)", sample_rate, channels);

    let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

    let mut mono = vec![0.0_f32; DOWNMIX_BLOCK];
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    ring.push_samples(data);
                    return;
                }
                for block in data.chunks(DOWNMIX_BLOCK * channels) {
                    let frames = block.len() / channels;
                    for (out, frame) in mono.iter_mut().zip(block.chunks_exact(channels)) {
                        *out = frame.iter().sum::<f32>() / channels as f32;
                    }
                    ring.push_samples(&mono[..frames]);
                }
            },
            err_fn,
            None,
        )
        .context("failed to build input stream")?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the f32 configuration whose rate range lies closest to `target_rate`,
/// preferring fewer channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if target_rate < min {
                min - target_rate
            } else {
                target_rate.saturating_sub(max)
            };
            (distance, c.channels())
        })
}
