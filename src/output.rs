// src/output.rs
//
// Realtime output on the default sound device (cpal).
//
// The stream callback owns the render half of the backend. Graphs reach
// it over a channel, so the control thread never touches render state.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};

use crate::context::{AudioBackend, RackCommand, RackLink, RenderPort, render_link};
use crate::error::BackendError;
use crate::graph::ToneGraph;

/// Frames rendered per pass inside the device callback.
const CALLBACK_BLOCK: usize = 1024;

/// Backend for desktop hosts and the demo binary.
pub struct CpalBackend {
    max_block: usize,
    stream: Option<cpal::Stream>,
    link: Option<RackLink>,
    sample_rate: f64,
}

impl CpalBackend {
    pub fn new(max_block: usize) -> Self {
        Self {
            max_block,
            stream: None,
            link: None,
            sample_rate: 0.0,
        }
    }

    fn send(&self, cmd: RackCommand) {
        match &self.link {
            Some(link) => link.send(cmd),
            None => warn!("Output stream not opened; dropping rack command"),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self) -> Result<f64, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::NoOutputDevice)?;

        let supported = device
            .default_output_config()
            .map_err(|e| BackendError::Stream(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;

        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (link, port) = render_link(self.max_block);
        let mut callback = DeviceCallback::new(port, channels);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback.fill(data),
                |err| error!("Output stream error: {err}"),
                None,
            )
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        info!(
            "Opened output device {:?} ({sample_rate} Hz, {channels} ch)",
            device.name().unwrap_or_default()
        );

        self.stream = Some(stream);
        self.link = Some(link);
        self.sample_rate = f64::from(sample_rate);
        Ok(self.sample_rate)
    }

    fn resume(&mut self) -> Result<(), BackendError> {
        let stream = self.stream.as_ref().ok_or(BackendError::NoOutputDevice)?;
        stream
            .play()
            .map_err(|e| BackendError::Stream(e.to_string()))?;
        if let Some(link) = &self.link {
            link.set_running(true);
        }
        Ok(())
    }

    fn suspend(&mut self) {
        if let Some(link) = &self.link {
            link.set_running(false);
        }
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause output stream: {e}");
            }
        }
    }

    fn attach(&mut self, graph: ToneGraph) {
        self.send(RackCommand::Attach(graph));
    }

    fn detach(&mut self) {
        self.send(RackCommand::Clear);
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            info!("Closing output stream");
        }
    }
}

/// State owned by the device callback.
struct DeviceCallback {
    port: RenderPort,
    channels: usize,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl DeviceCallback {
    fn new(port: RenderPort, channels: usize) -> Self {
        Self {
            port,
            channels: channels.max(1),
            left: vec![0.0; CALLBACK_BLOCK],
            right: vec![0.0; CALLBACK_BLOCK],
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let channels = self.channels;
        for block in data.chunks_mut(CALLBACK_BLOCK * channels) {
            let frames = block.len() / channels;
            self.port
                .render_into(&mut self.left[..frames], &mut self.right[..frames]);
            interleave(&self.left[..frames], &self.right[..frames], block, channels);
        }
    }
}

/// Write planar stereo into an interleaved device buffer.
///
/// Mono devices get the mid signal; extra channels beyond two are silent.
fn interleave(left: &[f32], right: &[f32], out: &mut [f32], channels: usize) {
    for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
        if channels == 1 {
            frame[0] = (left[i] + right[i]) * 0.5;
            continue;
        }
        frame[0] = left[i];
        frame[1] = right[i];
        frame[2..].fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_stereo_and_surround() {
        let mut out = [9.0; 6];
        interleave(&[1.0, 2.0], &[3.0, 4.0], &mut out, 3);
        assert_eq!(out, [1.0, 3.0, 0.0, 2.0, 4.0, 0.0]);
    }

    #[test]
    fn test_interleave_mono_folds_down() {
        let mut out = [0.0; 2];
        interleave(&[1.0, 0.0], &[0.0, 1.0], &mut out, 1);
        assert_eq!(out, [0.5, 0.5]);
    }
}
