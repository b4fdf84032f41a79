//! V4L2 camera source.
//!
//! Requests RGB24 at 640x480 and the default rate; drivers that insist on NV12
//! are converted on capture. A camera stream never ends on its own.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Instant;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::video::{SourceStats, DEFAULT_FPS};
use crate::frame::Frame;

const PREFERRED_WIDTH: u32 = 640;
const PREFERRED_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

pub(super) struct V4l2Source {
    device_path: String,
    state: Option<DeviceState>,
    pixel_format: PixelFormat,
    active_width: u32,
    active_height: u32,
    fps: f64,
    frame_count: u64,
    started_at: Option<Instant>,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub(super) fn new(device_path: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            state: None,
            pixel_format: PixelFormat::Rgb24,
            active_width: PREFERRED_WIDTH,
            active_height: PREFERRED_HEIGHT,
            fps: DEFAULT_FPS as f64,
            frame_count: 0,
            started_at: None,
        }
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&self.device_path)
            .with_context(|| format!("open v4l2 device {}", self.device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = PREFERRED_WIDTH;
        format.height = PREFERRED_HEIGHT;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "{} only offers {}, need RGB3 or NV12",
                self.device_path,
                format.fourcc
            )
        })?;

        match device.set_params(&v4l::video::capture::Parameters::with_fps(DEFAULT_FPS)) {
            Ok(params) if params.interval.numerator > 0 => {
                self.fps = params.interval.denominator as f64 / params.interval.numerator as f64;
            }
            Ok(_) => {}
            Err(err) => log::warn!(
                "V4l2Source: failed to set fps on {}: {}",
                self.device_path,
                err
            ),
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        self.started_at = Some(Instant::now());

        log::info!(
            "VideoSource: connected to {} (v4l2, {}x{} {:?} at {:.1} fps)",
            self.device_path,
            self.active_width,
            self.active_height,
            self.pixel_format,
            self.fps
        );
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let pixels = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, self.active_width, self.active_height, self.pixel_format)
        })?;

        let index = self.frame_count;
        self.frame_count += 1;
        let mut frame = Frame::from_rgb(pixels, self.active_width, self.active_height, index)?;
        if let Some(started_at) = self.started_at {
            frame = frame.with_timestamp(started_at.elapsed().as_millis() as u64);
        }
        Ok(Some(frame))
    }

    pub(super) fn fps(&self) -> f64 {
        self.fps
    }

    pub(super) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.device_path.clone(),
        }
    }
}
