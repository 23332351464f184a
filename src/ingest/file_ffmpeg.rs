//! Local file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and converted to packed RGB24. The decoder is
//! drained at end of file so trailing frames buffered by the codec are not lost.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use crate::frame::{Frame, View};

const FALLBACK_FPS: f64 = 30.0;

pub(crate) struct FfmpegFileSource {
    path: String,
    view: View,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_rate: f64,
    frame_count: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str, view: View) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("{} has no video track", path))?;
        let stream_index = input_stream.index();
        let frame_rate = rational_fps(input_stream.avg_frame_rate())
            .or_else(|| rational_fps(input_stream.rate()))
            .unwrap_or_else(|| {
                log::warn!("{}: no frame rate in container, assuming {}", path, FALLBACK_FPS);
                FALLBACK_FPS
            });
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "VideoSource: opened {} ({}x{} @ {:.2} fps, {} view)",
            path,
            decoder.width(),
            decoder.height(),
            frame_rate,
            view
        );

        Ok(Self {
            path: path.to_string(),
            view,
            input,
            stream_index,
            decoder,
            scaler,
            frame_rate,
            frame_count: 0,
            eof_sent: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let image = frame_to_image(&rgb_frame)?;
                let index = self.frame_count;
                self.frame_count += 1;
                return Ok(Some(Frame::new(index, self.view, image)));
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .with_context(|| format!("send packet to ffmpeg decoder ({})", self.path))?,
                None => {
                    self.decoder
                        .send_eof()
                        .context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let stream_index = self.stream_index;
        self.input
            .packets()
            .find(|(stream, _)| stream.index() == stream_index)
            .map(|(_, packet)| packet)
    }

    pub(crate) fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    pub(crate) fn frames_decoded(&self) -> u64 {
        self.frame_count
    }
}

fn rational_fps(rate: ffmpeg::Rational) -> Option<f64> {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return None;
    }
    Some(f64::from(rate))
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than expected")?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            pixels.extend_from_slice(
                data.get(start..end)
                    .context("ffmpeg frame row is out of bounds")?,
            );
        }
        pixels
    };

    RgbImage::from_raw(width, height, pixels).context("RGB buffer does not match frame size")
}
