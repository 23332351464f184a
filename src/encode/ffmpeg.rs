//! MP4 writer using FFmpeg.
//!
//! Encodes MPEG-4 Part 2 (`mp4v`) in YUV420P.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::y4m::frame_rate_ratio;
use super::VideoSink;

pub(crate) struct Mp4Writer {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    frames: u64,
}

impl Mp4Writer {
    pub(crate) fn create(path: &Path, fps: f64, width: u32, height: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MPEG-4 encoder"))?;
        let mut stream = output.add_stream(codec).context("add video stream")?;

        let (num, den) = frame_rate_ratio(fps);
        let encoder_time_base = ffmpeg::Rational::new(den as i32, num as i32);
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(num as i32, den as i32)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder
            .open_as(codec)
            .context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .with_context(|| format!("write container header to {}", path.display()))?;
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            frames: 0,
        })
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl VideoSink for Mp4Writer {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if image.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame size {}x{} does not match mp4 stream {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }

        let mut rgb =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let stride = rgb.stride(0);
        let row_bytes = self.width as usize * 3;
        let data = rgb.data_mut(0);
        for (row, src) in image.as_raw().chunks_exact(row_bytes).enumerate() {
            data[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV420P")?;
        yuv.set_pts(Some(self.frames as i64));

        self.encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        self.drain_packets()?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.encoder.send_eof().context("flush encoder")?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .context("write container trailer")?;
        Ok(self.frames)
    }
}
