//! Synthetic `stub://` streams.
//!
//! - `stub://blank?frames=200&width=16&height=16&fps=30`: black frames.
//! - `stub://walker?frames=300&turns=150&speed=2`: a bright upright box on a
//!   black background walking horizontally, reversing at each frame index
//!   listed in `turns`.
//!
//! Walker parameters: `frames`, `fps`, `width`, `height`, `turns`
//! (comma-separated), `speed` (px/frame), `start` (x of the left edge at
//! frame 0), `box_width`, `box_height`, `jitter` (px, uniform) and `seed`.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::{Frame, View};

const STUB_SCHEME: &str = "stub://";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticKind {
    Blank,
    Walker,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub kind: SyntheticKind,
    pub frames: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub turns: Vec<u64>,
    pub speed: f32,
    pub start: f32,
    pub box_width: u32,
    pub box_height: u32,
    pub jitter: f32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            kind: SyntheticKind::Walker,
            frames: 300,
            fps: 30.0,
            width: 640,
            height: 360,
            turns: Vec::new(),
            speed: 2.0,
            start: 40.0,
            box_width: 60,
            box_height: 200,
            jitter: 0.0,
            seed: 0,
        }
    }
}

impl SyntheticConfig {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("synthetic source URL must start with {}", STUB_SCHEME))?;
        let (kind, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut cfg = Self {
            kind: match kind.trim_end_matches('/') {
                "blank" => SyntheticKind::Blank,
                "" | "walker" => SyntheticKind::Walker,
                other => return Err(anyhow!("unknown synthetic source '{}'", other)),
            },
            ..Self::default()
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("synthetic parameter '{}' has no value", pair))?;
            match key {
                "frames" => cfg.frames = parse_param(key, value)?,
                "fps" => cfg.fps = parse_param(key, value)?,
                "width" => cfg.width = parse_param(key, value)?,
                "height" => cfg.height = parse_param(key, value)?,
                "speed" => cfg.speed = parse_param(key, value)?,
                "start" => cfg.start = parse_param(key, value)?,
                "box_width" => cfg.box_width = parse_param(key, value)?,
                "box_height" => cfg.box_height = parse_param(key, value)?,
                "jitter" => cfg.jitter = parse_param(key, value)?,
                "seed" => cfg.seed = parse_param(key, value)?,
                "turns" => {
                    cfg.turns = value
                        .split(',')
                        .filter(|t| !t.is_empty())
                        .map(|t| parse_param::<u64>(key, t.trim()))
                        .collect::<Result<_>>()?;
                }
                other => return Err(anyhow!("unknown synthetic parameter '{}'", other)),
            }
        }

        if cfg.width == 0 || cfg.height == 0 {
            return Err(anyhow!("synthetic frame dimensions must be non-zero"));
        }
        if !(cfg.fps > 0.0) {
            return Err(anyhow!("synthetic fps must be positive"));
        }
        cfg.turns.sort_unstable();
        Ok(cfg)
    }
}

fn parse_param<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid value '{}' for synthetic parameter '{}'", value, key))
}

pub(crate) fn is_synthetic(path: &str) -> bool {
    path.starts_with(STUB_SCHEME)
}

pub(crate) struct SyntheticSource {
    config: SyntheticConfig,
    view: View,
    frame_count: u64,
    position: f32,
    heading: f32,
    rng: StdRng,
}

impl SyntheticSource {
    pub(crate) fn new(config: SyntheticConfig, view: View) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            position: config.start,
            heading: 1.0,
            config,
            view,
            frame_count: 0,
            rng,
        }
    }

    pub(crate) fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub(crate) fn frames_emitted(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn next_frame(&mut self) -> Option<Frame> {
        if self.frame_count >= self.config.frames {
            return None;
        }
        let index = self.frame_count;
        let image = match self.config.kind {
            SyntheticKind::Blank => RgbImage::new(self.config.width, self.config.height),
            SyntheticKind::Walker => self.render_walker(),
        };

        if self.config.turns.binary_search(&index).is_ok() {
            self.heading = -self.heading;
        }
        self.position += self.heading * self.config.speed;
        self.frame_count += 1;

        Some(Frame::new(index, self.view, image))
    }

    fn render_walker(&mut self) -> RgbImage {
        let cfg = &self.config;
        let jitter = if cfg.jitter > 0.0 {
            self.rng.gen_range(-cfg.jitter..=cfg.jitter)
        } else {
            0.0
        };
        let left = (self.position + jitter).round() as i64;
        let top = (cfg.height as i64 - cfg.box_height as i64) / 2;

        let mut image = RgbImage::new(cfg.width, cfg.height);
        let x0 = left.clamp(0, cfg.width as i64) as u32;
        let x1 = (left + cfg.box_width as i64).clamp(0, cfg.width as i64) as u32;
        let y0 = top.clamp(0, cfg.height as i64) as u32;
        let y1 = (top + cfg.box_height as i64).clamp(0, cfg.height as i64) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, Rgb([235, 235, 235]));
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_walker_url() {
        let url = "stub://walker?frames=120&turns=70,30&speed=3&width=320";
        let cfg = SyntheticConfig::parse(url).unwrap();
        assert_eq!(cfg.kind, SyntheticKind::Walker);
        assert_eq!(cfg.frames, 120);
        assert_eq!(cfg.turns, vec![30, 70]);
        assert_eq!(cfg.speed, 3.0);
        assert_eq!(cfg.width, 320);
        assert_eq!(cfg.height, 360);
    }

    #[test]
    fn rejects_unknown_parameters() {
        assert!(SyntheticConfig::parse("stub://walker?colour=red").is_err());
        assert!(SyntheticConfig::parse("stub://walker?frames=abc").is_err());
        assert!(SyntheticConfig::parse("stub://ghost").is_err());
        assert!(SyntheticConfig::parse("stub://blank?width=0").is_err());
    }

    #[test]
    fn walker_moves_and_turns() {
        let url = "stub://walker?frames=6&turns=3&speed=10&start=100&width=400&height=300";
        let cfg = SyntheticConfig::parse(url).unwrap();
        let mut source = SyntheticSource::new(cfg, View::Front);
        let mut lefts = Vec::new();
        while let Some(frame) = source.next_frame() {
            let left = (0..frame.width())
                .find(|&x| frame.image.get_pixel(x, 150)[0] > 0)
                .unwrap();
            lefts.push(left);
        }
        assert_eq!(lefts, vec![100, 110, 120, 130, 120, 110]);
        assert_eq!(source.frames_emitted(), 6);
    }

    #[test]
    fn blank_source_ends_after_frames() {
        let cfg = SyntheticConfig::parse("stub://blank?frames=2&width=4&height=4").unwrap();
        let mut source = SyntheticSource::new(cfg, View::Lateral);
        let first = source.next_frame().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.view, View::Lateral);
        assert!(first.image.pixels().all(|p| p.0 == [0, 0, 0]));
        assert!(source.next_frame().is_some());
        assert!(source.next_frame().is_none());
    }
}
