//! Walking direction inference.
//!
//! Per-frame detector boxes are noisy, so the direction is read off a bounded
//! window of recent horizontal positions instead of consecutive frames: once
//! the window is full, the sign of `newest - oldest` is the direction.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::frame::BoundingBox;

/// Default capacity of the direction window.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    #[default]
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which horizontal coordinate of the tracked box feeds the history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionMetric {
    #[default]
    CenterX,
    X1,
}

impl DirectionMetric {
    pub fn measure(&self, bbox: &BoundingBox) -> f32 {
        match self {
            DirectionMetric::CenterX => bbox.center_x(),
            DirectionMetric::X1 => bbox.x1,
        }
    }
}

impl FromStr for DirectionMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "center_x" | "center" => Ok(DirectionMetric::CenterX),
            "x1" | "left_edge" => Ok(DirectionMetric::X1),
            other => Err(format!(
                "unknown direction metric '{}' (expected center_x or x1)",
                other
            )),
        }
    }
}

/// Direction implied by two positions. A zero delta counts as `Left`.
pub fn infer_direction(oldest: f32, newest: f32) -> Direction {
    if newest - oldest > 0.0 {
        Direction::Right
    } else {
        Direction::Left
    }
}

/// Bounded FIFO of horizontal positions.
#[derive(Clone, Debug)]
pub struct DirectionHistory {
    positions: VecDeque<f32>,
    capacity: usize,
}

impl DirectionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            positions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a position, evicting the oldest when at capacity.
    pub fn push(&mut self, x: f32) {
        while self.positions.len() >= self.capacity {
            self.positions.pop_front();
        }
        self.positions.push_back(x);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.positions.len() == self.capacity
    }

    /// Direction over the window, or `None` until the window is full.
    pub fn direction(&self) -> Option<Direction> {
        if !self.is_full() {
            return None;
        }
        let oldest = *self.positions.front()?;
        let newest = *self.positions.back()?;
        Some(infer_direction(oldest, newest))
    }
}

impl Default for DirectionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(values: &[f32]) -> DirectionHistory {
        let mut history = DirectionHistory::default();
        for &v in values {
            history.push(v);
        }
        history
    }

    #[test]
    fn increasing_history_is_right() {
        let values: Vec<f32> = (0..10).map(|i| 100.0 + 5.0 * i as f32).collect();
        assert_eq!(history_of(&values).direction(), Some(Direction::Right));
    }

    #[test]
    fn decreasing_history_is_left() {
        let values: Vec<f32> = (0..10).rev().map(|i| 100.0 + 5.0 * i as f32).collect();
        assert_eq!(history_of(&values).direction(), Some(Direction::Left));
    }

    #[test]
    fn constant_history_is_left() {
        assert_eq!(history_of(&[120.0; 10]).direction(), Some(Direction::Left));
    }

    #[test]
    fn partial_history_has_no_direction() {
        let history = history_of(&[1.0, 2.0, 3.0]);
        assert_eq!(history.direction(), None);
        assert!(!history.is_full());
    }

    #[test]
    fn window_evicts_oldest() {
        let mut history = history_of(&[0.0; 10]);
        history.push(50.0);
        assert_eq!(history.len(), 10);
        assert_eq!(history.direction(), Some(Direction::Right));

        // Only the endpoints matter, not the path in between.
        let wobbly = [10.0, 90.0, 0.0, 80.0, 5.0, 70.0, 3.0, 60.0, 1.0, 11.0];
        assert_eq!(history_of(&wobbly).direction(), Some(Direction::Right));
    }

    #[test]
    fn direction_matches_endpoint_sign_for_any_sequence() {
        let mut seed = 0x2545_f491_u32;
        for _ in 0..200 {
            let values: Vec<f32> = (0..14)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    (seed % 640) as f32
                })
                .collect();
            let history = history_of(&values);
            let window = &values[values.len() - 10..];
            let expected = if window[9] > window[0] {
                Direction::Right
            } else {
                Direction::Left
            };
            assert_eq!(history.direction(), Some(expected));
        }
    }

    #[test]
    fn metric_reads_box() {
        let b = BoundingBox::new(10.0, 0.0, 30.0, 50.0);
        assert_eq!(DirectionMetric::CenterX.measure(&b), 20.0);
        assert_eq!(DirectionMetric::X1.measure(&b), 10.0);
    }
}
