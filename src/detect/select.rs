//! Target selection among several person detections.
//!
//! When more than one person is visible (an assistant walking along, people in
//! the background) exactly one box per view must be chosen. The choice is a
//! named strategy rather than an ad-hoc rule, and every strategy breaks ties
//! deterministically so that equal inputs always pick the same box.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::frame::BoundingBox;

use super::result::Detection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Smallest `x1`. Ties: higher confidence, then detector order.
    #[default]
    LeftMost,
    /// Detector order (index 0).
    First,
    /// Highest confidence. Ties: smaller `x1`, then detector order.
    MostConfident,
    /// Horizontal center closest to the previously selected box.
    /// Without a previous box this is `MostConfident`.
    Nearest,
}

impl SelectionPolicy {
    /// Pick one detection, or `None` when the list is empty.
    pub fn select<'a>(
        &self,
        detections: &'a [Detection],
        previous: Option<&BoundingBox>,
    ) -> Option<&'a Detection> {
        match (self, previous) {
            (SelectionPolicy::First, _) => detections.first(),
            (SelectionPolicy::LeftMost, _) => detections
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| {
                    a.bbox
                        .x1
                        .total_cmp(&b.bbox.x1)
                        .then_with(|| b.confidence.total_cmp(&a.confidence))
                        .then_with(|| ia.cmp(ib))
                })
                .map(|(_, d)| d),
            (SelectionPolicy::MostConfident, _) | (SelectionPolicy::Nearest, None) => {
                most_confident(detections)
            }
            (SelectionPolicy::Nearest, Some(prev)) => {
                let anchor = prev.center_x();
                detections
                    .iter()
                    .enumerate()
                    .min_by(|(ia, a), (ib, b)| {
                        let da = (a.bbox.center_x() - anchor).abs();
                        let db = (b.bbox.center_x() - anchor).abs();
                        da.total_cmp(&db).then_with(|| ia.cmp(ib))
                    })
                    .map(|(_, d)| d)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::LeftMost => "left_most",
            SelectionPolicy::First => "first",
            SelectionPolicy::MostConfident => "most_confident",
            SelectionPolicy::Nearest => "nearest",
        }
    }
}

fn most_confident(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| {
            // Descending confidence, so compare b to a.
            match b.confidence.total_cmp(&a.confidence) {
                Ordering::Equal => a.bbox.x1.total_cmp(&b.bbox.x1).then_with(|| ia.cmp(ib)),
                ord => ord,
            }
        })
        .map(|(_, d)| d)
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "left_most" | "leftmost" => Ok(SelectionPolicy::LeftMost),
            "first" => Ok(SelectionPolicy::First),
            "most_confident" => Ok(SelectionPolicy::MostConfident),
            "nearest" => Ok(SelectionPolicy::Nearest),
            other => Err(format!(
                "unknown selection policy '{}' (expected left_most, first, most_confident or nearest)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, confidence: f32) -> Detection {
        Detection::person(BoundingBox::new(x1, 0.0, x1 + 40.0, 100.0), confidence)
    }

    #[test]
    fn empty_input_selects_nothing() {
        for policy in [
            SelectionPolicy::LeftMost,
            SelectionPolicy::First,
            SelectionPolicy::MostConfident,
            SelectionPolicy::Nearest,
        ] {
            assert!(policy.select(&[], None).is_none());
        }
    }

    #[test]
    fn left_most_picks_minimum_x1() {
        let dets = [det(300.0, 0.9), det(120.0, 0.6), det(200.0, 0.8)];
        let chosen = SelectionPolicy::LeftMost.select(&dets, None).unwrap();
        assert_eq!(chosen.bbox.x1, 120.0);
    }

    #[test]
    fn left_most_tie_prefers_confidence_then_order() {
        let dets = [det(100.0, 0.6), det(100.0, 0.8), det(100.0, 0.8)];
        let chosen = SelectionPolicy::LeftMost.select(&dets, None).unwrap();
        assert!(std::ptr::eq(chosen, &dets[1]));
    }

    #[test]
    fn first_follows_detector_order() {
        let dets = [det(300.0, 0.5), det(10.0, 0.99)];
        let chosen = SelectionPolicy::First.select(&dets, None).unwrap();
        assert_eq!(chosen.bbox.x1, 300.0);
    }

    #[test]
    fn most_confident_tie_prefers_left_then_order() {
        let dets = [det(250.0, 0.9), det(50.0, 0.9), det(10.0, 0.7)];
        let chosen = SelectionPolicy::MostConfident.select(&dets, None).unwrap();
        assert_eq!(chosen.bbox.x1, 50.0);

        let same = [det(50.0, 0.9), det(50.0, 0.9)];
        let chosen = SelectionPolicy::MostConfident.select(&same, None).unwrap();
        assert!(std::ptr::eq(chosen, &same[0]));
    }

    #[test]
    fn nearest_tracks_previous_box() {
        let dets = [det(0.0, 0.99), det(400.0, 0.6)];
        let prev = BoundingBox::new(390.0, 0.0, 430.0, 100.0);
        let chosen = SelectionPolicy::Nearest.select(&dets, Some(&prev)).unwrap();
        assert_eq!(chosen.bbox.x1, 400.0);

        let chosen = SelectionPolicy::Nearest.select(&dets, None).unwrap();
        assert_eq!(chosen.bbox.x1, 0.0);
    }

    #[test]
    fn parses_names() {
        assert_eq!("left-most".parse::<SelectionPolicy>(), Ok(SelectionPolicy::LeftMost));
        assert_eq!("most_confident".parse::<SelectionPolicy>(), Ok(SelectionPolicy::MostConfident));
        assert!("random".parse::<SelectionPolicy>().is_err());
    }
}
