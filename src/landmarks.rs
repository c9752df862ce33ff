// src/landmarks.rs
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// Detector landmark indices we consume
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

pub const TRACKED_LANDMARKS: [usize; 6] = [WRIST, THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Fingertips used for the hand-size reference (thumb excluded).
pub const NON_THUMB_TIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Normalized detector coordinate. `x`/`y` lie in [0,1], `z` is unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn xy(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Left" | "left" => Some(Handedness::Left),
            "Right" | "right" => Some(Handedness::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected hand in one frame. Landmarks the detector did not report
/// are simply absent from the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    pub handedness: Handedness,
    pub keypoints: HashMap<usize, Keypoint>,
}

impl Hand {
    pub fn new(handedness: Handedness) -> Self {
        Self {
            handedness,
            keypoints: HashMap::new(),
        }
    }

    pub fn with_keypoint(mut self, id: usize, point: Keypoint) -> Self {
        self.keypoints.insert(id, point);
        self
    }

    pub fn get(&self, id: usize) -> Option<&Keypoint> {
        self.keypoints.get(&id)
    }

    /// Midpoint of two landmarks in the image plane.
    pub fn midpoint(&self, a: usize, b: usize) -> Option<Vector2<f64>> {
        let pa = self.get(a)?;
        let pb = self.get(b)?;
        Some((pa.xy() + pb.xy()) / 2.0)
    }
}

/// Everything the detector reported for one video frame.
///
/// Hands are held in explicit right/left slots so processing order never
/// depends on the order the detector listed them in. When the detector gives
/// two hands the same label, the second lands in `extra`: it still counts
/// toward the two-hand zoom but has no per-hand tracking.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub timestamp_ms: i64,
    pub right: Option<Hand>,
    pub left: Option<Hand>,
    pub extra: Option<Hand>,
}

impl Frame {
    pub fn empty(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            right: None,
            left: None,
            extra: None,
        }
    }

    /// Places a hand into its slot. The first hand seen keeps the slot, a
    /// second one with the same label goes to `extra`. Returns `false` when
    /// the hand had nowhere to go.
    pub fn insert(&mut self, hand: Hand) -> bool {
        let slot = match hand.handedness {
            Handedness::Right => &mut self.right,
            Handedness::Left => &mut self.left,
        };
        if slot.is_none() {
            *slot = Some(hand);
            return true;
        }
        if self.extra.is_none() {
            self.extra = Some(hand);
            return true;
        }
        false
    }

    pub fn hand(&self, handedness: Handedness) -> Option<&Hand> {
        match handedness {
            Handedness::Right => self.right.as_ref(),
            Handedness::Left => self.left.as_ref(),
        }
    }

    pub fn hand_count(&self) -> usize {
        self.right.is_some() as usize + self.left.is_some() as usize + self.extra.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.hand_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_first_hand_keeps_slot() {
        let mut frame = Frame::empty(0);
        let first = Hand::new(Handedness::Right).with_keypoint(WRIST, Keypoint::new(0.1, 0.1, 0.0));
        let second = Hand::new(Handedness::Right).with_keypoint(WRIST, Keypoint::new(0.9, 0.9, 0.0));
        let third = Hand::new(Handedness::Right).with_keypoint(WRIST, Keypoint::new(0.5, 0.5, 0.0));

        assert!(frame.insert(first.clone()));
        assert!(frame.insert(second.clone()));
        assert!(!frame.insert(third));
        assert_eq!(frame.right, Some(first));
        assert_eq!(frame.extra, Some(second));
        assert!(frame.left.is_none());
        assert_eq!(frame.hand_count(), 2);
    }

    #[test]
    fn test_midpoint_requires_both_landmarks() {
        let hand = Hand::new(Handedness::Left)
            .with_keypoint(INDEX_TIP, Keypoint::new(0.4, 0.2, 0.0))
            .with_keypoint(MIDDLE_TIP, Keypoint::new(0.6, 0.4, 0.0));

        let mid = hand.midpoint(INDEX_TIP, MIDDLE_TIP).unwrap();
        assert!((mid.x - 0.5).abs() < 1e-12);
        assert!((mid.y - 0.3).abs() < 1e-12);
        assert!(hand.midpoint(INDEX_TIP, RING_TIP).is_none());
    }

    #[test]
    fn test_handedness_parse() {
        assert_eq!(Handedness::parse("Right"), Some(Handedness::Right));
        assert_eq!(Handedness::parse("left"), Some(Handedness::Left));
        assert_eq!(Handedness::parse("Both"), None);
    }
}
