// src/geometry.rs - Scale-normalized distances between fingertips
use crate::landmarks::{
    Hand, Keypoint, INDEX_TIP, MIDDLE_TIP, NON_THUMB_TIPS, PINKY_TIP, RING_TIP, THUMB_TIP, WRIST,
};

/// Euclidean distance in the image plane. `None` if either point is missing.
pub fn distance(p1: Option<&Keypoint>, p2: Option<&Keypoint>) -> Option<f64> {
    let (a, b) = (p1?, p2?);
    Some((a.xy() - b.xy()).norm())
}

/// Average wrist-to-fingertip distance over the four non-thumb fingertips.
///
/// Tips that were not detected are skipped; the hand has no size at all if
/// the wrist or every tip is missing.
pub fn hand_size(hand: &Hand) -> Option<f64> {
    let wrist = hand.get(WRIST)?;
    let dists: Vec<f64> = NON_THUMB_TIPS
        .iter()
        .filter_map(|&tip| distance(Some(wrist), hand.get(tip)))
        .collect();

    if dists.is_empty() {
        return None;
    }
    Some(dists.iter().sum::<f64>() / dists.len() as f64)
}

/// Fingertip distances divided by the hand-size reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandRatios {
    pub thumb_index: f64,
    pub index_middle: f64,
    pub middle_ring: f64,
    pub ring_pinky: f64,
    pub thumb_ring: f64,
    pub hand_size: f64,
}

impl HandRatios {
    /// Computes every ratio for `hand`, or `None` when a fingertip is missing
    /// or the hand is smaller than `min_hand_size`.
    pub fn from_hand(hand: &Hand, min_hand_size: f64) -> Option<Self> {
        let size = hand_size(hand)?;
        if size < min_hand_size {
            return None;
        }

        let ratio = |a: usize, b: usize| distance(hand.get(a), hand.get(b)).map(|d| d / size);

        Some(Self {
            thumb_index: ratio(THUMB_TIP, INDEX_TIP)?,
            index_middle: ratio(INDEX_TIP, MIDDLE_TIP)?,
            middle_ring: ratio(MIDDLE_TIP, RING_TIP)?,
            ring_pinky: ratio(RING_TIP, PINKY_TIP)?,
            thumb_ring: ratio(THUMB_TIP, RING_TIP)?,
            hand_size: size,
        })
    }
}
