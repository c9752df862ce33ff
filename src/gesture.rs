// src/gesture.rs - Per-hand gesture classification with hysteresis
use crate::config::ClassifierConfig;
use crate::geometry::HandRatios;
use crate::landmarks::Hand;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureState {
    #[default]
    None,
    Pinch,
    LeftPinch,
    Drag,
    PinchZoom,
    Pointer,
    ExpansionZoom,
}

impl GestureState {
    pub const ALL: [GestureState; 7] = [
        GestureState::None,
        GestureState::Pinch,
        GestureState::LeftPinch,
        GestureState::Drag,
        GestureState::PinchZoom,
        GestureState::Pointer,
        GestureState::ExpansionZoom,
    ];

    /// Wire label, also the top-level key of an outbound event.
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureState::None => "none",
            GestureState::Pinch => "pinch",
            GestureState::LeftPinch => "left_pinch",
            GestureState::Drag => "drag",
            GestureState::PinchZoom => "pinch_zoom",
            GestureState::Pointer => "pointer",
            GestureState::ExpansionZoom => "expansion_zoom",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == label)
    }

    pub fn is_pinch(&self) -> bool {
        matches!(self, GestureState::Pinch | GestureState::LeftPinch)
    }
}

impl fmt::Display for GestureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps fingertip ratios to a single-hand gesture.
///
/// Rules are checked in order, first match wins: pinch, drag, pinch-zoom,
/// then pointer as the fallback. Pinch uses separate entry and exit bounds
/// (`pinch_low` to enter, `pinch_high` to stay), so a ratio sitting between
/// them keeps whatever state the hand already had.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    config: ClassifierConfig,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Ratios for `hand`, or `None` when it cannot be classified this frame.
    pub fn ratios(&self, hand: &Hand) -> Option<HandRatios> {
        HandRatios::from_hand(hand, self.config.min_hand_size)
    }

    pub fn classify_hand(&self, hand: &Hand, previous: GestureState) -> GestureState {
        match self.ratios(hand) {
            Some(r) => self.classify(&r, previous),
            None => GestureState::None,
        }
    }

    pub fn classify(&self, r: &HandRatios, previous: GestureState) -> GestureState {
        let c = &self.config;

        let pinch_bound = if previous.is_pinch() { c.pinch_high } else { c.pinch_low };
        // a closed fist also brings thumb and index together
        if r.thumb_index < pinch_bound && r.index_middle > 2.0 * c.pinch_low {
            return GestureState::Pinch;
        }

        if r.index_middle < c.pointer_ratio && r.thumb_ring < c.pinch_low {
            return GestureState::Drag;
        }

        if r.ring_pinky < c.zoom_threshold
            && r.index_middle < c.pointer_ratio
            && r.middle_ring > 1.2 * c.pointer_ratio
        {
            return GestureState::PinchZoom;
        }

        GestureState::Pointer
    }
}
