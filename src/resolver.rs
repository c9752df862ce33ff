// src/resolver.rs - Combines both hands into one action per frame
use crate::config::ResolverConfig;
use crate::geometry::{distance, HandRatios};
use crate::gesture::GestureState;
use crate::landmarks::{Hand, INDEX_TIP, MIDDLE_TIP, THUMB_TIP};
use crate::payload::ActionPayload;
use nalgebra::Vector2;
use tracing::debug;

/// A hand after classification, as handed to the resolver.
#[derive(Debug, Clone)]
pub struct ClassifiedHand {
    pub hand: Hand,
    pub gesture: GestureState,
    pub ratios: Option<HandRatios>,
}

impl ClassifiedHand {
    pub fn new(hand: Hand, gesture: GestureState, ratios: Option<HandRatios>) -> Self {
        Self { hand, gesture, ratios }
    }
}

/// Decides the single authoritative action each frame and tracks the
/// baselines that drag and zoom deltas are measured from.
///
/// Precedence: two-hand expansion zoom, then whatever the right hand is
/// doing, then a left-hand pinch (reported as `left_pinch`) only while the
/// right hand contributes nothing. The left hand never drives drag, pointer
/// or pinch zoom.
#[derive(Debug)]
pub struct ActionResolver {
    config: ResolverConfig,
    current: GestureState,
    drag_baseline: Option<Vector2<f64>>,
    pinch_zoom_baseline: Option<f64>,
    expansion_baseline: Option<f64>,
}

impl ActionResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            current: GestureState::None,
            drag_baseline: None,
            pinch_zoom_baseline: None,
            expansion_baseline: None,
        }
    }

    pub fn current(&self) -> GestureState {
        self.current
    }

    /// Returns the payload for this frame, or `None` when nothing needs to
    /// be said: no action is active and a `none` was already produced for
    /// the last transition.
    pub fn resolve(
        &mut self,
        right: Option<&ClassifiedHand>,
        left: Option<&ClassifiedHand>,
    ) -> Option<ActionPayload> {
        self.resolve_frame(right, left, None)
    }

    /// Like [`resolve`](Self::resolve), with the unslotted second hand of a
    /// frame whose two hands shared a label. It only takes part in the
    /// two-hand zoom.
    pub fn resolve_frame(
        &mut self,
        right: Option<&ClassifiedHand>,
        left: Option<&ClassifiedHand>,
        extra: Option<&Hand>,
    ) -> Option<ActionPayload> {
        let pair = match (right, left, extra) {
            (Some(r), Some(l), None) => Some((&r.hand, &l.hand)),
            (Some(h), None, Some(e)) | (None, Some(h), Some(e)) => Some((&h.hand, e)),
            _ => None,
        };
        if let Some((a, b)) = pair {
            if let Some(payload) = self.expansion_zoom(a, b) {
                return Some(payload);
            }
        }
        self.expansion_baseline = None;

        let chosen = match (right, left) {
            (Some(r), _) if r.gesture != GestureState::None => Some((r.gesture, r)),
            (_, Some(l)) if l.gesture == GestureState::Pinch => Some((GestureState::LeftPinch, l)),
            _ => None,
        };

        let payload = chosen.and_then(|(action, hand)| self.single_hand(action, hand));
        match payload {
            Some(p) => Some(p),
            None => self.end_gesture(),
        }
    }

    fn end_gesture(&mut self) -> Option<ActionPayload> {
        self.clear_baselines();
        let previous = std::mem::replace(&mut self.current, GestureState::None);
        if previous == GestureState::None {
            return None;
        }
        debug!(%previous, "Gesture ended");
        Some(ActionPayload::None)
    }

    fn clear_baselines(&mut self) {
        self.drag_baseline = None;
        self.pinch_zoom_baseline = None;
        self.expansion_baseline = None;
    }

    fn enter(&mut self, action: GestureState) {
        let previous = self.current;
        if previous != action {
            debug!(%previous, current = %action, "Action changed");
            if action != GestureState::Drag {
                self.drag_baseline = None;
            }
            if action != GestureState::PinchZoom {
                self.pinch_zoom_baseline = None;
            }
            if action != GestureState::ExpansionZoom {
                self.expansion_baseline = None;
            }
        }
        self.current = action;
    }

    fn expansion_zoom(&mut self, first: &Hand, second: &Hand) -> Option<ActionPayload> {
        let (a, b) = (first.get(MIDDLE_TIP)?, second.get(MIDDLE_TIP)?);
        let current_dist = distance(Some(a), Some(b))?;
        let mid = (a.xy() + b.xy()) / 2.0;

        self.enter(GestureState::ExpansionZoom);
        let baseline = *self.expansion_baseline.get_or_insert(current_dist);

        Some(ActionPayload::ExpansionZoom {
            x: mid.x,
            y: mid.y,
            delta_zoom: (current_dist - baseline) * self.config.expansion_zoom_scale,
            current_dist,
        })
    }

    fn single_hand(&mut self, action: GestureState, classified: &ClassifiedHand) -> Option<ActionPayload> {
        let hand = &classified.hand;
        match action {
            GestureState::Pointer => {
                let tip = hand.get(INDEX_TIP)?;
                self.enter(action);
                Some(ActionPayload::Pointer { x: tip.x, y: tip.y })
            }
            GestureState::Pinch | GestureState::LeftPinch => {
                let mid = hand.midpoint(THUMB_TIP, INDEX_TIP)?;
                self.enter(action);
                Some(if action == GestureState::Pinch {
                    ActionPayload::Pinch { x: mid.x, y: mid.y }
                } else {
                    ActionPayload::LeftPinch { x: mid.x, y: mid.y }
                })
            }
            GestureState::Drag => {
                let mid = hand.midpoint(INDEX_TIP, MIDDLE_TIP)?;
                self.enter(action);
                let baseline = *self.drag_baseline.get_or_insert(mid);
                Some(ActionPayload::Drag {
                    x: mid.x,
                    y: mid.y,
                    delta_x: mid.x - baseline.x,
                    delta_y: mid.y - baseline.y,
                })
            }
            GestureState::PinchZoom => {
                let mid = hand.midpoint(INDEX_TIP, MIDDLE_TIP)?;
                let current_dist = classified.ratios?.thumb_index;
                self.enter(action);
                let baseline = *self.pinch_zoom_baseline.get_or_insert(current_dist);
                Some(ActionPayload::PinchZoom {
                    x: mid.x,
                    y: mid.y,
                    delta_zoom: (current_dist - baseline) * self.config.pinch_zoom_scale,
                    current_dist,
                })
            }
            GestureState::None | GestureState::ExpansionZoom => None,
        }
    }
}
