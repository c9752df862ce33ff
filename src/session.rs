// src/session.rs - Per-frame pipeline and the frame loop that drives it
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, Connector, Delivery};
use crate::emitter::{Emission, EventEmitter};
use crate::filter::PointFilter;
use crate::gesture::{GestureClassifier, GestureState};
use crate::landmarks::{Frame, Hand, Handedness, TRACKED_LANDMARKS};
use crate::payload::ActionPayload;
use crate::resolver::{ActionResolver, ClassifiedHand};
use crate::source::LandmarkSource;
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Filters and hysteresis memory for one hand. Left and right never share one.
#[derive(Debug)]
struct HandTrack {
    filters: HashMap<usize, PointFilter>,
    previous: GestureState,
}

impl HandTrack {
    fn new() -> Self {
        Self {
            filters: HashMap::new(),
            previous: GestureState::None,
        }
    }

    fn smooth(&mut self, hand: &Hand, timestamp_ms: i64, parts: &SessionParts) -> Hand {
        let mut smoothed = Hand::new(hand.handedness);
        // only the landmarks the pipeline reads get a filter
        for id in TRACKED_LANDMARKS {
            let Some(point) = hand.get(id) else {
                continue;
            };
            let filter = self
                .filters
                .entry(id)
                .or_insert_with(|| PointFilter::from_config(&parts.config.filter));
            smoothed.keypoints.insert(id, filter.filter(point, timestamp_ms));
        }
        // a landmark that dropped out must not resume from stale state
        for (id, filter) in self.filters.iter_mut() {
            if !hand.keypoints.contains_key(id) {
                filter.reset();
            }
        }
        smoothed
    }

    fn reset(&mut self) {
        for filter in self.filters.values_mut() {
            filter.reset();
        }
        self.previous = GestureState::None;
    }
}

struct SessionParts {
    config: BridgeConfig,
    classifier: GestureClassifier,
}

/// All state the frame loop carries between frames.
pub struct GestureSession {
    parts: SessionParts,
    right: HandTrack,
    left: HandTrack,
    resolver: ActionResolver,
}

impl GestureSession {
    pub fn new(config: BridgeConfig) -> Self {
        let classifier = GestureClassifier::new(config.classifier.clone());
        let resolver = ActionResolver::new(config.resolver.clone());
        Self {
            parts: SessionParts { config, classifier },
            right: HandTrack::new(),
            left: HandTrack::new(),
            resolver,
        }
    }

    pub fn current_action(&self) -> GestureState {
        self.resolver.current()
    }

    /// Runs filtering, classification and resolution for one frame.
    /// Right is always processed before left. A same-label second hand is
    /// passed through unfiltered since it has no track of its own.
    pub fn process_frame(&mut self, frame: &Frame) -> Option<ActionPayload> {
        let right = Self::classify(&mut self.right, frame.hand(Handedness::Right), frame.timestamp_ms, &self.parts);
        let left = Self::classify(&mut self.left, frame.hand(Handedness::Left), frame.timestamp_ms, &self.parts);
        self.resolver
            .resolve_frame(right.as_ref(), left.as_ref(), frame.extra.as_ref())
    }

    fn classify(
        track: &mut HandTrack,
        hand: Option<&Hand>,
        timestamp_ms: i64,
        parts: &SessionParts,
    ) -> Option<ClassifiedHand> {
        let Some(hand) = hand else {
            track.reset();
            return None;
        };

        let smoothed = track.smooth(hand, timestamp_ms, parts);
        let ratios = parts.classifier.ratios(&smoothed);
        let gesture = match &ratios {
            Some(r) => {
                let g = parts.classifier.classify(r, track.previous);
                track.previous = g;
                g
            }
            // unclassifiable this frame: keep the hysteresis input as it was
            None => GestureState::None,
        };
        Some(ClassifiedHand::new(smoothed, gesture, ratios))
    }
}

/// Frame loop counters plus a rolling window of processing times.
#[derive(Debug, Clone, Default)]
pub struct LoopMetrics {
    pub frames_processed: u64,
    pub events_sent: u64,
    pub events_resent: u64,
    pub events_throttled: u64,
    pub events_dropped: u64,
    pub avg_processing_time: f32,
    frame_times: VecDeque<f32>,
}

impl LoopMetrics {
    const WINDOW: usize = 30;

    pub fn record_frame(&mut self, elapsed_secs: f32) {
        self.frames_processed += 1;
        self.frame_times.push_front(elapsed_secs);
        if self.frame_times.len() > Self::WINDOW {
            self.frame_times.pop_back();
        }
        self.avg_processing_time = self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
    }

    fn record_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent => self.events_sent += 1,
            Delivery::Resent => {
                self.events_sent += 1;
                self.events_resent += 1;
            }
            Delivery::Dropped => self.events_dropped += 1,
        }
    }
}

const METRICS_LOG_EVERY: u64 = 300;

/// Pulls frames until the source ends or `stop` is set, then closes the
/// source and the connection. A source error ends the loop the same way.
pub fn run_loop<S, C>(
    source: &mut S,
    session: &mut GestureSession,
    emitter: &mut EventEmitter,
    connection: &mut ConnectionManager<C>,
    stop: &AtomicBool,
) -> Result<LoopMetrics>
where
    S: LandmarkSource + ?Sized,
    C: Connector,
{
    let mut metrics = LoopMetrics::default();

    while !stop.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Landmark source finished");
                break;
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(error = %reason, "Landmark source failed, stopping");
                break;
            }
        };

        let start = Instant::now();
        if let Some(payload) = session.process_frame(&frame) {
            match emitter.admit(&payload, Instant::now()) {
                Ok(Emission::Send(line)) => {
                    debug!(action = %payload.action(), "Sending event");
                    let delivery = connection.send(&line);
                    metrics.record_delivery(delivery);
                }
                Ok(Emission::Throttled) => metrics.events_throttled += 1,
                Ok(Emission::Duplicate) => {}
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
        metrics.record_frame(start.elapsed().as_secs_f32());

        if metrics.frames_processed % METRICS_LOG_EVERY == 0 {
            debug!(
                frames = metrics.frames_processed,
                sent = metrics.events_sent,
                throttled = metrics.events_throttled,
                dropped = metrics.events_dropped,
                avg_ms = metrics.avg_processing_time * 1000.0,
                "Loop metrics"
            );
        }
    }

    source.close();
    connection.close();
    info!(
        frames = metrics.frames_processed,
        sent = metrics.events_sent,
        resent = metrics.events_resent,
        throttled = metrics.events_throttled,
        dropped = metrics.events_dropped,
        "Frame loop stopped"
    );
    Ok(metrics)
}

/// Convenience wrapper: builds the session and emitter from `config`.
pub fn run_with_config<S, C>(
    config: BridgeConfig,
    source: &mut S,
    connection: &mut ConnectionManager<C>,
    stop: Arc<AtomicBool>,
) -> Result<LoopMetrics>
where
    S: LandmarkSource + ?Sized,
    C: Connector,
{
    let mut emitter = EventEmitter::from_config(&config.emitter);
    let mut session = GestureSession::new(config);
    run_loop(source, &mut session, &mut emitter, connection, &stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Transport, TransportError};
    use crate::source::{synthetic_hand, SimPose};
    use std::cell::RefCell;
    use std::rc::Rc;

    // Near-transparent filter so synthetic poses classify on the first frame
    fn responsive_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.filter.min_cutoff = 1000.0;
        config.emitter.throttle_ms = 0;
        config
    }

    fn frame(ts: i64, right: Option<Hand>, left: Option<Hand>) -> Frame {
        Frame {
            timestamp_ms: ts,
            right,
            left,
            extra: None,
        }
    }

    fn right(pose: SimPose) -> Option<Hand> {
        Some(synthetic_hand(Handedness::Right, pose, 0.5, 0.4, 1.0))
    }

    fn left(pose: SimPose) -> Option<Hand> {
        Some(synthetic_hand(Handedness::Left, pose, 0.3, 0.4, 1.0))
    }

    #[test]
    fn test_pointer_then_end() {
        let mut s = GestureSession::new(responsive_config());
        let p = s.process_frame(&frame(0, right(SimPose::Pointer), None)).unwrap();
        assert_eq!(p.action(), GestureState::Pointer);

        assert_eq!(s.process_frame(&frame(33, None, None)), Some(ActionPayload::None));
        assert_eq!(s.process_frame(&frame(66, None, None)), None);
    }

    #[test]
    fn test_left_pinch_when_right_unclassifiable() {
        let mut s = GestureSession::new(responsive_config());
        let mut r = right(SimPose::Pointer);
        // without a middle tip the right hand classifies none and the
        // two-hand zoom cannot engage
        if let Some(h) = r.as_mut() {
            h.keypoints.remove(&crate::landmarks::MIDDLE_TIP);
        }
        let p = s.process_frame(&frame(0, r, left(SimPose::Pinch))).unwrap();
        assert_eq!(p.action(), GestureState::LeftPinch);
    }

    #[test]
    fn test_two_hands_expansion_zoom() {
        let mut s = GestureSession::new(responsive_config());
        let p = s
            .process_frame(&frame(0, right(SimPose::Pointer), left(SimPose::Pinch)))
            .unwrap();
        assert_eq!(p.action(), GestureState::ExpansionZoom);
    }

    #[test]
    fn test_hand_loss_resets_tracking() {
        let mut s = GestureSession::new(responsive_config());
        s.process_frame(&frame(0, right(SimPose::Pinch), None));
        assert_eq!(s.right.previous, GestureState::Pinch);

        s.process_frame(&frame(33, None, None));
        assert_eq!(s.right.previous, GestureState::None);
        assert!(s.right.filters.values().all(|f| {
            let mut f = f.clone();
            // a fresh filter returns its first input unchanged
            f.filter(&crate::landmarks::Keypoint::new(0.123, 0.456, 0.0), 1).x == 0.123
        }));
    }

    #[test]
    fn test_missing_landmark_keeps_hysteresis_input() {
        let mut s = GestureSession::new(responsive_config());
        s.process_frame(&frame(0, right(SimPose::Pinch), None));

        let mut occluded = synthetic_hand(Handedness::Right, SimPose::Pinch, 0.5, 0.4, 1.0);
        occluded.keypoints.remove(&crate::landmarks::WRIST);
        let p = s.process_frame(&frame(33, Some(occluded), None));
        assert_eq!(p, Some(ActionPayload::None));
        assert_eq!(s.right.previous, GestureState::Pinch);
    }

    #[test]
    fn test_shared_label_hands_expansion_zoom() {
        let hand_json = |cx: f64| {
            let hand = synthetic_hand(Handedness::Right, SimPose::Pointer, cx, 0.4, 1.0);
            let landmarks: serde_json::Map<String, serde_json::Value> = hand
                .keypoints
                .iter()
                .map(|(id, p)| (id.to_string(), serde_json::json!({"x": p.x, "y": p.y, "z": p.z})))
                .collect();
            serde_json::json!({"hand_label": "Right", "landmarks": landmarks})
        };
        let line = serde_json::json!({"timestamp_ms": 0, "hands": [hand_json(0.7), hand_json(0.3)]}).to_string();
        let parsed = crate::source::parse_frame(&line).unwrap();
        assert_eq!(parsed.hand_count(), 2);

        let mut s = GestureSession::new(responsive_config());
        let p = s.process_frame(&parsed).unwrap();
        assert_eq!(p.action(), GestureState::ExpansionZoom);
    }

    #[test]
    fn test_untracked_landmarks_get_no_filter() {
        let mut s = GestureSession::new(responsive_config());
        let mut hand = synthetic_hand(Handedness::Right, SimPose::Pointer, 0.5, 0.4, 1.0);
        for id in 100..200 {
            hand.keypoints.insert(id, crate::landmarks::Keypoint::new(0.5, 0.5, 0.0));
        }
        s.process_frame(&frame(0, Some(hand), None));
        assert_eq!(s.right.filters.len(), TRACKED_LANDMARKS.len());
        assert!(s.right.filters.keys().all(|id| TRACKED_LANDMARKS.contains(id)));
    }

    #[derive(Default)]
    struct Sink {
        lines: Vec<String>,
        closes: u32,
    }

    struct SinkTransport(Rc<RefCell<Sink>>);

    impl Transport for SinkTransport {
        fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
            self.0.borrow_mut().lines.push(line.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.0.borrow_mut().closes += 1;
        }
    }

    struct SinkConnector(Rc<RefCell<Sink>>);

    impl Connector for SinkConnector {
        type Conn = SinkTransport;

        fn endpoint(&self) -> String {
            "sink".to_string()
        }

        fn connect(&mut self) -> Result<SinkTransport, TransportError> {
            Ok(SinkTransport(Rc::clone(&self.0)))
        }
    }

    struct VecSource(VecDeque<Frame>);

    impl LandmarkSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(self.0.pop_front())
        }
    }

    #[test]
    fn test_run_loop_sends_one_none_per_gesture_end() {
        let sink = Rc::new(RefCell::new(Sink::default()));
        let mut connection = ConnectionManager::new(SinkConnector(Rc::clone(&sink)), std::time::Duration::ZERO);
        let mut source = VecSource(VecDeque::from([
            frame(0, None, None),
            frame(33, right(SimPose::Pointer), None),
            frame(66, right(SimPose::Pointer), None),
            frame(99, None, None),
            frame(132, None, None),
            frame(165, None, None),
        ]));

        let stop = Arc::new(AtomicBool::new(false));
        let metrics = run_with_config(responsive_config(), &mut source, &mut connection, stop).unwrap();

        let lines = sink.borrow().lines.clone();
        let actions: Vec<GestureState> = lines
            .iter()
            .map(|l| ActionPayload::from_wire_json(l).unwrap().action())
            .collect();
        assert_eq!(
            actions,
            vec![GestureState::Pointer, GestureState::Pointer, GestureState::None]
        );
        assert_eq!(metrics.frames_processed, 6);
        assert_eq!(metrics.events_sent, 3);
    }

    struct FailingSource {
        frames: VecDeque<Frame>,
        closed: bool,
    }

    impl LandmarkSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => anyhow::bail!("stdin read error"),
            }
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn test_source_error_still_closes_everything() {
        let sink = Rc::new(RefCell::new(Sink::default()));
        let mut connection = ConnectionManager::new(SinkConnector(Rc::clone(&sink)), std::time::Duration::ZERO);
        let mut source = FailingSource {
            frames: VecDeque::from([frame(0, right(SimPose::Pointer), None)]),
            closed: false,
        };

        let stop = Arc::new(AtomicBool::new(false));
        let metrics = run_with_config(responsive_config(), &mut source, &mut connection, stop).unwrap();

        assert!(source.closed);
        assert_eq!(sink.borrow().closes, 1);
        assert_eq!(connection.state(), crate::connection::ConnectionState::Disconnected);
        assert_eq!(metrics.frames_processed, 1);
        assert_eq!(sink.borrow().lines.len(), 1);
    }

    #[test]
    fn test_run_loop_honors_stop_flag() {
        let sink = Rc::new(RefCell::new(Sink::default()));
        let mut connection = ConnectionManager::new(SinkConnector(Rc::clone(&sink)), std::time::Duration::ZERO);
        let mut source = VecSource(VecDeque::from([frame(0, right(SimPose::Pointer), None)]));

        let stop = Arc::new(AtomicBool::new(true));
        let metrics = run_with_config(responsive_config(), &mut source, &mut connection, stop).unwrap();
        assert_eq!(metrics.frames_processed, 0);
        assert!(sink.borrow().lines.is_empty());
    }

    #[test]
    fn test_metrics_window() {
        let mut m = LoopMetrics::default();
        for _ in 0..40 {
            m.record_frame(0.002);
        }
        m.record_frame(0.032);
        assert_eq!(m.frames_processed, 41);
        assert!((m.avg_processing_time - (0.002 * 29.0 + 0.032) / 30.0).abs() < 1e-6);
    }
}
