// src/source.rs - Landmark frame providers
use crate::landmarks::{
    Frame, Hand, Handedness, Keypoint, INDEX_TIP, MIDDLE_TIP, PINKY_TIP, RING_TIP, THUMB_TIP, WRIST,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that yields detector output frame by frame.
///
/// `Ok(None)` means the source is exhausted and the frame loop should stop.
pub trait LandmarkSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn close(&mut self) {}
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    timestamp_ms: Option<i64>,
    #[serde(default)]
    hands: Vec<RawHand>,
}

#[derive(Debug, Deserialize)]
struct RawHand {
    hand_label: String,
    #[serde(default)]
    landmarks: HashMap<String, Keypoint>,
}

/// Parses one detector export line:
/// `{"timestamp_ms": 1, "hands": [{"hand_label": "Right", "landmarks": {"8": {"x":..,"y":..,"z":..}}}]}`
pub fn parse_frame(line: &str) -> Result<Frame> {
    let raw: RawFrame = serde_json::from_str(line).context("Malformed landmark frame")?;
    let timestamp_ms = raw
        .timestamp_ms
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    let mut frame = Frame::empty(timestamp_ms);
    for raw_hand in raw.hands {
        let Some(handedness) = Handedness::parse(&raw_hand.hand_label) else {
            warn!(label = %raw_hand.hand_label, "Skipping hand with unknown label");
            continue;
        };

        let mut hand = Hand::new(handedness);
        for (key, point) in raw_hand.landmarks {
            match key.parse::<usize>() {
                Ok(id) => {
                    hand.keypoints.insert(id, point);
                }
                Err(_) => debug!(key = %key, "Ignoring non-numeric landmark id"),
            }
        }

        if !frame.insert(hand) {
            warn!(%handedness, "More than two hands in one frame, dropping the rest");
        }
    }
    Ok(frame)
}

/// Reads newline-delimited JSON frames, e.g. piped from the detector.
pub struct JsonLinesSource<R: BufRead> {
    reader: R,
    line: String,
    line_number: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .context("Failed to read landmark input")?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_frame(trimmed) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(line = self.line_number, error = %e, "Skipping unreadable frame"),
            }
        }
    }
}

/// Hand shapes the simulator can produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimPose {
    Pointer,
    Pinch,
    Drag,
    /// `spread` pushes the thumb away from the index finger.
    PinchZoom { spread: f64 },
}

impl SimPose {
    // (landmark, dx, dy) relative to the hand center, at scale 1.0
    fn offsets(&self) -> [(usize, f64, f64); 6] {
        match *self {
            SimPose::Pointer => [
                (WRIST, 0.0, 0.2),
                (THUMB_TIP, -0.2, 0.12),
                (INDEX_TIP, -0.12, 0.0),
                (MIDDLE_TIP, 0.0, -0.02),
                (RING_TIP, 0.1, 0.0),
                (PINKY_TIP, 0.17, 0.06),
            ],
            SimPose::Pinch => [
                (WRIST, 0.0, 0.2),
                (THUMB_TIP, -0.11, 0.01),
                (INDEX_TIP, -0.12, 0.0),
                (MIDDLE_TIP, 0.0, -0.02),
                (RING_TIP, 0.1, 0.0),
                (PINKY_TIP, 0.17, 0.06),
            ],
            SimPose::Drag => [
                (WRIST, 0.0, 0.2),
                (THUMB_TIP, 0.05, 0.1),
                (INDEX_TIP, -0.02, -0.01),
                (MIDDLE_TIP, 0.02, -0.02),
                (RING_TIP, 0.06, 0.1),
                (PINKY_TIP, 0.1, 0.12),
            ],
            SimPose::PinchZoom { spread } => [
                (WRIST, 0.0, 0.2),
                (THUMB_TIP, -0.15 - spread, 0.1),
                (INDEX_TIP, -0.02, 0.0),
                (MIDDLE_TIP, 0.02, -0.01),
                (RING_TIP, 0.06, 0.12),
                (PINKY_TIP, 0.1, 0.13),
            ],
        }
    }
}

/// Builds a hand in `pose` centered on `(cx, cy)`. `scale` shrinks or grows
/// the hand as if it moved away from or toward the camera. Left hands are
/// mirrored.
pub fn synthetic_hand(handedness: Handedness, pose: SimPose, cx: f64, cy: f64, scale: f64) -> Hand {
    let mirror = match handedness {
        Handedness::Right => 1.0,
        Handedness::Left => -1.0,
    };
    let mut hand = Hand::new(handedness);
    for (id, dx, dy) in pose.offsets() {
        hand.keypoints
            .insert(id, Keypoint::new(cx + mirror * dx * scale, cy + dy * scale, 0.0));
    }
    hand
}

/// Scripted demo input: cycles through every gesture so the whole pipeline
/// can be exercised without a camera or detector.
pub struct SimulatedSource {
    frame_interval: Duration,
    pace: bool,
    frame_index: u64,
    max_frames: Option<u64>,
}

const PHASE_FRAMES: u64 = 60;
const PHASE_COUNT: u64 = 7;

impl SimulatedSource {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval,
            pace: true,
            frame_index: 0,
            max_frames: None,
        }
    }

    /// Produce frames as fast as they are pulled, without sleeping.
    pub fn unpaced(mut self) -> Self {
        self.pace = false;
        self
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    fn build_frame(&self) -> Frame {
        let timestamp_ms = (self.frame_index as u128 * self.frame_interval.as_millis()) as i64;
        let phase = (self.frame_index / PHASE_FRAMES) % PHASE_COUNT;
        let t = (self.frame_index % PHASE_FRAMES) as f64 / PHASE_FRAMES as f64;
        let wobble = (t * std::f64::consts::TAU).sin();

        let mut frame = Frame::empty(timestamp_ms);
        let right = |pose, cx, cy| synthetic_hand(Handedness::Right, pose, cx, cy, 1.0);
        let left = |pose, cx, cy| synthetic_hand(Handedness::Left, pose, cx, cy, 1.0);

        match phase {
            0 => {
                frame.insert(right(SimPose::Pointer, 0.6 + 0.1 * wobble, 0.4));
            }
            1 => {
                frame.insert(right(SimPose::Pinch, 0.6, 0.4 + 0.05 * wobble));
            }
            2 => {
                frame.insert(right(SimPose::Drag, 0.5 + 0.2 * t, 0.4));
            }
            3 => {
                frame.insert(right(SimPose::PinchZoom { spread: 0.05 * t }, 0.6, 0.4));
            }
            4 => {}
            5 => {
                frame.insert(left(SimPose::Pinch, 0.3, 0.4));
            }
            _ => {
                let half_gap = 0.15 + 0.1 * t;
                frame.insert(right(SimPose::Pointer, 0.5 + half_gap, 0.4));
                frame.insert(left(SimPose::Pointer, 0.5 - half_gap, 0.4));
            }
        }
        frame
    }
}

impl LandmarkSource for SimulatedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.max_frames.is_some_and(|max| self.frame_index >= max) {
            return Ok(None);
        }
        if self.pace && self.frame_index > 0 {
            std::thread::sleep(self.frame_interval);
        }
        let frame = self.build_frame();
        self.frame_index += 1;
        Ok(Some(frame))
    }
}
