// src/emitter.rs - Rate limiting and deduplication of outbound events
use crate::config::EmitterConfig;
use crate::gesture::GestureState;
use crate::payload::{ActionPayload, PayloadError};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// Serialized event ready for the transport.
    Send(String),
    Throttled,
    /// A `none` while the consumer already believes nothing is active.
    Duplicate,
}

/// Decides which payloads leave the process.
///
/// Gesture events are limited to one per `throttle` interval. `none` is
/// never throttled, but is only sent when the last event the consumer saw
/// was something else.
#[derive(Debug)]
pub struct EventEmitter {
    throttle: Duration,
    last_sent_at: Option<Instant>,
    last_sent_action: Option<GestureState>,
}

impl EventEmitter {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last_sent_at: None,
            last_sent_action: None,
        }
    }

    pub fn from_config(config: &EmitterConfig) -> Self {
        Self::new(config.throttle_interval())
    }

    pub fn admit(&mut self, payload: &ActionPayload, now: Instant) -> Result<Emission, PayloadError> {
        if payload.is_none() {
            if self.last_sent_action == Some(GestureState::None) {
                return Ok(Emission::Duplicate);
            }
        } else if let Some(at) = self.last_sent_at {
            if now.saturating_duration_since(at) < self.throttle {
                trace!(action = %payload.action(), "Throttled");
                return Ok(Emission::Throttled);
            }
        }

        let line = payload.to_wire_json()?;
        if !payload.is_none() {
            self.last_sent_at = Some(now);
        }
        self.last_sent_action = Some(payload.action());
        Ok(Emission::Send(line))
    }
}
