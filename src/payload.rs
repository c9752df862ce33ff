// src/payload.rs - Outbound action events and their wire mapping
use crate::gesture::GestureState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The action of the moment. Each variant carries only the fields that
/// action defines; positions are normalized image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    None,
    Pointer {
        x: f64,
        y: f64,
    },
    Pinch {
        x: f64,
        y: f64,
    },
    LeftPinch {
        x: f64,
        y: f64,
    },
    Drag {
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
    },
    PinchZoom {
        x: f64,
        y: f64,
        delta_zoom: f64,
        current_dist: f64,
    },
    ExpansionZoom {
        x: f64,
        y: f64,
        delta_zoom: f64,
        current_dist: f64,
    },
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event must have exactly one top-level key, found {0}")]
    KeyCount(usize),
    #[error("unknown action label '{0}'")]
    UnknownAction(String),
    #[error("top-level key '{key}' does not match action '{action}'")]
    LabelMismatch { key: String, action: GestureState },
    #[error("'{action}' event is missing field '{field}'")]
    MissingField {
        action: GestureState,
        field: &'static str,
    },
}

// Body of `{"<label>": {...}}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireBody {
    action: GestureState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_dist: Option<f64>,
}

impl WireBody {
    fn require(&self, value: Option<f64>, field: &'static str) -> Result<f64, PayloadError> {
        value.ok_or(PayloadError::MissingField {
            action: self.action,
            field,
        })
    }
}

impl ActionPayload {
    pub fn action(&self) -> GestureState {
        match self {
            ActionPayload::None => GestureState::None,
            ActionPayload::Pointer { .. } => GestureState::Pointer,
            ActionPayload::Pinch { .. } => GestureState::Pinch,
            ActionPayload::LeftPinch { .. } => GestureState::LeftPinch,
            ActionPayload::Drag { .. } => GestureState::Drag,
            ActionPayload::PinchZoom { .. } => GestureState::PinchZoom,
            ActionPayload::ExpansionZoom { .. } => GestureState::ExpansionZoom,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ActionPayload::None)
    }

    fn to_body(&self) -> WireBody {
        let mut body = WireBody {
            action: self.action(),
            ..WireBody::default()
        };
        match *self {
            ActionPayload::None => {}
            ActionPayload::Pointer { x, y }
            | ActionPayload::Pinch { x, y }
            | ActionPayload::LeftPinch { x, y } => {
                body.x = Some(x);
                body.y = Some(y);
            }
            ActionPayload::Drag { x, y, delta_x, delta_y } => {
                body.x = Some(x);
                body.y = Some(y);
                body.delta_x = Some(delta_x);
                body.delta_y = Some(delta_y);
            }
            ActionPayload::PinchZoom { x, y, delta_zoom, current_dist }
            | ActionPayload::ExpansionZoom { x, y, delta_zoom, current_dist } => {
                body.x = Some(x);
                body.y = Some(y);
                body.delta_zoom = Some(delta_zoom);
                body.current_dist = Some(current_dist);
            }
        }
        body
    }

    fn from_body(body: &WireBody) -> Result<Self, PayloadError> {
        let payload = match body.action {
            GestureState::None => ActionPayload::None,
            GestureState::Pointer => ActionPayload::Pointer {
                x: body.require(body.x, "x")?,
                y: body.require(body.y, "y")?,
            },
            GestureState::Pinch => ActionPayload::Pinch {
                x: body.require(body.x, "x")?,
                y: body.require(body.y, "y")?,
            },
            GestureState::LeftPinch => ActionPayload::LeftPinch {
                x: body.require(body.x, "x")?,
                y: body.require(body.y, "y")?,
            },
            GestureState::Drag => ActionPayload::Drag {
                x: body.require(body.x, "x")?,
                y: body.require(body.y, "y")?,
                delta_x: body.require(body.delta_x, "delta_x")?,
                delta_y: body.require(body.delta_y, "delta_y")?,
            },
            GestureState::PinchZoom => ActionPayload::PinchZoom {
                x: body.require(body.x, "x")?,
                y: body.require(body.y, "y")?,
                delta_zoom: body.require(body.delta_zoom, "delta_zoom")?,
                current_dist: body.require(body.current_dist, "current_dist")?,
            },
            GestureState::ExpansionZoom => ActionPayload::ExpansionZoom {
                x: body.require(body.x, "x")?,
                y: body.require(body.y, "y")?,
                delta_zoom: body.require(body.delta_zoom, "delta_zoom")?,
                current_dist: body.require(body.current_dist, "current_dist")?,
            },
        };
        Ok(payload)
    }

    /// `{"<label>": {"action": "<label>", ...fields}}`
    pub fn to_wire_json(&self) -> Result<String, PayloadError> {
        let event = BTreeMap::from([(self.action().as_str(), self.to_body())]);
        Ok(serde_json::to_string(&event)?)
    }

    pub fn from_wire_json(text: &str) -> Result<Self, PayloadError> {
        let event: BTreeMap<String, WireBody> = serde_json::from_str(text)?;
        if event.len() != 1 {
            return Err(PayloadError::KeyCount(event.len()));
        }
        let Some((key, body)) = event.iter().next() else {
            return Err(PayloadError::KeyCount(0));
        };
        let label = GestureState::from_label(key).ok_or_else(|| PayloadError::UnknownAction(key.clone()))?;
        if label != body.action {
            return Err(PayloadError::LabelMismatch {
                key: key.clone(),
                action: body.action,
            });
        }
        Self::from_body(body)
    }
}
