use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::ParseError,
    routes::PATH_DECISION,
    transport::{Request, Transport},
    types::Decision,
};

/// Body of `GET /api/decision` as sent by the service.
///
/// Both keys are optional. A missing key or an explicit `null` resolves to
/// `false`; anything other than a boolean rejects the whole body. Extra keys
/// are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DecisionPayload {
    #[serde(default)]
    pub turn_fan_on: Option<bool>,
    #[serde(default)]
    pub turn_light_on: Option<bool>,
}

impl DecisionPayload {
    pub fn resolve(self) -> Decision {
        Decision {
            fan_on: self.turn_fan_on.unwrap_or(false),
            light_on: self.turn_light_on.unwrap_or(false),
        }
    }
}

pub fn parse_decision(body: &[u8]) -> Result<Decision, ParseError> {
    let value: Value = serde_json::from_slice(body).map_err(ParseError::Json)?;
    // Structs also deserialize from arrays; only objects are accepted.
    if !value.is_object() {
        return Err(ParseError::NotAnObject);
    }
    let payload: DecisionPayload = serde_json::from_value(value).map_err(ParseError::Schema)?;
    Ok(payload.resolve())
}

/// `None` means "leave the actuators alone": the request failed, the status
/// was not exactly 200, or the body was rejected.
pub fn fetch<T: Transport + ?Sized>(transport: &mut T) -> Option<Decision> {
    let response = match transport.request(&Request::get(PATH_DECISION)) {
        Ok(response) => response,
        Err(err) => {
            warn!("GET {PATH_DECISION} failed: {err}");
            return None;
        }
    };

    info!(
        "GET {PATH_DECISION} -> {} {}",
        response.status,
        response.body_text()
    );

    if response.status != 200 {
        debug!("no decision: status {}", response.status);
        return None;
    }

    match parse_decision(&response.body) {
        Ok(decision) => Some(decision),
        Err(err) => {
            warn!("no decision: {err}");
            None
        }
    }
}
