use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::ReportError,
    routes::PATH_TELEMETRY,
    transport::{Request, Transport},
    types::Reading,
};

/// Body of `POST /api/data`.
///
/// A non-finite temperature is sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub temperature: Option<f32>,
    pub presence: bool,
    pub datetime: String,
}

impl From<&Reading> for TelemetryPayload {
    fn from(reading: &Reading) -> Self {
        Self {
            temperature: reading
                .temperature_c
                .is_finite()
                .then_some(reading.temperature_c),
            presence: reading.presence,
            datetime: reading.timestamp.clone(),
        }
    }
}

/// Remote answer to a telemetry submission, kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
    pub body: String,
}

impl Ack {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn encode_reading(reading: &Reading) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&TelemetryPayload::from(reading))
}

pub fn report<T: Transport + ?Sized>(
    transport: &mut T,
    reading: &Reading,
) -> Result<Ack, ReportError> {
    let body = encode_reading(reading)?;
    let response = transport.request(&Request::post_json(PATH_TELEMETRY, body))?;
    let ack = Ack {
        status: response.status,
        body: response.body_text().into_owned(),
    };

    if ack.is_success() {
        info!("POST {PATH_TELEMETRY} -> {} {}", ack.status, ack.body);
    } else {
        warn!("POST {PATH_TELEMETRY} rejected -> {} {}", ack.status, ack.body);
    }
    Ok(ack)
}
