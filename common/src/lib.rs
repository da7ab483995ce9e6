pub mod config;
pub mod control;
pub mod decision;
pub mod error;
pub mod ports;
pub mod routes;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use config::{CertificateVerification, EndpointConfig, LoopTiming, RuntimeConfig};
pub use control::{ControlLoop, CycleReport, LoopState};
pub use error::{ConfigError, ConnectError, ParseError, ReportError, TransportError};
pub use ports::{Actuators, Clock, Sensors};
pub use routes::*;
pub use telemetry::{Ack, TelemetryPayload};
pub use transport::{Connector, Exchange, Method, Request, Response, Session, Transport};
pub use types::{ActuatorState, Decision, Reading, SENTINEL_TIMESTAMP};
