use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::Context;
use tracing::{info, warn};

use smarthub_common::{
    Actuators, ConnectError, ControlLoop, Connector, EndpointConfig, Exchange, Method, Request,
    Response, RuntimeConfig, Sensors, Session, TransportError, HEADER_CONTENT_LENGTH,
};

use crate::clock::{self, WallClock};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = data_dir().join("runtime.json");
    let mut runtime = load_runtime_config(&config_path)
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load {}: {err:#}", config_path.display());
            RuntimeConfig::default()
        });
    runtime.apply_overrides(|key| std::env::var(key).ok());
    runtime.sanitize();
    runtime.validate().context("invalid runtime config")?;

    let timezone = clock::parse_timezone(&runtime.clock.timezone)?;
    info!(
        "hub endpoint {} (certificate verification: {:?}, timeout {}ms)",
        runtime.endpoint.base_url(),
        runtime.endpoint.certificate_verification,
        runtime.endpoint.timeout_ms,
    );

    let endpoint = runtime.endpoint.clone();
    let timing = runtime.timing;
    thread::Builder::new()
        .name("control-loop".into())
        .spawn(move || {
            let session = Session::new(endpoint, ReqwestConnector);
            let control = ControlLoop::new(
                session,
                SimulatedSensors::default(),
                LoggingActuators::default(),
                WallClock::new(timezone),
                timing,
            );
            control.run();
        })
        .context("failed to spawn control loop thread")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    Ok(())
}

fn data_dir() -> PathBuf {
    std::env::var("SMARTHUB_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.smarthub"))
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

/// Opens blocking reqwest clients; TLS via rustls.
struct ReqwestConnector;

struct ReqwestConnection {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl Connector for ReqwestConnector {
    type Connection = ReqwestConnection;

    fn connect(&mut self, endpoint: &EndpointConfig) -> Result<ReqwestConnection, ConnectError> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(!endpoint.verifies_certificate())
            .connect_timeout(endpoint.timeout())
            .timeout(endpoint.timeout())
            .build()
            .map_err(|err| ConnectError::Tls(err.to_string()))?;

        Ok(ReqwestConnection {
            client,
            base_url: endpoint.base_url(),
        })
    }
}

impl Exchange for ReqwestConnection {
    fn exchange(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let url = format!("{}{}", self.base_url, request.path);

        let mut outgoing = self.client.request(method, url).timeout(timeout);
        for (name, value) in &request.headers {
            // reqwest derives Content-Length from the body.
            if name.eq_ignore_ascii_case(HEADER_CONTENT_LENGTH) {
                continue;
            }
            outgoing = outgoing.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            outgoing = outgoing.body(request.body.clone());
        }

        let response = outgoing
            .send()
            .map_err(|err| classify_error(err, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| classify_error(err, timeout))?;

        Ok(Response {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Unreachable(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Reset(err.to_string())
    }
}

/// Stand-in for the DS18B20 and PIR on machines without the hardware.
#[derive(Default)]
struct SimulatedSensors {
    tick: u64,
}

impl Sensors for SimulatedSensors {
    fn read_temperature(&mut self) -> f32 {
        self.tick = self.tick.saturating_add(1);
        20.0 + (self.tick % 8) as f32 * 0.5
    }

    fn read_presence(&mut self) -> bool {
        (self.tick / 3) % 2 == 0
    }
}

#[derive(Debug, Default)]
struct LoggingActuators {
    fan_on: bool,
    light_on: bool,
}

impl Actuators for LoggingActuators {
    fn set_fan(&mut self, on: bool) {
        if on != self.fan_on {
            info!("fan -> {}", if on { "ON" } else { "OFF" });
        }
        self.fan_on = on;
    }

    fn set_light(&mut self, on: bool) {
        if on != self.light_on {
            info!("light -> {}", if on { "ON" } else { "OFF" });
        }
        self.light_on = on;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{
        body::Bytes,
        http::{header, HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;
    use smarthub_common::{
        decision, telemetry, Clock, LoopTiming, Reading, ReportError, Transport,
    };
    use tokio::task::JoinHandle;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct CapturedPost {
        content_type: Option<String>,
        content_length: Option<String>,
        body: String,
    }

    type Captured = Arc<Mutex<Vec<CapturedPost>>>;

    async fn spawn_mock_hub(
        decision_status: StatusCode,
        decision_body: &'static str,
        decision_delay: Duration,
    ) -> (SocketAddr, Captured, JoinHandle<()>) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();

        let router = Router::new()
            .route(
                "/api/data",
                post(move |headers: HeaderMap, body: Bytes| {
                    let sink = sink.clone();
                    async move {
                        let header_value = |name: header::HeaderName| {
                            headers
                                .get(name)
                                .and_then(|value| value.to_str().ok())
                                .map(str::to_string)
                        };
                        sink.lock().unwrap().push(CapturedPost {
                            content_type: header_value(header::CONTENT_TYPE),
                            content_length: header_value(header::CONTENT_LENGTH),
                            body: String::from_utf8_lossy(&body).into_owned(),
                        });
                        Json(serde_json::json!({ "message": "Data received" }))
                    }
                }),
            )
            .route(
                "/api/decision",
                get(move || async move {
                    tokio::time::sleep(decision_delay).await;
                    (decision_status, decision_body)
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (addr, captured, handle)
    }

    fn plain_endpoint(addr: SocketAddr, timeout_ms: u64) -> EndpointConfig {
        EndpointConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            use_tls: false,
            timeout_ms,
            ..EndpointConfig::default()
        }
    }

    struct FixedSensors;

    impl Sensors for FixedSensors {
        fn read_temperature(&mut self) -> f32 {
            21.5
        }

        fn read_presence(&mut self) -> bool {
            true
        }
    }

    struct NoonClock;

    impl Clock for NoonClock {
        fn now(&self) -> Option<NaiveDateTime> {
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
        }

        fn delay(&mut self, _duration: Duration) {}
    }

    fn reading() -> Reading {
        Reading::new(21.5, true, NoonClock.now())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_cycle_against_local_service() {
        let (addr, captured, server) = spawn_mock_hub(
            StatusCode::OK,
            r#"{"turn_fan_on":true,"turn_light_on":false}"#,
            Duration::ZERO,
        )
        .await;

        let (fan_on, light_on, connects) = tokio::task::spawn_blocking(move || {
            let session = Session::new(plain_endpoint(addr, 2_000), ReqwestConnector);
            let mut control = ControlLoop::new(
                session,
                FixedSensors,
                LoggingActuators::default(),
                NoonClock,
                LoopTiming::default(),
            );
            let cycle = control.run_cycle();
            assert!(cycle.report.is_ok());
            (
                control.actuators().fan_on,
                control.actuators().light_on,
                control.transport().connects(),
            )
        })
        .await
        .unwrap();
        server.abort();

        assert!(fan_on);
        assert!(!light_on);
        assert_eq!(connects, 1);

        let body = r#"{"temperature":21.5,"presence":true,"datetime":"2024-01-01T12:00:00"}"#;
        assert_eq!(
            captured.lock().unwrap().clone(),
            vec![CapturedPost {
                content_type: Some("application/json".to_string()),
                content_length: Some(body.len().to_string()),
                body: body.to_string(),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_200_decision_is_ignored() {
        let (addr, _captured, server) = spawn_mock_hub(
            StatusCode::BAD_REQUEST,
            r#"{"detail":"Missing data"}"#,
            Duration::ZERO,
        )
        .await;

        let decision = tokio::task::spawn_blocking(move || {
            let mut session = Session::new(plain_endpoint(addr, 2_000), ReqwestConnector);
            decision::fetch(&mut session)
        })
        .await
        .unwrap();
        server.abort();

        assert_eq!(decision, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_service_yields_report_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (report, decision) = tokio::task::spawn_blocking(move || {
            let mut session = Session::new(plain_endpoint(addr, 1_000), ReqwestConnector);
            let report = telemetry::report(&mut session, &reading());
            let decision = decision::fetch(&mut session);
            (report, decision)
        })
        .await
        .unwrap();

        assert!(matches!(
            report,
            Err(ReportError::Transport(TransportError::Unreachable(_)))
        ));
        assert_eq!(decision, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_service_times_out_and_session_reconnects() {
        let (addr, _captured, server) = spawn_mock_hub(
            StatusCode::OK,
            r#"{"turn_fan_on":true}"#,
            Duration::from_secs(3),
        )
        .await;

        let (first, second, connects) = tokio::task::spawn_blocking(move || {
            let mut session = Session::new(plain_endpoint(addr, 200), ReqwestConnector);
            let first = session.request(&Request::get("/api/decision"));
            let body = br#"{"temperature":1.0,"presence":false,"datetime":"x"}"#.to_vec();
            let second = session.request(&Request::post_json("/api/data", body));
            (first, second, session.connects())
        })
        .await
        .unwrap();
        server.abort();

        assert_eq!(
            first,
            Err(TransportError::Timeout(Duration::from_millis(200)))
        );
        assert_eq!(second.unwrap().status, 200);
        assert_eq!(connects, 2);
    }

    #[test]
    fn logging_actuators_track_commanded_state() {
        let mut actuators = LoggingActuators::default();
        actuators.set_fan(true);
        actuators.set_light(true);
        actuators.set_light(false);

        assert!(actuators.fan_on);
        assert!(!actuators.light_on);
    }

    #[test]
    fn simulated_sensors_stay_in_room_range() {
        let mut sensors = SimulatedSensors::default();
        for _ in 0..20 {
            let temperature = sensors.read_temperature();
            assert!((20.0..=24.0).contains(&temperature));
        }
    }
}
