use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whether the server certificate chain is checked during the TLS handshake.
///
/// The hub's decision service runs with a self-signed certificate, so the
/// shipped default is `Skipped`. The channel is still encrypted but the peer
/// is not authenticated; anyone able to intercept traffic to `host` can feed
/// decisions to the actuators. Set `Enforced` once the service has a
/// certificate that chains to a trusted root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateVerification {
    Enforced,
    #[default]
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub certificate_verification: CertificateVerification,
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "smarthub.local".to_string(),
            port: 443,
            use_tls: true,
            certificate_verification: CertificateVerification::Skipped,
            timeout_ms: 5_000,
        }
    }
}

impl EndpointConfig {
    pub fn scheme(&self) -> &'static str {
        if self.use_tls {
            "https"
        } else {
            "http"
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn verifies_certificate(&self) -> bool {
        self.certificate_verification == CertificateVerification::Enforced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTiming {
    /// Gap between the telemetry POST and the decision GET.
    pub pacing_delay_ms: u64,
    pub cycle_interval_ms: u64,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            pacing_delay_ms: 500,
            cycle_interval_ms: 10_000,
        }
    }
}

impl LoopTiming {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// IANA name used when rendering reading timestamps.
    pub timezone: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub endpoint: EndpointConfig,
    pub timing: LoopTiming,
    pub network: NetworkConfig,
    pub clock: ClockConfig,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.endpoint.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.timing.cycle_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// Overlay `HUB_*` / `WIFI_*` variables. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ssid) = lookup("WIFI_SSID") {
            self.network.wifi_ssid = ssid;
        }
        if let Some(pass) = lookup("WIFI_PASS") {
            self.network.wifi_pass = pass;
        }
        if let Some(host) = lookup("HUB_HOST") {
            self.endpoint.host = host;
        }
        if let Some(port) = lookup("HUB_PORT").and_then(|value| value.parse().ok()) {
            self.endpoint.port = port;
        }
        if let Some(use_tls) = lookup("HUB_TLS").and_then(|value| parse_flag(&value)) {
            self.endpoint.use_tls = use_tls;
        }
        if let Some(verify) = lookup("HUB_VERIFY_CERT").and_then(|value| parse_flag(&value)) {
            self.endpoint.certificate_verification = if verify {
                CertificateVerification::Enforced
            } else {
                CertificateVerification::Skipped
            };
        }
        if let Some(timeout_ms) = lookup("HUB_TIMEOUT_MS").and_then(|value| value.parse().ok()) {
            self.endpoint.timeout_ms = timeout_ms;
        }
        if let Some(pacing) = lookup("HUB_PACING_DELAY_MS").and_then(|value| value.parse().ok()) {
            self.timing.pacing_delay_ms = pacing;
        }
        if let Some(interval) =
            lookup("HUB_CYCLE_INTERVAL_MS").and_then(|value| value.parse().ok())
        {
            self.timing.cycle_interval_ms = interval;
        }
        if let Some(timezone) = lookup("HUB_TIMEZONE") {
            self.clock.timezone = timezone;
        }
    }

    pub fn sanitize(&mut self) {
        self.endpoint.host = self.endpoint.host.trim().to_string();
        self.endpoint.timeout_ms = self.endpoint.timeout_ms.clamp(500, 60_000);
        self.timing.pacing_delay_ms = self.timing.pacing_delay_ms.min(5_000);
        self.timing.cycle_interval_ms = self.timing.cycle_interval_ms.clamp(1_000, 3_600_000);

        if self.clock.timezone.trim().is_empty() {
            self.clock.timezone = ClockConfig::default().timezone;
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let raw = r#"{"endpoint":{"host":"hub.example.net","port":8443}}"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.endpoint.host, "hub.example.net");
        assert_eq!(config.endpoint.port, 8443);
        assert!(config.endpoint.use_tls);
        assert_eq!(
            config.endpoint.certificate_verification,
            CertificateVerification::Skipped
        );
        assert_eq!(config.timing, LoopTiming::default());
        assert_eq!(config.clock, ClockConfig::default());
    }

    #[test]
    fn verification_mode_uses_lowercase_names() {
        let raw = r#"{"certificate_verification":"enforced"}"#;
        let endpoint: EndpointConfig = serde_json::from_str(raw).unwrap();
        assert!(endpoint.verifies_certificate());
    }

    #[test]
    fn builds_urls_from_scheme_host_and_port() {
        let mut endpoint = EndpointConfig {
            host: "10.0.0.7".to_string(),
            port: 8443,
            ..EndpointConfig::default()
        };
        assert_eq!(endpoint.url("/api/data"), "https://10.0.0.7:8443/api/data");

        endpoint.use_tls = false;
        assert_eq!(endpoint.base_url(), "http://10.0.0.7:8443");
    }

    #[test]
    fn validate_rejects_unusable_endpoint() {
        let mut config = RuntimeConfig::default();
        assert_eq!(config.validate(), Ok(()));

        config.endpoint.host = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));

        config.endpoint.host = "hub".to_string();
        config.endpoint.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));

        config.endpoint.port = 443;
        config.timing.cycle_interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn overrides_replace_only_provided_values() {
        let mut config = RuntimeConfig::default();
        config.apply_overrides(|key| match key {
            "HUB_HOST" => Some("192.168.4.20".to_string()),
            "HUB_PORT" => Some("8000".to_string()),
            "HUB_TLS" => Some("false".to_string()),
            "HUB_VERIFY_CERT" => Some("1".to_string()),
            "HUB_TIMEOUT_MS" => Some("not-a-number".to_string()),
            "HUB_TIMEZONE" => Some("Europe/Berlin".to_string()),
            _ => None,
        });

        assert_eq!(config.endpoint.host, "192.168.4.20");
        assert_eq!(config.endpoint.port, 8000);
        assert!(!config.endpoint.use_tls);
        assert!(config.endpoint.verifies_certificate());
        assert_eq!(config.endpoint.timeout_ms, 5_000);
        assert_eq!(config.clock.timezone, "Europe/Berlin");
        assert_eq!(config.timing, LoopTiming::default());
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn sanitize_clamps_timing() {
        let mut config = RuntimeConfig::default();
        config.endpoint.timeout_ms = 1;
        config.timing.pacing_delay_ms = 90_000;
        config.timing.cycle_interval_ms = 10;
        config.clock.timezone = String::new();

        config.sanitize();

        assert_eq!(config.endpoint.timeout_ms, 500);
        assert_eq!(config.timing.pacing_delay_ms, 5_000);
        assert_eq!(config.timing.cycle_interval_ms, 1_000);
        assert_eq!(config.clock.timezone, "UTC");
    }
}
