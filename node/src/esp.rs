use core::convert::TryInto;
use std::{thread, time::Duration};

use anyhow::{anyhow, Context};
use ds18b20::{Ds18b20, Resolution};
use embedded_svc::{
    http::{client::Client as HttpClient, Method as HttpMethod, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, IOPin, Input, InputOutput, InputPin, Output,
        OutputPin, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    io::EspIOError,
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use one_wire_bus::{Address, OneWire};

use smarthub_common::{
    config::NetworkConfig, Actuators, ConnectError, ControlLoop, Connector, EndpointConfig,
    Exchange, Method, Request, Response, RuntimeConfig, Sensors, Session, TransportError,
};

use crate::clock::{self, WallClock};

const FAN_PIN: i32 = 23;
const LIGHT_PIN: i32 = 22;
const MOTION_PIN: i32 = 15;
const DS18B20_PIN: i32 = 4;

const MAX_RESPONSE_BODY: usize = 4096;
const WIFI_RETRY_DELAY_MS: u64 = 500;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = runtime_config();
    runtime.validate().context("invalid runtime config")?;
    if runtime.network.wifi_ssid.is_empty() {
        return Err(anyhow!("WIFI_SSID was not set at build time"));
    }
    let timezone = clock::parse_timezone(&runtime.clock.timezone)?;

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, pins, .. } = Peripherals::take()?;

    let actuators = HubActuators::new(pins.gpio23.downgrade_output(), pins.gpio22.downgrade_output())
        .context("failed to configure actuator pins")?;
    let sensors = HubSensors::new(pins.gpio4.downgrade(), pins.gpio15.downgrade_input())
        .context("failed to initialize sensors")?;

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP started");

    if runtime.endpoint.use_tls && !runtime.endpoint.verifies_certificate() {
        warn!(
            "server certificate verification is disabled for {}",
            runtime.endpoint.base_url()
        );
    }

    // Keep the station alive for the program lifetime.
    let _wifi = wifi;

    let session = Session::new(runtime.endpoint.clone(), EspConnector);
    let control = ControlLoop::new(
        session,
        sensors,
        actuators,
        WallClock::new(timezone),
        runtime.timing,
    );
    control.run()
}

fn runtime_config() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.apply_overrides(|key| {
        let value = match key {
            "WIFI_SSID" => option_env!("WIFI_SSID"),
            "WIFI_PASS" => option_env!("WIFI_PASS"),
            "HUB_HOST" => option_env!("HUB_HOST"),
            "HUB_PORT" => option_env!("HUB_PORT"),
            "HUB_TLS" => option_env!("HUB_TLS"),
            "HUB_VERIFY_CERT" => option_env!("HUB_VERIFY_CERT"),
            "HUB_TIMEOUT_MS" => option_env!("HUB_TIMEOUT_MS"),
            "HUB_PACING_DELAY_MS" => option_env!("HUB_PACING_DELAY_MS"),
            "HUB_CYCLE_INTERVAL_MS" => option_env!("HUB_CYCLE_INTERVAL_MS"),
            "HUB_TIMEZONE" => option_env!("HUB_TIMEZONE"),
            _ => None,
        };
        value.map(str::to_string)
    });
    runtime.sanitize();
    runtime
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;
    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    // Nothing useful happens without the network; keep trying.
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                return Ok(wifi);
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt} failed: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }
}

/// DS18B20 on a one-wire bus plus the PIR output.
struct HubSensors {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    ds18_address: Option<Address>,
    motion: PinDriver<'static, AnyInputPin, Input>,
    delay: Ets,
}

impl HubSensors {
    fn new(ds18_pin: AnyIOPin, motion_pin: AnyInputPin) -> anyhow::Result<Self> {
        let mut one_wire_pin = PinDriver::input_output_od(ds18_pin)?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let one_wire = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;
        let motion = PinDriver::input(motion_pin)?;

        let mut sensors = Self {
            one_wire,
            ds18_address: None,
            motion,
            delay: Ets,
        };
        sensors.scan_bus();
        Ok(sensors)
    }

    fn scan_bus(&mut self) {
        self.ds18_address = None;
        let mut device_count = 0_u32;

        for addr in self.one_wire.devices(false, &mut self.delay) {
            match addr {
                Ok(address) => {
                    device_count = device_count.saturating_add(1);
                    if self.ds18_address.is_none() && address.family_code() == ds18b20::FAMILY_CODE
                    {
                        self.ds18_address = Some(address);
                    }
                }
                Err(err) => {
                    warn!("one-wire scan on GPIO{DS18B20_PIN} failed: {err:?}");
                    break;
                }
            }
        }

        match self.ds18_address {
            Some(address) => info!(
                "DS18B20 on GPIO{DS18B20_PIN}: {address:?} ({device_count} device(s) on bus)"
            ),
            None => warn!("no DS18B20 on GPIO{DS18B20_PIN} ({device_count} device(s) on bus)"),
        }
    }

    fn measure(&mut self) -> Option<f32> {
        if self.ds18_address.is_none() {
            self.scan_bus();
        }
        let address = self.ds18_address?;

        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid DS18B20 address {address:?}: {err:?}");
                self.ds18_address = None;
                return None;
            }
        };

        if let Err(err) =
            ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay)
        {
            warn!("failed to start DS18B20 conversion: {err:?}");
            self.ds18_address = None;
            return None;
        }
        Resolution::Bits12.delay_for_measurement_time(&mut self.delay);

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => Some(data.temperature),
            Err(err) => {
                warn!("failed to read DS18B20: {err:?}");
                self.ds18_address = None;
                None
            }
        }
    }
}

impl Sensors for HubSensors {
    fn read_temperature(&mut self) -> f32 {
        self.measure().unwrap_or(f32::NAN)
    }

    fn read_presence(&mut self) -> bool {
        self.motion.is_high()
    }
}

struct HubActuators {
    fan: PinDriver<'static, AnyOutputPin, Output>,
    light: PinDriver<'static, AnyOutputPin, Output>,
}

impl HubActuators {
    fn new(fan_pin: AnyOutputPin, light_pin: AnyOutputPin) -> anyhow::Result<Self> {
        let mut fan = PinDriver::output(fan_pin)?;
        let mut light = PinDriver::output(light_pin)?;
        fan.set_low()?;
        light.set_low()?;
        info!("fan on GPIO{FAN_PIN}, light on GPIO{LIGHT_PIN}, motion on GPIO{MOTION_PIN}");
        Ok(Self { fan, light })
    }
}

impl Actuators for HubActuators {
    fn set_fan(&mut self, on: bool) {
        if let Err(err) = self.fan.set_level(on.into()) {
            warn!("failed to drive fan GPIO{FAN_PIN}: {err:?}");
        }
    }

    fn set_light(&mut self, on: bool) {
        if let Err(err) = self.light.set_level(on.into()) {
            warn!("failed to drive light GPIO{LIGHT_PIN}: {err:?}");
        }
    }
}

/// ESP-IDF HTTP client. With verification skipped no CA bundle is attached;
/// this relies on `CONFIG_ESP_TLS_INSECURE` and
/// `CONFIG_ESP_TLS_SKIP_SERVER_CERT_VERIFY` (see `sdkconfig.defaults`).
struct EspConnector;

struct EspConnection {
    client: HttpClient<EspHttpConnection>,
    base_url: String,
}

impl Connector for EspConnector {
    type Connection = EspConnection;

    fn connect(&mut self, endpoint: &EndpointConfig) -> Result<EspConnection, ConnectError> {
        let conf = HttpClientConfiguration {
            timeout: Some(endpoint.timeout()),
            crt_bundle_attach: if endpoint.verifies_certificate() {
                Some(esp_idf_svc::sys::esp_crt_bundle_attach)
            } else {
                None
            },
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&conf)
            .map_err(|err| ConnectError::Tls(format!("{err:?}")))?;

        Ok(EspConnection {
            client: HttpClient::wrap(connection),
            base_url: endpoint.base_url(),
        })
    }
}

impl Exchange for EspConnection {
    /// The socket timeout is fixed when the connection is created.
    fn exchange(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
        };
        let url = format!("{}{}", self.base_url, request.path);
        let headers: Vec<(&str, &str)> = request
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        let mut outgoing = self
            .client
            .request(method, &url, &headers)
            .map_err(|err| classify_error(err, timeout))?;
        if !request.body.is_empty() {
            outgoing
                .write_all(&request.body)
                .map_err(|err| classify_error(err, timeout))?;
        }
        let mut response = outgoing
            .submit()
            .map_err(|err| classify_error(err, timeout))?;

        let status = response.status();
        let mut body = Vec::new();
        let mut chunk = [0_u8; 512];
        loop {
            let read = response
                .read(&mut chunk)
                .map_err(|err| classify_error(err, timeout))?;
            if read == 0 {
                break;
            }
            if body.len() + read > MAX_RESPONSE_BODY {
                return Err(TransportError::Malformed(format!(
                    "response body exceeds {MAX_RESPONSE_BODY} bytes"
                )));
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Ok(Response { status, body })
    }
}

fn classify_error(err: EspIOError, timeout: Duration) -> TransportError {
    let code = err.0.code();
    if code == esp_idf_svc::sys::ESP_ERR_HTTP_EAGAIN as i32
        || code == esp_idf_svc::sys::ESP_ERR_TIMEOUT as i32
    {
        TransportError::Timeout(timeout)
    } else if code == esp_idf_svc::sys::ESP_ERR_HTTP_CONNECT as i32 {
        TransportError::Unreachable(format!("{err:?}"))
    } else if code == esp_idf_svc::sys::ESP_ERR_HTTP_FETCH_HEADER as i32 {
        TransportError::Malformed(format!("{err:?}"))
    } else {
        TransportError::Reset(format!("{err:?}"))
    }
}
