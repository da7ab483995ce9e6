use log::{info, warn};

use crate::{
    config::LoopTiming,
    decision,
    error::ReportError,
    ports::{Actuators, Clock, Sensors},
    telemetry::{self, Ack},
    transport::Transport,
    types::{ActuatorState, Decision, Reading},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Booting,
    Running,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booting => "BOOTING",
            Self::Running => "RUNNING",
        }
    }
}

/// What happened during one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub reading: Reading,
    pub report: Result<Ack, ReportError>,
    pub decision: Option<Decision>,
}

/// Sample, report, fetch, actuate. Owns every collaborator; nothing global.
pub struct ControlLoop<T, S, A, C> {
    transport: T,
    sensors: S,
    actuators: A,
    clock: C,
    timing: LoopTiming,
    state: LoopState,
    actuator_state: ActuatorState,
    cycles: u64,
}

impl<T, S, A, C> ControlLoop<T, S, A, C>
where
    T: Transport,
    S: Sensors,
    A: Actuators,
    C: Clock,
{
    pub fn new(transport: T, sensors: S, actuators: A, clock: C, timing: LoopTiming) -> Self {
        Self {
            transport,
            sensors,
            actuators,
            clock,
            timing,
            state: LoopState::Booting,
            actuator_state: ActuatorState::default(),
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn actuator_state(&self) -> ActuatorState {
        self.actuator_state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    /// Called once setup has finished.
    pub fn start(&mut self) {
        if self.state == LoopState::Booting {
            self.state = LoopState::Running;
            info!(
                "control loop running: interval {}ms, pacing {}ms",
                self.timing.cycle_interval_ms, self.timing.pacing_delay_ms
            );
        }
    }

    pub fn sample(&mut self) -> Reading {
        let temperature_c = self.sensors.read_temperature();
        let presence = self.sensors.read_presence();
        let reading = Reading::new(temperature_c, presence, self.clock.now());

        if reading.sensor_fault() {
            warn!("temperature sensor fault; reporting null temperature");
        }
        info!(
            "reading: temperature={:.2}°C presence={} time={}",
            reading.temperature_c, reading.presence, reading.timestamp
        );
        reading
    }

    /// One full cycle without the trailing interval sleep.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.start();
        self.cycles = self.cycles.saturating_add(1);

        let reading = self.sample();

        let report = telemetry::report(&mut self.transport, &reading);
        if let Err(err) = &report {
            warn!("cycle {}: {err}", self.cycles);
        }

        self.clock.delay(self.timing.pacing_delay());

        let decision = decision::fetch(&mut self.transport);
        match decision {
            Some(decision) => self.apply(decision),
            None => info!(
                "cycle {}: no decision, keeping fan={} light={}",
                self.cycles, self.actuator_state.fan_on, self.actuator_state.light_on
            ),
        }

        CycleReport {
            reading,
            report,
            decision,
        }
    }

    pub fn run(mut self) -> ! {
        self.start();
        loop {
            self.run_cycle();
            self.clock.delay(self.timing.cycle_interval());
        }
    }

    fn apply(&mut self, decision: Decision) {
        self.actuators.set_fan(decision.fan_on);
        self.actuators.set_light(decision.light_on);
        self.actuator_state = ActuatorState::from(decision);
        info!(
            "cycle {}: applied fan={} light={}",
            self.cycles, decision.fan_on, decision.light_on
        );
    }
}
