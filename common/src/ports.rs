//! Peripheral boundaries consumed by the control loop.
//!
//! Adapters for the ESP32 build live in the node binary; tests use the fakes
//! in [`crate::control`].

use std::time::Duration;

use chrono::NaiveDateTime;

pub trait Sensors {
    /// Degrees Celsius, or NaN when the probe is missing or the read failed.
    fn read_temperature(&mut self) -> f32;

    fn read_presence(&mut self) -> bool;
}

pub trait Actuators {
    fn set_fan(&mut self, on: bool);

    fn set_light(&mut self, on: bool);
}

pub trait Clock {
    /// Local wall-clock time, `None` until synchronised.
    fn now(&self) -> Option<NaiveDateTime>;

    /// Block the calling thread.
    fn delay(&mut self, duration: Duration);
}
