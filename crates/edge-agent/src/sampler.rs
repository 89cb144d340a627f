//! Simulated sensor feeding the relay.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relay_buffer::{Record, RecordSource};

/// Nominal temperature reading in degrees Celsius.
pub const BASE_TEMPERATURE: f64 = 23.5;

/// Nominal battery level in percent.
pub const BASE_BATTERY_LEVEL: i64 = 85;

/// Produces one `temperature` / `battery_level` reading per call.
pub struct TelemetrySampler {
    agent_id: String,
    rng: StdRng,
    /// Maximum deviation applied to the temperature, in degrees.
    jitter: f64,
}

impl TelemetrySampler {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            rng: StdRng::from_entropy(),
            jitter: 0.5,
        }
    }

    /// A sampler that always reports the nominal values.
    pub fn steady(agent_id: impl Into<String>) -> Self {
        Self {
            jitter: 0.0,
            ..Self::new(agent_id)
        }
    }

    fn temperature(&mut self) -> f64 {
        if self.jitter <= 0.0 {
            return BASE_TEMPERATURE;
        }
        let reading = BASE_TEMPERATURE + self.rng.gen_range(-self.jitter..=self.jitter);
        (reading * 10.0).round() / 10.0
    }
}

impl RecordSource for TelemetrySampler {
    fn next_record(&mut self) -> Record {
        let temperature = self.temperature();
        Record::new(self.agent_id.clone(), chrono::Utc::now())
            .with_field("temperature", temperature)
            .with_field("battery_level", BASE_BATTERY_LEVEL)
    }
}
