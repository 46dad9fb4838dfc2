use crate::collaborators::SensorSource;
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::reading::Reading;
use crate::scheduler::Clock;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::sync::{Arc, Mutex};

const TEMPERATURE_C: Range<f64> = 20.0..30.0;
const HUMIDITY_PCT: Range<f64> = 30.0..70.0;
const PRESSURE_HPA: Range<f64> = 980.0..1020.0;
const GAS_OHMS: Range<f64> = 5_000.0..50_000.0;

/// Stand-in for the BME680 register reader: uniform draws over typical indoor ranges.
pub struct SimulatedSensor {
    rng: Mutex<StdRng>,
    temperature_offset: f64,
    clock: Arc<dyn Clock>,
}

impl SimulatedSensor {
    pub fn new(config: &SensorConfig, clock: Arc<dyn Clock>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            temperature_offset: config.temperature_offset,
            clock,
        }
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| SensorError::Io("simulated sensor state poisoned".to_string()))?;
        let reading = Reading {
            timestamp: self.clock.now(),
            temperature: round2(rng.gen_range(TEMPERATURE_C)) + self.temperature_offset,
            humidity: round2(rng.gen_range(HUMIDITY_PCT)),
            pressure: round2(rng.gen_range(PRESSURE_HPA)),
            gas_resistance: round2(rng.gen_range(GAS_OHMS)),
        };
        tracing::trace!(
            temperature = reading.temperature,
            humidity = reading.humidity,
            pressure = reading.pressure,
            gas = reading.gas_resistance,
            "simulated sensor sample"
        );
        Ok(reading)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
