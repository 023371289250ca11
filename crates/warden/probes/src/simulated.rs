//! Simulated probes for tests and dry runs.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::probe::{IntegrityProbe, ProbeReading, Signal};
use crate::resource::{Dimension, HardwareProbe};

/// Hardware backend returning a settable value after an optional delay.
pub struct SimulatedHardwareProbe {
    dimension: Dimension,
    result: Mutex<Result<f64, ProbeError>>,
    delay: Duration,
}

impl SimulatedHardwareProbe {
    pub fn new(dimension: Dimension, value: f64) -> Self {
        Self {
            dimension,
            result: Mutex::new(Ok(value)),
            delay: Duration::ZERO,
        }
    }

    pub fn unavailable(dimension: Dimension, reason: &str) -> Self {
        Self {
            dimension,
            result: Mutex::new(Err(ProbeError::unavailable(reason))),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, value: f64) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Ok(value);
    }
}

#[async_trait]
impl HardwareProbe for SimulatedHardwareProbe {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    fn name(&self) -> &str {
        "simulated"
    }

    async fn probe(&self, _timeout: Duration) -> Result<f64, ProbeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Integrity probe for one signal with a settable reading.
pub struct SimulatedProbe {
    signal: Signal,
    result: Mutex<Result<ProbeReading, ProbeError>>,
    delay: Mutex<Duration>,
}

impl SimulatedProbe {
    pub fn healthy(signal: Signal) -> Self {
        Self::with_score(signal, 100.0)
    }

    pub fn with_score(signal: Signal, score: f64) -> Self {
        Self {
            signal,
            result: Mutex::new(Ok(ProbeReading::new(score))),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn unavailable(signal: Signal, reason: &str) -> Self {
        Self {
            signal,
            result: Mutex::new(Err(ProbeError::unavailable(reason))),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_score(&self, score: f64) {
        self.set_result(Ok(ProbeReading::new(score)));
    }

    pub fn set_unavailable(&self, reason: &str) {
        self.set_result(Err(ProbeError::unavailable(reason)));
    }

    pub fn set_result(&self, result: Result<ProbeReading, ProbeError>) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = result;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }
}

#[async_trait]
impl IntegrityProbe for SimulatedProbe {
    fn signal(&self) -> Signal {
        self.signal
    }

    async fn sample(&self) -> Result<ProbeReading, ProbeError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
