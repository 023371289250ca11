use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use tracing::{debug, warn};
use warden_types::now_ms;

use crate::error::ProbeError;
use crate::knee::Knee;
use crate::probe::{IntegrityProbe, ProbeReading, Signal};

/// One resource pressure dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Gpu,
    DiskFree,
    IoLatency,
    Memory,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Gpu,
        Dimension::DiskFree,
        Dimension::IoLatency,
        Dimension::Memory,
    ];

    /// Metric name, including its unit.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Gpu => "gpu_pct",
            Dimension::DiskFree => "disk_free_pct",
            Dimension::IoLatency => "io_latency_ms",
            Dimension::Memory => "mem_pressure_pct",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measured value, or the reason it could not be measured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Reading {
    Available(f64),
    Unavailable(String),
}

impl Reading {
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Available(v) => Some(*v),
            Reading::Unavailable(_) => None,
        }
    }
}

/// Point-in-time resource probe result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub gpu_pct: Reading,
    pub disk_free_pct: Reading,
    pub io_latency_ms: Reading,
    pub mem_pressure_pct: Reading,
    pub taken_at_ms: u64,
}

impl ResourceSnapshot {
    fn unmeasured(taken_at_ms: u64) -> Self {
        let none = || Reading::Unavailable("no backend configured".into());
        Self {
            gpu_pct: none(),
            disk_free_pct: none(),
            io_latency_ms: none(),
            mem_pressure_pct: none(),
            taken_at_ms,
        }
    }

    pub fn get(&self, dimension: Dimension) -> &Reading {
        match dimension {
            Dimension::Gpu => &self.gpu_pct,
            Dimension::DiskFree => &self.disk_free_pct,
            Dimension::IoLatency => &self.io_latency_ms,
            Dimension::Memory => &self.mem_pressure_pct,
        }
    }

    fn slot(&mut self, dimension: Dimension) -> &mut Reading {
        match dimension {
            Dimension::Gpu => &mut self.gpu_pct,
            Dimension::DiskFree => &mut self.disk_free_pct,
            Dimension::IoLatency => &mut self.io_latency_ms,
            Dimension::Memory => &mut self.mem_pressure_pct,
        }
    }
}

/// Platform backend for one resource dimension.
#[async_trait]
pub trait HardwareProbe: Send + Sync {
    fn dimension(&self) -> Dimension;

    fn name(&self) -> &str;

    /// Measure once. Must give up after `timeout`.
    async fn probe(&self, timeout: Duration) -> Result<f64, ProbeError>;
}

async fn blocking_probe<F>(timeout: Duration, f: F) -> Result<f64, ProbeError>
where
    F: FnOnce() -> Result<f64, ProbeError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(ProbeError::unavailable(format!("probe task failed: {e}"))),
        Err(_) => Err(ProbeError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

// ---- Backends ----

/// Memory pressure: share of physical memory not available, via `sysinfo`.
#[derive(Debug, Default, Clone)]
pub struct SysinfoMemoryProbe;

impl SysinfoMemoryProbe {
    fn read() -> Result<f64, ProbeError> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(ProbeError::unavailable("memory totals not reported"));
        }
        let available = sys.available_memory().min(total);
        Ok((total - available) as f64 / total as f64 * 100.0)
    }
}

#[async_trait]
impl HardwareProbe for SysinfoMemoryProbe {
    fn dimension(&self) -> Dimension {
        Dimension::Memory
    }

    fn name(&self) -> &str {
        "sysinfo-memory"
    }

    async fn probe(&self, timeout: Duration) -> Result<f64, ProbeError> {
        blocking_probe(timeout, Self::read).await
    }
}

/// Free space on the volume holding `path`, via `sysinfo`.
#[derive(Debug, Clone)]
pub struct SysinfoDiskProbe {
    path: PathBuf,
}

impl SysinfoDiskProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(path: PathBuf) -> Result<f64, ProbeError> {
        let target = path.canonicalize().unwrap_or(path);
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .ok_or_else(|| {
                ProbeError::unavailable(format!("no volume found for {}", target.display()))
            })?;
        let total = disk.total_space();
        if total == 0 {
            return Err(ProbeError::unavailable(format!(
                "volume {} reports zero size",
                disk.mount_point().display()
            )));
        }
        Ok(disk.available_space().min(total) as f64 / total as f64 * 100.0)
    }
}

#[async_trait]
impl HardwareProbe for SysinfoDiskProbe {
    fn dimension(&self) -> Dimension {
        Dimension::DiskFree
    }

    fn name(&self) -> &str {
        "sysinfo-disk"
    }

    async fn probe(&self, timeout: Duration) -> Result<f64, ProbeError> {
        let path = self.path.clone();
        blocking_probe(timeout, move || Self::read(path)).await
    }
}

/// Write latency: time to write and fsync a small scratch file.
#[derive(Debug, Clone)]
pub struct IoLatencyProbe {
    scratch_dir: PathBuf,
    bytes: usize,
}

impl IoLatencyProbe {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            bytes: 4096,
        }
    }

    fn read(dir: PathBuf, bytes: usize) -> Result<f64, ProbeError> {
        let buf = vec![0u8; bytes];
        let start = Instant::now();
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&buf)?;
        file.as_file().sync_all()?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

#[async_trait]
impl HardwareProbe for IoLatencyProbe {
    fn dimension(&self) -> Dimension {
        Dimension::IoLatency
    }

    fn name(&self) -> &str {
        "io-latency"
    }

    async fn probe(&self, timeout: Duration) -> Result<f64, ProbeError> {
        let dir = self.scratch_dir.clone();
        let bytes = self.bytes;
        blocking_probe(timeout, move || Self::read(dir, bytes)).await
    }
}

/// GPU utilization from `nvidia-smi`. Reports the busiest device.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    binary: PathBuf,
}

impl NvidiaSmiProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Parse `--format=csv,noheader,nounits` utilization output.
    pub fn parse_utilization(output: &str) -> Result<f64, ProbeError> {
        let mut busiest: Option<f64> = None;
        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let value: f64 = line.parse().map_err(|_| {
                ProbeError::unavailable(format!("unexpected nvidia-smi output: {line}"))
            })?;
            busiest = Some(busiest.map_or(value, |b| b.max(value)));
        }
        busiest.ok_or_else(|| ProbeError::unavailable("no GPU reported"))
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new("nvidia-smi")
    }
}

#[async_trait]
impl HardwareProbe for NvidiaSmiProbe {
    fn dimension(&self) -> Dimension {
        Dimension::Gpu
    }

    fn name(&self) -> &str {
        "nvidia-smi"
    }

    async fn probe(&self, timeout: Duration) -> Result<f64, ProbeError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => {
                return Err(ProbeError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::unavailable("nvidia-smi not found"))
            }
            Ok(Err(e)) => return Err(ProbeError::unavailable(format!("nvidia-smi failed: {e}"))),
            Ok(Ok(output)) => output,
        };
        if !output.status.success() {
            return Err(ProbeError::unavailable(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }
        Self::parse_utilization(&String::from_utf8_lossy(&output.stdout))
    }
}

// ---- Configuration ----

/// Sub-score knees per dimension.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceKnees {
    pub gpu_pct: Knee,
    pub disk_free_pct: Knee,
    pub io_latency_ms: Knee,
    pub mem_pressure_pct: Knee,
}

impl Default for ResourceKnees {
    fn default() -> Self {
        Self {
            gpu_pct: Knee::new(70.0, 98.0),
            disk_free_pct: Knee::new(20.0, 3.0),
            io_latency_ms: Knee::new(20.0, 500.0),
            mem_pressure_pct: Knee::new(70.0, 95.0),
        }
    }
}

impl ResourceKnees {
    pub fn for_dimension(&self, dimension: Dimension) -> Knee {
        match dimension {
            Dimension::Gpu => self.gpu_pct,
            Dimension::DiskFree => self.disk_free_pct,
            Dimension::IoLatency => self.io_latency_ms,
            Dimension::Memory => self.mem_pressure_pct,
        }
    }

    pub fn validate(&self) -> Result<(), ProbeError> {
        Dimension::ALL
            .iter()
            .try_for_each(|d| self.for_dimension(*d).validate(d.as_str()))
    }
}

/// Resource monitor configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub probe_timeout_ms: u64,
    pub history_len: usize,
    /// Path whose volume is checked for free space.
    pub disk_path: PathBuf,
    /// Directory for the IO latency scratch file. Defaults to the OS temp dir.
    pub io_scratch_dir: Option<PathBuf>,
    pub gpu_enabled: bool,
    pub nvidia_smi_path: PathBuf,
    pub knees: ResourceKnees,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1500,
            history_len: 60,
            disk_path: PathBuf::from("."),
            io_scratch_dir: None,
            gpu_enabled: true,
            nvidia_smi_path: PathBuf::from("nvidia-smi"),
            knees: ResourceKnees::default(),
        }
    }
}

impl ResourceConfig {
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.probe_timeout_ms == 0 {
            return Err(ProbeError::InvalidConfig(
                "probe_timeout_ms must be positive".into(),
            ));
        }
        self.knees.validate()
    }
}

// ---- Monitor ----

/// Runs hardware backends concurrently and turns pressure into a sub-score.
///
/// Dimensions without a working backend are excluded from the sub-score
/// denominator. A short rolling history of snapshots is kept for operators.
pub struct ResourceMonitor {
    backends: Vec<Arc<dyn HardwareProbe>>,
    knees: ResourceKnees,
    probe_timeout: Duration,
    history_len: usize,
    history: Mutex<VecDeque<ResourceSnapshot>>,
}

impl ResourceMonitor {
    pub fn new(knees: ResourceKnees, probe_timeout: Duration) -> Self {
        Self {
            backends: Vec::new(),
            knees,
            probe_timeout,
            history_len: 60,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Monitor with the platform backends named in `config`.
    pub fn from_config(config: &ResourceConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        let scratch = config
            .io_scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let mut monitor = Self::new(config.knees, Duration::from_millis(config.probe_timeout_ms))
            .with_history_len(config.history_len)
            .with_backend(Arc::new(SysinfoMemoryProbe))
            .with_backend(Arc::new(SysinfoDiskProbe::new(&config.disk_path)))
            .with_backend(Arc::new(IoLatencyProbe::new(scratch)));
        if config.gpu_enabled {
            monitor = monitor.with_backend(Arc::new(NvidiaSmiProbe::new(&config.nvidia_smi_path)));
        }
        Ok(monitor)
    }

    pub fn with_backend(mut self, backend: Arc<dyn HardwareProbe>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn with_history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }

    /// Probe every backend in parallel, each bounded by the probe timeout.
    pub async fn probe(&self) -> ResourceSnapshot {
        let timeout = self.probe_timeout;
        let results = join_all(self.backends.iter().map(|backend| async move {
            let result = match tokio::time::timeout(timeout, backend.probe(timeout)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };
            (backend.dimension(), backend.name(), result)
        }))
        .await;

        let mut snapshot = ResourceSnapshot::unmeasured(now_ms());
        for (dimension, name, result) in results {
            let slot = snapshot.slot(dimension);
            match result {
                Ok(value) if value.is_finite() => {
                    debug!(probe = name, %dimension, value, "hardware probe reading");
                    if slot.value().is_none() {
                        *slot = Reading::Available(value);
                    }
                }
                Ok(_) => {
                    warn!(probe = name, %dimension, "hardware probe returned non-finite value");
                    if slot.value().is_none() {
                        *slot = Reading::Unavailable(format!("{name}: non-finite value"));
                    }
                }
                Err(e) => {
                    debug!(probe = name, %dimension, error = %e, "hardware probe unavailable");
                    if slot.value().is_none() {
                        *slot = Reading::Unavailable(format!("{name}: {e}"));
                    }
                }
            }
        }

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(snapshot.clone());
        while history.len() > self.history_len {
            history.pop_front();
        }
        snapshot
    }

    /// Per-dimension sub-scores for the available dimensions.
    pub fn dimension_scores(&self, snapshot: &ResourceSnapshot) -> BTreeMap<Dimension, f64> {
        Dimension::ALL
            .iter()
            .filter_map(|d| {
                snapshot
                    .get(*d)
                    .value()
                    .map(|v| (*d, self.knees.for_dimension(*d).score(v)))
            })
            .collect()
    }

    /// Mean of the available dimension sub-scores.
    pub fn score(&self, snapshot: &ResourceSnapshot) -> Option<f64> {
        let scores = self.dimension_scores(snapshot);
        if scores.is_empty() {
            return None;
        }
        Some(scores.values().sum::<f64>() / scores.len() as f64)
    }

    pub fn history(&self) -> Vec<ResourceSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<ResourceSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }
}

#[async_trait]
impl IntegrityProbe for ResourceMonitor {
    fn signal(&self) -> Signal {
        Signal::Resource
    }

    async fn sample(&self) -> Result<ProbeReading, ProbeError> {
        let snapshot = self.probe().await;
        let scores = self.dimension_scores(&snapshot);
        let Some(score) = self.score(&snapshot) else {
            return Err(ProbeError::unavailable("no resource dimension available"));
        };

        let mut reading = ProbeReading::new(score);
        let mut missing = Vec::new();
        for dimension in Dimension::ALL {
            match (snapshot.get(dimension), scores.get(&dimension)) {
                (Reading::Available(value), Some(sub)) => {
                    reading = reading
                        .with_metric(dimension.as_str(), *value)
                        .with_metric(format!("{}_score", dimension.as_str()), *sub);
                }
                _ => missing.push(dimension.as_str()),
            }
        }
        if !missing.is_empty() {
            reading = reading.with_detail(format!("unavailable: {}", missing.join(", ")));
        }
        Ok(reading)
    }
}
