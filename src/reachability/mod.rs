pub mod monitor;
pub mod probe;

pub use monitor::ReachabilityMonitor;
pub use probe::{PingProbe, ReachabilityProbe};

use std::time::{Duration, Instant};

// Defaults carried over from the bench scripts
pub const BOOT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const BOOT_ATTEMPTS: u32 = 15;
pub const BOOT_DELAY: Duration = Duration::from_secs(3);
pub const RESTART_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const RESTART_ATTEMPTS: u32 = 50;
pub const RESTART_DELAY: Duration = Duration::from_millis(100);
pub const RESTART_WINDOW: Duration = Duration::from_secs(3);

/// How often and how patiently to probe the target.
///
/// Built only through [`ReachabilityPolicy::new`] or the presets, so every
/// field is positive:
///
/// ```compile_fail
/// use std::time::Duration;
/// use dut_harness_lib::ReachabilityPolicy;
///
/// let policy = ReachabilityPolicy {
///     probe_timeout: Duration::ZERO,
///     attempts: 0,
///     delay: Duration::ZERO,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReachabilityPolicy {
    probe_timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl ReachabilityPolicy {
    pub fn new(probe_timeout: Duration, attempts: u32, delay: Duration) -> Result<Self> {
        if probe_timeout.is_zero() {
            return Err(ReachabilityError::InvalidPolicy(
                "probe timeout must be positive".to_string(),
            ));
        }
        if attempts == 0 {
            return Err(ReachabilityError::InvalidPolicy(
                "attempts must be positive".to_string(),
            ));
        }
        if delay.is_zero() {
            return Err(ReachabilityError::InvalidPolicy(
                "delay must be positive".to_string(),
            ));
        }
        Ok(Self {
            probe_timeout,
            attempts,
            delay,
        })
    }

    /// Policy for waiting on a device that is booting
    pub fn boot() -> Self {
        Self {
            probe_timeout: BOOT_PROBE_TIMEOUT,
            attempts: BOOT_ATTEMPTS,
            delay: BOOT_DELAY,
        }
    }

    /// Policy for watching a device shut down after a reset command
    pub fn restart() -> Self {
        Self {
            probe_timeout: RESTART_PROBE_TIMEOUT,
            attempts: RESTART_ATTEMPTS,
            delay: RESTART_DELAY,
        }
    }

    /// Upper bound for a single probe
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause between two consecutive probes
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReachabilityPolicy {
    fn default() -> Self {
        Self::boot()
    }
}

/// Time budget for a device to drop off the network after a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RestartWindow(Duration);

impl RestartWindow {
    pub fn new(within: Duration) -> Result<Self> {
        if within.is_zero() {
            return Err(ReachabilityError::InvalidPolicy(
                "restart window must be positive".to_string(),
            ));
        }
        Ok(Self(within))
    }

    pub fn from_secs_f64(seconds: f64) -> Result<Self> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(ReachabilityError::InvalidPolicy(format!(
                "restart window must be positive, got {}",
                seconds
            )));
        }
        let within = Duration::try_from_secs_f64(seconds).map_err(|e| {
            ReachabilityError::InvalidPolicy(format!("restart window {}s: {}", seconds, e))
        })?;
        Self::new(within)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for RestartWindow {
    fn default() -> Self {
        Self(RESTART_WINDOW)
    }
}

/// Time source for the polling loops
pub trait Clock {
    /// Monotonic time since an arbitrary, fixed origin
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReachabilityError {
    #[error("Invalid target address: {0}")]
    InvalidAddress(String),

    #[error("Invalid polling policy: {0}")]
    InvalidPolicy(String),

    #[error("Probe failed on attempt {attempt}: {source}")]
    ProbeError {
        attempt: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Target {host} not reachable after {attempts} attempts")]
    Unreachable { host: String, attempts: u32 },

    #[error("Restart took too long: {elapsed:?} (window {window:?})")]
    TimingViolation { elapsed: Duration, window: Duration },

    #[error("Target {host} still reachable after {attempts} attempts with {delay:?} delay")]
    NeverWentDown {
        host: String,
        attempts: u32,
        delay: Duration,
    },
}

pub type Result<T> = std::result::Result<T, ReachabilityError>;
