use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::time::Duration;

/// A single bounded-timeout liveness check.
///
/// `Ok(true)` means the host answered, `Ok(false)` means it did not. `Err`
/// is reserved for the probe mechanism itself failing.
pub trait ReachabilityProbe {
    fn probe(&mut self, host: IpAddr, timeout: Duration) -> std::io::Result<bool>;
}

/// One ICMP echo through the system `ping` binary
#[derive(Debug, Clone, Default)]
pub struct PingProbe;

impl PingProbe {
    pub fn new() -> Self {
        Self
    }

    pub fn arguments(host: IpAddr, timeout: Duration) -> Vec<String> {
        #[cfg(target_os = "windows")]
        {
            let millis = timeout.as_millis().max(1);
            vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                millis.to_string(),
                host.to_string(),
            ]
        }

        #[cfg(not(target_os = "windows"))]
        {
            // -W only takes whole seconds
            let seconds = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
            vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                seconds.max(1).to_string(),
                host.to_string(),
            ]
        }
    }
}

impl ReachabilityProbe for PingProbe {
    fn probe(&mut self, host: IpAddr, timeout: Duration) -> std::io::Result<bool> {
        let status = Command::new("ping")
            .args(Self::arguments(host, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        Ok(status.success())
    }
}
