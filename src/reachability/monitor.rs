use std::net::IpAddr;
use std::time::Duration;

use super::probe::{PingProbe, ReachabilityProbe};
use super::{Clock, ReachabilityError, ReachabilityPolicy, Result, RestartWindow, SystemClock};

/// Polls network liveness of a single target host
pub struct ReachabilityMonitor<P: ReachabilityProbe = PingProbe, C: Clock = SystemClock> {
    host: IpAddr,
    probe: P,
    clock: C,
}

impl ReachabilityMonitor<PingProbe, SystemClock> {
    /// Monitor `address` with the system ping and wall clock
    pub fn for_address(address: &str) -> Result<Self> {
        let host = address
            .parse::<IpAddr>()
            .map_err(|_| ReachabilityError::InvalidAddress(address.to_string()))?;
        log::debug!("Controller IP is valid: {}", host);
        Ok(Self::new(host, PingProbe::new(), SystemClock::new()))
    }
}

impl<P: ReachabilityProbe, C: Clock> ReachabilityMonitor<P, C> {
    pub fn new(host: IpAddr, probe: P, clock: C) -> Self {
        Self { host, probe, clock }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Probe until the target answers.
    ///
    /// Returns the attempt number that succeeded. A probe mechanism error
    /// ends the wait immediately.
    pub fn wait_until_reachable(&mut self, policy: &ReachabilityPolicy) -> Result<u32> {
        for attempt in 1..=policy.attempts() {
            let reachable = self.probe_once(attempt, policy)?;
            if reachable {
                log::debug!("Ping succeeded on attempt {}. {} is reachable", attempt, self.host);
                return Ok(attempt);
            }

            log::debug!("Ping attempt {} failed. Retrying...", attempt);
            if attempt < policy.attempts() {
                self.clock.sleep(policy.delay());
            }
        }

        log::error!(
            "{} is not reachable after {} attempts",
            self.host,
            policy.attempts()
        );
        Err(ReachabilityError::Unreachable {
            host: self.host.to_string(),
            attempts: policy.attempts(),
        })
    }

    /// Wait for the target to drop off the network and check it did so
    /// within `window`, measured from the start of this call.
    ///
    /// Returns the elapsed time at the first unanswered probe.
    pub fn wait_for_restart_within(
        &mut self,
        window: RestartWindow,
        policy: &ReachabilityPolicy,
    ) -> Result<Duration> {
        let start = self.clock.now();

        for attempt in 1..=policy.attempts() {
            let reachable = self.probe_once(attempt, policy)?;
            if !reachable {
                let elapsed = self.clock.now().saturating_sub(start);
                log::debug!("{} unreachable after {:.2?}", self.host, elapsed);

                if elapsed <= window.duration() {
                    log::debug!("Restart within {:?} confirmed", window.duration());
                    return Ok(elapsed);
                }

                log::error!("Restart took too long: {:.2?}", elapsed);
                return Err(ReachabilityError::TimingViolation {
                    elapsed,
                    window: window.duration(),
                });
            }

            log::debug!("Attempt {}: {} is still reachable. Retrying...", attempt, self.host);
            if attempt < policy.attempts() {
                self.clock.sleep(policy.delay());
            }
        }

        log::error!(
            "{} is still reachable after {} attempts with {:?} delay",
            self.host,
            policy.attempts(),
            policy.delay()
        );
        Err(ReachabilityError::NeverWentDown {
            host: self.host.to_string(),
            attempts: policy.attempts(),
            delay: policy.delay(),
        })
    }

    fn probe_once(&mut self, attempt: u32, policy: &ReachabilityPolicy) -> Result<bool> {
        self.probe
            .probe(self.host, policy.probe_timeout())
            .map_err(|source| {
                log::error!("Error during ping attempt {}: {}", attempt, source);
                ReachabilityError::ProbeError { attempt, source }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_address_rejects_hostnames() {
        assert!(matches!(
            ReachabilityMonitor::for_address("controller.local"),
            Err(ReachabilityError::InvalidAddress(_))
        ));
        assert!(matches!(
            ReachabilityMonitor::for_address("300.1.1.1"),
            Err(ReachabilityError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_for_address_accepts_ipv4_and_ipv6() {
        let monitor = ReachabilityMonitor::for_address("192.168.0.42").unwrap();
        assert_eq!(monitor.host().to_string(), "192.168.0.42");
        assert!(ReachabilityMonitor::for_address("fe80::1").is_ok());
    }
}
