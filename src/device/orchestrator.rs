use std::time::Duration;

use crate::reachability::{Clock, ReachabilityMonitor, ReachabilityPolicy, ReachabilityProbe};
use crate::serial::protocol::DEFAULT_SETTLE;
use crate::serial::{PortBackend, PowerSupplyDriver};

use super::Result;

/// Hard power reset of the DUT, verified over the network.
///
/// Borrows the supply driver and the monitor from whoever owns them, so a
/// single driver instance can serve every scenario in a run.
pub struct PowerCycleOrchestrator<'a, B: PortBackend, P: ReachabilityProbe, C: Clock> {
    supply: &'a mut PowerSupplyDriver<B>,
    monitor: &'a mut ReachabilityMonitor<P, C>,
    settle: Duration,
}

impl<'a, B: PortBackend, P: ReachabilityProbe, C: Clock> PowerCycleOrchestrator<'a, B, P, C> {
    pub fn new(
        supply: &'a mut PowerSupplyDriver<B>,
        monitor: &'a mut ReachabilityMonitor<P, C>,
    ) -> Self {
        Self {
            supply,
            monitor,
            settle: DEFAULT_SETTLE,
        }
    }

    /// How long the output stays off during the cycle
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Cut and restore power, then wait for the DUT to answer again.
    ///
    /// Returns the probe attempt on which the DUT came back.
    pub fn power_cycle_and_verify(&mut self, policy: &ReachabilityPolicy) -> Result<u32> {
        log::info!(
            "Power cycling DUT {} via {} (settle {:?})",
            self.monitor.host(),
            self.supply.port_name(),
            self.settle
        );
        self.supply.power_cycle_with(self.settle, self.monitor.clock())?;

        let attempt = self.monitor.wait_until_reachable(policy)?;
        log::info!("DUT {} back online after power cycle", self.monitor.host());
        Ok(attempt)
    }
}
