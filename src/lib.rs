pub mod serial;
pub mod reachability;
pub mod device;
pub mod config;

pub use device::{DeviceError, PowerCycleOrchestrator};
pub use reachability::{ReachabilityError, ReachabilityMonitor, ReachabilityPolicy, RestartWindow};
pub use serial::{PowerSupplyDriver, SerialError};
