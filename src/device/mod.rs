pub mod orchestrator;

pub use orchestrator::PowerCycleOrchestrator;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Power stage failed: {0}")]
    PowerSupply(#[from] crate::serial::SerialError),

    #[error("Verification failed: {0}")]
    Reachability(#[from] crate::reachability::ReachabilityError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
