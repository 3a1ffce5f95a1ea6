//! Machine Status Aggregator

use crate::types::{MachineStatus, SensorStatus};

/// Worst sensor status mapped onto a machine status.
pub fn aggregate<I>(statuses: I) -> MachineStatus
where
    I: IntoIterator<Item = SensorStatus>,
{
    match statuses.into_iter().max().unwrap_or_default() {
        SensorStatus::Danger => MachineStatus::Error,
        SensorStatus::Warning => MachineStatus::Warning,
        SensorStatus::Normal => MachineStatus::Operational,
    }
}

/// Status honouring the sticky maintenance override.
pub fn resolve<I>(statuses: I, maintenance: bool) -> MachineStatus
where
    I: IntoIterator<Item = SensorStatus>,
{
    if maintenance {
        MachineStatus::Maintenance
    } else {
        aggregate(statuses)
    }
}
