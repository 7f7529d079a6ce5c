use crate::dns::TransferSettings;
use crate::slaves::{Slave, SlaveDescriptor, SlaveRegistry};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct SetSlavesRequest {
    pub slaves: Vec<SlaveDescriptor>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct SlavesResult {
    pub slaves: Vec<Slave>,
}

impl From<&SlaveRegistry> for SlavesResult {
    fn from(registry: &SlaveRegistry) -> Self {
        Self {
            slaves: registry.slaves().iter().map(|s| (**s).clone()).collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct NotifyResult {
    pub notified: usize,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct UpdateSettingsRequest {
    pub batch_size: Option<usize>,
    pub packet_size: Option<usize>,
}

pub(super) type SettingsResult = TransferSettings;
