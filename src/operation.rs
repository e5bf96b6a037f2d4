use crate::group::Collective;
use crate::error::GroupError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Synchronization operations that can be benchmarked.
///
/// The operation is picked once while building the configuration and then
/// passed around by value; every rank invokes the same variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum SyncOperation {
    /// Pure group synchronization, no memory completion
    #[clap(name = "sync-all")]
    SyncAll,

    /// Memory completion followed by group synchronization
    #[clap(name = "barrier-all")]
    BarrierAll,

    /// No-op, measures the harness overhead
    #[clap(name = "empty")]
    Empty,
}

impl SyncOperation {
    /// Run the operation once on `group`.
    pub fn invoke<G: Collective + ?Sized>(self, group: &G) -> Result<(), GroupError> {
        match self {
            SyncOperation::SyncAll => group.sync_all(),
            SyncOperation::BarrierAll => group.barrier(),
            SyncOperation::Empty => Ok(()),
        }
    }

    /// Bind the operation to a group, producing the zero-argument callable the
    /// samplers time.
    pub fn bind<G: Collective + ?Sized>(
        self,
        group: &G,
    ) -> impl FnMut() -> Result<(), GroupError> + '_ {
        move || self.invoke(group)
    }

    /// Name used in report tables.
    pub fn name(self) -> &'static str {
        match self {
            SyncOperation::SyncAll => "sync_all",
            SyncOperation::BarrierAll => "barrier_all",
            SyncOperation::Empty => "empty_func",
        }
    }
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
