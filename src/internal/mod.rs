//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod dispose_bag;
pub(crate) mod guard;
pub(crate) mod journal;
pub(crate) mod slots;

pub(crate) use circular::{extend_chain, terminal_cause};
pub use circular::MAX_RESOLUTION_DEPTH;
pub(crate) use dispose_bag::{ShutdownHook, run_hooks};
pub(crate) use slots::{SlotId, SlotTable};
