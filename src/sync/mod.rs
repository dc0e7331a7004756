//! Collection synchronization
//!
//! Coalesces store pushes, local mutations and focus changes into single
//! refreshes of the `CollectionStore`.

pub mod coordinator;
pub mod flight;

pub use coordinator::{SyncCoordinator, SyncHandle, SyncMonitor, SyncSources, SyncStats};
pub use flight::{FlightControl, Generation, SyncState};
