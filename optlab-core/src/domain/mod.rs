//! Domain types for optlab

pub mod bar;
pub mod event;
pub mod horizon;
pub mod ids;
pub mod position;
pub mod snapshot;
pub mod trade;

pub use bar::{Bar, Tick};
pub use event::{EventKind, LifecycleEvent};
pub use horizon::HorizonSpec;
pub use ids::HorizonId;
pub use position::{Direction, Position, PositionTicket};
pub use snapshot::{FeatureSnapshot, SnapshotError};
pub use trade::{ClosedTrade, ExitReason};

/// Symbol type alias
pub type Symbol = String;
