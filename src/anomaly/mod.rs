pub mod aggregate;
pub mod detection;
pub mod emergency;
pub mod engine;
pub mod helpers;
pub mod messages;
pub mod reference;
pub mod store;
pub mod trend;
pub mod types;

pub use emergency::{EmergencyAction, EmergencyActionType, EmergencyProtocol};
pub use engine::AnomalyEngine;
pub use reference::{ReferenceParts, ReferenceTables, ResolvedRange};
pub use store::{BuiltinSource, JsonDirectorySource, ReferenceSource, ReferenceStore};
pub use types::*;
