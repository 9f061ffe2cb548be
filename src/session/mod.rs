pub mod lifecycle;
pub mod manager;
pub mod registry;

pub use lifecycle::{transition, SessionAction};
pub use manager::{CreateSession, SessionManager, StatusChanged};
pub use registry::{SessionEntry, SessionRegistry};
