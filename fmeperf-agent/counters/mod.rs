pub mod basic;
pub mod cache;
pub mod driver;
pub mod events;
pub mod fabric;
pub mod session;
pub mod vtd;

pub use driver::{CounterDriver, DriverTable, Reading};
pub use events::{find_by_name, EventDescriptor, EventRequest, EventResolver, EventType, Target};
pub use fabric::{ArbiterState, FabricMode};
pub use session::Session;
