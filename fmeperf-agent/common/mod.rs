pub mod mmio;
pub mod sim;

pub use mmio::{FeatureWindow, MappedBar, Mmio};
pub use sim::SimulatedFme;
