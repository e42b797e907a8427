pub mod error;
pub mod io;
pub mod microstructure;
pub mod sim;

// Prelude
pub use error::{HomogError, Result, SimWarning};
pub use microstructure::{InMemoryDataset, MicrostructureSource, PhaseMask};
pub use sim::{
    Capabilities, EffectiveProperties, HomogConfig, SimContext, SimulationOptions,
    SimulationRequest, SimulationResult, SurrogateSlot, predict_surrogate, simulate,
};
