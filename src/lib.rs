//! Barnes-Hut N-body gravity simulation.
//!
//! Each tick runs a three-stage pipeline over structure-of-arrays body
//! state: a leapfrog half-drift, an acceleration update (octree or naive
//! pair sweep), and the closing kick/half-drift. Stages are data-parallel
//! bulks joined at their boundaries and executed by an abstract
//! [`Scheduler`].

pub mod dataset;
pub mod error;
pub mod math;
pub mod naive;
pub mod octree;
pub mod pipeline;
pub mod scheduler;
pub mod simulation;
pub mod state;
pub mod utils;

pub use dataset::BodyRecord;
pub use error::SimError;
pub use octree::Octree;
pub use pipeline::{Algorithm, TickOutcome};
pub use scheduler::{
    CancellationToken, RayonScheduler, ScheduleKind, Scheduler, SchedulerConfig,
    SequentialScheduler,
};
pub use simulation::{RunOutcome, Simulation, SimulationConfig};
pub use state::{SimulationState, StateView};
