//! Simulation facade and the fixed-step loop driver.

use log::{debug, info};

use crate::error::SimError;
use crate::math::Real;
use crate::pipeline::{self, Algorithm, TickContext, TickOutcome};
use crate::scheduler::{CancellationToken, RayonScheduler, Scheduler, SchedulerConfig};
use crate::state::SimulationState;

/// Driver configuration. Times are seconds.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Time between ticks; must be positive.
    pub time_step: Real,
    /// Total simulated time; must be at least one `time_step`.
    pub duration: Real,
    pub algorithm: Algorithm,
    pub scheduler: SchedulerConfig,
    pub cancellation: Option<CancellationToken>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: Simulation::DEFAULT_TIME_STEP,
            duration: Simulation::DEFAULT_DURATION,
            algorithm: Algorithm::default(),
            scheduler: SchedulerConfig::default(),
            cancellation: None,
        }
    }
}

/// How a full run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { ticks: u64 },
    Cancelled { ticks: u64 },
}

/// Owns the body state and an executor, and advances them tick by tick.
pub struct Simulation {
    state: SimulationState,
    config: SimulationConfig,
    scheduler: Box<dyn Scheduler>,
    ticks: u64,
}

impl Simulation {
    /// Default constants: hourly steps over fifteen hours.
    pub const DEFAULT_TIME_STEP: Real = 60.0 * 60.0;
    pub const DEFAULT_DURATION: Real = 60.0 * 60.0 * 15.0;

    pub fn new(state: SimulationState, config: SimulationConfig) -> Result<Self, SimError> {
        let scheduler = RayonScheduler::new(&config.scheduler)?;
        Self::with_scheduler(state, config, Box::new(scheduler))
    }

    /// Plug in any conformant executor.
    pub fn with_scheduler(
        state: SimulationState,
        config: SimulationConfig,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<Self, SimError> {
        if state.is_empty() {
            return Err(SimError::EmptyDataset);
        }
        Ok(Self {
            state,
            config,
            scheduler,
            ticks: 0,
        })
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    pub fn into_state(self) -> SimulationState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance by one `time_step`.
    pub fn tick(&mut self) -> Result<TickOutcome, SimError> {
        let cx = TickContext {
            scheduler: self.scheduler.as_ref(),
            algorithm: self.config.algorithm,
            cancellation: self.config.cancellation.as_ref(),
        };
        let outcome = pipeline::run_tick(&mut self.state.view(), self.config.time_step, &cx)?;
        if outcome == TickOutcome::Completed {
            self.ticks += 1;
        }
        Ok(outcome)
    }

    /// Run the whole configured duration.
    ///
    /// The loop starts at `elapsed = time_step` and ticks while
    /// `elapsed < duration`, i.e. `ceil(duration / time_step) - 1` ticks.
    pub fn run(&mut self) -> Result<RunOutcome, SimError> {
        let time_step = self.config.time_step;
        let duration = self.config.duration;
        assert!(time_step > 0.0);
        assert!(duration >= time_step);

        info!(
            "running {} bodies with {:?}: dt {time_step} s over {duration} s",
            self.state.len(),
            self.config.algorithm
        );

        let mut elapsed = time_step;
        while elapsed < duration {
            if self.is_cancelled() {
                debug!("run cancelled after {} ticks", self.ticks);
                return Ok(RunOutcome::Cancelled { ticks: self.ticks });
            }
            match self.tick()? {
                TickOutcome::Completed => {}
                TickOutcome::Cancelled => {
                    debug!("run cancelled after {} ticks", self.ticks);
                    return Ok(RunOutcome::Cancelled { ticks: self.ticks });
                }
            }
            elapsed += time_step;
        }

        debug!("run completed after {} ticks", self.ticks);
        Ok(RunOutcome::Completed { ticks: self.ticks })
    }

    fn is_cancelled(&self) -> bool {
        self.config
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
