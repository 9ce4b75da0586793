use thiserror::Error;

/// Fatal failures surfaced to the simulation driver.
///
/// Cancellation is deliberately not here: a cancelled run is a distinct
/// outcome (`RunOutcome::Cancelled`), not a failure.
#[derive(Debug, Error)]
pub enum SimError {
    /// A dataset row failed to parse, the header is wrong, or trailing
    /// data remained after parsing.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The dataset holds zero bodies; the pipeline is undefined for it.
    #[error("dataset contains no bodies")]
    EmptyDataset,

    /// A position, velocity or acceleration became NaN or infinite.
    /// Usually a diverging integration: time step too large, or two
    /// bodies coincided with zero softening.
    #[error("non-finite state detected after {stage} stage")]
    NonFiniteState { stage: &'static str },

    /// A worker panicked or the executor could not be brought up.
    #[error("scheduler fault: {0}")]
    SchedulerFault(String),

    #[error("dataset i/o failed")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for SimError {
    fn from(err: csv::Error) -> Self {
        SimError::MalformedInput(err.to_string())
    }
}
