//! The per-tick compute chain: a half-drift bulk, an acceleration update
//! around a sequential tree build, and the kick/half-drift bulk, joined at
//! every stage boundary.
//!
//! Within a stage, iteration `i` touches only element `i` of the array it
//! writes; everything else it reads is frozen for the stage. That is what
//! lets each bulk run with no locks.

use std::panic::{self, AssertUnwindSafe};
use std::slice;

use log::trace;

use crate::error::SimError;
use crate::math::{self, Real, Vec3};
use crate::naive;
use crate::octree::Octree;
use crate::scheduler::{CancellationToken, Scheduler};
use crate::state::StateView;

/// Which acceleration update runs in the middle of the tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Exact O(N^2) pair sweep.
    Naive,
    /// Octree approximation with the fixed opening angle.
    #[default]
    BarnesHut,
}

/// Stages of one tick, in order. `Phase1`, `ApplyForces` and `Phase2` are
/// bulk; `Build` is a single item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Phase1,
    Build,
    ApplyForces,
    Phase2,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Phase1 => "phase1",
            Stage::Build => "build",
            Stage::ApplyForces => "apply-forces",
            Stage::Phase2 => "phase2",
        }
    }
}

/// Everything one tick needs besides the state itself.
pub struct TickContext<'a> {
    pub scheduler: &'a dyn Scheduler,
    pub algorithm: Algorithm,
    pub cancellation: Option<&'a CancellationToken>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    /// The cancellation token fired; the tick stopped cleanly at a stage
    /// boundary and the state is consistent as of the last finished stage.
    Cancelled,
}

/// Advance the state by one `time_step`.
///
/// The sign of `time_step` is not constrained here; running with a negated
/// step walks the integration backwards.
pub fn run_tick(
    view: &mut StateView<'_>,
    time_step: Real,
    cx: &TickContext<'_>,
) -> Result<TickOutcome, SimError> {
    debug_assert!(time_step.is_finite() && time_step != 0.0);
    let n = view.len();

    if cancelled(cx) {
        return Ok(TickOutcome::Cancelled);
    }

    // Phase 1: half-drift of positions.
    trace!("{} over {n} bodies", Stage::Phase1.name());
    {
        let positions_ptr = view.positions.as_mut_ptr() as usize;
        let velocities_ptr = view.velocities.as_ptr() as usize;
        bulk(cx, Stage::Phase1, n, &move |i| {
            // SAFETY: every index in 0..n is visited exactly once per bulk
            // pass; iteration i writes only positions[i] and velocities are
            // read-only for the whole stage.
            let positions = unsafe { slice::from_raw_parts_mut(positions_ptr as *mut Vec3, n) };
            let velocities = unsafe { slice::from_raw_parts(velocities_ptr as *const Vec3, n) };
            math::leapfrog_phase1(&mut positions[i], velocities[i], time_step);
        })?;
    }
    validate_stage(view, Stage::Phase1)?;
    if cancelled(cx) {
        return Ok(TickOutcome::Cancelled);
    }

    // Acceleration update at the half-step positions.
    update_accelerations(view, cx)?;
    validate_stage(view, Stage::ApplyForces)?;
    if cancelled(cx) {
        return Ok(TickOutcome::Cancelled);
    }

    // Phase 2: kick velocities, then the second half-drift.
    trace!("{} over {n} bodies", Stage::Phase2.name());
    {
        let positions_ptr = view.positions.as_mut_ptr() as usize;
        let velocities_ptr = view.velocities.as_mut_ptr() as usize;
        let accelerations_ptr = view.accelerations.as_ptr() as usize;
        bulk(cx, Stage::Phase2, n, &move |i| {
            // SAFETY: as in phase 1; iteration i writes positions[i] and
            // velocities[i] only, and accelerations are read-only.
            let positions = unsafe { slice::from_raw_parts_mut(positions_ptr as *mut Vec3, n) };
            let velocities = unsafe { slice::from_raw_parts_mut(velocities_ptr as *mut Vec3, n) };
            let accelerations =
                unsafe { slice::from_raw_parts(accelerations_ptr as *const Vec3, n) };
            math::leapfrog_phase2(&mut positions[i], &mut velocities[i], accelerations[i], time_step);
        })?;
    }
    validate_stage(view, Stage::Phase2)?;

    Ok(TickOutcome::Completed)
}

fn update_accelerations(view: &mut StateView<'_>, cx: &TickContext<'_>) -> Result<(), SimError> {
    let n = view.len();

    trace!("zeroing accelerations");
    {
        let accelerations_ptr = view.accelerations.as_mut_ptr() as usize;
        bulk(cx, Stage::ApplyForces, n, &move |i| {
            // SAFETY: one writer per index, nothing read.
            let accelerations =
                unsafe { slice::from_raw_parts_mut(accelerations_ptr as *mut Vec3, n) };
            accelerations[i] = Vec3::zero();
        })?;
    }

    match cx.algorithm {
        Algorithm::Naive => {
            // The fused pair sweep writes every element; it runs as one
            // sequential unit of work to keep the pair order deterministic.
            let softening = view.softening;
            let positions = &*view.positions;
            let masses = view.masses;
            let accelerations = &mut *view.accelerations;
            then(cx, Stage::ApplyForces, &mut move || {
                naive::naive_accelerations(positions, masses, softening, accelerations);
            })?;
        }
        Algorithm::BarnesHut => {
            trace!("{}", Stage::Build.name());
            let mut octree: Option<Octree> = None;
            {
                let positions = &*view.positions;
                let masses = view.masses;
                let octree_slot = &mut octree;
                then(cx, Stage::Build, &mut move || {
                    *octree_slot = Some(Octree::from_bodies(positions, masses));
                })?;
            }
            let Some(octree) = octree else {
                return Err(SimError::SchedulerFault("octree build did not run".into()));
            };

            trace!("{} over {n} bodies", Stage::ApplyForces.name());
            let softening = view.softening;
            let octree = &octree;
            let positions_ptr = view.positions.as_ptr() as usize;
            let accelerations_ptr = view.accelerations.as_mut_ptr() as usize;
            bulk(cx, Stage::ApplyForces, n, &move |i| {
                // SAFETY: iteration i writes only accelerations[i];
                // positions and the finalized octree are read-only during
                // this bulk.
                let positions = unsafe { slice::from_raw_parts(positions_ptr as *const Vec3, n) };
                let accelerations =
                    unsafe { slice::from_raw_parts_mut(accelerations_ptr as *mut Vec3, n) };
                octree.apply_forces_to(positions[i], softening, &mut accelerations[i]);
            })?;
        }
    }
    Ok(())
}

fn cancelled(cx: &TickContext<'_>) -> bool {
    cx.cancellation.is_some_and(CancellationToken::is_cancelled)
}

/// Run a bulk stage, converting a worker panic into a scheduler fault.
fn bulk(
    cx: &TickContext<'_>,
    stage: Stage,
    n: usize,
    f: &(dyn Fn(usize) + Sync),
) -> Result<(), SimError> {
    panic::catch_unwind(AssertUnwindSafe(|| cx.scheduler.bulk(n, f))).map_err(|_| {
        SimError::SchedulerFault(format!("worker panicked in {} stage", stage.name()))
    })
}

fn then(
    cx: &TickContext<'_>,
    stage: Stage,
    work: &mut (dyn FnMut() + Send),
) -> Result<(), SimError> {
    panic::catch_unwind(AssertUnwindSafe(|| cx.scheduler.then(work))).map_err(|_| {
        SimError::SchedulerFault(format!("worker panicked in {} stage", stage.name()))
    })
}

/// Debug-build validator: everything the finished stage wrote must be
/// finite, otherwise the integration has diverged.
fn validate_stage(view: &StateView<'_>, stage: Stage) -> Result<(), SimError> {
    if !cfg!(debug_assertions) {
        return Ok(());
    }

    let finite = match stage {
        Stage::Phase1 => view.positions.iter().all(|&v| math::vec3_is_finite(v)),
        Stage::Build | Stage::ApplyForces => {
            view.accelerations.iter().all(|&v| math::vec3_is_finite(v))
        }
        Stage::Phase2 => {
            view.positions.iter().all(|&v| math::vec3_is_finite(v))
                && view.velocities.iter().all(|&v| math::vec3_is_finite(v))
        }
        Stage::Idle => true,
    };

    if finite {
        Ok(())
    } else {
        Err(SimError::NonFiniteState { stage: stage.name() })
    }
}
