//! Structure-of-arrays body state and the borrowed view the pipeline
//! consumes. Array lengths are fixed for the simulation's lifetime.

use crate::dataset::BodyRecord;
use crate::error::SimError;
use crate::math::{self, Real, Vec3};

/// Additive distance regularizer preventing the 1/r^2 singularity.
pub const DEFAULT_SOFTENING: Real = 0.05;

/// Owned simulation state. All arrays are index-aligned; `accelerations`
/// is scratch, valid only between the stages of one tick.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub masses: Vec<Real>,
    pub accelerations: Vec<Vec3>,
    pub softening: Real,
}

impl SimulationState {
    pub fn new(
        positions: Vec<Vec3>,
        velocities: Vec<Vec3>,
        masses: Vec<Real>,
        softening: Real,
    ) -> Result<Self, SimError> {
        if positions.is_empty() {
            return Err(SimError::EmptyDataset);
        }
        debug_assert_eq!(positions.len(), velocities.len());
        debug_assert_eq!(positions.len(), masses.len());

        let accelerations = vec![Vec3::zero(); positions.len()];
        Ok(Self {
            positions,
            velocities,
            masses,
            accelerations,
            softening,
        })
    }

    /// Decompose loaded body records into the arrays the algorithms use.
    pub fn from_records(records: &[BodyRecord], softening: Real) -> Result<Self, SimError> {
        Self::new(
            records.iter().map(BodyRecord::position).collect(),
            records.iter().map(BodyRecord::velocity).collect(),
            records.iter().map(|r| r.mass).collect(),
            softening,
        )
    }

    /// Scatter positions and velocities back onto the records they came
    /// from, e.g. before saving results.
    pub fn apply_to_records(&self, records: &mut [BodyRecord]) {
        debug_assert_eq!(records.len(), self.len());
        for (i, record) in records.iter_mut().enumerate() {
            record.set_position(self.positions[i]);
            record.set_velocity(self.velocities[i]);
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn total_mass(&self) -> Real {
        self.masses.iter().sum()
    }

    /// Remove the bulk drift of the dataset: subtract the mass-weighted
    /// mean velocity `u = sum(m_j * v_j) / sum(m_j)` from every body, per
    /// axis, so total momentum is zero at the start.
    pub fn adjust_initial_velocities(&mut self) {
        let mut momentum = Vec3::zero();
        let mut mass_sum = 0.0;
        for (&velocity, &mass) in self.velocities.iter().zip(&self.masses) {
            momentum += velocity * mass;
            mass_sum += mass;
        }

        let u = momentum / mass_sum;
        for velocity in &mut self.velocities {
            *velocity -= u;
        }
    }

    /// Kinetic minus pairwise potential energy, a cheap drift diagnostic.
    pub fn system_energy(&self) -> Real {
        let mut energy = 0.0;
        for (&velocity, &mass) in self.velocities.iter().zip(&self.masses) {
            energy += math::kinetic_energy(mass, velocity);
        }
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                energy -= math::potential_energy(
                    self.masses[i],
                    self.masses[j],
                    self.positions[i],
                    self.positions[j],
                );
            }
        }
        energy
    }

    pub fn view(&mut self) -> StateView<'_> {
        StateView {
            positions: &mut self.positions,
            velocities: &mut self.velocities,
            masses: &self.masses,
            accelerations: &mut self.accelerations,
            softening: self.softening,
        }
    }
}

/// Non-owning view over a [`SimulationState`]; what the pipeline operates
/// on. Never resized.
#[derive(Debug)]
pub struct StateView<'a> {
    pub positions: &'a mut [Vec3],
    pub velocities: &'a mut [Vec3],
    pub masses: &'a [Real],
    pub accelerations: &'a mut [Vec3],
    pub softening: Real,
}

impl StateView<'_> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dataset_is_rejected() {
        let result = SimulationState::new(vec![], vec![], vec![], DEFAULT_SOFTENING);
        assert!(matches!(result, Err(SimError::EmptyDataset)));
    }

    #[test]
    fn velocity_adjustment_cancels_momentum_per_axis() {
        let mut state = SimulationState::new(
            vec![Vec3::zero(); 3],
            vec![
                Vec3::new(1.0, -2.0, 0.5),
                Vec3::new(0.0, 4.0, -1.0),
                Vec3::new(-3.0, 0.0, 2.0),
            ],
            vec![1.0, 2.0, 4.0],
            DEFAULT_SOFTENING,
        )
        .unwrap();

        state.adjust_initial_velocities();

        let mut momentum = Vec3::zero();
        for (&v, &m) in state.velocities.iter().zip(&state.masses) {
            momentum += v * m;
        }
        assert!(momentum.mag() < 1e-12);
    }

    #[test]
    fn records_round_trip_through_the_state() {
        let records = vec![
            BodyRecord::new("0", "Sun", "STA", 1.0, Vec3::zero(), Vec3::zero()),
            BodyRecord::new(
                "1",
                "Probe",
                "SAT",
                1e-10,
                Vec3::new(1.0, 2.0, 3.0),
                Vec3::new(-0.5, 0.0, 0.25),
            ),
        ];

        let mut state = SimulationState::from_records(&records, DEFAULT_SOFTENING).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.positions[1], Vec3::new(1.0, 2.0, 3.0));

        state.positions[1] = Vec3::new(9.0, 9.0, 9.0);
        let mut out = records.clone();
        state.apply_to_records(&mut out);
        assert_eq!(out[1].position(), Vec3::new(9.0, 9.0, 9.0));
        assert_eq!(out[0].velocity(), Vec3::zero());
    }
}
