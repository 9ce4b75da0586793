//! Baseline O(N^2) acceleration update, used for benchmarking the octree
//! and for accuracy comparisons.

use crate::math::{self, Real, Vec3};

/// Sum pairwise accelerations over every ordered pair `i < j` with the
/// fused symmetric kernel, halving the sqrt count. The pair order is fixed,
/// so results are reproducible run to run.
pub fn naive_accelerations(
    positions: &[Vec3],
    masses: &[Real],
    softening: Real,
    accelerations: &mut [Vec3],
) {
    debug_assert_eq!(positions.len(), masses.len());
    debug_assert_eq!(positions.len(), accelerations.len());

    accelerations.fill(Vec3::zero());

    let n = positions.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (head, tail) = accelerations.split_at_mut(j);
            math::accumulate_acceleration_symmetric(
                positions[i],
                positions[j],
                masses[i],
                masses[j],
                softening,
                &mut head[i],
                &mut tail[0],
            );
        }
    }
}
