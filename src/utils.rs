use std::f64::consts::TAU;

use crate::math::{GRAVITATIONAL_CONSTANT, Real, Vec3};
use crate::state::SimulationState;

/// Generates `n` bodies in a uniform spherical cloud around a massive
/// central body, with the shell bodies put on circular orbits.
/// - Directions are uniform on the sphere, radii uniform in volume shell.
/// - Orbital speeds come from the mass enclosed inside each radius.
/// - Seeded, so the same `n` always yields the same cloud.
pub fn uniform_cloud(n: usize, softening: Real) -> SimulationState {
    assert!(n > 0);
    fastrand::seed(0);

    let inner_radius = 25.0;
    let outer_radius = (n as Real).sqrt() * 5.0;

    // Massive central body
    let mut bodies: Vec<(Vec3, Real)> = Vec::with_capacity(n);
    bodies.push((Vec3::zero(), 1e6));

    while bodies.len() < n {
        let angle = fastrand::f64() * TAU;
        let z = fastrand::f64() * 2.0 - 1.0;
        let planar = (1.0 - z * z).sqrt();
        let direction = Vec3::new(planar * angle.cos(), planar * angle.sin(), z);

        // Uniform volume distribution between the two radii
        let t = inner_radius / outer_radius;
        let r = fastrand::f64() * (1.0 - t * t) + t * t;

        bodies.push((direction * (outer_radius * r.sqrt()), 1.0));
    }

    // Closest first, so the enclosed mass is a running sum.
    bodies.sort_by(|a, b| a.0.mag_sq().total_cmp(&b.0.mag_sq()));

    let mut positions = Vec::with_capacity(n);
    let mut velocities = Vec::with_capacity(n);
    let mut masses = Vec::with_capacity(n);

    let mut enclosed_mass = 0.0;
    for (position, mass) in bodies {
        enclosed_mass += mass;
        positions.push(position);
        masses.push(mass);

        if position == Vec3::zero() {
            velocities.push(Vec3::zero());
            continue;
        }

        // Circular orbit: v = sqrt(G * M / r), perpendicular to the radius.
        let radial = position.normalized();
        let reference = if radial.z.abs() > 0.9 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            Vec3::new(0.0, 0.0, 1.0)
        };
        let tangent = radial.cross(reference).normalized();
        let speed = (GRAVITATIONAL_CONSTANT * enclosed_mass / position.mag()).sqrt();
        velocities.push(tangent * speed);
    }

    let accelerations = vec![Vec3::zero(); n];
    SimulationState {
        positions,
        velocities,
        masses,
        accelerations,
        softening,
    }
}
