//! Vector primitives, pairwise kernels and physical constants.
//!
//! Internal units are kilometers for distances, km/s for velocities and
//! solar masses for body masses; the gravitational constant below is
//! expressed in those units so kernel callers pass raw masses.

use ultraviolet::DVec3;

pub type Real = f64;
pub type Vec3 = DVec3;

// Unit conversions
pub const PARSEC_IN_M: Real = 3.08567758129e16;
pub const PARSEC_IN_KM: Real = PARSEC_IN_M / 1000.0;
pub const SOLAR_MASS_IN_KG: Real = 1.988435e30;
pub const YEAR_IN_SECONDS: Real = 365.25 * 86400.0;

/// Unit is m * (m/s)^2 * kg^-1
pub const GRAVITATIONAL_CONSTANT_COMMON: Real = 6.67428e-11;

/// Unit is km * (km/s)^2 * Mo^-1
pub const GRAVITATIONAL_CONSTANT: Real =
    GRAVITATIONAL_CONSTANT_COMMON / 1000.0 / (1000.0 * 1000.0) * SOLAR_MASS_IN_KG;

/// Axis-aligned bounding box over a point set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// The empty box: min and max are swapped to the representable
    /// extremes so that expanding by any point yields correct bounds.
    pub fn infinity() -> Self {
        Self {
            min: Vec3::broadcast(Real::MAX),
            max: Vec3::broadcast(Real::MIN),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::infinity();
        for p in points {
            aabb.expand_to(p);
        }
        aabb
    }

    pub fn expand_to(&mut self, p: Vec3) {
        self.min = self.min.min_by_component(p);
        self.max = self.max.max_by_component(p);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge length of the smallest cube containing the box.
    pub fn largest_extent(&self) -> Real {
        (self.max - self.min).component_max()
    }

    pub fn is_finite(&self) -> bool {
        vec3_is_finite(self.min) && vec3_is_finite(self.max)
    }
}

pub fn squared_length(v: Vec3) -> Real {
    v.mag_sq()
}

pub fn length(v: Vec3) -> Real {
    v.mag()
}

pub fn vec3_is_finite(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

// In general, the formula is:
//
//   a_i = sum_{i != j} G * m_j * (x_j - x_i) / pow(norm(x_j - x_i) + softening, 3)
//
// The kernels never signal on degenerate input; a coincident pair with zero
// softening produces non-finite components that the pipeline's stage
// validator reports.

/// Add body j's gravity contribution to `acceleration` of body i.
pub fn accumulate_acceleration(
    x_i: Vec3,
    x_j: Vec3,
    mass_j: Real,
    softening: Real,
    acceleration: &mut Vec3,
) {
    let displacement = x_j - x_i;
    let distance = length(displacement) + softening;
    let divisor = distance * distance * distance;

    *acceleration += displacement * (GRAVITATIONAL_CONSTANT * mass_j / divisor);
}

/// Fused variant for (i, j) and (j, i) at once, sharing the expensive
/// square root. The two contributions use the same 1/r^3 term, so
/// `a_i * m_i == -a_j * m_j` holds exactly.
pub fn accumulate_acceleration_symmetric(
    x_i: Vec3,
    x_j: Vec3,
    mass_i: Real,
    mass_j: Real,
    softening: Real,
    acceleration_i: &mut Vec3,
    acceleration_j: &mut Vec3,
) {
    let displacement = x_j - x_i;
    let distance = length(displacement) + softening;
    let divisor = distance * distance * distance;

    *acceleration_i += displacement * (GRAVITATIONAL_CONSTANT * mass_j / divisor);
    *acceleration_j -= displacement * (GRAVITATIONAL_CONSTANT * mass_i / divisor);
}

// Leapfrog (kick-drift-kick with half-step position)
//
// This is the velocity Verlet with a time shift of half a step. It does not
// need an acceleration vector preserved across ticks.
//
// Steps:
//   leapfrog_phase1(...)
//   <recompute acceleration at the half-step positions>
//   leapfrog_phase2(...)

/// x_{i+1/2} = x_i + 0.5 * v_i * dt
pub fn leapfrog_phase1(position: &mut Vec3, velocity: Vec3, dt: Real) {
    *position += velocity * (0.5 * dt);
}

/// v_{i+1} = v_i + a_{i+1/2} * dt, then x_{i+1} = x_{i+1/2} + 0.5 * v_{i+1} * dt
pub fn leapfrog_phase2(position: &mut Vec3, velocity: &mut Vec3, acceleration: Vec3, dt: Real) {
    *velocity += acceleration * dt;
    *position += *velocity * (0.5 * dt);
}

// System energy

pub fn kinetic_energy(mass: Real, velocity: Vec3) -> Real {
    0.5 * mass * squared_length(velocity)
}

pub fn potential_energy(mass_i: Real, mass_j: Real, x_i: Vec3, x_j: Vec3) -> Real {
    GRAVITATIONAL_CONSTANT * mass_i * mass_j / (x_j - x_i).mag()
}
