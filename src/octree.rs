//! Barnes-Hut octree: spatial subdivision of the body set, rebuilt fresh
//! every tick, finalized once, then traversed read-only to evaluate forces.

use log::trace;

use crate::math::{self, Aabb, Real, Vec3};

/// Opening angle: a subtree whose edge-to-distance ratio is below this is
/// collapsed to its center of mass.
pub const THETA: Real = 0.5;

/// Tolerance for debug containment checks, accounting for accumulated
/// floating point error in child cell corners.
const BOUNDS_EPSILON: Real = 1e-5;

/// A body collapsed to a point, as stored in occupied leaves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointMass {
    pub position: Vec3,
    pub mass: Real,
}

/// One cubic cell of the tree.
///
/// A leaf holds at most one body; a branch holds all eight children and no
/// direct body. `center_of_mass` is only meaningful after [`finalize`].
///
/// [`finalize`]: OctreeNode::finalize
#[derive(Debug)]
pub struct OctreeNode {
    /// Corner of the cell (componentwise minimum).
    position: Vec3,
    /// Edge length of the cubic cell.
    length: Real,
    children: Option<Box<[OctreeNode; 8]>>,
    total_mass: Real,
    center_of_mass: Vec3,
    body: Option<PointMass>,
}

impl OctreeNode {
    pub fn new(position: Vec3, length: Real) -> Self {
        Self {
            position,
            length,
            children: None,
            total_mass: 0.0,
            center_of_mass: Vec3::zero(),
            body: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// An empty leaf. Branches are never created empty.
    fn is_empty(&self) -> bool {
        self.is_leaf() && self.body.is_none()
    }

    pub fn total_mass(&self) -> Real {
        self.total_mass
    }

    pub fn center_of_mass(&self) -> Vec3 {
        self.center_of_mass
    }

    fn debug_assert_contains(&self, pos: Vec3) {
        debug_assert!(pos.x >= self.position.x - BOUNDS_EPSILON);
        debug_assert!(pos.y >= self.position.y - BOUNDS_EPSILON);
        debug_assert!(pos.z >= self.position.z - BOUNDS_EPSILON);
        debug_assert!(pos.x <= self.position.x + self.length + BOUNDS_EPSILON);
        debug_assert!(pos.y <= self.position.y + self.length + BOUNDS_EPSILON);
        debug_assert!(pos.z <= self.position.z + self.length + BOUNDS_EPSILON);
    }

    /// Octant index for a position within this cell:
    /// `4*[x >= mid] + 2*[y >= mid] + 1*[z >= mid]`.
    pub fn child_index(&self, pos: Vec3) -> usize {
        self.debug_assert_contains(pos);
        let mid = self.position + Vec3::broadcast(self.length * 0.5);
        4 * usize::from(pos.x >= mid.x) + 2 * usize::from(pos.y >= mid.y) + usize::from(pos.z >= mid.z)
    }

    /// Allocate all eight children with halved edge length.
    ///
    /// The offset order matches `child_index`: bit 2 selects the +x half,
    /// bit 1 the +y half, bit 0 the +z half.
    fn subdivide(&mut self) -> &mut [OctreeNode; 8] {
        debug_assert!(self.is_leaf());

        let half = self.length * 0.5;
        let offsets = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, half),
            Vec3::new(0.0, half, 0.0),
            Vec3::new(0.0, half, half),
            Vec3::new(half, 0.0, 0.0),
            Vec3::new(half, 0.0, half),
            Vec3::new(half, half, 0.0),
            Vec3::new(half, half, half),
        ];
        let children = offsets.map(|offset| OctreeNode::new(self.position + offset, half));
        self.children.insert(Box::new(children))
    }

    fn child_mut(&mut self, index: usize) -> Option<&mut OctreeNode> {
        self.children.as_mut().map(|children| &mut children[index])
    }

    /// Insert one body into the subtree rooted here.
    ///
    /// Two bodies at the bit-identical position merge their masses in one
    /// leaf; no amount of subdividing could separate them.
    pub fn insert_body(&mut self, body_position: Vec3, body_mass: Real) {
        let index = self.child_index(body_position);
        self.total_mass += body_mass;

        match self.children.as_mut() {
            Some(children) => children[index].insert_body(body_position, body_mass),
            None => match self.body.take() {
                None => {
                    self.body = Some(PointMass {
                        position: body_position,
                        mass: body_mass,
                    });
                }
                Some(existing) if existing.position == body_position => {
                    self.body = Some(PointMass {
                        position: existing.position,
                        mass: existing.mass + body_mass,
                    });
                }
                Some(existing) => {
                    // The displaced body goes first, then the new one.
                    let existing_index = self.child_index(existing.position);
                    let children = self.subdivide();
                    children[existing_index].insert_body(existing.position, existing.mass);
                    children[index].insert_body(body_position, body_mass);
                }
            },
        }
    }

    /// Destructively fold `other` (a tree over the identical cell) into
    /// this one. Centers of mass are recomputed by a later `finalize`.
    pub fn merge_from(&mut self, mut other: OctreeNode) {
        debug_assert!(self.position == other.position && self.length == other.length);

        match (self.children.is_some(), other.children.take()) {
            (true, Some(other_children)) => {
                // Branch + branch: merge the eight child pairs.
                if let Some(children) = self.children.as_mut() {
                    for (child, other_child) in children.iter_mut().zip(*other_children) {
                        child.merge_from(other_child);
                    }
                    self.total_mass = children.iter().map(|c| c.total_mass).sum();
                }
            }
            (false, Some(other_children)) => {
                // Leaf + branch: steal the other's children, then re-place
                // our own body below. Its mass is already counted here.
                self.children = Some(other_children);
                self.total_mass += other.total_mass;
                if let Some(body) = self.body.take() {
                    let index = self.child_index(body.position);
                    if let Some(child) = self.child_mut(index) {
                        child.insert_body(body.position, body.mass);
                    }
                }
            }
            (_, None) => {
                // The other side is a leaf; an occupied one inserts as usual.
                if let Some(body) = other.body {
                    self.insert_body(body.position, body.mass);
                }
            }
        }
    }

    /// Compute centers of mass bottom-up. The subtree is read-only after.
    pub fn finalize(&mut self) {
        match self.children.as_mut() {
            Some(children) => {
                let mut weighted = Vec3::zero();
                for child in children.iter_mut() {
                    if child.is_empty() {
                        continue;
                    }
                    child.finalize();
                    weighted += child.center_of_mass * child.total_mass;
                }
                self.center_of_mass = weighted / self.total_mass;
            }
            None => {
                // Mass weighting is applied by the parent.
                if let Some(body) = self.body {
                    self.center_of_mass = body.position;
                }
            }
        }
    }

    /// Barnes-Hut traversal: `visit` receives the (position, mass) of
    /// either a collapsed subtree or an individual body.
    pub fn walk_and_apply<F>(&self, body_position: Vec3, softening: Real, visit: &mut F)
    where
        F: FnMut(Vec3, Real),
    {
        let distance_to_center = math::length(self.center_of_mass - body_position) + softening;
        if self.length / distance_to_center < THETA {
            // Far enough away that the approximation suffices.
            visit(self.center_of_mass, self.total_mass);
            return;
        }

        match self.children.as_ref() {
            None => {
                if let Some(body) = self.body {
                    // Skip the walking body itself.
                    if body.position != body_position {
                        visit(body.position, body.mass);
                    }
                }
            }
            Some(children) => {
                for child in children.iter() {
                    if !child.is_empty() {
                        child.walk_and_apply(body_position, softening, visit);
                    }
                }
            }
        }
    }
}

/// Find (corner, length) of a cube encompassing the box. Wasting space is
/// fine; straddling bodies are not.
fn root_for_bounds(aabb: &Aabb) -> OctreeNode {
    debug_assert!(aabb.is_finite());
    let length = aabb.largest_extent();
    let corner = aabb.center() - Vec3::broadcast(length * 0.5);
    OctreeNode::new(corner, length)
}

/// The tree over one tick's body positions.
#[derive(Debug)]
pub struct Octree {
    bounds: Aabb,
    root: OctreeNode,
}

impl Octree {
    /// Build and finalize a tree over all bodies.
    pub fn from_bodies(positions: &[Vec3], masses: &[Real]) -> Self {
        debug_assert_eq!(positions.len(), masses.len());

        let bounds = Aabb::from_points(positions.iter().copied());
        let mut root = root_for_bounds(&bounds);
        for (&position, &mass) in positions.iter().zip(masses) {
            root.insert_body(position, mass);
        }
        root.finalize();

        trace!(
            "octree over {} bodies, root edge {:.3e} km",
            positions.len(),
            root.length
        );
        Self { bounds, root }
    }

    /// Unfinalized tree over a subset of bodies. Partials built over the
    /// same bounds are structurally alignable and exist only to be fed to
    /// [`Octree::from_partials`].
    pub fn partial_over(bounds: &Aabb, positions: &[Vec3], masses: &[Real]) -> Self {
        debug_assert_eq!(positions.len(), masses.len());

        let mut root = root_for_bounds(bounds);
        for (&position, &mass) in positions.iter().zip(masses) {
            root.insert_body(position, mass);
        }
        Self { bounds: *bounds, root }
    }

    /// Fold partial trees with shared bounds into one finalized tree.
    pub fn from_partials<I>(bounds: &Aabb, partials: I) -> Self
    where
        I: IntoIterator<Item = Octree>,
    {
        let mut root = root_for_bounds(bounds);
        for partial in partials {
            root.merge_from(partial.root);
        }
        root.finalize();
        Self { bounds: *bounds, root }
    }

    /// Accumulate the whole tree's gravity on one body position.
    pub fn apply_forces_to(&self, body_position: Vec3, softening: Real, acceleration: &mut Vec3) {
        self.root.walk_and_apply(body_position, softening, &mut |node_position, node_mass| {
            math::accumulate_acceleration(body_position, node_position, node_mass, softening, acceleration);
        });
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn root(&self) -> &OctreeNode {
        &self.root
    }
}

/// Sequential Barnes-Hut baseline: zero, build, apply per body.
pub fn barnes_hut_accelerations(
    positions: &[Vec3],
    masses: &[Real],
    softening: Real,
    accelerations: &mut [Vec3],
) {
    accelerations.fill(Vec3::zero());
    let octree = Octree::from_bodies(positions, masses);
    for (acceleration, &position) in accelerations.iter_mut().zip(positions) {
        octree.apply_forces_to(position, softening, acceleration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naive::naive_accelerations;

    fn test_cloud(n: usize) -> (Vec<Vec3>, Vec<Real>) {
        fastrand::seed(7);
        let positions = (0..n)
            .map(|_| {
                Vec3::new(
                    fastrand::f64() * 100.0 - 50.0,
                    fastrand::f64() * 100.0 - 50.0,
                    fastrand::f64() * 100.0 - 50.0,
                )
            })
            .collect();
        let masses = (0..n).map(|_| 0.1 + fastrand::f64()).collect();
        (positions, masses)
    }

    #[test]
    fn root_mass_equals_body_mass_sum() {
        let (positions, masses) = test_cloud(300);
        let octree = Octree::from_bodies(&positions, &masses);
        let expected: Real = masses.iter().sum();
        let got = octree.root().total_mass();
        assert!((got - expected).abs() <= expected * 1e-12);
    }

    #[test]
    fn center_of_mass_matches_weighted_mean() {
        let (positions, masses) = test_cloud(200);
        let octree = Octree::from_bodies(&positions, &masses);

        let total: Real = masses.iter().sum();
        let mut weighted = Vec3::zero();
        for (&p, &m) in positions.iter().zip(&masses) {
            weighted += p * m;
        }
        let expected = weighted / total;

        let got = octree.root().center_of_mass();
        assert!((got - expected).mag() < 1e-9 * (1.0 + expected.mag()));
    }

    #[test]
    fn child_index_round_trip() {
        let (positions, masses) = test_cloud(64);
        let octree = Octree::from_bodies(&positions, &masses);

        // Descending by child_index from the root must end at a leaf whose
        // cell contains the body.
        for &p in &positions {
            let mut node = octree.root();
            while let Some(children) = node.children.as_ref() {
                node = &children[node.child_index(p)];
            }
            let body = node.body.expect("descent ended at an occupied leaf");
            assert_eq!(body.position, p);
            assert!(p.x >= node.position.x - BOUNDS_EPSILON);
            assert!(p.y >= node.position.y - BOUNDS_EPSILON);
            assert!(p.z >= node.position.z - BOUNDS_EPSILON);
            assert!(p.x <= node.position.x + node.length + BOUNDS_EPSILON);
            assert!(p.y <= node.position.y + node.length + BOUNDS_EPSILON);
            assert!(p.z <= node.position.z + node.length + BOUNDS_EPSILON);
        }
    }

    #[test]
    fn branches_hold_no_direct_body() {
        let (positions, masses) = test_cloud(128);
        let octree = Octree::from_bodies(&positions, &masses);

        fn check(node: &OctreeNode) {
            if let Some(children) = node.children.as_ref() {
                assert!(node.body.is_none());
                for child in children.iter() {
                    check(child);
                }
            }
        }
        check(octree.root());
    }

    #[test]
    fn merging_partials_matches_whole_tree_forces() {
        let (positions, masses) = test_cloud(240);
        let bounds = Aabb::from_points(positions.iter().copied());

        let whole = Octree::from_bodies(&positions, &masses);
        let partials = positions
            .chunks(80)
            .zip(masses.chunks(80))
            .map(|(p, m)| Octree::partial_over(&bounds, p, m))
            .collect::<Vec<_>>();
        let merged = Octree::from_partials(&bounds, partials);

        assert!(
            (whole.root().total_mass() - merged.root().total_mass()).abs()
                <= whole.root().total_mass() * 1e-12
        );

        for &p in &positions {
            let mut a = Vec3::zero();
            let mut b = Vec3::zero();
            whole.apply_forces_to(p, 0.05, &mut a);
            merged.apply_forces_to(p, 0.05, &mut b);
            // Identical up to reassociation of mass-weighted sums.
            assert!((a - b).mag() <= 1e-9 * (1.0 + a.mag()));
        }
    }

    #[test]
    fn two_bodies_match_the_pairwise_kernel_exactly() {
        let positions = vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let masses = vec![2.0, 3.0];

        let mut accelerations = vec![Vec3::zero(); 2];
        barnes_hut_accelerations(&positions, &masses, 0.05, &mut accelerations);

        let mut expected = vec![Vec3::zero(); 2];
        naive_accelerations(&positions, &masses, 0.05, &mut expected);

        // Both leaves are visited individually; no approximation applies.
        assert!((accelerations[0] - expected[0]).mag() <= 1e-15 * expected[0].mag());
        assert!((accelerations[1] - expected[1]).mag() <= 1e-15 * expected[1].mag());
    }

    #[test]
    fn coincident_bodies_merge_and_stay_finite() {
        let p = Vec3::new(4.0, 4.0, 4.0);
        let positions = vec![p, p, Vec3::new(-3.0, 0.0, 1.0)];
        let masses = vec![1.0, 2.0, 5.0];

        let octree = Octree::from_bodies(&positions, &masses);
        assert!((octree.root().total_mass() - 8.0).abs() < 1e-12);

        let mut acceleration = Vec3::zero();
        octree.apply_forces_to(p, 0.05, &mut acceleration);
        assert!(math::vec3_is_finite(acceleration));
    }

    #[test]
    fn single_body_sees_no_force() {
        let positions = vec![Vec3::new(5.0, -2.0, 8.0)];
        let masses = vec![3.0];
        let octree = Octree::from_bodies(&positions, &masses);

        let mut acceleration = Vec3::zero();
        octree.apply_forces_to(positions[0], 0.05, &mut acceleration);
        assert_eq!(acceleration, Vec3::zero());
    }
}
