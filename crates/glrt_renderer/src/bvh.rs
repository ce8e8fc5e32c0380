//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! The hierarchy is a binary tree stored in one flat node array, with children
//! referenced by index so the array can be copied into a GPU buffer unchanged.
//! Node 0 is the root and every node precedes its subtree.
//!
//! Construction recursively partitions a contiguous range of triangles in place:
//! small ranges are split at the centroid median, larger ones with a bucketed
//! surface area heuristic (SAH).

use glrt_math::{Bounds, Vec3};
use thiserror::Error;

use crate::primitive::{extract_primitives, PrimitiveInfo};

/// Ranges with at most this many triangles are split at the centroid median.
pub const MEDIAN_SPLIT_THRESHOLD: usize = 8;

/// Number of equal-width centroid buckets evaluated by the SAH split.
pub const SAH_BUCKET_COUNT: usize = 16;

/// Cost of one traversal step relative to one triangle intersection.
pub const SAH_TRAVERSAL_COST: f64 = 0.125;

/// Added to the centroid span before bucketing so a zero span never divides by zero.
pub const SAH_BUCKET_EPSILON: f64 = 1.0e-8;

/// Largest triangle count whose `2n - 1` nodes are addressable with `u32`.
pub const MAX_TRIANGLES: usize = (u32::MAX / 2) as usize;

/// Errors that can occur during BVH construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BvhError {
    #[error("Index count {0} is not a multiple of 3")]
    UnalignedIndices(usize),

    #[error("Triangle {triangle} references vertex {index}, but only {vertex_count} vertices exist")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("Too many triangles for 32-bit node indices: {0}")]
    TooManyTriangles(usize),

    #[error("Invalid BVH configuration: {0}")]
    InvalidConfig(String),
}

pub type BvhResult<T> = Result<T, BvhError>;

/// Builder tuning parameters.
///
/// Changing any of these changes the shape of the tree, not its validity.
#[derive(Debug, Clone, PartialEq)]
pub struct BvhConfig {
    /// Ranges with at most this many triangles use the median split
    pub median_split_threshold: usize,
    /// Number of SAH buckets (at least 2)
    pub bucket_count: usize,
    /// Fixed per-split traversal cost added to every SAH candidate
    pub traversal_cost: f64,
    /// Guard added to the centroid span when computing bucket widths
    pub bucket_epsilon: f64,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            median_split_threshold: MEDIAN_SPLIT_THRESHOLD,
            bucket_count: SAH_BUCKET_COUNT,
            traversal_cost: SAH_TRAVERSAL_COST,
            bucket_epsilon: SAH_BUCKET_EPSILON,
        }
    }
}

impl BvhConfig {
    /// Check that the parameters describe a usable builder.
    pub fn validate(&self) -> BvhResult<()> {
        if self.median_split_threshold < 1 {
            return Err(BvhError::InvalidConfig(
                "median_split_threshold must be at least 1".into(),
            ));
        }
        if self.bucket_count < 2 {
            return Err(BvhError::InvalidConfig(format!(
                "bucket_count must be at least 2, got {}",
                self.bucket_count
            )));
        }
        if !self.traversal_cost.is_finite() || self.traversal_cost < 0.0 {
            return Err(BvhError::InvalidConfig(format!(
                "traversal_cost must be finite and non-negative, got {}",
                self.traversal_cost
            )));
        }
        if !self.bucket_epsilon.is_finite() || self.bucket_epsilon <= 0.0 {
            return Err(BvhError::InvalidConfig(format!(
                "bucket_epsilon must be finite and positive, got {}",
                self.bucket_epsilon
            )));
        }
        Ok(())
    }
}

/// BVH node - either a fork with two children or a leaf with one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BvhNode {
    /// Terminal node referencing one triangle of the original index list.
    Leaf { bounds: Bounds, triangle: u32 },
    /// Internal node with two children (indices into the node array).
    Fork {
        bounds: Bounds,
        left: u32,
        right: u32,
        axis: usize,
    },
}

impl BvhNode {
    /// Union of all triangle bounds beneath this node.
    pub fn bounds(&self) -> &Bounds {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Fork { bounds, .. } => bounds,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, BvhNode::Leaf { .. })
    }

    /// `(left, right)` for forks.
    pub fn children(&self) -> Option<(u32, u32)> {
        match *self {
            BvhNode::Fork { left, right, .. } => Some((left, right)),
            BvhNode::Leaf { .. } => None,
        }
    }

    /// Original triangle index for leaves.
    pub fn triangle(&self) -> Option<u32> {
        match *self {
            BvhNode::Leaf { triangle, .. } => Some(triangle),
            BvhNode::Fork { .. } => None,
        }
    }

    /// Split axis for forks (0=X, 1=Y, 2=Z).
    pub fn axis(&self) -> Option<usize> {
        match *self {
            BvhNode::Fork { axis, .. } => Some(axis),
            BvhNode::Leaf { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    count: usize,
    bounds: Bounds,
}

impl Bucket {
    fn absorb(&mut self, other: &Bucket) {
        self.count += other.count;
        self.bounds = Bounds::merge(&self.bounds, &other.bounds);
    }
}

/// Flat, immutable BVH over a triangle list.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    config: BvhConfig,
}

impl Bvh {
    /// Build a BVH with the default configuration.
    pub fn new(positions: &[Vec3], indices: &[u32]) -> BvhResult<Self> {
        Self::with_config(positions, indices, BvhConfig::default())
    }

    /// Build a BVH with explicit builder parameters.
    pub fn with_config(positions: &[Vec3], indices: &[u32], config: BvhConfig) -> BvhResult<Self> {
        let mut bvh = Self {
            nodes: Vec::new(),
            config,
        };
        bvh.construct(positions, indices)?;
        Ok(bvh)
    }

    /// Rebuild the node array from scratch and return the root index.
    ///
    /// An empty index list yields an empty node array and `None`. On error the
    /// previous nodes are left untouched.
    pub fn construct(&mut self, positions: &[Vec3], indices: &[u32]) -> BvhResult<Option<u32>> {
        self.config.validate()?;
        let mut prims = extract_primitives(positions, indices)?;

        self.nodes.clear();
        if prims.is_empty() {
            log::debug!("BVH: empty scene, no nodes");
            return Ok(None);
        }

        self.nodes.reserve(2 * prims.len() - 1);
        let n = prims.len();
        let root = self.build_range(&mut prims, 0, n);

        log::debug!(
            "BVH: {} triangles, {} nodes, {} leaves, depth {}",
            n,
            self.nodes.len(),
            self.leaf_count(),
            self.depth()
        );
        Ok(Some(root))
    }

    /// Build the subtree over `prims[left..right]` and return its node index.
    fn build_range(&mut self, prims: &mut [PrimitiveInfo], left: usize, right: usize) -> u32 {
        debug_assert!(left < right);

        let node_id = self.nodes.len() as u32;
        let bounds = prims[left..right]
            .iter()
            .fold(Bounds::EMPTY, |acc, p| Bounds::merge(&acc, &p.bounds));

        let nprims = right - left;
        if nprims == 1 {
            self.nodes.push(BvhNode::Leaf {
                bounds,
                triangle: prims[left].index,
            });
            return node_id;
        }

        let mut centroid_bounds = Bounds::EMPTY;
        for p in &prims[left..right] {
            centroid_bounds.merge_point(p.centroid);
        }
        let axis = centroid_bounds.max_extent();

        // Claim the slot now so this node precedes its subtree.
        self.nodes.push(BvhNode::Fork {
            bounds,
            left: 0,
            right: 0,
            axis,
        });

        let mid = if nprims <= self.config.median_split_threshold {
            median_split(prims, left, right, axis)
        } else {
            self.sah_split(prims, left, right, axis, &bounds, &centroid_bounds)
        };

        let left_child = self.build_range(prims, left, mid);
        let right_child = self.build_range(prims, mid, right);
        self.nodes[node_id as usize] = BvhNode::Fork {
            bounds,
            left: left_child,
            right: right_child,
            axis,
        };

        node_id
    }

    /// Partition `prims[left..right]` by SAH bucket and return the split index.
    ///
    /// Falls back to the index midpoint, without further reordering, when no
    /// bucket split is cheaper than the range's triangle count.
    fn sah_split(
        &self,
        prims: &mut [PrimitiveInfo],
        left: usize,
        right: usize,
        axis: usize,
        bounds: &Bounds,
        centroid_bounds: &Bounds,
    ) -> usize {
        let mid = (left + right) / 2;
        let nprims = right - left;

        // A flat parent makes every candidate cost 0/0.
        let parent_area = bounds.area();
        if parent_area <= 0.0 {
            return mid;
        }

        let bucket_count = self.config.bucket_count;
        let cmin = centroid_bounds.min[axis] as f64;
        let cmax = centroid_bounds.max[axis] as f64;
        let inv_span = 1.0 / ((cmax - cmin).abs() + self.config.bucket_epsilon);
        // Offsets are taken in f64 for both passes so bucketing and partitioning
        // agree; an f32 subtraction can shift a centroid on a bucket edge.
        let bucket_of = |p: &PrimitiveInfo| -> usize {
            let offset = (p.centroid[axis] as f64 - cmin).abs();
            ((bucket_count as f64 * offset * inv_span) as usize).min(bucket_count - 1)
        };

        let mut buckets = vec![Bucket::default(); bucket_count];
        for p in &prims[left..right] {
            let b = &mut buckets[bucket_of(p)];
            b.count += 1;
            b.bounds = Bounds::merge(&b.bounds, &p.bounds);
        }

        let costs = self.split_costs(&buckets, parent_area);
        let (best_split, best_cost) = costs
            .iter()
            .copied()
            .enumerate()
            .skip(1)
            .fold((0, costs[0]), |(bi, bc), (i, c)| if c < bc { (i, c) } else { (bi, bc) });

        if best_cost < nprims as f64 {
            let split = left + partition(&mut prims[left..right], |p| bucket_of(p) <= best_split);
            if split > left && split < right {
                return split;
            }
        }

        mid
    }

    /// SAH cost of splitting after each bucket `i` in `0..buckets.len() - 1`.
    fn split_costs(&self, buckets: &[Bucket], parent_area: f32) -> Vec<f64> {
        let n = buckets.len();

        // above[i] = union of buckets i+1..n
        let mut above = vec![Bucket::default(); n - 1];
        let mut acc = Bucket::default();
        for i in (1..n).rev() {
            acc.absorb(&buckets[i]);
            above[i - 1] = acc;
        }

        let mut below = Bucket::default();
        (0..n - 1)
            .map(|i| {
                below.absorb(&buckets[i]);
                let r = &above[i];
                let weighted = below.count as f32 * below.bounds.area()
                    + r.count as f32 * r.bounds.area();
                self.config.traversal_cost + (weighted / parent_area) as f64
            })
            .collect()
    }

    /// Root node index, `None` for an empty hierarchy.
    pub fn root(&self) -> Option<u32> {
        (!self.nodes.is_empty()).then_some(0)
    }

    /// Nodes in construction order; node 0 is the root when non-empty.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    pub fn config(&self) -> &BvhConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Triangle indices of all leaves, in node order.
    pub fn leaf_triangles(&self) -> Vec<u32> {
        self.nodes.iter().filter_map(BvhNode::triangle).collect()
    }

    /// Number of nodes on the longest root-to-leaf path (0 when empty).
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = Vec::new();
        if let Some(root) = self.root() {
            stack.push((root, 1));
        }
        while let Some((i, d)) = stack.pop() {
            max_depth = max_depth.max(d);
            if let Some((l, r)) = self.nodes[i as usize].children() {
                stack.push((l, d + 1));
                stack.push((r, d + 1));
            }
        }
        max_depth
    }
}

/// Reorder `prims[left..right]` so the median by centroid on `axis` sits at the
/// index midpoint, with no larger centroid below it and no smaller one above.
fn median_split(prims: &mut [PrimitiveInfo], left: usize, right: usize, axis: usize) -> usize {
    let mid = (left + right) / 2;
    prims[left..right].select_nth_unstable_by(mid - left, |a, b| {
        a.centroid[axis].total_cmp(&b.centroid[axis])
    });
    mid
}

/// Move every element matching `pred` to the front; returns how many matched.
fn partition<T>(items: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut first = 0;
    for i in 0..items.len() {
        if pred(&items[i]) {
            items.swap(first, i);
            first += 1;
        }
    }
    first
}
