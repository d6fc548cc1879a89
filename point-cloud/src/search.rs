//! Nearest-neighbour search over a point cloud.
//!
//! Every query returns `(index, squared distance)` pairs sorted by ascending
//! distance. The query point itself is included when it belongs to the cloud.

use cv_core::{Error, PointCloud, Result};
use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

// Wrapper for RTree
struct PointWrapper(usize, Point3<f32>);

impl RTreeObject for PointWrapper {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.1.x, self.1.y, self.1.z])
    }
}

impl PointDistance for PointWrapper {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.1.x - point[0];
        let dy = self.1.y - point[1];
        let dz = self.1.z - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Neighbourhood definition shared by normal estimation and FPFH.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchParam {
    /// The `k` nearest points.
    Knn { k: usize },
    /// Every point within `radius`.
    Radius { radius: f32 },
    /// At most `max_nn` nearest points within `radius`.
    Hybrid { radius: f32, max_nn: usize },
}

impl SearchParam {
    pub fn hybrid(radius: f32, max_nn: usize) -> Self {
        Self::Hybrid { radius, max_nn }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Knn { k } | Self::Hybrid { max_nn: k, .. } if k == 0 => Err(
                Error::invalid_parameter("neighbour count must be at least 1"),
            ),
            Self::Radius { radius } | Self::Hybrid { radius, .. } => {
                cv_core::ensure_positive("search radius", radius)
            }
            Self::Knn { .. } => Ok(()),
        }
    }
}

/// Spatial index over a fixed set of points.
pub struct PointIndex {
    tree: RTree<PointWrapper>,
}

impl PointIndex {
    pub fn new(points: &[Point3<f32>]) -> Self {
        let wrappers: Vec<PointWrapper> = points
            .iter()
            .enumerate()
            .map(|(i, p)| PointWrapper(i, *p))
            .collect();
        Self {
            tree: RTree::bulk_load(wrappers),
        }
    }

    pub fn from_cloud(cloud: &PointCloud) -> Self {
        Self::new(&cloud.points)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn nearest(&self, query: &Point3<f32>) -> Option<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter_with_distance_2(&q)
            .next()
            .map(|(w, d2)| (w.0, d2))
    }

    pub fn search_knn(&self, query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter_with_distance_2(&q)
            .take(k)
            .map(|(w, d2)| (w.0, d2))
            .collect()
    }

    pub fn search_radius(&self, query: &Point3<f32>, radius: f32) -> Vec<(usize, f32)> {
        self.search_hybrid(query, radius, usize::MAX)
    }

    pub fn search_hybrid(&self, query: &Point3<f32>, radius: f32, max_nn: usize) -> Vec<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        let r2 = radius * radius;
        self.tree
            .nearest_neighbor_iter_with_distance_2(&q)
            .take_while(|&(_, d2)| d2 <= r2)
            .take(max_nn)
            .map(|(w, d2)| (w.0, d2))
            .collect()
    }

    pub fn search(&self, query: &Point3<f32>, param: &SearchParam) -> Vec<(usize, f32)> {
        match *param {
            SearchParam::Knn { k } => self.search_knn(query, k),
            SearchParam::Radius { radius } => self.search_radius(query, radius),
            SearchParam::Hybrid { radius, max_nn } => self.search_hybrid(query, radius, max_nn),
        }
    }
}
