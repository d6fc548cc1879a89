use nalgebra::{Matrix4, Point3, Scalar, Vector3};

/// Ordered 3D points with optional per-point colors and normals.
///
/// Colors are RGB in `[0, 1]`. When present, `colors` and `normals` have
/// exactly one entry per point; the constructors below enforce it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud<T: Scalar = f32> {
    pub points: Vec<Point3<T>>,
    pub colors: Option<Vec<Point3<T>>>,
    pub normals: Option<Vec<Vector3<T>>>,
}

impl<T: Scalar> PointCloud<T> {
    pub fn new(points: Vec<Point3<T>>) -> Self {
        Self {
            points,
            colors: None,
            normals: None,
        }
    }

    pub fn with_colors(mut self, colors: Vec<Point3<T>>) -> crate::Result<Self> {
        if colors.len() == self.points.len() {
            self.colors = Some(colors);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Color count {} does not match point count {}",
                colors.len(),
                self.points.len()
            )))
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<T>>) -> crate::Result<Self> {
        if normals.len() == self.points.len() {
            self.normals = Some(normals);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Normal count {} does not match point count {}",
                normals.len(),
                self.points.len()
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_colors(&self) -> bool {
        self.colors.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn has_normals(&self) -> bool {
        self.normals.as_ref().is_some_and(|n| !n.is_empty())
    }

    /// Keep the listed indices (or drop them when `invert` is set).
    ///
    /// Output order follows the cloud, not `indices`. Out-of-range indices
    /// are ignored.
    pub fn select_by_index(&self, indices: &[usize], invert: bool) -> Self {
        let mut mask = vec![invert; self.points.len()];
        for &i in indices {
            if let Some(m) = mask.get_mut(i) {
                *m = !invert;
            }
        }

        let keep = |i: &usize| mask[*i];
        let kept: Vec<usize> = (0..self.points.len()).filter(keep).collect();

        Self {
            points: kept.iter().map(|&i| self.points[i].clone()).collect(),
            colors: self
                .colors
                .as_ref()
                .map(|c| kept.iter().map(|&i| c[i].clone()).collect()),
            normals: self
                .normals
                .as_ref()
                .map(|n| kept.iter().map(|&i| n[i].clone()).collect()),
        }
    }

    /// Append `other` to this cloud. An attribute survives only when both
    /// clouds carry it.
    pub fn concatenate(&mut self, other: &Self) {
        let self_empty = self.points.is_empty();
        self.points.extend(other.points.iter().cloned());

        self.colors = match (self.colors.take(), &other.colors) {
            (Some(mut a), Some(b)) => {
                a.extend(b.iter().cloned());
                Some(a)
            }
            (None, Some(b)) if self_empty => Some(b.clone()),
            _ => None,
        };
        self.normals = match (self.normals.take(), &other.normals) {
            (Some(mut a), Some(b)) => {
                a.extend(b.iter().cloned());
                Some(a)
            }
            (None, Some(b)) if self_empty => Some(b.clone()),
            _ => None,
        };
    }
}

impl PointCloud<f32> {
    /// Arithmetic mean of the points, or the origin for an empty cloud.
    pub fn get_center(&self) -> Point3<f32> {
        if self.points.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.points.len() as f32)
    }

    pub fn min_bound(&self) -> Point3<f32> {
        if self.points.is_empty() {
            return Point3::origin();
        }
        self.points
            .iter()
            .skip(1)
            .fold(self.points[0], |acc, p| acc.inf(p))
    }

    pub fn max_bound(&self) -> Point3<f32> {
        if self.points.is_empty() {
            return Point3::origin();
        }
        self.points
            .iter()
            .skip(1)
            .fold(self.points[0], |acc, p| acc.sup(p))
    }

    /// Length of the axis-aligned bounding box diagonal.
    pub fn bounding_box_diagonal(&self) -> f32 {
        (self.max_bound() - self.min_bound()).norm()
    }

    /// Assign the same RGB color to every point.
    pub fn paint_uniform_color(&mut self, color: [f32; 3]) {
        let c = Point3::new(
            color[0].clamp(0.0, 1.0),
            color[1].clamp(0.0, 1.0),
            color[2].clamp(0.0, 1.0),
        );
        self.colors = Some(vec![c; self.points.len()]);
    }

    /// Apply a homogeneous transform in place. Normals follow the rotational
    /// part and are renormalized.
    pub fn transform(&mut self, transformation: &Matrix4<f32>) {
        for p in &mut self.points {
            *p = transformation.transform_point(p);
        }
        if let Some(normals) = &mut self.normals {
            for n in normals.iter_mut() {
                let rotated = transformation.transform_vector(n);
                let norm = rotated.norm();
                *n = if norm > 0.0 { rotated / norm } else { rotated };
            }
        }
    }

    /// Transformed copy; `self` is left untouched.
    pub fn transformed(&self, transformation: &Matrix4<f32>) -> Self {
        let mut out = self.clone();
        out.transform(transformation);
        out
    }

    pub fn translate(&mut self, offset: &Vector3<f32>) {
        for p in &mut self.points {
            *p += *offset;
        }
    }

    /// Scale about `center`: `p' = center + factor * (p - center)`.
    pub fn scale(&mut self, factor: f32, center: &Point3<f32>) {
        for p in &mut self.points {
            *p = center + (*p - center) * factor;
        }
    }

    pub fn scaled(&self, factor: f32, center: &Point3<f32>) -> Self {
        let mut out = self.clone();
        out.scale(factor, center);
        out
    }
}

pub type PointCloudf32 = PointCloud<f32>;
pub type PointCloudf64 = PointCloud<f64>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> PointCloud {
        PointCloud::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn test_center_and_bounds() {
        let pc = unit_square();
        let c = pc.get_center();
        assert_relative_eq!(c.x, 0.5);
        assert_relative_eq!(c.y, 0.5);
        assert_relative_eq!(pc.bounding_box_diagonal(), 2.0f32.sqrt());

        let empty: PointCloud = PointCloud::default();
        assert_eq!(empty.get_center(), Point3::origin());
        assert_eq!(empty.bounding_box_diagonal(), 0.0);
    }

    #[test]
    fn test_scale_about_center_keeps_center() {
        let pc = unit_square();
        let center = pc.get_center();
        let scaled = pc.scaled(3.0, &center);

        let c = scaled.get_center();
        assert_relative_eq!(c.x, center.x, epsilon = 1e-6);
        assert_relative_eq!(c.y, center.y, epsilon = 1e-6);
        assert_relative_eq!(
            scaled.bounding_box_diagonal(),
            3.0 * pc.bounding_box_diagonal(),
            epsilon = 1e-5
        );
        // original untouched
        assert_eq!(pc.points[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_transformed_is_a_copy() {
        let pc = unit_square()
            .with_normals(vec![Vector3::z(); 4])
            .unwrap();
        let mut t = Matrix4::identity();
        t[(0, 3)] = 2.0;
        // 90 degrees about x: z normal becomes -y
        t[(1, 1)] = 0.0;
        t[(1, 2)] = -1.0;
        t[(2, 1)] = 1.0;
        t[(2, 2)] = 0.0;

        let moved = pc.transformed(&t);
        assert_relative_eq!(moved.points[0].x, 2.0);
        let n = moved.normals.as_ref().unwrap()[0];
        assert_relative_eq!(n.y, -1.0, epsilon = 1e-6);
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-6);

        assert_eq!(pc.points[0], Point3::origin());
        assert_eq!(pc.normals.as_ref().unwrap()[0], Vector3::z());
    }

    #[test]
    fn test_paint_uniform_color() {
        let mut pc = unit_square();
        pc.paint_uniform_color([1.0, 0.0, 2.0]);
        let colors = pc.colors.as_ref().unwrap();
        assert_eq!(colors.len(), 4);
        assert_eq!(colors[3], Point3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_select_by_index() {
        let pc = unit_square()
            .with_colors(vec![
                Point3::new(0.1, 0.0, 0.0),
                Point3::new(0.2, 0.0, 0.0),
                Point3::new(0.3, 0.0, 0.0),
                Point3::new(0.4, 0.0, 0.0),
            ])
            .unwrap();

        let inliers = pc.select_by_index(&[2, 0, 17], false);
        assert_eq!(inliers.len(), 2);
        assert_eq!(inliers.points[0], pc.points[0]);
        assert_eq!(inliers.colors.as_ref().unwrap()[1].x, 0.3);

        let outliers = pc.select_by_index(&[2, 0], true);
        assert_eq!(outliers.len(), 2);
        assert_eq!(outliers.points, vec![pc.points[1], pc.points[3]]);
    }

    #[test]
    fn test_concatenate_drops_unshared_attributes() {
        let mut a = unit_square();
        a.paint_uniform_color([1.0, 0.0, 0.0]);
        let mut b = unit_square();
        b.paint_uniform_color([0.0, 0.0, 1.0]);

        a.concatenate(&b);
        assert_eq!(a.len(), 8);
        assert_eq!(a.colors.as_ref().unwrap().len(), 8);

        let plain = unit_square();
        a.concatenate(&plain);
        assert_eq!(a.len(), 12);
        assert!(a.colors.is_none());
    }
}
