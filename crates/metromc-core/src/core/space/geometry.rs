use crate::core::utils::random::RandomSource;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use std::f64::consts::PI;

/// Simulation container, centered on the origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Rectangular box, periodic in all three directions.
    Cuboid { len: Vector3<f64> },
    /// Hard-walled sphere without periodic images.
    Sphere { radius: f64 },
}

impl Geometry {
    pub fn cube(side: f64) -> Self {
        Geometry::Cuboid {
            len: Vector3::repeat(side),
        }
    }

    pub fn sphere(radius: f64) -> Self {
        Geometry::Sphere { radius }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Geometry::Cuboid { len } => len.x * len.y * len.z,
            Geometry::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
        }
    }

    /// Isotropically rescales the container to `volume`.
    pub fn set_volume(&mut self, volume: f64) {
        let factor = (volume / self.volume()).cbrt();
        match self {
            Geometry::Cuboid { len } => *len *= factor,
            Geometry::Sphere { radius } => *radius *= factor,
        }
    }

    /// Minimum-image separation vector `a - b`.
    #[inline]
    pub fn vdist(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
        let d = a - b;
        match self {
            Geometry::Cuboid { len } => d - len.component_mul(&d.component_div(len).map(f64::round)),
            Geometry::Sphere { .. } => d,
        }
    }

    #[inline]
    pub fn sqdist(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.vdist(a, b).norm_squared()
    }

    #[inline]
    pub fn distance(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.sqdist(a, b).sqrt()
    }

    /// Folds a position back into the primary cell.
    #[inline]
    pub fn boundary(&self, p: &mut Point3<f64>) {
        if let Geometry::Cuboid { len } = self {
            p.coords -= len.component_mul(&p.coords.component_div(len).map(f64::round));
        }
    }

    /// True if `p` lies outside the container.
    #[inline]
    pub fn collision(&self, p: &Point3<f64>) -> bool {
        match self {
            Geometry::Cuboid { len } => {
                let half = len / 2.0;
                (0..3).any(|k| p[k].abs() > half[k] + 1e-9)
            }
            Geometry::Sphere { radius } => p.coords.norm() > radius + 1e-9,
        }
    }

    pub fn random_position(&self, rng: &mut RandomSource) -> Point3<f64> {
        match self {
            Geometry::Cuboid { len } => Point3::new(
                rng.half() * len.x,
                rng.half() * len.y,
                rng.half() * len.z,
            ),
            Geometry::Sphere { radius } => loop {
                let p = Point3::new(
                    2.0 * radius * rng.half(),
                    2.0 * radius * rng.half(),
                    2.0 * radius * rng.half(),
                );
                if !self.collision(&p) {
                    break p;
                }
            },
        }
    }

    /// Smallest periodic box length, `None` without periodic boundaries.
    pub fn periodic_length(&self) -> Option<f64> {
        match self {
            Geometry::Cuboid { len } => Some(len.min()),
            Geometry::Sphere { .. } => None,
        }
    }

    /// Rotates `point` about `pivot` using the minimum image and folds the result back.
    pub fn rotate_about(
        &self,
        point: &Point3<f64>,
        pivot: &Point3<f64>,
        rotation: &UnitQuaternion<f64>,
    ) -> Point3<f64> {
        let mut p = pivot + rotation * self.vdist(point, pivot);
        self.boundary(&mut p);
        p
    }

    /// Minimum-image centroid of `points`, folded into the primary cell.
    pub fn centroid<'a>(&self, points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Point3<f64>> {
        let mut iter = points.into_iter();
        let origin = *iter.next()?;
        let (sum, n) = iter.fold((Vector3::zeros(), 1usize), |(sum, n), p| {
            (sum + self.vdist(p, &origin), n + 1)
        });
        let mut cm = origin + sum / n as f64;
        self.boundary(&mut cm);
        Some(cm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn cuboid_uses_minimum_image() {
        let geo = Geometry::cube(10.0);
        let a = Point3::new(4.5, 0.0, 0.0);
        let b = Point3::new(-4.5, 0.0, 0.0);
        assert!((geo.distance(&a, &b) - 1.0).abs() < 1e-12);
        assert!((geo.vdist(&a, &b) - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn boundary_folds_into_primary_cell() {
        let geo = Geometry::cube(10.0);
        let mut p = Point3::new(6.0, -7.0, 14.0);
        geo.boundary(&mut p);
        assert!((p - Point3::new(-4.0, 3.0, 4.0)).norm() < 1e-12);
        assert!(!geo.collision(&p));
    }

    #[test]
    fn set_volume_scales_isotropically() {
        let mut cube = Geometry::cube(2.0);
        cube.set_volume(64.0);
        assert_eq!(cube, Geometry::cube(4.0));

        let mut sphere = Geometry::sphere(1.0);
        sphere.set_volume(4.0 / 3.0 * PI * 8.0);
        match sphere {
            Geometry::Sphere { radius } => assert!((radius - 2.0).abs() < 1e-12),
            _ => unreachable!(),
        }
    }

    #[test]
    fn sphere_reports_wall_collision() {
        let geo = Geometry::sphere(5.0);
        assert!(geo.collision(&Point3::new(0.0, 0.0, 5.1)));
        assert!(!geo.collision(&Point3::new(0.0, 3.0, 3.0)));
        assert!(geo.periodic_length().is_none());
    }

    #[test]
    fn random_positions_are_inside_container() {
        let mut rng = RandomSource::from_seed(2);
        for geo in [Geometry::cube(8.0), Geometry::sphere(3.0)] {
            for _ in 0..500 {
                assert!(!geo.collision(&geo.random_position(&mut rng)));
            }
        }
    }

    #[test]
    fn centroid_handles_wrapped_points() {
        let geo = Geometry::cube(10.0);
        let points = [Point3::new(4.9, 0.0, 0.0), Point3::new(-4.9, 0.0, 0.0)];
        let cm = geo.centroid(points.iter()).unwrap();
        assert!((cm.x.abs() - 5.0).abs() < 1e-9);
    }
}
