//! Collision shape sets carried by physics objects and static structures.

use crate::bsp::BspTree;
use crate::geometry::{Contact, CylSphere, Frame, Sphere};
use glam::Vec3;
use log::error;
use std::sync::Arc;

/// A moving shape may use at most this many spheres.
pub const MAX_MOVER_SPHERES: usize = 2;

/// Collision representation of one object, in its local frame.
#[derive(Debug, Clone)]
pub struct ShapeSet {
    pub spheres: Vec<Sphere>,
    pub cylspheres: Vec<CylSphere>,
    pub bsp: Option<Arc<BspTree>>,
    /// Uniform scale applied to `bsp` at query time.
    pub bsp_scale: f32,
    /// Per-shape step heights; zero falls back to the configured default.
    pub step_up_height: f32,
    pub step_down_height: f32,
}

impl Default for ShapeSet {
    fn default() -> Self {
        Self {
            spheres: Vec::new(),
            cylspheres: Vec::new(),
            bsp: None,
            bsp_scale: 1.0,
            step_up_height: 0.0,
            step_down_height: 0.0,
        }
    }
}

impl ShapeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One sphere resting on the origin (center at `radius`).
    pub fn sphere(radius: f32) -> Self {
        Self {
            spheres: vec![Sphere::new(Vec3::new(0.0, 0.0, radius), radius)],
            ..Self::default()
        }
    }

    /// Body plus head sphere, the usual creature shape.
    pub fn creature(radius: f32, height: f32) -> Self {
        let head = (height - radius).max(radius);
        Self {
            spheres: vec![
                Sphere::new(Vec3::new(0.0, 0.0, radius), radius),
                Sphere::new(Vec3::new(0.0, 0.0, head), radius),
            ],
            ..Self::default()
        }
    }

    pub fn cylinder(radius: f32, height: f32) -> Self {
        Self {
            cylspheres: vec![CylSphere::new(Vec3::ZERO, height, radius)],
            ..Self::default()
        }
    }

    pub fn mesh(bsp: BspTree) -> Self {
        Self {
            bsp: Some(Arc::new(bsp)),
            ..Self::default()
        }
    }

    pub fn with_step_heights(mut self, up: f32, down: f32) -> Self {
        self.step_up_height = up;
        self.step_down_height = down;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty() && self.cylspheres.is_empty() && self.bsp.is_none()
    }

    /// Uniformly scaled copy; the BSP is shared and scaled at query time.
    pub fn scaled(&self, scale: f32) -> Self {
        Self {
            spheres: self.spheres.iter().map(|s| s.scaled(scale)).collect(),
            cylspheres: self.cylspheres.iter().map(|c| c.scaled(scale)).collect(),
            bsp: self.bsp.clone(),
            bsp_scale: self.bsp_scale * scale,
            step_up_height: self.step_up_height * scale,
            step_down_height: self.step_down_height * scale,
        }
    }

    /// Drops every shape when the set breaks the mover invariant.
    pub fn validated(self, owner: impl std::fmt::Display) -> Self {
        if self.spheres.len() > MAX_MOVER_SPHERES {
            error!(
                "object {} has {} collision spheres (max {}), treating as shapeless",
                owner,
                self.spheres.len(),
                MAX_MOVER_SPHERES
            );
            return Self {
                bsp_scale: self.bsp_scale,
                step_up_height: self.step_up_height,
                step_down_height: self.step_down_height,
                ..Self::default()
            };
        }
        self
    }

    /// The BSP's bounding sphere with this set's scale applied.
    fn bsp_bounds(&self) -> Option<Sphere> {
        self.bsp
            .as_ref()
            .map(|b| b.bounding_sphere().scaled(self.bsp_scale))
    }

    /// Radius of a sphere around the local origin enclosing every shape.
    pub fn bounding_radius(&self) -> f32 {
        let spheres = self
            .spheres
            .iter()
            .map(|s| s.center.length() + s.radius)
            .fold(0.0_f32, f32::max);
        let cyls = self
            .cylspheres
            .iter()
            .map(|c| {
                let top = c.low_point + Vec3::new(0.0, 0.0, c.height);
                c.low_point.length().max(top.length()) + c.radius
            })
            .fold(0.0_f32, f32::max);
        let mesh = self
            .bsp_bounds()
            .map(|s| s.center.length() + s.radius)
            .unwrap_or(0.0);
        spheres.max(cyls).max(mesh)
    }

    /// Outer radius used for "how wide is this thing" distance checks.
    pub fn horizontal_radius(&self) -> f32 {
        let spheres = self.spheres.iter().map(|s| s.radius).fold(0.0_f32, f32::max);
        let cyls = self.cylspheres.iter().map(|c| c.radius).fold(0.0_f32, f32::max);
        let mesh = self.bsp_bounds().map(|s| s.radius).unwrap_or(0.0);
        spheres.max(cyls).max(mesh)
    }

    pub fn height(&self) -> f32 {
        let spheres = self
            .spheres
            .iter()
            .map(|s| s.center.z + s.radius)
            .fold(0.0_f32, f32::max);
        let cyls = self.cylspheres.iter().map(|c| c.top()).fold(0.0_f32, f32::max);
        spheres.max(cyls)
    }

    /// Spheres swept through the world when this set is the moving side.
    pub fn mover_spheres(&self) -> Vec<Sphere> {
        if !self.spheres.is_empty() {
            return self.spheres.iter().take(MAX_MOVER_SPHERES).copied().collect();
        }
        if let Some(cyl) = self.cylspheres.first() {
            let low = cyl.low_point + Vec3::new(0.0, 0.0, cyl.radius);
            let high_z = (cyl.height - cyl.radius).max(cyl.radius);
            let high = cyl.low_point + Vec3::new(0.0, 0.0, high_z);
            if (high - low).length() < f32::EPSILON {
                return vec![Sphere::new(low, cyl.radius)];
            }
            return vec![Sphere::new(low, cyl.radius), Sphere::new(high, cyl.radius)];
        }
        self.bsp_bounds().into_iter().collect()
    }

    /// Every contact a sphere (in global coordinates) makes with this set
    /// placed at `frame`.
    pub fn sphere_contacts(&self, frame: &Frame, center: Vec3, radius: f32, tolerance: f32) -> Vec<Contact> {
        let local = frame.global_to_local(center);
        if let Some(bsp) = &self.bsp {
            let scale = self.bsp_scale;
            return bsp
                .sphere_contacts(local / scale, radius / scale, tolerance / scale)
                .into_iter()
                .map(|(c, _)| {
                    Contact {
                        depth: c.depth * scale,
                        point: c.point * scale,
                        ..c
                    }
                    .rotated(frame)
                })
                .collect();
        }
        let spheres = self
            .spheres
            .iter()
            .filter_map(|s| s.sphere_contact(local, radius, tolerance));
        let cyls = self
            .cylspheres
            .iter()
            .filter_map(|c| c.sphere_contact(local, radius, tolerance));
        spheres.chain(cyls).map(|c| c.rotated(frame)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::quat_from_heading;

    #[test]
    fn three_spheres_degrade_to_empty() {
        let mut shape = ShapeSet::sphere(0.5);
        shape.spheres.push(Sphere::new(Vec3::Z, 0.5));
        shape.spheres.push(Sphere::new(Vec3::Z * 2.0, 0.5));
        let shape = shape.validated("test");
        assert!(shape.is_empty());
    }

    #[test]
    fn cylinder_mover_uses_two_spheres() {
        let spheres = ShapeSet::cylinder(0.5, 2.0).mover_spheres();
        assert_eq!(spheres.len(), 2);
        assert_eq!(spheres[0].center.z, 0.5);
        assert_eq!(spheres[1].center.z, 1.5);
    }

    #[test]
    fn scaled_shape_grows_uniformly() {
        let shape = ShapeSet::sphere(0.5).scaled(2.0);
        assert_eq!(shape.spheres[0].radius, 1.0);
        assert_eq!(shape.spheres[0].center.z, 1.0);
        assert_eq!(shape.bounding_radius(), 2.0);
    }

    #[test]
    fn scaled_mesh_grows_with_its_bounds() {
        let unit = ShapeSet::mesh(BspTree::solid_box(Vec3::splat(-0.5), Vec3::splat(0.5)));
        let big = unit.scaled(3.0);
        assert!((unit.bounding_radius() - 0.866).abs() < 1e-3);
        assert!((big.bounding_radius() - 2.598).abs() < 1e-3);
        assert!((big.horizontal_radius() - 2.598).abs() < 1e-3);

        // Grazes the +X face of the scaled box, far from the unit one.
        let frame = Frame::default();
        let grazing = Vec3::new(1.55, 0.0, 0.0);
        assert!(unit.sphere_contacts(&frame, grazing, 0.1, 0.0).is_empty());
        let hits = big.sphere_contacts(&frame, grazing, 0.1, 0.0);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].normal.x > 0.99);
        assert!((hits[0].point.x - 1.5).abs() < 1e-4);
        assert!((hits[0].depth - 0.05).abs() < 1e-4);

        let movers = big.mover_spheres();
        assert!((movers[0].radius - 2.598).abs() < 1e-3);
    }

    #[test]
    fn contacts_follow_frame_rotation() {
        let shape = ShapeSet::mesh(BspTree::solid_box(
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 2.0, 2.0),
        ));
        // Box sits in front (+Y) locally; rotated to face east it sits at +X.
        let frame = Frame::new(Vec3::ZERO, quat_from_heading(90.0));
        let hits = shape.sphere_contacts(&frame, Vec3::new(0.8, 0.0, 1.0), 0.5, 0.0);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].normal.x < -0.99);
    }
}
