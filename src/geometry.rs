//! Geometry primitives: frames, planes, polygons, spheres, cylinder-spheres.
//!
//! Everything here is pure math. Intersection tests report a [`Contact`]
//! (normal pointing away from the obstacle, penetration depth, closest point)
//! rather than a boolean so the transition engine can push out and slide.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Generic float tolerance for plane and edge tests.
pub const EPSILON: f32 = 0.000_2;

// ---------------------------------------------------------------------------
// Heading helpers
// ---------------------------------------------------------------------------

/// Wrap a heading into `[0, 360)`.
pub fn normalize_heading(heading: f32) -> f32 {
    let h = heading.rem_euclid(360.0);
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

/// Signed shortest turn from `current` to `target`, in `(-180, 180]`.
///
/// Positive means turning right (clockwise seen from above).
pub fn heading_diff(target: f32, current: f32) -> f32 {
    let d = normalize_heading(target - current);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Heading (0 = +Y, 90 = +X) of the horizontal vector from `from` to `to`.
pub fn heading_toward(from: Vec3, to: Vec3) -> f32 {
    let d = to - from;
    if d.x.abs() < EPSILON && d.y.abs() < EPSILON {
        return 0.0;
    }
    normalize_heading(d.x.atan2(d.y).to_degrees())
}

/// Orientation whose local +Y axis points along `heading`.
pub fn quat_from_heading(heading: f32) -> Quat {
    Quat::from_rotation_z(-heading.to_radians())
}

/// Heading of the local +Y axis of `orientation`.
pub fn heading_from_quat(orientation: Quat) -> f32 {
    let forward = orientation * Vec3::Y;
    heading_toward(Vec3::ZERO, forward)
}

/// Unit horizontal vector along `heading`.
pub fn heading_vector(heading: f32) -> Vec3 {
    let r = heading.to_radians();
    Vec3::new(r.sin(), r.cos(), 0.0)
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Origin plus orientation. Positions carry one relative to their landblock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Vec3,
    pub orientation: Quat,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Frame {
    pub fn new(origin: Vec3, orientation: Quat) -> Self {
        Self {
            origin,
            orientation,
        }
    }

    pub fn from_origin(origin: Vec3) -> Self {
        Self::new(origin, Quat::IDENTITY)
    }

    pub fn local_to_global(&self, point: Vec3) -> Vec3 {
        self.origin + self.orientation * point
    }

    pub fn global_to_local(&self, point: Vec3) -> Vec3 {
        self.orientation.inverse() * (point - self.origin)
    }

    pub fn local_to_global_vec(&self, v: Vec3) -> Vec3 {
        self.orientation * v
    }

    pub fn global_to_local_vec(&self, v: Vec3) -> Vec3 {
        self.orientation.inverse() * v
    }

    pub fn heading(&self) -> f32 {
        heading_from_quat(self.orientation)
    }

    pub fn set_heading(&mut self, heading: f32) {
        self.orientation = quat_from_heading(heading);
    }

    /// Rotate about +Z by `radians` (counter-clockwise seen from above).
    pub fn rotate_z(&mut self, radians: f32) {
        self.orientation = (Quat::from_rotation_z(radians) * self.orientation).normalize();
    }
}

// ---------------------------------------------------------------------------
// Plane
// ---------------------------------------------------------------------------

/// `normal . p + d = 0`, normal unit length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            d: -normal.dot(point),
        }
    }

    /// Plane through three points, normal by the right-hand rule.
    /// `None` for collinear input.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        let n = (b - a).cross(c - a);
        if n.length_squared() < EPSILON * EPSILON {
            return None;
        }
        Some(Self::from_point_normal(a, n))
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    pub fn project(&self, point: Vec3) -> Vec3 {
        point - self.normal * self.distance(point)
    }

    pub fn is_walkable(&self, floor_z: f32) -> bool {
        self.normal.z >= floor_z
    }

    /// Height of the plane at `(x, y)`, if it is not vertical.
    pub fn z_at(&self, x: f32, y: f32) -> Option<f32> {
        if self.normal.z.abs() < EPSILON {
            return None;
        }
        Some(-(self.normal.x * x + self.normal.y * y + self.d) / self.normal.z)
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// Result of a shape-vs-shape test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Unit vector pointing from the obstacle toward the tested sphere.
    pub normal: Vec3,
    /// How far the sphere overlaps; negative values are near misses within
    /// the caller's tolerance.
    pub depth: f32,
    /// Closest point on the obstacle.
    pub point: Vec3,
}

impl Contact {
    pub fn is_penetrating(&self) -> bool {
        self.depth > 0.0
    }

    pub fn rotated(self, frame: &Frame) -> Self {
        Self {
            normal: frame.local_to_global_vec(self.normal),
            depth: self.depth,
            point: frame.local_to_global(self.point),
        }
    }
}

// ---------------------------------------------------------------------------
// Polygon
// ---------------------------------------------------------------------------

/// Convex, single-sided polygon. Front side is where the normal points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Vec3>,
    pub plane: Plane,
}

impl Polygon {
    /// Build from counter-clockwise vertices (seen from the front side).
    pub fn new(vertices: Vec<Vec3>) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let a = vertices[0];
        let plane = vertices
            .windows(2)
            .skip(1)
            .find_map(|w| Plane::from_points(a, w[0], w[1]))?;
        Some(Self { vertices, plane })
    }

    /// Build with the winding fixed so the normal agrees with `outward`.
    pub fn facing(mut vertices: Vec<Vec3>, outward: Vec3) -> Option<Self> {
        let poly = Self::new(vertices.clone())?;
        if poly.plane.normal.dot(outward) >= 0.0 {
            return Some(poly);
        }
        vertices.reverse();
        Self::new(vertices)
    }

    /// The six outward-facing faces of an axis-aligned box.
    pub fn box_faces(min: Vec3, max: Vec3) -> Vec<Polygon> {
        let (x0, y0, z0) = (min.x, min.y, min.z);
        let (x1, y1, z1) = (max.x, max.y, max.z);
        let faces = [
            (
                vec![
                    Vec3::new(x0, y0, z0),
                    Vec3::new(x0, y1, z0),
                    Vec3::new(x0, y1, z1),
                    Vec3::new(x0, y0, z1),
                ],
                Vec3::NEG_X,
            ),
            (
                vec![
                    Vec3::new(x1, y0, z0),
                    Vec3::new(x1, y1, z0),
                    Vec3::new(x1, y1, z1),
                    Vec3::new(x1, y0, z1),
                ],
                Vec3::X,
            ),
            (
                vec![
                    Vec3::new(x0, y0, z0),
                    Vec3::new(x1, y0, z0),
                    Vec3::new(x1, y0, z1),
                    Vec3::new(x0, y0, z1),
                ],
                Vec3::NEG_Y,
            ),
            (
                vec![
                    Vec3::new(x0, y1, z0),
                    Vec3::new(x1, y1, z0),
                    Vec3::new(x1, y1, z1),
                    Vec3::new(x0, y1, z1),
                ],
                Vec3::Y,
            ),
            (
                vec![
                    Vec3::new(x0, y0, z0),
                    Vec3::new(x1, y0, z0),
                    Vec3::new(x1, y1, z0),
                    Vec3::new(x0, y1, z0),
                ],
                Vec3::NEG_Z,
            ),
            (
                vec![
                    Vec3::new(x0, y0, z1),
                    Vec3::new(x1, y0, z1),
                    Vec3::new(x1, y1, z1),
                    Vec3::new(x0, y1, z1),
                ],
                Vec3::Z,
            ),
        ];
        faces
            .into_iter()
            .filter_map(|(verts, out)| Polygon::facing(verts, out))
            .collect()
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| *v + offset).collect(),
            plane: Plane {
                normal: self.plane.normal,
                d: self.plane.d - self.plane.normal.dot(offset),
            },
        }
    }

    /// Whether `point`, projected onto the plane, lies inside the edges.
    pub fn contains_projected(&self, point: Vec3) -> bool {
        let n = self.plane.normal;
        let count = self.vertices.len();
        (0..count).all(|i| {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % count];
            (b - a).cross(point - a).dot(n) >= -EPSILON
        })
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let projected = self.plane.project(point);
        if self.contains_projected(projected) {
            return projected;
        }
        let count = self.vertices.len();
        let mut best = self.vertices[0];
        let mut best_dist = f32::MAX;
        for i in 0..count {
            let candidate = closest_on_segment(self.vertices[i], self.vertices[(i + 1) % count], point);
            let dist = candidate.distance_squared(point);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }

    /// Sphere test against the front side. Returns a contact when the sphere
    /// is within `radius + tolerance` of the polygon.
    pub fn sphere_contact(&self, center: Vec3, radius: f32, tolerance: f32) -> Option<Contact> {
        let dist = self.plane.distance(center);
        if dist < -EPSILON || dist > radius + tolerance {
            return None;
        }
        let closest = self.closest_point(center);
        let delta = center - closest;
        let len = delta.length();
        if len > radius + tolerance {
            return None;
        }
        let normal = if len > EPSILON {
            delta / len
        } else {
            self.plane.normal
        };
        Some(Contact {
            normal,
            depth: radius - len,
            point: closest,
        })
    }

    pub fn is_walkable(&self, floor_z: f32) -> bool {
        self.plane.is_walkable(floor_z)
    }
}

fn closest_on_segment(a: Vec3, b: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 < EPSILON * EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

// ---------------------------------------------------------------------------
// Sphere
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn scaled(&self, scale: f32) -> Self {
        Self::new(self.center * scale, self.radius * scale)
    }

    pub fn intersects(&self, other: &Sphere) -> bool {
        let reach = self.radius + other.radius;
        self.center.distance_squared(other.center) < reach * reach
    }

    /// Contact of a moving sphere at `center` against this sphere.
    pub fn sphere_contact(&self, center: Vec3, radius: f32, tolerance: f32) -> Option<Contact> {
        let delta = center - self.center;
        let len = delta.length();
        let reach = self.radius + radius;
        if len > reach + tolerance {
            return None;
        }
        // Coincident centres separate sideways.
        let normal = if len > EPSILON { delta / len } else { Vec3::X };
        Some(Contact {
            normal,
            depth: reach - len,
            point: self.center + normal * self.radius,
        })
    }
}

// ---------------------------------------------------------------------------
// Cylinder-sphere
// ---------------------------------------------------------------------------

/// Vertical cylinder standing on `low_point`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CylSphere {
    pub low_point: Vec3,
    pub height: f32,
    pub radius: f32,
}

impl CylSphere {
    pub fn new(low_point: Vec3, height: f32, radius: f32) -> Self {
        Self {
            low_point,
            height,
            radius,
        }
    }

    pub fn scaled(&self, scale: f32) -> Self {
        Self::new(self.low_point * scale, self.height * scale, self.radius * scale)
    }

    pub fn top(&self) -> f32 {
        self.low_point.z + self.height
    }

    /// Contact of a sphere at `center` against the solid cylinder.
    pub fn sphere_contact(&self, center: Vec3, radius: f32, tolerance: f32) -> Option<Contact> {
        let low = self.low_point;
        let top = self.top();
        let horizontal = Vec3::new(center.x - low.x, center.y - low.y, 0.0);
        let h_len = horizontal.length();
        let inside_radius = h_len <= self.radius;
        let inside_height = center.z >= low.z && center.z <= top;

        if inside_radius && inside_height {
            // Center is inside the solid: leave through the nearest face.
            let side = self.radius - h_len;
            let up = top - center.z;
            let down = center.z - low.z;
            let (normal, gap, point) = if side <= up && side <= down {
                let dir = if h_len > EPSILON {
                    horizontal / h_len
                } else {
                    Vec3::X
                };
                (dir, side, Vec3::new(low.x, low.y, center.z) + dir * self.radius)
            } else if up <= down {
                (Vec3::Z, up, Vec3::new(center.x, center.y, top))
            } else {
                (Vec3::NEG_Z, down, Vec3::new(center.x, center.y, low.z))
            };
            return Some(Contact {
                normal,
                depth: radius + gap,
                point,
            });
        }

        let clamped_h = if inside_radius {
            horizontal
        } else {
            horizontal / h_len * self.radius
        };
        let closest = Vec3::new(
            low.x + clamped_h.x,
            low.y + clamped_h.y,
            center.z.clamp(low.z, top),
        );
        let delta = center - closest;
        let len = delta.length();
        if len > radius + tolerance {
            return None;
        }
        let normal = if len > EPSILON { delta / len } else { Vec3::Z };
        Some(Contact {
            normal,
            depth: radius - len,
            point: closest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_diff_takes_shortest_turn() {
        assert_eq!(heading_diff(10.0, 350.0), 20.0);
        assert_eq!(heading_diff(350.0, 10.0), -20.0);
        assert_eq!(heading_diff(90.0, 90.0), 0.0);
    }

    #[test]
    fn heading_round_trips_through_quat() {
        for h in [0.0_f32, 45.0, 90.0, 180.0, 270.0, 359.0] {
            let back = heading_from_quat(quat_from_heading(h));
            assert!(heading_diff(back, h).abs() < 0.01, "{h} -> {back}");
        }
    }

    #[test]
    fn heading_zero_faces_north() {
        let forward = quat_from_heading(90.0) * Vec3::Y;
        assert!((forward - Vec3::X).length() < 1e-5);
        assert_eq!(heading_toward(Vec3::ZERO, Vec3::Y), 0.0);
    }

    #[test]
    fn floor_polygon_contact_pushes_up() {
        let floor = Polygon::facing(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(10.0, 10.0, 0.0),
                Vec3::new(0.0, 10.0, 0.0),
            ],
            Vec3::Z,
        )
        .unwrap();
        let contact = floor.sphere_contact(Vec3::new(5.0, 5.0, 0.4), 0.5, 0.0).unwrap();
        assert!((contact.normal - Vec3::Z).length() < 1e-5);
        assert!((contact.depth - 0.1).abs() < 1e-5);
        assert!(floor.is_walkable(DEFAULT_TEST_FLOOR_Z));
    }

    #[test]
    fn polygon_ignores_spheres_behind_it() {
        let wall = Polygon::facing(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 10.0, 0.0),
                Vec3::new(0.0, 10.0, 10.0),
                Vec3::new(0.0, 0.0, 10.0),
            ],
            Vec3::NEG_X,
        )
        .unwrap();
        assert!(wall.sphere_contact(Vec3::new(0.3, 5.0, 5.0), 0.5, 0.0).is_none());
        let hit = wall.sphere_contact(Vec3::new(-0.3, 5.0, 5.0), 0.5, 0.0).unwrap();
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn box_faces_point_outward() {
        let faces = Polygon::box_faces(Vec3::ZERO, Vec3::ONE);
        assert_eq!(faces.len(), 6);
        let center = Vec3::splat(0.5);
        for face in faces {
            assert!(face.plane.distance(center) < 0.0);
        }
    }

    #[test]
    fn coincident_spheres_separate_horizontally() {
        let sphere = Sphere::new(Vec3::new(1.0, 2.0, 0.5), 0.5);
        let hit = sphere.sphere_contact(sphere.center, 0.2, 0.0).unwrap();
        assert_eq!(hit.normal.z, 0.0);
        assert!((hit.normal.length() - 1.0).abs() < 1e-6);
        assert!((hit.depth - 0.7).abs() < 1e-6);

        let above = sphere.sphere_contact(Vec3::new(1.0, 2.0, 1.0), 0.2, 0.0).unwrap();
        assert!((above.normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn cylinder_side_and_top_contacts() {
        let cyl = CylSphere::new(Vec3::ZERO, 2.0, 0.5);
        let side = cyl.sphere_contact(Vec3::new(0.8, 0.0, 1.0), 0.5, 0.0).unwrap();
        assert!((side.normal - Vec3::X).length() < 1e-5);
        assert!((side.depth - 0.2).abs() < 1e-5);

        let top = cyl.sphere_contact(Vec3::new(0.0, 0.0, 2.3), 0.5, 0.0).unwrap();
        assert!((top.normal - Vec3::Z).length() < 1e-5);

        assert!(cyl.sphere_contact(Vec3::new(3.0, 0.0, 1.0), 0.5, 0.0).is_none());
    }

    const DEFAULT_TEST_FLOOR_Z: f32 = 0.66;
}
