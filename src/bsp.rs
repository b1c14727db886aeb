//! Polygon BSP tree used as a collision mesh.
//!
//! Built once from static data; queries collect the polygons a sphere may
//! touch and turn them into [`Contact`]s. Polygons are never split: one that
//! straddles a splitting plane is referenced from both sides.

use crate::geometry::{Contact, Polygon, Sphere};
use glam::Vec3;

const LEAF_SIZE: usize = 4;
const MAX_DEPTH: usize = 24;

#[derive(Debug)]
enum BspNode {
    Leaf(Vec<usize>),
    Split {
        normal: Vec3,
        d: f32,
        front: Box<BspNode>,
        back: Box<BspNode>,
    },
}

#[derive(Debug)]
pub struct BspTree {
    polygons: Vec<Polygon>,
    root: BspNode,
    bounds: Sphere,
}

impl BspTree {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        let bounds = bounding_sphere(&polygons);
        let indices: Vec<usize> = (0..polygons.len()).collect();
        let root = build(&polygons, indices, 0);
        Self {
            polygons,
            root,
            bounds,
        }
    }

    /// Closed box mesh, outward faces.
    pub fn solid_box(min: Vec3, max: Vec3) -> Self {
        Self::new(Polygon::box_faces(min, max))
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bounding_sphere(&self) -> Sphere {
        self.bounds
    }

    /// Indices of polygons whose half-space cells a sphere overlaps.
    pub fn query_sphere(&self, center: Vec3, radius: f32, out: &mut Vec<usize>) {
        let start = out.len();
        collect(&self.root, center, radius, out);
        out[start..].sort_unstable();
        let mut tail = out.split_off(start);
        tail.dedup();
        out.extend(tail);
    }

    /// All polygon contacts for a sphere within `radius + tolerance`.
    pub fn sphere_contacts(&self, center: Vec3, radius: f32, tolerance: f32) -> Vec<(Contact, &Polygon)> {
        if center.distance(self.bounds.center) > self.bounds.radius + radius + tolerance {
            return Vec::new();
        }
        let mut hits = Vec::new();
        self.query_sphere(center, radius + tolerance, &mut hits);
        hits.into_iter()
            .filter_map(|i| {
                let poly = &self.polygons[i];
                poly.sphere_contact(center, radius, tolerance).map(|c| (c, poly))
            })
            .collect()
    }
}

fn build(polygons: &[Polygon], indices: Vec<usize>, depth: usize) -> BspNode {
    if indices.len() <= LEAF_SIZE || depth >= MAX_DEPTH {
        return BspNode::Leaf(indices);
    }
    let splitter = polygons[indices[indices.len() / 2]].plane;
    let mut front = Vec::new();
    let mut back = Vec::new();
    for &i in &indices {
        let (mut any_front, mut any_back) = (false, false);
        for v in &polygons[i].vertices {
            let dist = splitter.distance(*v);
            any_front |= dist > crate::geometry::EPSILON;
            any_back |= dist < -crate::geometry::EPSILON;
        }
        match (any_front, any_back) {
            (true, false) => front.push(i),
            (false, true) => back.push(i),
            _ => {
                front.push(i);
                back.push(i);
            }
        }
    }
    if front.len() == indices.len() || back.len() == indices.len() {
        return BspNode::Leaf(indices);
    }
    BspNode::Split {
        normal: splitter.normal,
        d: splitter.d,
        front: Box::new(build(polygons, front, depth + 1)),
        back: Box::new(build(polygons, back, depth + 1)),
    }
}

fn collect(node: &BspNode, center: Vec3, radius: f32, out: &mut Vec<usize>) {
    match node {
        BspNode::Leaf(indices) => out.extend_from_slice(indices),
        BspNode::Split {
            normal,
            d,
            front,
            back,
        } => {
            let dist = normal.dot(center) + d;
            if dist > -radius {
                collect(front, center, radius, out);
            }
            if dist < radius {
                collect(back, center, radius, out);
            }
        }
    }
}

fn bounding_sphere(polygons: &[Polygon]) -> Sphere {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for v in polygons.iter().flat_map(|p| p.vertices.iter()) {
        min = min.min(*v);
        max = max.max(*v);
    }
    if min.x > max.x {
        return Sphere::new(Vec3::ZERO, 0.0);
    }
    let center = (min + max) * 0.5;
    Sphere::new(center, (max - center).length())
}
