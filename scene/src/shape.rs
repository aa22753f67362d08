//! Collision shape decoding and wireframe outlines.
//!
//! Shapes are only visualized, never simulated. An outline is a set of line
//! segments plus isolated points in the shape's local frame.

use std::f32::consts::PI;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform as _, Vector3, Vector4};
use skope_common::BoundSphere;

use crate::source::{RecordId, SourceModel};

/// Nesting limit for list and transform shapes.
const MAX_SHAPE_DEPTH: usize = 32;

/// Below this axis length a capsule is drawn as a sphere.
const MIN_CAPSULE_LENGTH: f32 = 0.001;

/// A decoded collision shape tree.
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    List(Vec<CollisionShape>),
    Transform {
        transform: Matrix4<f32>,
        shape: Box<CollisionShape>,
    },
    /// Axis-aligned box centered on the origin
    Box {
        half_extents: Vector3<f32>,
    },
    Sphere {
        radius: f32,
    },
    Capsule {
        first: Point3<f32>,
        second: Point3<f32>,
        radius: f32,
    },
    ConvexVertices {
        points: Vec<Point3<f32>>,
    },
}

impl CollisionShape {
    /// Decodes the shape tree rooted at `record`.
    ///
    /// Unknown shape types, dangling links and nesting deeper than
    /// [`MAX_SHAPE_DEPTH`] are dropped.
    pub fn decode<S: SourceModel>(source: &S, record: RecordId) -> Option<Self> {
        Self::decode_at(source, record, 0)
    }

    fn decode_at<S: SourceModel>(source: &S, record: RecordId, depth: usize) -> Option<Self> {
        if depth > MAX_SHAPE_DEPTH || !source.is_valid(record) {
            return None;
        }

        let shape = match source.kind(record)? {
            "bhkListShape" => CollisionShape::List(
                source
                    .links(record, "Sub Shapes")
                    .into_iter()
                    .filter_map(|sub| Self::decode_at(source, sub, depth + 1))
                    .collect(),
            ),
            "bhkTransformShape" | "bhkConvexTransformShape" => {
                let sub = source.link(record, "Sub Shape")?;
                CollisionShape::Transform {
                    transform: source
                        .get::<Matrix4<f32>>(record, "Transform")
                        .unwrap_or_else(|| Matrix4::from_scale(1.0)),
                    shape: Box::new(Self::decode_at(source, sub, depth + 1)?),
                }
            }
            "bhkBoxShape" => CollisionShape::Box {
                half_extents: source
                    .get(record, "Dimensions")
                    .unwrap_or(Vector3::new(0.0, 0.0, 0.0)),
            },
            "bhkSphereShape" => CollisionShape::Sphere {
                radius: source.get(record, "Radius").unwrap_or(0.0),
            },
            "bhkCapsuleShape" => CollisionShape::Capsule {
                first: source.get(record, "First Point").unwrap_or(Point3::origin()),
                second: source.get(record, "Second Point").unwrap_or(Point3::origin()),
                radius: source.get(record, "Radius").unwrap_or(0.0),
            },
            "bhkConvexVerticesShape" => CollisionShape::ConvexVertices {
                points: source
                    .get::<Vec<Vector4<f32>>>(record, "Vertices")
                    .unwrap_or_default()
                    .into_iter()
                    .map(|v| Point3::new(v.x, v.y, v.z))
                    .collect(),
            },
            _ => return None,
        };
        Some(shape)
    }

    /// Wireframe outline in the shape's local frame.
    pub fn outline(&self) -> ShapeOutline {
        let mut outline = ShapeOutline::default();
        self.append_outline(&Matrix4::from_scale(1.0), &mut outline);
        outline
    }

    fn append_outline(&self, transform: &Matrix4<f32>, out: &mut ShapeOutline) {
        match self {
            CollisionShape::List(shapes) => {
                for shape in shapes {
                    shape.append_outline(transform, out);
                }
            }
            CollisionShape::Transform {
                transform: local,
                shape,
            } => shape.append_outline(&(transform * local), out),
            CollisionShape::Box { half_extents } => {
                let mut local = ShapeOutline::default();
                box_outline(*half_extents, &mut local);
                out.extend(local.transformed(transform));
            }
            CollisionShape::Sphere { radius } => {
                let mut local = ShapeOutline::default();
                sphere_outline(Point3::origin(), *radius, 8, 8, &mut local);
                out.extend(local.transformed(transform));
            }
            CollisionShape::Capsule {
                first,
                second,
                radius,
            } => {
                let mut local = ShapeOutline::default();
                local.lines.push([*first, *second]);
                capsule_outline(*first, *second, *radius, 5, 5, &mut local);
                out.extend(local.transformed(transform));
            }
            CollisionShape::ConvexVertices { points } => {
                out.points
                    .extend(points.iter().map(|p| transform.transform_point(*p)));
            }
        }
    }
}

/// Line segments and points describing a wireframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeOutline {
    pub points: Vec<Point3<f32>>,
    pub lines: Vec<[Point3<f32>; 2]>,
}

impl ShapeOutline {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.lines.is_empty()
    }

    /// Maps every point through a matrix.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| matrix.transform_point(*p))
                .collect(),
            lines: self
                .lines
                .iter()
                .map(|[a, b]| [matrix.transform_point(*a), matrix.transform_point(*b)])
                .collect(),
        }
    }

    pub fn extend(&mut self, other: ShapeOutline) {
        self.points.extend(other.points);
        self.lines.extend(other.lines);
    }

    /// Sphere fitted to every point and segment end.
    pub fn bounds(&self) -> BoundSphere {
        let mut all = self.points.clone();
        for [a, b] in &self.lines {
            all.push(*a);
            all.push(*b);
        }
        BoundSphere::from_points(&all)
    }

    fn push_strip(&mut self, strip: &[Point3<f32>]) {
        for pair in strip.windows(2) {
            self.lines.push([pair[0], pair[1]]);
        }
    }
}

fn box_outline(max: Vector3<f32>, out: &mut ShapeOutline) {
    let min = -max;
    let corner = |x: bool, y: bool, z: bool| {
        Point3::new(
            if x { max.x } else { min.x },
            if y { max.y } else { min.y },
            if z { max.z } else { min.z },
        )
    };

    for x in [false, true] {
        out.push_strip(&[
            corner(x, false, false),
            corner(x, true, false),
            corner(x, true, true),
            corner(x, false, true),
            corner(x, false, false),
        ]);
    }
    for (y, z) in [(false, false), (true, false), (true, true), (false, true)] {
        out.lines.push([corner(false, y, z), corner(true, y, z)]);
    }
}

/// Points of a circle spanned by `x` and `y` around `center`, closed.
fn ring(center: Point3<f32>, x: Vector3<f32>, y: Vector3<f32>, segments: u32) -> Vec<Point3<f32>> {
    (0..=segments * 2)
        .map(|i| {
            let angle = PI / segments as f32 * i as f32;
            center + x * angle.sin() + y * angle.cos()
        })
        .collect()
}

fn sphere_outline(
    center: Point3<f32>,
    radius: f32,
    rings: i32,
    segments: u32,
    out: &mut ShapeOutline,
) {
    out.points.push(center);

    let axes = [
        (Vector3::unit_z(), Vector3::unit_x(), Vector3::unit_y()),
        (Vector3::unit_y(), Vector3::unit_x(), Vector3::unit_z()),
        (Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()),
    ];
    for (axis, u, v) in axes {
        for j in -rings..=rings {
            let f = PI * j as f32 / rings as f32;
            let ring_center = center + axis * (radius * f.cos());
            let ring_radius = radius * f.sin();
            out.push_strip(&ring(ring_center, u * ring_radius, v * ring_radius, segments));
        }
    }
}

fn capsule_outline(
    a: Point3<f32>,
    b: Point3<f32>,
    radius: f32,
    rings: u32,
    segments: u32,
    out: &mut ShapeOutline,
) {
    let d = b - a;
    if d.magnitude() < MIN_CAPSULE_LENGTH {
        sphere_outline(a, radius, 8, 8, out);
        return;
    }

    let n = d.normalize();
    let x = Vector3::new(n.y, n.z, n.x);
    let y = n.cross(x);
    let x = n.cross(y);
    let (x, y) = (x * radius, y * radius);

    out.push_strip(&ring(a, x, y, segments));
    out.push_strip(&ring(a + d / 2.0, x, y, segments));
    out.push_strip(&ring(b, x, y, segments));

    for (p, q) in ring(a, x, y, segments).into_iter().zip(ring(b, x, y, segments)) {
        out.lines.push([p, q]);
    }

    for j in 0..=rings {
        let f = PI * j as f32 / (rings * 2) as f32;
        let dj = n * radius * f.cos();
        let rj = f.sin();
        out.push_strip(&ring(a - dj, x * rj, y * rj, segments));
        out.push_strip(&ring(b + dj, x * rj, y * rj, segments));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Record, RecordTable, Value};
    use skope_common::EPSILON;

    const TEST_EPSILON: f32 = 1e-4;

    fn max_distance(outline: &ShapeOutline, center: Point3<f32>) -> f32 {
        outline
            .lines
            .iter()
            .flat_map(|[a, b]| [*a, *b])
            .chain(outline.points.iter().copied())
            .map(|p| (p - center).magnitude())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_decode_box() {
        let mut table = RecordTable::new();
        let r = table.insert(
            Record::new("bhkBoxShape").with("Dimensions", Value::Vector3([1.0, 2.0, 3.0])),
        );
        let shape = CollisionShape::decode(&table, r).unwrap();

        assert_eq!(
            shape,
            CollisionShape::Box {
                half_extents: Vector3::new(1.0, 2.0, 3.0)
            }
        );
    }

    #[test]
    fn test_box_outline_has_twelve_edges() {
        let shape = CollisionShape::Box {
            half_extents: Vector3::new(1.0, 1.0, 1.0),
        };
        let outline = shape.outline();

        assert_eq!(outline.lines.len(), 12);
        for [a, b] in &outline.lines {
            assert!(((*a - *b).magnitude() - 2.0).abs() < EPSILON);
        }
        let bounds = outline.bounds();
        assert!(bounds.center.to_vec().magnitude() < EPSILON);
        assert!((bounds.radius - 3.0_f32.sqrt()).abs() < TEST_EPSILON);
    }

    #[test]
    fn test_decode_list_and_transform() {
        let mut table = RecordTable::new();
        let leaf = table.insert(Record::new("bhkSphereShape").with("Radius", Value::Float(0.5)));
        let moved = table.insert(
            Record::new("bhkTransformShape")
                .with("Sub Shape", Value::Link(Some(leaf)))
                .with(
                    "Transform",
                    Value::Matrix44([
                        [1.0, 0.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0, 0.0],
                        [0.0, 0.0, 1.0, 0.0],
                        [10.0, 0.0, 0.0, 1.0],
                    ]),
                ),
        );
        let unknown = table.insert(Record::new("bhkMoppBvTreeShape"));
        let list = table.insert(Record::new("bhkListShape").with(
            "Sub Shapes",
            Value::Links(vec![Some(leaf), Some(moved), Some(unknown), None]),
        ));

        let shape = CollisionShape::decode(&table, list).unwrap();
        let CollisionShape::List(items) = &shape else {
            panic!("expected a list shape, got {:?}", shape);
        };
        assert_eq!(items.len(), 2);

        let bounds = shape.outline().bounds();
        // Spheres at x = 0 and x = 10 with radius 0.5
        assert!(bounds.center.x > 0.0 && bounds.center.x < 10.0);
        assert!(bounds.radius >= 5.0);
    }

    #[test]
    fn test_transform_without_sub_shape_is_dropped() {
        let mut table = RecordTable::new();
        let r = table.insert(Record::new("bhkConvexTransformShape"));
        assert!(CollisionShape::decode(&table, r).is_none());
    }

    #[test]
    fn test_cyclic_links_terminate() {
        let mut table = RecordTable::new();
        let a = table.insert(Record::new("bhkListShape"));
        let b = table.insert(
            Record::new("bhkListShape").with("Sub Shapes", Value::Links(vec![Some(a)])),
        );
        table.set_field(a, "Sub Shapes", Value::Links(vec![Some(b)]));

        let shape = CollisionShape::decode(&table, a);
        assert!(shape.is_some());
        assert!(shape.unwrap().outline().is_empty());
    }

    #[test]
    fn test_capsule_outline_within_radius() {
        let a = Point3::new(0.0, 0.0, -1.0);
        let b = Point3::new(0.0, 0.0, 1.0);
        let shape = CollisionShape::Capsule {
            first: a,
            second: b,
            radius: 0.5,
        };
        let outline = shape.outline();

        assert!(!outline.lines.is_empty());
        // Capsule extends radius past both end points along its axis
        let max = max_distance(&outline, Point3::origin());
        assert!((max - 1.5).abs() < TEST_EPSILON);
    }

    #[test]
    fn test_degenerate_capsule_is_sphere() {
        let p = Point3::new(1.0, 1.0, 1.0);
        let shape = CollisionShape::Capsule {
            first: p,
            second: p,
            radius: 2.0,
        };
        let outline = shape.outline();

        assert!(outline.points.contains(&p));
        assert!((max_distance(&outline, p) - 2.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn test_convex_vertices_are_points() {
        let mut table = RecordTable::new();
        let r = table.insert(Record::new("bhkConvexVerticesShape").with(
            "Vertices",
            Value::Vector4Array(vec![[1.0, 0.0, 0.0, 0.0], [0.0, 2.0, 0.0, 0.0]]),
        ));
        let outline = CollisionShape::decode(&table, r).unwrap().outline();

        assert_eq!(
            outline.points,
            vec![Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 2.0, 0.0)]
        );
        assert!(outline.lines.is_empty());
    }
}
