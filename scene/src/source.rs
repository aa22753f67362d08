//! Access to the record model the scene is built from.
//!
//! The scene never owns source data. It reads typed fields, links and validity
//! through [`SourceModel`], which the data-model layer implements.
//! [`RecordTable`] is a plain in-memory implementation that hosts can fill
//! directly or deserialize from a snapshot.

use std::collections::BTreeMap;

use cgmath::{Matrix3, Matrix4, Point3, Quaternion, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Index of a record (block) in the source model.
pub type RecordId = u32;

/// A single field value as stored by the source model.
///
/// Matrices are stored column-major, matching cgmath. Quaternions are
/// stored as `[w, x, y, z]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f32),
    Bool(bool),
    Text(String),
    Vector3([f32; 3]),
    Vector4Array(Vec<[f32; 4]>),
    Quaternion([f32; 4]),
    Matrix33([[f32; 3]; 3]),
    Matrix44([[f32; 4]; 4]),
    Link(Option<RecordId>),
    Links(Vec<Option<RecordId>>),
    Keys(KeyGroupData),
}

/// Raw keyframe curve as stored in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyGroupData {
    /// Source interpolation code (1 linear, 2 quadratic, 3 TBC, 5 constant)
    pub interpolation: u32,
    pub keys: Vec<KeyData>,
}

/// One raw key of a [`KeyGroupData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyData {
    pub time: f32,
    pub value: Value,
    #[serde(default)]
    pub forward: Option<Value>,
    #[serde(default)]
    pub backward: Option<Value>,
}

impl KeyData {
    /// Creates a key without tangents.
    pub fn new(time: f32, value: Value) -> Self {
        Self {
            time,
            value,
            forward: None,
            backward: None,
        }
    }
}

/// Conversion from a raw [`Value`] into a typed field.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| u32::try_from(v).ok())
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromValue for Vector3<f32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vector3([x, y, z]) => Some(Vector3::new(*x, *y, *z)),
            _ => None,
        }
    }
}

impl FromValue for Point3<f32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vector3([x, y, z]) => Some(Point3::new(*x, *y, *z)),
            _ => None,
        }
    }
}

impl FromValue for Quaternion<f32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Quaternion([w, x, y, z]) => Some(Quaternion::new(*w, *x, *y, *z)),
            _ => None,
        }
    }
}

impl FromValue for Matrix3<f32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Matrix33([c0, c1, c2]) => Some(Matrix3::from_cols(
                Vector3::from(*c0),
                Vector3::from(*c1),
                Vector3::from(*c2),
            )),
            _ => None,
        }
    }
}

impl FromValue for Matrix4<f32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Matrix44([c0, c1, c2, c3]) => Some(Matrix4::from_cols(
                Vector4::from(*c0),
                Vector4::from(*c1),
                Vector4::from(*c2),
                Vector4::from(*c3),
            )),
            _ => None,
        }
    }
}

impl FromValue for Vec<Vector4<f32>> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vector4Array(items) => Some(items.iter().map(|v| Vector4::from(*v)).collect()),
            _ => None,
        }
    }
}

/// Read access to the record model a scene is built from.
pub trait SourceModel {
    /// Records at the top of the hierarchy.
    fn roots(&self) -> Vec<RecordId>;

    /// Returns true if the record exists and may be read.
    fn is_valid(&self, record: RecordId) -> bool;

    /// The record's type name, e.g. `"NiNode"`.
    fn kind(&self, record: RecordId) -> Option<&str>;

    /// Returns true if the record's type is `ancestor` or derives from it.
    fn inherits(&self, record: RecordId, ancestor: &str) -> bool;

    /// Raw field lookup.
    fn field(&self, record: RecordId, name: &str) -> Option<&Value>;

    /// Records that are genuine children of `record`, as opposed to records
    /// it merely references.
    fn child_links(&self, record: RecordId) -> Vec<RecordId>;

    /// Typed field lookup.
    fn get<T: FromValue>(&self, record: RecordId, name: &str) -> Option<T>
    where
        Self: Sized,
    {
        self.field(record, name).and_then(T::from_value)
    }

    /// Follows a single link field. Dangling links resolve to `None`.
    fn link(&self, record: RecordId, name: &str) -> Option<RecordId> {
        match self.field(record, name) {
            Some(Value::Link(Some(target))) if self.is_valid(*target) => Some(*target),
            _ => None,
        }
    }

    /// Follows a link array field, skipping empty and dangling entries.
    fn links(&self, record: RecordId, name: &str) -> Vec<RecordId> {
        match self.field(record, name) {
            Some(Value::Links(targets)) => targets
                .iter()
                .flatten()
                .copied()
                .filter(|target| self.is_valid(*target))
                .collect(),
            Some(Value::Link(Some(target))) if self.is_valid(*target) => vec![*target],
            _ => Vec::new(),
        }
    }
}

/// Built-in ancestry of the record types the scene knows about.
fn builtin_ancestors(kind: &str) -> &'static [&'static str] {
    match kind {
        "NiNode" | "NiBillboardNode" | "NiLODNode" | "NiSwitchNode" | "RootCollisionNode"
        | "BSFadeNode" | "AvoidNode" => &["NiNode", "NiAVObject", "NiObjectNET"],
        "NiTriShape" | "NiTriStrips" => {
            &["NiTriBasedGeom", "NiGeometry", "NiAVObject", "NiObjectNET"]
        }
        "NiCamera" => &["NiAVObject", "NiObjectNET"],
        "NiKeyframeController" | "NiTransformController" | "NiVisController"
        | "NiAlphaController" | "NiUVController" => &["NiTimeController"],
        "NiAlphaProperty" | "NiZBufferProperty" | "NiMaterialProperty"
        | "NiTexturingProperty" | "NiSpecularProperty" | "NiWireframeProperty"
        | "NiVertexColorProperty" | "NiStencilProperty" => &["NiProperty"],
        "bhkListShape" | "bhkTransformShape" | "bhkConvexTransformShape" | "bhkBoxShape"
        | "bhkCapsuleShape" | "bhkConvexVerticesShape" | "bhkSphereShape" => &["bhkShape"],
        _ => &[],
    }
}

/// A record of a [`RecordTable`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: String,
    /// Extra ancestor type names beyond the built-in ones
    #[serde(default)]
    pub ancestors: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestors: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds an ancestor type name.
    pub fn inheriting(mut self, ancestor: impl Into<String>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    /// Sets a field, builder style.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    fn inherits(&self, ancestor: &str) -> bool {
        self.kind == ancestor
            || builtin_ancestors(&self.kind).contains(&ancestor)
            || self.ancestors.iter().any(|a| a == ancestor)
    }
}

/// In-memory record model.
///
/// A record is the genuine child of the first record (lowest id) that lists
/// it in its `"Children"` field; later references are cross-links.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordTable {
    records: Vec<Option<Record>>,
    #[serde(default)]
    roots: Vec<RecordId>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its id.
    pub fn insert(&mut self, record: Record) -> RecordId {
        self.records.push(Some(record));
        (self.records.len() - 1) as RecordId
    }

    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id as usize).and_then(|r| r.as_ref())
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(id as usize).and_then(|r| r.as_mut())
    }

    /// Sets a field on an existing record. Returns false if the record is gone.
    pub fn set_field(&mut self, id: RecordId, name: impl Into<String>, value: Value) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.fields.insert(name.into(), value);
                true
            }
            None => false,
        }
    }

    /// Invalidates a record. Its id is never reused.
    pub fn remove(&mut self, id: RecordId) -> Option<Record> {
        self.records.get_mut(id as usize).and_then(|r| r.take())
    }

    pub fn set_roots(&mut self, roots: Vec<RecordId>) {
        self.roots = roots;
    }

    pub fn add_root(&mut self, root: RecordId) {
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    /// Number of record slots, including invalidated ones.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn owning_parent(&self, child: RecordId) -> Option<RecordId> {
        (0..self.records.len() as RecordId)
            .find(|&candidate| self.links(candidate, "Children").contains(&child))
    }
}

impl SourceModel for RecordTable {
    fn roots(&self) -> Vec<RecordId> {
        self.roots
            .iter()
            .copied()
            .filter(|root| self.is_valid(*root))
            .collect()
    }

    fn is_valid(&self, record: RecordId) -> bool {
        self.record(record).is_some()
    }

    fn kind(&self, record: RecordId) -> Option<&str> {
        self.record(record).map(|r| r.kind.as_str())
    }

    fn inherits(&self, record: RecordId, ancestor: &str) -> bool {
        self.record(record).is_some_and(|r| r.inherits(ancestor))
    }

    fn field(&self, record: RecordId, name: &str) -> Option<&Value> {
        self.record(record).and_then(|r| r.fields.get(name))
    }

    fn child_links(&self, record: RecordId) -> Vec<RecordId> {
        self.links(record, "Children")
            .into_iter()
            .filter(|&child| self.owning_parent(child) == Some(record))
            .collect()
    }
}
