use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use cgmath::{EuclideanSpace, Matrix3, Matrix4, Point3, Quaternion, Vector3};
use skope_common::{BoundSphere, Transform};

use crate::controller::{Controller, ControllerType};
use crate::node::{Node, NodeFlags, NodeId};
use crate::node_arena::{NodeArena, NodeKey};
use crate::node_list::NodeList;
use crate::options::SceneOptions;
use crate::property::{Property, PropertyKind, PropertyList};
use crate::shape::{CollisionShape, ShapeOutline};
use crate::source::{RecordId, SourceModel};
use crate::tree::{walk_tree, CollectVisitor, TreeVisitor};

/// Scale from collision space to node space.
pub const HAVOK_SCALE: f32 = 7.0;

/// Record type every scene node derives from.
const NODE_BASE_KIND: &str = "NiAVObject";

/// Memoized world and view transforms for one evaluation pass.
///
/// Entries are never invalidated one by one: the scene swaps in a fresh
/// cache whenever anything they depend on may have changed.
#[derive(Debug, Default)]
pub struct TransformCache {
    world: RefCell<HashMap<NodeKey, Transform>>,
    view: RefCell<HashMap<NodeKey, Transform>>,
}

impl TransformCache {
    pub fn world(&self, key: NodeKey) -> Option<Transform> {
        self.world.borrow().get(&key).copied()
    }

    pub fn view(&self, key: NodeKey) -> Option<Transform> {
        self.view.borrow().get(&key).copied()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.world.borrow().is_empty() && self.view.borrow().is_empty()
    }

    fn set_world(&self, key: NodeKey, transform: Transform) {
        self.world.borrow_mut().insert(key, transform);
    }

    fn set_view(&self, key: NodeKey, transform: Transform) {
        self.view.borrow_mut().insert(key, transform);
    }
}

/// A node position produced by the render walk, for drawing node markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMarker {
    pub node: NodeKey,
    pub id: NodeId,
    /// View-space position of the node
    pub position: Point3<f32>,
    /// View-space position of the parent, or of the node itself at a root
    pub parent_position: Point3<f32>,
    pub highlighted: bool,
}

/// View-space wireframe of a node's collision object.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionOutline {
    pub node: NodeKey,
    /// Collision layer color slot (0-7)
    pub color_index: u32,
    pub outline: ShapeOutline,
}

/// Visitor for the render walk: collects every node that is not hidden and
/// skips hidden subtrees.
struct VisibleVisitor<'a> {
    scene: &'a Scene,
    keys: Vec<NodeKey>,
}

impl TreeVisitor for VisibleVisitor<'_> {
    fn enter_node(&mut self, key: NodeKey, _node: &Node) -> bool {
        if self.scene.is_hidden(key) {
            return false;
        }
        self.keys.push(key);
        true
    }
}

/// The scene hierarchy built from a source model, plus the evaluation
/// context shared by every node: camera transform, display options, current
/// time and the per-pass transform cache.
///
/// # Example
///
/// ```
/// use skope_scene::source::{Record, RecordTable, Value};
/// use skope_scene::Scene;
///
/// let mut table = RecordTable::new();
/// let child = table.insert(Record::new("NiNode").with("Translation", Value::Vector3([0.0, 1.0, 0.0])));
/// let root = table.insert(
///     Record::new("NiNode")
///         .with("Translation", Value::Vector3([5.0, 0.0, 0.0]))
///         .with("Children", Value::Links(vec![Some(child)])),
/// );
/// table.set_roots(vec![root]);
///
/// let mut scene = Scene::new();
/// scene.make(&table);
///
/// let key = scene.find_node(child).unwrap();
/// let world = scene.world_trans(key);
/// assert_eq!(world.translation.x, 5.0);
/// assert_eq!(world.translation.y, 1.0);
/// ```
#[derive(Debug, Default)]
pub struct Scene {
    nodes: NodeArena,
    // Every node built from the source, holding one share each
    all: NodeList,
    roots: NodeList,
    properties: HashMap<RecordId, Rc<Property>>,

    cache: TransformCache,
    view: Transform,
    time: f32,

    pub options: SceneOptions,
}

impl Scene {
    /// Creates an empty scene with default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SceneOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    // ========== Accessors ==========

    pub fn nodes(&self) -> &NodeArena {
        &self.nodes
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Mutable access to a node. Transform changes become visible to
    /// [`Scene::world_trans`] at the next pass.
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn roots(&self) -> &NodeList {
        &self.roots
    }

    /// Every node built from the source.
    pub fn all_nodes(&self) -> &NodeList {
        &self.all
    }

    /// Finds the node backed by `record`.
    pub fn find_node(&self, record: RecordId) -> Option<NodeKey> {
        self.all.get(&self.nodes, record)
    }

    pub fn cache(&self) -> &TransformCache {
        &self.cache
    }

    /// Camera transform applied on top of world transforms.
    pub fn view(&self) -> Transform {
        self.view
    }

    pub fn set_view(&mut self, view: Transform) {
        self.view = view;
        self.reset_cache();
    }

    /// Scene time of the last [`Scene::transform`] pass.
    pub fn time(&self) -> f32 {
        self.time
    }

    fn reset_cache(&mut self) {
        self.cache = TransformCache::default();
    }

    fn live_parent(&self, node: &Node) -> Option<NodeKey> {
        node.parent().filter(|p| self.nodes.contains(*p))
    }

    // ========== Building ==========

    /// Releases every node and property.
    pub fn clear(&mut self) {
        self.roots.clear(&mut self.nodes);
        self.all.clear(&mut self.nodes);
        self.properties.clear();
        self.reset_cache();
    }

    /// Rebuilds the whole scene from `source`.
    pub fn make<S: SourceModel>(&mut self, source: &S) {
        self.clear();
        self.update(source, None);
        log::info!(
            "Built scene with {} nodes and {} roots",
            self.all.len(),
            self.roots.len()
        );
    }

    /// Revalidates the scene against `source`.
    ///
    /// With `Some(record)` only state backed by that record is re-read:
    /// the node it backs, properties and controllers bound to it. With
    /// `None` every node is revalidated, nodes whose record vanished are
    /// dropped and the root set is rebuilt.
    pub fn update<S: SourceModel>(&mut self, source: &S, changed: Option<RecordId>) {
        match changed {
            Some(record) => {
                if let Some(property) = self.properties.get(&record) {
                    property.refresh(source);
                }
                for key in self.all.iter().collect::<Vec<_>>() {
                    self.update_node(source, key, Some(record));
                }
            }
            None => {
                self.properties.retain(|record, property| {
                    source.kind(*record).and_then(PropertyKind::from_kind_name)
                        == Some(property.kind())
                });
                for property in self.properties.values() {
                    property.refresh(source);
                }

                self.all.validate(&mut self.nodes, source);
                for key in self.all.iter().collect::<Vec<_>>() {
                    self.update_node(source, key, None);
                }

                self.roots.clear(&mut self.nodes);
                for record in source.roots() {
                    if let Some(key) = self.get_node(source, record) {
                        self.make_parent(key, None);
                        self.roots.add(&mut self.nodes, key);
                    }
                }
                log::debug!("Revalidated {} nodes", self.all.len());
            }
        }
        self.reset_cache();
    }

    /// Returns the node backed by `record`, building it if needed.
    ///
    /// Records that are invalid or do not describe a scene node yield `None`.
    pub fn get_node<S: SourceModel>(&mut self, source: &S, record: RecordId) -> Option<NodeKey> {
        if !source.is_valid(record) {
            return None;
        }
        if let Some(key) = self.all.get(&self.nodes, record) {
            return Some(key);
        }
        if !source.inherits(record, NODE_BASE_KIND) {
            return None;
        }

        let key = self.nodes.insert(Node::new(record));
        self.all.add(&mut self.nodes, key);
        self.update_node(source, key, Some(record));
        Some(key)
    }

    /// Re-reads a node from its record.
    ///
    /// Controllers rebind when `changed` is their record or data. Flags,
    /// transform, name, properties, children and the collision link are
    /// re-read when `changed` is the node's own record or `None`. A node
    /// whose record is gone is cleared.
    pub fn update_node<S: SourceModel>(
        &mut self,
        source: &S,
        key: NodeKey,
        changed: Option<RecordId>,
    ) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let Some(record) = node.record().filter(|r| source.is_valid(*r)) else {
            log::debug!("Clearing node {}: backing record is gone", node.id());
            self.clear_node(key);
            return;
        };

        node.controllers_mut()
            .retain(|c| source.is_valid(c.record()));
        for controller in node.controllers_mut() {
            controller.update_source(source, changed);
        }

        if changed.is_some_and(|r| r != record) {
            return;
        }

        node.set_flags(NodeFlags::from_bits_retain(
            source.get::<u32>(record, "Flags").unwrap_or(0),
        ));
        node.local = Transform::new(
            source
                .get(record, "Translation")
                .unwrap_or(Vector3::new(0.0, 0.0, 0.0)),
            source
                .get::<Matrix3<f32>>(record, "Rotation")
                .unwrap_or_else(|| Transform::identity().rotation),
            source.get(record, "Scale").unwrap_or(1.0),
        );
        node.name = source.get(record, "Name").unwrap_or_default();
        node.set_collision(source.link(record, "Collision Data"));

        // Controller chain
        let mut seen = HashSet::new();
        let mut next = source.link(record, "Controller");
        while let Some(controller) = next {
            if !seen.insert(controller) {
                break;
            }
            self.set_controller(source, key, controller);
            next = source.link(controller, "Next Controller");
        }

        let mut properties = PropertyList::new();
        for link in source.links(record, "Properties") {
            if let Some(property) = self.property(source, link) {
                properties.add(property);
            }
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_properties(properties);
        }

        self.detach_children(key);
        for link in source.child_links(record) {
            if let Some(child) = self.get_node(source, link) {
                self.make_parent(child, Some(key));
            }
        }
    }

    fn clear_node(&mut self, key: NodeKey) {
        self.detach_children(key);
        if let Some(node) = self.nodes.get_mut(key) {
            let mut rest = node.clear();
            rest.clear(&mut self.nodes);
        }
    }

    fn detach_children(&mut self, key: NodeKey) {
        let children: Vec<NodeKey> = match self.nodes.get(key) {
            Some(node) => node.children().iter().collect(),
            None => return,
        };
        for child in children {
            if let Some(node) = self.nodes.get_mut(child) {
                if node.parent() == Some(key) {
                    node.set_parent(None);
                }
            }
        }
        self.nodes
            .with_children(key, |children, arena| children.clear(arena));
    }

    fn property<S: SourceModel>(&mut self, source: &S, record: RecordId) -> Option<Rc<Property>> {
        let kind = source.kind(record).and_then(PropertyKind::from_kind_name)?;
        if let Some(property) = self.properties.get(&record) {
            if property.kind() == kind {
                return Some(property.clone());
            }
        }
        let property = Rc::new(Property::from_source(source, record)?);
        self.properties.insert(record, property.clone());
        Some(property)
    }

    /// Attaches the controller described by `record` to a node.
    ///
    /// Unknown controller types and controllers already attached are
    /// ignored.
    pub fn set_controller<S: SourceModel>(&mut self, source: &S, key: NodeKey, record: RecordId) {
        let Some(kind) = source.kind(record).and_then(ControllerType::from_kind_name) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        if node.has_controller(record) {
            return;
        }

        let mut controller = Controller::new(kind, record, key);
        controller.update_source(source, None);
        log::trace!("Attached {:?} controller {} to node {}", kind, record, node.id());
        node.controllers_mut().push(controller);
    }

    // ========== Hierarchy ==========

    /// Moves a node under `parent`, or detaches it with `None`.
    ///
    /// The old parent releases its share and the new parent takes one.
    /// Requests that would make a node its own ancestor are ignored.
    pub fn make_parent(&mut self, key: NodeKey, parent: Option<NodeKey>) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let old = node.parent();
        if old == parent {
            return;
        }

        if let Some(parent) = parent {
            if !self.nodes.contains(parent) || self.is_ancestor_or_self(key, parent) {
                return;
            }
            self.nodes
                .with_children(parent, |children, arena| children.add(arena, key));
        }
        if let Some(old) = old {
            self.nodes
                .with_children(old, |children, arena| children.del(arena, key));
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.set_parent(parent);
        }
        self.reset_cache();
    }

    fn is_ancestor_or_self(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.nodes.get(k).and_then(|n| self.live_parent(n));
        }
        false
    }

    /// Nearest ancestor with the given id.
    pub fn find_parent(&self, key: NodeKey, id: NodeId) -> Option<NodeKey> {
        let mut current = self.live_parent(self.nodes.get(key)?);
        while let Some(k) = current {
            let node = self.nodes.get(k)?;
            if node.id() == id {
                return Some(k);
            }
            current = self.live_parent(node);
        }
        None
    }

    /// First descendant with the given id, depth-first.
    pub fn find_child(&self, key: NodeKey, id: NodeId) -> Option<NodeKey> {
        for child in self.nodes.get(key)?.children().iter() {
            let Some(node) = self.nodes.get(child) else {
                continue;
            };
            if node.id() == id {
                return Some(child);
            }
            if let Some(found) = self.find_child(child, id) {
                return Some(found);
            }
        }
        None
    }

    // ========== Transforms ==========

    /// Gets the world transform of a node.
    ///
    /// This returns the cached transform if present, otherwise walks up to
    /// the first cached ancestor (or the root) and composes back down,
    /// caching every transform along the way.
    pub fn world_trans(&self, key: NodeKey) -> Transform {
        if let Some(cached) = self.cache.world(key) {
            return cached;
        }

        let mut path = Vec::new();
        let mut world = Transform::identity();
        let mut current = Some(key);
        while let Some(k) = current {
            if let Some(cached) = self.cache.world(k) {
                world = cached;
                break;
            }
            let Some(node) = self.nodes.get(k) else {
                break;
            };
            path.push((k, node.local));
            current = self.live_parent(node);
        }

        for (k, local) in path.into_iter().rev() {
            world = world * local;
            self.cache.set_world(k, world);
        }
        world
    }

    /// Gets the view transform of a node: the camera transform composed with
    /// the world transform.
    pub fn view_trans(&self, key: NodeKey) -> Transform {
        if let Some(cached) = self.cache.view(key) {
            return cached;
        }
        let Some(node) = self.nodes.get(key) else {
            return self.view;
        };

        let view = match self.live_parent(node) {
            Some(parent) => self.view_trans(parent) * node.local,
            None => self.view * self.world_trans(key),
        };
        self.cache.set_view(key, view);
        view
    }

    /// Composes local transforms from `key` up to, but excluding, the
    /// ancestor with id `root`. Without such an ancestor this is the world
    /// transform.
    pub fn local_trans_from(&self, key: NodeKey, root: NodeId) -> Transform {
        let mut trans = Transform::identity();
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(node) = self.nodes.get(k) else {
                break;
            };
            if node.id() == root {
                break;
            }
            trans = node.local * trans;
            current = self.live_parent(node);
        }
        trans
    }

    /// World-space position of a node.
    pub fn center(&self, key: NodeKey) -> Point3<f32> {
        Point3::from_vec(self.world_trans(key).translation)
    }

    // ========== Visibility & bounds ==========

    /// Returns true if the node should not be drawn.
    ///
    /// The show-hidden option overrides everything. Otherwise a node is
    /// hidden by its own flag, by a hidden ancestor, or by a cull pattern
    /// matching its name.
    pub fn is_hidden(&self, key: NodeKey) -> bool {
        if self.options.show_hidden {
            return false;
        }
        let Some(node) = self.nodes.get(key) else {
            return true;
        };
        if node.is_hidden_flag() {
            return true;
        }
        if let Some(parent) = self.live_parent(node) {
            if self.is_hidden(parent) {
                return true;
            }
        }
        self.options.cull.is_match(&node.name)
    }

    /// Bound of a single node: a point at its position when nodes are
    /// shown, empty otherwise.
    pub fn node_bounds(&self, key: NodeKey) -> BoundSphere {
        if self.options.show_nodes && self.nodes.contains(key) {
            BoundSphere::new(self.center(key), 0.0)
        } else {
            BoundSphere::empty()
        }
    }

    /// Merged bound of every node.
    pub fn bounds(&self) -> BoundSphere {
        self.all
            .iter()
            .fold(BoundSphere::empty(), |acc, key| acc | self.node_bounds(key))
    }

    // ========== Animation ==========

    /// Starts a new pass at scene time `time`.
    ///
    /// The transform cache is replaced and, when animation is enabled, every
    /// controller of every node reachable from the roots runs.
    pub fn transform(&mut self, time: f32) {
        self.time = time;
        self.reset_cache();
        if !self.options.animate {
            return;
        }

        let mut visitor = CollectVisitor::default();
        for root in self.roots.iter() {
            walk_tree(&self.nodes, root, &mut visitor);
        }

        for key in visitor.keys {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            let mut controllers = std::mem::take(node.controllers_mut());
            for controller in &mut controllers {
                controller.update(time, &mut self.nodes);
            }
            if let Some(node) = self.nodes.get_mut(key) {
                *node.controllers_mut() = controllers;
            }
        }
    }

    /// Earliest start and latest stop time over every controller.
    ///
    /// A controller without a usable start/stop window contributes the time
    /// span of its keys instead.
    pub fn time_range(&self) -> Option<(f32, f32)> {
        self.all
            .iter()
            .filter_map(|key| self.nodes.get(key))
            .flat_map(|node| node.controllers())
            .map(|c| {
                let timing = c.timing();
                if timing.stop > timing.start {
                    (timing.start, timing.stop)
                } else {
                    c.key_range().unwrap_or((timing.start, timing.stop))
                }
            })
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }

    // ========== Render walk ==========

    /// Nodes reachable from the roots that are not hidden, in pre-order.
    pub fn visible_nodes(&self) -> Vec<NodeKey> {
        let mut visitor = VisibleVisitor {
            scene: self,
            keys: Vec::new(),
        };
        for root in self.roots.iter() {
            walk_tree(&self.nodes, root, &mut visitor);
        }
        visitor.keys
    }

    /// Marker geometry for every visible node.
    pub fn node_markers(&self) -> Vec<NodeMarker> {
        self.visible_nodes()
            .into_iter()
            .filter_map(|key| {
                let node = self.nodes.get(key)?;
                let position = Point3::from_vec(self.view_trans(key).translation);
                let parent_position = self
                    .live_parent(node)
                    .map_or(position, |p| Point3::from_vec(self.view_trans(p).translation));
                Some(NodeMarker {
                    node: key,
                    id: node.id(),
                    position,
                    parent_position,
                    highlighted: self.options.is_highlighted(node.id()),
                })
            })
            .collect()
    }

    /// Visible nodes sorted for drawing: opaque front to back by world
    /// depth, then translucent back to front.
    pub fn draw_order(&mut self) -> Vec<NodeKey> {
        let mut list = NodeList::new();
        for key in self.visible_nodes() {
            list.add(&mut self.nodes, key);
        }
        list.sort(&self.nodes, |key| self.world_trans(key).translation.z);
        let order = list.iter().collect();
        list.clear(&mut self.nodes);
        order
    }

    /// View-space outline of a node's collision object.
    ///
    /// Returns `None` for hidden nodes and for nodes without a decodable
    /// collision body and shape.
    pub fn collision_outline<S: SourceModel>(
        &self,
        source: &S,
        key: NodeKey,
    ) -> Option<CollisionOutline> {
        if self.is_hidden(key) {
            return None;
        }
        let object = self.nodes.get(key)?.collision()?;
        let body = source.link(object, "Body")?;
        let shape = CollisionShape::decode(source, source.link(body, "Shape")?)?;

        let flags = source.get::<i64>(body, "Flags").unwrap_or(0);
        let body_trans = Transform::from_quaternion(
            source
                .get(body, "Translation")
                .unwrap_or(Vector3::new(0.0, 0.0, 0.0)),
            source
                .get(body, "Rotation")
                .unwrap_or(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            1.0,
        );
        let matrix = self.view_trans(key).to_matrix()
            * Matrix4::from_scale(HAVOK_SCALE)
            * body_trans.to_matrix();

        Some(CollisionOutline {
            node: key,
            color_index: (flags & 7) as u32,
            outline: shape.outline().transformed(&matrix),
        })
    }

    /// Collision outlines of every visible node that has one.
    pub fn collision_outlines<S: SourceModel>(&self, source: &S) -> Vec<CollisionOutline> {
        self.visible_nodes()
            .into_iter()
            .filter_map(|key| self.collision_outline(source, key))
            .collect()
    }
}
