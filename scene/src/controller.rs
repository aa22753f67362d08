use cgmath::{Matrix3, Quaternion, Vector3};

use crate::interpolate::KeyGroup;
use crate::node_arena::{NodeArena, NodeKey};
use crate::source::{RecordId, SourceModel};

const ACTIVE_FLAG: u32 = 1 << 3;

/// What a controller does outside its `[start, stop]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    /// Wrap around
    #[default]
    Cyclic,
    /// Ping-pong
    Reverse,
    /// Clamp to the range
    Constant,
}

impl Extrapolation {
    /// Decodes bits 1-2 of the controller flags.
    pub fn from_flags(flags: u32) -> Self {
        match (flags >> 1) & 3 {
            0 => Self::Cyclic,
            1 => Self::Reverse,
            _ => Self::Constant,
        }
    }
}

/// Mapping from scene time to a controller's local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeMapping {
    pub frequency: f32,
    pub phase: f32,
    pub start: f32,
    pub stop: f32,
    pub extrapolation: Extrapolation,
}

impl Default for TimeMapping {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            phase: 0.0,
            start: 0.0,
            stop: 0.0,
            extrapolation: Extrapolation::Cyclic,
        }
    }
}

impl TimeMapping {
    /// Converts scene time into local time.
    pub fn ctrl_time(&self, time: f32) -> f32 {
        let time = self.frequency * time + self.phase;
        if time >= self.start && time <= self.stop {
            return time;
        }

        let delta = self.stop - self.start;
        match self.extrapolation {
            Extrapolation::Cyclic | Extrapolation::Reverse if delta <= 0.0 => self.start,
            Extrapolation::Cyclic => {
                let x = (time - self.start) / delta;
                self.start + (x - x.floor()) * delta
            }
            Extrapolation::Reverse => {
                let x = (time - self.start) / delta;
                let y = (x - x.floor()) * delta;
                if (x.floor().abs() as i64) & 1 == 0 {
                    self.start + y
                } else {
                    self.stop - y
                }
            }
            Extrapolation::Constant => {
                if time < self.start {
                    self.start
                } else if time > self.stop {
                    self.stop
                } else {
                    time
                }
            }
        }
    }
}

/// Controller kinds the scene knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerType {
    Transform,
    Visibility,
}

impl ControllerType {
    /// Maps a source record type to a controller kind.
    pub fn from_kind_name(name: &str) -> Option<Self> {
        match name {
            "NiKeyframeController" | "NiTransformController" => Some(Self::Transform),
            "NiVisController" => Some(Self::Visibility),
            _ => None,
        }
    }
}

/// Keyframed translation, rotation and scale.
#[derive(Debug, Clone, Default)]
pub struct TransformController {
    translations: KeyGroup<Vector3<f32>>,
    rotations: KeyGroup<Quaternion<f32>>,
    scales: KeyGroup<f32>,
    last_translation: usize,
    last_rotation: usize,
    last_scale: usize,
}

impl TransformController {
    pub fn new(
        translations: KeyGroup<Vector3<f32>>,
        rotations: KeyGroup<Quaternion<f32>>,
        scales: KeyGroup<f32>,
    ) -> Self {
        Self {
            translations,
            rotations,
            scales,
            ..Self::default()
        }
    }

    fn bind<S: SourceModel>(&mut self, source: &S, data: Option<RecordId>) {
        let field = |name: &str| data.and_then(|d| source.field(d, name));
        self.translations = KeyGroup::from_value(field("Translations"));
        self.rotations = KeyGroup::from_value(field("Rotations"));
        self.scales = KeyGroup::from_value(field("Scales"));
        self.last_translation = 0;
        self.last_rotation = 0;
        self.last_scale = 0;
    }

    fn time_range(&self) -> Option<(f32, f32)> {
        [
            self.translations.time_range(),
            self.rotations.time_range(),
            self.scales.time_range(),
        ]
        .into_iter()
        .flatten()
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    }
}

/// Keyframed visibility.
#[derive(Debug, Clone, Default)]
pub struct VisibilityController {
    keys: KeyGroup<bool>,
    last: usize,
}

impl VisibilityController {
    pub fn new(keys: KeyGroup<bool>) -> Self {
        Self { keys, last: 0 }
    }
}

#[derive(Debug, Clone)]
pub enum ControllerKind {
    Transform(TransformController),
    Visibility(VisibilityController),
}

/// A time-driven animator attached to a node.
#[derive(Debug, Clone)]
pub struct Controller {
    record: RecordId,
    target: NodeKey,
    data: Option<RecordId>,
    active: bool,
    timing: TimeMapping,
    kind: ControllerKind,
}

impl Controller {
    /// Creates an unbound controller. Call [`Controller::update_source`] to
    /// read its parameters and curves.
    pub fn new(kind: ControllerType, record: RecordId, target: NodeKey) -> Self {
        let kind = match kind {
            ControllerType::Transform => ControllerKind::Transform(TransformController::default()),
            ControllerType::Visibility => {
                ControllerKind::Visibility(VisibilityController::default())
            }
        };
        Self {
            record,
            target,
            data: None,
            active: false,
            timing: TimeMapping::default(),
            kind,
        }
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    pub fn target(&self) -> NodeKey {
        self.target
    }

    pub fn controller_type(&self) -> ControllerType {
        match self.kind {
            ControllerKind::Transform(_) => ControllerType::Transform,
            ControllerKind::Visibility(_) => ControllerType::Visibility,
        }
    }

    pub fn kind(&self) -> &ControllerKind {
        &self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn timing(&self) -> &TimeMapping {
        &self.timing
    }

    pub fn set_timing(&mut self, timing: TimeMapping) {
        self.timing = timing;
    }

    /// Replaces the curves directly, bypassing the source.
    pub fn set_kind(&mut self, kind: ControllerKind) {
        self.kind = kind;
    }

    /// Rebinds parameters and curve data when `changed` is the controller's
    /// own record or its data record. `None` rebinds unconditionally.
    ///
    /// Returns true if anything was re-read.
    pub fn update_source<S: SourceModel>(&mut self, source: &S, changed: Option<RecordId>) -> bool {
        if !source.is_valid(self.record) {
            return false;
        }

        let own = changed.map_or(true, |r| r == self.record);
        if own {
            let flags = source.get::<u32>(self.record, "Flags").unwrap_or(0);
            self.active = flags & ACTIVE_FLAG != 0;
            self.timing = TimeMapping {
                frequency: source.get(self.record, "Frequency").unwrap_or(1.0),
                phase: source.get(self.record, "Phase").unwrap_or(0.0),
                start: source.get(self.record, "Start Time").unwrap_or(0.0),
                stop: source.get(self.record, "Stop Time").unwrap_or(0.0),
                extrapolation: Extrapolation::from_flags(flags),
            };
            self.data = source.link(self.record, "Data");
        } else if changed != self.data || self.data.is_none() {
            return false;
        }

        let data = self.data;
        match &mut self.kind {
            ControllerKind::Transform(ctrl) => ctrl.bind(source, data),
            ControllerKind::Visibility(ctrl) => {
                ctrl.keys = KeyGroup::from_value(data.and_then(|d| source.field(d, "Data")));
                ctrl.last = 0;
            }
        }
        true
    }

    /// First and last key time of the bound curves.
    pub fn key_range(&self) -> Option<(f32, f32)> {
        match &self.kind {
            ControllerKind::Transform(ctrl) => ctrl.time_range(),
            ControllerKind::Visibility(ctrl) => ctrl.keys.time_range(),
        }
    }

    /// Evaluates the controller at scene time `time` and writes the result
    /// into its target. Does nothing when inactive or when the target is gone.
    pub fn update(&mut self, time: f32, nodes: &mut NodeArena) {
        if !self.active {
            return;
        }
        let Some(target) = nodes.get_mut(self.target) else {
            return;
        };
        let time = self.timing.ctrl_time(time);

        match &mut self.kind {
            ControllerKind::Transform(ctrl) => {
                if let Some(q) = ctrl.rotations.interpolate(time, &mut ctrl.last_rotation) {
                    target.local.rotation = Matrix3::from(q);
                }
                if let Some(t) = ctrl.translations.interpolate(time, &mut ctrl.last_translation) {
                    target.local.translation = t;
                }
                if let Some(s) = ctrl.scales.interpolate(time, &mut ctrl.last_scale) {
                    target.local.scale = s;
                }
            }
            ControllerKind::Visibility(ctrl) => {
                if let Some(visible) = ctrl.keys.interpolate(time, &mut ctrl.last) {
                    target.set_hidden(!visible);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::{Interpolation, Key};
    use crate::node::Node;
    use crate::node_list::NodeList;
    use crate::source::{KeyData, KeyGroupData, Record, RecordTable, Value};
    use skope_common::EPSILON;

    fn mapping(start: f32, stop: f32, extrapolation: Extrapolation) -> TimeMapping {
        TimeMapping {
            start,
            stop,
            extrapolation,
            ..TimeMapping::default()
        }
    }

    fn live_node(arena: &mut NodeArena, keep: &mut NodeList) -> NodeKey {
        let key = arena.insert(Node::new(0));
        keep.add(arena, key);
        key
    }

    #[test]
    fn test_extrapolation_from_flags() {
        assert_eq!(Extrapolation::from_flags(0b1000), Extrapolation::Cyclic);
        assert_eq!(Extrapolation::from_flags(0b0010), Extrapolation::Reverse);
        assert_eq!(Extrapolation::from_flags(0b0100), Extrapolation::Constant);
        assert_eq!(Extrapolation::from_flags(0b0110), Extrapolation::Constant);
    }

    #[test]
    fn test_controller_type_names() {
        assert_eq!(
            ControllerType::from_kind_name("NiKeyframeController"),
            Some(ControllerType::Transform)
        );
        assert_eq!(
            ControllerType::from_kind_name("NiTransformController"),
            Some(ControllerType::Transform)
        );
        assert_eq!(
            ControllerType::from_kind_name("NiVisController"),
            Some(ControllerType::Visibility)
        );
        assert_eq!(ControllerType::from_kind_name("NiAlphaController"), None);
    }

    #[test]
    fn test_ctrl_time_inside_range() {
        let m = TimeMapping {
            frequency: 2.0,
            phase: 1.0,
            ..mapping(0.0, 10.0, Extrapolation::Constant)
        };
        assert!((m.ctrl_time(3.0) - 7.0).abs() < EPSILON);
    }

    #[test]
    fn test_ctrl_time_cyclic() {
        let m = mapping(0.0, 2.0, Extrapolation::Cyclic);
        assert!((m.ctrl_time(5.0) - 1.0).abs() < EPSILON);
        assert!((m.ctrl_time(-0.5) - 1.5).abs() < EPSILON);
    }

    #[test]
    fn test_ctrl_time_reverse() {
        let m = mapping(0.0, 2.0, Extrapolation::Reverse);
        // Second period runs backwards
        assert!((m.ctrl_time(2.5) - 1.5).abs() < EPSILON);
        // Third period runs forward again
        assert!((m.ctrl_time(4.5) - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_ctrl_time_constant_clamps() {
        let m = mapping(1.0, 2.0, Extrapolation::Constant);
        assert_eq!(m.ctrl_time(0.0), 1.0);
        assert_eq!(m.ctrl_time(9.0), 2.0);
    }

    #[test]
    fn test_ctrl_time_empty_range() {
        let m = mapping(3.0, 3.0, Extrapolation::Cyclic);
        assert_eq!(m.ctrl_time(7.0), 3.0);
        let m = mapping(3.0, 1.0, Extrapolation::Reverse);
        assert_eq!(m.ctrl_time(7.0), 3.0);
    }

    #[test]
    fn test_transform_controller_writes_local() {
        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();
        let target = live_node(&mut arena, &mut keep);

        let mut ctrl = Controller::new(ControllerType::Transform, 0, target);
        ctrl.set_active(true);
        ctrl.set_timing(mapping(0.0, 1.0, Extrapolation::Constant));
        ctrl.set_kind(ControllerKind::Transform(TransformController::new(
            KeyGroup::new(
                Interpolation::Linear,
                vec![
                    Key::new(0.0, Vector3::new(0.0, 0.0, 0.0)),
                    Key::new(1.0, Vector3::new(4.0, 0.0, 0.0)),
                ],
            ),
            KeyGroup::default(),
            KeyGroup::default(),
        )));

        ctrl.update(0.5, &mut arena);

        let local = arena.get(target).unwrap().local;
        assert!((local.translation.x - 2.0).abs() < EPSILON);
        // Curves without keys leave their component alone
        assert_eq!(local.scale, 1.0);
    }

    #[test]
    fn test_inactive_controller_is_noop() {
        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();
        let target = live_node(&mut arena, &mut keep);

        let mut ctrl = Controller::new(ControllerType::Visibility, 0, target);
        ctrl.set_kind(ControllerKind::Visibility(VisibilityController::new(KeyGroup::new(
            Interpolation::Linear,
            vec![Key::new(0.0, false)],
        ))));

        ctrl.update(0.0, &mut arena);
        assert!(!arena.get(target).unwrap().is_hidden_flag());

        ctrl.set_active(true);
        ctrl.update(0.0, &mut arena);
        assert!(arena.get(target).unwrap().is_hidden_flag());
    }

    #[test]
    fn test_stale_target_is_skipped() {
        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();
        let target = live_node(&mut arena, &mut keep);

        let mut ctrl = Controller::new(ControllerType::Transform, 0, target);
        ctrl.set_active(true);
        keep.clear(&mut arena);

        ctrl.update(1.0, &mut arena);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_update_source_binds_curves() {
        let mut table = RecordTable::new();
        let data = table.insert(Record::new("NiVisData").with(
            "Data",
            Value::Keys(KeyGroupData {
                interpolation: 1,
                keys: vec![
                    KeyData::new(0.0, Value::Int(1)),
                    KeyData::new(2.0, Value::Int(0)),
                ],
            }),
        ));
        let record = table.insert(
            Record::new("NiVisController")
                .with("Flags", Value::Int(0b1100))
                .with("Frequency", Value::Float(1.0))
                .with("Start Time", Value::Float(0.0))
                .with("Stop Time", Value::Float(2.0))
                .with("Data", Value::Link(Some(data))),
        );

        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();
        let target = live_node(&mut arena, &mut keep);
        let mut ctrl = Controller::new(ControllerType::Visibility, record, target);

        assert!(ctrl.update_source(&table, None));
        assert!(ctrl.is_active());
        assert_eq!(ctrl.timing().extrapolation, Extrapolation::Constant);
        assert_eq!(ctrl.key_range(), Some((0.0, 2.0)));

        // Unrelated records do not trigger a rebind
        assert!(!ctrl.update_source(&table, Some(42)));
        assert!(ctrl.update_source(&table, Some(data)));

        ctrl.update(3.0, &mut arena);
        assert!(arena.get(target).unwrap().is_hidden_flag());
    }
}
