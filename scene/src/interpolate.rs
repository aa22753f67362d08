use cgmath::{InnerSpace, Quaternion, Vector3};

use crate::source::{FromValue, KeyGroupData, Value};

/// How values between two keys are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    /// Hermite interpolation using the keys' tangents
    Quadratic,
    /// Hold the previous key's value
    Constant,
}

impl Interpolation {
    /// Decodes the source interpolation code.
    ///
    /// TBC and XYZ curves are evaluated linearly.
    pub fn from_source(code: u32) -> Self {
        match code {
            2 => Self::Quadratic,
            5 => Self::Constant,
            _ => Self::Linear,
        }
    }
}

/// Values that can be sampled from a keyed curve.
pub trait Interpolate: Copy + FromValue {
    /// Curves of this type never blend between keys.
    const STEPPED: bool = false;

    fn lerp(a: Self, b: Self, t: f32) -> Self;

    /// Cubic Hermite blend. Types without a meaningful tangent space fall
    /// back to [`Interpolate::lerp`].
    fn hermite(a: Self, b: Self, _out_a: Self, _in_b: Self, t: f32) -> Self {
        Self::lerp(a, b, t)
    }
}

fn hermite_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        2.0 * t3 - 3.0 * t2 + 1.0,
        t3 - 2.0 * t2 + t,
        -2.0 * t3 + 3.0 * t2,
        t3 - t2,
    ]
}

impl Interpolate for f32 {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }

    fn hermite(a: Self, b: Self, out_a: Self, in_b: Self, t: f32) -> Self {
        let [h00, h10, h01, h11] = hermite_weights(t);
        a * h00 + out_a * h10 + b * h01 + in_b * h11
    }
}

impl Interpolate for Vector3<f32> {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }

    fn hermite(a: Self, b: Self, out_a: Self, in_b: Self, t: f32) -> Self {
        let [h00, h10, h01, h11] = hermite_weights(t);
        a * h00 + out_a * h10 + b * h01 + in_b * h11
    }
}

impl Interpolate for Quaternion<f32> {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        // Take the short way round
        let b = if a.dot(b) < 0.0 { -b } else { b };
        a.slerp(b, t)
    }
}

impl Interpolate for bool {
    const STEPPED: bool = true;

    fn lerp(a: Self, _b: Self, _t: f32) -> Self {
        a
    }
}

/// One key of a [`KeyGroup`].
#[derive(Debug, Clone, PartialEq)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
    pub forward: Option<T>,
    pub backward: Option<T>,
}

impl<T> Key<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self {
            time,
            value,
            forward: None,
            backward: None,
        }
    }
}

/// A keyed animation curve, sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyGroup<T> {
    pub interpolation: Interpolation,
    pub keys: Vec<Key<T>>,
}

impl<T> Default for KeyGroup<T> {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Linear,
            keys: Vec::new(),
        }
    }
}

impl<T: Interpolate> KeyGroup<T> {
    pub fn new(interpolation: Interpolation, keys: Vec<Key<T>>) -> Self {
        Self {
            interpolation,
            keys,
        }
    }

    /// Converts raw source keys. Keys whose value has the wrong type are
    /// skipped.
    pub fn from_source(data: &KeyGroupData) -> Self {
        let keys = data
            .keys
            .iter()
            .filter_map(|key| {
                Some(Key {
                    time: key.time,
                    value: T::from_value(&key.value)?,
                    forward: key.forward.as_ref().and_then(T::from_value),
                    backward: key.backward.as_ref().and_then(T::from_value),
                })
            })
            .collect();
        Self::new(Interpolation::from_source(data.interpolation), keys)
    }

    /// Converts a [`Value::Keys`] field; other values give an empty curve.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Keys(data)) => Self::from_source(data),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time of the first and last key.
    pub fn time_range(&self) -> Option<(f32, f32)> {
        Some((self.keys.first()?.time, self.keys.last()?.time))
    }

    /// Samples the curve at `time`.
    ///
    /// `cursor` remembers the last key interval and speeds up forward
    /// queries. Queries before the cursor restart from the first key.
    /// Returns `None` for an empty curve.
    pub fn interpolate(&self, time: f32, cursor: &mut usize) -> Option<T> {
        let first = self.keys.first()?;
        let last_index = self.keys.len() - 1;
        let last = &self.keys[last_index];

        if time <= first.time {
            *cursor = 0;
            return Some(first.value);
        }
        if time >= last.time {
            *cursor = last_index;
            return Some(last.value);
        }

        // first.time < time < last.time, so some i < last_index brackets time
        let mut i = (*cursor).min(last_index);
        if self.keys[i].time > time {
            i = 0;
        }
        while self.keys[i + 1].time <= time {
            i += 1;
        }
        *cursor = i;

        let a = &self.keys[i];
        let b = &self.keys[i + 1];
        let t = (time - a.time) / (b.time - a.time);

        if T::STEPPED {
            return Some(a.value);
        }
        let value = match self.interpolation {
            Interpolation::Constant => a.value,
            Interpolation::Linear => T::lerp(a.value, b.value, t),
            Interpolation::Quadratic => match (a.forward, b.backward) {
                (Some(out_a), Some(in_b)) => T::hermite(a.value, b.value, out_a, in_b, t),
                _ => T::lerp(a.value, b.value, t),
            },
        };
        Some(value)
    }
}
