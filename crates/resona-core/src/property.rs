//! Typed, range-checked, optionally a-rate automatable node parameters.
//!
//! Every node carries a map of integer slots to [`Property`] values. A
//! property is one of nine types; numeric scalars additionally support an
//! *automation track* — scheduled `(sample time, value)` points evaluated
//! lazily per block — and a-rate modulation from other nodes' outputs.
//!
//! For a given tick a property is **a-rate** iff automation or modulation
//! yields a per-sample value; otherwise it is **k-rate** (constant for the
//! block). Nodes read `get_float_at(i)` in the a-rate case and `get_float`
//! otherwise; [`Property::needs_a_rate`] tells them which.
//!
//! Range handling follows per-property metadata: a property either clamps
//! out-of-range sets into `[min, max]` or rejects them with
//! [`Error::Range`]. Read-only enforcement happens at the server boundary
//! so nodes can maintain their own derived read-only slots.

#[cfg(not(feature = "std"))]
use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec,
    vec::Vec,
};
#[cfg(feature = "std")]
use std::collections::BTreeMap;
#[cfg(feature = "std")]
use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::error::{Error, Result};

/// The type tag of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Int,
    Float,
    Double,
    String,
    Float3,
    Float6,
    IntArray,
    FloatArray,
    Buffer,
}

/// Static metadata describing one property slot of a node kind.
///
/// Node kinds expose a `&'static [PropertyDescriptor]` table; the node
/// builder instantiates the table at construction. The standard slots every
/// node shares (`state`, `mul`, `add`, `channel_interpretation`) are added
/// by the builder itself.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    pub slot: i32,
    pub name: &'static str,
    pub kind: PropertyKind,
    pub read_only: bool,
}

/// Per-type default and range metadata for a [`PropertyDescriptor`].
///
/// `clamps` selects the out-of-range policy: clamp into `[min, max]`
/// instead of rejecting with [`Error::Range`].
#[derive(Debug, Clone, Copy)]
pub enum PropertyKind {
    Int { default: i32, min: i32, max: i32, clamps: bool },
    Float { default: f32, min: f32, max: f32, clamps: bool },
    Double { default: f64, min: f64, max: f64, clamps: bool },
    Float3 { default: [f32; 3] },
    Float6 { default: [f32; 6] },
    IntArray { min_len: usize, max_len: usize },
    FloatArray { min_len: usize, max_len: usize },
    Buffer,
}

/// One scheduled automation point: `value` at absolute sample `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationPoint {
    pub time: u64,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
    Float3([f32; 3]),
    Float6([f32; 6]),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Buffer(Option<Arc<AudioBuffer>>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Range {
    Int(i32, i32),
    Float(f32, f32),
    Double(f64, f64),
    ArrayLength(usize, usize),
    None,
}

/// A typed node parameter.
#[derive(Debug, Clone)]
pub struct Property {
    name: &'static str,
    value: Value,
    default: Value,
    range: Range,
    read_only: bool,
    clamps: bool,
    has_dynamic_range: bool,
    /// Set by mutations; latched into `was_modified` on the next tick.
    pending_modified: bool,
    /// Visible to `process()` during the tick after a mutation, then decays.
    was_modified: bool,
    /// Automation state for numeric scalars.
    points: Vec<AutomationPoint>,
    anchor: Option<AutomationPoint>,
    block: Vec<f32>,
    a_rate: bool,
}

impl Property {
    fn with_value(name: &'static str, value: Value, range: Range) -> Self {
        Self {
            name,
            default: value.clone(),
            value,
            range,
            read_only: false,
            clamps: false,
            has_dynamic_range: false,
            pending_modified: false,
            was_modified: false,
            points: Vec::new(),
            anchor: None,
            block: Vec::new(),
            a_rate: false,
        }
    }

    /// An int property with a `[min, max]` range.
    pub fn int(name: &'static str, default: i32, min: i32, max: i32) -> Self {
        Self::with_value(name, Value::Int(default), Range::Int(min, max))
    }

    /// A float property with a `[min, max]` range.
    pub fn float(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self::with_value(name, Value::Float(default), Range::Float(min, max))
    }

    /// A double property with a `[min, max]` range.
    pub fn double(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self::with_value(name, Value::Double(default), Range::Double(min, max))
    }

    /// A string property.
    pub fn string(name: &'static str, default: &str) -> Self {
        Self::with_value(name, Value::Str(default.to_string()), Range::None)
    }

    /// A float3 property (positions, directions).
    pub fn float3(name: &'static str, default: [f32; 3]) -> Self {
        Self::with_value(name, Value::Float3(default), Range::None)
    }

    /// A float6 property (orientation pairs).
    pub fn float6(name: &'static str, default: [f32; 6]) -> Self {
        Self::with_value(name, Value::Float6(default), Range::None)
    }

    /// An int-array property with a length range.
    pub fn int_array(name: &'static str, min_len: usize, max_len: usize) -> Self {
        Self::with_value(
            name,
            Value::IntArray(Vec::new()),
            Range::ArrayLength(min_len, max_len),
        )
    }

    /// A float-array property with a length range.
    pub fn float_array(name: &'static str, min_len: usize, max_len: usize) -> Self {
        Self::with_value(
            name,
            Value::FloatArray(Vec::new()),
            Range::ArrayLength(min_len, max_len),
        )
    }

    /// A buffer-reference property, initially unset.
    pub fn buffer(name: &'static str) -> Self {
        Self::with_value(name, Value::Buffer(None), Range::None)
    }

    /// Builder: marks the property read-only (enforced at the server
    /// boundary; the owning node may still update it).
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Builder: out-of-range sets clamp instead of rejecting.
    pub fn clamping(mut self) -> Self {
        self.clamps = true;
        self
    }

    /// Builder: marks the range adjustable at runtime.
    pub fn dynamic_range(mut self) -> Self {
        self.has_dynamic_range = true;
        self
    }

    /// Instantiates a property from static metadata.
    pub fn from_descriptor(descriptor: &PropertyDescriptor) -> Self {
        let mut property = match descriptor.kind {
            PropertyKind::Int { default, min, max, clamps } => {
                let mut p = Self::int(descriptor.name, default, min, max);
                p.clamps = clamps;
                p
            }
            PropertyKind::Float { default, min, max, clamps } => {
                let mut p = Self::float(descriptor.name, default, min, max);
                p.clamps = clamps;
                p
            }
            PropertyKind::Double { default, min, max, clamps } => {
                let mut p = Self::double(descriptor.name, default, min, max);
                p.clamps = clamps;
                p
            }
            PropertyKind::Float3 { default } => Self::float3(descriptor.name, default),
            PropertyKind::Float6 { default } => Self::float6(descriptor.name, default),
            PropertyKind::IntArray { min_len, max_len } => {
                Self::int_array(descriptor.name, min_len, max_len)
            }
            PropertyKind::FloatArray { min_len, max_len } => {
                Self::float_array(descriptor.name, min_len, max_len)
            }
            PropertyKind::Buffer => Self::buffer(descriptor.name),
        };
        property.read_only = descriptor.read_only;
        property
    }

    // --- Introspection ---

    /// The property's display name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The property's type tag.
    pub fn get_type(&self) -> PropertyType {
        match self.value {
            Value::Int(_) => PropertyType::Int,
            Value::Float(_) => PropertyType::Float,
            Value::Double(_) => PropertyType::Double,
            Value::Str(_) => PropertyType::String,
            Value::Float3(_) => PropertyType::Float3,
            Value::Float6(_) => PropertyType::Float6,
            Value::IntArray(_) => PropertyType::IntArray,
            Value::FloatArray(_) => PropertyType::FloatArray,
            Value::Buffer(_) => PropertyType::Buffer,
        }
    }

    /// Whether the public API may set this property.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the range can change at runtime.
    pub fn has_dynamic_range(&self) -> bool {
        self.has_dynamic_range
    }

    /// Whether a set since the last observation window exists.
    pub fn was_modified(&self) -> bool {
        self.was_modified
    }

    /// Marks the property modified, as if it had been set.
    pub fn mark_modified(&mut self) {
        self.pending_modified = true;
    }

    // --- Scalar access ---

    /// Current int value.
    pub fn get_int(&self) -> Result<i32> {
        match self.value {
            Value::Int(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Sets an int value, applying the range policy.
    pub fn set_int(&mut self, value: i32) -> Result<()> {
        let Range::Int(min, max) = self.range else {
            return Err(Error::TypeMismatch);
        };
        let Value::Int(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        let value = if self.clamps {
            value.clamp(min, max)
        } else if value < min || value > max {
            return Err(Error::Range);
        } else {
            value
        };
        *slot = value;
        self.pending_modified = true;
        Ok(())
    }

    /// Current k-rate float value.
    pub fn get_float(&self) -> Result<f32> {
        match self.value {
            Value::Float(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Float value at a block-relative sample offset.
    ///
    /// Falls back to the k-rate value when the property is not a-rate this
    /// tick.
    pub fn get_float_at(&self, offset: usize) -> Result<f32> {
        if self.a_rate {
            if let Some(&v) = self.block.get(offset) {
                return Ok(v);
            }
        }
        self.get_float()
    }

    /// Sets a float value, applying the range policy.
    pub fn set_float(&mut self, value: f32) -> Result<()> {
        let Range::Float(min, max) = self.range else {
            return Err(Error::TypeMismatch);
        };
        let Value::Float(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        let value = if self.clamps {
            value.clamp(min, max)
        } else if value < min || value > max {
            return Err(Error::Range);
        } else {
            value
        };
        *slot = value;
        self.pending_modified = true;
        Ok(())
    }

    /// Current double value.
    pub fn get_double(&self) -> Result<f64> {
        match self.value {
            Value::Double(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Double value at a block-relative sample offset.
    pub fn get_double_at(&self, offset: usize) -> Result<f64> {
        if self.a_rate {
            if let Some(&v) = self.block.get(offset) {
                return Ok(v as f64);
            }
        }
        self.get_double()
    }

    /// Sets a double value, applying the range policy.
    pub fn set_double(&mut self, value: f64) -> Result<()> {
        let Range::Double(min, max) = self.range else {
            return Err(Error::TypeMismatch);
        };
        let Value::Double(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        let value = if self.clamps {
            value.clamp(min, max)
        } else if value < min || value > max {
            return Err(Error::Range);
        } else {
            value
        };
        *slot = value;
        self.pending_modified = true;
        Ok(())
    }

    /// Current string value.
    pub fn get_string(&self) -> Result<&str> {
        match self.value {
            Value::Str(ref v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Sets a string value.
    pub fn set_string(&mut self, value: &str) -> Result<()> {
        match self.value {
            Value::Str(ref mut slot) => {
                slot.clear();
                slot.push_str(value);
                self.pending_modified = true;
                Ok(())
            }
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Current float3 value.
    pub fn get_float3(&self) -> Result<[f32; 3]> {
        match self.value {
            Value::Float3(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Sets a float3 value.
    pub fn set_float3(&mut self, value: [f32; 3]) -> Result<()> {
        match self.value {
            Value::Float3(ref mut slot) => {
                *slot = value;
                self.pending_modified = true;
                Ok(())
            }
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Current float6 value.
    pub fn get_float6(&self) -> Result<[f32; 6]> {
        match self.value {
            Value::Float6(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Sets a float6 value.
    pub fn set_float6(&mut self, value: [f32; 6]) -> Result<()> {
        match self.value {
            Value::Float6(ref mut slot) => {
                *slot = value;
                self.pending_modified = true;
                Ok(())
            }
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Current buffer reference.
    pub fn get_buffer(&self) -> Result<Option<Arc<AudioBuffer>>> {
        match self.value {
            Value::Buffer(ref v) => Ok(v.clone()),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Sets or clears the buffer reference.
    pub fn set_buffer(&mut self, buffer: Option<Arc<AudioBuffer>>) -> Result<()> {
        match self.value {
            Value::Buffer(ref mut slot) => {
                *slot = buffer;
                self.pending_modified = true;
                Ok(())
            }
            _ => Err(Error::TypeMismatch),
        }
    }

    // --- Arrays ---

    /// Replaces a float array wholesale. Length must satisfy the length
    /// range.
    pub fn replace_float_array(&mut self, values: &[f32]) -> Result<()> {
        let (min_len, max_len) = self.array_length_range()?;
        let Value::FloatArray(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        if values.len() < min_len || values.len() > max_len {
            return Err(Error::Range);
        }
        slot.clear();
        slot.extend_from_slice(values);
        self.pending_modified = true;
        Ok(())
    }

    /// Reads one float array element.
    pub fn read_float_array(&self, index: usize) -> Result<f32> {
        match self.value {
            Value::FloatArray(ref v) => v.get(index).copied().ok_or(Error::Range),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Overwrites `[start, stop)` of a float array with `values`.
    pub fn write_float_array(&mut self, start: usize, stop: usize, values: &[f32]) -> Result<()> {
        let Value::FloatArray(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        if start > stop || stop > slot.len() || values.len() != stop - start {
            return Err(Error::Range);
        }
        slot[start..stop].copy_from_slice(values);
        self.pending_modified = true;
        Ok(())
    }

    /// Float array length.
    pub fn float_array_length(&self) -> Result<usize> {
        match self.value {
            Value::FloatArray(ref v) => Ok(v.len()),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Replaces an int array wholesale. Length must satisfy the length
    /// range.
    pub fn replace_int_array(&mut self, values: &[i32]) -> Result<()> {
        let (min_len, max_len) = self.array_length_range()?;
        let Value::IntArray(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        if values.len() < min_len || values.len() > max_len {
            return Err(Error::Range);
        }
        slot.clear();
        slot.extend_from_slice(values);
        self.pending_modified = true;
        Ok(())
    }

    /// Reads one int array element.
    pub fn read_int_array(&self, index: usize) -> Result<i32> {
        match self.value {
            Value::IntArray(ref v) => v.get(index).copied().ok_or(Error::Range),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Overwrites `[start, stop)` of an int array with `values`.
    pub fn write_int_array(&mut self, start: usize, stop: usize, values: &[i32]) -> Result<()> {
        let Value::IntArray(ref mut slot) = self.value else {
            return Err(Error::TypeMismatch);
        };
        if start > stop || stop > slot.len() || values.len() != stop - start {
            return Err(Error::Range);
        }
        slot[start..stop].copy_from_slice(values);
        self.pending_modified = true;
        Ok(())
    }

    /// Int array length.
    pub fn int_array_length(&self) -> Result<usize> {
        match self.value {
            Value::IntArray(ref v) => Ok(v.len()),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// The permitted `[min, max]` length of an array property.
    ///
    /// Non-array types are a type mismatch.
    pub fn array_length_range(&self) -> Result<(usize, usize)> {
        match (self.get_type(), self.range) {
            (PropertyType::FloatArray | PropertyType::IntArray, Range::ArrayLength(lo, hi)) => {
                Ok((lo, hi))
            }
            _ => Err(Error::TypeMismatch),
        }
    }

    // --- Ranges ---

    /// `[min, max]` of an int property.
    pub fn int_range(&self) -> Result<(i32, i32)> {
        match self.range {
            Range::Int(lo, hi) => Ok((lo, hi)),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// `[min, max]` of a float property.
    pub fn float_range(&self) -> Result<(f32, f32)> {
        match self.range {
            Range::Float(lo, hi) => Ok((lo, hi)),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// `[min, max]` of a double property.
    pub fn double_range(&self) -> Result<(f64, f64)> {
        match self.range {
            Range::Double(lo, hi) => Ok((lo, hi)),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// Replaces a float property's range (dynamic-range properties only in
    /// the public API; nodes may retune their own).
    ///
    /// The current value is clamped into the new range; a value moved by
    /// the clamp counts as a modification.
    pub fn set_float_range(&mut self, min: f32, max: f32) -> Result<()> {
        let Range::Float(..) = self.range else {
            return Err(Error::TypeMismatch);
        };
        if min > max {
            return Err(Error::Range);
        }
        self.range = Range::Float(min, max);
        if let Value::Float(ref mut v) = self.value {
            let clamped = v.clamp(min, max);
            if clamped != *v {
                *v = clamped;
                self.pending_modified = true;
            }
        }
        Ok(())
    }

    /// Restores the default value and clears automation.
    pub fn reset(&mut self) {
        self.value = self.default.clone();
        self.points.clear();
        self.anchor = None;
        self.a_rate = false;
        self.pending_modified = true;
    }

    /// The default value of a float property.
    pub fn float_default(&self) -> Result<f32> {
        match self.default {
            Value::Float(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    /// The default value of an int property.
    pub fn int_default(&self) -> Result<i32> {
        match self.default {
            Value::Int(v) => Ok(v),
            _ => Err(Error::TypeMismatch),
        }
    }

    // --- Automation ---

    /// Whether this property can carry automation or a-rate modulation.
    pub fn is_automatable(&self) -> bool {
        matches!(self.value, Value::Float(_) | Value::Double(_))
    }

    /// True iff automation or modulation yields per-sample values this
    /// tick.
    pub fn needs_a_rate(&self) -> bool {
        self.a_rate
    }

    /// Schedules `value` at absolute sample `time`.
    ///
    /// `now` anchors the ramp: the first point on an empty track ramps
    /// linearly from the current value starting at `now`. Points keep the
    /// track sorted; points beyond the current block are preserved for
    /// future ticks.
    pub fn schedule(&mut self, now: u64, time: u64, value: f32) -> Result<()> {
        if !self.is_automatable() {
            return Err(Error::CannotConnectToProperty);
        }
        if self.points.is_empty() {
            self.anchor = Some(AutomationPoint {
                time: now,
                value: self.scalar_as_f32()?,
            });
        }
        let point = AutomationPoint { time, value };
        let at = self.points.partition_point(|p| p.time <= time);
        self.points.insert(at, point);
        Ok(())
    }

    /// Removes all points strictly after `now`. The present value is
    /// untouched.
    pub fn cancel_automation(&mut self, now: u64) {
        self.points.retain(|p| p.time <= now);
        if self.points.is_empty() {
            self.anchor = None;
        }
    }

    /// Adds a-rate modulation from a connected node output.
    ///
    /// Called by the scheduler after [`tick`](Self::tick); lazily promotes
    /// the property to a-rate for this block, seeding the block with the
    /// automation (or k-rate) values before accumulating.
    pub(crate) fn add_modulation(&mut self, samples: &[f32]) {
        if !self.a_rate {
            let base = self.scalar_as_f32().unwrap_or(0.0);
            self.block.clear();
            self.block.resize(samples.len(), base);
            self.a_rate = true;
        }
        for (b, &s) in self.block.iter_mut().zip(samples.iter()) {
            *b += s;
        }
    }

    /// Advances one block starting at absolute sample `time`.
    ///
    /// Latches the modified flag for this tick's observation window (the
    /// previous tick's flag decays here), evaluates any automation into the
    /// per-sample block, and consumes points the block has passed.
    pub fn tick(&mut self, time: u64, block_size: usize) {
        self.was_modified = self.pending_modified;
        self.pending_modified = false;
        self.a_rate = false;
        if self.points.is_empty() {
            return;
        }

        self.block.clear();
        self.block.resize(block_size, 0.0);
        for i in 0..block_size {
            let v = self.evaluate(time + i as u64);
            self.block[i] = v;
        }
        self.a_rate = true;

        // Consume passed points and re-anchor at the block end.
        let end = time + block_size as u64;
        let final_value = self.evaluate(end.saturating_sub(1));
        self.points.retain(|p| p.time >= end);
        self.anchor = Some(AutomationPoint {
            time: end.saturating_sub(1),
            value: final_value,
        });
        if self.points.is_empty() {
            self.anchor = None;
        }
        let _ = self.store_scalar(final_value);
    }

    /// Linear interpolation over the automation track at absolute time `t`.
    fn evaluate(&self, t: u64) -> f32 {
        let mut prev = self.anchor.unwrap_or(AutomationPoint {
            time: t,
            value: self.scalar_as_f32().unwrap_or(0.0),
        });
        for p in &self.points {
            if t <= p.time {
                if p.time == prev.time {
                    return p.value;
                }
                let span = (p.time - prev.time) as f32;
                let frac = (t.saturating_sub(prev.time)) as f32 / span;
                return prev.value + (p.value - prev.value) * frac;
            }
            prev = *p;
        }
        prev.value
    }

    fn scalar_as_f32(&self) -> Result<f32> {
        match self.value {
            Value::Float(v) => Ok(v),
            Value::Double(v) => Ok(v as f32),
            _ => Err(Error::TypeMismatch),
        }
    }

    fn store_scalar(&mut self, value: f32) -> Result<()> {
        match self.value {
            Value::Float(ref mut v) => *v = value,
            Value::Double(ref mut v) => *v = value as f64,
            _ => return Err(Error::TypeMismatch),
        }
        Ok(())
    }
}

/// The property map of one node: slot → [`Property`].
///
/// Standard slots shared by every node are negative; node-specific slots
/// count up from zero.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    map: BTreeMap<i32, Property>,
}

impl PropertySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a property at `slot`.
    pub fn insert(&mut self, slot: i32, property: Property) {
        self.map.insert(slot, property);
    }

    /// Looks up a slot.
    pub fn get(&self, slot: i32) -> Result<&Property> {
        self.map.get(&slot).ok_or(Error::Range)
    }

    /// Looks up a slot mutably.
    pub fn get_mut(&mut self, slot: i32) -> Result<&mut Property> {
        self.map.get_mut(&slot).ok_or(Error::Range)
    }

    /// Whether `slot` exists.
    pub fn contains(&self, slot: i32) -> bool {
        self.map.contains_key(&slot)
    }

    /// Iterates `(slot, property)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &Property)> {
        self.map.iter().map(|(&k, v)| (k, v))
    }

    /// Iterates mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (i32, &mut Property)> {
        self.map.iter_mut().map(|(&k, v)| (k, v))
    }

    /// Advances every property one block.
    pub fn tick(&mut self, time: u64, block_size: usize) {
        for property in self.map.values_mut() {
            property.tick(time, block_size);
        }
    }

    /// True if any of `slots` was modified in this tick's observation
    /// window. Missing slots are ignored.
    pub fn any_modified(&self, slots: &[i32]) -> bool {
        slots
            .iter()
            .any(|s| self.map.get(s).is_some_and(Property::was_modified))
    }
}
