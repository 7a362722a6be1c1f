//! Protocol types for garbage-collection telemetry.
//!
//! The inbound side is [`GcCycleEvent`], one fact per collection cycle as the
//! runtime reports it. The outbound side is [`TelemetryRecord`], the
//! structured unit handed to a [`Sink`](crate::Sink).

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered map used for memory pools.
///
/// Iteration order is the key order, which keeps snapshot order stable for a
/// given event.
pub type Map<K, V> = BTreeMap<K, V>;

/// A snapshot of one memory pool's capacity and usage, in bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPoolSample {
    /// Name of the pool, e.g. `G1 Old Gen`.
    pub name: String,
    /// Initial size requested from the operating system.
    pub init: u64,
    /// Maximum size the pool may grow to.
    pub max: u64,
    /// Bytes currently in use.
    pub used: u64,
    /// Bytes guaranteed to be available. `0` for pools that are undefined in
    /// the current runtime configuration.
    pub committed: u64,
}

impl MemoryPoolSample {
    /// Creates a new sample.
    pub fn new(name: impl Into<String>, init: u64, max: u64, used: u64, committed: u64) -> Self {
        MemoryPoolSample {
            name: name.into(),
            init,
            max,
            used,
            committed,
        }
    }
}

/// One collection cycle as delivered by the runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcCycleEvent {
    /// Cycle id, monotonically increasing per collector.
    pub id: u64,
    /// Name of the collector that ran the cycle.
    pub collector_name: String,
    /// What the collector did, e.g. `end of minor GC`.
    pub action: String,
    /// Why the cycle ran, e.g. `Allocation Failure`.
    pub cause: String,
    /// Cycle start in milliseconds since runtime start.
    pub start_time_ms: u64,
    /// Cycle end in milliseconds since runtime start.
    pub end_time_ms: u64,
    /// Cycle duration in milliseconds.
    pub duration_ms: u64,
    /// Pool samples taken before the cycle.
    pub pools_before: Map<String, MemoryPoolSample>,
    /// Pool samples taken after the cycle.
    pub pools_after: Map<String, MemoryPoolSample>,
}

impl GcCycleEvent {
    /// Adds a before/after sample pair for one pool.
    ///
    /// The pool name of `before` is used as the map key for both samples.
    #[must_use]
    pub fn with_pool(mut self, before: MemoryPoolSample, after: MemoryPoolSample) -> Self {
        let name = before.name.clone();
        self.pools_before.insert(name.clone(), before);
        self.pools_after.insert(name, after);
        self
    }

    /// The duration reconstructed from the cycle's timestamps.
    ///
    /// Producers guarantee this equals `duration_ms`, but it is recomputed
    /// for log lines rather than trusted.
    pub fn observed_duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }
}

/// Severity of a telemetry record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Per-cycle facts.
    Trace,
    /// Lifecycle information.
    Debug,
    /// Informational.
    Info,
    /// Warnings.
    Warning,
    /// Errors.
    Error,
    /// Faults that terminate a thread or the process.
    Fatal,
}

impl Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Trace => write!(f, "trace"),
            Level::Debug => write!(f, "debug"),
            Level::Info => write!(f, "info"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
            Level::Fatal => write!(f, "fatal"),
        }
    }
}

/// The kind of operation a record describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// A discrete event.
    #[default]
    Event,
    /// Memory being cleared, i.e. a collection cycle.
    Clear,
    /// Something stopping, i.e. process shutdown.
    Stop,
}

/// How a property value should be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// A count or id.
    Counter,
    /// A percentage, already multiplied by 100.
    Percent,
    /// An age in milliseconds.
    AgeMsec,
    /// A size in bytes.
    SizeByte,
}

/// A property value supporting both integers and floats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// An integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
}

impl Value {
    /// Returns the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::Float(_) => None,
        }
    }

    /// Returns the value as a float, converting integers.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// A named numeric property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name, e.g. `gcId`.
    pub name: String,
    /// The value.
    pub value: Value,
    /// How `value` should be read.
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl Property {
    /// Creates a new property.
    pub fn new(name: impl Into<String>, value: impl Into<Value>, value_type: ValueType) -> Self {
        Property {
            name: name.into(),
            value: value.into(),
            value_type,
        }
    }
}

/// A named group of properties attached to a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name, e.g. `G1 Eden Space-After`.
    pub name: String,
    /// Grouping category, the collector name for pool snapshots.
    pub category: String,
    /// The snapshot's properties in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Snapshot {
            name: name.into(),
            category: category.into(),
            properties: Vec::new(),
        }
    }

    /// Appends a property.
    pub fn add(&mut self, name: &str, value: impl Into<Value>, value_type: ValueType) {
        self.properties.push(Property::new(name, value, value_type));
    }

    /// Looks up a property value by name.
    pub fn get(&self, name: &str) -> Option<Value> {
        find_property(&self.properties, name)
    }
}

/// Start and stop of the operation a record describes, in microseconds.
///
/// Cycle records are measured from runtime start; lifecycle records from
/// the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Start of the operation.
    pub start_us: u64,
    /// Stop of the operation.
    pub stop_us: u64,
}

impl Timing {
    /// Creates timing that starts at `start_us` and lasts `elapsed_us`.
    pub fn starting_at(start_us: u64, elapsed_us: u64) -> Self {
        Timing {
            start_us,
            stop_us: start_us.saturating_add(elapsed_us),
        }
    }

    /// Creates timing that ends at `stop_us` after lasting `elapsed_us`.
    pub fn ending_at(stop_us: u64, elapsed_us: u64) -> Self {
        Timing {
            start_us: stop_us.saturating_sub(elapsed_us),
            stop_us,
        }
    }

    /// The reported duration.
    pub fn elapsed_us(&self) -> u64 {
        self.stop_us.saturating_sub(self.start_us)
    }
}

/// A structured telemetry record, the unit submitted to a sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Unique id of this record.
    pub id: Uuid,
    /// Operation name, e.g. the GC action.
    pub name: String,
    /// Severity.
    pub level: Level,
    /// Operation kind.
    pub op_type: OpType,
    /// Grouping category, e.g. the collector name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The resource label identifying the producing process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Free-form summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Cause or fault detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// When the record was built.
    pub timestamp: SystemTime,
    /// Start and stop of the described operation.
    pub timing: Timing,
    /// Named numeric properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    /// Named snapshots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,
}

impl TelemetryRecord {
    /// Creates a record with a fresh id and the current timestamp.
    pub fn new(name: impl Into<String>, level: Level, op_type: OpType) -> Self {
        TelemetryRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            level,
            op_type,
            category: None,
            resource: None,
            message: None,
            exception: None,
            timestamp: SystemTime::now(),
            timing: Timing::default(),
            properties: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Appends a property.
    pub fn add_property(&mut self, name: &str, value: impl Into<Value>, value_type: ValueType) {
        self.properties.push(Property::new(name, value, value_type));
    }

    /// Looks up a property value by name.
    pub fn property(&self, name: &str) -> Option<Value> {
        find_property(&self.properties, name)
    }

    /// Looks up a snapshot by name.
    pub fn snapshot(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.name == name)
    }

    /// The reported duration in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        self.timing.elapsed_us()
    }
}

fn find_property(properties: &[Property], name: &str) -> Option<Value> {
    properties.iter().find(|p| p.name == name).map(|p| p.value)
}
