//! Turns collection cycles into telemetry records.

use std::sync::Arc;

use crate::protocol::{
    GcCycleEvent, Level, MemoryPoolSample, OpType, Snapshot, TelemetryRecord, Timing, ValueType,
};
use crate::state::CumulativeGcState;
use crate::gcstream_debug;

/// Names of the properties attached to cycle records and pool snapshots.
pub mod names {
    /// Id of the cycle, scoped to its collector.
    pub const GC_ID: &str = "gcId";
    /// Duration of the cycle.
    pub const GC_CYCLE_DURATION_MS: &str = "gcCycleDurationMs";
    /// Cumulative GC time including the cycle.
    pub const TOTAL_GC_DURATION_MS: &str = "totalGcDurationMs";
    /// Share of runtime up to the cycle's end spent in this cycle.
    pub const GC_CYCLE_OVERHEAD_PCT: &str = "gcCycleOverheadPct";
    /// Share of runtime up to the cycle's end spent in GC.
    pub const TOTAL_GC_OVERHEAD_PCT: &str = "totalGcOverheadPct";

    /// Initial pool size.
    pub const MEM_INIT: &str = "memInit";
    /// Maximum pool size.
    pub const MEM_MAX: &str = "memMax";
    /// Used bytes.
    pub const MEM_USED: &str = "memUsed";
    /// Committed bytes.
    pub const MEM_COMMITTED: &str = "memCommitted";
    /// Used over committed.
    pub const MEM_USAGE: &str = "memUsage";
    /// Used after the cycle over committed before it.
    pub const MEM_AFTER_USAGE: &str = "memAfterUsage";
    /// Used after minus used before.
    pub const MEM_USED_DELTA: &str = "memUsedDelta";
    /// The used delta over committed before the cycle.
    pub const MEM_USED_DELTA_USAGE: &str = "memUsedDeltaUsage";

    /// Suffix of the snapshot taken before the cycle.
    pub const BEFORE_SUFFIX: &str = "-Before";
    /// Suffix of the snapshot taken after the cycle.
    pub const AFTER_SUFFIX: &str = "-After";
}

/// Builds a [`TelemetryRecord`] for each collection cycle.
///
/// All processors of one collector share a single [`CumulativeGcState`], so
/// overhead figures account for every source. Processing never submits the
/// record anywhere; that is up to the caller.
#[derive(Debug, Clone)]
pub struct GcTelemetryProcessor {
    state: Arc<CumulativeGcState>,
    resource_label: String,
}

impl GcTelemetryProcessor {
    /// Creates a processor that accumulates into `state` and labels records
    /// with `resource_label`.
    pub fn new(state: Arc<CumulativeGcState>, resource_label: impl Into<String>) -> Self {
        GcTelemetryProcessor {
            state,
            resource_label: resource_label.into(),
        }
    }

    /// The shared cumulative state.
    pub fn state(&self) -> &Arc<CumulativeGcState> {
        &self.state
    }

    /// The label attached to every record.
    pub fn resource_label(&self) -> &str {
        &self.resource_label
    }

    /// Processes one cycle.
    ///
    /// The cycle duration is added to the shared state exactly once per call.
    pub fn process(&self, event: &GcCycleEvent) -> TelemetryRecord {
        process(event, &self.state, &self.resource_label)
    }
}

/// Processes one cycle against `state`.
///
/// Malformed input never fails: a pool sampled after the cycle but not
/// before it gets an `-After` snapshot without delta fields, and an
/// `end_time_ms` of zero yields overhead percentages of `0`.
pub fn process(
    event: &GcCycleEvent,
    state: &CumulativeGcState,
    resource_label: &str,
) -> TelemetryRecord {
    let total_ms = state.add_and_get(event.duration_ms);
    let cycle_overhead = overhead_pct(event.duration_ms, event.end_time_ms);
    let total_overhead = overhead_pct(total_ms, event.end_time_ms);

    if event.end_time_ms == 0 {
        gcstream_debug!(
            "cycle {} of {} has no end time, reporting zero overhead",
            event.id,
            event.collector_name
        );
    }
    if event.observed_duration_ms() != event.duration_ms {
        gcstream_debug!(
            "cycle {} of {} reports duration {}ms but spans {}-{}",
            event.id,
            event.collector_name,
            event.duration_ms,
            event.start_time_ms,
            event.end_time_ms
        );
    }

    let mut record = TelemetryRecord::new(event.action.clone(), Level::Trace, OpType::Clear);
    record.category = Some(event.collector_name.clone());
    record.resource = Some(resource_label.to_owned());
    record.exception = Some(event.cause.clone());
    record.message = Some(format!(
        "GC action={} gc.id={} gc.name={} duration.ms={} total.gc.ms={} gc.percent={:.2} \
         gc.cause={} start.end.time={}-{}",
        event.action,
        event.id,
        event.collector_name,
        event.duration_ms,
        total_ms,
        total_overhead,
        event.cause,
        event.start_time_ms,
        event.end_time_ms,
    ));
    record.timing = Timing::starting_at(
        ms_to_us(event.start_time_ms),
        ms_to_us(event.duration_ms),
    );

    for (pool, after) in &event.pools_after {
        attach_pool_snapshots(&mut record, event, pool, after);
    }

    record.add_property(names::GC_ID, event.id, ValueType::Counter);
    record.add_property(names::GC_CYCLE_DURATION_MS, event.duration_ms, ValueType::AgeMsec);
    record.add_property(names::TOTAL_GC_DURATION_MS, total_ms, ValueType::AgeMsec);
    record.add_property(names::GC_CYCLE_OVERHEAD_PCT, cycle_overhead, ValueType::Percent);
    record.add_property(names::TOTAL_GC_OVERHEAD_PCT, total_overhead, ValueType::Percent);

    record
}

fn attach_pool_snapshots(
    record: &mut TelemetryRecord,
    event: &GcCycleEvent,
    pool: &str,
    after: &MemoryPoolSample,
) {
    let collector = &event.collector_name;
    let mut after_snapshot = pool_snapshot(collector, pool, names::AFTER_SUFFIX, after);

    let before = match event.pools_before.get(pool) {
        Some(before) => before,
        None => {
            gcstream_debug!(
                "cycle {} of {} has no pre-GC sample for pool {}, skipping deltas",
                event.id,
                collector,
                pool
            );
            record.snapshots.push(after_snapshot);
            return;
        }
    };

    let delta = i128::from(after.used) - i128::from(before.used);
    after_snapshot.add(
        names::MEM_AFTER_USAGE,
        usage_pct(i128::from(after.used), before.committed),
        ValueType::Percent,
    );
    after_snapshot.add(names::MEM_USED_DELTA, saturate(delta), ValueType::SizeByte);
    after_snapshot.add(
        names::MEM_USED_DELTA_USAGE,
        usage_pct(delta, before.committed),
        ValueType::Percent,
    );

    record
        .snapshots
        .push(pool_snapshot(collector, pool, names::BEFORE_SUFFIX, before));
    record.snapshots.push(after_snapshot);
}

fn pool_snapshot(collector: &str, pool: &str, suffix: &str, sample: &MemoryPoolSample) -> Snapshot {
    let mut snapshot = Snapshot::new(collector, format!("{}{}", pool, suffix));
    snapshot.add(names::MEM_INIT, sample.init, ValueType::SizeByte);
    snapshot.add(names::MEM_MAX, sample.max, ValueType::SizeByte);
    snapshot.add(names::MEM_USED, sample.used, ValueType::SizeByte);
    snapshot.add(names::MEM_COMMITTED, sample.committed, ValueType::SizeByte);
    snapshot.add(
        names::MEM_USAGE,
        usage_pct(i128::from(sample.used), sample.committed),
        ValueType::Percent,
    );
    snapshot
}

/// `part * 100 / time_base`, or `0` when there is no time base.
pub fn overhead_pct(part_ms: u64, time_base_ms: u64) -> f64 {
    if time_base_ms == 0 {
        return 0.0;
    }
    (part_ms as f64 * 100.0) / time_base_ms as f64
}

/// Integer `part * 100 / committed`, truncating toward zero, or `0` for a
/// pool without committed memory.
pub fn usage_pct(part: i128, committed: u64) -> i64 {
    if committed == 0 {
        return 0;
    }
    saturate(part.saturating_mul(100) / i128::from(committed))
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

fn ms_to_us(ms: u64) -> u64 {
    ms.saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::protocol::Value;

    fn cycle(duration_ms: u64, end_time_ms: u64) -> GcCycleEvent {
        GcCycleEvent {
            id: 1,
            collector_name: "G1 Young Generation".into(),
            action: "end of minor GC".into(),
            cause: "G1 Evacuation Pause".into(),
            start_time_ms: end_time_ms - duration_ms,
            end_time_ms,
            duration_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_overhead_properties() {
        let state = CumulativeGcState::new();
        let record = process(&cycle(50, 1000), &state, "4242@builder");

        assert_eq!(state.total_gc_duration_ms(), 50);
        assert_eq!(record.property(names::GC_ID), Some(Value::Int(1)));
        assert_eq!(record.property(names::GC_CYCLE_DURATION_MS), Some(Value::Int(50)));
        assert_eq!(record.property(names::TOTAL_GC_DURATION_MS), Some(Value::Int(50)));
        assert_eq!(record.property(names::GC_CYCLE_OVERHEAD_PCT), Some(Value::Float(5.0)));
        assert_eq!(record.property(names::TOTAL_GC_OVERHEAD_PCT), Some(Value::Float(5.0)));
    }

    #[test]
    fn test_total_overhead_accumulates() {
        let state = CumulativeGcState::new();
        process(&cycle(50, 1000), &state, "res");
        let record = process(&cycle(150, 2000), &state, "res");

        assert_eq!(record.property(names::TOTAL_GC_DURATION_MS), Some(Value::Int(200)));
        assert_eq!(record.property(names::GC_CYCLE_OVERHEAD_PCT), Some(Value::Float(7.5)));
        assert_eq!(record.property(names::TOTAL_GC_OVERHEAD_PCT), Some(Value::Float(10.0)));
    }

    #[test]
    fn test_record_shape() {
        let state = CumulativeGcState::new();
        let record = process(&cycle(50, 1000), &state, "4242@builder");

        assert_eq!(record.name, "end of minor GC");
        assert_eq!(record.level, Level::Trace);
        assert_eq!(record.op_type, OpType::Clear);
        assert_eq!(record.resource.as_deref(), Some("4242@builder"));
        assert_eq!(record.category.as_deref(), Some("G1 Young Generation"));
        assert_eq!(record.exception.as_deref(), Some("G1 Evacuation Pause"));
        assert_eq!(record.elapsed_us(), 50_000);
        assert_eq!(record.timing.start_us, 950_000);

        let message = record.message.unwrap();
        assert!(message.contains("gc.id=1"));
        assert!(message.contains("duration.ms=50"));
        assert!(message.contains("gc.percent=5.00"));
        assert!(message.contains("gc.cause=G1 Evacuation Pause"));
    }

    #[test]
    fn test_zero_end_time() {
        let state = CumulativeGcState::new();
        let event = GcCycleEvent {
            duration_ms: 3,
            ..Default::default()
        };
        let record = process(&event, &state, "res");

        assert_eq!(record.property(names::GC_CYCLE_OVERHEAD_PCT), Some(Value::Float(0.0)));
        assert_eq!(record.property(names::TOTAL_GC_OVERHEAD_PCT), Some(Value::Float(0.0)));
        assert_eq!(state.total_gc_duration_ms(), 3);
    }

    #[test]
    fn test_zero_duration() {
        let state = CumulativeGcState::new();
        let record = process(&cycle(0, 1000), &state, "res");

        assert_eq!(record.property(names::GC_CYCLE_OVERHEAD_PCT), Some(Value::Float(0.0)));
        assert_eq!(record.elapsed_us(), 0);
    }

    #[test]
    fn test_pool_snapshots() {
        let state = CumulativeGcState::new();
        let event = cycle(50, 1000).with_pool(
            MemoryPoolSample::new("G1 Eden Space", 16, 1024, 100, 200),
            MemoryPoolSample::new("G1 Eden Space", 16, 1024, 150, 220),
        );
        let record = process(&event, &state, "res");
        assert_eq!(record.snapshots.len(), 2);

        let before = record.snapshot("G1 Eden Space-Before").unwrap();
        assert_eq!(before.category, "G1 Young Generation");
        assert_eq!(before.get(names::MEM_INIT), Some(Value::Int(16)));
        assert_eq!(before.get(names::MEM_MAX), Some(Value::Int(1024)));
        assert_eq!(before.get(names::MEM_USAGE), Some(Value::Int(50)));
        assert_eq!(before.get(names::MEM_AFTER_USAGE), None);

        let after = record.snapshot("G1 Eden Space-After").unwrap();
        assert_eq!(after.get(names::MEM_USED), Some(Value::Int(150)));
        assert_eq!(after.get(names::MEM_COMMITTED), Some(Value::Int(220)));
        assert_eq!(after.get(names::MEM_USAGE), Some(Value::Int(68)));
        assert_eq!(after.get(names::MEM_AFTER_USAGE), Some(Value::Int(75)));
        assert_eq!(after.get(names::MEM_USED_DELTA), Some(Value::Int(50)));
        assert_eq!(after.get(names::MEM_USED_DELTA_USAGE), Some(Value::Int(25)));
    }

    #[test]
    fn test_pool_shrinking_yields_negative_delta() {
        let state = CumulativeGcState::new();
        let event = cycle(5, 1000).with_pool(
            MemoryPoolSample::new("G1 Old Gen", 0, 4096, 300, 400),
            MemoryPoolSample::new("G1 Old Gen", 0, 4096, 100, 400),
        );
        let record = process(&event, &state, "res");

        let after = record.snapshot("G1 Old Gen-After").unwrap();
        assert_eq!(after.get(names::MEM_USED_DELTA), Some(Value::Int(-200)));
        assert_eq!(after.get(names::MEM_USED_DELTA_USAGE), Some(Value::Int(-50)));
    }

    #[test]
    fn test_uncommitted_pool_has_zero_usage() {
        let state = CumulativeGcState::new();
        let event = cycle(5, 1000).with_pool(
            MemoryPoolSample::new("Compressed Class Space", 0, 0, 10, 0),
            MemoryPoolSample::new("Compressed Class Space", 0, 0, 20, 0),
        );
        let record = process(&event, &state, "res");

        for snapshot in &record.snapshots {
            assert_eq!(snapshot.get(names::MEM_USAGE), Some(Value::Int(0)));
        }
        let after = record.snapshot("Compressed Class Space-After").unwrap();
        assert_eq!(after.get(names::MEM_AFTER_USAGE), Some(Value::Int(0)));
        assert_eq!(after.get(names::MEM_USED_DELTA), Some(Value::Int(10)));
        assert_eq!(after.get(names::MEM_USED_DELTA_USAGE), Some(Value::Int(0)));
    }

    #[test]
    fn test_pool_missing_before_sample() {
        let state = CumulativeGcState::new();
        let mut event = cycle(5, 1000).with_pool(
            MemoryPoolSample::new("G1 Eden Space", 0, 0, 100, 200),
            MemoryPoolSample::new("G1 Eden Space", 0, 0, 0, 200),
        );
        event.pools_after.insert(
            "G1 Survivor Space".into(),
            MemoryPoolSample::new("G1 Survivor Space", 0, 0, 8, 16),
        );
        let record = process(&event, &state, "res");

        assert_eq!(record.snapshots.len(), 3);
        assert!(record.snapshot("G1 Eden Space-Before").is_some());
        assert!(record.snapshot("G1 Eden Space-After").is_some());
        assert!(record.snapshot("G1 Survivor Space-Before").is_none());

        let orphan = record.snapshot("G1 Survivor Space-After").unwrap();
        assert_eq!(orphan.get(names::MEM_USAGE), Some(Value::Int(50)));
        assert_eq!(orphan.get(names::MEM_USED_DELTA), None);
        assert_eq!(orphan.get(names::MEM_AFTER_USAGE), None);
        assert_eq!(record.property(names::GC_ID), Some(Value::Int(1)));
    }

    #[rstest]
    #[case(100, 200, 50)]
    #[case(1, 3, 33)]
    #[case(200, 100, 200)]
    #[case(-50, 200, -25)]
    #[case(7, 0, 0)]
    fn test_usage_pct(#[case] part: i128, #[case] committed: u64, #[case] expected: i64) {
        assert_eq!(usage_pct(part, committed), expected);
    }

    #[rstest]
    #[case(50, 1000, 5.0)]
    #[case(0, 1000, 0.0)]
    #[case(1, 3, 100.0 / 3.0)]
    #[case(10, 0, 0.0)]
    fn test_overhead_pct(#[case] part: u64, #[case] base: u64, #[case] expected: f64) {
        assert_eq!(overhead_pct(part, base), expected);
    }

    #[test]
    fn test_usage_pct_saturates() {
        assert_eq!(usage_pct(i128::from(u64::MAX), 1), i64::MAX);
    }
}
