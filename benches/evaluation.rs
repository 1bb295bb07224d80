//! Alarm evaluation benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use offnormal::bootstrap::{instantiate, BaseAlarmOptions, OffNormalOptions};
use offnormal::comparator::evaluate;
use offnormal::{AddressSpace, ConditionEvent, ConditionEventSink, DataValue, NodeId, Value};
use std::sync::Arc;

struct NullSink;

impl ConditionEventSink for NullSink {
    fn signal_new_condition(&self, event: &ConditionEvent) -> offnormal::Result<()> {
        black_box(event);
        Ok(())
    }
}

fn benchmark_comparator(c: &mut Criterion) {
    let normal = Value::Int(42);
    let input = Value::Int(7);

    c.bench_function("comparator_evaluate", |b| {
        b.iter(|| evaluate(black_box(Some(&normal)), black_box(Some(&input)), black_box(false)));
    });
}

fn benchmark_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("alarm_delivery");

    for alarm_count in [1usize, 10, 100] {
        group.bench_function(format!("{}_alarms", alarm_count), |b| {
            let space = AddressSpace::new();
            let input = NodeId::string(2, "Input");
            space
                .add_variable(input.clone(), "Input", DataValue::good(0i64))
                .expect("Failed to add input");
            space
                .add_variable(NodeId::string(2, "Normal"), "Normal", DataValue::good(0i64))
                .expect("Failed to add normal state");

            let alarms: Vec<_> = (0..alarm_count)
                .map(|i| {
                    instantiate(
                        &space,
                        BaseAlarmOptions::new(NodeId::numeric(1, i as u32), format!("alarm_{}", i)),
                        OffNormalOptions::new(input.clone(), "Normal"),
                        Arc::new(NullSink),
                    )
                    .expect("Failed to build alarm")
                })
                .collect();

            let mut toggle = 0i64;
            b.iter(|| {
                toggle ^= 1;
                space
                    .write_value_from_source(&input, DataValue::good(toggle))
                    .expect("Write failed");
            });
            black_box(&alarms);
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_comparator, benchmark_delivery);
criterion_main!(benches);
