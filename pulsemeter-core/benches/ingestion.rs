use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use pulsemeter_core::{
    EngineConfig, IngestionPipeline, MetricKind, OwnershipFlags, RawEvent, RingBuffer, Topic,
};

const PLAYER: &str = "Player-1-0A1B2C3D";

/// One simulated second at `rate` events per second, half player, a quarter pet
fn combat_second(start: f64, rate: usize) -> Vec<RawEvent> {
    let mut seed: u32 = 0xC0FF_EE11;
    (0..rate)
        .map(|i| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let ts = start + i as f64 / rate as f64;
            let amount = 100.0 + (seed >> 20) as f64;
            match i % 4 {
                0 | 1 => RawEvent::damage(ts, PLAYER, amount)
                    .flags(OwnershipFlags::me())
                    .critical(seed & 3 == 0),
                2 => RawEvent::damage(ts, "Pet-0-1", amount * 0.4)
                    .name("Wolf")
                    .flags(OwnershipFlags::my_pet()),
                _ => RawEvent::healing(ts, PLAYER, amount).flags(OwnershipFlags::me()),
            }
        })
        .collect()
}

fn fresh_pipeline() -> IngestionPipeline {
    let mut pipeline = IngestionPipeline::new(EngineConfig::default()).unwrap();
    pipeline.set_player(PLAYER, "Thrall");
    pipeline.subscribe(Topic::DamageObserved, "sink", |event| {
        black_box(event.timestamp());
        Ok(())
    });
    pipeline
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ingestion");
    let events = combat_second(0.0, 1_000);
    group.throughput(Throughput::Elements(events.len() as u64));

    group.bench_function("1000 events + tick", |b| {
        b.iter_batched(
            || (fresh_pipeline(), events.clone()),
            |(mut pipeline, events)| {
                for event in events {
                    black_box(pipeline.ingest(event).unwrap());
                }
                black_box(pipeline.tick(1.0));
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut pipeline = fresh_pipeline();
    for second in 0..10 {
        for event in combat_second(second as f64, 200) {
            pipeline.ingest(event).unwrap();
        }
        pipeline.tick(second as f64 + 1.0);
    }

    let mut group = c.benchmark_group("Queries");
    for window in [5.0, 30.0] {
        group.bench_function(format!("window_totals {window}s"), |b| {
            b.iter(|| black_box(pipeline.window_totals(MetricKind::Damage, black_box(window)).unwrap()));
        });
    }
    group.bench_function("snapshot", |b| {
        b.iter(|| black_box(pipeline.snapshot(MetricKind::Damage).unwrap()));
    });
    group.finish();
}

fn bench_ring_buffer(c: &mut Criterion) {
    let mut buffer: RingBuffer = RingBuffer::new(2_000, "bench");
    let mut ts = 0.0;

    c.bench_function("RingBuffer write (full)", |b| {
        b.iter(|| {
            ts += 0.01;
            buffer.write(black_box(ts), black_box(250.0), None);
        });
    });
}

criterion_group!(benches, bench_ingest, bench_queries, bench_ring_buffer);
criterion_main!(benches);
