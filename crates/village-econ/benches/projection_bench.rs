use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use village_core::{ResourceKind, ResourceSnapshot, ResourceVector};

fn bench_project(c: &mut Criterion) {
    let taken = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let snap = ResourceSnapshot {
        quantities: ResourceVector::zero()
            .with(ResourceKind::Plants, 100.0)
            .with(ResourceKind::Bones, 50.0)
            .with(ResourceKind::Meat, 80.0),
        storage_cap: 500.0,
        taken_at: Some(taken),
    };
    let rate = ResourceVector::zero()
        .with(ResourceKind::Plants, 360.0)
        .with(ResourceKind::Bones, 60.0)
        .with(ResourceKind::Meat, 45.0);

    c.bench_function("project 1h of ticks", |bch| {
        bch.iter(|| {
            // One hour of 1 Hz display ticks against the same snapshot.
            for s in 0..3600i64 {
                let now = taken + Duration::seconds(s);
                let _ = black_box(village_econ::project(&snap, &rate, now));
            }
        })
    });
}

criterion_group!(benches, bench_project);
criterion_main!(benches);
