use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use scanrep_core::encoder::{TICKS_PER_REV, Unwrapper, unwrap_delta};

// Raw readings of a carriage sweeping back and forth across many wraps
fn synth_raws(n: usize, max_step: i64, seed: u32) -> Vec<u16> {
    // tiny PRNG
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    let mut angle: i64 = 0;
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let dir = if (i / 5_000) % 2 == 0 { 1 } else { -1 };
        let step = i64::from(next() % (max_step as u32 + 1));
        angle = (angle + dir * step).rem_euclid(TICKS_PER_REV);
        v.push(angle as u16);
    }
    v
}

pub fn bench_unwrap(c: &mut Criterion) {
    let mut g = c.benchmark_group("unwrap");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p scanrep_core --bench unwrap
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let raws = synth_raws(50_000, 400, 0xC0FFEE);

    g.bench_function("delta_only", |b| {
        b.iter(|| {
            let mut acc = 0i64;
            for w in raws.windows(2) {
                acc += unwrap_delta(black_box(w[0]), black_box(w[1]));
            }
            black_box(acc);
        })
    });

    g.bench_function("unwrapper_update", |b| {
        b.iter_batched(
            || Unwrapper::new(raws[0]),
            |mut u| {
                for &raw in &raws[1..] {
                    black_box(u.update(black_box(raw)));
                }
                black_box(u.relative());
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(unwrap, bench_unwrap);
criterion_main!(unwrap);
