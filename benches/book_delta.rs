use bookheat_rs::engine::book::Book;
use bookheat_rs::history::{History, HistoryConfig};
use bookheat_rs::market_data::adapters::bybit::Bybit;
use bookheat_rs::market_data::adapters::{Adapter, VenueAdapter};
use bookheat_rs::settings::ReconnectConfig;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Side = Vec<(f64, f64)>;

fn ladder(mid: f64, depth: usize, step: f64) -> (Side, Side) {
    let bids = (1..=depth).map(|i| (mid - i as f64 * step, 1.0 + i as f64)).collect();
    let asks = (1..=depth).map(|i| (mid + i as f64 * step, 1.0 + i as f64)).collect();
    (bids, asks)
}

// Deltas touching random levels near the top; roughly one in five removes
fn deltas(rng: &mut StdRng, count: usize, levels: usize, mid: f64, step: f64) -> Vec<(Side, Side)> {
    let mut side = |sign: f64| -> Side {
        (0..levels)
            .map(|_| {
                let price = mid + sign * rng.gen_range(1..=60) as f64 * step;
                let size = if rng.gen_bool(0.2) { 0.0 } else { rng.gen_range(0.001..5.0) };
                (price, size)
            })
            .collect()
    };
    (0..count).map(|_| (side(-1.0), side(1.0))).collect()
}

fn bench_apply_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_delta");
    let mut rng = StdRng::seed_from_u64(7);
    let updates = deltas(&mut rng, 100, 4, 30_000.0, 0.5);

    for depth in [50usize, 200, 1000] {
        let (bids, asks) = ladder(30_000.0, depth, 0.5);
        group.bench_with_input(BenchmarkId::new("apply_delta", depth), &depth, |b, _| {
            let mut book = Book::new(true);
            book.apply_snapshot(&bids, &asks, 0, None);
            let mut i = 0usize;
            b.iter(|| {
                let (db, da) = &updates[i % updates.len()];
                black_box(book.apply_delta(black_box(db), black_box(da), i as u64, None)).ok();
                i += 1;
            });
        });
        group.bench_with_input(BenchmarkId::new("state", depth), &depth, |b, _| {
            let mut book = Book::new(true);
            book.apply_snapshot(&bids, &asks, 0, None);
            b.iter(|| black_box(book.state()));
        });
    }
    group.finish();
}

fn bench_frame_to_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_to_history");
    let mut adapter = Adapter::new(Bybit::linear("BTCUSDT", 50), ReconnectConfig::default());
    let levels = |sign: f64| {
        (1..=50)
            .map(|i| format!(r#"["{:.1}","{}"]"#, 30_000.0 + sign * i as f64 * 0.5, i))
            .collect::<Vec<_>>()
            .join(",")
    };
    let snapshot = format!(
        r#"{{"topic":"orderbook.50.BTCUSDT","type":"snapshot","ts":1,"data":{{"s":"BTCUSDT","b":[{}],"a":[{}],"u":1,"seq":1}},"cts":1}}"#,
        levels(-1.0),
        levels(1.0)
    );
    let mut history = History::new(HistoryConfig::default());

    group.bench_function("bybit_snapshot", |b| {
        b.iter(|| {
            if let Ok(Some(bookheat_rs::engine::types::MarketEvent::Book(state))) =
                adapter.handle_message(black_box(&snapshot))
            {
                history.record_book(&state);
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_apply_delta, bench_frame_to_history);
criterion_main!(benches);
