//! Criterion benchmarks for the tick loop hot paths.
//!
//! Benchmarks:
//! 1. Full strategy cascade over one-minute ticks
//! 2. Multi-timeframe candle aggregation
//! 3. Orderbook refresh with open orders carrying TP/SL
//! 4. Indicator pipeline on candle close

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tickreplay_core::candles::MultiTimeframeAggregator;
use tickreplay_core::domain::{Candle, Order, Tick, Timeframe};
use tickreplay_core::indicators::{IndicatorPipeline, IndicatorSpec};
use tickreplay_core::orderbook::{OrderbookConfig, OrderbookEngine};
use tickreplay_core::strategy::{Strategy, StrategyConfig, StrategyContext, StrategyState, TimeframeConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_ticks(n: usize) -> Vec<Tick> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.01).sin() * 10.0;
            Tick::new(base + Duration::minutes(i as i64), price).unwrap()
        })
        .collect()
}

fn indicator_specs() -> Vec<IndicatorSpec> {
    vec![
        IndicatorSpec::Sma { period: 20, key: None },
        IndicatorSpec::Ema { period: 50, key: None },
        IndicatorSpec::Velocity { window: 10, key: None },
        IndicatorSpec::Acceleration { window: 10, key: None },
        IndicatorSpec::Volatility { window: 20, key: None },
    ]
}

/// Flips between long and flat on every closed hourly candle.
struct Flipper;

impl Strategy for Flipper {
    fn on_tick(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    fn on_candle_close(&mut self, ctx: &mut StrategyState, _candle: &Candle) {
        if ctx.open_orders().is_empty() {
            ctx.buy(1.0);
        } else {
            ctx.close_all();
        }
    }
}

// ── 1. Strategy cascade ──────────────────────────────────────────────

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_cascade");

    for &days in &[1usize, 7, 30] {
        let ticks = make_ticks(days * 1440);
        let mut tf = TimeframeConfig::new(Timeframe::OneHour);
        for spec in indicator_specs() {
            tf = tf.with_indicator(spec);
        }
        let config = StrategyConfig::new("bench", "BENCH", OrderbookConfig::new(100_000.0, 3.0))
            .with_timeframe(tf);

        group.bench_with_input(BenchmarkId::new("flipper_1h", days), &days, |b, _| {
            b.iter(|| {
                let mut ctx = StrategyContext::new(&config, Box::new(Flipper)).unwrap();
                ctx.setup();
                for tick in &ticks {
                    ctx.on_tick(black_box(tick));
                }
                ctx.finish()
            });
        });
    }

    group.finish();
}

// ── 2. Candle aggregation ────────────────────────────────────────────

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("candle_aggregation");
    let ticks = make_ticks(10_080);

    group.bench_function("all_timeframes_1_week", |b| {
        b.iter(|| {
            let mut agg = MultiTimeframeAggregator::new("BENCH", "bench", &Timeframe::ALL);
            let mut closed = 0usize;
            for tick in &ticks {
                closed += agg.on_tick(black_box(tick)).len();
            }
            closed
        });
    });

    group.finish();
}

// ── 3. Orderbook refresh ─────────────────────────────────────────────

fn bench_orderbook(c: &mut Criterion) {
    let mut group = c.benchmark_group("orderbook");
    let ticks = make_ticks(1_440);

    group.bench_function("refresh_50_open_1_day", |b| {
        b.iter(|| {
            let mut book = OrderbookEngine::new(OrderbookConfig::new(1_000_000.0, 5.0)).unwrap();
            book.refresh(&ticks[0]);
            for i in 0..50 {
                let spread = 20.0 + i as f64 * 0.1;
                book.open(
                    Order::buy("BENCH", 10.0)
                        .with_take_profit(100.0 + spread)
                        .with_stop_loss(100.0 - spread),
                );
            }
            for tick in &ticks {
                book.refresh(black_box(tick));
            }
            book.nav()
        });
    });

    group.finish();
}

// ── 4. Indicator pipeline ────────────────────────────────────────────

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicator_pipeline");
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles: Vec<Candle> = (0..5_000)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.05).cos() * 5.0;
            Candle::open_at(
                "BENCH",
                "bench",
                Timeframe::OneMinute,
                base + Duration::minutes(i),
                price,
            )
        })
        .collect();

    group.bench_function("five_indicators_5000_candles", |b| {
        b.iter(|| {
            let mut pipeline =
                IndicatorPipeline::from_specs(Timeframe::OneMinute, 500, &indicator_specs());
            for candle in &candles {
                pipeline.on_candle_close(black_box(candle.clone()));
            }
            pipeline.latest("ema_50")
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_cascade,
    bench_aggregation,
    bench_orderbook,
    bench_pipeline,
);
criterion_main!(benches);
