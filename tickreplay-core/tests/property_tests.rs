//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Candle uniqueness — at most one live candle per timeframe, closed candles
//!    never overlap and open on aligned boundaries
//! 2. Indicator emission — EMA(1) reproduces prices, SMA(n) emits once per close
//!    from the n-th candle on
//! 3. NAV identity — nav == balance + used margin + unrealized PnL after every
//!    open, close and refresh

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tickreplay_core::candles::{CandleAggregator, MultiTimeframeAggregator};
use tickreplay_core::domain::{Candle, Order, OrderSide, OrderStatus, Tick, Timeframe};
use tickreplay_core::indicators::{Ema, Indicator, Sma};
use tickreplay_core::orderbook::{OrderbookConfig, OrderbookEngine};

// ── Strategies (proptest) ────────────────────────────────────────────

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Strictly increasing tick stream with gaps of 1s to 3h.
fn arb_ticks() -> impl proptest::strategy::Strategy<Value = Vec<Tick>> {
    prop::collection::vec((1i64..10_800, 1.0..100_000.0_f64), 1..300).prop_map(|steps| {
        let mut t = base();
        steps
            .into_iter()
            .map(|(gap, price)| {
                t += Duration::seconds(gap);
                Tick::new(t, price).unwrap()
            })
            .collect()
    })
}

fn closed_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let date = base() + Duration::minutes(i as i64);
            Candle::open_at("TEST", "prop", Timeframe::OneMinute, date, close)
        })
        .collect()
}

fn arb_timeframe() -> impl proptest::strategy::Strategy<Value = Timeframe> {
    prop::sample::select(Timeframe::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Op {
    Open(OrderSide, f64),
    CloseFirst,
    Refresh(f64),
}

fn arb_ops() -> impl proptest::strategy::Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        (any::<bool>(), 0.01..5.0_f64).prop_map(|(buy, v)| {
            Op::Open(if buy { OrderSide::Buy } else { OrderSide::Sell }, v)
        }),
        Just(Op::CloseFirst),
        (50.0..150.0_f64).prop_map(Op::Refresh),
    ];
    prop::collection::vec(op, 1..80)
}

// ── 1. Candle uniqueness ─────────────────────────────────────────────

proptest! {
    #[test]
    fn one_live_candle_and_no_overlap(ticks in arb_ticks(), tf in arb_timeframe()) {
        let mut agg = CandleAggregator::new("TEST", "prop", tf);
        let mut closed = Vec::new();
        for tick in &ticks {
            if let Some(c) = agg.on_tick(tick) {
                prop_assert!(tick.date() >= c.close_time);
                closed.push(c);
            }
            let live = agg.live().unwrap();
            prop_assert!(live.open_time <= tick.date() && tick.date() < live.close_time);
            prop_assert_eq!(live.open_time, tf.align(live.open_time));
        }
        for pair in closed.windows(2) {
            prop_assert!(pair[0].close_time <= pair[1].open_time);
        }
        let total_volume: f64 = closed.iter().map(|c| c.volume).sum::<f64>()
            + agg.live().map(|c| c.volume).unwrap_or(0.0);
        prop_assert_eq!(total_volume as usize, ticks.len());
    }

    #[test]
    fn multi_timeframe_keeps_one_live_each(ticks in arb_ticks()) {
        let tfs = [Timeframe::OneMinute, Timeframe::OneHour, Timeframe::OneDay];
        let mut agg = MultiTimeframeAggregator::new("TEST", "prop", &tfs);
        for tick in &ticks {
            agg.on_tick(tick);
            for tf in tfs {
                let live = agg.live(tf).unwrap();
                prop_assert!(live.open_time <= tick.date() && tick.date() < live.close_time);
            }
        }
    }
}

// ── 2. Indicator emission ────────────────────────────────────────────

proptest! {
    #[test]
    fn ema_1_equals_prices(prices in prop::collection::vec(0.01..1e6_f64, 1..100)) {
        let mut ema = Ema::new(1);
        for candle in closed_candles(&prices) {
            let v = ema.update(&candle).unwrap().value;
            prop_assert!((v - candle.close).abs() <= 1e-9 * candle.close.abs().max(1.0));
        }
    }

    #[test]
    fn sma_emits_from_nth_close(prices in prop::collection::vec(0.01..1e6_f64, 0..60), n in 1usize..10) {
        let mut sma = Sma::new(n);
        let emitted = closed_candles(&prices)
            .iter()
            .filter_map(|c| sma.update(c))
            .count();
        prop_assert_eq!(emitted, prices.len().saturating_sub(n - 1));
    }
}

// ── 3. NAV identity ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn nav_identity_holds(ops in arb_ops(), leverage in 1.0..10.0_f64) {
        let cfg = OrderbookConfig::new(10_000.0, leverage).with_ratios(0.1, 0.3);
        let mut book = OrderbookEngine::new(cfg).unwrap();
        let mut minute = 0;
        book.refresh(&Tick::new(base(), 100.0).unwrap());

        for op in ops {
            match op {
                Op::Open(side, volume) => {
                    book.open(Order::new("TEST", side, volume));
                }
                Op::CloseFirst => {
                    let first = book.open_orders().next().map(|o| o.id.clone());
                    if let Some(id) = first {
                        prop_assert!(book.close(&id).is_ok());
                    }
                }
                Op::Refresh(price) => {
                    minute += 1;
                    book.refresh(&Tick::new(base() + Duration::minutes(minute), price).unwrap());
                }
            }
            let s = book.state();
            let identity = s.balance + s.used_margin + s.unrealized_pnl;
            prop_assert!((s.nav - identity).abs() < 1e-6 * s.nav.abs().max(1.0));
            prop_assert!(book.orders().all(|o| o.status != OrderStatus::Cancelled));
        }
    }
}
