//! Analytic consumers: VWAP, health, volatility, volume (spec.md §1 calls
//! these "external collaborators" whose only specified interface is
//! `bus.subscribe`). Implemented here as complete, self-contained
//! reference consumers, grounded verbatim in
//! `original_source/services/processor/consumer.py`.
//!
//! None of these carry forensics-grade invariants; their only
//! contractual behavior is "don't panic on malformed numeric fields"
//! (spec.md §7: "Missing/invalid numeric fields → skip event").

use crate::bus::Bus;
use crate::event::Event;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

fn percentile(sorted_vals: &[i64], p: f64) -> f64 {
    if sorted_vals.is_empty() {
        return 0.0;
    }
    let k = ((p / 100.0) * (sorted_vals.len() - 1) as f64).round() as usize;
    let k = k.min(sorted_vals.len() - 1);
    sorted_vals[k] as f64
}

fn now_ms() -> i64 {
    // chrono::Utc::now() is the crate's one clock source (see `flight_recorder`,
    // `integrity`); reused here rather than introducing a second time API.
    chrono::Utc::now().timestamp_millis()
}

fn numeric_fields(event: &Event) -> Option<(String, f64, f64, i64, i64)> {
    let symbol = crate::event::get_str(event, "product_id")
        .unwrap_or("UNKNOWN")
        .to_owned();
    let price = event.get("price")?.as_f64()?;
    let size = event.get("last_size")?.as_f64()?;
    let ingest_ts = event.get("ingest_ts_ms").and_then(|v| v.as_i64()).unwrap_or(0);
    let recv_ts = event.get("recv_ts_ms").and_then(|v| v.as_i64()).unwrap_or(0);
    Some((symbol, price, size, ingest_ts, recv_ts))
}

/// Rolling per-symbol VWAP over the last `window_n` samples, plus
/// exchange-to-now / recv-to-now latency percentiles, logged every
/// `print_every_s`.
pub async fn vwap(bus: Bus, window_n: usize, print_every_s: Duration) {
    let sub = bus.subscribe(1000);
    let mut windows: BTreeMap<String, VecDeque<(f64, f64)>> = BTreeMap::new();
    let mut ages_ms: VecDeque<i64> = VecDeque::new();
    let mut pipes_ms: VecDeque<i64> = VecDeque::new();
    let mut last_print = tokio::time::Instant::now();

    loop {
        let event = sub.recv().await;
        let Some((symbol, price, size, ingest_ts, recv_ts)) = numeric_fields(&event) else {
            continue;
        };
        if price <= 0.0 || size < 0.0 || ingest_ts <= 0 {
            continue;
        }

        let window = windows.entry(symbol).or_default();
        window.push_back((price, size));
        while window.len() > window_n {
            window.pop_front();
        }

        let now = now_ms();
        ages_ms.push_back((now - ingest_ts).max(0));
        while ages_ms.len() > 3000 {
            ages_ms.pop_front();
        }
        if recv_ts > 0 {
            pipes_ms.push_back((now - recv_ts).max(0));
            while pipes_ms.len() > 3000 {
                pipes_ms.pop_front();
            }
        }

        if last_print.elapsed() >= print_every_s {
            let vwaps: Vec<String> = windows
                .iter()
                .filter(|(_, w)| !w.is_empty())
                .map(|(sym, w)| {
                    let num: f64 = w.iter().map(|(p, s)| p * s).sum();
                    let den: f64 = w.iter().map(|(_, s)| s).sum();
                    let vwap = if den > 0.0 { num / den } else { 0.0 };
                    format!("{sym}={vwap:.2}")
                })
                .collect();

            let mut ages_sorted: Vec<i64> = ages_ms.iter().copied().collect();
            ages_sorted.sort_unstable();
            let mut pipes_sorted: Vec<i64> = pipes_ms.iter().copied().collect();
            pipes_sorted.sort_unstable();

            tracing::info!(
                target: "mercurystream::vwap",
                vwap = %vwaps.join(" | "),
                age_p99_ms = percentile(&ages_sorted, 99.0),
                pipe_p99_ms = percentile(&pipes_sorted, 99.0),
                drops = bus.drops(),
                "vwap snapshot"
            );
            last_print = tokio::time::Instant::now();
        }
    }
}

/// Throughput, last traded price, drops and queue depths.
pub async fn health(bus: Bus, print_every_s: Duration) {
    let sub = bus.subscribe(1000);
    let mut last_print = tokio::time::Instant::now();
    let mut count = 0u64;
    let mut last_price: Option<f64> = None;

    loop {
        let event = sub.recv().await;
        count += 1;
        if let Some(price) = event.get("price").and_then(|v| v.as_f64()) {
            last_price = Some(price);
        }

        let elapsed = last_print.elapsed();
        if elapsed >= print_every_s {
            let eps = count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                target: "mercurystream::health",
                events_per_sec = eps,
                last_price,
                drops = bus.drops(),
                subscribers = bus.subscriber_count(),
                queue_depths = ?bus.queue_depths(),
                "health snapshot"
            );
            count = 0;
            last_print = tokio::time::Instant::now();
        }
    }
}

/// Annualized volatility from log returns over a `window_n`-sample
/// rolling window per symbol (assumes ~1 tick/sec, matching the
/// source's `sqrt(86400 * 365)` annualization factor).
pub async fn volatility(bus: Bus, window_n: usize, print_every_s: Duration) {
    let sub = bus.subscribe(1000);
    let mut last_prices: BTreeMap<String, f64> = BTreeMap::new();
    let mut returns: BTreeMap<String, VecDeque<f64>> = BTreeMap::new();
    let mut last_print = tokio::time::Instant::now();

    loop {
        let event = sub.recv().await;
        let symbol = crate::event::get_str(&event, "product_id")
            .unwrap_or("UNKNOWN")
            .to_owned();
        let Some(price) = event.get("price").and_then(|v| v.as_f64()) else {
            continue;
        };
        if price <= 0.0 {
            continue;
        }

        if let Some(&last) = last_prices.get(&symbol) {
            if last > 0.0 {
                let log_return = (price / last).ln();
                let window = returns.entry(symbol.clone()).or_default();
                window.push_back(log_return);
                while window.len() > window_n {
                    window.pop_front();
                }
            }
        }
        last_prices.insert(symbol, price);

        if last_print.elapsed() >= print_every_s {
            let mut vols = Vec::new();
            for (sym, r) in &returns {
                if r.len() < 10 {
                    continue;
                }
                let mean = r.iter().sum::<f64>() / r.len() as f64;
                let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / r.len() as f64;
                let std = if var > 0.0 { var.sqrt() } else { 0.0 };
                let annual_vol = std * (86_400.0 * 365.0).sqrt() * 100.0;
                vols.push(format!("{sym}={annual_vol:.1}%"));
            }
            if !vols.is_empty() {
                tracing::info!(target: "mercurystream::volatility", volatility = %vols.join(" | "), "volatility snapshot");
            }
            last_print = tokio::time::Instant::now();
        }
    }
}

/// Notional USD volume/minute and trade count per symbol over a
/// resetting window.
pub async fn volume(bus: Bus, print_every_s: Duration) {
    let sub = bus.subscribe(1000);
    let mut volumes: BTreeMap<String, f64> = BTreeMap::new();
    let mut trades: BTreeMap<String, u64> = BTreeMap::new();
    let mut last_print = tokio::time::Instant::now();
    let mut window_start = tokio::time::Instant::now();

    loop {
        let event = sub.recv().await;
        let symbol = crate::event::get_str(&event, "product_id")
            .unwrap_or("UNKNOWN")
            .to_owned();
        let (Some(price), Some(size)) = (
            event.get("price").and_then(|v| v.as_f64()),
            event.get("last_size").and_then(|v| v.as_f64()),
        ) else {
            continue;
        };
        if price <= 0.0 || size <= 0.0 {
            continue;
        }

        *volumes.entry(symbol.clone()).or_insert(0.0) += size * price;
        *trades.entry(symbol).or_insert(0) += 1;

        if last_print.elapsed() >= print_every_s {
            let window_secs = window_start.elapsed().as_secs_f64();
            let mut lines = Vec::new();
            for (sym, vol_usd) in &volumes {
                let trade_count = trades.get(sym).copied().unwrap_or(0);
                let vol_per_min = if window_secs > 0.0 {
                    (vol_usd / window_secs) * 60.0
                } else {
                    0.0
                };
                lines.push(format!(
                    "{sym}=${:.1}K/min({trade_count}tx)",
                    vol_per_min / 1000.0
                ));
            }
            if !lines.is_empty() {
                tracing::info!(target: "mercurystream::volume", volume = %lines.join(" | "), "volume snapshot");
            }
            volumes.clear();
            trades.clear();
            window_start = tokio::time::Instant::now();
            last_print = tokio::time::Instant::now();
        }
    }
}
