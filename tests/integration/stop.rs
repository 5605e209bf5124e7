use std::sync::Arc;

use anyhow::Result;
use hackbatch_core::config::BatcherConfig;
use hackbatch_core::StandardFormulas;
use hackbatch_engine::{Host, RunLoop, RunState};
use tokio::sync::broadcast;

use crate::*;

fn infinite() -> BatcherConfig {
    let mut config = BatcherConfig::default();
    config.target.name = TARGET.to_string();
    config.run.batches_per_round = 1;
    config
}

/// A stop request that is already waiting means nothing is composed.
#[tokio::test]
async fn test_stop_before_start() -> Result<()> {
    let host = sim(&[("pserv-0", 1_000_000.0)], prepared());
    let config = infinite();
    let (tx, rx) = broadcast::channel(1);
    tx.send(())?;

    let mut run = RunLoop::new(&host, &StandardFormulas, &config).with_shutdown(rx);
    let report = run.run().await?;

    assert!(report.stopped);
    assert_eq!(report.cycles_composed, 0);
    assert_eq!(run.state(), RunState::Terminated);
    assert!(host.launches().is_empty());
    Ok(())
}

/// A stop request queued before the run starts also skips preparation.
#[tokio::test]
async fn test_stop_before_prepare() -> Result<()> {
    let host = sim(&[("pserv-0", 1_000_000.0)], unprepared());
    let config = infinite();
    let (tx, rx) = broadcast::channel(1);
    tx.send(())?;

    let mut run = RunLoop::new(&host, &StandardFormulas, &config).with_shutdown(rx);
    let report = run.run().await?;

    assert!(report.stopped);
    assert_eq!(report.prepare_jobs, 0);
    assert_eq!(report.cycles_composed, 0);
    assert!(host.launches().is_empty());
    assert_eq!(report.final_state, Some(unprepared()));
    Ok(())
}

/// An infinite run keeps cycling until told to stop, and leaves its
/// launched work running.
#[tokio::test]
async fn test_stop_infinite_run() -> Result<()> {
    let host = Arc::new(sim(&[("pserv-0", 1_000_000.0)], prepared()));
    let config = infinite();
    let (tx, rx) = broadcast::channel(1);

    let watcher = {
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            while host.now_ms() < 60_000.0 {
                tokio::task::yield_now().await;
            }
            let _ = tx.send(());
        })
    };

    let mut run = RunLoop::new(host.as_ref(), &StandardFormulas, &config).with_shutdown(rx);
    let report = run.run().await?;
    watcher.await?;

    assert!(report.stopped);
    assert!(report.cycles_composed > 1, "only {} cycles", report.cycles_composed);
    assert_eq!(run.state(), RunState::Terminated);

    // Nothing was cancelled: the latest cycles are still in flight.
    let launched = host.launches().len();
    assert!(host.in_flight() > 0);
    host.advance(1e9);
    assert_eq!(host.in_flight(), 0);
    assert_eq!(host.launches().len(), launched);
    Ok(())
}

/// Dropping the sender is not a stop request.
#[tokio::test]
async fn test_closed_channel_does_not_stop() -> Result<()> {
    let host = sim(&[("pserv-0", 1_000_000.0)], prepared());
    let mut config = one_round(2);
    config.run.infinite = false;
    let (tx, rx) = broadcast::channel::<()>(1);
    drop(tx);

    let report = RunLoop::new(&host, &StandardFormulas, &config)
        .with_shutdown(rx)
        .run()
        .await?;

    assert!(!report.stopped);
    assert_eq!(report.cycles_composed, 2);
    Ok(())
}

/// Rounds that queue more work than a pause lets land must not push start
/// delays further out on every round.
#[tokio::test]
async fn test_infinite_run_delays_stay_bounded() -> Result<()> {
    let host = Arc::new(fixed_sim(&[("pserv-0", 1_000_000.0)], prepared()));
    let mut config = infinite();
    config.run.batches_per_round = 10;
    config.run.cycle_pause_ms = 1000.0;
    let (tx, rx) = broadcast::channel(1);

    let watcher = {
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            while host.now_ms() < 200_000.0 {
                tokio::task::yield_now().await;
            }
            let _ = tx.send(());
        })
    };

    let report = RunLoop::new(host.as_ref(), &FixedTimes, &config)
        .with_shutdown(rx)
        .run()
        .await?;
    watcher.await?;

    assert!(report.stopped);
    assert!(report.cycles_composed > 100, "only {} cycles", report.cycles_composed);

    let round_span = 10.0 * 4.0 * config.policy.settle_gap_ms;
    let window = FixedTimes::WEAKEN_MS + round_span + config.run.cycle_pause_ms;
    let launches = host.launches();
    let latest = launches
        .iter()
        .map(|l| l.request.delay_ms)
        .fold(0.0, f64::max);
    assert!(latest < window, "delay {latest} past window {window}");
    assert!(host.in_flight() < 4 * 10 * 10);
    Ok(())
}
