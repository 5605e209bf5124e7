use anyhow::Result;
use hackbatch_core::{OperationKind, StandardFormulas, TargetState};
use hackbatch_engine::RunLoop;

use crate::*;

/// Grow cannot fit beside the first weaken, so it waits until the weaken
/// lands and frees its capacity, then goes out before its end time passes.
#[tokio::test]
async fn test_stall_waits_for_capacity() -> Result<()> {
    let target = TargetState {
        security: 3.0,
        resource: 875_000.0,
        ..prepared()
    };
    let host = sim(&[("pserv-0", 75.0)], target);
    let mut config = one_round(1);
    config.policy.hack_fraction = 0.01;
    config.run.backpressure_min_ms = 10.0;
    config.run.backpressure_max_ms = 20.0;

    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.prepare_jobs, 3);
    assert!(report.stalls >= 1, "expected a stall, got {report:?}");
    assert_eq!(report.evicted_jobs, 0);
    assert_eq!(report.unplaced_jobs, 0);
    assert_eq!(report.jobs_launched, 7);

    // The grow was only fully placed after the weaken landed.
    let launches = host.launches();
    let weaken_at = launches[0].at_ms;
    let last_grow = launches
        .iter()
        .filter(|l| l.kind == OperationKind::Grow)
        .map(|l| l.at_ms)
        .last()
        .unwrap();
    assert_eq!(weaken_at, 0.0);
    assert!(last_grow > 0.0);
    Ok(())
}

/// Capacity taken by something outside the batcher never comes back, so
/// every job expires without being placed.
#[tokio::test]
async fn test_expired_jobs_are_evicted() -> Result<()> {
    let host = sim(&[("pserv-0", 100.0)], prepared());
    host.set_used("pserv-0", 100.0)?;
    let config = one_round(1);

    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.jobs_launched, 0);
    assert_eq!(report.evicted_jobs, 4);
    assert_eq!(report.unplaced_jobs, 0);
    assert!(report.stalls >= 3);
    assert!(host.launches().is_empty());
    Ok(())
}

/// A job larger than any worker is split across several.
#[tokio::test]
async fn test_job_spreads_over_workers() -> Result<()> {
    let host = sim(&[("pserv-0", 200.0), ("pserv-1", 200.0), ("pserv-2", 200.0)], prepared());
    let config = one_round(1);

    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    // ~300 hack threads need more than one 200-capacity worker.
    let hack_workers: Vec<_> = host
        .launches()
        .into_iter()
        .filter(|l| l.kind == OperationKind::Hack)
        .map(|l| l.request.worker)
        .collect();
    assert!(hack_workers.len() >= 2, "hack placed on {hack_workers:?}");
    assert!(report.threads_launched > 0);
    Ok(())
}
