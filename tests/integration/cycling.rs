use anyhow::Result;
use hackbatch_core::OperationKind::{Grow as G, Hack as H, Weaken as W};
use hackbatch_core::StandardFormulas;
use hackbatch_engine::{Composer, Host, Planner, RunLoop, RunState};

use crate::*;

/// An unprepared target is weakened and grown before the first HWGW cycle.
#[tokio::test]
async fn test_prepare_then_cycle_order() -> Result<()> {
    let host = sim(&[("pserv-0", 1_000_000.0)], unprepared());
    let config = one_round(2);

    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.prepare_jobs, 3);
    assert_eq!(report.cycles_composed, 2);
    assert_eq!(report.jobs_launched, 11);
    assert_eq!(
        launched_kinds(&host),
        vec![W, G, W, H, W, G, W, H, W, G, W]
    );
    Ok(())
}

/// One cycle against a prepared target lands back on min security and
/// full resource.
#[tokio::test]
async fn test_single_cycle_restores_target() -> Result<()> {
    let host = fixed_sim(&[("pserv-0", 1_000_000.0)], prepared());
    let config = one_round(1);

    let mut run = RunLoop::new(&host, &FixedTimes, &config);
    let report = run.run().await?;
    assert_eq!(run.state(), RunState::Terminated);
    assert_eq!(report.jobs_launched, 4);
    assert_eq!(report.skipped_jobs, 0);

    // Let everything land.
    host.advance(1e9);
    assert_eq!(host.in_flight(), 0);
    assert_eq!(host.completed(), 4);

    let after = host.target_state(TARGET)?;
    assert_eq!(after.security, after.min_security);
    assert_eq!(after.resource, after.max_resource);
    Ok(())
}

/// Jobs of a cycle land one settle gap apart, in HWGW order. The longest
/// job starts at once and the others wait for their slot.
#[tokio::test]
async fn test_cycle_launch_delays() -> Result<()> {
    let host = fixed_sim(&[("pserv-0", 1_000_000.0)], prepared());
    let config = one_round(1);
    let gap = config.policy.settle_gap_ms;

    RunLoop::new(&host, &FixedTimes, &config).run().await?;

    let launches = host.launches();
    assert_eq!(launched_kinds(&host), vec![H, W, G, W]);
    let delays: Vec<f64> = launches.iter().map(|l| l.request.delay_ms).collect();
    assert_eq!(delays[0], 0.0);
    assert_eq!(delays[1], 0.0);
    assert!((delays[2] - (FixedTimes::WEAKEN_MS + gap - FixedTimes::GROW_MS)).abs() < 1e-6);
    assert!((delays[3] - 2.0 * gap).abs() < 1e-6);

    let ends: Vec<f64> = launches
        .iter()
        .map(|l| l.at_ms + l.request.delay_ms + FixedTimes::duration_of(l.kind))
        .collect();
    assert!(ends[1] - ends[0] >= gap);
    for pair in ends[1..].windows(2) {
        assert!((pair[1] - pair[0] - gap).abs() < 1e-6, "ends {ends:?}");
    }
    Ok(())
}

/// Later cycles are planned from a fresh snapshot when chaining is off.
#[tokio::test]
async fn test_unchained_round() -> Result<()> {
    let host = sim(&[("pserv-0", 1_000_000.0)], prepared());
    let mut config = one_round(2);
    config.run.chain_speculative = false;

    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.cycles_composed, 2);
    assert_eq!(report.jobs_launched, 8);
    Ok(())
}

/// No new cycle is composed while the pending list is at its limit.
#[tokio::test]
async fn test_pending_limit_bounds_round() -> Result<()> {
    let host = sim(&[("pserv-0", 1_000_000.0)], prepared());
    let mut config = one_round(5);
    config.run.max_pending_jobs = 4;

    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.cycles_composed, 1);
    Ok(())
}

/// A round stops queueing once the pool cannot hold another cycle next to
/// the ones already queued.
#[tokio::test]
async fn test_round_capped_by_pool_capacity() -> Result<()> {
    let config = one_round(10);
    let sizing_host = sim(&[("pserv-0", 1_000_000.0)], prepared());
    let actor = sizing_host.actor();
    let composer = Composer::new(Planner::new(&StandardFormulas, &actor, &config.policy));
    let (cycle, _) = composer.compose_cycle(prepared(), 0.0);
    let per_cycle =
        cycle.capacity_needed(|kind| sizing_host.unit_cost(kind.script(&config.scripts)));
    assert!(per_cycle > 0.0);

    let host = sim(&[("pserv-0", 2.5 * per_cycle)], prepared());
    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.cycles_composed, 2);
    assert_eq!(report.jobs_launched, 8);
    assert_eq!(report.stalls, 0);
    Ok(())
}
