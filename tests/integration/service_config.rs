use std::collections::HashMap;

use anyhow::Result;
use hackbatch_core::config::BatcherConfig;
use hackbatch_core::StandardFormulas;
use hackbatch_engine::RunLoop;

use crate::*;

/// A partial config file overrides only what it names.
#[test]
fn test_config_file_partial_override() -> Result<()> {
    let dir = scratch_dir("partial");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        "[target]\nname = \"joesguns\"\n\n[run]\ninfinite = false\nbatches_per_round = 3\n",
    )?;

    let config = BatcherConfig::load_file(&path)?;

    assert_eq!(config.target.name, "joesguns");
    assert!(!config.run.infinite);
    assert_eq!(config.run.batches_per_round, 3);
    assert_eq!(config.policy.settle_gap_ms, 50.0);
    assert_eq!(config.pool.home_name, "home");
    assert_eq!(config.scripts.weaken, "batcher/weaken.js");

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

/// A broken file is an error rather than silently falling back.
#[test]
fn test_config_file_parse_error() -> Result<()> {
    let dir = scratch_dir("broken");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.toml");
    std::fs::write(&path, "[run\ninfinite = ")?;

    assert!(BatcherConfig::load_file(&path).is_err());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

/// Environment-style overrides win over file values.
#[test]
fn test_overrides_win_over_file() -> Result<()> {
    let mut config: BatcherConfig = toml::from_str("[run]\ncycle_pause_ms = 250.0\n")?;
    let env: HashMap<&str, &str> = [
        ("HACKBATCH_RUN__CYCLE_PAUSE_MS", "500"),
        ("HACKBATCH_POOL__HOME_MAX_FRACTION", "0.5"),
        ("HACKBATCH_RUN__INFINITE", "false"),
    ]
    .into_iter()
    .collect();

    config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

    assert_eq!(config.run.cycle_pause_ms, 500.0);
    assert_eq!(config.pool.home_max_fraction, 0.5);
    assert!(!config.run.infinite);
    Ok(())
}

/// A loaded config drives the run: its batch count and scripts are used.
#[tokio::test]
async fn test_config_drives_run() -> Result<()> {
    let dir = scratch_dir("drives");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        "[target]\nname = \"n00dles\"\n\n[run]\ninfinite = false\nbatches_per_round = 3\n\n\
         [scripts]\nhack = \"h.js\"\ngrow = \"g.js\"\nweaken = \"w.js\"\n",
    )?;
    let config = BatcherConfig::load_file(&path)?;

    let host = sim(&[("pserv-0", 1_000_000.0)], prepared()).with_scripts(config.scripts.clone());
    let report = RunLoop::new(&host, &StandardFormulas, &config).run().await?;

    assert_eq!(report.cycles_composed, 3);
    assert_eq!(report.jobs_launched, 12);
    assert_eq!(host.launches()[0].request.script, "h.js");

    // The report is what the daemon prints.
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["cycles_composed"], 3);
    assert_eq!(json["target"], "n00dles");

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
