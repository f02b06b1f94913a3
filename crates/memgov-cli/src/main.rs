//! memgov - governed memory scenario runner
//!
//! The `memgov` command replays scenario files against a fresh memory
//! manager and proves the result.
//!
//! ## Commands
//!
//! - `run`: Replay a scenario and print or record its report
//! - `replay`: Re-run a recorded scenario and verify its digest
//! - `impact`: Replay a scenario, then render the impact of one item

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use memgov_core::config::GovernanceConfig;
use memgov_core::proof::{read_run_artifact, run_scenario_on, write_run_artifact};
use memgov_core::{render_impact, GovernanceContext, MemoryManager, Scenario, ScenarioRun};

#[derive(Parser)]
#[command(name = "memgov")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Governed memory scenario runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that replays a scenario.
#[derive(clap::Args, Debug, Clone)]
struct ScenarioArgs {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Governance settings (TOML)
    #[arg(long, env = "MEMGOV_CONFIG")]
    config: Option<PathBuf>,

    /// Team the scenario runs under
    #[arg(long, env = "MEMGOV_TEAM_ID", default_value = "team-default")]
    team_id: String,

    /// Project root; its last component names the project space
    #[arg(long)]
    project_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and print its report
    Run {
        #[command(flatten)]
        args: ScenarioArgs,

        /// Write `<out>/<scenario_id>/run.json` and `run.digest` instead of printing
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Re-run a scenario and compare with its recorded digest
    Replay {
        #[command(flatten)]
        args: ScenarioArgs,

        /// Root directory holding recorded runs
        #[arg(long)]
        artifacts: PathBuf,
    },

    /// Replay a scenario, then render the impact of one memory item
    Impact {
        #[command(flatten)]
        args: ScenarioArgs,

        /// Item the analysis starts from
        #[arg(long)]
        memory_id: String,

        /// Maximum link depth (default: from config)
        #[arg(long)]
        depth: Option<usize>,

        /// Maximum items reported (default: from config)
        #[arg(long)]
        max_items: Option<usize>,
    },
}

/// Printed after a run is written to disk.
#[derive(Debug, Serialize)]
struct RecordedRun {
    scenario_id: String,
    digest: String,
    path: PathBuf,
    traces: usize,
    recorded_at: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    memgov_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { args, out } => cmd_run(&args, out.as_deref()),
        Commands::Replay { args, artifacts } => cmd_replay(&args, &artifacts),
        Commands::Impact {
            args,
            memory_id,
            depth,
            max_items,
        } => cmd_impact(&args, &memory_id, depth, max_items),
    }
}

fn governance_context(args: &ScenarioArgs) -> Result<GovernanceContext> {
    let mut ctx = GovernanceContext::new(&args.team_id);
    if let Some(path) = &args.config {
        let config = GovernanceConfig::load(path)
            .with_context(|| format!("Failed to load governance config: {:?}", path))?;
        ctx = ctx.with_config(config);
    }
    if let Some(root) = &args.project_root {
        ctx = ctx.with_project_root(root);
    }
    Ok(ctx)
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    Scenario::load(path).with_context(|| format!("Failed to load scenario: {:?}", path))
}

/// Replay the scenario on a fresh manager, returning both.
fn replay(args: &ScenarioArgs) -> Result<(MemoryManager, ScenarioRun)> {
    let scenario = load_scenario(&args.scenario)?;
    let mut manager = MemoryManager::new(governance_context(args)?);
    let run = run_scenario_on(&mut manager, &scenario)
        .with_context(|| format!("Scenario {} failed", scenario.scenario_id))?;
    Ok((manager, run))
}

fn cmd_run(args: &ScenarioArgs, out: Option<&Path>) -> Result<()> {
    let (_, run) = replay(args)?;
    let Some(dir) = out else {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    };

    let path = write_run_artifact(&run, dir)
        .with_context(|| format!("Failed to write run artifact under {:?}", dir))?;
    let recorded = RecordedRun {
        scenario_id: run.scenario_id.clone(),
        digest: run.digest()?,
        path,
        traces: run.traces().len(),
        recorded_at: chrono::Utc::now().to_rfc3339(),
    };
    info!(scenario_id = %recorded.scenario_id, digest = %recorded.digest, "run recorded");
    println!("{}", serde_json::to_string_pretty(&recorded)?);
    Ok(())
}

fn cmd_replay(args: &ScenarioArgs, artifacts: &Path) -> Result<()> {
    let (_, run) = replay(args)?;
    let recorded = read_run_artifact(&run.scenario_id, artifacts).with_context(|| {
        format!(
            "Failed to read recorded run {} under {:?}",
            run.scenario_id, artifacts
        )
    })?;
    let actual = run.digest()?;
    if actual != recorded.digest {
        anyhow::bail!(
            "Replay digest mismatch for scenario {}: expected {}, got {}",
            run.scenario_id,
            recorded.digest,
            actual
        );
    }
    println!("Replay digest verified: {}", actual);
    Ok(())
}

fn cmd_impact(
    args: &ScenarioArgs,
    memory_id: &str,
    depth: Option<usize>,
    max_items: Option<usize>,
) -> Result<()> {
    let (manager, _) = replay(args)?;
    let config = manager.config();
    let depth = depth.unwrap_or(config.impact_depth);
    let max_items = max_items.unwrap_or(config.impact_max_items);
    if manager.get_item(memory_id).is_none() {
        anyhow::bail!("Memory item not found after replay: {}", memory_id);
    }
    let result = manager.compute_impact(memory_id, depth, max_items);
    for line in render_impact(&result, depth) {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_scenario(dir: &Path) -> PathBuf {
        let scenario = json!({
            "scenario_id": "cli-demo",
            "identity": {"id": "olivia", "trust_level": "owner"},
            "steps": [
                {"kind": "record", "payload": {"input": "We decided to use Rust", "output": "ok"}},
                {"kind": "recall", "payload": {}},
                {"kind": "admin", "payload": {
                    "action": "propose_rule",
                    "payload": {"text": "Only approvers can approve"}
                }}
            ]
        });
        let path = dir.join("scenario.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&scenario).unwrap()).unwrap();
        path
    }

    fn args(scenario: PathBuf) -> ScenarioArgs {
        ScenarioArgs {
            scenario,
            config: None,
            team_id: "team-1".to_string(),
            project_root: None,
        }
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "memgov",
            "--verbose",
            "run",
            "scenario.json",
            "--team-id",
            "team-9",
            "--out",
            "runs",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { args, out } => {
                assert_eq!(args.team_id, "team-9");
                assert_eq!(out, Some(PathBuf::from("runs")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_then_replay_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let runs = dir.path().join("runs");

        cmd_run(&args(scenario.clone()), Some(&runs)).unwrap();
        assert!(runs.join("cli-demo").join("run.json").exists());
        assert!(runs.join("cli-demo").join("run.digest").exists());

        cmd_replay(&args(scenario), &runs).unwrap();
    }

    #[test]
    fn test_replay_detects_changed_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let runs = dir.path().join("runs");
        cmd_run(&args(scenario.clone()), Some(&runs)).unwrap();

        let mut changed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&scenario).unwrap()).unwrap();
        changed["steps"][0]["payload"]["input"] = json!("We decided to use Go");
        std::fs::write(&scenario, serde_json::to_vec(&changed).unwrap()).unwrap();

        let err = cmd_replay(&args(scenario), &runs).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn test_replay_without_recording_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let err = cmd_replay(&args(scenario), &dir.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("Failed to read recorded run"));
    }

    #[test]
    fn test_missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(write_scenario(dir.path()));
        a.config = Some(dir.path().join("nope.toml"));
        let err = cmd_run(&a, None).unwrap_err();
        assert!(err.to_string().contains("Failed to load governance config"));
    }

    #[test]
    fn test_impact_of_unknown_item_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = write_scenario(dir.path());
        let err = cmd_impact(&args(scenario), "semantic:missing:1", None, None).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
