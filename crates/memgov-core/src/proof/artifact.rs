//! Run reports on disk.
//!
//! A run is written to `<dir>/<scenario_id>/run.json` with a companion
//! `<dir>/<scenario_id>/run.digest` holding [`ScenarioRun::digest`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::error::ScenarioError;
use super::runner::ScenarioRun;
use crate::digest::compute_digest;
use crate::error::Result;

pub const RUN_FILE: &str = "run.json";
pub const DIGEST_FILE: &str = "run.digest";

/// A verified run report and its recorded digest.
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifact {
    pub run: ScenarioRun,
    pub digest: String,
}

/// Write the report and its digest. Returns the path to `run.json`.
pub fn write_run_artifact(run: &ScenarioRun, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&run.scenario_id);
    std::fs::create_dir_all(&run_dir)?;

    let run_path = run_dir.join(RUN_FILE);
    let json = serde_json::to_vec_pretty(run)?;
    std::fs::write(&run_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), run.digest()?.as_bytes())?;
    Ok(run_path)
}

/// The digest recorded next to a run, trimmed.
pub fn read_recorded_digest(scenario_id: &str, dir: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(dir.join(scenario_id).join(DIGEST_FILE))?;
    Ok(raw.trim().to_string())
}

/// Read a report back and check it against its recorded digest.
///
/// The digest is re-derived from the JSON as stored, so a hand-edited
/// `run.json` is caught even when it still parses.
pub fn read_run_artifact(scenario_id: &str, dir: &Path) -> Result<RunArtifact> {
    let recorded = read_recorded_digest(scenario_id, dir)?;
    let bytes = std::fs::read(dir.join(scenario_id).join(RUN_FILE))?;
    let value: Value = serde_json::from_slice(&bytes)?;
    let actual = compute_digest(&value)?;
    if actual != recorded {
        return Err(ScenarioError::DigestMismatch {
            expected: recorded,
            actual,
        }
        .into());
    }
    let run: ScenarioRun = serde_json::from_value(value)?;
    Ok(RunArtifact {
        run,
        digest: recorded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovernanceContext;
    use crate::error::GovernanceError;
    use crate::proof::{run_scenario, Scenario, ScenarioStep};
    use tempfile::tempdir;

    fn sample_run() -> ScenarioRun {
        let scenario = Scenario::new("sample")
            .with_step(ScenarioStep::record("I prefer tea", "Noted"))
            .with_step(ScenarioStep::recall(None));
        run_scenario(&scenario, GovernanceContext::new("team-1")).unwrap()
    }

    #[test]
    fn test_write_then_read_verifies() {
        let dir = tempdir().unwrap();
        let run = sample_run();
        let path = write_run_artifact(&run, dir.path()).unwrap();
        assert!(path.ends_with("sample/run.json"));

        let artifact = read_run_artifact("sample", dir.path()).unwrap();
        assert_eq!(artifact.digest, run.digest().unwrap());
        assert_eq!(artifact.run.scenario_id, "sample");
    }

    #[test]
    fn test_tampered_report_is_rejected() {
        let dir = tempdir().unwrap();
        let run = sample_run();
        let path = write_run_artifact(&run, dir.path()).unwrap();

        let mut value: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        value["scenario_name"] = Value::String("edited".into());
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        let err = read_run_artifact("sample", dir.path()).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Scenario(ScenarioError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let dir = tempdir().unwrap();
        let err = read_run_artifact("absent", dir.path()).unwrap_err();
        assert!(matches!(err, GovernanceError::Io(_)));
    }
}
