//! End-to-end: exported rollouts -> training epochs -> checkpoints -> resume
//!
//! Writes rollout files the way the simulator exports them, runs the
//! training loop, and checks what lands in the model directory.

use std::{fs, path::Path};

use anyhow::Result;
use carai_trainer::{
    checkpoint::{self, FORMAT_VERSION},
    train::{RunOutcome, RunSummary, TrainerConfig, TrainingRunner},
};

const OBS_DIM: usize = 6;
const STEPS_PER_FILE: usize = 50;

fn rollout_json(obs_dim: usize, steps: usize, seed: usize) -> String {
    let experiences: Vec<String> = (0..steps)
        .map(|t| {
            let state: Vec<String> =
                (0..obs_dim).map(|i| format!("{:.3}", ((t + i + seed) % 7) as f32 / 7.0)).collect();
            let steer = if (t + seed) % 2 == 0 { 0.4 } else { -0.4 };
            format!(
                r#"{{"state": [{}], "action": {{"steer": {}, "throttle": 0.9, "brake": 0.0}},
                   "reward": {}, "done": {}, "log_prob": -2.7, "value": 0.0,
                   "advantage": 0.0, "return": 0.0, "agent_index": {}}}"#,
                state.join(", "),
                steer,
                if steer > 0.0 { 0.5 } else { -0.1 },
                (t + 1) % 25 == 0,
                seed
            )
        })
        .collect();
    format!(
        r#"{{"experiences": [{}], "num_experiences": {}, "timestamp": "2024-01-01T00:00:00"}}"#,
        experiences.join(","),
        steps
    )
}

fn write_exports(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("rollout_0_a.json"), rollout_json(OBS_DIM, STEPS_PER_FILE, 0))?;
    fs::write(dir.join("rollout_1_a.json"), rollout_json(OBS_DIM, STEPS_PER_FILE, 1))?;
    // Different observation width: excluded
    fs::write(dir.join("rollout_2_b.json"), rollout_json(OBS_DIM + 2, STEPS_PER_FILE, 2))?;
    // Truncated mid-write: excluded
    let full = rollout_json(OBS_DIM, STEPS_PER_FILE, 3);
    fs::write(dir.join("rollout_3_c.json"), &full[..full.len() / 2])?;
    fs::write(dir.join("rollout_4_d.json"), rollout_json(OBS_DIM, STEPS_PER_FILE, 4))?;
    // Not a rollout file
    fs::write(dir.join("notes.json"), "{}")?;
    Ok(())
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("expected training to run, got {:?}", other),
    }
}

#[test]
fn test_train_two_epochs_and_checkpoint() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let exports = tmp.path().join("exports");
    let models = tmp.path().join("models");
    write_exports(&exports)?;

    let config = TrainerConfig::new(&exports, &models).epochs(2);
    let summary = completed(TrainingRunner::new(config)?.run()?);

    assert_eq!(summary.epochs_completed, 2);
    assert!(!summary.interrupted);
    assert_eq!(summary.epochs_without_data, 0);

    let report = &summary.reports[0];
    assert_eq!(report.epoch, 1);
    assert_eq!(report.rollouts_loaded, 3);
    assert_eq!(report.rollouts_mismatched, 1);
    assert_eq!(report.rollouts_malformed, 1);
    assert_eq!(report.samples, 3 * STEPS_PER_FILE);
    assert_eq!(report.batch_size, 64);
    assert_eq!(report.num_batches, 2);
    assert!(report.rewards.is_some());

    assert!(models.join("model_epoch_1.bin").exists());
    assert!(models.join("model_epoch_2.bin").exists());
    assert_eq!(summary.last_checkpoint(), Some(models.join("model_epoch_2.bin").as_path()));

    let applied: usize =
        summary.reports.iter().map(|r| r.num_batches - r.skipped_steps).sum();
    let loaded = checkpoint::load(&models.join("model_epoch_2.bin"))?;
    assert_eq!(loaded.format_version, FORMAT_VERSION);
    assert_eq!(loaded.epoch, 2);
    assert_eq!(loaded.obs_dim, OBS_DIM as i64);
    assert_eq!(loaded.history.len(), applied);
    assert!(loaded.history.is_consistent());
    assert_eq!(loaded.optimizer.step as usize, applied);

    let rows = loaded.trunk_rows_flattened();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].in_features, OBS_DIM as i64);
    assert_eq!(rows[0].weights.len(), 128 * OBS_DIM);

    // No temporary files are left next to the checkpoints
    let leftovers: Vec<_> = fs::read_dir(&models)?
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with("model_epoch_"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn test_resume_continues_epoch_numbering() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let exports = tmp.path().join("exports");
    let models = tmp.path().join("models");
    write_exports(&exports)?;

    completed(TrainingRunner::new(TrainerConfig::new(&exports, &models).epochs(1))?.run()?);
    let first = checkpoint::load(&models.join("model_epoch_1.bin"))?;

    let config = TrainerConfig::new(&exports, &models)
        .epochs(1)
        .resume(models.join("model_epoch_1.bin"));
    let summary = completed(TrainingRunner::new(config)?.run()?);

    assert_eq!(summary.reports[0].epoch, 2);
    let second = checkpoint::load(&models.join("model_epoch_2.bin"))?;
    assert_eq!(second.epoch, 2);
    assert!(second.history.len() > first.history.len());
    assert_eq!(&second.history.total_loss[..first.history.len()], &first.history.total_loss[..]);
    assert_eq!(checkpoint::latest_checkpoint(&models)?, Some(models.join("model_epoch_2.bin")));
    Ok(())
}

#[test]
fn test_empty_export_dir_is_clean_no_op() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let exports = tmp.path().join("exports");
    fs::create_dir_all(&exports)?;
    fs::write(exports.join("something_else.json"), "{}")?;

    let outcome = TrainingRunner::new(TrainerConfig::new(&exports, tmp.path().join("models")))?.run()?;
    assert_eq!(outcome, RunOutcome::NoRollouts);
    Ok(())
}
