use std::{path::PathBuf, sync::atomic::Ordering};

use anyhow::{Context, Result};
use carai_trainer::{
    checkpoint,
    train::{DeviceChoice, PPOConfig, RunOutcome, TrainerConfig, TrainingRunner},
};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Train the racing car policy from exported rollouts
#[derive(Debug, Parser)]
#[command(name = "carai-train", version, about)]
struct Cli {
    /// Directory containing rollout_*.json files
    #[arg(long, env = "CARAI_EXPORT_DIR", default_value = "exports")]
    export_dir: PathBuf,

    /// Directory receiving model_epoch_{k}.bin checkpoints
    #[arg(long, env = "CARAI_MODEL_DIR", default_value = "models")]
    model_dir: PathBuf,

    /// Number of epochs (values below 1 use the default of 10)
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    epochs: i64,

    /// Compute device: cpu or cuda
    #[arg(long, default_value_t = DeviceChoice::Cpu)]
    device: DeviceChoice,

    /// Checkpoint file, or a model directory whose latest checkpoint is used
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Adam learning rate
    #[arg(long)]
    learning_rate: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut ppo = PPOConfig::default();
    if let Some(lr) = cli.learning_rate {
        ppo = ppo.learning_rate(lr);
    }

    let mut config = TrainerConfig::new(cli.export_dir, cli.model_dir)
        .epochs(usize::try_from(cli.epochs).unwrap_or(0))
        .device(cli.device)
        .ppo(ppo);

    if let Some(resume) = cli.resume {
        let path = if resume.is_dir() {
            checkpoint::latest_checkpoint(&resume)?
                .with_context(|| format!("no checkpoint found in {}", resume.display()))?
        } else {
            resume
        };
        config = config.resume(path);
    }

    let runner = TrainingRunner::new(config)?;

    // The current minibatch finishes; a partial epoch is not checkpointed
    let stop = runner.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Stopping at the next minibatch boundary");
        stop.store(true, Ordering::Relaxed);
    });

    let outcome = tokio::task::spawn_blocking(move || runner.run())
        .await
        .context("training task panicked")??;

    match outcome {
        RunOutcome::NoRollouts | RunOutcome::NoValidRollouts { .. } => {
            tracing::info!("Nothing to train on");
        }
        RunOutcome::Completed(summary) => {
            if let Some(path) = summary.last_checkpoint() {
                tracing::info!("Latest checkpoint: {}", path.display());
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
