//! Verify PPO moves the Gaussian policy toward rewarded actions
//!
//! Synthetic single-step episodes: steering right (+0.8) earns +1, steering
//! left (-0.8) earns -1. After a few PPO iterations the mean steering output
//! should shift to the right.

use carai_trainer::{
    buffer::rollout::{EpochBuffer, Experience, RolloutData},
    policy::gaussian::GaussianPolicy,
    train::ppo::{PPOConfig, PPOTrainer, StepOutcome},
};
use tch::{Device, Kind, Tensor};

const OBS_DIM: usize = 1;
const SAMPLES: usize = 16;

fn observations() -> Vec<f32> {
    (0..SAMPLES).map(|i| (i % 2) as f32).collect()
}

fn actions() -> Vec<[f32; 3]> {
    (0..SAMPLES)
        .map(|i| if (i / 2) % 2 == 0 { [0.8, 0.5, 0.0] } else { [-0.8, 0.5, 0.0] })
        .collect()
}

/// Build a batch whose behavior log-probs come from the current policy
fn collect(policy: &GaussianPolicy, reward_of: impl Fn(&[f32; 3]) -> f32) -> EpochBuffer {
    let obs = observations();
    let acts = actions();

    let obs_t = Tensor::from_slice(&obs).view([SAMPLES as i64, OBS_DIM as i64]);
    let flat: Vec<f32> = acts.iter().flatten().copied().collect();
    let act_t = Tensor::from_slice(&flat).view([SAMPLES as i64, 3]);
    let (log_probs, values) = tch::no_grad(|| policy.evaluate_action(&obs_t, &act_t));
    let log_probs = Vec::<f32>::try_from(&log_probs).unwrap();
    let values = Vec::<f32>::try_from(&values).unwrap();

    let mut rollout = RolloutData::new(OBS_DIM);
    for i in 0..SAMPLES {
        rollout.push(&Experience {
            state: vec![obs[i]],
            action: acts[i],
            reward: reward_of(&acts[i]),
            done: true,
            log_prob: log_probs[i],
            value: values[i],
        });
    }
    let mut buffer = EpochBuffer::new(OBS_DIM);
    buffer.extend(&rollout);
    buffer
}

fn mean_steer(policy: &GaussianPolicy) -> f64 {
    let obs = Tensor::from_slice(&[0.0_f32, 1.0]).view([2, 1]);
    let (mean, _, _) = tch::no_grad(|| policy.forward(&obs));
    f64::try_from(mean.select(1, 0).mean(Kind::Float)).unwrap()
}

#[test]
fn test_ppo_shifts_mean_toward_rewarded_action() {
    let policy = GaussianPolicy::new(OBS_DIM as i64, Device::Cpu);
    let config = PPOConfig::new().learning_rate(0.01);
    let mut trainer = PPOTrainer::new(config, policy).unwrap();

    let before = mean_steer(trainer.policy());
    println!("BEFORE training: mean steer = {:.4}", before);

    for _iteration in 0..5 {
        let buffer = collect(trainer.policy(), |a| if a[0] > 0.0 { 1.0 } else { -1.0 });
        for _ in 0..10 {
            let outcome = trainer.train_step(&buffer.as_batch()).unwrap();
            assert!(outcome.is_applied(), "unexpected skip: {:?}", outcome);
        }
    }

    let after = mean_steer(trainer.policy());
    println!("AFTER training: mean steer = {:.4}", after);

    assert!(after > before + 0.02, "mean steer did not move right: {:.4} -> {:.4}", before, after);
    assert_eq!(trainer.history().len(), 50);
}

#[test]
fn test_value_loss_decreases() {
    let policy = GaussianPolicy::new(OBS_DIM as i64, Device::Cpu);
    let mut trainer = PPOTrainer::new(PPOConfig::new().learning_rate(0.01), policy).unwrap();

    // Constant reward: advantages vanish after centering, only the critic learns
    let buffer = collect(trainer.policy(), |_| 1.0);
    let mut value_losses = Vec::new();
    for _ in 0..30 {
        match trainer.train_step(&buffer.as_batch()).unwrap() {
            StepOutcome::Applied(losses) => value_losses.push(losses.value_loss),
            StepOutcome::Skipped(cause) => panic!("unexpected skip: {:?}", cause),
        }
    }

    let first = value_losses[0];
    let last = value_losses[value_losses.len() - 1];
    println!("value loss: {:.4} -> {:.4}", first, last);
    assert!(last < first, "value loss did not decrease: {:.4} -> {:.4}", first, last);
}
