//! Loss computation functions for PPO
//!
//! This module contains the core loss computation functions used
//! in PPO training including policy loss, value loss, and entropy loss.
//! Every term is clamped so a single outlier batch cannot produce an
//! unbounded gradient.

use tch::{Kind, Tensor};

/// Log probabilities are clamped to `±LOG_PROB_CLIP` before forming ratios
pub const LOG_PROB_CLIP: f64 = 10.0;

/// Lower bound of the probability ratio
pub const RATIO_MIN: f64 = 0.1;

/// Upper bound of the probability ratio
pub const RATIO_MAX: f64 = 10.0;

/// Policy loss is clamped to `±POLICY_LOSS_CLIP`
pub const POLICY_LOSS_CLIP: f64 = 100.0;

/// Value loss is clamped to `[0, VALUE_LOSS_CLIP]`
pub const VALUE_LOSS_CLIP: f64 = 100.0;

/// Probability ratio `exp(new - old)` with both inputs and the result clamped
pub fn probability_ratio(log_probs: &Tensor, old_log_probs: &Tensor) -> Tensor {
    let new = log_probs.clamp(-LOG_PROB_CLIP, LOG_PROB_CLIP);
    let old = old_log_probs.clamp(-LOG_PROB_CLIP, LOG_PROB_CLIP);
    (new - old).exp().clamp(RATIO_MIN, RATIO_MAX)
}

/// Compute PPO policy loss with clipping
///
/// Returns (policy_loss, clip_fraction, approx_kl)
///
/// # Arguments
/// * `log_probs` - Log probabilities of actions under current policy
/// * `old_log_probs` - Log probabilities of actions under the behavior policy
/// * `advantages` - Normalized advantages
/// * `clip_range` - PPO clipping parameter (epsilon)
pub fn compute_policy_loss(
    log_probs: &Tensor,
    old_log_probs: &Tensor,
    advantages: &Tensor,
    clip_range: f64,
) -> (Tensor, f64, f64) {
    let ratio = probability_ratio(log_probs, old_log_probs);

    // Clipped surrogate objective
    let clipped_ratio = ratio.clamp(1.0 - clip_range, 1.0 + clip_range);
    let surrogate_1 = advantages * &ratio;
    let surrogate_2 = advantages * clipped_ratio;
    let policy_loss = (-surrogate_1.minimum(&surrogate_2).mean(Kind::Float))
        .clamp(-POLICY_LOSS_CLIP, POLICY_LOSS_CLIP);

    let clip_fraction = (&ratio - 1.0).abs().gt(clip_range).to_kind(Kind::Float).mean(Kind::Float);
    let approx_kl = (old_log_probs - log_probs).mean(Kind::Float);

    (
        policy_loss,
        f64::try_from(&clip_fraction).unwrap_or(0.0),
        f64::try_from(&approx_kl).unwrap_or(0.0),
    )
}

/// Compute the weighted value function loss with value clipping
///
/// Takes the larger of the unclipped and clipped squared errors, scales it
/// by `vf_coef` and clamps the result to `[0, VALUE_LOSS_CLIP]`.
///
/// Returns (value_loss, explained_variance)
///
/// # Arguments
/// * `values` - Predicted values under current value function
/// * `old_values` - Values recorded at collection time
/// * `returns` - Computed returns (targets)
/// * `clip_range` - Maximum change of a value prediction
/// * `vf_coef` - Value loss coefficient
pub fn compute_value_loss(
    values: &Tensor,
    old_values: &Tensor,
    returns: &Tensor,
    clip_range: f64,
    vf_coef: f64,
) -> (Tensor, f64) {
    let values_clipped = old_values + (values - old_values).clamp(-clip_range, clip_range);
    let vf_loss_1 = (values - returns).square();
    let vf_loss_2 = (values_clipped - returns).square();
    let value_loss =
        (vf_loss_1.maximum(&vf_loss_2).mean(Kind::Float) * vf_coef).clamp(0.0, VALUE_LOSS_CLIP);

    (value_loss, explained_variance(values, returns))
}

/// Compute entropy loss (negative weighted entropy for maximization)
///
/// # Arguments
/// * `entropy` - Per-sample entropy of the policy distribution
/// * `ent_coef` - Entropy bonus coefficient
pub fn compute_entropy_loss(entropy: &Tensor, ent_coef: f64) -> Tensor {
    -(entropy.mean(Kind::Float) * ent_coef)
}

/// Fraction of return variance explained by the value predictions
///
/// 1.0 when the returns have no variance.
pub fn explained_variance(values: &Tensor, returns: &Tensor) -> f64 {
    let var_returns = f64::try_from(returns.var(false)).unwrap_or(0.0);
    if var_returns == 0.0 {
        return 1.0;
    }
    let var_residual = f64::try_from((returns - values).var(false)).unwrap_or(0.0);
    1.0 - var_residual / var_returns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(values: &[f32]) -> Tensor {
        Tensor::from_slice(values)
    }

    fn scalar(tensor: &Tensor) -> f64 {
        f64::try_from(tensor).unwrap()
    }

    #[test]
    fn test_ratio_is_bounded() {
        let new = t(&[50.0, -50.0, 0.0, f32::MAX, -f32::MAX, 3.0]);
        let old = t(&[-50.0, 50.0, 0.0, -f32::MAX, f32::MAX, 2.5]);

        let ratio = Vec::<f32>::try_from(&probability_ratio(&new, &old)).unwrap();

        for r in &ratio {
            assert!((RATIO_MIN as f32..=RATIO_MAX as f32).contains(r), "ratio {} out of bounds", r);
        }
        assert_eq!(ratio[0], RATIO_MAX as f32);
        assert_eq!(ratio[1], RATIO_MIN as f32);
        assert_eq!(ratio[2], 1.0);
        assert!((ratio[5] - 0.5f32.exp()).abs() < 1e-5);
    }

    #[test]
    fn test_policy_loss_equal_policies() {
        // ratio = 1 everywhere, loss = -mean(A)
        let lp = t(&[-1.0, -2.0, -3.0]);
        let adv = t(&[1.0, 2.0, 3.0]);
        let (loss, clip_fraction, approx_kl) = compute_policy_loss(&lp, &lp, &adv, 0.2);
        assert!((scalar(&loss) + 2.0).abs() < 1e-6);
        assert_eq!(clip_fraction, 0.0);
        assert_eq!(approx_kl, 0.0);
    }

    #[test]
    fn test_policy_loss_clips_positive_advantage() {
        // ratio = e ≈ 2.718, clipped to 1.2 for a positive advantage
        let new = t(&[0.0]);
        let old = t(&[-1.0]);
        let adv = t(&[1.0]);
        let (loss, clip_fraction, _) = compute_policy_loss(&new, &old, &adv, 0.2);
        assert!((scalar(&loss) + 1.2).abs() < 1e-6);
        assert_eq!(clip_fraction, 1.0);
    }

    #[test]
    fn test_policy_loss_is_clamped() {
        let lp = t(&[0.0, 0.0]);
        let adv = t(&[-1e6, -1e6]);
        let (loss, _, _) = compute_policy_loss(&lp, &lp, &adv, 0.2);
        assert_eq!(scalar(&loss), POLICY_LOSS_CLIP);
    }

    #[test]
    fn test_value_loss_takes_pessimistic_branch() {
        // v = 2, old = 0, R = 0: unclipped err 4, clipped v = 0.2 err 0.04
        let (loss, _) = compute_value_loss(&t(&[2.0]), &t(&[0.0]), &t(&[0.0]), 0.2, 0.5);
        assert!((scalar(&loss) - 2.0).abs() < 1e-6);

        // v = 0.1, old = 0, R = 1: unclipped err 0.81, clipped (0.1) same
        let (loss, _) = compute_value_loss(&t(&[0.1]), &t(&[0.0]), &t(&[1.0]), 0.2, 1.0);
        assert!((scalar(&loss) - 0.81).abs() < 1e-6);
    }

    #[test]
    fn test_value_loss_is_clamped() {
        let (loss, _) = compute_value_loss(&t(&[1000.0]), &t(&[0.0]), &t(&[-1000.0]), 0.2, 0.5);
        assert_eq!(scalar(&loss), VALUE_LOSS_CLIP);
    }

    #[test]
    fn test_entropy_loss_sign() {
        let loss = compute_entropy_loss(&t(&[1.0, 3.0]), 0.05);
        assert!((scalar(&loss) + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_explained_variance() {
        let returns = t(&[1.0, 2.0, 3.0]);
        assert!((explained_variance(&returns, &returns) - 1.0).abs() < 1e-6);
        assert_eq!(explained_variance(&t(&[0.0, 0.0]), &t(&[5.0, 5.0])), 1.0);
    }
}
