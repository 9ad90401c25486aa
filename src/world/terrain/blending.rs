/// Weights this close to zero count as empty when redistributing.
const EMPTY_EPS: f32 = 1e-6;

/// Push `target` toward 1 by `strength` and rescale every other layer so the cell
/// still sums to 1. If the others are all empty the remainder is shared evenly.
pub fn blend_toward_layer(weights: &mut [f32], target: usize, strength: f32) {
    let n = weights.len();
    if target >= n {
        return;
    }
    let s = strength.clamp(0.0, 1.0);
    let current = weights[target].clamp(0.0, 1.0);
    let new_target = current + (1.0 - current) * s;
    let remainder = 1.0 - new_target;

    let others: f32 = weights
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != target)
        .map(|(_, w)| w.max(0.0))
        .sum();

    for (i, w) in weights.iter_mut().enumerate() {
        if i == target {
            *w = new_target;
        } else if others > EMPTY_EPS {
            *w = w.max(0.0) / others * remainder;
        } else if n > 1 {
            *w = remainder / (n - 1) as f32;
        }
    }
    if n == 1 {
        weights[0] = 1.0;
    }
}

/// Rescale a cell to sum to 1. An empty cell goes fully to layer 0.
pub fn normalize(weights: &mut [f32]) {
    let sum: f32 = weights.iter().map(|w| w.max(0.0)).sum();
    if sum <= EMPTY_EPS {
        if let Some((first, rest)) = weights.split_first_mut() {
            *first = 1.0;
            rest.fill(0.0);
        }
        return;
    }
    for w in weights.iter_mut() {
        *w = w.max(0.0) / sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(w: &[f32]) -> f32 {
        w.iter().sum()
    }

    #[test]
    fn blend_keeps_sum_at_one() {
        let mut w = vec![0.5, 0.3, 0.2];
        for (target, s) in [(1, 0.4), (2, 0.9), (0, 0.1), (1, 1.0), (2, 0.0)] {
            blend_toward_layer(&mut w, target, s);
            assert!((sum(&w) - 1.0).abs() < 1e-5, "{w:?}");
        }
    }

    #[test]
    fn others_keep_their_proportions() {
        let mut w = vec![0.6, 0.2, 0.2];
        blend_toward_layer(&mut w, 2, 0.5);
        assert!((w[2] - 0.6).abs() < 1e-6);
        assert!((w[0] - 0.3).abs() < 1e-6);
        assert!((w[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn empty_others_share_remainder_evenly() {
        let mut w = vec![0.0, 0.0, 0.0, 0.0];
        blend_toward_layer(&mut w, 1, 0.4);
        assert!((w[1] - 0.4).abs() < 1e-6);
        for i in [0, 2, 3] {
            assert!((w[i] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn full_strength_is_idempotent() {
        let mut w = vec![0.25, 0.25, 0.5];
        blend_toward_layer(&mut w, 0, 1.0);
        let once = w.clone();
        blend_toward_layer(&mut w, 0, 1.0);
        assert_eq!(w, once);
        assert_eq!(once, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_handles_empty_cell() {
        let mut w = vec![0.0, 0.0];
        normalize(&mut w);
        assert_eq!(w, vec![1.0, 0.0]);
        let mut w = vec![2.0, 6.0];
        normalize(&mut w);
        assert_eq!(w, vec![0.25, 0.75]);
    }
}
