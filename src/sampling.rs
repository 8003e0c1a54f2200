use crate::Token;
use ndarray::ArrayView1;
use rand::Rng;

/// Index of the highest score; ties resolve to the lowest token.
/// Non-finite scores are skipped; an all-non-finite row yields token 0.
pub fn argmax(scores: ArrayView1<'_, f32>) -> Token {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    let mut found = false;
    for (i, &val) in scores.iter().enumerate() {
        if val.is_finite() && (!found || val > best_val) {
            best_idx = i;
            best_val = val;
            found = true;
        }
    }
    best_idx as Token
}

/// Softmax of `scores / temperature` with the excluded tokens given zero mass.
///
/// Returns `None` when no admissible token has a finite score.
pub fn softmax_with_temperature(
    scores: ArrayView1<'_, f32>,
    temperature: f32,
    excluded: &[Token],
) -> Option<Vec<f32>> {
    let is_excluded = |i: usize| excluded.iter().any(|&token| token as usize == i);

    let mut probs: Vec<f32> = scores
        .iter()
        .enumerate()
        .map(|(i, &val)| {
            let scaled = val / temperature;
            if is_excluded(i) || !scaled.is_finite() {
                f32::NEG_INFINITY
            } else {
                scaled
            }
        })
        .collect();

    let max_val = probs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max_val.is_finite() {
        return None;
    }

    let mut total = 0.0f32;
    for val in probs.iter_mut() {
        *val = if val.is_finite() { (*val - max_val).exp() } else { 0.0 };
        total += *val;
    }
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    for val in probs.iter_mut() {
        *val /= total;
    }
    Some(probs)
}

/// Draw one token from a normalized distribution.
pub fn sample_categorical(probs: &[f32], rng: &mut impl Rng) -> Token {
    let r: f32 = rng.random();
    let mut acc = 0.0f32;
    let mut last_admissible = 0usize;
    for (i, &prob) in probs.iter().enumerate() {
        if prob <= 0.0 {
            continue;
        }
        acc += prob;
        last_admissible = i;
        if r < acc {
            return i as Token;
        }
    }
    // Rounding can leave `acc` just below 1.
    last_admissible as Token
}

/// Temperature-scaled categorical draw from one row of scores.
///
/// A non-positive or non-finite temperature degrades to greedy argmax over the
/// admissible tokens.
pub fn sample_token(
    scores: ArrayView1<'_, f32>,
    temperature: f32,
    excluded: &[Token],
    rng: &mut impl Rng,
) -> Option<Token> {
    if temperature <= 0.0 || !temperature.is_finite() {
        let probs = softmax_with_temperature(scores, 1.0, excluded)?;
        let best = probs
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });
        return Some(best.0 as Token);
    }
    let probs = softmax_with_temperature(scores, temperature, excluded)?;
    Some(sample_categorical(&probs, rng))
}
