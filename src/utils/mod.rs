/// League points for a result: 3 for a win, 1 for a draw, 0 for a loss.
pub fn result_points(goals_for: u32, goals_against: u32) -> u32 {
    match goals_for.cmp(&goals_against) {
        std::cmp::Ordering::Greater => 3,
        std::cmp::Ordering::Equal => 1,
        std::cmp::Ordering::Less => 0,
    }
}

/// Convert probability to fair decimal odds
pub fn probability_to_odds(probability: f64) -> f64 {
    if probability <= 0.0 || probability >= 1.0 {
        return 1000.0; // Very high odds for impossible/certain events
    }
    1.0 / probability
}

/// Normalize probabilities to sum to 1.0
pub fn normalize_probabilities<const N: usize>(probs: [f64; N]) -> [f64; N] {
    let sum: f64 = probs.iter().sum();
    if sum == 0.0 {
        return probs;
    }
    probs.map(|p| p / sum)
}

/// Fraction of positions where `predicted` matches `actual`.
pub fn classification_accuracy(predicted: &[usize], actual: &[usize]) -> f64 {
    let total = predicted.len().min(actual.len());
    if total == 0 {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(actual)
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / total as f64
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}
