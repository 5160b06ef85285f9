use crate::job::QualityCriterion;

/// Decide which frames take part in reference point alignment and stacking.
///
/// `qualities` holds one score per active frame in chronological order; the
/// result has one flag per entry. At least one frame is always selected
/// when `qualities` is non-empty.
pub fn select_frames(criterion: QualityCriterion, qualities: &[f32]) -> Vec<bool> {
    let n = qualities.len();
    if n == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by(|&a, &b| qualities[b].total_cmp(&qualities[a]));

    let keep_best = |count: usize| {
        let mut flags = vec![false; n];
        for &i in ranked.iter().take(count.clamp(1, n)) {
            flags[i] = true;
        }
        flags
    };

    match criterion {
        QualityCriterion::PercentageBest(p) => {
            let p = p.min(100) as usize;
            keep_best((n * p).div_ceil(100))
        }
        QualityCriterion::NumberBest(count) => keep_best(count as usize),
        QualityCriterion::MinRelativeQuality(p) => {
            let min = qualities.iter().cloned().fold(f32::INFINITY, f32::min);
            let max = qualities.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let cutoff = min + (max - min) * p.min(100) as f32 / 100.0;
            let flags: Vec<bool> = qualities.iter().map(|&q| q >= cutoff).collect();
            if flags.iter().any(|&f| f) {
                flags
            } else {
                keep_best(1)
            }
        }
    }
}
