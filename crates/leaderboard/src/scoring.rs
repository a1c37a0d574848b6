pub const SCORE_FLOOR: u32 = 100;
pub const SCORE_CEILING: u32 = 100_000;

/// Largest finite, non-negative volume, or 0 when there is none.
pub fn max_volume(volumes: impl IntoIterator<Item = f64>) -> f64 {
    volumes
        .into_iter()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .fold(0.0, f64::max)
}

/// Score one volume relative to `max`: `floor(volume / max * 100000)`, floored at 100.
///
/// A zero or invalid maximum scores everything at the floor.
pub fn score_for(volume: f64, max: f64) -> u32 {
    if !(max.is_finite() && max > 0.0) || !(volume.is_finite() && volume > 0.0) {
        return SCORE_FLOOR;
    }
    let scaled = (volume / max * f64::from(SCORE_CEILING)).floor();
    scaled.clamp(f64::from(SCORE_FLOOR), f64::from(SCORE_CEILING)) as u32
}

pub fn compute_scores(volumes: &[f64]) -> Vec<u32> {
    let max = max_volume(volumes.iter().copied());
    volumes.iter().map(|v| score_for(*v, max)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_relative_to_max() {
        assert_eq!(
            compute_scores(&[1000.0, 500.0, 2000.0]),
            vec![50_000, 25_000, 100_000]
        );
    }

    #[test]
    fn test_max_scores_ceiling_and_floor_holds() {
        let volumes = [3.0, 0.0, 1e-9, 7.5e21, 42.0, 7.5e21];
        let scores = compute_scores(&volumes);
        assert_eq!(scores.len(), volumes.len());
        assert_eq!(scores[3], SCORE_CEILING);
        assert_eq!(scores[5], SCORE_CEILING);
        assert!(scores.iter().all(|s| *s >= SCORE_FLOOR && *s <= SCORE_CEILING));
        assert_eq!(scores[1], SCORE_FLOOR);
    }

    #[test]
    fn test_all_zero_volumes_score_floor() {
        assert_eq!(compute_scores(&[0.0, 0.0, 0.0]), vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_and_invalid_inputs() {
        assert!(compute_scores(&[]).is_empty());
        assert_eq!(compute_scores(&[f64::NAN, 10.0]), vec![100, 100_000]);
        assert_eq!(compute_scores(&[-5.0, 10.0]), vec![100, 100_000]);
    }

    #[test]
    fn test_small_share_floors_at_100() {
        // 1 / 10_000 of the max would be 10 points.
        assert_eq!(compute_scores(&[1.0, 10_000.0]), vec![100, 100_000]);
        assert_eq!(score_for(1.0, 0.0), SCORE_FLOOR);
    }
}
