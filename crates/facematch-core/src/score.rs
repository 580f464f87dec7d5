//! Display percentages derived from a verification distance.
//!
//! These are presentation heuristics: the breakdown weights the single
//! embedding distance differently per feature, nothing is measured per feature.

use serde::Serialize;

const NOSE_WEIGHT: f32 = 0.3;
const EYES_WEIGHT: f32 = 0.4;
const MOUTH_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureBreakdown {
    pub nose: f32,
    pub eyes: f32,
    pub mouth: f32,
}

/// Percentages shown alongside a match, all within [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchScore {
    pub overall: f32,
    pub features: FeatureBreakdown,
}

impl MatchScore {
    pub fn from_distance(distance: f32) -> Self {
        let mismatch = distance.max(0.0) * 100.0;
        let pct = |weight: f32| (100.0 - mismatch * weight).clamp(0.0, 100.0);

        Self {
            overall: pct(1.0),
            features: FeatureBreakdown {
                nose: pct(NOSE_WEIGHT),
                eyes: pct(EYES_WEIGHT),
                mouth: pct(MOUTH_WEIGHT),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_typical_cosine_distance() {
        let s = MatchScore::from_distance(0.25);
        assert!(close(s.overall, 75.0));
        assert!(close(s.features.nose, 92.5));
        assert!(close(s.features.eyes, 90.0));
        assert!(close(s.features.mouth, 92.5));
    }

    #[test]
    fn test_identical_images() {
        let s = MatchScore::from_distance(0.0);
        assert_eq!(s.overall, 100.0);
        assert_eq!(s.features.eyes, 100.0);
    }

    #[test]
    fn test_large_distance_clamps_to_zero() {
        let s = MatchScore::from_distance(4.0);
        assert_eq!(s.overall, 0.0);
        assert_eq!(s.features.eyes, 0.0);
        assert_eq!(s.features.nose, 0.0);
    }

    #[test]
    fn test_negative_distance_is_treated_as_zero() {
        assert_eq!(MatchScore::from_distance(-1e-6).overall, 100.0);
    }
}
