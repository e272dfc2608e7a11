//! Compatibility scorer — can a model run on this device, and how well.
//!
//! Checks run in a fixed order so the output is deterministic: catalog
//! lookup, memory gate, processing gate, mobile gate, network gate, then the
//! performance upgrade pass. Fatal gates come first.

use localmind_core::{DeviceCapabilities, DeviceClass, NetworkClass, ProcessingPower};
use serde::Serialize;

use crate::catalog::{self, DEFAULT_MODEL_ID};

/// Downloads bigger than this get a warning on slow networks.
const SLOW_NETWORK_DISK_GB: f64 = 2.0;

/// Expected performance tier. Ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl std::fmt::Display for Performance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poor => write!(f, "poor"),
            Self::Acceptable => write!(f, "acceptable"),
            Self::Good => write!(f, "good"),
            Self::Excellent => write!(f, "excellent"),
        }
    }
}

/// Verdict for a model/device pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityScore {
    pub can_run: bool,
    pub performance: Performance,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Stateless scorer over the static catalog.
pub struct CompatibilityScorer;

impl CompatibilityScorer {
    /// Score one model against a capability snapshot. Pure.
    pub fn score(model_id: &str, caps: &DeviceCapabilities) -> CompatibilityScore {
        let Some(req) = catalog::requirements(model_id) else {
            return CompatibilityScore {
                can_run: false,
                performance: Performance::Poor,
                warnings: vec![format!("Model requirements not found for {}", model_id)],
                recommendations: Vec::new(),
            };
        };

        let mut can_run = true;
        let mut downgraded = false;
        let mut performance = Performance::Excellent;
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        // Memory gate
        if caps.total_memory_gb < req.min_memory_gb {
            can_run = false;
            performance = Performance::Poor;
            warnings.push(format!(
                "Insufficient memory: device has {:.1} GB, model requires at least {:.1} GB",
                caps.total_memory_gb, req.min_memory_gb
            ));
            recommendations
                .push("Upgrade device memory or choose a smaller model".to_string());
        } else if caps.total_memory_gb < req.recommended_memory_gb {
            performance = performance.min(Performance::Acceptable);
            downgraded = true;
            warnings.push(format!(
                "Memory below the recommended {:.1} GB; the model may run slowly",
                req.recommended_memory_gb
            ));
            recommendations.push("Close other applications to free up memory".to_string());
        }

        // Processing gate
        if can_run && !caps.processing_power.covers(req.processing_intensity) {
            performance = Performance::Poor;
            downgraded = true;
            warnings.push(format!(
                "Model needs {} processing power, device provides {}",
                req.processing_intensity, caps.processing_power
            ));
            recommendations.push("Consider a lighter model for better performance".to_string());
        }

        // Mobile gate
        if caps.device_class == DeviceClass::Mobile
            && req.processing_intensity == ProcessingPower::VeryHigh
        {
            performance = Performance::Poor;
            downgraded = true;
            warnings.push("This model is too demanding for mobile devices".to_string());
            recommendations.push("Use a lightweight model on mobile devices".to_string());
        }

        // Network gate: advisory only
        if caps.network_class == NetworkClass::Slow && req.disk_space_gb > SLOW_NETWORK_DISK_GB {
            warnings.push(format!(
                "Downloading {:.1} GB may take a long time on a slow connection",
                req.disk_space_gb
            ));
            recommendations.push("Download over a faster connection such as Wi-Fi".to_string());
        }

        // Upgrade pass for clean results
        if can_run && !downgraded {
            performance = if caps.total_memory_gb >= 1.5 * req.recommended_memory_gb
                && caps.processing_power == ProcessingPower::VeryHigh
            {
                Performance::Excellent
            } else if caps.total_memory_gb >= req.recommended_memory_gb
                && caps.processing_power == ProcessingPower::High
            {
                Performance::Good
            } else {
                Performance::Excellent
            };
        }

        CompatibilityScore {
            can_run,
            performance,
            warnings,
            recommendations,
        }
    }

    /// Score the whole catalog, in catalog order.
    pub fn score_all(caps: &DeviceCapabilities) -> Vec<(&'static str, CompatibilityScore)> {
        catalog::entries()
            .iter()
            .map(|e| (e.id, Self::score(e.id, caps)))
            .collect()
    }

    /// Models worth offering on this device, lightest first.
    ///
    /// Always starts with the default model.
    pub fn recommend(caps: &DeviceCapabilities) -> Vec<String> {
        let mut models = vec![DEFAULT_MODEL_ID.to_string()];
        models.extend(
            Self::score_all(caps)
                .into_iter()
                .filter(|(id, s)| {
                    *id != DEFAULT_MODEL_ID && s.can_run && s.performance > Performance::Poor
                })
                .map(|(id, _)| id.to_string()),
        );
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localmind_core::ModelSize;

    fn caps(
        memory: f64,
        power: ProcessingPower,
        class: DeviceClass,
        network: NetworkClass,
    ) -> DeviceCapabilities {
        DeviceCapabilities {
            total_memory_gb: memory,
            available_memory_gb: (memory * 0.7).max(1.0),
            estimated_vram_gb: 4.0,
            device_class: class,
            network_class: network,
            processing_power: power,
            recommended_model_size: ModelSize::Small,
        }
    }

    fn laptop(memory: f64, power: ProcessingPower) -> DeviceCapabilities {
        caps(memory, power, DeviceClass::Laptop, NetworkClass::Fast)
    }

    #[test]
    fn test_unknown_model() {
        let score = CompatibilityScorer::score("nope", &laptop(16.0, ProcessingPower::High));
        assert!(!score.can_run);
        assert_eq!(score.performance, Performance::Poor);
        assert_eq!(score.warnings.len(), 1);
        assert!(score.warnings[0].contains("requirements not found"));
    }

    #[test]
    fn test_insufficient_memory() {
        // mistral-7b needs 6 GB minimum
        let score = CompatibilityScorer::score("mistral-7b", &laptop(4.0, ProcessingPower::Low));
        assert!(!score.can_run);
        assert_eq!(score.performance, Performance::Poor);
        assert!(score.warnings.iter().any(|w| w.contains("memory")));
        assert!(score.recommendations.iter().any(|r| r.contains("smaller model")));
    }

    #[test]
    fn test_below_recommended_memory() {
        // phi-3-mini: min 4, recommended 8, high intensity
        let score = CompatibilityScorer::score("phi-3-mini", &laptop(6.0, ProcessingPower::High));
        assert!(score.can_run);
        assert_eq!(score.performance, Performance::Acceptable);
        assert!(score.warnings.iter().any(|w| w.contains("slowly")));
        assert!(score.recommendations.iter().any(|r| r.contains("free up memory")));
    }

    #[test]
    fn test_processing_gate() {
        let score = CompatibilityScorer::score("phi-3-mini", &laptop(16.0, ProcessingPower::Medium));
        assert!(score.can_run);
        assert_eq!(score.performance, Performance::Poor);
        assert!(score.recommendations.iter().any(|r| r.contains("lighter model")));
    }

    #[test]
    fn test_mobile_gate() {
        let device = caps(32.0, ProcessingPower::VeryHigh, DeviceClass::Mobile, NetworkClass::Fast);
        let score = CompatibilityScorer::score("llama-3-8b", &device);
        assert!(score.can_run);
        assert_eq!(score.performance, Performance::Poor);
        assert!(score.warnings.iter().any(|w| w.contains("mobile")));

        // Lighter models are unaffected on the same phone.
        let score = CompatibilityScorer::score("minilm-l6", &device);
        assert_eq!(score.performance, Performance::Excellent);
    }

    #[test]
    fn test_slow_network_is_advisory() {
        let fast = laptop(16.0, ProcessingPower::High);
        let slow = caps(16.0, ProcessingPower::High, DeviceClass::Laptop, NetworkClass::Slow);

        let a = CompatibilityScorer::score("mistral-7b", &fast);
        let b = CompatibilityScorer::score("mistral-7b", &slow);
        assert_eq!(a.can_run, b.can_run);
        assert_eq!(a.performance, b.performance);
        assert_eq!(b.warnings.len(), a.warnings.len() + 1);

        // Small downloads get no network warning.
        let small = CompatibilityScorer::score("bge-base", &slow);
        assert!(small.warnings.is_empty());
    }

    #[test]
    fn test_upgrade_pass() {
        let score =
            CompatibilityScorer::score("mistral-7b", &laptop(18.0, ProcessingPower::VeryHigh));
        assert_eq!(score.performance, Performance::Excellent);

        let score = CompatibilityScorer::score("mistral-7b", &laptop(12.0, ProcessingPower::High));
        assert_eq!(score.performance, Performance::Good);

        let score = CompatibilityScorer::score("minilm-l6", &laptop(8.0, ProcessingPower::Medium));
        assert_eq!(score.performance, Performance::Excellent);
        assert!(score.warnings.is_empty());
    }

    #[test]
    fn test_score_is_pure() {
        let device = caps(6.0, ProcessingPower::Medium, DeviceClass::Tablet, NetworkClass::Slow);
        for entry in crate::catalog::entries() {
            let a = CompatibilityScorer::score(entry.id, &device);
            let b = CompatibilityScorer::score(entry.id, &device);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_recommend_small_device() {
        let recs = CompatibilityScorer::recommend(&laptop(2.0, ProcessingPower::Low));
        assert_eq!(recs, vec!["minilm-l6".to_string()]);
    }

    #[test]
    fn test_recommend_grows_with_device() {
        let mid = CompatibilityScorer::recommend(&laptop(8.0, ProcessingPower::High));
        assert_eq!(mid, vec!["minilm-l6", "bge-base", "phi-3-mini", "mistral-7b"]);

        let big = CompatibilityScorer::recommend(&laptop(32.0, ProcessingPower::VeryHigh));
        assert_eq!(big.len(), crate::catalog::entries().len());
        assert_eq!(big[0], DEFAULT_MODEL_ID);

        // Lightest to heaviest: positions follow catalog order.
        let order: Vec<usize> = big
            .iter()
            .map(|id| crate::catalog::entries().iter().position(|e| e.id == id).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_recommend_always_has_default() {
        // Even a device below every requirement gets the default back.
        let recs = CompatibilityScorer::recommend(&laptop(0.5, ProcessingPower::Low));
        assert_eq!(recs, vec![DEFAULT_MODEL_ID.to_string()]);
    }
}
