//! Static model catalog and resource requirements.
//!
//! Entries are ordered from lightest to heaviest; `recommend` relies on it.

use localmind_core::ProcessingPower;
use serde::Serialize;

/// Model that is always installed and can never be removed.
pub const DEFAULT_MODEL_ID: &str = "minilm-l6";

/// Resources a model needs to run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequirements {
    #[serde(rename = "minMemoryGB")]
    pub min_memory_gb: f64,
    #[serde(rename = "recommendedMemoryGB")]
    pub recommended_memory_gb: f64,
    pub processing_intensity: ProcessingPower,
    #[serde(rename = "diskSpaceGB")]
    pub disk_space_gb: f64,
    pub estimated_load_time_sec: u32,
}

/// Immutable catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub display_name: &'static str,
    pub size: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [&'static str],
    pub requirements: ModelRequirements,
}

static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "minilm-l6",
        name: "all-MiniLM-L6-v2",
        display_name: "MiniLM L6 (Lightweight)",
        size: "90 MB",
        description: "Compact sentence embedding model for fast semantic search on any device.",
        capabilities: &["semantic-search", "embeddings"],
        requirements: ModelRequirements {
            min_memory_gb: 1.0,
            recommended_memory_gb: 2.0,
            processing_intensity: ProcessingPower::Low,
            disk_space_gb: 0.09,
            estimated_load_time_sec: 2,
        },
    },
    CatalogEntry {
        id: "bge-base",
        name: "bge-base-en-v1.5",
        display_name: "BGE Base",
        size: "440 MB",
        description: "Higher quality embeddings for more accurate document retrieval.",
        capabilities: &["semantic-search", "embeddings", "reranking"],
        requirements: ModelRequirements {
            min_memory_gb: 2.0,
            recommended_memory_gb: 4.0,
            processing_intensity: ProcessingPower::Medium,
            disk_space_gb: 0.44,
            estimated_load_time_sec: 5,
        },
    },
    CatalogEntry {
        id: "phi-3-mini",
        name: "Phi-3-mini-4k-instruct",
        display_name: "Phi-3 Mini",
        size: "2.2 GB",
        description: "Small instruction model for summaries and question answering over results.",
        capabilities: &["semantic-search", "summarization", "question-answering"],
        requirements: ModelRequirements {
            min_memory_gb: 4.0,
            recommended_memory_gb: 8.0,
            processing_intensity: ProcessingPower::High,
            disk_space_gb: 2.2,
            estimated_load_time_sec: 15,
        },
    },
    CatalogEntry {
        id: "mistral-7b",
        name: "Mistral-7B-Instruct-v0.3",
        display_name: "Mistral 7B",
        size: "4.1 GB",
        description: "General purpose model with strong reasoning over search context.",
        capabilities: &["semantic-search", "summarization", "question-answering", "chat"],
        requirements: ModelRequirements {
            min_memory_gb: 6.0,
            recommended_memory_gb: 12.0,
            processing_intensity: ProcessingPower::High,
            disk_space_gb: 4.1,
            estimated_load_time_sec: 30,
        },
    },
    CatalogEntry {
        id: "llama-3-8b",
        name: "Meta-Llama-3.1-8B-Instruct",
        display_name: "Llama 3.1 8B",
        size: "4.9 GB",
        description: "Largest local model; best answers, needs a powerful machine.",
        capabilities: &[
            "semantic-search",
            "summarization",
            "question-answering",
            "chat",
            "code",
        ],
        requirements: ModelRequirements {
            min_memory_gb: 8.0,
            recommended_memory_gb: 16.0,
            processing_intensity: ProcessingPower::VeryHigh,
            disk_space_gb: 4.9,
            estimated_load_time_sec: 45,
        },
    },
];

/// All catalog entries, lightest first.
pub fn entries() -> &'static [CatalogEntry] {
    CATALOG
}

/// Look up a catalog entry.
pub fn entry(model_id: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.id == model_id)
}

/// Look up a model's requirements.
pub fn requirements(model_id: &str) -> Option<&'static ModelRequirements> {
    entry(model_id).map(|e| &e.requirements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_in_catalog() {
        let default = entry(DEFAULT_MODEL_ID).unwrap();
        assert_eq!(entries()[0].id, DEFAULT_MODEL_ID);
        assert_eq!(default.requirements.processing_intensity, ProcessingPower::Low);
    }

    #[test]
    fn test_catalog_ordered_light_to_heavy() {
        for pair in entries().windows(2) {
            let (a, b) = (&pair[0].requirements, &pair[1].requirements);
            assert!(a.min_memory_gb <= b.min_memory_gb, "{} before {}", pair[0].id, pair[1].id);
            assert!(a.processing_intensity <= b.processing_intensity);
        }
    }

    #[test]
    fn test_requirements_sane() {
        for e in entries() {
            let r = &e.requirements;
            assert!(r.min_memory_gb > 0.0);
            assert!(r.recommended_memory_gb >= r.min_memory_gb, "{}", e.id);
            assert!(r.disk_space_gb > 0.0);
        }
    }

    #[test]
    fn test_unknown_model() {
        assert!(entry("gpt-17").is_none());
        assert!(requirements("gpt-17").is_none());
    }
}
