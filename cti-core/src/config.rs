//! # Configuração do Codec
//!
//! Carregada uma vez na inicialização (JSON), com padrões que reproduzem o
//! comportamento histórico do pipeline:
//!
//! ```json
//! {
//!   "labels": ["URL", "MALWARE", "TOOL"],
//!   "overlap_policy": "reject",
//!   "score_aggregation": "pairwise_mean",
//!   "keep_outside": false
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::decoder::{MergeOptions, ScoreAggregation};
use crate::encoder::OverlapPolicy;
use crate::error::{CodecError, Result};
use crate::tagger::{TagVocabulary, DEFAULT_LABELS};

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Rótulos de entidade, na ordem que define os ids das tags.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    #[serde(default)]
    pub score_aggregation: ScoreAggregation,
    #[serde(default)]
    pub keep_outside: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
            overlap_policy: OverlapPolicy::default(),
            score_aggregation: ScoreAggregation::default(),
            keep_outside: false,
        }
    }
}

impl CodecConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CodecError::configuration(e.to_string()))
    }

    /// Constrói o vocabulário a partir de `labels`.
    pub fn vocabulary(&self) -> Result<TagVocabulary> {
        TagVocabulary::new(self.labels.iter().cloned())
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            aggregation: self.score_aggregation,
            keep_outside: self.keep_outside,
        }
    }
}
