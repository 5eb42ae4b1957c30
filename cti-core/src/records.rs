//! # Registros de Fronteira
//!
//! Formatos trocados com os scripts ao redor do codec (JSON por linha ou
//! array de objetos). O codec em si não lê nem escreve arquivos: quem chama
//! decide a serialização.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::offset::{locate_entity, CharSpan, Token};
use crate::tagger::Tag;

/// Texto com entidades em offsets de caractere (entrada do codificador).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<CharSpan>,
}

/// [`SpanRecord`] acompanhado dos tokens e offsets do tokenizador.
///
/// O `text` de cada token é opcional: vazio, ele é recortado de `text` pelos
/// offsets na codificação.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedRecord {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<CharSpan>,
    pub tokens: Vec<Token>,
}

/// Registro de treino: `{ tokens, ner_tags }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSequenceRecord {
    pub tokens: Vec<String>,
    pub ner_tags: Vec<Tag>,
}

/// Entrada do alinhador de sub-tokens.
///
/// `word_ids[i]` é a palavra de origem do sub-token `i` (`null` para tokens
/// estruturais como `[CLS]`/`[SEP]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignRecord {
    pub ner_tags: Vec<String>,
    pub word_ids: Vec<Option<usize>>,
}

/// Entidade devolvida pelo anotador LLM: texto literal + rótulo, sem offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedEntity {
    pub text: String,
    pub label: String,
}

/// Sentença anotada pelo LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedSentence {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<AnnotatedEntity>,
}

impl AnnotatedSentence {
    /// Converte as entidades em offsets localizando cada uma na sentença.
    ///
    /// Entidades que o LLM não copiou literalmente são descartadas com aviso.
    pub fn to_span_record(&self) -> SpanRecord {
        let entities = self
            .entities
            .iter()
            .filter_map(|entity| {
                let located = locate_entity(&self.text, &entity.text, &entity.label);
                if located.is_none() {
                    warn!(
                        entity = %entity.text,
                        label = %entity.label,
                        "entidade não encontrada literalmente na sentença"
                    );
                }
                located
            })
            .collect();

        SpanRecord {
            text: self.text.clone(),
            entities,
        }
    }
}
