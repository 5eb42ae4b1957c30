//! # Erros do Codec
//!
//! Taxonomia de falhas da conversão span ↔ tags. Spans não alinháveis NÃO são
//! erros: viram avisos ([`crate::encoder::UnalignableSpan`]) e o registro segue.

use thiserror::Error;

/// Resultado padrão das operações do codec.
pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CodecError {
    /// Vocabulário ou configuração inválidos (lista vazia, rótulos duplicados...).
    /// Fatal: surge na inicialização e nunca é recuperado.
    #[error("configuração inválida: {0}")]
    Configuration(String),

    /// Tag (ou id) ausente do vocabulário. Aborta o registro inteiro.
    #[error("tag '{tag}' não existe no vocabulário")]
    LabelLookup { tag: String },

    /// Predição com offsets ou score fora dos invariantes.
    #[error("predição malformada na posição {index}: {reason}")]
    MalformedPrediction { index: usize, reason: String },

    /// Dois spans de entrada disputam o mesmo trecho do texto.
    #[error("spans sobrepostos: [{}, {}) e [{}, {})", first.0, first.1, second.0, second.1)]
    OverlappingSpans {
        first: (usize, usize),
        second: (usize, usize),
    },

    /// Span fora de `0 <= start < end <= len`.
    #[error("span inválido [{start}, {end}) para texto de {len} caracteres")]
    InvalidSpan { start: usize, end: usize, len: usize },

    /// Mapeamento sub-token → palavra aponta para uma palavra inexistente.
    #[error("palavra {word} fora do intervalo (apenas {words} palavras)")]
    WordIndexOutOfRange { word: usize, words: usize },

    /// Sequências paralelas com comprimentos diferentes.
    #[error("comprimentos incompatíveis: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
}

impl CodecError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn label_lookup(tag: impl Into<String>) -> Self {
        Self::LabelLookup { tag: tag.into() }
    }

    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedPrediction {
            index,
            reason: reason.into(),
        }
    }
}
