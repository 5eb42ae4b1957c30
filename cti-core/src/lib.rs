//! # cti-core — Codec Span ↔ Tags BIOUL para NER de Inteligência de Ameaças
//!
//! Este crate implementa a conversão bidirecional, sem perdas, entre anotações
//! de entidades em offsets de caractere e tags por token no esquema **BIOUL**
//! consumido e emitido pelo modelo de rotulagem de sequência.
//!
//! ## Onde o codec entra no pipeline
//!
//! 1.  **Gerador sintético**: sentenças já em palavras → [`encoder::encode_word_segments`].
//! 2.  **Anotador LLM**: `{ text, entities: [{text, label}] }` → offsets
//!     ([`records::AnnotatedSentence`]) → tokens do tokenizador externo →
//!     [`encoder::encode_record`].
//! 3.  **Treino**: tags por palavra → label ids por sub-token ([`aligner`]).
//! 4.  **Inferência**: tags previstas → grupos ([`decoder::aggregate_tags`]) →
//!     entidades fundidas e pontuadas ([`decoder::merge_predictions`]).
//!
//! Tokenização, treino e chamadas ao LLM ficam fora: o codec recebe tokens com
//! offsets prontos e devolve estruturas serializáveis.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use cti_core::{encode_spans, CharSpan, OverlapPolicy, TagVocabulary, Token};
//!
//! // 1. Vocabulário criado uma vez na inicialização
//! let vocab = TagVocabulary::cti_default();
//!
//! // 2. Tokens do tokenizador externo (offsets em caracteres)
//! let tokens = vec![
//!     Token::new("Emotet", 0, 6),
//!     Token::new("hit", 7, 10),
//!     Token::new("evil", 11, 15),
//!     Token::new(".com", 15, 19),
//! ];
//! let spans = vec![CharSpan::new(0, 6, "MALWARE"), CharSpan::new(11, 19, "DOMAIN")];
//!
//! // 3. Uma tag por token
//! let encoded = encode_spans(&vocab, &tokens, &spans, OverlapPolicy::Reject).unwrap();
//! let tags: Vec<String> = encoded.tags.iter().map(|t| t.label()).collect();
//! assert_eq!(tags, ["U-MALWARE", "O", "B-DOMAIN", "L-DOMAIN"]);
//! ```
//!
//! ## Módulos Principais
//!
//! - [`tagger`]: esquema BIOUL e vocabulário tag ↔ id.
//! - [`encoder`]: spans de caractere → tags.
//! - [`aligner`]: tags de palavra → label ids de sub-token.
//! - [`decoder`]: predições → entidades fundidas.
//! - [`batch`]: processamento paralelo com contagem de falhas por registro.

pub mod aligner;
pub mod batch;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod offset;
pub mod records;
pub mod tagger;

pub use aligner::{align_word_tags, restore_word_tags, IGNORE_INDEX};
pub use config::CodecConfig;
pub use decoder::{
    aggregate_tags, merge_predictions, MergeOptions, MergeOutcome, MergedEntity, Merger,
    PredictedToken, ScoreAggregation,
};
pub use encoder::{bioul_tags, encode_record, encode_spans, encode_word_segments, OverlapPolicy};
pub use error::{CodecError, Result};
pub use offset::{locate_entity, CharSpan, Token};
pub use tagger::{Prefix, Tag, TagVocabulary};
