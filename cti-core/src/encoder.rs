//! # Codificador Span → Tags BIOUL
//!
//! Converte anotações em offsets de caractere em uma tag por token:
//!
//! 1. Para cada span, seleciona os tokens cuja faixa **intersecta** a do span
//!    (`token.start < span.end && token.end > span.start`).
//! 2. Nenhum token coberto: o span é inalinhável, vira aviso e é descartado.
//! 3. Um token: `U-X`. N tokens: `B-X`, `I-X` × (N-2), `L-X`.
//! 4. Posições não tocadas ficam `O`.
//!
//! ## Exemplo
//! ```text
//! texto:   "APT28 used Cobalt Strike"
//! tokens:  APT | 28 | used | Cobalt | Strike
//! spans:   [0,5) CTI_GROUP, [11,24) MALWARE
//! tags:    B-CTI_GROUP L-CTI_GROUP O B-MALWARE L-MALWARE
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CodecError, Result};
use crate::offset::{CharIndex, CharSpan, Token};
use crate::records::{TagSequenceRecord, TokenizedRecord};
use crate::tagger::{Prefix, Tag, TagVocabulary};

/// O que fazer quando dois spans de entrada se sobrepõem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Rejeita o registro com [`CodecError::OverlappingSpans`].
    #[default]
    Reject,
    /// Processa os spans na ordem de entrada; o span posterior sobrescreve as
    /// tags do anterior token a token. Pode gerar sequências BIOUL inválidas
    /// (ex: `B-X` seguido de `U-Y`), por isso não é o padrão.
    LastWins,
}

/// Aviso: span que não intersecta nenhum token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnalignableSpan {
    /// Posição do span na lista de entrada
    pub index: usize,
    pub span: CharSpan,
}

/// Resultado da codificação de um texto.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// Uma tag por token
    pub tags: Vec<Tag>,
    pub unaligned: Vec<UnalignableSpan>,
}

/// Sequência de tags para uma entidade de `n` tokens.
pub fn bioul_tags(label: &str, n: usize) -> Vec<Tag> {
    match n {
        0 => Vec::new(),
        1 => vec![Tag::entity(Prefix::Unit, label)],
        _ => {
            let mut tags = Vec::with_capacity(n);
            tags.push(Tag::entity(Prefix::Begin, label));
            tags.extend((0..n - 2).map(|_| Tag::entity(Prefix::Inside, label)));
            tags.push(Tag::entity(Prefix::Last, label));
            tags
        }
    }
}

/// Tokens com `start` e `end` não-decrescentes permitem busca binária.
fn is_monotonic(tokens: &[Token]) -> bool {
    tokens
        .windows(2)
        .all(|w| w[0].start <= w[1].start && w[0].end <= w[1].end)
}

/// Índices dos tokens que intersectam `[start, end)`, em ordem.
fn covered_tokens(tokens: &[Token], start: usize, end: usize, monotonic: bool) -> Vec<usize> {
    let first = if monotonic {
        tokens.partition_point(|t| t.end <= start)
    } else {
        0
    };

    let mut covered = Vec::new();
    for (i, token) in tokens.iter().enumerate().skip(first) {
        if monotonic && token.start >= end {
            break;
        }
        if token.overlaps(start, end) {
            covered.push(i);
        }
    }
    covered
}

/// Primeiro par de spans sobrepostos, se houver.
fn find_overlap(spans: &[CharSpan]) -> Option<(&CharSpan, &CharSpan)> {
    let mut sorted: Vec<&CharSpan> = spans.iter().filter(|s| s.start < s.end).collect();
    sorted.sort_by_key(|s| (s.start, s.end));

    let mut widest = *sorted.first()?;
    for &span in sorted.iter().skip(1) {
        if span.start < widest.end {
            return Some((widest, span));
        }
        if span.end > widest.end {
            widest = span;
        }
    }
    None
}

/// Codifica spans de caractere em tags BIOUL, uma por token.
///
/// Rótulos fora do vocabulário abortam com [`CodecError::LabelLookup`]; spans
/// vazios ou que não cobrem nenhum token são reportados em
/// [`Encoded::unaligned`] sem interromper o restante.
pub fn encode_spans(
    vocab: &TagVocabulary,
    tokens: &[Token],
    spans: &[CharSpan],
    policy: OverlapPolicy,
) -> Result<Encoded> {
    if let Some(span) = spans.iter().find(|s| !vocab.contains_label(&s.label)) {
        return Err(CodecError::label_lookup(span.label.as_str()));
    }
    if policy == OverlapPolicy::Reject {
        if let Some((first, second)) = find_overlap(spans) {
            return Err(CodecError::OverlappingSpans {
                first: (first.start, first.end),
                second: (second.start, second.end),
            });
        }
    }

    let monotonic = is_monotonic(tokens);
    let mut tags = vec![Tag::Outside; tokens.len()];
    let mut unaligned = Vec::new();

    for (index, span) in spans.iter().enumerate() {
        let covered = covered_tokens(tokens, span.start, span.end, monotonic);
        if covered.is_empty() {
            warn!(
                label = %span.label,
                start = span.start,
                end = span.end,
                "span não alinhado a nenhum token, descartado"
            );
            unaligned.push(UnalignableSpan {
                index,
                span: span.clone(),
            });
            continue;
        }

        // Em LastWins, a atribuição simplesmente sobrescreve o que já havia.
        for (idx, tag) in covered.iter().zip(bioul_tags(&span.label, covered.len())) {
            tags[*idx] = tag;
        }
    }

    Ok(Encoded { tags, unaligned })
}

/// Registro codificado pronto para o treino, mais os avisos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedRecord {
    #[serde(flatten)]
    pub record: TagSequenceRecord,
    pub unaligned: Vec<UnalignableSpan>,
}

/// Texto do token, recortado do registro quando o tokenizador só mandou offsets.
fn token_text(index: &CharIndex<'_>, token: &Token) -> String {
    if !token.text.is_empty() {
        return token.text.clone();
    }
    index
        .slice(token.start, token.end)
        .unwrap_or_default()
        .to_string()
}

/// Valida os spans contra o texto (em caracteres) e codifica o registro.
pub fn encode_record(
    vocab: &TagVocabulary,
    record: &TokenizedRecord,
    policy: OverlapPolicy,
) -> Result<EncodedRecord> {
    let index = CharIndex::new(&record.text);
    for span in &record.entities {
        span.validate(index.char_len())?;
    }

    let encoded = encode_spans(vocab, &record.tokens, &record.entities, policy)?;
    Ok(EncodedRecord {
        record: TagSequenceRecord {
            tokens: record.tokens.iter().map(|t| token_text(&index, t)).collect(),
            ner_tags: encoded.tags,
        },
        unaligned: encoded.unaligned,
    })
}

/// Trecho de uma sentença sintética: palavras consecutivas com rótulo opcional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSegment {
    pub words: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl WordSegment {
    pub fn plain<S: Into<String>>(words: impl IntoIterator<Item = S>) -> Self {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            label: None,
        }
    }

    pub fn entity<S: Into<String>>(label: &str, words: impl IntoIterator<Item = S>) -> Self {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            label: Some(label.to_string()),
        }
    }
}

/// Codifica uma sentença já segmentada em palavras (caminho do gerador
/// sintético): cada segmento rotulado vira uma corrida BIOUL sobre suas
/// palavras, os demais viram `O`.
pub fn encode_word_segments(
    vocab: &TagVocabulary,
    segments: &[WordSegment],
) -> Result<TagSequenceRecord> {
    let mut tokens = Vec::new();
    let mut ner_tags = Vec::new();

    for segment in segments {
        match &segment.label {
            Some(label) => {
                if !vocab.contains_label(label) {
                    return Err(CodecError::label_lookup(label.as_str()));
                }
                ner_tags.extend(bioul_tags(label, segment.words.len()));
            }
            None => ner_tags.extend(segment.words.iter().map(|_| Tag::Outside)),
        }
        tokens.extend(segment.words.iter().cloned());
    }

    Ok(TagSequenceRecord { tokens, ner_tags })
}
