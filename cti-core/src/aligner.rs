//! # Alinhamento Palavra → Sub-token
//!
//! Quando o texto já vem segmentado em palavras (cada uma com sua tag) e o
//! tokenizador do modelo quebra palavras em sub-tokens, apenas o **primeiro**
//! sub-token de cada palavra recebe o id da tag. Os demais, e os tokens
//! estruturais, recebem [`IGNORE_INDEX`], que a função de perda ignora.
//!
//! ```text
//! palavras:   Emotet        dropped  TrickBot
//! tags:       U-MALWARE     O        U-MALWARE
//! sub-tokens: [CLS] Em ##otet dropped Trick ##Bot [SEP]
//! word_ids:   None  0  0      1       2     2     None
//! labels:     -100  8  -100   0       8     -100  -100
//! ```

use crate::error::{CodecError, Result};
use crate::tagger::TagVocabulary;

/// Marcador "fora da perda". Não é `O`: `O` é uma classe treinável.
pub const IGNORE_INDEX: i64 = -100;

/// Produz um label id por sub-token.
///
/// Falha com [`CodecError::LabelLookup`] se a tag de uma palavra não existe no
/// vocabulário (descompasso vocabulário/dados: nunca adivinhamos) e com
/// [`CodecError::WordIndexOutOfRange`] se `word_ids` aponta para além de
/// `word_tags`.
pub fn align_word_tags<S: AsRef<str>>(
    vocab: &TagVocabulary,
    word_tags: &[S],
    word_ids: &[Option<usize>],
) -> Result<Vec<i64>> {
    let mut labeled = vec![false; word_tags.len()];
    let mut labels = Vec::with_capacity(word_ids.len());

    for word_id in word_ids {
        let Some(word) = *word_id else {
            labels.push(IGNORE_INDEX);
            continue;
        };
        if word >= word_tags.len() {
            return Err(CodecError::WordIndexOutOfRange {
                word,
                words: word_tags.len(),
            });
        }
        if labeled[word] {
            labels.push(IGNORE_INDEX);
            continue;
        }

        let tag = word_tags[word].as_ref();
        let id = vocab.id_of(tag).ok_or_else(|| CodecError::label_lookup(tag))?;
        labeled[word] = true;
        labels.push(id as i64);
    }

    Ok(labels)
}

/// Caminho inverso usado antes das métricas: descarta as posições cujo label
/// de referência é [`IGNORE_INDEX`] e devolve `(predito, referência)` como
/// tags textuais, uma por palavra.
pub fn restore_word_tags<'v>(
    vocab: &'v TagVocabulary,
    predicted_ids: &[usize],
    label_ids: &[i64],
) -> Result<(Vec<&'v str>, Vec<&'v str>)> {
    if predicted_ids.len() != label_ids.len() {
        return Err(CodecError::LengthMismatch {
            left: predicted_ids.len(),
            right: label_ids.len(),
        });
    }

    let lookup = |id: i64| {
        usize::try_from(id)
            .ok()
            .and_then(|id| vocab.tag_of(id))
            .ok_or_else(|| CodecError::label_lookup(id.to_string()))
    };

    let mut predicted = Vec::new();
    let mut gold = Vec::new();
    for (&pred, &label) in predicted_ids.iter().zip(label_ids) {
        if label == IGNORE_INDEX {
            continue;
        }
        gold.push(lookup(label)?);
        predicted.push(lookup(pred as i64)?);
    }
    Ok((predicted, gold))
}
