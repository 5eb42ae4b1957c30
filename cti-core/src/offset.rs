//! # Offsets, Tokens e Spans de Caracteres
//!
//! Todas as posições do codec são **índices de caractere** (não de byte), no
//! mesmo referencial usado pelo tokenizador externo e pelo anotador LLM.
//! Texto com acentos ou emoji (`"café"`, `"€50"`) tem bytes ≠ caracteres, e
//! misturar as duas unidades desloca as entidades silenciosamente.
//!
//! ```text
//!   texto:  c  a  f  é     €  5  0
//!   char:   0  1  2  3  4  5  6  7
//!   byte:   0  1  2  3  5  6  9  10
//! ```
//!
//! [`CharIndex`] converte entre as duas unidades quando é preciso fatiar um `&str`.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Um token produzido pelo tokenizador externo.
///
/// `[start, end)` em caracteres do texto de origem. Tokens especiais
/// (`[CLS]`, `<s>`) costumam vir com offsets `(0, 0)` e nunca cobrem um span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Interseção aberta: tokens apenas adjacentes ao intervalo não contam.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && self.end > start
    }
}

/// Uma anotação de entidade como intervalo `[start, end)` de caracteres.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl CharSpan {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    /// Verifica `0 <= start < end <= len` para um texto de `len` caracteres.
    pub fn validate(&self, len: usize) -> Result<()> {
        if self.start >= self.end || self.end > len {
            return Err(CodecError::InvalidSpan {
                start: self.start,
                end: self.end,
                len,
            });
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &CharSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Tabela de conversão char ↔ byte para um texto.
pub struct CharIndex<'a> {
    text: &'a str,
    /// `byte_offsets[i]` = byte onde começa o i-ésimo caractere; o último
    /// elemento é `text.len()`.
    byte_offsets: Vec<usize>,
}

impl<'a> CharIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_offsets.push(text.len());
        Self { text, byte_offsets }
    }

    /// Número de caracteres do texto
    pub fn char_len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    pub fn char_to_byte(&self, char_pos: usize) -> Option<usize> {
        self.byte_offsets.get(char_pos).copied()
    }

    /// Posição em caracteres de um offset de byte. `None` se o byte cair no
    /// meio de um caractere multi-byte.
    pub fn byte_to_char(&self, byte_pos: usize) -> Option<usize> {
        self.byte_offsets.binary_search(&byte_pos).ok()
    }

    /// Fatia o texto por um intervalo de caracteres.
    pub fn slice(&self, start: usize, end: usize) -> Option<&'a str> {
        if start > end {
            return None;
        }
        let from = self.char_to_byte(start)?;
        let to = self.char_to_byte(end)?;
        self.text.get(from..to)
    }
}

/// Localiza a primeira ocorrência de `entity_text` em `sentence`.
///
/// É o passo que converte a saída do anotador LLM (`{ text, label }`) em um
/// [`CharSpan`]. Retorna `None` quando o trecho não aparece literalmente na
/// sentença (o LLM parafraseou) ou quando está vazio.
pub fn locate_entity(sentence: &str, entity_text: &str, label: &str) -> Option<CharSpan> {
    if entity_text.is_empty() {
        return None;
    }
    let byte_start = sentence.find(entity_text)?;
    let start = CharIndex::new(sentence).byte_to_char(byte_start)?;
    let end = start + entity_text.chars().count();
    Some(CharSpan::new(start, end, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_overlap_is_open() {
        let token = Token::new("Emotet", 5, 11);
        assert!(token.overlaps(0, 6));
        assert!(token.overlaps(10, 20));
        assert!(!token.overlaps(0, 5));
        assert!(!token.overlaps(11, 15));
        assert!(!Token::new("[CLS]", 0, 0).overlaps(0, 3));
    }

    #[test]
    fn test_span_validation() {
        assert!(CharSpan::new(0, 4, "TOOL").validate(4).is_ok());
        assert_eq!(
            CharSpan::new(3, 3, "TOOL").validate(10),
            Err(CodecError::InvalidSpan { start: 3, end: 3, len: 10 })
        );
        assert!(CharSpan::new(2, 11, "TOOL").validate(10).is_err());
    }

    #[test]
    fn test_char_index_multibyte() {
        let text = "café €50";
        let index = CharIndex::new(text);
        assert_eq!(index.char_len(), 8);
        assert_eq!(index.char_to_byte(4), Some(5));
        assert_eq!(index.byte_to_char(6), Some(5));
        assert_eq!(index.byte_to_char(4), None);
        assert_eq!(index.slice(5, 8), Some("€50"));
        assert_eq!(index.slice(0, 9), None);
    }

    #[test]
    fn test_locate_entity_uses_char_offsets() {
        let sentence = "Ação do APT28 contra evil.com";
        let span = locate_entity(sentence, "APT28", "CTI_GROUP").unwrap();
        assert_eq!(span, CharSpan::new(8, 13, "CTI_GROUP"));
        assert_eq!(CharIndex::new(sentence).slice(span.start, span.end), Some("APT28"));
        assert_eq!(locate_entity(sentence, "APT29", "CTI_GROUP"), None);
        assert_eq!(locate_entity(sentence, "", "CTI_GROUP"), None);
    }
}
