//! Propriedades do codec para qualquer sentença gerada.
//!
//! As sentenças são montadas palavra a palavra (um token por palavra, um
//! espaço entre palavras) e cada entidade é seguida de uma palavra `O`, de modo
//! que duas entidades de mesmo rótulo nunca ficam adjacentes.

use cti_core::tagger::DEFAULT_LABELS as LABELS;
use cti_core::{
    aggregate_tags, align_word_tags, encode_spans, merge_predictions, CharSpan, MergeOptions,
    OverlapPolicy, PredictedToken, Prefix, Tag, TagVocabulary, Token, IGNORE_INDEX,
};
use proptest::prelude::*;

struct Sentence {
    tokens: Vec<Token>,
    spans: Vec<CharSpan>,
}

/// `(rótulo, nº de palavras)` por entidade, com `lead` palavras `O` antes.
fn build(lead: usize, entities: &[(usize, usize)]) -> Sentence {
    let mut tokens = Vec::new();
    let mut spans = Vec::new();
    let mut cursor = 0;
    let mut push_word = |tokens: &mut Vec<Token>, word: String| {
        if !tokens.is_empty() {
            cursor += 1;
        }
        let start = cursor;
        cursor += word.chars().count();
        tokens.push(Token::new(word, start, cursor));
        (start, cursor)
    };

    for i in 0..lead {
        push_word(&mut tokens, format!("ctx{i}"));
    }
    for (n, &(label, words)) in entities.iter().enumerate() {
        let mut bounds = (0, 0);
        for w in 0..words {
            let (start, end) = push_word(&mut tokens, format!("e{n}w{w}"));
            if w == 0 {
                bounds.0 = start;
            }
            bounds.1 = end;
        }
        spans.push(CharSpan::new(bounds.0, bounds.1, LABELS[label]));
        push_word(&mut tokens, "and".to_string());
    }
    Sentence { tokens, spans }
}

fn entities_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..LABELS.len(), 1..=4usize), 0..=6)
}

proptest! {
    #[test]
    fn spans_survive_encode_then_decode(lead in 0..=3usize, entities in entities_strategy()) {
        let vocab = TagVocabulary::cti_default();
        let sentence = build(lead, &entities);

        let encoded = encode_spans(&vocab, &sentence.tokens, &sentence.spans, OverlapPolicy::Reject).unwrap();
        prop_assert!(encoded.unaligned.is_empty());
        prop_assert_eq!(encoded.tags.len(), sentence.tokens.len());

        let predictions: Vec<PredictedToken> = sentence
            .tokens
            .iter()
            .zip(&encoded.tags)
            .map(|(token, tag)| PredictedToken::new(&tag.label(), &token.text, 1.0, token.start, token.end))
            .collect();
        let groups = aggregate_tags(&predictions).unwrap();
        let outcome = merge_predictions(&groups, MergeOptions::default());

        prop_assert!(outcome.rejected.is_empty());
        let decoded: Vec<(usize, usize, String)> = outcome
            .entities
            .iter()
            .map(|e| (e.start, e.end, e.label.clone()))
            .collect();
        let expected: Vec<(usize, usize, String)> = sentence
            .spans
            .iter()
            .map(|s| (s.start, s.end, s.label.clone()))
            .collect();
        prop_assert_eq!(decoded, expected);
        for entity in &outcome.entities {
            prop_assert!((entity.score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn entity_tags_follow_bioul_shape(lead in 0..=3usize, entities in entities_strategy()) {
        let vocab = TagVocabulary::cti_default();
        let sentence = build(lead, &entities);
        let encoded = encode_spans(&vocab, &sentence.tokens, &sentence.spans, OverlapPolicy::Reject).unwrap();

        // Cada tag emitida existe no vocabulário.
        for tag in &encoded.tags {
            prop_assert!(vocab.tag_id(tag).is_ok());
        }
        for pair in encoded.tags.windows(2) {
            prop_assert!(Tag::is_valid_transition(&pair[0], &pair[1]));
        }

        for span in &sentence.spans {
            let covered: Vec<&Tag> = sentence
                .tokens
                .iter()
                .zip(&encoded.tags)
                .filter(|(t, _)| t.overlaps(span.start, span.end))
                .map(|(_, tag)| tag)
                .collect();
            let prefixes: Vec<Prefix> = covered.iter().filter_map(|t| t.prefix()).collect();
            prop_assert_eq!(prefixes.len(), covered.len());
            if covered.len() == 1 {
                prop_assert_eq!(prefixes[0], Prefix::Unit);
            } else {
                prop_assert_eq!(prefixes[0], Prefix::Begin);
                prop_assert_eq!(prefixes[prefixes.len() - 1], Prefix::Last);
                for p in &prefixes[1..prefixes.len() - 1] {
                    prop_assert_eq!(*p, Prefix::Inside);
                }
            }
            for tag in covered {
                prop_assert_eq!(tag.entity_label(), Some(span.label.as_str()));
            }
        }
    }

    #[test]
    fn span_inside_whitespace_leaves_everything_outside(words in 2..=8usize, gap in 0..7usize) {
        let vocab = TagVocabulary::cti_default();
        let sentence = build(words, &[]);
        let gap = gap % (words - 1);
        // Espaço entre a palavra `gap` e a seguinte.
        let at = sentence.tokens[gap].end;
        let spans = vec![CharSpan::new(at, at + 1, "TOOL")];

        let encoded = encode_spans(&vocab, &sentence.tokens, &spans, OverlapPolicy::Reject).unwrap();
        prop_assert!(encoded.tags.iter().all(|t| *t == Tag::Outside));
        prop_assert_eq!(encoded.unaligned.len(), 1);
    }

    #[test]
    fn only_first_subtoken_of_each_word_is_labeled(
        pieces in prop::collection::vec(1..=3usize, 1..=8),
        specials in 0..=2usize,
    ) {
        let vocab = TagVocabulary::cti_default();
        let word_tags: Vec<&str> = (0..pieces.len())
            .map(|i| if i % 2 == 0 { "U-MALWARE" } else { "O" })
            .collect();

        let mut word_ids = vec![None; specials];
        for (word, &n) in pieces.iter().enumerate() {
            word_ids.extend(std::iter::repeat(Some(word)).take(n));
        }
        word_ids.push(None);

        let labels = align_word_tags(&vocab, &word_tags, &word_ids).unwrap();
        prop_assert_eq!(labels.len(), word_ids.len());

        let labeled: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l != IGNORE_INDEX)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(labeled.len(), pieces.len());
        for (word, &position) in labeled.iter().enumerate() {
            prop_assert_eq!(word_ids[position], Some(word));
            let expected = vocab.id_of(word_tags[word]).unwrap() as i64;
            prop_assert_eq!(labels[position], expected);
        }
    }

    #[test]
    fn vocabulary_ids_are_dense_and_bijective(count in 1..=LABELS.len()) {
        let vocab = TagVocabulary::new(LABELS[..count].iter().copied()).unwrap();
        prop_assert_eq!(vocab.len(), 4 * count + 1);
        prop_assert_eq!(vocab.tag_of(TagVocabulary::OUTSIDE_ID), Some("O"));
        for id in 0..vocab.len() {
            let tag = vocab.tag_of(id).unwrap();
            prop_assert_eq!(vocab.id_of(tag), Some(id));
        }
        prop_assert_eq!(vocab.tag_of(vocab.len()), None);
    }
}
