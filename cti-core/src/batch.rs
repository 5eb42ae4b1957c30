//! # Processamento em Lote
//!
//! Cada registro é independente: o lote é um `map` paralelo (Rayon) sobre os
//! registros, compartilhando apenas o vocabulário somente-leitura. Um registro
//! com erro vira [`RecordOutcome::Failed`] e nunca interrompe os demais.

use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::aligner::align_word_tags;
use crate::decoder::{aggregate_tags, merge_predictions, MergeOptions, MergeOutcome, PredictedToken};
use crate::encoder::{encode_record, EncodedRecord, OverlapPolicy};
use crate::error::{CodecError, Result};
use crate::records::{AlignRecord, TokenizedRecord};
use crate::tagger::TagVocabulary;

fn serialize_display<S: Serializer>(err: &CodecError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(err)
}

/// Resultado de um registro do lote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome<T> {
    Ok {
        index: usize,
        output: T,
    },
    Failed {
        index: usize,
        #[serde(serialize_with = "serialize_display")]
        error: CodecError,
    },
}

impl<T> RecordOutcome<T> {
    pub fn index(&self) -> usize {
        match self {
            RecordOutcome::Ok { index, .. } | RecordOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn output(&self) -> Option<&T> {
        match self {
            RecordOutcome::Ok { output, .. } => Some(output),
            RecordOutcome::Failed { .. } => None,
        }
    }
}

/// Relatório do lote com contagens de sucesso/falha.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T> {
    pub records: Vec<RecordOutcome<T>>,
    pub succeeded: usize,
    pub failed: usize,
    /// Avisos não fatais somados (spans inalinháveis, predições rejeitadas)
    pub warnings: usize,
}

/// Executa `job` em paralelo sobre `inputs`. `job` devolve a saída e o número
/// de avisos do registro.
fn run_batch<I, T, F>(kind: &str, inputs: &[I], job: F) -> BatchReport<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<(T, usize)> + Sync,
{
    let results: Vec<(RecordOutcome<T>, usize)> = inputs
        .par_iter()
        .enumerate()
        .map(|(index, input)| match job(input) {
            Ok((output, warnings)) => (RecordOutcome::Ok { index, output }, warnings),
            Err(error) => (RecordOutcome::Failed { index, error }, 0),
        })
        .collect();

    let mut report = BatchReport {
        records: Vec::with_capacity(results.len()),
        succeeded: 0,
        failed: 0,
        warnings: 0,
    };
    for (outcome, warnings) in results {
        match outcome {
            RecordOutcome::Ok { .. } => report.succeeded += 1,
            RecordOutcome::Failed { .. } => report.failed += 1,
        }
        report.warnings += warnings;
        report.records.push(outcome);
    }

    debug!(
        kind,
        succeeded = report.succeeded,
        failed = report.failed,
        warnings = report.warnings,
        "lote processado"
    );
    report
}

/// Codifica registros tokenizados em `{ tokens, ner_tags }`.
pub fn encode_batch(
    vocab: &TagVocabulary,
    records: &[TokenizedRecord],
    policy: OverlapPolicy,
) -> BatchReport<EncodedRecord> {
    run_batch("encode", records, |record| {
        let encoded = encode_record(vocab, record, policy)?;
        let warnings = encoded.unaligned.len();
        Ok((encoded, warnings))
    })
}

/// Alinha tags de palavra aos sub-tokens, um vetor de label ids por registro.
pub fn align_batch(vocab: &TagVocabulary, records: &[AlignRecord]) -> BatchReport<Vec<i64>> {
    run_batch("align", records, |record| {
        Ok((align_word_tags(vocab, &record.ner_tags, &record.word_ids)?, 0))
    })
}

/// Funde as predições de cada texto.
pub fn merge_batch(
    predictions: &[Vec<PredictedToken>],
    options: MergeOptions,
) -> BatchReport<MergeOutcome> {
    run_batch("merge", predictions, |tokens| {
        let outcome = merge_predictions(tokens, options);
        let warnings = outcome.rejected.len();
        Ok((outcome, warnings))
    })
}

/// Caminho completo de inferência: predições com tags BIOUL são agregadas em
/// grupos e depois fundidas. Uma tag malformada falha apenas o seu registro.
pub fn decode_batch(
    predictions: &[Vec<PredictedToken>],
    options: MergeOptions,
) -> BatchReport<MergeOutcome> {
    run_batch("decode", predictions, |tokens| {
        let groups = aggregate_tags(tokens)?;
        let outcome = merge_predictions(&groups, options);
        let warnings = outcome.rejected.len();
        Ok((outcome, warnings))
    })
}
