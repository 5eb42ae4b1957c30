//! # Decodificador Tags → Entidades e Fusão de Fragmentos
//!
//! Caminho de inferência:
//!
//! 1. **Agregação** ([`aggregate_tags`]): tokens com tags BIOUL previstas viram
//!    grupos com rótulo nu (`MALWARE`), score médio e offsets do grupo. É o
//!    equivalente à estratégia "simple" do pipeline de inferência.
//! 2. **Fusão** ([`merge_predictions`]): repara a fragmentação que sobra da
//!    agregação (ex: `"Troj"` + `"an"` vindos de grupos distintos) com uma
//!    máquina de estados explícita ([`MergeState`]).
//!
//! ## Regras de fusão
//!
//! | Situação                                         | Ação                          |
//! |--------------------------------------------------|-------------------------------|
//! | nenhuma entidade aberta                          | abre acumulador               |
//! | mesmo rótulo, `start == end` atual               | concatena sem separador       |
//! | mesmo rótulo, `start == end + 1`                 | concatena com um espaço       |
//! | qualquer outro caso                              | fecha a atual e abre outra    |
//!
//! O score de uma fusão é a média **par a par** `(atual + novo) / 2`, que
//! pesa mais os fragmentos finais. [`ScoreAggregation::RunningMean`] usa a
//! média verdadeira `soma / n`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CodecError, Result};
use crate::tagger::{Prefix, Tag};

/// Rótulo dos grupos "fora de entidade".
pub const OUTSIDE_LABEL: &str = "O";

/// Uma predição por token de superfície, com rótulo já sem prefixo BIOUL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedToken {
    pub label: String,
    pub score: f64,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
}

impl PredictedToken {
    pub fn new(label: &str, text: &str, score: f64, start: usize, end: usize) -> Self {
        Self {
            label: label.to_string(),
            score,
            start,
            end,
            text: text.to_string(),
        }
    }

    /// Verifica `score ∈ [0, 1]` e `start <= end`.
    pub fn validate(&self, index: usize) -> Result<()> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(CodecError::malformed(
                index,
                format!("score {} fora de [0, 1]", self.score),
            ));
        }
        if self.end < self.start {
            return Err(CodecError::malformed(
                index,
                format!("end {} < start {}", self.end, self.start),
            ));
        }
        Ok(())
    }
}

/// Entidade reconstruída sobre a sequência original de predições.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEntity {
    pub text: String,
    pub label: String,
    pub score: f64,
    pub start: usize,
    pub end: usize,
}

/// Como combinar os scores dos fragmentos fundidos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAggregation {
    /// `(atual + novo) / 2` a cada fusão (comportamento histórico).
    #[default]
    PairwiseMean,
    /// Média aritmética de todos os fragmentos.
    RunningMean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeOptions {
    #[serde(default)]
    pub aggregation: ScoreAggregation,
    /// Mantém na saída os grupos rotulados `O` (descartados por padrão).
    #[serde(default)]
    pub keep_outside: bool,
}

/// Predição recusada pelo merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedPrediction {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub entities: Vec<MergedEntity>,
    pub rejected: Vec<RejectedPrediction>,
}

/// Marcadores de sub-palavra dos tokenizadores (BPE `Ġ`, SentencePiece `▁`,
/// WordPiece `##`).
fn subword_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"^##|[Ġ▁]").expect("regex de marcador válida"))
}

/// Texto de um fragmento que inicia entidade: marcadores viram espaço e as
/// bordas são aparadas.
fn clean_text(raw: &str) -> String {
    subword_marker().replace_all(raw, " ").trim().to_string()
}

/// Texto de um fragmento colado sem separador: marcadores são removidos.
fn glued_text(raw: &str) -> String {
    subword_marker().replace_all(raw, "").into_owned()
}

/// Como um fragmento se liga à entidade aberta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joint {
    /// `start == end`: continuação de sub-palavra
    Direct,
    /// `start == end + 1`: separado por um único caractere (espaço)
    Space,
}

/// Entidade em construção.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    label: String,
    text: String,
    score: f64,
    score_sum: f64,
    parts: usize,
    start: usize,
    end: usize,
}

impl Accumulator {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Faixa `[start, end)` coberta até agora
    pub fn range(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    fn open(token: &PredictedToken) -> Self {
        Self {
            label: token.label.clone(),
            text: clean_text(&token.text),
            score: token.score,
            score_sum: token.score,
            parts: 1,
            start: token.start,
            end: token.end,
        }
    }

    fn joint(&self, token: &PredictedToken) -> Option<Joint> {
        if token.label != self.label {
            return None;
        }
        if token.start == self.end {
            Some(Joint::Direct)
        } else if token.start == self.end + 1 {
            Some(Joint::Space)
        } else {
            None
        }
    }

    fn absorb(&mut self, token: &PredictedToken, joint: Joint, aggregation: ScoreAggregation) {
        match joint {
            Joint::Direct => self.text.push_str(&glued_text(&token.text)),
            Joint::Space => {
                self.text.push(' ');
                self.text.push_str(&clean_text(&token.text));
            }
        }
        self.end = token.end;
        self.parts += 1;
        self.score_sum += token.score;
        self.score = match aggregation {
            ScoreAggregation::PairwiseMean => (self.score + token.score) / 2.0,
            ScoreAggregation::RunningMean => self.score_sum / self.parts as f64,
        };
    }

    fn close(self) -> MergedEntity {
        MergedEntity {
            text: self.text,
            label: self.label,
            score: self.score,
            start: self.start,
            end: self.end,
        }
    }
}

/// Estado do merger: vazio ou acumulando uma entidade.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MergeState {
    #[default]
    Empty,
    Accumulating(Accumulator),
}

/// Máquina de estados que funde predições adjacentes do mesmo rótulo.
///
/// ```
/// use cti_core::decoder::{Merger, MergeOptions, PredictedToken};
///
/// let mut merger = Merger::new(MergeOptions::default());
/// merger.push(&PredictedToken::new("MALWARE", "Troj", 0.9, 0, 4)).unwrap();
/// merger.push(&PredictedToken::new("MALWARE", "an", 0.8, 4, 6)).unwrap();
/// let outcome = merger.finish();
/// assert_eq!(outcome.entities[0].text, "Trojan");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Merger {
    state: MergeState,
    options: MergeOptions,
    position: usize,
    outcome: MergeOutcome,
}

impl Merger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &MergeState {
        &self.state
    }

    /// Consome a próxima predição.
    ///
    /// Uma predição malformada fecha a entidade aberta como está, é registrada
    /// em [`MergeOutcome::rejected`] e o erro é devolvido; o merger continua
    /// utilizável para as predições seguintes.
    pub fn push(&mut self, token: &PredictedToken) -> Result<()> {
        let index = self.position;
        self.position += 1;

        if let Err(err) = token.validate(index) {
            warn!(index, error = %err, "predição rejeitada");
            self.flush();
            self.outcome.rejected.push(RejectedPrediction {
                index,
                reason: err.to_string(),
            });
            return Err(err);
        }

        self.state = match std::mem::take(&mut self.state) {
            MergeState::Empty => MergeState::Accumulating(Accumulator::open(token)),
            MergeState::Accumulating(mut current) => match current.joint(token) {
                Some(joint) => {
                    current.absorb(token, joint, self.options.aggregation);
                    MergeState::Accumulating(current)
                }
                None => {
                    self.emit(current);
                    MergeState::Accumulating(Accumulator::open(token))
                }
            },
        };
        Ok(())
    }

    fn flush(&mut self) {
        if let MergeState::Accumulating(current) = std::mem::take(&mut self.state) {
            self.emit(current);
        }
    }

    fn emit(&mut self, current: Accumulator) {
        if current.label == OUTSIDE_LABEL && !self.options.keep_outside {
            return;
        }
        self.outcome.entities.push(current.close());
    }

    /// Fecha a entidade aberta (se houver) e devolve o resultado.
    pub fn finish(mut self) -> MergeOutcome {
        self.flush();
        self.outcome
    }
}

/// Funde uma sequência de predições, na ordem de entrada.
pub fn merge_predictions(tokens: &[PredictedToken], options: MergeOptions) -> MergeOutcome {
    let mut merger = Merger::new(options);
    for token in tokens {
        // Rejeições ficam registradas no próprio resultado.
        let _ = merger.push(token);
    }
    merger.finish()
}

/// Grupo em formação durante a agregação BIOUL.
struct Group {
    label: String,
    text: String,
    score_sum: f64,
    parts: usize,
    start: usize,
    end: usize,
    closed: bool,
}

impl Group {
    fn into_prediction(self) -> PredictedToken {
        PredictedToken {
            label: self.label,
            score: self.score_sum / self.parts as f64,
            start: self.start,
            end: self.end,
            text: self.text,
        }
    }
}

/// Agrega predições por token com tags BIOUL (`label` = `"B-MALWARE"` etc.) em
/// grupos de rótulo nu.
///
/// - `B-X` e `U-X` sempre abrem grupo novo; `U-X` e `L-X` o fecham.
/// - `I-X`/`L-X` continuam o grupo aberto de mesmo rótulo, ou abrem um novo
///   se não houver (predições nem sempre respeitam a gramática).
/// - Tokens `O` são descartados.
/// - Marcadores de sub-palavra saem de cada token: colado ao anterior
///   (`start == end`) o texto entra sem separador, com lacuna entra após um
///   único espaço.
///
/// Tags que não parseiam ou scores/offsets inválidos resultam em
/// [`CodecError::MalformedPrediction`].
pub fn aggregate_tags(tokens: &[PredictedToken]) -> Result<Vec<PredictedToken>> {
    let mut groups: Vec<PredictedToken> = Vec::new();
    let mut current: Option<Group> = None;

    for (index, token) in tokens.iter().enumerate() {
        token.validate(index)?;
        let tag = Tag::parse(&token.label)
            .ok_or_else(|| CodecError::malformed(index, format!("tag '{}' inválida", token.label)))?;

        let Tag::Entity { prefix, label } = tag else {
            if let Some(group) = current.take() {
                groups.push(group.into_prediction());
            }
            continue;
        };

        let continues = matches!(prefix, Prefix::Inside | Prefix::Last)
            && current
                .as_ref()
                .is_some_and(|g| !g.closed && g.label == label);

        if continues {
            if let Some(group) = current.as_mut() {
                if token.start > group.end {
                    group.text.push(' ');
                    group.text.push_str(&clean_text(&token.text));
                } else {
                    group.text.push_str(&glued_text(&token.text));
                }
                group.score_sum += token.score;
                group.parts += 1;
                group.end = token.end;
                group.closed = prefix == Prefix::Last;
            }
        } else {
            if let Some(group) = current.take() {
                groups.push(group.into_prediction());
            }
            current = Some(Group {
                label,
                text: clean_text(&token.text),
                score_sum: token.score,
                parts: 1,
                start: token.start,
                end: token.end,
                closed: matches!(prefix, Prefix::Last | Prefix::Unit),
            });
        }
    }

    if let Some(group) = current {
        groups.push(group.into_prediction());
    }
    Ok(groups)
}
