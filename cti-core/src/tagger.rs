//! # Esquema de Tags BIOUL e Vocabulário de Tags
//!
//! Define o esquema de anotação **BIOUL** usado para rotular tokens e o
//! vocabulário denso (tag ↔ id) compartilhado entre treino e inferência.
//!
//! ## Rótulos de Entidade CTI (padrão)
//!
//! | Rótulo           | Exemplos                              |
//! |------------------|---------------------------------------|
//! | URL              | `http://bad.com/payload.exe`          |
//! | MALWARE          | Emotet, Cobalt Strike, TrickBot       |
//! | MITRE_TACTIC     | Initial Access, Credential Access     |
//! | MITRE_TECHNIQUE  | Spear Phishing, T1059                 |
//! | CTI_GROUP        | APT28, Lazarus Group                  |
//! | CTI_CAMPAIGN     | Operation Aurora                      |
//! | TOOL             | PowerShell, Mimikatz, PsExec          |
//! | DOMAIN           | evil.com, malicious-c2.net            |
//!
//! ## Esquema BIOUL
//!
//! - `B-TAG`: Begin — primeiro token de uma entidade com 2+ tokens
//! - `I-TAG`: Inside — tokens interiores
//! - `L-TAG`: Last — último token de uma entidade com 2+ tokens
//! - `U-TAG`: Unit — entidade de um único token
//! - `O`: Outside — não é parte de nenhuma entidade
//!
//! A ordem do vocabulário é `["O", B-L1, I-L1, L-L1, U-L1, B-L2, ...]`, na ordem
//! de declaração dos rótulos. Essa ordem É o contrato com o modelo treinado:
//! mudar a lista exige retreinar.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CodecError, Result};

/// Rótulos CTI na ordem em que o modelo original foi treinado.
pub const DEFAULT_LABELS: [&str; 8] = [
    "URL",
    "MALWARE",
    "MITRE_TACTIC",
    "MITRE_TECHNIQUE",
    "CTI_GROUP",
    "CTI_CAMPAIGN",
    "TOOL",
    "DOMAIN",
];

/// Prefixo estrutural de uma tag de entidade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prefix {
    Begin,
    Inside,
    Last,
    Unit,
}

impl Prefix {
    /// Ordem dos prefixos dentro do bloco de cada rótulo no vocabulário.
    pub const ALL: [Prefix; 4] = [Prefix::Begin, Prefix::Inside, Prefix::Last, Prefix::Unit];

    pub fn symbol(&self) -> char {
        match self {
            Prefix::Begin => 'B',
            Prefix::Inside => 'I',
            Prefix::Last => 'L',
            Prefix::Unit => 'U',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            'B' => Some(Prefix::Begin),
            'I' => Some(Prefix::Inside),
            'L' => Some(Prefix::Last),
            'U' => Some(Prefix::Unit),
            _ => None,
        }
    }
}

/// Tag BIOUL aplicada a um token.
///
/// Serializa como texto (`"B-MALWARE"`, `"O"`), que é o formato dos registros
/// `{ tokens, ner_tags }` consumidos pelo treino.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// **Outside**: o token não pertence a nenhuma entidade.
    Outside,
    /// Token pertencente a uma entidade do rótulo `label`.
    Entity { prefix: Prefix, label: String },
}

impl Tag {
    pub fn entity(prefix: Prefix, label: impl Into<String>) -> Self {
        Tag::Entity {
            prefix,
            label: label.into(),
        }
    }

    /// Representação textual da tag (ex: "B-MALWARE", "U-TOOL", "O")
    pub fn label(&self) -> String {
        match self {
            Tag::Outside => "O".to_string(),
            Tag::Entity { prefix, label } => format!("{}-{}", prefix.symbol(), label),
        }
    }

    /// Rótulo da entidade sem prefixo (None para `O`)
    pub fn entity_label(&self) -> Option<&str> {
        match self {
            Tag::Outside => None,
            Tag::Entity { label, .. } => Some(label),
        }
    }

    pub fn prefix(&self) -> Option<Prefix> {
        match self {
            Tag::Outside => None,
            Tag::Entity { prefix, .. } => Some(*prefix),
        }
    }

    /// Parse estrutural (ex: "L-DOMAIN" → Entity(Last, "DOMAIN")).
    ///
    /// Não consulta vocabulário; use [`TagVocabulary::parse_tag`] para isso.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "O" {
            return Some(Tag::Outside);
        }
        let (head, label) = s.split_once('-')?;
        let mut chars = head.chars();
        let prefix = Prefix::from_symbol(chars.next()?)?;
        if chars.next().is_some() || label.is_empty() {
            return None;
        }
        Some(Tag::entity(prefix, label))
    }

    /// Verifica se a transição `prev → next` respeita a gramática BIOUL.
    ///
    /// - `I-X` e `L-X` só podem seguir `B-X` ou `I-X`
    /// - `B-*`, `U-*` e `O` só podem seguir `O`, `L-*` ou `U-*`
    pub fn is_valid_transition(prev: &Tag, next: &Tag) -> bool {
        let prev_open = matches!(
            prev.prefix(),
            Some(Prefix::Begin) | Some(Prefix::Inside)
        );
        match next.prefix() {
            Some(Prefix::Inside) | Some(Prefix::Last) => {
                prev_open && prev.entity_label() == next.entity_label()
            }
            _ => !prev_open,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Outside => f.write_str("O"),
            Tag::Entity { prefix, label } => write!(f, "{}-{}", prefix.symbol(), label),
        }
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Tag::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("tag BIOUL inválida: {s}")))
    }
}

/// Vocabulário denso de tags.
///
/// Construído uma vez na inicialização e depois apenas lido; é `Send + Sync`
/// e pode ser compartilhado por referência (ou `Arc`) entre threads.
#[derive(Debug, Clone, Serialize)]
pub struct TagVocabulary {
    labels: Vec<String>,
    tags: Vec<String>,
    #[serde(skip)]
    ids: HashMap<String, usize>,
}

impl TagVocabulary {
    /// Id reservado para `O`.
    pub const OUTSIDE_ID: usize = 0;

    /// Constrói o vocabulário a partir de rótulos ordenados.
    ///
    /// Falha com [`CodecError::Configuration`] se a lista estiver vazia, tiver
    /// duplicatas ou rótulos em branco/com espaços.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(CodecError::configuration("lista de rótulos vazia"));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            if label.is_empty() || label.chars().any(char::is_whitespace) {
                return Err(CodecError::configuration(format!(
                    "rótulo inválido: '{label}'"
                )));
            }
            if !seen.insert(label.as_str()) {
                return Err(CodecError::configuration(format!(
                    "rótulo duplicado: '{label}'"
                )));
            }
        }
        Ok(Self::build(labels))
    }

    /// Vocabulário com os oito rótulos CTI padrão.
    pub fn cti_default() -> Self {
        Self::build(DEFAULT_LABELS.iter().map(|l| l.to_string()).collect())
    }

    fn build(labels: Vec<String>) -> Self {
        let mut tags = Vec::with_capacity(1 + Prefix::ALL.len() * labels.len());
        tags.push(Tag::Outside.label());
        for label in &labels {
            for prefix in Prefix::ALL {
                tags.push(Tag::entity(prefix, label.as_str()).label());
            }
        }
        let ids = tags
            .iter()
            .enumerate()
            .map(|(id, tag)| (tag.clone(), id))
            .collect();
        Self { labels, tags, ids }
    }

    /// Número total de tags: `1 + 4 × |rótulos|`
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Sempre falso: um vocabulário construído tem ao menos `O` e um rótulo.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Todas as tags em ordem de id
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Id de uma tag textual (ex: "U-TOOL" → 28 no vocabulário padrão)
    pub fn id_of(&self, tag: &str) -> Option<usize> {
        self.ids.get(tag).copied()
    }

    pub fn tag_of(&self, id: usize) -> Option<&str> {
        self.tags.get(id).map(String::as_str)
    }

    pub fn tag_id(&self, tag: &Tag) -> Result<usize> {
        let text = tag.label();
        self.id_of(&text)
            .ok_or(CodecError::LabelLookup { tag: text })
    }

    /// Parseia uma tag textual exigindo que ela pertença ao vocabulário.
    pub fn parse_tag(&self, s: &str) -> Result<Tag> {
        match Tag::parse(s) {
            Some(tag) if self.ids.contains_key(s) => Ok(tag),
            _ => Err(CodecError::label_lookup(s)),
        }
    }
}

impl Default for TagVocabulary {
    fn default() -> Self {
        Self::cti_default()
    }
}
