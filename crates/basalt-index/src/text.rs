use std::collections::HashMap;

use basalt_core::{Document, Value};

use crate::DocId;

/// Words carrying no signal, dropped during tokenization.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Lowercase, split on non-alphanumeric, drop stop words, optionally
/// strip common suffixes.
pub fn tokenize(text: &str, stemming: bool) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .map(|t| if stemming { stem(&t) } else { t })
        .collect()
}

/// A light suffix stripper — enough to fold plural and participle forms
/// onto a common stem without a full stemming table.
fn stem(token: &str) -> String {
    for suffix in ["ing", "edly", "ed", "ly", "ies", "es", "s"] {
        if let Some(stripped) = token.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped.to_string();
            }
        }
    }
    token.to_string()
}

/// Inverted index over one or more string fields.
///
/// Posting lists map token → (document → term frequency); document
/// frequencies fall out of the posting sizes, so idf needs no separate
/// bookkeeping.
#[derive(Debug)]
pub struct TextIndex {
    name: String,
    fields: Vec<String>,
    stemming: bool,
    postings: HashMap<String, HashMap<DocId, u32>>,
    /// Total token count per indexed document.
    doc_tokens: HashMap<DocId, u32>,
}

/// One scored search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    pub id: DocId,
    pub score: f64,
}

impl TextIndex {
    pub fn new(name: impl Into<String>, fields: Vec<String>, stemming: bool) -> TextIndex {
        TextIndex {
            name: name.into(),
            fields,
            stemming,
            postings: HashMap::new(),
            doc_tokens: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of indexed documents.
    pub fn doc_count(&self) -> usize {
        self.doc_tokens.len()
    }

    fn doc_terms(&self, doc: &Document) -> Vec<String> {
        let mut terms = Vec::new();
        for field in &self.fields {
            match doc.get(field) {
                Some(Value::String(s)) => terms.extend(tokenize(s, self.stemming)),
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Value::String(s) = item {
                            terms.extend(tokenize(s, self.stemming));
                        }
                    }
                }
                _ => {}
            }
        }
        terms
    }

    /// Index a document. Documents yielding no tokens contribute nothing.
    pub fn insert_doc(&mut self, id: &str, doc: &Document) {
        let terms = self.doc_terms(doc);
        if terms.is_empty() {
            return;
        }
        self.doc_tokens.insert(id.to_string(), terms.len() as u32);
        for term in terms {
            *self
                .postings
                .entry(term)
                .or_default()
                .entry(id.to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn remove_doc(&mut self, id: &str) {
        if self.doc_tokens.remove(id).is_none() {
            return;
        }
        self.postings.retain(|_, docs| {
            docs.remove(id);
            !docs.is_empty()
        });
    }

    /// Search for documents matching the query tokens.
    ///
    /// Documents containing every token are preferred; when none do, the
    /// union of per-token matches is scored instead. Score is
    /// `Σ tf · ln(N / df)` over the matched tokens, descending; ties
    /// break on document id for determinism.
    pub fn search(&self, query: &str) -> Vec<TextHit> {
        let tokens = tokenize(query, self.stemming);
        if tokens.is_empty() || self.doc_tokens.is_empty() {
            return Vec::new();
        }

        let lists: Vec<&HashMap<DocId, u32>> = tokens
            .iter()
            .filter_map(|t| self.postings.get(t))
            .collect();
        if lists.is_empty() {
            return Vec::new();
        }

        // AND-preference: intersect; fall back to union when empty.
        let mut candidates: Vec<&DocId> = lists[0]
            .keys()
            .filter(|id| lists[1..].iter().all(|l| l.contains_key(*id)))
            .collect();
        if candidates.is_empty() {
            let mut union: Vec<&DocId> = lists.iter().flat_map(|l| l.keys()).collect();
            union.sort_unstable();
            union.dedup();
            candidates = union;
        }

        let n = self.doc_tokens.len() as f64;
        let mut hits: Vec<TextHit> = candidates
            .into_iter()
            .map(|id| {
                let score: f64 = lists
                    .iter()
                    .filter_map(|l| {
                        let tf = *l.get(id)? as f64;
                        let df = l.len() as f64;
                        Some(tf * (n / df).ln())
                    })
                    .sum();
                TextHit {
                    id: id.clone(),
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits
    }
}
