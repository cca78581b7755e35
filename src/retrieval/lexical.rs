//! In-memory lexical index over the catalog.
//!
//! BM25 term-overlap ranking, rebuilt from the full corpus at startup.
//! Scoring is pure CPU work; callers running inside the async runtime
//! should dispatch `search` via `spawn_blocking`.

use std::collections::HashMap;

use super::passage::{welcome_passage, Passage, RankSource, RankedResult};

const K1: f32 = 1.2;
const B: f32 = 0.75;

pub struct LexicalIndex {
    passages: Vec<Passage>,
    /// term -> frequency, per document
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<f32>,
    doc_freq: HashMap<String, u32>,
    avg_doc_len: f32,
}

impl LexicalIndex {
    /// Build the index from the corpus. An empty corpus is seeded with the
    /// welcome sentinel so the index is never empty.
    pub fn build(mut passages: Vec<Passage>) -> Self {
        if passages.is_empty() {
            passages.push(welcome_passage());
        }

        let mut term_freqs = Vec::with_capacity(passages.len());
        let mut doc_lens = Vec::with_capacity(passages.len());
        let mut doc_freq: HashMap<String, u32> = HashMap::new();

        for passage in &passages {
            let tokens = tokenize(&passage.content);
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len() as f32);
            term_freqs.push(freqs);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<f32>() / doc_lens.len() as f32
        };

        Self {
            passages,
            term_freqs,
            doc_lens,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Top-k passages by BM25 score, descending. Documents with no term
    /// overlap are excluded.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RankedResult> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let n = self.passages.len() as f32;
        let mut scored: Vec<(usize, f32)> = Vec::new();

        for (idx, freqs) in self.term_freqs.iter().enumerate() {
            let mut score = 0.0f32;
            for term in &query_terms {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let tf = tf as f32;
                let norm = K1 * (1.0 - B + B * self.doc_lens[idx] / self.avg_doc_len.max(1.0));
                score += idf * (tf * (K1 + 1.0)) / (tf + norm);
            }
            if score > 0.0 {
                scored.push((idx, score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(idx, score)| RankedResult {
                passage: self.passages[idx].clone(),
                score,
                source: RankSource::Lexical,
            })
            .collect()
    }
}

/// Lowercased unicode-word tokens; Vietnamese diacritics survive as-is.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::passage::test_passage;

    fn index() -> LexicalIndex {
        LexicalIndex::build(vec![
            test_passage("p1", "iphone-16", "iPhone 16 màn hình 6.1 inch chip A18"),
            test_passage("p2", "galaxy-s24", "Samsung Galaxy S24 màn hình 6.2 inch"),
            test_passage("p3", "xiaomi-14", "Xiaomi 14 pin 4610 mAh sạc nhanh"),
        ])
    }

    #[test]
    fn ranks_matching_document_first() {
        let results = index().search("iphone chip a18", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].passage.id, "p1");
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn excludes_documents_without_overlap() {
        let results = index().search("pin sạc nhanh", 3);
        assert!(results.iter().all(|r| r.passage.id != "p1"));
        assert_eq!(results[0].passage.id, "p3");
    }

    #[test]
    fn respects_top_k() {
        let results = index().search("màn hình", 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn empty_corpus_is_seeded_with_welcome_sentinel() {
        let index = LexicalIndex::build(Vec::new());
        assert_eq!(index.len(), 1);
        let results = index.search("chào mừng shop", 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.id, "welcome");
    }

    #[test]
    fn tokenizer_keeps_vietnamese_diacritics() {
        let tokens = tokenize("Điện thoại, giá rẻ!");
        assert_eq!(tokens, vec!["điện", "thoại", "giá", "rẻ"]);
    }
}
