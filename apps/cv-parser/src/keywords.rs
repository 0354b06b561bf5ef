//! Keyword extraction for result metadata.
//!
//! Pure frequency ranking over the full document text: tokens are lowercased,
//! stopwords and numbers dropped, then sorted by count (ties alphabetical).

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_MAX_KEYWORDS: usize = 20;

// Allows tech-style tokens such as c++, c#, node.js and ci/cd.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}+#./-]*[\p{L}\p{N}+#]|[\p{L}\p{N}]").unwrap()
});

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "have",
        "has", "had", "been", "will", "would", "can", "could", "into", "over", "under", "our",
        "your", "their", "his", "her", "its", "they", "them", "you", "not", "but", "all",
        "any", "also", "such", "than", "then", "there", "these", "those", "which", "who",
        "whom", "what", "when", "where", "while", "how", "about", "after", "before", "between",
        "during", "through", "per", "via", "using", "used", "use", "including", "other", "more",
        "most", "some", "each", "both", "within", "across", "etc", "present", "current",
        "years", "year", "months", "month", "jan", "feb", "mar", "apr", "may", "jun", "jul",
        "aug", "sep", "sept", "oct", "nov", "dec", "january", "february", "march", "april",
        "june", "july", "august", "september", "october", "november", "december",
    ]
    .into_iter()
    .collect()
});

// ────────────────────────────────────────────────────────────────────────────
// Ranking
// ────────────────────────────────────────────────────────────────────────────

/// A keyword with the number of times it occurs in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

fn is_candidate(token: &str) -> bool {
    token.chars().count() > 2
        && !STOPWORDS.contains(token)
        && !token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '/' || c == '-')
}

/// Ranked keyword counts, highest first, at most `limit` entries.
pub fn rank_keywords(text: &str, limit: usize) -> Vec<KeywordCount> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in TOKEN_RE.find_iter(&lowered) {
        let token = m.as_str();
        if is_candidate(token) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<KeywordCount> = counts
        .into_iter()
        .map(|(keyword, count)| KeywordCount {
            keyword: keyword.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
    ranked.truncate(limit);
    ranked
}

/// Keyword strings only, as injected into `metadata.keywords`.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    rank_keywords(text, limit)
        .into_iter()
        .map(|k| k.keyword)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_by_frequency_then_alphabetically() {
        let text = "Rust rust RUST. Kafka kafka. Postgres. Docker.";
        let ranked = rank_keywords(text, 10);
        assert_eq!(ranked[0], KeywordCount { keyword: "rust".into(), count: 3 });
        assert_eq!(ranked[1].keyword, "kafka");
        assert_eq!(ranked[2].keyword, "docker");
        assert_eq!(ranked[3].keyword, "postgres");
    }

    #[test]
    fn test_stopwords_short_tokens_and_numbers_dropped() {
        let kws = extract_keywords("The team and I shipped 2019 builds in Go for 12 months", 20);
        assert!(!kws.contains(&"the".to_string()));
        assert!(!kws.contains(&"go".to_string()));
        assert!(!kws.contains(&"2019".to_string()));
        assert!(!kws.contains(&"months".to_string()));
        assert!(kws.contains(&"shipped".to_string()));
        assert!(kws.contains(&"team".to_string()));
    }

    #[test]
    fn test_tech_tokens_survive() {
        let kws = extract_keywords("Built services in C++ and Node.js with CI/CD", 20);
        assert!(kws.contains(&"c++".to_string()));
        assert!(kws.contains(&"node.js".to_string()));
        assert!(kws.contains(&"ci/cd".to_string()));
    }

    #[test]
    fn test_accented_words_stay_whole() {
        let kws = extract_keywords(
            "Jürgen Müller, Software-Entwickler in München. Müller München Zürich",
            10,
        );
        assert_eq!(kws[0], "müller");
        assert_eq!(kws[1], "münchen");
        assert!(kws.contains(&"jürgen".to_string()));
        assert!(kws.contains(&"zürich".to_string()));
        assert!(kws.contains(&"software-entwickler".to_string()));
        assert!(!kws.iter().any(|k| k == "ller" || k == "nchen" || k == "rgen"));
    }

    #[test]
    fn test_limit_applied() {
        let text = "alpha beta gamma delta epsilon zeta";
        assert_eq!(extract_keywords(text, 3).len(), 3);
        assert!(extract_keywords("", 5).is_empty());
    }
}
