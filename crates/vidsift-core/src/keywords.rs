//! Keyword extraction shared by the chunker and the retrieval engine.
//!
//! Both sides must tokenize identically or keyword matching breaks: the
//! chunker stores keywords per chunk at index time, and the retrieval
//! engine extracts keywords from the query at search time. Queries
//! additionally drop interrogatives, which carry no signal against
//! transcript keywords.

/// Maximum keywords stored per chunk.
pub const MAX_CHUNK_KEYWORDS: usize = 10;

/// Tokens dropped on both the chunk and the query side. Transcript speech
/// is heavy on fillers, so those are listed alongside ordinary stop words.
/// Tokens of length <= 3 are dropped before this set is consulted.
const STOP_WORDS: &[&str] = &[
    "about", "actually", "after", "again", "also", "back", "basically",
    "because", "been", "before", "being", "both", "could", "does", "doing",
    "down", "during", "each", "even", "every", "from", "getting", "goes",
    "going", "gonna", "gotta", "have", "having", "here", "into", "just",
    "kind", "know", "like", "little", "made", "make", "many", "maybe",
    "more", "most", "much", "must", "need", "okay", "only", "other", "over",
    "really", "right", "said", "same", "should", "some", "something", "sort",
    "stuff", "such", "sure", "than", "thank", "thanks", "them", "then",
    "there", "these", "they", "thing", "things", "those", "through", "today",
    "under", "until", "very", "want", "well", "were", "will", "with",
    "would", "yeah", "your", "youre",
];

/// Extra tokens dropped on the query side only — interrogatives and
/// demonstratives that dominate natural-language questions.
const QUERY_STOP_WORDS: &[&str] = &[
    "what", "when", "where", "who", "why", "how", "which", "that", "this",
];

/// Lowercase, strip non-alphanumerics to spaces, split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

fn is_query_stop_word(token: &str) -> bool {
    is_stop_word(token) || QUERY_STOP_WORDS.contains(&token)
}

fn extract(text: &str, drop: impl Fn(&str) -> bool, cap: Option<usize>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if token.len() <= 3 || drop(&token) || out.contains(&token) {
            continue;
        }
        out.push(token);
        if cap.is_some_and(|c| out.len() >= c) {
            break;
        }
    }
    out
}

/// Keywords stored with a chunk at index time: deduplicated, first
/// [`MAX_CHUNK_KEYWORDS`] survivors in order of appearance.
pub fn chunk_keywords(text: &str) -> Vec<String> {
    extract(text, is_stop_word, Some(MAX_CHUNK_KEYWORDS))
}

/// Keywords extracted from a search query. Uses the extended stop-word set
/// (interrogatives included) on every search path.
pub fn query_keywords(text: &str) -> Vec<String> {
    extract(text, is_query_stop_word, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_sorted_for_binary_search() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Rust's borrow-checker, explained!"),
            vec!["rust", "s", "borrow", "checker", "explained"]
        );
    }

    #[test]
    fn chunk_keywords_drop_short_and_stop_words() {
        let kws = chunk_keywords("So today we're really going to explain the borrow checker");
        assert_eq!(kws, vec!["explain", "borrow", "checker"]);
    }

    #[test]
    fn chunk_keywords_deduplicate_and_cap() {
        let text = "alpha alpha bravo charlie delta echo foxtrot golf hotel india juliett kilo lima";
        let kws = chunk_keywords(text);
        assert_eq!(kws.len(), MAX_CHUNK_KEYWORDS);
        assert_eq!(kws[0], "alpha");
        assert_eq!(kws[1], "bravo");
    }

    #[test]
    fn query_keywords_drop_interrogatives() {
        let kws = query_keywords("What does the borrow checker prevent?");
        assert_eq!(kws, vec!["borrow", "checker", "prevent"]);
    }

    #[test]
    fn query_and_chunk_sides_agree_on_base_tokens() {
        let text = "ownership lifetimes borrowing";
        assert_eq!(chunk_keywords(text), query_keywords(text));
    }
}
