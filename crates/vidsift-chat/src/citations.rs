use std::sync::OnceLock;

use regex::Regex;

use vidsift_core::types::{parse_timestamp, Citation};

/// Characters of surrounding response text kept as the citation excerpt.
const EXCERPT_CHARS: usize = 120;

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\[(](\d{1,2}:)?\d{1,2}:\d{2}[\])]").expect("timestamp regex compiles")
    })
}

/// Scan an assistant response for bracketed timestamps and turn each match
/// into an extracted citation. Every occurrence yields exactly one entry,
/// in match order; duplicates are preserved.
pub fn extract_citations(response: &str) -> Vec<Citation> {
    timestamp_regex()
        .find_iter(response)
        .filter_map(|m| {
            let raw = m.as_str();
            let timestamp = &raw[1..raw.len() - 1];
            let seconds = parse_timestamp(timestamp)?;
            Some(Citation::Extracted {
                timestamp: timestamp.to_string(),
                seconds,
                text: excerpt_around(response, m.start(), m.end()),
            })
        })
        .collect()
}

/// The sentence-ish neighbourhood of a match, for display next to the
/// citation.
fn excerpt_around(response: &str, start: usize, end: usize) -> String {
    let from = response[..start]
        .char_indices()
        .rev()
        .take(EXCERPT_CHARS / 2)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let to = end
        + response[end..]
            .char_indices()
            .take(EXCERPT_CHARS / 2)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
    response[from..to].trim().to_string()
}

/// Context citations from retrieval first, then everything scraped from
/// the model's own output.
pub fn merge_citations(context: Vec<Citation>, extracted: Vec<Citation>) -> Vec<Citation> {
    let mut out = context;
    out.extend(extracted);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(citations: &[Citation]) -> Vec<(String, u32)> {
        citations
            .iter()
            .filter_map(|c| match c {
                Citation::Extracted {
                    timestamp, seconds, ..
                } => Some((timestamp.clone(), *seconds)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_match_appears_exactly_once_with_parsed_seconds() {
        let response =
            "The intro [00:12] sets it up, then at (1:02:03) the proof lands. See [00:12] again.";
        let citations = extract_citations(response);
        assert_eq!(
            extracted(&citations),
            vec![
                ("00:12".to_string(), 12),
                ("1:02:03".to_string(), 3723),
                ("00:12".to_string(), 12),
            ]
        );
    }

    #[test]
    fn plain_text_without_timestamps_yields_nothing() {
        assert!(extract_citations("no timestamps here, just prose").is_empty());
    }

    #[test]
    fn unbracketed_timestamps_are_ignored() {
        assert!(extract_citations("at 01:05 exactly").is_empty());
    }

    #[test]
    fn excerpt_contains_the_timestamp() {
        let citations = extract_citations("as shown at [02:30] in the demo");
        match &citations[0] {
            Citation::Extracted { text, .. } => assert!(text.contains("[02:30]")),
            other => panic!("unexpected citation: {other:?}"),
        }
    }

    #[test]
    fn merge_keeps_context_first() {
        let context = vec![Citation::Context {
            video_id: "v".to_string(),
            video_title: None,
            start_time: 0,
            end_time: 10,
            text: "ctx".to_string(),
        }];
        let scraped = extract_citations("look at [00:05]");
        let merged = merge_citations(context, scraped);
        assert_eq!(merged.len(), 2);
        assert!(matches!(merged[0], Citation::Context { .. }));
        assert!(matches!(merged[1], Citation::Extracted { .. }));
    }
}
