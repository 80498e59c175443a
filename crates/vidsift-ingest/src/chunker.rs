use vidsift_core::keywords::chunk_keywords;
use vidsift_core::types::format_timestamp;
use vidsift_providers::TranscriptSegment;

/// A cut is taken at a sentence boundary once the buffer reaches this size.
const NATURAL_CUT_BYTES: usize = 1000;
/// A cut is forced regardless of punctuation at this size.
const FORCED_CUT_BYTES: usize = 2000;
/// Stored preview length (characters) used for keyword-hit boosting.
const PREVIEW_CHARS: usize = 200;

/// One retrieval unit of a transcript.
///
/// `text` is the exact slice of the transcript blob this chunk covers —
/// concatenated `[MM:SS] text\n` lines — so `byte_offset`/`byte_length`
/// index into the blob directly. `plain_text` is the same speech without
/// timestamp markers, used for embedding and previews.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: u32,
    pub text: String,
    pub plain_text: String,
    pub start_time: u32,
    pub end_time: u32,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub keywords: Vec<String>,
    pub preview: String,
}

/// Render one transcript line exactly as it appears in the blob.
pub fn format_line(start_seconds: u32, text: &str) -> String {
    format!("[{}] {}\n", format_timestamp(start_seconds), text)
}

/// Deterministically segment a transcript into chunks.
///
/// After appending each segment the buffer is cut when it ends on a
/// sentence terminator and has reached 1000 bytes, unconditionally at
/// 2000 bytes, and always after the final segment. The concatenation of
/// all chunk texts reproduces the blob byte-for-byte.
pub fn chunk_segments(segments: &[TranscriptSegment]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut plain = String::new();
    let mut chunk_start: u32 = 0;
    let mut chunk_end: u32 = 0;
    let mut byte_offset: u64 = 0;

    for (i, segment) in segments.iter().enumerate() {
        if buffer.is_empty() {
            chunk_start = segment.start_seconds;
        }
        buffer.push_str(&format_line(segment.start_seconds, &segment.text));
        if !plain.is_empty() {
            plain.push(' ');
        }
        plain.push_str(&segment.text);
        chunk_end = segment.end_seconds;

        let natural = ends_with_sentence_terminator(&segment.text);
        let long = buffer.len() >= NATURAL_CUT_BYTES;
        let too_long = buffer.len() >= FORCED_CUT_BYTES;
        let last = i + 1 == segments.len();

        if (natural && long) || too_long || last {
            let byte_length = buffer.len() as u64;
            chunks.push(Chunk {
                index: chunks.len() as u32,
                keywords: chunk_keywords(&plain),
                preview: preview_of(&plain),
                text: std::mem::take(&mut buffer),
                plain_text: std::mem::take(&mut plain),
                start_time: chunk_start,
                end_time: chunk_end,
                byte_offset,
                byte_length,
            });
            byte_offset += byte_length;
        }
    }

    chunks
}

fn ends_with_sentence_terminator(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.' | '!' | '?'))
}

fn preview_of(plain: &str) -> String {
    plain.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: u32, end: u32, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_seconds: start,
            end_seconds: end,
            text: text.to_string(),
        }
    }

    /// Segments sized so each sentence-terminated cue pushes the buffer
    /// past the natural cut threshold roughly every three cues.
    fn sample_segments() -> Vec<TranscriptSegment> {
        let sentence = "word ".repeat(70) + "done."; // ~355 bytes of speech
        (0..12)
            .map(|i| seg(i * 10, i * 10 + 9, &sentence))
            .collect()
    }

    #[test]
    fn same_input_same_boundaries() {
        let segments = sample_segments();
        let a = chunk_segments(&segments);
        let b = chunk_segments(&segments);
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn indices_are_dense_from_zero() {
        let chunks = chunk_segments(&sample_segments());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u32);
        }
    }

    #[test]
    fn byte_accounting_is_contiguous_and_total() {
        let segments = sample_segments();
        let chunks = chunk_segments(&segments);
        let blob: String = chunks.iter().map(|c| c.text.as_str()).collect();

        let mut expected_offset = 0u64;
        for chunk in &chunks {
            assert_eq!(chunk.byte_offset, expected_offset);
            assert_eq!(chunk.byte_length, chunk.text.len() as u64);
            expected_offset += chunk.byte_length;
        }
        assert_eq!(expected_offset, blob.len() as u64);

        // Offsets slice the blob back into the exact chunk texts.
        for chunk in &chunks {
            let start = chunk.byte_offset as usize;
            let end = start + chunk.byte_length as usize;
            assert_eq!(&blob[start..end], chunk.text);
        }
    }

    #[test]
    fn cut_waits_for_sentence_terminator_until_forced() {
        // 1100 bytes of unterminated speech, then a short terminated cue:
        // no cut at 1000 because `natural` is false.
        let long_unterminated = "word ".repeat(220) + "and then";
        let segments = vec![
            seg(0, 10, &long_unterminated),
            seg(10, 12, "short tail."),
        ];
        let chunks = chunk_segments(&segments);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_time, 0);
        assert_eq!(chunks[0].end_time, 12);
    }

    #[test]
    fn oversized_buffer_is_cut_without_punctuation() {
        let filler = "word ".repeat(150); // ~750 bytes, no terminator
        let segments = vec![
            seg(0, 5, &filler),
            seg(5, 10, &filler),
            seg(10, 15, &filler),
        ];
        let chunks = chunk_segments(&segments);
        // Second segment crosses 1000 without punctuation; third crosses
        // 2000 and forces the cut.
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].byte_length >= FORCED_CUT_BYTES as u64);
    }

    #[test]
    fn final_segment_always_flushes() {
        let chunks = chunk_segments(&[seg(3, 7, "tiny")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "[00:03] tiny\n");
        assert_eq!(chunks[0].start_time, 3);
        assert_eq!(chunks[0].end_time, 7);
    }

    #[test]
    fn chunk_time_ranges_cover_segments_in_order() {
        let chunks = chunk_segments(&sample_segments());
        assert_eq!(chunks.first().unwrap().start_time, 0);
        assert_eq!(chunks.last().unwrap().end_time, 119);
        for pair in chunks.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
            assert!(pair[0].end_time <= pair[1].start_time);
        }
    }

    #[test]
    fn keywords_come_from_speech_not_timestamps() {
        let chunks = chunk_segments(&[seg(65, 70, "ownership rules explained.")]);
        assert_eq!(chunks[0].keywords, vec!["ownership", "rules", "explained"]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_segments(&[]).is_empty());
    }
}
