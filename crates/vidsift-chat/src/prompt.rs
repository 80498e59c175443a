use std::collections::BTreeMap;

use vidsift_core::types::format_timestamp;
use vidsift_search::RetrievedChunk;

/// Persona and citation rules prepended to every grounded prompt.
const PERSONA: &str = "You are VidSift, an assistant that answers questions about video \
content using only the transcript excerpts provided below. Ground every claim in the \
excerpts. When you reference a specific moment, cite its timestamp in square brackets, \
e.g. [12:34]. If the excerpts do not contain the answer, say so rather than guessing.";

/// System prompt for single-video chat.
pub fn video_system_prompt(video_title: &str, context: &str) -> String {
    format!(
        "{PERSONA}\n\nVideo: {video_title}\n\nTranscript excerpts:\n{context}"
    )
}

/// System prompt for channel-wide chat. The context is already grouped by
/// video; the model is asked to name the video it cites.
pub fn channel_system_prompt(channel_title: &str, context: &str) -> String {
    format!(
        "{PERSONA}\nThe excerpts come from multiple videos of one channel — name the \
video when citing it.\n\nChannel: {channel_title}\n\nTranscript excerpts:\n{context}"
    )
}

/// Timestamp-annotated context body for one video's chunks.
pub fn build_video_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            format!(
                "[{} - {}]\n{}",
                format_timestamp(c.start_time),
                format_timestamp(c.end_time),
                c.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Context body for channel chat, grouped under per-video headers.
pub fn build_channel_context(chunks: &[RetrievedChunk]) -> String {
    let mut grouped: BTreeMap<String, Vec<&RetrievedChunk>> = BTreeMap::new();
    for chunk in chunks {
        let label = chunk
            .video_title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| chunk.video_id.clone());
        grouped.entry(label).or_default().push(chunk);
    }

    grouped
        .into_iter()
        .map(|(label, chunks)| {
            let body = chunks
                .iter()
                .map(|c| {
                    format!(
                        "[{} - {}]\n{}",
                        format_timestamp(c.start_time),
                        format_timestamp(c.end_time),
                        c.text.trim()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("### {label}\n{body}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fallback context when a video has no indexed chunks yet.
pub fn degenerate_context(title: &str, description: &str) -> String {
    format!(
        "No transcript excerpts are available for this video yet.\n\
         Title: {title}\nDescription: {description}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(video: &str, title: Option<&str>, start: u32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            video_id: video.to_string(),
            video_title: title.map(str::to_string),
            chunk_index: 0,
            start_time: start,
            end_time: start + 30,
            score: 1.0,
            text: text.to_string(),
        }
    }

    #[test]
    fn video_context_is_timestamp_annotated() {
        let ctx = build_video_context(&[chunk("v", None, 65, "the borrow checker")]);
        assert!(ctx.starts_with("[01:05 - 01:35]"));
        assert!(ctx.contains("the borrow checker"));
    }

    #[test]
    fn channel_context_groups_by_video() {
        let ctx = build_channel_context(&[
            chunk("v1", Some("Ownership"), 0, "a"),
            chunk("v2", Some("Lifetimes"), 0, "b"),
            chunk("v1", Some("Ownership"), 60, "c"),
        ]);
        assert_eq!(ctx.matches("### Ownership").count(), 1);
        assert_eq!(ctx.matches("### Lifetimes").count(), 1);
    }

    #[test]
    fn prompts_carry_persona_and_context() {
        let p = video_system_prompt("Intro to Rust", "CTX");
        assert!(p.contains("You are VidSift"));
        assert!(p.contains("Intro to Rust"));
        assert!(p.ends_with("CTX"));
    }
}
