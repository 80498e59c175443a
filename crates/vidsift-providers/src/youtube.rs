use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;

/// A resolved channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub title: String,
}

/// Listing metadata for one video.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration_seconds: u32,
    /// RFC 3339 publish instant, as reported upstream.
    pub published_at: String,
}

/// Video metadata provider (YouTube Data API v3).
pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: crate::http_client(),
            api_key,
            base_url,
        }
    }

    /// Resolve a channel reference — a raw channel id (`UC…`) or an
    /// `@handle` — to its id and title.
    pub async fn resolve_channel(&self, reference: &str) -> Result<ChannelInfo, ProviderError> {
        let url = if reference.starts_with("UC") {
            format!(
                "{}/channels?part=snippet&id={}&key={}",
                self.base_url, reference, self.api_key
            )
        } else {
            let handle = reference.trim_start_matches('@');
            format!(
                "{}/channels?part=snippet&forHandle={}&key={}",
                self.base_url, handle, self.api_key
            )
        };

        let body: ChannelListResponse = self.get_json(&url).await?;
        let item = body
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: format!("channel not found: {reference}"),
            })?;

        Ok(ChannelInfo {
            id: item.id,
            title: item.snippet.title,
        })
    }

    /// List a channel's videos in reverse-chronological order, capped at
    /// `max`.
    pub async fn list_videos(
        &self,
        channel_id: &str,
        max: usize,
    ) -> Result<Vec<VideoInfo>, ProviderError> {
        self.search_videos(channel_id, None, max).await
    }

    /// List videos published strictly after `published_after` (RFC 3339),
    /// newest first.
    pub async fn videos_published_after(
        &self,
        channel_id: &str,
        published_after: &str,
        max: usize,
    ) -> Result<Vec<VideoInfo>, ProviderError> {
        self.search_videos(channel_id, Some(published_after), max)
            .await
    }

    async fn search_videos(
        &self,
        channel_id: &str,
        published_after: Option<&str>,
        max: usize,
    ) -> Result<Vec<VideoInfo>, ProviderError> {
        let mut url = format!(
            "{}/search?part=snippet&channelId={}&order=date&type=video&maxResults={}&key={}",
            self.base_url, channel_id, max, self.api_key
        );
        if let Some(after) = published_after {
            url.push_str(&format!("&publishedAfter={after}"));
        }

        let search: SearchListResponse = self.get_json(&url).await?;
        let ids: Vec<String> = search
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Search results carry no durations; a second call fills them in.
        let detail_url = format!(
            "{}/videos?part=snippet,contentDetails&id={}&key={}",
            self.base_url,
            ids.join(","),
            self.api_key
        );
        let details: VideoListResponse = self.get_json(&detail_url).await?;

        let mut videos: Vec<VideoInfo> = details
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|item| VideoInfo {
                duration_seconds: parse_iso8601_duration(&item.content_details.duration),
                id: item.id,
                title: item.snippet.title,
                description: item.snippet.description,
                published_at: item.snippet.published_at,
            })
            .collect();
        // The videos endpoint does not preserve order; restore newest-first.
        videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        debug!(channel_id, count = videos.len(), "listed channel videos");
        Ok(videos)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(ProviderError::Api {
                status,
                message: format!("metadata request failed with status {status}"),
            });
        }
        resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

/// Parse an ISO 8601 duration (`PT1H2M3S`) into seconds. Unparseable input
/// reads as zero.
fn parse_iso8601_duration(s: &str) -> u32 {
    let Some(rest) = s.strip_prefix("PT") else {
        return 0;
    };
    let mut total: u32 = 0;
    let mut number = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: u32 = number.parse().unwrap_or(0);
        number.clear();
        match c {
            'H' => total += value * 3600,
            'M' => total += value * 60,
            'S' => total += value,
            _ => return 0,
        }
    }
    total
}

#[derive(Deserialize)]
struct ChannelListResponse {
    items: Option<Vec<ChannelItem>>,
}

#[derive(Deserialize)]
struct ChannelItem {
    id: String,
    snippet: Snippet,
}

#[derive(Deserialize)]
struct SearchListResponse {
    items: Option<Vec<SearchItem>>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct VideoListResponse {
    items: Option<Vec<VideoItem>>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Deserialize)]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "publishedAt")]
    published_at: String,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_durations_parse() {
        assert_eq!(parse_iso8601_duration("PT15M33S"), 933);
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
        assert_eq!(parse_iso8601_duration("PT2H"), 7200);
        assert_eq!(parse_iso8601_duration("garbage"), 0);
    }
}
