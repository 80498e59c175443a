use tracing::{debug, info};

use vidsift_core::types::ChannelRunStats;

use crate::error::ProviderError;

/// Transactional email client for channel-completion notifications.
///
/// Constructed only when an API key is configured; callers hold an
/// `Option<EmailClient>` and skip notification when absent.
pub struct EmailClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    from: String,
}

impl EmailClient {
    pub fn new(api_key: String, base_url: String, from: String) -> Self {
        Self {
            client: crate::http_client(),
            api_key,
            base_url,
            from,
        }
    }

    /// Send the channel-run report. The template branches on success.
    pub async fn send_channel_report(
        &self,
        to: &str,
        channel_title: &str,
        succeeded: bool,
        stats: &ChannelRunStats,
        error_message: Option<&str>,
    ) -> Result<(), ProviderError> {
        let subject = report_subject(channel_title, succeeded);
        let html = report_body(channel_title, succeeded, stats, error_message);

        let resp = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(ProviderError::Api {
                status,
                message: format!("email send failed with status {status}"),
            });
        }
        info!(to, channel_title, succeeded, "completion email sent");
        Ok(())
    }
}

fn report_subject(channel_title: &str, succeeded: bool) -> String {
    if succeeded {
        format!("Your channel \"{channel_title}\" is ready to chat")
    } else {
        format!("Processing failed for \"{channel_title}\"")
    }
}

fn report_body(
    channel_title: &str,
    succeeded: bool,
    stats: &ChannelRunStats,
    error_message: Option<&str>,
) -> String {
    debug!(channel_title, ?stats, "rendering report email");
    if succeeded {
        format!(
            "<h2>{channel_title} is indexed</h2>\
             <p>We processed {processed} of {total} videos.</p>\
             <ul>\
             <li>Already indexed: {existing}</li>\
             <li>No captions: {no_transcript}</li>\
             <li>Failed: {failed}</li>\
             </ul>\
             <p>You can start asking questions about the channel now.</p>",
            processed = stats.processed,
            total = stats.total,
            existing = stats.existing,
            no_transcript = stats.no_transcript,
            failed = stats.failed,
        )
    } else {
        format!(
            "<h2>We couldn't finish indexing {channel_title}</h2>\
             <p>{}</p>\
             <p>The run will be retried automatically.</p>",
            error_message.unwrap_or("An unexpected error occurred."),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_report_carries_stats() {
        let stats = ChannelRunStats {
            total: 5,
            processed: 4,
            existing: 2,
            no_transcript: 1,
            failed: 0,
        };
        let body = report_body("RustConf", true, &stats, None);
        assert!(body.contains("4 of 5"));
        assert!(body.contains("Already indexed: 2"));
        assert!(body.contains("No captions: 1"));
        assert!(report_subject("RustConf", true).contains("ready to chat"));
    }

    #[test]
    fn failure_report_carries_error() {
        let body = report_body("RustConf", false, &ChannelRunStats::default(), Some("quota hit"));
        assert!(body.contains("quota hit"));
        assert!(report_subject("RustConf", false).contains("failed"));
    }
}
