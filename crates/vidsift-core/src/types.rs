use serde::{Deserialize, Serialize};

/// Lifecycle state of an indexed channel. Transitions are monotonic except
/// `Failed → Pending` via operator retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelStatus::Pending => "pending",
            ChannelStatus::Processing => "processing",
            ChannelStatus::Ready => "ready",
            ChannelStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChannelStatus::Pending),
            "processing" => Ok(ChannelStatus::Processing),
            "ready" => Ok(ChannelStatus::Ready),
            "failed" => Ok(ChannelStatus::Failed),
            other => Err(format!("unknown channel status: {other}")),
        }
    }
}

/// Lifecycle state of a channel queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

/// Dispatch priority for queue items. High triggers immediate dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Billing class of the requesting user, derived by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserClass {
    Anonymous,
    User,
    Premium,
}

impl std::fmt::Display for UserClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserClass::Anonymous => "anonymous",
            UserClass::User => "user",
            UserClass::Premium => "premium",
        };
        write!(f, "{s}")
    }
}

/// Rate-limited action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateAction {
    Chat,
    VideoUpload,
    ChannelProcess,
}

impl std::fmt::Display for RateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RateAction::Chat => "chat",
            RateAction::VideoUpload => "video_upload",
            RateAction::ChannelProcess => "channel_process",
        };
        write!(f, "{s}")
    }
}

/// Caller identity populated by the gateway middleware from the
/// X-User-Id / X-User-Email headers.
#[derive(Debug, Clone, Default)]
pub struct RequestUser {
    pub id: Option<String>,
    pub email: Option<String>,
    pub premium: bool,
}

impl RequestUser {
    pub fn class(&self) -> UserClass {
        match (&self.id, self.premium) {
            (Some(_), true) => UserClass::Premium,
            (Some(_), false) => UserClass::User,
            (None, _) => UserClass::Anonymous,
        }
    }

    /// Rate-limit identifier: `user:<id>` when authenticated, otherwise
    /// `ip:<client_ip>` (resolved by the gateway).
    pub fn rate_identifier(&self, client_ip: &str) -> String {
        match &self.id {
            Some(id) => format!("user:{id}"),
            None => format!("ip:{client_ip}"),
        }
    }
}

/// A citation attached to an assistant turn. Context citations come from
/// retrieval; extracted citations are scraped from timestamps the model
/// emitted. Clients must tolerate both shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Citation {
    #[serde(rename_all = "camelCase")]
    Context {
        video_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        video_title: Option<String>,
        start_time: u32,
        end_time: u32,
        text: String,
    },
    Extracted {
        timestamp: String,
        seconds: u32,
        text: String,
    },
}

/// Statistics reported when a channel run completes. `processed` counts
/// already-indexed videos as well as newly processed ones.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelRunStats {
    pub total: usize,
    pub processed: usize,
    pub existing: usize,
    pub no_transcript: usize,
    pub failed: usize,
}

/// Render seconds as the transcript timestamp `MM:SS`. Minutes are not
/// wrapped at 60 — a 100-minute video renders as `100:05`.
pub fn format_timestamp(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Parse `SS`, `MM:SS`, or `H:MM:SS` into seconds.
pub fn parse_timestamp(ts: &str) -> Option<u32> {
    let mut total: u32 = 0;
    for part in ts.split(':') {
        let n: u32 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(n)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_pads_seconds() {
        assert_eq!(format_timestamp(65), "01:05");
        assert_eq!(format_timestamp(0), "00:00");
    }

    #[test]
    fn timestamp_minutes_exceed_two_digits() {
        assert_eq!(format_timestamp(6005), "100:05");
    }

    #[test]
    fn parse_roundtrip() {
        assert_eq!(parse_timestamp("01:05"), Some(65));
        assert_eq!(parse_timestamp("1:02:03"), Some(3723));
        assert_eq!(parse_timestamp("100:05"), Some(6005));
        assert_eq!(parse_timestamp("xx:05"), None);
    }

    #[test]
    fn status_roundtrip() {
        for s in ["pending", "processing", "ready", "failed"] {
            let parsed: ChannelStatus = s.parse().expect("parse failed");
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn anonymous_identifier_uses_ip() {
        let user = RequestUser::default();
        assert_eq!(user.class(), UserClass::Anonymous);
        assert_eq!(user.rate_identifier("1.2.3.4"), "ip:1.2.3.4");
    }
}
