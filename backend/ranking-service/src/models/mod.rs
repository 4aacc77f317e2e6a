use serde::{Deserialize, Serialize};

/// Business type under which article interactions are counted
pub const BIZ_ARTICLE: &str = "article";

/// Length, in characters, of the abstract kept in the shared snapshot
pub const ABSTRACT_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum ContentStatus {
    Unknown = 0,
    Unpublished = 1,
    Published = 2,
    Private = 3,
}

impl From<ContentStatus> for i16 {
    fn from(status: ContentStatus) -> Self {
        status as i16
    }
}

impl TryFrom<i16> for ContentStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Unpublished),
            2 => Ok(Self::Published),
            3 => Ok(Self::Private),
            other => Err(format!("unknown content status {}", other)),
        }
    }
}

/// A published piece of content as seen by the ranking pass.
///
/// Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub status: ContentStatus,
    pub utime: i64,
    pub ctime: i64,
}

impl ContentItem {
    /// First [`ABSTRACT_LEN`] characters of the body.
    pub fn abstract_text(&self) -> String {
        self.content.chars().take(ABSTRACT_LEN).collect()
    }

    /// Copy suitable for the shared snapshot: body cut down to its abstract.
    pub fn abridged(&self) -> Self {
        Self {
            content: self.abstract_text(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounts {
    pub biz_id: i64,
    pub read_cnt: i64,
    pub like_cnt: i64,
    pub collect_cnt: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str) -> ContentItem {
        ContentItem {
            id: 1,
            title: "title".to_string(),
            content: content.to_string(),
            author_id: 9,
            status: ContentStatus::Published,
            utime: 0,
            ctime: 0,
        }
    }

    #[test]
    fn test_abstract_counts_characters_not_bytes() {
        let body = "热".repeat(200);
        let abstract_text = item(&body).abstract_text();
        assert_eq!(abstract_text.chars().count(), ABSTRACT_LEN);
    }

    #[test]
    fn test_short_body_is_kept_whole() {
        assert_eq!(item("short").abridged().content, "short");
    }

    #[test]
    fn test_status_serializes_as_number() {
        let json = serde_json::to_value(item("x")).unwrap();
        assert_eq!(json["status"], 2);

        let back: ContentItem = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, ContentStatus::Published);
    }
}
