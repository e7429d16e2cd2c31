//! Responses of the informational endpoints.

use super::windows::StoryWindow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// `GET /api/test` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResponse {
    /// Always `"success"`.
    pub status: String,
    /// Server time in UTC, RFC 3339.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TestResponse {
    pub fn now() -> Self {
        Self {
            status: "success".to_owned(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// `GET /api/visibility` response: one flag per [`StoryWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityResponse {
    #[serde(rename = "1stStoryWindows")]
    pub first: bool,
    #[serde(rename = "2ndStoryWindows")]
    pub second: bool,
    #[serde(rename = "3rdStoryWindows")]
    pub third: bool,
    #[serde(rename = "4thStoryWindows")]
    pub fourth: bool,
}

impl VisibilityResponse {
    /// Build the response by probing each window with `is_visible`.
    pub fn from_fn(mut is_visible: impl FnMut(StoryWindow) -> bool) -> Self {
        Self {
            first: is_visible(StoryWindow::First),
            second: is_visible(StoryWindow::Second),
            third: is_visible(StoryWindow::Third),
            fourth: is_visible(StoryWindow::Fourth),
        }
    }

    pub fn get(&self, window: StoryWindow) -> bool {
        match window {
            StoryWindow::First => self.first,
            StoryWindow::Second => self.second,
            StoryWindow::Third => self.third,
            StoryWindow::Fourth => self.fourth,
        }
    }
}
