use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of facade windows reported by `GET /api/visibility`.
///
/// Events may name any window; these four are the ones the visibility
/// endpoint always answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoryWindow {
    #[serde(rename = "1stStoryWindows")]
    First,
    #[serde(rename = "2ndStoryWindows")]
    Second,
    #[serde(rename = "3rdStoryWindows")]
    Third,
    #[serde(rename = "4thStoryWindows")]
    Fourth,
}

impl StoryWindow {
    pub const ALL: [StoryWindow; 4] = [
        StoryWindow::First,
        StoryWindow::Second,
        StoryWindow::Third,
        StoryWindow::Fourth,
    ];

    /// The window name as it appears in ledger events.
    pub const fn as_str(self) -> &'static str {
        match self {
            StoryWindow::First => "1stStoryWindows",
            StoryWindow::Second => "2ndStoryWindows",
            StoryWindow::Third => "3rdStoryWindows",
            StoryWindow::Fourth => "4thStoryWindows",
        }
    }
}

impl fmt::Display for StoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_agree_with_serde() {
        for window in StoryWindow::ALL {
            assert_eq!(
                serde_json::to_string(&window).unwrap(),
                format!("\"{}\"", window.as_str())
            );
            assert_eq!(window.to_string(), window.as_str());
        }
    }
}
