pub mod info;
pub mod windows;
pub mod ws;

pub use info::{TestResponse, VisibilityResponse};
pub use windows::StoryWindow;
pub use ws::{WsCloseCode, WsServerMessage};
