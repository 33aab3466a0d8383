/// Transient compose text owned by the feed controller.
pub mod compose;
/// Live feed lifecycle and the send flow.
pub mod feed;
/// User-facing notices for recoverable failures.
pub mod notice;
pub mod retry;
pub mod scroll_manager;
/// Pure rendering of session and feed state into a view tree.
pub mod view;

pub use compose::ComposeDraft;
pub use feed::{FeedController, FeedEvent, FeedStatus, SubmitOutcome};
pub use notice::{Notice, NoticeLevel};
pub use retry::RetryPolicy;
pub use scroll_manager::{ScrollManager, ScrollPosition};
pub use view::{
    AppView, BodyView, ButtonView, ChatRoomView, ComposeView, HeaderView, MessageStyle,
    MessageView, ViewAction, ViewInput, render_app,
};
