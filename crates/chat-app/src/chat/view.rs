use parlor_auth::Session;
use parlor_storage::{Message, MessageId};

use super::compose::ComposeDraft;
use super::feed::FeedStatus;
use super::notice::Notice;
use super::scroll_manager::ScrollPosition;

pub const APP_TITLE: &str = "Chat App 💬";
pub const SIGN_IN_LABEL: &str = "Sign in with Google";
pub const SIGN_OUT_LABEL: &str = "Sign Out";
pub const SUBMIT_LABEL: &str = "✔️";
pub const COMPOSE_PLACEHOLDER: &str = "say something nice";

/// Author-relative styling of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStyle {
    Own,
    Other,
}

impl MessageStyle {
    pub fn for_author(author_id: &str, session: Option<&Session>) -> Self {
        match session {
            Some(session) if session.user_id == author_id => Self::Own,
            _ => Self::Other,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Own => "sent",
            Self::Other => "received",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewAction {
    SignIn,
    SignOut,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonView {
    pub label: &'static str,
    pub action: ViewAction,
}

impl ButtonView {
    fn new(label: &'static str, action: ViewAction) -> Self {
        Self { label, action }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderView {
    pub title: &'static str,
    pub sign_out: Option<ButtonView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub text: String,
    pub author_label: String,
    pub avatar_url: String,
    pub style: MessageStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeView {
    pub value: String,
    pub placeholder: &'static str,
    pub submit: ButtonView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoomView {
    pub status: FeedStatus,
    pub messages: Vec<MessageView>,
    pub compose: ComposeView,
    pub scroll: ScrollPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyView {
    SignIn(ButtonView),
    ChatRoom(ChatRoomView),
}

/// Whole screen, rebuilt from scratch on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppView {
    pub header: HeaderView,
    pub notice: Option<Notice>,
    pub body: BodyView,
}

/// Everything the renderer reads. Borrowed, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct ViewInput<'a> {
    pub session: Option<&'a Session>,
    pub messages: &'a [Message],
    pub draft: &'a ComposeDraft,
    pub notice: Option<&'a Notice>,
    pub feed_status: FeedStatus,
    pub scroll: ScrollPosition,
}

impl<'a> ViewInput<'a> {
    pub fn new(
        session: Option<&'a Session>,
        messages: &'a [Message],
        draft: &'a ComposeDraft,
    ) -> Self {
        Self {
            session,
            messages,
            draft,
            notice: None,
            feed_status: FeedStatus::Unsubscribed,
            scroll: ScrollPosition::default(),
        }
    }
}

pub fn render_app(input: &ViewInput<'_>) -> AppView {
    let header = HeaderView {
        title: APP_TITLE,
        sign_out: input
            .session
            .map(|_| ButtonView::new(SIGN_OUT_LABEL, ViewAction::SignOut)),
    };

    let body = match input.session {
        Some(session) => BodyView::ChatRoom(render_chat_room(input, session)),
        None => BodyView::SignIn(ButtonView::new(SIGN_IN_LABEL, ViewAction::SignIn)),
    };

    AppView {
        header,
        notice: input.notice.cloned(),
        body,
    }
}

fn render_chat_room(input: &ViewInput<'_>, session: &Session) -> ChatRoomView {
    let mut ordered = input.messages.iter().collect::<Vec<_>>();
    ordered.sort_by(|left, right| Message::feed_order(left, right));

    ChatRoomView {
        status: input.feed_status,
        messages: ordered
            .into_iter()
            .map(|message| render_message(message, session))
            .collect(),
        compose: ComposeView {
            value: input.draft.text().to_string(),
            placeholder: COMPOSE_PLACEHOLDER,
            submit: ButtonView::new(SUBMIT_LABEL, ViewAction::Submit),
        },
        scroll: input.scroll,
    }
}

fn render_message(message: &Message, session: &Session) -> MessageView {
    let author_label = message
        .author_name
        .clone()
        .unwrap_or_else(|| message.author_id.clone());

    MessageView {
        id: message.id,
        text: message.text.clone(),
        author_label,
        avatar_url: message.avatar_url.clone(),
        style: MessageStyle::for_author(&message.author_id, Some(session)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(raw_id: u128, author_id: &str, created_at: u64) -> Message {
        Message {
            id: MessageId::new(uuid::Uuid::from_u128(raw_id)),
            text: format!("m{raw_id}"),
            author_id: author_id.to_string(),
            author_name: None,
            avatar_url: String::new(),
            created_at_unix_millis: created_at,
        }
    }

    fn chat_room(view: &AppView) -> &ChatRoomView {
        match &view.body {
            BodyView::ChatRoom(room) => room,
            BodyView::SignIn(_) => panic!("expected chat room"),
        }
    }

    #[test]
    fn signed_out_shows_only_sign_in() {
        let draft = ComposeDraft::default();
        let messages = [message(1, "u1", 1)];

        let view = render_app(&ViewInput::new(None, &messages, &draft));

        assert_eq!(view.header.title, APP_TITLE);
        assert_eq!(view.header.sign_out, None);
        assert_eq!(
            view.body,
            BodyView::SignIn(ButtonView::new(SIGN_IN_LABEL, ViewAction::SignIn))
        );
    }

    #[test]
    fn delivered_messages_render_oldest_first() {
        let session = Session::new("u1", "Ada", "");
        let draft = ComposeDraft::default();
        let messages = [message(2, "u1", 2), message(1, "u2", 1)];

        let view = render_app(&ViewInput::new(Some(&session), &messages, &draft));

        let texts = chat_room(&view)
            .messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(texts, ["m1", "m2"]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let session = Session::new("u1", "Ada", "");
        let draft = ComposeDraft::default();
        let messages = [message(7, "u1", 5), message(3, "u1", 5)];

        let view = render_app(&ViewInput::new(Some(&session), &messages, &draft));

        assert_eq!(chat_room(&view).messages[0].text, "m3");
    }

    #[test]
    fn style_follows_the_current_session() {
        let draft = ComposeDraft::default();
        let messages = [message(1, "u1", 1), message(2, "u2", 2)];

        let as_u1 = Session::new("u1", "Ada", "");
        let view = render_app(&ViewInput::new(Some(&as_u1), &messages, &draft));
        let styles = chat_room(&view)
            .messages
            .iter()
            .map(|message| message.style)
            .collect::<Vec<_>>();
        assert_eq!(styles, [MessageStyle::Own, MessageStyle::Other]);

        let as_u2 = Session::new("u2", "Bob", "");
        let view = render_app(&ViewInput::new(Some(&as_u2), &messages, &draft));
        assert_eq!(chat_room(&view).messages[0].style.class_name(), "received");
        assert_eq!(chat_room(&view).messages[1].style.class_name(), "sent");
    }

    #[test]
    fn chat_room_carries_draft_notice_and_scroll() {
        let session = Session::new("u1", "Ada", "");
        let draft = ComposeDraft::new("typing");
        let notice = Notice::error("Message not sent");
        let mut input = ViewInput::new(Some(&session), &[], &draft);
        input.notice = Some(&notice);
        input.feed_status = FeedStatus::Live;
        input.scroll = ScrollPosition {
            snap_to_latest: true,
            rows_from_latest: 0,
        };

        let view = render_app(&input);

        assert_eq!(view.notice, Some(notice.clone()));
        assert!(view.header.sign_out.is_some());
        let room = chat_room(&view);
        assert_eq!(room.compose.value, "typing");
        assert_eq!(room.compose.submit.action, ViewAction::Submit);
        assert_eq!(room.status, FeedStatus::Live);
        assert!(room.scroll.snap_to_latest);
    }

    #[test]
    fn author_label_prefers_display_name() {
        let session = Session::new("u1", "Ada", "");
        let draft = ComposeDraft::default();
        let mut named = message(1, "u2", 1);
        named.author_name = Some("Bob".to_string());
        let messages = [named, message(2, "u3", 2)];

        let view = render_app(&ViewInput::new(Some(&session), &messages, &draft));

        let labels = chat_room(&view)
            .messages
            .iter()
            .map(|message| message.author_label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, ["Bob", "u3"]);
    }
}
