//! The `MessageHandler` trait: where normalized messages leave the client.
//!
//! Rendering code implements this trait and the client calls the method
//! matching each message. Every method defaults to a no-op, so a handler
//! only overrides what it displays. Calls are fire-and-forget; nothing a
//! handler does feeds back into the connection.

use tokio::sync::mpsc;

use crate::{
    ChatMessage, DebugMessage, FatalError, GiftMessage, MembershipMessage, SuperChatDelete,
    SuperChatMessage, TextMessage, TranslationUpdate,
};

/// Receives normalized chat messages.
///
/// The client owns its handler and calls it from its own task, so
/// implementations need `Send` but not `Sync`.
pub trait MessageHandler: Send + 'static {
    fn on_add_text(&mut self, _msg: TextMessage) {}

    fn on_add_gift(&mut self, _msg: GiftMessage) {}

    fn on_add_member(&mut self, _msg: MembershipMessage) {}

    fn on_add_super_chat(&mut self, _msg: SuperChatMessage) {}

    fn on_del_super_chat(&mut self, _msg: SuperChatDelete) {}

    fn on_update_translation(&mut self, _msg: TranslationUpdate) {}

    /// Called at most once, after which the client stops.
    fn on_fatal_error(&mut self, _error: FatalError) {}

    fn on_debug_msg(&mut self, _msg: DebugMessage) {}
}

/// Routes `msg` to the matching [`MessageHandler`] method.
pub fn dispatch<H: MessageHandler + ?Sized>(handler: &mut H, msg: ChatMessage) {
    match msg {
        ChatMessage::AddText(m) => handler.on_add_text(m),
        ChatMessage::AddGift(m) => handler.on_add_gift(m),
        ChatMessage::AddMember(m) => handler.on_add_member(m),
        ChatMessage::AddSuperChat(m) => handler.on_add_super_chat(m),
        ChatMessage::DelSuperChat(m) => handler.on_del_super_chat(m),
        ChatMessage::UpdateTranslation(m) => handler.on_update_translation(m),
        ChatMessage::Fatal(e) => handler.on_fatal_error(e),
        ChatMessage::Debug(m) => handler.on_debug_msg(m),
    }
}

impl MessageHandler for Box<dyn MessageHandler> {
    fn on_add_text(&mut self, msg: TextMessage) {
        (**self).on_add_text(msg)
    }

    fn on_add_gift(&mut self, msg: GiftMessage) {
        (**self).on_add_gift(msg)
    }

    fn on_add_member(&mut self, msg: MembershipMessage) {
        (**self).on_add_member(msg)
    }

    fn on_add_super_chat(&mut self, msg: SuperChatMessage) {
        (**self).on_add_super_chat(msg)
    }

    fn on_del_super_chat(&mut self, msg: SuperChatDelete) {
        (**self).on_del_super_chat(msg)
    }

    fn on_update_translation(&mut self, msg: TranslationUpdate) {
        (**self).on_update_translation(msg)
    }

    fn on_fatal_error(&mut self, error: FatalError) {
        (**self).on_fatal_error(error)
    }

    fn on_debug_msg(&mut self, msg: DebugMessage) {
        (**self).on_debug_msg(msg)
    }
}

// ---------------------------------------------------------------------------
// ChannelHandler
// ---------------------------------------------------------------------------

/// Forwards every message into an unbounded channel.
///
/// Useful when the consumer lives in another task, and in tests. Messages
/// sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

/// Creates a [`ChannelHandler`] and the receiver its messages arrive on.
pub fn channel_handler() -> (ChannelHandler, mpsc::UnboundedReceiver<ChatMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelHandler { tx }, rx)
}

impl ChannelHandler {
    fn forward(&self, msg: ChatMessage) {
        if self.tx.send(msg).is_err() {
            tracing::trace!("message receiver dropped");
        }
    }
}

impl MessageHandler for ChannelHandler {
    fn on_add_text(&mut self, msg: TextMessage) {
        self.forward(ChatMessage::AddText(msg));
    }

    fn on_add_gift(&mut self, msg: GiftMessage) {
        self.forward(ChatMessage::AddGift(msg));
    }

    fn on_add_member(&mut self, msg: MembershipMessage) {
        self.forward(ChatMessage::AddMember(msg));
    }

    fn on_add_super_chat(&mut self, msg: SuperChatMessage) {
        self.forward(ChatMessage::AddSuperChat(msg));
    }

    fn on_del_super_chat(&mut self, msg: SuperChatDelete) {
        self.forward(ChatMessage::DelSuperChat(msg));
    }

    fn on_update_translation(&mut self, msg: TranslationUpdate) {
        self.forward(ChatMessage::UpdateTranslation(msg));
    }

    fn on_fatal_error(&mut self, error: FatalError) {
        self.forward(ChatMessage::Fatal(error));
    }

    fn on_debug_msg(&mut self, msg: DebugMessage) {
        self.forward(ChatMessage::Debug(msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FatalErrorKind;

    #[derive(Default)]
    struct TextsOnly {
        texts: Vec<String>,
    }

    impl MessageHandler for TextsOnly {
        fn on_add_text(&mut self, msg: TextMessage) {
            self.texts.push(msg.content);
        }
    }

    #[test]
    fn test_default_methods_are_no_ops() {
        let mut h = TextsOnly::default();
        dispatch(&mut h, ChatMessage::AddGift(GiftMessage::default()));
        dispatch(
            &mut h,
            ChatMessage::AddText(TextMessage {
                content: "hi".into(),
                ..Default::default()
            }),
        );
        assert_eq!(h.texts, vec!["hi".to_string()]);
    }

    #[test]
    fn test_channel_handler_forwards_in_order() {
        let (mut h, mut rx) = channel_handler();
        dispatch(&mut h, ChatMessage::Debug(DebugMessage { text: "a".into() }));
        dispatch(
            &mut h,
            ChatMessage::Fatal(FatalError::new(FatalErrorKind::TooManyRetries, "x")),
        );
        assert!(matches!(rx.try_recv(), Ok(ChatMessage::Debug(_))));
        assert!(matches!(rx.try_recv(), Ok(ChatMessage::Fatal(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_handler_survives_dropped_receiver() {
        let (mut h, rx) = channel_handler();
        drop(rx);
        dispatch(&mut h, ChatMessage::Debug(DebugMessage { text: "a".into() }));
    }

    #[test]
    fn test_boxed_handler() {
        let (h, mut rx) = channel_handler();
        let mut boxed: Box<dyn MessageHandler> = Box::new(h);
        dispatch(&mut boxed, ChatMessage::AddGift(GiftMessage::default()));
        assert!(matches!(rx.try_recv(), Ok(ChatMessage::AddGift(_))));
    }
}
