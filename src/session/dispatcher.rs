//! Conversation dispatcher
//!
//! The dispatcher owns one client session. For every submission it:
//! 1. Classifies the input as an image directive or a chat turn
//! 2. Renders the user's text (and attachment) and clears the pending attachment
//! 3. Calls exactly one backend endpoint
//! 4. Renders the reply and, for chat turns, appends it to the history
//!
//! Failures are rendered inline and never poison the session.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::conversation::{Attachment, ConversationHistory, GeneratedAsset, Message};

use super::backend::BackendError;

/// Shown when a failure carries no usable message
pub const FALLBACK_FAILURE: &str = "Something went wrong. Please try again.";

/// Case-insensitive prefix that routes input to image generation
const DIRECTIVE_PATTERN: &str = r"(?i)^(image:|이미지:)";

fn directive_regex() -> &'static Regex {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    DIRECTIVE.get_or_init(|| Regex::new(DIRECTIVE_PATTERN).expect("directive pattern is valid"))
}

/// What a single line of user input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    GenerateImage { prompt: String },
    Chat { text: String },
}

pub fn classify(text: &str) -> Directive {
    match directive_regex().find(text) {
        Some(prefix) => Directive::GenerateImage {
            prompt: text[prefix.end()..].trim().to_string(),
        },
        None => Directive::Chat {
            text: text.to_string(),
        },
    }
}

/// The two server endpoints the dispatcher talks to
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send the full history, get the assistant's raw reply text
    async fn chat(&self, messages: &[Message]) -> Result<String, BackendError>;

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedAsset, BackendError>;
}

/// Presentation layer
pub trait Renderer {
    fn user_text(&mut self, text: &str);

    fn user_image(&mut self, data_uri: &str);

    /// A new attachment was picked and is waiting to be sent
    fn attachment_preview(&mut self, _attachment: &Attachment) {}

    fn clear_attachment(&mut self);

    fn assistant_reply(&mut self, content: &str);

    fn generated_image(&mut self, prompt: &str, asset: &GeneratedAsset);

    fn failure(&mut self, notice: &str);
}

/// Whether generated images become part of the conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageHistoryPolicy {
    /// Display only; history is untouched
    #[default]
    Discard,
    /// Append the directive as a user turn and a text note naming the
    /// prompt as the assistant turn. The image bytes never enter history.
    Record,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied { content: String },
    ImageGenerated { prompt: String, asset: GeneratedAsset },
    /// The call failed; the notice has already been rendered
    Failed { notice: String },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Nothing to send")]
    EmptyInput,
}

/// One client session: history, pending attachment and the collaborators
/// that carry submissions out.
///
/// `submit` borrows the session mutably, so a second submission cannot start
/// while one is in flight. Dropping the `submit` future cancels the call and
/// leaves the session as a failed call would.
pub struct Dispatcher<B, R> {
    backend: B,
    renderer: R,
    history: ConversationHistory,
    pending: Option<Attachment>,
    image_policy: ImageHistoryPolicy,
}

impl<B: Backend, R: Renderer> Dispatcher<B, R> {
    pub fn new(backend: B, renderer: R, system_prompt: impl Into<String>) -> Self {
        Self {
            backend,
            renderer,
            history: ConversationHistory::new(system_prompt),
            pending: None,
            image_policy: ImageHistoryPolicy::default(),
        }
    }

    pub fn with_image_policy(mut self, policy: ImageHistoryPolicy) -> Self {
        self.image_policy = policy;
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn pending_attachment(&self) -> Option<&Attachment> {
        self.pending.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Replace the pending attachment
    pub fn attach(&mut self, attachment: Attachment) {
        self.renderer.attachment_preview(&attachment);
        self.pending = Some(attachment);
    }

    pub fn detach(&mut self) {
        if self.pending.take().is_some() {
            self.renderer.clear_attachment();
        }
    }

    /// Submit one line of user input together with the pending attachment.
    ///
    /// Empty text with no attachment is rejected without any side effect.
    /// Backend failures are not errors here: they are rendered and reported
    /// as [`Outcome::Failed`].
    pub async fn submit(&mut self, text: &str) -> Result<Outcome, DispatchError> {
        if text.trim().is_empty() && self.pending.is_none() {
            return Err(DispatchError::EmptyInput);
        }

        let directive = classify(text);

        self.renderer.user_text(text);
        if let Some(attachment) = &self.pending {
            self.renderer.user_image(&attachment.to_data_uri());
        }
        let attachment = self.pending.take();
        self.renderer.clear_attachment();

        let outcome = match directive {
            Directive::GenerateImage { prompt } => {
                if attachment.is_some() {
                    tracing::debug!("Image directive ignores the attached image");
                }
                self.generate_image(text, prompt).await
            }
            Directive::Chat { text } => self.chat(text, attachment).await,
        };

        Ok(outcome)
    }

    async fn chat(&mut self, text: String, attachment: Option<Attachment>) -> Outcome {
        let message = match attachment {
            Some(attachment) => Message::user_with_image(text, attachment.to_data_uri()),
            None => Message::user(text),
        };
        self.history.push_user(message);

        tracing::debug!("Sending chat turn with {} message(s)", self.history.len());

        match self.backend.chat(self.history.messages()).await {
            Ok(content) => {
                self.renderer.assistant_reply(&content);
                self.history.push_assistant(content.clone());
                Outcome::Replied { content }
            }
            Err(e) => self.fail(e),
        }
    }

    async fn generate_image(&mut self, directive: &str, prompt: String) -> Outcome {
        tracing::debug!("Requesting image for prompt {:?}", prompt);

        match self.backend.generate_image(&prompt).await {
            Ok(asset) => {
                self.renderer.generated_image(&prompt, &asset);
                if self.image_policy == ImageHistoryPolicy::Record {
                    self.history.push_user(Message::user(directive));
                    self.history.push_assistant(generated_note(&prompt));
                }
                Outcome::ImageGenerated { prompt, asset }
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: BackendError) -> Outcome {
        tracing::warn!("Backend call failed: {}", error);
        let notice = error.notice();
        self.renderer.failure(&notice);
        Outcome::Failed { notice }
    }
}

/// Assistant turn standing in for a generated image
fn generated_note(prompt: &str) -> String {
    format!("[Generated an image for: {prompt}]")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::conversation::{Content, Role};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        UserText(String),
        UserImage(String),
        Preview,
        Cleared,
        ChatCall(Vec<Message>),
        ImageCall(String),
        Reply(String),
        Image(String),
        Failure(String),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    #[derive(Clone)]
    enum Script {
        Ok(String),
        Fail(u16, String),
    }

    impl Script {
        fn result(&self) -> Result<String, BackendError> {
            match self {
                Script::Ok(value) => Ok(value.clone()),
                Script::Fail(status, message) => Err(BackendError::Server {
                    status: *status,
                    message: message.clone(),
                }),
            }
        }
    }

    struct MockBackend {
        log: Log,
        chat: Script,
        image: Script,
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn chat(&self, messages: &[Message]) -> Result<String, BackendError> {
            self.log.lock().unwrap().push(Event::ChatCall(messages.to_vec()));
            self.chat.result()
        }

        async fn generate_image(&self, prompt: &str) -> Result<GeneratedAsset, BackendError> {
            self.log.lock().unwrap().push(Event::ImageCall(prompt.to_string()));
            self.image.result().map(GeneratedAsset::new)
        }
    }

    struct RecordingRenderer {
        log: Log,
    }

    impl Renderer for RecordingRenderer {
        fn user_text(&mut self, text: &str) {
            self.log.lock().unwrap().push(Event::UserText(text.to_string()));
        }

        fn user_image(&mut self, data_uri: &str) {
            self.log.lock().unwrap().push(Event::UserImage(data_uri.to_string()));
        }

        fn attachment_preview(&mut self, _attachment: &Attachment) {
            self.log.lock().unwrap().push(Event::Preview);
        }

        fn clear_attachment(&mut self) {
            self.log.lock().unwrap().push(Event::Cleared);
        }

        fn assistant_reply(&mut self, content: &str) {
            self.log.lock().unwrap().push(Event::Reply(content.to_string()));
        }

        fn generated_image(&mut self, _prompt: &str, asset: &GeneratedAsset) {
            self.log.lock().unwrap().push(Event::Image(asset.base64.clone()));
        }

        fn failure(&mut self, notice: &str) {
            self.log.lock().unwrap().push(Event::Failure(notice.to_string()));
        }
    }

    const SYSTEM: &str = "You are a kind and helpful assistant.";

    fn dispatcher(chat: Script, image: Script) -> (Dispatcher<MockBackend, RecordingRenderer>, Log) {
        let log = Log::default();
        let backend = MockBackend {
            log: log.clone(),
            chat,
            image,
        };
        let renderer = RecordingRenderer { log: log.clone() };
        (Dispatcher::new(backend, renderer, SYSTEM), log)
    }

    fn events(log: &Log) -> Vec<Event> {
        log.lock().unwrap().clone()
    }

    fn png_attachment() -> Attachment {
        Attachment::from_bytes(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A])
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("image: a red fox in snow"),
            Directive::GenerateImage {
                prompt: "a red fox in snow".into()
            }
        );
        assert_eq!(
            classify("IMAGE:   castle at dusk  "),
            Directive::GenerateImage {
                prompt: "castle at dusk".into()
            }
        );
        assert_eq!(
            classify("이미지: 눈 속의 여우"),
            Directive::GenerateImage {
                prompt: "눈 속의 여우".into()
            }
        );
        assert_eq!(
            classify("describe this image: please"),
            Directive::Chat {
                text: "describe this image: please".into()
            }
        );
        assert_eq!(
            classify(" image: leading space"),
            Directive::Chat {
                text: " image: leading space".into()
            }
        );
    }

    #[tokio::test]
    async fn test_chat_turn_appends_user_and_assistant() {
        let (mut dispatcher, log) =
            dispatcher(Script::Ok("Hi there".into()), Script::Ok(String::new()));

        let outcome = dispatcher.submit("Hello").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Replied {
                content: "Hi there".into()
            }
        );

        let expected_request = vec![Message::system(SYSTEM), Message::user("Hello")];
        assert_eq!(
            events(&log),
            vec![
                Event::UserText("Hello".into()),
                Event::Cleared,
                Event::ChatCall(expected_request),
                Event::Reply("Hi there".into()),
            ]
        );
        assert_eq!(
            dispatcher.history().messages(),
            &[
                Message::system(SYSTEM),
                Message::user("Hello"),
                Message::assistant("Hi there"),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_history_is_sent_each_turn() {
        let (mut dispatcher, log) = dispatcher(Script::Ok("ok".into()), Script::Ok(String::new()));

        dispatcher.submit("first").await.unwrap();
        dispatcher.submit("second").await.unwrap();

        let calls: Vec<Vec<Message>> = events(&log)
            .into_iter()
            .filter_map(|e| match e {
                Event::ChatCall(messages) => Some(messages),
                _ => None,
            })
            .collect();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(
            calls[1],
            vec![
                Message::system(SYSTEM),
                Message::user("first"),
                Message::assistant("ok"),
                Message::user("second"),
            ]
        );
        assert_eq!(dispatcher.history().len(), 5);
    }

    #[tokio::test]
    async fn test_attachment_is_sent_as_image_part_and_cleared() {
        let (mut dispatcher, log) =
            dispatcher(Script::Ok("A PNG.".into()), Script::Ok(String::new()));
        let attachment = png_attachment();
        let data_uri = attachment.to_data_uri();

        dispatcher.attach(attachment);
        assert!(dispatcher.pending_attachment().is_some());

        dispatcher.submit("what is this?").await.unwrap();
        assert!(dispatcher.pending_attachment().is_none());

        let user = Message::user_with_image("what is this?", data_uri.clone());
        assert_eq!(
            events(&log),
            vec![
                Event::Preview,
                Event::UserText("what is this?".into()),
                Event::UserImage(data_uri),
                Event::Cleared,
                Event::ChatCall(vec![Message::system(SYSTEM), user.clone()]),
                Event::Reply("A PNG.".into()),
            ]
        );
        assert_eq!(dispatcher.history().messages()[1], user);
    }

    #[tokio::test]
    async fn test_attachment_alone_is_a_chat_turn() {
        let (mut dispatcher, _log) = dispatcher(Script::Ok("ok".into()), Script::Ok(String::new()));
        dispatcher.attach(png_attachment());

        dispatcher.submit("").await.unwrap();

        let user = &dispatcher.history().messages()[1];
        assert_eq!(user.role, Role::User);
        assert!(matches!(user.content, Content::Parts(_)));
    }

    #[tokio::test]
    async fn test_empty_input_is_a_no_op() {
        let (mut dispatcher, log) = dispatcher(Script::Ok("ok".into()), Script::Ok(String::new()));

        assert_eq!(dispatcher.submit("").await, Err(DispatchError::EmptyInput));
        assert_eq!(dispatcher.submit("   \n").await, Err(DispatchError::EmptyInput));

        assert!(events(&log).is_empty());
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_image_directive_leaves_history_untouched() {
        let (mut dispatcher, log) =
            dispatcher(Script::Ok("ok".into()), Script::Ok("iVBORw0KGgo=".into()));

        let outcome = dispatcher.submit("image: a red fox in snow").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::ImageGenerated {
                prompt: "a red fox in snow".into(),
                asset: GeneratedAsset::new("iVBORw0KGgo="),
            }
        );

        assert_eq!(
            events(&log),
            vec![
                Event::UserText("image: a red fox in snow".into()),
                Event::Cleared,
                Event::ImageCall("a red fox in snow".into()),
                Event::Image("iVBORw0KGgo=".into()),
            ]
        );
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_image_directive_discards_attachment() {
        let (mut dispatcher, log) =
            dispatcher(Script::Ok("ok".into()), Script::Fail(500, "boom".into()));
        dispatcher.attach(png_attachment());

        let outcome = dispatcher.submit("Image: sunset").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                notice: "boom".into()
            }
        );

        assert!(dispatcher.pending_attachment().is_none());
        assert_eq!(dispatcher.history().len(), 1);
        assert!(events(&log).contains(&Event::ImageCall("sunset".into())));
        assert!(!events(&log).iter().any(|e| matches!(e, Event::ChatCall(_))));
    }

    #[tokio::test]
    async fn test_record_policy_keeps_generated_image() {
        let (dispatcher, _log) =
            dispatcher(Script::Ok("ok".into()), Script::Ok("iVBORw0KGgo=".into()));
        let mut dispatcher = dispatcher.with_image_policy(ImageHistoryPolicy::Record);

        dispatcher.submit("image: a red fox in snow").await.unwrap();

        assert_eq!(
            dispatcher.history().messages(),
            &[
                Message::system(SYSTEM),
                Message::user("image: a red fox in snow"),
                Message::assistant("[Generated an image for: a red fox in snow]"),
            ]
        );
    }

    #[tokio::test]
    async fn test_record_policy_keeps_later_requests_text_only() {
        let (dispatcher, log) =
            dispatcher(Script::Ok("ok".into()), Script::Ok("iVBORw0KGgo=".repeat(1024)));
        let mut dispatcher = dispatcher.with_image_policy(ImageHistoryPolicy::Record);

        dispatcher.submit("image: castle at dusk").await.unwrap();
        dispatcher.submit("image: castle at dawn").await.unwrap();
        dispatcher.submit("which one was brighter?").await.unwrap();

        let sent = events(&log)
            .into_iter()
            .find_map(|e| match e {
                Event::ChatCall(messages) => Some(messages),
                _ => None,
            })
            .unwrap();
        assert_eq!(sent.len(), 6);
        assert!(sent.iter().all(|m| !m.content.has_image()));
    }

    #[tokio::test]
    async fn test_failed_chat_keeps_only_user_message() {
        let (mut dispatcher, log) = dispatcher(
            Script::Fail(429, "Rate limit reached".into()),
            Script::Ok(String::new()),
        );

        let outcome = dispatcher.submit("Hello").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                notice: "Rate limit reached".into()
            }
        );
        assert_eq!(
            dispatcher.history().messages(),
            &[Message::system(SYSTEM), Message::user("Hello")]
        );
        assert_eq!(
            events(&log).last(),
            Some(&Event::Failure("Rate limit reached".into()))
        );
    }

    #[tokio::test]
    async fn test_failed_chat_with_attachment_still_clears_it() {
        let (mut dispatcher, log) =
            dispatcher(Script::Fail(500, "boom".into()), Script::Ok(String::new()));
        let attachment = png_attachment();
        let data_uri = attachment.to_data_uri();
        dispatcher.attach(attachment);

        let outcome = dispatcher.submit("what is this?").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                notice: "boom".into()
            }
        );
        assert!(dispatcher.pending_attachment().is_none());

        let user = Message::user_with_image("what is this?", data_uri.clone());
        assert_eq!(
            events(&log),
            vec![
                Event::Preview,
                Event::UserText("what is this?".into()),
                Event::UserImage(data_uri),
                Event::Cleared,
                Event::ChatCall(vec![Message::system(SYSTEM), user.clone()]),
                Event::Failure("boom".into()),
            ]
        );
        assert_eq!(dispatcher.history().messages(), &[Message::system(SYSTEM), user]);
    }

    #[tokio::test]
    async fn test_failure_without_message_uses_fallback() {
        let (mut dispatcher, _log) =
            dispatcher(Script::Fail(502, String::new()), Script::Ok(String::new()));

        let outcome = dispatcher.submit("Hello").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Failed {
                notice: FALLBACK_FAILURE.into()
            }
        );
    }

    #[test]
    fn test_detach_clears_pending() {
        let (mut dispatcher, log) = dispatcher(Script::Ok("ok".into()), Script::Ok(String::new()));

        dispatcher.detach();
        assert!(events(&log).is_empty());

        dispatcher.attach(png_attachment());
        dispatcher.detach();
        assert!(dispatcher.pending_attachment().is_none());
        assert_eq!(events(&log), vec![Event::Preview, Event::Cleared]);
    }
}
