//! User-facing side effects for inbound messages: desktop
//! notifications, a notification sound, and text-to-speech readout.
//!
//! Notifications fire only while the window is unfocused; sound and
//! speech play regardless of focus. Each channel has its own enable
//! switch, and the actual delivery mechanisms sit behind traits so
//! headless builds and tests plug in no-ops.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use regex::Regex;

use parlor_proto::message::{LinkmanKind, Message, MessageKind};

/// Speech longer than this is dropped outright rather than read.
const SPEECH_LIMIT: usize = 100;

/// Notification bodies are truncated to this many characters.
const NOTIFY_BODY_LIMIT: usize = 200;

#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("pattern is valid"));

/// Delivery of desktop notifications.
pub trait Notifier: Send + Sync {
    /// Shows one notification.
    fn notify(&self, title: &str, avatar: &str, body: &str);
}

/// Playback of the short notification sound.
pub trait SoundPlayer: Send + Sync {
    /// Plays the named sound once.
    fn play(&self, sound: &str);
}

/// Text-to-speech output, read in enqueue order.
pub trait SpeechQueue: Send + Sync {
    /// Queues one utterance.
    fn enqueue(&self, text: &str);
}

/// No-op notifier for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _title: &str, _avatar: &str, _body: &str) {}
}

/// No-op sound player for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSoundPlayer;

impl SoundPlayer for NullSoundPlayer {
    fn play(&self, _sound: &str) {}
}

/// No-op speech queue for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSpeechQueue;

impl SpeechQueue for NullSpeechQueue {
    fn enqueue(&self, _text: &str) {}
}

/// Per-channel effect switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectSettings {
    /// Show desktop notifications.
    pub notifications: bool,
    /// Notification sound name, `None` to disable sound.
    pub sound: Option<String>,
    /// Read messages aloud.
    pub speech: bool,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            notifications: true,
            sound: Some("default".to_string()),
            speech: false,
        }
    }
}

/// Routes each applied inbound message to the enabled effect channels.
pub struct EffectDispatcher<N, P, V> {
    notifier: N,
    sound: P,
    speech: V,
    settings: EffectSettings,
    window_focused: AtomicBool,
    // Consecutive utterances by the same speaker in the same
    // conversation skip the repeated name prefix.
    last_speaker: Mutex<Option<(String, String)>>,
}

impl<N: Notifier, P: SoundPlayer, V: SpeechQueue> EffectDispatcher<N, P, V> {
    /// Creates a dispatcher; the window starts focused, so no
    /// notifications show until the first blur.
    pub fn new(notifier: N, sound: P, speech: V, settings: EffectSettings) -> Self {
        Self {
            notifier,
            sound,
            speech,
            settings,
            window_focused: AtomicBool::new(true),
            last_speaker: Mutex::new(None),
        }
    }

    /// Records window focus. Regaining focus suppresses notifications
    /// only; sound and speech keep running.
    pub fn set_window_focused(&self, focused: bool) {
        self.window_focused.store(focused, Ordering::Relaxed);
    }

    /// Dispatches the effects for one applied inbound message.
    ///
    /// `linkman_name` and `linkman_kind` describe the conversation the
    /// message landed in, used for notification titles.
    pub fn on_message(&self, message: &Message, linkman_name: &str, linkman_kind: LinkmanKind) {
        if self.settings.notifications && !self.window_focused.load(Ordering::Relaxed) {
            self.notify(message, linkman_name, linkman_kind);
        }
        if let Some(ref sound) = self.settings.sound {
            self.sound.play(sound);
        }
        if self.settings.speech {
            self.speak(message, linkman_name);
        }
    }

    fn notify(&self, message: &Message, linkman_name: &str, linkman_kind: LinkmanKind) {
        let title = match linkman_kind {
            LinkmanKind::Group => {
                format!("{} in {} says:", message.from.username, linkman_name)
            }
            LinkmanKind::Friend | LinkmanKind::Temporary => {
                format!("{} says to you:", message.from.username)
            }
        };
        let mut body = match message.kind {
            MessageKind::Text => unescape_html(&message.content),
            other => format!("[{}]", other.tag()),
        };
        if body.chars().count() > NOTIFY_BODY_LIMIT {
            body = body.chars().take(NOTIFY_BODY_LIMIT).collect();
        }
        self.notifier.notify(&title, &message.from.avatar, &body);
    }

    fn speak(&self, message: &Message, linkman_name: &str) {
        match message.kind {
            MessageKind::System => {
                // System notices carry the subject in originUsername;
                // the next real speaker must re-announce themselves.
                let subject = message
                    .from
                    .origin_username
                    .as_deref()
                    .unwrap_or(message.from.username.as_str());
                self.speech.enqueue(&format!("{subject} {}", message.content));
                *self.last_speaker.lock() = None;
            }
            MessageKind::Text => {
                let stripped = URL_PATTERN
                    .replace_all(&message.content, "")
                    .replace('#', "");
                if stripped.chars().count() > SPEECH_LIMIT {
                    tracing::debug!(len = stripped.len(), "speech over limit dropped");
                    return;
                }
                let key = (message.from.username.clone(), linkman_name.to_string());
                let mut last = self.last_speaker.lock();
                let repeat = last.as_ref() == Some(&key);
                *last = Some(key);
                drop(last);
                // Stripping can leave nothing to say; the speaker
                // memory still advances.
                if stripped.is_empty() {
                    return;
                }
                let text = if repeat {
                    stripped
                } else {
                    format!("{} says: {stripped}", message.from.username)
                };
                self.speech.enqueue(&text);
            }
            MessageKind::Image | MessageKind::Code | MessageKind::File => {}
        }
    }
}

/// Reverses the server's angle-bracket escaping of text content.
#[must_use]
pub fn unescape_html(content: &str) -> String {
    content.replace("&lt;", "<").replace("&gt;", ">")
}
