use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// A short user-facing message. The UI layer decides how to render it
/// (toast, banner, haptic) based on the kind.
#[derive(Clone, PartialEq, Debug)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub subtitle: Option<String>,
}

impl Notice {
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            title: title.into(),
            subtitle: None,
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            title: title.into(),
            subtitle: None,
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: title.into(),
            subtitle: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub destructive: bool,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire-and-forget delivery; must not block the caller.
    fn notify(&self, notice: Notice);

    /// Interactive yes/no prompt. Resolves to `false` when dismissed.
    async fn confirm(&self, request: ConfirmRequest) -> bool;
}

/// Headless fallback that routes notices to the log and accepts every
/// prompt. Useful for embedding without a UI surface attached yet.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Error => {
                warn!(title = %notice.title, subtitle = ?notice.subtitle, "User notice")
            }
            _ => info!(title = %notice.title, subtitle = ?notice.subtitle, "User notice"),
        }
    }

    async fn confirm(&self, request: ConfirmRequest) -> bool {
        info!(title = %request.title, "Auto-confirming prompt");
        true
    }
}
