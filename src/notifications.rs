use notify_rust::{Notification, Timeout};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Transient notices disappear on their own; blocking ones need acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Transient,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn transient(level: NoticeLevel, title: &str, message: &str) -> Self {
        Self {
            level,
            kind: NoticeKind::Transient,
            title: title.to_string(),
            message: message.to_string(),
        }
    }

    pub fn blocking(level: NoticeLevel, title: &str, message: &str) -> Self {
        Self {
            level,
            kind: NoticeKind::Blocking,
            title: title.to_string(),
            message: message.to_string(),
        }
    }
}

/// User-facing notification surface
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// In-memory toast queue drained by the UI
#[derive(Debug, Default)]
pub struct ToastQueue {
    pending: Mutex<VecDeque<Notice>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued notice, oldest first.
    pub fn drain(&self) -> Vec<Notice> {
        match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, notice: Notice) {
        debug!("Queued {:?} notice: {} - {}", notice.level, notice.title, notice.message);
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(notice);
        }
    }
}

/// Desktop notifications via the platform notification daemon
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            app_name: "AssetDesk".to_string(),
        }
    }

    fn icon(level: NoticeLevel) -> &'static str {
        match level {
            NoticeLevel::Info => "dialog-information",
            NoticeLevel::Success => "dialog-positive",
            NoticeLevel::Warning => "dialog-warning",
            NoticeLevel::Error => "dialog-error",
        }
    }

    fn timeout(notice: &Notice) -> Timeout {
        if notice.kind == NoticeKind::Blocking {
            return Timeout::Never;
        }
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => Timeout::Milliseconds(5000),
            NoticeLevel::Warning => Timeout::Milliseconds(7000),
            NoticeLevel::Error => Timeout::Milliseconds(10000),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notice: Notice) {
        if let Err(e) = Notification::new()
            .summary(&notice.title)
            .body(&notice.message)
            .appname(&self.app_name)
            .icon(Self::icon(notice.level))
            .timeout(Self::timeout(&notice))
            .show()
        {
            warn!("Failed to show notification: {}", e);
        } else {
            debug!("Showed notification: {} - {}", notice.title, notice.message);
        }
    }
}
