// Pagetrace - Client-side visitor telemetry
// Copyright (c) 2025 Pagetrace Contributors
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Page environment: navigation context and the visibility signal.
//!
//! The host embedding owns both. [`PageContext`] is a plain snapshot of the
//! navigation state used to default envelope fields and the device portion of
//! collection snapshots. Visibility arrives over a `tokio::sync::watch`
//! channel; a transition to [`Visibility::Hidden`] is the dominant real-world
//! truncation signal for metric collection, since pages are torn down far
//! more often by backgrounding than by timers expiring.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Page visibility state as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// The page is in the foreground.
    #[default]
    Visible,
    /// The page has been backgrounded or is being torn down.
    Hidden,
}

/// Create a visibility channel. The host keeps the sender and flips it to
/// [`Visibility::Hidden`] when the page leaves the foreground; collectors
/// hold the receiver.
pub fn visibility_channel(initial: Visibility) -> (watch::Sender<Visibility>, VisibilityWatch) {
    watch::channel(initial)
}

/// Receiver half of the visibility signal.
pub type VisibilityWatch = watch::Receiver<Visibility>;

/// Navigation and device context supplied by the host environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContext {
    /// Current document path.
    pub path: String,
    /// Referrer URL, empty when direct.
    pub referrer: String,
    /// User agent string.
    pub user_agent: String,
    /// BCP 47 language tag.
    pub language: String,
    /// Whether the host reports network connectivity.
    pub online: bool,
    /// Screen width in CSS pixels.
    pub screen_width: u32,
    /// Screen height in CSS pixels.
    pub screen_height: u32,
}

impl Default for PageContext {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            referrer: String::new(),
            user_agent: String::new(),
            language: String::new(),
            online: true,
            screen_width: 0,
            screen_height: 0,
        }
    }
}

impl PageContext {
    /// Context for a given path, everything else defaulted.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = PageContext::default();
        assert_eq!(ctx.path, "/");
        assert!(ctx.referrer.is_empty());
        assert!(ctx.online);
    }

    #[test]
    fn test_visibility_channel_flips() {
        let (tx, rx) = visibility_channel(Visibility::Visible);
        assert_eq!(*rx.borrow(), Visibility::Visible);
        tx.send(Visibility::Hidden).expect("receiver alive");
        assert_eq!(*rx.borrow(), Visibility::Hidden);
    }
}
