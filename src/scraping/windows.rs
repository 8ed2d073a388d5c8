//! Window bookkeeping for flows that may or may not spawn a new window.
//!
//! The portal opens some transitions in a new window and others in place, so
//! callers snapshot the handle set before acting and compare afterwards.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::core::error::{MusterError, Result};
use crate::core::types::WindowHandle;
use crate::scraping::automation::WindowControl;

/// Handle set at one point in time.
pub type WindowSet = BTreeSet<WindowHandle>;

#[derive(Debug, Clone)]
pub struct WindowManager {
    poll_interval: Duration,
}

impl WindowManager {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub async fn snapshot<W>(&self, session: &mut W) -> Result<WindowSet>
    where
        W: WindowControl + ?Sized,
    {
        Ok(session.window_handles().await?.into_iter().collect())
    }

    /// The handle in `current` that `prior` lacks. With several, the first in
    /// handle order wins; one action is expected to open at most one window.
    pub fn opened_since(prior: &WindowSet, current: &WindowSet) -> Option<WindowHandle> {
        let mut fresh = current.difference(prior);
        let first = fresh.next().cloned();
        let extra = fresh.count();
        if extra > 0 {
            warn!("{} extra window(s) opened by one action; using the first", extra);
        }
        first
    }

    /// Poll until a window absent from `prior` exists, then return it.
    pub async fn wait_for_new_window<W>(
        &self,
        session: &mut W,
        prior: &WindowSet,
        timeout: Duration,
    ) -> Result<WindowHandle>
    where
        W: WindowControl + ?Sized,
    {
        let start = Instant::now();
        loop {
            let current = self.snapshot(session).await?;
            if let Some(handle) = Self::opened_since(prior, &current) {
                info!("🪟 New window {} after {}ms", handle, start.elapsed().as_millis());
                return Ok(handle);
            }
            if start.elapsed() >= timeout {
                return Err(MusterError::WindowTimeout { waited: timeout });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn focus<W>(&self, session: &mut W, handle: &WindowHandle) -> Result<()>
    where
        W: WindowControl + ?Sized,
    {
        if session.current_window().as_ref() == Some(handle) {
            return Ok(());
        }
        session.switch_to_window(handle).await
    }

    /// Close `handle` and focus `fallback`.
    pub async fn close_and_return<W>(
        &self,
        session: &mut W,
        handle: &WindowHandle,
        fallback: &WindowHandle,
    ) -> Result<()>
    where
        W: WindowControl + ?Sized,
    {
        self.focus(session, handle).await?;
        session.close_window().await?;
        session.switch_to_window(fallback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Windows appear after a given number of handle queries.
    struct ScriptedWindows {
        open: Vec<WindowHandle>,
        pending: Vec<(u32, WindowHandle)>,
        queries: u32,
        focused: Option<WindowHandle>,
    }

    impl ScriptedWindows {
        fn new(initial: &[&str]) -> Self {
            let open: Vec<WindowHandle> = initial.iter().map(|h| WindowHandle::new(*h)).collect();
            Self {
                focused: open.first().cloned(),
                open,
                pending: Vec::new(),
                queries: 0,
            }
        }

        fn opens_after(mut self, queries: u32, handle: &str) -> Self {
            self.pending.push((queries, WindowHandle::new(handle)));
            self
        }
    }

    #[async_trait]
    impl WindowControl for ScriptedWindows {
        async fn window_handles(&mut self) -> Result<Vec<WindowHandle>> {
            self.queries += 1;
            let queries = self.queries;
            let (due, later): (Vec<_>, Vec<_>) =
                self.pending.drain(..).partition(|(at, _)| *at <= queries);
            self.pending = later;
            self.open.extend(due.into_iter().map(|(_, h)| h));
            Ok(self.open.clone())
        }

        fn current_window(&self) -> Option<WindowHandle> {
            self.focused.clone()
        }

        async fn switch_to_window(&mut self, handle: &WindowHandle) -> Result<()> {
            if !self.open.contains(handle) {
                return Err(MusterError::Browser(format!("no window {}", handle)));
            }
            self.focused = Some(handle.clone());
            Ok(())
        }

        async fn close_window(&mut self) -> Result<()> {
            if let Some(h) = self.focused.take() {
                self.open.retain(|o| *o != h);
            }
            Ok(())
        }
    }

    fn manager() -> WindowManager {
        WindowManager::new(Duration::from_millis(1))
    }

    #[test]
    fn test_returns_the_unique_new_handle() {
        tokio_test::block_on(async {
            let mut w = ScriptedWindows::new(&["home", "other"]).opens_after(3, "popup");
            let wm = manager();
            let before = wm.snapshot(&mut w).await.unwrap();
            let new = wm
                .wait_for_new_window(&mut w, &before, Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(new, WindowHandle::new("popup"));
        });
    }

    #[test]
    fn test_no_new_window_is_window_timeout() {
        tokio_test::block_on(async {
            let mut w = ScriptedWindows::new(&["home"]);
            let wm = manager();
            let before = wm.snapshot(&mut w).await.unwrap();
            let err = wm
                .wait_for_new_window(&mut w, &before, Duration::from_millis(20))
                .await
                .unwrap_err();
            assert!(matches!(err, MusterError::WindowTimeout { .. }));
        });
    }

    #[test]
    fn test_opened_since_ignores_closed_windows() {
        let prior: WindowSet = ["a", "b"].iter().map(|h| WindowHandle::new(*h)).collect();
        let current: WindowSet = ["a"].iter().map(|h| WindowHandle::new(*h)).collect();
        assert_eq!(WindowManager::opened_since(&prior, &current), None);
    }

    #[test]
    fn test_close_and_return_refocuses_fallback() {
        tokio_test::block_on(async {
            let mut w = ScriptedWindows::new(&["home", "popup"]);
            let wm = manager();
            let home = WindowHandle::new("home");
            let popup = WindowHandle::new("popup");
            wm.focus(&mut w, &popup).await.unwrap();
            wm.close_and_return(&mut w, &popup, &home).await.unwrap();
            assert_eq!(w.current_window(), Some(home));
            assert_eq!(w.open, vec![WindowHandle::new("home")]);
        });
    }
}
