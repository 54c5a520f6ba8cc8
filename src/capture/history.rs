//! Session history and the interception decorator used to record
//! programmatic navigation.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use super::host::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCallKind {
    Push,
    Replace,
}

/// A completed `pushState`/`replaceState` call.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryCall {
    pub kind: HistoryCallKind,
    /// Location after the call.
    pub href: String,
    /// URL argument resolved against the previous location.
    pub target_url: String,
    pub state: Value,
}

pub type HistoryHook = Arc<dyn Fn(&HistoryCall) + Send + Sync>;

pub trait HistoryApi: Send {
    fn current_url(&self) -> &Url;
    fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError>;
    fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError>;
}

pub trait HistoryInterception {
    /// Returns false if a hook was already installed; the existing hook stays.
    fn install(&mut self, hook: HistoryHook) -> bool;
    /// Returns false if nothing was installed.
    fn uninstall(&mut self) -> bool;
    fn is_installed(&self) -> bool;
}

/// Same-document history entries with a current index.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    entries: Vec<(Url, Value)>,
    index: usize,
}

impl SessionHistory {
    pub fn new(url: Url) -> Self {
        Self {
            entries: vec![(url, Value::Null)],
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_state(&self) -> &Value {
        &self.entries[self.index].1
    }

    /// Steps back one entry and returns its state.
    pub fn back(&mut self) -> Option<Value> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.current_state().clone())
    }

    /// Fragment navigation: a new entry that differs only in its hash.
    pub fn set_fragment(&mut self, fragment: &str) {
        let mut url = self.current_url().clone();
        let fragment = fragment.trim_start_matches('#');
        url.set_fragment(if fragment.is_empty() { None } else { Some(fragment) });
        self.push_entry(url, Value::Null);
    }

    fn resolve(&self, url: Option<&str>) -> Result<Url, HostError> {
        let current = self.current_url();
        let target = match url {
            Some(url) => current.join(url)?,
            None => current.clone(),
        };
        if target.origin() != current.origin() {
            return Err(HostError::Rejected(format!(
                "history entry {target} is not same-origin with {current}"
            )));
        }
        Ok(target)
    }

    fn push_entry(&mut self, url: Url, state: Value) {
        self.entries.truncate(self.index + 1);
        self.entries.push((url, state));
        self.index = self.entries.len() - 1;
    }
}

impl HistoryApi for SessionHistory {
    fn current_url(&self) -> &Url {
        &self.entries[self.index].0
    }

    fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError> {
        let target = self.resolve(url)?;
        self.push_entry(target, state);
        Ok(())
    }

    fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError> {
        let target = self.resolve(url)?;
        self.entries[self.index] = (target, state);
        Ok(())
    }
}

/// Wraps a history implementation so that completed push/replace calls are
/// reported to an installed hook. The wrapped behavior is unchanged.
pub struct InterceptableHistory<H> {
    inner: H,
    hook: Option<HistoryHook>,
}

impl<H: HistoryApi> InterceptableHistory<H> {
    pub fn new(inner: H) -> Self {
        Self { inner, hook: None }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.inner
    }

    fn intercept(
        &mut self,
        kind: HistoryCallKind,
        state: Value,
        url: Option<&str>,
    ) -> Result<(), HostError> {
        let target_url = match url {
            Some(url) => self.inner.current_url().join(url)?.to_string(),
            None => self.inner.current_url().to_string(),
        };
        let recorded = self.hook.as_ref().map(|_| state.clone());
        match kind {
            HistoryCallKind::Push => self.inner.push_state(state, url)?,
            HistoryCallKind::Replace => self.inner.replace_state(state, url)?,
        }
        if let (Some(hook), Some(state)) = (&self.hook, recorded) {
            hook(&HistoryCall {
                kind,
                href: self.inner.current_url().to_string(),
                target_url,
                state,
            });
        }
        Ok(())
    }
}

impl<H: HistoryApi> HistoryApi for InterceptableHistory<H> {
    fn current_url(&self) -> &Url {
        self.inner.current_url()
    }

    fn push_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError> {
        self.intercept(HistoryCallKind::Push, state, url)
    }

    fn replace_state(&mut self, state: Value, url: Option<&str>) -> Result<(), HostError> {
        self.intercept(HistoryCallKind::Replace, state, url)
    }
}

impl<H: HistoryApi> HistoryInterception for InterceptableHistory<H> {
    fn install(&mut self, hook: HistoryHook) -> bool {
        if self.hook.is_some() {
            return false;
        }
        self.hook = Some(hook);
        true
    }

    fn uninstall(&mut self) -> bool {
        self.hook.take().is_some()
    }

    fn is_installed(&self) -> bool {
        self.hook.is_some()
    }
}
