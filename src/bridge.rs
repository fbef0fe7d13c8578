//! The coordinator's view of the browser.

use crate::{
    error::TrackerResult,
    protocol::{TabDirective, TabId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub tab_id: TabId,
    pub url: String,
}

/// Everything the core needs from the browser side.
///
/// Calls must not block: `send_to_tab` is a bounded attempt that reports
/// failure instead of waiting, and callers never retry it.
pub trait BrowserBridge: Send + Sync {
    /// None once the tab has closed.
    fn tab(&self, tab_id: TabId) -> Option<TabInfo>;

    fn tabs(&self) -> Vec<TabInfo>;

    fn focused_tab(&self) -> Option<TabId>;

    fn send_to_tab(&self, tab_id: TabId, directive: TabDirective) -> TrackerResult<()>;

    /// Origins the user granted access to; None until the browser reports them.
    fn granted_origins(&self) -> Option<Vec<String>>;

    /// Hosts that currently have a render client registered.
    fn registered_clients(&self) -> Vec<String>;

    fn register_clients(&self, hosts: &[String]) -> TrackerResult<()>;

    fn unregister_clients(&self, hosts: &[String]) -> TrackerResult<()>;
}
