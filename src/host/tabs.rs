use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::{
    bridge::{BrowserBridge, TabInfo},
    error::{TrackerError, TrackerResult},
    protocol::{TabDirective, TabId},
};

use super::envelope::Outbound;

#[derive(Default)]
struct RegistryState {
    tabs: HashMap<TabId, String>,
    focused: Option<TabId>,
    grants: Option<Vec<String>>,
    registered: BTreeSet<String>,
}

/// What the host has learned about the browser from its events, plus the
/// bounded queue everything outbound goes through.
pub struct TabRegistry {
    state: Mutex<RegistryState>,
    outbound: mpsc::Sender<Outbound>,
}

impl TabRegistry {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            outbound,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn upsert(&self, tab_id: TabId, url: String) {
        self.lock().tabs.insert(tab_id, url);
    }

    /// Forgets a closed tab. Returns true if it held focus.
    pub fn remove(&self, tab_id: TabId) -> bool {
        let mut state = self.lock();
        state.tabs.remove(&tab_id);
        if state.focused == Some(tab_id) {
            state.focused = None;
            true
        } else {
            false
        }
    }

    pub fn set_focused(&self, tab_id: Option<TabId>) {
        self.lock().focused = tab_id;
    }

    /// Clears focus if `tab_id` holds it. Returns whether it did.
    pub fn blur(&self, tab_id: TabId) -> bool {
        let mut state = self.lock();
        if state.focused == Some(tab_id) {
            state.focused = None;
            true
        } else {
            false
        }
    }

    pub fn set_grants(&self, origins: Vec<String>) {
        self.lock().grants = Some(origins);
    }

    pub fn set_registered(&self, hosts: Vec<String>) {
        self.lock().registered = hosts.into_iter().collect();
    }

    /// Bounded, non-blocking enqueue.
    pub fn try_send(&self, message: Outbound) -> TrackerResult<()> {
        self.outbound
            .try_send(message)
            .map_err(|err| TrackerError::Storage(anyhow!("outbound queue rejected message: {err}")))
    }

    /// Waits for queue space; used for UI replies, which must not be dropped.
    pub async fn send(&self, message: Outbound) -> TrackerResult<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| TrackerError::Storage(anyhow!("outbound queue closed")))
    }
}

impl BrowserBridge for TabRegistry {
    fn tab(&self, tab_id: TabId) -> Option<TabInfo> {
        self.lock().tabs.get(&tab_id).map(|url| TabInfo {
            tab_id,
            url: url.clone(),
        })
    }

    fn tabs(&self) -> Vec<TabInfo> {
        self.lock()
            .tabs
            .iter()
            .map(|(tab_id, url)| TabInfo {
                tab_id: *tab_id,
                url: url.clone(),
            })
            .collect()
    }

    fn focused_tab(&self) -> Option<TabId> {
        self.lock().focused
    }

    fn send_to_tab(&self, tab_id: TabId, directive: TabDirective) -> TrackerResult<()> {
        if !self.lock().tabs.contains_key(&tab_id) {
            return Err(TrackerError::Unreachable(tab_id));
        }
        self.outbound
            .try_send(Outbound::Tab { tab_id, directive })
            .map_err(|_| TrackerError::Unreachable(tab_id))
    }

    fn granted_origins(&self) -> Option<Vec<String>> {
        self.lock().grants.clone()
    }

    fn registered_clients(&self) -> Vec<String> {
        self.lock().registered.iter().cloned().collect()
    }

    fn register_clients(&self, hosts: &[String]) -> TrackerResult<()> {
        self.try_send(Outbound::RegisterClients {
            hosts: hosts.to_vec(),
        })?;
        self.lock().registered.extend(hosts.iter().cloned());
        Ok(())
    }

    fn unregister_clients(&self, hosts: &[String]) -> TrackerResult<()> {
        self.try_send(Outbound::UnregisterClients {
            hosts: hosts.to_vec(),
        })?;
        let mut state = self.lock();
        for host in hosts {
            state.registered.remove(host);
        }
        Ok(())
    }
}
