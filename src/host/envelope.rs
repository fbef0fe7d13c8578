//! Line-level framing between the host process and the browser side.

use serde::{Deserialize, Serialize};

use crate::{
    classify::{PageMetadata, Verdict},
    protocol::{ClientMessage, TabDirective, TabId, UiRequest, UiResponse},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Inbound {
    Tab {
        tab_id: TabId,
        message: ClientMessage,
    },
    Browser {
        event: BrowserEvent,
    },
    Ui {
        request_id: String,
        request: UiRequest,
    },
    AiResult {
        request_id: String,
        #[serde(default)]
        verdict: Option<Verdict>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BrowserEvent {
    TabActivated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    TabUpdated {
        tab_id: TabId,
        url: String,
    },
    TabRemoved {
        tab_id: TabId,
    },
    WindowFocusChanged {
        focused: bool,
        #[serde(default)]
        active_tab_id: Option<TabId>,
    },
    PermissionsChanged {
        origins: Vec<String>,
    },
    ClientsSnapshot {
        hosts: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    Tab {
        tab_id: TabId,
        directive: TabDirective,
    },
    Ui {
        request_id: String,
        response: UiResponse,
    },
    RegisterClients {
        hosts: Vec<String>,
    },
    UnregisterClients {
        hosts: Vec<String>,
    },
    AiRequest {
        request_id: String,
        metadata: PageMetadata,
    },
}
