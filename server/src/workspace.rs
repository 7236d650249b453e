//! The workspace-manager / parser-backend seam. The actual HLASM parser
//! is out of scope; this module only defines the fixed interface the
//! request-manager-dispatched feature handlers drive, plus an in-memory
//! double useful for exercising the wiring end to end.

use hlasm_ls_core::request_manager::CancelToken;
use std::sync::Arc;

pub trait WorkspaceManager: Send + Sync {
    /// A parse-inducing event. MUST poll `cancel` periodically and
    /// surrender promptly once it is set.
    fn did_open(&self, uri: &str, text: &str, cancel: &CancelToken);
    fn did_change(&self, uri: &str, text: &str, cancel: &CancelToken);
    fn did_close(&self, uri: &str);
}

/// Records the last text seen per uri. Useful for tests asserting
/// end-to-end coalescing behavior.
#[derive(Default)]
pub struct InMemoryWorkspaceManager {
    documents: dashmap::DashMap<String, String>,
}

impl InMemoryWorkspaceManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn text_of(&self, uri: &str) -> Option<String> {
        self.documents.get(uri).map(|entry| entry.clone())
    }
}

impl WorkspaceManager for InMemoryWorkspaceManager {
    fn did_open(&self, uri: &str, text: &str, _cancel: &CancelToken) {
        self.documents.insert(uri.to_string(), text.to_string());
    }

    fn did_change(&self, uri: &str, text: &str, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }
        self.documents.insert(uri.to_string(), text.to_string());
    }

    fn did_close(&self, uri: &str) {
        self.documents.remove(uri);
    }
}
