use std::collections::HashMap;

const DEFAULT_ACTIONS: &[(&str, &str)] = &[
    // container lifecycle
    ("create", "create"),
    ("start", "start"),
    ("stop", "stop"),
    ("die", "die"),
    ("destroy", "destroy"),
    ("restart", "restart"),
    ("pause", "pause"),
    ("unpause", "unpause"),
    // health checks
    ("health_status: healthy", "health_healthy"),
    ("health_status: unhealthy", "health_unhealthy"),
    // images
    ("pull", "pull"),
    ("push", "push"),
];

/// Maps the verbs the runtime emits to the short names used downstream.
#[derive(Debug, Clone)]
pub struct ActionTable {
    inner: HashMap<String, String>,
}

impl Default for ActionTable {
    fn default() -> Self {
        let inner = DEFAULT_ACTIONS
            .iter()
            .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
            .collect();
        Self { inner }
    }
}

impl ActionTable {
    pub fn empty() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn insert(&mut self, raw: impl Into<String>, canonical: impl Into<String>) {
        self.inner.insert(raw.into(), canonical.into());
    }

    /// Returns the canonical verb for `raw_action`.
    ///
    /// Unknown verbs are passed through trimmed and lower-cased so that
    /// verbs added by newer runtimes still reach the sink. Returns `None`
    /// only when nothing is left after trimming.
    pub fn normalize(&self, raw_action: &str) -> Option<String> {
        if let Some(canonical) = self.inner.get(raw_action) {
            return Some(canonical.clone());
        }
        let cleaned = raw_action.trim().to_lowercase();
        if cleaned.is_empty() {
            return None;
        }
        match self.inner.get(&cleaned) {
            Some(canonical) => Some(canonical.clone()),
            None => Some(cleaned),
        }
    }
}
