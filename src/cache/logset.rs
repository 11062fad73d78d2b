use std::collections::HashMap;

/// A single log stream. `token` is `None` while the log is only known from a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub id: String,
    pub token: Option<String>,
}

impl Log {
    pub fn new(id: String, token: Option<String>) -> Self {
        Self { id, token }
    }

    pub fn incomplete(id: String) -> Self {
        Self { id, token: None }
    }

    /// Token, if the log is fully resolved.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Named group of logs as seen by this process (possibly a partial view of the remote one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSet {
    pub id: String,
    pub name: String,
    pub logs: HashMap<String, Log>,
}

impl LogSet {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            logs: HashMap::new(),
        }
    }

    pub fn with_logs(id: String, name: String, logs: HashMap<String, Log>) -> Self {
        Self { id, name, logs }
    }

    pub fn token_for(&self, log_name: &str) -> Option<&str> {
        self.logs.get(log_name).and_then(|log| log.token())
    }

    /// Fold a fresher remote view into this one. Resolved tokens are never replaced,
    /// logs this process created but the remote listing does not show yet are kept.
    pub fn merge_remote(&self, remote: LogSet) -> LogSet {
        let mut logs = remote.logs;
        for (name, known) in &self.logs {
            let listed = logs.get(name);
            if listed.is_some_and(|l| l.token().is_some()) {
                continue;
            }
            if known.token().is_some() || listed.is_none() {
                logs.insert(name.clone(), known.clone());
            }
        }
        LogSet {
            id: remote.id,
            name: self.name.clone(),
            logs,
        }
    }
}
