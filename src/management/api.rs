//! Wire shapes of the Logentries management API (`/management/logsets`, `/management/logs`).
//!
//! Only the fields resolution needs are modelled; everything else is ignored on decode.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::logset::{Log, LogSet};

/// Child entry of a logset listing. Never carries a token.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LogInfo {
    pub id: String,
    pub name: String,
}

/// Reference from a log back to the logsets that own it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LogSetRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LogSetSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logs_info: Vec<LogInfo>,
}

impl LogSetSummary {
    /// Logset whose logs are all incomplete; tokens are attached lazily.
    pub fn into_logset(self) -> LogSet {
        let logs = self
            .logs_info
            .into_iter()
            .map(|info| (info.name, Log::incomplete(info.id)))
            .collect::<HashMap<_, _>>();
        LogSet::with_logs(self.id, self.name, logs)
    }

    pub fn has_log(&self, log_name: &str) -> bool {
        self.logs_info.iter().any(|info| info.name == log_name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LogSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub logsets_info: Vec<LogSetRef>,
}

impl LogSummary {
    /// First token, the one used for delivery.
    pub fn token(&self) -> Option<String> {
        self.tokens.first().filter(|t| !t.is_empty()).cloned()
    }

    pub fn belongs_to(&self, logset_id: &str) -> bool {
        self.logsets_info.iter().any(|ls| ls.id == logset_id)
    }

    pub fn into_log(self) -> Log {
        let token = self.token();
        Log::new(self.id, token)
    }
}

#[derive(Debug, Deserialize)]
pub struct LogSetsEnvelope {
    #[serde(default)]
    pub logsets: Vec<LogSetSummary>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogSetEnvelope {
    pub logset: LogSetSummary,
}

#[derive(Debug, Deserialize)]
pub struct LogsEnvelope {
    #[serde(default)]
    pub logs: Vec<LogSummary>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogEnvelope {
    pub log: LogSummary,
}

#[derive(Debug, Serialize)]
pub struct CreateLogSetRequest<'a> {
    pub logset: CreateLogSet<'a>,
}

#[derive(Debug, Serialize)]
pub struct CreateLogSet<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateLogRequest<'a> {
    pub log: CreateLog<'a>,
}

#[derive(Debug, Serialize)]
pub struct CreateLog<'a> {
    pub name: &'a str,
    pub source_type: &'static str,
    pub logsets_info: Vec<LogSetId<'a>>,
}

#[derive(Debug, Serialize)]
pub struct LogSetId<'a> {
    pub id: &'a str,
}

impl<'a> CreateLogSetRequest<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            logset: CreateLogSet { name },
        }
    }
}

impl<'a> CreateLogRequest<'a> {
    pub fn new(logset_id: &'a str, name: &'a str) -> Self {
        Self {
            log: CreateLog {
                name,
                source_type: "token",
                logsets_info: vec![LogSetId { id: logset_id }],
            },
        }
    }
}
