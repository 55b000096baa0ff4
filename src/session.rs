//! Per-user chat session: an engine plus the conversation history.
//!
//! Sessions never share an engine or an index directory. A persistent
//! session keeps its generations under `<storage.dir>/<session-id>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::engine::{QueryEngine, QueryResult};
use crate::error::{FlowError, FlowResult};
use crate::generation::Generator;
use crate::models::Chunk;

/// First assistant turn of every fresh or cleared history.
pub const GREETING: &str = "Upload a CSV to get started.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Chunks an assistant answer was grounded on.
    pub sources: Vec<Chunk>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(role: Role, content: impl Into<String>, sources: Vec<Chunk>) -> Self {
        Self {
            role,
            content: content.into(),
            sources,
            created_at: Utc::now(),
        }
    }
}

pub struct Session {
    id: String,
    engine: QueryEngine,
    history: Vec<ConversationTurn>,
    current_file: Option<PathBuf>,
}

impl Session {
    /// Wrap an existing engine.
    pub fn new(id: impl Into<String>, engine: QueryEngine) -> Self {
        Self {
            id: id.into(),
            engine,
            history: vec![greeting()],
            current_file: None,
        }
    }

    /// Open a session with its own engine. With `storage.dir` configured,
    /// generations persist under `<storage.dir>/<id>`.
    ///
    /// Ids may contain ASCII letters, digits, `-` and `_`.
    pub fn open(
        config: &Config,
        id: &str,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> FlowResult<Self> {
        validate_id(id)?;
        let dir = config.storage.dir.as_ref().map(|root| root.join(id));
        let engine = QueryEngine::open(config, dir.as_deref(), embedder, generator)?;
        tracing::debug!(session = id, persistent = dir.is_some(), "Opened session");
        Ok(Self::new(id, engine))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ingest `path` into this session's index.
    pub async fn ingest(&mut self, path: &Path) -> FlowResult<usize> {
        let chunks = self.engine.ingest(path).await?;
        self.current_file = Some(path.to_path_buf());
        Ok(chunks)
    }

    /// Ask a question. Both turns are recorded only when the query succeeds.
    pub async fn ask(&mut self, question: &str) -> FlowResult<QueryResult> {
        let result = self.engine.query(question).await?;
        self.history
            .push(ConversationTurn::new(Role::User, question.trim(), Vec::new()));
        self.history.push(ConversationTurn::new(
            Role::Assistant,
            result.answer.clone(),
            result.sources.clone(),
        ));
        Ok(result)
    }

    /// Reset the history to the greeting. The index is untouched.
    pub fn clear_history(&mut self) {
        self.history = vec![greeting()];
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// The file most recently ingested through this session.
    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut QueryEngine {
        &mut self.engine
    }
}

fn greeting() -> ConversationTurn {
    ConversationTurn::new(Role::Assistant, GREETING, Vec::new())
}

fn validate_id(id: &str) -> FlowResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(FlowError::InvalidInput(format!(
            "invalid session id '{}': use ASCII letters, digits, '-' or '_'",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids() {
        assert!(validate_id("user-42_a").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../escape").is_err());
        assert!(validate_id("a b").is_err());
    }

    #[test]
    fn test_greeting_turn() {
        let turn = greeting();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, GREETING);
        assert!(turn.sources.is_empty());
    }
}
