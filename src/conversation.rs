//! Conversation contexts persisted in a key-value store.
//!
//! A context moves through three states: it is created, it is active while
//! messages are added and trimmed, and it is cleared. State lives entirely in
//! the [`KvStore`]; every mutation is a read-modify-write without
//! transactions, so concurrent writers can lose updates. Each stored context
//! carries a `version` that is checked on save: a mismatch is logged and the
//! write proceeds (last writer wins).
//!
//! Token accounting for trimming weights each message by role before
//! summing: the leading system message counts 1.5x, assistant messages
//! 1.2x and user messages 1.0x (configurable), each rounded up.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};
use uuid::Uuid;

use crate::config::{ConversationConfig, WindowConfig};
use crate::error::{Result, TokenwrightError};
use crate::store::KvStore;
use crate::tokens::TokenCounter;
use crate::windower::ContextWindower;

const SUMMARY_PREVIEW_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Derived totals, recomputed on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextMetadata {
    /// Role-weighted token count over all messages, as used for trimming.
    pub token_usage: usize,
    /// Unweighted token count over all messages.
    pub raw_tokens: usize,
    pub message_count: usize,
    pub document_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub session_id: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_content: Option<String>,
    pub metadata: ContextMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of saves this context has seen.
    pub version: u64,
}

impl Context {
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::System)
    }
}

/// A message in the shape a model API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

/// Parameters for [`ConversationStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewContext {
    pub session_id: String,
    pub conversation_id: Option<String>,
    pub document_content: Option<String>,
    pub system_message: Option<String>,
    pub user_id: Option<String>,
}

impl NewContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn document(mut self, content: impl Into<String>) -> Self {
        self.document_content = Some(content.into());
        self
    }

    pub fn system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub session_id: String,
    pub conversation_id: String,
    pub system_prompt: Option<String>,
    pub message_count: usize,
    /// Role-weighted.
    pub token_usage: usize,
    pub raw_tokens: usize,
    pub document_tokens: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct ConversationStore {
    store: Arc<dyn KvStore>,
    counter: TokenCounter,
    config: ConversationConfig,
    windower: ContextWindower,
}

impl fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationStore")
            .field("counter", &self.counter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KvStore>, counter: TokenCounter, config: ConversationConfig) -> Self {
        Self {
            windower: ContextWindower::new(counter.clone(), WindowConfig::default()),
            store,
            counter,
            config,
        }
    }

    /// Window settings used for document snapshots in [`Self::prepare_for_model`].
    pub fn with_window_config(mut self, window: WindowConfig) -> Self {
        self.windower = ContextWindower::new(self.counter.clone(), window);
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn storage_key(session_id: &str, conversation_id: &str) -> String {
        format!("context:{session_id}:{conversation_id}")
    }

    pub fn create(&self, new: NewContext) -> Result<Context> {
        let conversation_id = new
            .conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let _span = info_span!("context", session_id = %new.session_id, conversation_id = %conversation_id)
            .entered();

        let messages = new
            .system_message
            .filter(|m| !m.trim().is_empty())
            .map(|m| vec![Message::new(Role::System, m)])
            .unwrap_or_default();

        let now = Utc::now();
        let mut context = Context {
            session_id: new.session_id,
            conversation_id,
            user_id: new.user_id,
            messages,
            document_content: new.document_content,
            metadata: ContextMetadata::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.save(&mut context)?;
        debug!("created context");
        Ok(context)
    }

    pub fn get(&self, session_id: &str, conversation_id: &str) -> Result<Option<Context>> {
        let key = Self::storage_key(session_id, conversation_id);
        match self.store.get(&key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| TokenwrightError::serialization(format!("context {key}"), e)),
            None => Ok(None),
        }
    }

    /// Append a message. Returns `None` when the context does not exist.
    ///
    /// Once the conversation holds more than `max_messages` messages it is
    /// trimmed against the configured token budget before saving.
    pub fn add_message(
        &self,
        session_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Option<Context>> {
        let _span = info_span!("context", session_id, conversation_id).entered();
        let Some(mut context) = self.get(session_id, conversation_id)? else {
            warn!("context not found; message not stored");
            return Ok(None);
        };

        context.messages.push(Message::new(role, content));
        if context.messages.len() > self.config.max_messages {
            let before = context.messages.len();
            context = self.trim(&context, self.config.max_tokens);
            debug!(
                before,
                after = context.messages.len(),
                "auto-trimmed conversation"
            );
        }
        self.save(&mut context)?;
        Ok(Some(context))
    }

    /// Like [`Self::add_message`], but a missing context is an error.
    pub fn append_message(
        &self,
        session_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Context> {
        self.add_message(session_id, conversation_id, role, content)?
            .ok_or_else(|| TokenwrightError::context_not_found(session_id, conversation_id))
    }

    /// Replace the document snapshot.
    pub fn set_document(
        &self,
        session_id: &str,
        conversation_id: &str,
        document: Option<String>,
    ) -> Result<Context> {
        let _span = info_span!("context", session_id, conversation_id).entered();
        let mut context = self
            .get(session_id, conversation_id)?
            .ok_or_else(|| TokenwrightError::context_not_found(session_id, conversation_id))?;
        context.document_content = document;
        self.save(&mut context)?;
        Ok(context)
    }

    /// Trim a stored context and save the result.
    pub fn trim_stored(
        &self,
        session_id: &str,
        conversation_id: &str,
        max_tokens: usize,
    ) -> Result<Context> {
        let _span = info_span!("context", session_id, conversation_id).entered();
        let context = self
            .get(session_id, conversation_id)?
            .ok_or_else(|| TokenwrightError::context_not_found(session_id, conversation_id))?;
        let mut trimmed = self.trim(&context, max_tokens);
        self.save(&mut trimmed)?;
        Ok(trimmed)
    }

    /// Keep system messages and the most recent other messages that fit
    /// `max_tokens` (role-weighted) and the message cap.
    ///
    /// With a zero budget nothing is kept. System messages are kept whenever
    /// the budget is positive, even if they alone exceed it. Messages keep
    /// their original order.
    pub fn trim(&self, context: &Context, max_tokens: usize) -> Context {
        let weights = self.weighted_counts(&context.messages);
        let mut keep = vec![false; context.messages.len()];
        let mut used = 0;
        let mut kept = 0;

        if max_tokens > 0 {
            for (i, message) in context.messages.iter().enumerate() {
                if message.role == Role::System {
                    keep[i] = true;
                    used += weights[i];
                    kept += 1;
                }
            }
            for (i, message) in context.messages.iter().enumerate().rev() {
                if message.role == Role::System {
                    continue;
                }
                if kept >= self.config.max_messages || used + weights[i] > max_tokens {
                    break;
                }
                keep[i] = true;
                used += weights[i];
                kept += 1;
            }
        }

        let mut trimmed = context.clone();
        trimmed.messages = context
            .messages
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(m, _)| m.clone())
            .collect();
        trimmed.metadata = self.metadata(&trimmed);
        trimmed
    }

    /// Messages ready to send to a model within `max_tokens`.
    ///
    /// The history is trimmed and stripped to role and content. A default
    /// system message is prepended if none survived. When the context holds
    /// a document, a window of it (ranked against the latest user message)
    /// is inserted after the leading system messages, using the budget the
    /// history left, capped at `document_share` of `max_tokens`.
    pub fn prepare_for_model(&self, context: &Context, max_tokens: usize) -> Vec<ModelMessage> {
        let trimmed = self.trim(context, max_tokens);
        let mut messages: Vec<ModelMessage> = trimmed
            .messages
            .into_iter()
            .map(|m| ModelMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        if !messages.iter().any(|m| m.role == Role::System) {
            messages.insert(
                0,
                ModelMessage {
                    role: Role::System,
                    content: self.config.default_system_message.clone(),
                },
            );
        }

        if let Some(document) = context.document_content.as_deref().filter(|d| !d.trim().is_empty()) {
            let history: usize = messages.iter().map(|m| self.counter.count(&m.content)).sum();
            let cap = (max_tokens as f64 * self.config.document_share).floor() as usize;
            let budget = max_tokens.saturating_sub(history).min(cap);
            if budget == 0 {
                warn!(max_tokens, history, "no budget left for document snapshot");
            } else {
                let query = context
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str());
                let window = self.windower.window(document, budget, query);
                let at = messages
                    .iter()
                    .position(|m| m.role != Role::System)
                    .unwrap_or(messages.len());
                debug!(budget, degraded = window.degraded, "attached document window");
                messages.insert(
                    at,
                    ModelMessage {
                        role: Role::System,
                        content: window.value,
                    },
                );
            }
        }
        messages
    }

    pub fn summary(&self, context: &Context) -> ContextSummary {
        ContextSummary {
            session_id: context.session_id.clone(),
            conversation_id: context.conversation_id.clone(),
            system_prompt: context
                .system_message()
                .map(|m| m.content.chars().take(SUMMARY_PREVIEW_CHARS).collect()),
            message_count: context.messages.len(),
            token_usage: context.metadata.token_usage,
            raw_tokens: context.metadata.raw_tokens,
            document_tokens: context.metadata.document_tokens,
            created_at: context.created_at,
            updated_at: context.updated_at,
            version: context.version,
        }
    }

    /// Delete a context. Returns whether it existed.
    pub fn clear(&self, session_id: &str, conversation_id: &str) -> Result<bool> {
        let _span = info_span!("context", session_id, conversation_id).entered();
        let removed = self
            .store
            .delete(&Self::storage_key(session_id, conversation_id))?;
        debug!(removed, "cleared context");
        Ok(removed)
    }

    fn weighted_counts(&self, messages: &[Message]) -> Vec<usize> {
        let weights = &self.config.role_weights;
        let first_system = messages.iter().position(|m| m.role == Role::System);
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let weight = match m.role {
                    Role::System if Some(i) == first_system => weights.system,
                    Role::System => 1.0,
                    Role::User => weights.user,
                    Role::Assistant => weights.assistant,
                };
                (self.counter.count(&m.content) as f64 * weight).ceil() as usize
            })
            .collect()
    }

    fn metadata(&self, context: &Context) -> ContextMetadata {
        ContextMetadata {
            token_usage: self.weighted_counts(&context.messages).iter().sum(),
            raw_tokens: context
                .messages
                .iter()
                .map(|m| self.counter.count(&m.content))
                .sum(),
            message_count: context.messages.len(),
            document_tokens: context
                .document_content
                .as_deref()
                .map_or(0, |d| self.counter.count(d)),
        }
    }

    fn save(&self, context: &mut Context) -> Result<()> {
        let key = Self::storage_key(&context.session_id, &context.conversation_id);
        if let Some(stored) = self.get(&context.session_id, &context.conversation_id)? {
            if stored.version != context.version {
                warn!(
                    stored_version = stored.version,
                    read_version = context.version,
                    "context changed since it was read; overwriting"
                );
            }
            context.version = context.version.max(stored.version);
        }
        context.version += 1;
        context.updated_at = Utc::now();
        context.metadata = self.metadata(context);

        let json = serde_json::to_string(context)
            .map_err(|e| TokenwrightError::serialization(format!("context {key}"), e))?;
        let ttl = (self.config.ttl_secs > 0).then(|| Duration::from_secs(self.config.ttl_secs));
        if !self.store.set(&key, &json, ttl)? {
            return Err(TokenwrightError::store(format!("store rejected write for {key}")));
        }
        Ok(())
    }
}
