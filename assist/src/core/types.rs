//! Shared deterministic types for the assist pipeline.
//!
//! These types define stable contracts between pipeline components. They must
//! not depend on external state or I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fenced segment extracted from model output, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Language tag from the opening fence (may be empty).
    pub language: String,
    /// Block body without the fences and without a trailing newline.
    pub content: String,
}

impl Artifact {
    pub fn new(language: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            content: content.into(),
        }
    }
}

/// What the pipeline does with an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Command,
    FileContent,
}

/// An artifact paired with its derived kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedArtifact {
    pub artifact: Artifact,
    pub kind: ArtifactKind,
}

/// Secret-shaped placeholder families the resolver knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    PrivateKey,
    ApiKey,
    WalletAddress,
    RpcEndpoint,
}

impl PlaceholderKind {
    pub const ALL: [PlaceholderKind; 4] = [
        PlaceholderKind::PrivateKey,
        PlaceholderKind::ApiKey,
        PlaceholderKind::WalletAddress,
        PlaceholderKind::RpcEndpoint,
    ];

    /// Variable name used in the secrets store.
    pub fn env_var(self) -> &'static str {
        match self {
            PlaceholderKind::PrivateKey => "PRIVATE_KEY",
            PlaceholderKind::ApiKey => "API_KEY",
            PlaceholderKind::WalletAddress => "WALLET_ADDRESS",
            PlaceholderKind::RpcEndpoint => "RPC_URL",
        }
    }

    /// Human-readable label for operator prompts.
    pub fn label(self) -> &'static str {
        match self {
            PlaceholderKind::PrivateKey => "private key",
            PlaceholderKind::ApiKey => "API key",
            PlaceholderKind::WalletAddress => "wallet address",
            PlaceholderKind::RpcEndpoint => "RPC endpoint URL",
        }
    }

    /// Whether operator input for this kind must not be echoed.
    pub fn is_secret(self) -> bool {
        matches!(self, PlaceholderKind::PrivateKey | PlaceholderKind::ApiKey)
    }
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaceholderKind::PrivateKey => "private_key",
            PlaceholderKind::ApiKey => "api_key",
            PlaceholderKind::WalletAddress => "wallet_address",
            PlaceholderKind::RpcEndpoint => "rpc_endpoint",
        };
        f.write_str(name)
    }
}

/// A resolved placeholder value for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderBinding {
    pub kind: PlaceholderKind,
    pub value: String,
}

/// One attempted shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub command: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Created,
    Updated,
    Failed,
}

/// Result of one attempted file write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One proposed fix inside a remediation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationAttempt {
    pub failing_context: String,
    pub error_text: String,
    pub proposed_fix_hash: String,
}

/// Why a command was not passed to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// Superuser elevation (`sudo`, `doas`, `su`).
    Elevation,
    /// Recursive forced delete (`rm -rf`).
    RecursiveDelete,
    /// A placeholder token is still present after substitution.
    UnresolvedPlaceholder(String),
    /// Already executed earlier in this session.
    Duplicate,
    /// Operator declined the confirmation prompt.
    Declined,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Elevation => f.write_str("superuser elevation"),
            SkipReason::RecursiveDelete => f.write_str("recursive forced delete"),
            SkipReason::UnresolvedPlaceholder(token) => {
                write!(f, "unresolved placeholder {token}")
            }
            SkipReason::Duplicate => f.write_str("already executed this session"),
            SkipReason::Declined => f.write_str("declined by operator"),
        }
    }
}

/// Failure classes surfaced by the pipeline. Only `ProviderError` escapes a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ParseNoop,
    ClassificationAmbiguous,
    PlaceholderValidationFailed,
    PathContainmentViolation,
    FileWriteFailed,
    CommandSkippedUnsafe,
    CommandFailed,
    RemediationExhausted,
    ProviderError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandCounts {
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCounts {
    pub detected: u32,
    pub resolved: u32,
    pub unresolved: u32,
}

/// Aggregate counters for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub commands: CommandCounts,
    pub files: FileCounts,
    pub errors: ErrorCounts,
    pub placeholders_bound: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            commands: CommandCounts::default(),
            files: FileCounts::default(),
            errors: ErrorCounts::default(),
            placeholders_bound: 0,
            started_at,
            ended_at: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn has_unresolved(&self) -> bool {
        self.errors.unresolved > 0
    }
}
