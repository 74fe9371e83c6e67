//! Session-scoped placeholder resolution.
//!
//! Detection and substitution are pure (see [`crate::core::placeholder`]).
//! This module owns the bindings for one invocation, asks the operator for
//! missing values and persists them to the secrets store.

use tracing::{info, instrument, warn};

use crate::core::placeholder::{Bindings, detect_kinds, find_unresolved, substitute, substitute_env};
use crate::core::types::{ArtifactKind, IssueKind, PlaceholderBinding, PlaceholderKind};
use crate::io::operator::Operator;
use crate::io::secrets::SecretsStore;
use crate::session::{SessionEvent, SessionTracker};

/// Prompts per kind before the kind is left unbound.
pub const MAX_PROMPTS_PER_KIND: u32 = 3;

const URL_SCHEMES: &[&str] = &["http://", "https://", "ws://", "wss://"];

/// Check a stored or operator-supplied value for `kind`.
pub fn validate_value(kind: PlaceholderKind, value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} must not be empty", kind.label()));
    }
    if let Some(token) = find_unresolved(value) {
        return Err(format!("{} is still a placeholder ({token})", kind.label()));
    }
    if kind == PlaceholderKind::RpcEndpoint && !URL_SCHEMES.iter().any(|s| value.starts_with(s)) {
        return Err(format!(
            "{} must start with http://, https://, ws:// or wss://",
            kind.label()
        ));
    }
    Ok(())
}

/// Owns the placeholder bindings of one session.
///
/// A kind is bound at most once; later detections reuse the binding.
#[derive(Debug)]
pub struct PlaceholderResolver {
    bindings: Bindings,
    store: SecretsStore,
}

impl PlaceholderResolver {
    pub fn new(store: SecretsStore) -> Self {
        Self {
            bindings: Bindings::new(),
            store,
        }
    }

    /// Bind every kind detected in `text` that is not bound yet.
    ///
    /// Values come from the secrets store when present and valid, otherwise from the
    /// operator. Kinds the operator cannot supply stay unbound.
    #[instrument(skip_all)]
    pub fn resolve<O: Operator>(
        &mut self,
        text: &str,
        operator: &O,
        tracker: &mut SessionTracker,
    ) -> &Bindings {
        for kind in detect_kinds(text) {
            if self.bindings.contains_key(&kind) {
                continue;
            }
            let value = match self.stored_value(kind) {
                Some(stored) => {
                    info!(%kind, "reusing stored value");
                    stored
                }
                None => match self.ask(kind, operator) {
                    Some(value) => {
                        if let Err(e) = self.store.upsert(kind.env_var(), &value) {
                            warn!(
                                %kind,
                                err = %format!("{e:#}"),
                                "failed to persist placeholder value"
                            );
                        }
                        value
                    }
                    None => continue,
                },
            };
            self.bindings.insert(kind, value);
            tracker.record(SessionEvent::PlaceholderBound(kind));
        }
        &self.bindings
    }

    /// Stored value for `kind`, unless it fails validation.
    fn stored_value(&self, kind: PlaceholderKind) -> Option<String> {
        let stored = self.store.get(kind.env_var())?;
        match validate_value(kind, stored) {
            Ok(()) => Some(stored.trim().to_string()),
            Err(reason) => {
                warn!(
                    %kind,
                    issue = ?IssueKind::PlaceholderValidationFailed,
                    reason = %reason,
                    "stored value rejected, asking the operator"
                );
                None
            }
        }
    }

    fn ask<O: Operator>(&self, kind: PlaceholderKind, operator: &O) -> Option<String> {
        let prompt = format!("Enter your {} ({})", kind.label(), kind.env_var());
        for attempt in 1..=MAX_PROMPTS_PER_KIND {
            let answer = if kind.is_secret() {
                operator.prompt_secret(&prompt)
            } else {
                operator.prompt_text(&prompt)
            };
            let value = match answer {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        %kind,
                        err = %format!("{e:#}"),
                        "operator input unavailable, leaving placeholder unbound"
                    );
                    return None;
                }
            };
            match validate_value(kind, &value) {
                Ok(()) => return Some(value.trim().to_string()),
                Err(reason) => {
                    warn!(
                        %kind,
                        attempt,
                        issue = ?IssueKind::PlaceholderValidationFailed,
                        reason = %reason,
                        "invalid placeholder value"
                    );
                }
            }
        }
        warn!(%kind, "no valid value supplied, leaving placeholder unbound");
        None
    }

    /// Substitute current bindings into `text`.
    pub fn apply(&self, text: &str) -> String {
        substitute(text, &self.bindings)
    }

    /// Substitute into an artifact body; env-shaped file content also gets
    /// its `VAR=` lines rewritten to the bound values.
    pub fn apply_to(&self, kind: ArtifactKind, text: &str) -> String {
        match kind {
            ArtifactKind::Command => substitute(text, &self.bindings),
            ArtifactKind::FileContent => substitute_env(text, &self.bindings),
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn binding_list(&self) -> Vec<PlaceholderBinding> {
        self.bindings
            .iter()
            .map(|(kind, value)| PlaceholderBinding {
                kind: *kind,
                value: value.clone(),
            })
            .collect()
    }

    pub fn store(&self) -> &SecretsStore {
        &self.store
    }

    /// Write every binding back to the store.
    ///
    /// Needed after a response overwrote the store file with its own content.
    pub fn sync_store(&mut self) {
        for (kind, value) in &self.bindings {
            if let Err(e) = self.store.upsert(kind.env_var(), value) {
                warn!(%kind, err = %format!("{e:#}"), "failed to persist placeholder value");
            }
        }
    }
}
