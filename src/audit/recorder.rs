//! Audit recorder.

use super::entry::{AuditAction, AuditChanges, AuditLogEntry};
use super::sink::AuditSink;
use crate::diff::{compute_diff_with, DiffOptions};
use crate::error::Result;
use crate::types::{Actor, Attributes, RequestContext, Timestamp};

/// Display label for an entity: its `name`, else its `email`. Empty text
/// does not count.
pub fn display_name(state: &Attributes) -> Option<String> {
    ["name", "email"]
        .iter()
        .find_map(|field| {
            state
                .get(*field)
                .and_then(|v| v.as_text())
                .filter(|text| !text.is_empty())
        })
        .map(str::to_string)
}

/// Builds audit entries and hands them to an [`AuditSink`].
pub struct AuditRecorder<S> {
    sink: S,
    diff_options: DiffOptions,
}

impl<S: AuditSink> AuditRecorder<S> {
    pub fn new(sink: S) -> Self {
        Self::with_diff_options(sink, DiffOptions::default())
    }

    pub fn with_diff_options(sink: S, diff_options: DiffOptions) -> Self {
        Self { sink, diff_options }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Construct an entry and append it to the sink.
    #[allow(clippy::too_many_arguments)]
    pub fn create_audit_log(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<&str>,
        entity_name: Option<String>,
        changes: AuditChanges,
        actor: Option<&Actor>,
        context: Option<&RequestContext>,
    ) -> Result<AuditLogEntry> {
        let entry = AuditLogEntry {
            id: 0,
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            entity_name,
            changes,
            actor_id: actor.and_then(|a| a.id.clone()),
            actor_label: actor.and_then(|a| a.label.clone()),
            ip_address: context.and_then(|c| c.ip_address.clone()),
            client_agent: context.and_then(|c| c.client_agent.clone()),
            created_at: Timestamp::now(),
        };

        let entry = self.sink.append(entry)?;
        tracing::debug!(
            id = entry.id,
            action = %entry.action,
            entity_type = %entry.entity_type,
            "recorded audit entry"
        );
        Ok(entry)
    }

    pub fn log_create(
        &self,
        entity_type: &str,
        entity_id: &str,
        state: &Attributes,
        actor: Option<&Actor>,
        context: Option<&RequestContext>,
    ) -> Result<AuditLogEntry> {
        self.create_audit_log(
            AuditAction::Create,
            entity_type,
            Some(entity_id),
            display_name(state),
            AuditChanges::Created,
            actor,
            context,
        )
    }

    /// Log an update. Returns `None`, and writes nothing, when no
    /// non-excluded field changed.
    #[allow(clippy::too_many_arguments)]
    pub fn log_update(
        &self,
        entity_type: &str,
        entity_id: &str,
        old_state: &Attributes,
        new_state: &Attributes,
        actor: Option<&Actor>,
        context: Option<&RequestContext>,
    ) -> Result<Option<AuditLogEntry>> {
        let changes = compute_diff_with(old_state, new_state, &self.diff_options);
        if changes.is_empty() {
            tracing::debug!(entity_type, entity_id, "no changes, skipping audit entry");
            return Ok(None);
        }

        self.create_audit_log(
            AuditAction::Update,
            entity_type,
            Some(entity_id),
            display_name(new_state),
            AuditChanges::Diff(changes),
            actor,
            context,
        )
        .map(Some)
    }

    pub fn log_delete(
        &self,
        entity_type: &str,
        entity_id: &str,
        state: &Attributes,
        actor: Option<&Actor>,
        context: Option<&RequestContext>,
    ) -> Result<AuditLogEntry> {
        self.create_audit_log(
            AuditAction::Delete,
            entity_type,
            Some(entity_id),
            display_name(state),
            AuditChanges::Deleted,
            actor,
            context,
        )
    }

    /// Log a sign-in. The actor is also the subject of the entry.
    pub fn log_login(&self, actor: &Actor, context: Option<&RequestContext>) -> Result<AuditLogEntry> {
        self.log_session(AuditAction::Login, actor, context)
    }

    pub fn log_logout(&self, actor: &Actor, context: Option<&RequestContext>) -> Result<AuditLogEntry> {
        self.log_session(AuditAction::Logout, actor, context)
    }

    fn log_session(
        &self,
        action: AuditAction,
        actor: &Actor,
        context: Option<&RequestContext>,
    ) -> Result<AuditLogEntry> {
        self.create_audit_log(
            action,
            "user",
            actor.id.as_deref(),
            actor.label.clone(),
            AuditChanges::None,
            Some(actor),
            context,
        )
    }

    /// Audit trail of one entity, oldest first.
    pub fn history_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>> {
        self.sink.entries_for(entity_type, entity_id)
    }
}
