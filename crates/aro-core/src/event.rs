//! Event envelopes and repository change notifications.

use std::time::Instant;

use crate::value::RuntimeValue;

/// An event as it sits on the bus queue. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// The domain event name handlers match against.
    pub kind: String,
    pub payload: RuntimeValue,
    pub enqueued_at: Instant,
}

impl EventEnvelope {
    pub fn new(kind: impl Into<String>, payload: RuntimeValue) -> Self {
        Self {
            kind: kind.into(),
            payload,
            enqueued_at: Instant::now(),
        }
    }
}

/// What happened to a repository entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// A change notification synthesized after a repository mutation commits.
///
/// Observers receive this as the payload of a `<repo>-change` event with the
/// mutation already visible in the store.
#[derive(Debug, Clone)]
pub struct RepositoryChange {
    pub repository: String,
    pub kind: ChangeKind,
    pub entity_before: Option<RuntimeValue>,
    pub entity_after: Option<RuntimeValue>,
    pub entity_id: String,
}

impl RepositoryChange {
    /// The name of the synthetic event carrying this change.
    pub fn event_name(&self) -> String {
        format!("{}-change", self.repository)
    }

    /// Renders the change as the mapping observers read
    /// (`change-kind`, `entity-id`, `entity-before`, `entity-after`).
    pub fn into_value(self) -> RuntimeValue {
        let mut entries = vec![
            ("change-kind".to_string(), RuntimeValue::Text(self.kind.as_str().to_string())),
            ("repository".to_string(), RuntimeValue::Text(self.repository)),
            ("entity-id".to_string(), RuntimeValue::Text(self.entity_id)),
        ];
        if let Some(before) = self.entity_before {
            entries.push(("entity-before".to_string(), before));
        }
        if let Some(after) = self.entity_after {
            entries.push(("entity-after".to_string(), after));
        }
        RuntimeValue::Map(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_event_name_appends_suffix() {
        let change = RepositoryChange {
            repository: "user-repository".to_string(),
            kind: ChangeKind::Insert,
            entity_before: None,
            entity_after: Some(RuntimeValue::map([("name", "Alice".into())])),
            entity_id: "id-1".to_string(),
        };
        assert_eq!(change.event_name(), "user-repository-change");
        let value = change.into_value();
        assert_eq!(
            value.property("change-kind"),
            Some(&RuntimeValue::Text("insert".into()))
        );
        assert!(value.property("entity-after").is_some());
        assert!(value.property("entity-before").is_none());
    }
}
