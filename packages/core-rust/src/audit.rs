//! Audit texts published on the event channels.
//!
//! Consumers treat these as free text. The wording is normalized across the
//! two kinds: lowercase singular noun, capitalized plural noun.

use std::fmt::Display;

use crate::types::{Entity, EntityFields, EntityId, EntityKind};

/// Operation a text describes, used for error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Fetch,
    FetchAll,
    Add,
    Update,
    Delete,
}

impl AuditAction {
    fn verb(self) -> &'static str {
        match self {
            Self::Fetch | Self::FetchAll => "fetching",
            Self::Add => "adding",
            Self::Update => "updating",
            Self::Delete => "deleting",
        }
    }
}

/// `Searched for driver ID: <id>`, emitted for every get, found or not.
#[must_use]
pub fn searched_one(kind: EntityKind, id: &EntityId) -> String {
    format!("Searched for {} ID: {id}", kind.noun())
}

/// `Searched for Drivers`.
#[must_use]
pub fn searched_all(kind: EntityKind) -> String {
    format!("Searched for {}", kind.plural())
}

/// JSON of the persisted entity, emitted after a successful create.
#[must_use]
pub fn created(entity: &Entity) -> String {
    serde_json::to_string(entity).unwrap_or_else(|_| {
        format!(
            r#"{{"id":"{}","name":"{}","team":"{}"}}"#,
            entity.id, entity.name, entity.team
        )
    })
}

/// JSON of the draft before persisting (no id yet). Pre-flight mode only.
#[must_use]
pub fn create_attempt(fields: &EntityFields) -> String {
    serde_json::to_string(fields)
        .unwrap_or_else(|_| format!(r#"{{"name":"{}","team":"{}"}}"#, fields.name, fields.team))
}

/// `Updated driver ID: <id>`.
#[must_use]
pub fn updated(kind: EntityKind, id: &EntityId) -> String {
    format!("Updated {} ID: {id}", kind.noun())
}

/// `Deleted driver ID: <id>`.
#[must_use]
pub fn deleted(kind: EntityKind, id: &EntityId) -> String {
    format!("Deleted {} ID: {id}", kind.noun())
}

/// Emitted when update or delete targets an id that does not exist.
#[must_use]
pub fn unknown_target(kind: EntityKind, action: AuditAction, id: &EntityId) -> String {
    let what = match action {
        AuditAction::Update => "Update",
        AuditAction::Delete => "Delete",
        AuditAction::Fetch | AuditAction::FetchAll | AuditAction::Add => "Request",
    };
    format!("{what} requested for unknown {} ID: {id}", kind.noun())
}

/// `Error occurred while fetching driver`, without the underlying cause.
///
/// This is the message returned to callers; the cause stays in logs and in
/// the audit text from [`failure`].
#[must_use]
pub fn failure_summary(kind: EntityKind, action: AuditAction) -> String {
    let subject = if action == AuditAction::FetchAll {
        kind.plural()
    } else {
        kind.noun()
    };
    format!("Error occurred while {} {subject}", action.verb())
}

/// `Error occurred while fetching driver: <error>` and friends.
#[must_use]
pub fn failure(kind: EntityKind, action: AuditAction, error: &dyn Display) -> String {
    format!("{}: {error}", failure_summary(kind, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_texts() {
        let id = EntityId::from("42");
        assert_eq!(
            searched_one(EntityKind::Driver, &id),
            "Searched for driver ID: 42"
        );
        assert_eq!(searched_all(EntityKind::Rider), "Searched for Riders");
    }

    #[test]
    fn mutation_texts_use_lowercase_noun_for_both_kinds() {
        let id = EntityId::from("7");
        assert_eq!(updated(EntityKind::Rider, &id), "Updated rider ID: 7");
        assert_eq!(deleted(EntityKind::Driver, &id), "Deleted driver ID: 7");
        assert_eq!(
            unknown_target(EntityKind::Driver, AuditAction::Update, &id),
            "Update requested for unknown driver ID: 7"
        );
    }

    #[test]
    fn failure_text_uses_plural_for_list() {
        let err = "store offline";
        assert_eq!(
            failure(EntityKind::Driver, AuditAction::FetchAll, &err),
            "Error occurred while fetching Drivers: store offline"
        );
        assert_eq!(
            failure(EntityKind::Rider, AuditAction::Add, &err),
            "Error occurred while adding rider: store offline"
        );
    }

    #[test]
    fn created_text_is_entity_json() {
        let entity = Entity::new(EntityId::from("1"), EntityFields::new("Max", "RedBull"));
        let parsed: serde_json::Value = serde_json::from_str(&created(&entity)).unwrap();
        assert_eq!(parsed["id"], "1");
        assert_eq!(parsed["team"], "RedBull");
    }

    #[test]
    fn create_attempt_has_no_id() {
        let parsed: serde_json::Value =
            serde_json::from_str(&create_attempt(&EntityFields::new("Marc", "Ducati"))).unwrap();
        assert!(parsed.get("id").is_none());
        assert_eq!(parsed["name"], "Marc");
    }
}
