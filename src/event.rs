//! Change events and their wire shape.
//!
//! Stores publish [`WirePayload`]s; subscribers parse them into typed
//! [`ChangeEvent`]s with [`parse_wire`] before anything reaches a cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    /// Accepts the SQL-style kinds stores emit and the lower-case aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INSERT" | "created" => Some(EventKind::Created),
            "UPDATE" | "updated" => Some(EventKind::Updated),
            "DELETE" | "deleted" => Some(EventKind::Deleted),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::Created => "INSERT",
            EventKind::Updated => "UPDATE",
            EventKind::Deleted => "DELETE",
        }
    }
}

/// One row-level mutation as it travels between a store and its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    pub table: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

impl WirePayload {
    pub fn new(table: &str, kind: EventKind, new: Option<Value>, old: Option<Value>) -> Self {
        WirePayload {
            table: table.to_string(),
            event_type: kind.wire_name().to_string(),
            new,
            old,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Created(T),
    Updated { entity: T, previous: Option<T> },
    Deleted { id: String, previous: Option<T> },
}

impl<T: Record> ChangeEvent<T> {
    pub fn created(entity: T) -> Self {
        ChangeEvent::Created(entity)
    }

    pub fn updated(entity: T) -> Self {
        ChangeEvent::Updated {
            entity,
            previous: None,
        }
    }

    pub fn deleted(id: impl Into<String>) -> Self {
        ChangeEvent::Deleted {
            id: id.into(),
            previous: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Created(_) => EventKind::Created,
            ChangeEvent::Updated { .. } => EventKind::Updated,
            ChangeEvent::Deleted { .. } => EventKind::Deleted,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Created(entity) | ChangeEvent::Updated { entity, .. } => entity.id(),
            ChangeEvent::Deleted { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherTable,
    OtherOwner,
    UnknownKind(String),
    Malformed(String),
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::OtherTable => "other_table",
            IgnoreReason::OtherOwner => "other_owner",
            IgnoreReason::UnknownKind(_) => "unknown_kind",
            IgnoreReason::Malformed(_) => "malformed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireOutcome<T> {
    Event(ChangeEvent<T>),
    Ignored(IgnoreReason),
}

fn decode<T: Record>(value: &Value) -> Result<T, IgnoreReason> {
    T::deserialize(value).map_err(|err| IgnoreReason::Malformed(err.to_string()))
}

fn owner_of(row: &Value, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

/// Parses a wire payload for collection `T`, scoped to `owner` when given.
///
/// An update that moves a row out of the observed scope surfaces as a
/// deletion so the row leaves the cache. Deletions whose old row carries no
/// owner column cannot be filtered and are passed through; removing an id the
/// cache does not hold is a no-op.
pub fn parse_wire<T: Record>(payload: &WirePayload, owner: Option<&str>) -> WireOutcome<T> {
    let collection = T::COLLECTION;
    if payload.table != collection.table() {
        return WireOutcome::Ignored(IgnoreReason::OtherTable);
    }
    let Some(kind) = EventKind::parse(&payload.event_type) else {
        return WireOutcome::Ignored(IgnoreReason::UnknownKind(payload.event_type.clone()));
    };
    match parse_kind(kind, payload, owner, collection.owner_column()) {
        Ok(event) => WireOutcome::Event(event),
        Err(reason) => WireOutcome::Ignored(reason),
    }
}

fn parse_kind<T: Record>(
    kind: EventKind,
    payload: &WirePayload,
    owner: Option<&str>,
    owner_column: &str,
) -> Result<ChangeEvent<T>, IgnoreReason> {
    let in_scope = |candidate: &str| owner.map_or(true, |o| o == candidate);
    let old_owner = payload.old.as_ref().and_then(|row| owner_of(row, owner_column));

    match kind {
        EventKind::Created => {
            let row = payload
                .new
                .as_ref()
                .ok_or_else(|| IgnoreReason::Malformed("INSERT without new row".into()))?;
            let entity: T = decode(row)?;
            if !in_scope(entity.owner_id()) {
                return Err(IgnoreReason::OtherOwner);
            }
            Ok(ChangeEvent::Created(entity))
        }
        EventKind::Updated => {
            let row = payload
                .new
                .as_ref()
                .ok_or_else(|| IgnoreReason::Malformed("UPDATE without new row".into()))?;
            let entity: T = decode(row)?;
            let previous = payload.old.as_ref().and_then(|old| decode::<T>(old).ok());
            if in_scope(entity.owner_id()) {
                return Ok(ChangeEvent::Updated { entity, previous });
            }
            match old_owner {
                Some(prev) if in_scope(&prev) => Ok(ChangeEvent::Deleted {
                    id: entity.id().to_string(),
                    previous,
                }),
                _ => Err(IgnoreReason::OtherOwner),
            }
        }
        EventKind::Deleted => {
            let row = payload
                .old
                .as_ref()
                .ok_or_else(|| IgnoreReason::Malformed("DELETE without old row".into()))?;
            let id = row
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| IgnoreReason::Malformed("DELETE old row has no id".into()))?
                .to_string();
            if let Some(prev) = &old_owner {
                if !in_scope(prev) {
                    return Err(IgnoreReason::OtherOwner);
                }
            }
            Ok(ChangeEvent::Deleted {
                id,
                previous: decode::<T>(row).ok(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vendor;
    use serde_json::json;

    fn vendor_row(id: &str, home: &str, name: &str) -> Value {
        json!({
            "id": id,
            "home_id": home,
            "name": name,
            "created_at": 10,
            "updated_at": 10
        })
    }

    fn payload(kind: &str, new: Option<Value>, old: Option<Value>) -> WirePayload {
        WirePayload {
            table: "vendors".into(),
            event_type: kind.into(),
            new,
            old,
        }
    }

    #[test]
    fn insert_parses_into_created() {
        let p = payload("INSERT", Some(vendor_row("v1", "h1", "Ace")), None);
        match parse_wire::<Vendor>(&p, Some("h1")) {
            WireOutcome::Event(ChangeEvent::Created(v)) => assert_eq!(v.name, "Ace"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn wire_shape_uses_event_type_key() {
        let p: WirePayload = serde_json::from_value(json!({
            "table": "vendors",
            "eventType": "created",
            "new": vendor_row("v1", "h1", "Ace"),
            "old": null
        }))
        .expect("decode wire payload");
        assert!(matches!(
            parse_wire::<Vendor>(&p, None),
            WireOutcome::Event(ChangeEvent::Created(_))
        ));
    }

    #[test]
    fn other_owner_and_other_table_are_ignored() {
        let p = payload("INSERT", Some(vendor_row("v1", "h2", "Ace")), None);
        assert_eq!(
            parse_wire::<Vendor>(&p, Some("h1")),
            WireOutcome::Ignored(IgnoreReason::OtherOwner)
        );

        let mut p = payload("INSERT", Some(vendor_row("v1", "h1", "Ace")), None);
        p.table = "paints".into();
        assert_eq!(
            parse_wire::<Vendor>(&p, Some("h1")),
            WireOutcome::Ignored(IgnoreReason::OtherTable)
        );
    }

    #[test]
    fn unknown_kind_and_malformed_rows_are_ignored() {
        let p = payload("TRUNCATE", None, None);
        assert_eq!(
            parse_wire::<Vendor>(&p, None),
            WireOutcome::Ignored(IgnoreReason::UnknownKind("TRUNCATE".into()))
        );

        let p = payload("INSERT", Some(json!({ "id": "v1" })), None);
        assert!(matches!(
            parse_wire::<Vendor>(&p, None),
            WireOutcome::Ignored(IgnoreReason::Malformed(_))
        ));
    }

    #[test]
    fn delete_needs_only_the_old_id() {
        let p = payload("DELETE", None, Some(json!({ "id": "v9" })));
        match parse_wire::<Vendor>(&p, Some("h1")) {
            WireOutcome::Event(ChangeEvent::Deleted { id, previous }) => {
                assert_eq!(id, "v9");
                assert!(previous.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let p = payload("DELETE", None, Some(vendor_row("v9", "h2", "Ace")));
        assert_eq!(
            parse_wire::<Vendor>(&p, Some("h1")),
            WireOutcome::Ignored(IgnoreReason::OtherOwner)
        );
    }

    #[test]
    fn update_moving_out_of_scope_becomes_delete() {
        let p = payload(
            "UPDATE",
            Some(vendor_row("v1", "h2", "Ace")),
            Some(vendor_row("v1", "h1", "Ace")),
        );
        match parse_wire::<Vendor>(&p, Some("h1")) {
            WireOutcome::Event(event) => {
                assert_eq!(event.kind(), EventKind::Deleted);
                assert_eq!(event.id(), "v1");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Seen from the new owner it is a plain update (upserted by the reconciler).
        assert!(matches!(
            parse_wire::<Vendor>(&p, Some("h2")),
            WireOutcome::Event(ChangeEvent::Updated { .. })
        ));
    }
}
