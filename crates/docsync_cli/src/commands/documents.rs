//! Document editing and listing.
//!
//! Local edits go through `DocumentRecord` so they set the same replication
//! flags an application would. `--upstream` edits write straight into the
//! remote store, acting as another client.

use super::state::Workspace;
use super::OutputFormat;
use crate::error::{CliError, CliResult};
use docsync_protocol::{DocumentRecord, Payload, RecordError, Revision, ROOT_DOCUMENT_ID};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Outcome of a put or delete.
#[derive(Debug, Serialize)]
pub struct EditResult {
    /// Document uuid.
    pub uuid: String,
    /// Store that was written (`local` or `remote`).
    pub store: &'static str,
    /// New remote revision, for upstream edits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Operation performed.
    pub operation: &'static str,
}

/// One row of `list`.
#[derive(Debug, Serialize)]
pub struct DocumentRow {
    /// Document uuid.
    pub uuid: String,
    /// Known remote revision.
    pub revision: Option<Revision>,
    /// Pending local edit.
    pub local_change: bool,
    /// Pending local delete.
    pub local_delete: bool,
    /// Unresolved conflict.
    pub conflict: bool,
    /// Document content.
    pub payload: Payload,
}

/// Parses a JSON object argument.
pub fn parse_payload(json: &str) -> CliResult<Payload> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::InvalidPayload),
    }
}

fn ensure_not_reserved(uuid: &str) -> CliResult<()> {
    if uuid == ROOT_DOCUMENT_ID {
        return Err(RecordError::ReservedId(uuid.to_string()).into());
    }
    Ok(())
}

/// Creates or edits a document.
pub fn put(
    ws: &Workspace,
    uuid: &str,
    json: &str,
    upstream: bool,
    format: OutputFormat,
) -> CliResult<()> {
    ensure_not_reserved(uuid)?;
    let payload = parse_payload(json)?;

    let result = if upstream {
        let revision = ws.remote().put(uuid, payload);
        info!(uuid, revision = %revision, "remote document written");
        EditResult {
            uuid: uuid.to_string(),
            store: "remote",
            revision: Some(revision),
            operation: "put",
        }
    } else {
        let record = match ws.local().record(uuid) {
            Some(mut existing) => {
                existing.edit(payload)?;
                existing
            }
            None => DocumentRecord::new(uuid, payload),
        };
        ws.local().insert(record);
        EditResult {
            uuid: uuid.to_string(),
            store: "local",
            revision: None,
            operation: "put",
        }
    };

    ws.save()?;
    format.emit(&result, print_edit)
}

/// Marks a local document for deletion, or deletes it upstream.
pub fn delete(ws: &Workspace, uuid: &str, upstream: bool, format: OutputFormat) -> CliResult<()> {
    ensure_not_reserved(uuid)?;
    let not_found = || CliError::NotFound {
        uuid: uuid.to_string(),
    };

    let result = if upstream {
        let revision = ws.remote().remove(uuid).ok_or_else(not_found)?;
        EditResult {
            uuid: uuid.to_string(),
            store: "remote",
            revision: Some(revision),
            operation: "delete",
        }
    } else {
        let mut record = ws.local().record(uuid).ok_or_else(not_found)?;
        record.mark_deleted()?;
        ws.local().insert(record);
        EditResult {
            uuid: uuid.to_string(),
            store: "local",
            revision: None,
            operation: "delete",
        }
    };

    ws.save()?;
    format.emit(&result, print_edit)
}

/// Lists local documents, or live remote documents with `upstream`.
pub fn list(ws: &Workspace, upstream: bool, format: OutputFormat) -> CliResult<()> {
    let rows: Vec<DocumentRow> = if upstream {
        ws.remote()
            .snapshot()
            .documents
            .into_iter()
            .filter_map(|(uuid, stored)| {
                stored.payload.map(|payload| DocumentRow {
                    uuid,
                    revision: Some(stored.revision),
                    local_change: false,
                    local_delete: false,
                    conflict: false,
                    payload,
                })
            })
            .collect()
    } else {
        ws.local()
            .records()
            .into_iter()
            .filter(|record| !record.is_root())
            .map(|record| DocumentRow {
                conflict: record.has_conflict(),
                uuid: record.uuid,
                revision: record.revision,
                local_change: record.local_change,
                local_delete: record.local_delete,
                payload: record.payload,
            })
            .collect()
    };

    format.emit(&rows, |rows| print_rows(rows))
}

fn print_edit(result: &EditResult) {
    match &result.revision {
        Some(revision) => println!(
            "✓ {} {} on {} at {}",
            result.operation, result.uuid, result.store, revision
        ),
        None => println!("✓ {} {} on {}", result.operation, result.uuid, result.store),
    }
}

fn print_rows(rows: &[DocumentRow]) {
    if rows.is_empty() {
        println!("No documents");
        return;
    }

    println!("{:<38} {:<24} FLAGS", "UUID", "REVISION");
    for row in rows {
        let mut flags = Vec::new();
        if row.local_change {
            flags.push("changed");
        }
        if row.local_delete {
            flags.push("deleted");
        }
        if row.conflict {
            flags.push("conflict");
        }
        let revision = row
            .revision
            .as_ref()
            .map(Revision::to_string)
            .unwrap_or_else(|| "-".into());
        println!("{:<38} {:<24} {}", row.uuid, revision, flags.join(","));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn workspace() -> (TempDir, Workspace) {
        let dir = tempdir().unwrap();
        let ws = Workspace::open(&dir.path().join("local.json"), &dir.path().join("remote.json"))
            .unwrap();
        (dir, ws)
    }

    #[test]
    fn payload_must_be_object() {
        assert!(parse_payload(r#"{"a": 1}"#).is_ok());
        assert!(matches!(parse_payload("[1, 2]"), Err(CliError::InvalidPayload)));
        assert!(matches!(parse_payload("{oops"), Err(CliError::Json(_))));
    }

    #[test]
    fn local_put_then_edit() {
        let (_dir, ws) = workspace();
        put(&ws, "d1", r#"{"v": 1}"#, false, OutputFormat::Json).unwrap();

        let mut synced = ws.local().record("d1").unwrap();
        synced.local_change = false;
        synced.revision = Some(Revision::new("1-a"));
        ws.local().insert(synced);

        put(&ws, "d1", r#"{"v": 2}"#, false, OutputFormat::Json).unwrap();
        let record = ws.local().record("d1").unwrap();
        assert!(record.local_change);
        assert_eq!(record.revision, Some(Revision::new("1-a")));
        assert_eq!(record.payload, parse_payload(r#"{"v": 2}"#).unwrap());
    }

    #[test]
    fn root_id_is_reserved() {
        let (_dir, ws) = workspace();
        let err = put(&ws, ROOT_DOCUMENT_ID, "{}", false, OutputFormat::Text).unwrap_err();
        assert!(matches!(err, CliError::Record(RecordError::ReservedId(_))));
        assert!(delete(&ws, ROOT_DOCUMENT_ID, true, OutputFormat::Text).is_err());
    }

    #[test]
    fn upstream_edits_touch_remote_only() {
        let (_dir, ws) = workspace();
        put(&ws, "r1", r#"{"x": true}"#, true, OutputFormat::Text).unwrap();
        assert!(ws.local().record("r1").is_none());
        assert!(ws.remote().document("r1").is_some());

        delete(&ws, "r1", true, OutputFormat::Text).unwrap();
        assert!(ws.remote().is_deleted("r1"));

        let err = delete(&ws, "r1", true, OutputFormat::Text).unwrap_err();
        assert!(matches!(err, CliError::NotFound { .. }));
    }

    #[test]
    fn local_delete_marks_record() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            delete(&ws, "missing", false, OutputFormat::Text),
            Err(CliError::NotFound { .. })
        ));

        put(&ws, "d1", "{}", false, OutputFormat::Text).unwrap();
        delete(&ws, "d1", false, OutputFormat::Text).unwrap();
        assert!(ws.local().record("d1").unwrap().local_delete);

        let err = put(&ws, "d1", "{}", false, OutputFormat::Text).unwrap_err();
        assert!(matches!(err, CliError::Record(RecordError::PendingDelete { .. })));
    }
}
