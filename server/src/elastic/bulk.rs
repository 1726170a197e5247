//! `_bulk` request encoding and response decoding.
//!
//! Replaces go out as `index` actions (full document replacement under the
//! person id), deletes as `delete` actions. The response carries one item per
//! action, in request order.

use geolab_engine::{record::document_key, BulkAction, BulkOperation, OperationOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Reason recorded when the response has no item for an operation.
pub const MISSING_ITEM: &str = "no item in bulk response";

/// An encoded bulk request body.
#[derive(Debug, Default)]
pub struct BulkRequest {
    /// NDJSON body, newline-terminated
    pub body: String,
    /// Positions (in the submitted slice) of the operations in `body`
    pub sent: Vec<usize>,
    /// Operations that could not be encoded, with their position
    pub rejected: Vec<(usize, OperationOutcome)>,
}

impl BulkRequest {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

/// Encode `ops` as an NDJSON `_bulk` body against `index`.
pub fn encode(index: &str, ops: &[BulkOperation]) -> BulkRequest {
    let mut request = BulkRequest::default();

    for (pos, op) in ops.iter().enumerate() {
        let id = document_key(op.id());
        let lines = match op {
            BulkOperation::Replace { document, .. } => serde_json::to_string(document).map(|doc| {
                format!(
                    "{}\n{}\n",
                    json!({"index": {"_index": index, "_id": id}}),
                    doc
                )
            }),
            BulkOperation::Delete { .. } => Ok(format!(
                "{}\n",
                json!({"delete": {"_index": index, "_id": id}})
            )),
        };

        match lines {
            Ok(lines) => {
                request.body.push_str(&lines);
                request.sent.push(pos);
            }
            Err(e) => request
                .rejected
                .push((pos, OperationOutcome::failed(op, format!("serialization: {e}")))),
        }
    }

    request
}

/// `_bulk` response body.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

/// Result of one action, keyed in the response by the action name.
#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    /// Why this item failed, or `None` if it counts as applied.
    ///
    /// A delete answered with 404 / `not_found` is applied: the document is
    /// gone either way.
    pub fn failure(&self, action: BulkAction) -> Option<String> {
        if (200..300).contains(&self.status) {
            return None;
        }
        if action == BulkAction::Delete
            && (self.status == 404 || self.result.as_deref() == Some("not_found"))
            && self.error.is_none()
        {
            return None;
        }
        Some(self.reason())
    }

    fn reason(&self) -> String {
        match &self.error {
            Some(Value::Object(error)) => {
                let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
                match error.get("reason").and_then(Value::as_str) {
                    Some(reason) => format!("{kind}: {reason}"),
                    None => kind.to_string(),
                }
            }
            Some(Value::String(reason)) => reason.clone(),
            _ => format!("status {}", self.status),
        }
    }
}

/// Match response items to the operations of `request`.
///
/// Items are positional; one whose `_id` names a different document counts
/// as a failure of the operation at that position. Returns one outcome per
/// entry of `ops`, in order.
pub fn decode(
    ops: &[BulkOperation],
    request: BulkRequest,
    response: BulkResponse,
) -> Vec<OperationOutcome> {
    let mut outcomes: Vec<Option<OperationOutcome>> = vec![None; ops.len()];

    for (pos, outcome) in request.rejected {
        outcomes[pos] = Some(outcome);
    }

    let mut items = response.items.into_iter();
    for pos in request.sent {
        let op = &ops[pos];
        let expected = document_key(op.id());
        let outcome = match items.next().and_then(|mut item| item.drain().next()) {
            Some((_, item)) if item.id.as_deref().is_some_and(|id| id != expected) => {
                OperationOutcome::failed(
                    op,
                    format!(
                        "bulk item for {} answered in place of {expected}",
                        item.id.as_deref().unwrap_or_default()
                    ),
                )
            }
            Some((_, item)) => match item.failure(op.action()) {
                None => OperationOutcome::applied(op),
                Some(reason) => OperationOutcome::failed(op, reason),
            },
            None => OperationOutcome::failed(op, MISSING_ITEM),
        };
        outcomes[pos] = Some(outcome);
    }

    outcomes
        .into_iter()
        .zip(ops)
        .map(|(outcome, op)| outcome.unwrap_or_else(|| OperationOutcome::failed(op, MISSING_ITEM)))
        .collect()
}
