//! Batch execution engine.
//!
//! One batch request names a set, an identifier expression, and call
//! parameters. The engine validates the batch-fatal conditions up front
//! (unknown set, nothing to run), then executes each resolved id
//! independently: a fragment that faults produces an error entry while the
//! rest of the batch continues. Tabular output is archived into the shard
//! store as a side effect of the run; archive failures degrade to per-id
//! warnings rather than failing the slot.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::ids::resolve_ids;
use crate::core::slots::SlotFile;
use crate::core::tabular::looks_tabular;
use crate::exec::{Diagnostic, ExecRequest, ExecStrategy};
use crate::io::config::SandboxConfig;
use crate::io::sets::SetStore;
use crate::io::shard::ShardStore;

/// One batch request.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Instruction-set name (with or without `.txt`).
    pub set: String,
    /// Identifier expression, e.g. `"0,2-4,8"`.
    pub ids: String,
    /// Call-scoped parameters passed to every fragment in the batch.
    pub params: BTreeMap<String, String>,
}

/// Report for a completed batch, one entry per requested id.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub set: String,
    /// RFC 3339 timestamp taken when execution began. The wire name
    /// matches the established response contract.
    #[serde(rename = "ranAt")]
    pub ran_at: String,
    pub results: Vec<SlotResult>,
}

/// Outcome for a single requested id.
#[derive(Debug, Clone, Serialize)]
pub struct SlotResult {
    pub id: u32,
    /// Captured output (fragment output plus rendered return value).
    /// Absent when the slot was missing or faulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Archive metadata when the output was tabular and stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveMeta>,
    /// Fault category and message for this id alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diagnostics gathered during the run, fault or not.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Where a slot's tabular output was archived.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveMeta {
    pub stored: bool,
    pub bytes: u64,
    pub slug: String,
    pub path: String,
}

/// Batch-fatal failure with a stable machine-readable code.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchError {
    pub code: BatchErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorCode {
    /// The named set does not exist; checked before anything runs.
    UnknownSet,
    /// The identifier expression resolved to nothing.
    NoValidIds,
    /// Unexpected environment failure; the per-id contract was not honored.
    Internal,
}

impl BatchError {
    fn unknown_set(set: &str) -> Self {
        Self {
            code: BatchErrorCode::UnknownSet,
            message: format!("unknown set '{}'", set),
        }
    }

    fn no_valid_ids(expr: &str) -> Self {
        Self {
            code: BatchErrorCode::NoValidIds,
            message: format!("no valid slot ids in '{}'", expr),
        }
    }

    fn internal(err: &anyhow::Error) -> Self {
        Self {
            code: BatchErrorCode::Internal,
            message: format!("{err:#}"),
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BatchError {}

/// Run one batch request end to end.
///
/// The set is looked up once before iterating; its parsed form serves every
/// id in the batch. Ids execute in resolved (ascending) order, each
/// isolated from its neighbors' faults.
#[instrument(skip_all, fields(set = %request.set, ids = %request.ids))]
pub fn run_batch<S: ExecStrategy>(
    sets: &SetStore,
    store: &ShardStore,
    strategy: &S,
    config: &SandboxConfig,
    request: &BatchRequest,
) -> Result<BatchReport, BatchError> {
    let text = match sets.read(&request.set) {
        Ok(Some(text)) => text,
        Ok(None) => return Err(BatchError::unknown_set(&request.set)),
        Err(err) => return Err(BatchError::internal(&err)),
    };
    let ids = resolve_ids(&request.ids);
    if ids.is_empty() {
        return Err(BatchError::no_valid_ids(&request.ids));
    }

    let file = SlotFile::parse(&text);
    let ran_at = Utc::now().to_rfc3339();
    debug!(count = ids.len(), "running batch");

    let results = ids
        .into_iter()
        .map(|id| run_slot(store, strategy, config, request, &file, id))
        .collect();

    Ok(BatchReport {
        set: request.set.clone(),
        ran_at,
        results,
    })
}

/// Execute one id. Never fails the batch; every failure mode becomes part
/// of the returned entry.
fn run_slot<S: ExecStrategy>(
    store: &ShardStore,
    strategy: &S,
    config: &SandboxConfig,
    request: &BatchRequest,
    file: &SlotFile,
    id: u32,
) -> SlotResult {
    let Some(source) = file.extract(id) else {
        debug!(id, "slot not found");
        return SlotResult {
            id,
            output: None,
            archive: None,
            error: Some(format!("slot {} not found in set '{}'", id, request.set)),
            diagnostics: Vec::new(),
        };
    };

    let execution = strategy.execute(&ExecRequest {
        source,
        params: &request.params,
        timeout: config.exec_timeout(),
        output_limit_bytes: config.output_limit_bytes,
    });
    let mut diagnostics = execution.diagnostics.clone();

    if let Some(fault) = &execution.fault {
        warn!(id, fault = %fault, "slot faulted");
        return SlotResult {
            id,
            output: None,
            archive: None,
            error: Some(fault.to_string()),
            diagnostics,
        };
    }

    let captured = execution.captured();
    let mut archive = None;
    if looks_tabular(&captured) {
        let slug = archive_slug(&request.set, id, Utc::now());
        match store.store(&slug, &captured) {
            Ok(artifact) => {
                debug!(id, slug = %artifact.slug, "archived tabular output");
                archive = Some(ArchiveMeta {
                    stored: true,
                    bytes: artifact.bytes,
                    slug: artifact.slug,
                    path: artifact.path.display().to_string(),
                });
            }
            Err(err) => {
                warn!(id, err = %format!("{err:#}"), "archive failed");
                diagnostics.push(Diagnostic::warning(format!("archive failed: {err:#}")));
            }
        }
    }

    SlotResult {
        id,
        output: Some(captured),
        archive,
        error: None,
        diagnostics,
    }
}

/// Archive slug for one slot run: set stem, slot id, and a
/// millisecond-resolution timestamp so same-second runs stay distinct.
fn archive_slug(set: &str, id: u32, now: DateTime<Utc>) -> String {
    let stem = set.trim().trim_end_matches(".txt");
    format!("{}_{}_{}", stem, id, now.format("%Y%m%d_%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::exec::{Execution, FaultKind};
    use crate::test_support::{TempSandbox, seed_set, temp_sandbox};

    /// Echoes fragment source as output; a few magic sources script other
    /// outcomes.
    struct ScriptedStrategy;

    impl ExecStrategy for ScriptedStrategy {
        fn execute(&self, request: &ExecRequest<'_>) -> Execution {
            match request.source {
                "boom" => Execution::faulted(FaultKind::Expression, "scripted failure"),
                "rettrue" => Execution {
                    value: Some(json!(true)),
                    ..Execution::default()
                },
                "warns" => Execution {
                    output: "ok".to_string(),
                    diagnostics: vec![Diagnostic::warning("heads up")],
                    ..Execution::default()
                },
                source => Execution {
                    output: source.to_string(),
                    ..Execution::default()
                },
            }
        }
    }

    fn request(set: &str, ids: &str) -> BatchRequest {
        BatchRequest {
            set: set.to_string(),
            ids: ids.to_string(),
            params: BTreeMap::new(),
        }
    }

    fn run(sandbox: &TempSandbox, request: &BatchRequest) -> Result<BatchReport, BatchError> {
        run_batch(
            &sandbox.sets(),
            &sandbox.store(),
            &ScriptedStrategy,
            &SandboxConfig::default(),
            request,
        )
    }

    #[test]
    fn faulted_slot_does_not_disturb_neighbors() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "one"), (2, "boom"), (3, "three")]);

        let report = run(&sandbox, &request("demo", "1-3")).expect("report");
        assert_eq!(report.results.len(), 3);

        assert_eq!(report.results[0].output.as_deref(), Some("one"));
        assert!(report.results[0].error.is_none());

        let failed = &report.results[1];
        assert!(failed.output.is_none());
        assert_eq!(failed.error.as_deref(), Some("expression: scripted failure"));
        assert!(failed.archive.is_none());

        assert_eq!(report.results[2].output.as_deref(), Some("three"));
    }

    #[test]
    fn unknown_set_fails_the_whole_batch() {
        let sandbox = temp_sandbox();
        let err = run(&sandbox, &request("ghost", "1")).unwrap_err();
        assert_eq!(err.code, BatchErrorCode::UnknownSet);
    }

    #[test]
    fn empty_expression_has_its_own_error_code() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[]);
        let err = run(&sandbox, &request("demo", "x,y")).unwrap_err();
        assert_eq!(err.code, BatchErrorCode::NoValidIds);
    }

    #[test]
    fn set_existence_is_checked_before_ids() {
        let sandbox = temp_sandbox();
        let err = run(&sandbox, &request("ghost", "not-ids")).unwrap_err();
        assert_eq!(err.code, BatchErrorCode::UnknownSet);
    }

    #[test]
    fn missing_slot_is_a_per_id_error() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(0, "zero")]);

        let report = run(&sandbox, &request("demo", "0,9")).expect("report");
        assert_eq!(report.results[0].output.as_deref(), Some("zero"));
        let missing = &report.results[1];
        assert_eq!(missing.id, 9);
        assert_eq!(
            missing.error.as_deref(),
            Some("slot 9 not found in set 'demo'")
        );
        assert!(missing.output.is_none());
    }

    #[test]
    fn tabular_output_is_archived_with_metadata() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "a,b\n1,2")]);

        let report = run(&sandbox, &request("demo", "1")).expect("report");
        let result = &report.results[0];
        assert_eq!(result.output.as_deref(), Some("a,b\n1,2"));

        let archive = result.archive.as_ref().expect("archive");
        assert!(archive.stored);
        assert_eq!(archive.bytes, 7);
        assert!(archive.slug.starts_with("demo_1_"), "{}", archive.slug);
        let stored = std::fs::read_to_string(&archive.path).expect("read artifact");
        assert_eq!(stored, "a,b\n1,2");
    }

    #[test]
    fn non_tabular_output_is_not_archived() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "plain text")]);

        let report = run(&sandbox, &request("demo", "1")).expect("report");
        assert!(report.results[0].archive.is_none());
        assert!(!sandbox.paths.store_dir.exists());
    }

    #[test]
    fn archive_failure_degrades_to_warning() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "a,b\n1,2")]);
        // A file where the store root should be makes every store fail.
        std::fs::write(&sandbox.paths.store_dir, "blocker").expect("write");

        let report = run(&sandbox, &request("demo", "1")).expect("report");
        let result = &report.results[0];
        assert_eq!(result.output.as_deref(), Some("a,b\n1,2"));
        assert!(result.error.is_none());
        assert!(result.archive.is_none());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message.starts_with("archive failed")),
        );
    }

    #[test]
    fn return_value_is_rendered_into_output() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "rettrue")]);

        let report = run(&sandbox, &request("demo", "1")).expect("report");
        assert_eq!(report.results[0].output.as_deref(), Some("true"));
    }

    #[test]
    fn diagnostics_survive_successful_runs() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "warns")]);

        let report = run(&sandbox, &request("demo", "1")).expect("report");
        let result = &report.results[0];
        assert!(result.error.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].message, "heads up");
    }

    #[test]
    fn report_omits_empty_fields_when_serialized() {
        let sandbox = temp_sandbox();
        seed_set(&sandbox, "demo", &[(1, "plain")]);

        let report = run(&sandbox, &request("demo", "1,9")).expect("report");
        let value = serde_json::to_value(&report).expect("serialize");

        let ok = &value["results"][0];
        assert!(ok.get("error").is_none());
        assert!(ok.get("diagnostics").is_none());
        assert_eq!(ok["id"], 1);

        let missing = &value["results"][1];
        assert!(missing.get("output").is_none());
        assert!(missing["error"].as_str().expect("error").contains("slot 9"));

        assert!(!value["ranAt"].as_str().expect("ranAt").is_empty());
    }

    #[test]
    fn error_documents_serialize_with_snake_case_codes() {
        let err = BatchError::unknown_set("ghost");
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["code"], "unknown_set");
        assert!(value["message"].as_str().expect("message").contains("ghost"));
    }

    #[test]
    fn archive_slug_carries_stem_id_and_millis() {
        let at = Utc
            .with_ymd_and_hms(2026, 8, 25, 10, 45, 1)
            .single()
            .expect("timestamp")
            + chrono::Duration::milliseconds(123);
        assert_eq!(archive_slug("demo.txt", 3, at), "demo_3_20260825_104501123");
        assert_eq!(archive_slug("demo", 3, at), "demo_3_20260825_104501123");
    }
}
