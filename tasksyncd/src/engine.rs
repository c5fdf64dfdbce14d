//! The sync engine.
//!
//! One turn takes the client's payload (pending record lines plus an
//! optional cursor) and the user's full transaction log, and produces a
//! response payload plus the lines to append. The log is a flat sequence of
//! record lines and sync-key lines; the key matching the client's cursor
//! marks the branch point, and everything after it is what the client has
//! not yet seen.
//!
//! Divergent histories for one task are reconciled by replaying both sides'
//! edits over their common ancestor in timestamp order (the zipper walk),
//! applying each edit as an attribute-level three-way patch.

use std::collections::HashSet;

use log::debug;
use tasksync_codec::record;
use tasksync_types::{error::Failure, response, task::Task};
use uuid::Uuid;

/// Which side's edit wins when both carry the same `modified` timestamp.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TieBreak {
    #[default]
    Server,
    Client,
}

impl TieBreak {
    pub fn from_config(value: &str) -> Self {
        match value {
            "client" => TieBreak::Client,
            _ => TieBreak::Server,
        }
    }
}

/// What one sync turn decided: the response, and the lines to append.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncOutcome {
    pub code: u16,
    pub payload: String,
    pub appends: Vec<String>,
}

/// Run one sync turn against a loaded log.
///
/// Pure with respect to storage: the caller holds the per-user lock, loads
/// `server_data`, and appends `SyncOutcome::appends` (if any) before
/// releasing it. Any error leaves nothing to append, so a failed turn never
/// changes the log.
pub fn sync_turn(
    txn: u64,
    server_data: &[String],
    payload: &str,
    tiebreak: TieBreak,
) -> Result<SyncOutcome, Failure> {
    let (client_data, client_key) = parse_payload(txn, payload);

    let branch_point = find_branch_point(txn, server_data, client_key.as_deref())?;
    let server_subset = extract_subset(txn, server_data, branch_point)?;

    let mut new_server_data: Vec<String> = Vec::new();
    let mut already_seen: HashSet<String> = HashSet::new();

    for client_line in &client_data {
        let mut task = decode_record(client_line)?;
        task.validate().map_err(|error| Failure::Text(error.to_string()))?;

        // validate() minted a uuid if the client omitted one.
        let uuid = task.uuid().unwrap_or_default().to_string();
        debug!(
            "[{txn}] Validated: {uuid} '{}'",
            task.get("description").unwrap_or("")
        );

        if subset_contains(&server_subset, &uuid) {
            // Merging scans every edit for this uuid on both sides, so a
            // second occurrence in the same request has nothing left to do.
            if !already_seen.insert(uuid.clone()) {
                continue;
            }

            debug!("[{txn}] Merge needed");

            let ancestor = find_common_ancestor(server_data, branch_point, &uuid)?;
            debug!("[{txn}] Ancestor: {ancestor} {}", server_data[ancestor]);

            let client_mods = collect_client_mods(&client_data, &uuid)?;
            let server_mods = collect_server_mods(server_data, ancestor, &uuid)?;

            let mut combined = decode_record(&server_data[ancestor])?;
            zipper_walk(txn, &client_mods, &server_mods, &mut combined, tiebreak);
            debug!("[{txn}] Zipper result {}", record::compose(&combined));

            new_server_data.push(record::compose(&combined));
        } else {
            // Not in the subset: stored as-is and echoed back below.
            debug!("[{txn}] Store");
            new_server_data.push(record::compose(&task));
        }
    }

    // Anything stored means a new sync key; otherwise the most recent key
    // in the log is reused.
    let new_client_key = if new_server_data.is_empty() {
        let key = server_data
            .iter()
            .rev()
            .find(|line| !line.starts_with('['))
            .cloned();
        if let Some(key) = &key {
            debug!("[{txn}] Using latest sync key: {key}");
        }
        key
    } else {
        let key = Uuid::new_v4().to_string();
        debug!("[{txn}] New sync key: {key}");
        Some(key)
    };

    // The response carries everything after the branch point, including what
    // this turn just decided to append.
    let mut response_records: Vec<String> =
        server_subset.iter().map(record::compose).collect();
    response_records.extend(new_server_data.iter().cloned());

    let mut appends = new_server_data;
    if let Some(key) = &new_client_key {
        if !appends.is_empty() {
            appends.push(key.clone());
        }
    }

    let outcome = match (new_client_key, response_records.is_empty()) {
        (Some(key), false) => {
            let mut payload = String::new();
            for line in &response_records {
                payload.push_str(line);
                payload.push('\n');
            }
            payload.push_str(&key);
            payload.push('\n');

            SyncOutcome {
                code: response::OK,
                payload,
                appends,
            }
        }
        (Some(key), true) => {
            debug!("[{txn}] No change");
            SyncOutcome {
                code: response::NO_CHANGE,
                payload: format!("{key}\n"),
                appends,
            }
        }
        // A log with no sync key cannot give the client a cursor. Nothing
        // was appended (appends always come with a fresh key), so this is a
        // plain no-change turn.
        (None, _) => {
            debug!("[{txn}] No change");
            SyncOutcome {
                code: response::NO_CHANGE,
                payload: String::new(),
                appends: Vec::new(),
            }
        }
    };

    Ok(outcome)
}

fn decode_record(line: &str) -> Result<Task, Failure> {
    record::parse(line).map_err(|error| Failure::Text(error.to_string()))
}

/// Separate the payload into pending record lines and the client's cursor.
fn parse_payload(txn: u64, payload: &str) -> (Vec<String>, Option<String>) {
    let mut data = Vec::new();
    let mut key = None;

    for line in payload.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            data.push(line.to_string());
        } else {
            key = Some(line.to_string());
        }
    }

    debug!("[{txn}] Client key: {}", key.as_deref().unwrap_or(""));
    for line in &data {
        debug!("[{txn}] Client data: {line}");
    }

    (data, key)
}

/// The log index just after the sync-key line matching the client's cursor.
///
/// A missing cursor is a first-time sync (or a request for all data) and
/// branches at the start of the log.
fn find_branch_point(
    txn: u64,
    server_data: &[String],
    key: Option<&str>,
) -> Result<usize, Failure> {
    let Some(key) = key else {
        return Ok(0);
    };

    match server_data.iter().position(|line| line.as_str() == key) {
        Some(index) => {
            debug!("[{txn}] Branch point: {key} --> {index}");
            Ok(index + 1)
        }
        None => Err(Failure::Text("Client sync key not found.".to_string())),
    }
}

/// Record lines at or after the branch point, decoded, in log order.
fn extract_subset(
    txn: u64,
    server_data: &[String],
    branch_point: usize,
) -> Result<Vec<Task>, Failure> {
    let mut subset = Vec::new();
    for line in server_data.iter().skip(branch_point) {
        if line.starts_with('[') {
            subset.push(decode_record(line)?);
        }
    }

    debug!("[{txn}] Subset: {} line(s) after branch point", subset.len());
    Ok(subset)
}

fn subset_contains(subset: &[Task], uuid: &str) -> bool {
    subset.iter().any(|task| task.uuid() == Some(uuid))
}

/// The newest record with this uuid strictly before the branch point.
fn find_common_ancestor(
    server_data: &[String],
    branch_point: usize,
    uuid: &str,
) -> Result<usize, Failure> {
    for index in (0..branch_point).rev() {
        if server_data[index].starts_with('[') {
            let task = decode_record(&server_data[index])?;
            if task.uuid() == Some(uuid) {
                return Ok(index);
            }
        }
    }

    Err(Failure::Text(format!(
        "ERROR: Could not find common ancestor for {uuid}"
    )))
}

/// The client's edits for this uuid, in the order they arrived.
fn collect_client_mods(client_data: &[String], uuid: &str) -> Result<Vec<Task>, Failure> {
    let mut mods = Vec::new();
    for line in client_data {
        let task = decode_record(line)?;
        if task.uuid() == Some(uuid) {
            mods.push(task);
        }
    }
    Ok(mods)
}

/// The server's edits for this uuid after the ancestor, in log order.
fn collect_server_mods(
    server_data: &[String],
    ancestor: usize,
    uuid: &str,
) -> Result<Vec<Task>, Failure> {
    let mut mods = Vec::new();
    for line in server_data.iter().skip(ancestor + 1) {
        if line.starts_with('[') {
            let task = decode_record(line)?;
            if task.uuid() == Some(uuid) {
                mods.push(task);
            }
        }
    }
    Ok(mods)
}

/// Walk both edit lists in timestamp order, patching `combined` (which
/// starts as the common ancestor) with each edit against the previous state
/// on the same side. After each application the result's `modified` is the
/// timestamp of the edit just applied.
fn zipper_walk(
    txn: u64,
    client_mods: &[Task],
    server_mods: &[Task],
    combined: &mut Task,
    tiebreak: TieBreak,
) {
    let ancestor = combined.clone();
    let mut prev_client: &Task = &ancestor;
    let mut prev_server: &Task = &ancestor;

    let mut client = client_mods.iter().peekable();
    let mut server = server_mods.iter().peekable();

    while let (Some(next_client), Some(next_server)) = (client.peek(), server.peek()) {
        let client_time = next_client.last_modification();
        let server_time = next_server.last_modification();

        let client_first = match tiebreak {
            TieBreak::Server => client_time < server_time,
            TieBreak::Client => client_time <= server_time,
        };

        if client_first {
            debug!("[{txn}] applying client edit {client_time} vs {server_time}");
            let edit = client.next().unwrap_or(&ancestor);
            patch(txn, combined, prev_client, edit);
            combined.set("modified", client_time.to_string());
            prev_client = edit;
        } else {
            debug!("[{txn}] applying server edit {server_time} vs {client_time}");
            let edit = server.next().unwrap_or(&ancestor);
            patch(txn, combined, prev_server, edit);
            combined.set("modified", server_time.to_string());
            prev_server = edit;
        }
    }

    for edit in client {
        patch(txn, combined, prev_client, edit);
        combined.set("modified", edit.last_modification().to_string());
        prev_client = edit;
    }

    for edit in server {
        patch(txn, combined, prev_server, edit);
        combined.set("modified", edit.last_modification().to_string());
        prev_server = edit;
    }
}

/// Apply the `from` → `to` delta onto `base`. All three share a uuid, and
/// `uuid` itself is never removed or changed.
fn patch(txn: u64, base: &mut Task, from: &Task, to: &Task) {
    let removals: Vec<String> = from
        .iter()
        .filter(|(name, _)| *name != "uuid" && !to.has(name))
        .map(|(name, _)| name.to_string())
        .collect();

    for name in removals {
        debug!("[{txn}] patch remove {name}");
        base.remove(&name);
    }

    for (name, value) in to.iter() {
        if name == "uuid" {
            continue;
        }
        if from.get(name) != Some(value) {
            debug!("[{txn}] patch set {name}={value}");
            base.set(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(pairs: &[(&str, &str)]) -> Task {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const UUID_A: &str = "11111111-1111-1111-1111-111111111111";

    fn base_record() -> String {
        format!("[description:\"write tests\" status:\"pending\" uuid:\"{UUID_A}\" entry:\"100\"]")
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_sync_stores_and_returns_key() {
        let payload = format!("{}\n", base_record());
        let outcome = sync_turn(1, &[], &payload, TieBreak::Server).unwrap();

        assert_eq!(200, outcome.code);
        assert_eq!(2, outcome.appends.len());
        assert!(outcome.appends[0].contains("write tests"));

        let key = &outcome.appends[1];
        assert_eq!(format!("{}\n{key}\n", outcome.appends[0]), outcome.payload);
    }

    #[test]
    fn test_noop_turn_reuses_key() {
        let log = lines(&[&base_record(), "K1"]);
        let outcome = sync_turn(1, &log, "K1\n", TieBreak::Server).unwrap();

        assert_eq!(201, outcome.code);
        assert_eq!("K1\n", outcome.payload);
        assert!(outcome.appends.is_empty());
    }

    #[test]
    fn test_noop_turn_on_empty_log() {
        let outcome = sync_turn(1, &[], "", TieBreak::Server).unwrap();

        assert_eq!(201, outcome.code);
        assert_eq!("", outcome.payload);
        assert!(outcome.appends.is_empty());
    }

    #[test]
    fn test_unknown_cursor_fails_without_append() {
        let log = lines(&[&base_record(), "K1"]);
        let got = sync_turn(
            1,
            &log,
            "DEADBEEF-0000-0000-0000-000000000000\n",
            TieBreak::Server,
        );

        assert_eq!(
            Err(Failure::Text("Client sync key not found.".into())),
            got
        );
    }

    #[test]
    fn test_empty_payload_returns_entire_history() {
        let log = lines(&[&base_record(), "K1"]);
        let outcome = sync_turn(1, &log, "", TieBreak::Server).unwrap();

        assert_eq!(200, outcome.code);
        assert!(outcome.appends.is_empty());
        assert!(outcome.payload.contains("write tests"));
        assert!(outcome.payload.ends_with("K1\n"));
    }

    #[test]
    fn test_non_conflicting_update_is_stored_not_merged() {
        let log = lines(&[&base_record(), "K1"]);
        let update = format!(
            "[description:\"write tests\" status:\"completed\" uuid:\"{UUID_A}\" entry:\"100\" modified:\"200\"]"
        );
        let payload = format!("{update}\nK1\n");

        let outcome = sync_turn(1, &log, &payload, TieBreak::Server).unwrap();

        assert_eq!(200, outcome.code);
        assert_eq!(2, outcome.appends.len());
        assert!(outcome.appends[0].contains("completed"));
        assert!(outcome.payload.starts_with(&outcome.appends[0]));
    }

    #[test]
    fn test_concurrent_edits_merge_both_sides() {
        // The log already holds another client's edit after K1.
        let server_edit = format!(
            "[description:\"write tests\" status:\"completed\" uuid:\"{UUID_A}\" entry:\"100\" modified:\"150\"]"
        );
        let log = lines(&[&base_record(), "K1", &server_edit, "K2"]);

        // This client is still on K1 and set a project concurrently.
        let client_edit = format!(
            "[description:\"write tests\" status:\"pending\" uuid:\"{UUID_A}\" entry:\"100\" project:\"x\" modified:\"160\"]"
        );
        let payload = format!("{client_edit}\nK1\n");

        let outcome = sync_turn(1, &log, &payload, TieBreak::Server).unwrap();
        assert_eq!(200, outcome.code);

        // One merged record and one new key appended.
        assert_eq!(2, outcome.appends.len());
        let merged = record::parse(&outcome.appends[0]).unwrap();
        assert_eq!(Some("completed"), merged.get("status"));
        assert_eq!(Some("x"), merged.get("project"));
        assert_eq!(Some("160"), merged.get("modified"));
        assert_eq!(Some(UUID_A), merged.uuid());
    }

    #[test]
    fn test_same_uuid_twice_merges_once() {
        let log = lines(&[&base_record(), "K1", &base_record(), "K2"]);

        let edit_one = format!(
            "[description:\"write tests\" status:\"pending\" uuid:\"{UUID_A}\" entry:\"100\" project:\"x\" modified:\"150\"]"
        );
        let edit_two = format!(
            "[description:\"write tests\" status:\"pending\" uuid:\"{UUID_A}\" entry:\"100\" project:\"y\" modified:\"160\"]"
        );
        let payload = format!("{edit_one}\n{edit_two}\nK1\n");

        let outcome = sync_turn(1, &log, &payload, TieBreak::Server).unwrap();

        // Both edits collapse into one merged record plus the key.
        assert_eq!(2, outcome.appends.len());
        let merged = record::parse(&outcome.appends[0]).unwrap();
        assert_eq!(Some("y"), merged.get("project"));
        assert_eq!(Some("160"), merged.get("modified"));
    }

    #[test]
    fn test_validation_failure_rejects_whole_request() {
        let log = lines(&[&base_record(), "K1"]);
        let valid = "[description:\"fine\" uuid:\"22222222-2222-2222-2222-222222222222\" entry:\"100\"]";
        let invalid = format!("[uuid:\"{UUID_A}\" status:\"pending\"]");
        let payload = format!("{valid}\n{invalid}\nK1\n");

        let got = sync_turn(1, &log, &payload, TieBreak::Server);

        assert_eq!(
            Err(Failure::Text("A task must have a description.".into())),
            got
        );
    }

    #[test]
    fn test_missing_common_ancestor_fails() {
        // The only record with this uuid sits after the branch point.
        let other = "[description:\"other\" uuid:\"33333333-3333-3333-3333-333333333333\" entry:\"50\"]";
        let log = lines(&[other, "K1", &base_record(), "K2"]);

        let payload = format!("{}\nK1\n", base_record());
        let got = sync_turn(1, &log, &payload, TieBreak::Server);

        assert_eq!(
            Err(Failure::Text(format!(
                "ERROR: Could not find common ancestor for {UUID_A}"
            ))),
            got
        );
    }

    #[test]
    fn test_zipper_interleaves_by_timestamp() {
        let ancestor = task(&[
            ("description", "d"),
            ("uuid", UUID_A),
            ("entry", "100"),
        ]);

        let client_mods = [
            task(&[("description", "d"), ("uuid", UUID_A), ("entry", "100"), ("priority", "H"), ("modified", "110")]),
            task(&[("description", "d"), ("uuid", UUID_A), ("entry", "100"), ("priority", "H"), ("project", "x"), ("modified", "130")]),
        ];
        let server_mods = [task(&[
            ("description", "d"),
            ("uuid", UUID_A),
            ("entry", "100"),
            ("status", "completed"),
            ("modified", "120"),
        ])];

        let mut combined = ancestor.clone();
        zipper_walk(1, &client_mods, &server_mods, &mut combined, TieBreak::Server);

        assert_eq!(Some("H"), combined.get("priority"));
        assert_eq!(Some("x"), combined.get("project"));
        assert_eq!(Some("completed"), combined.get("status"));
        assert_eq!(Some("130"), combined.get("modified"));
    }

    #[test]
    fn test_zipper_tiebreak_sides() {
        let ancestor = task(&[("description", "d"), ("uuid", UUID_A), ("entry", "100")]);

        let client_mods = [task(&[
            ("description", "client wins"),
            ("uuid", UUID_A),
            ("entry", "100"),
            ("modified", "120"),
        ])];
        let server_mods = [task(&[
            ("description", "server wins"),
            ("uuid", UUID_A),
            ("entry", "100"),
            ("modified", "120"),
        ])];

        // Server-first: the server edit applies first, so the client edit
        // lands last and its value sticks.
        let mut combined = ancestor.clone();
        zipper_walk(1, &client_mods, &server_mods, &mut combined, TieBreak::Server);
        assert_eq!(Some("client wins"), combined.get("description"));

        // Client-first: the reverse.
        let mut combined = ancestor.clone();
        zipper_walk(1, &client_mods, &server_mods, &mut combined, TieBreak::Client);
        assert_eq!(Some("server wins"), combined.get("description"));
    }

    #[test]
    fn test_patch_removes_adds_and_modifies() {
        let mut base = task(&[
            ("description", "d"),
            ("uuid", UUID_A),
            ("project", "old"),
            ("priority", "H"),
        ]);
        let from = task(&[
            ("description", "d"),
            ("uuid", UUID_A),
            ("project", "old"),
            ("priority", "H"),
        ]);
        let to = task(&[
            ("description", "d2"),
            ("uuid", "different"),
            ("project", "old"),
            ("wait", "200"),
        ]);

        patch(1, &mut base, &from, &to);

        assert_eq!(Some("d2"), base.get("description"));
        assert_eq!(Some("old"), base.get("project"));
        assert_eq!(Some("200"), base.get("wait"));
        assert_eq!(None, base.get("priority"));
        // Identity is sacrosanct.
        assert_eq!(Some(UUID_A), base.uuid());
    }
}
