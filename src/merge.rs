//! Draft conflict resolution.
//!
//! Local edits the server has not seen win outright. Otherwise the two copies are
//! merged additively, one sub-payload at a time, with local keys overriding server
//! keys on collision.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::DraftState;

/// Reconcile a server copy with the local copy, stamping the result with now.
pub fn merge(server: Option<&DraftState>, local: &DraftState) -> DraftState {
    merge_at(server, local, Utc::now())
}

/// [`merge`] with an explicit merge time.
pub fn merge_at(server: Option<&DraftState>, local: &DraftState, now: DateTime<Utc>) -> DraftState {
    let Some(server) = server else {
        return local.clone();
    };

    if local.is_dirty && local.last_saved > server.last_saved {
        return local.clone();
    }

    DraftState {
        session_key: server.session_key.clone().or_else(|| local.session_key.clone()),
        step: server.step.max(local.step),
        session_info: shallow_merge(&server.session_info, &local.session_info),
        evaluation_data: shallow_merge(&server.evaluation_data, &local.evaluation_data),
        student_assessment: shallow_merge(&server.student_assessment, &local.student_assessment),
        last_saved: now,
        is_dirty: local.is_dirty,
    }
}

/// One level deep: top-level keys only, nested objects are replaced whole.
fn shallow_merge(server: &Value, local: &Value) -> Value {
    match (server, local) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (_, Value::Null) => server.clone(),
        (_, _) => local.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft(key: Option<&str>, step: u32, saved: DateTime<Utc>, dirty: bool) -> DraftState {
        DraftState {
            session_key: key.map(str::to_string),
            step,
            session_info: json!({}),
            evaluation_data: json!({}),
            student_assessment: json!({}),
            last_saved: saved,
            is_dirty: dirty,
        }
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_newer_dirty_local_wins_outright() {
        let mut server = draft(Some("obs-s"), 4, t(9), false);
        server.session_info = json!({ "school": "server" });
        let mut local = draft(None, 2, t(10), true);
        local.session_info = json!({ "grade": 3 });

        assert_eq!(merge_at(Some(&server), &local, t(12)), local);
    }

    #[test]
    fn test_clean_local_merges_with_local_override() {
        let mut server = draft(Some("obs-s"), 4, t(9), false);
        server.session_info = json!({ "school": "A", "mentor": "server", "grade": 2 });
        server.evaluation_data = json!({ "level1": "yes" });

        let mut local = draft(Some("obs-l"), 3, t(10), false);
        local.session_info = json!({ "mentor": "local", "subject": "math" });
        local.student_assessment = json!({ "s1": 5 });

        let merged = merge_at(Some(&server), &local, t(12));

        assert_eq!(
            merged.session_info,
            json!({ "school": "A", "mentor": "local", "grade": 2, "subject": "math" })
        );
        assert_eq!(merged.evaluation_data, json!({ "level1": "yes" }));
        assert_eq!(merged.student_assessment, json!({ "s1": 5 }));
        assert_eq!(merged.step, 4);
        assert_eq!(merged.session_key.as_deref(), Some("obs-s"));
        assert_eq!(merged.last_saved, t(12));
        assert!(!merged.is_dirty);
    }

    #[test]
    fn test_dirty_but_older_local_is_merged_and_stays_dirty() {
        let server = draft(None, 1, t(11), false);
        let mut local = draft(Some("obs-l"), 5, t(10), true);
        local.evaluation_data = json!({ "level2": "no" });

        let merged = merge_at(Some(&server), &local, t(12));
        assert_eq!(merged.session_key.as_deref(), Some("obs-l"));
        assert_eq!(merged.step, 5);
        assert_eq!(merged.evaluation_data, json!({ "level2": "no" }));
        assert!(merged.is_dirty);
    }

    #[test]
    fn test_missing_server_returns_local() {
        let local = draft(Some("obs-l"), 2, t(8), false);
        assert_eq!(merge(None, &local), local);
    }

    #[test]
    fn test_nested_objects_are_not_deep_merged() {
        let server = json!({ "observer": { "name": "A", "role": "mentor" } });
        let local = json!({ "observer": { "name": "B" } });
        assert_eq!(shallow_merge(&server, &local), json!({ "observer": { "name": "B" } }));
        assert_eq!(shallow_merge(&server, &Value::Null), server);
    }
}
