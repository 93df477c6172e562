use std::time::Duration;

use roo_log_core::{ContentAuthority, LogError, SubmissionState};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`ContentAuthority`] backed by the platform's public read API.
///
/// Queries `/api/info.json` by submission fullname or URL. Every transport,
/// status, or payload-shape failure collapses into
/// [`LogError::LookupFailure`]; callers cannot distinguish "platform down"
/// from "content gone", and the verification passes do not need to.
pub struct RedditAuthority {
    agent: ureq::Agent,
    base_url: String,
    user_agent: String,
}

impl RedditAuthority {
    #[must_use]
    pub fn new(base_url: String, user_agent: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self { agent, base_url, user_agent }
    }
}

impl ContentAuthority for RedditAuthority {
    fn get_state(&self, id_or_url: &str) -> Result<SubmissionState, LogError> {
        let endpoint = format!("{}/api/info.json", self.base_url);
        let request = if id_or_url.starts_with("http") {
            self.agent.get(&endpoint).query("url", id_or_url)
        } else {
            self.agent.get(&endpoint).query("id", &submission_fullname(id_or_url))
        };

        let response = request
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|err| LogError::LookupFailure(err.to_string()))?;
        let body: Value = response
            .into_json()
            .map_err(|err| LogError::LookupFailure(err.to_string()))?;

        state_from_listing(&body)
            .ok_or_else(|| LogError::LookupFailure(format!("no submission data for {id_or_url}")))
    }
}

/// The read API addresses submissions by `t3_`-prefixed fullname.
fn submission_fullname(id: &str) -> String {
    if id.starts_with("t3_") {
        id.to_string()
    } else {
        format!("t3_{id}")
    }
}

fn state_from_listing(body: &Value) -> Option<SubmissionState> {
    let submission = body.get("data")?.get("children")?.get(0)?.get("data")?;

    let author = submission.get("author").and_then(Value::as_str);
    let author_present = matches!(author, Some(name) if name != "[deleted]");

    Some(SubmissionState {
        author_present,
        banned: moderation_flag(submission.get("banned_by")),
        approved: moderation_flag(submission.get("approved_by")),
        // Only exposed to moderator sessions; absence means not removed.
        removed: submission.get("removed").and_then(Value::as_bool),
    })
}

/// `banned_by`/`approved_by` are a moderator name when set, `null` when not,
/// and on some listings a bare boolean.
fn moderation_flag(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn listing(submission: Value) -> Value {
        json!({
            "kind": "Listing",
            "data": { "children": [ { "kind": "t3", "data": submission } ] }
        })
    }

    // Test IDs: TRED-001
    #[test]
    fn live_submission_maps_to_alive_state() {
        let body = listing(json!({
            "author": "chainkeeper",
            "banned_by": null,
            "approved_by": null
        }));

        let state = match state_from_listing(&body) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert!(state.author_present);
        assert!(!state.banned);
        assert!(!state.approved);
        assert_eq!(state.removed, None);
        assert!(state.is_alive());
    }

    // Test IDs: TRED-002
    #[test]
    fn deleted_author_is_not_present() {
        let body = listing(json!({
            "author": "[deleted]",
            "banned_by": null,
            "approved_by": null
        }));

        let state = match state_from_listing(&body) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert!(!state.author_present);
        assert!(!state.is_alive());
    }

    // Test IDs: TRED-003
    #[test]
    fn ban_and_approval_flags_accept_names_and_booleans() {
        let banned = listing(json!({
            "author": "chainkeeper",
            "banned_by": "some_moderator",
            "approved_by": null
        }));
        let state = match state_from_listing(&banned) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert!(state.banned);
        assert!(!state.is_alive());
        assert!(state.is_settled_alive());

        let re_approved = listing(json!({
            "author": "chainkeeper",
            "banned_by": "some_moderator",
            "approved_by": "another_moderator"
        }));
        let state = match state_from_listing(&re_approved) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert!(state.is_alive());

        let legacy_boolean = listing(json!({
            "author": "chainkeeper",
            "banned_by": false,
            "approved_by": null
        }));
        let state = match state_from_listing(&legacy_boolean) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert!(!state.banned);
    }

    // Test IDs: TRED-004
    #[test]
    fn removed_flag_is_optional() {
        let removed = listing(json!({
            "author": "chainkeeper",
            "banned_by": null,
            "approved_by": null,
            "removed": true
        }));
        let state = match state_from_listing(&removed) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert_eq!(state.removed, Some(true));
        assert!(!state.is_alive());
        assert!(!state.is_settled_alive());

        let not_exposed = listing(json!({
            "author": "chainkeeper",
            "banned_by": null,
            "approved_by": null
        }));
        let state = match state_from_listing(&not_exposed) {
            Some(state) => state,
            None => panic!("expected a submission state"),
        };
        assert_eq!(state.removed, None);
        assert!(state.is_alive());
    }

    // Test IDs: TRED-005
    #[test]
    fn empty_listing_yields_no_state() {
        let body = json!({ "kind": "Listing", "data": { "children": [] } });
        assert!(state_from_listing(&body).is_none());
    }

    // Test IDs: TRED-006
    #[test]
    fn fullname_prefix_is_applied_once() {
        assert_eq!(submission_fullname("abc123"), "t3_abc123");
        assert_eq!(submission_fullname("t3_abc123"), "t3_abc123");
    }
}
