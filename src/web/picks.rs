//! Submission of picked projects
//!
//! A signed-in member sends the projects they marked, each with an optional
//! comment. Nothing is stored; the submission is validated and logged.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::server::{request_cookies, AppState};
use crate::session::{verify_session, SESSION_COOKIE};

const MAX_COMMENT_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct PickSubmission {
    pub picks: Vec<Pick>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub project_id: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl PickSubmission {
    /// Trim fields and drop blank comments; `None` if the submission is unusable
    pub fn normalize(self) -> Option<Vec<Pick>> {
        if self.picks.is_empty() {
            return None;
        }
        self.picks
            .into_iter()
            .map(|pick| {
                let project_id = pick.project_id.trim().to_string();
                if project_id.is_empty() {
                    return None;
                }
                let comment = pick
                    .comment
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty());
                if comment
                    .as_ref()
                    .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
                {
                    return None;
                }
                Some(Pick { project_id, comment })
            })
            .collect()
    }
}

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

/// POST /api/picks - accept a batch of picks from a signed-in member
pub async fn submit_picks(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PickSubmission>, JsonRejection>,
) -> Response {
    let cookies = request_cookies(&headers);
    let claims = match cookies
        .get(SESSION_COOKIE)
        .map(|token| verify_session(token, &state.config.session_secret))
    {
        Some(Ok(claims)) => claims,
        _ => {
            return reply(
                StatusCode::UNAUTHORIZED,
                json!({ "ok": false, "error": "unauthenticated" }),
            )
        }
    };

    let picks = match payload {
        Ok(Json(submission)) => submission.normalize(),
        Err(rejection) => {
            warn!("Unreadable picks payload from {}: {}", claims.subject, rejection);
            None
        }
    };
    let Some(picks) = picks else {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "ok": false, "error": "invalid_picks" }),
        );
    };

    let ids: Vec<&str> = picks.iter().map(|p| p.project_id.as_str()).collect();
    let commented = picks.iter().filter(|p| p.comment.is_some()).count();
    info!(
        "Picks submitted by {} ({}): {:?}, {} with comments",
        claims.subject, claims.name, ids, commented
    );

    reply(StatusCode::OK, json!({ "ok": true, "count": picks.len() }))
}
