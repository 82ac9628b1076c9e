use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::models::InviteToken;
use crate::shared::{AppError, AppState};

/// Default invite lifetime when the issuer does not pick one
const DEFAULT_TTL_SECS: u64 = 60 * 60;

/// Request payload for issuing an invite token
#[derive(Debug, Deserialize)]
pub struct IssueInviteRequest {
    pub user_id: String,
    pub ttl_secs: Option<u64>,
    pub max_uses: Option<u32>,
}

/// HTTP handler for issuing an invite token
///
/// POST /rooms/{room_id}/invites
/// The token goes into an invite link; redeeming it grants membership
/// to the (possibly private) room.
#[instrument(name = "issue_invite", skip(state, request))]
pub async fn issue_invite(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<IssueInviteRequest>,
) -> Result<Json<InviteToken>, AppError> {
    let ttl = Duration::from_secs(request.ttl_secs.unwrap_or(DEFAULT_TTL_SECS));
    let max_uses = request.max_uses.unwrap_or(1);

    let token = state
        .invite_service
        .issue(room_id, &request.user_id, ttl, max_uses)
        .await?;

    info!(
        room_id = %room_id,
        issued_by = %request.user_id,
        "Invite token issued"
    );

    Ok(Json(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::types::RoomResponse;
    use crate::shared::test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    fn test_app() -> Router {
        Router::new()
            .route("/rooms", axum::routing::post(crate::room::create_room))
            .route(
                "/rooms/:room_id/invites",
                axum::routing::post(issue_invite),
            )
            .with_state(test_state())
    }

    async fn create_room(app: &Router) -> RoomResponse {
        let request_body = r#"{
            "user_id": "u-host",
            "display_name": "Avery",
            "title": "secret hangout",
            "category": "party",
            "kind": "discussion",
            "max_participants": 4,
            "is_public": false
        }"#;
        let request = Request::builder()
            .method("POST")
            .uri("/rooms")
            .header("content-type", "application/json")
            .body(Body::from(request_body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_issue_invite_handler() {
        let app = test_app();
        let room = create_room(&app).await;

        let request_body = r#"{"user_id": "u-host", "max_uses": 3}"#;
        let request = Request::builder()
            .method("POST")
            .uri(format!("/rooms/{}/invites", room.id))
            .header("content-type", "application/json")
            .body(Body::from(request_body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let token: InviteToken = serde_json::from_slice(&body).unwrap();
        assert_eq!(token.room_id, room.id);
        assert_eq!(token.remaining_uses, 3);
        assert!(!token.token.is_empty());
    }

    #[tokio::test]
    async fn test_issue_invite_rejects_non_member() {
        let app = test_app();
        let room = create_room(&app).await;

        let request_body = r#"{"user_id": "u-outsider"}"#;
        let request = Request::builder()
            .method("POST")
            .uri(format!("/rooms/{}/invites", room.id))
            .header("content-type", "application/json")
            .body(Body::from(request_body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
