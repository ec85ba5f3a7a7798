//! Short lifecycle handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use reel_models::{CreateShortInput, Short, ShortId};
use reel_pipeline::{MediaReport, ShortDetail};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn create_short(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateShortInput>,
) -> ApiResult<(StatusCode, Json<ShortDetail>)> {
    let detail = state.pipeline.create_short(&user.uid, input).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_short(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<ShortDetail>> {
    let detail = state
        .pipeline
        .get_short(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(detail))
}

/// Rewrite the whole script. Billed as script generation.
pub async fn regenerate_script(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<ShortDetail>> {
    let detail = state
        .pipeline
        .regenerate_script(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(detail))
}

pub async fn approve_script(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<Short>> {
    let short = state
        .pipeline
        .approve_script(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(short))
}

/// Render images for every scene that lacks one.
///
/// Partial failure is not an error: the report lists the scenes that
/// failed and the short is left `FAILED` until retried.
pub async fn generate_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<MediaReport>> {
    let report = state
        .pipeline
        .generate_media(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(report))
}

pub async fn generate_videos(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<MediaReport>> {
    let report = state
        .pipeline
        .generate_videos(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(report))
}

pub async fn publish(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<Short>> {
    let short = state
        .pipeline
        .publish(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(short))
}

pub async fn complete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
) -> ApiResult<Json<Short>> {
    let short = state
        .pipeline
        .complete(&user.uid, &ShortId::from(short_id))
        .await?;
    Ok(Json(short))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::test_support::{memory_state, user};
    use reel_models::{Credits, SceneDraft, ShortStatus};
    use reel_pipeline::AdapterErrorKind;

    fn input() -> CreateShortInput {
        CreateShortInput {
            title: "Night shift".into(),
            theme: "A baker who only works at night".into(),
            synopsis: None,
            style_id: None,
            tone_id: None,
            model_id: None,
            target_duration_secs: 20,
            scenes: Some(vec![SceneDraft {
                narration: "The oven hums".into(),
                visual_description: "A dark bakery".into(),
                visual_prompt: None,
                negative_prompt: None,
                duration_secs: 5,
            }]),
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (state, _store) = memory_state(Credits::whole(10));

        let (status, Json(created)) = create_short(State(state.clone()), user("u1"), Json(input()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.short.status, ShortStatus::ScriptReady);

        let Json(fetched) = get_short(
            State(state.clone()),
            user("u1"),
            Path(created.short.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(fetched, created);

        let err = get_short(State(state), user("u2"), Path(created.short.id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_refunds_and_reports_502() {
        let (state, store) = memory_state(Credits::whole(10));
        let (_, Json(created)) = create_short(State(state.clone()), user("u1"), Json(input()))
            .await
            .unwrap();

        let err = regenerate_script(
            State(state.clone()),
            user("u1"),
            Path(created.short.id.to_string()),
        )
        .await
        .unwrap_err();

        match err {
            ApiError::Upstream { kind, .. } => assert_eq!(kind, AdapterErrorKind::NotConfigured),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            state.pipeline.ledger().balance("u1").await.unwrap(),
            Credits::whole(10)
        );
        assert_eq!(store.transactions_for("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_before_media_is_invalid_transition() {
        let (state, _store) = memory_state(Credits::whole(10));
        let (_, Json(created)) = create_short(State(state.clone()), user("u1"), Json(input()))
            .await
            .unwrap();

        let err = publish(State(state), user("u1"), Path(created.short.id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidTransition(_)));
    }
}
