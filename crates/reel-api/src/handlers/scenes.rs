//! Scene editing handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use reel_models::{AddSceneInput, RegenerateImageInput, Scene, SceneId, ScenePatch, ShortId};
use reel_pipeline::ShortDetail;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Maximum scenes accepted in one reorder request.
const MAX_REORDER_IDS: usize = 200;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegenerateSceneRequest {
    /// Free-text guidance for the rewrite
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderScenesRequest {
    /// Every scene id of the short, in the new order
    pub scene_ids: Vec<String>,
}

pub async fn add_scene(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
    Json(input): Json<AddSceneInput>,
) -> ApiResult<(StatusCode, Json<ShortDetail>)> {
    let detail = state
        .pipeline
        .add_scene(&user.uid, &ShortId::from(short_id), input)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn reorder_scenes(
    State(state): State<AppState>,
    user: AuthUser,
    Path(short_id): Path<String>,
    Json(request): Json<ReorderScenesRequest>,
) -> ApiResult<Json<ShortDetail>> {
    if request.scene_ids.len() > MAX_REORDER_IDS {
        return Err(ApiError::bad_request(format!(
            "At most {} scene ids may be reordered at once",
            MAX_REORDER_IDS
        )));
    }
    let ids: Vec<SceneId> = request.scene_ids.into_iter().map(SceneId::from).collect();
    let detail = state
        .pipeline
        .reorder_scenes(&user.uid, &ShortId::from(short_id), &ids)
        .await?;
    Ok(Json(detail))
}

/// Rewrite one scene's text. Billed as a scene regeneration.
pub async fn regenerate_scene(
    State(state): State<AppState>,
    user: AuthUser,
    Path((short_id, scene_id)): Path<(String, String)>,
    body: Option<Json<RegenerateSceneRequest>>,
) -> ApiResult<Json<Scene>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let instructions = request.instructions.filter(|i| !i.trim().is_empty());

    let scene = state
        .pipeline
        .regenerate_scene(
            &user.uid,
            &ShortId::from(short_id),
            &SceneId::from(scene_id),
            instructions,
        )
        .await?;
    Ok(Json(scene))
}

pub async fn update_scene(
    State(state): State<AppState>,
    user: AuthUser,
    Path(scene_id): Path<String>,
    Json(patch): Json<ScenePatch>,
) -> ApiResult<Json<Scene>> {
    let scene = state
        .pipeline
        .update_scene(&user.uid, &SceneId::from(scene_id), patch)
        .await?;
    Ok(Json(scene))
}

pub async fn remove_scene(
    State(state): State<AppState>,
    user: AuthUser,
    Path(scene_id): Path<String>,
) -> ApiResult<Json<ShortDetail>> {
    let detail = state
        .pipeline
        .remove_scene(&user.uid, &SceneId::from(scene_id))
        .await?;
    Ok(Json(detail))
}

/// Replace a scene's image, optionally with new prompts. Billed as one image.
pub async fn regenerate_scene_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(scene_id): Path<String>,
    body: Option<Json<RegenerateImageInput>>,
) -> ApiResult<Json<Scene>> {
    let input = body.map(|Json(i)| i).unwrap_or_default();
    let scene = state
        .pipeline
        .regenerate_scene_image(&user.uid, &SceneId::from(scene_id), input)
        .await?;
    Ok(Json(scene))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::shorts::create_short;
    use crate::test_support::{memory_state, user};
    use reel_models::{CreateShortInput, Credits, SceneDraft};

    async fn seeded(state: &AppState, scenes: usize) -> ShortDetail {
        let input = CreateShortInput {
            title: "Tides".into(),
            theme: "The sea keeps a diary".into(),
            synopsis: None,
            style_id: None,
            tone_id: None,
            model_id: None,
            target_duration_secs: 30,
            scenes: Some(
                (0..scenes)
                    .map(|i| SceneDraft {
                        narration: format!("page {}", i),
                        visual_description: format!("wave {}", i),
                        visual_prompt: None,
                        negative_prompt: None,
                        duration_secs: 5,
                    })
                    .collect(),
            ),
        };
        let (_, Json(detail)) = create_short(State(state.clone()), user("u1"), Json(input))
            .await
            .unwrap();
        detail
    }

    #[tokio::test]
    async fn test_reorder_and_remove_keep_dense_orders() {
        let (state, _store) = memory_state(Credits::whole(10));
        let detail = seeded(&state, 3).await;

        let mut ids: Vec<String> = detail.scenes.iter().map(|s| s.id.to_string()).collect();
        ids.rotate_left(1);
        let Json(reordered) = reorder_scenes(
            State(state.clone()),
            user("u1"),
            Path(detail.short.id.to_string()),
            Json(ReorderScenesRequest {
                scene_ids: ids.clone(),
            }),
        )
        .await
        .unwrap();
        let orders: Vec<(String, u32)> = reordered
            .scenes
            .iter()
            .map(|s| (s.id.to_string(), s.order))
            .collect();
        assert_eq!(
            orders,
            vec![(ids[0].clone(), 0), (ids[1].clone(), 1), (ids[2].clone(), 2)]
        );

        let Json(after) = remove_scene(State(state), user("u1"), Path(ids[1].clone()))
            .await
            .unwrap();
        let orders: Vec<u32> = after.scenes.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(after.short.scene_count, 2);
    }

    #[tokio::test]
    async fn test_reorder_with_missing_ids_is_rejected() {
        let (state, _store) = memory_state(Credits::whole(10));
        let detail = seeded(&state, 2).await;

        let err = reorder_scenes(
            State(state),
            user("u1"),
            Path(detail.short.id.to_string()),
            Json(ReorderScenesRequest {
                scene_ids: vec![detail.scenes[0].id.to_string()],
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_scene_patch() {
        let (state, _store) = memory_state(Credits::whole(10));
        let detail = seeded(&state, 1).await;

        let Json(scene) = update_scene(
            State(state),
            user("u1"),
            Path(detail.scenes[0].id.to_string()),
            Json(ScenePatch {
                narration: Some("a calmer page".into()),
                duration_secs: Some(8),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(scene.narration, "a calmer page");
        assert_eq!(scene.duration_secs, 8);
        assert_eq!(scene.visual_description, "wave 0");
    }

    #[tokio::test]
    async fn test_regenerate_scene_without_balance_is_402() {
        let (state, _store) = memory_state(Credits::ZERO);
        let detail = seeded(&state, 1).await;

        let err = regenerate_scene(
            State(state),
            user("u1"),
            Path((
                detail.short.id.to_string(),
                detail.scenes[0].id.to_string(),
            )),
            None,
        )
        .await
        .unwrap_err();
        match err {
            ApiError::InsufficientCredits {
                required,
                available,
            } => {
                assert_eq!(required, Credits::from_hundredths(50));
                assert_eq!(available, Credits::ZERO);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
