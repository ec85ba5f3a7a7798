//! Scene ordering.
//!
//! [`reindex`] is the only code that assigns `Scene::order`. Every
//! structural edit builds the new sequence here and hands the resulting
//! [`SceneChanges`] to the store as one commit.

use std::collections::HashSet;

use chrono::Utc;
use reel_models::{Scene, SceneId};

use crate::error::{PipelineError, PipelineResult};
use crate::store::SceneChanges;

/// A short's scenes after a structural edit, plus the writes that get there.
#[derive(Debug, Clone)]
pub struct Layout {
    pub scenes: Vec<Scene>,
    pub changes: SceneChanges,
}

/// Set `order` to each scene's position. Returns the ids whose order moved.
fn reindex(scenes: &mut [Scene]) -> HashSet<SceneId> {
    let now = Utc::now();
    let mut moved = HashSet::new();
    for (position, scene) in scenes.iter_mut().enumerate() {
        let order = position as u32;
        if scene.order != order {
            scene.order = order;
            scene.updated_at = now;
            moved.insert(scene.id.clone());
        }
    }
    moved
}

fn layout(mut scenes: Vec<Scene>, always_write: Option<&SceneId>, deletes: Vec<SceneId>) -> Layout {
    let moved = reindex(&mut scenes);
    let upserts = scenes
        .iter()
        .filter(|s| moved.contains(&s.id) || always_write == Some(&s.id))
        .cloned()
        .collect();
    let scene_count = scenes.len() as u32;
    Layout {
        scenes,
        changes: SceneChanges {
            upserts,
            deletes,
            scene_count,
            ..Default::default()
        },
    }
}

/// Orders form exactly `0..n`.
pub fn is_dense(scenes: &[Scene]) -> bool {
    let mut orders: Vec<u32> = scenes.iter().map(|s| s.order).collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(i, o)| *o == i as u32)
}

/// Insert `scene` at `position`, shifting later scenes up.
pub fn insert_scene(current: Vec<Scene>, position: u32, scene: Scene) -> PipelineResult<Layout> {
    if position as usize > current.len() {
        return Err(PipelineError::validation(format!(
            "Scene position {} is out of range 0..={}",
            position,
            current.len()
        )));
    }
    let id = scene.id.clone();
    let mut scenes = current;
    scenes.insert(position as usize, scene);
    Ok(layout(scenes, Some(&id), Vec::new()))
}

/// Remove `scene_id` and close the gap.
pub fn remove_scene(current: Vec<Scene>, scene_id: &SceneId) -> PipelineResult<Layout> {
    let mut scenes = current;
    let index = scenes
        .iter()
        .position(|s| &s.id == scene_id)
        .ok_or_else(|| PipelineError::not_found(format!("Scene {}", scene_id)))?;
    let removed = scenes.remove(index);
    Ok(layout(scenes, None, vec![removed.id]))
}

/// Put scenes in the order of `ids`, which must name every scene exactly once.
pub fn reorder_scenes(current: Vec<Scene>, ids: &[SceneId]) -> PipelineResult<Layout> {
    if ids.len() != current.len() {
        return Err(PipelineError::validation(format!(
            "Expected {} scene ids, got {}",
            current.len(),
            ids.len()
        )));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(*id)) {
        return Err(PipelineError::validation(format!("Scene {} listed twice", dup)));
    }

    let mut remaining = current;
    let mut scenes = Vec::with_capacity(ids.len());
    for id in ids {
        let index = remaining
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| {
                PipelineError::validation(format!("Scene {} does not belong to this short", id))
            })?;
        scenes.push(remaining.swap_remove(index));
    }
    Ok(layout(scenes, None, Vec::new()))
}

/// Replace every current scene with `fresh`.
pub fn replace_scenes(current: &[Scene], fresh: Vec<Scene>) -> Layout {
    let deletes = current.iter().map(|s| s.id.clone()).collect();
    let mut result = layout(fresh, None, deletes);
    result.changes.upserts = result.scenes.clone();
    result
}
