//! Prompt construction for the text model.

use crate::adapters::{SceneRequest, ScriptRequest};

/// Seconds of narration a scene should carry on average.
const TARGET_SCENE_SECS: u32 = 5;

pub const SCRIPT_SYSTEM_PROMPT: &str = "You are a screenwriter for vertical short-form video. \
You write tight, visual scripts split into scenes. Every scene has spoken narration and a \
concrete description of what the camera shows. Respond with JSON only.";

pub const SCENE_SYSTEM_PROMPT: &str = "You are a screenwriter revising one scene of a short \
vertical video. Keep continuity with the scenes around it. Respond with JSON only.";

const SCENE_SCHEMA: &str = r#"{
  "narration": "What the narrator says",
  "visual_description": "What the viewer sees",
  "visual_prompt": "Detailed prompt for an image model",
  "duration_secs": 5
}"#;

/// Number of scenes to ask for, given the target duration.
pub fn scene_count_for(target_duration_secs: u32) -> u32 {
    (target_duration_secs / TARGET_SCENE_SECS).clamp(3, 12)
}

/// Build the user prompt for a full script.
pub fn build_script_prompt(request: &ScriptRequest) -> String {
    let mut prompt = format!(
        "Write a script for a short video titled \"{}\".\n\nPREMISE:\n{}\n",
        request.title, request.theme
    );

    if let Some(synopsis) = request.synopsis.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nSYNOPSIS:\n");
        prompt.push_str(synopsis);
        prompt.push('\n');
    }
    if let Some(style) = &request.style_id {
        prompt.push_str(&format!("\nVisual style: {}\n", style));
    }
    if let Some(tone) = &request.tone_id {
        prompt.push_str(&format!("Tone: {}\n", tone));
    }

    prompt.push_str(&format!(
        r#"
The video should run about {} seconds. Write {} scenes, each 1 to 30 seconds long.

Return ONLY a single JSON object with this schema:
{{
  "synopsis": "One paragraph summary",
  "scenes": [
    {}
  ]
}}"#,
        request.target_duration_secs,
        scene_count_for(request.target_duration_secs),
        SCENE_SCHEMA.replace('\n', "\n    ")
    ));
    prompt
}

/// Build the user prompt for writing a single scene.
pub fn build_scene_prompt(request: &SceneRequest) -> String {
    let mut prompt = format!(
        "Short video \"{}\".\n\nPREMISE:\n{}\n",
        request.title, request.theme
    );
    if let Some(synopsis) = &request.synopsis {
        prompt.push_str(&format!("\nSYNOPSIS:\n{}\n", synopsis));
    }

    prompt.push_str("\nSCRIPT SO FAR:\n");
    for (index, narration) in request.neighbours.iter().enumerate() {
        let index = index as u32;
        if index == request.position {
            prompt.push_str(&format!("{}. >>> THIS SCENE <<<\n", index + 1));
        }
        let shown = if index >= request.position { index + 2 } else { index + 1 };
        prompt.push_str(&format!("{}. {}\n", shown, narration));
    }
    if request.position as usize >= request.neighbours.len() {
        prompt.push_str(&format!(
            "{}. >>> THIS SCENE <<<\n",
            request.neighbours.len() + 1
        ));
    }

    match &request.current {
        Some(current) => prompt.push_str(&format!(
            "\nRewrite scene {}. Its current narration is:\n{}\n",
            request.position + 1,
            current.narration
        )),
        None => prompt.push_str(&format!(
            "\nWrite a new scene to go at position {}.\n",
            request.position + 1
        )),
    }

    if let Some(instructions) = request.instructions.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nADDITIONAL USER INSTRUCTIONS:\n");
        prompt.push_str(instructions);
        prompt.push('\n');
    }

    prompt.push_str("\nReturn ONLY a single JSON object with this schema:\n");
    prompt.push_str(SCENE_SCHEMA);
    prompt
}
