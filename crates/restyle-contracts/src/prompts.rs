use crate::requests::SceneDescription;
use crate::styles::LabelSpec;

const LAYOUT_CLAUSE: &str =
    "Keep the walls, windows, doors, ceiling and camera perspective exactly where they are.";

#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub user_prompt: &'a str,
    pub style: &'a LabelSpec,
    pub room_type: &'a LabelSpec,
    pub scene: &'a SceneDescription,
}

pub fn compose_prompt(inputs: PromptInputs<'_>) -> String {
    let style_phrase = style_phrase(inputs.style);
    let room = inputs.room_type.label.as_str();

    let mut sentences: Vec<String> = Vec::new();
    match inputs.scene.observed() {
        Some(contents) => {
            sentences.push(format!(
                "Redesign this {room} in {style_phrase} style."
            ));
            sentences.push(format!(
                "The room currently contains {}.",
                trim_terminal_period(contents)
            ));
            sentences.push(format!(
                "Reorganize and restyle these existing pieces so they match the {} look instead of replacing the room.",
                inputs.style.label
            ));
        }
        None => {
            sentences.push(format!(
                "A {room} interior designed in {style_phrase} style."
            ));
        }
    }

    let user_prompt = inputs.user_prompt.trim();
    if !user_prompt.is_empty() {
        sentences.push(ensure_terminal_punctuation(user_prompt));
    }
    sentences.push(LAYOUT_CLAUSE.to_string());
    sentences.push("Photorealistic interior photography, natural lighting.".to_string());

    sentences.join(" ")
}

fn style_phrase(style: &LabelSpec) -> String {
    match style.cues.as_deref().map(str::trim).filter(|cues| !cues.is_empty()) {
        Some(cues) => format!("{} ({cues})", style.label),
        None => style.label.clone(),
    }
}

fn trim_terminal_period(text: &str) -> &str {
    text.trim().trim_end_matches('.').trim_end()
}

fn ensure_terminal_punctuation(text: &str) -> String {
    if text.ends_with(['.', '!', '?']) {
        return text.to_string();
    }
    format!("{text}.")
}
