use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

use crate::config::settings::Tone;
use crate::models::chat::CompletionRequest;
use crate::models::context::PromptContext;
use crate::session::SessionState;

const BUILTIN_PROMPTS: &str = include_str!("../../json/prompts.json");

const CONTEXT_KEYS: [&str; 4] = ["scripture", "scripture_author", "narrative", "hadith"];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{0}' not found")]
    TemplateNotFound(String),
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub persona: String,
    pub context_templates: HashMap<String, String>,
    pub tone_directives: HashMap<String, String>,
}

impl PromptConfig {
    pub fn builtin() -> Result<Self, PromptError> {
        let config: PromptConfig = serde_json::from_str(BUILTIN_PROMPTS)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PromptError> {
        for key in CONTEXT_KEYS {
            if !self.context_templates.contains_key(key) {
                return Err(PromptError::TemplateNotFound(format!("context_templates:{}", key)));
            }
        }
        for tone in [Tone::Light, Tone::Heavy] {
            if !self.tone_directives.contains_key(tone.as_str()) {
                return Err(
                    PromptError::TemplateNotFound(format!("tone_directives:{}", tone.as_str()))
                );
            }
        }
        Ok(())
    }
}

pub fn load_prompts(path: &str) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
    let config: PromptConfig = serde_json
        ::from_str(&file_content)
        .map_err(|e| format!("Failed to parse prompts file '{}': {}", path, e))?;
    config.validate()?;
    Ok(Arc::new(config))
}

fn get_context_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.context_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("context_templates:{}", key)))
}

fn get_tone_directive(config: &PromptConfig, tone: Tone) -> Result<&str, PromptError> {
    config.tone_directives
        .get(tone.as_str())
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("tone_directives:{}", tone)))
}

/// Single-pass placeholder substitution. Substituted values are never
/// rescanned, so page text containing `{...}` is inserted verbatim.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let name = &after[..end];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn get_context_block(config: &PromptConfig, context: &PromptContext) -> Result<String, PromptError> {
    let block = match context {
        PromptContext::Scripture { title, translation, commentary, commentary_author } => {
            let mut block = render(
                get_context_template(config, "scripture")?,
                &[
                    ("sure_title", title.as_str()),
                    ("sure_meal", translation.as_str()),
                    ("sure_tefsir", commentary.as_str()),
                ]
            );
            if let Some(author) = commentary_author {
                block.push_str(
                    &render(
                        get_context_template(config, "scripture_author")?,
                        &[("sure_tefsir_author", author.as_str())]
                    )
                );
            }
            block
        }
        PromptContext::Narrative { title, source, body } =>
            render(
                get_context_template(config, "narrative")?,
                &[
                    ("story_title", title.as_str()),
                    ("story_source", source.as_str()),
                    ("story", body.as_str()),
                ]
            ),
        PromptContext::Hadith { text, source } =>
            render(
                get_context_template(config, "hadith")?,
                &[
                    ("hadis_meal", text.as_str()),
                    ("hadis_source", source.as_str()),
                ]
            ),
        PromptContext::None => String::new(),
    };
    Ok(block)
}

pub fn get_system_prompt(
    config: &PromptConfig,
    context: &PromptContext,
    tone: Tone
) -> Result<String, PromptError> {
    let mut prompt = config.persona.clone();
    prompt.push_str(&get_context_block(config, context)?);
    prompt.push_str(get_tone_directive(config, tone)?);
    Ok(prompt)
}

/// Builds the payload for one user turn. `session` must not yet contain the
/// new input; the last `window` turns become the history.
pub fn compose_request(
    config: &PromptConfig,
    session: &SessionState,
    context: &PromptContext,
    tone: Tone,
    window: usize,
    user_input: &str
) -> Result<CompletionRequest, PromptError> {
    Ok(CompletionRequest {
        system_prompt: get_system_prompt(config, context, tone)?,
        history: session.recent_messages(window),
        user_input: user_input.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatMessage, ChatTurn };
    use std::io::Write;

    fn scripture() -> PromptContext {
        PromptContext::Scripture {
            title: "İhlas".into(),
            translation: "De ki: O Allah birdir.".into(),
            commentary: "Tevhidin özü bu surede anlatılır.".into(),
            commentary_author: Some("Elmalılı Hamdi Yazır".into()),
        }
    }

    #[test]
    fn builtin_prompts_are_valid() {
        let config = PromptConfig::builtin().unwrap();
        assert!(config.persona.contains("Mümin"));
    }

    #[test]
    fn scripture_context_is_inserted_verbatim() {
        let config = PromptConfig::builtin().unwrap();
        let prompt = get_system_prompt(&config, &scripture(), Tone::Light).unwrap();

        assert!(prompt.starts_with(&config.persona));
        assert!(prompt.contains("De ki: O Allah birdir."));
        assert!(prompt.contains("Tevhidin özü bu surede anlatılır."));
        assert!(prompt.contains("Elmalılı Hamdi Yazır"));
        assert!(!prompt.contains("İçerik:"));
        assert!(!prompt.contains("Kaynak:"));
        assert!(!prompt.contains("hadis hakkındadır"));
    }

    #[test]
    fn author_line_is_omitted_when_unknown() {
        let config = PromptConfig::builtin().unwrap();
        let context = PromptContext::Scripture {
            title: "Nas".into(),
            translation: "meal".into(),
            commentary: "tefsir".into(),
            commentary_author: None,
        };
        let prompt = get_system_prompt(&config, &context, Tone::Light).unwrap();
        assert!(!prompt.contains("Tefsirin Yapan Kişi"));
    }

    #[test]
    fn placeholders_inside_page_text_are_not_expanded() {
        let config = PromptConfig::builtin().unwrap();
        let context = PromptContext::Narrative {
            title: "{story}".into(),
            source: "Kaynak kitap".into(),
            body: "Gövde".into(),
        };
        let prompt = get_system_prompt(&config, &context, Tone::Light).unwrap();
        assert!(prompt.contains("\"{story}\" hakkındadır"));
    }

    #[test]
    fn tone_selects_directive() {
        let config = PromptConfig::builtin().unwrap();
        let light = get_system_prompt(&config, &PromptContext::None, Tone::Light).unwrap();
        let heavy = get_system_prompt(&config, &PromptContext::None, Tone::Heavy).unwrap();

        assert!(light.ends_with(&config.tone_directives["light"]));
        assert!(heavy.ends_with(&config.tone_directives["heavy"]));
    }

    #[test]
    fn request_uses_recent_window_and_leaves_session_untouched() {
        let config = PromptConfig::builtin().unwrap();
        let mut session = SessionState::new(20);
        for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
            if i % 2 == 0 {
                session.append(ChatTurn::user(*text));
            } else {
                session.append(ChatTurn::assistant(*text));
            }
        }

        let request = compose_request(&config, &session, &PromptContext::None, Tone::Light, 3, "e").unwrap();
        assert_eq!(
            request.history,
            vec![
                ChatMessage::new("assistant", "b"),
                ChatMessage::new("user", "c"),
                ChatMessage::new("assistant", "d")
            ]
        );
        assert_eq!(request.user_input, "e");
        assert_eq!(session.len(), 4);
    }

    #[test]
    fn missing_template_is_reported() {
        let mut config = PromptConfig::builtin().unwrap();
        config.context_templates.remove("hadith");
        assert!(matches!(config.validate(), Err(PromptError::TemplateNotFound(_))));

        let context = PromptContext::Hadith { text: "t".into(), source: "s".into() };
        assert!(get_system_prompt(&config, &context, Tone::Light).is_err());
    }

    #[test]
    fn loads_prompt_override_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "persona": "Kısa cevap ver.",
                "context_templates": {{
                    "scripture": "S:{{sure_title}}",
                    "scripture_author": "A:{{sure_tefsir_author}}",
                    "narrative": "N:{{story_title}}",
                    "hadith": "H:{{hadis_source}}"
                }},
                "tone_directives": {{ "light": " L", "heavy": " H" }}
            }}"#
        ).unwrap();

        let config = load_prompts(file.path().to_str().unwrap()).unwrap();
        let prompt = get_system_prompt(&config, &scripture(), Tone::Heavy).unwrap();
        assert_eq!(prompt, "Kısa cevap ver.S:İhlasA:Elmalılı Hamdi Yazır H");
    }
}
