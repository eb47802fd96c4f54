use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::fs;

/// Page material the assistant is grounded in. Exactly one variant applies to
/// a conversation; the hosting page picks it.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum PromptContext {
    Scripture {
        title: String,
        translation: String,
        commentary: String,
        commentary_author: Option<String>,
    },
    Narrative {
        title: String,
        source: String,
        body: String,
    },
    Hadith {
        text: String,
        source: String,
    },
    #[default]
    None,
}

impl PromptContext {
    pub fn kind(&self) -> &'static str {
        match self {
            PromptContext::Scripture { .. } => "scripture",
            PromptContext::Narrative { .. } => "narrative",
            PromptContext::Hadith { .. } => "hadith",
            PromptContext::None => "none",
        }
    }
}

/// Loose field bag as handed over by content pages. Field names follow the
/// content API payloads.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextFields {
    #[serde(default)]
    pub sure_title: Option<String>,
    #[serde(default)]
    pub sure_meal: Option<String>,
    #[serde(default)]
    pub sure_tefsir: Option<String>,
    #[serde(default)]
    pub sure_tefsir_author: Option<String>,
    #[serde(default)]
    pub story_title: Option<String>,
    #[serde(default)]
    pub story_source: Option<String>,
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub hadis_meal: Option<String>,
    #[serde(default)]
    pub hadis_source: Option<String>,
}

fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

impl ContextFields {
    /// Resolves the bag into a single context. Scripture wins over narrative,
    /// narrative over hadith; a combination only counts when all of its
    /// required fields are non-blank.
    pub fn resolve(&self) -> PromptContext {
        if let (Some(title), Some(translation), Some(commentary)) =
            (present(&self.sure_title), present(&self.sure_meal), present(&self.sure_tefsir))
        {
            return PromptContext::Scripture {
                title,
                translation,
                commentary,
                commentary_author: present(&self.sure_tefsir_author),
            };
        }

        if let (Some(title), Some(source), Some(body)) =
            (present(&self.story_title), present(&self.story_source), present(&self.story))
        {
            return PromptContext::Narrative { title, source, body };
        }

        if let (Some(text), Some(source)) = (present(&self.hadis_meal), present(&self.hadis_source)) {
            return PromptContext::Hadith { text, source };
        }

        PromptContext::None
    }
}

pub fn load_context(path: &str) -> Result<PromptContext, Box<dyn Error + Send + Sync>> {
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read context file '{}': {}", path, e))?;
    let fields: ContextFields = serde_json
        ::from_str(&file_content)
        .map_err(|e| format!("Failed to parse context file '{}': {}", path, e))?;
    Ok(fields.resolve())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn scripture_takes_precedence_when_complete() {
        let fields = ContextFields {
            sure_title: s("Fatiha"),
            sure_meal: s("Hamd, alemlerin Rabbi Allah'a mahsustur."),
            sure_tefsir: s("Tefsir metni"),
            story_title: s("Hikaye"),
            story_source: s("Kaynak"),
            story: s("Metin"),
            ..Default::default()
        };

        match fields.resolve() {
            PromptContext::Scripture { title, commentary_author, .. } => {
                assert_eq!(title, "Fatiha");
                assert_eq!(commentary_author, None);
            }
            other => panic!("expected scripture, got {:?}", other),
        }
    }

    #[test]
    fn partial_scripture_falls_through_to_narrative() {
        let fields = ContextFields {
            sure_title: s("Fatiha"),
            sure_meal: s("meal"),
            story_title: s("Hz. Yusuf"),
            story_source: s("Kur'an"),
            story: s("Kuyuya atılan kardeş..."),
            ..Default::default()
        };

        assert_eq!(fields.resolve().kind(), "narrative");
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let fields = ContextFields {
            hadis_meal: s("Mümin, müminin kardeşidir."),
            hadis_source: s("   "),
            ..Default::default()
        };
        assert_eq!(fields.resolve(), PromptContext::None);

        let fields = ContextFields {
            hadis_meal: s("Mümin, müminin kardeşidir."),
            hadis_source: s("Sünen-i Ebû Dâvûd"),
            ..Default::default()
        };
        assert_eq!(fields.resolve().kind(), "hadith");
    }

    #[test]
    fn loads_field_bag_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"story_title":"Ashab-ı Kehf","story_source":"Kehf Suresi","story":"Mağaradaki gençler"}}"#
        ).unwrap();

        let context = load_context(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            context,
            PromptContext::Narrative {
                title: "Ashab-ı Kehf".into(),
                source: "Kehf Suresi".into(),
                body: "Mağaradaki gençler".into(),
            }
        );
    }
}
