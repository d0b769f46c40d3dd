use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Filename used when a model answers in free text.
pub const FALLBACK_FILENAME: &str = "response";

/// One output file proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSection {
    #[serde(default)]
    pub filename: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ResponseSection {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            next_step: None,
            category: None,
        }
    }

    pub fn with_next_step(mut self, next_step: impl Into<String>) -> Self {
        self.next_step = Some(next_step.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredResponse {
    pub is_multi_file: bool,
    pub sections: Vec<ResponseSection>,
}

impl StructuredResponse {
    pub fn from_sections(sections: Vec<ResponseSection>) -> Self {
        Self {
            is_multi_file: sections.len() > 1,
            sections,
        }
    }

    pub fn single(section: ResponseSection) -> Self {
        Self::from_sections(vec![section])
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Wrapped { sections: Vec<ResponseSection> },
    List(Vec<ResponseSection>),
    Single(ResponseSection),
}

/// Interprets raw model output as response sections.
///
/// Accepts `{"sections": [...]}`, a bare list of sections or a single section,
/// as JSON or YAML and optionally inside a code fence. Anything else becomes one
/// section named [`FALLBACK_FILENAME`] holding the whole text.
pub fn parse_structured_response(text: &str) -> Result<StructuredResponse, ModelError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(ModelError::EmptyResponse);
    }

    let raw = match serde_yaml::from_str::<RawResponse>(body) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Response is not structured ({}), using it as a single section", e);
            return Ok(StructuredResponse::single(ResponseSection::new(
                FALLBACK_FILENAME,
                body,
            )));
        }
    };

    let sections = match raw {
        RawResponse::Wrapped { sections } | RawResponse::List(sections) => sections,
        RawResponse::Single(section) => vec![section],
    };

    let sections: Vec<ResponseSection> = sections
        .into_iter()
        .filter(|s| !s.content.trim().is_empty())
        .map(|mut s| {
            s.filename = s.filename.trim().to_string();
            s.next_step = s
                .next_step
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            s
        })
        .collect();

    if sections.is_empty() {
        return Err(ModelError::ResponseParse(
            "response contained no sections with content".to_string(),
        ));
    }

    Ok(StructuredResponse::from_sections(sections))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => return text,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}
