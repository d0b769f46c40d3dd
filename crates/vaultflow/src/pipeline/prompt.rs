use std::sync::LazyLock;

use regex::Regex;

use crate::model::StructuredRequest;

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A---[ \t]*\r?\n(?s:.*?\r?\n)?---[ \t]*(?:\r?\n|\z)").unwrap()
});

/// A context file passed to the model as reference material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub path: String,
    pub content: String,
}

/// Removes a leading YAML frontmatter block, if present.
pub fn strip_frontmatter(content: &str) -> &str {
    match FRONTMATTER.find(content) {
        Some(m) => content[m.end()..].trim_start_matches(['\r', '\n']),
        None => content,
    }
}

/// Builds the chat request for one input file.
///
/// Prompt files become the system message. The user message holds the
/// reference material, the input with its frontmatter removed and, for
/// routed outputs, the list of allowed `nextStep` values.
pub fn build_structured_request(
    prompts: &[String],
    context: &[ReferenceFile],
    input_name: &str,
    input_content: &str,
    next_steps: &[String],
    temperature: f32,
) -> StructuredRequest {
    let system = prompts
        .iter()
        .map(|p| strip_frontmatter(p).trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = String::new();

    if !context.is_empty() {
        prompt.push_str("## Reference material\n\n");
        for reference in context {
            prompt.push_str(&format!(
                "### {}\n\n{}\n\n",
                reference.path,
                strip_frontmatter(&reference.content).trim()
            ));
        }
    }

    prompt.push_str(&format!(
        "## Input: {}\n\n{}\n",
        input_name,
        strip_frontmatter(input_content).trim()
    ));

    if !next_steps.is_empty() {
        prompt.push('\n');
        prompt.push_str(&routing_instructions(next_steps));
    }

    StructuredRequest {
        system,
        prompt,
        available_next_steps: next_steps.to_vec(),
        temperature,
    }
}

fn routing_instructions(next_steps: &[String]) -> String {
    let options = next_steps
        .iter()
        .map(|s| format!("`{}`", s))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "## Routing\n\n\
         Set `nextStep` on each section to exactly one of: {}.\n\
         Omit `nextStep` if none of them fits.\n\
         Give each section a specific filename derived from its content, \
         not a generic name such as \"response\" or \"output\".\n",
        options
    )
}
