use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reserved key of a routing-aware output that names the fallback directory.
pub const DEFAULT_ROUTE: &str = "default";

// ── Models ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Provider model identifier, e.g. `gpt-4o` or `whisper-1`.
    pub model: String,
    /// One of `whisper`, `chatgpt`, `claude`. Checked when the model is resolved.
    pub implementation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            implementation: implementation.into(),
            api_key: None,
            api_key_file: None,
            api_key_env: None,
            base_url: None,
            organization: None,
            temperature: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = Some(name.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Models keyed by their config id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelsConfig {
    pub models: BTreeMap<String, ModelConfig>,
}

impl ModelsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, id: impl Into<String>, model: ModelConfig) -> Self {
        self.models.insert(id.into(), model);
        self
    }

    pub fn get(&self, id: &str) -> Option<&ModelConfig> {
        self.models.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implementation {
    Whisper,
    ChatGpt,
    Claude,
}

/// How a step talks to its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Transcription,
    Chat,
}

impl Implementation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Implementation::Whisper => "whisper",
            Implementation::ChatGpt => "chatgpt",
            Implementation::Claude => "claude",
        }
    }

    pub fn execution_path(&self) -> ExecutionPath {
        match self {
            Implementation::Whisper => ExecutionPath::Transcription,
            Implementation::ChatGpt | Implementation::Claude => ExecutionPath::Chat,
        }
    }
}

impl FromStr for Implementation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whisper" => Ok(Implementation::Whisper),
            "chatgpt" => Ok(Implementation::ChatGpt),
            "claude" => Ok(Implementation::Claude),
            other => Err(format!("unknown implementation '{}'", other)),
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Pipeline ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// Vault directory watched by this step.
    pub input: String,
    pub output: OutputTarget,
    /// Directory that receives the input file after processing.
    pub archive: String,
    /// Id of the entry in the models config.
    pub model_config: String,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PipelineStep {
    pub fn new(
        input: impl Into<String>,
        output: OutputTarget,
        archive: impl Into<String>,
        model_config: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output,
            archive: archive.into(),
            model_config: model_config.into(),
            prompts: Vec::new(),
            context: Vec::new(),
            description: None,
        }
    }

    pub fn with_prompts<I, S>(mut self, prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompts = prompts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context = context.into_iter().map(Into::into).collect();
        self
    }
}

/// Where a step writes its results.
///
/// A plain string is a single directory (or file path). A map is a
/// routing-aware output: each key names a downstream step and maps to the
/// directory that step reads, and the reserved `default` key is the fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    Simple(String),
    Routed {
        routes: BTreeMap<String, String>,
        default: String,
    },
}

impl OutputTarget {
    pub fn simple(pattern: impl Into<String>) -> Self {
        OutputTarget::Simple(pattern.into())
    }

    pub fn routed<I, K, V>(routes: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        OutputTarget::Routed {
            routes: routes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            default: default.into(),
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, OutputTarget::Routed { .. })
    }

    /// Routing keys, i.e. the step ids this output can hand files to.
    pub fn next_steps(&self) -> impl Iterator<Item = &str> + '_ {
        let routes = match self {
            OutputTarget::Simple(_) => None,
            OutputTarget::Routed { routes, .. } => Some(routes),
        };
        routes.into_iter().flat_map(|r| r.keys().map(String::as_str))
    }

    /// Every path pattern this output may write to.
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            OutputTarget::Simple(pattern) => vec![pattern.as_str()],
            OutputTarget::Routed { routes, default } => routes
                .values()
                .map(String::as_str)
                .chain(std::iter::once(default.as_str()))
                .collect(),
        }
    }
}

impl Serialize for OutputTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OutputTarget::Simple(pattern) => serializer.serialize_str(pattern),
            OutputTarget::Routed { routes, default } => {
                let mut map = serializer.serialize_map(Some(routes.len() + 1))?;
                for (key, dir) in routes {
                    map.serialize_entry(key, dir)?;
                }
                map.serialize_entry(DEFAULT_ROUTE, default)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for OutputTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawOutput {
            Simple(String),
            Routed(BTreeMap<String, String>),
        }

        match RawOutput::deserialize(deserializer)? {
            RawOutput::Simple(pattern) => Ok(OutputTarget::Simple(pattern)),
            RawOutput::Routed(mut routes) => {
                let default = routes.remove(DEFAULT_ROUTE).ok_or_else(|| {
                    serde::de::Error::custom(
                        "routing-aware output requires a \"default\" directory",
                    )
                })?;
                Ok(OutputTarget::Routed { routes, default })
            }
        }
    }
}

/// Pipeline steps in declaration order.
///
/// Order matters: it breaks ties between entry points and decides which step
/// claims a file when several input directories contain it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfiguration {
    steps: Vec<(String, PipelineStep)>,
}

impl PipelineConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, id: impl Into<String>, step: PipelineStep) -> Self {
        self.insert(id, step);
        self
    }

    /// Adds a step, replacing an existing step with the same id in place.
    pub fn insert(&mut self, id: impl Into<String>, step: PipelineStep) {
        let id = id.into();
        match self.steps.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = step,
            None => self.steps.push((id, step)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&PipelineStep> {
        self.steps
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, step)| step)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PipelineStep)> {
        self.steps.iter().map(|(id, step)| (id.as_str(), step))
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Serialize for PipelineConfiguration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.steps.len()))?;
        for (id, step) in &self.steps {
            map.serialize_entry(id, step)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PipelineConfiguration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepsVisitor;

        impl<'de> Visitor<'de> for StepsVisitor {
            type Value = PipelineConfiguration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of step ids to pipeline steps")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut config = PipelineConfiguration::new();
                while let Some((id, step)) = access.next_entry::<String, PipelineStep>()? {
                    if config.contains(&id) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate step id '{}'",
                            id
                        )));
                    }
                    config.steps.push((id, step));
                }
                Ok(config)
            }
        }

        deserializer.deserialize_map(StepsVisitor)
    }
}
