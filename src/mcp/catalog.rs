//! Resource and prompt registries.
//!
//! Both tables are filled once from a fixture document (YAML or JSON) and are
//! read-only afterwards, so they are shared between connections without
//! locking.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::error::{FixtureError, McpError};
use super::protocol::{PromptSummary, ResourceSummary};
use super::tools::copilot::ScriptedTurn;

const BUILTIN_FIXTURE: &str = include_str!("../../fixtures/default.yaml");

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content: Value,
}

impl Resource {
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template: String,
}

impl Prompt {
    pub fn summary(&self) -> PromptSummary {
        PromptSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: placeholders(&self.template),
        }
    }
}

/// Declarative startup document describing what the server exposes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    /// Tool ids to enable. All built-in tools when absent.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    /// Replaces the built-in copilot dialogue table when present.
    #[serde(default)]
    pub copilot_scenarios: Option<Vec<ScriptedTurn>>,
}

impl FixtureDocument {
    pub fn parse(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// The fixture compiled into the binary
    pub fn builtin() -> Result<Self, FixtureError> {
        Self::parse(BUILTIN_FIXTURE)
    }

    /// Copilot turns from this document, falling back to the built-in table
    pub fn scenarios_or_builtin(&self) -> Result<Vec<ScriptedTurn>, FixtureError> {
        match &self.copilot_scenarios {
            Some(turns) => Ok(turns.clone()),
            None => Ok(Self::builtin()?.copilot_scenarios.unwrap_or_default()),
        }
    }
}

/// Read-only id-keyed resource and prompt tables
#[derive(Debug, Default)]
pub struct Catalog {
    resources: Vec<Resource>,
    resource_index: HashMap<String, usize>,
    prompts: Vec<Prompt>,
    prompt_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(resources: Vec<Resource>, prompts: Vec<Prompt>) -> Result<Self, FixtureError> {
        let resource_index = index_by_id("resource", resources.iter().map(|r| r.id.as_str()))?;
        let prompt_index = index_by_id("prompt", prompts.iter().map(|p| p.id.as_str()))?;

        Ok(Self {
            resources,
            resource_index,
            prompts,
            prompt_index,
        })
    }

    pub fn from_fixture(fixture: &FixtureDocument) -> Result<Self, FixtureError> {
        Self::new(fixture.resources.clone(), fixture.prompts.clone())
    }

    pub fn list_resources(&self) -> Vec<ResourceSummary> {
        self.resources.iter().map(Resource::summary).collect()
    }

    pub fn fetch_resource(&self, id: &str) -> Result<&Resource, McpError> {
        self.resource_index
            .get(id)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| McpError::ResourceNotFound(id.to_string()))
    }

    pub fn list_prompts(&self) -> Vec<PromptSummary> {
        self.prompts.iter().map(Prompt::summary).collect()
    }

    pub fn prompt(&self, id: &str) -> Option<&Prompt> {
        self.prompt_index.get(id).map(|&i| &self.prompts[i])
    }

    pub fn render_prompt(&self, id: &str, params: &Value) -> Result<String, McpError> {
        let prompt = self
            .prompt(id)
            .ok_or_else(|| McpError::PromptNotFound(id.to_string()))?;
        Ok(render_template(&prompt.template, params))
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }
}

fn index_by_id<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, usize>, FixtureError> {
    let mut index = HashMap::new();
    for (position, id) in ids.enumerate() {
        if index.insert(id.to_string(), position).is_some() {
            return Err(FixtureError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(index)
}

/// Substitute `{key}` tokens with values from `params`.
///
/// Strings are inserted verbatim, other JSON values as their JSON text. A key
/// that is absent (or null) stays in the output as the literal `{key}`.
pub fn render_template(template: &str, params: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            match params.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => caps[0].to_string(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Distinct placeholder names in first-seen order
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
