//! Scripted co-pilot dialogue.
//!
//! The dialogue is a flat table of `(scenario, step, predicate, response)`
//! turns loaded from the fixture document. For a given scenario and step the
//! first turn whose predicate matches the user input wins. A scenario is
//! exhausted after its highest step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::mcp::catalog::render_template;
use crate::mcp::error::{FixtureError, ToolError};
use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::registry::{parse_args, ToolContext, ToolHandler};

pub const TOOL_ID: &str = "test/simulate_copilot";

/// Condition on the user input, compared case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    #[default]
    Always,
    AnyKeyword {
        keywords: Vec<String>,
    },
    AllKeywords {
        keywords: Vec<String>,
    },
}

impl Predicate {
    /// Matched keywords when the predicate holds
    pub fn matches(&self, input: &str) -> Option<Vec<String>> {
        let input = input.to_lowercase();
        let hits = |keywords: &[String]| -> Vec<String> {
            keywords
                .iter()
                .filter(|k| input.contains(&k.to_lowercase()))
                .cloned()
                .collect()
        };

        match self {
            Self::Always => Some(Vec::new()),
            Self::AnyKeyword { keywords } => {
                let found = hits(keywords);
                (!found.is_empty()).then_some(found)
            }
            Self::AllKeywords { keywords } => {
                let found = hits(keywords);
                (!keywords.is_empty() && found.len() == keywords.len()).then_some(found)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedTurn {
    pub scenario: String,
    pub step: usize,
    #[serde(default)]
    pub when: Predicate,
    /// Response template; `{user_input}`, `{step}`, `{scenario_id}` and
    /// user_context keys are substituted
    pub respond: String,
}

#[derive(Debug, Clone)]
pub struct ScenarioTable {
    turns: Vec<ScriptedTurn>,
    steps: BTreeMap<String, usize>,
}

impl ScenarioTable {
    /// Build the table, rejecting scenarios with a step that has no turn
    pub fn new(turns: Vec<ScriptedTurn>) -> Result<Self, FixtureError> {
        let mut steps: BTreeMap<String, usize> = BTreeMap::new();
        for turn in &turns {
            let len = steps.entry(turn.scenario.clone()).or_insert(0);
            *len = (*len).max(turn.step + 1);
        }

        for (scenario, len) in &steps {
            for step in 0..*len {
                if !turns.iter().any(|t| &t.scenario == scenario && t.step == step) {
                    return Err(FixtureError::ScenarioGap {
                        scenario: scenario.clone(),
                        step,
                    });
                }
            }
        }

        Ok(Self { turns, steps })
    }

    pub fn scenario_ids(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }

    pub fn step_count(&self, scenario: &str) -> Option<usize> {
        self.steps.get(scenario).copied()
    }

    /// First turn of `scenario`/`step` whose predicate matches `input`
    pub fn select(
        &self,
        scenario: &str,
        step: usize,
        input: &str,
    ) -> Result<(&ScriptedTurn, Vec<String>), ToolError> {
        let len = self.step_count(scenario).ok_or_else(|| ToolError::NotFound {
            entity: "scenario",
            id: scenario.to_string(),
        })?;
        if step >= len {
            return Err(ToolError::NotFound {
                entity: "scenario step",
                id: format!("{}#{}", scenario, step),
            });
        }

        self.turns
            .iter()
            .filter(|t| t.scenario == scenario && t.step == step)
            .find_map(|t| t.when.matches(input).map(|hits| (t, hits)))
            .ok_or_else(|| ToolError::NotFound {
                entity: "scripted response",
                id: format!("{}#{}", scenario, step),
            })
    }
}

/// Deterministic co-pilot simulation driven by a [`ScenarioTable`]
pub struct SimulateCopilotTool {
    table: ScenarioTable,
}

impl SimulateCopilotTool {
    pub fn new(table: ScenarioTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ToolHandler for SimulateCopilotTool {
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            scenario_id: String,
            #[serde(default)]
            step_index: Option<usize>,
            #[serde(default)]
            user_input: Option<String>,
            #[serde(default)]
            user_context: Option<Map<String, Value>>,
        }

        let params: Args = parse_args(args)?;
        let step = params.step_index.unwrap_or(0);
        let input = params.user_input.unwrap_or_default();

        let (turn, matched_keywords) = self.table.select(&params.scenario_id, step, &input)?;

        let mut vars = params.user_context.clone().unwrap_or_default();
        vars.insert("user_input".to_string(), json!(input));
        vars.insert("step".to_string(), json!(step));
        vars.insert("scenario_id".to_string(), json!(params.scenario_id));
        let response = render_template(&turn.respond, &Value::Object(vars));

        let total = self.table.step_count(&params.scenario_id).unwrap_or(0);
        let next_step_index = (step + 1 < total).then_some(step + 1);

        context.ensure_active()?;
        tracing::debug!(
            session_id = %context.session.id,
            scenario = %params.scenario_id,
            step,
            ?next_step_index,
            "Co-pilot turn simulated"
        );

        Ok(json!({
            "scenario_id": params.scenario_id,
            "step_index": step,
            "response": response,
            "matched_keywords": matched_keywords,
            "next_step_index": next_step_index,
            "completed": next_step_index.is_none(),
            "user_context": params.user_context,
        }))
    }

    fn schema(&self) -> ToolDescriptor {
        ToolDescriptor {
            id: TOOL_ID.to_string(),
            name: "Simulate Co-pilot".to_string(),
            description: "Play one turn of a scripted co-pilot scenario and return the canned \
                response together with the next step index (null when the scenario is done)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "scenario_id": {
                        "type": "string",
                        "enum": self.table.scenario_ids()
                    },
                    "step_index": { "type": "integer", "minimum": 0, "description": "Step to play (optional, default: 0)" },
                    "user_input": { "type": "string" },
                    "user_context": { "type": "object", "description": "Values substituted into the response" }
                },
                "required": ["scenario_id"]
            }),
        }
    }
}
