pub mod copilot;
pub mod data_access;
pub mod s2do;
pub mod test_results;

pub use copilot::{ScenarioTable, ScriptedTurn, SimulateCopilotTool};
pub use data_access::ValidateDataAccessTool;
pub use s2do::VerifyS2doTool;
pub use test_results::{GenerateReportTool, LogResultTool};

use super::catalog::FixtureDocument;
use super::error::FixtureError;
use super::registry::{ToolHandler, ToolRegistry};

/// Ids of every tool this server ships, in listing order
pub const BUILTIN_TOOL_IDS: &[&str] = &[
    s2do::TOOL_ID,
    copilot::TOOL_ID,
    data_access::TOOL_ID,
    test_results::LOG_RESULT_ID,
    test_results::GENERATE_REPORT_ID,
];

fn builtin(id: &str, scenarios: &ScenarioTable) -> Option<Box<dyn ToolHandler>> {
    let tool: Box<dyn ToolHandler> = match id {
        s2do::TOOL_ID => Box::new(VerifyS2doTool),
        copilot::TOOL_ID => Box::new(SimulateCopilotTool::new(scenarios.clone())),
        data_access::TOOL_ID => Box::new(ValidateDataAccessTool),
        test_results::LOG_RESULT_ID => Box::new(LogResultTool),
        test_results::GENERATE_REPORT_ID => Box::new(GenerateReportTool),
        _ => return None,
    };
    Some(tool)
}

/// Build the tool registry the fixture asks for.
///
/// `tools` in the fixture selects and orders the enabled tools; without it
/// every built-in tool is registered.
pub fn registry_from_fixture(fixture: &FixtureDocument) -> Result<ToolRegistry, FixtureError> {
    let scenarios = ScenarioTable::new(fixture.scenarios_or_builtin()?)?;
    let enabled: Vec<String> = match &fixture.tools {
        Some(ids) => ids.clone(),
        None => BUILTIN_TOOL_IDS.iter().map(|id| id.to_string()).collect(),
    };

    let mut registry = ToolRegistry::new();
    for id in &enabled {
        if registry.has_tool(id) {
            return Err(FixtureError::DuplicateId {
                kind: "tool",
                id: id.clone(),
            });
        }
        let tool = builtin(id, &scenarios).ok_or_else(|| FixtureError::UnknownTool(id.clone()))?;
        registry.register(tool);
    }

    tracing::debug!(tools = registry.count(), "Tool registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_by_default() {
        let registry = registry_from_fixture(&FixtureDocument::default()).unwrap();
        let ids: Vec<String> = registry.list_tools().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, BUILTIN_TOOL_IDS);
    }

    #[test]
    fn fixture_selects_and_orders_tools() {
        let fixture = FixtureDocument {
            tools: Some(vec![
                test_results::LOG_RESULT_ID.to_string(),
                s2do::TOOL_ID.to_string(),
            ]),
            ..Default::default()
        };
        let registry = registry_from_fixture(&fixture).unwrap();
        let ids: Vec<String> = registry.list_tools().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![test_results::LOG_RESULT_ID, s2do::TOOL_ID]);
        assert!(!registry.has_tool(copilot::TOOL_ID));
    }

    #[test]
    fn unknown_and_duplicate_tools_are_rejected() {
        let unknown = FixtureDocument {
            tools: Some(vec!["test/teleport".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            registry_from_fixture(&unknown),
            Err(FixtureError::UnknownTool(_))
        ));

        let duplicate = FixtureDocument {
            tools: Some(vec![s2do::TOOL_ID.to_string(), s2do::TOOL_ID.to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            registry_from_fixture(&duplicate),
            Err(FixtureError::DuplicateId { kind: "tool", .. })
        ));
    }

    #[test]
    fn every_schema_declares_required_as_an_array() {
        let registry = registry_from_fixture(&FixtureDocument::default()).unwrap();
        for tool in registry.list_tools() {
            assert!(tool.parameters["required"].is_array(), "{}", tool.id);
            assert!(tool.id.starts_with("test/"));
        }
    }
}
