//! Idempotent config migrations applied to the raw (still camelCase)
//! document before schema validation.
//!
//! Grounded on the donor's `_migrate_config`: both rules operate on the
//! on-disk key names directly, ahead of the camelCase→snake_case pass in
//! [`crate::keys`].

use serde_json::{Map, Value, json};

/// Applies every migration rule to `data` in place. Safe to call more than
/// once: each rule is a no-op once its target shape already holds.
pub fn migrate(data: &mut Value) {
    migrate_exec_restrict_to_workspace(data);
    migrate_agents_defaults(data);
}

/// Rule 2: `tools.exec.restrictToWorkspace` → `tools.restrictToWorkspace`.
fn migrate_exec_restrict_to_workspace(data: &mut Value) {
    let Some(tools) = data.get_mut("tools").and_then(Value::as_object_mut) else {
        return;
    };

    if tools.contains_key("restrictToWorkspace") {
        return;
    }

    let moved = tools
        .get_mut("exec")
        .and_then(Value::as_object_mut)
        .and_then(|exec| exec.remove("restrictToWorkspace"));

    if let Some(value) = moved {
        tools.insert("restrictToWorkspace".to_owned(), value);
    }
}

/// Rule 1: synthesize `agents.registry.main` from `agents.defaults` when
/// `main` is absent, then delete `agents.defaults`.
fn migrate_agents_defaults(data: &mut Value) {
    let Some(agents) = data.get_mut("agents").and_then(Value::as_object_mut) else {
        return;
    };

    let Some(defaults) = agents.remove("defaults") else {
        return;
    };
    let Value::Object(defaults) = defaults else {
        return;
    };

    let registry = agents
        .entry("registry")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(registry) = registry.as_object_mut() else {
        return;
    };

    if registry.contains_key("main") {
        return;
    }

    let get = |key: &str, fallback: Value| defaults.get(key).cloned().unwrap_or(fallback);
    registry.insert(
        "main".to_owned(),
        json!({
            "workspace": get("workspace", json!("~/.nanocrew/workspaces/main")),
            "model": get("model", json!("anthropic/claude-opus-4-5")),
            "maxTokens": get("maxTokens", json!(8192)),
            "temperature": get("temperature", json!(0.7)),
            "maxToolIterations": get("maxToolIterations", json!(20)),
            "memoryWindow": get("memoryWindow", json!(50)),
            "systemPrompt": get("systemPrompt", json!("")),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn synthesizes_main_from_defaults_when_absent() {
        let mut data = json!({
            "agents": {
                "defaults": {
                    "workspace": "~/.nanocrew/workspaces/main",
                    "model": "anthropic/claude-sonnet-4",
                    "temperature": 0.5
                }
            }
        });

        migrate(&mut data);

        assert!(data["agents"].get("defaults").is_none());
        let main = &data["agents"]["registry"]["main"];
        assert_eq!(main["model"], "anthropic/claude-sonnet-4");
        assert_eq!(main["temperature"], 0.5);
        assert_eq!(main["maxTokens"], 8192);
    }

    #[test]
    fn does_not_overwrite_existing_main() {
        let mut data = json!({
            "agents": {
                "defaults": { "model": "should-be-ignored" },
                "registry": {
                    "main": { "workspace": "/explicit", "model": "anthropic/claude-opus-4-5" }
                }
            }
        });

        migrate(&mut data);

        assert_eq!(data["agents"]["registry"]["main"]["model"], "anthropic/claude-opus-4-5");
        assert!(data["agents"].get("defaults").is_none());
    }

    #[test]
    fn is_idempotent() {
        let mut data = json!({
            "agents": { "defaults": { "model": "anthropic/claude-sonnet-4" } },
            "tools": { "exec": { "restrictToWorkspace": true } }
        });

        migrate(&mut data);
        let once = data.clone();
        migrate(&mut data);

        assert_eq!(once, data);
    }

    #[test]
    fn moves_exec_restrict_to_workspace_up() {
        let mut data = json!({ "tools": { "exec": { "restrictToWorkspace": true } } });
        migrate(&mut data);
        assert_eq!(data["tools"]["restrictToWorkspace"], true);
    }

    #[test]
    fn leaves_explicit_top_level_restrict_untouched() {
        let mut data = json!({
            "tools": {
                "restrictToWorkspace": false,
                "exec": { "restrictToWorkspace": true }
            }
        });
        migrate(&mut data);
        assert_eq!(data["tools"]["restrictToWorkspace"], false);
    }

    #[test]
    fn missing_sections_are_a_noop() {
        let mut data = json!({});
        migrate(&mut data);
        assert_eq!(data, json!({}));
    }
}
