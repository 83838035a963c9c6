use std::time::Duration;

use serde_json::Value;

use super::{contains_folded, run_command};
use crate::clipboard::backend::command_exists;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Latency, Provider, ProviderError, QueryContext};

const TREE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub con_id: i64,
    pub title: String,
    pub class: String,
    pub workspace: String,
}

impl WindowInfo {
    fn description(&self) -> String {
        let workspace = if self.workspace.is_empty() {
            "Unknown"
        } else {
            &self.workspace
        };
        format!("Workspace: {workspace} | App: {}", self.class)
    }
}

/// Open i3 (or sway) windows; selecting one focuses it.
pub struct WindowSwitcher;

impl Provider for WindowSwitcher {
    fn id(&self) -> ProviderId {
        ProviderId::Windows
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        let program = ipc_program()?;
        let output = run_command(program, &["-t", "get_tree"], TREE_TIMEOUT, Some(&query.cancel))?;
        if !output.status.success() {
            return Err(ProviderError::new(format!(
                "{program} exited with {}",
                output.status
            )));
        }
        let tree: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProviderError::new(format!("bad window tree: {e}")))?;

        let needle = query.residual.trim().to_lowercase();
        Ok(collect_windows(&tree)
            .into_iter()
            .filter_map(|window| {
                let description = window.description();
                if !contains_folded(&window.title, &needle)
                    && !contains_folded(&description, &needle)
                {
                    return None;
                }
                Some(
                    Candidate::new(
                        format!("window:{}", window.con_id),
                        window.title,
                        Action::Custom {
                            provider: ProviderId::Windows,
                            payload: window.con_id.to_string(),
                        },
                    )
                    .with_subtitle(description)
                    .with_icon("preferences-system-windows")
                    .pinned(),
                )
            })
            .collect())
    }

    fn latency(&self) -> Latency {
        Latency::Blocking
    }

    fn execute(&self, payload: &str) -> Result<(), ProviderError> {
        let con_id: i64 = payload
            .parse()
            .map_err(|_| ProviderError::new(format!("bad window id '{payload}'")))?;
        let program = ipc_program()?;
        let command = format!("[con_id=\"{con_id}\"] focus");
        let output = run_command(program, &[command.as_str()], TREE_TIMEOUT, None)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProviderError::new(format!("focus failed: {}", output.status)))
        }
    }
}

fn ipc_program() -> Result<&'static str, ProviderError> {
    ["i3-msg", "swaymsg"]
        .into_iter()
        .find(|program| command_exists(program))
        .ok_or_else(|| ProviderError::new("neither i3-msg nor swaymsg is available"))
}

/// Depth-first over `nodes` and `floating_nodes`, remembering the
/// enclosing workspace.
pub fn collect_windows(tree: &Value) -> Vec<WindowInfo> {
    let mut windows = Vec::new();
    walk(tree, "", &mut windows);
    windows
}

fn walk(node: &Value, workspace: &str, out: &mut Vec<WindowInfo>) {
    let node_type = node.get("type").and_then(Value::as_str).unwrap_or_default();
    let name = node.get("name").and_then(Value::as_str).unwrap_or_default();
    let workspace = if node_type == "workspace" { name } else { workspace };

    let has_window = node.get("window").is_some_and(|w| !w.is_null())
        || node.get("app_id").is_some_and(|a| !a.is_null());
    if node_type == "con" && has_window {
        if name.is_empty() || name == "__i3" {
            return;
        }
        let class = node
            .pointer("/window_properties/class")
            .or_else(|| node.get("app_id"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown");
        if let Some(con_id) = node.get("id").and_then(Value::as_i64) {
            out.push(WindowInfo {
                con_id,
                title: name.to_string(),
                class: class.to_string(),
                workspace: workspace.to_string(),
            });
        }
    }

    for key in ["nodes", "floating_nodes"] {
        if let Some(children) = node.get(key).and_then(Value::as_array) {
            for child in children {
                walk(child, workspace, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::collect_windows;

    #[test]
    fn walks_tiled_and_floating_windows() {
        let tree = json!({
            "type": "root", "name": "root", "id": 1,
            "nodes": [{
                "type": "output", "name": "eDP-1", "id": 2,
                "nodes": [{
                    "type": "workspace", "name": "2:web", "id": 3,
                    "nodes": [{
                        "type": "con", "name": "Rust - Firefox", "id": 10, "window": 4242,
                        "window_properties": { "class": "firefox" }
                    }],
                    "floating_nodes": [{
                        "type": "floating_con", "name": null, "id": 11,
                        "nodes": [{
                            "type": "con", "name": "Calculator", "id": 12, "window": 4243,
                            "window_properties": { "class": "gnome-calculator" }
                        }]
                    }]
                }]
            }, {
                "type": "con", "name": "__i3", "id": 99, "window": 1
            }]
        });

        let windows = collect_windows(&tree);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].con_id, 10);
        assert_eq!(windows[0].workspace, "2:web");
        assert_eq!(
            windows[0].description(),
            "Workspace: 2:web | App: firefox"
        );
        assert_eq!(windows[1].title, "Calculator");
        assert_eq!(windows[1].workspace, "2:web");
    }
}
