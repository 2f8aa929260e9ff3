//! Approval gate for tool calls requested by the model.

use std::collections::HashSet;

use crate::protocol::Action;

/// Tools that modify the filesystem and therefore always need explicit
/// approval unless remembered or bypassed.
const DESTRUCTIVE_TOOLS: &[&str] = &["write_file", "append_file", "delete_file"];

#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Run without asking.
    Approved,
    /// Prompt the user before running.
    NeedsConfirmation,
}

/// Tracks which tool invocations the user has standing approval for.
///
/// Approvals are keyed by tool name plus target path, so "always allow
/// writing to notes.txt" does not leak to other files. Tools that take no
/// path share a single key per tool.
pub struct PermissionGate {
    always_allow: HashSet<(String, String)>,
    bypass: bool,
}

impl PermissionGate {
    pub fn new(bypass: bool) -> Self {
        Self {
            always_allow: HashSet::new(),
            bypass,
        }
    }

    pub fn check(&self, action: &Action) -> Verdict {
        if self.bypass {
            return Verdict::Approved;
        }
        if !is_destructive(&action.tool) {
            return Verdict::Approved;
        }
        if self.always_allow.contains(&key_for(action)) {
            return Verdict::Approved;
        }
        Verdict::NeedsConfirmation
    }

    /// Records standing approval for this exact tool and path.
    pub fn remember(&mut self, action: &Action) {
        self.always_allow.insert(key_for(action));
    }

    /// Flips bypass mode and returns the new state.
    pub fn toggle_bypass(&mut self) -> bool {
        self.bypass = !self.bypass;
        self.bypass
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }
}

pub fn is_destructive(tool: &str) -> bool {
    DESTRUCTIVE_TOOLS.contains(&tool)
}

fn key_for(action: &Action) -> (String, String) {
    let path = action
        .input
        .get("path")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    (action.tool.clone(), path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(tool: &str, path: Option<&str>) -> Action {
        let mut input = serde_json::Map::new();
        if let Some(p) = path {
            input.insert("path".to_string(), json!(p));
        }
        Action {
            tool: tool.to_string(),
            input,
        }
    }

    #[test]
    fn read_only_tools_pass_without_confirmation() {
        let gate = PermissionGate::new(false);
        for tool in ["read_file", "list_files", "git", "web_search", "respond"] {
            assert_eq!(gate.check(&action(tool, None)), Verdict::Approved);
        }
    }

    #[test]
    fn destructive_tools_need_confirmation() {
        let gate = PermissionGate::new(false);
        for tool in ["write_file", "append_file", "delete_file"] {
            assert_eq!(
                gate.check(&action(tool, Some("a.txt"))),
                Verdict::NeedsConfirmation
            );
        }
    }

    #[test]
    fn remembered_approval_is_scoped_to_tool_and_path() {
        let mut gate = PermissionGate::new(false);
        let write_a = action("write_file", Some("a.txt"));
        gate.remember(&write_a);

        assert_eq!(gate.check(&write_a), Verdict::Approved);
        assert_eq!(
            gate.check(&action("write_file", Some("b.txt"))),
            Verdict::NeedsConfirmation
        );
        assert_eq!(
            gate.check(&action("delete_file", Some("a.txt"))),
            Verdict::NeedsConfirmation
        );
    }

    #[test]
    fn bypass_approves_everything() {
        let mut gate = PermissionGate::new(false);
        assert!(gate.toggle_bypass());
        assert_eq!(
            gate.check(&action("delete_file", Some("a.txt"))),
            Verdict::Approved
        );
        assert!(!gate.toggle_bypass());
        assert_eq!(
            gate.check(&action("delete_file", Some("a.txt"))),
            Verdict::NeedsConfirmation
        );
    }

    #[test]
    fn denial_leaves_no_trace() {
        let gate = PermissionGate::new(false);
        let act = action("write_file", Some("a.txt"));
        // Checking twice without remember() still requires confirmation.
        assert_eq!(gate.check(&act), Verdict::NeedsConfirmation);
        assert_eq!(gate.check(&act), Verdict::NeedsConfirmation);
    }
}
