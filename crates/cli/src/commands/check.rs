//! Dialogue tree lint: catch authoring mistakes before a run does.

use std::collections::BTreeSet;
use std::path::Path;

use colloquy_core::extract::ExtractorRegistry;
use colloquy_core::{DialogueNode, StepType};

use super::run::load_tree;
use super::CommandResult;

pub fn run(path: &Path) -> CommandResult {
    let tree = match load_tree(path) {
        Ok(tree) => tree,
        Err(error) => return CommandResult::failure(format!("check failed: {error:#}"), 2),
    };

    let registry = ExtractorRegistry::builtin();
    let mut report = Report::default();
    let mut seen_ids = BTreeSet::new();
    for node in &tree.nodes {
        lint_node(node, &registry, &mut seen_ids, &mut report);
    }

    let mut lines = vec![format!("checked `{}`: {} top-level node(s)", path.display(), tree.nodes.len())];
    lines.extend(report.errors.iter().map(|finding| format!("error: {finding}")));
    lines.extend(report.warnings.iter().map(|finding| format!("warning: {finding}")));
    if report.errors.is_empty() && report.warnings.is_empty() {
        lines.push("no findings".to_owned());
    }

    let exit_code = if report.errors.is_empty() { 0 } else { 1 };
    CommandResult { exit_code, output: lines.join("\n") }
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

fn lint_node(
    node: &DialogueNode,
    registry: &ExtractorRegistry,
    seen_ids: &mut BTreeSet<String>,
    report: &mut Report,
) {
    let id = node.id.as_str();

    if !seen_ids.insert(id.to_owned()) {
        report.errors.push(format!("node id `{id}` is defined more than once"));
    }

    // Composite nodes without scripts legitimately delegate straight to
    // their children; everything else needs an opening prompt.
    let needs_retrieval = !node.is_composite() || node.opening_step().is_some();
    if needs_retrieval {
        if node.opening_step().is_none() {
            report.errors.push(format!("node `{id}` has no start or normal script"));
        }
        if node.step(StepType::NoInput).is_none() {
            report
                .warnings
                .push(format!("node `{id}` has no noInput script; silence will fail the node"));
        }
        if registry.get(&node.kind).is_none() {
            report.errors.push(format!("node `{id}` has unknown kind `{}`", node.kind));
        }
        if node.step(StepType::Confirmation).is_some()
            && node.step(StepType::NotConfirmed).is_none()
        {
            report.warnings.push(format!(
                "node `{id}` asks for confirmation but has no notConfirmed script; a rejection restarts the node"
            ));
        }
    }

    for script in &node.steps {
        if script.escalations.is_empty() {
            report
                .errors
                .push(format!("node `{id}` step `{}` has an empty escalation list", script.step));
        }
    }

    if let Some(structural) = &node.structural {
        if structural.schema.is_empty() {
            report.errors.push(format!(
                "node `{id}` declares a structural pattern but no capture schema could be derived from its children"
            ));
        }
    }

    for child in &node.children {
        lint_node(child, registry, seen_ids, report);
    }
}
