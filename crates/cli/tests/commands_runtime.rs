use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use colloquy_cli::commands::{check, config};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

fn write_tree(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("write tree");
    path
}

const VALID_TREE: &str = r#"{
    "nodes": [{
        "id": "dob",
        "kind": "date",
        "steps": {
            "start": [{"tasks": [{"type": "message", "text": "Quando sei nato?"}]}],
            "noInput": [{"tasks": [{"type": "message", "text": "Non ti sento."}]}]
        },
        "children": [
            {"id": "dob.day", "label": "Giorno", "kind": "number",
             "steps": {
                "start": [{"tasks": [{"type": "message", "text": "Che giorno?"}]}],
                "noInput": [{"tasks": [{"type": "message", "text": "Non ti sento."}]}]
             }},
            {"id": "dob.year", "label": "Anno", "kind": "number",
             "steps": {
                "start": [{"tasks": [{"type": "message", "text": "Che anno?"}]}],
                "noInput": [{"tasks": [{"type": "message", "text": "Non ti sento."}]}]
             }}
        ]
    }]
}"#;

#[test]
fn check_passes_a_well_formed_tree() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_tree(&dir, "tree.json", VALID_TREE);

    let result = check::run(&path);
    assert_eq!(result.exit_code, 0, "unexpected findings: {}", result.output);
    assert!(result.output.contains("no findings"));
}

#[test]
fn check_flags_a_node_without_an_opening_script() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_tree(
        &dir,
        "tree.json",
        r#"{"nodes": [{"id": "email", "kind": "email"}]}"#,
    );

    let result = check::run(&path);
    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("no start or normal script"));
}

#[test]
fn check_flags_unknown_kinds_and_duplicate_ids() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_tree(
        &dir,
        "tree.json",
        r#"{"nodes": [
            {"id": "sign", "kind": "starSign",
             "steps": {"start": [{"tasks": [{"type": "message", "text": "Segno?"}]}]}},
            {"id": "sign", "kind": "text",
             "steps": {"start": [{"tasks": [{"type": "message", "text": "Di nuovo?"}]}]}}
        ]}"#,
    );

    let result = check::run(&path);
    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("unknown kind `starSign`"));
    assert!(result.output.contains("defined more than once"));
}

#[test]
fn check_warns_about_missing_no_input_without_failing() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_tree(
        &dir,
        "tree.json",
        r#"{"nodes": [{
            "id": "email", "kind": "email",
            "steps": {"start": [{"tasks": [{"type": "message", "text": "Email?"}]}]}
        }]}"#,
    );

    let result = check::run(&path);
    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("warning:"));
    assert!(result.output.contains("noInput"));
}

#[test]
fn check_flags_empty_escalation_lists_and_lone_confirmations() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_tree(
        &dir,
        "tree.json",
        r#"{"nodes": [{
            "id": "email", "kind": "email",
            "steps": {
                "start": [{"tasks": [{"type": "message", "text": "Email?"}]}],
                "noInput": [],
                "confirmation": [{"tasks": [{"type": "message", "text": "Confermi {input}?"}]}]
            }
        }]}"#,
    );

    let result = check::run(&path);
    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("empty escalation list"));
    assert!(result.output.contains("no notConfirmed script"));
}

#[test]
fn check_fails_on_unparseable_trees() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_tree(&dir, "tree.json", "{ not json");

    let result = check::run(&path);
    assert_eq!(result.exit_code, 2);
    assert!(result.output.contains("check failed"));
}

#[test]
fn config_output_redacts_secrets() {
    let _guard = env_lock().lock().expect("env lock");

    env::set_var("COLLOQUY_LLM_API_KEY", "sk-verysecretvalue");

    let result = config::run(None);
    env::remove_var("COLLOQUY_LLM_API_KEY");

    assert_eq!(result.exit_code, 0, "config failed: {}", result.output);
    assert!(!result.output.contains("sk-verysecretvalue"));
    assert!(result.output.contains("llm.api_key = sk-v****"));
    assert!(result.output.contains("engine.mode = local"));
}

#[test]
fn config_reports_validation_failures() {
    let _guard = env_lock().lock().expect("env lock");

    env::set_var("COLLOQUY_ENGINE_MODE", "remote");

    let result = config::run(None);
    env::remove_var("COLLOQUY_ENGINE_MODE");

    assert_eq!(result.exit_code, 2);
    assert!(result.output.contains("remote.base_url"));
}
