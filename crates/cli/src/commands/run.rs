//! Interactive dialogue run.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colloquy_core::config::{AppConfig, ConfigOverrides, EngineMode, LoadOptions};
use colloquy_core::extract::ExtractorRegistry;
use colloquy_core::machine::{EventSource, MessageSink};
use colloquy_core::orchestrator::{DialogueEngine, LocalEngine, RunOutcome};
use colloquy_core::pipeline::ExtractionPipeline;
use colloquy_core::{DialogueState, DialogueTree, EngineError};
use colloquy_remote::{HttpSessionClient, RemoteEngine};
use colloquy_scoring::{HttpEntityScorer, HttpLlmClient, LlmSlotScorer};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::warn;

use super::CommandResult;
use crate::io::{StdinEventSource, StdoutMessageSink};

pub struct RunArgs {
    pub tree: PathBuf,
    pub config: Option<PathBuf>,
    pub mode: Option<EngineMode>,
    pub log_level: Option<String>,
}

pub async fn run(args: RunArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: args.config,
        overrides: ConfigOverrides {
            engine_mode: args.mode,
            log_level: args.log_level,
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(format!("config validation failed: {error}"), 2),
    };
    crate::init_logging(&config);

    let tree = match load_tree(&args.tree) {
        Ok(tree) => tree,
        Err(error) => return CommandResult::failure(format!("could not load tree: {error:#}"), 2),
    };

    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            return CommandResult::failure(format!("could not build pipeline: {error:#}"), 2)
        }
    };

    let source = StdinEventSource::new(pipeline);
    let sink = StdoutMessageSink;
    let mut state = DialogueState::new();

    let outcome = execute(&config, &tree, &mut state, &source, &sink).await;

    match outcome {
        Ok(RunOutcome::Completed { value }) => {
            CommandResult::success(render_summary(&state, &value))
        }
        Ok(RunOutcome::Exited { action }) => {
            CommandResult::success(format!("dialogue exited early with action `{action}`"))
        }
        Err(error) => CommandResult::failure(format!("dialogue failed: {error}"), 1),
    }
}

async fn execute(
    config: &AppConfig,
    tree: &DialogueTree,
    state: &mut DialogueState,
    source: &StdinEventSource,
    sink: &StdoutMessageSink,
) -> Result<RunOutcome, EngineError> {
    match config.engine.mode {
        EngineMode::Local => LocalEngine::new().run(tree, state, source, sink).await,
        EngineMode::Remote => {
            match remote_run(config, tree, state, source, sink).await {
                Ok(outcome) => Ok(outcome),
                // One fallback, transport failures only. Anything the
                // server decided about the dialogue itself stands.
                Err(EngineError::Transport(error)) => {
                    warn!(%error, "remote engine unavailable, falling back to a local run");
                    LocalEngine::new().run(tree, state, source, sink).await
                }
                Err(error) => Err(error),
            }
        }
    }
}

async fn remote_run(
    config: &AppConfig,
    tree: &DialogueTree,
    state: &mut DialogueState,
    source: &dyn EventSource,
    sink: &dyn MessageSink,
) -> Result<RunOutcome, EngineError> {
    let base_url = config
        .remote
        .base_url
        .clone()
        .ok_or_else(|| EngineError::Transport("remote.base_url is not configured".to_owned()))?;
    let api_key = config.remote.api_key.as_ref().map(|key| key.expose_secret().to_owned());
    let client = HttpSessionClient::new(base_url, config.remote.timeout_secs, api_key)
        .map_err(|error| EngineError::Transport(error.to_string()))?;
    RemoteEngine::new(client).run(tree, state, source, sink).await
}

pub(crate) fn load_tree(path: &std::path::Path) -> Result<DialogueTree> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;
    DialogueTree::from_json(&raw)
        .with_context(|| format!("could not parse dialogue tree `{}`", path.display()))
}

fn build_pipeline(config: &AppConfig) -> Result<ExtractionPipeline> {
    let registry = Arc::new(ExtractorRegistry::builtin());
    let mut pipeline = ExtractionPipeline::new(registry.clone());

    if config.ner.enabled {
        let base_url =
            config.ner.base_url.clone().context("ner.base_url is required when enabled")?;
        let scorer = HttpEntityScorer::new(base_url, config.ner.timeout_secs, registry)
            .context("could not build ner scorer")?;
        pipeline = pipeline.with_ner(Arc::new(scorer));
    }
    if config.llm.enabled {
        let client =
            HttpLlmClient::from_config(&config.llm).context("could not build llm client")?;
        pipeline = pipeline.with_llm(Arc::new(LlmSlotScorer::new(Arc::new(client))));
    }
    Ok(pipeline)
}

pub(crate) fn render_summary(state: &DialogueState, value: &Value) -> String {
    let totals = state.counter_totals();
    let rendered =
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!(
        "dialogue completed\n{rendered}\nrecovery turns: noMatch={} noInput={} notConfirmed={}",
        totals.no_match, totals.no_input, totals.not_confirmed
    )
}
