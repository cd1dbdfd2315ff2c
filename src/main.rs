use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use slosh_kernel::agent::{AgentRegistry, FnPerform, Perform, SloshAgent};
use slosh_kernel::broadcast::{BroadcastGroup, BroadcastManager, BroadcastMode};
use slosh_kernel::core::{AgentInput, AgentOutcome, AgentResult, ExecutionContext};
use slosh_kernel::graph::{AgentGraph, GraphNode, GraphOptions};
use slosh_kernel::{logging, AgentMetadata, AgentTracer, KernelConfig};

/// Merges whatever its dependencies sent
struct Synthesizer;

#[async_trait]
impl Perform for Synthesizer {
    async fn perform(
        &self,
        _input: &AgentInput,
        ctx: &ExecutionContext,
    ) -> AgentResult<AgentOutcome> {
        let sources: Map<String, Value> = ctx
            .upstream_slush
            .iter()
            .map(|(node, slush)| (node.clone(), json!(slush.source_agent())))
            .collect();

        let mut signals = Map::new();
        signals.insert("inputs".to_string(), json!(sources.len()));
        Ok(AgentOutcome::success(json!({ "merged": sources }))
            .with_slush(ctx.slush_out(signals, Some(0.8))))
    }
}

/// An agent that sleeps before answering
fn delayed(config: &KernelConfig, name: &str, delay_ms: u64) -> SloshAgent<impl Perform> {
    let agent_name = name.to_string();
    SloshAgent::with_config(
        AgentMetadata::new(name).with_description(format!("Answers after {}ms", delay_ms)),
        FnPerform::new(move |input: AgentInput, ctx: ExecutionContext| {
            let agent_name = agent_name.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let mut signals = Map::new();
                signals.insert("finding".to_string(), json!(format!("{} looked at it", agent_name)));
                Ok(AgentOutcome::success(json!({
                    "agent": agent_name,
                    "query": input.query(),
                    "time_of_day": ctx.get_signal("temporal.time_of_day", Value::Null),
                }))
                .with_slush(ctx.slush_out(signals, None)))
            }
        }),
        config.slosh.clone(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => KernelConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?
            .with_env_overrides()?,
        None => KernelConfig::from_env()?,
    };
    config.validate()?;

    let _guard = logging::init_logging(&config.logging)?;
    tracing::info!("=== Slosh Kernel Demo ===");

    let tracer = Arc::new(AgentTracer::from_config(&config.tracer));
    let registry = Arc::new(
        AgentRegistry::new()
            .with(delayed(&config, "researcher", 30))
            .with(delayed(&config, "critic", 10))
            .with(delayed(&config, "historian", 60))
            .with(SloshAgent::with_config(
                AgentMetadata::new("synthesizer"),
                Synthesizer,
                config.slosh.clone(),
            )),
    );

    // Fan-out to three agents, fan-in to the synthesizer
    let mut graph = AgentGraph::new()
        .with_options(GraphOptions::from(&config.graph))
        .with_tracer(tracer.clone());
    for name in ["researcher", "critic", "historian"] {
        let agent = registry.get(name).context("agent missing from registry")?;
        graph.add_node(GraphNode::new(name, agent))?;
    }
    let synthesizer = registry.get("synthesizer").context("agent missing from registry")?;
    graph.add_node(
        GraphNode::new("synthesize", synthesizer).depends_on(["researcher", "critic", "historian"]),
    )?;

    let mut kwargs = Map::new();
    kwargs.insert("query".to_string(), json!("why did churn rise last quarter?"));
    let run = graph.run(kwargs).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);

    // Same agents, first answer wins
    let broadcasts = BroadcastManager::new().with_tracer(tracer.clone());
    broadcasts.create_group(BroadcastGroup::new(
        "panel",
        ["researcher", "critic", "historian"],
        BroadcastMode::Race,
    ));
    let race = broadcasts
        .broadcast(
            "panel",
            json!({"query": "summarize the incident"}),
            registry.broadcast_executor(),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&race)?);

    println!("{}", serde_json::to_string_pretty(&tracer.summary())?);
    tracing::info!("=== Slosh Kernel Demo Finished ===");

    Ok(())
}
