//! Broadcast groups in race and fallback mode, plus a recursive lookup
//!
//! Run with: cargo run --example broadcast_race

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use slosh_kernel::agent::{agent_fn, AgentRegistry};
use slosh_kernel::broadcast::{BroadcastGroup, BroadcastManager, BroadcastMode};
use slosh_kernel::core::{AgentError, AgentOutcome, Slush};
use slosh_kernel::subagent::{SubAgentConfig, SubAgentContext, SubAgentManager};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut registry = AgentRegistry::new();
    for (name, delay) in [("tortoise", 200u64), ("hare", 10), ("fox", 50)] {
        registry.register(agent_fn(name, move |input, _ctx| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(AgentOutcome::success(json!({"from": name, "answer": input.query().len()})))
        }));
    }
    registry.register(agent_fn("flaky", |_input, _ctx| async move {
        Err::<AgentOutcome, _>(AgentError::failed_with_slush(
            "upstream timed out",
            Slush::new("flaky").with("draft", "half-written answer"),
        ))
    }));
    registry.register(agent_fn("steady", |_input, ctx| async move {
        let draft = ctx.upstream("flaky").and_then(|s| s.get("draft")).cloned();
        Ok(AgentOutcome::success(json!({"finished": draft})))
    }));

    // An agent that asks another one for help through the sub-agent manager
    registry.register(agent_fn("lead", |input, _ctx| async move {
        let manager = input
            .resources
            .get::<SubAgentManager>()
            .ok_or_else(|| AgentError::failed("no sub-agent manager"))?;
        let mut frame = input
            .resources
            .get::<SubAgentContext>()
            .map(|c| (*c).clone())
            .ok_or_else(|| AgentError::failed("no sub-agent context"))?;
        let helper = manager.invoke("hare", json!({"query": input.query()}), &mut frame).await?;
        Ok::<_, AgentError>(AgentOutcome::success(json!({
            "delegated_to": "hare",
            "helper": helper.payload,
            "depth": frame.depth,
        })))
    }));
    let registry = Arc::new(registry);

    let broadcasts = BroadcastManager::new();
    broadcasts.create_group(BroadcastGroup::new(
        "racers",
        ["tortoise", "hare", "fox"],
        BroadcastMode::Race,
    ));
    broadcasts.create_group(BroadcastGroup::new(
        "writers",
        ["flaky", "steady"],
        BroadcastMode::Fallback,
    ));

    let race = broadcasts
        .broadcast("racers", json!({"query": "who is fastest?"}), registry.broadcast_executor())
        .await?;
    println!("race:\n{}", serde_json::to_string_pretty(&race)?);

    let fallback = broadcasts
        .broadcast("writers", json!({"query": "write it up"}), registry.broadcast_executor())
        .await?;
    println!("fallback:\n{}", serde_json::to_string_pretty(&fallback)?);

    let manager = Arc::new(SubAgentManager::new(SubAgentConfig::new("demo").with_max_depth(3)));
    manager.set_executor(registry.subagent_executor());
    let mut root = manager.create_context("demo");
    let outcome = manager.invoke("lead", json!({"query": "look this up"}), &mut root).await?;
    println!("recursive:\n{}", serde_json::to_string_pretty(&outcome.payload)?);
    for call in manager.call_history(None) {
        println!("  {} -> {} at depth {} ({})", call.parent_agent, call.target_agent, call.depth, call.status);
    }

    Ok(())
}
