//! Fan-out / fan-in graph
//!
//! Three analysts run concurrently; the evaluator waits for all of them and
//! reads each contribution from its upstream slush, keyed by node name.
//!
//! Run with: cargo run --example fan_in_graph

use anyhow::Result;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use slosh_kernel::agent::{agent_fn, ArcAgent};
use slosh_kernel::core::{AgentError, AgentOutcome};
use slosh_kernel::graph::{AgentGraph, GraphNode};
use slosh_kernel::tracer::{AgentTracer, TracerOptions};

fn analyst(name: &'static str, delay_ms: u64, fails: bool) -> ArcAgent {
    Arc::new(agent_fn(name, move |input, ctx| async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if fails {
            return Err(AgentError::failed(format!("{} could not reach its source", name)));
        }
        let mut signals = Map::new();
        signals.insert("angle".to_string(), json!(input.get("angle").cloned()));
        Ok(AgentOutcome::success(json!({"analyst": name, "topic": input.query()}))
            .with_slush(ctx.slush_out(signals, Some(0.7))))
    }))
}

fn evaluator() -> ArcAgent {
    Arc::new(agent_fn("evaluator", |_input, ctx| async move {
        let angles: Map<String, Value> = ctx
            .upstream_slush
            .iter()
            .map(|(node, slush)| (node.clone(), slush.get("angle").cloned().unwrap_or(Value::Null)))
            .collect();
        Ok(AgentOutcome::success(json!({"considered": angles})))
    }))
}

async fn run(title: &str, failing_node: Option<&str>) -> Result<()> {
    let tracer = Arc::new(
        AgentTracer::new(TracerOptions::default().on_span_complete(|span| {
            tracing::info!("span {} finished in {:?}ms", span.operation, span.duration_ms);
        })),
    );

    let mut graph = AgentGraph::new().with_tracer(tracer.clone());
    for (node, delay) in [("market", 40), ("finance", 10), ("product", 25)] {
        graph.add_node(
            GraphNode::new(node, analyst("analyst", delay, failing_node == Some(node)))
                .with_arg("angle", node),
        )?;
    }
    graph.add_node(GraphNode::new("evaluate", evaluator()).depends_on(["market", "finance", "product"]))?;

    let mut kwargs = Map::new();
    kwargs.insert("query".to_string(), json!("should we expand to a new region?"));
    let result = graph.run(kwargs).await?;

    println!("--- {} ---", title);
    println!("status: {:?}", result.status);
    println!("order:  {:?}", result.execution_order);
    for (name, node) in &result.nodes {
        println!("  {:<9} {:<8} {}", name, node.status.to_string(), node.result.clone().unwrap_or_default());
    }
    println!("spans recorded: {}", tracer.get_completed_spans(None).len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    run("all analysts answer", None).await?;
    run("one analyst fails", Some("finance")).await?;
    Ok(())
}
