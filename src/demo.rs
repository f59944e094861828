//! Scripted walkthroughs of the two servers over real channels
//!
//! Each demo drives one channel and returns a transcript. A tool that fails
//! is recorded in the transcript; only channel errors abort the demo.

use crate::rpc::StdioChannel;
use crate::types::Result;
use serde_json::json;
use std::fmt::Write;
use tracing::info;

async fn list_tools(channel: &StdioChannel, transcript: &mut String) -> Result<()> {
    let tools = channel.list_tools().await?;
    let _ = writeln!(transcript, "Tools ({}):", tools.len());
    for tool in &tools {
        let _ = writeln!(transcript, "  - {}: {}", tool.name, tool.description);
    }
    Ok(())
}

async fn call(
    channel: &StdioChannel,
    transcript: &mut String,
    tool: &str,
    arguments: serde_json::Value,
) -> Result<()> {
    info!("[{}] calling {}", channel.name(), tool);
    let result = channel.call_tool(tool, arguments).await?;
    let status = if result.is_error() { "failed" } else { "ok" };
    let _ = writeln!(transcript, "\n> {} ({})\n{}", tool, status, result.joined_text());
    Ok(())
}

/// Handshake, list tools, then memory and health reports.
pub async fn run_monitoring_demo(channel: &StdioChannel) -> Result<String> {
    let mut transcript = String::new();

    let init = channel.initialize().await?;
    let _ = writeln!(
        transcript,
        "Connected to {} {}",
        init.server_info.name, init.server_info.version
    );

    list_tools(channel, &mut transcript).await?;
    call(channel, &mut transcript, "get_memory_usage", json!({})).await?;
    call(channel, &mut transcript, "check_app_health", json!({})).await?;

    Ok(transcript)
}

/// Handshake, list tools, a web search and the engine list.
pub async fn run_search_demo(channel: &StdioChannel) -> Result<String> {
    let mut transcript = String::new();

    let init = channel.initialize().await?;
    let _ = writeln!(
        transcript,
        "Connected to {} {}",
        init.server_info.name, init.server_info.version
    );

    list_tools(channel, &mut transcript).await?;
    call(
        channel,
        &mut transcript,
        "search_web",
        json!({"query": "Spring Boot MCP integration", "num_results": 3}),
    )
    .await?;
    call(channel, &mut transcript, "get_search_engines", json!({})).await?;

    Ok(transcript)
}
