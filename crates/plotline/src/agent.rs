use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::AgentError;
use crate::events::{Progress, ProgressStep, TurnError, TurnEvent, TurnResult};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolOutcome};
use crate::providers::base::{Provider, Usage};
use crate::toolserver::ToolServer;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Per-turn loop configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on model calls before a text-only answer is forced
    pub max_iterations: usize,
    /// Datasource the model is told to use when the user names none
    pub default_datasource: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            default_datasource: "eBikes Inventory and Sales".to_string(),
        }
    }
}

/// Agent drives one conversation turn: it alternates completion calls with
/// tool executions until the model answers in plain text or the iteration
/// budget runs out, streaming progress along the way.
///
/// The agent owns its provider and tool-server connection for exactly one
/// turn; `reply` consumes the agent and releases the connection on every
/// exit path.
pub struct Agent {
    provider: Box<dyn Provider>,
    tools: Box<dyn ToolServer>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>, tools: Box<dyn ToolServer>) -> Self {
        Self {
            provider,
            tools,
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    fn system_message(&self, tools: &[Tool]) -> Message {
        let tool_lines = tools
            .iter()
            .map(|tool| format!("- {}: {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n");

        Message::system().with_text(format!(
            r#"You are a helpful assistant that can analyze data using these available tools:
{tool_lines}

CRITICAL INSTRUCTIONS:
1. When users ask questions about their data, IMMEDIATELY use the tools to get the actual data - don't just describe what you will do.
2. ALWAYS use the datasource "{datasource}" for data questions unless the user specifies a different datasource.
3. For data analysis questions, first use the metadata tools to understand the data structure, then query for the actual data needed to answer the question.
4. Don't say "I will do X" - just do X immediately using the available tools.
5. Provide clear, actionable insights based on the actual data retrieved."#,
            tool_lines = tool_lines,
            datasource = self.config.default_datasource,
        ))
    }

    /// Create a stream of turn events: progress while the loop runs, then
    /// exactly one terminal `result` (followed by `done`) or `error`.
    pub fn reply(self, history: Vec<Message>, query: String) -> BoxStream<'static, TurnEvent> {
        let max_iterations = self.config.max_iterations;

        Box::pin(async_stream::stream! {
            yield TurnEvent::Progress(Progress::new(
                ProgressStep::Init,
                "Connection established",
            ));
            yield TurnEvent::Progress(Progress::new(
                ProgressStep::Tools,
                "Getting available tools...",
            ));

            let tools = match self.tools.discover().await {
                Ok(tools) => tools,
                Err(e) => {
                    let _ = self.tools.close().await;
                    yield TurnEvent::error("Failed to process chat request", e.to_string());
                    return;
                }
            };

            let names = tools
                .iter()
                .map(|tool| tool.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            yield TurnEvent::Progress(Progress::new(
                ProgressStep::ToolsFound,
                format!("Found {} tools: {}", tools.len(), names),
            ));

            let mut messages = vec![self.system_message(&tools)];
            messages.extend(history);
            messages.push(Message::user().with_text(query));

            let mut all_tool_results: Vec<ToolOutcome> = Vec::new();
            let mut final_response = String::new();
            let mut iteration = 0;
            let mut last_usage: Option<Usage> = None;

            yield TurnEvent::Progress(
                Progress::new(ProgressStep::AnalysisStart, "Starting analysis...")
                    .with_max_iterations(max_iterations),
            );

            while iteration < max_iterations {
                iteration += 1;
                debug!(iteration, messages = messages.len(), "agent iteration");

                yield TurnEvent::Progress(
                    Progress::new(
                        ProgressStep::IterationStart,
                        format!(
                            "Iteration {}/{}: Analyzing and planning...",
                            iteration, max_iterations
                        ),
                    )
                    .with_iteration(iteration),
                );

                let (response, usage) = match self.provider.complete(&messages, &tools).await {
                    Ok(completed) => completed,
                    Err(e) => {
                        let _ = self.tools.close().await;
                        yield TurnEvent::error("Failed to process chat request", e.to_string());
                        return;
                    }
                };
                last_usage = Some(usage);

                let requests = response.tool_requests.clone();
                messages.push(response.clone());

                if requests.is_empty() {
                    final_response = response.content;
                    yield TurnEvent::Progress(Progress::new(
                        ProgressStep::Complete,
                        "Analysis complete - generating final response...",
                    ));
                    break;
                }

                yield TurnEvent::Progress(
                    Progress::new(
                        ProgressStep::ToolsExecuting,
                        format!("Executing {} tool(s)...", requests.len()),
                    )
                    .with_tool_count(requests.len()),
                );

                for request in &requests {
                    // A bad argument payload from the model is answered like
                    // any other tool failure so it can correct itself
                    let (arguments, parse_error) =
                        match serde_json::from_str::<Value>(&request.arguments) {
                            Ok(value) => (value, None),
                            Err(e) => (
                                Value::String(request.arguments.clone()),
                                Some(AgentError::InvalidArguments(e.to_string())),
                            ),
                        };

                    yield TurnEvent::Progress(
                        Progress::new(
                            ProgressStep::ToolExecuting,
                            describe_call(&request.name, &arguments),
                        )
                        .with_tool(request.name.clone())
                        .with_arguments(arguments.clone()),
                    );

                    let outcome = match parse_error {
                        Some(error) => {
                            ToolOutcome::failure(&request.name, arguments, error.to_string())
                        }
                        None => match self.tools.invoke(&request.name, arguments.clone()).await {
                            Ok(result) => ToolOutcome::success(&request.name, arguments, result),
                            Err(error) => {
                                ToolOutcome::failure(&request.name, arguments, error.to_string())
                            }
                        },
                    };

                    if let Some(error) = &outcome.error {
                        debug!(tool = %request.name, %error, "tool call failed");
                        yield TurnEvent::Progress(
                            Progress::new(
                                ProgressStep::ToolError,
                                format!("{} failed: {}", request.name, error),
                            )
                            .with_tool(request.name.clone())
                            .with_error(error.clone()),
                        );
                        messages.push(
                            Message::tool(&request.id)
                                .with_text(json!({ "error": error }).to_string()),
                        );
                    } else {
                        yield TurnEvent::Progress(
                            Progress::new(
                                ProgressStep::ToolCompleted,
                                format!("{} completed successfully", request.name),
                            )
                            .with_tool(request.name.clone())
                            .with_success(true),
                        );
                        let payload = outcome.result.clone().unwrap_or(Value::Null);
                        messages.push(Message::tool(&request.id).with_text(payload.to_string()));
                    }

                    all_tool_results.push(outcome);
                }

                yield TurnEvent::Progress(
                    Progress::new(
                        ProgressStep::IterationComplete,
                        format!(
                            "Iteration {} completed - {} tool(s) executed",
                            iteration,
                            requests.len()
                        ),
                    )
                    .with_iteration(iteration)
                    .with_tools_executed(requests.len()),
                );
            }

            // Budget exhausted without a text answer: one extra completion
            // without tool definitions forces a best-effort response
            if iteration >= max_iterations && final_response.is_empty() {
                yield TurnEvent::Progress(Progress::new(
                    ProgressStep::MaxIterations,
                    "Max iterations reached - generating final response...",
                ));

                match self.provider.complete(&messages, &[]).await {
                    Ok((message, _)) => final_response = message.content,
                    Err(e) => {
                        let _ = self.tools.close().await;
                        yield TurnEvent::error("Failed to process chat request", e.to_string());
                        return;
                    }
                }
            }

            let _ = self.tools.close().await;

            yield TurnEvent::Result(TurnResult {
                response: final_response,
                tool_results: all_tool_results,
                usage: last_usage,
                iterations: iteration,
            });
            yield TurnEvent::Done;
        })
    }

    /// Run the turn to completion and return only the terminal outcome,
    /// for callers that do not stream progress.
    pub async fn chat(self, history: Vec<Message>, query: String) -> Result<TurnResult, TurnError> {
        let mut stream = self.reply(history, query);
        let mut outcome = None;

        while let Some(event) = stream.next().await {
            match event {
                TurnEvent::Result(result) => outcome = Some(Ok(result)),
                TurnEvent::Error(error) => outcome = Some(Err(error)),
                _ => {}
            }
        }

        outcome.unwrap_or_else(|| {
            Err(TurnError {
                error: "Failed to process chat request".to_string(),
                details: "Turn ended without a terminal event".to_string(),
            })
        })
    }
}

/// Render a tool call the way it is shown in progress messages,
/// e.g. `query-datasource(fields: ["Sales"])`
fn describe_call(name: &str, arguments: &Value) -> String {
    match arguments.as_object() {
        Some(map) if !map.is_empty() => {
            let rendered = map
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}({})", name, rendered)
        }
        _ => format!("{}()", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{FailingProvider, MockProvider};
    use crate::toolserver::MockToolServer;
    use std::sync::atomic::Ordering;

    fn query_tool() -> Tool {
        Tool::new(
            "query-datasource",
            "Run an aggregated query",
            json!({"type": "object", "properties": {"fields": {"type": "array"}}}),
        )
    }

    async fn collect(agent: Agent, query: &str) -> Vec<TurnEvent> {
        agent
            .reply(Vec::new(), query.to_string())
            .collect::<Vec<_>>()
            .await
    }

    fn steps(events: &[TurnEvent]) -> Vec<ProgressStep> {
        events
            .iter()
            .filter_map(|event| event.as_progress().map(|p| p.step))
            .collect()
    }

    #[tokio::test]
    async fn test_simple_response() {
        let provider = MockProvider::new(vec![Message::assistant().with_text("Hello!")]);
        let tools = MockToolServer::new(vec![query_tool()]);
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "Hi").await;

        let result = events
            .iter()
            .find_map(|event| event.as_result())
            .expect("terminal result");
        assert_eq!(result.response, "Hello!");
        assert_eq!(result.iterations, 1);
        assert!(result.tool_results.is_empty());
        assert_eq!(events.last(), Some(&TurnEvent::Done));
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request(
                "call_1",
                "query-datasource",
                "{\"fields\": [\"Sales\"]}",
            ),
            Message::assistant().with_text("Sales were 1000."),
        ]);
        let tools = MockToolServer::new(vec![query_tool()])
            .with_result("query-datasource", json!([{"Sales": 1000}]));
        let invocations = tools.invocations();
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "What were sales?").await;

        let result = events.iter().find_map(|e| e.as_result()).unwrap();
        assert_eq!(result.response, "Sales were 1000.");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_results.len(), 1);
        assert_eq!(result.tool_results[0].tool, "query-datasource");
        assert_eq!(
            result.tool_results[0].result,
            Some(json!([{"Sales": 1000}]))
        );

        let recorded = invocations.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "query-datasource");
        assert_eq!(recorded[0].1, json!({"fields": ["Sales"]}));

        let observed = steps(&events);
        assert!(observed.contains(&ProgressStep::ToolExecuting));
        assert!(observed.contains(&ProgressStep::ToolCompleted));
        assert!(observed.contains(&ProgressStep::IterationComplete));
    }

    #[tokio::test]
    async fn test_failing_tool_does_not_end_turn() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request("call_1", "query-datasource", "{}"),
            Message::assistant().with_text("The query failed, but here is what I know."),
        ]);
        let tools = MockToolServer::new(vec![query_tool()])
            .with_failure("query-datasource", "datasource offline");
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "What were sales?").await;

        let result = events.iter().find_map(|e| e.as_result()).unwrap();
        assert_eq!(result.tool_results.len(), 1);
        assert!(result.tool_results[0].is_error());
        assert!(result.tool_results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("datasource offline"));

        let tool_error = events
            .iter()
            .filter_map(|e| e.as_progress())
            .find(|p| p.step == ProgressStep::ToolError)
            .expect("tool-error progress event");
        assert_eq!(tool_error.tool.as_deref(), Some("query-datasource"));
        assert_eq!(events.last(), Some(&TurnEvent::Done));
    }

    #[tokio::test]
    async fn test_unparseable_arguments_become_tool_failure() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request("call_1", "query-datasource", "not json {"),
            Message::assistant().with_text("Done."),
        ]);
        let tools = MockToolServer::new(vec![query_tool()]);
        let invocations = tools.invocations();
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "query").await;

        let result = events.iter().find_map(|e| e.as_result()).unwrap();
        assert!(result.tool_results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid tool arguments"));
        // The tool server is never contacted for an unparseable payload
        assert!(invocations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_execute_in_order() {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("call_1", "query-datasource", "{\"fields\": [\"a\"]}")
                .with_tool_request("call_2", "query-datasource", "{\"fields\": [\"b\"]}"),
            Message::assistant().with_text("Both done."),
        ]);
        let tools = MockToolServer::new(vec![query_tool()])
            .with_result("query-datasource", json!("first"))
            .with_result("query-datasource", json!("second"));
        let invocations = tools.invocations();
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "two queries").await;

        let result = events.iter().find_map(|e| e.as_result()).unwrap();
        assert_eq!(result.tool_results.len(), 2);
        assert_eq!(result.tool_results[0].result, Some(json!("first")));
        assert_eq!(result.tool_results[1].result, Some(json!("second")));

        let recorded = invocations.lock().unwrap();
        assert_eq!(recorded[0].1, json!({"fields": ["a"]}));
        assert_eq!(recorded[1].1, json!({"fields": ["b"]}));
    }

    #[tokio::test]
    async fn test_max_iterations_forces_final_answer() {
        // The model asks for a tool on every call; the loop must stop anyway
        let mut responses = Vec::new();
        for i in 0..3 {
            responses.push(Message::assistant().with_tool_request(
                format!("call_{}", i),
                "query-datasource",
                "{}",
            ));
        }
        // Answer for the forced, tool-free completion
        responses.push(Message::assistant().with_text("Best effort answer."));

        let provider = MockProvider::new(responses);
        let tools = MockToolServer::new(vec![query_tool()])
            .with_result("query-datasource", json!("r1"))
            .with_result("query-datasource", json!("r2"))
            .with_result("query-datasource", json!("r3"));
        let agent = Agent::new(Box::new(provider), Box::new(tools)).with_config(AgentConfig {
            max_iterations: 3,
            ..AgentConfig::default()
        });

        let events = collect(agent, "loop forever").await;

        let result = events.iter().find_map(|e| e.as_result()).unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.response, "Best effort answer.");
        assert_eq!(result.tool_results.len(), 3);

        let observed = steps(&events);
        assert!(observed.contains(&ProgressStep::MaxIterations));
        // Exactly max_iterations iteration-start events
        assert_eq!(
            observed
                .iter()
                .filter(|s| **s == ProgressStep::IterationStart)
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_discovery_failure_is_fatal() {
        let provider = MockProvider::new(vec![]);
        let tools = MockToolServer::failing_discovery("registry unreachable");
        let closed = tools.close_flag();
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "hi").await;

        assert_eq!(events.last().unwrap().name(), "error");
        assert!(!events.iter().any(|e| e.as_result().is_some()));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_completion_failure_is_fatal_and_closes_connection() {
        let provider = FailingProvider::new("model overloaded");
        let tools = MockToolServer::new(vec![query_tool()]);
        let closed = tools.close_flag();
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "hi").await;

        match events.last().unwrap() {
            TurnEvent::Error(error) => {
                assert_eq!(error.error, "Failed to process chat request");
                assert!(error.details.contains("model overloaded"));
            }
            other => panic!("expected terminal error, got {:?}", other),
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_connection_closed_on_success() {
        let provider = MockProvider::new(vec![Message::assistant().with_text("Hi")]);
        let tools = MockToolServer::new(vec![query_tool()]);
        let closed = tools.close_flag();
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        collect(agent, "hi").await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_single_terminal_event() {
        let provider = MockProvider::new(vec![Message::assistant().with_text("Hi")]);
        let tools = MockToolServer::new(vec![query_tool()]);
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let events = collect(agent, "hi").await;
        let terminals = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::Result(_) | TurnEvent::Error(_)))
            .count();
        assert_eq!(terminals, 1);
        assert_eq!(events.last(), Some(&TurnEvent::Done));
    }

    #[tokio::test]
    async fn test_chat_returns_terminal_outcome() {
        let provider = MockProvider::new(vec![Message::assistant().with_text("Hello!")]);
        let tools = MockToolServer::new(vec![query_tool()]);
        let agent = Agent::new(Box::new(provider), Box::new(tools));

        let result = agent.chat(Vec::new(), "Hi".to_string()).await.unwrap();
        assert_eq!(result.response, "Hello!");
    }

    #[test]
    fn test_describe_call() {
        assert_eq!(
            describe_call("query-datasource", &json!({"fields": ["Sales"]})),
            "query-datasource(fields: [\"Sales\"])"
        );
        assert_eq!(describe_call("list-datasources", &json!({})), "list-datasources()");
    }
}
