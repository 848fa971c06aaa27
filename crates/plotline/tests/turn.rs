use futures::StreamExt;
use serde_json::json;

use plotline::agent::{Agent, AgentConfig};
use plotline::events::{ProgressStep, TurnEvent};
use plotline::models::message::Message;
use plotline::models::tool::Tool;
use plotline::providers::mock::MockProvider;
use plotline::toolserver::{HttpToolServer, MockToolServer};
use plotline::viz::{charts_for_turn, ChartType};

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn query_tool() -> Tool {
    Tool::new(
        "query-datasource",
        "Run an aggregated query against a datasource",
        json!({"type": "object", "properties": {"fields": {"type": "array"}}}),
    )
}

/// The canonical happy path: the model asks for data once, answers, and the
/// accumulated tool results produce a line chart.
#[tokio::test]
async fn turn_produces_answer_and_chart() {
    let table = json!([{
        "type": "text",
        "text": "{\"data\": [{\"Year\": 2022, \"Sales\": \"$1,000\"}, {\"Year\": 2023, \"Sales\": \"$2,500\"}]}"
    }]);

    let provider = MockProvider::new(vec![
        Message::assistant().with_tool_request(
            "call_1",
            "query-datasource",
            "{\"fields\": [\"Year\", \"Sales\"]}",
        ),
        Message::assistant().with_text("Sales grew from $1,000 to $2,500."),
    ]);
    let tools = MockToolServer::new(vec![query_tool()]).with_result("query-datasource", table);
    let agent = Agent::new(Box::new(provider), Box::new(tools));

    let events: Vec<TurnEvent> = agent
        .reply(Vec::new(), "How did sales develop?".to_string())
        .collect()
        .await;

    // Event protocol: progress*, then result, then done — nothing after
    let result_index = events
        .iter()
        .position(|e| matches!(e, TurnEvent::Result(_)))
        .expect("result event");
    assert!(events[..result_index]
        .iter()
        .all(|e| matches!(e, TurnEvent::Progress(_))));
    assert_eq!(events.len(), result_index + 2);
    assert_eq!(events[result_index + 1], TurnEvent::Done);

    let steps: Vec<ProgressStep> = events
        .iter()
        .filter_map(|e| e.as_progress().map(|p| p.step))
        .collect();
    for expected in [
        ProgressStep::Init,
        ProgressStep::Tools,
        ProgressStep::ToolsFound,
        ProgressStep::AnalysisStart,
        ProgressStep::IterationStart,
        ProgressStep::ToolsExecuting,
        ProgressStep::ToolExecuting,
        ProgressStep::ToolCompleted,
        ProgressStep::IterationComplete,
        ProgressStep::Complete,
    ] {
        assert!(steps.contains(&expected), "missing step {:?}", expected);
    }

    let result = events[result_index].as_result().unwrap();
    assert_eq!(result.response, "Sales grew from $1,000 to $2,500.");
    assert_eq!(result.iterations, 2);

    let charts = charts_for_turn(&result.tool_results, Some(&result.response));
    assert_eq!(charts.len(), 1);
    let chart = &charts[0];
    assert_eq!(chart.chart_type, ChartType::Line);
    assert_eq!(chart.x_key.as_deref(), Some("Year"));
    assert_eq!(chart.y_key.as_deref(), Some("Sales"));
    assert!(chart.is_currency);
    assert_eq!(chart.data[0]["Sales"], json!(1000));
    assert_eq!(chart.data[1]["Sales"], json!(2500));
}

/// A failing tool never ends the turn; the model reacts in the next
/// iteration and the markdown table in its answer still yields a chart.
#[tokio::test]
async fn failed_tool_recovers_with_markdown_fallback() {
    let provider = MockProvider::new(vec![
        Message::assistant().with_tool_request("call_1", "query-datasource", "{}"),
        Message::assistant().with_text(
            "The live query failed, but from cache:\n\n\
             | Region | Sales |\n|---|---|\n| East | $100 |\n| West | $50 |\n",
        ),
    ]);
    let tools =
        MockToolServer::new(vec![query_tool()]).with_failure("query-datasource", "timeout");
    let agent = Agent::new(Box::new(provider), Box::new(tools));

    let result = agent
        .chat(Vec::new(), "Sales by region?".to_string())
        .await
        .expect("turn completes despite the tool failure");

    assert_eq!(result.tool_results.len(), 1);
    assert!(result.tool_results[0].is_error());

    let charts = charts_for_turn(&result.tool_results, Some(&result.response));
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].chart_type, ChartType::Pie);
}

/// Full wire coverage: the loop driving a real HTTP tool server (handshake,
/// discovery, execution, session teardown) via the JSON-RPC protocol.
#[tokio::test]
async fn turn_against_http_tool_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "turn-session")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "test", "version": "0.0.1"}
                    }
                })),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(
            json!({"method": "notifications/initialized"}),
        ))
        .respond_with(ResponseTemplate::new(202))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"tools": [{
                "name": "query-datasource",
                "description": "Run a query",
                "inputSchema": {"type": "object"}
            }]}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "result": {"content": [{"type": "text", "text": "{\"rows\": [{\"Region\": \"East\", \"Sales\": 1}, {\"Region\": \"West\", \"Sales\": 2}]}"}]}
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = MockProvider::new(vec![
        Message::assistant().with_tool_request("call_1", "query-datasource", "{}"),
        Message::assistant().with_text("East sold more."),
    ]);
    let tools = HttpToolServer::new(&format!("{}/mcp", mock_server.uri())).unwrap();
    let agent = Agent::new(Box::new(provider), Box::new(tools));

    let result = agent
        .chat(Vec::new(), "Compare regions".to_string())
        .await
        .expect("turn against http tool server");

    assert_eq!(result.response, "East sold more.");
    assert_eq!(result.tool_results.len(), 1);
    assert!(!result.tool_results[0].is_error());

    let charts = charts_for_turn(&result.tool_results, None);
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].chart_type, ChartType::Pie);
}

/// The iteration budget bounds model calls even when the model keeps asking
/// for tools, and the forced final answer arrives without tool definitions.
#[tokio::test]
async fn iteration_budget_is_enforced() {
    let mut responses: Vec<Message> = (0..2)
        .map(|i| {
            Message::assistant().with_tool_request(
                format!("call_{}", i),
                "query-datasource",
                "{}",
            )
        })
        .collect();
    responses.push(Message::assistant().with_text("Stopping here."));

    let mut tools = MockToolServer::new(vec![query_tool()]);
    for i in 0..2 {
        tools = tools.with_result("query-datasource", json!({"round": i}));
    }

    let agent = Agent::new(Box::new(MockProvider::new(responses)), Box::new(tools))
        .with_config(AgentConfig {
            max_iterations: 2,
            ..AgentConfig::default()
        });

    let events: Vec<TurnEvent> = agent
        .reply(Vec::new(), "never stop".to_string())
        .collect()
        .await;

    let result = events.iter().find_map(|e| e.as_result()).unwrap();
    assert_eq!(result.iterations, 2);
    assert_eq!(result.response, "Stopping here.");
    assert_eq!(result.tool_results.len(), 2);

    let iteration_starts = events
        .iter()
        .filter_map(|e| e.as_progress())
        .filter(|p| p.step == ProgressStep::IterationStart)
        .count();
    assert_eq!(iteration_starts, 2);
}
