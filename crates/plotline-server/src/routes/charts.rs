use axum::{routing::post, Json, Router};
use plotline::models::tool::ToolOutcome;
use plotline::viz::{charts_for_turn, Chart};
use serde::Deserialize;

/// The finished turn a client wants charts for: its accumulated tool
/// results, and optionally the answer text (for the markdown fallback)
#[derive(Debug, Deserialize)]
struct ChartsRequest {
    #[serde(rename = "toolResults", default)]
    tool_results: Vec<ToolOutcome>,
    #[serde(default)]
    response: Option<String>,
}

async fn charts_handler(Json(request): Json<ChartsRequest>) -> Json<Vec<Chart>> {
    Json(charts_for_turn(
        &request.tool_results,
        request.response.as_deref(),
    ))
}

pub fn routes() -> Router {
    Router::new().route("/charts", post(charts_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post_charts(payload: Value) -> (StatusCode, Value) {
        let app = routes();
        let response = app
            .oneshot(
                Request::post("/charts")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_charts_from_tool_results() {
        let (status, body) = post_charts(json!({
            "toolResults": [{
                "tool": "query-datasource",
                "arguments": {},
                "result": [
                    {"Year": 2022, "Sales": 100},
                    {"Year": 2023, "Sales": 200}
                ]
            }]
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        let charts = body.as_array().unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0]["type"], "line");
        assert_eq!(charts[0]["xKey"], "Year");
        assert_eq!(charts[0]["yKey"], "Sales");
        assert_eq!(charts[0]["isCurrency"], true);
    }

    #[tokio::test]
    async fn test_charts_markdown_fallback() {
        let (status, body) = post_charts(json!({
            "toolResults": [],
            "response": "| Region | Sales |\n|---|---|\n| East | $100 |\n| West | $50 |\n"
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        let charts = body.as_array().unwrap();
        assert_eq!(charts[0]["type"], "pie");
    }

    #[tokio::test]
    async fn test_unchartable_input_is_empty_list_not_error() {
        let (status, body) = post_charts(json!({
            "toolResults": [{
                "tool": "query-datasource",
                "arguments": {},
                "result": "no table in here"
            }]
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
