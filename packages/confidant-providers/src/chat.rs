use serde_json::Value;

use confidant_domain::message::{ChatTurn, Reasoning};

use crate::{
	Result,
	retry::{self, RetryPolicy},
};

/// One non-streaming chat completion. Returns the trimmed text of the first choice.
pub async fn complete(
	cfg: &confidant_config::LlmProviderConfig,
	turns: &[ChatTurn],
	reasoning: Option<Reasoning>,
) -> Result<String> {
	let client = &crate::http_client(cfg.timeout_ms)?;
	let url = &crate::endpoint(&cfg.api_base, &cfg.path);
	let headers = &crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let body = &request_body(cfg, turns, reasoning)?;
	let json: Value = retry::with_retry(RetryPolicy::from(&cfg.retry), "chat", move || async move {
		let res = client.post(url).headers(headers.clone()).json(body).send().await?;

		Ok(res.error_for_status()?.json().await?)
	})
	.await?;

	parse_completion(json)
}

fn request_body(
	cfg: &confidant_config::LlmProviderConfig,
	turns: &[ChatTurn],
	reasoning: Option<Reasoning>,
) -> Result<Value> {
	let mut body = serde_json::json!({
		"model": cfg.model,
		"messages": serde_json::to_value(turns)?,
	});

	if let Some(temperature) = cfg.temperature {
		body["temperature"] = serde_json::json!(temperature);
	}
	if let Some(reasoning) = reasoning {
		body["reasoning"] = serde_json::to_value(reasoning)?;
	}

	Ok(body)
}

fn parse_completion(json: Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| retry::invalid_response("Chat response is missing choice content."))?;
	let content = content.trim();

	if content.is_empty() {
		return Err(retry::invalid_response("Chat response content is empty."));
	}

	Ok(content.to_string())
}
