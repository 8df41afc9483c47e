use serde_json::Value;

use crate::{
	Result,
	retry::{self, RetryPolicy},
};

pub async fn embed(
	cfg: &confidant_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = &crate::http_client(cfg.timeout_ms)?;
	let url = &crate::endpoint(&cfg.api_base, &cfg.path);
	let headers = &crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let body = &serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let json: Value = retry::with_retry(RetryPolicy::from(&cfg.retry), "embedding", move || async move {
		let res = client.post(url).headers(headers.clone()).json(body).send().await?;

		Ok(res.error_for_status()?.json().await?)
	})
	.await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(retry::invalid_response(format!(
			"Embedding response returned {} vectors for {} inputs.",
			vectors.len(),
			texts.len()
		)));
	}

	let expected = cfg.dimensions as usize;

	if let Some(vec) = vectors.iter().find(|vec| vec.len() != expected) {
		return Err(retry::invalid_response(format!(
			"Embedding dimension mismatch. Expected {expected}, got {}.",
			vec.len()
		)));
	}

	Ok(vectors)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| retry::invalid_response("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| retry::invalid_response("Embedding item missing embedding array."))?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value
				.as_f64()
				.ok_or_else(|| retry::invalid_response("Embedding value must be numeric."))?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
