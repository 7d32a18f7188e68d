use std::time::Duration;

use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use serde_json::Value;

use crate::{Error, Result};

/// Embeds `texts` in batches of `cfg.batch_size`. Either every text gets a vector or the call
/// fails; a 429 on any batch discards the vectors of earlier batches.
pub async fn embed(
	cfg: &perimeter_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let batch_size = (cfg.batch_size as usize).max(1);
	let mut out = Vec::with_capacity(texts.len());

	for batch in texts.chunks(batch_size) {
		let body = serde_json::json!({
			"model": cfg.model,
			"input": batch,
			"dimensions": cfg.dimensions,
		});
		let res = client.post(&url).headers(headers.clone()).json(&body).send().await?;
		let json: Value = check_status(res)?.json().await?;
		let vectors = parse_embedding_response(json)?;

		if vectors.len() != batch.len() {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding response has {} vectors for {} inputs.",
					vectors.len(),
					batch.len()
				),
			});
		}

		for vec in &vectors {
			if vec.len() != cfg.dimensions as usize {
				return Err(Error::InvalidResponse {
					message: format!(
						"Embedding dimension mismatch: expected {}, got {}.",
						cfg.dimensions,
						vec.len()
					),
				});
			}
		}

		out.extend(vectors);
	}

	Ok(out)
}

fn check_status(res: Response) -> Result<Response> {
	if res.status() == StatusCode::TOO_MANY_REQUESTS {
		let retry_after_ms = res
			.headers()
			.get(RETRY_AFTER)
			.and_then(|value| value.to_str().ok())
			.and_then(parse_retry_after_ms);

		tracing::warn!(?retry_after_ms, "Embedding provider rate limited the request.");

		return Err(Error::RateLimited { retry_after_ms });
	}

	Ok(res.error_for_status()?)
}

/// Only the delta-seconds form is honored; HTTP dates are ignored.
fn parse_retry_after_ms(raw: &str) -> Option<u64> {
	raw.trim().parse::<u64>().ok().map(|secs| secs.saturating_mul(1_000))
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
