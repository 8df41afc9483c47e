use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType,
		Filter, PointStruct, Query, QueryPointsBuilder, ScoredPoint, UpsertPointsBuilder, Value,
		Vector, VectorParamsBuilder, VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";

const KEYWORD_INDEXES: [&str; 2] = ["user_id", "role"];

/// A message vector with the payload fields searches filter on.
#[derive(Debug, Clone)]
pub struct IndexPoint {
	pub message_id: Uuid,
	pub user_id: String,
	pub role: String,
	pub seq: i64,
	pub created_at: OffsetDateTime,
	pub embedding_version: String,
	pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
	pub message_id: Uuid,
	pub score: f32,
	pub seq: i64,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &confidant_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection and its keyword payload indexes when missing.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.as_str()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config),
			)
			.await?;

		for field in KEYWORD_INDEXES {
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(
						self.collection.clone(),
						field,
						FieldType::Keyword,
					)
					.wait(true),
				)
				.await?;
		}

		Ok(())
	}

	/// Drops and recreates the collection.
	pub async fn reset(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.as_str()).await? {
			self.client.delete_collection(self.collection.clone()).await?;
		}

		self.ensure_collection().await
	}

	pub async fn upsert(&self, points: &[IndexPoint]) -> Result<()> {
		if points.is_empty() {
			return Ok(());
		}

		let mut structs = Vec::with_capacity(points.len());

		for point in points {
			if point.vector.len() != self.vector_dim as usize {
				return Err(Error::InvalidArgument(format!(
					"Vector dimension {} does not match collection dimension {}.",
					point.vector.len(),
					self.vector_dim
				)));
			}

			structs.push(point_struct(point)?);
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), structs).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Cosine search restricted to one user and optionally one role.
	pub async fn search(
		&self,
		vector: Vec<f32>,
		user_id: &str,
		role: Option<&str>,
		threshold: f32,
		limit: u32,
	) -> Result<Vec<IndexHit>> {
		let mut conditions = vec![Condition::matches("user_id", user_id.to_string())];

		if let Some(role) = role {
			conditions.push(Condition::matches("role", role.to_string()));
		}

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.filter(Filter::all(conditions))
			.score_threshold(threshold)
			.limit(limit as u64)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result.iter().filter_map(scored_hit).collect())
	}
}

fn point_struct(point: &IndexPoint) -> Result<PointStruct> {
	let created_at = point
		.created_at
		.format(&Rfc3339)
		.map_err(|err| Error::InvalidArgument(format!("Failed to format created_at: {err}.")))?;
	let mut payload_map = HashMap::new();

	payload_map.insert("message_id".to_string(), Value::from(point.message_id.to_string()));
	payload_map.insert("user_id".to_string(), Value::from(point.user_id.clone()));
	payload_map.insert("role".to_string(), Value::from(point.role.clone()));
	payload_map.insert("seq".to_string(), Value::from(point.seq));
	payload_map.insert("created_at".to_string(), Value::from(created_at));
	payload_map
		.insert("embedding_version".to_string(), Value::from(point.embedding_version.clone()));

	let mut vector_map = HashMap::new();

	vector_map.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(point.vector.clone()));

	Ok(PointStruct::new(point.message_id.to_string(), vector_map, Payload::from(payload_map)))
}

fn scored_hit(point: &ScoredPoint) -> Option<IndexHit> {
	let message_id = match point.id.as_ref()?.point_id_options.as_ref()? {
		PointIdOptions::Uuid(id) => Uuid::parse_str(id).ok()?,
		_ => return None,
	};
	let seq = match point.payload.get("seq").and_then(|value| value.kind.as_ref()) {
		Some(Kind::IntegerValue(seq)) => *seq,
		_ => 0,
	};

	Some(IndexHit { message_id, score: point.score, seq })
}
