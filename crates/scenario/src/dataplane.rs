//! Data-plane client abstraction.
//!
//! [`DataPlaneClient`] is the insert/search/query surface the scenario engine
//! probes through the timeout guard. [`MilvusRestClient`] implements it over the
//! Milvus v2 REST API with a mandatory client-side request timeout, separate
//! from the guard deadline.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use failstorm_core::config::DataPlaneConfig;

use crate::error::DataPlaneError;

const PRIMARY_FIELD: &str = "id";
const VECTOR_FIELD: &str = "vector";
const MAX_ID_LEN: usize = 100;
const MAX_QUERY_LIMIT: usize = 16_384;

/// A probe record: primary key plus vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Parameters for a vector search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub collection: String,
    pub vector: Vec<f32>,
    pub top_k: usize,
    /// Only records whose id starts with this prefix are searched.
    pub id_prefix: String,
    /// Client-side timeout for this request.
    pub timeout: Duration,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(default)]
    pub distance: f32,
}

/// Trait abstracting data-plane operations.
pub trait DataPlaneClient: Send + Sync + 'static {
    /// Creates and loads the collection if it does not exist yet.
    fn ensure_collection(
        &self,
        collection: &str,
        dim: usize,
    ) -> impl Future<Output = Result<(), DataPlaneError>> + Send;

    /// Inserts records and returns the number the server acknowledged.
    fn insert(
        &self,
        collection: &str,
        records: &[Record],
    ) -> impl Future<Output = Result<usize, DataPlaneError>> + Send;

    /// Runs a top-k vector search restricted to `request.id_prefix`.
    fn search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<Vec<SearchHit>, DataPlaneError>> + Send;

    /// Returns the ids of records whose id starts with `id_prefix`.
    fn query_ids(
        &self,
        collection: &str,
        id_prefix: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<String>, DataPlaneError>> + Send;
}

/// Deterministic vector for a record index. Same index, same vector.
pub fn deterministic_vector(index: usize, dim: usize) -> Vec<f32> {
    let seed = (index as u64).wrapping_add(1).wrapping_mul(2_654_435_761);
    (0..dim as u64)
        .map(|j| {
            let x = seed.wrapping_add(j.wrapping_mul(40_503)) % 10_000;
            x as f32 / 10_000.0
        })
        .collect()
}

/// Builds a `like` filter for an id prefix.
///
/// Only `[A-Za-z0-9_]` is accepted so the prefix cannot alter the expression.
pub fn prefix_filter(id_prefix: &str) -> Result<String, DataPlaneError> {
    if id_prefix.is_empty() || id_prefix.len() > MAX_ID_LEN {
        return Err(DataPlaneError::InvalidRequest(format!(
            "id prefix length {} (must be 1-{MAX_ID_LEN})",
            id_prefix.len()
        )));
    }
    if !id_prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(DataPlaneError::InvalidRequest(format!(
            "id prefix '{id_prefix}' contains unsupported characters"
        )));
    }
    Ok(format!("{PRIMARY_FIELD} like \"{id_prefix}%\""))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertData {
    insert_count: usize,
}

#[derive(Debug, Deserialize)]
struct HasData {
    has: bool,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

/// Milvus v2 REST client.
pub struct MilvusRestClient {
    http: reqwest::Client,
    base_url: String,
    database: String,
    token: Option<String>,
    ensured: Mutex<HashSet<String>>,
}

impl MilvusRestClient {
    /// Builds a client from the data-plane config.
    pub fn new(config: &DataPlaneConfig) -> Result<Self, DataPlaneError> {
        let http = reqwest::Client::builder()
            .timeout(config.client_timeout())
            .connect_timeout(config.client_timeout())
            .build()
            .map_err(|e| DataPlaneError::InvalidRequest(format!("http client: {e}")))?;
        let token = (!config.token.is_empty()).then(|| config.token.clone());
        Ok(Self {
            http,
            base_url: config.uri.trim_end_matches('/').to_owned(),
            database: config.database.clone(),
            token,
            ensured: Mutex::new(HashSet::new()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{path}", self.base_url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, DataPlaneError> {
        let mut request = self.http.post(self.endpoint(path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let envelope: Envelope = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // v2 reports success as 0; some gateways echo 200
        if envelope.code != 0 && envelope.code != 200 {
            return Err(DataPlaneError::Server {
                code: envelope.code,
                message: envelope.message,
            });
        }
        serde_json::from_value(envelope.data.unwrap_or(Value::Null))
            .map_err(|e| DataPlaneError::Decode(format!("{path}: {e}")))
    }

    fn base_body(&self, collection: &str) -> Value {
        json!({
            "dbName": self.database,
            "collectionName": collection,
        })
    }
}

fn create_collection_body(database: &str, collection: &str, dim: usize) -> Value {
    json!({
        "dbName": database,
        "collectionName": collection,
        "schema": {
            "autoId": false,
            "enableDynamicField": false,
            "fields": [
                {
                    "fieldName": PRIMARY_FIELD,
                    "dataType": "VarChar",
                    "isPrimary": true,
                    "elementTypeParams": { "max_length": MAX_ID_LEN.to_string() }
                },
                {
                    "fieldName": VECTOR_FIELD,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": dim.to_string() }
                }
            ]
        },
        "indexParams": [
            {
                "fieldName": VECTOR_FIELD,
                "indexName": format!("{VECTOR_FIELD}_idx"),
                "metricType": "L2",
                "params": { "index_type": "AUTOINDEX" }
            }
        ]
    })
}

fn search_body(database: &str, request: &SearchRequest) -> Result<Value, DataPlaneError> {
    Ok(json!({
        "dbName": database,
        "collectionName": request.collection,
        "data": [request.vector],
        "annsField": VECTOR_FIELD,
        "limit": request.top_k,
        "filter": prefix_filter(&request.id_prefix)?,
        "outputFields": [PRIMARY_FIELD],
    }))
}

impl DataPlaneClient for MilvusRestClient {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<(), DataPlaneError> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(collection) {
            return Ok(());
        }

        let has: HasData = self
            .call("collections/has", &self.base_body(collection), None)
            .await?;
        if !has.has {
            info!(collection, dim, "creating probe collection");
            let _: Value = self
                .call(
                    "collections/create",
                    &create_collection_body(&self.database, collection, dim),
                    None,
                )
                .await?;
        }
        let _: Value = self
            .call("collections/load", &self.base_body(collection), None)
            .await?;

        ensured.insert(collection.to_owned());
        Ok(())
    }

    async fn insert(&self, collection: &str, records: &[Record]) -> Result<usize, DataPlaneError> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(long) = records.iter().find(|r| r.id.len() > MAX_ID_LEN) {
            return Err(DataPlaneError::InvalidRequest(format!(
                "record id '{}' exceeds {MAX_ID_LEN} characters",
                long.id
            )));
        }

        let data: Vec<Value> = records
            .iter()
            .map(|r| json!({ "id": r.id, "vector": r.vector }))
            .collect();
        let mut body = self.base_body(collection);
        body["data"] = Value::Array(data);

        let result: InsertData = self.call("entities/insert", &body, None).await?;
        debug!(
            collection,
            requested = records.len(),
            acknowledged = result.insert_count,
            "insert acknowledged"
        );
        Ok(result.insert_count)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, DataPlaneError> {
        let body = search_body(&self.database, request)?;
        let hits: Option<Vec<SearchHit>> = self
            .call("entities/search", &body, Some(request.timeout))
            .await?;
        Ok(hits.unwrap_or_default())
    }

    async fn query_ids(
        &self,
        collection: &str,
        id_prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, DataPlaneError> {
        let mut body = self.base_body(collection);
        body["filter"] = Value::String(prefix_filter(id_prefix)?);
        body["limit"] = json!(limit.clamp(1, MAX_QUERY_LIMIT));
        body["outputFields"] = json!([PRIMARY_FIELD]);

        let rows: Option<Vec<IdRow>> = self.call("entities/query", &body, None).await?;
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.id)
            .collect())
    }
}
