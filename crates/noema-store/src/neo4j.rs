//! Neo4j backend over the HTTP transactional endpoint
//!
//! One POST per query to `/db/{db}/tx/commit`, always parameterized.
//! Labels and relationship types come from the `Label`/`Rel` enums so no
//! caller-provided string ever lands inside Cypher text.

use crate::{KnowledgeStore, Label, Neighbor, NodeFields, Rel, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use tracing::debug;

const VECTOR_INDEX_PREFIX: &str = "descriptionEmbedding";

pub struct Neo4jStore {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

impl Neo4jStore {
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Connection settings from `NEO4J_URL`, `NEO4J_DB`, `NEO4J_USER` and
    /// `NEO4J_PW`, with the usual local defaults.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("NEO4J_URL").unwrap_or_else(|_| "http://localhost:7474".to_string());
        let database = std::env::var("NEO4J_DB").unwrap_or_else(|_| "neo4j".to_string());
        let user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());
        let password = std::env::var("NEO4J_PW").unwrap_or_default();
        Self::new(base_url, database, user, password)
    }

    /// Create the per-label cosine vector indexes if they do not exist.
    pub async fn ensure_vector_indexes(&self, dim: usize) -> StoreResult<()> {
        for label in [Label::Value, Label::Operation] {
            let statement = format!(
                "CREATE VECTOR INDEX {}{} IF NOT EXISTS \
                 FOR (n:{}) ON (n.embedding) \
                 OPTIONS {{indexConfig: {{`vector.dimensions`: $dim, \
                 `vector.similarity_function`: 'cosine'}}}}",
                VECTOR_INDEX_PREFIX,
                label.as_str(),
                label.as_str(),
            );
            self.run(&statement, json!({ "dim": dim as i64 })).await?;
        }
        Ok(())
    }

    async fn run(&self, statement: &str, parameters: Json) -> StoreResult<Vec<Vec<Json>>> {
        let url = format!("{}/db/{}/tx/commit", self.base_url, self.database);
        debug!(statement, "neo4j query");
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!("{}: {}", status, text)));
        }

        let parsed: TxResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        if let Some(err) = parsed.errors.first() {
            return Err(StoreError::Query(format!("{}: {}", err.code, err.message)));
        }
        Ok(parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl KnowledgeStore for Neo4jStore {
    async fn create_node(&self, label: Label, name: &str, fields: &NodeFields) -> StoreResult<()> {
        let statement = format!(
            "MERGE (n:{} {{name: $name}}) \
             ON CREATE SET n += $props",
            label.as_str()
        );
        self.run(&statement, json!({ "name": name, "props": node_props(fields) }))
            .await?;
        Ok(())
    }

    async fn update_node(&self, label: Label, name: &str, fields: &NodeFields) -> StoreResult<()> {
        let statement = format!(
            "MERGE (n:{} {{name: $name}}) SET n += $props",
            label.as_str()
        );
        self.run(&statement, json!({ "name": name, "props": node_props(fields) }))
            .await?;
        Ok(())
    }

    async fn node_exists(&self, label: Label, name: &str) -> StoreResult<bool> {
        let statement = format!(
            "MATCH (n:{} {{name: $name}}) RETURN count(n)",
            label.as_str()
        );
        let rows = self.run(&statement, json!({ "name": name })).await?;
        let count = rows
            .first()
            .and_then(|r| r.first())
            .and_then(Json::as_i64)
            .unwrap_or(0);
        Ok(count > 0)
    }

    async fn node_description(&self, label: Label, name: &str) -> StoreResult<Option<String>> {
        let statement = format!(
            "MATCH (n:{} {{name: $name}}) RETURN n.description",
            label.as_str()
        );
        let rows = self.run(&statement, json!({ "name": name })).await?;
        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(Json::as_str)
            .map(str::to_string))
    }

    async fn nearest_by_embedding(
        &self,
        label: Label,
        embedding: &[f32],
        k: usize,
    ) -> StoreResult<Vec<Neighbor>> {
        let statement = format!(
            "CALL db.index.vector.queryNodes('{}{}', $k, $embedding) \
             YIELD node, score RETURN node.name, score",
            VECTOR_INDEX_PREFIX,
            label.as_str()
        );
        let rows = self
            .run(&statement, json!({ "k": k as i64, "embedding": embedding }))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let name = row.first()?.as_str()?.to_string();
                let score = row.get(1)?.as_f64()? as f32;
                Some(Neighbor { name, score })
            })
            .collect())
    }

    async fn linked_nodes(&self, label: Label, name: &str, rel: Rel) -> StoreResult<Vec<String>> {
        let statement = format!(
            "MATCH (n:{} {{name: $name}})-[:{}]-(m) RETURN DISTINCT m.name",
            label.as_str(),
            rel.as_str()
        );
        let rows = self.run(&statement, json!({ "name": name })).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.first()?.as_str().map(str::to_string))
            .collect())
    }

    async fn create_relationship(
        &self,
        from: (Label, &str),
        to: (Label, &str),
        rel: Rel,
    ) -> StoreResult<()> {
        let statement = format!(
            "MATCH (a:{} {{name: $from}}), (b:{} {{name: $to}}) \
             MERGE (a)-[:{}]->(b)",
            from.0.as_str(),
            to.0.as_str(),
            rel.as_str()
        );
        self.run(&statement, json!({ "from": from.1, "to": to.1 }))
            .await?;
        Ok(())
    }

    async fn delete_relationship(
        &self,
        from: (Label, &str),
        to: (Label, &str),
        rel: Rel,
    ) -> StoreResult<()> {
        let statement = format!(
            "MATCH (a:{} {{name: $from}})-[r:{}]->(b:{} {{name: $to}}) DELETE r",
            from.0.as_str(),
            rel.as_str(),
            to.0.as_str()
        );
        self.run(&statement, json!({ "from": from.1, "to": to.1 }))
            .await?;
        Ok(())
    }
}

fn node_props(fields: &NodeFields) -> Json {
    let mut props = serde_json::Map::new();
    props.insert("description".into(), json!(fields.description));
    props.insert("embedding".into(), json!(fields.embedding));
    if let Some(t) = &fields.expected_type {
        props.insert("expected_type".into(), json!(t));
    }
    if let Some(d) = &fields.default {
        props.insert("default".into(), json!(d));
    }
    if let Some(e) = &fields.example {
        props.insert("example".into(), json!(e));
    }
    if let Some(ts) = &fields.created_at {
        props.insert("created_at".into(), json!(ts.to_rfc3339()));
    }
    Json::Object(props)
}

#[derive(Deserialize)]
struct TxResponse {
    results: Vec<TxResult>,
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Json>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_skip_unset_optionals() {
        let fields = NodeFields {
            description: "a number".into(),
            embedding: vec![0.5, 0.5],
            expected_type: Some("number".into()),
            default: None,
            example: None,
            created_at: None,
        };
        let props = node_props(&fields);
        assert_eq!(props["description"], "a number");
        assert_eq!(props["expected_type"], "number");
        assert!(props.get("default").is_none());
        assert!(props.get("example").is_none());
    }

    #[test]
    fn tx_errors_deserialize() {
        let body = r#"{"results":[],"errors":[{"code":"Neo.ClientError","message":"bad"}]}"#;
        let parsed: TxResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.errors[0].code, "Neo.ClientError");
        assert!(parsed.results.is_empty());
    }
}
