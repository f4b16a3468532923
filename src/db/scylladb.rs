use std::{fs, sync::Arc, time::Instant};

use anyhow::Context;
use axum::async_trait;
use log::{debug, info};
use scylla::{
    load_balancing::DefaultPolicy, prepared_statement::PreparedStatement, transport::Compression,
    ExecutionProfile, Session, SessionBuilder, SerializeRow,
};
use uuid::Uuid;

use crate::data::visit_model::VisitEvent;
use crate::service::EventStore;

const INSERT_QUERY: &str =
    "INSERT INTO portfolio.visits (list_key, timestamp, id, payload) VALUES (?,?,?,?)";

/// One stored visit. The table clusters by `timestamp DESC`, so a partition
/// reads most-recent-first like the Redis list.
#[derive(Debug, Clone, SerializeRow)]
pub struct VisitRow {
    pub list_key: String,
    pub timestamp: String,
    pub id: Uuid,
    pub payload: String,
}

impl VisitRow {
    pub fn from_event(list_key: &str, event: &VisitEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            list_key: list_key.to_string(),
            timestamp: event.timestamp().to_string(),
            id: Uuid::new_v4(),
            payload: event.to_json()?,
        })
    }
}

#[derive(Clone)]
pub struct ScyllaDbService {
    key: String,
    db_session: Arc<Session>,
    ps: Arc<PreparedStatement>,
}

impl ScyllaDbService {
    pub async fn new(
        dc: String,
        host: String,
        schema_file: String,
        key: String,
    ) -> Result<Self, anyhow::Error> {
        info!("ScyllaDbService: connecting to {}. DC: {}.", host, dc);
        let policy = Arc::new(DefaultPolicy::default());
        let profile = ExecutionProfile::builder()
            .load_balancing_policy(policy)
            .build();
        let session: Session = SessionBuilder::new()
            .known_node(host.clone())
            .compression(Some(Compression::Lz4))
            .default_execution_profile_handle(profile.into_handle())
            .build()
            .await
            .context("Error connecting to ScyllaDB")?;
        info!("ScyllaDbService: connected to {}. DC: {}.", host, dc);

        info!("ScyllaDbService: creating schema...");
        let schema = fs::read_to_string(&schema_file)
            .with_context(|| format!("Error reading schema file {}", schema_file))?;

        for query in schema_statements(&schema) {
            info!("Running Query: {}", query);
            session
                .query(query, ())
                .await
                .context("Error creating schema")?;
        }

        let mut ps = session
            .prepare(INSERT_QUERY)
            .await
            .context("Error preparing query")?;
        ps.set_consistency(scylla::statement::Consistency::Any);

        Ok(Self {
            key,
            db_session: Arc::new(session),
            ps: Arc::new(ps),
        })
    }
}

/// Splits a CQL script into individual statements, dropping blanks.
fn schema_statements(schema: &str) -> Vec<String> {
    schema
        .trim()
        .replace('\n', " ")
        .split(';')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("{};", q))
        .collect()
}

#[async_trait]
impl EventStore for ScyllaDbService {
    async fn append_event(&self, event: &VisitEvent) -> Result<(), anyhow::Error> {
        let now = Instant::now();
        let row = VisitRow::from_event(&self.key, event)?;
        let result = self.db_session.execute(&self.ps, row).await?;
        debug!("append_event: Query Result: {:?}", result);
        debug!("ScyllaDbService: append_event took {:.2?}", now.elapsed());
        Ok(())
    }
}
