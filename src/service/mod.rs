use std::sync::Arc;

use axum::async_trait;
use log::info;
#[cfg(test)]
use mockall::automock;

use crate::app_config::{Conf, BACKEND_LOCAL, BACKEND_SCYLLA, BACKEND_UPSTASH};
use crate::data::visit_model::VisitEvent;
use crate::db::scylladb::ScyllaDbService;

pub mod local;
pub mod upstash;

use local::LocalStore;
use upstash::UpstashStore;

/// Append-only sink for visit records. Implementations push each record to
/// the head of the configured list; nothing is ever read back or updated.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_event(&self, event: &VisitEvent) -> Result<(), anyhow::Error>;
}

/// Builds the store selected by `store_backend`. Expects a validated [`Conf`].
pub async fn init_store(conf: &Conf) -> Result<Arc<dyn EventStore>, anyhow::Error> {
    let store: Arc<dyn EventStore> = match conf.store_backend.as_str() {
        BACKEND_UPSTASH => {
            info!("Using upstash event store");
            Arc::new(UpstashStore::init(
                conf.upstash_redis_rest_url.clone().unwrap_or_default(),
                conf.upstash_redis_rest_token.clone().unwrap_or_default(),
                conf.visits_key.clone(),
            ))
        }
        BACKEND_SCYLLA => {
            info!("Using scylla event store");
            Arc::new(
                ScyllaDbService::new(
                    conf.db_dc.clone().unwrap_or_default(),
                    conf.db_url.clone().unwrap_or_default(),
                    conf.schema_file.clone(),
                    conf.visits_key.clone(),
                )
                .await?,
            )
        }
        BACKEND_LOCAL => {
            info!("Using local event store");
            Arc::new(LocalStore::init(&conf.local_store_dir, &conf.visits_key).await?)
        }
        other => anyhow::bail!("unknown store_backend: {}", other),
    };
    Ok(store)
}
