use std::path::PathBuf;

use axum::async_trait;
use log::info;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::data::visit_model::VisitEvent;

use super::EventStore;

/// Development sink: the list name is mapped to `<dir>/<key>.jsonl` and every
/// record is appended as one JSON line.
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub async fn init(dir: &str, key: &str) -> Result<Self, anyhow::Error> {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            return Err(anyhow::Error::msg(format!(
                "Error creating store dir {}: {}",
                dir, e
            )));
        }
        let path = PathBuf::from(dir).join(format!("{}.jsonl", key));
        info!("initialized local store; file: {}", path.display());
        Ok(Self { path })
    }
}

#[async_trait]
impl EventStore for LocalStore {
    async fn append_event(&self, event: &VisitEvent) -> Result<(), anyhow::Error> {
        let mut line = event.to_json()?;
        line.push('\n');
        let mut file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(e) => return Err(anyhow::Error::msg(format!("Error opening file: {}", e))),
        };
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use serde_json::Value;
    use tempfile::tempdir;

    use crate::data::visit_model::ClientEventType;

    use super::*;

    #[tokio::test]
    async fn test_append_writes_json_lines() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("store");
        let store = LocalStore::init(nested.to_str().unwrap(), "visits")
            .await
            .unwrap();

        store
            .append_event(&VisitEvent::page_visit("/about", &HeaderMap::new()))
            .await
            .unwrap();
        store
            .append_event(&VisitEvent::client_event(
                ClientEventType::LspClick,
                &HeaderMap::new(),
            ))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(nested.join("visits.jsonl")).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["path"], "/about");
        assert_eq!(lines[1]["type"], "lsp_click");
    }
}
