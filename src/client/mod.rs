//! Client driver: `upload` and `download`, each built on top of the
//! master's allocation/lease endpoints and the chunk servers' write and
//! read endpoints.

use std::time::Duration;

use crate::config::{ClientConfig, CommonConfig};
use crate::error::ClientError;
use crate::httpclient::{self, HttpClient};
use crate::wire::*;

pub struct Client {
    http: HttpClient,
    config: ClientConfig,
    common: CommonConfig,
}

impl Client {
    pub fn new(config: ClientConfig, common: CommonConfig) -> Self {
        Self {
            http: httpclient::new_client(),
            config,
            common,
        }
    }

    fn master_url(&self, path: &str) -> String {
        format!("http://{}{}", self.config.master_addr, path)
    }

    async fn allocate(&self, file: &str, size_bytes: u64) -> Result<AllocateResponse, ClientError> {
        httpclient::post_json(
            &self.http,
            &self.master_url("/allocate"),
            &AllocateRequest {
                file: file.to_string(),
                size_bytes,
            },
            Duration::from_secs(self.common.apply_write_timeout),
        )
        .await
        .map_err(|e| ClientError::Master(e.to_string()))
    }

    async fn get_primary(&self, chunk_id: &str) -> Result<PrimaryResponse, ClientError> {
        httpclient::post_json(
            &self.http,
            &self.master_url("/get_primary"),
            &PrimaryRequest {
                chunk_id: chunk_id.to_string(),
                preferred: None,
            },
            Duration::from_secs(self.common.apply_write_timeout),
        )
        .await
        .map_err(|e| ClientError::Master(e.to_string()))
    }

    async fn assign_primary(&self, chunk_id: &str) -> Result<PrimaryResponse, ClientError> {
        httpclient::post_json(
            &self.http,
            &self.master_url("/assign_primary"),
            &PrimaryRequest {
                chunk_id: chunk_id.to_string(),
                preferred: None,
            },
            Duration::from_secs(self.common.apply_write_timeout),
        )
        .await
        .map_err(|e| ClientError::Master(e.to_string()))
    }

    async fn write_primary(&self, primary: &str, chunk_id: &str, data: &[u8]) -> Result<(), ClientError> {
        let resp: SeqResponse = httpclient::post_json(
            &self.http,
            &format!("http://{}/write_primary", primary),
            &WritePrimaryRequest {
                chunk_id: chunk_id.to_string(),
                data: data.to_vec(),
                req_id: None,
            },
            Duration::from_secs(self.common.apply_write_timeout),
        )
        .await
        .map_err(|e| ClientError::ChunkServer(e.to_string()))?;

        if resp.status != "ok" {
            return Err(ClientError::ChunkServer(format!(
                "write_primary returned status '{}'",
                resp.status
            )));
        }
        Ok(())
    }

    /// Allocates chunks for `file_name`, then writes each slice to its
    /// primary, retrying once after a fresh `assign_primary` on failure.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<String>, ClientError> {
        let plan = self.allocate(file_name, bytes.len() as u64).await?;
        let chunk_size = self.common.chunk_size as usize;

        for (i, chunk_id) in plan.chunk_ids.iter().enumerate() {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(bytes.len());
            let slice = &bytes[start..end];

            let primary = self.get_primary(chunk_id).await?;
            let mut primary_addr = if primary.primary.is_empty() {
                self.assign_primary(chunk_id).await?.primary
            } else {
                primary.primary
            };

            if let Err(e) = self.write_primary(&primary_addr, chunk_id, slice).await {
                tracing::warn!(
                    "write_primary failed for chunk '{}' ({}), refreshing primary and retrying",
                    chunk_id,
                    e
                );
                primary_addr = self.assign_primary(chunk_id).await?.primary;
                self.write_primary(&primary_addr, chunk_id, slice).await?;
            }
        }

        Ok(plan.chunk_ids)
    }

    /// Downloads and concatenates the bytes for `chunk_ids`, trying each
    /// replica of a chunk in order until one responds 200.
    pub async fn download(&self, chunk_ids: &[String]) -> Result<Vec<u8>, ClientError> {
        let mut out = Vec::new();
        for chunk_id in chunk_ids {
            let locations: ChunkLocationsResponse = httpclient::post_json(
                &self.http,
                &self.master_url("/chunk_locations"),
                &ChunkLocationsRequest {
                    chunk_id: chunk_id.clone(),
                },
                Duration::from_secs(self.common.apply_write_timeout),
            )
            .await
            .map_err(|e| ClientError::Master(e.to_string()))?;

            let mut fetched = None;
            for replica in &locations.locations {
                let url = format!("http://{}/read_chunk?chunk_id={}", replica, chunk_id);
                match httpclient::get_raw(&self.http, &url, Duration::from_secs(self.common.apply_write_timeout))
                    .await
                {
                    Ok((status, body)) if status == hyper::StatusCode::OK => {
                        fetched = Some(body.to_vec());
                        break;
                    }
                    Ok(_) => continue,
                    Err(_) => continue,
                }
            }

            match fetched {
                Some(data) => out.extend(data),
                None => return Err(ClientError::AllReplicasFailed(chunk_id.clone())),
            }
        }
        Ok(out)
    }
}
