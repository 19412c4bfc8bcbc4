//! reqwest client for the Encore instance and job APIs.

use std::path::Path;

use async_trait::async_trait;
use autoabr_core::config::EncoreBackendConfig;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use super::{EncoreApi, EncoreInstance, EncoreJob, EncoreJobRequest};
use crate::error::{ExecError, Result};

const AUTH_HEADER: &str = "x-jwt";

pub struct EncoreHttp {
    client: Client,
    api_address: String,
    token: String,
    instance_id: String,
    profiles_url: String,
}

#[derive(Deserialize)]
struct JobList {
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedJobs>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddedJobs {
    #[serde(default)]
    encore_jobs: Vec<EncoreJob>,
}

#[derive(Deserialize)]
struct CreatedJob {
    id: String,
}

fn request_error(e: reqwest::Error) -> ExecError {
    ExecError::JobService(e.to_string())
}

async fn expect_status(response: reqwest::Response, expected: &[StatusCode], what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if expected.contains(&status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ExecError::JobService(format!("{what} returned {status}: {body}")))
}

impl EncoreHttp {
    pub fn new(cfg: &EncoreBackendConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ExecError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_address: cfg.api_address.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            instance_id: cfg.instance_id.clone(),
            profiles_url: cfg.profiles_url.clone(),
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

#[async_trait]
impl EncoreApi for EncoreHttp {
    async fn create_instance(&self) -> Result<EncoreInstance> {
        let response = self
            .client
            .post(format!("{}/encoreinstance", self.api_address))
            .header(AUTH_HEADER, self.bearer())
            .json(&json!({ "name": self.instance_id, "profilesUrl": self.profiles_url }))
            .send()
            .await
            .map_err(request_error)?;
        expect_status(response, &[StatusCode::OK, StatusCode::CREATED], "instance creation")
            .await?
            .json()
            .await
            .map_err(request_error)
    }

    async fn enqueue(&self, instance: &EncoreInstance, request: &EncoreJobRequest) -> Result<String> {
        let response = self
            .client
            .post(&instance.resources.enqueue_job.url)
            .header(AUTH_HEADER, self.bearer())
            .json(request)
            .send()
            .await
            .map_err(request_error)?;
        let created: CreatedJob = expect_status(response, &[StatusCode::OK, StatusCode::CREATED], "job submission")
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(created.id)
    }

    async fn job(&self, instance: &EncoreInstance, job_id: &str) -> Result<Option<EncoreJob>> {
        let response = self
            .client
            .get(&instance.resources.list_jobs.url)
            .header(AUTH_HEADER, self.bearer())
            .send()
            .await
            .map_err(request_error)?;
        let list: JobList = expect_status(response, &[StatusCode::OK], "job listing")
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(list
            .embedded
            .into_iter()
            .flat_map(|e| e.encore_jobs)
            .find(|job| job.id == job_id))
    }

    async fn download(&self, url: &str, target: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, self.bearer())
            .send()
            .await
            .map_err(request_error)?;
        let response = expect_status(response, &[StatusCode::OK], "download").await?;
        let mut file = tokio::fs::File::create(target).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk.map_err(request_error)?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete_instance(&self, instance: &EncoreInstance) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/encoreinstance/{}", self.api_address, instance.name))
            .header(AUTH_HEADER, self.bearer())
            .send()
            .await
            .map_err(request_error)?;
        expect_status(response, &[StatusCode::OK, StatusCode::NO_CONTENT], "instance deletion").await?;
        Ok(())
    }
}
