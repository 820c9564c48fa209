use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::{Dataset, DatasetQuery, Project, Sample, SampleQuery, Thumbnail};
use crate::error::CrucibleError;

pub const DEFAULT_API_URL: &str = "https://crucible.lbl.gov/testapi";

/// Read-only view of the Crucible service.
///
/// Every call is an independent round trip and may fail on its own; callers
/// decide whether a failure is absorbed or propagated.
pub trait CrucibleClient: Send + Sync {
    fn list_projects(&self, owner: Option<&str>) -> Result<Vec<Project>, CrucibleError>;
    fn list_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>, CrucibleError>;
    fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<Dataset>, CrucibleError>;
    fn list_children_of_sample(&self, sample_id: &str) -> Result<Vec<Sample>, CrucibleError>;
    fn list_parents_of_sample(&self, sample_id: &str) -> Result<Vec<Sample>, CrucibleError>;
    fn get_sample(&self, sample_id: &str) -> Result<Sample, CrucibleError>;
    fn get_dataset(
        &self,
        dataset_id: &str,
        include_metadata: bool,
    ) -> Result<Dataset, CrucibleError>;
    fn get_scientific_metadata(&self, dataset_id: &str) -> Result<Value, CrucibleError>;
    fn get_thumbnails(&self, dataset_id: &str) -> Result<Vec<Thumbnail>, CrucibleError>;
}

#[derive(Clone)]
pub struct CrucibleHttpClient {
    client: Client,
    base_url: String,
}

impl CrucibleHttpClient {
    pub fn new(base_url: &str) -> Result<Self, CrucibleError> {
        let api_key = std::env::var("CRUCIBLE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(CrucibleError::MissingApiKey)?;
        Self::with_api_key(base_url, api_key.trim())
    }

    pub fn with_api_key(base_url: &str, api_key: &str) -> Result<Self, CrucibleError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("crucible-graph/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CrucibleError::CrucibleHttp(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|err| CrucibleError::CrucibleHttp(err.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CrucibleError::CrucibleHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn handle_status(response: Response) -> Result<Response, CrucibleError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Crucible request failed".to_string());
        if matches!(status, 401 | 403) {
            return Err(CrucibleError::AccessDenied { status, message });
        }
        Err(CrucibleError::CrucibleStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, CrucibleError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying Crucible request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(error = %err, attempt, "retrying Crucible request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(CrucibleError::CrucibleHttp(err.to_string()));
                }
            }
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CrucibleError> {
        let url = self.url(path);
        let response = self.send_with_retries(|| self.client.get(&url).query(query))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| CrucibleError::MalformedResponse(format!("{url}: {err}")))
    }
}

impl CrucibleClient for CrucibleHttpClient {
    fn list_projects(&self, owner: Option<&str>) -> Result<Vec<Project>, CrucibleError> {
        let query = owner
            .map(|owner| vec![("owner_orcid", owner)])
            .unwrap_or_default();
        self.get_json("projects", &query)
    }

    fn list_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>, CrucibleError> {
        self.get_json("samples", &query.pairs())
    }

    fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<Dataset>, CrucibleError> {
        self.get_json("datasets", &query.pairs())
    }

    fn list_children_of_sample(&self, sample_id: &str) -> Result<Vec<Sample>, CrucibleError> {
        self.get_json(&format!("samples/{sample_id}/children"), &[])
    }

    fn list_parents_of_sample(&self, sample_id: &str) -> Result<Vec<Sample>, CrucibleError> {
        self.get_json(&format!("samples/{sample_id}/parents"), &[])
    }

    fn get_sample(&self, sample_id: &str) -> Result<Sample, CrucibleError> {
        self.get_json(&format!("samples/{sample_id}"), &[])
    }

    fn get_dataset(
        &self,
        dataset_id: &str,
        include_metadata: bool,
    ) -> Result<Dataset, CrucibleError> {
        let query: &[(&str, &str)] = if include_metadata {
            &[("include_metadata", "true")]
        } else {
            &[]
        };
        let mut dataset: Dataset = self.get_json(&format!("datasets/{dataset_id}"), query)?;
        dataset.normalize_metadata();
        Ok(dataset)
    }

    fn get_scientific_metadata(&self, dataset_id: &str) -> Result<Value, CrucibleError> {
        self.get_json(&format!("datasets/{dataset_id}/scientific_metadata"), &[])
    }

    fn get_thumbnails(&self, dataset_id: &str) -> Result<Vec<Thumbnail>, CrucibleError> {
        self.get_json(&format!("datasets/{dataset_id}/thumbnails"), &[])
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
