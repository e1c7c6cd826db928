use async_trait::async_trait;
use dispense_types::{
    AddOperationRequest, CreateBatchRequest, DispenseBatch, DispenseOperation, DispenseRequest,
    ErrorResponse, OperationStatus, Plate, Reagent, Well,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{ClientError, DispenseApi, PlateApi, ReagentApi};

/// reqwest-backed client for all backend resources
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            client: reqwest::Client::new(),
        }
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            base_url: normalize_base_url(base_url.into()),
            client,
        })
    }

    /// Create client for a backend on the local machine
    pub fn local() -> Self {
        Self::new("http://localhost:8080")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `path` followed by one percent-encoded path segment
    fn url_with_segment(&self, path: &str, segment: &str) -> Result<String, ClientError> {
        let mut url = reqwest::Url::parse(&self.url(path))
            .map_err(|e| ClientError::Config(format!("invalid url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("{} cannot be a base url", self.base_url)))?
            .push(segment);
        Ok(url.into())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.get_url(self.url(path)).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: String) -> Result<T, ClientError> {
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        decode(response).await
    }

    async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(%url, "PUT");
        let response = self.client.put(&url).json(body).send().await?;
        decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let url = self.url(path);
        debug!(%url, "DELETE");
        let response = self.client.delete(&url).send().await?;
        check_status(response).await.map(|_| ())
    }
}

fn normalize_base_url(mut base_url: String) -> String {
    while base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(status.as_u16(), &body);
    warn!(status = status.as_u16(), %message, "backend returned an error");

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

/// Prefer the backend's `ErrorResponse.message`; fall back to the raw body.
fn api_error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => error.message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => format!("request failed with status {status}"),
    }
}

#[async_trait]
impl DispenseApi for HttpBackend {
    async fn history(&self) -> Result<Vec<DispenseOperation>, ClientError> {
        self.get("/api/dispense/history").await
    }

    async fn operation(&self, id: i64) -> Result<DispenseOperation, ClientError> {
        self.get(&format!("/api/dispense/{id}")).await
    }

    async fn operations_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<DispenseOperation>, ClientError> {
        self.get(&format!("/api/dispense/status/{}", status.as_str()))
            .await
    }

    async fn create_operation(
        &self,
        request: &DispenseRequest,
    ) -> Result<DispenseOperation, ClientError> {
        self.post("/api/dispense", request).await
    }

    async fn execute_operation(&self, id: i64) -> Result<DispenseOperation, ClientError> {
        self.post(&format!("/api/dispense/{id}/execute"), &serde_json::json!({}))
            .await
    }

    async fn create_batch(
        &self,
        request: &CreateBatchRequest,
    ) -> Result<DispenseBatch, ClientError> {
        self.post("/api/dispense/batch", request).await
    }

    async fn add_operation_to_batch(
        &self,
        batch_id: i64,
        request: &AddOperationRequest,
    ) -> Result<DispenseBatch, ClientError> {
        self.post(
            &format!("/api/dispense/batch/{batch_id}/add-operation"),
            request,
        )
        .await
    }

    async fn execute_batch(&self, batch_id: i64) -> Result<DispenseBatch, ClientError> {
        self.post(
            &format!("/api/dispense/batch/{batch_id}/execute"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn batch(&self, batch_id: i64) -> Result<DispenseBatch, ClientError> {
        self.get(&format!("/api/dispense/batch/{batch_id}")).await
    }

    async fn batches(&self) -> Result<Vec<DispenseBatch>, ClientError> {
        self.get("/api/dispense/batch").await
    }
}

#[async_trait]
impl PlateApi for HttpBackend {
    async fn plates(&self) -> Result<Vec<Plate>, ClientError> {
        self.get("/api/plates").await
    }

    async fn plate(&self, id: i64) -> Result<Plate, ClientError> {
        self.get(&format!("/api/plates/{id}")).await
    }

    async fn plate_by_barcode(&self, barcode: &str) -> Result<Plate, ClientError> {
        let url = self.url_with_segment("/api/plates/barcode", barcode)?;
        self.get_url(url).await
    }

    async fn wells(&self, plate_id: i64) -> Result<Vec<Well>, ClientError> {
        self.get(&format!("/api/plates/{plate_id}/wells")).await
    }

    async fn create_plate(&self, plate: &Plate) -> Result<Plate, ClientError> {
        self.post("/api/plates", plate).await
    }

    async fn update_plate(&self, id: i64, plate: &Plate) -> Result<Plate, ClientError> {
        self.put(&format!("/api/plates/{id}"), plate).await
    }

    async fn delete_plate(&self, id: i64) -> Result<(), ClientError> {
        self.delete(&format!("/api/plates/{id}")).await
    }
}

#[async_trait]
impl ReagentApi for HttpBackend {
    async fn reagents(&self) -> Result<Vec<Reagent>, ClientError> {
        self.get("/api/reagents").await
    }

    async fn reagent(&self, id: i64) -> Result<Reagent, ClientError> {
        self.get(&format!("/api/reagents/{id}")).await
    }

    async fn create_reagent(&self, reagent: &Reagent) -> Result<Reagent, ClientError> {
        self.post("/api/reagents", reagent).await
    }

    async fn update_reagent(&self, id: i64, reagent: &Reagent) -> Result<Reagent, ClientError> {
        self.put(&format!("/api/reagents/{id}"), reagent).await
    }

    async fn delete_reagent(&self, id: i64) -> Result<(), ClientError> {
        self.delete(&format!("/api/reagents/{id}")).await
    }
}
