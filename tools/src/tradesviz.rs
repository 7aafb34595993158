//! HTTP client for the TradesViz import API.

use async_trait::async_trait;
use payout_core::{
    error::{DeskError, DeskResult},
    import::{ImportStatus, TradeImportApi, UploadFile, UploadReceipt},
};
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
    redirect::Policy,
    Client,
};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TradesVizClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl TradesVizClient {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        // Redirects lead to HTML login pages, never to JSON.
        let http = Client::builder()
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn auth(&self) -> String {
        format!("Token {}", self.api_key)
    }
}

fn transport(e: reqwest::Error) -> DeskError {
    DeskError::ImportService(e.to_string())
}

#[async_trait]
impl TradeImportApi for TradesVizClient {
    async fn upload(&self, file: &UploadFile) -> DeskResult<UploadReceipt> {
        let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        let form = Form::new()
            .part("file", part)
            .text("broker", "tradovate")
            .text("import_type", "trades");

        let text = self
            .http
            .post(format!("{}/v1/import/trades/broker/", self.base_url))
            .header(AUTHORIZATION, self.auth())
            .multipart(form)
            .send()
            .await
            .map_err(transport)?
            .text()
            .await
            .map_err(transport)?;

        match serde_json::from_str(&text) {
            Ok(receipt) => Ok(receipt),
            Err(_) => Err(DeskError::NonJsonResponse { raw: text }),
        }
    }

    async fn status(&self, import_id: &str) -> DeskResult<ImportStatus> {
        self.http
            .get(format!("{}/v1/import/trades/status/{import_id}/", self.base_url))
            .header(AUTHORIZATION, self.auth())
            .send()
            .await
            .map_err(transport)?
            .json::<ImportStatus>()
            .await
            .map_err(transport)
    }

    async fn export_csv(&self) -> DeskResult<String> {
        let body = serde_json::json!({
            "include_mae_mfe": true,
            "include_positions": true,
            "include_risk": true,
            "include_exits": true,
        });
        let response = self
            .http
            .post(format!("{}/v1/export/trades/csv/", self.base_url))
            .header(AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(DeskError::ImportService(format!(
                "export returned HTTP {}",
                response.status()
            )));
        }
        response.text().await.map_err(transport)
    }
}
