// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inference Client
//!
//! JSON-over-HTTP adapter for the classification / embedding service.
//!
//! | Route | Request | Response |
//! |-------|---------|----------|
//! | `POST /predict` | `{message, return_embedding}` | `{label, embedding}` |
//! | `POST /embed` | `{message}` | `{embedding}` |
//!
//! Labels are the integer codes 0 (no memory), 1 (short-term), 2 (long-term).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::inference::{InferenceError, InferenceGateway, Prediction};
use crate::domain::memory::Label;

pub struct HttpInferenceClient {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    message: &'a str,
    return_embedding: bool,
}

#[derive(Deserialize)]
struct PredictResponse {
    label: i64,
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl HttpInferenceClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), route)
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        route: &str,
        body: &Req,
    ) -> Result<Resp, InferenceError> {
        let response = self
            .client
            .post(self.url(route))
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Service(format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Response(e.to_string()))
    }
}

#[async_trait]
impl InferenceGateway for HttpInferenceClient {
    async fn predict(&self, text: &str, with_embedding: bool) -> Result<Prediction, InferenceError> {
        let response: PredictResponse = self
            .post(
                "predict",
                &PredictRequest {
                    message: text,
                    return_embedding: with_embedding,
                },
            )
            .await?;

        let label = match response.label {
            0 => Label::NoMemory,
            1 => Label::ShortTerm,
            2 => Label::LongTerm,
            other => return Err(InferenceError::UnexpectedLabel(other)),
        };

        let embedding = if with_embedding {
            if response.embedding.is_empty() {
                return Err(InferenceError::Response("prediction is missing its embedding".to_string()));
            }
            Some(response.embedding)
        } else {
            None
        };

        Ok(Prediction { label, embedding })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let response: EmbedResponse = self.post("embed", &EmbedRequest { message: text }).await?;
        if response.embedding.is_empty() {
            return Err(InferenceError::Response("empty embedding".to_string()));
        }
        Ok(response.embedding)
    }
}
