// src/nomad/client.rs

//! HTTP implementation of [`NomadApi`] on top of `reqwest`.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::EngineError;
use super::api::{ApiFuture, EventSubscription, NomadApi, StreamError, StreamItem};
use super::events::{LineDecoder, decode_frame};
use super::model::{Allocation, AllocationList, AllocationStub, Job, RegisterResponse};
use crate::config::{NomadSection, StreamSection};

/// Header carrying the Raft index a read was served at.
const INDEX_HEADER: &str = "X-Nomad-Index";

const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Nomad's message when `EnforceIndex` rejects a register.
const CONFLICT_MARKER: &str = "modify index";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegisterRequest<'a> {
    job: &'a Job,
    enforce_index: bool,
    job_modify_index: u64,
}

/// Nomad API client.
#[derive(Clone)]
pub struct NomadClient {
    http: Client,
    /// Separate client without a total timeout, for long-lived streams.
    stream_http: Client,
    address: String,
    token: Option<String>,
    namespace: Option<String>,
    region: Option<String>,
    buffer: usize,
}

impl fmt::Debug for NomadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NomadClient")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl NomadClient {
    pub fn new(nomad: &NomadSection, stream: &StreamSection) -> Result<Self, EngineError> {
        let timeout = Duration::from_secs(nomad.timeout_secs);

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nomad-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let stream_http = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("nomad-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            stream_http,
            address: nomad.address.trim_end_matches('/').to_string(),
            token: nomad.token.clone(),
            namespace: nomad.namespace.clone(),
            region: nomad.region.clone(),
            buffer: stream.buffer,
        })
    }

    fn request(&self, client: &Client, method: Method, path: &str) -> RequestBuilder {
        let mut req = client.request(method, format!("{}{}", self.address, path));

        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.namespace {
            req = req.query(&[("namespace", namespace)]);
        }
        if let Some(region) = &self.region {
            req = req.query(&[("region", region)]);
        }

        req
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<(T, Option<u64>), EngineError> {
        let resp = check_status(req.send().await?).await?;

        let index = resp
            .headers()
            .get(INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = resp.json::<T>().await?;
        Ok((body, index))
    }
}

async fn check_status(resp: Response) -> Result<Response, EngineError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(EngineError::Status {
        code: status.as_u16(),
        body: body.trim().to_string(),
    })
}

/// Pump the streaming response body into `tx` until it ends or the
/// receiver goes away.
async fn read_stream(mut resp: Response, tx: mpsc::Sender<StreamItem>) {
    let mut decoder = LineDecoder::new();

    loop {
        let chunk = match resp.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                let _ = tx.send(Err(StreamError::Transport(err.to_string()))).await;
                return;
            }
        };

        for line in decoder.push(&chunk) {
            if !forward_line(&line, &tx).await {
                return;
            }
        }
    }

    if let Some(rest) = decoder.finish() {
        forward_line(&rest, &tx).await;
    }

    debug!("event stream body ended");
}

/// Returns `false` once the receiver is gone.
async fn forward_line(line: &[u8], tx: &mpsc::Sender<StreamItem>) -> bool {
    match decode_frame(line) {
        Ok(Some(batch)) => tx.send(Ok(batch)).await.is_ok(),
        Ok(None) => true,
        Err(err) => tx.send(Err(err)).await.is_ok(),
    }
}

impl NomadApi for NomadClient {
    fn job_info<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, Job> {
        Box::pin(async move {
            let req = self.request(&self.http, Method::GET, &format!("/v1/job/{job_id}"));
            let (job, _) = self.get_json::<Job>(req).await?;
            Ok(job)
        })
    }

    fn job_allocations<'a>(&'a self, job_id: &'a str) -> ApiFuture<'a, AllocationList> {
        Box::pin(async move {
            let req = self
                .request(
                    &self.http,
                    Method::GET,
                    &format!("/v1/job/{job_id}/allocations"),
                )
                .query(&[("all", "true")]);
            let (allocations, index) = self.get_json::<Vec<AllocationStub>>(req).await?;

            Ok(AllocationList {
                allocations,
                last_index: index.unwrap_or_default(),
            })
        })
    }

    fn allocation_info<'a>(&'a self, alloc_id: &'a str) -> ApiFuture<'a, Allocation> {
        Box::pin(async move {
            let req = self.request(
                &self.http,
                Method::GET,
                &format!("/v1/allocation/{alloc_id}"),
            );
            let (alloc, _) = self.get_json::<Allocation>(req).await?;
            Ok(alloc)
        })
    }

    fn register_job<'a>(
        &'a self,
        job: &'a Job,
        modify_index: u64,
    ) -> ApiFuture<'a, RegisterResponse> {
        Box::pin(async move {
            let body = RegisterRequest {
                job,
                enforce_index: true,
                job_modify_index: modify_index,
            };

            let req = self
                .request(&self.http, Method::POST, &format!("/v1/job/{}", job.id))
                .json(&body);

            match self.get_json::<RegisterResponse>(req).await {
                Ok((resp, _)) => Ok(resp),
                Err(EngineError::Status { body, .. }) if body.contains(CONFLICT_MARKER) => {
                    Err(EngineError::Conflict(body))
                }
                Err(err) => Err(err),
            }
        })
    }

    fn event_stream<'a>(
        &'a self,
        job_id: &'a str,
        index: u64,
    ) -> ApiFuture<'a, EventSubscription> {
        Box::pin(async move {
            let req = self
                .request(&self.stream_http, Method::GET, "/v1/event/stream")
                .query(&[
                    ("topic", format!("Allocation:{job_id}")),
                    ("index", index.to_string()),
                ]);

            let resp = check_status(req.send().await?).await?;

            let (tx, rx) = mpsc::channel(self.buffer);
            let reader = tokio::spawn(async move {
                read_stream(resp, tx).await;
            });

            if index == 0 {
                warn!(job_id, "subscribing to event stream from index 0");
            }

            Ok(EventSubscription::new(rx, reader))
        })
    }
}
