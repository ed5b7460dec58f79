#![cfg(feature = "nats")]

use anyhow::Result;
use async_nats::Client;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::NatsConfig;
use crate::error::Fault;
use crate::service::IngestionService;
use crate::types::{Sample, SessionId, SessionMetadata};

#[derive(Debug, Deserialize, Serialize)]
pub struct PushRequest {
    pub session_id: SessionId,
    pub sample: Sample,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EndRequest {
    pub session_id: SessionId,
}

/// Reply body: `{"ok": value}` or `{"fault": {"kind": ..., "message": ...}}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply<T> {
    Ok(T),
    Fault(Fault),
}

impl<T> From<Result<T, Fault>> for Reply<T> {
    fn from(result: Result<T, Fault>) -> Self {
        match result {
            Ok(v) => Reply::Ok(v),
            Err(f) => Reply::Fault(f),
        }
    }
}

pub fn subject(prefix: &str, op: &str) -> String {
    format!("{}.session.{}", prefix, op)
}

pub async fn connect(config: &NatsConfig) -> Result<Client> {
    let client = if let Some(ref cred) = config.credential_file {
        async_nats::ConnectOptions::with_credentials_file(std::path::PathBuf::from(cred))
            .await?
            .connect(&config.url)
            .await?
    } else if let Some(ref token) = config.token {
        async_nats::ConnectOptions::with_token(token.clone())
            .connect(&config.url)
            .await?
    } else {
        async_nats::connect(&config.url).await?
    };

    info!(url = %config.url, "Connected to NATS");
    Ok(client)
}

/// Start request-reply handlers for the start, push and end operations
pub fn start_handlers(client: Client, prefix: &str, service: IngestionService) -> Vec<JoinHandle<()>> {
    vec![
        spawn_handler(client.clone(), subject(prefix, "start"), service.clone(), |svc, meta: SessionMetadata| {
            svc.start_session(&meta)
        }),
        spawn_handler(client.clone(), subject(prefix, "push"), service.clone(), |svc, req: PushRequest| {
            svc.push_sample(&req.session_id, &req.sample)
        }),
        spawn_handler(client, subject(prefix, "end"), service, |svc, req: EndRequest| {
            svc.end_session(&req.session_id)
        }),
    ]
}

/// Decode a request body and run the operation off the async runtime
async fn handle<Req, Resp, F>(service: IngestionService, payload: &[u8], op: F) -> Result<Resp, Fault>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Send + 'static,
    F: Fn(&IngestionService, Req) -> Result<Resp, Fault> + Send + 'static,
{
    let req = serde_json::from_slice::<Req>(payload)
        .map_err(|e| Fault::data_format(format!("Malformed request: {}", e)))?;

    tokio::task::spawn_blocking(move || op(&service, req))
        .await
        .map_err(|e| Fault::data_format(format!("Request handler failed: {}", e)))?
}

fn spawn_handler<Req, Resp, F>(
    client: Client,
    subject: String,
    service: IngestionService,
    op: F,
) -> JoinHandle<()>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(&IngestionService, Req) -> Result<Resp, Fault> + Copy + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut sub = match client.subscribe(subject.clone()).await {
            Ok(s) => s,
            Err(e) => { error!(error=%e, subject=%subject, "Failed to subscribe"); return; }
        };
        info!(subject=%subject, "Listening for requests");

        while let Some(msg) = sub.next().await {
            let client = client.clone();
            let service = service.clone();
            tokio::spawn(async move {
                let result = handle(service, &msg.payload, op).await;
                if let Err(ref fault) = result {
                    debug!(subject=%msg.subject, fault=%fault, "Request faulted");
                }
                let payload = match serde_json::to_vec(&Reply::from(result)) {
                    Ok(p) => p,
                    Err(e) => { error!(error=%e, "Failed to serialize reply"); return; }
                };
                if let Some(reply) = msg.reply {
                    if let Err(e) = client.publish(reply, payload.into()).await {
                        error!(error=%e, "Failed to publish reply");
                    }
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_shapes() {
        let ok = serde_json::to_value(Reply::from(Ok::<_, Fault>(true))).unwrap();
        assert_eq!(ok, serde_json::json!({ "ok": true }));

        let fault = serde_json::to_value(Reply::<bool>::from(Err(Fault::validation("Invalid date")))).unwrap();
        assert_eq!(
            fault,
            serde_json::json!({ "fault": { "kind": "validation", "message": "Invalid date" } })
        );
    }

    #[test]
    fn push_request_decodes_without_date() {
        let req: PushRequest = serde_json::from_str(
            r#"{"session_id":"S_20240101_000000","sample":{"t":1,"tpot":2,"tdew":3,"sh":4,"rh":5}}"#,
        )
        .unwrap();
        assert_eq!(req.session_id.as_str(), "S_20240101_000000");
        assert_eq!(req.sample.date, crate::types::unset_date());
    }

    #[test]
    fn subjects_are_prefixed() {
        assert_eq!(subject("weather", "push"), "weather.session.push");
    }
}
