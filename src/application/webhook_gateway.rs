use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use log::{error, info, warn};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::ports::WebhookLogRepository;
use crate::domain::webhook::{Claim, WebhookEnvelope, WebhookLog};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing webhook signature")]
    MissingSignature,
    #[error("webhook signature mismatch")]
    InvalidSignature,
    #[error(transparent)]
    Handler(#[from] DomainError),
}

/// What became of a delivery that passed signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Processed,
    Duplicate,
    /// The handler refused the event for a business reason. The platform
    /// still gets a success so it stops redelivering.
    Declined(String),
}

/// Check the base64 HMAC-SHA256 of the raw body in constant time.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::MissingSignature)?;
    let expected = STANDARD
        .decode(signature)
        .map_err(|_| WebhookError::InvalidSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| WebhookError::InvalidSignature)
}

/// Signature check, delivery log and dedup in front of every webhook handler.
#[derive(Clone)]
pub struct WebhookGateway {
    logs: Arc<dyn WebhookLogRepository>,
}

impl WebhookGateway {
    pub fn new(logs: Arc<dyn WebhookLogRepository>) -> Self {
        Self { logs }
    }

    /// Run `handler` at most once per event id.
    ///
    /// The log row records the status the platform was answered with:
    /// 200 for processed or declined events, 401 for rejected platform
    /// credentials and 500 for failures worth a redelivery. Rows with an
    /// error status are re-claimed by the next delivery of the same id.
    pub fn receive<F>(
        &self,
        secret: &str,
        signature: Option<&str>,
        body: &[u8],
        envelope: &WebhookEnvelope,
        handler: F,
    ) -> Result<Delivery, WebhookError>
    where
        F: FnOnce() -> Result<(), DomainError>,
    {
        if let Err(e) = verify_signature(secret, body, signature) {
            warn!(
                "webhook {} from {:?} rejected: {}",
                envelope.topic.as_str(),
                envelope.shop_domain,
                e
            );
            return Err(e);
        }

        let log_id = match self.logs.claim(&WebhookLog::start(envelope))? {
            Claim::Started(id) => id,
            Claim::Duplicate => {
                info!(
                    "webhook {:?} ({}) already delivered, skipping",
                    envelope.webhook_id,
                    envelope.topic.as_str()
                );
                return Ok(Delivery::Duplicate);
            }
        };

        let started = Instant::now();
        let result = handler();
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let label = envelope.webhook_id.as_deref().unwrap_or("-");

        match result {
            Ok(()) => {
                self.finish(log_id, 200, duration_ms, None);
                info!("webhook {label} ({}) processed in {duration_ms}ms", envelope.topic.as_str());
                Ok(Delivery::Processed)
            }
            Err(DomainError::DuplicateEvent(id)) => {
                self.finish(log_id, 200, duration_ms, None);
                info!("webhook {label}: event {id} already processed");
                Ok(Delivery::Duplicate)
            }
            Err(e @ DomainError::Authentication(_)) => {
                self.finish(log_id, 401, duration_ms, Some(&e.to_string()));
                warn!("webhook {label} ({}): {e}", envelope.topic.as_str());
                Err(e.into())
            }
            Err(e) if e.is_retryable() => {
                self.finish(log_id, 500, duration_ms, Some(&e.to_string()));
                error!("webhook {label} ({}) failed: {e}", envelope.topic.as_str());
                Err(e.into())
            }
            Err(e) => {
                let message = e.to_string();
                self.finish(log_id, 200, duration_ms, Some(&message));
                warn!("webhook {label} ({}) declined: {message}", envelope.topic.as_str());
                Ok(Delivery::Declined(message))
            }
        }
    }

    fn finish(&self, log_id: Uuid, status: i32, duration_ms: i64, error: Option<&str>) {
        if let Err(e) = self.logs.finish(log_id, status, duration_ms, error) {
            error!("could not finish webhook log {log_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::domain::errors::ExternalApiError;
    use crate::domain::webhook::WebhookTopic;
    use crate::infrastructure::memory::InMemoryStore;

    const SECRET: &str = "shpss_test_secret";

    fn sign(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn envelope(id: &str) -> WebhookEnvelope {
        WebhookEnvelope {
            topic: WebhookTopic::FulfillmentsCreate,
            shop_domain: Some("demo.myshopify.com".into()),
            webhook_id: Some(id.into()),
            api_version: Some("2024-10".into()),
        }
    }

    fn gateway() -> (Arc<InMemoryStore>, WebhookGateway) {
        let memory = Arc::new(InMemoryStore::new());
        (memory.clone(), WebhookGateway::new(memory))
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"id":1}"#;
        assert!(verify_signature(SECRET, body, Some(&sign(body))).is_ok());
    }

    #[test]
    fn tampered_body_or_missing_header_is_rejected() {
        let signature = sign(br#"{"id":1}"#);
        assert!(matches!(
            verify_signature(SECRET, br#"{"id":2}"#, Some(&signature)),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature(SECRET, b"{}", None),
            Err(WebhookError::MissingSignature)
        ));
        assert!(matches!(
            verify_signature(SECRET, b"{}", Some("not base64!")),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn bad_signature_never_reaches_handler_or_log() {
        let (memory, gateway) = gateway();
        let ran = Cell::new(false);
        let result = gateway.receive(SECRET, Some("AAAA"), b"{}", &envelope("evt-1"), || {
            ran.set(true);
            Ok(())
        });
        assert!(result.is_err());
        assert!(!ran.get());
        assert!(memory.read(|s| s.webhook_logs.is_empty()));
    }

    #[test]
    fn same_event_id_runs_handler_once() {
        let (memory, gateway) = gateway();
        let body = br#"{"id":123}"#;
        let signature = sign(body);
        let runs = Cell::new(0);

        for _ in 0..3 {
            let delivery = gateway
                .receive(SECRET, Some(&signature), body, &envelope("evt-123"), || {
                    runs.set(runs.get() + 1);
                    Ok(())
                })
                .unwrap();
            assert!(matches!(delivery, Delivery::Processed | Delivery::Duplicate));
        }

        assert_eq!(runs.get(), 1);
        memory.read(|s| {
            assert_eq!(s.webhook_logs.len(), 1);
            assert_eq!(s.webhook_logs[0].status_code, 200);
        });
    }

    #[test]
    fn business_failure_is_acknowledged_and_not_rerun() {
        let (memory, gateway) = gateway();
        let body = b"{}";
        let signature = sign(body);

        let first = gateway
            .receive(SECRET, Some(&signature), body, &envelope("evt-2"), || {
                Err(DomainError::validation("unknown line"))
            })
            .unwrap();
        assert!(matches!(first, Delivery::Declined(_)));

        let second = gateway
            .receive(SECRET, Some(&signature), body, &envelope("evt-2"), || Ok(()))
            .unwrap();
        assert_eq!(second, Delivery::Duplicate);
        memory.read(|s| assert!(s.webhook_logs[0].error.is_some()));
    }

    #[test]
    fn transient_failure_is_surfaced_and_retried_on_redelivery() {
        let (memory, gateway) = gateway();
        let body = b"{}";
        let signature = sign(body);

        let first = gateway.receive(SECRET, Some(&signature), body, &envelope("evt-3"), || {
            Err(DomainError::ExternalApi(ExternalApiError::Timeout))
        });
        assert!(matches!(first, Err(WebhookError::Handler(_))));
        memory.read(|s| assert_eq!(s.webhook_logs[0].status_code, 500));

        let second = gateway
            .receive(SECRET, Some(&signature), body, &envelope("evt-3"), || Ok(()))
            .unwrap();
        assert_eq!(second, Delivery::Processed);
        memory.read(|s| {
            assert_eq!(s.webhook_logs.len(), 1);
            assert_eq!(s.webhook_logs[0].status_code, 200);
            assert_eq!(s.webhook_logs[0].error, None);
        });
    }

    #[test]
    fn rejected_credentials_are_logged_as_unauthorized() {
        let (memory, gateway) = gateway();
        let body = b"{}";
        let signature = sign(body);

        let result = gateway.receive(SECRET, Some(&signature), body, &envelope("evt-4"), || {
            Err(DomainError::Authentication("token revoked".into()))
        });
        assert!(matches!(result, Err(WebhookError::Handler(DomainError::Authentication(_)))));
        memory.read(|s| assert_eq!(s.webhook_logs[0].status_code, 401));
    }
}
