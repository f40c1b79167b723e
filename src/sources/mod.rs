pub mod eventbrite;
pub mod fixture;

use async_trait::async_trait;
use log::warn;
use thiserror::Error;

use crate::config::{AppConfig, SourceKind};
use crate::models::Event;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("event source credentials are not configured")]
    MissingCredentials,
    #[error("http error: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
}

/// Provider of event listings and detail lookups.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_events(&self) -> Result<Vec<Event>, FetchError>;

    /// `Ok(None)` means the id is unknown to the source.
    async fn get_event_by_id(&self, id: &str) -> Result<Option<Event>, FetchError>;
}

/// Builds the source named by the configuration. Called once at startup;
/// the result is handed to whatever needs it.
pub fn select_source(config: &AppConfig) -> Box<dyn EventSource> {
    match config.source {
        SourceKind::Fixture => Box::new(fixture::StaticEventSource::sample()),
        SourceKind::Eventbrite => {
            if config.eventbrite_token.is_none() || config.eventbrite_organization_id.is_none() {
                warn!("eventbrite source selected without full credentials");
            }
            Box::new(eventbrite::EventbriteSource::from_config(config))
        }
    }
}
