use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{EventSource, FetchError};
use crate::config::AppConfig;
use crate::models::Event;

const DEFAULT_BASE_URL: &str = "https://www.eventbriteapi.com/v3";
const UNCONFIRMED_VENUE: &str = "Venue to be confirmed";

/// Events of one Eventbrite organization, read with a private bearer token.
pub struct EventbriteSource {
    token: Option<String>,
    organization_id: Option<String>,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    events: Vec<EventDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventDoc {
    id: Option<String>,
    name: Option<TextDoc>,
    description: Option<TextDoc>,
    start: Option<StartDoc>,
    venue: Option<VenueDoc>,
    logo: Option<LogoDoc>,
    is_free: Option<bool>,
    url: Option<String>,
    organizer: Option<OrganizerDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextDoc {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StartDoc {
    utc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VenueDoc {
    name: Option<String>,
    address: Option<AddressDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddressDoc {
    localized_address_display: Option<String>,
    region: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogoDoc {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrganizerDoc {
    name: Option<String>,
}

impl EventbriteSource {
    pub fn new(token: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            token: non_empty(Some(token.into())),
            organization_id: non_empty(Some(organization_id.into())),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            token: non_empty(config.eventbrite_token.clone()),
            organization_id: non_empty(config.eventbrite_organization_id.clone()),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn token(&self) -> Result<&str, FetchError> {
        self.token.as_deref().ok_or(FetchError::MissingCredentials)
    }

    async fn get_json(&self, url: &str) -> Result<Option<String>, FetchError> {
        let token = self.token()?;
        debug!("eventbrite GET {url}");
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|err| FetchError::Http(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(body))
    }
}

#[async_trait]
impl EventSource for EventbriteSource {
    fn name(&self) -> &'static str {
        "eventbrite"
    }

    async fn get_events(&self) -> Result<Vec<Event>, FetchError> {
        self.token()?;
        let org = self
            .organization_id
            .as_deref()
            .ok_or(FetchError::MissingCredentials)?;
        let url = format!("{}/organizations/{}/events/", self.base_url, org);

        // A missing organization is a failed listing, not an empty one.
        let body = self.get_json(&url).await?.ok_or(FetchError::Status {
            status: StatusCode::NOT_FOUND.as_u16(),
            body: format!("organization {org} not found"),
        })?;
        let payload: EventListResponse =
            serde_json::from_str(&body).map_err(|err| FetchError::Parse(err.to_string()))?;
        Ok(payload.events.into_iter().map(map_event).collect())
    }

    async fn get_event_by_id(&self, id: &str) -> Result<Option<Event>, FetchError> {
        let url = format!("{}/events/{}/", self.base_url, id);
        let Some(body) = self.get_json(&url).await? else {
            return Ok(None);
        };
        let doc: EventDoc =
            serde_json::from_str(&body).map_err(|err| FetchError::Parse(err.to_string()))?;
        Ok(Some(map_event(doc)))
    }
}

fn map_event(doc: EventDoc) -> Event {
    let venue = doc.venue.unwrap_or_default();
    let address = venue.address.unwrap_or_default();
    Event {
        id: doc.id.unwrap_or_default(),
        title: doc.name.and_then(|name| name.text).unwrap_or_default(),
        description: doc.description.and_then(|d| d.text).unwrap_or_default(),
        date: doc.start.and_then(|start| start.utc).unwrap_or_default(),
        location: non_empty(venue.name).unwrap_or_else(|| UNCONFIRMED_VENUE.to_string()),
        address: non_empty(address.localized_address_display),
        image_url: non_empty(doc.logo.and_then(|logo| logo.url)),
        is_free: doc.is_free.unwrap_or(false),
        url: doc.url.unwrap_or_default(),
        organizer: non_empty(doc.organizer.and_then(|org| org.name)),
        state: non_empty(address.region),
        city: non_empty(address.city),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FULL_EVENT: &str = r#"{
        "id": "777",
        "name": {"text": "Show de Jazz", "html": "<p>Show de Jazz</p>"},
        "description": {"text": "Noite de jazz"},
        "start": {"utc": "2024-08-12T20:30:00Z", "timezone": "America/Sao_Paulo"},
        "venue": {
            "name": "Blue Note",
            "address": {
                "localized_address_display": "Av. Paulista, 2073, São Paulo - SP",
                "region": "SP",
                "city": "São Paulo"
            }
        },
        "logo": {"url": "https://img.example.com/jazz.png"},
        "is_free": false,
        "url": "https://www.eventbrite.com/e/777",
        "organizer": {"name": "Blue Note"}
    }"#;

    #[test]
    fn maps_nested_fields() {
        let doc: EventDoc = serde_json::from_str(FULL_EVENT).expect("decode doc");
        let event = map_event(doc);
        assert_eq!(event.id, "777");
        assert_eq!(event.title, "Show de Jazz");
        assert_eq!(event.description, "Noite de jazz");
        assert_eq!(event.date, "2024-08-12T20:30:00Z");
        assert_eq!(event.location, "Blue Note");
        assert_eq!(
            event.address.as_deref(),
            Some("Av. Paulista, 2073, São Paulo - SP")
        );
        assert_eq!(event.image_url.as_deref(), Some("https://img.example.com/jazz.png"));
        assert!(!event.is_free);
        assert_eq!(event.organizer.as_deref(), Some("Blue Note"));
        assert_eq!(event.state.as_deref(), Some("SP"));
        assert_eq!(event.city.as_deref(), Some("São Paulo"));
    }

    #[test]
    fn missing_nested_fields_fall_back_instead_of_failing() {
        let doc: EventDoc = serde_json::from_str(
            r#"{"id": "1", "name": {"text": "Bare"}, "description": null, "venue": {}, "logo": null}"#,
        )
        .expect("decode sparse doc");
        let event = map_event(doc);
        assert_eq!(event.title, "Bare");
        assert_eq!(event.description, "");
        assert_eq!(event.date, "");
        assert_eq!(event.location, UNCONFIRMED_VENUE);
        assert!(event.address.is_none());
        assert!(event.image_url.is_none());
        assert!(event.organizer.is_none());
        assert!(!event.is_free);
        assert!(event.starts_at().is_none());
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let source = EventbriteSource::from_config(&AppConfig::default());
        assert!(matches!(
            source.get_events().await,
            Err(FetchError::MissingCredentials)
        ));
        assert!(matches!(
            source.get_event_by_id("1").await,
            Err(FetchError::MissingCredentials)
        ));

        let no_org = EventbriteSource::new("token", "  ");
        assert!(matches!(
            no_org.get_events().await,
            Err(FetchError::MissingCredentials)
        ));
    }

    /// Answers each connection with the next canned response and records the
    /// raw request text.
    async fn serve(
        responses: Vec<(u16, String)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.expect("accept");
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.expect("read request");
                requests.push(String::from_utf8_lossy(&buf[..n]).to_string());
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.expect("write reply");
                socket.shutdown().await.ok();
            }
            requests
        });
        (format!("http://{addr}/v3"), handle)
    }

    #[tokio::test]
    async fn lists_organization_events_with_bearer_token() {
        let listing = format!(r#"{{"events": [{FULL_EVENT}, {{"id": "778"}}]}}"#);
        let (base, server) = serve(vec![(200, listing)]).await;
        let source = EventbriteSource::new("secret-token", "org-9").with_base_url(base);

        let events = source.get_events().await.expect("list events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Show de Jazz");
        assert_eq!(events[1].location, UNCONFIRMED_VENUE);

        let requests = server.await.expect("server");
        let request = requests[0].to_lowercase();
        assert!(request.starts_with("get /v3/organizations/org-9/events/ "));
        assert!(request.contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn detail_lookup_distinguishes_not_found_from_failure() {
        let (base, server) = serve(vec![
            (404, r#"{"error": "NOT_FOUND"}"#.to_string()),
            (500, "boom".to_string()),
            (200, FULL_EVENT.to_string()),
        ])
        .await;
        let source = EventbriteSource::new("t", "o").with_base_url(base);

        assert!(source.get_event_by_id("nope").await.expect("404").is_none());
        match source.get_event_by_id("x").await {
            Err(FetchError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        let found = source.get_event_by_id("777").await.expect("found");
        assert_eq!(found.map(|e| e.id), Some("777".to_string()));

        let requests = server.await.expect("server");
        assert!(requests[2].starts_with("GET /v3/events/777/ "));
    }
}
