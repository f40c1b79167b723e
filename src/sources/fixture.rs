use async_trait::async_trait;

use super::{EventSource, FetchError};
use crate::models::Event;

/// Serves a fixed in-memory listing. Never fails.
#[derive(Debug, Clone, Default)]
pub struct StaticEventSource {
    events: Vec<Event>,
}

impl StaticEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn sample() -> Self {
        Self::new(vec![
            sample_event(
                "1",
                "Festival de Arte de Rua SP",
                "Street art festival with local and international artists.",
                "2024-08-10T14:00:00Z",
                "Beco do Batman, Vila Madalena",
                true,
                ("SP", "São Paulo"),
            ),
            sample_event(
                "2",
                "Show de Jazz no Blue Note",
                "A night with the best jazz musicians in town.",
                "2024-08-12T20:30:00Z",
                "Blue Note São Paulo",
                false,
                ("SP", "São Paulo"),
            ),
            sample_event(
                "3",
                "Feira Gastronômica do Mercadão",
                "Traditional flavours, free tastings and cooking workshops.",
                "2024-08-15T10:00:00Z",
                "Mercado Municipal de São Paulo",
                true,
                ("SP", "São Paulo"),
            ),
            sample_event(
                "4",
                "Workshop de Fotografia Urbana",
                "Urban photography techniques around the city centre.",
                "2024-08-18T09:00:00Z",
                "Centro Cultural Banco do Brasil",
                false,
                ("SP", "Campinas"),
            ),
            sample_event(
                "5",
                "Sarau Poético no Parque",
                "An afternoon of poetry and music in the open air.",
                "2024-10-05T15:00:00Z",
                "Parque Vaca Brava",
                true,
                ("GO", "Goiânia"),
            ),
        ])
    }
}

fn sample_event(
    id: &str,
    title: &str,
    description: &str,
    date: &str,
    location: &str,
    is_free: bool,
    (state, city): (&str, &str),
) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        date: date.to_string(),
        location: location.to_string(),
        address: None,
        image_url: None,
        is_free,
        url: format!("https://example.com/events/{id}"),
        organizer: None,
        state: Some(state.to_string()),
        city: Some(city.to_string()),
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn get_events(&self) -> Result<Vec<Event>, FetchError> {
        Ok(self.events.clone())
    }

    async fn get_event_by_id(&self, id: &str) -> Result<Option<Event>, FetchError> {
        Ok(self.events.iter().find(|event| event.id == id).cloned())
    }
}
