//! HTTP client for the hosted NLU service. One POST per inbound message;
//! the response carries ranked intents plus typed entities, of which only
//! the top intent and the first entity of each kind are used.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use sokoni_core::config::NluConfig;
use sokoni_core::domain::geo::GeoPoint;
use sokoni_core::intent::{ClassifiedIntent, IntentKind, IntentSlots};
use sokoni_core::ports::{ExtractError, IntentExtractor};

pub struct HttpIntentExtractor {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
    language: String,
}

impl HttpIntentExtractor {
    pub fn from_config(config: &NluConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|err| ExtractError(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl IntentExtractor for HttpIntentExtractor {
    async fn classify(&self, text: &str) -> Result<ClassifiedIntent, ExtractError> {
        let url = format!("{}/v2/request", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .form(&[("text", text), ("language", self.language.as_str())]);

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {}", token.expose_secret()));
        }

        let response = request
            .send()
            .await
            .map_err(|err| ExtractError(format!("nlu request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError(format!("nlu service returned {status}")));
        }

        let body: WireResponse = response
            .json()
            .await
            .map_err(|err| ExtractError(format!("nlu response is not valid json: {err}")))?;

        let classified = classify_results(body.results)?;
        debug!(
            event_name = "nlu.intent.classified",
            slug = classified.kind.slug(),
            "classified inbound message"
        );
        Ok(classified)
    }
}

/// Maps the wire results to the core intent type. The wire format reports
/// "not provided" as a literal zero or empty string; both collapse to `None`
/// here so the core only ever sees one notion of absence.
fn classify_results(results: WireResults) -> Result<ClassifiedIntent, ExtractError> {
    let Some(top) = results.intents.first() else {
        return Err(ExtractError("nlu response contains no intent".to_string()));
    };
    let kind = IntentKind::from_slug(&top.slug);

    let mut slots = IntentSlots::default();
    if let Some(person) = first_entity(&results.entities, "person") {
        slots.name = non_empty(person.fullname.clone());
    }
    if let Some(location) = first_entity(&results.entities, "location") {
        if location.lat != 0.0 || location.lng != 0.0 {
            slots.location = Some(GeoPoint { lat: location.lat, lng: location.lng });
        }
        slots.address = non_empty(location.formatted.clone());
    }
    if let Some(product) = first_entity(&results.entities, "product") {
        slots.product = non_empty(product.value.clone());
    }
    if let Some(mass) = first_entity(&results.entities, "mass") {
        slots.mass_grams = non_zero_decimal(mass.grams)?;
    }
    if let Some(number) = first_entity(&results.entities, "number") {
        if number.scalar > 0.0 {
            slots.units = Some(number.scalar as u64);
        }
    }
    if let Some(money) = first_entity(&results.entities, "money") {
        slots.price = non_zero_decimal(money.dollars)?;
    }

    Ok(ClassifiedIntent { kind, slots })
}

fn first_entity<'a>(
    entities: &'a HashMap<String, Vec<WireEntity>>,
    key: &str,
) -> Option<&'a WireEntity> {
    entities.get(key).and_then(|values| values.first())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn non_zero_decimal(value: f64) -> Result<Option<Decimal>, ExtractError> {
    if value == 0.0 {
        return Ok(None);
    }
    Decimal::from_f64_retain(value)
        .map(Some)
        .ok_or_else(|| ExtractError(format!("wire value `{value}` is not a valid decimal")))
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    results: WireResults,
}

#[derive(Debug, Default, Deserialize)]
struct WireResults {
    #[serde(default)]
    intents: Vec<WireIntent>,
    #[serde(default)]
    entities: HashMap<String, Vec<WireEntity>>,
}

#[derive(Debug, Deserialize)]
struct WireIntent {
    slug: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireEntity {
    #[serde(default)]
    fullname: Option<String>,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lng: f64,
    #[serde(default)]
    scalar: f64,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    grams: f64,
    #[serde(default)]
    formatted: Option<String>,
    #[serde(default)]
    dollars: f64,
}
