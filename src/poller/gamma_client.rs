//! Gamma REST client and DTOs. `GammaMarketDto`/its deserializers are
//! adapted near-verbatim from `scrapers/polymarket_gamma.rs`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::models::{Market, MarketStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaMarketDto {
    #[serde(default)]
    pub id: Option<String>,
    pub slug: String,
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(rename = "endDateIso", default, alias = "end_date_iso")]
    pub end_date_iso: Option<String>,
    #[serde(default, deserialize_with = "de_string_f64_opt")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "de_string_f64_opt")]
    pub liquidity: Option<f64>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(rename = "outcomePrices", default, deserialize_with = "de_string_vec")]
    pub outcome_prices_raw: Vec<String>,
    #[serde(default, deserialize_with = "de_string_vec")]
    pub outcomes: Vec<String>,
    #[serde(rename = "clobTokenIds", default, deserialize_with = "de_string_vec")]
    pub clob_token_ids: Vec<String>,
    #[serde(rename = "eventId", default)]
    pub event_id: Option<String>,
    #[serde(rename = "eventTitle", default)]
    pub event_title: Option<String>,
}

fn de_string_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Array(arr) => Ok(arr
            .into_iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()),
        Value::String(s) => serde_json::from_str::<Vec<String>>(&s).or_else(|_| Ok(Vec::new())),
        _ => Ok(Vec::new()),
    }
}

fn de_string_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s.parse::<f64>().map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl GammaMarketDto {
    pub fn into_market(self) -> CoreResult<Market> {
        let status = if self.archived.unwrap_or(false) {
            MarketStatus::Archived
        } else if self.closed.unwrap_or(false) {
            MarketStatus::Closed
        } else if self.active.unwrap_or(false) {
            MarketStatus::Active
        } else {
            MarketStatus::Closed
        };

        let outcome_prices: Vec<f64> = self
            .outcome_prices_raw
            .iter()
            .map(|s| s.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| CoreError::ParseError(format!("outcomePrices parse: {e}")))?;

        let id = self
            .id
            .ok_or_else(|| CoreError::ParseError("gamma market missing id".into()))?;

        let end_date = self
            .end_date_iso
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&chrono::Utc));

        Ok(Market {
            id,
            condition_id: self.condition_id,
            question: self.question.unwrap_or_default(),
            slug: self.slug,
            status,
            outcomes: self.outcomes,
            outcome_prices,
            clob_token_ids: self.clob_token_ids,
            volume: self.volume.unwrap_or(0.0),
            liquidity: self.liquidity.unwrap_or(0.0),
            end_date,
            event_id: self.event_id,
            event_title: self.event_title,
            last_updated: chrono::Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum GammaOrder {
    Volume,
    Recency,
}

pub struct GammaClient {
    http: reqwest::Client,
    base_url: String,
}

impl GammaClient {
    pub fn new(base_url: String) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Fatal(format!("build gamma http client: {e}")))?;
        Ok(Self { http, base_url })
    }

    /// One page of the ordered markets listing. `order` selects the sort
    /// key the source system paginates by (volume-desc for discovery,
    /// recency for the backfill cycle).
    pub async fn list_markets_page(
        &self,
        order: GammaOrder,
        limit: u32,
        offset: u32,
    ) -> CoreResult<Vec<GammaMarketDto>> {
        let order_str = match order {
            GammaOrder::Volume => "volume",
            GammaOrder::Recency => "startDate",
        };
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("order", order_str),
                ("ascending", "false"),
                ("limit", &limit.to_string()),
                ("offset", &offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("gamma markets request: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::UpstreamThrottled("gamma rate limited".into()));
        }
        if !status.is_success() {
            return Err(CoreError::UpstreamUnavailable(format!("gamma status {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("gamma body read: {e}")))?;

        serde_json::from_str(&body).map_err(|e| CoreError::ParseError(format!("gamma markets parse: {e}")))
    }

    pub async fn lookup_by_slug(&self, slug: &str) -> CoreResult<Option<GammaMarketDto>> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("slug", slug), ("limit", "1")])
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("gamma lookup request: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::UpstreamUnavailable(format!("gamma lookup status: {e}")))?;
        let markets: Vec<GammaMarketDto> = resp
            .json()
            .await
            .map_err(|e| CoreError::ParseError(format!("gamma lookup parse: {e}")))?;
        Ok(markets.into_iter().next())
    }
}
