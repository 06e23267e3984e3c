//! RestStore - cellar store backed by a hosted PostgREST-style HTTPS API.
//!
//! Tables: `storage_locations`, `positions`, `bottles` and `wines`. Bottles are fetched
//! with their wine embedded as `wine`, which maps directly onto [`BottleRecord`].

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use super::{BottleFilter, CellarStore, StoreError};
use crate::model::{
    Bottle, BottleId, BottleRecord, BottleStatus, LifecycleError, LocationId, Position,
    PositionId, StorageLocation,
};

#[derive(Deserialize)]
struct IdRow {
    id: BottleId,
}

const BOTTLE_SELECT: &str = "*,wine:wines(id,name,color,region,vintage)";

fn user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!("cellar-sort/{version} ({os}; {arch})")
}

/// Connection settings for [`RestStore`].
#[derive(Clone, Debug)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl RestStoreConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }

    /// URL of a table endpoint, tolerating a trailing slash on the base URL.
    pub fn endpoint(&self, table: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), table)
    }
}

#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    config: RestStoreConfig,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key).map_err(|err| StoreError::Backend {
                status: 0,
                message: format!("API key is not a valid header value: {err}"),
            })?;
            headers.insert("apikey", value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(user_agent())
            .default_headers(headers)
            .build()?;
        Ok(Self { client, config })
    }

    fn get(&self, table: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(self.config.endpoint(table)))
    }

    fn patch(&self, table: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.patch(self.config.endpoint(table)))
            .header("Prefer", "return=representation")
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn fetch_bottle(&self, id: &BottleId) -> Result<Option<Bottle>, StoreError> {
        let response = self
            .get("bottles")
            .query(&[("id", eq(id.as_str())), ("select", "*".to_string())])
            .send()
            .await?;
        let rows: Vec<Bottle> = check(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn patch_in_stock_bottle(
        &self,
        id: &BottleId,
        body: serde_json::Value,
    ) -> Result<Option<Bottle>, StoreError> {
        let response = self
            .patch("bottles")
            .query(&[("id", eq(id.as_str())), ("status", eq("in_stock"))])
            .json(&body)
            .send()
            .await?;
        let rows: Vec<Bottle> = check(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    /// Another in-stock bottle referencing `position_id`, if any.
    async fn occupant_of(
        &self,
        position_id: &PositionId,
        bottle_id: &BottleId,
    ) -> Result<Option<BottleId>, StoreError> {
        let response = self
            .get("bottles")
            .query(&[
                ("select", "id".to_string()),
                ("position_id", eq(position_id.as_str())),
                ("status", eq("in_stock")),
                ("id", format!("neq.{}", bottle_id)),
                ("order", "id.asc".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<IdRow> = check(response).await?.json().await?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }

    /// Explains an empty PATCH result: unknown bottle or bottle out of stock.
    async fn explain_missing(&self, id: &BottleId) -> StoreError {
        match self.fetch_bottle(id).await {
            Ok(Some(bottle)) => StoreError::Lifecycle(LifecycleError::NotInStock {
                id: id.clone(),
                status: bottle.status,
            }),
            Ok(None) => StoreError::not_found("bottle", id),
            Err(err) => err,
        }
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// PostgREST `in` filter with every value quoted.
fn in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values
        .into_iter()
        .map(|value| format!("\"{}\"", value.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.text().await {
        Ok(body) => body,
        Err(_) => String::from("unknown response"),
    };
    Err(StoreError::Backend {
        status: status.as_u16(),
        message,
    })
}

impl CellarStore for RestStore {
    async fn list_locations(&self) -> Result<Vec<StorageLocation>, StoreError> {
        let response = self
            .get("storage_locations")
            .query(&[("select", "*"), ("order", "name.asc")])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list_positions(&self, location_id: &LocationId) -> Result<Vec<Position>, StoreError> {
        let response = self
            .get("positions")
            .query(&[
                ("select", "*".to_string()),
                ("storage_location_id", eq(location_id.as_str())),
                ("order", "row.asc,column.asc".to_string()),
            ])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn list_bottles(&self, filter: &BottleFilter) -> Result<Vec<BottleRecord>, StoreError> {
        let mut query = vec![
            ("select", BOTTLE_SELECT.to_string()),
            ("status", eq(filter.status.code())),
        ];
        if let Some(location_id) = &filter.location_id {
            let positions = self.list_positions(location_id).await?;
            if positions.is_empty() {
                return Ok(Vec::new());
            }
            query.push((
                "position_id",
                in_list(positions.iter().map(|pos| pos.id.as_str())),
            ));
        }

        let response = self.get("bottles").query(&query).send().await?;
        Ok(check(response).await?.json().await?)
    }

    async fn assign_position(
        &self,
        bottle_id: &BottleId,
        position_id: &PositionId,
    ) -> Result<(), StoreError> {
        if let Some(occupant) = self.occupant_of(position_id, bottle_id).await? {
            return Err(StoreError::PositionOccupied {
                position_id: position_id.clone(),
                occupant,
            });
        }

        if self
            .patch_in_stock_bottle(bottle_id, json!({ "position_id": position_id }))
            .await?
            .is_none()
        {
            return Err(self.explain_missing(bottle_id).await);
        }

        // A writer that passed the same check concurrently shows up now; back out.
        if let Some(occupant) = self.occupant_of(position_id, bottle_id).await? {
            log::warn!(
                "⚠️ Position {} claimed concurrently by {}, releasing bottle {}",
                position_id,
                occupant,
                bottle_id
            );
            let response = self
                .patch("bottles")
                .query(&[
                    ("id", eq(bottle_id.as_str())),
                    ("position_id", eq(position_id.as_str())),
                ])
                .json(&json!({ "position_id": null }))
                .send()
                .await?;
            check(response).await?;
            return Err(StoreError::PositionOccupied {
                position_id: position_id.clone(),
                occupant,
            });
        }
        Ok(())
    }

    async fn clear_position(&self, bottle_id: &BottleId) -> Result<(), StoreError> {
        let response = self
            .patch("bottles")
            .query(&[("id", eq(bottle_id.as_str()))])
            .json(&json!({ "position_id": null }))
            .send()
            .await?;
        let rows: Vec<Bottle> = check(response).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::not_found("bottle", bottle_id));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        bottle_id: &BottleId,
        status: BottleStatus,
        date: Option<NaiveDate>,
    ) -> Result<Bottle, StoreError> {
        if status.is_in_stock() {
            return Err(LifecycleError::NoReturnToStock(bottle_id.clone()).into());
        }
        let mut body = json!({ "status": status, "position_id": null });
        if status != BottleStatus::Lost {
            body["consumed_on"] = json!(date);
        }

        match self.patch_in_stock_bottle(bottle_id, body).await? {
            Some(bottle) => Ok(bottle),
            None => Err(self.explain_missing(bottle_id).await),
        }
    }
}
