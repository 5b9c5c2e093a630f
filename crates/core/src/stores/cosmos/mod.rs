//! Cosmos DB SQL API over REST with master-key auth.
//!
//! Single-partition queries go straight to the gateway. Cross-partition
//! queries first ask the gateway for a query plan, then run the rewritten
//! query on every partition key range and merge on the client, since the
//! gateway refuses to serve TOP, ORDER BY and RANK across partitions itself.

mod plan;

use crate::config::CosmosSettings;
use crate::error::{ConfigError, StoreError};
use crate::store::{ContainerSet, QueryResponse, REQUEST_CHARGE_HEADER};
use crate::traits::DocumentContainer;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use plan::{
    fuse_components, merge_partitions, target_ranges, GlobalStatistics, HybridSearchQueryInfo,
    PartitionKeyRange, QueryInfo, QueryPlan, SUPPORTED_QUERY_FEATURES,
};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

pub const API_VERSION: &str = "2018-12-31";

const CONTINUATION_HEADER: &str = "x-ms-continuation";
const PARTITION_KEY_RANGE_HEADER: &str = "x-ms-documentdb-partitionkeyrangeid";
const ENABLE_CROSS_PARTITION_HEADER: &str = "x-ms-documentdb-query-enablecrosspartition";
const QUERY_VERSION: &str = "1.4";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct DocumentsPage {
    #[serde(rename = "Documents", default)]
    documents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PartitionKeyRangesPage {
    #[serde(rename = "PartitionKeyRanges", default)]
    ranges: Vec<PartitionKeyRange>,
}

/// Account-level connection shared by every container handle.
#[derive(Clone)]
pub struct CosmosClient {
    http: Arc<Client>,
    endpoint: Url,
    key: Arc<[u8]>,
}

impl CosmosClient {
    pub fn new(endpoint: &str, master_key: &str) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))?;
        let key = STANDARD
            .decode(master_key.trim())
            .map_err(|error| ConfigError::Invalid {
                field: "cosmos key",
                details: error.to_string(),
            })?;

        Ok(Self {
            http: Arc::new(Client::new()),
            endpoint,
            key: key.into(),
        })
    }

    pub fn container(
        &self,
        database: &str,
        container: &str,
    ) -> Result<CosmosContainer, ConfigError> {
        let resource_link = format!("dbs/{database}/colls/{container}");
        let docs_url = self.endpoint.join(&format!("{resource_link}/docs"))?;
        let pkranges_url = self.endpoint.join(&format!("{resource_link}/pkranges"))?;

        Ok(CosmosContainer {
            client: self.clone(),
            name: container.to_string(),
            resource_link,
            docs_url,
            pkranges_url,
            partition_key_ranges: OnceCell::new(),
        })
    }

    /// Opens handles to the three containers named in `settings`.
    pub fn containers(
        &self,
        settings: &CosmosSettings,
    ) -> Result<ContainerSet<CosmosContainer>, ConfigError> {
        let names = &settings.containers;
        Ok(ContainerSet {
            no_index: self.container(&settings.database, &names.no_index)?,
            qflat: self.container(&settings.database, &names.qflat)?,
            diskann: self.container(&settings.database, &names.diskann)?,
        })
    }
}

pub struct CosmosContainer {
    client: CosmosClient,
    name: String,
    resource_link: String,
    docs_url: Url,
    pkranges_url: Url,
    /// Read on the first cross-partition query and kept for the handle's lifetime.
    partition_key_ranges: OnceCell<Vec<PartitionKeyRange>>,
}

#[derive(Clone, Copy)]
enum Route<'a> {
    /// Let the gateway pick the partition; no cross-partition fan-out.
    Gateway,
    Range(&'a str),
}

/// Request charge and headers accumulated over every page of one logical query.
#[derive(Default)]
struct Tally {
    pages: usize,
    charge: Option<f64>,
    headers: HashMap<String, String>,
}

impl Tally {
    fn record(&mut self, headers: HashMap<String, String>) {
        self.pages += 1;
        if let Some(charge) = headers
            .get(REQUEST_CHARGE_HEADER)
            .and_then(|value| value.trim().parse::<f64>().ok())
        {
            self.charge = Some(self.charge.unwrap_or(0.0) + charge);
        }
        self.headers = headers;
    }

    /// Headers of the last page, with the charge replaced by the running total.
    fn into_headers(mut self) -> HashMap<String, String> {
        if let Some(charge) = self.charge {
            self.headers
                .insert(REQUEST_CHARGE_HEADER.to_string(), charge.to_string());
        }
        self.headers
    }
}

impl CosmosContainer {
    fn signed(
        &self,
        method: Method,
        url: &Url,
        resource_type: &str,
    ) -> Result<RequestBuilder, StoreError> {
        let date = http_date(Utc::now());
        let token = authorization_token(
            &self.client.key,
            method.as_str(),
            resource_type,
            &self.resource_link,
            &date,
        )?;

        Ok(self
            .client
            .http
            .request(method, url.clone())
            .header(AUTHORIZATION, token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION))
    }

    fn query_request(&self, body: &[u8]) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .signed(Method::POST, &self.docs_url, "docs")?
            .header("x-ms-documentdb-isquery", "True")
            .header(CONTENT_TYPE, "application/query+json")
            .body(body.to_vec()))
    }

    async fn send(
        &self,
        request: RequestBuilder,
    ) -> Result<(Response, HashMap<String, String>), StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let headers = collect_headers(response.headers());

        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                container: self.name.clone(),
                status: status.as_u16(),
                details,
            });
        }
        Ok((response, headers))
    }

    async fn drain(
        &self,
        query_text: &str,
        route: Route<'_>,
        tally: &mut Tally,
    ) -> Result<Vec<Value>, StoreError> {
        let body = query_body(query_text)?;
        let mut rows = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.query_request(&body)?;
            request = match route {
                Route::Gateway => request.header(ENABLE_CROSS_PARTITION_HEADER, "False"),
                Route::Range(id) => request
                    .header(ENABLE_CROSS_PARTITION_HEADER, "True")
                    .header(PARTITION_KEY_RANGE_HEADER, id),
            };
            if let Some(token) = &continuation {
                request = request.header(CONTINUATION_HEADER, token);
            }

            let (response, headers) = self.send(request).await?;
            continuation = next_continuation(&headers);
            tally.record(headers);

            let page: DocumentsPage = response.json().await?;
            rows.extend(page.documents);

            if continuation.is_none() {
                return Ok(rows);
            }
        }
    }

    async fn drain_ranges(
        &self,
        query_text: &str,
        ranges: &[PartitionKeyRange],
        tally: &mut Tally,
    ) -> Result<Vec<Vec<Value>>, StoreError> {
        let mut partitions = Vec::with_capacity(ranges.len());
        for range in ranges {
            partitions.push(self.drain(query_text, Route::Range(&range.id), tally).await?);
        }
        Ok(partitions)
    }

    async fn query_plan(&self, query_text: &str) -> Result<QueryPlan, StoreError> {
        let body = query_body(query_text)?;
        let request = self
            .query_request(&body)?
            .header(ENABLE_CROSS_PARTITION_HEADER, "True")
            .header("x-ms-cosmos-is-query-plan-request", "True")
            .header("x-ms-cosmos-supported-query-features", SUPPORTED_QUERY_FEATURES)
            .header("x-ms-cosmos-query-version", QUERY_VERSION);

        let (response, _) = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn partition_key_ranges(&self) -> Result<&[PartitionKeyRange], StoreError> {
        let ranges = self
            .partition_key_ranges
            .get_or_try_init(|| self.read_partition_key_ranges())
            .await?;
        Ok(ranges)
    }

    async fn read_partition_key_ranges(&self) -> Result<Vec<PartitionKeyRange>, StoreError> {
        let mut ranges = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.signed(Method::GET, &self.pkranges_url, "pkranges")?;
            if let Some(token) = &continuation {
                request = request.header(CONTINUATION_HEADER, token);
            }

            let (response, headers) = self.send(request).await?;
            continuation = next_continuation(&headers);
            let page: PartitionKeyRangesPage = response.json().await?;
            ranges.extend(page.ranges);

            if continuation.is_none() {
                break;
            }
        }

        if ranges.is_empty() {
            return Err(StoreError::BackendResponse {
                container: self.name.clone(),
                details: "no partition key ranges".to_string(),
            });
        }
        debug!(container = %self.name, ranges = ranges.len(), "partition key ranges cached");
        Ok(ranges)
    }

    fn ensure_supported(&self, info: &QueryInfo) -> Result<(), StoreError> {
        match info.unsupported_feature() {
            Some(feature) => Err(StoreError::Unsupported {
                container: self.name.clone(),
                feature,
            }),
            None => Ok(()),
        }
    }

    async fn query_across_partitions(
        &self,
        query_text: &str,
        tally: &mut Tally,
    ) -> Result<Vec<Value>, StoreError> {
        let plan = self.query_plan(query_text).await?;
        let ranges = target_ranges(self.partition_key_ranges().await?, &plan.query_ranges);
        debug!(
            container = %self.name,
            ranges = ranges.len(),
            hybrid = plan.hybrid_search_query_info.is_some(),
            "query plan resolved"
        );

        match plan.hybrid_search_query_info {
            Some(hybrid) => self.hybrid_search(&hybrid, &ranges, tally).await,
            None => {
                let info = plan.query_info.unwrap_or_default();
                self.ensure_supported(&info)?;
                let partitions = self
                    .drain_ranges(&info.partition_query(query_text), &ranges, tally)
                    .await?;
                Ok(merge_partitions(partitions, &info))
            }
        }
    }

    async fn hybrid_search(
        &self,
        info: &HybridSearchQueryInfo,
        ranges: &[PartitionKeyRange],
        tally: &mut Tally,
    ) -> Result<Vec<Value>, StoreError> {
        let statistics = if info.requires_global_statistics {
            let mut total = GlobalStatistics::default();
            for partition in self
                .drain_ranges(&info.global_statistics_query, ranges, tally)
                .await?
            {
                for row in partition {
                    total.absorb(serde_json::from_value(row)?);
                }
            }
            Some(total)
        } else {
            None
        };

        let mut hits = Vec::new();
        for component in &info.component_query_infos {
            self.ensure_supported(component)?;
            if component.rewritten_query.is_empty() {
                return Err(StoreError::BackendResponse {
                    container: self.name.clone(),
                    details: "hybrid component without a rewritten query".to_string(),
                });
            }

            let mut query = component.partition_query("");
            if let Some(statistics) = &statistics {
                query = statistics.fill(&query);
            }
            for partition in self.drain_ranges(&query, ranges, tally).await? {
                hits.extend(partition);
            }
        }

        Ok(fuse_components(hits, info))
    }
}

#[async_trait]
impl DocumentContainer for CosmosContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        query_text: &str,
        cross_partition: bool,
    ) -> Result<QueryResponse, StoreError> {
        let mut tally = Tally::default();
        let rows = if cross_partition {
            self.query_across_partitions(query_text, &mut tally).await?
        } else {
            self.drain(query_text, Route::Gateway, &mut tally).await?
        };

        debug!(
            container = %self.name,
            pages = tally.pages,
            rows = rows.len(),
            request_charge = tally.charge,
            "query drained"
        );
        Ok(QueryResponse {
            rows,
            headers: tally.into_headers(),
        })
    }
}

fn query_body(query_text: &str) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(&json!({
        "query": query_text,
        "parameters": [],
    }))?)
}

fn next_continuation(headers: &HashMap<String, String>) -> Option<String> {
    headers
        .get(CONTINUATION_HEADER)
        .filter(|token| !token.is_empty())
        .cloned()
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// RFC 1123 timestamp as expected in `x-ms-date`.
fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// URL-encoded master key token: `type=master&ver=1.0&sig=<base64 HMAC-SHA256>`.
fn authorization_token(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, StoreError> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|error| StoreError::Signing(error.to_string()))?;
    mac.update(payload.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let token = format!("type=master&ver=1.0&sig={signature}");
    Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
}
