use crate::config::Settings;
use crate::errors::{Error, Result};
use crate::metrics::{REMOTE_FAILURES_TOTAL, REMOTE_LATENCY_SECONDS};
use crate::parse::{self, Series};
use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Notification event types (`net`) used by the dashboard's subscriptions.
pub const NET_CREATE_CHILD: u8 = 3;
pub const NET_DELETE_CHILD: u8 = 4;

const ORIGIN: &str = "X-M2M-Origin";
const REQUEST_ID: &str = "X-M2M-RI";
const RELEASE_VERSION: &str = "X-M2M-RVI";
pub const RESULT_CODE: &str = "X-M2M-RSC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    AccessControlPolicy,
    ApplicationEntity,
    Container,
    ContentInstance,
    Subscription,
}

impl ResourceType {
    pub fn code(self) -> u8 {
        match self {
            ResourceType::AccessControlPolicy => 1,
            ResourceType::ApplicationEntity => 2,
            ResourceType::Container => 3,
            ResourceType::ContentInstance => 4,
            ResourceType::Subscription => 23,
        }
    }
}

/// Query for a discovery (`fu=1`) request rooted at `location`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryFilter {
    pub location: String,
    pub resource_type: Option<ResourceType>,
    pub label: Option<String>,
    pub name: Option<String>,
    pub level: Option<u32>,
    pub api: Option<String>,
}

impl DiscoveryFilter {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("fu", "1".to_string())];
        if let Some(ty) = self.resource_type {
            query.push(("ty", ty.code().to_string()));
        }
        if let Some(label) = &self.label {
            query.push(("lbl", label.clone()));
        }
        if let Some(name) = &self.name {
            query.push(("rn", name.clone()));
        }
        if let Some(level) = self.level {
            query.push(("lvl", level.to_string()));
        }
        if let Some(api) = &self.api {
            query.push(("api", api.clone()));
        }
        query
    }
}

/// Read/write intents against the broker used while mirroring devices.
///
/// Implementations never fail: broker errors collapse into empty results so
/// callers can treat every answer as well formed.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Addresses matching `filter`, in broker order.
    async fn discover(&self, filter: &DiscoveryFilter) -> Vec<String>;

    /// Value and display timestamp of a content instance, or `("", "")`.
    async fn read_latest(&self, address: &str) -> (String, String);

    /// All numeric readings held by a container.
    async fn read_series(&self, address: &str) -> Series;

    /// Label set of an AE.
    async fn read_labels(&self, address: &str) -> Vec<String>;

    /// Creates a content instance under `address`; failures are only logged.
    async fn write_value(&self, address: &str, content: &str);

    /// Subscribes the dashboard to `events` on `address`. Returns whether the
    /// broker accepted or already held the subscription.
    async fn subscribe(&self, address: &str, name: &str, events: &[u8]) -> bool;
}

/// HTTP binding of the oneM2M Mca reference point.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: Client,
    base_url: String,
    originator: String,
    release_version: String,
    timeout: Duration,
    display_offset: FixedOffset,
}

impl DirectoryClient {
    pub fn new(
        base_url: &str,
        originator: String,
        release_version: String,
        timeout: Duration,
        display_offset: FixedOffset,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            originator,
            release_version,
            timeout,
            display_offset,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.cse_url,
            settings.originator(),
            settings.release_version.clone(),
            settings.request_timeout(),
            settings.display_offset()?,
        )
    }

    /// Same connection, different `X-M2M-Origin`.
    pub fn with_originator(&self, originator: impl Into<String>) -> Self {
        Self {
            originator: originator.into(),
            ..self.clone()
        }
    }

    pub fn originator(&self) -> &str {
        &self.originator
    }

    pub fn display_offset(&self) -> &FixedOffset {
        &self.display_offset
    }

    fn request(&self, method: Method, address: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, address.trim_start_matches('/'));
        self.http
            .request(method, url)
            .header(ORIGIN, &self.originator)
            .header(REQUEST_ID, uuid::Uuid::new_v4().to_string())
            .header(RELEASE_VERSION, &self.release_version)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, address: &str, request: RequestBuilder) -> Result<Value> {
        let start = Instant::now();
        let outcome = request.send().await;
        REMOTE_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        let response = outcome.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    address: address.to_string(),
                    timeout: self.timeout,
                }
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let rsc = response
                .headers()
                .get(RESULT_CODE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            return Err(Error::Status {
                address: address.to_string(),
                status: status.as_u16(),
                rsc,
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn try_discover(&self, filter: &DiscoveryFilter) -> Result<Vec<String>> {
        let request = self
            .request(Method::GET, &filter.location)
            .query(&filter.query());
        let body = self.send(&filter.location, request).await?;
        Ok(parse::addresses(&body))
    }

    pub async fn try_retrieve(&self, address: &str, query: &[(&str, &str)]) -> Result<Value> {
        let request = self.request(Method::GET, address).query(query);
        self.send(address, request).await
    }

    /// POSTs a new child of `parent` and returns the broker's representation.
    pub async fn try_create(&self, parent: &str, ty: ResourceType, body: &Value) -> Result<Value> {
        let request = self
            .request(Method::POST, parent)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("application/json;ty={}", ty.code()),
            )
            .json(body);
        self.send(parent, request).await
    }

    /// ACP granting NOTIFY to everyone and full rights to the dashboard.
    pub async fn create_notification_acp(&self, parent: &str, name: &str, owner: &str) -> Result<String> {
        let body = json!({
            "m2m:acp": {
                "rn": name,
                "pv": { "acr": [
                    { "acor": ["all"], "acop": 16 },
                    { "acor": [owner], "acop": 63 }
                ]},
                "pvs": { "acr": [{ "acor": [owner], "acop": 63 }] }
            }
        });
        let reply = self
            .try_create(parent, ResourceType::AccessControlPolicy, &body)
            .await?;
        Ok(parse::resource_id(&reply, parse::ACP))
    }

    pub async fn create_ae(
        &self,
        parent: &str,
        name: &str,
        labels: &[&str],
        point_of_access: Option<&str>,
        acp: Option<&str>,
    ) -> Result<String> {
        let mut ae = json!({
            "rn": name,
            "api": "NR_AE001",
            "apn": "IOTApp",
            "rr": point_of_access.is_some(),
            "csz": ["application/json"],
            "srv": [self.release_version],
        });
        if !labels.is_empty() {
            ae["lbl"] = json!(labels);
        }
        if let Some(poa) = point_of_access {
            ae["poa"] = json!([poa]);
        }
        if let Some(acp) = acp {
            ae["acpi"] = json!([acp]);
        }
        let reply = self
            .try_create(parent, ResourceType::ApplicationEntity, &json!({ "m2m:ae": ae }))
            .await?;
        Ok(parse::resource_id(&reply, parse::AE))
    }

    pub async fn create_container(&self, parent: &str, name: &str, max_instances: usize) -> Result<String> {
        let body = json!({ "m2m:cnt": { "rn": name, "mni": max_instances } });
        let reply = self
            .try_create(parent, ResourceType::Container, &body)
            .await?;
        Ok(parse::resource_id(&reply, parse::CNT))
    }

    pub async fn create_subscription(&self, parent: &str, name: &str, events: &[u8]) -> Result<String> {
        let body = json!({
            "m2m:sub": {
                "rn": name,
                "enc": { "net": events },
                "nu": [self.originator],
            }
        });
        let reply = self
            .try_create(parent, ResourceType::Subscription, &body)
            .await?;
        Ok(parse::resource_id(&reply, parse::SUB))
    }

    /// Content instance labelled `<device>/<metric>` after the last two
    /// segments of `container`, which is how notifications are routed back.
    pub async fn create_content(&self, container: &str, content: &str) -> Result<String> {
        let body = json!({
            "m2m:cin": {
                "cnf": "application/text:0",
                "con": content,
                "lbl": [content_label(container)],
            }
        });
        let reply = self
            .try_create(container, ResourceType::ContentInstance, &body)
            .await?;
        Ok(parse::resource_id(&reply, parse::CIN))
    }

    fn recover<T: Default>(&self, intent: &str, address: &str, result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                REMOTE_FAILURES_TOTAL.inc();
                warn!("{} {} failed: {}", intent, address, e);
                T::default()
            }
        }
    }
}

#[async_trait]
impl Directory for DirectoryClient {
    async fn discover(&self, filter: &DiscoveryFilter) -> Vec<String> {
        let result = self.try_discover(filter).await;
        self.recover("discover", &filter.location, result)
    }

    async fn read_latest(&self, address: &str) -> (String, String) {
        let result = self.try_retrieve(address, &[]).await;
        let body = self.recover("read", address, result);
        parse::latest_reading(&body, &self.display_offset)
    }

    async fn read_series(&self, address: &str) -> Series {
        let result = self.try_retrieve(address, &[("rcn", "4")]).await;
        let body = self.recover("read series", address, result);
        parse::series(&body, &self.display_offset)
    }

    async fn read_labels(&self, address: &str) -> Vec<String> {
        let result = self.try_retrieve(address, &[]).await;
        let body = self.recover("read labels", address, result);
        parse::labels(&body, parse::AE)
    }

    async fn write_value(&self, address: &str, content: &str) {
        match self.create_content(address, content).await {
            Ok(_) => debug!("Wrote {:?} to {}", content, address),
            Err(e) => {
                REMOTE_FAILURES_TOTAL.inc();
                warn!("write {} failed: {}", address, e);
            }
        }
    }

    async fn subscribe(&self, address: &str, name: &str, events: &[u8]) -> bool {
        match self.create_subscription(address, name, events).await {
            Ok(_) => {
                info!("Subscribed to {}", address);
                true
            }
            Err(e) if e.is_conflict() => {
                debug!("Subscription {} already present on {}", name, address);
                true
            }
            Err(e) => {
                REMOTE_FAILURES_TOTAL.inc();
                warn!("subscribe {} failed: {}", address, e);
                false
            }
        }
    }
}

/// `cse-in/sensorA/Battery` -> `sensorA/Battery`.
pub fn content_label(container: &str) -> String {
    let segments: Vec<&str> = container
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    match segments.as_slice() {
        [.., device, metric] => format!("{}/{}", device, metric),
        [only] => only.to_string(),
        [] => String::new(),
    }
}
