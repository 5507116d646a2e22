use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::device::DeviceIdentifier;
use crate::error::GatewayError;
use crate::gateway::{
    AckEventPage, ApplicationInfo, ApplicationPage, DeliveryStatus, DeviceInfo, DevicePage,
    EnqueueRequest, Gateway, GatewaySession, LoginRequest, LoginResponse, QueueItem, QueuePage,
};

const PAGE_SIZE: usize = 100;
const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,

    pub read: Duration,

    pub write: Duration,

    pub pool: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        let five = Duration::from_secs(5);
        Self {
            connect: five,
            read: five,
            write: five,
            pool: five,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HttpClientOptions {
    pub timeouts: HttpTimeouts,

    /// Skip TLS certificate verification.
    pub insecure: bool,

    /// Honor proxy settings from the environment.
    pub enable_env_vars: bool,
}

/// reqwest has no separate write timeout; the total request deadline covers it.
///
/// Every request, bodiless ones included, declares a JSON content type.
pub fn build_client(options: &HttpClientOptions) -> Result<Client, GatewayError> {
    let t = options.timeouts;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut builder = Client::builder()
        .default_headers(headers)
        .connect_timeout(t.connect)
        .read_timeout(t.read)
        .timeout(t.connect + t.read + t.write)
        .pool_idle_timeout(t.pool)
        .danger_accept_invalid_certs(options.insecure);

    if !options.enable_env_vars {
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}

#[derive(Clone)]
pub struct GatewayCredentials {
    pub username: String,

    pub password: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug)]
pub struct HttpGateway {
    client: Client,

    base_url: String,

    credentials: GatewayCredentials,

    session: RwLock<Option<GatewaySession>>,
}

impl HttpGateway {
    /// `base_url` ends in `/api`, without a trailing slash.
    pub fn new(client: Client, base_url: impl Into<String>, credentials: GatewayCredentials) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            credentials,
            session: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn login(&self) -> Result<GatewaySession, GatewayError> {
        let response = self
            .client
            .post(self.url("/internal/login"))
            .header(ACCEPT, JSON)
            .json(&LoginRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Authentication(format!(
                "login as {:?} rejected with {status}",
                self.credentials.username
            )));
        }

        let login: LoginResponse = check(response).await?.json().await?;
        info!(gateway = %self.base_url, "logged in");

        Ok(GatewaySession::new(login.jwt))
    }

    async fn token(&self) -> Result<String, GatewayError> {
        if let Some(session) = self.session.read().await.as_ref()
            && !session.is_expired()
        {
            return Ok(session.token().to_owned());
        }

        let mut session = self.session.write().await;
        if let Some(current) = session.as_ref()
            && !current.is_expired()
        {
            return Ok(current.token().to_owned());
        }

        let fresh = self.login().await?;
        let token = fresh.token().to_owned();
        *session = Some(fresh);

        Ok(token)
    }

    async fn invalidate(&self, token: &str) {
        let mut session = self.session.write().await;
        if session.as_ref().is_some_and(|s| s.token() == token) {
            *session = None;
        }
    }

    /// Sends an authorized request, logging in again once on a 401.
    async fn send<F>(&self, request: F) -> Result<Response, GatewayError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut renewed = false;
        loop {
            let token = self.token().await?;
            let response = request(&self.client)
                .header(ACCEPT, JSON)
                .bearer_auth(&token)
                .send()
                .await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return check(response).await;
            }
            if renewed {
                return Err(GatewayError::Authentication(
                    "gateway rejected a freshly issued session".into(),
                ));
            }

            debug!(gateway = %self.base_url, "session rejected, logging in again");
            self.invalidate(&token).await;
            renewed = true;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        let response = self.send(|client| client.get(&url).query(query)).await?;

        Ok(response.json().await?)
    }

    fn queue_path(deveui: &DeviceIdentifier) -> String {
        format!("/devices/{deveui}/queue")
    }
}

async fn check(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Protocol {
        status: status.as_u16(),
        body,
    })
}

fn page_query(offset: usize) -> [(&'static str, String); 2] {
    [("limit", PAGE_SIZE.to_string()), ("offset", offset.to_string())]
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        let fresh = self.login().await?;
        *self.session.write().await = Some(fresh);
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, GatewayError> {
        let mut devices = Vec::new();
        loop {
            let page: DevicePage = self.get_json("/devices", &page_query(devices.len())).await?;
            let empty = page.device_result.is_empty();
            devices.extend(page.device_result);
            if empty || devices.len() >= page.total_count {
                return Ok(devices);
            }
        }
    }

    async fn list_applications(&self) -> Result<Vec<ApplicationInfo>, GatewayError> {
        let mut applications = Vec::new();
        loop {
            let page: ApplicationPage = self
                .get_json("/applications", &page_query(applications.len()))
                .await?;
            let empty = page.result.is_empty();
            applications.extend(page.result);
            if empty || applications.len() >= page.total_count {
                return Ok(applications);
            }
        }
    }

    async fn get_queue(&self, deveui: &DeviceIdentifier) -> Result<Vec<QueueItem>, GatewayError> {
        let page: QueuePage = self.get_json(&Self::queue_path(deveui), &[]).await?;
        Ok(page.device_queue_items)
    }

    async fn flush_queue(&self, deveui: &DeviceIdentifier) -> Result<(), GatewayError> {
        let url = self.url(&Self::queue_path(deveui));
        self.send(|client| client.delete(&url)).await?;
        Ok(())
    }

    async fn enqueue_downlink(
        &self,
        deveui: &DeviceIdentifier,
        request: &EnqueueRequest,
    ) -> Result<(), GatewayError> {
        let url = self.url(&Self::queue_path(deveui));
        self.send(|client| client.post(&url).json(request)).await?;
        Ok(())
    }

    async fn get_delivery_status(
        &self,
        deveui: &DeviceIdentifier,
    ) -> Result<DeliveryStatus, GatewayError> {
        let page: AckEventPage = self
            .get_json(
                &format!("/devices/{deveui}/events"),
                &[("type", "ack".to_owned())],
            )
            .await?;
        Ok(page.into())
    }
}
