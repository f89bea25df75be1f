use crate::api::credentials::hash_password;
use crate::api::response::{self, first_string};
use crate::api::{endpoint, Client, Error, UpstreamRequest};
use crate::model::LoginSummary;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

/// Places a device list may hide in, depending on endpoint and firmware
const DEVICE_LIST_PATHS: [&[&str]; 5] = [
    &["deviceList"],
    &["obj", "datas"],
    &["obj", "deviceList"],
    &["datas"],
    &["data"],
];
const DEVICE_SN_KEYS: [&str; 4] = ["deviceSn", "deviceAilas", "alias", "sn"];

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Identifiers learned from the last login.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user_id: Option<String>,
    pub plant_id: Option<String>,
    pub plant_name: Option<String>,
    pub device_sn: Option<String>,
    pub country: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Owns the upstream client and the single login session.
#[derive(Debug)]
pub struct SessionManager {
    client: Client,
    credentials: Option<Credentials>,
    ttl: chrono::Duration,
    session: Session,
}

impl SessionManager {
    pub fn new(client: Client, credentials: Option<Credentials>, ttl: Duration) -> Self {
        Self {
            client,
            credentials,
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::max_value()),
            session: Session::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let client = Client::new(settings.api_url.clone(), settings.request_timeout())?;
        let credentials = match (&settings.username, &settings.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Credentials {
                    username: username.to_owned(),
                    password: password.to_owned(),
                })
            }
            _ => None,
        };

        Ok(Self::new(client, credentials, settings.session_ttl()))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.last_login.is_some() && self.client.has_cookies()
    }

    /// Forget the login time so the next `ensure_session` logs in again. Identifiers are kept.
    pub fn invalidate(&mut self) {
        self.session.last_login = None;
    }

    fn login_expired(&self, now: DateTime<Utc>) -> bool {
        match self.session.last_login {
            Some(last_login) if self.client.has_cookies() => now - last_login > self.ttl,
            _ => true,
        }
    }

    /// Log in unless the current session is still within its TTL.
    pub async fn ensure_session(&mut self) -> Result<(), Error> {
        if self.login_expired(Utc::now()) {
            self.login().await?;
        }
        Ok(())
    }

    /// Full login followed by device discovery.
    pub async fn login(&mut self) -> Result<LoginSummary, Error> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            Error::Configuration(
                "Upstream credentials not configured (set GROWATT_USERNAME and GROWATT_PASSWORD)"
                    .to_string(),
            )
        })?;

        self.session.last_login = None;
        self.client.clear_cookies();

        let request = UpstreamRequest::post_form("login", endpoint::LOGIN)
            .param("userName", credentials.username.as_str())
            .param("password", hash_password(&credentials.password));

        let response = self.client.fetch(&request).await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Error reading login response: {}", e)))?;
        log::trace!("login: {}", text);

        let value = serde_json::from_str::<Value>(&text).map_err(|e| {
            Error::Authentication(format!(
                "unexpected login response (server responded {}): {}",
                status, e
            ))
        })?;

        let back = value
            .get("back")
            .ok_or_else(|| Error::Authentication("login response has no `back` envelope".into()))?;

        if !is_true(back.get("success")) {
            let message = first_string(back, &["msg", "error", "errorMsg"])
                .unwrap_or_else(|| "login rejected by upstream".to_string());
            return Err(Error::Authentication(message));
        }

        let plant = back
            .get("data")
            .and_then(Value::as_array)
            .and_then(|plants| plants.first())
            .ok_or_else(|| Error::Authentication("no plants found for this account".into()))?;

        if !self.client.has_cookies() {
            return Err(Error::Authentication(
                "upstream accepted the login but issued no session cookie".into(),
            ));
        }

        let user = back.get("user").cloned().unwrap_or(Value::Null);
        let plant_id = first_string(plant, &["plantId", "id"]);
        let device_sn = match &plant_id {
            Some(plant_id) => self.discover_device(plant_id).await,
            None => {
                log::warn!("Login returned a plant without id; skipping device discovery");
                None
            }
        };
        /* a flaky device listing must not drop the device of the same plant */
        let device_sn = match device_sn {
            Some(device_sn) => Some(device_sn),
            None if plant_id.is_some() && plant_id == self.session.plant_id => {
                self.session.device_sn.take()
            }
            None => None,
        };

        self.session = Session {
            plant_name: first_string(plant, &["plantName", "name"]),
            user_id: first_string(&user, &["id", "userId"]),
            /* upstream spells it "counrty" in some versions */
            country: first_string(&user, &["country", "counrty"]),
            plant_id,
            device_sn,
            last_login: Some(Utc::now()),
        };

        log::info!(
            "Logged in as user {:?}, plant {:?} ({:?}), device {:?}",
            self.session.user_id,
            self.session.plant_name,
            self.session.plant_id,
            self.session.device_sn
        );

        Ok(self.summary())
    }

    pub fn summary(&self) -> LoginSummary {
        LoginSummary {
            plant_name: self.session.plant_name.clone(),
            plant_id: self.session.plant_id.clone(),
            user_id: self.session.user_id.clone(),
            country: self.session.country.clone(),
            device_sn: self.session.device_sn.clone(),
        }
    }

    /// Serial of the plant's first device, trying the secondary listing when the primary is empty.
    async fn discover_device(&mut self, plant_id: &str) -> Option<String> {
        let requests = [
            UpstreamRequest::get("device list", endpoint::DEVICES)
                .param("op", endpoint::OP_DEVICE_LIST)
                .param("plantId", plant_id)
                .param("language", "1"),
            UpstreamRequest::post_form("device list fallback", endpoint::DEVICES_FALLBACK)
                .param("plantId", plant_id)
                .param("currPage", "1"),
        ];

        for request in requests.iter() {
            match self.fetch_json(request).await {
                Ok(value) => {
                    if let Some(device_sn) = first_device_sn(&value) {
                        log::info!("Using device {} ({})", device_sn, request.label);
                        return Some(device_sn);
                    }
                    log::debug!("{}: no devices listed", request.label);
                }
                Err(e) => log::warn!("{}: {}", request.label, e),
            }
        }

        log::warn!("No device discovered for plant {}", plant_id);
        None
    }

    /// Plant id and device serial, or `Error::NoDevice` when discovery found nothing.
    pub fn require_device(&self) -> Result<(String, String), Error> {
        let plant_id = self.session.plant_id.clone().unwrap_or_default();
        match &self.session.device_sn {
            Some(device_sn) => Ok((plant_id, device_sn.clone())),
            None => Err(Error::NoDevice(plant_id)),
        }
    }

    async fn fetch_json(&mut self, request: &UpstreamRequest) -> Result<Value, Error> {
        let response = self.client.fetch(request).await?;
        response::parse_tolerant(response, request.label).await
    }

    /// Run `request`; when upstream answers with its login page, log in again and retry once.
    pub async fn with_session_retry(&mut self, request: &UpstreamRequest) -> Result<Value, Error> {
        match self.fetch_json(request).await {
            Err(Error::SessionExpired(label)) => {
                log::warn!("{}: session expired, logging in again", label);
                self.invalidate();
                self.ensure_session().await?;

                match self.fetch_json(request).await {
                    Err(Error::SessionExpired(label)) => Err(Error::InvalidResponse(
                        label,
                        "login page returned again after re-login".to_string(),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }
}

fn is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn first_device_sn(value: &Value) -> Option<String> {
    DEVICE_LIST_PATHS
        .iter()
        .filter_map(|path| {
            path.iter()
                .try_fold(value, |v, key| v.get(*key))
                .and_then(Value::as_array)
        })
        .find(|devices| !devices.is_empty())
        .and_then(|devices| devices.first())
        .and_then(|device| first_string(device, &DEVICE_SN_KEYS))
}
