#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use growatt_proxy::model::{SessionStatus, Snapshot};
use growatt_proxy::normalize::Source;
use growatt_proxy::{settings, Dashboard, Error};
use rocket::response::Debug;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

mod metrics;

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct DataBody<'a> {
    cached: bool,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

fn failure(error: Error) -> Json<Value> {
    log::warn!("Request failed: {}", error);
    Json(json!({ "success": false, "error": error.to_string() }))
}

/// Wrap `result` in the `{success, ...}` envelope. Domain errors are never HTTP errors.
fn respond<T: Serialize>(result: Result<T, Error>) -> Json<Value> {
    let value = result.and_then(|body| {
        serde_json::to_value(Success {
            success: true,
            body,
        })
        .map_err(|e| Error::Internal(e.to_string()))
    });

    match value {
        Ok(value) => Json(value),
        Err(e) => failure(e),
    }
}

#[get("/connect")]
async fn connect_route(dashboard: &State<Dashboard>) -> Json<Value> {
    respond(dashboard.connect().await)
}

#[get("/data")]
async fn data_route(dashboard: &State<Dashboard>) -> Json<Value> {
    match dashboard.data().await {
        Ok(outcome) => {
            if !outcome.cached {
                metrics::record(&outcome.snapshot);
            }
            respond(Ok(DataBody {
                cached: outcome.cached,
                snapshot: &outcome.snapshot,
            }))
        }
        Err(e) => failure(e),
    }
}

#[get("/status")]
fn status_route(dashboard: &State<Dashboard>) -> Json<SessionStatus> {
    Json(dashboard.status())
}

/// Unwrapped upstream payloads, for working out field names of new firmware
#[get("/debug")]
async fn debug_route(dashboard: &State<Dashboard>) -> Json<Value> {
    respond(dashboard.raw_sources().await.map(|raw| {
        let sources: BTreeMap<&str, &Value> = Source::ALL
            .iter()
            .map(|source| (source.label(), raw.get(*source)))
            .collect();
        json!({ "sources": sources, "errors": raw.errors })
    }))
}

#[get("/fields")]
async fn fields_route(dashboard: &State<Dashboard>) -> Json<Value> {
    respond(dashboard.raw_sources().await.map(|raw| {
        let fields: BTreeMap<&str, Vec<&String>> = Source::ALL
            .iter()
            .map(|source| {
                let mut keys: Vec<&String> = raw
                    .get(*source)
                    .as_object()
                    .map(|object| object.keys().collect())
                    .unwrap_or_default();
                keys.sort();
                (source.label(), keys)
            })
            .collect();
        json!({ "fields": fields, "errors": raw.errors })
    }))
}

#[get("/metrics")]
async fn metrics_route(dashboard: &State<Dashboard>) -> Result<String, Debug<Error>> {
    match dashboard.data().await {
        Ok(outcome) => metrics::record(&outcome.snapshot),
        Err(e) => log::warn!("Serving stale metrics: {}", e),
    }
    metrics::read().map_err(Debug)
}

fn build_rocket(dashboard: Dashboard) -> Rocket<Build> {
    rocket::build()
        .manage(dashboard)
        .mount(
            "/api",
            routes![connect_route, data_route, status_route, debug_route, fields_route],
        )
        .mount("/", routes![metrics_route])
}

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let settings = settings::read_settings()?;
    if settings.username.is_none() || settings.password.is_none() {
        log::warn!(
            "GROWATT_USERNAME or GROWATT_PASSWORD not set; connect and data requests will fail"
        );
    }
    let dashboard = Dashboard::from_settings(&settings)?;

    build_rocket(dashboard).launch().await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use growatt_proxy::api::Client;
    use growatt_proxy::session::{Credentials, SessionManager};
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use rocket::http::Status;
    use rocket::local::asynchronous::Client as LocalClient;
    use std::time::Duration;

    fn dashboard(url: &str, credentials: Option<Credentials>) -> Dashboard {
        let client = Client::new(url, Duration::from_secs(5)).unwrap();
        let sessions = SessionManager::new(client, credentials, Duration::from_secs(1800));
        Dashboard::new(sessions, Duration::from_secs(60))
    }

    fn credentials() -> Option<Credentials> {
        Some(Credentials {
            username: "user".to_string(),
            password: "abc".to_string(),
        })
    }

    async fn local(dashboard: Dashboard) -> LocalClient {
        LocalClient::tracked(build_rocket(dashboard)).await.unwrap()
    }

    async fn get_json(client: &LocalClient, uri: &str) -> Value {
        let response = client.get(uri.to_string()).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        response.into_json::<Value>().await.unwrap()
    }

    async fn upstream(server: &mut ServerGuard) -> Vec<Mock> {
        let mut mocks = vec![
            server
                .mock("POST", "/newTwoLoginAPI.do")
                .with_header("set-cookie", "JSESSIONID=e2e; Path=/")
                .with_body(
                    r#"{"back":{"success":true,"data":[{"plantId":"9001","plantName":"Home"}],"user":{"id":"7","country":"Italy"}}}"#,
                )
                .expect(1)
                .create_async()
                .await,
            server
                .mock("GET", "/newTwoPlantAPI.do")
                .match_query(Matcher::Any)
                .with_body(r#"{"deviceList":[{"deviceSn":"XYZ123"}]}"#)
                .create_async()
                .await,
            server
                .mock("GET", "/newStorageAPI.do")
                .match_query(Matcher::UrlEncoded("op".into(), "getStorageInfo_sacolar".into()))
                .match_header("cookie", "JSESSIONID=e2e")
                .with_body(r#"{"obj":{"capacity":"55","vbat":"51.2"}}"#)
                .expect(1)
                .create_async()
                .await,
        ];
        for op in &["getEnergyOverviewData_sacolar", "getStorageParams_sacolar"] {
            mocks.push(
                server
                    .mock("GET", "/newStorageAPI.do")
                    .match_query(Matcher::UrlEncoded("op".into(), op.to_string()))
                    .with_body(r#"{"obj":{}}"#)
                    .create_async()
                    .await,
            );
        }
        mocks.push(
            server
                .mock("GET", "/newPlantDetailAPI.do")
                .match_query(Matcher::Any)
                .with_body(r#"{"back":{"plantData":{}}}"#)
                .create_async()
                .await,
        );
        mocks
    }

    #[rocket::async_test]
    async fn end_to_end_data() {
        let mut server = Server::new_async().await;
        let mocks = upstream(&mut server).await;
        let client = local(dashboard(&server.url(), credentials())).await;

        let connect = get_json(&client, "/api/connect").await;
        assert_eq!(
            json!({
                "success": true,
                "plantName": "Home",
                "plantId": "9001",
                "userId": "7",
                "country": "Italy",
                "deviceSn": "XYZ123"
            }),
            connect
        );

        let first = get_json(&client, "/api/data").await;
        assert_eq!(json!(true), first["success"]);
        assert_eq!(json!(false), first["cached"]);
        assert_eq!(json!(55.0), first["battery"]["soc"]);
        assert_eq!(json!(51.2), first["battery"]["voltage"]);
        assert!(first["timestamp"].is_string());

        let second = get_json(&client, "/api/data").await;
        assert_eq!(json!(true), second["cached"]);
        assert_eq!(first["battery"], second["battery"]);
        assert_eq!(first["timestamp"], second["timestamp"]);

        let status = get_json(&client, "/api/status").await;
        assert_eq!(json!(true), status["connected"]);
        assert_eq!(json!("XYZ123"), status["deviceSn"]);
        assert_eq!(first["timestamp"], status["lastFetch"]);

        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[rocket::async_test]
    async fn missing_credentials_reported_in_body() {
        let client = local(dashboard("http://127.0.0.1:9", None)).await;

        for uri in &["/api/connect", "/api/data", "/api/debug", "/api/fields"] {
            let body = get_json(&client, uri).await;
            assert_eq!(json!(false), body["success"], "{}", uri);
            assert!(body["error"].as_str().unwrap().contains("GROWATT_USERNAME"));
        }

        let status = get_json(&client, "/api/status").await;
        assert_eq!(
            json!({
                "connected": false,
                "plantName": null,
                "deviceSn": null,
                "lastLogin": null,
                "lastFetch": null
            }),
            status
        );
    }

    #[rocket::async_test]
    async fn unreachable_upstream_is_not_an_http_error() {
        let client = local(dashboard("http://127.0.0.1:9", credentials())).await;

        let body = get_json(&client, "/api/data").await;
        assert_eq!(json!(false), body["success"]);
        assert!(body["error"].as_str().unwrap().starts_with("network error"));
    }

    #[rocket::async_test]
    async fn fields_lists_raw_keys() {
        let mut server = Server::new_async().await;
        let _mocks = upstream(&mut server).await;
        let client = local(dashboard(&server.url(), credentials())).await;

        let body = get_json(&client, "/api/fields").await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(["capacity", "vbat"]), body["fields"]["storageDetail"]);
        assert_eq!(json!([]), body["fields"]["energyOverview"]);

        let debug = get_json(&client, "/api/debug").await;
        assert_eq!(json!("51.2"), debug["sources"]["storageDetail"]["vbat"]);
    }
}
