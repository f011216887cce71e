//! `GET|POST /:action` dispatch. Query-string pairs become `"query"` params
//! (strings); a JSON object body becomes typed `"body"` params. The handler's
//! transport is the JSON response, with the status taken from its first error.

use crate::config::ServiceSettings;
use crate::error::Error;
use crate::response::{Data, Relation, Transport};
use crate::sdk::{parse_status, ActionHandler, Hook, Related, Row, SdkAction, SdkError, SdkService};
use crate::sql::Param;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Code on errors raised by the HTTP runtime itself.
const RUNTIME_ERROR_CODE: i64 = 0;

/// One HTTP request seen as an action invocation.
pub struct HttpAction {
    service: String,
    version: String,
    action: String,
    params: Vec<Param>,
    transport: Transport,
}

impl HttpAction {
    pub fn new(settings: &ServiceSettings, action: &str, params: Vec<Param>) -> Self {
        HttpAction {
            service: settings.name.clone(),
            version: settings.version.clone(),
            action: action.to_string(),
            params,
            transport: Transport::default(),
        }
    }
}

impl SdkAction for HttpAction {
    fn name(&self) -> &str {
        &self.service
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn action_name(&self) -> &str {
        &self.action
    }

    fn params(&self, location: Option<&str>) -> Vec<Param> {
        match location {
            None => self.params.clone(),
            Some(location) => self
                .params
                .iter()
                .filter(|p| p.location.as_deref() == Some(location))
                .cloned()
                .collect(),
        }
    }

    fn log(&self, message: &str) {
        tracing::info!(service = %self.service, action = %self.action, "{}", message);
    }

    fn set_entity(&mut self, entity: Row) -> Result<(), SdkError> {
        self.transport.data = Some(Data::Entity(entity));
        Ok(())
    }

    fn set_collection(&mut self, collection: Vec<Row>) -> Result<(), SdkError> {
        self.transport.data = Some(Data::Collection(collection));
        Ok(())
    }

    fn relate_one(&mut self, pk: &str, kind: &str, fk: &str) -> Result<(), SdkError> {
        self.transport.relations.push(Relation {
            pk: pk.to_string(),
            kind: kind.to_string(),
            fk: Related::One(fk.to_string()),
        });
        Ok(())
    }

    fn relate_many(&mut self, pk: &str, kind: &str, fks: &[String]) -> Result<(), SdkError> {
        self.transport.relations.push(Relation {
            pk: pk.to_string(),
            kind: kind.to_string(),
            fk: Related::Many(fks.to_vec()),
        });
        Ok(())
    }

    fn link(&mut self, link: &str, uri: &str) -> Result<(), SdkError> {
        if link.is_empty() {
            return Err(SdkError::new("link name must not be empty", RUNTIME_ERROR_CODE));
        }
        self.transport.links.insert(link.to_string(), uri.to_string());
        Ok(())
    }

    fn error(&mut self, message: &str, code: i64, status: &str) -> Result<(), SdkError> {
        if parse_status(status).is_none() {
            return Err(SdkError::new(
                format!("invalid status label: {:?}", status),
                RUNTIME_ERROR_CODE,
            ));
        }
        self.transport.push_error(message, code, status);
        Ok(())
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn into_transport(self: Box<Self>) -> Transport {
        self.transport
    }
}

#[derive(Clone)]
struct HttpState {
    settings: Arc<ServiceSettings>,
    handlers: Arc<HashMap<String, Arc<dyn ActionHandler>>>,
}

pub struct HttpService {
    settings: ServiceSettings,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    startup: Vec<Hook>,
    shutdown: Vec<Hook>,
}

impl HttpService {
    pub fn new(settings: ServiceSettings) -> Self {
        HttpService {
            settings,
            handlers: HashMap::new(),
            startup: Vec::new(),
            shutdown: Vec::new(),
        }
    }

    /// Router over the handlers registered so far.
    pub fn router(&self) -> Router {
        let state = HttpState {
            settings: Arc::new(self.settings.clone()),
            handlers: Arc::new(self.handlers.clone()),
        };
        Router::new()
            .route("/:action", get(dispatch).post(dispatch))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(self.settings.body_limit)),
            )
    }
}

#[async_trait]
impl SdkService for HttpService {
    fn action(&mut self, name: &str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    fn startup(&mut self, hook: Hook) {
        self.startup.push(hook);
    }

    fn shutdown(&mut self, hook: Hook) {
        self.shutdown.push(hook);
    }

    async fn run(self: Box<Self>) -> Result<(), Error> {
        let router = self.router();
        let HttpService {
            settings,
            startup,
            shutdown,
            ..
        } = *self;
        for hook in startup {
            hook();
        }
        let listener = TcpListener::bind(settings.address.as_str()).await?;
        tracing::info!(
            "{} {} listening on {}",
            settings.name,
            settings.version,
            listener.local_addr()?
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        for hook in shutdown {
            hook();
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

fn failure(status: StatusCode, message: String) -> (StatusCode, Json<Transport>) {
    let mut transport = Transport::default();
    let label = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    );
    transport.push_error(&message, RUNTIME_ERROR_CODE, &label);
    (status, Json(transport))
}

fn request_params(query: Vec<(String, String)>, body: &[u8]) -> Result<Vec<Param>, String> {
    let mut params: Vec<Param> = query
        .into_iter()
        .map(|(name, value)| Param::new(name, Value::String(value)).at("query"))
        .collect();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(params);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => {
            params.extend(map.into_iter().map(|(name, value)| Param::new(name, value).at("body")));
            Ok(params)
        }
        Ok(_) => Err("request body must be a JSON object".into()),
        Err(e) => Err(format!("invalid JSON body: {}", e)),
    }
}

async fn dispatch(
    State(state): State<HttpState>,
    Path(action): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> (StatusCode, Json<Transport>) {
    let handler = match state.handlers.get(&action) {
        Some(handler) => handler.clone(),
        None => return failure(StatusCode::NOT_FOUND, format!("action not found: {}", action)),
    };
    let params = match request_params(query, &body) {
        Ok(params) => params,
        Err(message) => return failure(StatusCode::BAD_REQUEST, message),
    };
    tracing::debug!(action = %action, params = params.len(), "dispatch");
    let request = Box::new(HttpAction::new(&state.settings, &action, params));
    let transport = handler.call(request).await.into_transport();
    let status = StatusCode::from_u16(transport.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(transport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ERROR_STATUS};
    use crate::config::Settings;
    use crate::sdk::BoxAction;
    use crate::sql::ParamType;
    use crate::state::Context;
    use crate::Service;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn settings() -> ServiceSettings {
        ServiceSettings {
            name: "users".into(),
            version: "3.0.0".into(),
            ..ServiceSettings::default()
        }
    }

    fn echo_params() -> Arc<dyn ActionHandler> {
        Arc::new(|action: BoxAction| async move {
            let body: Vec<Value> = action
                .params(None)
                .into_iter()
                .map(|p| serde_json::to_value(p).unwrap())
                .collect();
            let mut action = Action::init(action, Context::new(Settings::default()));
            action.set_entity(json!({ "params": body }));
            action.run()
        })
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_action_over_http() {
        let context = Context::new(Settings::default());
        let mut service = HttpService::new(settings());
        service.action("status", Arc::new(crate::service::status_handler(context)));
        let (code, body) = call(
            service.router(),
            Request::builder().uri("/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["data"]["status"], json!("OK"));
        assert_eq!(body["data"]["service"], json!("users"));
        assert_eq!(body["data"]["version"], json!("3.0.0"));
    }

    #[tokio::test]
    async fn query_and_body_become_typed_params() {
        let mut service = HttpService::new(settings());
        service.action("echo", echo_params());
        let request = Request::builder()
            .method("POST")
            .uri("/echo?q=ann")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"limit": 10, "active": true}"#))
            .unwrap();
        let (code, body) = call(service.router(), request).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(
            body["data"]["params"],
            json!([
                {"name": "q", "type": "string", "value": "ann", "location": "query"},
                {"name": "limit", "type": "integer", "value": 10, "location": "body"},
                {"name": "active", "type": "boolean", "value": true, "location": "body"}
            ])
        );
    }

    fn blob_request(len: usize) -> Request<Body> {
        let body = format!(r#"{{"blob": "{}"}}"#, "x".repeat(len));
        Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn configured_body_limit_replaces_axum_default() {
        let mut service = HttpService::new(ServiceSettings {
            body_limit: 4 * 1024 * 1024,
            ..settings()
        });
        service.action("echo", echo_params());
        let response = service.router().oneshot(blob_request(3 * 1024 * 1024)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected() {
        let mut service = HttpService::new(ServiceSettings {
            body_limit: 1024,
            ..settings()
        });
        service.action("echo", echo_params());
        let response = service.router().oneshot(blob_request(4096)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unknown_action_is_404() {
        let service = HttpService::new(settings());
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let (code, body) = call(service.router(), request).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["status"], json!("404 Not Found"));
    }

    #[tokio::test]
    async fn non_object_body_is_400() {
        let mut service = HttpService::new(settings());
        service.action("echo", echo_params());
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("[1, 2]"))
            .unwrap();
        let (code, _) = call(service.router(), request).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reported_status_sets_response_code() {
        let mut service = HttpService::new(settings());
        service.action(
            "missing",
            Arc::new(|action: BoxAction| async move {
                let mut action = Action::init(action, Context::new(Settings::default()));
                action.error_with_status("no such user", 7, "404 Not Found");
                action.run()
            }),
        );
        let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();
        let (code, body) = call(service.router(), request).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], json!(7));
    }

    #[test]
    fn malformed_status_label_is_rejected() {
        let mut action = HttpAction::new(&settings(), "x", vec![]);
        assert!(action.error("bad", 1, "teapot").is_err());
        assert!(action.error("ok", 1, ERROR_STATUS).is_ok());
        assert_eq!(action.transport().errors.len(), 1);
    }

    #[test]
    fn params_filter_by_location() {
        let params = vec![
            Param::typed("id", ParamType::Integer, json!(1)).at("body"),
            Param::new("q", json!("x")).at("query"),
        ];
        let action = HttpAction::new(&settings(), "x", params);
        assert_eq!(action.params(Some("query")).len(), 1);
        assert_eq!(action.params(None).len(), 2);
    }

    #[test]
    fn http_constructor_reads_service_section() {
        let settings = Settings::parse("[service]\nname = users\naddress = 127.0.0.1:0\n").unwrap();
        assert!(Service::http(Context::new(settings), vec![]).is_ok());
        let bad = Settings::parse("[service]\nbody_limit = lots\n").unwrap();
        assert!(Service::http(Context::new(bad), vec![]).is_err());
    }
}
