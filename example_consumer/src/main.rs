//! Demo service on the bundled HTTP runtime.
//!
//! Run from repo root: `TAO_SETTINGS_DIR=example_consumer/settings cargo run -p example-consumer`
//! then `curl localhost:3000/status` or `curl 'localhost:3000/users?role=admin'`.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tao_sdk::{Action, ActionHandler, Actions, BoxAction, Context, Error, ParamSource, Plugin, Plugins, Service};

/// Logs every call it sees together with its arguments.
struct Audit {
    calls: usize,
}

#[async_trait]
impl Plugin<Action> for Audit {
    async fn run(&mut self, action: &mut Action, args: &[Value]) -> Result<(), Error> {
        self.calls += 1;
        action.log(&format!("audit #{} {}", self.calls, Value::from(args.to_vec())));
        Ok(())
    }
}

fn users(context: Context) -> Arc<dyn ActionHandler> {
    Arc::new(move |action: BoxAction| {
        let context = context.clone();
        async move {
            let mut action = Action::init(action, context);
            let audited = action.plugin("audit", &[Value::from("users")]).await.err();
            if let Some(e) = audited {
                action.report(&e);
            }
            action
                .collection("users_search", ParamSource::location("query"))
                .await
                .link("self", "/users");
            action.run()
        }
    })
}

fn user(context: Context) -> Arc<dyn ActionHandler> {
    Arc::new(move |action: BoxAction| {
        let context = context.clone();
        async move {
            let mut action = Action::init(action, context);
            let id = action
                .action()
                .params(None)
                .into_iter()
                .find(|p| p.name == "id")
                .map(|p| p.value);
            match id {
                Some(id) => {
                    let link = format!("/users?id={}", id);
                    action
                        .entity("users_get", ParamSource::explicit([("id", id)]))
                        .await
                        .relation("id", "roles", "role_id")
                        .link("self", &link);
                }
                None => {
                    action.error_with_status("missing param: id", 400, "400 Bad Request");
                }
            }
            action.run()
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tao_sdk=info")),
        )
        .init();

    let plugins = Plugins::new().with("audit", |_: &Action| Audit { calls: 0 });
    let context = Context::load()?.with_plugins(plugins);

    let actions: Actions = vec![
        ("users".into(), users(context.clone())),
        ("user".into(), user(context.clone())),
    ];
    let mut service = Service::http(context, actions)?;
    service
        .scripts(Path::new("example_consumer/scripts"))?
        .startup(|| tracing::info!("demo service up"))
        .shutdown(|| tracing::info!("demo service down"));
    service.run().await?;
    Ok(())
}
