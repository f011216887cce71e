//! Actions backed by SQL files read at invocation time.

use crate::action::Action;
use crate::error::Error;
use crate::sdk::{ActionHandler, Actions, BoxAction};
use crate::state::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn script_handler(path: PathBuf, context: Context) -> impl ActionHandler {
    move |action: BoxAction| {
        let context = context.clone();
        let path = path.clone();
        async move {
            let mut action = Action::init(action, context);
            action.script(&path).await;
            action.run()
        }
    }
}

/// One handler per `*.sql` file in `dir`, sorted by name. Files are re-read on every call.
pub fn script_actions(dir: &Path, context: &Context) -> Result<Actions, Error> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "sql").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut actions: Actions = Vec::with_capacity(paths.len());
    for path in paths {
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(name) => name.to_string(),
            None => {
                tracing::warn!("script {} has no usable name, skipping", path.display());
                continue;
            }
        };
        let handler: Arc<dyn ActionHandler> = Arc::new(script_handler(path, context.clone()));
        actions.push((name, handler));
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::SCRIPT_UNREADABLE;
    use crate::mock::{MockAction, MockConnector, MockService};
    use crate::Service;
    use serde_json::json;

    #[tokio::test]
    async fn each_sql_file_becomes_an_action() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top_users.sql"), "SELECT * FROM top_users()").unwrap();
        std::fs::write(dir.path().join("active.sql"), "SELECT * FROM active_users()").unwrap();
        std::fs::write(dir.path().join("README.md"), "not a script").unwrap();

        let connector = MockConnector::returning(vec![json!({"id": 1}), json!({"id": 2})]);
        let ctx = Context::new(Settings::parse("[database]\ndsn = x\n").unwrap()).with_connector(connector.clone());
        let runtime = MockService::default();
        let mut service = Service::init(ctx, Box::new(runtime.clone()), vec![]);
        service.scripts(dir.path()).unwrap();
        assert_eq!(runtime.registered(), vec!["status", "active", "top_users"]);

        let t = runtime.dispatch("top_users", MockAction::new("users", "1")).await.unwrap();
        assert_eq!(t.collection().unwrap().len(), 2);
        assert_eq!(connector.statements(), vec!["SELECT * FROM top_users()"]);
    }

    #[tokio::test]
    async fn deleted_script_reports_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.sql");
        std::fs::write(&path, "SELECT 1").unwrap();
        let ctx = Context::new(Settings::default());
        let actions = script_actions(dir.path(), &ctx).unwrap();
        std::fs::remove_file(&path).unwrap();

        let (_, handler) = &actions[0];
        let t = handler.call(MockAction::new("users", "1").boxed()).await.into_transport();
        assert_eq!(t.errors[0].code, SCRIPT_UNREADABLE);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let ctx = Context::new(Settings::default());
        assert!(matches!(script_actions(Path::new("/nonexistent/scripts"), &ctx), Err(Error::Io(_))));
    }
}
