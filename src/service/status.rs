//! Built-in `status` health action.

use crate::action::Action;
use crate::sdk::{ActionHandler, BoxAction};
use crate::state::Context;
use serde::Serialize;

pub const STATUS_ACTION: &str = "status";

#[derive(Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub time: String,
}

/// Replies with `{status: "OK", service, version, time}` as the entity.
pub fn status_handler(context: Context) -> impl ActionHandler {
    move |action: BoxAction| {
        let context = context.clone();
        async move {
            let body = StatusBody {
                status: "OK",
                service: action.name().to_string(),
                version: action.version().to_string(),
                time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            };
            let mut action = Action::init(action, context);
            action.set_entity(body);
            action.run()
        }
    }
}
