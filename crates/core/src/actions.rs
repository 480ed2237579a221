//! Built-in actions bound to the process services.

use std::sync::Arc;

use serde_json::Value;

use crate::catalog::Catalog;
use crate::notification;
use crate::registry::Action;
use crate::response::ValidationResponse;
use crate::services::Services;
use crate::util::now;

/// Catalog id of [`save_result_into_database`].
pub const SAVE_RESULT_INTO_DATABASE: &str = "save_result_into_database";
/// Catalog id of [`notify_in_thread`].
pub const NOTIFY_IN_THREAD: &str = "notify_in_thread";
/// Catalog id of [`notify_in_single_message`].
pub const NOTIFY_IN_SINGLE_MESSAGE: &str = "notify_in_single_message";

/// Stores the response as the validation's latest result.
pub fn save_result_into_database(services: &Arc<Services>) -> Action {
    let services = Arc::clone(services);
    Action::new(SAVE_RESULT_INTO_DATABASE, move |response: &ValidationResponse, _settings: &Value| {
        services.repositories.validation.save_validation_result(response)
    })
}

/// Drives the notification thread of the validation from its response.
pub fn notify_in_thread(services: &Arc<Services>) -> Action {
    let services = Arc::clone(services);
    Action::new(NOTIFY_IN_THREAD, move |response: &ValidationResponse, settings: &Value| {
        notification::notify_in_thread(&services, response, settings, now())
    })
}

/// Sends one message per notifier when the response is not `NORMAL`.
pub fn notify_in_single_message(services: &Arc<Services>) -> Action {
    let services = Arc::clone(services);
    Action::new(NOTIFY_IN_SINGLE_MESSAGE, move |response: &ValidationResponse, settings: &Value| {
        notification::notify_in_single_message(&services, response, settings, now())
    })
}

pub(crate) fn register(catalog: &mut Catalog, services: &Arc<Services>) {
    catalog.register_action(save_result_into_database(services));
    catalog.register_action(notify_in_thread(services));
    catalog.register_action(notify_in_single_message(services));
}
