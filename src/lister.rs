use tracing::{error, info, span, Level};

use crate::{connection, model};

pub const PAGE_SIZE: i32 = 1000;
const PROGRESS_EVERY: usize = 1000;

/// Lists every object under the connection's prefix filter, sorted by key.
///
/// Pages are accumulated in full before returning, so callers see either the
/// complete listing or an error.
pub fn list_objects(
    state: &connection::ConnectionState,
) -> Result<Vec<model::object::ObjectRecord>, model::error::ObjectError> {
    let span = span!(Level::INFO, "list_objects", context = "list_objects");
    let _e = span.enter();

    let session = state.session().inspect_err(|err| {
        error!(error_message = %err, error_group = "not_connected");
    })?;
    info!(bucket = %session.bucket, prefix = %session.prefix, "called");

    let mut objects = Vec::new();
    let mut continuation_token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = session
            .client
            .list_objects_page(&session.bucket, &session.prefix, continuation_token, PAGE_SIZE)
            .inspect_err(|err| {
                error!(error_message = %err, error_group = "list_objects", pages = pages);
            })?;
        pages += 1;

        let before = objects.len();
        objects.extend(page.records);
        if objects.len() / PROGRESS_EVERY > before / PROGRESS_EVERY {
            info!(count = objects.len(), "loaded objects so far");
        }

        continuation_token = page.next_continuation_token;
        if continuation_token.is_none() {
            break;
        }
    }

    objects.sort_by(|a, b| a.key.cmp(&b.key));

    info!(count = objects.len(), pages = pages, "listed");
    Ok(objects)
}
