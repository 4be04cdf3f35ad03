use lambda_http::{http::StatusCode, Body, Error, Response};
use uuid::Uuid;

use crate::error::{json_response, AppError};
use crate::logs::{describe_requester, record_audit};
use crate::store;
use crate::types::{CreatePointsRequest, PointsPage, UserPoint};
use crate::users::fetch_user;
use crate::{AppState, Config, RequestMeta};

pub const ERROR_INVALID_POINTS_DATA: &str = "invalid points data";
pub const ERROR_INVALID_POINTS_ID: &str = "invalid points id";

const SCAN_PAGE_LIMIT: i32 = 100;

/// All points accounts held by one user. An empty list is not an error
/// here; callers that require existence check for themselves.
pub async fn fetch_user_points(
    state: &AppState,
    config: &Config,
    user_id: &str,
) -> Result<Vec<UserPoint>, AppError> {
    store::query_eq(
        &state.dynamo_client,
        &config.points_table,
        None,
        &[("user_id", user_id)],
    )
    .await
}

/// Pick the account an update applies to by matching `points_id` against
/// the user's existing rows. A miss reports the marshal error message
/// rather than a not-found; callers have come to expect that string.
pub fn select_points_update(
    accounts: &[UserPoint],
    update: &UserPoint,
) -> Result<UserPoint, AppError> {
    if update.points_id.is_empty() {
        return Err(AppError::InvalidInput(ERROR_INVALID_POINTS_ID.to_string()));
    }
    if accounts.iter().any(|a| a.points_id == update.points_id) {
        Ok(update.clone())
    } else {
        Err(AppError::InvalidInput(
            store::ERROR_COULD_NOT_MARSHAL_ITEM.to_string(),
        ))
    }
}

/// Overwrite one points row. The shared path for the update handler and
/// for approved maker requests targeting a points account.
pub async fn apply_points_update(
    state: &AppState,
    config: &Config,
    update: &UserPoint,
    meta: &RequestMeta,
) -> Result<UserPoint, AppError> {
    let accounts = fetch_user_points(state, config, &update.user_id).await?;
    let old_points = accounts
        .iter()
        .find(|a| a.points_id == update.points_id)
        .map(|a| a.points);
    let selected = select_points_update(&accounts, update)?;

    store::put(&state.dynamo_client, &config.points_table, &selected).await?;

    // Name lookup is only for the audit line; never fail the update on it.
    match fetch_user(state, config, &selected.user_id).await {
        Ok(user) => {
            record_audit(
                state,
                config,
                meta,
                format!(
                    "{} adjusted points of {} {} from {} to {}",
                    describe_requester(&meta.requester),
                    user.first_name,
                    user.last_name,
                    old_points.unwrap_or_default(),
                    selected.points
                ),
            )
            .await;
        }
        Err(e) => tracing::error!("skipping points audit log: {}", e),
    }

    Ok(selected)
}

/// POST /points - open a fresh zero-balance account for a user.
pub async fn create_points(
    state: &AppState,
    config: &Config,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    match create_points_op(state, config, body).await {
        Ok(points) => json_response(StatusCode::OK, &points),
        Err(err) => err.into_response(),
    }
}

async fn create_points_op(
    state: &AppState,
    config: &Config,
    body: &[u8],
) -> Result<UserPoint, AppError> {
    let req: CreatePointsRequest = serde_json::from_slice(body)
        .map_err(|_| AppError::InvalidInput(ERROR_INVALID_POINTS_DATA.to_string()))?;
    if req.user_id.is_empty() {
        return Err(AppError::InvalidInput(ERROR_INVALID_POINTS_DATA.to_string()));
    }

    fetch_user(state, config, &req.user_id).await?;

    let points = UserPoint {
        user_id: req.user_id,
        points_id: Uuid::new_v4().to_string(),
        points: 0,
    };
    store::put(&state.dynamo_client, &config.points_table, &points).await?;

    Ok(points)
}

/// GET /points - a user's accounts when ?user_id= is present, one scan
/// page otherwise (composite cursor).
pub async fn get_points(
    state: &AppState,
    config: &Config,
    user_id: Option<String>,
    key_user: Option<String>,
    key_point: Option<String>,
) -> Result<Response<Body>, Error> {
    match user_id {
        Some(id) => match fetch_user_points(state, config, &id).await {
            Ok(accounts) => json_response(StatusCode::OK, &accounts),
            Err(err) => err.into_response(),
        },
        None => match list_points_op(state, config, key_user, key_point).await {
            Ok(page) => json_response(StatusCode::OK, &page),
            Err(err) => err.into_response(),
        },
    }
}

async fn list_points_op(
    state: &AppState,
    config: &Config,
    key_user: Option<String>,
    key_point: Option<String>,
) -> Result<PointsPage, AppError> {
    let exclusive_start = store::start_key(&[
        ("user_id", key_user.as_deref()),
        ("points_id", key_point.as_deref()),
    ]);
    let page = store::scan_with_pagination::<UserPoint>(
        &state.dynamo_client,
        &config.points_table,
        SCAN_PAGE_LIMIT,
        exclusive_start,
    )
    .await?;

    Ok(PointsPage {
        data: page.items,
        key_user: store::cursor_field(&page.last_key, "user_id"),
        key_point: store::cursor_field(&page.last_key, "points_id"),
    })
}

/// PUT /points - overwrite one account's balance.
pub async fn update_points(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<Response<Body>, Error> {
    let update: UserPoint = match serde_json::from_slice(body) {
        Ok(update) => update,
        Err(_) => {
            return AppError::InvalidInput(ERROR_INVALID_POINTS_DATA.to_string()).into_response()
        }
    };

    match apply_points_update(state, config, &update, meta).await {
        Ok(points) => json_response(StatusCode::OK, &points),
        Err(err) => err.into_response(),
    }
}

/// DELETE /points
pub async fn delete_points(
    state: &AppState,
    config: &Config,
    user_id: Option<String>,
    points_id: Option<String>,
) -> Result<Response<Body>, Error> {
    match delete_points_op(state, config, user_id, points_id).await {
        Ok(()) => json_response(StatusCode::OK, &serde_json::json!({"deleted": true})),
        Err(err) => err.into_response(),
    }
}

async fn delete_points_op(
    state: &AppState,
    config: &Config,
    user_id: Option<String>,
    points_id: Option<String>,
) -> Result<(), AppError> {
    let user_id =
        user_id.ok_or_else(|| AppError::InvalidInput(ERROR_INVALID_POINTS_DATA.to_string()))?;
    let points_id =
        points_id.ok_or_else(|| AppError::InvalidInput(ERROR_INVALID_POINTS_ID.to_string()))?;

    store::delete(
        &state.dynamo_client,
        &config.points_table,
        &[("user_id", &user_id), ("points_id", &points_id)],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(points_id: &str, points: i64) -> UserPoint {
        UserPoint {
            user_id: "U1".to_string(),
            points_id: points_id.to_string(),
            points,
        }
    }

    #[test]
    fn update_applies_payload_when_points_id_matches() {
        let accounts = vec![account("P1", 10), account("P2", 25)];
        let selected = select_points_update(&accounts, &account("P1", 50)).unwrap();
        assert_eq!(selected, account("P1", 50));
    }

    #[test]
    fn update_miss_reports_the_marshal_message() {
        let accounts = vec![account("P1", 10)];
        let err = select_points_update(&accounts, &account("P9", 50)).unwrap_err();
        assert_eq!(err.to_string(), store::ERROR_COULD_NOT_MARSHAL_ITEM);
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn update_requires_a_points_id() {
        let err = select_points_update(&[], &account("", 50)).unwrap_err();
        assert_eq!(err.to_string(), ERROR_INVALID_POINTS_ID);
    }
}
