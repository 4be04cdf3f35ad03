use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use uuid::Uuid;

use crate::email::send_maker_request_email;
use crate::error::{json_response, AppError};
use crate::logs::{describe_requester, record_audit};
use crate::points::{apply_points_update, fetch_user_points};
use crate::store;
use crate::types::{
    DecisionRequest, GroupedMakerRequest, MakerPage, MakerRequest, NewMakerRequest, User,
    UserPoint, RESOURCE_POINTS, RESOURCE_USER, STATUS_APPROVED, STATUS_PENDING, STATUS_REJECTED,
};
use crate::users::{apply_user_update, fetch_user, fetch_users_by_role};
use crate::{AppState, Config, RequestMeta};

pub const ERROR_INVALID_MAKER_DATA: &str = "invalid maker data";
pub const ERROR_INVALID_DECISION: &str = "invalid decision";
pub const ERROR_INVALID_RESOURCE_TYPE: &str = "resource type is invalid";
pub const ERROR_INVALID_USER_ID: &str = "invalid user id";
pub const ERROR_TARGET_USER_DOES_NOT_EXIST: &str = "target user does not exist";
pub const ERROR_TARGET_POINTS_DO_NOT_EXIST: &str = "target points does not exist";
pub const ERROR_MAKER_REQUEST_DOES_NOT_EXIST: &str = "target maker request does not exist";
pub const ERROR_MISSING_JSON_FIELDS: &str = "missing json fields";
pub const ERROR_MISSING_QUERY_PARAMETER: &str = "missing query parameter";
pub const ERROR_FAILED_TO_UNMARSHAL_REQUEST_DATA: &str = "failed to unmarshal record";

const SCAN_LIMIT: i32 = 3000;

/// Collapse flat rows into one object per req_id, merging checker roles
/// and keeping the first-seen values of the shared fields. No ordering
/// guarantee on the output.
pub fn format_maker_requests(rows: Vec<MakerRequest>) -> Vec<GroupedMakerRequest> {
    let mut groups: HashMap<String, GroupedMakerRequest> = HashMap::new();
    for row in rows {
        match groups.entry(row.req_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().checker_role.push(row.checker_role),
            Entry::Vacant(entry) => {
                entry.insert(GroupedMakerRequest {
                    req_id: row.req_id,
                    checker_role: vec![row.checker_role],
                    maker_id: row.maker_id,
                    checker_id: row.checker_id,
                    request_status: row.request_status,
                    resource_type: row.resource_type,
                    request_data: row.request_data,
                });
            }
        }
    }
    groups.into_values().collect()
}

/// Expand a new request into one pending row per checker role, all
/// sharing a fresh req_id and an identical payload.
pub fn expand_new_request(new: NewMakerRequest) -> Vec<MakerRequest> {
    let req_id = Uuid::new_v4().to_string();
    new.checker_roles
        .into_iter()
        .map(|checker_role| MakerRequest {
            req_id: req_id.clone(),
            checker_role,
            maker_id: new.maker_id.clone(),
            checker_id: String::new(),
            request_status: STATUS_PENDING.to_string(),
            resource_type: new.resource_type.clone(),
            request_data: new.request_data.clone(),
        })
        .collect()
}

/// Map the submitted decision string onto the terminal status it resolves
/// to. Anything other than approve/reject is rejected outright.
pub fn resolve_decision(decision: &str) -> Result<&'static str, AppError> {
    match decision {
        "approve" => Ok(STATUS_APPROVED),
        "reject" => Ok(STATUS_REJECTED),
        _ => Err(AppError::InvalidInput(ERROR_INVALID_DECISION.to_string())),
    }
}

/// Stamp the resolved status and the deciding checker onto every sibling
/// row of the request group.
pub fn finalize_rows(
    mut rows: Vec<MakerRequest>,
    status: &str,
    checker_id: &str,
) -> Vec<MakerRequest> {
    for row in &mut rows {
        row.request_status = status.to_string();
        row.checker_id = checker_id.to_string();
    }
    rows
}

async fn fetch_rows_by_id(
    state: &AppState,
    config: &Config,
    req_id: &str,
) -> Result<Vec<MakerRequest>, AppError> {
    let rows: Vec<MakerRequest> = store::query_eq(
        &state.dynamo_client,
        &config.maker_table,
        None,
        &[("req_id", req_id)],
    )
    .await?;
    if rows.is_empty() {
        return Err(AppError::NotFound(
            ERROR_MAKER_REQUEST_DOES_NOT_EXIST.to_string(),
        ));
    }
    Ok(rows)
}

async fn fetch_rows_by_id_and_role(
    state: &AppState,
    config: &Config,
    req_id: &str,
    checker_role: &str,
) -> Result<Vec<MakerRequest>, AppError> {
    let rows: Vec<MakerRequest> = store::query_eq(
        &state.dynamo_client,
        &config.maker_table,
        None,
        &[("req_id", req_id), ("checker_role", checker_role)],
    )
    .await?;
    if rows.is_empty() {
        return Err(AppError::NotFound(
            ERROR_MAKER_REQUEST_DOES_NOT_EXIST.to_string(),
        ));
    }
    Ok(rows)
}

/// POST /makers - propose a mutation that needs checker approval.
pub async fn create_request(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<Response<Body>, Error> {
    let new: NewMakerRequest = match serde_json::from_slice(body) {
        Ok(new) => new,
        Err(_) => {
            return AppError::InvalidInput(ERROR_INVALID_MAKER_DATA.to_string()).into_response()
        }
    };

    match create_request_op(state, config, new, meta).await {
        Ok(grouped) => json_response(StatusCode::OK, &grouped),
        Err(err) => err.into_response(),
    }
}

async fn create_request_op(
    state: &AppState,
    config: &Config,
    new: NewMakerRequest,
    meta: &RequestMeta,
) -> Result<Vec<GroupedMakerRequest>, AppError> {
    if new.maker_id.is_empty() || new.checker_roles.is_empty() {
        return Err(AppError::InvalidInput(ERROR_INVALID_MAKER_DATA.to_string()));
    }

    fetch_user(state, config, &new.maker_id)
        .await
        .map_err(|_| AppError::NotFound(ERROR_TARGET_USER_DOES_NOT_EXIST.to_string()))?;

    match new.resource_type.as_str() {
        RESOURCE_USER => {
            let user: User = serde_json::from_value(new.request_data.clone()).map_err(|_| {
                AppError::InvalidInput(store::ERROR_COULD_NOT_MARSHAL_ITEM.to_string())
            })?;
            fetch_user(state, config, &user.user_id)
                .await
                .map_err(|_| AppError::NotFound(ERROR_TARGET_USER_DOES_NOT_EXIST.to_string()))?;
        }
        RESOURCE_POINTS => {
            let points: UserPoint =
                serde_json::from_value(new.request_data.clone()).map_err(|_| {
                    AppError::InvalidInput(store::ERROR_COULD_NOT_MARSHAL_ITEM.to_string())
                })?;
            let accounts = fetch_user_points(state, config, &points.user_id).await?;
            if accounts.is_empty() {
                return Err(AppError::NotFound(
                    ERROR_TARGET_POINTS_DO_NOT_EXIST.to_string(),
                ));
            }
            if points.points_id.is_empty() {
                return Err(AppError::InvalidInput(
                    crate::points::ERROR_INVALID_POINTS_ID.to_string(),
                ));
            }
        }
        _ => {
            return Err(AppError::InvalidInput(
                ERROR_INVALID_RESOURCE_TYPE.to_string(),
            ))
        }
    }

    // Side channel: the request is created whether or not anyone gets
    // the email.
    notify_checkers(state, config, &new.checker_roles).await;

    let rows = expand_new_request(new);
    store::batch_put(&state.dynamo_client, &config.maker_table, &rows).await?;

    record_audit(
        state,
        config,
        meta,
        format!(
            "{} created maker request {}",
            describe_requester(&meta.requester),
            rows[0].req_id
        ),
    )
    .await;

    Ok(format_maker_requests(rows))
}

async fn notify_checkers(state: &AppState, config: &Config, checker_roles: &[String]) {
    for role in checker_roles {
        let users = match fetch_users_by_role(state, config, role).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("failed to fetch checkers for role {}: {}", role, e);
                continue;
            }
        };
        for user in users {
            if let Err(e) = send_maker_request_email(
                &state.ses_client,
                &config.sender_email,
                &user.email,
                &config.panel_url,
            )
            .await
            {
                tracing::error!("failed to notify checker {}: {}", user.email, e);
            }
        }
    }
}

/// PUT /makers/decision - a checker approves or rejects a pending request.
pub async fn submit_decision(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<Response<Body>, Error> {
    let decision: DecisionRequest = match serde_json::from_slice(body) {
        Ok(decision) => decision,
        Err(_) => {
            return AppError::InvalidInput(ERROR_INVALID_MAKER_DATA.to_string()).into_response()
        }
    };

    if decision.request_id.is_empty()
        || decision.checker_role.is_empty()
        || decision.checker_id.is_empty()
        || decision.decision.is_empty()
    {
        return AppError::InvalidInput(ERROR_MISSING_JSON_FIELDS.to_string()).into_response();
    }

    match submit_decision_op(state, config, decision, meta).await {
        Ok(grouped) => json_response(StatusCode::OK, &grouped),
        Err(err) => err.into_response(),
    }
}

async fn submit_decision_op(
    state: &AppState,
    config: &Config,
    decision: DecisionRequest,
    meta: &RequestMeta,
) -> Result<Vec<GroupedMakerRequest>, AppError> {
    // The deciding checker must hold one of the roles the request was
    // fanned out to; anything else never had a row persisted.
    let rows =
        fetch_rows_by_id_and_role(state, config, &decision.request_id, &decision.checker_role)
            .await?;

    let resolved = resolve_decision(&decision.decision)?;

    if resolved == STATUS_APPROVED {
        apply_request_data(state, config, &rows[0], meta).await?;
    }

    // Finalize every sibling row, not just the deciding role's. One batch
    // write, no condition: a concurrent decision for the same group races
    // last-write-wins.
    let all_rows = fetch_rows_by_id(state, config, &decision.request_id).await?;
    let finalized = finalize_rows(all_rows, resolved, &decision.checker_id);
    store::batch_put(&state.dynamo_client, &config.maker_table, &finalized).await?;

    record_audit(
        state,
        config,
        meta,
        format!(
            "{} {} maker request {}",
            describe_requester(&meta.requester),
            resolved,
            decision.request_id
        ),
    )
    .await;

    Ok(format_maker_requests(finalized))
}

/// Apply an approved request's payload to the resource it targets.
async fn apply_request_data(
    state: &AppState,
    config: &Config,
    row: &MakerRequest,
    meta: &RequestMeta,
) -> Result<(), AppError> {
    match row.resource_type.as_str() {
        RESOURCE_USER => {
            let user: User = serde_json::from_value(row.request_data.clone()).map_err(|_| {
                AppError::InvalidInput(ERROR_FAILED_TO_UNMARSHAL_REQUEST_DATA.to_string())
            })?;
            if user.user_id.is_empty() {
                return Err(AppError::InvalidInput(ERROR_INVALID_USER_ID.to_string()));
            }
            fetch_user(state, config, &user.user_id)
                .await
                .map_err(|_| AppError::NotFound(ERROR_TARGET_USER_DOES_NOT_EXIST.to_string()))?;
            apply_user_update(state, config, &user).await
        }
        RESOURCE_POINTS => {
            let points: UserPoint =
                serde_json::from_value(row.request_data.clone()).map_err(|_| {
                    AppError::InvalidInput(store::ERROR_COULD_NOT_MARSHAL_ITEM.to_string())
                })?;
            let accounts = fetch_user_points(state, config, &points.user_id).await?;
            if accounts.is_empty() {
                return Err(AppError::NotFound(
                    ERROR_TARGET_POINTS_DO_NOT_EXIST.to_string(),
                ));
            }
            apply_points_update(state, config, &points, meta).await.map(|_| ())
        }
        _ => Err(AppError::InvalidInput(
            ERROR_INVALID_RESOURCE_TYPE.to_string(),
        )),
    }
}

/// GET /makers - one request group by ?req_id=, a maker's requests by
/// ?maker_id=&status=, or one scan page of everything.
pub async fn get_maker_requests(
    state: &AppState,
    config: &Config,
    req_id: Option<String>,
    maker_id: Option<String>,
    status: Option<String>,
    key_req: Option<String>,
    key_role: Option<String>,
) -> Result<Response<Body>, Error> {
    if let Some(req_id) = req_id {
        return match fetch_rows_by_id(state, config, &req_id).await {
            Ok(rows) => json_response(StatusCode::OK, &format_maker_requests(rows)),
            Err(err) => err.into_response(),
        };
    }

    match (maker_id, status) {
        (Some(maker_id), Some(status)) => {
            match fetch_by_maker_and_status(state, config, &maker_id, &status).await {
                Ok(grouped) => json_response(StatusCode::OK, &grouped),
                Err(err) => err.into_response(),
            }
        }
        (Some(_), None) => {
            AppError::InvalidInput("missing status query param".to_string()).into_response()
        }
        (None, Some(_)) => {
            AppError::InvalidInput("missing maker_id query param".to_string()).into_response()
        }
        (None, None) => match list_requests_op(state, config, key_req, key_role).await {
            Ok(page) => json_response(StatusCode::OK, &page),
            Err(err) => err.into_response(),
        },
    }
}

/// GET /checkers - how a checker finds the requests awaiting their role.
/// Status is mandatory; the role defaults to empty and simply matches
/// nothing.
pub async fn get_checker_requests(
    state: &AppState,
    config: &Config,
    role: Option<String>,
    status: Option<String>,
) -> Result<Response<Body>, Error> {
    let status = match require_status(status) {
        Ok(status) => status,
        Err(err) => return err.into_response(),
    };
    let role = role.unwrap_or_default();

    match fetch_by_role_and_status(state, config, &role, &status).await {
        Ok(grouped) => json_response(StatusCode::OK, &grouped),
        Err(err) => err.into_response(),
    }
}

fn require_status(status: Option<String>) -> Result<String, AppError> {
    match status {
        Some(status) if !status.is_empty() => Ok(status),
        _ => Err(AppError::InvalidInput(
            ERROR_MISSING_QUERY_PARAMETER.to_string(),
        )),
    }
}

async fn fetch_by_role_and_status(
    state: &AppState,
    config: &Config,
    checker_role: &str,
    status: &str,
) -> Result<Vec<GroupedMakerRequest>, AppError> {
    let rows: Vec<MakerRequest> = store::query_eq(
        &state.dynamo_client,
        &config.maker_table,
        Some("checker_role-request_status-index"),
        &[("checker_role", checker_role), ("request_status", status)],
    )
    .await?;
    Ok(format_maker_requests(rows))
}

async fn fetch_by_maker_and_status(
    state: &AppState,
    config: &Config,
    maker_id: &str,
    status: &str,
) -> Result<Vec<GroupedMakerRequest>, AppError> {
    let rows: Vec<MakerRequest> = store::query_eq(
        &state.dynamo_client,
        &config.maker_table,
        Some("maker_id-request_status-index"),
        &[("maker_id", maker_id), ("request_status", status)],
    )
    .await?;
    Ok(format_maker_requests(rows))
}

async fn list_requests_op(
    state: &AppState,
    config: &Config,
    key_req: Option<String>,
    key_role: Option<String>,
) -> Result<MakerPage, AppError> {
    let exclusive_start = store::start_key(&[
        ("req_id", key_req.as_deref()),
        ("checker_role", key_role.as_deref()),
    ]);
    let page = store::scan_with_pagination::<MakerRequest>(
        &state.dynamo_client,
        &config.maker_table,
        SCAN_LIMIT,
        exclusive_start,
    )
    .await?;

    Ok(MakerPage {
        data: format_maker_requests(page.items),
        key_req: store::cursor_field(&page.last_key, "req_id"),
        key_role: store::cursor_field(&page.last_key, "checker_role"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(req_id: &str, checker_role: &str) -> MakerRequest {
        MakerRequest {
            req_id: req_id.to_string(),
            checker_role: checker_role.to_string(),
            maker_id: "M1".to_string(),
            checker_id: String::new(),
            request_status: STATUS_PENDING.to_string(),
            resource_type: RESOURCE_POINTS.to_string(),
            request_data: json!({"user_id": "U1", "points_id": "P1", "points": 50}),
        }
    }

    #[test]
    fn grouping_merges_sibling_rows_by_req_id() {
        let rows = vec![row("R1", "finance"), row("R1", "ops"), row("R2", "finance")];
        let mut grouped = format_maker_requests(rows);
        grouped.sort_by(|a, b| a.req_id.cmp(&b.req_id));

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].req_id, "R1");
        assert_eq!(grouped[0].checker_role.len(), 2);
        assert!(grouped[0].checker_role.contains(&"finance".to_string()));
        assert!(grouped[0].checker_role.contains(&"ops".to_string()));
        assert_eq!(grouped[0].maker_id, "M1");
        assert_eq!(grouped[0].resource_type, RESOURCE_POINTS);
        assert_eq!(
            grouped[0].request_data,
            json!({"user_id": "U1", "points_id": "P1", "points": 50})
        );
        assert_eq!(grouped[1].checker_role, vec!["finance"]);
    }

    #[test]
    fn grouping_empty_input_yields_empty_output() {
        assert!(format_maker_requests(Vec::new()).is_empty());
    }

    #[test]
    fn expansion_fans_out_one_pending_row_per_checker_role() {
        let new = NewMakerRequest {
            checker_roles: vec!["finance".to_string(), "ops".to_string()],
            maker_id: "M1".to_string(),
            resource_type: RESOURCE_POINTS.to_string(),
            request_data: json!({"user_id": "U1", "points_id": "P1", "points": 50}),
        };
        let rows = expand_new_request(new);

        assert_eq!(rows.len(), 2);
        assert!(!rows[0].req_id.is_empty());
        for r in &rows {
            assert_eq!(r.req_id, rows[0].req_id);
            assert_eq!(r.request_status, STATUS_PENDING);
            assert!(r.checker_id.is_empty());
            assert_eq!(r.request_data, rows[0].request_data);
            assert_eq!(r.resource_type, rows[0].resource_type);
        }
        assert_eq!(rows[0].checker_role, "finance");
        assert_eq!(rows[1].checker_role, "ops");
    }

    #[test]
    fn decisions_resolve_to_terminal_statuses() {
        assert_eq!(resolve_decision("approve").unwrap(), STATUS_APPROVED);
        assert_eq!(resolve_decision("reject").unwrap(), STATUS_REJECTED);
    }

    #[test]
    fn unknown_decision_strings_are_rejected() {
        for bad in ["approved", "deny", "", "APPROVE"] {
            let err = resolve_decision(bad).unwrap_err();
            assert_eq!(err.to_string(), ERROR_INVALID_DECISION);
            assert_eq!(err.kind(), "InvalidInput");
        }
    }

    #[test]
    fn finalize_stamps_every_sibling_row() {
        let rows = vec![row("R1", "finance"), row("R1", "ops")];
        let finalized = finalize_rows(rows, STATUS_APPROVED, "C1");

        for r in &finalized {
            assert_eq!(r.request_status, STATUS_APPROVED);
            assert_eq!(r.checker_id, "C1");
        }
        // Shared fields survive finalization untouched.
        assert_eq!(finalized[0].maker_id, "M1");
        assert_eq!(
            finalized[0].request_data,
            json!({"user_id": "U1", "points_id": "P1", "points": 50})
        );
    }

    #[test]
    fn checker_view_requires_a_status() {
        for missing in [None, Some(String::new())] {
            let err = require_status(missing).unwrap_err();
            assert_eq!(err.to_string(), ERROR_MISSING_QUERY_PARAMETER);
            assert_eq!(err.kind(), "InvalidInput");
        }
        assert_eq!(
            require_status(Some("pending".to_string())).unwrap(),
            "pending"
        );
    }

    #[test]
    fn expand_then_finalize_round_trip() {
        let new = NewMakerRequest {
            checker_roles: vec!["finance".to_string(), "ops".to_string()],
            maker_id: "M1".to_string(),
            resource_type: RESOURCE_POINTS.to_string(),
            request_data: json!({"user_id": "U1", "points_id": "P1", "points": 50}),
        };
        let rows = finalize_rows(expand_new_request(new), STATUS_APPROVED, "C1");
        let grouped = format_maker_requests(rows);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].checker_role.len(), 2);
        assert_eq!(grouped[0].request_status, STATUS_APPROVED);
        assert_eq!(grouped[0].checker_id, "C1");
    }
}
