use lambda_http::{http::StatusCode, Body, Error, Response};

use crate::error::{json_response, AppError};
use crate::store;
use crate::types::{Role, RolePage};
use crate::{AppState, Config};

pub const ERROR_INVALID_ROLE_DATA: &str = "invalid role data";
pub const ERROR_INVALID_ROLE_NAME: &str = "invalid role name";
pub const ERROR_ROLE_DOES_NOT_EXIST: &str = "role does not exist";

const SCAN_PAGE_LIMIT: i32 = 100;

async fn fetch_role(state: &AppState, config: &Config, role: &str) -> Result<Role, AppError> {
    store::get_by_key(&state.dynamo_client, &config.roles_table, &[("role", role)])
        .await?
        .ok_or_else(|| AppError::NotFound(ERROR_ROLE_DOES_NOT_EXIST.to_string()))
}

fn parse_role_body(body: &[u8]) -> Result<Role, AppError> {
    let role: Role = serde_json::from_slice(body)
        .map_err(|_| AppError::InvalidInput(ERROR_INVALID_ROLE_DATA.to_string()))?;
    if role.role.is_empty() {
        return Err(AppError::InvalidInput(ERROR_INVALID_ROLE_NAME.to_string()));
    }
    Ok(role)
}

/// POST /roles
pub async fn create_role(
    state: &AppState,
    config: &Config,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let result = match parse_role_body(body) {
        Ok(role) => store::put(&state.dynamo_client, &config.roles_table, &role)
            .await
            .map(|_| role),
        Err(err) => Err(err),
    };

    match result {
        Ok(role) => json_response(StatusCode::OK, &role),
        Err(err) => err.into_response(),
    }
}

/// GET /roles - single access map when ?role= is present, one scan page
/// otherwise.
pub async fn get_roles(
    state: &AppState,
    config: &Config,
    role: Option<String>,
    key: Option<String>,
) -> Result<Response<Body>, Error> {
    match role {
        Some(name) => match fetch_role(state, config, &name).await {
            Ok(role) => json_response(StatusCode::OK, &role),
            Err(err) => err.into_response(),
        },
        None => match list_roles_op(state, config, key).await {
            Ok(page) => json_response(StatusCode::OK, &page),
            Err(err) => err.into_response(),
        },
    }
}

async fn list_roles_op(
    state: &AppState,
    config: &Config,
    key: Option<String>,
) -> Result<RolePage, AppError> {
    let exclusive_start = store::start_key(&[("role", key.as_deref())]);
    let page = store::scan_with_pagination::<Role>(
        &state.dynamo_client,
        &config.roles_table,
        SCAN_PAGE_LIMIT,
        exclusive_start,
    )
    .await?;

    Ok(RolePage {
        data: page.items,
        key: store::cursor_field(&page.last_key, "role"),
    })
}

/// PUT /roles - overwrite an existing access map.
pub async fn update_role(
    state: &AppState,
    config: &Config,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    match update_role_op(state, config, body).await {
        Ok(role) => json_response(StatusCode::OK, &role),
        Err(err) => err.into_response(),
    }
}

async fn update_role_op(state: &AppState, config: &Config, body: &[u8]) -> Result<Role, AppError> {
    let role = parse_role_body(body)?;
    fetch_role(state, config, &role.role).await?;
    store::put(&state.dynamo_client, &config.roles_table, &role).await?;
    Ok(role)
}

/// DELETE /roles
pub async fn delete_role(
    state: &AppState,
    config: &Config,
    role: Option<String>,
) -> Result<Response<Body>, Error> {
    match delete_role_op(state, config, role).await {
        Ok(role) => json_response(StatusCode::OK, &role),
        Err(err) => err.into_response(),
    }
}

async fn delete_role_op(
    state: &AppState,
    config: &Config,
    role: Option<String>,
) -> Result<Role, AppError> {
    let name = role.ok_or_else(|| AppError::InvalidInput(ERROR_INVALID_ROLE_NAME.to_string()))?;
    let role = fetch_role(state, config, &name).await?;
    store::delete(&state.dynamo_client, &config.roles_table, &[("role", &name)]).await?;
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_body_requires_a_name() {
        let body = br#"{"role":"","access":{"/users":["GET"]}}"#;
        let err = parse_role_body(body).unwrap_err();
        assert_eq!(err.to_string(), ERROR_INVALID_ROLE_NAME);
    }

    #[test]
    fn role_body_parses_access_map() {
        let body = br#"{"role":"finance","access":{"/points":["GET","PUT"]}}"#;
        let role = parse_role_body(body).unwrap();
        assert_eq!(role.role, "finance");
        assert_eq!(role.access["/points"], vec!["GET", "PUT"]);
    }
}
