use aws_sdk_cognitoidentityprovider::types::{AttributeType, MessageActionType};
use lambda_http::{http::StatusCode, Body, Error, Response};
use uuid::Uuid;

use crate::error::{json_response, AppError};
use crate::logs::{describe_requester, record_audit};
use crate::store;
use crate::types::{CreateUserRequest, User, UserPage};
use crate::{AppState, Config, RequestMeta};

pub const ERROR_INVALID_USER_DATA: &str = "invalid user data";
pub const ERROR_INVALID_USER_ID: &str = "invalid user id";
pub const ERROR_USER_DOES_NOT_EXIST: &str = "user does not exist";
pub const ERROR_COULD_NOT_CREATE_IDENTITY: &str = "could not create cognito identity";
pub const ERROR_COULD_NOT_DELETE_IDENTITY: &str = "could not delete cognito identity";

const SCAN_PAGE_LIMIT: i32 = 100;

/// Look up a user record by id. `NotFound` if the record is absent.
pub async fn fetch_user(
    state: &AppState,
    config: &Config,
    user_id: &str,
) -> Result<User, AppError> {
    store::get_by_key(&state.dynamo_client, &config.user_table, &[("user_id", user_id)])
        .await?
        .ok_or_else(|| AppError::NotFound(ERROR_USER_DOES_NOT_EXIST.to_string()))
}

/// Every user holding a role, via the role GSI.
pub async fn fetch_users_by_role(
    state: &AppState,
    config: &Config,
    role: &str,
) -> Result<Vec<User>, AppError> {
    store::query_eq(
        &state.dynamo_client,
        &config.user_table,
        Some("role-index"),
        &[("role", role)],
    )
    .await
}

/// Overwrite an existing user record. The shared path for the update
/// handler and for approved maker requests targeting a user.
pub async fn apply_user_update(
    state: &AppState,
    config: &Config,
    user: &User,
) -> Result<(), AppError> {
    if user.user_id.is_empty() {
        return Err(AppError::InvalidInput(ERROR_INVALID_USER_ID.to_string()));
    }
    fetch_user(state, config, &user.user_id).await?;
    store::put(&state.dynamo_client, &config.user_table, user).await
}

/// POST /users - create the Dynamo record and its paired Cognito identity.
pub async fn create_user(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<Response<Body>, Error> {
    match create_user_op(state, config, body, meta).await {
        Ok(user) => json_response(StatusCode::OK, &user),
        Err(err) => err.into_response(),
    }
}

async fn create_user_op(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<User, AppError> {
    let req: CreateUserRequest = serde_json::from_slice(body)
        .map_err(|_| AppError::InvalidInput(ERROR_INVALID_USER_DATA.to_string()))?;

    if req.email.is_empty() || req.first_name.is_empty() || req.last_name.is_empty() {
        return Err(AppError::InvalidInput(ERROR_INVALID_USER_DATA.to_string()));
    }

    let user = User {
        user_id: Uuid::new_v4().to_string(),
        email: req.email.clone(),
        first_name: req.first_name,
        last_name: req.last_name,
        role: req.role,
    };

    // Identity first: a Dynamo record without a login is worse than the
    // other way round, and the record write below is retriable.
    create_identity(state, config, &user, &req.password).await?;

    store::put(&state.dynamo_client, &config.user_table, &user).await?;

    let requester = describe_requester(&meta.requester);
    let description = if user.role.is_empty() {
        format!("{} enrolled user {} {}", requester, user.first_name, user.last_name)
    } else {
        format!(
            "{} enrolled {} {} {}",
            requester, user.role, user.first_name, user.last_name
        )
    };
    record_audit(state, config, meta, description).await;

    Ok(user)
}

async fn create_identity(
    state: &AppState,
    config: &Config,
    user: &User,
    password: &str,
) -> Result<(), AppError> {
    let attribute = |name: &str, value: &str| {
        AttributeType::builder()
            .name(name)
            .value(value)
            .build()
            .map_err(|_| AppError::DownstreamFailure(ERROR_COULD_NOT_CREATE_IDENTITY.to_string()))
    };

    state
        .cognito_client
        .admin_create_user()
        .user_pool_id(&config.user_pool_id)
        .username(&user.email)
        .user_attributes(attribute("email", &user.email)?)
        .user_attributes(attribute("email_verified", "true")?)
        .user_attributes(attribute("given_name", &user.first_name)?)
        .user_attributes(attribute("family_name", &user.last_name)?)
        .message_action(MessageActionType::Suppress)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("cognito admin_create_user failed: {:?}", e);
            AppError::DownstreamFailure(ERROR_COULD_NOT_CREATE_IDENTITY.to_string())
        })?;

    state
        .cognito_client
        .admin_set_user_password()
        .user_pool_id(&config.user_pool_id)
        .username(&user.email)
        .password(password)
        .permanent(true)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("cognito admin_set_user_password failed: {:?}", e);
            AppError::DownstreamFailure(ERROR_COULD_NOT_CREATE_IDENTITY.to_string())
        })?;

    Ok(())
}

/// GET /users - single record when ?user_id= is present, one scan page
/// otherwise.
pub async fn get_users(
    state: &AppState,
    config: &Config,
    user_id: Option<String>,
    key: Option<String>,
) -> Result<Response<Body>, Error> {
    match user_id {
        Some(id) => match fetch_user(state, config, &id).await {
            Ok(user) => json_response(StatusCode::OK, &user),
            Err(err) => err.into_response(),
        },
        None => match list_users_op(state, config, key).await {
            Ok(page) => json_response(StatusCode::OK, &page),
            Err(err) => err.into_response(),
        },
    }
}

async fn list_users_op(
    state: &AppState,
    config: &Config,
    key: Option<String>,
) -> Result<UserPage, AppError> {
    let exclusive_start = store::start_key(&[("user_id", key.as_deref())]);
    let page = store::scan_with_pagination::<User>(
        &state.dynamo_client,
        &config.user_table,
        SCAN_PAGE_LIMIT,
        exclusive_start,
    )
    .await?;

    Ok(UserPage {
        data: page.items,
        key: store::cursor_field(&page.last_key, "user_id"),
    })
}

/// PUT /users - overwrite a user record. `user_id` itself is immutable;
/// the body must carry the id of an existing record.
pub async fn update_user(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<Response<Body>, Error> {
    match update_user_op(state, config, body, meta).await {
        Ok(user) => json_response(StatusCode::OK, &user),
        Err(err) => err.into_response(),
    }
}

async fn update_user_op(
    state: &AppState,
    config: &Config,
    body: &[u8],
    meta: &RequestMeta,
) -> Result<User, AppError> {
    let user: User = serde_json::from_slice(body)
        .map_err(|_| AppError::InvalidInput(ERROR_INVALID_USER_DATA.to_string()))?;

    apply_user_update(state, config, &user).await?;

    record_audit(
        state,
        config,
        meta,
        format!(
            "{} updated user information for {} {}",
            describe_requester(&meta.requester),
            user.first_name,
            user.last_name
        ),
    )
    .await;

    Ok(user)
}

/// DELETE /users - remove the record and the paired Cognito identity.
pub async fn delete_user(
    state: &AppState,
    config: &Config,
    user_id: Option<String>,
    meta: &RequestMeta,
) -> Result<Response<Body>, Error> {
    match delete_user_op(state, config, user_id, meta).await {
        Ok(user) => json_response(StatusCode::OK, &user),
        Err(err) => err.into_response(),
    }
}

async fn delete_user_op(
    state: &AppState,
    config: &Config,
    user_id: Option<String>,
    meta: &RequestMeta,
) -> Result<User, AppError> {
    let user_id =
        user_id.ok_or_else(|| AppError::InvalidInput(ERROR_INVALID_USER_ID.to_string()))?;

    let user = fetch_user(state, config, &user_id).await?;

    store::delete(&state.dynamo_client, &config.user_table, &[("user_id", &user_id)]).await?;

    state
        .cognito_client
        .admin_delete_user()
        .user_pool_id(&config.user_pool_id)
        .username(&user.email)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("cognito admin_delete_user failed: {:?}", e);
            AppError::DownstreamFailure(ERROR_COULD_NOT_DELETE_IDENTITY.to_string())
        })?;

    record_audit(
        state,
        config,
        meta,
        format!(
            "{} deleted user {} {}",
            describe_requester(&meta.requester),
            user.first_name,
            user.last_name
        ),
    )
    .await;

    Ok(user)
}
