pub mod email;
pub mod error;
pub mod logs;
pub mod maker;
pub mod points;
pub mod roles;
pub mod store;
pub mod types;
pub mod users;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_sesv2::Client as SesClient;
use std::env;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub cognito_client: CognitoClient,
    pub dynamo_client: DynamoClient,
    pub ses_client: SesClient,
}

impl AppState {
    pub fn new(
        cognito_client: CognitoClient,
        dynamo_client: DynamoClient,
        ses_client: SesClient,
    ) -> Arc<Self> {
        Arc::new(Self {
            cognito_client,
            dynamo_client,
            ses_client,
        })
    }
}

/// Table names and settings resolved from the environment at invocation start.
#[derive(Debug, Clone)]
pub struct Config {
    pub user_table: String,
    pub points_table: String,
    pub maker_table: String,
    pub roles_table: String,
    pub logs_table: String,
    pub log_ttl_days: i64,
    pub user_pool_id: String,
    pub sender_email: String,
    pub panel_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            user_table: env::var("USER_TABLE").unwrap_or_else(|_| "admin-users".to_string()),
            points_table: env::var("POINTS_TABLE").unwrap_or_else(|_| "admin-points".to_string()),
            maker_table: env::var("MAKER_TABLE")
                .unwrap_or_else(|_| "admin-maker-requests".to_string()),
            roles_table: env::var("ROLES_TABLE").unwrap_or_else(|_| "admin-roles".to_string()),
            logs_table: env::var("LOGS_TABLE").unwrap_or_else(|_| "admin-logs".to_string()),
            log_ttl_days: env::var("LOG_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            user_pool_id: env::var("USER_POOL_ID").unwrap_or_default(),
            sender_email: env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "noreply@adminpanel.dev".to_string()),
            panel_url: env::var("PANEL_URL")
                .unwrap_or_else(|_| "https://admin.example.com".to_string()),
        }
    }
}

/// Caller context carried into handlers for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: String,
    pub requester: String,
}
