use chrono::{DateTime, Duration, Utc};
use lambda_http::{http::StatusCode, Body, Error, Response};
use uuid::Uuid;

use crate::error::{json_response, AppError};
use crate::store;
use crate::types::{LogEntry, LogPage};
use crate::{AppState, Config, RequestMeta};

const SCAN_PAGE_LIMIT: i32 = 100;

/// Expiry timestamp for a log entry: `ttl_days` after `now`, as epoch
/// seconds for the table TTL attribute.
pub fn log_ttl(now: DateTime<Utc>, ttl_days: i64) -> i64 {
    (now + Duration::days(ttl_days)).timestamp()
}

/// The requester query parameter arrives as "first-last".
pub fn describe_requester(requester: &str) -> String {
    if requester.is_empty() {
        return "unknown requester".to_string();
    }
    requester.replace('-', " ")
}

pub fn new_log_entry(meta: &RequestMeta, description: String, ttl_days: i64) -> LogEntry {
    let now = Utc::now();
    LogEntry {
        log_id: Uuid::new_v4().to_string(),
        ip: meta.ip.clone(),
        user_agent: meta.user_agent.clone(),
        description,
        timestamp: now.timestamp(),
        ttl: log_ttl(now, ttl_days),
    }
}

/// Append an audit entry. Best-effort by design: a failed write is
/// logged and swallowed so it can never fail the invocation that
/// produced it.
pub async fn record_audit(
    state: &AppState,
    config: &Config,
    meta: &RequestMeta,
    description: String,
) {
    let entry = new_log_entry(meta, description, config.log_ttl_days);
    if let Err(e) = store::put(&state.dynamo_client, &config.logs_table, &entry).await {
        tracing::error!("failed to write audit log: {}", e);
    }
}

/// GET /logs - scan one page of the audit trail.
pub async fn get_logs(
    state: &AppState,
    config: &Config,
    key: Option<String>,
) -> Result<Response<Body>, Error> {
    match get_logs_op(state, config, key).await {
        Ok(page) => json_response(StatusCode::OK, &page),
        Err(err) => err.into_response(),
    }
}

async fn get_logs_op(
    state: &AppState,
    config: &Config,
    key: Option<String>,
) -> Result<LogPage, AppError> {
    let exclusive_start = store::start_key(&[("log_id", key.as_deref())]);
    let page = store::scan_with_pagination::<LogEntry>(
        &state.dynamo_client,
        &config.logs_table,
        SCAN_PAGE_LIMIT,
        exclusive_start,
    )
    .await?;

    Ok(LogPage {
        data: page.items,
        key: store::cursor_field(&page.last_key, "log_id"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_offset_in_days_from_now() {
        let now = Utc::now();
        assert_eq!(log_ttl(now, 30) - now.timestamp(), 30 * 24 * 60 * 60);
        assert_eq!(log_ttl(now, 0), now.timestamp());
    }

    #[test]
    fn requester_param_formats_into_a_name() {
        assert_eq!(describe_requester("jane-doe"), "jane doe");
        assert_eq!(describe_requester(""), "unknown requester");
    }

    #[test]
    fn log_entries_carry_caller_context() {
        let meta = RequestMeta {
            ip: "10.0.0.1".to_string(),
            user_agent: "curl/8.0".to_string(),
            requester: "jane-doe".to_string(),
        };
        let entry = new_log_entry(&meta, "jane doe enrolled user Amy Tan".to_string(), 7);
        assert_eq!(entry.ip, "10.0.0.1");
        assert_eq!(entry.user_agent, "curl/8.0");
        assert!(entry.ttl > entry.timestamp);
        assert!(!entry.log_id.is_empty());
    }
}
