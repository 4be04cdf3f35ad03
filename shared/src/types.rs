use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub role: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub data: Vec<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

// ========== ROLE ==========
/// Route access map consulted by the authorization gate: endpoint -> allowed methods.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Role {
    pub role: String,
    pub access: HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RolePage {
    pub data: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

// ========== POINTS ==========
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserPoint {
    pub user_id: String,
    pub points_id: String,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePointsRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct PointsPage {
    pub data: Vec<UserPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_point: Option<String>,
}

// ========== MAKER REQUEST ==========
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "rejected";

pub const RESOURCE_USER: &str = "user";
pub const RESOURCE_POINTS: &str = "points";

/// One persisted row per (req_id, checker_role). Rows sharing a req_id
/// carry identical resource_type and request_data.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MakerRequest {
    pub req_id: String,
    pub checker_role: String,
    pub maker_id: String,
    pub checker_id: String,
    pub request_status: String,
    pub resource_type: String,
    pub request_data: serde_json::Value,
}

/// Grouped view of a request: sibling rows collapsed into one object
/// with the checker roles merged into a list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupedMakerRequest {
    pub req_id: String,
    pub checker_role: Vec<String>,
    pub maker_id: String,
    pub checker_id: String,
    pub request_status: String,
    pub resource_type: String,
    pub request_data: serde_json::Value,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewMakerRequest {
    pub checker_roles: Vec<String>,
    pub maker_id: String,
    pub resource_type: String,
    pub request_data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub request_id: String,
    pub checker_role: String,
    pub checker_id: String,
    pub decision: String,
}

#[derive(Debug, Serialize)]
pub struct MakerPage {
    pub data: Vec<GroupedMakerRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_req: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_role: Option<String>,
}

// ========== AUDIT LOG ==========
/// Append-only audit record; expired by the table TTL, never read back
/// by business logic.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub log_id: String,
    pub ip: String,
    pub user_agent: String,
    pub description: String,
    pub timestamp: i64,
    pub ttl: i64,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub data: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}
