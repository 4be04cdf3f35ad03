use aws_sdk_dynamodb::types::{AttributeValue, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, from_items, to_item};
use std::collections::HashMap;

use crate::error::AppError;

pub const ERROR_FAILED_TO_FETCH_RECORD: &str = "failed to fetch record";
pub const ERROR_FAILED_TO_UNMARSHAL_RECORD: &str = "failed to unmarshal record";
pub const ERROR_COULD_NOT_MARSHAL_ITEM: &str = "could not marshal item";
pub const ERROR_COULD_NOT_QUERY_DB: &str = "could not query db";
pub const ERROR_COULD_NOT_DYNAMO_PUT_ITEM: &str = "could not dynamo put item";
pub const ERROR_COULD_NOT_DYNAMO_DELETE_ITEM: &str = "could not dynamo delete item";

/// One page of a scan, with the raw continuation key so callers can
/// mirror it into the response envelope.
pub struct ScanPage<T> {
    pub items: Vec<T>,
    pub last_key: Option<HashMap<String, AttributeValue>>,
}

/// Get a single item by its full key. `Ok(None)` means the item does
/// not exist; the caller decides whether that is an error.
pub async fn get_by_key<T: DeserializeOwned>(
    client: &DynamoClient,
    table_name: &str,
    key: &[(&str, &str)],
) -> Result<Option<T>, AppError> {
    let mut request = client.get_item().table_name(table_name);
    for (name, value) in key {
        request = request.key(*name, AttributeValue::S((*value).to_string()));
    }

    let output = request.send().await.map_err(|e| {
        tracing::error!("dynamo get_item failed: {:?}", e);
        AppError::StoreFailure(ERROR_FAILED_TO_FETCH_RECORD.to_string())
    })?;

    match output.item {
        Some(item) => {
            let value = from_item(item).map_err(|e| {
                tracing::error!("failed to unmarshal item: {:?}", e);
                AppError::StoreFailure(ERROR_FAILED_TO_UNMARSHAL_RECORD.to_string())
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Query items whose key attributes (or index key attributes) equal the
/// given values.
pub async fn query_eq<T: DeserializeOwned>(
    client: &DynamoClient,
    table_name: &str,
    index_name: Option<&str>,
    keys: &[(&str, &str)],
) -> Result<Vec<T>, AppError> {
    let mut request = client.query().table_name(table_name);
    if let Some(index) = index_name {
        request = request.index_name(index);
    }

    // Alias every attribute name; several of ours (role, maker_id) collide
    // with reserved words otherwise.
    let mut conditions = Vec::with_capacity(keys.len());
    for (i, (name, value)) in keys.iter().enumerate() {
        let alias = format!("#k{}", i);
        let placeholder = format!(":v{}", i);
        conditions.push(format!("{} = {}", alias, placeholder));
        request = request
            .expression_attribute_names(alias, *name)
            .expression_attribute_values(placeholder, AttributeValue::S((*value).to_string()));
    }

    let output = request
        .key_condition_expression(conditions.join(" AND "))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("dynamo query failed: {:?}", e);
            AppError::StoreFailure(ERROR_COULD_NOT_QUERY_DB.to_string())
        })?;

    from_items(output.items.unwrap_or_default()).map_err(|e| {
        tracing::error!("failed to unmarshal query result: {:?}", e);
        AppError::StoreFailure(ERROR_FAILED_TO_UNMARSHAL_RECORD.to_string())
    })
}

/// Scan one page of a table. The continuation key is whatever Dynamo
/// handed back last time, rebuilt by the caller from the request cursor.
pub async fn scan_with_pagination<T: DeserializeOwned>(
    client: &DynamoClient,
    table_name: &str,
    limit: i32,
    exclusive_start_key: Option<HashMap<String, AttributeValue>>,
) -> Result<ScanPage<T>, AppError> {
    let output = client
        .scan()
        .table_name(table_name)
        .limit(limit)
        .set_exclusive_start_key(exclusive_start_key)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("dynamo scan failed: {:?}", e);
            AppError::StoreFailure(ERROR_FAILED_TO_FETCH_RECORD.to_string())
        })?;

    let last_key = output.last_evaluated_key.clone();
    let items = from_items(output.items.unwrap_or_default()).map_err(|e| {
        tracing::error!("failed to unmarshal scan result: {:?}", e);
        AppError::StoreFailure(ERROR_FAILED_TO_UNMARSHAL_RECORD.to_string())
    })?;

    Ok(ScanPage { items, last_key })
}

pub async fn put<T: Serialize>(
    client: &DynamoClient,
    table_name: &str,
    item: &T,
) -> Result<(), AppError> {
    let item = to_item(item)
        .map_err(|_| AppError::StoreFailure(ERROR_COULD_NOT_MARSHAL_ITEM.to_string()))?;

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(item))
        .send()
        .await
        .map_err(|e| {
            tracing::error!("dynamo put_item failed: {:?}", e);
            AppError::StoreFailure(ERROR_COULD_NOT_DYNAMO_PUT_ITEM.to_string())
        })?;

    Ok(())
}

pub async fn delete(
    client: &DynamoClient,
    table_name: &str,
    key: &[(&str, &str)],
) -> Result<(), AppError> {
    let mut request = client.delete_item().table_name(table_name);
    for (name, value) in key {
        request = request.key(*name, AttributeValue::S((*value).to_string()));
    }

    request.send().await.map_err(|e| {
        tracing::error!("dynamo delete_item failed: {:?}", e);
        AppError::StoreFailure(ERROR_COULD_NOT_DYNAMO_DELETE_ITEM.to_string())
    })?;

    Ok(())
}

/// Write a batch of items in one BatchWriteItem call. Not a transaction;
/// sibling rows can land partially on failure.
pub async fn batch_put<T: Serialize>(
    client: &DynamoClient,
    table_name: &str,
    items: &[T],
) -> Result<(), AppError> {
    let mut writes = Vec::with_capacity(items.len());
    for item in items {
        let item = to_item(item)
            .map_err(|_| AppError::StoreFailure(ERROR_COULD_NOT_MARSHAL_ITEM.to_string()))?;
        let put = PutRequest::builder()
            .set_item(Some(item))
            .build()
            .map_err(|_| AppError::StoreFailure(ERROR_COULD_NOT_MARSHAL_ITEM.to_string()))?;
        writes.push(WriteRequest::builder().put_request(put).build());
    }

    client
        .batch_write_item()
        .request_items(table_name, writes)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("dynamo batch_write_item failed: {:?}", e);
            AppError::StoreFailure(ERROR_COULD_NOT_DYNAMO_PUT_ITEM.to_string())
        })?;

    Ok(())
}

/// Rebuild an ExclusiveStartKey from request cursor fields. Returns None
/// unless every attribute is present, since a partial key is useless.
pub fn start_key(attrs: &[(&str, Option<&str>)]) -> Option<HashMap<String, AttributeValue>> {
    let mut key = HashMap::with_capacity(attrs.len());
    for (name, value) in attrs {
        key.insert(
            (*name).to_string(),
            AttributeValue::S((*value)?.to_string()),
        );
    }
    Some(key)
}

/// Pull one string attribute out of a LastEvaluatedKey for the response
/// envelope.
pub fn cursor_field(
    last_key: &Option<HashMap<String, AttributeValue>>,
    attr: &str,
) -> Option<String> {
    last_key
        .as_ref()
        .and_then(|key| key.get(attr))
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_key_requires_every_attribute() {
        assert!(start_key(&[("user_id", Some("U1")), ("points_id", None)]).is_none());

        let key = start_key(&[("user_id", Some("U1")), ("points_id", Some("P1"))]).unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key["points_id"], AttributeValue::S("P1".to_string()));
    }

    #[test]
    fn cursor_field_reads_string_attributes_only() {
        let key = start_key(&[("log_id", Some("L1"))]);
        assert_eq!(cursor_field(&key, "log_id").as_deref(), Some("L1"));
        assert_eq!(cursor_field(&key, "missing"), None);
        assert_eq!(cursor_field(&None, "log_id"), None);
    }
}
