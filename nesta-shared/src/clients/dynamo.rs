use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_json::Value;

use super::store::{DocumentStore, Item, Key, Query, StoreError};

/// Production `DocumentStore` backed by DynamoDB.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
}

impl DynamoStore {
    pub async fn connect() -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: Client::new(&config),
        }
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_attr(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attr(v)))
                .collect(),
        ),
    }
}

fn from_attr(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => n
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| n.parse::<f64>().map(Value::from))
            .unwrap_or(Value::Null),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::L(items) => Value::Array(items.iter().map(from_attr).collect()),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attr(v)))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn to_dynamo_item(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter().map(|(k, v)| (k.clone(), to_attr(v))).collect()
}

fn from_dynamo_item(item: &HashMap<String, AttributeValue>) -> Item {
    item.iter().map(|(k, v)| (k.clone(), from_attr(v))).collect()
}

fn key_map(key: &Key) -> HashMap<String, AttributeValue> {
    let mut map = HashMap::new();
    let (pname, pval) = &key.partition;
    map.insert(pname.clone(), to_attr(pval));
    if let Some((sname, sval)) = &key.sort {
        map.insert(sname.clone(), to_attr(sval));
    }
    map
}

fn map_sdk_err<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    match err.as_service_error().and_then(|e| e.code()) {
        Some("ProvisionedThroughputExceededException") => StoreError::ThroughputExceeded,
        Some("ResourceNotFoundException") => StoreError::NotFound,
        _ => StoreError::Backend(format!("{err:?}")),
    }
}

#[async_trait]
impl DocumentStore for DynamoStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        let out = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key_map(key)))
            .send()
            .await
            .map_err(map_sdk_err)?;
        Ok(out.item().map(from_dynamo_item))
    }

    async fn put(&self, table: &str, item: Item) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_dynamo_item(&item)))
            .send()
            .await
            .map_err(map_sdk_err)?;
        Ok(())
    }

    async fn update(&self, table: &str, key: &Key, attrs: Item) -> Result<(), StoreError> {
        if attrs.is_empty() {
            return Ok(());
        }

        // Attribute names are aliased because several of ours (timestamp,
        // direction) are DynamoDB reserved words.
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        let mut sets = Vec::new();
        for (i, (name, value)) in attrs.iter().enumerate() {
            names.insert(format!("#n{i}"), name.clone());
            values.insert(format!(":v{i}"), to_attr(value));
            sets.push(format!("#n{i} = :v{i}"));
        }

        self.client
            .update_item()
            .table_name(table)
            .set_key(Some(key_map(key)))
            .update_expression(format!("SET {}", sets.join(", ")))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .send()
            .await
            .map_err(map_sdk_err)?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<(), StoreError> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key_map(key)))
            .send()
            .await
            .map_err(map_sdk_err)?;
        Ok(())
    }

    async fn query(&self, table: &str, query: Query) -> Result<Vec<Item>, StoreError> {
        let Some((pname, pval)) = &query.partition else {
            return Err(StoreError::Backend(
                "query requires a partition key".into(),
            ));
        };

        let mut names = HashMap::from([("#pk".to_string(), pname.clone())]);
        let mut values = HashMap::from([(":pk".to_string(), to_attr(pval))]);
        let mut key_cond = "#pk = :pk".to_string();

        if let Some((sname, bound)) = &query.sort_after {
            names.insert("#sk".to_string(), sname.clone());
            values.insert(":sk".to_string(), AttributeValue::N(bound.to_string()));
            key_cond.push_str(" AND #sk > :sk");
        }

        let mut filters = Vec::new();
        for (i, (name, value)) in query.filters.iter().enumerate() {
            names.insert(format!("#f{i}"), name.clone());
            values.insert(format!(":f{i}"), to_attr(value));
            filters.push(format!("#f{i} = :f{i}"));
        }

        let mut req = self
            .client
            .query()
            .table_name(table)
            .key_condition_expression(key_cond)
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .scan_index_forward(query.scan_forward);

        if !filters.is_empty() {
            req = req.filter_expression(filters.join(" AND "));
        }
        if let Some(index) = &query.index {
            req = req.index_name(index);
        }
        if let Some(limit) = query.limit {
            req = req.limit(limit as i32);
        }

        let out = req.send().await.map_err(map_sdk_err)?;
        Ok(out
            .items()
            .iter()
            .map(from_dynamo_item)
            .collect())
    }
}
