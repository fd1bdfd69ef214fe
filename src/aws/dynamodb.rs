//! Minimal DynamoDB client: exactly the operations the channel store needs.
//!
//! Speaks the JSON 1.0 target-header protocol (`DynamoDB_20120810.*`).
//! Attribute values are restricted to the scalar string and number types the
//! channel record uses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::client::{AwsClient, AwsResponse};
use super::error::AwsError;

const SERVICE: &str = "dynamodb";
const TARGET_PREFIX: &str = "DynamoDB_20120810";

/// A DynamoDB attribute value. Only scalar strings and numbers are needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Scalar string.
    S(String),
    /// Number, transported as a decimal string.
    N(String),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a numeric attribute as i64. DynamoDB numbers may carry a
    /// fractional part; it is truncated.
    pub fn as_n_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::N(n) => n.parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        }
    }
}

/// An item is a flat attribute map.
pub type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutItemInput<'a> {
    table_name: &'a str,
    item: &'a Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition_expression: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateItemInput<'a> {
    table_name: &'a str,
    key: &'a Item,
    update_expression: &'a str,
    condition_expression: &'a str,
    expression_attribute_names: &'a HashMap<String, String>,
    expression_attribute_values: &'a Item,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteItemInput<'a> {
    table_name: &'a str,
    key: &'a Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition_expression: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetItemInput<'a> {
    table_name: &'a str,
    key: &'a Item,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetItemOutput {
    #[serde(default)]
    item: Option<Item>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScanInput<'a> {
    table_name: &'a str,
    select: &'a str,
    consistent_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusive_start_key: Option<&'a Item>,
}

/// One page of a table scan.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanOutput {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub last_evaluated_key: Option<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTableOutput {
    table: TableDescription,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    #[serde(default)]
    pub table_status: String,
    #[serde(default)]
    pub table_arn: Option<String>,
}

/// DynamoDB client bound to one base client.
#[derive(Debug, Clone)]
pub struct DynamoDbClient {
    client: AwsClient,
}

impl DynamoDbClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    async fn call(&self, op: &str, body: serde_json::Value) -> Result<AwsResponse, AwsError> {
        self.client
            .json_request(SERVICE, &format!("{TARGET_PREFIX}.{op}"), "1.0", &body)
            .await
    }

    /// `PutItem` with an optional condition expression.
    pub async fn put_item(
        &self,
        table_name: &str,
        item: &Item,
        condition_expression: Option<&str>,
    ) -> Result<(), AwsError> {
        let input = PutItemInput {
            table_name,
            item,
            condition_expression,
        };
        self.call("PutItem", serde_json::to_value(&input).unwrap())
            .await?;
        Ok(())
    }

    /// `UpdateItem` with a condition and expression attribute maps.
    pub async fn update_item(
        &self,
        table_name: &str,
        key: &Item,
        update_expression: &str,
        condition_expression: &str,
        names: &HashMap<String, String>,
        values: &Item,
    ) -> Result<(), AwsError> {
        let input = UpdateItemInput {
            table_name,
            key,
            update_expression,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
        };
        self.call("UpdateItem", serde_json::to_value(&input).unwrap())
            .await?;
        Ok(())
    }

    /// `DeleteItem` with an optional condition expression.
    pub async fn delete_item(
        &self,
        table_name: &str,
        key: &Item,
        condition_expression: Option<&str>,
    ) -> Result<(), AwsError> {
        let input = DeleteItemInput {
            table_name,
            key,
            condition_expression,
        };
        self.call("DeleteItem", serde_json::to_value(&input).unwrap())
            .await?;
        Ok(())
    }

    /// `GetItem` by primary key. `Ok(None)` when the item is absent.
    pub async fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, AwsError> {
        let input = GetItemInput { table_name, key };
        let resp = self
            .call("GetItem", serde_json::to_value(&input).unwrap())
            .await?;
        let output: GetItemOutput = serde_json::from_str(&resp.body)
            .map_err(|e| AwsError::new(SERVICE, "DeserializationError", &e.to_string(), 0))?;
        Ok(output.item)
    }

    /// One page of an eventually-consistent full-table scan.
    pub async fn scan(
        &self,
        table_name: &str,
        exclusive_start_key: Option<&Item>,
    ) -> Result<ScanOutput, AwsError> {
        let input = ScanInput {
            table_name,
            select: "ALL_ATTRIBUTES",
            consistent_read: false,
            exclusive_start_key,
        };
        let resp = self
            .call("Scan", serde_json::to_value(&input).unwrap())
            .await?;
        serde_json::from_str(&resp.body)
            .map_err(|e| AwsError::new(SERVICE, "DeserializationError", &e.to_string(), 0))
    }

    /// `DescribeTable`. `Ok(None)` when the table does not exist.
    pub async fn describe_table(
        &self,
        table_name: &str,
    ) -> Result<Option<TableDescription>, AwsError> {
        let body = serde_json::json!({ "TableName": table_name });
        match self.call("DescribeTable", body).await {
            Ok(resp) => {
                let output: DescribeTableOutput = serde_json::from_str(&resp.body).map_err(|e| {
                    AwsError::new(SERVICE, "DeserializationError", &e.to_string(), 0)
                })?;
                Ok(Some(output.table))
            }
            Err(err) if err.is_resource_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `CreateTable` with a single string hash key, on-demand billing.
    pub async fn create_table(
        &self,
        table_name: &str,
        hash_key: &str,
    ) -> Result<Option<String>, AwsError> {
        let body = serde_json::json!({
            "TableName": table_name,
            "AttributeDefinitions": [
                {"AttributeName": hash_key, "AttributeType": "S"}
            ],
            "KeySchema": [
                {"AttributeName": hash_key, "KeyType": "HASH"}
            ],
            "BillingMode": "PAY_PER_REQUEST",
        });
        let resp = self.call("CreateTable", body).await?;
        let value: serde_json::Value = serde_json::from_str(&resp.body).unwrap_or_default();
        Ok(value
            .pointer("/TableDescription/TableArn")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}
