//! DynamoDB-backed channel store.
//!
//! Single-table schema with primary key `ChannelID` (string). Timestamps are
//! stored as millisecond-epoch numeric attributes. The table can be created
//! on first start behind a config flag; the create waits for ACTIVE status
//! with bounded exponential backoff.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::aws::dynamodb::{AttributeValue, DynamoDbClient, Item};
use crate::types::{Channel, ChannelId, DriveId, ResourceId};

use super::{Storage, StorageError};

/// Delay between background scan pages.
const SCAN_PAGE_PAUSE: Duration = Duration::from_millis(100);

/// Attribute names of the table schema.
const ATTR_CHANNEL_ID: &str = "ChannelID";
const ATTR_DRIVE_ID: &str = "DriveID";
const ATTR_PAGE_TOKEN: &str = "PageToken";
const ATTR_RESOURCE_ID: &str = "ResourceID";
const ATTR_EXPIRATION: &str = "Expiration";
const ATTR_PAGE_TOKEN_FETCHED_AT: &str = "PageTokenFetchedAt";
const ATTR_CREATED_AT: &str = "CreatedAt";
const ATTR_UPDATED_AT: &str = "UpdatedAt";

/// Converts a channel record to its attribute map form.
pub fn to_attribute_values(channel: &Channel) -> Item {
    let mut item = Item::new();
    item.insert(
        ATTR_CHANNEL_ID.to_string(),
        AttributeValue::S(channel.channel_id.as_str().to_string()),
    );
    item.insert(
        ATTR_DRIVE_ID.to_string(),
        AttributeValue::S(channel.drive_id.as_str().to_string()),
    );
    item.insert(
        ATTR_PAGE_TOKEN.to_string(),
        AttributeValue::S(channel.page_token.clone()),
    );
    item.insert(
        ATTR_RESOURCE_ID.to_string(),
        AttributeValue::S(channel.resource_id.as_str().to_string()),
    );
    item.insert(
        ATTR_EXPIRATION.to_string(),
        AttributeValue::N(channel.expiration.timestamp_millis().to_string()),
    );
    item.insert(
        ATTR_PAGE_TOKEN_FETCHED_AT.to_string(),
        AttributeValue::N(channel.page_token_fetched_at.timestamp_millis().to_string()),
    );
    item.insert(
        ATTR_CREATED_AT.to_string(),
        AttributeValue::N(channel.created_at.timestamp_millis().to_string()),
    );
    item.insert(
        ATTR_UPDATED_AT.to_string(),
        AttributeValue::N(channel.updated_at.timestamp_millis().to_string()),
    );
    item
}

/// Reconstructs a channel record from its attribute map form. Missing
/// attributes fall back to zero values.
pub fn from_attribute_values(item: &Item) -> Channel {
    fn string_attr(item: &Item, key: &str) -> String {
        item.get(key)
            .and_then(|v| v.as_s())
            .unwrap_or_default()
            .to_string()
    }
    fn time_attr(item: &Item, key: &str) -> DateTime<Utc> {
        let millis = item.get(key).and_then(|v| v.as_n_i64()).unwrap_or(0);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
    }

    Channel {
        channel_id: ChannelId::new(string_attr(item, ATTR_CHANNEL_ID)),
        drive_id: DriveId::new(string_attr(item, ATTR_DRIVE_ID)),
        page_token: string_attr(item, ATTR_PAGE_TOKEN),
        resource_id: ResourceId::new(string_attr(item, ATTR_RESOURCE_ID)),
        expiration: time_attr(item, ATTR_EXPIRATION),
        page_token_fetched_at: time_attr(item, ATTR_PAGE_TOKEN_FETCHED_AT),
        created_at: time_attr(item, ATTR_CREATED_AT),
        updated_at: time_attr(item, ATTR_UPDATED_AT),
    }
}

fn key_of(channel_id: &ChannelId) -> Item {
    let mut key = Item::new();
    key.insert(
        ATTR_CHANNEL_ID.to_string(),
        AttributeValue::S(channel_id.as_str().to_string()),
    );
    key
}

/// Channel store backed by a DynamoDB table.
#[derive(Debug, Clone)]
pub struct DynamoDbStorage {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbStorage {
    /// Opens the store, optionally creating the table when absent.
    pub async fn new(
        client: DynamoDbClient,
        table_name: impl Into<String>,
        auto_create: bool,
    ) -> Result<Self, StorageError> {
        let storage = DynamoDbStorage {
            client,
            table_name: table_name.into(),
        };
        info!(table = %storage.table_name, "checking channel table");
        let exists = storage.table_active().await?;
        if !exists {
            if !auto_create {
                warn!(
                    table = %storage.table_name,
                    "channel table does not exist and auto-create is disabled"
                );
            } else {
                storage.create_table().await?;
            }
        }
        Ok(storage)
    }

    /// True when the table exists and is ACTIVE or UPDATING.
    async fn table_active(&self) -> Result<bool, StorageError> {
        match self.client.describe_table(&self.table_name).await? {
            Some(desc) => {
                debug!(table = %self.table_name, status = %desc.table_status, "table exists");
                Ok(desc.table_status == "ACTIVE" || desc.table_status == "UPDATING")
            }
            None => Ok(false),
        }
    }

    async fn create_table(&self) -> Result<(), StorageError> {
        debug!(table = %self.table_name, "creating channel table");
        match self.client.create_table(&self.table_name, ATTR_CHANNEL_ID).await {
            Ok(arn) => {
                info!(table = %self.table_name, arn = ?arn, "created channel table");
            }
            Err(err) if err.is_resource_in_use() => {
                debug!(table = %self.table_name, "table creation raced, waiting for ACTIVE");
            }
            Err(err) => return Err(err.into()),
        }
        self.wait_table_active().await
    }

    /// Polls until the table is ACTIVE. Bounded exponential backoff:
    /// 200ms doubling to a 2s cap, up to 20 attempts, ±100ms jitter.
    async fn wait_table_active(&self) -> Result<(), StorageError> {
        let mut last_err = None;
        for attempt in 0..20u32 {
            match self.table_active().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(err) => last_err = Some(err),
            }
            let base = (200u64 * 2u64.pow(attempt)).min(2_000);
            let jitter = rand::thread_rng().gen_range(0..=100);
            tokio::time::sleep(Duration::from_millis(base + jitter)).await;
        }
        error!(table = %self.table_name, "timed out waiting for table to become ACTIVE");
        match last_err {
            Some(err) => Err(err),
            None => Err(StorageError::Backend(crate::aws::AwsError::new(
                "dynamodb",
                "TableNotActive",
                "table did not become ACTIVE in time",
                0,
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Storage for DynamoDbStorage {
    async fn find_all_channels(&self) -> Result<mpsc::Receiver<Vec<Channel>>, StorageError> {
        debug!(table = %self.table_name, "scanning channel table");
        let first = self.client.scan(&self.table_name, None).await?;
        debug!(table = %self.table_name, count = first.count, "scan first page");

        let (tx, rx) = mpsc::channel(10);
        let batch: Vec<Channel> = first.items.iter().map(from_attribute_values).collect();
        // Capacity 10 with a single pending message: this send cannot block.
        let _ = tx.send(batch).await;

        let mut last_key = first.last_evaluated_key;
        if last_key.is_none() {
            return Ok(rx);
        }

        let client = self.client.clone();
        let table_name = self.table_name.clone();
        tokio::spawn(async move {
            debug!(table = %table_name, "continuing channel scan in background");
            while let Some(key) = last_key.take() {
                tokio::time::sleep(SCAN_PAGE_PAUSE).await;
                match client.scan(&table_name, Some(&key)).await {
                    Ok(page) => {
                        let batch: Vec<Channel> =
                            page.items.iter().map(from_attribute_values).collect();
                        if tx.send(batch).await.is_err() {
                            // Receiver dropped; stop scanning.
                            return;
                        }
                        last_key = page.last_evaluated_key;
                    }
                    Err(err) => {
                        error!(table = %table_name, error = %err, "background scan failed");
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn find_one_by_channel_id(&self, id: &ChannelId) -> Result<Channel, StorageError> {
        debug!(table = %self.table_name, channel_id = %id, "get channel");
        let item = self
            .client
            .get_item(&self.table_name, &key_of(id))
            .await?
            .ok_or_else(|| StorageError::ChannelNotFound(id.clone()))?;
        Ok(from_attribute_values(&item))
    }

    async fn save_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        debug!(table = %self.table_name, channel_id = %channel.channel_id, "put channel");
        let item = to_attribute_values(channel);
        match self
            .client
            .put_item(
                &self.table_name,
                &item,
                Some("attribute_not_exists(ChannelID)"),
            )
            .await
        {
            Ok(()) => {
                info!(table = %self.table_name, channel_id = %channel.channel_id, "saved channel");
                Ok(())
            }
            Err(err) if err.is_conditional_check_failed() => {
                warn!(
                    table = %self.table_name,
                    channel_id = %channel.channel_id,
                    "channel id collision on save"
                );
                Err(StorageError::ChannelAlreadyExists(
                    channel.channel_id.clone(),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_page_token(&self, channel: &Channel) -> Result<(), StorageError> {
        debug!(
            table = %self.table_name,
            channel_id = %channel.channel_id,
            page_token = %channel.page_token,
            "update page token"
        );
        let values = to_attribute_values(channel);
        let mut names = HashMap::new();
        names.insert("#PageToken".to_string(), ATTR_PAGE_TOKEN.to_string());
        names.insert("#UpdatedAt".to_string(), ATTR_UPDATED_AT.to_string());
        let mut expr_values = Item::new();
        expr_values.insert(
            ":PageToken".to_string(),
            values[ATTR_PAGE_TOKEN].clone(),
        );
        expr_values.insert(
            ":UpdatedAt".to_string(),
            values[ATTR_UPDATED_AT].clone(),
        );
        match self
            .client
            .update_item(
                &self.table_name,
                &key_of(&channel.channel_id),
                "SET #PageToken=:PageToken,#UpdatedAt=:UpdatedAt",
                "attribute_exists(ChannelID) AND UpdatedAt < :UpdatedAt",
                &names,
                &expr_values,
            )
            .await
        {
            Ok(()) => {
                info!(
                    table = %self.table_name,
                    channel_id = %channel.channel_id,
                    page_token = %channel.page_token,
                    "updated page token"
                );
                Ok(())
            }
            Err(err) if err.is_conditional_check_failed() => {
                Err(StorageError::PreconditionFailed(channel.channel_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_channel(&self, channel: &Channel) -> Result<(), StorageError> {
        debug!(table = %self.table_name, channel_id = %channel.channel_id, "delete channel");
        match self
            .client
            .delete_item(
                &self.table_name,
                &key_of(&channel.channel_id),
                Some("attribute_exists(ChannelID)"),
            )
            .await
        {
            Ok(()) => {
                info!(
                    table = %self.table_name,
                    channel_id = %channel.channel_id,
                    resource_id = %channel.resource_id,
                    "deleted channel"
                );
                Ok(())
            }
            Err(err) if err.is_conditional_check_failed() => Err(StorageError::ChannelNotFound(
                channel.channel_id.clone(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn sample_channel() -> Channel {
        Channel {
            channel_id: ChannelId::new("4f9f44f3-dd46-4b27-b44c-b2ab27a1fd2d"),
            drive_id: DriveId::new("d1"),
            page_token: "100".to_string(),
            resource_id: ResourceId::new("res-1"),
            expiration: Utc.timestamp_millis_opt(1_655_856_000_000).unwrap(),
            page_token_fetched_at: Utc.timestamp_millis_opt(1_655_251_200_000).unwrap(),
            created_at: Utc.timestamp_millis_opt(1_655_251_200_000).unwrap(),
            updated_at: Utc.timestamp_millis_opt(1_655_251_200_500).unwrap(),
        }
    }

    #[test]
    fn attribute_round_trip_preserves_all_fields() {
        let channel = sample_channel();
        let back = from_attribute_values(&to_attribute_values(&channel));
        assert_eq!(back, channel);
    }

    #[test]
    fn timestamps_are_ms_epoch_numbers() {
        let item = to_attribute_values(&sample_channel());
        assert_eq!(
            item[ATTR_EXPIRATION],
            AttributeValue::N("1655856000000".to_string())
        );
        assert_eq!(
            item[ATTR_UPDATED_AT],
            AttributeValue::N("1655251200500".to_string())
        );
    }

    #[test]
    fn missing_attributes_fall_back_to_zero_values() {
        let item = Item::new();
        let channel = from_attribute_values(&item);
        assert_eq!(channel.channel_id.as_str(), "");
        assert_eq!(channel.page_token, "");
        assert_eq!(channel.created_at.timestamp_millis(), 0);
    }

    proptest! {
        #[test]
        fn round_trip_any_timestamps(
            expiration_ms in 0i64..4_102_444_800_000,
            created_ms in 0i64..4_102_444_800_000,
            token in "[0-9]{1,12}",
        ) {
            let mut channel = sample_channel();
            channel.expiration = Utc.timestamp_millis_opt(expiration_ms).unwrap();
            channel.created_at = Utc.timestamp_millis_opt(created_ms).unwrap();
            channel.page_token = token;
            let back = from_attribute_values(&to_attribute_values(&channel));
            prop_assert_eq!(back, channel);
        }
    }
}
