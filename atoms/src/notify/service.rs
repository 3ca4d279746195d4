use aws_sdk_dynamodb::types::TransactWriteItem;
use aws_sdk_dynamodb::Client as DynamoClient;

use super::model::Notification;
use crate::error::{ServiceError, ServiceResult};
use crate::item::{key, n, s, Item, NOTIFY_PK};
use crate::tx;

/// Outbox SK sorts by creation time so a backlog drains oldest first.
pub fn notification_sk(notification: &Notification) -> String {
    format!("NOTIFY#{}#{}", notification.created_at, notification.notification_id)
}

pub fn notification_to_item(notification: &Notification, ttl_days: i64) -> Item {
    let expires_at = chrono::Utc::now().timestamp() + ttl_days * 24 * 60 * 60;
    let mut item = key(NOTIFY_PK, notification_sk(notification));
    item.insert("notification_id".into(), s(&notification.notification_id));
    item.insert("kind".into(), s(notification.kind.as_str()));
    item.insert("to".into(), s(&notification.to));
    item.insert("subject".into(), s(&notification.subject));
    item.insert("body".into(), s(&notification.body));
    item.insert("created_at".into(), s(&notification.created_at));
    item.insert("ttl".into(), n(expires_at));
    item
}

/// Outbox put to include in a state-changing transaction.
pub fn queue_write(
    table_name: &str,
    notification: &Notification,
    ttl_days: i64,
) -> ServiceResult<TransactWriteItem> {
    tx::put(table_name, notification_to_item(notification, ttl_days), None)
}

/// Queue a notification on its own, for changes that are a single write.
pub async fn queue(
    client: &DynamoClient,
    table_name: &str,
    notification: &Notification,
    ttl_days: i64,
) -> ServiceResult<()> {
    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(notification_to_item(notification, ttl_days)))
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB put_item", e))?;
    tracing::info!(kind = notification.kind.as_str(), to = %notification.to, "notification queued");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{get_n, get_s};

    #[test]
    fn outbox_item_has_ttl_and_sortable_key() {
        let notification = Notification::user_approved("frank", "frank@example.com");
        let item = notification_to_item(&notification, 14);

        assert_eq!(get_s(&item, "PK"), "NOTIFY");
        assert!(get_s(&item, "SK").starts_with(&format!("NOTIFY#{}", notification.created_at)));
        assert_eq!(get_s(&item, "kind"), "user_approved");
        let ttl: i64 = get_n(&item, "ttl");
        assert!(ttl > chrono::Utc::now().timestamp() + 13 * 24 * 60 * 60);
    }
}
