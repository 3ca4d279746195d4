use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use aws_sdk_sesv2::Client as SesClient;
use bughunt_atoms::item::NOTIFY_PK;
use bughunt_atoms::notify::Notification;
use bughunt_atoms::ServiceError;
use bughunt_shared::email::send_email;
use bughunt_shared::ConfigError;
use lambda_runtime::{run, service_fn, tracing, Error, LambdaEvent};
use serde::Deserialize;
use std::env;

#[derive(Deserialize)]
struct RecordKey {
    #[serde(rename = "PK")]
    pk: String,
}

/// Decode an outbox row from a stream record. Anything other than a freshly
/// inserted `NOTIFY` item yields `None`.
fn outbox_notification(record: &EventRecord) -> Option<Notification> {
    if record.event_name != "INSERT" {
        return None;
    }
    let key: RecordKey = serde_dynamo::from_item(record.change.new_image.clone()).ok()?;
    if key.pk != NOTIFY_PK {
        return None;
    }
    match serde_dynamo::from_item(record.change.new_image.clone()) {
        Ok(notification) => Some(notification),
        Err(e) => {
            tracing::error!(event_id = ?record.event_id, error = %e, "skipping undecodable outbox record");
            None
        }
    }
}

fn outbox_notifications(event: &Event) -> Vec<Notification> {
    event.records.iter().filter_map(outbox_notification).collect()
}

/// Send every queued notification in the batch. Transient SES failures fail
/// the batch so the stream redelivers it; bad addresses are dropped.
async fn function_handler(event: LambdaEvent<Event>, ses: &SesClient, from: &str) -> Result<(), Error> {
    let notifications = outbox_notifications(&event.payload);
    tracing::info!(
        records = event.payload.records.len(),
        notifications = notifications.len(),
        "stream batch received"
    );

    for notification in notifications {
        match send_email(ses, from, &notification.to, &notification.subject, &notification.body).await {
            Ok(()) => {}
            Err(ServiceError::Validation(reason)) => {
                tracing::warn!(
                    notification_id = %notification.notification_id,
                    kind = notification.kind.as_str(),
                    %reason,
                    "dropping undeliverable notification"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let from = env::var("EMAIL_FROM").map_err(|_| ConfigError::Missing("EMAIL_FROM"))?;
    let sdk_config = aws_config::load_from_env().await;
    let ses = SesClient::new(&sdk_config);

    let ses = &ses;
    let from = from.as_str();
    run(service_fn(move |event| async move { function_handler(event, ses, from).await })).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bughunt_atoms::notify::NotificationKind;

    fn record(event_name: &str, pk: &str) -> serde_json::Value {
        serde_json::json!({
            "eventID": "e-1",
            "eventName": event_name,
            "eventVersion": "1.1",
            "eventSource": "aws:dynamodb",
            "awsRegion": "us-east-1",
            "eventSourceARN": "arn:aws:dynamodb:us-east-1:000000000000:table/bughunt/stream/2026",
            "dynamodb": {
                "ApproximateCreationDateTime": 1781000000,
                "Keys": {
                    "PK": {"S": pk},
                    "SK": {"S": "NOTIFY#2026-06-10T00:00:00Z#n-1"}
                },
                "NewImage": {
                    "PK": {"S": pk},
                    "SK": {"S": "NOTIFY#2026-06-10T00:00:00Z#n-1"},
                    "notification_id": {"S": "n-1"},
                    "kind": {"S": "task_delivered"},
                    "to": {"S": "hunter@bughunt.test"},
                    "subject": {"S": "[Bug Hunt] BH-7 was delivered"},
                    "body": {"S": "Task BH-7 was delivered."},
                    "created_at": {"S": "2026-06-10T00:00:00Z"},
                    "ttl": {"N": "1782000000"}
                },
                "SequenceNumber": "100",
                "SizeBytes": 256,
                "StreamViewType": "NEW_IMAGE"
            }
        })
    }

    fn event(records: Vec<serde_json::Value>) -> Event {
        serde_json::from_value(serde_json::json!({ "Records": records })).unwrap()
    }

    #[test]
    fn decodes_outbox_inserts() {
        let notifications = outbox_notifications(&event(vec![record("INSERT", NOTIFY_PK)]));
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::TaskDelivered);
        assert_eq!(notifications[0].to, "hunter@bughunt.test");
    }

    #[test]
    fn ignores_other_rows_and_events() {
        let batch = event(vec![
            record("MODIFY", NOTIFY_PK),
            record("REMOVE", NOTIFY_PK),
            record("INSERT", "TASK"),
        ]);
        assert!(outbox_notifications(&batch).is_empty());
    }
}
