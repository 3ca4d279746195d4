use aws_sdk_dynamodb::types::{AttributeValue, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoClient;

use super::model::{PendingUser, Role, User};
use crate::error::{ServiceError, ServiceResult};
use crate::item::{get_bool, get_s, key, s, user_sk, Item, PENDING_USER_PK, USER_PK};
use crate::tx;

pub fn pending_to_item(pending: &PendingUser) -> Item {
    let mut item = key(PENDING_USER_PK, user_sk(&pending.username));
    item.insert("username".into(), s(&pending.username));
    item.insert("email".into(), s(&pending.email));
    item.insert("role".into(), s(pending.role.as_str()));
    item.insert("created_at".into(), s(&pending.created_at));
    item
}

pub fn pending_from_item(item: &Item) -> ServiceResult<PendingUser> {
    Ok(PendingUser {
        username: get_s(item, "username"),
        email: get_s(item, "email"),
        role: get_s(item, "role").parse()?,
        created_at: get_s(item, "created_at"),
    })
}

pub fn user_to_item(user: &User) -> Item {
    let mut item = key(USER_PK, user_sk(&user.username));
    item.insert("username".into(), s(&user.username));
    item.insert("email".into(), s(&user.email));
    item.insert("role".into(), s(user.role.as_str()));
    item.insert("verified".into(), AttributeValue::Bool(user.verified));
    item.insert("created_at".into(), s(&user.created_at));
    item.insert("approved_at".into(), s(&user.approved_at));
    item.insert("approved_by".into(), s(&user.approved_by));
    item
}

pub fn user_from_item(item: &Item) -> ServiceResult<User> {
    Ok(User {
        username: get_s(item, "username"),
        email: get_s(item, "email"),
        role: get_s(item, "role").parse()?,
        verified: get_bool(item, "verified"),
        created_at: get_s(item, "created_at"),
        approved_at: get_s(item, "approved_at"),
        approved_by: get_s(item, "approved_by"),
    })
}

/// Writes for a new registration: the username must be free in both the
/// verified and the pending partitions.
pub fn register_writes(table_name: &str, pending: &PendingUser) -> ServiceResult<Vec<TransactWriteItem>> {
    Ok(vec![
        tx::condition_check(
            table_name,
            key(USER_PK, user_sk(&pending.username)),
            "attribute_not_exists(PK)",
        )?,
        tx::put(table_name, pending_to_item(pending), Some("attribute_not_exists(PK)"))?,
    ])
}

/// Writes for approval: the verified user appears and the pending record
/// disappears together, or neither happens.
pub fn approve_writes(table_name: &str, user: &User) -> ServiceResult<Vec<TransactWriteItem>> {
    Ok(vec![
        tx::put(table_name, user_to_item(user), Some("attribute_not_exists(PK)"))?,
        tx::delete(
            table_name,
            key(PENDING_USER_PK, user_sk(&user.username)),
            Some("attribute_exists(PK)"),
        )?,
    ])
}

/// Store a registration awaiting approval
pub async fn create_pending_user(
    client: &DynamoClient,
    table_name: &str,
    pending: &PendingUser,
) -> ServiceResult<()> {
    let writes = register_writes(table_name, pending)?;
    tx::commit_or(client, writes, |_| {
        ServiceError::Validation(format!("Username '{}' is already taken", pending.username))
    })
    .await?;
    tracing::info!(username = %pending.username, role = %pending.role, "pending user stored");
    Ok(())
}

async fn get_item(
    client: &DynamoClient,
    table_name: &str,
    pk: &str,
    username: &str,
) -> ServiceResult<Option<Item>> {
    let result = client
        .get_item()
        .table_name(table_name)
        .set_key(Some(key(pk, user_sk(username))))
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB get_item", e))?;
    Ok(result.item().cloned())
}

pub async fn get_pending_user(
    client: &DynamoClient,
    table_name: &str,
    username: &str,
) -> ServiceResult<PendingUser> {
    match get_item(client, table_name, PENDING_USER_PK, username).await? {
        Some(item) => pending_from_item(&item),
        None => Err(ServiceError::NotFound(format!("Pending user '{}'", username))),
    }
}

pub async fn get_user(client: &DynamoClient, table_name: &str, username: &str) -> ServiceResult<User> {
    match get_item(client, table_name, USER_PK, username).await? {
        Some(item) => user_from_item(&item),
        None => Err(ServiceError::NotFound(format!("User '{}'", username))),
    }
}

async fn query_partition(client: &DynamoClient, table_name: &str, pk: &str) -> ServiceResult<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key = None;
    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", s(pk))
            .expression_attribute_values(":sk_prefix", s("USER#"))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| ServiceError::upstream("DynamoDB query", e))?;
        items.extend(result.items().iter().cloned());
        start_key = result.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }
    Ok(items)
}

pub async fn list_pending_users(client: &DynamoClient, table_name: &str) -> ServiceResult<Vec<PendingUser>> {
    let mut users = query_partition(client, table_name, PENDING_USER_PK)
        .await?
        .iter()
        .map(pending_from_item)
        .collect::<ServiceResult<Vec<_>>>()?;
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(users)
}

pub async fn list_users(client: &DynamoClient, table_name: &str) -> ServiceResult<Vec<User>> {
    query_partition(client, table_name, USER_PK)
        .await?
        .iter()
        .map(user_from_item)
        .collect()
}

/// Users holding a role, for notification fan-out
pub async fn list_users_with_role(
    client: &DynamoClient,
    table_name: &str,
    role: Role,
) -> ServiceResult<Vec<User>> {
    Ok(list_users(client, table_name)
        .await?
        .into_iter()
        .filter(|u| u.role == role)
        .collect())
}

/// Promote a pending user, atomically replacing the pending record.
/// `extra_writes` (e.g. a queued welcome email) commit in the same transaction.
pub async fn approve_pending_user(
    client: &DynamoClient,
    table_name: &str,
    user: User,
    extra_writes: Vec<TransactWriteItem>,
) -> ServiceResult<User> {
    let mut writes = approve_writes(table_name, &user)?;
    writes.extend(extra_writes);
    tx::commit_or(client, writes, |failed| {
        if failed.contains(&0) {
            ServiceError::Conflict(format!("User '{}' is already verified", user.username))
        } else {
            ServiceError::NotFound(format!("Pending user '{}'", user.username))
        }
    })
    .await?;
    tracing::info!(username = %user.username, approved_by = %user.approved_by, "user approved");
    Ok(user)
}

pub async fn delete_pending_user(client: &DynamoClient, table_name: &str, username: &str) -> ServiceResult<()> {
    client
        .delete_item()
        .table_name(table_name)
        .set_key(Some(key(PENDING_USER_PK, user_sk(username))))
        .send()
        .await
        .map_err(|e| ServiceError::upstream("DynamoDB delete_item", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingUser {
        PendingUser {
            username: "dave".into(),
            email: "dave@example.com".into(),
            role: Role::Hunter,
            created_at: "2026-03-01T10:00:00Z".into(),
        }
    }

    #[test]
    fn pending_user_item_roundtrip() {
        let item = pending_to_item(&pending());
        assert_eq!(get_s(&item, "PK"), "PENDING_USER");
        assert_eq!(get_s(&item, "SK"), "USER#dave");
        assert_eq!(pending_from_item(&item).unwrap(), pending());
    }

    #[test]
    fn registration_checks_both_partitions() {
        let writes = register_writes("bughunt", &pending()).unwrap();
        assert_eq!(writes.len(), 2);

        let check = writes[0].condition_check().expect("condition check on USER");
        assert_eq!(get_s(check.key(), "PK"), "USER");
        assert_eq!(check.condition_expression(), "attribute_not_exists(PK)");

        let put = writes[1].put().expect("put of pending user");
        assert_eq!(get_s(put.item(), "PK"), "PENDING_USER");
        assert_eq!(put.condition_expression(), Some("attribute_not_exists(PK)"));
    }

    #[test]
    fn approval_moves_pending_into_users() {
        let user = User::from_pending(pending(), "root", "2026-03-02T10:00:00Z");
        let writes = approve_writes("bughunt", &user).unwrap();
        assert_eq!(writes.len(), 2);

        let put = writes[0].put().expect("put of verified user");
        assert_eq!(get_s(put.item(), "PK"), "USER");
        assert!(get_bool(put.item(), "verified"));

        let delete = writes[1].delete().expect("delete of pending user");
        assert_eq!(get_s(delete.key(), "PK"), "PENDING_USER");
        assert_eq!(get_s(delete.key(), "SK"), "USER#dave");
        assert_eq!(delete.condition_expression(), Some("attribute_exists(PK)"));
    }

    #[test]
    fn unknown_stored_role_is_rejected() {
        let mut item = pending_to_item(&pending());
        item.insert("role".into(), s("superuser"));
        assert!(pending_from_item(&item).is_err());
    }
}
