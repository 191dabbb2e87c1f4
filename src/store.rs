use bson::doc;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateOptions},
    Client, Collection, Database, IndexModel,
};

use crate::error::AppError;
use crate::schemas::{DeviceTokens, Expense, Group, Member};
use crate::settlement::{SettlementRecord, SettlementStatus};

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn unique_index(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// At most one unpaid or pending record per debtor and creditor in a group.
///
/// Partial filters with `$in` need MongoDB 6.0 or later.
fn open_settlement_index() -> IndexModel {
    let open = [SettlementStatus::Unpaid, SettlementStatus::Pending].map(|s| s.to_string());
    IndexModel::builder()
        .keys(doc! { "group_id": 1, "from": 1, "to": 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .name("open_settlement_per_pair".to_string())
                .partial_filter_expression(doc! { "status": { "$in": open.to_vec() } })
                .build(),
        )
        .build()
}

/// Access to the MongoDB collections.
#[derive(Clone)]
pub struct Store {
    database: Database,
}

impl Store {
    pub fn new(client: &Client, database: &str) -> Self {
        Self {
            database: client.database(database),
        }
    }

    /// Creates the indexes the uniqueness rules rely on.
    pub async fn init(&self) -> Result<(), AppError> {
        self.groups()
            .create_index(unique_index(doc! { "id": 1 }), None)
            .await?;
        self.settlements()
            .create_index(unique_index(doc! { "id": 1 }), None)
            .await?;
        self.settlements()
            .create_index(open_settlement_index(), None)
            .await?;
        tracing::info!("indexes ready");
        Ok(())
    }

    fn groups(&self) -> Collection<Group> {
        self.database.collection("Groups")
    }

    fn settlements(&self) -> Collection<SettlementRecord> {
        self.database.collection("Settlements")
    }

    fn devices(&self) -> Collection<DeviceTokens> {
        self.database.collection("Devices")
    }

    pub async fn insert_group(&self, group: &Group) -> Result<(), AppError> {
        match self.groups().insert_one(group, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(AppError::Conflict(format!(
                "group \"{}\" already exists",
                group.id
            ))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn group(&self, id: &str) -> Result<Group, AppError> {
        self.groups()
            .find_one(doc! { "id": id }, None)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    pub async fn push_member(&self, group_id: &str, member: &Member) -> Result<(), AppError> {
        let result = self
            .groups()
            .update_one(
                doc! { "id": group_id, "members.id": { "$ne": member.id.as_str() } },
                doc! { "$push": { "members": bson::to_bson(member)? } },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            // Either the group is missing or the member is already there
            self.group(group_id).await?;
            return Err(AppError::Conflict(format!(
                "\"{}\" is already a member",
                member.id
            )));
        }
        Ok(())
    }

    pub async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<(), AppError> {
        let result = self
            .groups()
            .update_one(
                doc! { "id": group_id },
                doc! { "$push": { "expenses": bson::to_bson(expense)? } },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound(group_id.to_string()));
        }
        Ok(())
    }

    pub async fn settlements_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<SettlementRecord>, AppError> {
        let cursor = self
            .settlements()
            .find(doc! { "group_id": group_id }, None)
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    pub async fn settlement(&self, id: &str) -> Result<SettlementRecord, AppError> {
        self.settlements()
            .find_one(doc! { "id": id }, None)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    pub async fn insert_settlement(&self, record: &SettlementRecord) -> Result<(), AppError> {
        match self.settlements().insert_one(record, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(AppError::Conflict(format!(
                "a payment from \"{}\" to \"{}\" is already open",
                record.from, record.to
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Stores `record` only if the stored copy is still in `previous` state.
    pub async fn replace_settlement(
        &self,
        record: &SettlementRecord,
        previous: SettlementStatus,
    ) -> Result<(), AppError> {
        let result = self
            .settlements()
            .replace_one(
                doc! { "id": record.id.as_str(), "status": bson::to_bson(&previous)? },
                record,
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::Conflict(format!(
                "settlement \"{}\" changed in the meantime",
                record.id
            )));
        }
        Ok(())
    }

    pub async fn register_device(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.devices()
            .update_one(
                doc! { "user_id": user_id },
                doc! {
                    "$addToSet": { "tokens": token },
                    "$set": { "updated_at": bson::DateTime::from_chrono(Utc::now()) },
                },
                options,
            )
            .await?;
        Ok(())
    }

    pub async fn device_tokens(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .devices()
            .find_one(doc! { "user_id": user_id }, None)
            .await?
            .map(|devices| devices.tokens)
            .unwrap_or_default())
    }
}
