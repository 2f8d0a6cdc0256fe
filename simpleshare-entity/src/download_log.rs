use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// One row per successful download. `file_id` refers to `files.id` without a
/// foreign key; rows are removed together with their file.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "download_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    #[serde(skip_deserializing)]
    pub id: i32,

    pub file_id: Uuid,

    pub download_date: ChronoDateTimeUtc,

    /// Address of the downloading client, if known
    pub ip_address: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            download_date: Set(chrono::Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
