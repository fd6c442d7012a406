use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "train_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// JSON array of dataset paths, in submission order.
    #[sea_orm(column_type = "Text")]
    pub dataset_paths: String,
    pub status: String,
    pub remote_handle: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub model_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub model_accuracy_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub model_movie_url: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
