use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrainJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrainJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TrainJobs::DatasetPaths).text().not_null())
                    .col(ColumnDef::new(TrainJobs::Status).string_len(20).not_null())
                    .col(ColumnDef::new(TrainJobs::RemoteHandle).string().null())
                    .col(ColumnDef::new(TrainJobs::ModelUrl).text().null())
                    .col(ColumnDef::new(TrainJobs::ModelAccuracyUrl).text().null())
                    .col(ColumnDef::new(TrainJobs::ModelMovieUrl).text().null())
                    .col(
                        ColumnDef::new(TrainJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TrainJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_train_jobs_status")
                    .table(TrainJobs::Table)
                    .col(TrainJobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_train_jobs_remote_handle")
                    .table(TrainJobs::Table)
                    .col(TrainJobs::RemoteHandle)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_train_jobs_remote_handle")
                    .table(TrainJobs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_train_jobs_status")
                    .table(TrainJobs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TrainJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TrainJobs {
    Table,
    Id,
    DatasetPaths,
    Status,
    RemoteHandle,
    ModelUrl,
    ModelAccuracyUrl,
    ModelMovieUrl,
    CreatedAt,
    UpdatedAt,
}
