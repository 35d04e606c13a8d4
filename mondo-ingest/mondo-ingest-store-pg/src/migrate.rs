use anyhow::Context;
use tokio_postgres::Client;
use tracing::info;

mod embedded {
    refinery::embed_migrations!("./migrations");
}

/// Renaming this makes existing databases re-run every migration.
const MIGRATIONS_TABLE_NAME: &str = "public.mondo_ingest_schema_history";

/// Bring the database schema up to date.
pub async fn migrate(client: &mut Client) -> anyhow::Result<()> {
    let mut runner = embedded::migrations::runner();
    runner.set_migration_table_name(MIGRATIONS_TABLE_NAME);

    let report = runner
        .run_async(client)
        .await
        .context("apply schema migrations")?;

    for migration in report.applied_migrations() {
        info!("applied migration {migration}");
    }

    Ok(())
}
