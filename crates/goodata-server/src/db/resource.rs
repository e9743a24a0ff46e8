//! Resource metadata persistence.
//!
//! A row in `resources` means at least one import of that resource version
//! has been committed; the update checker uses presence as its diff. The
//! upsert runs inside the import worker's transaction, so the row never
//! lands ahead of the imported data.

use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use super::DbResult;
use crate::catalog::Resource;

const RESOURCE_COLUMNS: &str = "\
    id, package_id, name, description, url, url_type, format, mimetype, \
    size, hash, state, position, created, last_modified, \
    cache_last_updated, datastore_active, revision_id";

/// Idempotent upsert keyed on `id`; every column is replaced on conflict.
pub async fn save_resource<'e, E>(executor: E, resource: &Resource) -> DbResult<()>
where
    E: PgExecutor<'e>,
{
    let query = format!(
        r#"
        INSERT INTO resources ({RESOURCE_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (id) DO UPDATE SET
            package_id = EXCLUDED.package_id,
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            url = EXCLUDED.url,
            url_type = EXCLUDED.url_type,
            format = EXCLUDED.format,
            mimetype = EXCLUDED.mimetype,
            size = EXCLUDED.size,
            hash = EXCLUDED.hash,
            state = EXCLUDED.state,
            position = EXCLUDED.position,
            created = EXCLUDED.created,
            last_modified = EXCLUDED.last_modified,
            cache_last_updated = EXCLUDED.cache_last_updated,
            datastore_active = EXCLUDED.datastore_active,
            revision_id = EXCLUDED.revision_id
        "#
    );

    sqlx::query(&query)
        .bind(resource.id)
        .bind(resource.package_id)
        .bind(&resource.name)
        .bind(&resource.description)
        .bind(&resource.url)
        .bind(&resource.url_type)
        .bind(&resource.format)
        .bind(&resource.mimetype)
        .bind(resource.size)
        .bind(&resource.hash)
        .bind(&resource.state)
        .bind(resource.position)
        .bind(resource.created)
        .bind(resource.last_modified)
        .bind(resource.cache_last_updated)
        .bind(resource.datastore_active)
        .bind(resource.revision_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Fetch a resource's metadata by id, if it was ever imported.
pub async fn get_resource<'e, E>(executor: E, id: Uuid) -> DbResult<Option<Resource>>
where
    E: PgExecutor<'e>,
{
    let query = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1");

    let resource = sqlx::query_as::<_, Resource>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(resource)
}
