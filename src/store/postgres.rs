use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::model::{Id, NewResource, Resource};
use crate::store::traits::{ResourceStore, StoreTransaction};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn row_to_resource(row: &sqlx::postgres::PgRow) -> Result<Resource> {
    let attributes: Value = row.try_get("attributes")?;
    let relationships: Value = row.try_get("relationships")?;
    Ok(Resource {
        id: row.try_get("id")?,
        resource_type: row.try_get("resource_type")?,
        attributes: into_map(attributes),
        relationships: into_map(relationships),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait::async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get(&mut self, resource_type: &str, id: &str) -> Result<Option<Resource>> {
        let row = sqlx::query(
            r#"
            SELECT id, resource_type, attributes, relationships, created_at, updated_at
            FROM resources
            WHERE resource_type = $1 AND id = $2
            "#,
        )
        .bind(resource_type)
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch resource")?;

        let Some(row) = row else {
            return Ok(None);
        };

        row_to_resource(&row).map(Some)
    }

    async fn insert(&mut self, resource: NewResource) -> Result<Resource> {
        let resource = Resource::from_new(resource);

        sqlx::query(
            r#"
            INSERT INTO resources (id, resource_type, attributes, relationships, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&resource.id)
        .bind(&resource.resource_type)
        .bind(Value::Object(resource.attributes.clone()))
        .bind(Value::Object(resource.relationships.clone()))
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .execute(&mut *self.tx)
        .await
        .context("Failed to insert resource")?;

        Ok(resource)
    }

    async fn insert_many(&mut self, resources: Vec<NewResource>) -> Result<Vec<Resource>> {
        let resources: Vec<Resource> = resources.into_iter().map(Resource::from_new).collect();
        if resources.is_empty() {
            return Ok(resources);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO resources (id, resource_type, attributes, relationships, created_at, updated_at) ",
        );
        builder.push_values(resources.iter(), |mut row, resource| {
            row.push_bind(resource.id.clone())
                .push_bind(resource.resource_type.clone())
                .push_bind(Value::Object(resource.attributes.clone()))
                .push_bind(Value::Object(resource.relationships.clone()))
                .push_bind(resource.created_at)
                .push_bind(resource.updated_at);
        });

        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .context("Failed to bulk insert resources")?;

        Ok(resources)
    }

    async fn update(&mut self, mut resource: Resource) -> Result<Resource> {
        resource.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE resources
            SET attributes = $3, relationships = $4, updated_at = $5
            WHERE resource_type = $1 AND id = $2
            "#,
        )
        .bind(&resource.resource_type)
        .bind(&resource.id)
        .bind(Value::Object(resource.attributes.clone()))
        .bind(Value::Object(resource.relationships.clone()))
        .bind(resource.updated_at)
        .execute(&mut *self.tx)
        .await
        .context("Failed to update resource")?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "Resource {}/{} not found",
                resource.resource_type,
                resource.id
            );
        }

        Ok(resource)
    }

    async fn delete(&mut self, resource_type: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resources WHERE resource_type = $1 AND id = $2")
            .bind(resource_type)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete resource")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&mut self, resource_type: &str, ids: &[Id]) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM resources WHERE resource_type = $1 AND id = ANY($2)")
                .bind(resource_type)
                .bind(ids.to_vec())
                .execute(&mut *self.tx)
                .await
                .context("Failed to bulk delete resources")?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")
    }
}
