use anyhow::Result;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::logic::{
    ActionHandler, FieldError, HandlerError, HandlerRegistry, ResourceHandler, SchemaHandler,
    Validated,
};
use crate::model::{
    generate_id, DataType, NewResource, OpCode, Resource, ResourceIdentifier, ResourceObject,
    ResourceSchema,
};
use crate::store::traits::{ResourceStore, StoreTransaction};

pub const ARTICLES: &str = "articles";
pub const PEOPLE: &str = "people";
pub const COMMENTS: &str = "comments";
pub const BULK_ARTICLES: &str = "bulkArticles";

pub fn article_schema() -> ResourceSchema {
    ResourceSchema::new(ARTICLES)
        .attribute("title", DataType::String, true)
        .attribute("body", DataType::String, false)
        .attribute("published", DataType::Boolean, false)
        .to_one("author", PEOPLE, false)
        .to_many("comments", COMMENTS)
}

pub fn person_schema() -> ResourceSchema {
    ResourceSchema::new(PEOPLE)
        .attribute("name", DataType::String, true)
        .attribute("email", DataType::String, false)
}

pub fn comment_schema() -> ResourceSchema {
    ResourceSchema::new(COMMENTS)
        .attribute("body", DataType::String, true)
        .to_one("article", ARTICLES, false)
        .to_one("author", PEOPLE, false)
}

/// Handlers for the demo resource types served by the binary.
pub fn demo_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_resource(Arc::new(SchemaHandler::new(article_schema())))
        .register_resource(Arc::new(SchemaHandler::new(person_schema())))
        .register_resource(Arc::new(SchemaHandler::new(comment_schema())))
        .register_resource(Arc::new(BulkArticlesHandler::new()))
        .register_action(ARTICLES, "publish", Arc::new(PublishArticles));
    registry
}

/// `invoke` action marking articles as published. Accepts one resource
/// identifier or a list of them and returns the updated articles.
pub struct PublishArticles;

#[async_trait::async_trait]
impl ActionHandler for PublishArticles {
    async fn invoke(
        &self,
        tx: &mut dyn StoreTransaction,
        data: &Value,
    ) -> Result<Value, HandlerError> {
        let identifiers: Vec<Value> = match data {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![data.clone()],
            _ => {
                return Err(HandlerError::Invalid(vec![FieldError::resource(
                    "publish expects an article identifier or a list of them",
                )]))
            }
        };

        let mut published = Vec::with_capacity(identifiers.len());
        for identifier in &identifiers {
            let id = ResourceIdentifier::from_value(identifier)
                .filter(|identifier| identifier.resource_type == ARTICLES)
                .and_then(|identifier| identifier.id)
                .ok_or_else(|| {
                    HandlerError::Invalid(vec![FieldError::resource(
                        "publish expects identifiers of type 'articles'",
                    )])
                })?;

            let mut article = tx.get(ARTICLES, &id).await?.ok_or(HandlerError::NotFound {
                resource_type: ARTICLES.to_string(),
                id,
            })?;
            article
                .attributes
                .insert("published".to_string(), Value::Bool(true));
            let article = tx.update(article).await?;
            published.push(article.to_resource_object());
        }

        Ok(match data {
            Value::Array(_) => Value::Array(published),
            _ => published.into_iter().next().unwrap_or(Value::Null),
        })
    }
}

/// Bulk collection: one `add` of `bulkArticles` creates every article listed
/// in its `items` attribute with a single store call. The collection itself
/// is not stored and cannot be addressed afterwards.
pub struct BulkArticlesHandler {
    schema: ResourceSchema,
}

impl BulkArticlesHandler {
    pub fn new() -> Self {
        Self {
            schema: ResourceSchema::new(BULK_ARTICLES)
                .attribute("items", DataType::Array, true)
                .with_operations(&[OpCode::Add]),
        }
    }
}

impl Default for BulkArticlesHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ResourceHandler for BulkArticlesHandler {
    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn locate(
        &self,
        _tx: &mut dyn StoreTransaction,
        _id: &str,
    ) -> Result<Option<Resource>, HandlerError> {
        Ok(None)
    }

    fn validate(
        &self,
        payload: &ResourceObject,
        instance: Option<&Resource>,
        _partial: bool,
    ) -> Result<Validated, HandlerError> {
        if instance.is_some() {
            return Err(HandlerError::Unsupported(
                "Bulk collections cannot be updated".to_string(),
            ));
        }

        let Some(Value::Array(items)) = payload.attributes.get("items") else {
            return Err(HandlerError::Invalid(vec![FieldError::attribute(
                "items",
                "Attribute 'items' must be a list of article attributes",
            )]));
        };

        let articles = SchemaHandler::new(article_schema());
        for item in items {
            if !item.is_object() {
                return Err(HandlerError::Invalid(vec![FieldError::attribute(
                    "items",
                    "Every entry of 'items' must be an object",
                )]));
            }
            let article = ResourceObject::from_value(&json!({ "type": ARTICLES, "attributes": item }));
            if let Err(HandlerError::Invalid(errors)) = articles.validate(&article, None, false) {
                let detail = errors
                    .into_iter()
                    .next()
                    .map(|error| error.detail)
                    .unwrap_or_default();
                return Err(HandlerError::Invalid(vec![FieldError::attribute("items", detail)]));
            }
        }

        Ok(Validated::Create(NewResource {
            id: None,
            resource_type: BULK_ARTICLES.to_string(),
            attributes: payload.attributes.clone(),
            relationships: Map::new(),
        }))
    }

    async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        validated: Validated,
    ) -> Result<Resource, HandlerError> {
        let Validated::Create(collection) = validated else {
            return Err(HandlerError::Unsupported(
                "Bulk collections cannot be updated".to_string(),
            ));
        };

        let items = match collection.attributes.get("items") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        let new_articles = items
            .into_iter()
            .map(|item| NewResource {
                id: None,
                resource_type: ARTICLES.to_string(),
                attributes: item.as_object().cloned().unwrap_or_default(),
                relationships: Map::new(),
            })
            .collect();
        let created = tx.insert_many(new_articles).await?;

        let mut attributes = Map::new();
        attributes.insert("count".to_string(), json!(created.len()));
        attributes.insert(
            "ids".to_string(),
            Value::Array(created.iter().map(|a| Value::String(a.id.clone())).collect()),
        );
        Ok(Resource::from_new(NewResource {
            id: Some(generate_id()),
            resource_type: BULK_ARTICLES.to_string(),
            attributes,
            relationships: Map::new(),
        }))
    }

    fn render(&self, instance: &Resource) -> Value {
        instance.to_resource_object()
    }

    async fn delete(
        &self,
        _tx: &mut dyn StoreTransaction,
        _instance: &Resource,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported(
            "Bulk collections cannot be removed".to_string(),
        ))
    }
}

/// Loads a small set of demo resources, unless they already exist.
pub async fn load_seed_data<S: ResourceStore>(store: &S) -> Result<()> {
    let mut tx = store.begin().await?;

    if tx.get(PEOPLE, "seed-person-1").await?.is_some() {
        log::info!("Seed data already present");
        return tx.rollback().await;
    }

    let person = tx
        .insert(NewResource {
            id: Some("seed-person-1".to_string()),
            resource_type: PEOPLE.to_string(),
            attributes: json!({"name": "Ada Lovelace", "email": "ada@example.com"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            relationships: Map::new(),
        })
        .await?;

    let article = tx
        .insert(NewResource {
            id: Some("seed-article-1".to_string()),
            resource_type: ARTICLES.to_string(),
            attributes: json!({"title": "Notes on the Analytical Engine", "published": false})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            relationships: json!({"author": person.identifier(), "comments": []})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        })
        .await?;

    tx.insert(NewResource {
        id: Some("seed-comment-1".to_string()),
        resource_type: COMMENTS.to_string(),
        attributes: json!({"body": "First!"}).as_object().cloned().unwrap_or_default(),
        relationships: json!({"article": article.identifier(), "author": person.identifier()})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    })
    .await?;

    tx.commit().await?;
    log::info!("Seed data loaded");
    Ok(())
}
