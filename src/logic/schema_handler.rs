use serde_json::{Map, Value};

use crate::logic::handler::{FieldError, HandlerError, ResourceHandler, Validated};
use crate::model::{
    Cardinality, NewResource, RelationshipDef, Resource, ResourceIdentifier, ResourceObject,
    ResourceSchema,
};
use crate::store::traits::StoreTransaction;

/// Generic handler persisting resources as stored records, validated
/// against a `ResourceSchema`.
#[derive(Debug, Clone)]
pub struct SchemaHandler {
    schema: ResourceSchema,
}

impl SchemaHandler {
    pub fn new(schema: ResourceSchema) -> Self {
        Self { schema }
    }

    fn validate_attributes(
        &self,
        attributes: &Map<String, Value>,
        partial: bool,
        errors: &mut Vec<FieldError>,
    ) {
        // Check for required attributes
        if !partial {
            for def in self.schema.attributes.iter().filter(|a| a.required) {
                if attributes.get(&def.name).map_or(true, Value::is_null) {
                    errors.push(FieldError::attribute(
                        &def.name,
                        format!("Required attribute '{}' is missing", def.name),
                    ));
                }
            }
        }

        for (name, value) in attributes {
            let Some(def) = self.schema.get_attribute(name) else {
                errors.push(FieldError::attribute(
                    name,
                    format!(
                        "Attribute '{}' is not defined for type '{}'",
                        name, self.schema.resource_type
                    ),
                ));
                continue;
            };

            if value.is_null() {
                if def.required {
                    errors.push(FieldError::attribute(
                        name,
                        format!("Attribute '{}' may not be null", name),
                    ));
                }
                continue;
            }

            if !def.data_type.matches(value) {
                errors.push(FieldError::attribute(
                    name,
                    format!("Type mismatch for attribute '{}': expected {:?}", name, def.data_type),
                ));
            }
        }
    }

    fn validate_relationships(
        &self,
        payload: &ResourceObject,
        partial: bool,
        errors: &mut Vec<FieldError>,
    ) -> Map<String, Value> {
        let mut linkages = Map::new();

        if !partial {
            for def in self.schema.relationships.iter().filter(|r| r.required) {
                if payload.linkage(&def.name).map_or(true, |l| l.is_null()) {
                    errors.push(FieldError::relationship(
                        &def.name,
                        format!("Required relationship '{}' is missing", def.name),
                    ));
                }
            }
        }

        for name in payload.relationships.keys() {
            let Some(def) = self.schema.get_relationship(name) else {
                errors.push(FieldError::relationship(
                    name,
                    format!(
                        "Relationship '{}' is not defined for type '{}'",
                        name, self.schema.resource_type
                    ),
                ));
                continue;
            };

            let Some(linkage) = payload.linkage(name) else {
                errors.push(FieldError::relationship(
                    name,
                    format!("Relationship '{}' must carry a `data` member", name),
                ));
                continue;
            };

            match Self::check_linkage(def, &linkage) {
                Ok(()) => {
                    linkages.insert(name.clone(), linkage);
                }
                Err(detail) => errors.push(FieldError::relationship(name, detail)),
            }
        }

        linkages
    }

    fn check_linkage(def: &RelationshipDef, linkage: &Value) -> Result<(), String> {
        let check_identifier = |value: &Value| -> Result<(), String> {
            let identifier = ResourceIdentifier::from_value(value).ok_or_else(|| {
                format!("Relationship '{}' contains an invalid resource identifier", def.name)
            })?;
            if identifier.resource_type != def.target {
                return Err(format!(
                    "Relationship '{}' expects type '{}', got '{}'",
                    def.name, def.target, identifier.resource_type
                ));
            }
            if identifier.id.is_none() {
                return Err(format!(
                    "Relationship '{}' references a resource without an id",
                    def.name
                ));
            }
            Ok(())
        };

        match (def.cardinality, linkage) {
            (Cardinality::ToOne, Value::Null) => {
                if def.required {
                    Err(format!("Relationship '{}' may not be cleared", def.name))
                } else {
                    Ok(())
                }
            }
            (Cardinality::ToOne, value @ Value::Object(_)) => check_identifier(value),
            (Cardinality::ToMany, Value::Array(items)) => items.iter().try_for_each(check_identifier),
            (Cardinality::ToOne, _) => Err(format!(
                "Relationship '{}' is to-one and expects an object or null",
                def.name
            )),
            (Cardinality::ToMany, _) => Err(format!(
                "Relationship '{}' is to-many and expects an array",
                def.name
            )),
        }
    }
}

#[async_trait::async_trait]
impl ResourceHandler for SchemaHandler {
    fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    async fn locate(
        &self,
        tx: &mut dyn StoreTransaction,
        id: &str,
    ) -> Result<Option<Resource>, HandlerError> {
        Ok(tx.get(&self.schema.resource_type, id).await?)
    }

    fn validate(
        &self,
        payload: &ResourceObject,
        instance: Option<&Resource>,
        partial: bool,
    ) -> Result<Validated, HandlerError> {
        let mut errors = Vec::new();

        if payload.resource_type != self.schema.resource_type {
            errors.push(FieldError::resource(format!(
                "Expected resource type '{}', got '{}'",
                self.schema.resource_type, payload.resource_type
            )));
        }

        self.validate_attributes(&payload.attributes, partial, &mut errors);
        let linkages = self.validate_relationships(payload, partial, &mut errors);

        if !errors.is_empty() {
            return Err(HandlerError::Invalid(errors));
        }

        match instance {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.attributes.extend(payload.attributes.clone());
                merged.relationships.extend(linkages);
                Ok(Validated::Replace(merged))
            }
            None => Ok(Validated::Create(NewResource {
                id: payload.id.clone(),
                resource_type: self.schema.resource_type.clone(),
                attributes: payload.attributes.clone(),
                relationships: linkages,
            })),
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn StoreTransaction,
        validated: Validated,
    ) -> Result<Resource, HandlerError> {
        let resource = match validated {
            Validated::Create(new_resource) => tx.insert(new_resource).await?,
            Validated::Replace(resource) => tx.update(resource).await?,
        };
        Ok(resource)
    }

    fn render(&self, instance: &Resource) -> Value {
        instance.to_resource_object()
    }

    async fn delete(
        &self,
        tx: &mut dyn StoreTransaction,
        instance: &Resource,
    ) -> Result<(), HandlerError> {
        if !tx.delete(&instance.resource_type, &instance.id).await? {
            return Err(HandlerError::NotFound {
                resource_type: instance.resource_type.clone(),
                id: instance.id.clone(),
            });
        }
        Ok(())
    }

    async fn apply_many(
        &self,
        tx: &mut dyn StoreTransaction,
        validated: Vec<Validated>,
    ) -> Result<Vec<Resource>, HandlerError> {
        let mut creates = Vec::with_capacity(validated.len());
        for item in validated {
            match item {
                Validated::Create(new_resource) => creates.push(new_resource),
                Validated::Replace(_) => {
                    return Err(HandlerError::Unsupported(
                        "Updates cannot be applied in bulk".to_string(),
                    ))
                }
            }
        }
        Ok(tx.insert_many(creates).await?)
    }

    async fn delete_many(
        &self,
        tx: &mut dyn StoreTransaction,
        instances: &[Resource],
    ) -> Result<(), HandlerError> {
        let ids: Vec<_> = instances.iter().map(|r| r.id.clone()).collect();
        tx.delete_many(&self.schema.resource_type, &ids).await?;
        Ok(())
    }
}
