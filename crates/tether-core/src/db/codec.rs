//! Module: db::codec
//! Responsibility: moving property values between stored documents and
//! record instances.
//! Does not own: reference resolution (see `db::reference`).
//!
//! Decoding registers the new instance in the cache before any property is
//! populated, so a cycle that leads back to it finds the in-progress entry
//! instead of decoding the document again.

use crate::{
    db::{
        cache::{CacheKey, EntityCache},
        reference::{LazyReference, ResolveContext},
    },
    error::{DecodeError, MappingError},
    mapper::Mapper,
    model::{EntityModel, Instance, PropertyModel, PropertyValue},
    obs::sink::{self, MappingEvent},
    value::{DocId, Document, Value},
};
use std::{rc::Rc, sync::Arc};

/// Identifier of a stored document, read under the model's identity key.
pub fn document_id(model: &EntityModel, document: &Document) -> Result<DocId, MappingError> {
    let property = model.id_property()?;
    let value = document
        .get(property.mapped_name())
        .ok_or_else(|| DecodeError::MissingId {
            type_name: model.type_name().to_string(),
            key: property.mapped_name().to_string(),
        })?;

    DocId::from_value(value).map_err(|source| {
        DecodeError::Property {
            property: property.name().to_string(),
            source,
        }
        .into()
    })
}

/// The model to decode `document` with: the subtype named by its
/// discriminator, or `model` itself.
pub fn select_model(
    mapper: &Mapper,
    model: &Arc<EntityModel>,
    document: &Document,
) -> Result<Arc<EntityModel>, MappingError> {
    let Some(key) = model.discriminator_key() else {
        return Ok(Arc::clone(model));
    };
    let value = match document.get(key) {
        None | Some(Value::Null) => return Ok(Arc::clone(model)),
        Some(Value::Text(value)) => value,
        Some(other) => {
            return Err(DecodeError::UnknownDiscriminator {
                key: key.to_string(),
                value: other.kind_name().to_string(),
            }
            .into());
        }
    };
    if model.discriminator() == Some(value.as_str()) {
        return Ok(Arc::clone(model));
    }

    mapper.model_for_discriminator(value)?.ok_or_else(|| {
        DecodeError::UnknownDiscriminator {
            key: key.to_string(),
            value: value.clone(),
        }
        .into()
    })
}

/// Decode one document into an instance registered in `cache`. Returns the
/// cached instance when the document's identity is already present.
pub fn decode(
    context: &ResolveContext,
    cache: &EntityCache,
    model: &Arc<EntityModel>,
    document: &Document,
) -> Result<Instance, MappingError> {
    let collection = model.collection_name();
    let key = CacheKey::new(collection, document_id(model, document)?);
    if let Some(instance) = cache.get(&key) {
        sink::record(MappingEvent::CacheHit { collection });
        return Ok(instance);
    }

    let concrete = select_model(context.mapper(), model, document)?;
    let instance = concrete.instantiate()?;
    cache.register(key.clone(), Rc::clone(&instance));

    match populate(context, cache, &concrete, &instance, document) {
        Ok(()) => {
            cache.mark_loaded(&key);
            sink::record(MappingEvent::Decoded { collection });

            Ok(instance)
        }
        Err(err) => {
            cache.evict(&key);
            sink::record(MappingEvent::DecodeFailed { collection });

            Err(err)
        }
    }
}

fn populate(
    context: &ResolveContext,
    cache: &EntityCache,
    model: &EntityModel,
    instance: &Instance,
    document: &Document,
) -> Result<(), MappingError> {
    // Phase 1: stored values, so in-progress instances expose their
    // identity and scalars to cycles that reach them.
    {
        let mut record = model.borrow_mut(instance)?;
        for property in model.properties().iter().filter(|p| !p.is_reference()) {
            if let Some(value) = document.get(property.mapped_name()) {
                property.write(&mut *record, PropertyValue::Value(value.clone()))?;
            }
        }
    }

    // Phase 2: references, built and resolved with no borrow held.
    let mut references = Vec::new();
    for property in model.properties().iter().filter(|p| p.is_reference()) {
        let Some(value) = document.get(property.mapped_name()) else {
            continue;
        };
        references.push((property, bind_reference(context, cache, property, value)?));
    }

    // Phase 3: write bound references back.
    let mut record = model.borrow_mut(instance)?;
    for (property, reference) in references {
        property.write(&mut *record, PropertyValue::Reference(reference))?;
    }

    Ok(())
}

fn bind_reference(
    context: &ResolveContext,
    cache: &EntityCache,
    property: &PropertyModel,
    value: &Value,
) -> Result<LazyReference, MappingError> {
    let marker = property.reference().cloned().unwrap_or_default();
    let shape = property.shape().cloned().ok_or_else(|| {
        MappingError::configuration(format!("property '{}' is not a reference", property.name()))
    })?;
    let target = context.mapper().entity_model(property.target_type().raw())?;

    let reference = LazyReference::stored(
        shape,
        value.clone(),
        &marker,
        target,
        context.clone(),
        cache,
    )?;
    if !marker.lazy {
        reference.resolve()?;
    }

    Ok(reference)
}

/// Encode an instance into its stored document.
pub fn encode(
    mapper: &Mapper,
    model: &Arc<EntityModel>,
    instance: &Instance,
) -> Result<Document, MappingError> {
    let concrete = mapper.model_for_instance(model, instance)?;
    let config = mapper.config();
    let mut document = Document::new();

    let mut references = Vec::new();
    {
        let record = concrete.borrow(instance)?;
        for property in concrete.properties() {
            match property.read(&*record)? {
                PropertyValue::Value(value) => {
                    if keep(&value, config.store_nulls, config.store_empties) {
                        document.insert(property.mapped_name(), value);
                    }
                }
                PropertyValue::Reference(reference) => references.push((property, reference)),
            }
        }
    }

    for (property, reference) in references {
        let target = mapper.entity_model(property.target_type().raw())?;
        let value = reference.to_stored_value(mapper, &target)?;
        if keep(&value, config.store_nulls, config.store_empties) {
            document.insert(property.mapped_name(), value);
        }
    }

    if let (Some(key), Some(value)) = (concrete.discriminator_key(), concrete.discriminator()) {
        document.insert(key, value);
    }

    Ok(document)
}

fn keep(value: &Value, store_nulls: bool, store_empties: bool) -> bool {
    match value {
        Value::Null => store_nulls,
        Value::List(items) => store_empties || !items.is_empty(),
        Value::Document(fields) => store_empties || !fields.is_empty(),
        _ => true,
    }
}
