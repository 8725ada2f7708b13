use std::convert::Infallible;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::document::{Document, Element, Field, FieldMap, LinkField, RichTextNode, Span};
use crate::mapping::IdMapping;

/// Prepare a source document for creation in `target_locale`: stamp locale
/// and provenance, then clear every integration field the walk covers.
/// Returns the number of fields cleared.
pub fn localize_document(document: &mut Document, target_locale: &str) -> usize {
    document.alternate_language_id = Some(document.id.clone());
    document.title = Some(
        document
            .uid
            .clone()
            .unwrap_or_else(|| document.doc_type.clone()),
    );
    document.lang = target_locale.to_string();

    let mut cleared = 0;
    document
        .data
        .for_each_record(|record| cleared += clear_integration_fields(record));
    cleared
}

/// Point the document and every live document link in it at the created
/// copies. Returns the number of link ids rewritten.
pub fn relink_document(document: &mut Document, mapping: &IdMapping) -> Result<usize> {
    let label = document.label();
    document.id = mapping
        .resolve(&document.id)
        .with_context(|| format!("failed to resolve created id for document {label}"))?
        .to_string();

    let mut rewritten = 0;
    document
        .data
        .try_for_each_record(|record| {
            for_each_document_link(record, &mut |id: &mut String| -> Result<()> {
                *id = mapping.resolve(id.as_str())?.to_string();
                rewritten += 1;
                Ok(())
            })
        })
        .with_context(|| format!("failed to rewrite links of document {label}"))?;
    Ok(rewritten)
}

/// Collect the target ids of every live document link, in walk order.
pub fn document_link_targets(document: &mut Document) -> Vec<String> {
    let mut targets = Vec::new();
    document.data.for_each_record(|record| {
        let Ok(()) = for_each_document_link(record, &mut |id: &mut String| {
            targets.push(id.clone());
            Ok::<(), Infallible>(())
        });
    });
    targets
}

fn clear_integration_fields(record: &mut FieldMap) -> usize {
    let mut cleared = 0;
    for field in record.values_mut() {
        if matches!(field, Field::Integration(_)) {
            *field = Field::cleared();
            cleared += 1;
            continue;
        }
        match field {
            Field::Sequence(elements) => {
                for element in elements {
                    cleared += clear_integration_element(element);
                }
            }
            Field::SliceZone(slices) => {
                for slice in slices {
                    cleared += clear_integration_attributes(&mut slice.attributes);
                }
            }
            Field::Scalar(_) | Field::Link(_) | Field::Integration(_) => {}
        }
    }
    cleared
}

/// One level deep: only the element's own attributes or sub-fields.
fn clear_integration_element(element: &mut Element) -> usize {
    match element {
        Element::Node(node) => clear_integration_attributes(&mut node.attributes),
        Element::Item(item) => {
            let mut cleared = 0;
            for sub_field in item.values_mut() {
                if matches!(sub_field, Field::Integration(_)) {
                    *sub_field = Field::cleared();
                    cleared += 1;
                }
            }
            cleared
        }
        Element::Other(Value::Object(attributes)) => clear_integration_attributes(attributes),
        Element::Other(_) => 0,
    }
}

fn clear_integration_attributes(attributes: &mut Map<String, Value>) -> usize {
    let mut cleared = 0;
    for value in attributes.values_mut() {
        if value.as_object().is_some_and(|object| object.contains_key("urn")) {
            *value = Value::Object(Map::new());
            cleared += 1;
        }
    }
    cleared
}

/// Visit the id of every non-broken document link in a record: link fields,
/// hyperlink spans of rich text nodes, and both of those inside group items.
/// Group items are entered one level only.
fn for_each_document_link<E>(
    record: &mut FieldMap,
    visit: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    for field in record.values_mut() {
        match field {
            Field::Link(link) => visit_link(link, visit)?,
            Field::Sequence(elements) => {
                for element in elements {
                    match element {
                        Element::Node(node) => visit_node_spans(node, visit)?,
                        Element::Item(item) => visit_group_item(item, visit)?,
                        Element::Other(_) => {}
                    }
                }
            }
            Field::Scalar(_) | Field::Integration(_) | Field::SliceZone(_) => {}
        }
    }
    Ok(())
}

fn visit_group_item<E>(
    item: &mut FieldMap,
    visit: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    for sub_field in item.values_mut() {
        match sub_field {
            Field::Link(link) => visit_link(link, visit)?,
            Field::Sequence(elements) => {
                for element in elements {
                    if let Element::Node(node) = element {
                        visit_node_spans(node, visit)?;
                    }
                }
            }
            Field::Scalar(_) | Field::Integration(_) | Field::SliceZone(_) => {}
        }
    }
    Ok(())
}

fn visit_link<E>(
    link: &mut LinkField,
    visit: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    if link.is_broken {
        return Ok(());
    }
    visit(&mut link.id)
}

fn visit_node_spans<E>(
    node: &mut RichTextNode,
    visit: &mut impl FnMut(&mut String) -> Result<(), E>,
) -> Result<(), E> {
    let Some(spans) = node.spans.as_mut() else {
        return Ok(());
    };
    for span in spans {
        if let Span::DocumentLink { data, .. } = span {
            visit_link(data, visit)?;
        }
    }
    Ok(())
}
