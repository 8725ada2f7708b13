use std::collections::BTreeMap;
use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document-level keys whose value may be a slice zone.
pub const SLICE_ZONE_KEYS: [&str; 2] = ["slices", "body"];

/// A content record as returned by the content API and sent back to the
/// migration API. Attributes the tool does not touch are carried through
/// `attributes` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub lang: String,
    #[serde(default)]
    pub data: DocumentData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_language_id: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Document {
    /// Short label used in progress lines and error messages.
    pub fn label(&self) -> String {
        format!(
            "type={} uid={}",
            self.doc_type,
            self.uid.as_deref().unwrap_or("<none>")
        )
    }
}

/// The `data` tree of a document. Unlike nested records, the document level
/// may hold slice zones under [`SLICE_ZONE_KEYS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct DocumentData {
    pub fields: FieldMap,
}

impl From<Map<String, Value>> for DocumentData {
    fn from(record: Map<String, Value>) -> Self {
        let mut fields = BTreeMap::new();
        for (name, value) in record {
            let field = if SLICE_ZONE_KEYS.contains(&name.as_str()) {
                Field::classify_slice_zone(value)
            } else {
                Field::classify(value)
            };
            fields.insert(name, field);
        }
        Self {
            fields: FieldMap { fields },
        }
    }
}

impl From<DocumentData> for Map<String, Value> {
    fn from(data: DocumentData) -> Self {
        data.fields.into_record()
    }
}

impl DocumentData {
    pub fn for_each_record(&mut self, mut visit: impl FnMut(&mut FieldMap)) {
        let Ok(()) = self.try_for_each_record(|record| {
            visit(record);
            Ok::<(), Infallible>(())
        });
    }

    /// Visit every record the rewrite passes cover: the data root, then the
    /// `primary` and each `items` element of every slice, `slices` before
    /// `body`. Stops at the first error.
    pub fn try_for_each_record<E>(
        &mut self,
        mut visit: impl FnMut(&mut FieldMap) -> Result<(), E>,
    ) -> Result<(), E> {
        visit(&mut self.fields)?;
        for key in SLICE_ZONE_KEYS {
            let Some(Field::SliceZone(slices)) = self.fields.get_mut(key) else {
                continue;
            };
            for slice in slices {
                if let Some(primary) = slice.primary.as_mut() {
                    visit(primary)?;
                }
                if let Some(items) = slice.items.as_mut() {
                    for item in items {
                        visit(item)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: BTreeMap<String, Field>,
}

impl FieldMap {
    pub fn from_record(record: Map<String, Value>) -> Self {
        Self {
            fields: record
                .into_iter()
                .map(|(name, value)| (name, Field::classify(value)))
                .collect(),
        }
    }

    pub fn into_record(self) -> Map<String, Value> {
        self.fields
            .into_iter()
            .map(|(name, field)| (name, field.into_value()))
            .collect()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Field> {
        self.fields.values_mut()
    }
}

/// Closed set of field shapes the rewrite passes distinguish.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Anything the passes leave alone, including cleared `{}` objects.
    Scalar(Value),
    Link(LinkField),
    /// An external catalog reference, recognized by its `urn` key.
    Integration(Map<String, Value>),
    /// Any array. Elements are classified one by one, so rich text blocks
    /// and group items may share an array.
    Sequence(Vec<Element>),
    SliceZone(Vec<Slice>),
}

impl Field {
    pub fn cleared() -> Self {
        Self::Scalar(Value::Object(Map::new()))
    }

    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(object) => {
                if object.contains_key("urn") {
                    return Self::Integration(object);
                }
                match LinkField::from_object(object) {
                    Ok(link) => Self::Link(link),
                    Err(object) => Self::Scalar(Value::Object(object)),
                }
            }
            Value::Array(elements) => {
                Self::Sequence(elements.into_iter().map(Element::classify).collect())
            }
            other => Self::Scalar(other),
        }
    }

    fn classify_slice_zone(value: Value) -> Self {
        match value {
            Value::Array(elements)
                if !elements.is_empty()
                    && elements.iter().all(|element| {
                        element
                            .as_object()
                            .is_some_and(|object| object.contains_key("slice_type"))
                    }) =>
            {
                Self::SliceZone(elements.into_iter().filter_map(Slice::from_value).collect())
            }
            other => Self::classify(other),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Scalar(value) => value,
            Self::Link(link) => Value::Object(link.into_object()),
            Self::Integration(object) => Value::Object(object),
            Self::Sequence(elements) => {
                Value::Array(elements.into_iter().map(Element::into_value).collect())
            }
            Self::SliceZone(slices) => {
                Value::Array(slices.into_iter().map(Slice::into_value).collect())
            }
        }
    }
}

/// One element of a [`Field::Sequence`].
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// An object with a `type` key: a rich text block.
    Node(RichTextNode),
    /// An object with neither `type` nor `slice_type`: a group item.
    Item(FieldMap),
    Other(Value),
}

impl Element {
    fn classify(value: Value) -> Self {
        match value {
            Value::Object(object) if object.contains_key("type") => {
                Self::Node(RichTextNode::from_object(object))
            }
            Value::Object(object) if !object.contains_key("slice_type") => {
                Self::Item(FieldMap::from_record(object))
            }
            other => Self::Other(other),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Node(node) => node.into_value(),
            Self::Item(item) => Value::Object(item.into_record()),
            Self::Other(value) => value,
        }
    }
}

/// An object with a string `id` and a boolean `isBroken`. Both document
/// link fields and the `data` of rich text hyperlink spans take this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkField {
    pub id: String,
    pub is_broken: bool,
    pub attributes: Map<String, Value>,
}

impl LinkField {
    /// Returns the object back unchanged when it is not link-shaped.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self, Map<String, Value>> {
        let is_link = matches!(object.get("id"), Some(Value::String(_)))
            && matches!(object.get("isBroken"), Some(Value::Bool(_)));
        if !is_link {
            return Err(object);
        }
        let id = match object.remove("id") {
            Some(Value::String(id)) => id,
            _ => String::new(),
        };
        let is_broken = object
            .remove("isBroken")
            .and_then(|value| value.as_bool())
            .unwrap_or(true);
        Ok(Self {
            id,
            is_broken,
            attributes: object,
        })
    }

    pub fn into_object(self) -> Map<String, Value> {
        let mut object = self.attributes;
        object.insert("id".to_string(), Value::String(self.id));
        object.insert("isBroken".to_string(), Value::Bool(self.is_broken));
        object
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RichTextNode {
    /// Present only when the node carried a `spans` array.
    pub spans: Option<Vec<Span>>,
    /// Every other node attribute, `type` and `text` included.
    pub attributes: Map<String, Value>,
}

impl RichTextNode {
    fn from_object(mut attributes: Map<String, Value>) -> Self {
        let spans = match attributes.remove("spans") {
            Some(Value::Array(spans)) => Some(spans.into_iter().map(Span::classify).collect()),
            Some(other) => {
                attributes.insert("spans".to_string(), other);
                None
            }
            None => None,
        };
        Self { spans, attributes }
    }

    fn into_value(self) -> Value {
        let mut object = self.attributes;
        if let Some(spans) = self.spans {
            object.insert(
                "spans".to_string(),
                Value::Array(spans.into_iter().map(Span::into_value).collect()),
            );
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Span {
    /// A `hyperlink` span whose `data` targets a document of this store.
    DocumentLink {
        data: LinkField,
        attributes: Map<String, Value>,
    },
    Other(Value),
}

impl Span {
    fn classify(value: Value) -> Self {
        let Value::Object(mut attributes) = value else {
            return Self::Other(value);
        };
        let is_document_hyperlink = attributes.get("type").and_then(Value::as_str)
            == Some("hyperlink")
            && attributes
                .get("data")
                .and_then(|data| data.get("link_type"))
                .and_then(Value::as_str)
                == Some("Document");
        if !is_document_hyperlink {
            return Self::Other(Value::Object(attributes));
        }
        let Some(Value::Object(data)) = attributes.remove("data") else {
            return Self::Other(Value::Object(attributes));
        };
        match LinkField::from_object(data) {
            Ok(data) => Self::DocumentLink { data, attributes },
            Err(data) => {
                attributes.insert("data".to_string(), Value::Object(data));
                Self::Other(Value::Object(attributes))
            }
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::DocumentLink {
                data,
                mut attributes,
            } => {
                attributes.insert("data".to_string(), Value::Object(data.into_object()));
                Value::Object(attributes)
            }
            Self::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub primary: Option<FieldMap>,
    pub items: Option<Vec<FieldMap>>,
    /// `slice_type`, `variation`, `id` and anything else on the slice.
    pub attributes: Map<String, Value>,
}

impl Slice {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut attributes) = value else {
            return None;
        };
        let primary = match attributes.remove("primary") {
            Some(Value::Object(primary)) => Some(FieldMap::from_record(primary)),
            Some(other) => {
                attributes.insert("primary".to_string(), other);
                None
            }
            None => None,
        };
        let items = match attributes.remove("items") {
            Some(Value::Array(items)) if items.iter().all(Value::is_object) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(item) => Some(FieldMap::from_record(item)),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(other) => {
                attributes.insert("items".to_string(), other);
                None
            }
            None => None,
        };
        Some(Self {
            primary,
            items,
            attributes,
        })
    }

    fn into_value(self) -> Value {
        let mut object = self.attributes;
        if let Some(primary) = self.primary {
            object.insert("primary".to_string(), Value::Object(primary.into_record()));
        }
        if let Some(items) = self.items {
            object.insert(
                "items".to_string(),
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| Value::Object(item.into_record()))
                        .collect(),
                ),
            );
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Document, Element, Field, Span};

    fn document(data: serde_json::Value) -> Document {
        serde_json::from_value(json!({
            "id": "A1",
            "uid": "home",
            "type": "page",
            "lang": "en-us",
            "tags": ["landing"],
            "href": "https://example.cdn.prismic.io/api/v2/documents/search?ref=X",
            "data": data,
        }))
        .expect("parse document")
    }

    #[test]
    fn classifies_field_shapes_once_at_parse_time() {
        let document = document(json!({
            "heading": "Hello",
            "related": {"id": "B1", "isBroken": false, "link_type": "Document", "type": "page"},
            "media": {"link_type": "Media", "url": "https://images.example/x.png"},
            "product": {"urn": "catalog:1", "id": "sku-1"},
            "text": [{"type": "paragraph", "text": "hi", "spans": []}],
            "cards": [{"label": "one"}],
            "body": [{"slice_type": "hero", "primary": {}, "items": []}],
            "empty": [],
        }));
        let fields = &document.data.fields.fields;

        assert!(matches!(fields.get("heading"), Some(Field::Scalar(_))));
        assert!(matches!(fields.get("related"), Some(Field::Link(link)) if link.id == "B1"));
        assert!(matches!(fields.get("media"), Some(Field::Scalar(_))));
        assert!(matches!(fields.get("product"), Some(Field::Integration(_))));
        assert!(matches!(
            fields.get("text"),
            Some(Field::Sequence(elements)) if matches!(elements.as_slice(), [Element::Node(_)])
        ));
        assert!(matches!(
            fields.get("cards"),
            Some(Field::Sequence(elements)) if matches!(elements.as_slice(), [Element::Item(_)])
        ));
        assert!(matches!(fields.get("body"), Some(Field::SliceZone(slices)) if slices.len() == 1));
        assert!(matches!(fields.get("empty"), Some(Field::Sequence(elements)) if elements.is_empty()));
    }

    #[test]
    fn mixed_arrays_are_classified_per_element() {
        let document = document(json!({
            "mixed": [
                {"type": "embed", "product": {"urn": "catalog:1"}},
                {"product": {"urn": "catalog:2"}, "label": "card"},
                {"slice_type": "stray"},
                "plain",
            ],
        }));
        let Some(Field::Sequence(elements)) = document.data.fields.fields.get("mixed") else {
            panic!("expected a sequence");
        };
        assert!(matches!(&elements[0], Element::Node(node) if node.spans.is_none()));
        let Element::Item(item) = &elements[1] else {
            panic!("expected a group item");
        };
        assert!(matches!(item.fields.get("product"), Some(Field::Integration(_))));
        assert!(matches!(item.fields.get("label"), Some(Field::Scalar(_))));
        assert!(matches!(&elements[2], Element::Other(_)));
        assert!(matches!(&elements[3], Element::Other(_)));
    }

    #[test]
    fn slice_zone_is_only_recognized_at_document_level_keys() {
        let document = document(json!({
            "body": [{"title": "a group named body"}],
            "other": [{"slice_type": "hero", "primary": {}}],
        }));
        let fields = &document.data.fields.fields;
        assert!(matches!(
            fields.get("body"),
            Some(Field::Sequence(elements)) if matches!(elements.as_slice(), [Element::Item(_)])
        ));
        assert!(matches!(
            fields.get("other"),
            Some(Field::Sequence(elements)) if matches!(elements.as_slice(), [Element::Other(_)])
        ));
    }

    #[test]
    fn rich_text_hyperlink_spans_to_documents_are_recognized() {
        let document = document(json!({
            "text": [{
                "type": "paragraph",
                "text": "see other page",
                "spans": [
                    {"start": 0, "end": 3, "type": "strong"},
                    {"start": 4, "end": 9, "type": "hyperlink",
                     "data": {"id": "B1", "isBroken": false, "link_type": "Document"}},
                    {"start": 10, "end": 14, "type": "hyperlink",
                     "data": {"link_type": "Web", "url": "https://example.org"}},
                ],
            }],
        }));
        let Some(Field::Sequence(elements)) = document.data.fields.fields.get("text") else {
            panic!("expected a sequence");
        };
        let Element::Node(node) = &elements[0] else {
            panic!("expected a rich text node");
        };
        let spans = node.spans.as_ref().expect("spans");
        assert!(matches!(&spans[0], Span::Other(_)));
        assert!(matches!(&spans[1], Span::DocumentLink { data, .. } if data.id == "B1"));
        assert!(matches!(&spans[2], Span::Other(_)));
        assert_eq!(node.attributes["type"], "paragraph");
    }

    #[test]
    fn serializing_preserves_untouched_attributes() {
        let source = json!({
            "id": "A1",
            "uid": null,
            "type": "page",
            "lang": "en-us",
            "tags": ["landing"],
            "first_publication_date": "2024-01-01T00:00:00+0000",
            "data": {
                "related": {"id": "B1", "isBroken": false, "link_type": "Document"},
                "text": [{"type": "heading1", "text": "Hi", "spans": [
                    {"start": 0, "end": 2, "type": "hyperlink",
                     "data": {"id": "B1", "isBroken": true, "link_type": "Document"}}
                ]}],
                "slices": [{"slice_type": "cta", "variation": "default",
                            "primary": {"label": "Go"}, "items": [{"n": 1}]}],
            },
        });
        let parsed: Document = serde_json::from_value(source.clone()).expect("parse");
        let rendered = serde_json::to_value(&parsed).expect("render");
        assert_eq!(rendered, source);
    }

    #[test]
    fn label_falls_back_when_uid_is_missing() {
        let mut document = document(json!({}));
        assert_eq!(document.label(), "type=page uid=home");
        document.uid = None;
        assert_eq!(document.label(), "type=page uid=<none>");
    }
}
