//! Plain-data round trip for queries.
//!
//! Queries and tuples convert to and from `serde_json::Value` so they can
//! cross process boundaries owned by excluded components. The forms are
//! self-describing via a `t` discriminant.

use serde_json::{json, Map, Value as Json};

use crate::error::Error;
use crate::query::{Query, QueryTag, QueryTuple};
use crate::value::{Item, TaggedValue};

impl Query {
    /// Convert to plain data: `{"t":"queryPlain", "isTransform":…, "steps":[…]}`.
    pub fn to_plain_data(&self) -> Result<Json, Error> {
        let steps = self
            .steps()
            .iter()
            .map(|s| s.to_plain_data())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "t": "queryPlain",
            "isTransform": self.is_transform(),
            "steps": steps,
        }))
    }

    /// Rebuild from plain data.
    pub fn from_plain_data(data: &Json) -> Result<Query, Error> {
        let obj = expect_tagged_object(data, "queryPlain")?;
        let steps = obj
            .get("steps")
            .and_then(Json::as_array)
            .ok_or_else(|| Error::Serialization("queryPlain missing steps".to_string()))?
            .iter()
            .map(QueryTuple::from_plain_data)
            .collect::<Result<Vec<_>, _>>()?;

        let query = Query::new(steps);
        if obj.get("isTransform").and_then(Json::as_bool).unwrap_or(false) {
            Ok(query.transform())
        } else {
            Ok(query)
        }
    }
}

impl QueryTuple {
    /// Convert to plain data: `{"t":"queryTuplePlain", "tags":[…]}`.
    pub fn to_plain_data(&self) -> Result<Json, Error> {
        let tags = self
            .tags()
            .iter()
            .map(tag_to_plain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "t": "queryTuplePlain",
            "tags": tags,
        }))
    }

    /// Rebuild from plain data.
    pub fn from_plain_data(data: &Json) -> Result<QueryTuple, Error> {
        let obj = expect_tagged_object(data, "queryTuplePlain")?;
        let tags = obj
            .get("tags")
            .and_then(Json::as_array)
            .ok_or_else(|| Error::Serialization("queryTuplePlain missing tags".to_string()))?
            .iter()
            .map(tag_from_plain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryTuple::from_tags(tags))
    }
}

fn expect_tagged_object<'a>(data: &'a Json, t: &str) -> Result<&'a Map<String, Json>, Error> {
    let obj = data
        .as_object()
        .ok_or_else(|| Error::Serialization(format!("expected a {t} object")))?;
    match obj.get("t").and_then(Json::as_str) {
        Some(found) if found == t => Ok(obj),
        other => Err(Error::Serialization(format!(
            "expected t={t}, got {other:?}"
        ))),
    }
}

fn tag_to_plain(tag: &QueryTag) -> Result<Json, Error> {
    let mut out = Map::new();
    out.insert("attr".to_string(), Json::String(tag.attr.clone()));
    out.insert("value".to_string(), tagged_value_to_plain(&tag.value)?);
    if let Some(identifier) = &tag.identifier {
        out.insert("identifier".to_string(), Json::String(identifier.clone()));
    }
    if tag.is_optional {
        out.insert("isOptional".to_string(), Json::Bool(true));
    }
    Ok(Json::Object(out))
}

fn tag_from_plain(data: &Json) -> Result<QueryTag, Error> {
    let obj = data
        .as_object()
        .ok_or_else(|| Error::Serialization("expected a tag object".to_string()))?;
    let attr = obj
        .get("attr")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::Serialization("tag missing attr".to_string()))?;
    let value = match obj.get("value") {
        Some(v) => tagged_value_from_plain(v)?,
        None => TaggedValue::NoValue,
    };
    Ok(QueryTag {
        attr: attr.to_string(),
        value,
        identifier: obj
            .get("identifier")
            .and_then(Json::as_str)
            .map(str::to_string),
        is_optional: obj.get("isOptional").and_then(Json::as_bool).unwrap_or(false),
    })
}

fn tagged_value_to_plain(value: &TaggedValue) -> Result<Json, Error> {
    Ok(match value {
        TaggedValue::NoValue => json!({"t": "no_value"}),
        TaggedValue::Abstract => json!({"t": "abstract"}),
        TaggedValue::String(s) => json!({"t": "str_value", "str": s}),
        TaggedValue::Bool(b) => json!({"t": "bool_value", "val": b}),
        TaggedValue::Object(v) => json!({"t": "obj_value", "val": v}),
        TaggedValue::Item(item) => json!({"t": "item", "item": item.to_json()?}),
        TaggedValue::Tuple(t) => t.to_plain_data()?,
        TaggedValue::Query(q) => q.to_plain_data()?,
    })
}

fn tagged_value_from_plain(data: &Json) -> Result<TaggedValue, Error> {
    let obj = data
        .as_object()
        .ok_or_else(|| Error::Serialization("expected a tagged value object".to_string()))?;
    let t = obj
        .get("t")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::Serialization("tagged value missing t".to_string()))?;

    match t {
        "no_value" => Ok(TaggedValue::NoValue),
        "abstract" => Ok(TaggedValue::Abstract),
        "str_value" => Ok(TaggedValue::String(
            obj.get("str")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string(),
        )),
        "bool_value" => Ok(TaggedValue::Bool(
            obj.get("val").and_then(Json::as_bool).unwrap_or(false),
        )),
        "obj_value" => Ok(TaggedValue::Object(
            obj.get("val").cloned().unwrap_or(Json::Null),
        )),
        "item" => Ok(TaggedValue::Item(Item::from_json(
            obj.get("item").cloned().unwrap_or(Json::Null),
        )?)),
        "queryTuplePlain" => Ok(TaggedValue::Tuple(QueryTuple::from_plain_data(data)?)),
        "queryPlain" => Ok(TaggedValue::Query(Query::from_plain_data(data)?)),
        other => Err(Error::Serialization(format!(
            "unknown tagged value t: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> Query {
        let nested = Query::new(vec![QueryTuple::new().with_attr("get").with_attr("user")]);
        Query::new(vec![
            QueryTuple::new()
                .with_attr("get")
                .with_attr("user")
                .with_value("id", "5")
                .with_value("active", true)
                .with_tag(
                    QueryTag::new("sub").with_value(TaggedValue::Query(nested)),
                ),
            QueryTuple::new().with_attr("just").with_attr("name"),
        ])
    }

    #[test]
    fn test_round_trip_preserves_query_string() {
        let q = sample_query();
        let plain = q.to_plain_data().unwrap();
        let back = Query::from_plain_data(&plain).unwrap();
        assert_eq!(back.to_query_string(), q.to_query_string());
        assert_eq!(back, q);
    }

    #[test]
    fn test_round_trip_transform_flag() {
        let q = Query::new(vec![QueryTuple::new().with_attr("just").with_attr("a")]).transform();
        let back = Query::from_plain_data(&q.to_plain_data().unwrap()).unwrap();
        assert!(back.is_transform());
    }

    #[test]
    fn test_round_trip_obj_and_no_value() {
        let q = Query::new(vec![QueryTuple::new()
            .with_attr("value")
            .with_tag(QueryTag::new("cfg").with_value(TaggedValue::Object(json!({"k": [1, 2]}))))
            .with_attr("flag")]);
        let back = Query::from_plain_data(&q.to_plain_data().unwrap()).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_bad_data_rejected() {
        assert!(Query::from_plain_data(&json!({"t": "other"})).is_err());
        assert!(Query::from_plain_data(&json!(42)).is_err());
    }
}
