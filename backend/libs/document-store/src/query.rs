//! Filtered, ordered reads over a single collection

use crate::{Collection, Document};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field is an array that contains `value`
    ArrayContains { field: String, value: Value },
    /// Field equals `value`
    Equals { field: String, value: Value },
}

impl Filter {
    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::ArrayContains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::ArrayContains { field, value } => doc
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.contains(value))
                .unwrap_or(false),
            Filter::Equals { field, value } => doc.get(field) == Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filter: Option<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Every document in the collection, in id order
    pub fn collection(collection: Collection) -> Self {
        Self {
            collection,
            filter: None,
            order_by: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    /// Filter and sort `docs` in place.
    ///
    /// Documents lacking the order-by field are excluded from ordered
    /// results. Ties keep id order.
    pub fn run(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some(filter) = &self.filter {
            docs.retain(|doc| filter.matches(doc));
        }

        docs.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(order) = &self.order_by {
            docs.retain(|doc| doc.get(&order.field).is_some_and(|v| !v.is_null()));
            docs.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.field), b.get(&order.field));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        docs
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        match fields {
            Value::Object(map) => Document::new(id, map),
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_array_contains_filter() {
        let docs = vec![
            doc("a_b", json!({"users": ["a", "b"]})),
            doc("b_c", json!({"users": ["b", "c"]})),
            doc("x", json!({"users": "a"})),
        ];

        let query = Query::collection(Collection::Connections)
            .filter(Filter::array_contains("users", "a"));
        let ids: Vec<_> = query.run(docs).into_iter().map(|d| d.id).collect();

        assert_eq!(ids, vec!["a_b"]);
    }

    #[test]
    fn test_order_by_descending_excludes_missing() {
        let docs = vec![
            doc("p1", json!({"createdAt": "2024-01-01T00:00:00.000Z"})),
            doc("p2", json!({"createdAt": "2024-03-01T00:00:00.000Z"})),
            doc("p3", json!({})),
            doc("p4", json!({"createdAt": "2024-02-01T00:00:00.000Z"})),
        ];

        let query = Query::collection(Collection::Posts).order_by("createdAt", true);
        let ids: Vec<_> = query.run(docs).into_iter().map(|d| d.id).collect();

        assert_eq!(ids, vec!["p2", "p4", "p1"]);
    }

    #[test]
    fn test_equals_filter() {
        let docs = vec![
            doc("p1", json!({"authorId": "u1"})),
            doc("p2", json!({"authorId": "u2"})),
        ];

        let query = Query::collection(Collection::Posts).filter(Filter::equals("authorId", "u2"));
        let result = query.run(docs);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "p2");
    }
}
