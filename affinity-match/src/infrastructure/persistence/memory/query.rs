//! 集合查询：过滤 + 排序 + 取最后 N 条
//!
//! 只匹配集合的直接子文档，不会穿透到子集合。

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::backend::StoredDocument;
use crate::infrastructure::persistence::paths::split_document_path;

#[derive(Clone, Debug, PartialEq)]
pub enum FieldFilter {
    /// 数组字段包含指定值
    ArrayContains { field: String, value: Value },
}

impl FieldFilter {
    fn matches(&self, data: &Value) -> bool {
        match self {
            FieldFilter::ArrayContains { field, value } => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollectionQuery {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<(String, Direction)>,
    pub limit_to_last: Option<usize>,
}

impl CollectionQuery {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit_to_last: None,
        }
    }

    pub fn where_array_contains(
        mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(FieldFilter::ArrayContains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit_to_last(mut self, limit: usize) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    /// 文档是否属于本查询的集合（直接子文档）
    pub fn covers_path(&self, path: &str) -> bool {
        split_document_path(path).is_some_and(|(parent, _)| parent == self.collection)
    }

    /// 数组包含过滤条件中要求的值（用于访问规则校验）
    pub fn array_contains_value(&self, field: &str) -> Option<&Value> {
        self.filters.iter().find_map(|filter| match filter {
            FieldFilter::ArrayContains { field: f, value } if f == field => Some(value),
            _ => None,
        })
    }

    pub fn run(&self, documents: &BTreeMap<String, StoredDocument>) -> Vec<StoredDocument> {
        let prefix = format!("{}/", self.collection);
        let mut matched: Vec<StoredDocument> = documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .filter(|(_, doc)| self.filters.iter().all(|f| f.matches(&doc.data)))
            .map(|(_, doc)| doc.clone())
            .collect();

        if let Some((field, direction)) = &self.order_by {
            matched.sort_by(|a, b| {
                let ordering = compare_fields(a.data.get(field), b.data.get(field));
                let ordering = match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                ordering.then_with(|| a.path.cmp(&b.path))
            });
        }

        if let Some(limit) = self.limit_to_last {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }
}

/// 缺失字段排在最前；时间字符串按时间比较
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                x.parse::<DateTime<Utc>>().ok(),
                y.parse::<DateTime<Utc>>().ok(),
            ) {
                (Some(tx), Some(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(path: &str, data: Value) -> (String, StoredDocument) {
        let now = Utc::now();
        (
            path.to_string(),
            StoredDocument {
                path: path.to_string(),
                data,
                create_time: now,
                update_time: now,
            },
        )
    }

    fn tree() -> BTreeMap<String, StoredDocument> {
        BTreeMap::from([
            doc(
                "chats/a",
                json!({ "participants": ["u1", "u2"], "last_message_at": "2024-01-01T00:00:02Z" }),
            ),
            doc(
                "chats/b",
                json!({ "participants": ["u1", "u3"], "last_message_at": "2024-01-01T00:00:01Z" }),
            ),
            doc(
                "chats/c",
                json!({ "participants": ["u2", "u3"], "last_message_at": "2024-01-01T00:00:03Z" }),
            ),
            doc("chats/a/messages/m1", json!({ "sender_id": "u1" })),
            doc("chatsx/z", json!({ "participants": ["u1"] })),
        ])
    }

    #[test]
    fn test_only_direct_children_are_matched() {
        let docs = CollectionQuery::collection("chats").run(&tree());
        let paths: Vec<_> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["chats/a", "chats/b", "chats/c"]);
    }

    #[test]
    fn test_array_contains_and_order() {
        let docs = CollectionQuery::collection("chats")
            .where_array_contains("participants", "u1")
            .order_by("last_message_at", Direction::Descending)
            .run(&tree());
        let paths: Vec<_> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["chats/a", "chats/b"]);
    }

    #[test]
    fn test_limit_to_last_keeps_tail() {
        let docs = CollectionQuery::collection("chats")
            .order_by("last_message_at", Direction::Ascending)
            .limit_to_last(2)
            .run(&tree());
        let paths: Vec<_> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["chats/a", "chats/c"]);
    }

    #[test]
    fn test_covers_path() {
        let query = CollectionQuery::collection("chats/a/messages");
        assert!(query.covers_path("chats/a/messages/m1"));
        assert!(!query.covers_path("chats/a"));
        assert!(!query.covers_path("chats/b/messages/m1"));
    }
}
