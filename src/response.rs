//! Response record built by an action: payload, relations, links, errors.

use crate::sdk::{parse_status, Related, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Data {
    Entity(Row),
    Collection(Vec<Row>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub pk: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub fk: Related,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub message: String,
    pub code: i64,
    pub status: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Data>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<Relation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<TransportError>,
}

impl Transport {
    pub fn entity(&self) -> Option<&Row> {
        match &self.data {
            Some(Data::Entity(row)) => Some(row),
            _ => None,
        }
    }

    pub fn collection(&self) -> Option<&[Row]> {
        match &self.data {
            Some(Data::Collection(rows)) => Some(rows),
            _ => None,
        }
    }

    pub fn push_error(&mut self, message: &str, code: i64, status: &str) {
        self.errors.push(TransportError {
            message: message.to_string(),
            code,
            status: status.to_string(),
        });
    }

    /// HTTP status implied by the first recorded error; 200 when there is none.
    pub fn status_code(&self) -> u16 {
        match self.errors.first() {
            Some(e) => parse_status(&e.status).unwrap_or(500),
            None => 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_transport_serializes_to_empty_object() {
        assert_eq!(serde_json::to_value(Transport::default()).unwrap(), json!({}));
    }

    #[test]
    fn status_follows_first_error() {
        let mut t = Transport::default();
        assert_eq!(t.status_code(), 200);
        t.push_error("missing", 0, "404 Not Found");
        t.push_error("later", 0, "500 Internal Server Error");
        assert_eq!(t.status_code(), 404);
    }

    #[test]
    fn entity_and_relations_serialize() {
        let mut row = Row::new();
        row.insert("id".into(), json!(1));
        let t = Transport {
            data: Some(Data::Entity(row)),
            relations: vec![Relation {
                pk: "1".into(),
                kind: "posts".into(),
                fk: Related::Many(vec!["7".into(), "8".into()]),
            }],
            ..Transport::default()
        };
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            json!({"data": {"id": 1}, "relations": [{"pk": "1", "type": "posts", "fk": ["7", "8"]}]})
        );
    }
}
