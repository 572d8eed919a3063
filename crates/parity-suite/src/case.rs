use serde::{Deserialize, Deserializer, Serialize};

use crate::value::Value;

/// A suite file: an ordered list of cases plus generator metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tests: Vec<TestCase>,
}

/// One named scenario: setup steps followed by exactly one action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub collection: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub setup: Vec<SetupStep>,
    pub action: TestAction,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expected: Expected,
}

/// A fixture step run before the action. Recognized operations are
/// `insert` and `createIndex`; anything else is skipped by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupStep {
    pub operation: String,
    #[serde(default)]
    pub data: Value,
}

/// The action exactly as it appears in the suite file. The executor parses
/// it into a typed, per-method form before dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestAction {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// Assertions attached to a case.
///
/// Only `error` takes part in classification. The remaining fields are
/// advisory and are kept so results can be diffed externally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expected {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

impl Expected {
    /// The expected-error substring, if one was given and is non-empty.
    pub fn error_substring(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

// Suite generators emit `null` for empty lists and objects.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_setup_and_missing_expected_default() {
        let case: TestCase = serde_json::from_str(
            r#"{
                "name": "insert_one_basic",
                "category": "crud",
                "collection": "users",
                "setup": null,
                "action": { "method": "insertOne", "doc": { "name": "a" } }
            }"#,
        )
        .unwrap();

        assert!(case.setup.is_empty());
        assert_eq!(case.expected, Expected::default());
        assert_eq!(case.category.as_deref(), Some("crud"));
        assert_eq!(case.action.method, "insertOne");
        assert!(case.action.filter.is_none());
        assert_eq!(
            case.action.doc,
            Some(Value::Document(vec![("name".into(), Value::String("a".into()))]))
        );
    }

    #[test]
    fn null_action_fields_are_absent() {
        let action: TestAction =
            serde_json::from_str(r#"{"method": "find", "filter": null, "docs": null}"#).unwrap();
        assert!(action.filter.is_none());
        assert!(action.docs.is_none());
    }

    #[test]
    fn setup_step_keeps_arbitrary_payload() {
        let step: SetupStep = serde_json::from_str(
            r#"{"operation": "createIndex", "data": {"keys": {"a": 1, "b": -1}, "options": {"unique": true}}}"#,
        )
        .unwrap();
        assert_eq!(step.operation, "createIndex");
        let keys = step.data.get("keys").unwrap().to_document().unwrap();
        assert_eq!(keys.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn empty_expected_error_is_ignored() {
        let expected = Expected {
            error: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(expected.error_substring(), None);

        let expected = Expected {
            error: Some("duplicate key".into()),
            ..Default::default()
        };
        assert_eq!(expected.error_substring(), Some("duplicate key"));
    }
}
