use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;

use crate::config::CweCatalog;

/// One element of the dataset array. Anything that isn't an object is kept
/// only as a marker so it can be counted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    Record(MegaVulRecord),
    Malformed(IgnoredAny),
}

/// One entry of the MegaVul "simple" JSON export.
///
/// Only the fields the importer reads are kept; every other field is skipped
/// while parsing. Fields stay untyped because the export is not consistent
/// about their types.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MegaVulRecord {
    pub cve_id: Option<Value>,
    pub cwe_ids: Option<Value>,
    pub is_vul: Option<Value>,
    pub func_before: Option<Value>,
    pub func: Option<Value>,
    pub commit_hash: Option<Value>,
    pub git_url: Option<Value>,
}

/// A record that passed every filter and is eligible for import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub cwe_id: String,
    pub cve_id: String,
    pub vulnerable_code: String,
    pub fixed_code: String,
    pub commit_hash: String,
    pub git_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingCve,
    DisallowedCwe,
    Incomplete,
}

fn into_text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => Some(text),
        _ => None,
    }
}

fn non_empty_text(value: Option<Value>) -> Option<String> {
    into_text(value).filter(|text| !text.is_empty())
}

/// JSON truthiness: `false`, `0`, `""`, `[]`, `{}` and `null` are all false.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}

impl MegaVulRecord {
    /// First listed CWE id, trimmed. Non-string ids are rendered as JSON (`125` → `"125"`).
    pub fn primary_cwe(&self) -> Option<String> {
        let Some(Value::Array(ids)) = &self.cwe_ids else {
            return None;
        };

        ids.first().map(|id| match id {
            Value::String(text) => text.trim().to_string(),
            other => other.to_string(),
        })
    }

    /// Checks the record against the import filters, in order:
    /// a CVE id, an allow-listed primary CWE, the vulnerable flag, and both code bodies.
    pub fn admit(self, catalog: &CweCatalog) -> Result<Candidate, Rejection> {
        let cve_id = self
            .cve_id
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|cve| !cve.is_empty())
            .map(String::from)
            .ok_or(Rejection::MissingCve)?;

        let cwe_id = self
            .primary_cwe()
            .filter(|cwe| catalog.contains(cwe))
            .ok_or(Rejection::DisallowedCwe)?;

        if !is_truthy(self.is_vul.as_ref()) {
            return Err(Rejection::Incomplete);
        }
        let (Some(vulnerable_code), Some(fixed_code)) =
            (non_empty_text(self.func_before), non_empty_text(self.func))
        else {
            return Err(Rejection::Incomplete);
        };

        Ok(Candidate {
            cwe_id,
            cve_id,
            vulnerable_code,
            fixed_code,
            commit_hash: into_text(self.commit_hash).unwrap_or_default(),
            git_url: into_text(self.git_url).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn parse(entry: Value) -> MegaVulRecord {
        match serde_json::from_value(entry).unwrap() {
            DatasetEntry::Record(record) => record,
            DatasetEntry::Malformed(_) => panic!("expected a record"),
        }
    }

    fn complete(cve: Value, cwe_ids: Value) -> MegaVulRecord {
        parse(json!({
            "cve_id": cve,
            "cwe_ids": cwe_ids,
            "is_vul": true,
            "func_before": "void f() { gets(buf); }",
            "func": "void f() { fgets(buf, n, stdin); }",
            "commit_hash": "abc123",
            "func_graph_path_before": "ignored",
        }))
    }

    #[test]
    fn admits_complete_record() {
        let candidate = complete(json!(" CVE-2021-1234 "), json!([" CWE-125 ", "CWE-20"]))
            .admit(&CweCatalog::default())
            .unwrap();

        assert_eq!(candidate.cve_id, "CVE-2021-1234");
        assert_eq!(candidate.cwe_id, "CWE-125");
        assert_eq!(candidate.commit_hash, "abc123");
        assert_eq!(candidate.git_url, "");
    }

    #[rstest]
    #[case(json!(null), json!(["CWE-125"]), Rejection::MissingCve)]
    #[case(json!("   "), json!(["CWE-125"]), Rejection::MissingCve)]
    #[case(json!(2021), json!(["CWE-125"]), Rejection::MissingCve)]
    #[case(json!("CVE-1"), json!(["CWE-79"]), Rejection::DisallowedCwe)]
    #[case(json!("CVE-1"), json!([]), Rejection::DisallowedCwe)]
    #[case(json!("CVE-1"), json!(null), Rejection::DisallowedCwe)]
    #[case(json!("CVE-1"), json!("CWE-125"), Rejection::DisallowedCwe)]
    #[case(json!("CVE-1"), json!([125]), Rejection::DisallowedCwe)]
    fn rejects_by_identifier(#[case] cve: Value, #[case] cwe_ids: Value, #[case] expected: Rejection) {
        assert_eq!(complete(cve, cwe_ids).admit(&CweCatalog::default()), Err(expected));
    }

    #[test]
    fn numeric_cwe_is_stringified() {
        let record = complete(json!("CVE-1"), json!([125, "CWE-20"]));
        assert_eq!(record.primary_cwe().as_deref(), Some("125"));

        let catalog = CweCatalog::new([("125", "Numeric id")]);
        assert_eq!(record.admit(&catalog).unwrap().cwe_id, "125");
    }

    #[test]
    fn missing_cve_wins_over_allowed_cwe() {
        let rejected = complete(json!(null), json!(["CWE-121"])).admit(&CweCatalog::default());
        assert_eq!(rejected, Err(Rejection::MissingCve));
    }

    #[rstest]
    #[case(json!({ "is_vul": false }))]
    #[case(json!({ "is_vul": 0 }))]
    #[case(json!({ "is_vul": null }))]
    #[case(json!({ "func": "" }))]
    #[case(json!({ "func_before": null }))]
    #[case(json!({ "func": 42 }))]
    fn rejects_non_vulnerable_or_empty_code(#[case] overrides: Value) {
        let mut entry = json!({
            "cve_id": "CVE-1",
            "cwe_ids": ["CWE-125"],
            "is_vul": true,
            "func_before": "a",
            "func": "b",
        });
        for (key, value) in overrides.as_object().unwrap() {
            entry[key] = value.clone();
        }

        assert_eq!(parse(entry).admit(&CweCatalog::default()), Err(Rejection::Incomplete));
    }

    #[test]
    fn truthy_vulnerable_flag_is_accepted() {
        let mut record = complete(json!("CVE-1"), json!(["CWE-125"]));
        record.is_vul = Some(json!(1));
        assert!(record.admit(&CweCatalog::default()).is_ok());
    }

    #[rstest]
    #[case(json!("not an object"))]
    #[case(json!(17))]
    #[case(json!(null))]
    fn non_objects_are_malformed(#[case] entry: Value) {
        let parsed: DatasetEntry = serde_json::from_value(entry).unwrap();
        assert!(matches!(parsed, DatasetEntry::Malformed(_)));
    }
}
