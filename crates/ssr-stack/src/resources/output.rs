//! Stack outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Distribution;
use crate::error::{Result, StackError};
use crate::template::{join, Template};

/// Output carrying the public URL.
pub const URL_OUTPUT: &str = "URL";
/// Output carrying the bare distribution domain.
pub const DOMAIN_OUTPUT: &str = "DistributionDomainName";

/// Declare the stack outputs for a distribution.
pub fn declare_outputs(template: &mut Template, distribution: &Distribution) {
    template.add_output(
        URL_OUTPUT,
        "Public URL of the application",
        join(vec![json!("https://"), distribution.domain_name()]),
    );
    template.add_output(
        DOMAIN_OUTPUT,
        "Distribution domain name",
        distribution.domain_name(),
    );
}

/// Format the public URL for a distribution domain.
pub fn distribution_url(domain: &str) -> Result<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(StackError::Output("distribution domain name is empty".to_string()));
    }
    if domain.contains("://") || domain.contains('/') {
        return Err(StackError::Output(format!(
            "'{}' is not a bare domain name",
            domain
        )));
    }
    Ok(format!("https://{}", domain))
}

/// Output values reported by the provisioning engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackOutputs(BTreeMap<String, String>);

impl StackOutputs {
    /// Empty outputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// All values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no outputs were reported.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse engine output.
    ///
    /// Accepts either a list of `{"OutputKey", "OutputValue"}` entries or a
    /// flat object of strings.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut outputs = Self::new();
        match value {
            Value::Array(entries) => {
                for entry in entries {
                    let key = entry.get("OutputKey").and_then(Value::as_str);
                    let value = entry.get("OutputValue").and_then(Value::as_str);
                    match (key, value) {
                        (Some(k), Some(v)) => outputs.insert(k, v),
                        _ => {
                            return Err(StackError::Output(format!(
                                "malformed output entry: {}",
                                entry
                            )))
                        }
                    }
                }
            }
            Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        Value::String(s) => outputs.insert(key.as_str(), s.as_str()),
                        other => outputs.insert(key.as_str(), other.to_string()),
                    }
                }
            }
            Value::Null => {}
            other => {
                return Err(StackError::Output(format!(
                    "expected a list or object of outputs, got {}",
                    other
                )))
            }
        }
        Ok(outputs)
    }

    /// The public URL.
    ///
    /// Uses the `URL` output when present, otherwise builds it from the
    /// distribution domain.
    pub fn url(&self) -> Result<String> {
        if let Some(url) = self.get(URL_OUTPUT) {
            let domain = url.strip_prefix("https://").ok_or_else(|| {
                StackError::Output(format!("URL output '{}' is not an https URL", url))
            })?;
            return distribution_url(domain);
        }
        match self.get(DOMAIN_OUTPUT) {
            Some(domain) => distribution_url(domain),
            None => Err(StackError::Output(format!(
                "stack reported neither {} nor {}",
                URL_OUTPUT, DOMAIN_OUTPUT
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_url() {
        assert_eq!(
            distribution_url("d111111abcdef8.cloudfront.net").unwrap(),
            "https://d111111abcdef8.cloudfront.net"
        );
        assert!(matches!(distribution_url(""), Err(StackError::Output(_))));
        assert!(distribution_url("  ").is_err());
        assert!(distribution_url("https://d1.cloudfront.net").is_err());
    }

    #[test]
    fn test_parse_output_list() {
        let value = json!([
            {"OutputKey": "DistributionDomainName", "OutputValue": "d1.cloudfront.net"},
            {"OutputKey": "URL", "OutputValue": "https://d1.cloudfront.net"}
        ]);
        let outputs = StackOutputs::from_json(&value).unwrap();
        assert_eq!(outputs.get(DOMAIN_OUTPUT), Some("d1.cloudfront.net"));
        assert_eq!(outputs.url().unwrap(), "https://d1.cloudfront.net");
    }

    #[test]
    fn test_parse_output_object() {
        let outputs = StackOutputs::from_json(&json!({"DistributionDomainName": "d2.cloudfront.net"}))
            .unwrap();
        assert_eq!(outputs.url().unwrap(), "https://d2.cloudfront.net");
    }

    #[test]
    fn test_missing_outputs() {
        let outputs = StackOutputs::from_json(&Value::Null).unwrap();
        assert!(outputs.is_empty());
        assert!(matches!(outputs.url(), Err(StackError::Output(_))));

        let mut empty_domain = StackOutputs::new();
        empty_domain.insert(DOMAIN_OUTPUT, "");
        assert!(empty_domain.url().is_err());
    }

    #[test]
    fn test_malformed_outputs() {
        assert!(StackOutputs::from_json(&json!([{"OutputKey": "URL"}])).is_err());
        assert!(StackOutputs::from_json(&json!("d1.cloudfront.net")).is_err());
        assert!(StackOutputs::from_json(&json!({"URL": "http://d1.cloudfront.net"}))
            .unwrap()
            .url()
            .is_err());
    }
}
