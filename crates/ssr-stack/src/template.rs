//! CloudFormation template model and resource graph checks.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, StackError};

/// Template format version.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// `{"Ref": id}`.
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [id, attribute]}`.
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::Join": ["", parts]}`.
pub fn join(parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": ["", parts] })
}

/// `{"Fn::ImportValue": name}`.
pub fn import_value(name: &str) -> Value {
    json!({ "Fn::ImportValue": name })
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Resource type, e.g. `AWS::S3::Bucket`.
    #[serde(rename = "Type")]
    pub resource_type: String,

    /// Resource properties.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    /// Explicit dependencies not expressed through references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Deletion policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,

    /// Update-replace policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,

    /// Resource metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Resource {
    /// Create a resource of a type with properties.
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
            metadata: Map::new(),
        }
    }

    /// Add an explicit dependency.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Set deletion and update-replace policy.
    pub fn with_policy(mut self, policy: &str) -> Self {
        self.deletion_policy = Some(policy.to_string());
        self.update_replace_policy = Some(policy.to_string());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Logical ids referenced from the properties.
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        for value in self.properties.values() {
            collect_references(value, &mut refs);
        }
        refs
    }

    /// All logical ids this resource depends on.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.references();
        deps.extend(self.depends_on.iter().cloned());
        deps
    }
}

fn collect_references(value: &Value, refs: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("Ref") {
                if !id.starts_with("AWS::") {
                    refs.insert(id.clone());
                }
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(id)) = parts.first() {
                    refs.insert(id.clone());
                }
            }
            for v in map.values() {
                collect_references(v, refs);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, refs);
            }
        }
        _ => {}
    }
}

/// A stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    /// Output description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Output value expression.
    pub value: Value,
}

/// A CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Format version.
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    /// Template description.
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resources by logical id.
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, Resource>,

    /// Outputs by name.
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    /// Create an empty template.
    pub fn new() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource; logical ids must be unique.
    pub fn add(&mut self, logical_id: impl Into<String>, resource: Resource) -> Result<()> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(StackError::Template(format!(
                "duplicate logical id '{}'",
                logical_id
            )));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    /// Add several resources.
    pub fn extend(&mut self, resources: Vec<(String, Resource)>) -> Result<()> {
        for (id, resource) in resources {
            self.add(id, resource)?;
        }
        Ok(())
    }

    /// Add an output.
    pub fn add_output(&mut self, name: impl Into<String>, description: &str, value: Value) {
        self.outputs.insert(
            name.into(),
            Output {
                description: Some(description.to_string()),
                value,
            },
        );
    }

    /// Get a resource by logical id.
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Logical ids of resources with a given type.
    pub fn ids_of_type(&self, resource_type: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Whether `from` depends on `to`, directly or transitively.
    pub fn depends_on(&self, from: &str, to: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(id) = stack.pop() {
            let Some(resource) = self.resources.get(&id) else {
                continue;
            };
            for dep in resource.dependencies() {
                if dep == to {
                    return true;
                }
                if seen.insert(dep.clone()) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// Resources in an order where every dependency comes first.
    ///
    /// Fails on references to undeclared resources and on cycles.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<&str>> = BTreeMap::new();

        for (id, resource) in &self.resources {
            let deps = resource.dependencies();
            for dep in &deps {
                if !self.resources.contains_key(dep) {
                    return Err(StackError::Template(format!(
                        "'{}' references undeclared resource '{}'",
                        id, dep
                    )));
                }
                dependents.entry(dep.clone()).or_default().push(id.as_str());
            }
            in_degree.insert(id.as_str(), deps.len());
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.resources.len());

        while let Some(id) = ready.pop_front() {
            order.push(id.to_string());
            let Some(next) = dependents.get(id) else {
                continue;
            };
            for &dependent in next {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.resources.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|&(_, &d)| d > 0)
                .map(|(id, _)| *id)
                .collect();
            return Err(StackError::Template(format!(
                "dependency cycle between {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a template written by `to_json`.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StackError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Resource-level difference between two templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDiff {
    /// Resources only in the new template.
    pub added: Vec<String>,
    /// Resources only in the old template.
    pub removed: Vec<String>,
    /// Resources present in both with different declarations.
    pub modified: Vec<String>,
}

impl TemplateDiff {
    /// Compare two templates.
    pub fn between(old: &Template, new: &Template) -> Self {
        let mut diff = Self::default();

        for (id, resource) in &new.resources {
            match old.resources.get(id) {
                None => diff.added.push(id.clone()),
                Some(previous) if previous != resource => diff.modified.push(id.clone()),
                Some(_) => {}
            }
        }
        for id in old.resources.keys() {
            if !new.resources.contains_key(id) {
                diff.removed.push(id.clone());
            }
        }

        diff
    }

    /// Whether the templates declare the same resources.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// All changed logical ids.
    pub fn changed(&self) -> BTreeSet<&str> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.modified)
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Template {
        let mut template = Template::new();
        template
            .add("Bucket", Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        template
            .add(
                "Distribution",
                Resource::new(
                    "AWS::CloudFront::Distribution",
                    json!({ "Origin": get_att("Bucket", "RegionalDomainName") }),
                ),
            )
            .unwrap();
        template
            .add(
                "Deployment",
                Resource::new(
                    "Custom::Deploy",
                    json!({
                        "Bucket": reference("Bucket"),
                        "DistributionId": reference("Distribution"),
                        "Region": reference("AWS::Region"),
                    }),
                ),
            )
            .unwrap();
        template
    }

    #[test]
    fn test_references_skip_pseudo_parameters() {
        let template = sample();
        let refs = template.get("Deployment").unwrap().references();
        assert_eq!(
            refs.into_iter().collect::<Vec<_>>(),
            vec!["Bucket".to_string(), "Distribution".to_string()]
        );
    }

    #[test]
    fn test_dependency_order() {
        let order = sample().dependency_order().unwrap();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("Bucket") < pos("Distribution"));
        assert!(pos("Distribution") < pos("Deployment"));
    }

    #[test]
    fn test_transitive_dependency() {
        let template = sample();
        assert!(template.depends_on("Deployment", "Bucket"));
        assert!(!template.depends_on("Bucket", "Deployment"));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut template = Template::new();
        template
            .add("A", Resource::new("Custom::A", json!({ "B": reference("Missing") })))
            .unwrap();
        assert!(matches!(template.dependency_order(), Err(StackError::Template(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut template = Template::new();
        template
            .add("A", Resource::new("Custom::A", json!({})).depends_on("B"))
            .unwrap();
        template
            .add("B", Resource::new("Custom::B", json!({ "A": reference("A") })))
            .unwrap();
        let err = template.dependency_order().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_duplicate_logical_id() {
        let mut template = Template::new();
        template.add("A", Resource::new("Custom::A", json!({}))).unwrap();
        assert!(template.add("A", Resource::new("Custom::A", json!({}))).is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let mut template = sample();
        template.add_output("URL", "Distribution URL", json!("x"));
        let json: Value = serde_json::from_str(&template.to_json().unwrap()).unwrap();
        assert_eq!(json["AWSTemplateFormatVersion"], TEMPLATE_FORMAT_VERSION);
        assert_eq!(json["Resources"]["Bucket"]["Type"], "AWS::S3::Bucket");
        assert!(json["Resources"]["Bucket"].get("Properties").is_none());
        assert_eq!(json["Outputs"]["URL"]["Value"], "x");
    }

    #[test]
    fn test_diff() {
        let old = sample();
        let mut new = sample();
        assert!(TemplateDiff::between(&old, &new).is_empty());

        new.resources.remove("Deployment");
        new.add("Other", Resource::new("Custom::Other", json!({}))).unwrap();
        new.resources.get_mut("Bucket").unwrap().deletion_policy = Some("Retain".into());

        let diff = TemplateDiff::between(&old, &new);
        assert_eq!(diff.added, vec!["Other"]);
        assert_eq!(diff.removed, vec!["Deployment"]);
        assert_eq!(diff.modified, vec!["Bucket"]);
    }
}
