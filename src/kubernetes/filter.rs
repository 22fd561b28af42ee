// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Composable pod-label predicates.
//!
//! Each dialect advertises one filter tree describing the label signatures
//! of the chart/operator topologies it knows how to talk to. Discovery
//! evaluates the tree against every pod in the namespace.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;

/// A predicate over a pod's label map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFilter {
    /// Equality match, or bare existence when `value` is `None`.
    Label {
        name: String,
        value: Option<String>,
    },
    /// All children must match.
    And(Vec<LabelFilter>),
    /// At least one child must match.
    Or(Vec<LabelFilter>),
}

impl LabelFilter {
    pub fn label(name: impl Into<String>, value: impl Into<String>) -> Self {
        LabelFilter::Label {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn exists(name: impl Into<String>) -> Self {
        LabelFilter::Label {
            name: name.into(),
            value: None,
        }
    }

    pub fn and(filters: impl IntoIterator<Item = LabelFilter>) -> Self {
        LabelFilter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = LabelFilter>) -> Self {
        LabelFilter::Or(filters.into_iter().collect())
    }

    /// Evaluate against a label map. A missing label is simply a non-match,
    /// never an error.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            LabelFilter::Label { name, value } => match labels.get(name) {
                Some(actual) => value.as_ref().is_none_or(|v| v == actual),
                None => false,
            },
            LabelFilter::And(children) => children.iter().all(|f| f.matches(labels)),
            LabelFilter::Or(children) => children.iter().any(|f| f.matches(labels)),
        }
    }

    /// Evaluate against a pod's metadata labels.
    pub fn matches_pod(&self, pod: &Pod) -> bool {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        let labels = pod.metadata.labels.as_ref().unwrap_or(&EMPTY);
        self.matches(labels)
    }
}

/// Label value of a pod, if present.
pub fn pod_label<'a>(pod: &'a Pod, name: &str) -> Option<&'a str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(name))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_label_equality() {
        let filter = LabelFilter::label("app", "postgresql");
        assert!(filter.matches(&labels(&[("app", "postgresql")])));
        assert!(!filter.matches(&labels(&[("app", "redis")])));
    }

    #[test]
    fn test_missing_label_is_false_not_error() {
        let filter = LabelFilter::label("app", "postgresql");
        assert!(!filter.matches(&labels(&[])));
    }

    #[test]
    fn test_exists_matches_any_value() {
        let filter = LabelFilter::exists("cnpg.io/cluster");
        assert!(filter.matches(&labels(&[("cnpg.io/cluster", "mydb")])));
        assert!(filter.matches(&labels(&[("cnpg.io/cluster", "")])));
        assert!(!filter.matches(&labels(&[("app", "mydb")])));
    }

    #[test]
    fn test_and_requires_all_children() {
        let filter = LabelFilter::and([
            LabelFilter::label("app.kubernetes.io/name", "postgresql"),
            LabelFilter::label("app.kubernetes.io/component", "primary"),
        ]);
        assert!(filter.matches(&labels(&[
            ("app.kubernetes.io/name", "postgresql"),
            ("app.kubernetes.io/component", "primary"),
        ])));
        assert!(!filter.matches(&labels(&[("app.kubernetes.io/name", "postgresql")])));
    }

    #[test]
    fn test_or_requires_any_child() {
        let filter = LabelFilter::or([
            LabelFilter::label("app", "mariadb"),
            LabelFilter::label("app.kubernetes.io/name", "mariadb"),
        ]);
        assert!(filter.matches(&labels(&[("app", "mariadb")])));
        assert!(filter.matches(&labels(&[("app.kubernetes.io/name", "mariadb")])));
        assert!(!filter.matches(&labels(&[("app", "postgres")])));
    }

    #[test]
    fn test_empty_and_or() {
        // vacuous truth for And, vacuous falsity for Or
        assert!(LabelFilter::and([]).matches(&labels(&[])));
        assert!(!LabelFilter::or([]).matches(&labels(&[])));
    }
}
