//! Query and filter builder for class-scoped list requests
//!
//! Filter keys follow `object_attr[__operator]`: the first `_` separates the
//! object from its attribute (`fvTenant_name` → `fvTenant.name`) and an
//! optional trailing `__op` selects the comparison.
//!
//! ```text
//! fvTenant_name="tn1"                 eq(fvTenant.name,"tn1")
//! fvBD_name=["bd1","bd2"]             or(eq(fvBD.name,"bd1"),eq(fvBD.name,"bd2"))
//! fvTenant_name__in=["tn1","tn2"]     and(eq(fvTenant.name,"tn1"),eq(fvTenant.name,"tn2"))
//! fvTenant_name__not_in=["tn1"]       and(ne(fvTenant.name,"tn1"))
//! ```
//!
//! Several filters are AND-combined at the top level.

use serde_json::Value;

use crate::error::{AciError, Result};
use crate::transport::QueryParams;

/// Query options accepted by their underscored names
pub const QUERY_OPTIONS: &[&str] = &[
    "query_target",
    "target_subtree_class",
    "query_target_filter",
    "rsp_subtree",
    "rsp_subtree_class",
    "rsp_subtree_filter",
    "rsp_subtree_include",
    "order_by",
];

/// Comparison operators accepted after `__`
pub const FILTER_OPERATORS: &[&str] = &[
    "eq", "ne", "lt", "gt", "le", "ge", "wcard", "anybit", "allbits", "in", "not_in",
];

const DEFAULT_RSP_SUBTREE: &str = "full";
const DEFAULT_RSP_PROP_INCLUDE: &str = "all";

/// Value side of a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Scalar(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Scalar(v)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(v: Vec<&str>) -> Self {
        FilterValue::List(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(v: Vec<String>) -> Self {
        FilterValue::List(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Scalar(v.to_string())
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Scalar(if v { "yes" } else { "no" }.to_string())
    }
}

impl TryFrom<&Value> for FilterValue {
    type Error = String;

    fn try_from(value: &Value) -> std::result::Result<Self, String> {
        fn scalar(v: &Value) -> std::result::Result<String, String> {
            match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                other => Err(format!("unsupported filter value {}", other)),
            }
        }
        match value {
            Value::Array(items) => Ok(FilterValue::List(
                items.iter().map(scalar).collect::<std::result::Result<_, _>>()?,
            )),
            other => Ok(FilterValue::Scalar(scalar(other)?)),
        }
    }
}

/// A parsed `object_attr[__op]` filter
#[derive(Debug, Clone, PartialEq, Eq)]
struct Filter {
    path: String,
    operator: String,
    value: FilterValue,
}

impl Filter {
    fn parse(key: &str, value: FilterValue) -> Result<Self> {
        let invalid = || AciError::InvalidFilterArgument {
            key: key.to_string(),
            allowed: allowed_arguments(),
        };

        let (object, operator) = match key.rsplit_once("__") {
            Some((object, op)) if !op.is_empty() => (object, op),
            _ => (key, "eq"),
        };
        if !FILTER_OPERATORS.contains(&operator) {
            return Err(invalid());
        }
        if matches!(&value, FilterValue::List(items) if items.is_empty()) {
            return Err(invalid());
        }
        let items: &[String] = match &value {
            FilterValue::Scalar(v) => std::slice::from_ref(v),
            FilterValue::List(items) => items,
        };
        // Values are emitted inside double quotes with no escape syntax.
        if let Some(bad) = items.iter().find(|v| v.contains(['"', '\\'])) {
            return Err(AciError::InvalidFilterValue {
                key: key.to_string(),
                reason: format!("{:?} contains a quote or backslash", bad),
            });
        }
        match object.split_once('_') {
            Some((class, attr)) if !class.is_empty() && !attr.is_empty() => Ok(Self {
                path: format!("{}.{}", class, attr),
                operator: operator.to_string(),
                value,
            }),
            _ => Err(invalid()),
        }
    }

    /// Operator emitted for each value
    fn item_operator(&self) -> &str {
        match self.operator.as_str() {
            "in" => "eq",
            "not_in" => "ne",
            other => other,
        }
    }

    fn predicate(&self, value: &str) -> String {
        format!("{}({},\"{}\")", self.item_operator(), self.path, value)
    }

    fn render(&self) -> String {
        match &self.value {
            FilterValue::Scalar(v) => self.predicate(v),
            FilterValue::List(items) => {
                let logic = match self.operator.as_str() {
                    "in" | "not_in" => "and",
                    _ => "or",
                };
                let clauses: Vec<String> = items.iter().map(|v| self.predicate(v)).collect();
                format!("{}({})", logic, clauses.join(","))
            }
        }
    }
}

fn allowed_arguments() -> Vec<String> {
    QUERY_OPTIONS.iter().map(|s| s.to_string()).collect()
}

/// Builder for list request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    options: Vec<(String, String)>,
    filters: Vec<Filter>,
}

impl Query {
    /// Create an empty query (default response shaping, no filter)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from flat keyword pairs
    ///
    /// Keys naming a query option set that option; every other key is parsed
    /// as a filter.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        let mut query = Self::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            if QUERY_OPTIONS.contains(&key) {
                let value = match value.into() {
                    FilterValue::Scalar(s) => s,
                    FilterValue::List(items) => items.join(","),
                };
                query = query.option(key, value)?;
            } else {
                query = query.filter(key, value)?;
            }
        }
        Ok(query)
    }

    /// Set a query option by its underscored name (`rsp_subtree`)
    pub fn option(mut self, name: &str, value: impl Into<String>) -> Result<Self> {
        if !QUERY_OPTIONS.contains(&name) {
            return Err(AciError::InvalidFilterArgument {
                key: name.to_string(),
                allowed: allowed_arguments(),
            });
        }
        let wire = name.replace('_', "-");
        self.options.retain(|(k, _)| *k != wire);
        self.options.push((wire, value.into()));
        Ok(self)
    }

    /// Add an attribute filter (`fvTenant_name__ne`)
    pub fn filter(mut self, key: &str, value: impl Into<FilterValue>) -> Result<Self> {
        self.filters.push(Filter::parse(key, value.into())?);
        Ok(self)
    }

    /// The combined filter expression, if any
    pub fn filter_expression(&self) -> Option<String> {
        let explicit = self
            .options
            .iter()
            .find(|(k, _)| k == "query-target-filter")
            .map(|(_, v)| v.clone());

        let mut clauses: Vec<String> = self.filters.iter().map(Filter::render).collect();
        clauses.extend(explicit);

        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(format!("and({})", clauses.join(","))),
        }
    }

    /// Render to request parameters
    pub fn to_params(&self) -> QueryParams {
        let mut params: QueryParams = Vec::new();

        if !self.options.iter().any(|(k, _)| k == "rsp-subtree") {
            params.push(("rsp-subtree".to_string(), DEFAULT_RSP_SUBTREE.to_string()));
        }
        params.push((
            "rsp-prop-include".to_string(),
            DEFAULT_RSP_PROP_INCLUDE.to_string(),
        ));
        params.extend(
            self.options
                .iter()
                .filter(|(k, _)| k != "query-target-filter")
                .cloned(),
        );
        if let Some(expr) = self.filter_expression() {
            params.push(("query-target-filter".to_string(), expr));
        }
        params
    }
}
