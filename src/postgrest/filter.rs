//! Filter operations for PostgrestClient

use crate::postgrest::QueryBuilder;

/// PostgREST comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    /// Membership in a parenthesized list
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::In => "in",
        }
    }

    /// Render `<op>.<value>` as PostgREST expects it in the query string
    pub fn render(&self, value: &str) -> String {
        format!("{}.{}", self.as_str(), value)
    }
}

/// Row filters shared by the select, update and delete builders
pub trait Filterable: Sized {
    #[doc(hidden)]
    fn query_mut(&mut self) -> &mut QueryBuilder;

    /// Filter rows with an arbitrary operator
    fn filter<T: ToString>(mut self, column: &str, operator: FilterOperator, value: T) -> Self {
        let rendered = operator.render(&value.to_string());
        self.query_mut().add_param(column, &rendered);
        self
    }

    /// Filter rows where column equals a value
    fn eq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(column, FilterOperator::Eq, value)
    }

    /// Filter rows where column is in a list of values
    fn in_list<T: ToString>(self, column: &str, values: &[T]) -> Self {
        let values_str: Vec<String> = values.iter().map(|v| quote_list_item(&v.to_string())).collect();
        self.filter(column, FilterOperator::In, format!("({})", values_str.join(",")))
    }
}

// Values containing reserved characters must be double-quoted inside `in.(...)`.
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
