// src/core/query.rs

use log::debug;
use thiserror::Error;

use crate::core::datasource::DatasourceDescriptor;
use crate::core::expression::{Expression, ExpressionError};
use crate::core::graph::{ItemGraph, SortSpec};
use crate::core::interpolator::Interpolator;
use crate::core::view_arguments::ViewArguments;
use crate::models::{Item, ItemId};

/// Why a datasource query could not run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The resolved datasource has no `query`.
    #[error("The datasource has no query")]
    MissingQuery,

    /// The query text is malformed.
    #[error("Invalid query '{query}': {message}")]
    InvalidQuery {
        /// The query as written.
        query: String,
        /// What is wrong with it.
        message: String,
    },

    /// The filter part failed to parse.
    #[error("Invalid query expression: {0}")]
    Expression(#[from] ExpressionError),
}

/// Result alias for queries.
pub type QueryResult<T> = Result<T, QueryError>;

/// A query split into its item type and optional filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Items of this type are selected.
    pub item_type: String,
    /// Filter evaluated with each item as `.`.
    pub predicate: Option<Expression>,
}

/// Parses `Type` or `Type AND <expression>`.
pub fn parse_query(text: &str) -> QueryResult<ParsedQuery> {
    let text = text.trim();
    let (item_type, rest) = match text.split_once(" AND ") {
        Some((head, tail)) => (head.trim(), Some(tail.trim())),
        None => (text, None),
    };

    let valid_type = item_type.chars().next().is_some_and(char::is_alphabetic)
        && item_type.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid_type {
        return Err(QueryError::InvalidQuery {
            query: text.to_string(),
            message: format!("'{}' is not an item type", item_type),
        });
    }

    let predicate = match rest {
        Some("") => {
            return Err(QueryError::InvalidQuery {
                query: text.to_string(),
                message: "missing filter after AND".to_string(),
            });
        }
        Some(expression) => Some(Expression::bare(expression)?),
        None => None,
    };

    Ok(ParsedQuery {
        item_type: item_type.to_string(),
        predicate,
    })
}

/// The items a datasource currently selects, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    /// The datasource the items were selected with.
    pub descriptor: DatasourceDescriptor,
    /// Matching items, sorted.
    pub items: Vec<ItemId>,
}

impl ResultSet {
    /// Runs the descriptor's query against `graph`. The query's filter and
    /// the descriptor's `filter` are both evaluated per item with `.` bound to
    /// it; an item passes when both are truthy.
    pub fn load(
        descriptor: &DatasourceDescriptor,
        graph: &dyn ItemGraph,
        interpolator: &Interpolator<'_>,
    ) -> QueryResult<Self> {
        let query = descriptor.query.as_deref().ok_or(QueryError::MissingQuery)?;
        let parsed = parse_query(query)?;
        let filter = match descriptor.filter.as_deref() {
            Some(text) if !text.trim().is_empty() => Some(Expression::bare(text)?),
            _ => None,
        };
        let sort = descriptor.sort_property.as_ref().map(|property| SortSpec {
            property: property.clone(),
            ascending: descriptor.ascending(),
        });

        let predicates: Vec<&Expression> = parsed.predicate.iter().chain(filter.iter()).collect();
        let accept = |item: &Item| {
            let args = ViewArguments::new().with_item(item.id);
            predicates
                .iter()
                .all(|p| interpolator.evaluate_or_log(p, &args).is_truthy())
        };

        let items: Vec<ItemId> = graph
            .query(&parsed.item_type, &accept, sort.as_ref())
            .into_iter()
            .map(|item| item.id)
            .collect();
        debug!("Query '{}' selected {} item(s)", query, items.len());

        Ok(Self {
            descriptor: descriptor.clone(),
            items,
        })
    }

    /// Key of the descriptor this set was loaded from.
    pub fn key(&self) -> String {
        self.descriptor.unique_key()
    }

    /// Number of matching items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
