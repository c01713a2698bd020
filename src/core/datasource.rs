// src/core/datasource.rs

use serde::Serialize;

use crate::core::cache::content_hash;
use crate::core::cascade::{Cascadable, PropertyDecl};
use crate::models::Value;

/// Properties of a `[datasource]` block.
pub static DATASOURCE_PROPERTIES: &[PropertyDecl] = &[
    PropertyDecl::scalar("query"),
    PropertyDecl::scalar("sortProperty"),
    PropertyDecl::scalar("sortAscending"),
    PropertyDecl::scalar("filter"),
];

/// The resolved datasource configuration handed to query resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasourceDescriptor {
    /// Query string, see [`crate::core::query::parse_query`].
    pub query: Option<String>,
    /// Property results are sorted by.
    pub sort_property: Option<String>,
    /// Sort direction; unset means ascending.
    pub sort_ascending: Option<bool>,
    /// Extra predicate applied on top of the query.
    pub filter: Option<String>,
}

impl DatasourceDescriptor {
    /// `query|sortProperty|ascending|filter`. Set text segments carry a
    /// `len:` prefix so separators inside them cannot collide, unset ones are `-`.
    pub fn unique_string(&self) -> String {
        fn segment(text: Option<&str>) -> String {
            text.map(|t| format!("{}:{}", t.len(), t))
                .unwrap_or_else(|| "-".to_string())
        }
        format!(
            "{}|{}|{}|{}",
            segment(self.query.as_deref()),
            segment(self.sort_property.as_deref()),
            self.sort_ascending.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
            segment(self.filter.as_deref()),
        )
    }

    /// Cache key for result sets built from this descriptor.
    pub fn unique_key(&self) -> String {
        content_hash(self.unique_string().as_bytes())
    }

    /// Ascending unless explicitly turned off.
    pub fn ascending(&self) -> bool {
        self.sort_ascending.unwrap_or(true)
    }
}

/// Typed view of a datasource cascade.
pub struct CascadingDatasource<'a> {
    cascade: Cascadable<'a>,
}

impl<'a> CascadingDatasource<'a> {
    /// Wraps a cascade declared with [`DATASOURCE_PROPERTIES`].
    pub fn new(cascade: Cascadable<'a>) -> Self {
        Self { cascade }
    }

    /// The underlying cascade.
    pub fn cascade(&self) -> &Cascadable<'a> {
        &self.cascade
    }

    /// Unwraps the cascade.
    pub fn into_cascade(self) -> Cascadable<'a> {
        self.cascade
    }

    /// The resolved query string.
    pub fn query(&self) -> Option<String> {
        self.cascade.resolve_as("query")
    }

    /// The resolved sort property.
    pub fn sort_property(&self) -> Option<String> {
        self.cascade.resolve_as("sortProperty")
    }

    /// The resolved sort direction.
    pub fn sort_ascending(&self) -> Option<bool> {
        self.cascade.resolve_as("sortAscending")
    }

    /// The resolved filter.
    pub fn filter(&self) -> Option<String> {
        self.cascade.resolve_as("filter")
    }

    /// Overrides the query in the state layer.
    pub fn set_query(&mut self, query: &str) {
        self.cascade.set_state("query", Value::from(query));
    }

    /// Overrides the sort property in the state layer.
    pub fn set_sort_property(&mut self, property: &str) {
        self.cascade.set_state("sortProperty", Value::from(property));
    }

    /// Overrides the sort direction in the state layer.
    pub fn set_sort_ascending(&mut self, ascending: bool) {
        self.cascade.set_state("sortAscending", Value::Bool(ascending));
    }

    /// Overrides the filter in the state layer.
    pub fn set_filter(&mut self, filter: &str) {
        self.cascade.set_state("filter", Value::from(filter));
    }

    /// Snapshot of every resolved property.
    pub fn descriptor(&self) -> DatasourceDescriptor {
        DatasourceDescriptor {
            query: self.query(),
            sort_property: self.sort_property(),
            sort_ascending: self.sort_ascending(),
            filter: self.filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cascade::CascadeStack;
    use crate::core::functions::DefaultHost;
    use crate::core::graph::InMemoryGraph;
    use crate::core::interpolator::Interpolator;
    use crate::core::parser::parse;

    fn descriptor_for(sources: &[&str]) -> DatasourceDescriptor {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let mut stack = CascadeStack::new();
        for source in sources {
            stack = stack.with_layer(parse(source).unwrap());
        }
        let cascade = Cascadable::new(stack, DATASOURCE_PROPERTIES, Interpolator::new(&host, &graph));
        CascadingDatasource::new(cascade).descriptor()
    }

    #[test]
    fn test_three_layers_combine() {
        let d = descriptor_for(&[
            "[datasource = pod] { query: \"test\" }",
            "[datasource = pod] { sortProperty: \"foo\" }",
            "[datasource = pod] { sortAscending: false }",
        ]);
        assert_eq!(d.query.as_deref(), Some("test"));
        assert_eq!(d.sort_property.as_deref(), Some("foo"));
        assert_eq!(d.sort_ascending, Some(false));
    }

    #[test]
    fn test_unique_key_depends_on_sort_direction() {
        let a = descriptor_for(&["[datasource = pod] { query: \"Note\" sortAscending: true }"]);
        let b = descriptor_for(&["[datasource = pod] { query: \"Note\" sortAscending: false }"]);
        let c = descriptor_for(&["[datasource = pod] { query: \"Note\" sortAscending: true }"]);

        assert_ne!(a.unique_key(), b.unique_key());
        assert_eq!(a.unique_key(), c.unique_key());
        assert_eq!(a.unique_string(), "4:Note|-|true|-");
    }

    #[test]
    fn test_unique_key_distinguishes_filter_and_separators() {
        let plain = descriptor_for(&["[datasource = pod] { query: \"Note\" }"]);
        let filtered = descriptor_for(&["[datasource = pod] { query: \"Note\" filter: \"starred\" }"]);
        assert_ne!(plain.unique_key(), filtered.unique_key());

        let piped = descriptor_for(&["[datasource = pod] { query: \"a|b\" }"]);
        let split = descriptor_for(&["[datasource = pod] { query: \"a\" sortProperty: \"b\" }"]);
        assert_ne!(piped.unique_string(), split.unique_string());

        let unset = descriptor_for(&["[datasource = pod] { sortAscending: true }"]);
        assert_eq!(unset.unique_string(), "-|-|true|-");
    }

    #[test]
    fn test_setters_write_state_layer() {
        let graph = InMemoryGraph::new();
        let host = DefaultHost::new();
        let stack = CascadeStack::new().with_layer(parse("[datasource = pod] { query: \"Note\" }").unwrap());
        let cascade = Cascadable::new(stack, DATASOURCE_PROPERTIES, Interpolator::new(&host, &graph));
        let mut datasource = CascadingDatasource::new(cascade);

        datasource.set_sort_property("dateModified");
        datasource.set_sort_ascending(false);

        assert_eq!(datasource.sort_property().as_deref(), Some("dateModified"));
        assert_eq!(datasource.sort_ascending(), Some(false));
        assert!(datasource.cascade().state().needs_saving());
        assert!(datasource.cascade().stack().head().unwrap().get("sortProperty").is_none());
    }
}
