//! Quad value types shared by the store and the engine

use std::fmt;

/// An owned quad of canonical term strings.
///
/// The graph name is `""` for the default graph and a canonical IRI
/// (`<...>`) for a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quad {
    /// Subject term
    pub subject: String,
    /// Predicate term
    pub predicate: String,
    /// Object term
    pub object: String,
    /// Graph name (`""` = default graph)
    pub graph: String,
}

impl Quad {
    /// Create a quad in the default graph.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph: String::new(),
        }
    }

    /// Create a quad in a named graph.
    pub fn in_graph(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        graph: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph: graph.into(),
        }
    }

    /// Borrow this quad as a [`TripleRef`].
    pub fn as_ref(&self) -> TripleRef<'_> {
        TripleRef {
            subject: &self.subject,
            predicate: &self.predicate,
            object: &self.object,
            graph: &self.graph,
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.graph.is_empty() {
            write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
        } else {
            write!(
                f,
                "{} {} {} {} .",
                self.subject, self.predicate, self.object, self.graph
            )
        }
    }
}

/// A borrowed view of one matching quad, yielded by store scans.
///
/// The borrowed spans stay valid for the lifetime of the scan that
/// produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripleRef<'a> {
    /// Subject term
    pub subject: &'a str,
    /// Predicate term
    pub predicate: &'a str,
    /// Object term
    pub object: &'a str,
    /// Graph name (`""` = default graph)
    pub graph: &'a str,
}
