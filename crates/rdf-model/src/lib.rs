//! Canonical RDF term-string model
//!
//! Terms travel through the store and the query engine in their canonical
//! wire form, one string per term:
//!
//! - IRI: `<http://example.org/a>` (angle brackets included)
//! - Plain literal: bare lexical characters, no surrounding quotes
//! - Typed literal: `"lex"^^<datatype-iri>`
//! - Language-tagged literal: `"lex"@tag`
//! - Blank node: `_:label`
//!
//! This crate provides classification and (de)composition helpers over
//! those forms, the shared quad value types, and the vocabulary constants
//! the engine expands prefixed names against.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod quad;
mod term;
mod vocab;

pub use quad::{Quad, TripleRef};
pub use term::{
    closing_quote, datatype_iri, format_lang, format_typed, is_blank, is_integer_lexical, is_iri,
    is_numeric_lexical, language_tag, lexical_form, strip_brackets, suffix,
};
pub use vocab::Vocabulary;
