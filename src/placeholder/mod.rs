//! Placeholder templates.
//!
//! Generated or hand-written fragments may contain `<token>` slots that are
//! filled from a context map before the fragment is parsed.
//!
//! ```rust
//! use std::collections::HashMap;
//! use ob_poc_dsl::placeholder::PlaceholderResolver;
//!
//! let resolver = PlaceholderResolver::new();
//! let mut context = HashMap::new();
//! context.insert("cbu_id".to_string(), serde_json::json!("CBU-1234"));
//!
//! let dsl = resolver.resolve("(case.create (cbu.id <cbu_id>))", &context).unwrap();
//! assert_eq!(dsl, r#"(case.create (cbu.id "CBU-1234"))"#);
//! ```

pub mod resolver;

pub use resolver::{common_entity_patterns, PlaceholderResolver, KEY_TRANSFORMS};
