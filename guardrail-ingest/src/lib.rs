//! Markdown rule ingestion (§2, §4.4): parses `## PREVENT-<n>: <name>`
//! blocks out of markdown and reconciles them against the rule store.

pub mod parser;
pub mod reconcile;

pub use parser::{parse_blocks, ParsedRuleBlock};
pub use reconcile::ingest_source;
