//! A restricted SQL interpreter for FakeDB tables.
//!
//! Only two statement shapes are understood: multi-row `INSERT ... VALUES`
//! and single-table `SELECT` with an `AND`-only `WHERE` clause and optional
//! `LIMIT`. Anything else is a [`ParseError`] carrying the byte offset of the
//! offending token. Execution lives with the table façade; this crate only
//! parses and evaluates predicates.
//!
//! ```
//! use fakedb_sql::{parse, Statement};
//! use serde_json::json;
//!
//! let Statement::Select(select) = parse("SELECT name FROM users WHERE id > 1").unwrap() else {
//!     unreachable!()
//! };
//! let row = json!({"id": 2, "name": "Bob"}).as_object().unwrap().clone();
//! assert!(select.matches(&row));
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{CompareOp, Condition, Insert, Projection, Select, Statement, Test};
pub use error::{ParseError, ParseResult};
pub use parser::parse;
