//! # text2sql — ask the employee database in plain words
//!
//! Questions such as "Зарплата больше 150000" are translated into a single
//! read-only SQL statement over the `employees` table.
//!
//! ## Quick Example
//!
//! ```
//! use text2sql::prelude::*;
//!
//! let sql = translate_by_rules("Зарплата больше 150000");
//! assert_eq!(
//!     sql,
//!     "SELECT first_name, last_name, position, department, salary FROM employees WHERE salary > 150000;"
//! );
//! assert!(is_safe(&sql));
//! assert!(!is_safe("DROP TABLE employees;"));
//! ```
//!
//! ## Pipeline
//!
//! | Stage       | Module        | Role                                     |
//! |-------------|---------------|------------------------------------------|
//! | Translate   | `translator`  | model first, rule fallback               |
//! | Rules       | `rules`       | ordered intent table, SQL templates      |
//! | Model       | `model`       | generative model over HTTP               |
//! | Gate        | `safety`      | single read-only statement check         |
//! | Execute     | `engine`      | PostgreSQL via sqlx                      |

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod history;
pub mod model;
pub mod rules;
pub mod safety;
pub mod schema;
pub mod service;
pub mod translator;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{CellValue, EmployeeDb, QueryExecutor, QueryRows};
    pub use crate::error::*;
    pub use crate::history::HistoryStore;
    pub use crate::model::{translate_by_model, OllamaModel, SqlModel};
    pub use crate::rules::{translate_by_rules, RuleTranslator};
    pub use crate::safety::{is_safe, SafetyVerdict};
    pub use crate::schema::SchemaDescriptor;
    pub use crate::service::{QueryOutcome, QueryService};
    pub use crate::translator::{TranslationResult, TranslationSource, Translator};
}

pub use rules::translate_by_rules;
pub use safety::is_safe;
