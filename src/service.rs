//! End-to-end handling of one question: history, translation, safety gate,
//! execution and formatting.

use crate::engine::{self, CellValue, QueryExecutor, QueryRows};
use crate::error::Text2SqlError;
use crate::format;
use crate::history::HistoryStore;
use crate::rules::Entities;
use crate::safety::{self, SafetyVerdict};
use crate::translator::{TranslationResult, TranslationSource, Translator};
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Questions offered to new users.
pub const SAMPLE_QUERIES: &[&str] = &[
    "Показать всех сотрудников",
    "Сотрудники IT отдела",
    "Найти менеджеров",
    "Зарплата больше 150000",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Blank input; nothing recorded.
    Empty,
    Rows {
        user_query: String,
        sql: String,
        source: TranslationSource,
        columns: Vec<String>,
        results: Vec<Map<String, Value>>,
        entities: Entities,
    },
    /// The safety gate refused the statement; it was not executed.
    Rejected {
        user_query: String,
        sql: String,
        offending_operation: String,
    },
    DatabaseError {
        user_query: String,
        sql: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentStat {
    pub department: String,
    pub count: i64,
    pub avg_salary: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbInfo {
    pub total_employees: i64,
    pub departments: Vec<String>,
    pub min_salary: f64,
    pub max_salary: f64,
    pub avg_salary: f64,
    pub total_salary: f64,
    pub department_stats: Vec<DepartmentStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub database: &'static str,
    pub model: &'static str,
    pub history_count: usize,
    pub timestamp: String,
}

pub struct QueryService {
    translator: Translator,
    executor: Box<dyn QueryExecutor>,
    history: HistoryStore,
}

impl QueryService {
    pub fn new(
        translator: Translator,
        executor: Box<dyn QueryExecutor>,
        history: HistoryStore,
    ) -> Self {
        Self {
            translator,
            executor,
            history,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Answer one natural-language question.
    pub async fn process(&mut self, text: &str) -> QueryOutcome {
        let user_query = text.trim();
        if user_query.is_empty() {
            return QueryOutcome::Empty;
        }

        if let Err(e) = self.history.push(user_query) {
            warn!(error = %e, "could not save history");
        }

        let (sql, source, entities) = match self.translator.convert(user_query).await {
            TranslationResult::Success {
                sql_text,
                extracted_entities,
                source,
                ..
            } => (sql_text, source, extracted_entities),
            TranslationResult::Failure { reason } => {
                let schema = self.translator.schema();
                let fallback = format!(
                    "SELECT {} FROM {} LIMIT 10;",
                    schema.projection(),
                    schema.table_name
                );
                warn!(reason = %reason, sql = %fallback, "translation failed, using fallback");
                (fallback, TranslationSource::Rules, Entities::new())
            }
        };

        if let SafetyVerdict::Rejected { offending_operation } = safety::check(&sql) {
            warn!(query = user_query, sql = %sql, "refusing potentially unsafe query");
            return QueryOutcome::Rejected {
                user_query: user_query.to_string(),
                sql,
                offending_operation,
            };
        }

        match self.executor.execute(&sql).await {
            Ok(rows) => {
                info!(query = user_query, sql = %sql, rows = rows.len(), "query answered");
                QueryOutcome::Rows {
                    user_query: user_query.to_string(),
                    sql,
                    source,
                    columns: rows.columns.clone(),
                    results: format::format_rows(&rows),
                    entities,
                }
            }
            Err(e) => {
                let raw = match e {
                    Text2SqlError::Database(msg) => msg,
                    other => other.to_string(),
                };
                warn!(sql = %sql, error = %raw, "query execution failed");
                QueryOutcome::DatabaseError {
                    user_query: user_query.to_string(),
                    sql,
                    message: engine::user_message(&raw),
                }
            }
        }
    }

    /// Summary statistics of the employee table.
    pub async fn db_info(&self) -> Result<DbInfo, Text2SqlError> {
        let count = self.executor.execute("SELECT COUNT(*) as count FROM employees;").await?;
        let departments = self
            .executor
            .execute("SELECT DISTINCT department FROM employees ORDER BY department;")
            .await?;
        let salaries = self
            .executor
            .execute(
                "SELECT MIN(salary) as min_salary, MAX(salary) as max_salary, \
                 ROUND(AVG(salary), 2) as avg_salary, ROUND(SUM(salary), 2) as total_salary \
                 FROM employees;",
            )
            .await?;
        let per_department = self
            .executor
            .execute(
                "SELECT department, COUNT(*) as employee_count, ROUND(AVG(salary), 2) as avg_salary \
                 FROM employees GROUP BY department ORDER BY avg_salary DESC;",
            )
            .await?;

        let salary_row = salaries.rows.first();
        let salary_at = |i: usize| salary_row.and_then(|r| r.get(i)).map(as_f64).unwrap_or(0.0);

        Ok(DbInfo {
            total_employees: count.scalar().map(as_i64).unwrap_or(0),
            departments: first_column_text(&departments),
            min_salary: salary_at(0),
            max_salary: salary_at(1),
            avg_salary: salary_at(2),
            total_salary: salary_at(3),
            department_stats: per_department
                .rows
                .iter()
                .map(|r| DepartmentStat {
                    department: r.first().map(as_text).unwrap_or_default(),
                    count: r.get(1).map(as_i64).unwrap_or(0),
                    avg_salary: r.get(2).map(as_f64).unwrap_or(0.0),
                })
                .collect(),
        })
    }

    /// Database reachability and model readiness.
    pub async fn health(&self) -> HealthStatus {
        let database = match self.executor.execute("SELECT 1;").await {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        };
        let model = if self.translator.model_available().await {
            "ready"
        } else {
            "not_ready"
        };
        HealthStatus {
            database,
            model,
            history_count: self.history.len(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn as_f64(cell: &CellValue) -> f64 {
    match cell {
        CellValue::Int(n) => *n as f64,
        CellValue::Float(n) => *n,
        CellValue::Text(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn as_i64(cell: &CellValue) -> i64 {
    match cell {
        CellValue::Int(n) => *n,
        CellValue::Float(n) => *n as i64,
        CellValue::Text(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn as_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Text(s) => s.clone(),
        CellValue::Null => String::new(),
        other => format::display_value(&format::format_cell("", other)),
    }
}

fn first_column_text(rows: &QueryRows) -> Vec<String> {
    rows.rows.iter().filter_map(|r| r.first()).map(as_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Text2SqlResult;
    use crate::history::DEFAULT_CAPACITY;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records statements and answers with a canned result or error.
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
        fail_with: Option<String>,
        no_rows: bool,
    }

    #[async_trait]
    impl QueryExecutor for Recorder {
        async fn execute(&self, sql: &str) -> Text2SqlResult<QueryRows> {
            self.seen.lock().unwrap().push(sql.to_string());
            if let Some(msg) = &self.fail_with {
                return Err(Text2SqlError::Database(msg.clone()));
            }
            let rows = if self.no_rows {
                Vec::new()
            } else {
                vec![vec![CellValue::Text("Петров".to_string()), CellValue::Float(160000.0)]]
            };
            Ok(QueryRows {
                columns: vec!["last_name".to_string(), "salary".to_string()],
                rows,
            })
        }
    }

    fn service(executor: Recorder) -> (QueryService, TempDir) {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::open(dir.path().join("history.jsonl"), DEFAULT_CAPACITY);
        (QueryService::new(Translator::rules_only(), Box::new(executor), history), dir)
    }

    #[tokio::test]
    async fn test_process_rows() {
        let recorder = Recorder::default();
        let (mut svc, _dir) = service(recorder.clone());
        let outcome = svc.process("Зарплата больше 150000").await;

        match outcome {
            QueryOutcome::Rows { sql, results, columns, .. } => {
                assert!(sql.ends_with("WHERE salary > 150000;"));
                assert_eq!(columns, vec!["last_name", "salary"]);
                assert_eq!(results[0]["salary"], Value::from("160 000,00"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
        assert_eq!(svc.history().recent(10), vec!["Зарплата больше 150000"]);
    }

    #[tokio::test]
    async fn test_no_matches_keep_columns() {
        let recorder = Recorder {
            no_rows: true,
            ..Recorder::default()
        };
        let (mut svc, _dir) = service(recorder);
        match svc.process("Зарплата больше 999999999").await {
            QueryOutcome::Rows { columns, results, .. } => {
                assert_eq!(columns, vec!["last_name", "salary"]);
                assert!(results.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_empty() {
        let (mut svc, _dir) = service(Recorder::default());
        assert_eq!(svc.process("  ").await, QueryOutcome::Empty);
        assert!(svc.history().is_empty());
    }

    #[tokio::test]
    async fn test_database_error_is_simplified() {
        let recorder = Recorder {
            fail_with: Some(r#"relation "employees" does not exist"#.to_string()),
            ..Recorder::default()
        };
        let (mut svc, _dir) = service(recorder);
        match svc.process("Найти менеджеров").await {
            QueryOutcome::DatabaseError { message, sql, .. } => {
                assert!(message.contains("таблица не найдена"));
                assert!(sql.contains("ILIKE '%менеджер%'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsafe_model_sql_not_executed() {
        use crate::model::SqlModel;

        struct Sneaky;

        #[async_trait]
        impl SqlModel for Sneaky {
            async fn generate(&self, _prompt: &str) -> Text2SqlResult<String> {
                Ok("SELECT * FROM employees WHERE last_name = 'Update'".to_string())
            }

            fn name(&self) -> &str {
                "sneaky"
            }
        }

        let recorder = Recorder::default();
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::open(dir.path().join("h.jsonl"), DEFAULT_CAPACITY);
        let mut svc = QueryService::new(
            Translator::with_model(Arc::new(Sneaky)),
            Box::new(recorder.clone()),
            history,
        );

        match svc.process("кто такой Update").await {
            QueryOutcome::Rejected { offending_operation, user_query, .. } => {
                assert_eq!(offending_operation, "UPDATE");
                assert_eq!(user_query, "кто такой Update");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_reports_disconnected_database() {
        let recorder = Recorder {
            fail_with: Some("connection refused".to_string()),
            ..Recorder::default()
        };
        let (svc, _dir) = service(recorder);
        let health = svc.health().await;
        assert_eq!(health.database, "disconnected");
        assert_eq!(health.model, "not_ready");
    }

    #[test]
    fn test_cell_conversions() {
        assert_eq!(as_f64(&CellValue::Int(3)), 3.0);
        assert_eq!(as_i64(&CellValue::Float(3.9)), 3);
        assert_eq!(as_text(&CellValue::Null), "");
        assert_eq!(as_text(&CellValue::Int(5)), "5");
    }
}
