//! Static description of the `employees` table.
//!
//! The translators never query the catalog; everything they know about the
//! table lives here.

use crate::config::SchemaConfig;
use std::fmt;
use std::sync::LazyLock;

/// Table queried by every generated statement.
pub const TABLE_NAME: &str = "employees";

static EMPLOYEES: LazyLock<SchemaDescriptor> =
    LazyLock::new(|| SchemaDescriptor::from_config(&SchemaConfig::default()));

/// The employee schema with default departments and salary range.
pub fn employees() -> &'static SchemaDescriptor {
    &EMPLOYEES
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainType {
    Integer,
    Varchar(u16),
    Decimal { precision: u8, scale: u8 },
    Date,
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainType::Integer => write!(f, "INTEGER"),
            DomainType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DomainType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            DomainType::Date => write!(f, "DATE"),
        }
    }
}

/// What a column means to the translators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticRole {
    Identifier,
    PersonName,
    DepartmentEnum(Vec<String>),
    NumericMeasure { min: u64, max: u64 },
    Date,
    FreeText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub domain_type: DomainType,
    pub nullable: bool,
    pub semantic_role: SemanticRole,
    /// Human label used in the model prompt.
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub table_name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

impl SchemaDescriptor {
    pub fn from_config(config: &SchemaConfig) -> Self {
        let col = |name, domain_type, nullable, semantic_role, label| ColumnSpec {
            name,
            domain_type,
            nullable,
            semantic_role,
            label,
        };

        Self {
            table_name: TABLE_NAME,
            columns: vec![
                col("id", DomainType::Integer, false, SemanticRole::Identifier, "primary key"),
                col("first_name", DomainType::Varchar(50), false, SemanticRole::PersonName, "имя"),
                col(
                    "last_name",
                    DomainType::Varchar(50),
                    false,
                    SemanticRole::PersonName,
                    "фамилия",
                ),
                col(
                    "patronymic",
                    DomainType::Varchar(50),
                    true,
                    SemanticRole::PersonName,
                    "отчество",
                ),
                col(
                    "department",
                    DomainType::Varchar(100),
                    false,
                    SemanticRole::DepartmentEnum(config.departments.clone()),
                    "отдел",
                ),
                col(
                    "position",
                    DomainType::Varchar(100),
                    false,
                    SemanticRole::FreeText,
                    "должность",
                ),
                col(
                    "salary",
                    DomainType::Decimal { precision: 10, scale: 2 },
                    true,
                    SemanticRole::NumericMeasure {
                        min: config.min_salary,
                        max: config.max_salary,
                    },
                    "зарплата в рублях",
                ),
                col("hire_date", DomainType::Date, true, SemanticRole::Date, "дата приема"),
                col("email", DomainType::Varchar(100), true, SemanticRole::FreeText, "email"),
            ],
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Valid values of the department column.
    pub fn departments(&self) -> &[String] {
        self.columns
            .iter()
            .find_map(|c| match &c.semantic_role {
                SemanticRole::DepartmentEnum(values) => Some(values.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Columns returned by row-listing queries.
    pub fn projection(&self) -> &'static str {
        "first_name, last_name, position, department, salary"
    }

    /// Render the schema as prompt text for the generative model.
    pub fn describe(&self) -> String {
        let mut out = format!("Table \"{}\":\n", self.table_name);
        for c in &self.columns {
            out.push_str(&format!("- {} ({}", c.name, c.domain_type));
            if matches!(c.semantic_role, SemanticRole::Identifier) {
                out.push_str(", PRIMARY KEY");
            } else if !c.nullable {
                out.push_str(", NOT NULL");
            }
            out.push_str(&format!(") - {}", c.label));
            match &c.semantic_role {
                SemanticRole::DepartmentEnum(values) => {
                    let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
                    out.push_str(&format!(": {}", quoted.join(", ")));
                }
                SemanticRole::NumericMeasure { min, max } => {
                    out.push_str(&format!(", from {} to {}", min, max));
                }
                _ => {}
            }
            out.push('\n');
        }
        out.push_str("Filter departments with department = '<name>'. Compare salary with >, <, =.\n");
        out
    }
}
