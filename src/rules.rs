//! Deterministic rule translator.
//!
//! Recognises a fixed set of question patterns (listing, filtering, sorting,
//! counting, aggregating) and fills SQL templates. Rules live in an ordered
//! table and the first rule whose predicate holds produces the statement.
//!
//! ```text
//! "Зарплата больше 150000"
//!   features: terms=[больше, зарплат] comparison=> numerals=[150000]
//!   rule:     salary
//!   sql:      SELECT first_name, ... FROM employees WHERE salary > 150000;
//! ```

use crate::schema::{self, SchemaDescriptor};
use nom::{
    branch::alt,
    character::complete::{anychar, digit1},
    combinator::{map, value},
    multi::many0,
    IResult,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type Entities = BTreeMap<String, Value>;

const GREATER: &[&str] = &["больше", "выше", "свыше"];
const LESS: &[&str] = &["меньше", "ниже", "менее"];
const EQUAL: &[&str] = &["равно", "равен"];
const RANGE_FROM: &str = "от";
const RANGE_TO: &str = "до";
const ALL: &[&str] = &["все"];
const EMPLOYEE: &[&str] = &["сотрудник"];
const SALARY: &[&str] = &["зарплат", "оклад", "доход"];
const AVERAGE: &[&str] = &["средн"];
const DEPARTMENT_IT: &[&str] = &["ит", "it"];
const MANAGER: &[&str] = &["менеджер"];
const SORT: &[&str] = &["сортир", "упорядоч"];
const DESCENDING: &[&str] = &["убыван"];
const SURNAME: &[&str] = &["фамили"];
const COUNT: &[&str] = &["сколько", "количеств"];

/// Every stem reported in `matched_terms`, in reporting order.
const LEXICON: &[&[&str]] = &[
    GREATER,
    LESS,
    EQUAL,
    ALL,
    EMPLOYEE,
    SALARY,
    AVERAGE,
    DEPARTMENT_IT,
    MANAGER,
    SORT,
    DESCENDING,
    SURNAME,
    COUNT,
];

const MANAGER_PATTERN: &str = "%менеджер%";

/// Comparison detected from the question wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    Less,
    Equal,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Greater => ">",
            Comparison::Less => "<",
            Comparison::Equal => "=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Lexical features of one question.
#[derive(Debug, Clone)]
pub struct QueryFeatures {
    lowered: String,
    pub numerals: Vec<String>,
    pub comparison: Option<Comparison>,
    pub terms: Vec<String>,
}

impl QueryFeatures {
    pub fn extract(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let numerals = numerals(text);

        let has = |stems: &[&str]| stems.iter().any(|s| lowered.contains(s));
        let comparison = if has(GREATER) {
            Some(Comparison::Greater)
        } else if has(LESS) {
            Some(Comparison::Less)
        } else if has(EQUAL) {
            Some(Comparison::Equal)
        } else {
            None
        };

        let terms = LEXICON
            .iter()
            .flat_map(|group| group.iter())
            .filter(|stem| lowered.contains(**stem))
            .map(|stem| stem.to_string())
            .collect();

        Self {
            lowered,
            numerals,
            comparison,
            terms,
        }
    }

    fn has(&self, stems: &[&str]) -> bool {
        stems.iter().any(|s| self.lowered.contains(s))
    }

    /// First numeral, the operand of a single comparison.
    pub fn amount(&self) -> Option<&str> {
        self.numerals.first().map(String::as_str)
    }

    /// Comparison together with its operand. A comparison word without a
    /// numeral yields nothing.
    pub fn salary_comparison(&self) -> Option<(Comparison, &str)> {
        Some((self.comparison?, self.amount()?))
    }

    /// `от X до Y` bounds. Needs two numerals and no comparison word.
    pub fn range(&self) -> Option<(&str, &str)> {
        if self.comparison.is_some()
            || !self.lowered.contains(RANGE_FROM)
            || !self.lowered.contains(RANGE_TO)
        {
            return None;
        }
        match self.numerals.as_slice() {
            [low, high, ..] => Some((low.as_str(), high.as_str())),
            _ => None,
        }
    }
}

/// Digit runs in order of appearance.
fn numerals(text: &str) -> Vec<String> {
    scan_numerals(text)
        .map(|(_, found)| found.into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

fn scan_numerals(input: &str) -> IResult<&str, Vec<&str>> {
    let (rest, tokens) = many0(alt((map(digit1, Some), value(None, anychar))))(input)?;
    Ok((rest, tokens.into_iter().flatten().collect()))
}

type Predicate = fn(&QueryFeatures) -> bool;
type Builder = fn(&QueryFeatures, &SchemaDescriptor, &mut Entities) -> String;

/// One intent category: when it applies and how it renders.
pub struct Rule {
    pub name: &'static str,
    applies: Predicate,
    build: Builder,
}

fn is_range(f: &QueryFeatures) -> bool {
    f.range().is_some()
}

fn is_all_employees(f: &QueryFeatures) -> bool {
    f.has(ALL) && f.has(EMPLOYEE)
}

fn is_sort(f: &QueryFeatures) -> bool {
    f.has(SORT) && (f.has(SALARY) || f.has(SURNAME))
}

fn is_salary(f: &QueryFeatures) -> bool {
    f.has(SALARY)
}

fn is_count(f: &QueryFeatures) -> bool {
    f.has(COUNT)
}

fn is_department(f: &QueryFeatures) -> bool {
    f.has(DEPARTMENT_IT)
}

fn is_role(f: &QueryFeatures) -> bool {
    f.has(MANAGER)
}

/// Rules in priority order. Count precedes the department and role filters
/// so a counting question about IT yields a count.
static RULES: &[Rule] = &[
    Rule {
        name: "range",
        applies: is_range,
        build: build_range,
    },
    Rule {
        name: "all_employees",
        applies: is_all_employees,
        build: build_all_employees,
    },
    Rule {
        name: "sort",
        applies: is_sort,
        build: build_sort,
    },
    Rule {
        name: "salary",
        applies: is_salary,
        build: build_salary,
    },
    Rule {
        name: "count",
        applies: is_count,
        build: build_count,
    },
    Rule {
        name: "department",
        applies: is_department,
        build: build_department,
    },
    Rule {
        name: "role",
        applies: is_role,
        build: build_role,
    },
];

/// Name reported when no rule matches.
pub const FALLBACK_RULE: &str = "fallback";

/// Names of the rules in evaluation order, fallback last.
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|r| r.name).chain([FALLBACK_RULE]).collect()
}

fn record_comparison(entities: &mut Entities, op: Comparison, amount: &str) {
    entities.insert("comparison".to_string(), Value::from(op.as_sql()));
    entities.insert("amount".to_string(), numeral_value(amount));
}

fn numeral_value(n: &str) -> Value {
    n.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::from(n))
}

fn salary_clause(f: &QueryFeatures, entities: &mut Entities) -> Option<String> {
    let (op, amount) = f.salary_comparison()?;
    record_comparison(entities, op, amount);
    Some(format!("salary {} {}", op, amount))
}

fn build_range(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    let (low, high) = f.range().unwrap_or(("0", "0"));
    e.insert("range".to_string(), Value::from(vec![numeral_value(low), numeral_value(high)]));
    format!(
        "SELECT {} FROM {} WHERE salary BETWEEN {} AND {};",
        s.projection(),
        s.table_name,
        low,
        high
    )
}

fn build_all_employees(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    match salary_clause(f, e) {
        Some(clause) => format!(
            "SELECT {} FROM {} WHERE {};",
            s.projection(),
            s.table_name,
            clause
        ),
        None => format!("SELECT * FROM {};", s.table_name),
    }
}

fn build_sort(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    let order = if f.has(SALARY) {
        let dir = if f.has(DESCENDING) { "DESC" } else { "ASC" };
        format!("salary {}", dir)
    } else {
        "last_name ASC".to_string()
    };
    e.insert("order_by".to_string(), Value::from(order.as_str()));
    format!("SELECT {} FROM {} ORDER BY {};", s.projection(), s.table_name, order)
}

fn build_salary(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    if let Some(clause) = salary_clause(f, e) {
        format!("SELECT {} FROM {} WHERE {};", s.projection(), s.table_name, clause)
    } else if f.has(AVERAGE) {
        e.insert("aggregate".to_string(), Value::from("avg"));
        format!("SELECT AVG(salary) as avg_salary FROM {};", s.table_name)
    } else {
        e.insert("order_by".to_string(), Value::from("salary DESC"));
        format!(
            "SELECT {} FROM {} ORDER BY salary DESC LIMIT 10;",
            s.projection(),
            s.table_name
        )
    }
}

fn build_count(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    e.insert("aggregate".to_string(), Value::from("count"));
    let filter = if f.has(DEPARTMENT_IT) {
        e.insert("department".to_string(), Value::from("IT"));
        " WHERE department = 'IT'".to_string()
    } else if f.has(MANAGER) {
        e.insert("position".to_string(), Value::from("менеджер"));
        format!(" WHERE position ILIKE '{}'", MANAGER_PATTERN)
    } else {
        String::new()
    };
    format!("SELECT COUNT(*) as count FROM {}{};", s.table_name, filter)
}

fn salary_suffix(f: &QueryFeatures, e: &mut Entities) -> String {
    if !f.has(SALARY) {
        return String::new();
    }
    salary_clause(f, e)
        .map(|clause| format!(" AND {}", clause))
        .unwrap_or_default()
}

fn build_department(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    e.insert("department".to_string(), Value::from("IT"));
    format!(
        "SELECT {} FROM {} WHERE department = 'IT'{};",
        s.projection(),
        s.table_name,
        salary_suffix(f, e)
    )
}

fn build_role(f: &QueryFeatures, s: &SchemaDescriptor, e: &mut Entities) -> String {
    e.insert("position".to_string(), Value::from("менеджер"));
    format!(
        "SELECT {} FROM {} WHERE position ILIKE '{}'{};",
        s.projection(),
        s.table_name,
        MANAGER_PATTERN,
        salary_suffix(f, e)
    )
}

fn build_fallback(s: &SchemaDescriptor) -> String {
    format!("SELECT {} FROM {} LIMIT 10;", s.projection(), s.table_name)
}

/// Outcome of rule translation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub sql: String,
    pub rule: &'static str,
    pub entities: Entities,
    pub matched_terms: Vec<String>,
}

/// Rule translator bound to a schema.
#[derive(Debug, Clone, Copy)]
pub struct RuleTranslator<'a> {
    schema: &'a SchemaDescriptor,
}

impl Default for RuleTranslator<'static> {
    fn default() -> Self {
        Self::new(schema::employees())
    }
}

impl<'a> RuleTranslator<'a> {
    pub fn new(schema: &'a SchemaDescriptor) -> Self {
        Self { schema }
    }

    /// Translate `text`. Always returns a single read-only statement.
    pub fn translate(&self, text: &str) -> RuleMatch {
        let features = QueryFeatures::extract(text);
        let mut entities = Entities::new();

        let (rule, sql) = match RULES.iter().find(|r| (r.applies)(&features)) {
            Some(r) => (r.name, (r.build)(&features, self.schema, &mut entities)),
            None => (FALLBACK_RULE, build_fallback(self.schema)),
        };

        RuleMatch {
            sql,
            rule,
            entities,
            matched_terms: features.terms,
        }
    }
}

/// Translate with the default employee schema, returning only the SQL.
pub fn translate_by_rules(text: &str) -> String {
    RuleTranslator::default().translate(text).sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROJ: &str = "SELECT first_name, last_name, position, department, salary FROM employees";

    #[test]
    fn test_all_employees() {
        assert_eq!(translate_by_rules("Показать всех сотрудников"), "SELECT * FROM employees;");
    }

    #[test]
    fn test_all_employees_with_salary_filter() {
        assert_eq!(
            translate_by_rules("Все сотрудники с зарплатой меньше 150000"),
            format!("{} WHERE salary < 150000;", PROJ)
        );
    }

    #[test]
    fn test_salary_greater() {
        assert_eq!(
            translate_by_rules("Зарплата больше 150000"),
            format!("{} WHERE salary > 150000;", PROJ)
        );
    }

    #[test]
    fn test_salary_average() {
        assert_eq!(
            translate_by_rules("Средняя зарплата"),
            "SELECT AVG(salary) as avg_salary FROM employees;"
        );
    }

    #[test]
    fn test_salary_default_top_ten() {
        assert_eq!(
            translate_by_rules("Покажи оклады"),
            format!("{} ORDER BY salary DESC LIMIT 10;", PROJ)
        );
    }

    #[test]
    fn test_count_it() {
        assert_eq!(
            translate_by_rules("Сколько сотрудников в ИТ"),
            "SELECT COUNT(*) as count FROM employees WHERE department = 'IT';"
        );
    }

    #[test]
    fn test_count_managers_and_total() {
        assert_eq!(
            translate_by_rules("Количество менеджеров"),
            "SELECT COUNT(*) as count FROM employees WHERE position ILIKE '%менеджер%';"
        );
        assert_eq!(translate_by_rules("Сколько людей"), "SELECT COUNT(*) as count FROM employees;");
    }

    #[test]
    fn test_department_it() {
        assert_eq!(
            translate_by_rules("Сотрудники IT отдела"),
            format!("{} WHERE department = 'IT';", PROJ)
        );
    }

    #[test]
    fn test_role_manager() {
        assert_eq!(
            translate_by_rules("Найти менеджеров"),
            format!("{} WHERE position ILIKE '%менеджер%';", PROJ)
        );
    }

    #[test]
    fn test_sort_by_salary_descending() {
        assert_eq!(
            translate_by_rules("Сортировать по зарплате по убыванию"),
            format!("{} ORDER BY salary DESC;", PROJ)
        );
        assert_eq!(
            translate_by_rules("Упорядочить по зарплате"),
            format!("{} ORDER BY salary ASC;", PROJ)
        );
    }

    #[test]
    fn test_sort_by_surname() {
        assert_eq!(
            translate_by_rules("Сортировка по фамилии"),
            format!("{} ORDER BY last_name ASC;", PROJ)
        );
    }

    #[test]
    fn test_range() {
        assert_eq!(
            translate_by_rules("Зарплата от 100000 до 200000"),
            format!("{} WHERE salary BETWEEN 100000 AND 200000;", PROJ)
        );
    }

    #[test]
    fn test_range_needs_two_numerals() {
        let sql = translate_by_rules("зарплата от 100");
        assert!(!sql.contains("BETWEEN"));
        assert_eq!(sql, format!("{} ORDER BY salary DESC LIMIT 10;", PROJ));

        let sql = translate_by_rules("зарплата от 100 до");
        assert!(!sql.contains("BETWEEN"));
    }

    #[test]
    fn test_comparison_without_amount_skips_filter() {
        assert_eq!(
            translate_by_rules("зарплата больше чем у всех"),
            format!("{} ORDER BY salary DESC LIMIT 10;", PROJ)
        );
    }

    #[test]
    fn test_fallback() {
        assert_eq!(translate_by_rules("привет"), format!("{} LIMIT 10;", PROJ));
        assert_eq!(translate_by_rules(""), format!("{} LIMIT 10;", PROJ));
    }

    #[test]
    fn test_idempotent() {
        let q = "Менеджеры с зарплатой выше 90000";
        assert_eq!(translate_by_rules(q), translate_by_rules(q));
    }

    #[test]
    fn test_entities_and_terms() {
        let m = RuleTranslator::default().translate("Менеджеры с зарплатой выше 90000");
        assert_eq!(m.rule, "salary");
        assert_eq!(m.entities.get("comparison"), Some(&Value::from(">")));
        assert_eq!(m.entities.get("amount"), Some(&Value::from(90000u64)));
        assert_eq!(m.matched_terms, vec!["выше", "зарплат", "менеджер"]);
    }

    #[test]
    fn test_numerals_in_order() {
        assert_eq!(numerals("от 10 до 2000, а не 7"), vec!["10", "2000", "7"]);
        assert!(numerals("без чисел").is_empty());
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            rule_names(),
            vec![
                "range",
                "all_employees",
                "sort",
                "salary",
                "count",
                "department",
                "role",
                "fallback"
            ]
        );
    }

    #[test]
    fn test_every_output_is_one_select() {
        let inputs = [
            "",
            "   ",
            "DROP TABLE employees",
            "ит менеджер зарплата больше 5",
            "от 1 до 2 до 3",
            "сколько сортировать фамилии",
            "12345",
        ];
        for input in inputs {
            let sql = translate_by_rules(input);
            assert!(sql.trim().to_uppercase().starts_with("SELECT"), "{}", sql);
            assert!(sql.ends_with(';'), "{}", sql);
            assert_eq!(sql.matches(';').count(), 1, "{}", sql);
        }
    }
}
