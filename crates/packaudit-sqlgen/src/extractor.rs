//! SQL text extraction and normalization
//!
//! Works on the raw SQL found in package sources and on companion review
//! scripts. Everything here is text-level: no parsing beyond the regexes
//! the checks actually need.

use regex::Regex;
use std::sync::OnceLock;

fn table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:from|join|into|update|table)\s+((?:\[[^\]]+\]|[A-Za-z_][\w$#]*)(?:\.(?:\[[^\]]+\]|[A-Za-z_][\w$#]*))*)",
        )
        .expect("table pattern is valid")
    })
}

/// Extract referenced table names from a SQL text.
///
/// Targets of `FROM`, `JOIN`, `INTO`, `UPDATE`, and `TABLE` (the
/// `TRUNCATE TABLE`/`CREATE TABLE` forms), with bracketed and
/// dot-qualified identifiers kept intact. Original order, first occurrence
/// wins.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for caps in table_regex().captures_iter(sql) {
        if let Some(name) = caps.get(1) {
            let name = name.as_str();
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
                tables.push(name.to_string());
            }
        }
    }
    tables
}

fn is_delimiter(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '-')
}

fn is_use_statement(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower == "use" || lower.starts_with("use ")
}

/// Split a review script into named sections.
///
/// Sections are separated by `---` delimiter lines; the first comment line
/// after a delimiter names the section. `USE` statements are dropped from
/// section bodies so scripts compare the same across databases. Unnamed
/// leading text is ignored.
pub fn extract_sections(script: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut name: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    let mut flush = |name: &mut Option<String>, body: &mut Vec<&str>| {
        if let Some(n) = name.take() {
            let text = body.join("\n").trim().to_string();
            sections.push((n, text));
        }
        body.clear();
    };

    for line in script.lines() {
        let trimmed = line.trim();
        if is_delimiter(trimmed) {
            flush(&mut name, &mut body);
            continue;
        }
        if name.is_none() {
            if let Some(rest) = trimmed.strip_prefix("--") {
                let title = rest.trim();
                if !title.is_empty() {
                    name = Some(title.to_string());
                }
            }
            continue;
        }
        if is_use_statement(trimmed) {
            continue;
        }
        body.push(line);
    }
    flush(&mut name, &mut body);

    sections
}

/// Normalize SQL for comparison: drop `GO` separators and semicolons,
/// collapse whitespace, lowercase.
pub fn clean_sql(sql: &str) -> String {
    sql.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("go"))
        .collect::<Vec<_>>()
        .join(" ")
        .replace(';', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Token-level similarity of two SQL texts after cleaning, as a percentage.
pub fn similarity(a: &str, b: &str) -> f64 {
    let cleaned_a = clean_sql(a);
    let cleaned_b = clean_sql(b);
    if cleaned_a.is_empty() && cleaned_b.is_empty() {
        return 100.0;
    }
    if cleaned_a.is_empty() || cleaned_b.is_empty() {
        return 0.0;
    }

    let tokens_a: Vec<&str> = cleaned_a.split(' ').collect();
    let tokens_b: Vec<&str> = cleaned_b.split(' ').collect();

    let mut remaining: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for token in &tokens_b {
        *remaining.entry(token).or_default() += 1;
    }
    let mut common = 0usize;
    for token in &tokens_a {
        if let Some(count) = remaining.get_mut(token) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }

    200.0 * common as f64 / (tokens_a.len() + tokens_b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tables_come_out_in_order_without_duplicates() {
        let sql = "INSERT INTO dbo.DimCustomer (Id) \
                   SELECT c.Id FROM dbo.CustomerStage c \
                   JOIN dbo.DimCustomer d ON d.Id = c.Id";
        assert_eq!(
            extract_tables(sql),
            vec!["dbo.DimCustomer".to_string(), "dbo.CustomerStage".to_string()]
        );
    }

    #[test]
    fn truncate_table_targets_are_extracted() {
        let sql = "TRUNCATE TABLE dbo.CustomerStage;\nGO";
        assert_eq!(extract_tables(sql), vec!["dbo.CustomerStage".to_string()]);
    }

    #[test]
    fn bracketed_identifiers_survive_extraction() {
        let sql = "UPDATE [dbo].[Dim Customer] SET Name = 'x'";
        assert_eq!(extract_tables(sql), vec!["[dbo].[Dim Customer]".to_string()]);
    }

    #[test]
    fn sections_split_on_dashed_lines_and_drop_use() {
        let script = "\
preamble, no section yet
---
-- Truncate Stage
USE DW_Stage
GO
TRUNCATE TABLE dbo.CustomerStage;
---
-- Merge Warehouse
use DataWarehouse
MERGE INTO dbo.DimCustomer AS t USING dbo.CustomerStage AS s ON t.Id = s.Id;
";
        let sections = extract_sections(script);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "Truncate Stage");
        assert_eq!(sections[0].1, "GO\nTRUNCATE TABLE dbo.CustomerStage;");
        assert_eq!(sections[1].0, "Merge Warehouse");
        assert!(!sections[1].1.contains("DataWarehouse"));
    }

    #[test]
    fn clean_sql_normalizes_whitespace_case_and_separators() {
        let a = "SELECT  *\nFROM   dbo.Customer;\nGO\n";
        let b = "select * from dbo.customer";
        assert_eq!(clean_sql(a), clean_sql(b));
    }

    #[test]
    fn similarity_is_total_for_equivalent_texts() {
        let a = "SELECT Id FROM dbo.Customer;";
        let b = "select id\nfrom dbo.customer\nGO";
        assert_eq!(similarity(a, b), 100.0);
    }

    #[test]
    fn similarity_degrades_with_drift() {
        let a = "SELECT Id FROM dbo.Customer";
        let b = "SELECT Id FROM dbo.Address";
        let score = similarity(a, b);
        assert!(score > 50.0 && score < 100.0, "score = {score}");
    }
}
