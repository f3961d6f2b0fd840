//! Prompt assembly for SQL generation, question rewriting and chart
//! reasoning.

use askdata_core::{truncate_chars, ConversationTurn, ResultShape, SqlGenerationRequest};

/// System prompt for SQL generation. `{dialect}` is substituted.
pub const SQL_SYSTEM_PROMPT: &str = "You are an expert {dialect} analyst. \
Write exactly one read-only SQL query that answers the user's question using only \
the tables and columns described in the schema information. \
Never modify data or schema. \
Return only the SQL statement, with no explanation and no markdown.";

/// System prompt for question rewriting.
pub const REWRITE_SYSTEM_PROMPT: &str = "Given the conversation so far and a follow-up \
question, rewrite the follow-up as a standalone question that can be understood without \
the conversation. Resolve references such as \"that\", \"those\" or \"it\" using earlier \
turns. If the question is already standalone, return it unchanged. \
Return only the question.";

/// System prompt for chart reasoning.
pub const CHART_SYSTEM_PROMPT: &str = "You are a data visualization expert. \
In two sentences at most, explain what the recommended chart shows for the user's \
question and why it suits the data. Return plain text only.";

/// Characters of sample rows included in the chart prompt.
pub const CHART_SAMPLE_CHARS: usize = 2000;

/// Static context shared by every SQL prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub dialect: String,
    /// Overview of schemas and tables, included verbatim.
    pub schema_overview: Option<String>,
    /// Known join paths between tables, included verbatim.
    pub join_hints: Option<String>,
}

pub fn sql_system_prompt(dialect: &str) -> String {
    SQL_SYSTEM_PROMPT.replace("{dialect}", dialect)
}

/// Build the user prompt for one SQL attempt.
pub fn sql_user_prompt(ctx: &PromptContext, request: &SqlGenerationRequest<'_>) -> String {
    let mut prompt = format!("Database type: {}\n\n", ctx.dialect);

    if let Some(overview) = ctx.schema_overview.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("Schema overview:\n");
        prompt.push_str(overview.trim());
        prompt.push_str("\n\n");
    }

    prompt.push_str("Relevant tables and columns:\n");
    if request.schema.is_empty() {
        prompt.push_str("(no matching schema found; use the overview or state the closest possible query)\n");
    } else {
        prompt.push_str(&request.schema.render());
        prompt.push('\n');
    }
    prompt.push('\n');

    if let Some(joins) = ctx.join_hints.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("Join details:\n");
        prompt.push_str(joins.trim());
        prompt.push_str("\n\n");
    }

    if !request.prior_failures.is_empty() {
        prompt.push_str("Previous attempts failed. Fix these problems:\n");
        for (i, reason) in request.prior_failures.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, reason));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User question:\n{}\n\nSQL:", request.question.trim()));
    prompt
}

/// Build the rewrite prompt from prior turns, oldest first.
///
/// A turn with a blank question contributes only its answer.
pub fn rewrite_user_prompt(question: &str, turns: &[ConversationTurn]) -> String {
    let mut history = String::new();
    for turn in turns {
        if !turn.question.trim().is_empty() {
            history.push_str(&format!("User: {}\n", turn.question));
        }
        history.push_str(&format!("Assistant: {}\n", turn.answer_summary));
    }
    format!(
        "Conversation:\n{}\nFollow-up question:\n{}\n\nStandalone question:",
        history,
        question.trim()
    )
}

/// Build the chart reasoning prompt.
pub fn chart_user_prompt(shape: &ResultShape) -> String {
    let columns: Vec<String> = shape
        .columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.class))
        .collect();
    let sample = serde_json::to_string(&shape.sample).unwrap_or_default();

    format!(
        "User question:\n{}\n\nColumns: {}\nRows: {}\nRecommended chart: {}\n\nData sample:\n{}",
        shape.question.trim(),
        columns.join(", "),
        shape.row_count,
        shape.proposed,
        truncate_chars(&sample, CHART_SAMPLE_CHARS)
    )
}

/// Clean a rewritten question. Models sometimes echo the label.
pub fn clean_rewrite(raw: &str) -> String {
    let text = raw.trim();
    let text = text
        .strip_prefix("Standalone question:")
        .or_else(|| text.strip_prefix("Standalone Question:"))
        .unwrap_or(text);
    text.trim().trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdata_core::{ColumnClass, ColumnProfile, SchemaContext, SchemaFragment};

    fn ctx() -> PromptContext {
        PromptContext {
            dialect: "Redshift".into(),
            schema_overview: Some("fl_lms: loan tables".into()),
            join_hints: Some("loan_onboarding.loanid = accrual_balances.loanid".into()),
        }
    }

    #[test]
    fn test_sql_prompt_includes_all_context() {
        let schema = SchemaContext::new(vec![SchemaFragment {
            id: 1,
            table_name: "fl_lms.loan_onboarding".into(),
            description: "loanproductid, fundedamount".into(),
            relation_hints: vec![],
            score: 0.9,
        }]);
        let failures = vec!["disallowed operation: delete".to_string()];
        let request = SqlGenerationRequest {
            question: "total funded by product",
            schema: &schema,
            prior_failures: &failures,
            attempt: 2,
        };

        let prompt = sql_user_prompt(&ctx(), &request);
        assert!(prompt.contains("Database type: Redshift"));
        assert!(prompt.contains("Schema overview:\nfl_lms: loan tables"));
        assert!(prompt.contains("Table: fl_lms.loan_onboarding"));
        assert!(prompt.contains("Join details:"));
        assert!(prompt.contains("1. disallowed operation: delete"));
        assert!(prompt.ends_with("total funded by product\n\nSQL:"));
    }

    #[test]
    fn test_sql_prompt_without_schema_or_failures() {
        let schema = SchemaContext::default();
        let request = SqlGenerationRequest {
            question: "q",
            schema: &schema,
            prior_failures: &[],
            attempt: 1,
        };
        let prompt = sql_user_prompt(&PromptContext::default(), &request);
        assert!(prompt.contains("no matching schema found"));
        assert!(!prompt.contains("Previous attempts failed"));
    }

    #[test]
    fn test_system_prompt_names_dialect() {
        assert!(sql_system_prompt("Postgres").contains("expert Postgres analyst"));
    }

    #[test]
    fn test_rewrite_prompt_lists_turns_in_order() {
        let turns = vec![
            ConversationTurn::new("first", "SQL: A"),
            ConversationTurn::new("second", "SQL: B"),
        ];
        let prompt = rewrite_user_prompt("and that?", &turns);
        let first = prompt.find("User: first").unwrap();
        let second = prompt.find("User: second").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Assistant: SQL: B"));
        assert!(prompt.contains("Follow-up question:\nand that?"));
    }

    #[test]
    fn test_chart_prompt_describes_columns() {
        let shape = ResultShape {
            question: "q".into(),
            columns: vec![ColumnProfile {
                name: "total".into(),
                class: ColumnClass::Numeric,
                distinct: 2,
            }],
            row_count: 2,
            sample: vec![],
            proposed: "bar of total".into(),
        };
        let prompt = chart_user_prompt(&shape);
        assert!(prompt.contains("Columns: total (numeric)"));
        assert!(prompt.contains("Recommended chart: bar of total"));
    }

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(
            clean_rewrite("Standalone question: \"Show totals for 2025\""),
            "Show totals for 2025"
        );
        assert_eq!(clean_rewrite("  plain  "), "plain");
    }
}
