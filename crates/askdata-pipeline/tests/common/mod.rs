//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use askdata_inference::mock::ScriptedGenerationClient;
use askdata_pipeline::{
    CancellationFlag, ColumnMeta, Error, ExecutionFailure, ExecutionFailureKind, MemoryTurnHistory,
    Pipeline, PipelineBuilder, PipelineConfig, QueryExecutor, Result, ResultSet, Row,
    SchemaContext, SchemaFragment, SchemaIndex,
};

pub const SQL_A: &str = "SELECT loanproductid, SUM(fundedamount) AS total_funded \
                         FROM fl_lms.loan_onboarding GROUP BY loanproductid";

pub const QUESTION_A: &str = "Show me total funded amount by loan product";

/// One scripted executor outcome.
#[derive(Debug, Clone)]
pub enum ExecReply {
    Rows(ResultSet),
    Fail(ExecutionFailure),
    Stall,
}

/// [`QueryExecutor`] that replays scripted outcomes and records statements.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    replies: Arc<Mutex<VecDeque<ExecReply>>>,
    fallback: Arc<Mutex<Option<ResultSet>>>,
    statements: Arc<Mutex<Vec<String>>>,
    cancel_on_run: Arc<Mutex<Option<CancellationFlag>>>,
    healthy: bool,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    pub fn with_rows(self, result: ResultSet) -> Self {
        self.with_reply(ExecReply::Rows(result))
    }

    pub fn with_failure(self, kind: ExecutionFailureKind, message: &str) -> Self {
        self.with_reply(ExecReply::Fail(ExecutionFailure::new(kind, message)))
    }

    pub fn with_reply(self, reply: ExecReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Result returned once the script is exhausted.
    pub fn with_fallback(self, result: ResultSet) -> Self {
        *self.fallback.lock().unwrap() = Some(result);
        self
    }

    /// Cancel `flag` whenever a statement runs.
    pub fn cancelling(self, flag: CancellationFlag) -> Self {
        *self.cancel_on_run.lock().unwrap() = Some(flag);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn run(&self, sql: &str) -> std::result::Result<ResultSet, ExecutionFailure> {
        self.statements.lock().unwrap().push(sql.to_string());
        if let Some(flag) = self.cancel_on_run.lock().unwrap().as_ref() {
            flag.cancel();
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(ExecReply::Rows(result)) => Ok(result),
            Some(ExecReply::Fail(failure)) => Err(failure),
            Some(ExecReply::Stall) => std::future::pending().await,
            None => self.fallback.lock().unwrap().clone().ok_or_else(|| {
                ExecutionFailure::new(ExecutionFailureKind::Other, "no scripted result")
            }),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.healthy)
    }
}

/// [`SchemaIndex`] returning a fixed context and recording queries.
#[derive(Clone, Default)]
pub struct StaticSchemaIndex {
    context: SchemaContext,
    queries: Arc<Mutex<Vec<String>>>,
    failing: bool,
    stall: bool,
}

impl StaticSchemaIndex {
    pub fn new(context: SchemaContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn stalling() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaIndex for StaticSchemaIndex {
    async fn search(&self, text: &str, k: usize) -> Result<SchemaContext> {
        self.queries.lock().unwrap().push(text.to_string());
        if self.stall {
            return std::future::pending().await;
        }
        if self.failing {
            return Err(Error::Search("index offline".to_string()));
        }
        let mut context = self.context.clone();
        context.fragments.truncate(k);
        Ok(context)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.failing)
    }
}

pub fn loan_schema() -> SchemaContext {
    SchemaContext::new(vec![SchemaFragment {
        id: 1,
        table_name: "fl_lms.loan_onboarding".to_string(),
        description: "loanid, loanproductid, fundedamount, fundeddate".to_string(),
        relation_hints: vec![],
        score: 0.92,
    }])
}

/// Build a result set from column specs and JSON object rows.
pub fn result_set(columns: &[(&str, &str)], rows: Vec<Value>) -> ResultSet {
    let columns = columns
        .iter()
        .map(|(name, ty)| ColumnMeta::new(*name, *ty))
        .collect();
    let rows = rows
        .into_iter()
        .map(|v| match v {
            Value::Object(map) => map,
            _ => Row::new(),
        })
        .collect();
    ResultSet::new(columns, rows)
}

pub fn funded_by_product() -> ResultSet {
    result_set(
        &[("loanproductid", "INT4"), ("total_funded", "NUMERIC")],
        vec![
            serde_json::json!({"loanproductid": 1, "total_funded": 125000.5}),
            serde_json::json!({"loanproductid": 2, "total_funded": 98000.25}),
        ],
    )
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig::default().with_step_timeout(Duration::from_secs(5))
}

/// Pipeline over scripted collaborators, returning the history handle too.
pub fn pipeline(
    client: &ScriptedGenerationClient,
    index: &StaticSchemaIndex,
    executor: &ScriptedExecutor,
    config: PipelineConfig,
) -> (Pipeline, MemoryTurnHistory) {
    let history = MemoryTurnHistory::new();
    let pipeline = PipelineBuilder::new(
        Arc::new(client.clone()),
        Arc::new(index.clone()),
        Arc::new(executor.clone()),
    )
    .with_config(config)
    .with_history(Arc::new(history.clone()))
    .build();
    (pipeline, history)
}
