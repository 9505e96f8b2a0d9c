//! Text ⇄ structured conversion services (comm2study / study2comm).
//!
//! The history never parses command files itself. It exchanges a neutral
//! `Statement` list with a `StudyConverter` and resolves names to node ids on
//! its own side.

mod lexer;
mod parser;
mod render;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;

use crate::core::ConversionError;

/// Expression on the right-hand side of a keyword or assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<Expr>),
    Block(IndexMap<String, Expr>),
    /// Reference to a previously bound name.
    Name(String),
}

impl Expr {
    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Name(name) => out.push(name),
            Expr::List(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
            Expr::Block(keywords) => {
                for value in keywords.values() {
                    value.collect_names(out);
                }
            }
            Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::Text(_) => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatementBody {
    Call {
        title: String,
        keywords: IndexMap<String, Expr>,
    },
    Assign(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    /// Bound result name; `None` for bare calls.
    pub name: Option<String>,
    pub body: StatementBody,
    pub active: bool,
    /// Comment lines directly above the statement.
    pub comment: Option<String>,
    /// First source line, 1-based. Zero when built programmatically.
    pub line: usize,
}

impl Statement {
    pub fn call(name: Option<&str>, title: &str, keywords: IndexMap<String, Expr>) -> Self {
        Self {
            name: name.map(str::to_string),
            body: StatementBody::Call {
                title: title.to_string(),
                keywords,
            },
            active: true,
            comment: None,
            line: 0,
        }
    }

    pub fn assign(name: &str, value: Expr) -> Self {
        Self {
            name: Some(name.to_string()),
            body: StatementBody::Assign(value),
            active: true,
            comment: None,
            line: 0,
        }
    }

    /// Names referenced by the statement, in source order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match &self.body {
            StatementBody::Call { keywords, .. } => {
                for value in keywords.values() {
                    value.collect_names(&mut out);
                }
            }
            StatementBody::Assign(value) => value.collect_names(&mut out),
        }
        out
    }
}

pub trait StudyConverter: Send + Sync + fmt::Debug {
    /// comm2study: source text to statements.
    fn parse(&self, text: &str) -> Result<Vec<Statement>, ConversionError>;

    /// study2comm: statements to canonical source text.
    fn render(&self, statements: &[Statement], sort: bool) -> String;
}

/// Converter for the keyword-call subset of the command language.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleConverter;

impl StudyConverter for SimpleConverter {
    fn parse(&self, text: &str) -> Result<Vec<Statement>, ConversionError> {
        parser::parse(text)
    }

    fn render(&self, statements: &[Statement], sort: bool) -> String {
        if sort {
            let order = topological_order(statements);
            let sorted: Vec<Statement> = order.into_iter().map(|i| statements[i].clone()).collect();
            render::render(&sorted)
        } else {
            render::render(statements)
        }
    }
}

/// Stable topological order of statements by name references. Statements
/// caught in a cycle keep their relative order at the end.
pub fn topological_order(statements: &[Statement]) -> Vec<usize> {
    let mut binders: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, stmt) in statements.iter().enumerate() {
        if let Some(name) = stmt.name.as_deref() {
            binders.entry(name).or_default().push(index);
        }
    }
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); statements.len()];
    for (index, stmt) in statements.iter().enumerate() {
        for name in stmt.names() {
            let Some(candidates) = binders.get(name) else {
                continue;
            };
            // Prefer the closest earlier binding, else the first later one.
            let target = candidates
                .iter()
                .rev()
                .find(|&&c| c < index)
                .or_else(|| candidates.iter().find(|&&c| c > index));
            if let Some(&target) = target {
                deps[index].insert(target);
            }
        }
    }
    let mut indegree: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..statements.len())
        .filter(|&i| indegree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(statements.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for (index, dep) in deps.iter().enumerate() {
            if dep.contains(&next) {
                indegree[index] -= 1;
                if indegree[index] == 0 {
                    ready.insert(index);
                }
            }
        }
    }
    if order.len() < statements.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        order.extend((0..statements.len()).filter(|i| !placed.contains(i)));
    }
    order
}
