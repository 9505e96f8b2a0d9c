use indexmap::IndexMap;

use super::parser::INACTIVE_PREFIX;
use super::{Expr, Statement, StatementBody};

pub(crate) fn render(statements: &[Statement]) -> String {
    if statements.is_empty() {
        return String::new();
    }
    let blocks: Vec<String> = statements.iter().map(statement).collect();
    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

fn statement(stmt: &Statement) -> String {
    let mut lines: Vec<String> = Vec::new();
    if let Some(comment) = &stmt.comment {
        for line in comment.split('\n') {
            if line.is_empty() {
                lines.push("#".to_string());
            } else {
                lines.push(format!("# {line}"));
            }
        }
    }
    let code = match &stmt.body {
        StatementBody::Call { title, keywords } => call(stmt.name.as_deref(), title, keywords),
        StatementBody::Assign(value) => {
            format!("{} = {}", stmt.name.as_deref().unwrap_or("_"), expr(value))
        }
    };
    for line in code.lines() {
        if stmt.active {
            lines.push(line.to_string());
        } else {
            lines.push(format!("{INACTIVE_PREFIX} {line}"));
        }
    }
    lines.join("\n")
}

/// One keyword per line, aligned after the opening parenthesis.
fn call(name: Option<&str>, title: &str, keywords: &IndexMap<String, Expr>) -> String {
    let head = match name {
        Some(name) => format!("{name} = {title}("),
        None => format!("{title}("),
    };
    if keywords.is_empty() {
        return format!("{head})");
    }
    let indent = " ".repeat(head.chars().count());
    let args: Vec<String> = keywords
        .iter()
        .map(|(keyword, value)| format!("{keyword}={}", expr(value)))
        .collect();
    format!("{head}{})", args.join(&format!(",\n{indent}")))
}

fn expr(value: &Expr) -> String {
    match value {
        Expr::Int(v) => v.to_string(),
        Expr::Float(v) => format!("{v:?}"),
        Expr::Bool(true) => "True".to_string(),
        Expr::Bool(false) => "False".to_string(),
        Expr::Text(text) => quote(text),
        Expr::Name(name) => name.clone(),
        Expr::List(items) => match items.as_slice() {
            [] => "()".to_string(),
            [single] => format!("({},)", expr(single)),
            _ => {
                let inner: Vec<String> = items.iter().map(expr).collect();
                format!("({})", inner.join(", "))
            }
        },
        Expr::Block(keywords) => {
            let inner: Vec<String> = keywords
                .iter()
                .map(|(keyword, value)| format!("{keyword}={}", expr(value)))
                .collect();
            format!("_F({})", inner.join(", "))
        }
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
