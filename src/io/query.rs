//! Filter expressions evaluated by the bundled stores.
//!
//! Supported terms: `+tag`, `-tag`, virtual tags, `project:`, `status:`,
//! `description:`, `priority:`, `due:`, `uuid:a,b`, and bare words matched
//! against the description. Terms combine with `and`, `or` and parentheses;
//! adjacent terms are joined with an implicit `and`.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

use crate::io::store::StoreError;
use crate::model::record::{Priority, Record, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Tag { name: String, present: bool },
    Virtual { tag: VirtualTag, present: bool },
    Project(Option<String>),
    Status(Status),
    Description(String),
    Priority(Option<Priority>),
    Due(Option<String>),
    Uuid(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VirtualTag {
    Pending,
    Completed,
    Deleted,
    Waiting,
    Active,
    Parent,
    Tagged,
    Blocked,
    Blocking,
    Project,
    Priority,
    Due,
}

impl VirtualTag {
    fn parse(name: &str) -> Option<VirtualTag> {
        Some(match name {
            "PENDING" => VirtualTag::Pending,
            "COMPLETED" => VirtualTag::Completed,
            "DELETED" => VirtualTag::Deleted,
            "WAITING" => VirtualTag::Waiting,
            "ACTIVE" => VirtualTag::Active,
            "PARENT" => VirtualTag::Parent,
            "TAGGED" => VirtualTag::Tagged,
            "BLOCKED" => VirtualTag::Blocked,
            "BLOCKING" => VirtualTag::Blocking,
            "PROJECT" => VirtualTag::Project,
            "PRIORITY" => VirtualTag::Priority,
            "DUE" => VirtualTag::Due,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    All,
    Term(Term),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A parsed filter, ready to be matched against records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    expr: Expr,
}

/// Everything a term may need to look at besides the record itself
pub struct QueryContext<'a> {
    pub records: &'a IndexMap<String, Record>,
    pub now: DateTime<Utc>,
}

impl Query {
    pub fn parse(tokens: &[String]) -> Result<Query, StoreError> {
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or_expr()?;
        if let Some(extra) = parser.peek() {
            return Err(StoreError::Query(format!("unexpected '{}'", extra)));
        }
        Ok(Query { expr })
    }

    pub fn matches(&self, record: &Record, ctx: &QueryContext<'_>) -> bool {
        eval(&self.expr, record, ctx)
    }
}

struct Parser<'t> {
    tokens: &'t [String],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<&'t str> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Expr, StoreError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some("or") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, StoreError> {
        let mut left = Expr::All;
        loop {
            match self.peek() {
                None | Some(")") | Some("or") => break,
                Some("and") => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => {
                    let right = self.unary()?;
                    left = match left {
                        Expr::All => right,
                        other => Expr::And(Box::new(other), Box::new(right)),
                    };
                }
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, StoreError> {
        match self.next() {
            Some("(") => {
                let inner = self.or_expr()?;
                if self.next() != Some(")") {
                    return Err(StoreError::Query("missing ')'".into()));
                }
                Ok(inner)
            }
            Some(token) => parse_term(token).map(Expr::Term),
            None => Err(StoreError::Query("unexpected end of filter".into())),
        }
    }
}

fn parse_term(token: &str) -> Result<Term, StoreError> {
    if let Some(rest) = token.strip_prefix('+').or_else(|| token.strip_prefix('-'))
        && !rest.is_empty()
    {
        let present = token.starts_with('+');
        if let Some(tag) = VirtualTag::parse(rest) {
            return Ok(Term::Virtual { tag, present });
        }
        if crate::parse::modstring::is_virtual_tag(rest) {
            return Err(StoreError::Query(format!("unsupported virtual tag {}", rest)));
        }
        return Ok(Term::Tag {
            name: rest.to_string(),
            present,
        });
    }

    if let Some((key, value)) = token.split_once(':')
        && !key.is_empty()
        && key.chars().all(char::is_alphabetic)
    {
        let value = (!value.is_empty()).then(|| value.to_string());
        return match key {
            "project" | "proj" | "pro" => Ok(Term::Project(value)),
            "status" => value
                .as_deref()
                .and_then(Status::parse)
                .map(Term::Status)
                .ok_or_else(|| StoreError::Query(format!("invalid status in {}", token))),
            "description" | "desc" => Ok(Term::Description(value.unwrap_or_default())),
            "priority" | "prio" | "pri" => match value.as_deref() {
                None => Ok(Term::Priority(None)),
                Some(code) => Priority::from_code(code)
                    .map(|p| Term::Priority(Some(p)))
                    .ok_or_else(|| StoreError::Query(format!("invalid priority in {}", token))),
            },
            "due" => Ok(Term::Due(value)),
            "uuid" => Ok(Term::Uuid(
                value
                    .unwrap_or_default()
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_ascii_lowercase())
                    .collect(),
            )),
            other => Err(StoreError::Query(format!("unsupported attribute {}", other))),
        };
    }

    Ok(Term::Description(token.to_string()))
}

fn eval(expr: &Expr, record: &Record, ctx: &QueryContext<'_>) -> bool {
    match expr {
        Expr::All => true,
        Expr::Term(term) => eval_term(term, record, ctx),
        Expr::And(a, b) => eval(a, record, ctx) && eval(b, record, ctx),
        Expr::Or(a, b) => eval(a, record, ctx) || eval(b, record, ctx),
    }
}

fn eval_term(term: &Term, record: &Record, ctx: &QueryContext<'_>) -> bool {
    match term {
        Term::Tag { name, present } => record.tags.contains(name) == *present,
        Term::Virtual { tag, present } => eval_virtual(*tag, record, ctx) == *present,
        Term::Project(None) => record.project.is_none(),
        Term::Project(Some(project)) => record.project.as_deref().is_some_and(|p| {
            p == project
                || p.strip_prefix(project.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        }),
        Term::Status(status) => record.status == *status,
        Term::Description(needle) => record
            .description
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        Term::Priority(priority) => record.priority == *priority,
        Term::Due(None) => record.due.is_none(),
        Term::Due(Some(text)) => record.due.is_some()
            && crate::parse::parse_due(text).is_some_and(|due| record.due == Some(due)),
        Term::Uuid(prefixes) => record.identifier.as_deref().is_some_and(|id| {
            let id = id.to_ascii_lowercase();
            prefixes.iter().any(|p| id.starts_with(p.as_str()))
        }),
    }
}

fn eval_virtual(tag: VirtualTag, record: &Record, ctx: &QueryContext<'_>) -> bool {
    match tag {
        VirtualTag::Pending => record.status == Status::Pending,
        VirtualTag::Completed => record.status == Status::Completed,
        VirtualTag::Deleted => record.status == Status::Deleted,
        VirtualTag::Waiting => record.status == Status::Waiting,
        VirtualTag::Active => record.is_active(),
        VirtualTag::Parent => record.status == Status::Recurring,
        VirtualTag::Tagged => !record.tags.is_empty(),
        VirtualTag::Project => record.project.is_some(),
        VirtualTag::Priority => record.priority.is_some(),
        VirtualTag::Due => record
            .due
            .is_some_and(|due| due.and_utc() <= ctx.now + Duration::days(7)),
        VirtualTag::Blocked => record.depends.iter().any(|dep| {
            ctx.records
                .get(dep)
                .is_some_and(|d| matches!(d.status, Status::Pending | Status::Waiting))
        }),
        VirtualTag::Blocking => {
            let Some(id) = record.identifier.as_deref() else {
                return false;
            };
            matches!(record.status, Status::Pending | Status::Waiting)
                && ctx
                    .records
                    .values()
                    .any(|r| r.status == Status::Pending && r.depends.contains(id))
        }
    }
}
