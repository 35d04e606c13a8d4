//! The statements of the postgres store, rendered through [Display].

use std::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use itertools::Itertools;

/// A double-quoted identifier, with embedded quotes doubled.
pub struct Ident<'a>(pub &'a str);

impl Display for Ident<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.replace('"', "\"\""))
    }
}

#[derive(Clone, Copy)]
pub struct Table<'a> {
    pub schema: &'a str,
    pub name: &'a str,
}

impl Display for Table<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", Ident(self.schema), Ident(self.name))
    }
}

pub struct Select<'a> {
    pub columns: Vec<Expr<'a>>,
    pub from: Table<'a>,
    pub filter: Option<Expr<'a>>,
}

impl Display for Select<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.columns.iter().format(","), self.from)?;

        match &self.filter {
            Some(filter) => write!(f, " WHERE {filter}"),
            None => Ok(()),
        }
    }
}

/// `INSERT .. ON CONFLICT (key) DO UPDATE SET .. RETURNING ..` of a single row.
pub struct Upsert<'a> {
    pub into: Table<'a>,
    pub columns: &'a [&'a str],
    /// One per column.
    pub values: Vec<Expr<'a>>,
    pub key: &'a str,
    pub set: Vec<(&'a str, Expr<'a>)>,
    pub returning: Expr<'a>,
}

impl Display for Upsert<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let columns = self.columns.iter().map(|column| Ident(column));
        let set = self
            .set
            .iter()
            .map(|(column, value)| format!("{}={value}", Ident(column)));

        write!(
            f,
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING {}",
            self.into,
            columns.format(","),
            self.values.iter().format(","),
            Ident(self.key),
            set.format(","),
            self.returning,
        )
    }
}

/// Bounds every following statement of the current transaction.
pub struct StatementTimeout(pub Duration);

impl Display for StatementTimeout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SET LOCAL statement_timeout = {}", self.0.as_millis().max(1))
    }
}

pub enum Expr<'a> {
    Column(&'a str),
    /// The row proposed for insertion, inside `DO UPDATE`.
    Excluded(&'a str),
    /// Zero-based, rendered one-based.
    Param(usize),
    Cast(Box<Expr<'a>>, &'a str),
    Eq(Box<Expr<'a>>, Box<Expr<'a>>),
    Int(i32),
    Now,
    CountAll,
}

impl<'a> Expr<'a> {
    pub fn cast(self, ty: &'a str) -> Self {
        Self::Cast(Box::new(self), ty)
    }

    pub fn eq(self, other: Self) -> Self {
        Self::Eq(Box::new(self), Box::new(other))
    }
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(column) => Ident(column).fmt(f),
            Self::Excluded(column) => write!(f, "EXCLUDED.{}", Ident(column)),
            Self::Param(index) => write!(f, "${}", index + 1),
            Self::Cast(expr, ty) => write!(f, "{expr}::{ty}"),
            Self::Eq(left, right) => write!(f, "({left}={right})"),
            Self::Int(value) => value.fmt(f),
            Self::Now => f.write_str("now()"),
            Self::CountAll => f.write_str("count(*)"),
        }
    }
}
