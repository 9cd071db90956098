//! Query and argument types
//!
//! A [`Query`] pairs raw SQL with a short name used in logs and errors.
//! [`Args`] collects positional (`$1`, `$2`, ...) arguments.

use sqlx::postgres::PgArguments;
use sqlx::{Arguments, Encode, Postgres, Type};

use crate::errors::DbError;

/// Named SQL statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    name: String,
    raw: String,
}

impl Query {
    pub fn new(name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw: raw.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Positional query arguments.
///
/// Values are encoded as they are bound; the first encoding failure is kept
/// and reported when the query runs.
#[derive(Default)]
pub struct Args {
    inner: PgArguments,
    len: usize,
    error: Option<String>,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("len", &self.len)
            .field("error", &self.error)
            .finish()
    }
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the next positional argument
    pub fn bind<'q, T>(mut self, value: T) -> Self
    where
        T: 'q + Encode<'q, Postgres> + Type<Postgres>,
    {
        if self.error.is_none() {
            if let Err(err) = self.inner.add(value) {
                self.error = Some(format!("argument ${}: {}", self.len + 1, err));
            }
        }
        self.len += 1;
        self
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn into_arguments(self, query: &Query) -> Result<PgArguments, DbError> {
        match self.error {
            Some(message) => Err(DbError::InvalidArgument {
                query: query.name().to_string(),
                message,
            }),
            None => Ok(self.inner),
        }
    }
}

/// Build [`Args`] from a list of values: `args![user_id, "active"]`
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::new()$(.bind($value))+
    };
}
