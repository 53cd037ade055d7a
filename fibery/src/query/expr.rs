use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

/// Expression of the command api's predicate algebra.
///
/// Serializes to the api's array form: `["q/contains", ["Tasks/Name"], "$where0"]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field path starting at the queried database, e.g. `["Tasks/Project", "fibery/id"]`.
    Path(Vec<String>),
    /// Reference to a query parameter, e.g. `$where0`.
    Param(String),
    /// Operator applied to its arguments.
    Call {
        /// Operator name, e.g. `q/and` or `=`.
        op: &'static str,
        /// Operands.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Path of a single field.
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Path(vec![name.into()])
    }

    /// Path through a relation field to an attribute of its target.
    pub fn nested(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        Expr::Path(vec![field.into(), attribute.into()])
    }

    /// Parameter reference, `name` must carry its `$` prefix.
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    /// Operator call.
    pub fn call(op: &'static str, args: Vec<Expr>) -> Self {
        Expr::Call { op, args }
    }
}

impl Serialize for Expr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Expr::Path(segments) => segments.serialize(serializer),
            Expr::Param(name) => serializer.serialize_str(name),
            Expr::Call { op, args } => {
                let mut seq = serializer.serialize_seq(Some(args.len() + 1))?;
                seq.serialize_element(op)?;
                for arg in args {
                    seq.serialize_element(arg)?;
                }
                seq.end()
            }
        }
    }
}
