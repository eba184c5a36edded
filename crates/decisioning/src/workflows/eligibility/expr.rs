//! Typed rule expression tree.
//!
//! Rule conditions are small ASTs over applicant facts: field references,
//! literals, comparisons, and boolean combinators. [`RuleExpr::validate`]
//! runs at publish time so a malformed or ill-typed expression can never
//! reach evaluation; [`RuleExpr::evaluate`] is a pure function of the facts.

use serde::{Deserialize, Serialize};

use super::domain::{ApplicantFacts, FactKind, FactValue};

/// Comparison operators available to rule authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    const fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge
        )
    }
}

/// Expression node. The root of a rule expression must type-check to bool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleExpr {
    /// Reference to an applicant fact by field name.
    Field { name: String },
    /// A constant value.
    Literal { value: FactValue },
    /// Binary comparison between two operands.
    Compare {
        op: CompareOp,
        left: Box<RuleExpr>,
        right: Box<RuleExpr>,
    },
    /// True iff every term is true.
    All { terms: Vec<RuleExpr> },
    /// True iff at least one term is true.
    Any { terms: Vec<RuleExpr> },
    /// Boolean negation.
    Not { term: Box<RuleExpr> },
}

/// Static validation failures, surfaced before publish.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("field reference has an empty name")]
    EmptyFieldName,
    #[error("boolean combinator has no terms")]
    EmptyCombinator,
    #[error("expression must produce a boolean, found {found}")]
    NotBoolean { found: &'static str },
    #[error("operands of {op} have incompatible types ({left} vs {right})")]
    OperandMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("ordering comparison {op} is not defined for {kind} operands")]
    UnorderedOperand {
        op: &'static str,
        kind: &'static str,
    },
}

/// Evaluation failures. Missing or mismatched facts fail the rule
/// conservatively; they never pass it.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalFailure {
    MissingField(String),
    TypeMismatch {
        field: String,
        expected: FactKind,
        found: FactKind,
    },
}

impl EvalFailure {
    pub fn message(&self) -> String {
        match self {
            EvalFailure::MissingField(name) => format!("missing field: {name}"),
            EvalFailure::TypeMismatch {
                field,
                expected,
                found,
            } => format!(
                "field {field}: expected {}, found {}",
                expected.label(),
                found.label()
            ),
        }
    }
}

/// Inferred static type of a subexpression. Field types are unknown until
/// evaluation, which is why runtime mismatches still fail conservatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprType {
    Bool,
    Value(FactKind),
    Unknown,
}

impl ExprType {
    const fn label(self) -> &'static str {
        match self {
            ExprType::Bool => "bool",
            ExprType::Value(kind) => kind.label(),
            ExprType::Unknown => "field",
        }
    }
}

impl RuleExpr {
    /// Statically check the expression: well-formed structure, boolean root,
    /// and type-consistent comparisons wherever both operand types are known.
    pub fn validate(&self) -> Result<(), ExprError> {
        match self.check()? {
            ExprType::Bool => Ok(()),
            other => Err(ExprError::NotBoolean {
                found: other.label(),
            }),
        }
    }

    fn check(&self) -> Result<ExprType, ExprError> {
        match self {
            RuleExpr::Field { name } => {
                if name.trim().is_empty() {
                    return Err(ExprError::EmptyFieldName);
                }
                Ok(ExprType::Unknown)
            }
            RuleExpr::Literal { value } => Ok(match value.kind() {
                FactKind::Bool => ExprType::Bool,
                kind => ExprType::Value(kind),
            }),
            RuleExpr::Compare { op, left, right } => {
                let lhs = left.check()?;
                let rhs = right.check()?;
                if let (Some(l), Some(r)) = (comparable_kind(lhs), comparable_kind(rhs)) {
                    if l != r {
                        return Err(ExprError::OperandMismatch {
                            op: op.symbol(),
                            left: l.label(),
                            right: r.label(),
                        });
                    }
                    if op.is_ordering() && l == FactKind::Bool {
                        return Err(ExprError::UnorderedOperand {
                            op: op.symbol(),
                            kind: l.label(),
                        });
                    }
                }
                Ok(ExprType::Bool)
            }
            RuleExpr::All { terms } | RuleExpr::Any { terms } => {
                if terms.is_empty() {
                    return Err(ExprError::EmptyCombinator);
                }
                for term in terms {
                    require_bool(term)?;
                }
                Ok(ExprType::Bool)
            }
            RuleExpr::Not { term } => {
                require_bool(term)?;
                Ok(ExprType::Bool)
            }
        }
    }

    /// Evaluate against one applicant's facts. Pure; identical inputs always
    /// produce identical results.
    pub fn evaluate(&self, facts: &ApplicantFacts) -> Result<bool, EvalFailure> {
        match self {
            RuleExpr::Field { name } => match self.resolve(facts)? {
                FactValue::Bool(value) => Ok(value),
                other => Err(EvalFailure::TypeMismatch {
                    field: name.clone(),
                    expected: FactKind::Bool,
                    found: other.kind(),
                }),
            },
            RuleExpr::Literal { value } => match value {
                FactValue::Bool(value) => Ok(*value),
                other => Err(EvalFailure::TypeMismatch {
                    field: String::new(),
                    expected: FactKind::Bool,
                    found: other.kind(),
                }),
            },
            RuleExpr::Compare { op, left, right } => {
                let lhs = left.resolve(facts)?;
                let rhs = right.resolve(facts)?;
                compare_values(*op, &lhs, &rhs)
            }
            RuleExpr::All { terms } => {
                for term in terms {
                    if !term.evaluate(facts)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RuleExpr::Any { terms } => {
                for term in terms {
                    if term.evaluate(facts)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleExpr::Not { term } => Ok(!term.evaluate(facts)?),
        }
    }

    /// Resolve an operand to a concrete value.
    fn resolve(&self, facts: &ApplicantFacts) -> Result<FactValue, EvalFailure> {
        match self {
            RuleExpr::Field { name } => facts
                .get(name)
                .cloned()
                .ok_or_else(|| EvalFailure::MissingField(name.clone())),
            RuleExpr::Literal { value } => Ok(value.clone()),
            nested => nested.evaluate(facts).map(FactValue::Bool),
        }
    }
}

fn require_bool(term: &RuleExpr) -> Result<(), ExprError> {
    match term.check()? {
        ExprType::Bool | ExprType::Unknown => Ok(()),
        other => Err(ExprError::NotBoolean {
            found: other.label(),
        }),
    }
}

fn comparable_kind(ty: ExprType) -> Option<FactKind> {
    match ty {
        ExprType::Bool => Some(FactKind::Bool),
        ExprType::Value(kind) => Some(kind),
        ExprType::Unknown => None,
    }
}

fn compare_values(op: CompareOp, lhs: &FactValue, rhs: &FactValue) -> Result<bool, EvalFailure> {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (FactValue::Number(l), FactValue::Number(r)) => {
            l.partial_cmp(r).unwrap_or(Ordering::Equal)
        }
        (FactValue::Text(l), FactValue::Text(r)) => l.cmp(r),
        (FactValue::Date(l), FactValue::Date(r)) => l.cmp(r),
        (FactValue::Bool(l), FactValue::Bool(r)) => {
            return match op {
                CompareOp::Eq => Ok(l == r),
                CompareOp::Ne => Ok(l != r),
                _ => Err(EvalFailure::TypeMismatch {
                    field: String::new(),
                    expected: FactKind::Number,
                    found: FactKind::Bool,
                }),
            };
        }
        (l, r) => {
            return Err(EvalFailure::TypeMismatch {
                field: String::new(),
                expected: l.kind(),
                found: r.kind(),
            });
        }
    };

    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

/// Shorthand constructors used by rule authoring code and tests.
impl RuleExpr {
    pub fn field(name: impl Into<String>) -> Self {
        RuleExpr::Field { name: name.into() }
    }

    pub fn number(value: f64) -> Self {
        RuleExpr::Literal {
            value: FactValue::Number(value),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        RuleExpr::Literal {
            value: FactValue::Text(value.into()),
        }
    }

    pub fn boolean(value: bool) -> Self {
        RuleExpr::Literal {
            value: FactValue::Bool(value),
        }
    }

    pub fn compare(op: CompareOp, left: RuleExpr, right: RuleExpr) -> Self {
        RuleExpr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn all(terms: Vec<RuleExpr>) -> Self {
        RuleExpr::All { terms }
    }

    pub fn any(terms: Vec<RuleExpr>) -> Self {
        RuleExpr::Any { terms }
    }

    pub fn negate(term: RuleExpr) -> Self {
        RuleExpr::Not {
            term: Box::new(term),
        }
    }
}
