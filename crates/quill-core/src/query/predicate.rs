//! The predicate vocabulary a `where` clause may use (spec.md §4.5).

/// A comparison operator. String-form operators (`"="`, `"!="`, `"like"`,
/// ...) parse into this enum via [`Predicate::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

impl Predicate {
    pub fn parse(op: &str) -> Option<Predicate> {
        Some(match op.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Predicate::Eq,
            "!=" | "<>" | "ne" => Predicate::Ne,
            ">" | "gt" => Predicate::Gt,
            ">=" | "gte" | "ge" => Predicate::Ge,
            "<" | "lt" => Predicate::Lt,
            "<=" | "lte" | "le" => Predicate::Le,
            "like" => Predicate::Like,
            "not like" => Predicate::NotLike,
            "in" => Predicate::In,
            "not in" => Predicate::NotIn,
            "between" => Predicate::Between,
            "is null" => Predicate::IsNull,
            "is not null" => Predicate::IsNotNull,
            _ => return None,
        })
    }

    pub fn sql_operator(self) -> &'static str {
        match self {
            Predicate::Eq => "=",
            Predicate::Ne => "<>",
            Predicate::Gt => ">",
            Predicate::Ge => ">=",
            Predicate::Lt => "<",
            Predicate::Le => "<=",
            Predicate::Like => "LIKE",
            Predicate::NotLike => "NOT LIKE",
            Predicate::In => "IN",
            Predicate::NotIn => "NOT IN",
            Predicate::Between => "BETWEEN",
            Predicate::IsNull => "IS NULL",
            Predicate::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Logical connector joining a where clause to the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn keyword(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_operator_spellings() {
        assert_eq!(Predicate::parse(">="), Some(Predicate::Ge));
        assert_eq!(Predicate::parse("NOT IN"), Some(Predicate::NotIn));
        assert_eq!(Predicate::parse("nonsense"), None);
    }
}
