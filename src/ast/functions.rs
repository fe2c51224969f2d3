/// Functions callable with the `:` separator.
///
/// The set is closed: the parser rejects any other name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    // Collection functions
    Count,
    Length,
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Any,
    All,
    // String functions
    Upper,
    Lower,
    Trim,
    Substring,
    StartsWith,
    EndsWith,
    Contains,
    Matches,
}

/// What a function accepts between its parentheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSpec {
    /// No parentheses allowed
    None,
    /// Optional value argument
    OptionalValue,
    /// Required value argument
    RequiredValue,
    /// Optional predicate argument
    OptionalPredicate,
    /// Required predicate argument
    RequiredPredicate,
}

impl ArgSpec {
    pub fn is_required(self) -> bool {
        matches!(self, ArgSpec::RequiredValue | ArgSpec::RequiredPredicate)
    }

    pub fn accepts_arg(self) -> bool {
        !matches!(self, ArgSpec::None)
    }

    pub fn is_predicate(self) -> bool {
        matches!(self, ArgSpec::OptionalPredicate | ArgSpec::RequiredPredicate)
    }
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "count" => Function::Count,
            "length" => Function::Length,
            "sum" => Function::Sum,
            "avg" => Function::Avg,
            "min" => Function::Min,
            "max" => Function::Max,
            "first" => Function::First,
            "last" => Function::Last,
            "any" => Function::Any,
            "all" => Function::All,
            "upper" => Function::Upper,
            "lower" => Function::Lower,
            "trim" => Function::Trim,
            "substring" => Function::Substring,
            "startswith" => Function::StartsWith,
            "endswith" => Function::EndsWith,
            "contains" => Function::Contains,
            "matches" => Function::Matches,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Count => "count",
            Function::Length => "length",
            Function::Sum => "sum",
            Function::Avg => "avg",
            Function::Min => "min",
            Function::Max => "max",
            Function::First => "first",
            Function::Last => "last",
            Function::Any => "any",
            Function::All => "all",
            Function::Upper => "upper",
            Function::Lower => "lower",
            Function::Trim => "trim",
            Function::Substring => "substring",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::Contains => "contains",
            Function::Matches => "matches",
        }
    }

    pub fn arg_spec(self) -> ArgSpec {
        match self {
            Function::Count
            | Function::Length
            | Function::First
            | Function::Last
            | Function::Upper
            | Function::Lower
            | Function::Trim => ArgSpec::None,
            Function::Sum | Function::Avg | Function::Min | Function::Max => {
                ArgSpec::OptionalValue
            }
            Function::Substring
            | Function::StartsWith
            | Function::EndsWith
            | Function::Contains
            | Function::Matches => ArgSpec::RequiredValue,
            Function::Any => ArgSpec::OptionalPredicate,
            Function::All => ArgSpec::RequiredPredicate,
        }
    }
}
