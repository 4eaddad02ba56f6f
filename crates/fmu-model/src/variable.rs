//! Scalar variable records and their closed attribute enumerations.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// Value reference as declared in the model description.
///
/// Unique only within a base type, and shared between a canonical variable
/// and its aliases.
pub type ValueReference = u32;

/// Position of a variable in document order (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VariableIndex(pub usize);

impl VariableIndex {
    /// The 1-based index used by the XML `ModelStructure` section.
    pub fn one_based(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for VariableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitive type carried by a variable. Ordinal order is significant for
/// registry sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    Real,
    Integer,
    Boolean,
    String,
    Enumeration,
}

impl BaseType {
    /// Parse from the name of the type element (`Real`, `Integer`, ...).
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "Real" => Some(Self::Real),
            "Integer" => Some(Self::Integer),
            "Boolean" => Some(Self::Boolean),
            "String" => Some(Self::String),
            "Enumeration" => Some(Self::Enumeration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Enumeration => "enumeration",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a variable is visible to the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Causality {
    Input,
    Output,
    Parameter,
    Local,
    Independent,
}

impl Causality {
    /// Parse a causality attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            "parameter" => Some(Self::Parameter),
            "local" => Some(Self::Local),
            "independent" => Some(Self::Independent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Parameter => "parameter",
            Self::Local => "local",
            Self::Independent => "independent",
        }
    }
}

impl fmt::Display for Causality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a variable's value may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variability {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    Continuous,
}

impl Variability {
    /// Parse a variability attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "constant" => Some(Self::Constant),
            "fixed" => Some(Self::Fixed),
            "tunable" => Some(Self::Tunable),
            "discrete" => Some(Self::Discrete),
            "continuous" => Some(Self::Continuous),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Fixed => "fixed",
            Self::Tunable => "tunable",
            Self::Discrete => "discrete",
            Self::Continuous => "continuous",
        }
    }
}

impl fmt::Display for Variability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alias relationship to the canonical variable sharing the same
/// `(base type, value reference)`.
///
/// `NoAlias` has the lowest ordinal so a canonical variable sorts before
/// its aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AliasKind {
    NoAlias,
    Alias,
    NegatedAlias,
}

impl AliasKind {
    /// Parse an `alias` attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "noAlias" => Some(Self::NoAlias),
            "alias" => Some(Self::Alias),
            "negatedAlias" => Some(Self::NegatedAlias),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAlias => "noAlias",
            Self::Alias => "alias",
            Self::NegatedAlias => "negatedAlias",
        }
    }
}

impl fmt::Display for AliasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared model quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    /// Unique name, used for diagnostics and lookup.
    pub name: String,
    pub value_reference: ValueReference,
    pub base_type: BaseType,
    pub causality: Causality,
    pub variability: Variability,
    pub alias_kind: AliasKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of a type definition this variable refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    /// Start value as written in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// For a derivative, the state variable it is the derivative of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivative_of: Option<VariableIndex>,
    /// Inputs this variable structurally depends on. `None` means unknown,
    /// i.e. possibly dependent on every input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_dependencies: Option<Vec<VariableIndex>>,
}

impl Variable {
    /// Create a canonical local continuous variable.
    pub fn new(name: impl Into<String>, value_reference: ValueReference, base_type: BaseType) -> Self {
        Self {
            name: name.into(),
            value_reference,
            base_type,
            causality: Causality::Local,
            variability: Variability::Continuous,
            alias_kind: AliasKind::NoAlias,
            description: None,
            declared_type: None,
            start: None,
            unit: None,
            derivative_of: None,
            direct_dependencies: None,
        }
    }

    pub fn with_causality(mut self, causality: Causality) -> Self {
        self.causality = causality;
        self
    }

    pub fn with_variability(mut self, variability: Variability) -> Self {
        self.variability = variability;
        self
    }

    pub fn with_alias(mut self, alias_kind: AliasKind) -> Self {
        self.alias_kind = alias_kind;
        self
    }

    /// Whether this variable is the canonical member of its reference group.
    pub fn is_canonical(&self) -> bool {
        self.alias_kind == AliasKind::NoAlias
    }

    /// Registry ordering key: `(base type, value reference, alias kind)`.
    pub fn sort_key(&self) -> (BaseType, ValueReference, AliasKind) {
        (self.base_type, self.value_reference, self.alias_kind)
    }
}

/// Registry comparator. Orders by base type ordinal, then value reference,
/// then alias kind ordinal.
pub fn compare_by_reference(a: &Variable, b: &Variable) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_closed_enumerations() {
        assert_eq!(Causality::parse("output"), Some(Causality::Output));
        assert_eq!(Causality::parse("internal"), None);
        assert_eq!(Variability::parse("tunable"), Some(Variability::Tunable));
        assert_eq!(AliasKind::parse("negatedAlias"), Some(AliasKind::NegatedAlias));
        assert_eq!(AliasKind::parse("negated"), None);
        assert_eq!(BaseType::from_element("Boolean"), Some(BaseType::Boolean));
        assert_eq!(BaseType::from_element("boolean"), None);
    }

    #[test]
    fn comparator_orders_type_then_reference_then_alias() {
        let int_low = Variable::new("i", 1, BaseType::Integer);
        let real_high = Variable::new("r", 100, BaseType::Real);
        assert_eq!(compare_by_reference(&real_high, &int_low), Ordering::Less);

        let canonical = Variable::new("x", 5, BaseType::Real);
        let alias = Variable::new("x_alias", 5, BaseType::Real).with_alias(AliasKind::Alias);
        let negated = Variable::new("x_neg", 5, BaseType::Real).with_alias(AliasKind::NegatedAlias);
        assert_eq!(compare_by_reference(&canonical, &alias), Ordering::Less);
        assert_eq!(compare_by_reference(&alias, &negated), Ordering::Less);

        let next = Variable::new("y", 6, BaseType::Real).with_alias(AliasKind::Alias);
        assert_eq!(compare_by_reference(&negated, &next), Ordering::Less);
    }

    #[test]
    fn new_variable_defaults() {
        let v = Variable::new("v", 3, BaseType::String);
        assert!(v.is_canonical());
        assert_eq!(v.causality, Causality::Local);
        assert_eq!(v.variability, Variability::Continuous);
        assert!(v.direct_dependencies.is_none());
    }
}
