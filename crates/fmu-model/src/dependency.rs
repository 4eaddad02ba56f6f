//! Sparse structural dependency tables.
//!
//! A table is stored in compressed-row form: `row_start` holds `rows + 1`
//! offsets into the parallel `dependency_index` / `factor_kind` columns.
//! Tables with no entries at all carry no information and are never
//! materialized; [`DependencyTableBuilder::finish`] returns `None` for them.

use std::fmt;

use serde::Serialize;

/// How a dependent quantity depends on a column variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFactorKind {
    Unknown,
    Constant,
    Fixed,
    Tunable,
    Discrete,
    Dependent,
}

impl DependencyFactorKind {
    /// Parse one entry of a `dependenciesKind` list.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "constant" => Some(Self::Constant),
            "fixed" => Some(Self::Fixed),
            "tunable" => Some(Self::Tunable),
            "discrete" => Some(Self::Discrete),
            "dependent" => Some(Self::Dependent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Constant => "constant",
            Self::Fixed => "fixed",
            Self::Tunable => "tunable",
            Self::Discrete => "discrete",
            Self::Dependent => "dependent",
        }
    }
}

impl fmt::Display for DependencyFactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the four structural tables a model carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    DerivativesOnStates,
    DerivativesOnInputs,
    OutputsOnStates,
    OutputsOnInputs,
}

impl DependencyKind {
    pub const ALL: [DependencyKind; 4] = [
        DependencyKind::DerivativesOnStates,
        DependencyKind::DerivativesOnInputs,
        DependencyKind::OutputsOnStates,
        DependencyKind::OutputsOnInputs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DerivativesOnStates => "derivatives-on-states",
            Self::DerivativesOnInputs => "derivatives-on-inputs",
            Self::OutputsOnStates => "outputs-on-states",
            Self::OutputsOnInputs => "outputs-on-inputs",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, non-empty sparse dependency matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTable {
    row_start: Vec<usize>,
    dependency_index: Vec<usize>,
    factor_kind: Vec<DependencyFactorKind>,
}

impl DependencyTable {
    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.row_start.len() - 1
    }

    /// Total number of recorded dependencies across all rows.
    pub fn len(&self) -> usize {
        self.dependency_index.len()
    }

    /// Whether the table has no entries. A finished table is never empty,
    /// see the module docs.
    pub fn is_empty(&self) -> bool {
        self.dependency_index.is_empty()
    }

    /// Row offsets, `row_count() + 1` long, starting at 0.
    pub fn row_start(&self) -> &[usize] {
        &self.row_start
    }

    /// Column indices of every entry, row after row.
    pub fn dependency_index(&self) -> &[usize] {
        &self.dependency_index
    }

    /// Factor kinds parallel to [`dependency_index`](Self::dependency_index).
    pub fn factor_kinds(&self) -> &[DependencyFactorKind] {
        &self.factor_kind
    }

    /// `(column, factor kind)` pairs of one row in append order. Rows past
    /// the end yield nothing.
    pub fn dependencies_of_row(
        &self,
        row: usize,
    ) -> impl ExactSizeIterator<Item = (usize, DependencyFactorKind)> + '_ {
        let (start, end) = match (self.row_start.get(row), self.row_start.get(row + 1)) {
            (Some(&start), Some(&end)) => (start, end),
            _ => (0, 0),
        };
        self.dependency_index[start..end]
            .iter()
            .copied()
            .zip(self.factor_kind[start..end].iter().copied())
    }
}

/// Appends rows to a [`DependencyTable`] strictly in order.
///
/// Rows mirror the document order of their source elements. Starting a row
/// out of sequence, or adding an entry with no open row, is a bug in the
/// caller and panics.
#[derive(Debug, Clone)]
pub struct DependencyTableBuilder {
    row_start: Vec<usize>,
    dependency_index: Vec<usize>,
    factor_kind: Vec<DependencyFactorKind>,
    open_row: Option<usize>,
}

impl Default for DependencyTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTableBuilder {
    pub fn new() -> Self {
        Self {
            row_start: vec![0],
            dependency_index: Vec::new(),
            factor_kind: Vec::new(),
            open_row: None,
        }
    }

    /// Number of rows closed so far.
    pub fn rows(&self) -> usize {
        self.row_start.len() - 1
    }

    /// Open row `row`, which must equal [`rows`](Self::rows).
    pub fn start_row(&mut self, row: usize) {
        assert!(
            self.open_row.is_none(),
            "row {} started while row {:?} is still open",
            row,
            self.open_row
        );
        assert_eq!(row, self.rows(), "dependency rows must be appended in order");
        self.open_row = Some(row);
    }

    /// Add one entry to the open row.
    pub fn add(&mut self, column: usize, kind: DependencyFactorKind) {
        assert!(self.open_row.is_some(), "dependency added with no open row");
        self.dependency_index.push(column);
        self.factor_kind.push(kind);
    }

    /// Close the open row.
    pub fn close_row(&mut self) {
        assert!(self.open_row.take().is_some(), "no open row to close");
        self.row_start.push(self.dependency_index.len());
    }

    /// Append a complete row.
    pub fn push_row<I>(&mut self, row: usize, entries: I)
    where
        I: IntoIterator<Item = (usize, DependencyFactorKind)>,
    {
        self.start_row(row);
        for (column, kind) in entries {
            self.add(column, kind);
        }
        self.close_row();
    }

    /// Freeze the table. A table with zero total entries normalizes to `None`.
    pub fn finish(self) -> Option<DependencyTable> {
        assert!(self.open_row.is_none(), "finish called with an open row");
        if self.dependency_index.is_empty() {
            tracing::trace!(rows = self.rows(), "discarding dependency table with no entries");
            return None;
        }
        Some(DependencyTable {
            row_start: self.row_start,
            dependency_index: self.dependency_index,
            factor_kind: self.factor_kind,
        })
    }
}
