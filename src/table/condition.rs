use std::cmp::Ordering;

use super::meta::FieldMeta;
use super::value::{FieldType, Value};

/// Comparison operators supported by filters and index scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    EqualTo,
    NotEqual,
    LessThan,
    LessEqual,
    GreatThan,
    GreatEqual,
}

impl CompOp {
    pub fn evaluate(&self, ordering: Ordering) -> bool {
        match self {
            CompOp::EqualTo => ordering == Ordering::Equal,
            CompOp::NotEqual => ordering != Ordering::Equal,
            CompOp::LessThan => ordering == Ordering::Less,
            CompOp::LessEqual => ordering != Ordering::Greater,
            CompOp::GreatThan => ordering == Ordering::Greater,
            CompOp::GreatEqual => ordering != Ordering::Less,
        }
    }

    /// The operator with its operands exchanged: `a op b` ⇔ `b op.swapped() a`.
    pub fn swapped(&self) -> CompOp {
        match self {
            CompOp::EqualTo => CompOp::EqualTo,
            CompOp::NotEqual => CompOp::NotEqual,
            CompOp::LessThan => CompOp::GreatThan,
            CompOp::LessEqual => CompOp::GreatEqual,
            CompOp::GreatThan => CompOp::LessThan,
            CompOp::GreatEqual => CompOp::LessEqual,
        }
    }
}

/// One side of a comparison: a field of the record, or a constant
#[derive(Debug, Clone)]
pub enum CondOperand {
    Field {
        offset: usize,
        len: usize,
        field_type: FieldType,
    },
    Value(Value),
}

impl CondOperand {
    pub fn field(meta: &FieldMeta) -> Self {
        CondOperand::Field {
            offset: meta.offset(),
            len: meta.len(),
            field_type: meta.field_type(),
        }
    }

    pub fn value(value: Value) -> Self {
        CondOperand::Value(value)
    }

    fn resolve(&self, record_data: &[u8]) -> Option<Value> {
        match self {
            CondOperand::Field { offset, len, field_type } => {
                let bytes = record_data.get(*offset..*offset + *len)?;
                Value::decode(bytes, *field_type)
            }
            CondOperand::Value(value) => Some(value.clone()),
        }
    }
}

/// `left op right` over one record
#[derive(Debug, Clone)]
pub struct ComparisonFilter {
    left: CondOperand,
    op: CompOp,
    right: CondOperand,
}

impl ComparisonFilter {
    pub fn new(left: CondOperand, op: CompOp, right: CondOperand) -> Self {
        Self { left, op, right }
    }

    pub fn left(&self) -> &CondOperand {
        &self.left
    }

    pub fn op(&self) -> CompOp {
        self.op
    }

    pub fn right(&self) -> &CondOperand {
        &self.right
    }

    pub fn matches(&self, record_data: &[u8]) -> bool {
        let (Some(left), Some(right)) = (
            self.left.resolve(record_data),
            self.right.resolve(record_data),
        ) else {
            return false;
        };
        match left.compare(&right) {
            Some(ordering) => self.op.evaluate(ordering),
            None => false,
        }
    }
}

/// Conjunction of sub-filters
#[derive(Debug, Clone)]
pub struct CompositeFilter {
    filters: Vec<ConditionFilter>,
}

impl CompositeFilter {
    pub fn new(filters: Vec<ConditionFilter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[ConditionFilter] {
        &self.filters
    }

    pub fn matches(&self, record_data: &[u8]) -> bool {
        self.filters.iter().all(|f| f.matches(record_data))
    }
}

/// A predicate over raw record bytes, either a single comparison or a
/// conjunction of them. Index selection matches on the structure.
#[derive(Debug, Clone)]
pub enum ConditionFilter {
    Comparison(ComparisonFilter),
    Composite(CompositeFilter),
}

impl ConditionFilter {
    /// `field op constant` — the common shape produced by a WHERE clause.
    pub fn comparison(field: &FieldMeta, op: CompOp, value: Value) -> Self {
        ConditionFilter::Comparison(ComparisonFilter::new(
            CondOperand::field(field),
            op,
            CondOperand::value(value),
        ))
    }

    pub fn and(filters: Vec<ConditionFilter>) -> Self {
        ConditionFilter::Composite(CompositeFilter::new(filters))
    }

    pub fn matches(&self, record_data: &[u8]) -> bool {
        match self {
            ConditionFilter::Comparison(cmp) => cmp.matches(record_data),
            ConditionFilter::Composite(composite) => composite.matches(record_data),
        }
    }
}
