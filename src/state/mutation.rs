//! Pending field mutations and their rendering into one update expression.
//!
//! A [`PendingMutations`] set holds at most one [`Mutation`] per field. When
//! flushed it renders into a single [`UpdateExpression`] with up to four
//! clauses (`SET`, `REMOVE`, `ADD`, `DELETE`). Field names and literal values
//! are referenced through index-based placeholders (`#f0`, `:v0`), so two
//! distinct field names can never map to the same placeholder.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

/// Placeholder for the zero literal used by increments.
const ZERO_PLACEHOLDER: &str = ":zero";

/// A single staged change to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Assign a value.
    Set(AttributeValue),
    /// Add a numeric delta, treating an absent field as zero.
    Increment(String),
    /// Remove the field.
    Remove,
    /// Union the values into a string set.
    AddToSet(Vec<String>),
    /// Remove the values from a string set.
    DeleteFromSet(Vec<String>),
}

/// The update clause a mutation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    /// Assignments and increments.
    Set,
    /// Field removals.
    Remove,
    /// String set unions.
    Add,
    /// String set differences.
    Delete,
}

impl Clause {
    const ORDER: [Clause; 4] = [Clause::Set, Clause::Remove, Clause::Add, Clause::Delete];

    /// Returns the expression keyword for this clause.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::Remove => "REMOVE",
            Self::Add => "ADD",
            Self::Delete => "DELETE",
        }
    }
}

impl Mutation {
    /// Returns the clause this mutation renders into.
    pub fn clause(&self) -> Clause {
        match self {
            Self::Set(_) | Self::Increment(_) => Clause::Set,
            Self::Remove => Clause::Remove,
            Self::AddToSet(_) => Clause::Add,
            Self::DeleteFromSet(_) => Clause::Delete,
        }
    }
}

/// A rendered update: expression text plus placeholder tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    /// The combined update expression
    pub expression: String,
    /// Placeholder name to real field name
    pub names: HashMap<String, String>,
    /// Placeholder name to literal value
    pub values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    /// Returns the value table as sent with the request.
    ///
    /// DynamoDB rejects an empty `ExpressionAttributeValues` map, so an
    /// expression that only removes fields sends none.
    pub fn attribute_values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

/// Mutations staged against one item, in staging order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingMutations {
    entries: Vec<(String, Mutation)>,
}

impl PendingMutations {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of fields with a pending mutation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if `field` already has a pending mutation.
    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == field)
    }

    /// Returns the pending mutation for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Mutation> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, mutation)| mutation)
    }

    /// Stages a mutation, replacing any pending one for the same field in place.
    pub fn stage(&mut self, field: impl Into<String>, mutation: Mutation) {
        let field = field.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = mutation,
            None => self.entries.push((field, mutation)),
        }
    }

    /// Iterates pending mutations in staging order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mutation)> {
        self.entries.iter().map(|(name, mutation)| (name.as_str(), mutation))
    }

    /// Returns the field names in staging order.
    pub fn fields(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Drops all pending mutations.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Renders the pending set into one combined update expression.
    pub fn to_update_expression(&self) -> UpdateExpression {
        let mut update = UpdateExpression::default();
        let mut clauses: HashMap<&'static str, Vec<String>> = HashMap::new();

        for (index, (field, mutation)) in self.entries.iter().enumerate() {
            let name = field_placeholder(index);
            update.names.insert(name.clone(), field.clone());

            let action = match mutation {
                Mutation::Set(value) => {
                    let value_name = value_placeholder(index);
                    update.values.insert(value_name.clone(), value.clone());
                    format!("{} = {}", name, value_name)
                }
                Mutation::Increment(delta) => {
                    let value_name = value_placeholder(index);
                    update
                        .values
                        .insert(value_name.clone(), AttributeValue::N(delta.clone()));
                    update
                        .values
                        .insert(ZERO_PLACEHOLDER.to_string(), AttributeValue::N("0".to_string()));
                    format!(
                        "{name} = if_not_exists({name}, {zero}) + {value_name}",
                        zero = ZERO_PLACEHOLDER
                    )
                }
                Mutation::Remove => name,
                Mutation::AddToSet(values) | Mutation::DeleteFromSet(values) => {
                    let value_name = value_placeholder(index);
                    update
                        .values
                        .insert(value_name.clone(), AttributeValue::Ss(values.clone()));
                    format!("{} {}", name, value_name)
                }
            };
            clauses
                .entry(mutation.clause().keyword())
                .or_default()
                .push(action);
        }

        update.expression = Clause::ORDER
            .iter()
            .filter_map(|clause| {
                clauses
                    .get(clause.keyword())
                    .map(|actions| format!("{} {}", clause.keyword(), actions.join(", ")))
            })
            .collect::<Vec<_>>()
            .join(" ");
        update
    }
}

/// Placeholder for the field at `index` in the pending set.
pub fn field_placeholder(index: usize) -> String {
    format!("#f{}", index)
}

/// Placeholder for the literal value of the field at `index`.
pub fn value_placeholder(index: usize) -> String {
    format!(":v{}", index)
}
