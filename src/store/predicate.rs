//! Structured predicates over orders
//!
//! A predicate compares the identifier, user or status of an order and can
//! be combined with `And` / `Or`.

use crate::types::{Order, OrderId, OrderStatus, UserId};

/// Comparison applied to a single order field
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison<T> {
    Eq(T),
    Ne(T),
    In(Vec<T>),
    NotIn(Vec<T>),
}

impl<T: PartialEq> Comparison<T> {
    pub fn test(&self, value: &T) -> bool {
        match self {
            Comparison::Eq(expected) => value == expected,
            Comparison::Ne(expected) => value != expected,
            Comparison::In(values) => values.contains(value),
            Comparison::NotIn(values) => !values.contains(value),
        }
    }
}

/// Predicate over {identifier, user, status}
///
/// An empty `And` matches everything, an empty `Or` matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderPredicate {
    Id(Comparison<OrderId>),
    User(Comparison<UserId>),
    Status(Comparison<OrderStatus>),
    And(Vec<OrderPredicate>),
    Or(Vec<OrderPredicate>),
}

impl OrderPredicate {
    /// Matches every order
    pub fn all() -> Self {
        OrderPredicate::And(Vec::new())
    }

    pub fn with_id(id: impl Into<OrderId>) -> Self {
        OrderPredicate::Id(Comparison::Eq(id.into()))
    }

    pub fn owned_by(user_id: impl Into<UserId>) -> Self {
        OrderPredicate::User(Comparison::Eq(user_id.into()))
    }

    /// Orders that still need reconciliation
    pub fn non_terminal() -> Self {
        OrderPredicate::And(vec![
            OrderPredicate::Status(Comparison::Ne(OrderStatus::Processed)),
            OrderPredicate::Status(Comparison::Ne(OrderStatus::Invalid)),
        ])
    }

    /// Conjunction of `self` and `other`
    pub fn and(self, other: OrderPredicate) -> Self {
        match self {
            OrderPredicate::And(mut predicates) => {
                predicates.push(other);
                OrderPredicate::And(predicates)
            }
            predicate => OrderPredicate::And(vec![predicate, other]),
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderPredicate::Id(cmp) => cmp.test(&order.id),
            OrderPredicate::User(cmp) => cmp.test(&order.user_id),
            OrderPredicate::Status(cmp) => cmp.test(&order.status),
            OrderPredicate::And(predicates) => predicates.iter().all(|p| p.matches(order)),
            OrderPredicate::Or(predicates) => predicates.iter().any(|p| p.matches(order)),
        }
    }
}
