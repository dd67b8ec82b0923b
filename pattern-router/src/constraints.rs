// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Constraints restricting the values captured by pattern bindings.
//!
//! A constraint names a binding and a check to apply to its value after a
//! rule matched. A failing check rejects the rule, the next rule is tried as
//! if the pattern hadn't matched. Checks can also replace the value, e.g.
//! the integer check replaces the matched bytes by the parsed number.
//! Constraints naming a binding that the rule didn't capture are skipped.

use std::fmt::Debug;
use std::sync::Arc;

use crate::matcher::Bindings;

/// Value captured for a binding: the matched bytes, or whatever a constraint
/// replaced them with.
#[derive(Clone, PartialEq, Eq)]
pub enum BindingValue {
    /// The segment bytes as matched (path segments are percent-decoded).
    Bytes(Vec<u8>),
    /// The number the `int` constraint converted the matched bytes into.
    Int(i64),
}

impl BindingValue {
    /// Returns the byte value unless a constraint converted it.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Int(_) => None,
        }
    }

    /// Returns the converted integer value if there is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bytes(_) => None,
            Self::Int(value) => Some(*value),
        }
    }
}

impl Debug for BindingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Self::Int(value) => value.fmt(f),
        }
    }
}

impl From<&[u8]> for BindingValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<&str> for BindingValue {
    fn from(value: &str) -> Self {
        value.as_bytes().into()
    }
}

impl From<i64> for BindingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Outcome of a constraint check.
pub enum ConstraintResult {
    /// The value is acceptable and kept unchanged.
    Accept,
    /// The value is acceptable but should be replaced by the given value.
    Replace(BindingValue),
    /// The value is not acceptable, the rule doesn't match.
    Reject,
}

type ConstraintFn = Arc<dyn Fn(&BindingValue) -> ConstraintResult + Send + Sync>;

#[derive(Clone)]
enum Check {
    Int,
    NonEmpty,
    Fn(ConstraintFn),
}

/// A named binding paired with a check applied to its captured value.
#[derive(Clone)]
pub struct Constraint {
    name: Arc<str>,
    check: Check,
}

impl Constraint {
    /// The value has to parse as a decimal integer and is replaced by it.
    pub fn int(name: &str) -> Self {
        Self {
            name: name.into(),
            check: Check::Int,
        }
    }

    /// The value has to be a non-empty byte string.
    pub fn non_empty(name: &str) -> Self {
        Self {
            name: name.into(),
            check: Check::NonEmpty,
        }
    }

    /// A custom check deciding whether to accept, replace or reject the
    /// value.
    ///
    /// The check runs synchronously while a request is being routed, it must
    /// not block and should be free of side effects.
    pub fn check<F>(name: &str, check: F) -> Self
    where
        F: Fn(&BindingValue) -> ConstraintResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Check::Fn(Arc::new(check)),
        }
    }

    /// The name of the binding this constraint applies to.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let check = match &self.check {
            Check::Int => "int",
            Check::NonEmpty => "non_empty",
            Check::Fn(_) => "fn",
        };
        write!(f, "{}: {check}", self.name)
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.check, &other.check) {
            (Check::Int, Check::Int) => true,
            (Check::NonEmpty, Check::NonEmpty) => true,
            // Opaque checks are only ever equal to themselves.
            (Check::Fn(a), Check::Fn(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Applies constraints to the bindings of a matched rule in declared order.
///
/// Returns `false` as soon as one check rejects, the caller continues with
/// the next rule then. Value replacements are applied in place.
pub(crate) fn check_constraints(constraints: &[Constraint], bindings: &mut Bindings) -> bool {
    for constraint in constraints {
        let value = if let Some(value) = bindings.value_mut(&constraint.name) {
            value
        } else {
            continue;
        };

        match &constraint.check {
            Check::Int => {
                let parsed = match value {
                    BindingValue::Bytes(bytes) => std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|text| text.parse::<i64>().ok()),
                    BindingValue::Int(parsed) => Some(*parsed),
                };
                if let Some(parsed) = parsed {
                    *value = BindingValue::Int(parsed);
                } else {
                    return false;
                }
            }
            Check::NonEmpty => {
                if value.as_bytes().is_some_and(|bytes| bytes.is_empty()) {
                    return false;
                }
            }
            Check::Fn(check) => match check(value) {
                ConstraintResult::Accept => {}
                ConstraintResult::Replace(replacement) => *value = replacement,
                ConstraintResult::Reject => return false,
            },
        }
    }
    true
}
