//! Ordered operand and argument lists.
//!
//! Operands of operators, array accesses and invocations are evaluated in
//! ascending order of their evaluation order index, ties keeping their
//! position. Values land in declaration order regardless of the schedule.

use smallvec::SmallVec;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::types::ArgumentDirection;
use wfexpr_core::value::Value;

use super::{Child, LocationRef, ValueRef};
use crate::context::ExecutionContext;
use crate::location::BoxedLocation;

#[derive(Clone)]
pub enum Binding {
    Value(ValueRef),
    /// By-ref argument; resolved to a location and written back after the call.
    Location(LocationRef),
}

#[derive(Clone)]
pub struct Argument {
    pub direction: ArgumentDirection,
    pub order: u32,
    pub binding: Binding,
}

impl Argument {
    pub fn value(order: u32, node: ValueRef) -> Self {
        Argument {
            direction: ArgumentDirection::In,
            order,
            binding: Binding::Value(node),
        }
    }

    pub fn by_ref(direction: ArgumentDirection, order: u32, node: LocationRef) -> Self {
        Argument {
            direction,
            order,
            binding: Binding::Location(node),
        }
    }
}

#[derive(Clone, Default)]
pub struct ArgumentList {
    args: Vec<Argument>,
    schedule: Vec<usize>,
}

/// Evaluated arguments plus the locations of by-ref arguments.
pub struct PreparedArguments {
    pub values: SmallVec<[Value; 4]>,
    by_ref: SmallVec<[(usize, BoxedLocation); 1]>,
}

impl ArgumentList {
    pub fn new(args: Vec<Argument>) -> Self {
        let mut schedule: Vec<usize> = (0..args.len()).collect();
        // sort_by_key is stable
        schedule.sort_by_key(|&i| args[i].order);
        ArgumentList { args, schedule }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    /// Declaration-order positions in evaluation order.
    pub fn schedule(&self) -> &[usize] {
        &self.schedule
    }

    /// Evaluates value arguments and resolves by-ref arguments, following
    /// the schedule. `InOut` arguments read their location's current value;
    /// `Out` arguments start out `Null`.
    pub fn prepare(&self, ctx: &dyn ExecutionContext) -> Result<PreparedArguments, RuntimeError> {
        let mut values: SmallVec<[Value; 4]> = SmallVec::from_elem(Value::Null, self.args.len());
        let mut by_ref = SmallVec::new();
        for &i in &self.schedule {
            let arg = &self.args[i];
            match &arg.binding {
                Binding::Value(node) => values[i] = node.evaluate(ctx)?,
                Binding::Location(node) => {
                    let location = node.resolve(ctx)?;
                    if arg.direction == ArgumentDirection::InOut {
                        values[i] = location.get(ctx)?;
                    }
                    by_ref.push((i, location));
                }
            }
        }
        Ok(PreparedArguments { values, by_ref })
    }

    pub fn children(&self, prefix: &str) -> Vec<Child> {
        self.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let role = format!("{}{}", prefix, i);
                match &arg.binding {
                    Binding::Value(node) => Child::value(role, node),
                    Binding::Location(node) => Child::location(role, node),
                }
            })
            .collect()
    }
}

impl PreparedArguments {
    /// Copies the post-call values of by-ref arguments into their locations.
    pub fn write_back(&self, ctx: &dyn ExecutionContext) -> Result<(), RuntimeError> {
        for (i, location) in &self.by_ref {
            location.set(ctx, self.values[*i].clone())?;
        }
        Ok(())
    }
}
