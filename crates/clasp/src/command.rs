use std::any::{Any, TypeId};

use clasp_metadata::CommandMeta;

use crate::error::BindError;
use crate::value::Value;

/// A command's parameter type.
///
/// Usually implemented with `#[derive(Command)]`. A fresh `Default` instance
/// is created for every run and populated slot by slot through [`set`].
///
/// [`set`]: Command::set
pub trait Command: Default + Send + 'static {
    /// Names, options and positional values of the command.
    fn meta() -> CommandMeta;

    /// Parameter type of the parent command, or `None` for a top-level
    /// command.
    fn parent() -> Option<TypeId> {
        None
    }

    /// Write one converted value into the slot named `target`. Collection
    /// slots append.
    fn set(&mut self, target: &str, value: Value) -> Result<(), BindError>;
}

/// Object-safe view of a parameter instance.
pub trait ParameterObject: Send {
    fn set(&mut self, target: &str, value: Value) -> Result<(), BindError>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<C: Command> ParameterObject for C {
    fn set(&mut self, target: &str, value: Value) -> Result<(), BindError> {
        Command::set(self, target, value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

pub(crate) type Factory = fn() -> Box<dyn ParameterObject>;

pub(crate) fn factory<C: Command>() -> Box<dyn ParameterObject> {
    Box::new(C::default())
}

/// Parameter type of the synthesized root node, which declares nothing.
#[derive(Debug, Default)]
pub(crate) struct NoParameters;

impl Command for NoParameters {
    fn meta() -> CommandMeta {
        CommandMeta::default()
    }

    fn set(&mut self, target: &str, _value: Value) -> Result<(), BindError> {
        Err(BindError::UnknownTarget(target.to_string()))
    }
}
