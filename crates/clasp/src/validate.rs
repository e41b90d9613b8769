//! Validation pipeline run between matching and dispatch.

use std::marker::PhantomData;

use crate::binder::BoundParameters;
use crate::command::Command;
use crate::error::{CliError, CliErrorKind};
use crate::model::{CommandNode, CommandTree};

/// Inspects a bound parameter object and reports problems.
///
/// Every validator in the pipeline runs, even after an earlier one failed, so
/// the help page sees the complete set of errors.
pub trait Validator: Send + Sync {
    fn validate(
        &self,
        tree: &CommandTree,
        node: &CommandNode,
        params: &BoundParameters,
    ) -> Result<(), Vec<CliError>>;
}

impl<F> Validator for F
where
    F: Fn(&CommandTree, &CommandNode, &BoundParameters) -> Result<(), Vec<CliError>>
        + Send
        + Sync,
{
    fn validate(
        &self,
        tree: &CommandTree,
        node: &CommandNode,
        params: &BoundParameters,
    ) -> Result<(), Vec<CliError>> {
        self(tree, node, params)
    }
}

/// Reports every required option or value that argv never mentioned.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequiredValidator;

impl Validator for RequiredValidator {
    fn validate(
        &self,
        _tree: &CommandTree,
        node: &CommandNode,
        params: &BoundParameters,
    ) -> Result<(), Vec<CliError>> {
        let mut errors = Vec::new();
        for (idx, spec) in node.options().iter().enumerate() {
            if spec.is_required() && !params.is_provided(spec.target()) {
                errors.push(
                    CliError::new(CliErrorKind::MissingRequiredOption).on_option(node.id(), idx),
                );
            }
        }
        for (idx, spec) in node.values().iter().enumerate() {
            if spec.is_required() && !params.is_provided(spec.target()) {
                errors.push(
                    CliError::new(CliErrorKind::MissingRequiredValue).on_value(node.id(), idx),
                );
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validator over the typed parameter object of one command.
pub(crate) struct TypedValidator<P, F> {
    f: F,
    _params: PhantomData<fn(&P)>,
}

impl<P, F> TypedValidator<P, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _params: PhantomData,
        }
    }
}

impl<P, F> Validator for TypedValidator<P, F>
where
    P: Command,
    F: Fn(&P) -> Result<(), Vec<CliError>> + Send + Sync,
{
    fn validate(
        &self,
        _tree: &CommandTree,
        _node: &CommandNode,
        params: &BoundParameters,
    ) -> Result<(), Vec<CliError>> {
        match params.downcast_ref::<P>() {
            Some(p) => (self.f)(p),
            None => Ok(()),
        }
    }
}

/// Run `validators` in order and collect every error. Errors that do not name
/// a command are attributed to `node`.
pub(crate) fn run_pipeline<'v>(
    validators: impl IntoIterator<Item = &'v dyn Validator>,
    tree: &CommandTree,
    node: &CommandNode,
    params: &BoundParameters,
) -> Vec<CliError> {
    let mut errors = Vec::new();
    for validator in validators {
        if let Err(found) = validator.validate(tree, node, params) {
            errors.extend(found.into_iter().map(|mut e| {
                e.command.get_or_insert(node.id());
                e
            }));
        }
    }
    tracing::debug!(command = node.name(), errors = errors.len(), "validation finished");
    errors
}
