use super::Session;
use crate::{
    correlator::Expectation,
    errors::SessionError,
    variable::{
        arguments_section, locals_section, parse_listing, ListingEntry, Variable, VariableParser,
        VariablePath, VariableScope,
    },
};
use std::sync::Arc;
use tracing::{debug, warn};

impl Session {
    /// The locals of the current frame. Cached until the program resumes,
    /// unless the debugger did not answer.
    pub async fn local_variables(&mut self) -> Result<Arc<Vec<Variable>>, SessionError> {
        if let Some(cached) = &self.locals {
            return Ok(cached.clone());
        }
        self.ensure_alive().await?;
        let frame = self
            .request(Expectation::VariablesInfo, &["info frame"], self.config.request_timeout())
            .await?;
        let entries = frame
            .as_deref()
            .and_then(locals_section)
            .map(parse_listing)
            .unwrap_or_default();
        let variables = Arc::new(self.print_entries(VariableScope::Locals, entries).await?);
        if frame.is_some() {
            self.locals = Some(variables.clone());
        }
        Ok(variables)
    }

    /// The arguments of the current frame. Cached until the program resumes.
    pub async fn args_variables(&mut self) -> Result<Arc<Vec<Variable>>, SessionError> {
        if let Some(cached) = &self.arguments {
            return Ok(cached.clone());
        }
        self.ensure_alive().await?;
        let frame = self
            .request(Expectation::VariablesInfo, &["info frame"], self.config.request_timeout())
            .await?;
        let entries = frame
            .as_deref()
            .and_then(arguments_section)
            .map(parse_listing)
            .unwrap_or_default();
        let variables = Arc::new(self.print_entries(VariableScope::Arguments, entries).await?);
        if frame.is_some() {
            self.arguments = Some(variables.clone());
        }
        Ok(variables)
    }

    /// The globals of the app. Cached until the program resumes.
    ///
    /// `info variables` answers without any marker of its own, so the frame
    /// following the `help support` output is taken as its answer.
    pub async fn global_variables(&mut self) -> Result<Arc<Vec<Variable>>, SessionError> {
        if let Some(cached) = &self.globals {
            return Ok(cached.clone());
        }
        self.ensure_alive().await?;
        let frame = self
            .request(
                Expectation::GlobalVariablesInfo,
                &["help support", "info variables"],
                self.config.request_timeout(),
            )
            .await?;
        let entries = frame.as_deref().map(parse_listing).unwrap_or_default();
        let variables = Arc::new(self.print_entries(VariableScope::Globals, entries).await?);
        if frame.is_some() {
            self.globals = Some(variables.clone());
        }
        Ok(variables)
    }

    /// The children of the container with the given reference, if it belongs
    /// to the current suspend cycle.
    pub fn child_variables(&self, reference: usize) -> Vec<Variable> {
        let Some(path) = self.handles.get(reference) else {
            debug!("Unknown variable reference {reference}.");
            return vec![];
        };
        let roots = match path.scope {
            VariableScope::Locals => &self.locals,
            VariableScope::Arguments => &self.arguments,
            VariableScope::Globals => &self.globals,
        };
        roots
            .as_deref()
            .and_then(|roots| Variable::find_reference(roots, reference))
            .map(|it| it.children.clone())
            .unwrap_or_default()
    }

    /// Looks `name` up among the locals and then the arguments, including
    /// nested fields.
    pub async fn evaluate(&mut self, name: &str) -> Result<Option<Variable>, SessionError> {
        let locals = self.local_variables().await?;
        if let Some(variable) = Variable::find_name(&locals, name) {
            return Ok(Some(variable.clone()));
        }
        let arguments = self.args_variables().await?;
        Ok(Variable::find_name(&arguments, name).cloned())
    }

    /// Prints every listed variable to get its full tree. Entries that can't
    /// be printed keep the value from the listing.
    async fn print_entries(
        &mut self,
        scope: VariableScope,
        entries: Vec<ListingEntry>,
    ) -> Result<Vec<Variable>, SessionError> {
        let mut variables = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.is_null() {
                variables.push(entry.to_leaf());
                continue;
            }

            let command = format!("print {}", entry.name);
            let frame = self
                .request(
                    Expectation::ChildVariablesInfo(entry.name.clone()),
                    &[command.as_str()],
                    self.config.request_timeout(),
                )
                .await?;
            let parsed = frame.and_then(|frame| {
                VariableParser::new(&mut self.handles, self.config.indent_rules)
                    .parse_print_output(&frame, VariablePath::root(scope, &entry.name))
            });
            variables.push(parsed.unwrap_or_else(|| {
                warn!("Could not print `{}`, using its listed value.", entry.name);
                entry.to_leaf()
            }));
        }
        Ok(variables)
    }
}
